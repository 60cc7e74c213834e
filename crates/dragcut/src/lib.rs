mod compiler;
mod config;
mod drag_knife;
mod error;
mod geometry;
mod import;
mod logging;
mod ordering;
mod postprocessor;
mod preview;
mod sequencer;
mod types;

pub use compiler::*;
pub use config::*;
pub use drag_knife::*;
pub use error::*;
pub use geometry::*;
pub use import::*;
pub use logging::init_logging;
pub use ordering::{build_precedence, order_paths, PrecedenceGraph};
pub use postprocessor::{post_process, NumberFormat};
pub use preview::render_preview;
pub use sequencer::{check_path_bounds, elide_lifts, sequence};
pub use types::*;
