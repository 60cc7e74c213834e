pub mod flatten;
pub mod normalize;
pub mod placement;
pub mod primitive;

pub use flatten::{Divergence, Flattener};
pub use normalize::{join_paths, normalize_paths, Normalized};
pub use placement::apply_placement;
pub use primitive::{BSpline, EllipticalArc, Primitive};
