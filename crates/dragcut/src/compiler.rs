//! The full pipeline: import, normalize, place, order, compensate, sequence, emit.

use crate::config::CompilerConfig;
use crate::drag_knife::compensate;
use crate::error::{CompileError, CompileWarning, PreviewError};
use crate::geometry::{apply_placement, normalize_paths};
use crate::import::{import_bytes, import_file, ImportedDocument, InputFormat};
use crate::ordering::order_paths;
use crate::postprocessor::post_process;
use crate::preview::render_preview;
use crate::sequencer::{check_path_bounds, elide_lifts, sequence};
use crate::types::{CompiledProgram, GCode, PathEntity};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared flag that stops a compilation at the next stage boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct Compilation {
    pub program: CompiledProgram,
    pub gcode: GCode,
    /// Every recoverable anomaly, in the order it was met.
    pub warnings: Vec<CompileWarning>,
    /// Placed blade-tip paths in cutting order.
    pub drawing: Vec<PathEntity>,
}

impl Compilation {
    /// SVG of the program drawn over its paths.
    pub fn preview(&self) -> Result<String, PreviewError> {
        render_preview(&self.program, &self.drawing)
    }
}

/// A validated configuration ready to compile drawings.
#[derive(Debug, Clone)]
pub struct Compiler {
    config: CompilerConfig,
    cancel: CancelToken,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Result<Self, CompileError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    fn checkpoint(&self, stage: &str) -> Result<(), CompileError> {
        if self.cancel.is_cancelled() {
            info!(stage, "compilation cancelled");
            return Err(CompileError::Cancelled);
        }
        Ok(())
    }

    pub fn compile_bytes(
        &self,
        bytes: &[u8],
        format: InputFormat,
    ) -> Result<Compilation, CompileError> {
        self.checkpoint("import")?;
        let document = import_bytes(bytes, format, &self.config.import)?;
        self.compile_document(document)
    }

    pub fn compile_file<P: AsRef<Path>>(&self, path: P) -> Result<Compilation, CompileError> {
        let path = path.as_ref();
        self.checkpoint("import")?;
        info!(path = %path.display(), "compiling drawing");
        let document = import_file(path, &self.config.import)?;
        self.compile_document(document)
    }

    /// Run every stage after import.
    pub fn compile_document(&self, document: ImportedDocument) -> Result<Compilation, CompileError> {
        let config = &self.config;
        info!(
            format = ?document.format,
            layers = document.layers.len(),
            paths = document.path_count(),
            "imported drawing"
        );
        let mut warnings = document.warnings.clone();
        let imported = document.into_paths();

        self.checkpoint("normalize")?;
        let normalized = normalize_paths(&imported, config);
        if let Some(limit) = config.max_flatten_divergences {
            if normalized.divergences > limit {
                return Err(CompileError::FlattenDivergence {
                    count: normalized.divergences,
                    limit,
                });
            }
        }
        warnings.extend(normalized.warnings);
        let mut paths = normalized.paths;
        apply_placement(&mut paths, &config.placement);
        check_path_bounds(&paths, config.machine.working_envelope)?;

        self.checkpoint("order")?;
        let ordered = order_paths(
            paths,
            config.machine.start_position,
            config.ordering.preserve_overlap_order,
        );
        debug!(paths = ordered.len(), "ordered paths");

        self.checkpoint("compensate")?;
        let mut compensated = Vec::with_capacity(ordered.len());
        for path in &ordered {
            let (knife, path_warnings) = compensate(path, &config.tool);
            warnings.extend(path_warnings);
            compensated.push(knife);
        }

        self.checkpoint("sequence")?;
        let mut program = sequence(&compensated, &config.tool, &config.machine)?;
        if config.ordering.elide_lifts {
            elide_lifts(&mut program, config.join_tolerance);
        }

        self.checkpoint("emit")?;
        let gcode = post_process(&program, &config.tool, &config.output);
        program.summary.line_count = gcode.line_count();

        info!(
            paths = program.summary.path_count,
            moves = program.moves.len(),
            lines = program.summary.line_count,
            cut_mm = program.summary.cut_length,
            travel_mm = program.summary.travel_length,
            warnings = warnings.len(),
            "compiled program"
        );
        Ok(Compilation {
            program,
            gcode,
            warnings,
            drawing: ordered,
        })
    }
}

/// Compile an in-memory drawing in one call.
pub fn compile_bytes(
    bytes: &[u8],
    format: InputFormat,
    config: &CompilerConfig,
) -> Result<Compilation, CompileError> {
    Compiler::new(config.clone())?.compile_bytes(bytes, format)
}

/// Compile a drawing file in one call.
pub fn compile_file<P: AsRef<Path>>(
    path: P,
    config: &CompilerConfig,
) -> Result<Compilation, CompileError> {
    Compiler::new(config.clone())?.compile_file(path)
}
