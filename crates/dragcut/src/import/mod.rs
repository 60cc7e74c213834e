//! Geometry importers: SVG and DXF to typed primitives in millimetres, Y up.

mod dxf;
mod path_data;
mod svg;
mod transform;
mod units;

pub use self::dxf::import_dxf;
pub use path_data::{parse_path_data, PathDataError, Subpath};
pub use svg::import_svg;
pub use transform::parse_transform;
pub use units::{parse_length, Length, LengthUnit};

use crate::config::{ImportOptions, LayerRule};
use crate::error::{CompileWarning, ImportError, SourceLocation};
use crate::geometry::Primitive;
use crate::types::ToolState;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Layer used for entities outside any named layer.
pub const DEFAULT_LAYER: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Svg,
    Dxf,
}

impl InputFormat {
    /// Guess the format from a file extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "svg" => Some(InputFormat::Svg),
            "dxf" => Some(InputFormat::Dxf),
            _ => None,
        }
    }

    /// Guess the format from the first bytes of the content.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(1024)]);
        let trimmed = head.trim_start_matches('\u{feff}').trim_start();
        if trimmed.starts_with('<') && head.contains("<svg") {
            return Some(InputFormat::Svg);
        }
        let mut lines = trimmed.lines().map(str::trim);
        if lines.next() == Some("0") && lines.next() == Some("SECTION") {
            return Some(InputFormat::Dxf);
        }
        None
    }
}

/// One connected run of primitives from the drawing.
///
/// Primitives are contiguous; a closed path ends where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedPath {
    pub primitives: Vec<Primitive>,
    pub closed: bool,
    pub layer: String,
    /// Stroke colour as `#rrggbb` when known.
    pub color: Option<String>,
    pub tool_state: ToolState,
    pub feed_override: Option<f64>,
    /// Position in document order.
    pub source: usize,
    pub location: SourceLocation,
}

/// Result of importing one drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedDocument {
    pub format: InputFormat,
    /// Paths grouped by layer name.
    pub layers: BTreeMap<String, Vec<ImportedPath>>,
    /// Page size in mm, when the format declares one.
    pub size: Option<(f64, f64)>,
    pub warnings: Vec<CompileWarning>,
}

impl ImportedDocument {
    pub fn path_count(&self) -> usize {
        self.layers.values().map(Vec::len).sum()
    }

    /// All paths in document order.
    pub fn into_paths(self) -> Vec<ImportedPath> {
        let mut paths: Vec<ImportedPath> = self.layers.into_values().flatten().collect();
        paths.sort_by_key(|p| p.source);
        paths
    }
}

/// Collects paths while an importer walks the drawing.
pub(crate) struct DocumentBuilder<'a> {
    options: &'a ImportOptions,
    format: InputFormat,
    layers: BTreeMap<String, Vec<ImportedPath>>,
    warnings: Vec<CompileWarning>,
    next_source: usize,
}

impl<'a> DocumentBuilder<'a> {
    pub(crate) fn new(format: InputFormat, options: &'a ImportOptions) -> Self {
        Self {
            options,
            format,
            layers: BTreeMap::new(),
            warnings: Vec::new(),
            next_source: 0,
        }
    }

    pub(crate) fn push(
        &mut self,
        primitives: Vec<Primitive>,
        closed: bool,
        layer: &str,
        color: Option<String>,
        location: SourceLocation,
    ) {
        if primitives.is_empty() {
            return;
        }
        let LayerRule {
            tool_state,
            feed_rate,
        } = self.options.tool_map.resolve(layer, color.as_deref());
        let path = ImportedPath {
            primitives,
            closed,
            layer: layer.to_string(),
            color,
            tool_state,
            feed_override: feed_rate,
            source: self.next_source,
            location,
        };
        self.next_source += 1;
        self.layers.entry(path.layer.clone()).or_default().push(path);
    }

    /// Fail on an unsupported entity, or skip it when the options allow.
    pub(crate) fn unsupported(
        &mut self,
        kind: &str,
        location: SourceLocation,
    ) -> Result<(), ImportError> {
        if !self.options.skip_unsupported {
            return Err(ImportError::UnsupportedGeometry {
                kind: kind.to_string(),
                location,
            });
        }
        warn!(kind, %location, "skipping unsupported entity");
        self.warnings.push(CompileWarning::SkippedElement {
            kind: kind.to_string(),
            location,
        });
        Ok(())
    }

    pub(crate) fn finish(self, size: Option<(f64, f64)>) -> ImportedDocument {
        debug!(
            format = ?self.format,
            paths = self.next_source,
            layers = self.layers.len(),
            "import finished"
        );
        ImportedDocument {
            format: self.format,
            layers: self.layers,
            size,
            warnings: self.warnings,
        }
    }
}

/// Import an in-memory drawing.
pub fn import_bytes(
    bytes: &[u8],
    format: InputFormat,
    options: &ImportOptions,
) -> Result<ImportedDocument, ImportError> {
    match format {
        InputFormat::Svg => {
            let text = std::str::from_utf8(bytes).map_err(|e| ImportError::MalformedInput {
                location: SourceLocation::with_offset(0, e.valid_up_to()),
                reason: format!("SVG is not valid UTF-8: {e}"),
            })?;
            import_svg(text, options)
        }
        InputFormat::Dxf => import_dxf(bytes, options),
    }
}

/// Read and import a drawing file, detecting its format.
pub fn import_file<P: AsRef<Path>>(
    path: P,
    options: &ImportOptions,
) -> Result<ImportedDocument, ImportError> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let format = InputFormat::from_path(path)
        .or_else(|| InputFormat::sniff(&bytes))
        .ok_or_else(|| ImportError::MalformedInput {
            location: SourceLocation::default(),
            reason: format!("cannot tell whether {} is SVG or DXF", path.display()),
        })?;
    import_bytes(&bytes, format, options)
}
