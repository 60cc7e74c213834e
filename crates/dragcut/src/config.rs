use crate::error::CompileError;
use crate::import::LengthUnit;
use crate::types::ToolState;
use anyhow::{anyhow, Context, Result};
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything a compilation run needs besides the drawing itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Maximum distance between a curve and its flattened polyline, in mm.
    pub chord_tolerance: f64,
    /// Endpoints closer than this are treated as connected, in mm.
    pub join_tolerance: f64,
    /// Paths shorter than this are dropped, in mm.
    pub min_segment_length: f64,
    /// Hard bound on curve bisection depth.
    pub max_subdivision_depth: u32,
    /// Fail instead of warning once this many curve pieces hit the depth bound.
    pub max_flatten_divergences: Option<usize>,
    pub tool: ToolProfile,
    pub machine: MachineProfile,
    pub placement: Placement,
    pub ordering: OrderingOptions,
    pub import: ImportOptions,
    pub output: OutputOptions,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            chord_tolerance: 0.05,
            join_tolerance: 0.01,
            min_segment_length: 0.1,
            max_subdivision_depth: 16,
            max_flatten_divergences: None,
            tool: ToolProfile::default(),
            machine: MachineProfile::default(),
            placement: Placement::default(),
            ordering: OrderingOptions::default(),
            import: ImportOptions::default(),
            output: OutputOptions::default(),
        }
    }
}

/// Blade geometry, heights and feeds. Read-only during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolProfile {
    /// Distance from the pivot axis to the blade tip, in mm.
    pub trail_offset: f64,
    /// Turns at or below this angle (degrees) get no swivel.
    pub min_swivel_angle: f64,
    /// Turns above this angle (degrees) swivel with the blade lifted.
    pub lift_angle: f64,
    /// Lead-in length; never shorter than `trail_offset`.
    pub lead_in_length: Option<f64>,
    /// Overcut length past the closing point; never shorter than `trail_offset`.
    pub overcut_length: Option<f64>,
    /// Give open cut paths a lead-in as well.
    pub compensate_open_paths: bool,
    pub feed_rate: f64,
    pub travel_feed_rate: f64,
    pub plunge_feed_rate: f64,
    /// Feed for swivel arcs, defaults to the path feed.
    pub swivel_feed_rate: Option<f64>,
    /// Z height with the tool raised.
    pub up_z: f64,
    /// Z where the blade touches the material.
    pub surface_z: f64,
    /// Final cutting depth.
    pub cut_z: f64,
    /// Z for pen work.
    pub draw_z: f64,
    /// Number of passes from `surface_z` down to `cut_z`.
    pub passes: u32,
    /// Laser power at `power = 1.0`, e.g. the spindle `S` maximum.
    pub laser_power_scale: f64,
    pub commands: ToolCommands,
}

impl Default for ToolProfile {
    fn default() -> Self {
        Self {
            trail_offset: 0.5,
            min_swivel_angle: 5.0,
            lift_angle: 45.0,
            lead_in_length: None,
            overcut_length: None,
            compensate_open_paths: false,
            feed_rate: 1000.0,
            travel_feed_rate: 10000.0,
            plunge_feed_rate: 500.0,
            swivel_feed_rate: None,
            up_z: 5.0,
            surface_z: 0.0,
            cut_z: -0.1,
            draw_z: 0.0,
            passes: 1,
            laser_power_scale: 1000.0,
            commands: ToolCommands::default(),
        }
    }
}

impl ToolProfile {
    pub fn effective_lead_in(&self) -> f64 {
        self.lead_in_length.unwrap_or(0.0).max(self.trail_offset)
    }

    pub fn effective_overcut(&self) -> f64 {
        self.overcut_length.unwrap_or(0.0).max(self.trail_offset)
    }

    pub fn swivel_feed(&self, path_feed: f64) -> f64 {
        self.swivel_feed_rate.unwrap_or(path_feed)
    }

    /// Cutting depth for a one-based pass number.
    pub fn pass_depth(&self, pass: u32) -> f64 {
        let passes = self.passes.max(1);
        let pass = pass.clamp(1, passes);
        self.surface_z + (self.cut_z - self.surface_z) * f64::from(pass) / f64::from(passes)
    }
}

/// Command templates for engaging and raising each tool state.
///
/// `{z}`, `{feed}` and `{power}` are substituted at emission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolCommands {
    pub cut_down: String,
    pub cut_up: String,
    pub draw_down: String,
    pub draw_up: String,
    pub laser_on: String,
    pub laser_off: String,
}

impl Default for ToolCommands {
    fn default() -> Self {
        Self {
            cut_down: "G1 Z{z} F{feed}".to_string(),
            cut_up: "G0 Z{z}".to_string(),
            draw_down: "G1 Z{z} F{feed}".to_string(),
            draw_up: "G0 Z{z}".to_string(),
            laser_on: "M3 S{power}".to_string(),
            laser_off: "M5".to_string(),
        }
    }
}

/// Properties of the stage the program runs on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineProfile {
    /// Reachable XY area in mm.
    pub working_envelope: Rect,
    /// Step size every coordinate is snapped to, in mm.
    pub motion_resolution: f64,
    /// Carriage position when the program starts.
    pub start_position: Point,
    /// Travel back to `start_position` at the end of the program.
    pub return_to_start: bool,
}

impl Default for MachineProfile {
    fn default() -> Self {
        Self {
            working_envelope: Rect::new(0.0, 0.0, 180.0, 180.0),
            motion_resolution: 0.001,
            start_position: Point::ORIGIN,
            return_to_start: true,
        }
    }
}

/// Where the drawing lands on the bed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Placement {
    /// Move the drawing's lower-left corner to the origin first.
    pub align_to_origin: bool,
    pub mirror_x: bool,
    pub mirror_y: bool,
    pub offset: Vec2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderingOptions {
    /// Crossing paths that are not nested keep their document order.
    pub preserve_overlap_order: bool,
    /// Pen and laser stay engaged across gaps up to the join tolerance.
    pub elide_lifts: bool,
}

impl Default for OrderingOptions {
    fn default() -> Self {
        Self {
            preserve_overlap_order: true,
            elide_lifts: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ImportOptions {
    /// Units for drawings that do not declare a resolvable size.
    pub assume_units: Option<LengthUnit>,
    /// Skip unsupported entities with a warning instead of failing.
    pub skip_unsupported: bool,
    pub tool_map: ToolStateMap,
}

/// Tool state and feed chosen for a layer or colour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LayerRule {
    pub tool_state: ToolState,
    pub feed_rate: Option<f64>,
}

/// Explicit mapping from layer names and stroke colours to tool states.
///
/// A layer rule wins over a colour rule, which wins over the default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ToolStateMap {
    pub layers: BTreeMap<String, LayerRule>,
    /// Keys are `#rrggbb`, matched case-insensitively.
    pub colors: BTreeMap<String, LayerRule>,
    pub default: LayerRule,
}

impl ToolStateMap {
    pub fn resolve(&self, layer: &str, color: Option<&str>) -> LayerRule {
        if let Some(rule) = self.layers.get(layer) {
            return *rule;
        }
        if let Some(color) = color {
            let color = color.to_ascii_lowercase();
            if let Some(rule) = self
                .colors
                .iter()
                .find(|(key, _)| key.to_ascii_lowercase() == color)
                .map(|(_, rule)| rule)
            {
                return *rule;
            }
        }
        self.default
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Positioning {
    #[default]
    Absolute,
    Relative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Digits after the decimal point for every coordinate.
    pub decimal_precision: u32,
    pub positioning: Positioning,
    /// Emit `G92 X0 Y0` so the program starts at the current carriage position.
    pub set_origin: bool,
    pub header_lines: Vec<String>,
    pub footer_lines: Vec<String>,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            decimal_precision: 3,
            positioning: Positioning::Absolute,
            set_origin: false,
            header_lines: Vec::new(),
            footer_lines: vec!["M2".to_string()],
        }
    }
}

impl CompilerConfig {
    /// Load a configuration from the provided path. Missing files yield the defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
        let config: CompilerConfig = serde_json::from_slice(&data)
            .with_context(|| format!("deserialize config {}", path.display()))?;
        Ok(config)
    }

    /// Persist the configuration to the provided path, ensuring the directory exists.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create config directory {}", parent.display()))?;
        }

        let data = serde_json::to_vec_pretty(self).context("serialize config to JSON bytes")?;
        fs::write(path, data).with_context(|| format!("write config {}", path.display()))
    }

    /// Resolve the default config path (`~/.dragcut/profile.json`).
    pub fn default_config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
        Ok(home.join(".dragcut").join("profile.json"))
    }

    /// Reject settings the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), CompileError> {
        let invalid = |msg: String| Err(CompileError::InvalidConfig(msg));

        for (name, value) in [
            ("chord_tolerance", self.chord_tolerance),
            ("join_tolerance", self.join_tolerance),
            ("machine.motion_resolution", self.machine.motion_resolution),
            ("tool.feed_rate", self.tool.feed_rate),
            ("tool.travel_feed_rate", self.tool.travel_feed_rate),
            ("tool.plunge_feed_rate", self.tool.plunge_feed_rate),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return invalid(format!("{name} must be positive, got {value}"));
            }
        }
        if !(self.min_segment_length.is_finite() && self.min_segment_length >= 0.0) {
            return invalid(format!(
                "min_segment_length must not be negative, got {}",
                self.min_segment_length
            ));
        }
        if !(self.tool.trail_offset.is_finite() && self.tool.trail_offset >= 0.0) {
            return invalid(format!(
                "tool.trail_offset must not be negative, got {}",
                self.tool.trail_offset
            ));
        }
        for (name, value) in [
            ("tool.min_swivel_angle", self.tool.min_swivel_angle),
            ("tool.lift_angle", self.tool.lift_angle),
        ] {
            if !(0.0..=180.0).contains(&value) {
                return invalid(format!("{name} must lie in [0, 180], got {value}"));
            }
        }
        for (name, value) in [
            ("tool.lead_in_length", self.tool.lead_in_length),
            ("tool.overcut_length", self.tool.overcut_length),
            ("tool.swivel_feed_rate", self.tool.swivel_feed_rate),
        ] {
            if let Some(value) = value {
                if !(value.is_finite() && value >= 0.0) {
                    return invalid(format!("{name} must not be negative, got {value}"));
                }
            }
        }
        if self.tool.passes == 0 {
            return invalid("tool.passes must be at least 1".to_string());
        }
        if self.max_subdivision_depth == 0 || self.max_subdivision_depth > 48 {
            return invalid(format!(
                "max_subdivision_depth must lie in [1, 48], got {}",
                self.max_subdivision_depth
            ));
        }
        let envelope = self.machine.working_envelope;
        if !(envelope.width() > 0.0 && envelope.height() > 0.0) {
            return invalid(format!("machine.working_envelope is empty: {envelope:?}"));
        }
        if self.output.decimal_precision > 6 {
            return invalid(format!(
                "output.decimal_precision must be at most 6, got {}",
                self.output.decimal_precision
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(CompilerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_lead_in_never_shorter_than_trail_offset() {
        let mut tool = ToolProfile {
            trail_offset: 0.8,
            lead_in_length: Some(0.2),
            ..ToolProfile::default()
        };
        assert_eq!(tool.effective_lead_in(), 0.8);
        assert_eq!(tool.effective_overcut(), 0.8);
        tool.lead_in_length = Some(2.0);
        assert_eq!(tool.effective_lead_in(), 2.0);
    }

    #[test]
    fn test_pass_depths_step_down_to_cut_z() {
        let tool = ToolProfile {
            surface_z: 0.0,
            cut_z: -0.3,
            passes: 3,
            ..ToolProfile::default()
        };
        assert!((tool.pass_depth(1) + 0.1).abs() < 1e-12);
        assert!((tool.pass_depth(3) + 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_tool_map_precedence() {
        let mut map = ToolStateMap::default();
        map.colors.insert(
            "#FF0000".to_string(),
            LayerRule {
                tool_state: ToolState::Draw,
                feed_rate: None,
            },
        );
        map.layers.insert(
            "engrave".to_string(),
            LayerRule {
                tool_state: ToolState::Laser { power: 0.5 },
                feed_rate: Some(300.0),
            },
        );

        assert_eq!(
            map.resolve("engrave", Some("#ff0000")).tool_state,
            ToolState::Laser { power: 0.5 }
        );
        assert_eq!(map.resolve("0", Some("#ff0000")).tool_state, ToolState::Draw);
        assert_eq!(map.resolve("0", None).tool_state, ToolState::Cut);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = CompilerConfig::default();
        config.tool.trail_offset = -1.0;
        assert!(matches!(
            config.validate(),
            Err(CompileError::InvalidConfig(_))
        ));

        let mut config = CompilerConfig::default();
        config.tool.passes = 0;
        assert!(config.validate().is_err());

        let mut config = CompilerConfig::default();
        config.machine.working_envelope = Rect::new(0.0, 0.0, 0.0, 10.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: CompilerConfig =
            serde_json::from_str(r#"{ "tool": { "trail_offset": 0.25 } }"#).unwrap();
        assert_eq!(config.tool.trail_offset, 0.25);
        assert_eq!(config.tool.feed_rate, 1000.0);
        assert_eq!(config.output.decimal_precision, 3);
    }
}
