use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the carriage carries along a path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolState {
    /// Trailing drag knife; the only state that gets offset compensation.
    #[default]
    Cut,
    /// Pen or other tool that draws exactly under the pivot.
    Draw,
    /// Laser module, `power` in `0.0..=1.0`.
    Laser { power: f64 },
}

impl ToolState {
    pub fn is_cut(&self) -> bool {
        matches!(self, ToolState::Cut)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ToolState::Cut => "cut",
            ToolState::Draw => "draw",
            ToolState::Laser { .. } => "laser",
        }
    }
}

/// A flattened path ready for ordering and compensation.
///
/// Holds at least two distinct points. A closed path never repeats its first
/// point at the end; the closing segment is implied.
#[derive(Debug, Clone, PartialEq)]
pub struct PathEntity {
    pub polyline: Vec<Point>,
    pub closed: bool,
    pub tool_state: ToolState,
    pub layer: String,
    /// Per-layer feed rate that replaces the profile feed for this path.
    pub feed_override: Option<f64>,
    /// Document order of the first source element, used for stable tie-breaks.
    pub source: usize,
}

impl PathEntity {
    pub fn start(&self) -> Point {
        self.polyline[0]
    }

    /// Where the tool ends up after following the path once.
    pub fn end(&self) -> Point {
        if self.closed {
            self.polyline[0]
        } else {
            self.polyline[self.polyline.len() - 1]
        }
    }

    /// Segments in travel order, including the implied closing segment.
    pub fn segments(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.polyline.len();
        let count = if self.closed && n > 2 { n } else { n.saturating_sub(1) };
        (0..count).map(move |i| (self.polyline[i], self.polyline[(i + 1) % n]))
    }

    pub fn length(&self) -> f64 {
        self.segments().map(|(a, b)| a.distance(b)).sum()
    }

    pub fn bounds(&self) -> Rect {
        bounds_of(&self.polyline).unwrap_or(Rect::ZERO)
    }
}

/// Bounding box of a point set, `None` when empty.
pub fn bounds_of(points: &[Point]) -> Option<Rect> {
    let (first, rest) = points.split_first()?;
    Some(
        rest.iter()
            .fold(Rect::from_points(*first, *first), |r, p| r.union_pt(*p)),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArcDirection {
    Clockwise,
    CounterClockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolTransition {
    /// Engage the tool; `pass` counts from 1 for multi-pass cuts.
    Down { pass: u32 },
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MoveKind {
    Linear,
    /// Circular move; `center_offset` is relative to the move start.
    Arc {
        center_offset: Vec2,
        direction: ArcDirection,
    },
    ToolChange(ToolTransition),
}

/// One motion primitive of a compiled program.
///
/// Each move starts where the previous one ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Move {
    pub kind: MoveKind,
    pub start: Point,
    pub end: Point,
    pub feed_rate: f64,
    pub tool_state: ToolState,
    /// Whether the tool is engaged once this move completes.
    pub tool_down: bool,
    /// Source index of the path this move belongs to; `None` for the final return.
    pub path: Option<usize>,
}

impl Move {
    pub fn is_tool_change(&self) -> bool {
        matches!(self.kind, MoveKind::ToolChange(_))
    }

    pub fn is_travel(&self) -> bool {
        matches!(self.kind, MoveKind::Linear) && !self.tool_down
    }

    pub fn arc_center(&self) -> Option<Point> {
        match self.kind {
            MoveKind::Arc { center_offset, .. } => Some(self.start + center_offset),
            _ => None,
        }
    }

    /// Signed sweep in radians for arc moves, positive counter-clockwise.
    pub fn sweep(&self) -> Option<f64> {
        let MoveKind::Arc {
            center_offset,
            direction,
        } = self.kind
        else {
            return None;
        };
        let center = self.start + center_offset;
        let a0 = (self.start - center).atan2();
        let a1 = (self.end - center).atan2();
        let tau = std::f64::consts::TAU;
        let ccw = (a1 - a0).rem_euclid(tau);
        Some(match direction {
            ArcDirection::CounterClockwise => ccw,
            ArcDirection::Clockwise => {
                if ccw == 0.0 {
                    0.0
                } else {
                    ccw - tau
                }
            }
        })
    }

    pub fn length(&self) -> f64 {
        match self.kind {
            MoveKind::Linear => self.start.distance(self.end),
            MoveKind::Arc { center_offset, .. } => {
                center_offset.hypot() * self.sweep().unwrap_or(0.0).abs()
            }
            MoveKind::ToolChange(_) => 0.0,
        }
    }

    /// Axis-aligned extent of the move, including arc extremes.
    pub fn extent(&self) -> Rect {
        let mut rect = Rect::from_points(self.start, self.end);
        if let (Some(center), Some(sweep)) = (self.arc_center(), self.sweep()) {
            let radius = (self.start - center).hypot();
            let a0 = (self.start - center).atan2();
            for quadrant in 0..4 {
                let angle = quadrant as f64 * std::f64::consts::FRAC_PI_2;
                let rel = if sweep >= 0.0 {
                    (angle - a0).rem_euclid(std::f64::consts::TAU)
                } else {
                    (a0 - angle).rem_euclid(std::f64::consts::TAU)
                };
                if rel <= sweep.abs() {
                    rect = rect.union_pt(center + Vec2::from_angle(angle) * radius);
                }
            }
        }
        rect
    }
}

/// Aggregate figures for a compiled program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProgramSummary {
    /// Extent of every move, `None` for an empty program.
    pub bounds: Option<Rect>,
    /// Distance covered with the tool engaged.
    pub cut_length: f64,
    /// Distance covered with the tool raised.
    pub travel_length: f64,
    pub path_count: usize,
    pub tool_changes: usize,
    /// Feed-based duration estimate in seconds, ignoring acceleration.
    pub estimated_seconds: f64,
    /// Lines in the emitted program, filled in once it has been rendered.
    pub line_count: usize,
}

/// Ordered motion of a whole job. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CompiledProgram {
    pub moves: Vec<Move>,
    pub summary: ProgramSummary,
}

/// Represents the final G-code output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GCode {
    pub lines: Vec<String>,
}

impl GCode {
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

impl fmt::Display for GCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square() -> PathEntity {
        PathEntity {
            polyline: vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0),
                Point::new(0.0, 10.0),
            ],
            closed: true,
            tool_state: ToolState::Cut,
            layer: "0".to_string(),
            feed_override: None,
            source: 0,
        }
    }

    #[test]
    fn test_closed_path_includes_closing_segment() {
        let path = square();
        assert_eq!(path.segments().count(), 4);
        assert_relative_eq!(path.length(), 40.0);
        assert_eq!(path.end(), path.start());
    }

    #[test]
    fn test_open_path_segments() {
        let mut path = square();
        path.closed = false;
        assert_eq!(path.segments().count(), 3);
        assert_eq!(path.end(), Point::new(0.0, 10.0));
    }

    #[test]
    fn test_arc_sweep_and_length() {
        let mv = Move {
            kind: MoveKind::Arc {
                center_offset: Vec2::new(-1.0, 0.0),
                direction: ArcDirection::CounterClockwise,
            },
            start: Point::new(1.0, 0.0),
            end: Point::new(0.0, 1.0),
            feed_rate: 100.0,
            tool_state: ToolState::Cut,
            tool_down: true,
            path: Some(0),
        };
        assert_relative_eq!(mv.sweep().unwrap(), std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(mv.length(), std::f64::consts::FRAC_PI_2);

        let cw = Move {
            kind: MoveKind::Arc {
                center_offset: Vec2::new(-1.0, 0.0),
                direction: ArcDirection::Clockwise,
            },
            ..mv
        };
        assert_relative_eq!(cw.sweep().unwrap(), -1.5 * std::f64::consts::PI);
    }

    #[test]
    fn test_arc_extent_includes_extremes() {
        // Quarter arc from +Y over -X to -Y passes through (-1, 0).
        let mv = Move {
            kind: MoveKind::Arc {
                center_offset: Vec2::new(0.0, -1.0),
                direction: ArcDirection::CounterClockwise,
            },
            start: Point::new(0.0, 1.0),
            end: Point::new(0.0, -1.0),
            feed_rate: 100.0,
            tool_state: ToolState::Cut,
            tool_down: true,
            path: None,
        };
        let extent = mv.extent();
        assert_relative_eq!(extent.x0, -1.0, epsilon = 1e-12);
        assert_relative_eq!(extent.x1, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gcode_display_ends_with_newline() {
        let gcode = GCode {
            lines: vec!["G21".to_string(), "G90".to_string()],
        };
        assert_eq!(gcode.to_string(), "G21\nG90\n");
        assert_eq!(gcode.line_count(), 2);
    }
}
