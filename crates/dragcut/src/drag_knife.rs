//! Trailing-blade compensation.
//!
//! The blade tip trails the pivot by `trail_offset` along the current heading.
//! To make the tip follow a path, the pivot runs `trail_offset` ahead of it
//! and swivels around each corner on an arc centred at the corner.

use crate::config::ToolProfile;
use crate::error::CompileWarning;
use crate::types::{ArcDirection, PathEntity, ToolState};
use kurbo::{Point, Vec2};
use tracing::warn;

/// Tip segments shorter than this have no usable tangent.
pub const MIN_TANGENT_LENGTH: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutRole {
    /// Straight run that aligns the blade before the path proper.
    LeadIn,
    Path,
    /// Retrace past the closing point so the blade cuts through.
    Overcut,
}

/// One pivot motion of a compensated path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KnifeStep {
    /// Engage the tool at this point, travelling there first if needed.
    ToolDown(Point),
    ToolUp,
    Cut { to: Point, role: CutRole },
    /// Rotate the blade about the corner at `center`.
    Swivel {
        center: Point,
        to: Point,
        direction: ArcDirection,
    },
}

/// Pivot motion for one path, in cutting order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompensatedPath {
    pub source: usize,
    pub tool_state: ToolState,
    pub feed_override: Option<f64>,
    pub steps: Vec<KnifeStep>,
}

impl CompensatedPath {
    /// Where the tool first goes down.
    pub fn entry(&self) -> Option<Point> {
        self.steps.iter().find_map(|step| match step {
            KnifeStep::ToolDown(p) => Some(*p),
            _ => None,
        })
    }
}

/// A straight run of the blade tip.
#[derive(Debug, Clone, Copy)]
struct TipSegment {
    from: Point,
    to: Point,
    heading: Vec2,
    role: CutRole,
}

/// Compensate one path. Paths without a trailing blade pass through as
/// straight moves.
pub fn compensate(path: &PathEntity, tool: &ToolProfile) -> (CompensatedPath, Vec<CompileWarning>) {
    let mut warnings = Vec::new();
    let steps = match path.tool_state {
        ToolState::Cut => knife_steps(path, tool, &mut warnings),
        ToolState::Draw | ToolState::Laser { .. } => direct_steps(path),
    };
    (
        CompensatedPath {
            source: path.source,
            tool_state: path.tool_state,
            feed_override: path.feed_override,
            steps,
        },
        warnings,
    )
}

fn direct_steps(path: &PathEntity) -> Vec<KnifeStep> {
    let mut steps = vec![KnifeStep::ToolDown(path.start())];
    steps.extend(path.segments().map(|(_, to)| KnifeStep::Cut {
        to,
        role: CutRole::Path,
    }));
    steps.push(KnifeStep::ToolUp);
    steps
}

/// Tip vertices with near-coincident points removed.
fn tangent_vertices(path: &PathEntity, warnings: &mut Vec<CompileWarning>) -> Vec<Point> {
    let mut kept: Vec<Point> = Vec::with_capacity(path.polyline.len());
    for (vertex, &p) in path.polyline.iter().enumerate() {
        let degenerate = kept
            .last()
            .is_some_and(|last| last.distance(p) < MIN_TANGENT_LENGTH);
        let closes_loop = path.closed
            && vertex + 1 == path.polyline.len()
            && kept.first().is_some_and(|first| first.distance(p) < MIN_TANGENT_LENGTH);
        if degenerate || closes_loop {
            warn!(path = path.source, vertex, "skipping vertex with degenerate tangent");
            warnings.push(CompileWarning::DegenerateTangent {
                path: path.source,
                vertex,
            });
            continue;
        }
        kept.push(p);
    }
    kept
}

fn tip_segments(vertices: &[Point], closed: bool, overcut: f64) -> Vec<TipSegment> {
    let n = vertices.len();
    let count = if closed { n } else { n - 1 };
    let mut segments: Vec<TipSegment> = (0..count)
        .map(|i| segment(vertices[i], vertices[(i + 1) % n], CutRole::Path))
        .collect();

    if closed {
        // Follow the loop again from its start for the overcut length.
        let mut remaining = overcut;
        let mut i = 0;
        while remaining > MIN_TANGENT_LENGTH && i < 4 * n {
            let from = vertices[i % n];
            let to = vertices[(i + 1) % n];
            let length = from.distance(to);
            if length > remaining {
                let end = from + (to - from) * (remaining / length);
                segments.push(segment(from, end, CutRole::Overcut));
                break;
            }
            segments.push(segment(from, to, CutRole::Overcut));
            remaining -= length;
            i += 1;
        }
    }
    segments
}

fn segment(from: Point, to: Point, role: CutRole) -> TipSegment {
    TipSegment {
        from,
        to,
        heading: (to - from).normalize(),
        role,
    }
}

/// Signed turn from one heading to the next, positive counter-clockwise.
pub fn turn_angle(from: Vec2, to: Vec2) -> f64 {
    from.cross(to).atan2(from.dot(to))
}

fn knife_steps(
    path: &PathEntity,
    tool: &ToolProfile,
    warnings: &mut Vec<CompileWarning>,
) -> Vec<KnifeStep> {
    let vertices = tangent_vertices(path, warnings);
    let closed = path.closed && vertices.len() >= 3;
    if vertices.len() < 2 {
        return Vec::new();
    }

    let d = tool.trail_offset;
    let segments = tip_segments(&vertices, closed, tool.effective_overcut());
    let min_swivel = tool.min_swivel_angle.to_radians();
    let lift = tool.lift_angle.to_radians();

    let first = segments[0];
    let pivot_start = first.from + first.heading * d;
    let lead_in = if closed || tool.compensate_open_paths {
        tool.effective_lead_in()
    } else {
        0.0
    };

    let mut steps = Vec::with_capacity(segments.len() * 2 + 3);
    if lead_in > 0.0 {
        steps.push(KnifeStep::ToolDown(pivot_start - first.heading * lead_in));
        steps.push(KnifeStep::Cut {
            to: pivot_start,
            role: CutRole::LeadIn,
        });
    } else {
        steps.push(KnifeStep::ToolDown(pivot_start));
    }

    for (i, seg) in segments.iter().enumerate() {
        steps.push(KnifeStep::Cut {
            to: seg.to + seg.heading * d,
            role: seg.role,
        });
        let Some(next) = segments.get(i + 1) else {
            break;
        };
        let theta = turn_angle(seg.heading, next.heading);
        if d <= 0.0 || theta.abs() <= min_swivel {
            continue;
        }
        let corner = seg.to;
        let swivel = KnifeStep::Swivel {
            center: corner,
            to: corner + next.heading * d,
            direction: if theta > 0.0 {
                ArcDirection::CounterClockwise
            } else {
                ArcDirection::Clockwise
            },
        };
        if theta.abs() > lift {
            steps.push(KnifeStep::ToolUp);
            steps.push(swivel);
            steps.push(KnifeStep::ToolDown(corner + next.heading * d));
        } else {
            steps.push(swivel);
        }
    }
    steps.push(KnifeStep::ToolUp);
    steps
}
