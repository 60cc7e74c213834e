//! Turn compensated paths into one flat, bounds-checked move list.

use crate::config::{MachineProfile, ToolProfile};
use crate::drag_knife::{CompensatedPath, KnifeStep};
use crate::error::CompileError;
use crate::types::{
    ArcDirection, CompiledProgram, Move, MoveKind, PathEntity, ProgramSummary, ToolState,
    ToolTransition,
};
use kurbo::{Point, Rect};
use tracing::debug;

/// Accumulates moves while tracking carriage position and tool state.
struct MoveBuilder<'a> {
    tool: &'a ToolProfile,
    resolution: f64,
    moves: Vec<Move>,
    position: Point,
    tool_down: bool,
}

impl<'a> MoveBuilder<'a> {
    fn new(tool: &'a ToolProfile, machine: &MachineProfile) -> Self {
        let resolution = machine.motion_resolution;
        Self {
            tool,
            resolution,
            moves: Vec::new(),
            position: snap_point(machine.start_position, resolution),
            tool_down: false,
        }
    }

    fn snap(&self, p: Point) -> Point {
        snap_point(p, self.resolution)
    }

    fn travel(&mut self, to: Point, path: Option<usize>, tool_state: ToolState) {
        let to = self.snap(to);
        if to == self.position {
            return;
        }
        self.moves.push(Move {
            kind: MoveKind::Linear,
            start: self.position,
            end: to,
            feed_rate: self.tool.travel_feed_rate,
            tool_state,
            tool_down: false,
            path,
        });
        self.position = to;
    }

    fn tool_change(&mut self, transition: ToolTransition, tool_state: ToolState, path: usize) {
        let down = matches!(transition, ToolTransition::Down { .. });
        self.moves.push(Move {
            kind: MoveKind::ToolChange(transition),
            start: self.position,
            end: self.position,
            feed_rate: self.tool.plunge_feed_rate,
            tool_state,
            tool_down: down,
            path: Some(path),
        });
        self.tool_down = down;
    }

    fn linear(&mut self, to: Point, feed_rate: f64, tool_state: ToolState, path: usize) {
        let to = self.snap(to);
        if to == self.position {
            return;
        }
        self.moves.push(Move {
            kind: MoveKind::Linear,
            start: self.position,
            end: to,
            feed_rate,
            tool_state,
            tool_down: self.tool_down,
            path: Some(path),
        });
        self.position = to;
    }

    fn arc(
        &mut self,
        center: Point,
        to: Point,
        direction: ArcDirection,
        feed_rate: f64,
        tool_state: ToolState,
        path: usize,
    ) {
        let to = self.snap(to);
        let center = self.snap(center);
        if to == self.position {
            return;
        }
        self.moves.push(Move {
            kind: MoveKind::Arc {
                center_offset: center - self.position,
                direction,
            },
            start: self.position,
            end: to,
            feed_rate,
            tool_state,
            tool_down: self.tool_down,
            path: Some(path),
        });
        self.position = to;
    }
}

fn snap_point(p: Point, resolution: f64) -> Point {
    let snap = |v: f64| {
        let snapped = (v / resolution).round() * resolution;
        // Keep `-0.0` out of the program.
        if snapped == 0.0 {
            0.0
        } else {
            snapped
        }
    };
    Point::new(snap(p.x), snap(p.y))
}

/// Lay out every path as travel, tool-down, cut and tool-up moves.
///
/// Cut paths repeat once per configured pass. Fails with `OutOfBounds` as
/// soon as any move leaves the working envelope.
pub fn sequence(
    paths: &[CompensatedPath],
    tool: &ToolProfile,
    machine: &MachineProfile,
) -> Result<CompiledProgram, CompileError> {
    let mut builder = MoveBuilder::new(tool, machine);

    for path in paths {
        if path.steps.is_empty() {
            continue;
        }
        let feed = path.feed_override.unwrap_or(tool.feed_rate);
        let swivel_feed = tool.swivel_feed(feed);
        let passes = if path.tool_state.is_cut() {
            tool.passes.max(1)
        } else {
            1
        };
        for pass in 1..=passes {
            for step in &path.steps {
                match *step {
                    KnifeStep::ToolDown(at) => {
                        builder.travel(at, Some(path.source), path.tool_state);
                        builder.tool_change(
                            ToolTransition::Down { pass },
                            path.tool_state,
                            path.source,
                        );
                    }
                    KnifeStep::ToolUp => {
                        builder.tool_change(ToolTransition::Up, path.tool_state, path.source)
                    }
                    KnifeStep::Cut { to, .. } => {
                        builder.linear(to, feed, path.tool_state, path.source)
                    }
                    KnifeStep::Swivel {
                        center,
                        to,
                        direction,
                    } => builder.arc(
                        center,
                        to,
                        direction,
                        swivel_feed,
                        path.tool_state,
                        path.source,
                    ),
                }
            }
        }
    }

    if machine.return_to_start {
        let state = builder
            .moves
            .last()
            .map_or(ToolState::default(), |m| m.tool_state);
        builder.travel(machine.start_position, None, state);
    }

    let moves = builder.moves;
    check_bounds(&moves, machine.working_envelope)?;
    let summary = ProgramSummary {
        path_count: paths.iter().filter(|p| !p.steps.is_empty()).count(),
        ..summarize(&moves)
    };
    debug!(
        moves = moves.len(),
        cut_length = summary.cut_length,
        travel_length = summary.travel_length,
        "sequenced program"
    );
    Ok(CompiledProgram { moves, summary })
}

fn inside(envelope: Rect, p: Point) -> bool {
    const SLACK: f64 = 1e-9;
    p.x >= envelope.x0 - SLACK
        && p.x <= envelope.x1 + SLACK
        && p.y >= envelope.y0 - SLACK
        && p.y <= envelope.y1 + SLACK
}

/// Fail on the first drawing vertex outside the envelope.
///
/// The blade tip trails the carriage, so a path end can lie outside while
/// every carriage position stays inside.
pub fn check_path_bounds(paths: &[PathEntity], envelope: Rect) -> Result<(), CompileError> {
    for path in paths {
        if let Some(p) = path.polyline.iter().find(|p| !inside(envelope, **p)) {
            return Err(CompileError::OutOfBounds {
                move_index: None,
                x: p.x,
                y: p.y,
                path: Some(path.source),
            });
        }
    }
    Ok(())
}

fn check_bounds(moves: &[Move], envelope: Rect) -> Result<(), CompileError> {
    for (move_index, mv) in moves.iter().enumerate() {
        let extent = mv.extent();
        let corners = [
            mv.start,
            mv.end,
            Point::new(extent.x0, extent.y0),
            Point::new(extent.x1, extent.y1),
        ];
        if let Some(p) = corners.into_iter().find(|p| !inside(envelope, *p)) {
            return Err(CompileError::OutOfBounds {
                move_index: Some(move_index),
                x: p.x,
                y: p.y,
                path: mv.path,
            });
        }
    }
    Ok(())
}

/// Keep pen or laser engaged between paths that touch.
///
/// A tool-up, optional travel and tool-down of the same non-cutting tool
/// collapse into one engaged move when the gap is at most `tolerance`.
/// Returns the number of lifts removed.
pub fn elide_lifts(program: &mut CompiledProgram, tolerance: f64) -> usize {
    let moves = std::mem::take(&mut program.moves);
    let mut kept = Vec::with_capacity(moves.len());
    let mut elided = 0;
    let mut i = 0;
    while i < moves.len() {
        match lift_bridge(&moves[i..], tolerance) {
            Some((consumed, bridge)) => {
                kept.extend(bridge);
                elided += 1;
                i += consumed;
            }
            None => {
                kept.push(moves[i]);
                i += 1;
            }
        }
    }
    if elided > 0 {
        debug!(elided, "kept tool engaged between touching paths");
        program.summary = ProgramSummary {
            path_count: program.summary.path_count,
            line_count: program.summary.line_count,
            ..summarize(&kept)
        };
    }
    program.moves = kept;
    elided
}

/// Moves consumed and the engaged move replacing them, if the window starts
/// with a removable lift.
fn lift_bridge(window: &[Move], tolerance: f64) -> Option<(usize, Option<Move>)> {
    let up = window.first()?;
    if up.kind != MoveKind::ToolChange(ToolTransition::Up) || up.tool_state.is_cut() {
        return None;
    }
    let down_index = if window.get(1)?.is_travel() { 2 } else { 1 };
    let down = window.get(down_index)?;
    if !matches!(down.kind, MoveKind::ToolChange(ToolTransition::Down { .. }))
        || down.tool_state != up.tool_state
        || up.end.distance(down.start) > tolerance
    {
        return None;
    }
    let bridge = (down_index == 2).then(|| {
        let feed_rate = window
            .get(down_index + 1)
            .filter(|m| m.tool_down)
            .map_or(window[1].feed_rate, |m| m.feed_rate);
        Move {
            kind: MoveKind::Linear,
            start: up.end,
            end: down.start,
            feed_rate,
            tool_state: down.tool_state,
            tool_down: true,
            path: down.path,
        }
    });
    Some((down_index + 1, bridge))
}

fn summarize(moves: &[Move]) -> ProgramSummary {
    let mut summary = ProgramSummary::default();
    for mv in moves {
        let extent = mv.extent();
        summary.bounds = Some(match summary.bounds {
            Some(bounds) => bounds.union(extent),
            None => extent,
        });
        if mv.is_tool_change() {
            summary.tool_changes += 1;
            continue;
        }
        let length = mv.length();
        if mv.tool_down {
            summary.cut_length += length;
        } else {
            summary.travel_length += length;
        }
        if mv.feed_rate > 0.0 {
            summary.estimated_seconds += length / mv.feed_rate * 60.0;
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drag_knife::CutRole;

    fn knife_path(steps: Vec<KnifeStep>) -> CompensatedPath {
        CompensatedPath {
            source: 0,
            tool_state: ToolState::Cut,
            feed_override: None,
            steps,
        }
    }

    fn machine() -> MachineProfile {
        MachineProfile {
            working_envelope: Rect::new(0.0, 0.0, 100.0, 100.0),
            ..MachineProfile::default()
        }
    }

    fn simple_steps() -> Vec<KnifeStep> {
        vec![
            KnifeStep::ToolDown(Point::new(10.0, 10.0)),
            KnifeStep::Cut {
                to: Point::new(20.0, 10.0),
                role: CutRole::Path,
            },
            KnifeStep::ToolUp,
        ]
    }

    #[test]
    fn test_moves_are_continuous() {
        let program = sequence(
            &[knife_path(simple_steps())],
            &ToolProfile::default(),
            &machine(),
        )
        .unwrap();
        for pair in program.moves.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(program.moves.first().unwrap().start, Point::ORIGIN);
        assert_eq!(program.moves.last().unwrap().end, Point::ORIGIN);
    }

    #[test]
    fn test_move_kinds_in_order() {
        let program = sequence(
            &[knife_path(simple_steps())],
            &ToolProfile::default(),
            &machine(),
        )
        .unwrap();
        let kinds: Vec<MoveKind> = program.moves.iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MoveKind::Linear,
                MoveKind::ToolChange(ToolTransition::Down { pass: 1 }),
                MoveKind::Linear,
                MoveKind::ToolChange(ToolTransition::Up),
                MoveKind::Linear,
            ]
        );
        assert!(program.moves[0].is_travel());
        assert!(program.moves[2].tool_down);
        assert_eq!(program.summary.cut_length, 10.0);
    }

    #[test]
    fn test_feed_override_and_passes() {
        let tool = ToolProfile {
            passes: 2,
            ..ToolProfile::default()
        };
        let mut path = knife_path(simple_steps());
        path.feed_override = Some(250.0);
        let program = sequence(&[path], &tool, &machine()).unwrap();
        let downs: Vec<u32> = program
            .moves
            .iter()
            .filter_map(|m| match m.kind {
                MoveKind::ToolChange(ToolTransition::Down { pass }) => Some(pass),
                _ => None,
            })
            .collect();
        assert_eq!(downs, vec![1, 2]);
        assert!(program
            .moves
            .iter()
            .filter(|m| m.tool_down && m.kind == MoveKind::Linear)
            .all(|m| m.feed_rate == 250.0));
    }

    #[test]
    fn test_coordinates_snap_to_resolution() {
        let steps = vec![
            KnifeStep::ToolDown(Point::new(10.00049, 10.0)),
            KnifeStep::Cut {
                to: Point::new(10.0004, 10.0),
                role: CutRole::Path,
            },
            KnifeStep::Cut {
                to: Point::new(12.3456, 10.0),
                role: CutRole::Path,
            },
            KnifeStep::ToolUp,
        ];
        let program = sequence(&[knife_path(steps)], &ToolProfile::default(), &machine()).unwrap();
        let cuts: Vec<&Move> = program
            .moves
            .iter()
            .filter(|m| m.tool_down && m.kind == MoveKind::Linear)
            .collect();
        // The first cut collapses to zero length and is dropped.
        assert_eq!(cuts.len(), 1);
        assert!((cuts[0].end.x - 12.346).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_bounds_is_fatal() {
        let steps = vec![
            KnifeStep::ToolDown(Point::new(10.0, 10.0)),
            KnifeStep::Cut {
                to: Point::new(150.0, 10.0),
                role: CutRole::Path,
            },
            KnifeStep::ToolUp,
        ];
        let err = sequence(&[knife_path(steps)], &ToolProfile::default(), &machine()).unwrap_err();
        match err {
            CompileError::OutOfBounds {
                move_index, x, path, ..
            } => {
                assert_eq!(move_index, Some(2));
                assert!((x - 150.0).abs() < 1e-9);
                assert_eq!(path, Some(0));
            }
            other => panic!("expected OutOfBounds, got {other:?}"),
        }
    }

    #[test]
    fn test_arc_bulging_outside_is_caught() {
        let steps = vec![
            KnifeStep::ToolDown(Point::new(0.3, 1.0)),
            KnifeStep::Swivel {
                center: Point::new(0.3, 0.5),
                to: Point::new(0.3, 0.0),
                direction: ArcDirection::CounterClockwise,
            },
            KnifeStep::ToolUp,
        ];
        let err = sequence(&[knife_path(steps)], &ToolProfile::default(), &machine()).unwrap_err();
        assert!(matches!(err, CompileError::OutOfBounds {
                move_index: Some(2),
                ..
            }));
    }

    #[test]
    fn test_vertex_outside_envelope_is_reported_with_its_path() {
        let inside_path = PathEntity {
            polyline: vec![Point::new(10.0, 10.0), Point::new(20.0, 10.0)],
            closed: false,
            tool_state: ToolState::Cut,
            layer: "0".to_string(),
            feed_override: None,
            source: 3,
        };
        let mut outside = inside_path.clone();
        outside.source = 5;
        outside.polyline[0] = Point::new(-0.3, 50.0);

        let envelope = machine().working_envelope;
        assert!(check_path_bounds(std::slice::from_ref(&inside_path), envelope).is_ok());
        match check_path_bounds(&[inside_path, outside], envelope) {
            Err(CompileError::OutOfBounds {
                move_index: None,
                x,
                path: Some(5),
                ..
            }) => assert!((x + 0.3).abs() < 1e-12),
            other => panic!("expected OutOfBounds for path 5, got {other:?}"),
        }
    }

    fn pen_path(source: usize, from: Point, to: Point) -> CompensatedPath {
        CompensatedPath {
            source,
            tool_state: ToolState::Draw,
            feed_override: Some(400.0),
            steps: vec![
                KnifeStep::ToolDown(from),
                KnifeStep::Cut {
                    to,
                    role: CutRole::Path,
                },
                KnifeStep::ToolUp,
            ],
        }
    }

    #[test]
    fn test_touching_pen_paths_stay_engaged() {
        let paths = [
            pen_path(0, Point::new(10.0, 10.0), Point::new(20.0, 10.0)),
            pen_path(1, Point::new(20.005, 10.0), Point::new(20.0, 20.0)),
            pen_path(2, Point::new(50.0, 50.0), Point::new(60.0, 50.0)),
        ];
        let mut program = sequence(&paths, &ToolProfile::default(), &machine()).unwrap();
        let before = program.summary.tool_changes;

        assert_eq!(elide_lifts(&mut program, 0.01), 1);
        assert_eq!(program.summary.tool_changes, before - 2);
        assert_eq!(program.summary.path_count, 3);
        for pair in program.moves.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        let bridge = program
            .moves
            .iter()
            .find(|m| {
                m.tool_down && m.path == Some(1) && m.start.distance(Point::new(20.0, 10.0)) < 1e-9
            })
            .unwrap();
        assert!(bridge.end.distance(Point::new(20.005, 10.0)) < 1e-9);
        assert_eq!(bridge.feed_rate, 400.0);
        assert_eq!(bridge.path, Some(1));
    }

    #[test]
    fn test_knife_lifts_are_never_elided() {
        let steps = |from: Point, to: Point| {
            vec![
                KnifeStep::ToolDown(from),
                KnifeStep::Cut {
                    to,
                    role: CutRole::Path,
                },
                KnifeStep::ToolUp,
            ]
        };
        let mut second = knife_path(steps(Point::new(20.0, 10.0), Point::new(20.0, 20.0)));
        second.source = 1;
        let first = knife_path(steps(Point::new(10.0, 10.0), Point::new(20.0, 10.0)));
        let mut program = sequence(&[first, second], &ToolProfile::default(), &machine()).unwrap();
        let moves = program.moves.clone();
        assert_eq!(elide_lifts(&mut program, 0.01), 0);
        assert_eq!(program.moves, moves);
    }
}
