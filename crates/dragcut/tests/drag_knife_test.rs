use approx::assert_relative_eq;
use dragcut::*;
use kurbo::Point;

fn entity(points: &[(f64, f64)], closed: bool, tool_state: ToolState) -> PathEntity {
    PathEntity {
        polyline: points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        closed,
        tool_state,
        layer: "0".to_string(),
        feed_override: None,
        source: 7,
    }
}

/// Blade-tip positions at the end of each `Path` cut, recovered from the
/// pivot motion.
fn tip_vertices(steps: &[KnifeStep], trail_offset: f64) -> Vec<Point> {
    let mut tips = Vec::new();
    let mut pivot = None;
    for step in steps {
        match *step {
            KnifeStep::ToolDown(at) => pivot = Some(at),
            KnifeStep::Swivel { to, .. } => pivot = Some(to),
            KnifeStep::Cut { to, role } => {
                if let (Some(from), CutRole::Path) = (pivot, role) {
                    let heading = (to - from).normalize();
                    tips.push(to - heading * trail_offset);
                }
                pivot = Some(to);
            }
            KnifeStep::ToolUp => {}
        }
    }
    tips
}

#[test]
fn test_tip_follows_closed_outline() {
    let triangle = entity(&[(0.0, 0.0), (20.0, 0.0), (10.0, 15.0)], true, ToolState::Cut);
    let tool = ToolProfile {
        trail_offset: 0.5,
        ..ToolProfile::default()
    };
    let (out, warnings) = compensate(&triangle, &tool);
    assert!(warnings.is_empty());

    let tips = tip_vertices(&out.steps, 0.5);
    let expected = [(20.0, 0.0), (10.0, 15.0), (0.0, 0.0)];
    assert_eq!(tips.len(), expected.len());
    for (tip, (x, y)) in tips.iter().zip(expected) {
        assert_relative_eq!(tip.x, x, epsilon = 1e-9);
        assert_relative_eq!(tip.y, y, epsilon = 1e-9);
    }
}

#[test]
fn test_sharp_corners_are_lifted_and_reengage_at_the_corner() {
    let triangle = entity(&[(0.0, 0.0), (20.0, 0.0), (10.0, 15.0)], true, ToolState::Cut);
    let (out, _) = compensate(&triangle, &ToolProfile::default());
    let downs = out
        .steps
        .iter()
        .filter(|s| matches!(s, KnifeStep::ToolDown(_)))
        .count();
    // Initial engage plus one per corner, the closing corner included.
    assert_eq!(downs, 4);
    for window in out.steps.windows(3) {
        if let [KnifeStep::ToolUp, KnifeStep::Swivel { to, .. }, KnifeStep::ToolDown(at)] = window {
            assert_eq!(to, at, "The blade goes down where the swivel ends");
        }
    }
}

#[test]
fn test_swivel_direction_follows_turn() {
    let left = entity(&[(0.0, 0.0), (10.0, 0.0), (15.0, 1.0)], false, ToolState::Cut);
    let right = entity(&[(0.0, 0.0), (10.0, 0.0), (15.0, -1.0)], false, ToolState::Cut);
    let tool = ToolProfile::default();
    let direction = |path: &PathEntity| {
        compensate(path, &tool)
            .0
            .steps
            .iter()
            .find_map(|s| match s {
                KnifeStep::Swivel { direction, .. } => Some(*direction),
                _ => None,
            })
    };
    assert_eq!(direction(&left), Some(ArcDirection::CounterClockwise));
    assert_eq!(direction(&right), Some(ArcDirection::Clockwise));
}

#[test]
fn test_lead_in_never_shorter_than_trail_offset() {
    let square = entity(
        &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)],
        true,
        ToolState::Cut,
    );
    for (configured, expected) in [(Some(0.1), 0.5), (Some(3.0), 3.0), (None, 0.5)] {
        let tool = ToolProfile {
            trail_offset: 0.5,
            lead_in_length: configured,
            ..ToolProfile::default()
        };
        let (out, _) = compensate(&square, &tool);
        let (KnifeStep::ToolDown(start), KnifeStep::Cut { to, role }) = (out.steps[0], out.steps[1])
        else {
            panic!("path should start with tool-down and lead-in");
        };
        assert_eq!(role, CutRole::LeadIn);
        assert_relative_eq!(start.distance(to), expected, epsilon = 1e-9);
    }
}

#[test]
fn test_overcut_reaches_past_the_closing_point() {
    let square = entity(
        &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)],
        true,
        ToolState::Cut,
    );
    let tool = ToolProfile {
        trail_offset: 0.5,
        overcut_length: Some(12.0),
        ..ToolProfile::default()
    };
    let (out, _) = compensate(&square, &tool);
    let overcut: f64 = {
        let mut pivot = Point::ORIGIN;
        let mut total = 0.0;
        for step in &out.steps {
            match *step {
                KnifeStep::ToolDown(at) => pivot = at,
                KnifeStep::Swivel { to, .. } => pivot = to,
                KnifeStep::Cut { to, role } => {
                    if role == CutRole::Overcut {
                        total += pivot.distance(to);
                    }
                    pivot = to;
                }
                KnifeStep::ToolUp => {}
            }
        }
        total
    };
    // The overcut turns the first corner; each run is measured pivot to pivot.
    assert!(overcut >= 12.0 - 1e-9, "overcut covered {overcut} mm");
    assert_eq!(out.steps.last(), Some(&KnifeStep::ToolUp));
}

#[test]
fn test_open_paths_get_lead_in_on_request() {
    let line = entity(&[(0.0, 0.0), (10.0, 0.0)], false, ToolState::Cut);
    let plain = compensate(&line, &ToolProfile::default()).0;
    assert_eq!(plain.entry(), Some(Point::new(0.5, 0.0)));

    let tool = ToolProfile {
        compensate_open_paths: true,
        ..ToolProfile::default()
    };
    let led = compensate(&line, &tool).0;
    assert_eq!(led.entry(), Some(Point::new(0.0, 0.0)));
    assert!(matches!(
        led.steps[1],
        KnifeStep::Cut {
            role: CutRole::LeadIn,
            ..
        }
    ));
}

#[test]
fn test_laser_paths_are_not_compensated() {
    let square = entity(
        &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)],
        true,
        ToolState::Laser { power: 0.8 },
    );
    let (out, _) = compensate(&square, &ToolProfile::default());
    assert_eq!(out.source, 7);
    assert_eq!(out.tool_state, ToolState::Laser { power: 0.8 });
    assert!(!out
        .steps
        .iter()
        .any(|s| matches!(s, KnifeStep::Swivel { .. })));
    assert_eq!(tip_vertices(&out.steps, 0.0).len(), 4);
}
