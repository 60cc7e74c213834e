//! SVG preview of a compiled program over the drawing it came from.

use crate::error::PreviewError;
use crate::types::{bounds_of, CompiledProgram, Move, MoveKind, PathEntity, ToolState};
use kurbo::{Rect, Vec2};
use quick_xml::events::BytesText;
use quick_xml::Writer;
use std::fmt::Write as _;

/// Blank border around the content, in mm.
const MARGIN: f64 = 10.0;

/// Render the program as an SVG page in millimetres.
///
/// The drawing is shown faintly underneath. Travel is dashed blue and engaged
/// motion is coloured by tool state: red knife, green pen, orange laser.
pub fn render_preview(
    program: &CompiledProgram,
    drawing: &[PathEntity],
) -> Result<String, PreviewError> {
    let content = program
        .summary
        .bounds
        .into_iter()
        .chain(drawing.iter().filter_map(|p| bounds_of(&p.polyline)))
        .reduce(|a, b| a.union(b))
        .unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0));
    let page = content.inflate(MARGIN, MARGIN);

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let width = format!("{}mm", num(page.width()));
    let height = format!("{}mm", num(page.height()));
    // The page is Y down; everything below is drawn Y up inside a flip.
    let view_box = format!(
        "{} {} {} {}",
        num(page.x0),
        num(-page.y1),
        num(page.width()),
        num(page.height())
    );

    writer
        .create_element("svg")
        .with_attributes([
            ("xmlns", "http://www.w3.org/2000/svg"),
            ("width", width.as_str()),
            ("height", height.as_str()),
            ("viewBox", view_box.as_str()),
        ])
        .write_inner_content::<_, PreviewError>(|w| {
            w.create_element("title")
                .write_text_content(BytesText::new("dragcut toolpath preview"))?;
            w.create_element("g")
                .with_attribute(("transform", "scale(1,-1)"))
                .write_inner_content::<_, PreviewError>(|w| {
                    write_drawing(w, drawing)?;
                    write_moves(w, "travel", &program.moves, None)?;
                    for state in [
                        ToolState::Cut,
                        ToolState::Draw,
                        ToolState::Laser { power: 0.0 },
                    ] {
                        write_moves(w, state.label(), &program.moves, Some(state))?;
                    }
                    Ok(())
                })?;
            Ok(())
        })?;

    Ok(String::from_utf8(writer.into_inner())?)
}

type SvgWriter = Writer<Vec<u8>>;

fn write_drawing(w: &mut SvgWriter, drawing: &[PathEntity]) -> Result<(), PreviewError> {
    if drawing.is_empty() {
        return Ok(());
    }
    w.create_element("g")
        .with_attributes([
            ("id", "drawing"),
            ("fill", "none"),
            ("stroke", "#000000"),
            ("stroke-width", "0.1"),
            ("opacity", "0.3"),
        ])
        .write_inner_content::<_, PreviewError>(|w| {
            for path in drawing {
                let mut d = String::new();
                for (i, p) in path.polyline.iter().enumerate() {
                    let command = if i == 0 { 'M' } else { 'L' };
                    let _ = write!(d, "{command}{} {} ", num(p.x), num(p.y));
                }
                if path.closed {
                    d.push('Z');
                }
                w.create_element("path")
                    .with_attribute(("d", d.trim_end()))
                    .write_empty()?;
            }
            Ok(())
        })?;
    Ok(())
}

/// One group per kind of motion. `state` of `None` selects travel; laser
/// moves match whatever their power.
fn write_moves(
    w: &mut SvgWriter,
    id: &str,
    moves: &[Move],
    state: Option<ToolState>,
) -> Result<(), PreviewError> {
    let selected: Vec<&Move> = moves
        .iter()
        .filter(|m| !m.is_tool_change())
        .filter(|m| match state {
            None => m.is_travel(),
            Some(state) => {
                m.tool_down
                    && std::mem::discriminant(&m.tool_state) == std::mem::discriminant(&state)
            }
        })
        .collect();
    if selected.is_empty() {
        return Ok(());
    }

    let (stroke, width) = match state {
        None => ("#0000ff", "0.1"),
        Some(ToolState::Cut) => ("#ff0000", "0.2"),
        Some(ToolState::Draw) => ("#008000", "0.2"),
        Some(ToolState::Laser { .. }) => ("#ffa500", "0.2"),
    };
    let mut group = w.create_element("g").with_attributes([
        ("id", id),
        ("fill", "none"),
        ("stroke", stroke),
        ("stroke-width", width),
    ]);
    if state.is_none() {
        group = group.with_attribute(("stroke-dasharray", "2,1"));
    }
    group.write_inner_content::<_, PreviewError>(|w| {
        for mv in selected {
            w.create_element("path")
                .with_attribute(("d", move_path(mv).as_str()))
                .write_empty()?;
        }
        Ok(())
    })?;
    Ok(())
}

/// Path data for one move. Arcs are split in two so a full turn still draws.
fn move_path(mv: &Move) -> String {
    let mut d = format!("M{} {}", num(mv.start.x), num(mv.start.y));
    match (mv.kind, mv.arc_center(), mv.sweep()) {
        (MoveKind::Arc { .. }, Some(center), Some(sweep)) => {
            let radius = (mv.start - center).hypot();
            let half = rotate(mv.start - center, sweep / 2.0);
            let mid = center + half;
            let flag = if sweep > 0.0 { 1 } else { 0 };
            let r = num(radius);
            for p in [mid, mv.end] {
                let _ = write!(d, " A{r} {r} 0 0 {flag} {} {}", num(p.x), num(p.y));
            }
        }
        _ => {
            let _ = write!(d, " L{} {}", num(mv.end.x), num(mv.end.y));
        }
    }
    d
}

fn rotate(v: Vec2, angle: f64) -> Vec2 {
    let (sin, cos) = angle.sin_cos();
    Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}

/// Millimetres with three decimals and no trailing zeros.
fn num(v: f64) -> String {
    let text = format!("{:.3}", v);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}
