//! SVG import over a streaming quick-xml reader.

use super::path_data::{parse_path_data, NumberScanner};
use super::transform::parse_transform;
use super::units::{parse_length, Length, LengthUnit};
use super::{DocumentBuilder, ImportedDocument, InputFormat, DEFAULT_LAYER};
use crate::config::ImportOptions;
use crate::error::{ImportError, SourceLocation};
use crate::geometry::{EllipticalArc, Primitive};
use kurbo::{Affine, Line, Point, Vec2};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use tracing::{debug, trace};

/// Subtrees that never carry cut geometry.
const IGNORED: &[&str] = &[
    "defs",
    "clipPath",
    "mask",
    "symbol",
    "marker",
    "pattern",
    "metadata",
    "title",
    "desc",
    "style",
    "script",
    "linearGradient",
    "radialGradient",
    "filter",
];

/// Elements that draw something this importer cannot turn into paths.
const UNSUPPORTED: &[&str] = &["text", "image", "use", "foreignObject"];

const SHAPES: &[&str] = &[
    "path", "line", "polyline", "polygon", "rect", "circle", "ellipse",
];

/// Inherited state of an open element.
#[derive(Debug, Clone)]
struct Frame {
    /// User space to millimetres, Y up.
    transform: Affine,
    stroke: Option<String>,
    fill: Option<String>,
    layer: Option<String>,
}

impl Frame {
    /// Millimetres per user unit, from the area scale of the transform.
    fn mm_per_unit(&self) -> f64 {
        let scale = self.transform.determinant().abs().sqrt();
        if scale.is_finite() && scale > 0.0 {
            scale
        } else {
            LengthUnit::Pixel.to_mm()
        }
    }

    fn color(&self) -> Option<String> {
        [&self.stroke, &self.fill]
            .into_iter()
            .flatten()
            .find(|c| c.as_str() != "none")
            .cloned()
    }
}

/// Attributes of one start tag, with `style` declarations split out.
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    style: Vec<(String, String)>,
    location: SourceLocation,
    /// Scale of the user space the coordinates live in.
    mm_per_unit: f64,
}

impl Element {
    fn parse(start: &BytesStart, name: String, location: SourceLocation) -> Result<Self, ImportError> {
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| malformed(location, format!("bad attribute: {e}")))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| malformed(location, format!("bad attribute value: {e}")))?
                .into_owned();
            attrs.push((key, value));
        }
        let style = attrs
            .iter()
            .find(|(k, _)| k == "style")
            .map(|(_, v)| parse_style(v))
            .unwrap_or_default();
        Ok(Self {
            name,
            attrs,
            style,
            location,
            mm_per_unit: LengthUnit::Pixel.to_mm(),
        })
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Presentation property; `style` wins over the attribute.
    fn prop(&self, key: &str) -> Option<&str> {
        self.style
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .or_else(|| self.attr(key))
    }

    /// Coordinate attribute in user units. Absolute lengths such as `5mm`
    /// are physical sizes on the page.
    fn coord(&self, key: &str, default: f64) -> Result<f64, ImportError> {
        let Some(text) = self.attr(key) else {
            return Ok(default);
        };
        match parse_length(text) {
            Some(Length::User(v)) => Ok(v),
            Some(Length::Absolute(v, unit)) => Ok(v * unit.to_mm() / self.mm_per_unit),
            _ => Err(malformed(
                self.location,
                format!("<{}> has unusable {key}=\"{text}\"", self.name),
            )),
        }
    }

    fn transform(&self) -> Result<Affine, ImportError> {
        match self.attr("transform") {
            Some(text) => parse_transform(text)
                .map_err(|e| malformed(self.location, format!("transform: {e}"))),
            None => Ok(Affine::IDENTITY),
        }
    }
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn malformed(location: SourceLocation, reason: String) -> ImportError {
    ImportError::MalformedInput { location, reason }
}

struct SvgWalker<'a> {
    options: &'a ImportOptions,
    builder: DocumentBuilder<'a>,
    stack: Vec<Frame>,
    /// Open elements inside a skipped subtree.
    skip_depth: usize,
    entity: usize,
    size: Option<(f64, f64)>,
    seen_root: bool,
}

/// Import an SVG document. Output is in millimetres with the page's
/// bottom-left corner at the origin.
pub fn import_svg(text: &str, options: &ImportOptions) -> Result<ImportedDocument, ImportError> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut walker = SvgWalker {
        options,
        builder: DocumentBuilder::new(InputFormat::Svg, options),
        stack: Vec::new(),
        skip_depth: 0,
        entity: 0,
        size: None,
        seen_root: false,
    };

    loop {
        let offset = reader.buffer_position();
        let event = reader.read_event().map_err(|e| {
            malformed(
                SourceLocation::with_offset(walker.entity, offset),
                e.to_string(),
            )
        })?;
        match event {
            Event::Start(e) => walker.open(&e, offset, true)?,
            Event::Empty(e) => walker.open(&e, offset, false)?,
            Event::End(_) => walker.close(),
            Event::Eof => break,
            _ => {}
        }
    }

    if !walker.seen_root {
        return Err(malformed(
            SourceLocation::default(),
            "document has no <svg> root element".to_string(),
        ));
    }
    if !walker.stack.is_empty() || walker.skip_depth > 0 {
        return Err(malformed(
            SourceLocation::with_offset(walker.entity, text.len()),
            "unexpected end of document".to_string(),
        ));
    }
    Ok(walker.builder.finish(walker.size))
}

impl<'a> SvgWalker<'a> {
    fn open(&mut self, start: &BytesStart, offset: usize, has_children: bool) -> Result<(), ImportError> {
        if self.skip_depth > 0 {
            if has_children {
                self.skip_depth += 1;
            }
            return Ok(());
        }

        let qname = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let name = match qname.split_once(':') {
            Some(("svg", local)) => local.to_string(),
            Some(_) => {
                trace!(element = %qname, "skipping foreign element");
                self.skip(has_children);
                return Ok(());
            }
            None => qname.clone(),
        };
        let location = SourceLocation::with_offset(self.entity, offset);
        let mut el = Element::parse(start, name, location)?;

        if !self.seen_root {
            if el.name != "svg" {
                return Err(malformed(
                    location,
                    format!("root element is <{}>, expected <svg>", el.name),
                ));
            }
            self.seen_root = true;
            let frame = self.root_frame(&el)?;
            if has_children {
                self.stack.push(frame);
            }
            return Ok(());
        }

        if IGNORED.contains(&el.name.as_str()) || el.prop("display") == Some("none") {
            self.skip(has_children);
            return Ok(());
        }

        let Some(parent) = self.stack.last() else {
            // Content after the root element closed.
            return Err(malformed(location, format!("<{}> outside <svg>", el.name)));
        };
        el.mm_per_unit = parent.mm_per_unit();
        let frame = child_frame(parent, &el)?;
        el.mm_per_unit = frame.mm_per_unit();

        if UNSUPPORTED.contains(&el.name.as_str()) {
            self.entity += 1;
            self.builder.unsupported(&el.name, location)?;
            self.skip(has_children);
            return Ok(());
        }

        match el.name.as_str() {
            "g" | "a" | "switch" | "svg" => {}
            shape if SHAPES.contains(&shape) => {
                self.entity += 1;
                self.emit_shape(&el, &frame)?;
            }
            other => {
                debug!(element = other, "ignoring unknown element");
                self.skip(has_children);
                return Ok(());
            }
        }
        if has_children {
            self.stack.push(frame);
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
        } else {
            self.stack.pop();
        }
    }

    fn skip(&mut self, has_children: bool) {
        if has_children {
            self.skip_depth = 1;
        }
    }

    /// Viewport mapping of the root element plus the flip to Y up.
    fn root_frame(&mut self, el: &Element) -> Result<Frame, ImportError> {
        let view_box = el
            .attr("viewBox")
            .map(|text| parse_view_box(text, el.location))
            .transpose()?;
        let width = self.page_extent(el, "width", view_box.map(|vb| vb[2]))?;
        let height = self.page_extent(el, "height", view_box.map(|vb| vb[3]))?;

        let viewport = match view_box {
            Some([min_x, min_y, vb_w, vb_h]) => {
                let sx = width / vb_w;
                let sy = height / vb_h;
                let stretch = el
                    .attr("preserveAspectRatio")
                    .is_some_and(|v| v.trim() == "none");
                let (sx, sy) = if stretch {
                    (sx, sy)
                } else {
                    let s = sx.min(sy);
                    (s, s)
                };
                let tx = (width - vb_w * sx) / 2.0 - min_x * sx;
                let ty = (height - vb_h * sy) / 2.0 - min_y * sy;
                Affine::translate((tx, ty)) * Affine::scale_non_uniform(sx, sy)
            }
            None => Affine::scale(LengthUnit::Pixel.to_mm()),
        };
        let flip = Affine::translate((0.0, height)) * Affine::scale_non_uniform(1.0, -1.0);
        self.size = Some((width, height));
        debug!(width, height, ?view_box, "resolved SVG page size in mm");

        Ok(Frame {
            transform: flip * viewport * el.transform()?,
            stroke: el.prop("stroke").and_then(normalize_color),
            fill: el.prop("fill").and_then(normalize_color),
            layer: None,
        })
    }

    /// Page width or height in mm.
    fn page_extent(
        &self,
        el: &Element,
        key: &str,
        view_box_extent: Option<f64>,
    ) -> Result<f64, ImportError> {
        let declared = match el.attr(key) {
            Some(text) => match parse_length(text) {
                Some(Length::User(v)) => Some(v * LengthUnit::Pixel.to_mm()),
                Some(Length::Absolute(v, unit)) => Some(v * unit.to_mm()),
                Some(Length::Percent(_)) => None,
                None => {
                    return Err(ImportError::UnitResolution {
                        reason: format!("unrecognised {key}=\"{text}\""),
                    })
                }
            },
            None => None,
        };
        let extent = match declared {
            Some(mm) => mm,
            None => match (self.options.assume_units, view_box_extent) {
                (Some(unit), Some(extent)) => extent * unit.to_mm(),
                (None, _) => {
                    return Err(ImportError::UnitResolution {
                        reason: format!("SVG {key} is missing or relative and no units are assumed"),
                    })
                }
                (Some(_), None) => {
                    return Err(ImportError::UnitResolution {
                        reason: format!("SVG {key} is missing or relative and there is no viewBox"),
                    })
                }
            },
        };
        if !(extent.is_finite() && extent > 0.0) {
            return Err(ImportError::UnitResolution {
                reason: format!("SVG {key} must be positive"),
            });
        }
        Ok(extent)
    }

    fn emit_shape(&mut self, el: &Element, frame: &Frame) -> Result<(), ImportError> {
        let layer = frame.layer.as_deref().unwrap_or(DEFAULT_LAYER);
        let color = frame.color();
        for (primitives, closed) in shape_primitives(el)? {
            let primitives = primitives
                .iter()
                .map(|p| p.transform(&frame.transform))
                .collect();
            self.builder
                .push(primitives, closed, layer, color.clone(), el.location);
        }
        Ok(())
    }
}

fn child_frame(parent: &Frame, el: &Element) -> Result<Frame, ImportError> {
    let mut transform = parent.transform;
    if el.name == "svg" {
        transform = transform * Affine::translate((el.coord("x", 0.0)?, el.coord("y", 0.0)?));
    }
    transform = transform * el.transform()?;

    let layer = if el.name == "g" {
        el.attr("inkscape:label")
            .or_else(|| el.attr("id"))
            .map(str::to_string)
            .or_else(|| parent.layer.clone())
    } else {
        parent.layer.clone()
    };

    Ok(Frame {
        transform,
        stroke: el
            .prop("stroke")
            .and_then(normalize_color)
            .or_else(|| parent.stroke.clone()),
        fill: el
            .prop("fill")
            .and_then(normalize_color)
            .or_else(|| parent.fill.clone()),
        layer,
    })
}

fn parse_view_box(text: &str, location: SourceLocation) -> Result<[f64; 4], ImportError> {
    let values = parse_numbers(text)
        .map_err(|e| malformed(location, format!("viewBox: {e}")))?;
    match values.as_slice() {
        &[x, y, w, h] if w > 0.0 && h > 0.0 => Ok([x, y, w, h]),
        _ => Err(malformed(location, format!("invalid viewBox \"{text}\""))),
    }
}

fn parse_numbers(text: &str) -> Result<Vec<f64>, super::PathDataError> {
    let mut scanner = NumberScanner::new(text);
    let mut values = Vec::new();
    while !scanner.at_end() {
        values.push(scanner.number()?);
    }
    Ok(values)
}

/// Primitives in user units for one shape element, one entry per subpath.
fn shape_primitives(el: &Element) -> Result<Vec<(Vec<Primitive>, bool)>, ImportError> {
    let shapes = match el.name.as_str() {
        "path" => {
            let d = el.attr("d").unwrap_or_default();
            parse_path_data(d)
                .map_err(|e| malformed(el.location, format!("path data: {e}")))?
                .into_iter()
                .map(|sub| (sub.primitives, sub.closed))
                .collect()
        }
        "line" => {
            let p0 = Point::new(el.coord("x1", 0.0)?, el.coord("y1", 0.0)?);
            let p1 = Point::new(el.coord("x2", 0.0)?, el.coord("y2", 0.0)?);
            if p0 == p1 {
                Vec::new()
            } else {
                vec![(vec![Primitive::Line(Line::new(p0, p1))], false)]
            }
        }
        "polyline" | "polygon" => {
            let values = parse_numbers(el.attr("points").unwrap_or_default())
                .map_err(|e| malformed(el.location, format!("points: {e}")))?;
            if values.len() % 2 != 0 {
                return Err(malformed(
                    el.location,
                    "points needs an even number of coordinates".to_string(),
                ));
            }
            let mut points: Vec<Point> = values
                .chunks_exact(2)
                .map(|xy| Point::new(xy[0], xy[1]))
                .collect();
            let closed = el.name == "polygon";
            if closed && points.len() > 2 && points.first() != points.last() {
                points.push(points[0]);
            }
            let lines: Vec<Primitive> = points
                .windows(2)
                .map(|w| Primitive::Line(Line::new(w[0], w[1])))
                .collect();
            if lines.is_empty() {
                Vec::new()
            } else {
                vec![(lines, closed)]
            }
        }
        "rect" => rect_primitives(el)?.into_iter().collect(),
        "circle" => {
            let r = el.coord("r", 0.0)?;
            let center = Point::new(el.coord("cx", 0.0)?, el.coord("cy", 0.0)?);
            if r > 0.0 {
                vec![(vec![Primitive::Arc(EllipticalArc::circle(center, r))], true)]
            } else {
                Vec::new()
            }
        }
        "ellipse" => {
            let rx = el.coord("rx", 0.0)?;
            let ry = el.coord("ry", 0.0)?;
            let center = Point::new(el.coord("cx", 0.0)?, el.coord("cy", 0.0)?);
            if rx > 0.0 && ry > 0.0 {
                let arc = EllipticalArc {
                    center,
                    u: Vec2::new(rx, 0.0),
                    v: Vec2::new(0.0, ry),
                    start_angle: 0.0,
                    sweep_angle: TAU,
                };
                vec![(vec![Primitive::Arc(arc)], true)]
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    };
    Ok(shapes)
}

fn rect_primitives(el: &Element) -> Result<Option<(Vec<Primitive>, bool)>, ImportError> {
    let x = el.coord("x", 0.0)?;
    let y = el.coord("y", 0.0)?;
    let w = el.coord("width", 0.0)?;
    let h = el.coord("height", 0.0)?;
    if w <= 0.0 || h <= 0.0 {
        return Ok(None);
    }
    let rx = el.attr("rx").map(|_| el.coord("rx", 0.0)).transpose()?;
    let ry = el.attr("ry").map(|_| el.coord("ry", 0.0)).transpose()?;
    let (rx, ry) = match (rx, ry) {
        (Some(rx), Some(ry)) => (rx, ry),
        (Some(r), None) | (None, Some(r)) => (r, r),
        (None, None) => (0.0, 0.0),
    };
    let rx = rx.clamp(0.0, w / 2.0);
    let ry = ry.clamp(0.0, h / 2.0);

    let mut prims = Vec::new();
    let line = |a: Point, b: Point, prims: &mut Vec<Primitive>| {
        if a != b {
            prims.push(Primitive::Line(Line::new(a, b)));
        }
    };
    if rx > 0.0 && ry > 0.0 {
        let corner = |cx: f64, cy: f64, start: f64| {
            Primitive::Arc(EllipticalArc {
                center: Point::new(cx, cy),
                u: Vec2::new(rx, 0.0),
                v: Vec2::new(0.0, ry),
                start_angle: start,
                sweep_angle: FRAC_PI_2,
            })
        };
        line(Point::new(x + rx, y), Point::new(x + w - rx, y), &mut prims);
        prims.push(corner(x + w - rx, y + ry, -FRAC_PI_2));
        line(Point::new(x + w, y + ry), Point::new(x + w, y + h - ry), &mut prims);
        prims.push(corner(x + w - rx, y + h - ry, 0.0));
        line(Point::new(x + w - rx, y + h), Point::new(x + rx, y + h), &mut prims);
        prims.push(corner(x + rx, y + h - ry, FRAC_PI_2));
        line(Point::new(x, y + h - ry), Point::new(x, y + ry), &mut prims);
        prims.push(corner(x + rx, y + ry, PI));
    } else {
        let corners = [
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
            Point::new(x, y),
        ];
        for pair in corners.windows(2) {
            line(pair[0], pair[1], &mut prims);
        }
    }
    Ok(Some((prims, true)))
}

/// Normalise a CSS colour to `#rrggbb`; `none` is kept so it stops inheritance.
fn normalize_color(value: &str) -> Option<String> {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "" | "inherit" | "currentcolor" => return None,
        "none" | "transparent" => return Some("none".to_string()),
        _ => {}
    }
    if let Some(hex) = value.strip_prefix('#') {
        if hex.len() == 3 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            let expanded: String = hex.chars().flat_map(|c| [c, c]).collect();
            return Some(format!("#{expanded}"));
        }
        return Some(value);
    }
    if let Some(inner) = value
        .strip_prefix("rgb(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let channels: Vec<u8> = inner
            .split(',')
            .filter_map(|part| {
                let part = part.trim();
                match part.strip_suffix('%') {
                    Some(pct) => pct
                        .parse::<f64>()
                        .ok()
                        .map(|v| (v.clamp(0.0, 100.0) * 2.55).round() as u8),
                    None => part.parse::<f64>().ok().map(|v| v.clamp(0.0, 255.0).round() as u8),
                }
            })
            .collect();
        if let [r, g, b] = channels.as_slice() {
            return Some(format!("#{r:02x}{g:02x}{b:02x}"));
        }
    }
    let named = match value.as_str() {
        "black" => "#000000",
        "white" => "#ffffff",
        "red" => "#ff0000",
        "lime" => "#00ff00",
        "green" => "#008000",
        "blue" => "#0000ff",
        "yellow" => "#ffff00",
        "cyan" | "aqua" => "#00ffff",
        "magenta" | "fuchsia" => "#ff00ff",
        "orange" => "#ffa500",
        "gray" | "grey" => "#808080",
        _ => return Some(value),
    };
    Some(named.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_color() {
        assert_eq!(normalize_color("#F00").as_deref(), Some("#ff0000"));
        assert_eq!(normalize_color("Blue").as_deref(), Some("#0000ff"));
        assert_eq!(normalize_color("rgb(255, 0, 128)").as_deref(), Some("#ff0080"));
        assert_eq!(normalize_color("none").as_deref(), Some("none"));
        assert_eq!(normalize_color("inherit"), None);
    }

    #[test]
    fn test_parse_style() {
        let style = parse_style("stroke:#000; fill : none;;display:none");
        assert_eq!(style.len(), 3);
        assert_eq!(style[1], ("fill".to_string(), "none".to_string()));
    }

    #[test]
    fn test_frame_color_prefers_stroke() {
        let frame = Frame {
            transform: Affine::IDENTITY,
            stroke: Some("none".to_string()),
            fill: Some("#00ff00".to_string()),
            layer: None,
        };
        assert_eq!(frame.color().as_deref(), Some("#00ff00"));
    }
}
