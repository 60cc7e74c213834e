//! SVG path data (`d` attribute) parser.

use crate::geometry::{EllipticalArc, Primitive};
use kurbo::{CubicBez, Line, Point, QuadBez, SvgArc, Vec2};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("path data error at {position}: {reason}")]
pub struct PathDataError {
    /// Byte position inside the attribute value.
    pub position: usize,
    pub reason: String,
}

/// One `M`-started run of path data, in user units.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Subpath {
    pub primitives: Vec<Primitive>,
    pub closed: bool,
}

/// Scanner for the SVG number grammar shared by path data, `points` and `transform`.
pub(crate) struct NumberScanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> NumberScanner<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn skip_separators(&mut self) {
        while let Some(&b) = self.bytes.get(self.pos) {
            if b.is_ascii_whitespace() || b == b',' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    pub(crate) fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub(crate) fn bump(&mut self) {
        self.pos += 1;
    }

    pub(crate) fn at_end(&mut self) -> bool {
        self.skip_separators();
        self.pos >= self.bytes.len()
    }

    /// Whether the next token starts a number.
    pub(crate) fn at_number(&mut self) -> bool {
        self.skip_separators();
        matches!(self.peek(), Some(b'0'..=b'9' | b'-' | b'+' | b'.'))
    }

    pub(crate) fn number(&mut self) -> Result<f64, PathDataError> {
        self.skip_separators();
        let start = self.pos;
        let mut end = self.pos;
        let bytes = self.bytes;
        if matches!(bytes.get(end), Some(b'-' | b'+')) {
            end += 1;
        }
        let mut digits = false;
        while bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
            digits = true;
        }
        if bytes.get(end) == Some(&b'.') {
            end += 1;
            while bytes.get(end).is_some_and(u8::is_ascii_digit) {
                end += 1;
                digits = true;
            }
        }
        if !digits {
            return Err(self.error(start, "expected a number"));
        }
        if matches!(bytes.get(end), Some(b'e' | b'E')) {
            let mut exp = end + 1;
            if matches!(bytes.get(exp), Some(b'-' | b'+')) {
                exp += 1;
            }
            if bytes.get(exp).is_some_and(u8::is_ascii_digit) {
                while bytes.get(exp).is_some_and(u8::is_ascii_digit) {
                    exp += 1;
                }
                end = exp;
            }
        }
        let text = std::str::from_utf8(&bytes[start..end])
            .map_err(|_| self.error(start, "invalid number"))?;
        let value: f64 = text
            .parse()
            .map_err(|_| self.error(start, "invalid number"))?;
        self.pos = end;
        Ok(value)
    }

    /// Arc flags are single digits and may be written without separators.
    fn flag(&mut self) -> Result<bool, PathDataError> {
        self.skip_separators();
        let value = match self.peek() {
            Some(b'0') => false,
            Some(b'1') => true,
            _ => return Err(self.error(self.pos, "expected an arc flag")),
        };
        self.pos += 1;
        Ok(value)
    }

    pub(crate) fn error(&self, position: usize, reason: &str) -> PathDataError {
        PathDataError {
            position,
            reason: reason.to_string(),
        }
    }
}

struct PathBuilder {
    subpaths: Vec<Subpath>,
    current: Subpath,
    start: Point,
    pos: Point,
    /// Reflection source for `S`/`T`, set only after a curve command of the same family.
    last_cubic_ctrl: Option<Point>,
    last_quad_ctrl: Option<Point>,
}

impl PathBuilder {
    fn new() -> Self {
        Self {
            subpaths: Vec::new(),
            current: Subpath::default(),
            start: Point::ORIGIN,
            pos: Point::ORIGIN,
            last_cubic_ctrl: None,
            last_quad_ctrl: None,
        }
    }

    fn flush(&mut self) {
        let done = std::mem::take(&mut self.current);
        if !done.primitives.is_empty() {
            self.subpaths.push(done);
        }
    }

    fn move_to(&mut self, p: Point) {
        self.flush();
        self.start = p;
        self.pos = p;
    }

    fn push(&mut self, prim: Primitive, end: Point) {
        self.current.primitives.push(prim);
        self.pos = end;
    }

    fn line_to(&mut self, p: Point) {
        self.push(Primitive::Line(Line::new(self.pos, p)), p);
    }

    fn close(&mut self) {
        if self.current.primitives.is_empty() {
            return;
        }
        if self.pos != self.start {
            self.line_to(self.start);
        }
        self.current.closed = true;
        self.flush();
        self.pos = self.start;
    }

    fn arc_to(&mut self, radii: Vec2, x_rotation_deg: f64, large_arc: bool, sweep: bool, to: Point) {
        if self.pos == to {
            return;
        }
        let svg_arc = SvgArc {
            from: self.pos,
            to,
            radii,
            x_rotation: x_rotation_deg.to_radians(),
            large_arc,
            sweep,
        };
        match kurbo::Arc::from_svg_arc(&svg_arc) {
            Some(arc) => {
                let prim = Primitive::Arc(EllipticalArc::from_kurbo(&arc));
                self.push(prim, to);
            }
            None => self.line_to(to),
        }
    }
}

/// Parse an SVG `d` attribute into subpaths. Coordinates stay in user units.
pub fn parse_path_data(d: &str) -> Result<Vec<Subpath>, PathDataError> {
    let mut scanner = NumberScanner::new(d);
    let mut builder = PathBuilder::new();
    let mut command: Option<u8> = None;

    loop {
        if scanner.at_end() {
            break;
        }
        let cmd = match scanner.peek() {
            Some(c) if c.is_ascii_alphabetic() => {
                scanner.bump();
                c
            }
            _ => match command {
                // Extra coordinate pairs after a moveto are implicit linetos.
                Some(b'M') => b'L',
                Some(b'm') => b'l',
                Some(c) if !matches!(c, b'Z' | b'z') => c,
                _ => {
                    return Err(scanner.error(scanner.position(), "expected a path command"));
                }
            },
        };
        if command.is_none() && !matches!(cmd, b'M' | b'm') {
            return Err(scanner.error(scanner.position(), "path data must start with a moveto"));
        }
        command = Some(cmd);
        let relative = cmd.is_ascii_lowercase();
        let base = if relative {
            builder.pos.to_vec2()
        } else {
            Vec2::ZERO
        };
        let point = |s: &mut NumberScanner| -> Result<Point, PathDataError> {
            let x = s.number()?;
            let y = s.number()?;
            Ok(Point::new(x, y) + base)
        };

        let mut cubic_ctrl = None;
        let mut quad_ctrl = None;
        match cmd.to_ascii_uppercase() {
            b'M' => {
                let p = point(&mut scanner)?;
                builder.move_to(p);
            }
            b'L' => {
                let p = point(&mut scanner)?;
                builder.line_to(p);
            }
            b'H' => {
                let x = scanner.number()? + base.x;
                builder.line_to(Point::new(x, builder.pos.y));
            }
            b'V' => {
                let y = scanner.number()? + base.y;
                builder.line_to(Point::new(builder.pos.x, y));
            }
            b'C' => {
                let c1 = point(&mut scanner)?;
                let c2 = point(&mut scanner)?;
                let p = point(&mut scanner)?;
                builder.push(Primitive::Cubic(CubicBez::new(builder.pos, c1, c2, p)), p);
                cubic_ctrl = Some(c2);
            }
            b'S' => {
                let c1 = reflect(builder.last_cubic_ctrl, builder.pos);
                let c2 = point(&mut scanner)?;
                let p = point(&mut scanner)?;
                builder.push(Primitive::Cubic(CubicBez::new(builder.pos, c1, c2, p)), p);
                cubic_ctrl = Some(c2);
            }
            b'Q' => {
                let c = point(&mut scanner)?;
                let p = point(&mut scanner)?;
                builder.push(Primitive::Quad(QuadBez::new(builder.pos, c, p)), p);
                quad_ctrl = Some(c);
            }
            b'T' => {
                let c = reflect(builder.last_quad_ctrl, builder.pos);
                let p = point(&mut scanner)?;
                builder.push(Primitive::Quad(QuadBez::new(builder.pos, c, p)), p);
                quad_ctrl = Some(c);
            }
            b'A' => {
                let rx = scanner.number()?.abs();
                let ry = scanner.number()?.abs();
                let rotation = scanner.number()?;
                let large_arc = scanner.flag()?;
                let sweep = scanner.flag()?;
                let p = point(&mut scanner)?;
                builder.arc_to(Vec2::new(rx, ry), rotation, large_arc, sweep, p);
            }
            b'Z' => builder.close(),
            _ => {
                return Err(scanner.error(
                    scanner.position().saturating_sub(1),
                    &format!("unknown path command `{}`", cmd as char),
                ));
            }
        }
        builder.last_cubic_ctrl = cubic_ctrl;
        builder.last_quad_ctrl = quad_ctrl;
    }

    builder.flush();
    Ok(builder.subpaths)
}

fn reflect(ctrl: Option<Point>, about: Point) -> Point {
    match ctrl {
        Some(c) => about + (about - c),
        None => about,
    }
}
