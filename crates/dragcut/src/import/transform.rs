use super::path_data::{NumberScanner, PathDataError};
use kurbo::{Affine, Point};

/// Parse an SVG `transform` attribute into a single affine map.
///
/// A list `a b` applies `b` first, matching SVG semantics.
pub fn parse_transform(text: &str) -> Result<Affine, PathDataError> {
    let mut scanner = NumberScanner::new(text);
    let mut result = Affine::IDENTITY;

    while !scanner.at_end() {
        let name_start = scanner.position();
        while scanner.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
            scanner.bump();
        }
        let name = &text[name_start..scanner.position()];
        if name.is_empty() {
            return Err(scanner.error(name_start, "expected a transform function"));
        }
        scanner.skip_separators();
        if scanner.peek() != Some(b'(') {
            return Err(scanner.error(scanner.position(), "expected `(`"));
        }
        scanner.bump();

        let mut args = Vec::with_capacity(6);
        while scanner.at_number() {
            args.push(scanner.number()?);
        }
        scanner.skip_separators();
        if scanner.peek() != Some(b')') {
            return Err(scanner.error(scanner.position(), "expected `)`"));
        }
        scanner.bump();

        let step = match (name, args.as_slice()) {
            ("matrix", &[a, b, c, d, e, f]) => Affine::new([a, b, c, d, e, f]),
            ("translate", &[tx]) => Affine::translate((tx, 0.0)),
            ("translate", &[tx, ty]) => Affine::translate((tx, ty)),
            ("scale", &[s]) => Affine::scale(s),
            ("scale", &[sx, sy]) => Affine::scale_non_uniform(sx, sy),
            ("rotate", &[angle]) => Affine::rotate(angle.to_radians()),
            ("rotate", &[angle, cx, cy]) => {
                Affine::rotate_about(angle.to_radians(), Point::new(cx, cy))
            }
            ("skewX", &[angle]) => Affine::new([1.0, 0.0, angle.to_radians().tan(), 1.0, 0.0, 0.0]),
            ("skewY", &[angle]) => Affine::new([1.0, angle.to_radians().tan(), 0.0, 1.0, 0.0, 0.0]),
            _ => {
                return Err(scanner.error(
                    name_start,
                    &format!("bad transform `{name}` with {} arguments", args.len()),
                ));
            }
        };
        result = result * step;
    }
    Ok(result)
}
