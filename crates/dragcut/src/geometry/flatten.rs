use super::primitive::{quarter_pieces, Primitive};
use kurbo::{Line, ParamCurve, ParamCurveNearest, Point};

/// A curve piece accepted at the depth bound while still out of tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Divergence {
    pub depth: u32,
    pub deviation: f64,
}

/// Adaptive bisection flattener with a bounded, explicit work-list.
#[derive(Debug, Clone, Copy)]
pub struct Flattener {
    pub tolerance: f64,
    pub max_depth: u32,
}

struct Piece {
    t0: f64,
    t1: f64,
    depth: u32,
}

impl Flattener {
    pub fn new(tolerance: f64, max_depth: u32) -> Self {
        Self {
            tolerance,
            max_depth,
        }
    }

    /// Append the points of `prim` after its start point to `out`.
    ///
    /// Every point of the curve stays within `tolerance` of the emitted chords,
    /// except for pieces reported as divergences.
    pub fn flatten_into(&self, prim: &Primitive, out: &mut Vec<Point>) -> Vec<Divergence> {
        let mut divergences = Vec::new();
        if let Primitive::Line(line) = prim {
            out.push(line.p1);
            return divergences;
        }

        // Initial pieces are pushed in reverse so the stack pops them in order.
        let mut stack: Vec<Piece> = initial_pieces(prim)
            .windows(2)
            .rev()
            .map(|w| Piece {
                t0: w[0],
                t1: w[1],
                depth: 0,
            })
            .collect();

        while let Some(piece) = stack.pop() {
            let deviation = self.deviation(prim, piece.t0, piece.t1);
            if deviation <= self.tolerance {
                out.push(prim.eval(piece.t1));
                continue;
            }
            if piece.depth >= self.max_depth {
                divergences.push(Divergence {
                    depth: piece.depth,
                    deviation,
                });
                out.push(prim.eval(piece.t1));
                continue;
            }
            let mid = 0.5 * (piece.t0 + piece.t1);
            stack.push(Piece {
                t0: mid,
                t1: piece.t1,
                depth: piece.depth + 1,
            });
            stack.push(Piece {
                t0: piece.t0,
                t1: mid,
                depth: piece.depth + 1,
            });
        }
        divergences
    }

    /// Upper bound (sampled for splines) on the distance from the piece to its chord.
    fn deviation(&self, prim: &Primitive, t0: f64, t1: f64) -> f64 {
        let chord = Line::new(prim.eval(t0), prim.eval(t1));
        match prim {
            Primitive::Line(_) => 0.0,
            Primitive::Quad(quad) => {
                let piece = quad.subsegment(t0..t1);
                distance_to_segment(&chord, piece.p1)
            }
            Primitive::Cubic(cubic) => {
                let piece = cubic.subsegment(t0..t1);
                distance_to_segment(&chord, piece.p1).max(distance_to_segment(&chord, piece.p2))
            }
            Primitive::Arc(arc) => {
                let a0 = arc.start_angle + arc.sweep_angle * t0;
                let a1 = arc.start_angle + arc.sweep_angle * t1;
                distance_to_segment(&chord, arc.control_point(a0, a1))
            }
            Primitive::Spline(_) => (1..8)
                .map(|i| {
                    let t = t0 + (t1 - t0) * i as f64 / 8.0;
                    distance_to_segment(&chord, prim.eval(t))
                })
                .fold(0.0, f64::max),
        }
    }
}

/// Parameters splitting a primitive into pieces the deviation bound holds for.
fn initial_pieces(prim: &Primitive) -> Vec<f64> {
    let count = match prim {
        Primitive::Arc(arc) => quarter_pieces(arc.sweep_angle),
        Primitive::Spline(spline) => {
            let (t0, t1) = spline.domain();
            let mut params: Vec<f64> = spline
                .breakpoints()
                .into_iter()
                .map(|k| (k - t0) / (t1 - t0))
                .collect();
            // Each knot span is split once more so a single sample cannot hide a bulge.
            let spans = params.len().saturating_sub(1);
            for i in 0..spans {
                params.push(0.5 * (params[i] + params[i + 1]));
            }
            params.sort_by(f64::total_cmp);
            return params;
        }
        _ => 1,
    };
    (0..=count).map(|i| i as f64 / count as f64).collect()
}

fn distance_to_segment(chord: &Line, p: Point) -> f64 {
    if chord.p0 == chord.p1 {
        return chord.p0.distance(p);
    }
    chord.nearest(p, 1e-9).distance_sq.sqrt()
}

/// Remove consecutive points closer than `epsilon`.
pub fn dedup_points(points: &mut Vec<Point>, epsilon: f64) {
    points.dedup_by(|b, a| a.distance(*b) <= epsilon);
}
