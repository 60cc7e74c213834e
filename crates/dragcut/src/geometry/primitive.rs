use kurbo::{Affine, CubicBez, Line, ParamCurve, Point, QuadBez, Vec2};
use std::f64::consts::{FRAC_PI_2, TAU};

/// An elliptical arc `center + u·cos(t) + v·sin(t)` for `t` in
/// `start_angle ..= start_angle + sweep_angle`.
///
/// The conjugate-axis form stays exact under any affine transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EllipticalArc {
    pub center: Point,
    pub u: Vec2,
    pub v: Vec2,
    pub start_angle: f64,
    pub sweep_angle: f64,
}

impl EllipticalArc {
    pub fn circle(center: Point, radius: f64) -> Self {
        Self::circular(center, radius, 0.0, TAU)
    }

    pub fn circular(center: Point, radius: f64, start_angle: f64, sweep_angle: f64) -> Self {
        Self {
            center,
            u: Vec2::new(radius, 0.0),
            v: Vec2::new(0.0, radius),
            start_angle,
            sweep_angle,
        }
    }

    /// Convert a kurbo arc (radii plus x-axis rotation) to conjugate-axis form.
    pub fn from_kurbo(arc: &kurbo::Arc) -> Self {
        let (sin, cos) = arc.x_rotation.sin_cos();
        Self {
            center: arc.center,
            u: Vec2::new(cos, sin) * arc.radii.x,
            v: Vec2::new(-sin, cos) * arc.radii.y,
            start_angle: arc.start_angle,
            sweep_angle: arc.sweep_angle,
        }
    }

    pub fn point_at_angle(&self, angle: f64) -> Point {
        let (sin, cos) = angle.sin_cos();
        self.center + self.u * cos + self.v * sin
    }

    /// Tangent-line intersection of the piece between two angles.
    ///
    /// The piece lies inside the triangle formed by its ends and this point
    /// as long as the sweep stays below a half turn.
    pub fn control_point(&self, a0: f64, a1: f64) -> Point {
        let mid = 0.5 * (a0 + a1);
        let half = 0.5 * (a1 - a0);
        let (sin, cos) = mid.sin_cos();
        self.center + (self.u * cos + self.v * sin) * (1.0 / half.cos())
    }

    pub fn is_full(&self) -> bool {
        self.sweep_angle.abs() >= TAU - 1e-9
    }

    fn transform(&self, affine: &Affine) -> Self {
        let [a, b, c, d, _, _] = affine.as_coeffs();
        let linear = |w: Vec2| Vec2::new(a * w.x + c * w.y, b * w.x + d * w.y);
        Self {
            center: *affine * self.center,
            u: linear(self.u),
            v: linear(self.v),
            ..*self
        }
    }
}

/// Non-rational B-spline with an explicit knot vector.
#[derive(Debug, Clone, PartialEq)]
pub struct BSpline {
    pub degree: usize,
    pub knots: Vec<f64>,
    pub control_points: Vec<Point>,
}

impl BSpline {
    /// Build a spline; an empty knot vector becomes a clamped uniform one.
    pub fn new(degree: usize, knots: Vec<f64>, control_points: Vec<Point>) -> Option<Self> {
        let n = control_points.len();
        if degree == 0 || n <= degree {
            return None;
        }
        let knots = if knots.is_empty() {
            clamped_uniform_knots(degree, n)
        } else {
            knots
        };
        if knots.len() != n + degree + 1 || knots.windows(2).any(|w| w[1] < w[0]) {
            return None;
        }
        let spline = Self {
            degree,
            knots,
            control_points,
        };
        let (t0, t1) = spline.domain();
        (t1 > t0).then_some(spline)
    }

    pub fn domain(&self) -> (f64, f64) {
        let n = self.control_points.len();
        (self.knots[self.degree], self.knots[n])
    }

    /// Distinct knot values inside the domain, ends included.
    pub fn breakpoints(&self) -> Vec<f64> {
        let (t0, t1) = self.domain();
        let mut out: Vec<f64> = Vec::new();
        for &k in &self.knots {
            if k >= t0 && k <= t1 && out.last().map_or(true, |last| k > *last) {
                out.push(k);
            }
        }
        out
    }

    /// De Boor evaluation at a domain parameter.
    pub fn eval(&self, t: f64) -> Point {
        let (t0, t1) = self.domain();
        let t = t.clamp(t0, t1);
        let p = self.degree;
        let n = self.control_points.len();
        let mut span = p;
        while span + 1 < n && self.knots[span + 1] <= t {
            span += 1;
        }
        let mut d: Vec<Vec2> = (0..=p)
            .map(|j| self.control_points[j + span - p].to_vec2())
            .collect();
        for r in 1..=p {
            for j in (r..=p).rev() {
                let i = j + span - p;
                let denom = self.knots[i + p + 1 - r] - self.knots[i];
                let alpha = if denom.abs() < f64::EPSILON {
                    0.0
                } else {
                    (t - self.knots[i]) / denom
                };
                d[j] = d[j - 1] * (1.0 - alpha) + d[j] * alpha;
            }
        }
        d[p].to_point()
    }
}

fn clamped_uniform_knots(degree: usize, n: usize) -> Vec<f64> {
    let spans = n - degree;
    let mut knots = vec![0.0; degree + 1];
    knots.extend((1..spans).map(|i| i as f64 / spans as f64));
    knots.extend(std::iter::repeat(1.0).take(degree + 1));
    knots
}

/// A typed drawing primitive in millimetres, Y up.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Line(Line),
    Quad(QuadBez),
    Cubic(CubicBez),
    Arc(EllipticalArc),
    Spline(BSpline),
}

impl Primitive {
    pub fn start(&self) -> Point {
        self.eval(0.0)
    }

    pub fn end(&self) -> Point {
        self.eval(1.0)
    }

    /// Point at a normalised parameter in `0..=1`.
    pub fn eval(&self, t: f64) -> Point {
        match self {
            Primitive::Line(line) => line.eval(t),
            Primitive::Quad(quad) => quad.eval(t),
            Primitive::Cubic(cubic) => cubic.eval(t),
            Primitive::Arc(arc) => arc.point_at_angle(arc.start_angle + arc.sweep_angle * t),
            Primitive::Spline(spline) => {
                let (t0, t1) = spline.domain();
                spline.eval(t0 + (t1 - t0) * t)
            }
        }
    }

    pub fn transform(&self, affine: &Affine) -> Primitive {
        match self {
            Primitive::Line(line) => Primitive::Line(*affine * *line),
            Primitive::Quad(quad) => Primitive::Quad(*affine * *quad),
            Primitive::Cubic(cubic) => Primitive::Cubic(*affine * *cubic),
            Primitive::Arc(arc) => Primitive::Arc(arc.transform(affine)),
            Primitive::Spline(spline) => Primitive::Spline(BSpline {
                control_points: spline.control_points.iter().map(|p| *affine * *p).collect(),
                ..spline.clone()
            }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Primitive::Line(_) => "line",
            Primitive::Quad(_) => "quadratic",
            Primitive::Cubic(_) => "cubic",
            Primitive::Arc(_) => "arc",
            Primitive::Spline(_) => "spline",
        }
    }
}

/// Split an arc sweep into pieces no larger than a quarter turn.
pub(crate) fn quarter_pieces(sweep: f64) -> usize {
    ((sweep.abs() / FRAC_PI_2).ceil() as usize).max(1)
}
