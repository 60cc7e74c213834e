//! DXF import through the `dxf` crate.

use super::{DocumentBuilder, ImportedDocument, InputFormat, LengthUnit};
use crate::config::ImportOptions;
use crate::error::{ImportError, SourceLocation};
use crate::geometry::{BSpline, EllipticalArc, Primitive};
use ::dxf::entities::{Entity, EntityType};
use ::dxf::enums::Units;
use ::dxf::{Color, Drawing, Vector};
use kurbo::{Affine, Line, Point, Vec2};
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::io::Cursor;
use tracing::debug;

type Shapes = Vec<(Vec<Primitive>, bool)>;

/// Import a DXF drawing. Model-space entities only; coordinates are scaled
/// from `$INSUNITS` to millimetres.
pub fn import_dxf(bytes: &[u8], options: &ImportOptions) -> Result<ImportedDocument, ImportError> {
    let mut cursor = Cursor::new(bytes);
    let drawing = Drawing::load(&mut cursor).map_err(|e| ImportError::MalformedInput {
        location: SourceLocation::default(),
        reason: format!("DXF: {e}"),
    })?;

    let scale = unit_scale(&drawing.header.default_drawing_units, options)?;
    let to_mm = Affine::scale(scale);
    debug!(scale, "resolved DXF drawing units");

    let layer_colors: HashMap<String, Color> = drawing
        .layers()
        .map(|layer| (layer.name.clone(), layer.color.clone()))
        .collect();

    let mut builder = DocumentBuilder::new(InputFormat::Dxf, options);
    for (index, entity) in drawing.entities().enumerate() {
        let location = SourceLocation::entity(index);
        if entity.common.is_in_paper_space {
            debug!(entity = index, "skipping paper-space entity");
            continue;
        }
        let Some(shapes) = entity_shapes(entity, location)? else {
            builder.unsupported(&entity_kind(&entity.specific), location)?;
            continue;
        };
        let color = entity_color(entity, &layer_colors);
        for (primitives, closed) in shapes {
            let primitives = primitives.iter().map(|p| p.transform(&to_mm)).collect();
            builder.push(
                primitives,
                closed,
                &entity.common.layer,
                color.clone(),
                location,
            );
        }
    }
    Ok(builder.finish(None))
}

fn unit_scale(units: &Units, options: &ImportOptions) -> Result<f64, ImportError> {
    let unit = match units {
        Units::Unitless => options
            .assume_units
            .ok_or_else(|| ImportError::UnitResolution {
                reason: "DXF $INSUNITS is unitless and no units are assumed".to_string(),
            })?,
        Units::Millimeters => LengthUnit::Millimeter,
        Units::Centimeters => LengthUnit::Centimeter,
        Units::Meters => LengthUnit::Meter,
        Units::Inches => LengthUnit::Inch,
        Units::Feet => LengthUnit::Foot,
        other => {
            return Err(ImportError::UnitResolution {
                reason: format!("unsupported DXF $INSUNITS {other:?}"),
            })
        }
    };
    Ok(unit.to_mm())
}

fn pt(p: &::dxf::Point) -> Point {
    Point::new(p.x, p.y)
}

type Vec3 = [f64; 3];

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn unit(v: Vec3) -> Option<Vec3> {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    (len > 1e-12).then(|| [v[0] / len, v[1] / len, v[2] / len])
}

fn vec3(v: &Vector) -> Vec3 {
    [v.x, v.y, v.z]
}

/// Object coordinate system of a planar entity, projected onto the world XY
/// plane. `elevation` is the entity's OCS Z.
///
/// Follows the DXF arbitrary-axis rule, so a `(0, 0, -1)` extrusion mirrors X.
fn ocs_to_world(normal: &Vector, elevation: f64) -> Affine {
    const LIMIT: f64 = 1.0 / 64.0;
    let Some(n) = unit(vec3(normal)) else {
        return Affine::IDENTITY;
    };
    let axis_x = if n[0].abs() < LIMIT && n[1].abs() < LIMIT {
        cross([0.0, 1.0, 0.0], n)
    } else {
        cross([0.0, 0.0, 1.0], n)
    };
    let Some(ax) = unit(axis_x) else {
        return Affine::IDENTITY;
    };
    let ay = cross(n, ax);
    Affine::new([
        ax[0],
        ax[1],
        ay[0],
        ay[1],
        n[0] * elevation,
        n[1] * elevation,
    ])
}

fn to_world(shapes: Shapes, ocs: Affine) -> Shapes {
    if ocs == Affine::IDENTITY {
        return shapes;
    }
    shapes
        .into_iter()
        .map(|(prims, closed)| (prims.iter().map(|p| p.transform(&ocs)).collect(), closed))
        .collect()
}

/// Primitives for one entity in world coordinates, or `None` when the entity
/// type is unsupported.
fn entity_shapes(entity: &Entity, location: SourceLocation) -> Result<Option<Shapes>, ImportError> {
    let shapes = match &entity.specific {
        EntityType::Line(line) => {
            let (p0, p1) = (pt(&line.p1), pt(&line.p2));
            if p0 == p1 {
                Vec::new()
            } else {
                vec![(vec![Primitive::Line(Line::new(p0, p1))], false)]
            }
        }
        EntityType::Circle(circle) => {
            if circle.radius <= 0.0 {
                Vec::new()
            } else {
                let arc = EllipticalArc::circle(pt(&circle.center), circle.radius);
                let ocs = ocs_to_world(&circle.normal, circle.center.z);
                to_world(vec![(vec![Primitive::Arc(arc)], true)], ocs)
            }
        }
        EntityType::Arc(arc) => {
            // DXF arcs run counter-clockwise from start to end angle, in degrees.
            let mut sweep = (arc.end_angle - arc.start_angle).rem_euclid(360.0);
            if sweep == 0.0 {
                sweep = 360.0;
            }
            let prim = EllipticalArc::circular(
                pt(&arc.center),
                arc.radius,
                arc.start_angle.to_radians(),
                sweep.to_radians(),
            );
            let ocs = ocs_to_world(&arc.normal, arc.center.z);
            to_world(vec![(vec![Primitive::Arc(prim)], prim.is_full())], ocs)
        }
        EntityType::Ellipse(ellipse) => {
            // Centre and major axis are world coordinates; the extrusion only
            // decides which side the minor axis lies on.
            let major = vec3(&ellipse.major_axis);
            let normal = unit(vec3(&ellipse.normal)).unwrap_or([0.0, 0.0, 1.0]);
            let minor = cross(normal, major);
            let mut sweep = ellipse.end_parameter - ellipse.start_parameter;
            if sweep <= 0.0 {
                sweep += TAU;
            }
            let prim = EllipticalArc {
                center: pt(&ellipse.center),
                u: Vec2::new(major[0], major[1]),
                v: Vec2::new(minor[0], minor[1]) * ellipse.minor_axis_ratio,
                start_angle: ellipse.start_parameter,
                sweep_angle: sweep,
            };
            vec![(vec![Primitive::Arc(prim)], prim.is_full())]
        }
        EntityType::LwPolyline(poly) => {
            let vertices: Vec<(Point, f64)> = poly
                .vertices
                .iter()
                .map(|v| (Point::new(v.x, v.y), v.bulge))
                .collect();
            let ocs = ocs_to_world(&poly.extrusion_direction, entity.common.elevation);
            to_world(polyline_shapes(&vertices, poly.flags & 1 != 0), ocs)
        }
        EntityType::Polyline(poly) => {
            let vertices: Vec<(Point, f64)> = poly
                .vertices()
                .map(|v| (pt(&v.location), v.bulge))
                .collect();
            let shapes = polyline_shapes(&vertices, poly.flags & 1 != 0);
            // 3D polylines and meshes are already in world coordinates.
            if poly.flags & (8 | 16) == 0 {
                to_world(shapes, ocs_to_world(&poly.normal, poly.location.z))
            } else {
                shapes
            }
        }
        EntityType::Spline(spline) => spline_shapes(spline, location)?,
        _ => return Ok(None),
    };
    Ok(Some(shapes))
}

fn polyline_shapes(vertices: &[(Point, f64)], closed: bool) -> Shapes {
    let n = vertices.len();
    if n < 2 {
        return Vec::new();
    }
    let count = if closed { n } else { n - 1 };
    let primitives: Vec<Primitive> = (0..count)
        .filter_map(|i| {
            let (p0, bulge) = vertices[i];
            let (p1, _) = vertices[(i + 1) % n];
            (p0 != p1).then(|| bulge_segment(p0, p1, bulge))
        })
        .collect();
    if primitives.is_empty() {
        Vec::new()
    } else {
        vec![(primitives, closed)]
    }
}

/// A polyline segment; non-zero bulge is `tan(sweep / 4)`, positive counter-clockwise.
fn bulge_segment(p0: Point, p1: Point, bulge: f64) -> Primitive {
    if bulge.abs() < 1e-12 {
        return Primitive::Line(Line::new(p0, p1));
    }
    let sweep = 4.0 * bulge.atan();
    let chord = p1 - p0;
    let half = 0.5 * chord.hypot();
    let left = Vec2::new(-chord.y, chord.x) / chord.hypot();
    let center = p0.midpoint(p1) + left * (half / (0.5 * sweep).tan());
    let radius = (p0 - center).hypot();
    let start = (p0 - center).atan2();
    Primitive::Arc(EllipticalArc::circular(center, radius, start, sweep))
}

fn spline_shapes(
    spline: &::dxf::entities::Spline,
    location: SourceLocation,
) -> Result<Shapes, ImportError> {
    let closed = spline.flags & 1 != 0;
    let controls: Vec<Point> = spline.control_points.iter().map(pt).collect();
    if controls.is_empty() {
        // Fit-point-only splines are followed as a polyline through the fit points.
        let fits: Vec<(Point, f64)> = spline.fit_points.iter().map(|p| (pt(p), 0.0)).collect();
        if fits.len() < 2 {
            return Err(ImportError::MalformedInput {
                location,
                reason: "SPLINE has neither control nor fit points".to_string(),
            });
        }
        return Ok(polyline_shapes(&fits, closed));
    }

    let degree = usize::try_from(spline.degree_of_curve).unwrap_or(0);
    let curve = BSpline::new(degree, spline.knot_values.clone(), controls.clone())
        .or_else(|| BSpline::new(degree, Vec::new(), controls))
        .ok_or_else(|| ImportError::MalformedInput {
            location,
            reason: format!(
                "SPLINE of degree {} with {} control points is not a valid B-spline",
                spline.degree_of_curve,
                spline.control_points.len()
            ),
        })?;
    Ok(vec![(vec![Primitive::Spline(curve)], closed)])
}

/// Entity type name for diagnostics, e.g. `Text` or `Insert`.
fn entity_kind(specific: &EntityType) -> String {
    let debug = format!("{specific:?}");
    debug
        .split(['(', ' ', '{'])
        .next()
        .unwrap_or("entity")
        .to_string()
}

fn entity_color(entity: &Entity, layers: &HashMap<String, Color>) -> Option<String> {
    let color = if entity.common.color.is_by_layer() {
        layers.get(&entity.common.layer)?
    } else {
        &entity.common.color
    };
    color.index().map(aci_to_hex)
}

/// AutoCAD colour index to `#rrggbb` for the standard colours.
fn aci_to_hex(index: u8) -> String {
    match index {
        1 => "#ff0000".to_string(),
        2 => "#ffff00".to_string(),
        3 => "#00ff00".to_string(),
        4 => "#00ffff".to_string(),
        5 => "#0000ff".to_string(),
        6 => "#ff00ff".to_string(),
        7 => "#ffffff".to_string(),
        8 => "#808080".to_string(),
        9 => "#c0c0c0".to_string(),
        other => format!("aci:{other}"),
    }
}
