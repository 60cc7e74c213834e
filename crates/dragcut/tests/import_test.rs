use approx::assert_relative_eq;
use dragcut::*;
use kurbo::Point;

fn svg(body: &str, size: &str) -> String {
    format!(r#"<svg xmlns="http://www.w3.org/2000/svg" {size}>{body}</svg>"#)
}

fn only_path(doc: ImportedDocument) -> ImportedPath {
    let mut paths = doc.into_paths();
    assert_eq!(paths.len(), 1, "Expected exactly one imported path");
    paths.remove(0)
}

#[test]
fn test_svg_inch_page_scales_to_mm_and_flips_y() {
    let text = svg(
        r#"<line x1="0" y1="0" x2="100" y2="0"/>"#,
        r#"width="1in" height="1in" viewBox="0 0 100 100""#,
    );
    let doc = import_svg(&text, &ImportOptions::default()).unwrap();
    assert_eq!(doc.size, Some((25.4, 25.4)));
    let path = only_path(doc);
    let start = path.primitives[0].start();
    let end = path.primitives[0].end();
    assert_relative_eq!(start.x, 0.0, epsilon = 1e-9);
    assert_relative_eq!(start.y, 25.4, epsilon = 1e-9);
    assert_relative_eq!(end.x, 25.4, epsilon = 1e-9);
    assert_relative_eq!(end.y, 25.4, epsilon = 1e-9);
}

#[test]
fn test_svg_nested_transforms_compose() {
    let text = svg(
        r#"<g transform="translate(10,0)"><g transform="scale(2)"><line x1="1" y1="1" x2="2" y2="1"/></g></g>"#,
        r#"width="100mm" height="100mm" viewBox="0 0 100 100""#,
    );
    let path = only_path(import_svg(&text, &ImportOptions::default()).unwrap());
    // (1, 1) -> scale -> (2, 2) -> translate -> (12, 2) -> flip -> (12, 98)
    let start = path.primitives[0].start();
    assert_relative_eq!(start.x, 12.0, epsilon = 1e-9);
    assert_relative_eq!(start.y, 98.0, epsilon = 1e-9);
}

#[test]
fn test_svg_rotate_about_centre() {
    let text = svg(
        r#"<line x1="60" y1="50" x2="70" y2="50" transform="rotate(90 50 50)"/>"#,
        r#"width="100mm" height="100mm" viewBox="0 0 100 100""#,
    );
    let path = only_path(import_svg(&text, &ImportOptions::default()).unwrap());
    let start = path.primitives[0].start();
    // (60, 50) rotated 90 degrees about (50, 50) is (50, 60), flipped to (50, 40).
    assert_relative_eq!(start.x, 50.0, epsilon = 1e-9);
    assert_relative_eq!(start.y, 40.0, epsilon = 1e-9);
}

#[test]
fn test_svg_layers_from_groups() {
    let text = svg(
        r#"<g id="outline"><rect x="0" y="0" width="10" height="10"/></g><circle cx="50" cy="50" r="5"/>"#,
        r#"width="100mm" height="100mm" viewBox="0 0 100 100""#,
    );
    let doc = import_svg(&text, &ImportOptions::default()).unwrap();
    assert_eq!(doc.path_count(), 2);
    assert!(doc.layers.contains_key("outline"));
    assert!(doc.layers.contains_key("0"));
    let paths = doc.into_paths();
    assert_eq!(paths[0].layer, "outline");
    assert!(paths[0].closed && paths[1].closed);
}

#[test]
fn test_svg_without_size_needs_assumed_units() {
    let text = svg(r#"<path d="M0 0 L10 0"/>"#, r#"viewBox="0 0 100 50""#);
    let err = import_svg(&text, &ImportOptions::default()).unwrap_err();
    assert!(matches!(err, ImportError::UnitResolution { .. }));

    let options = ImportOptions {
        assume_units: Some(LengthUnit::Millimeter),
        ..ImportOptions::default()
    };
    let doc = import_svg(&text, &options).unwrap();
    assert_eq!(doc.size, Some((100.0, 50.0)));
}

#[test]
fn test_svg_unsupported_element() {
    let text = svg(
        r#"<text x="0" y="0">hello</text><path d="M0 0 L10 0"/>"#,
        r#"width="100mm" height="100mm" viewBox="0 0 100 100""#,
    );
    let err = import_svg(&text, &ImportOptions::default()).unwrap_err();
    match err {
        ImportError::UnsupportedGeometry { kind, .. } => assert_eq!(kind, "text"),
        other => panic!("expected UnsupportedGeometry, got {other:?}"),
    }

    let options = ImportOptions {
        skip_unsupported: true,
        ..ImportOptions::default()
    };
    let doc = import_svg(&text, &options).unwrap();
    assert_eq!(doc.path_count(), 1);
    assert!(matches!(
        doc.warnings.as_slice(),
        [CompileWarning::SkippedElement { .. }]
    ));
}

#[test]
fn test_svg_malformed_inputs() {
    let options = ImportOptions::default();
    assert!(matches!(
        import_svg("<html></html>", &options),
        Err(ImportError::MalformedInput { .. })
    ));
    let text = svg(
        r#"<path d="M0 0 L10"/>"#,
        r#"width="100mm" height="100mm" viewBox="0 0 100 100""#,
    );
    match import_svg(&text, &options) {
        Err(ImportError::MalformedInput { location, .. }) => {
            assert_eq!(location.entity, 0, "Entities are counted from zero");
            assert!(location.offset.is_some());
        }
        other => panic!("expected MalformedInput, got {other:?}"),
    }
}

#[test]
fn test_svg_absolute_coordinates_are_page_millimetres() {
    // One user unit is 10 mm on this page.
    let text = svg(
        r#"<line x1="5mm" y1="0" x2="2" y2="0"/><g transform="scale(2)"><line x1="4mm" y1="0" x2="1" y2="0"/></g>"#,
        r#"width="100mm" height="100mm" viewBox="0 0 10 10""#,
    );
    let paths = import_svg(&text, &ImportOptions::default())
        .unwrap()
        .into_paths();
    assert_eq!(paths.len(), 2);
    assert_relative_eq!(paths[0].primitives[0].start().x, 5.0, epsilon = 1e-9);
    assert_relative_eq!(paths[0].primitives[0].end().x, 20.0, epsilon = 1e-9);
    assert_relative_eq!(paths[1].primitives[0].start().x, 4.0, epsilon = 1e-9);
    assert_relative_eq!(paths[1].primitives[0].end().x, 20.0, epsilon = 1e-9);
}

#[test]
fn test_svg_defs_are_ignored() {
    let text = svg(
        r#"<defs><path id="p" d="M0 0 L10 0"/></defs><path d="M0 0 L5 0"/>"#,
        r#"width="100mm" height="100mm" viewBox="0 0 100 100""#,
    );
    let doc = import_svg(&text, &ImportOptions::default()).unwrap();
    assert_eq!(doc.path_count(), 1);
}

fn dxf_bytes(build: impl FnOnce(&mut dxf::Drawing), units: dxf::enums::Units) -> Vec<u8> {
    let mut drawing = dxf::Drawing::new();
    drawing.header.version = dxf::enums::AcadVersion::R2000;
    drawing.header.default_drawing_units = units;
    build(&mut drawing);
    let mut buffer = Vec::new();
    drawing.save(&mut buffer).expect("save DXF");
    buffer
}

#[test]
fn test_dxf_lines_and_circles() {
    use dxf::entities::{Circle, Entity, EntityType, Line};
    let bytes = dxf_bytes(
        |drawing| {
            drawing.add_entity(Entity::new(EntityType::Line(Line::new(
                dxf::Point::new(0.0, 0.0, 0.0),
                dxf::Point::new(10.0, 0.0, 0.0),
            ))));
            drawing.add_entity(Entity::new(EntityType::Circle(Circle::new(
                dxf::Point::new(20.0, 20.0, 0.0),
                5.0,
            ))));
        },
        dxf::enums::Units::Millimeters,
    );
    let doc = import_bytes(&bytes, InputFormat::Dxf, &ImportOptions::default()).unwrap();
    let paths = doc.into_paths();
    assert_eq!(paths.len(), 2);
    assert!(!paths[0].closed);
    assert_eq!(paths[0].primitives[0].end(), Point::new(10.0, 0.0));
    assert!(paths[1].closed);
    let on_circle = paths[1].primitives[0].eval(0.25);
    assert_relative_eq!(on_circle.distance(Point::new(20.0, 20.0)), 5.0, epsilon = 1e-9);
}

#[test]
fn test_dxf_inches_scale_to_mm() {
    use dxf::entities::{Entity, EntityType, Line};
    let bytes = dxf_bytes(
        |drawing| {
            drawing.add_entity(Entity::new(EntityType::Line(Line::new(
                dxf::Point::new(0.0, 0.0, 0.0),
                dxf::Point::new(1.0, 0.0, 0.0),
            ))));
        },
        dxf::enums::Units::Inches,
    );
    let path = only_path(import_bytes(&bytes, InputFormat::Dxf, &ImportOptions::default()).unwrap());
    assert_relative_eq!(path.primitives[0].end().x, 25.4, epsilon = 1e-9);
}

#[test]
fn test_dxf_unitless_needs_assumed_units() {
    use dxf::entities::{Entity, EntityType, Line};
    let bytes = dxf_bytes(
        |drawing| {
            drawing.add_entity(Entity::new(EntityType::Line(Line::new(
                dxf::Point::new(0.0, 0.0, 0.0),
                dxf::Point::new(1.0, 0.0, 0.0),
            ))));
        },
        dxf::enums::Units::Unitless,
    );
    let err = import_bytes(&bytes, InputFormat::Dxf, &ImportOptions::default()).unwrap_err();
    assert!(matches!(err, ImportError::UnitResolution { .. }));

    let options = ImportOptions {
        assume_units: Some(LengthUnit::Centimeter),
        ..ImportOptions::default()
    };
    let path = only_path(import_bytes(&bytes, InputFormat::Dxf, &options).unwrap());
    assert_relative_eq!(path.primitives[0].end().x, 10.0, epsilon = 1e-9);
}

#[test]
fn test_dxf_garbage_is_malformed() {
    let err = import_bytes(b"this is not a drawing\n", InputFormat::Dxf, &ImportOptions::default())
        .unwrap_err();
    assert!(matches!(err, ImportError::MalformedInput { .. }));
}

fn dxf_paths(build: impl FnOnce(&mut dxf::Drawing)) -> Vec<ImportedPath> {
    let bytes = dxf_bytes(build, dxf::enums::Units::Millimeters);
    import_bytes(&bytes, InputFormat::Dxf, &ImportOptions::default())
        .unwrap()
        .into_paths()
}

fn assert_point(actual: Point, x: f64, y: f64) {
    assert_relative_eq!(actual.x, x, epsilon = 1e-9);
    assert_relative_eq!(actual.y, y, epsilon = 1e-9);
}

#[test]
fn test_dxf_arc_runs_counter_clockwise_in_degrees() {
    use dxf::entities::{Arc, Entity, EntityType};
    let paths = dxf_paths(|drawing| {
        drawing.add_entity(Entity::new(EntityType::Arc(Arc::new(
            dxf::Point::new(10.0, 0.0, 0.0),
            5.0,
            0.0,
            90.0,
        ))));
    });
    assert_eq!(paths.len(), 1);
    assert!(!paths[0].closed);
    let arc = &paths[0].primitives[0];
    assert_point(arc.start(), 15.0, 0.0);
    assert_point(arc.end(), 10.0, 5.0);
    let half = std::f64::consts::FRAC_1_SQRT_2 * 5.0;
    assert_point(arc.eval(0.5), 10.0 + half, half);
}

#[test]
fn test_dxf_mirrored_extrusion_flips_x() {
    use dxf::entities::{Arc, Ellipse, Entity, EntityType};
    let paths = dxf_paths(|drawing| {
        let mut arc = Arc::new(dxf::Point::new(10.0, 0.0, 0.0), 5.0, 0.0, 90.0);
        arc.normal = dxf::Vector::new(0.0, 0.0, -1.0);
        drawing.add_entity(Entity::new(EntityType::Arc(arc)));

        let ellipse = Ellipse {
            center: dxf::Point::new(50.0, 50.0, 0.0),
            major_axis: dxf::Vector::new(10.0, 0.0, 0.0),
            normal: dxf::Vector::new(0.0, 0.0, -1.0),
            minor_axis_ratio: 0.5,
            start_parameter: 0.0,
            end_parameter: std::f64::consts::TAU,
            ..Default::default()
        };
        drawing.add_entity(Entity::new(EntityType::Ellipse(ellipse)));
    });
    assert_eq!(paths.len(), 2);
    // Object coordinates mirror in X; the arc turns clockwise in the world.
    assert_point(paths[0].primitives[0].start(), -15.0, 0.0);
    assert_point(paths[0].primitives[0].end(), -10.0, 5.0);
    // Ellipse centre stays in world coordinates; its minor axis points down.
    assert!(paths[1].closed);
    assert_point(paths[1].primitives[0].start(), 60.0, 50.0);
    assert_point(paths[1].primitives[0].eval(0.25), 50.0, 45.0);
}

#[test]
fn test_dxf_lwpolyline_bulge_and_closing_segment() {
    use dxf::entities::{Entity, EntityType, LwPolyline};
    use dxf::LwPolylineVertex;
    let vertex = |x: f64, y: f64, bulge: f64| LwPolylineVertex {
        x,
        y,
        bulge,
        ..Default::default()
    };
    let paths = dxf_paths(|drawing| {
        let mut open = LwPolyline::default();
        open.vertices = vec![vertex(0.0, 0.0, 1.0), vertex(10.0, 0.0, 0.0)];
        drawing.add_entity(Entity::new(EntityType::LwPolyline(open)));

        let mut closed = LwPolyline::default();
        closed.flags = 1;
        closed.vertices = vec![
            vertex(20.0, 0.0, 0.0),
            vertex(30.0, 0.0, 0.0),
            vertex(30.0, 10.0, 0.0),
        ];
        drawing.add_entity(Entity::new(EntityType::LwPolyline(closed)));
    });
    assert_eq!(paths.len(), 2);

    assert!(!paths[0].closed);
    let bulged = &paths[0].primitives[0];
    assert!(matches!(bulged, Primitive::Arc(_)));
    assert_point(bulged.end(), 10.0, 0.0);
    assert_point(bulged.eval(0.5), 5.0, -5.0);

    assert!(paths[1].closed);
    assert_eq!(paths[1].primitives.len(), 3);
    assert_point(paths[1].primitives[2].end(), 20.0, 0.0);
}

#[test]
fn test_dxf_spline_keeps_its_control_polygon() {
    use dxf::entities::{Entity, EntityType, Spline};
    let paths = dxf_paths(|drawing| {
        let spline = Spline {
            degree_of_curve: 3,
            knot_values: vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0],
            control_points: vec![
                dxf::Point::new(0.0, 0.0, 0.0),
                dxf::Point::new(0.0, 10.0, 0.0),
                dxf::Point::new(10.0, 10.0, 0.0),
                dxf::Point::new(10.0, 0.0, 0.0),
            ],
            ..Default::default()
        };
        drawing.add_entity(Entity::new(EntityType::Spline(spline)));
    });
    assert_eq!(paths.len(), 1);
    let curve = &paths[0].primitives[0];
    assert!(matches!(curve, Primitive::Spline(_)));
    assert_point(curve.start(), 0.0, 0.0);
    assert_point(curve.end(), 10.0, 0.0);
    // A single-span cubic B-spline is the Bezier curve on the same points.
    assert_point(curve.eval(0.5), 5.0, 7.5);
}

#[test]
fn test_dxf_paper_space_entities_are_left_out() {
    use dxf::entities::{Entity, EntityType, Line};
    let paths = dxf_paths(|drawing| {
        let mut title_block = Entity::new(EntityType::Line(Line::new(
            dxf::Point::new(0.0, 0.0, 0.0),
            dxf::Point::new(297.0, 0.0, 0.0),
        )));
        title_block.common.is_in_paper_space = true;
        drawing.add_entity(title_block);
        drawing.add_entity(Entity::new(EntityType::Line(Line::new(
            dxf::Point::new(0.0, 0.0, 0.0),
            dxf::Point::new(10.0, 0.0, 0.0),
        ))));
    });
    assert_eq!(paths.len(), 1);
    assert_point(paths[0].primitives[0].end(), 10.0, 0.0);
}
