use crate::config::Placement;
use crate::types::{bounds_of, PathEntity};
use kurbo::{Affine, Point};

/// Position the job on the bed: mirror about the drawing's centre, align
/// its lower-left corner to the origin, then shift by the offset.
pub fn apply_placement(paths: &mut [PathEntity], placement: &Placement) {
    let all: Vec<Point> = paths
        .iter()
        .flat_map(|p| p.polyline.iter().copied())
        .collect();
    let Some(bounds) = bounds_of(&all) else {
        return;
    };

    let mut affine = Affine::IDENTITY;
    if placement.mirror_x {
        affine = Affine::new([-1.0, 0.0, 0.0, 1.0, bounds.x0 + bounds.x1, 0.0]) * affine;
    }
    if placement.mirror_y {
        affine = Affine::new([1.0, 0.0, 0.0, -1.0, 0.0, bounds.y0 + bounds.y1]) * affine;
    }
    if placement.align_to_origin {
        affine = Affine::translate((-bounds.x0, -bounds.y0)) * affine;
    }
    affine = Affine::translate(placement.offset) * affine;

    if affine == Affine::IDENTITY {
        return;
    }
    for path in paths.iter_mut() {
        for p in path.polyline.iter_mut() {
            *p = affine * *p;
        }
    }
}
