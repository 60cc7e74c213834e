use super::flatten::{dedup_points, Flattener};
use crate::config::CompilerConfig;
use crate::error::CompileWarning;
use crate::import::ImportedPath;
use crate::types::PathEntity;
use kurbo::Point;
use tracing::{debug, warn};

/// Points closer than this are the same point.
const COINCIDENT: f64 = 1e-9;

/// Flattened paths plus the anomalies met on the way.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub paths: Vec<PathEntity>,
    pub warnings: Vec<CompileWarning>,
    /// Curve pieces accepted at the depth bound.
    pub divergences: usize,
}

/// Flatten imported paths and clean them up: duplicate points removed,
/// connected open paths chained, short paths dropped.
pub fn normalize_paths(paths: &[ImportedPath], config: &CompilerConfig) -> Normalized {
    let flattener = Flattener::new(config.chord_tolerance, config.max_subdivision_depth);
    let mut out = Normalized::default();

    let mut flat = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(first) = path.primitives.first() else {
            continue;
        };
        let mut points = vec![first.start()];
        for prim in &path.primitives {
            for divergence in flattener.flatten_into(prim, &mut points) {
                warn!(
                    path = path.source,
                    kind = prim.kind(),
                    depth = divergence.depth,
                    deviation = divergence.deviation,
                    "curve did not converge within the subdivision bound"
                );
                out.divergences += 1;
                out.warnings.push(CompileWarning::FlattenDivergence {
                    path: path.source,
                    depth: divergence.depth,
                    deviation: divergence.deviation,
                });
            }
        }
        if let Some(entity) = clean_path(points, path.closed, path) {
            flat.push(entity);
        }
    }

    let joined = join_paths(flat, config.join_tolerance);
    let before = joined.len();
    out.paths = joined
        .into_iter()
        .filter(|p| p.length() >= config.min_segment_length)
        .collect();
    debug!(
        imported = paths.len(),
        kept = out.paths.len(),
        dropped_short = before - out.paths.len(),
        "normalized paths"
    );
    out
}

/// Enforce the polyline invariants, or drop the path when fewer than two
/// distinct points remain.
fn clean_path(mut points: Vec<Point>, closed: bool, source: &ImportedPath) -> Option<PathEntity> {
    dedup_points(&mut points, COINCIDENT);
    let mut closed = closed;
    if points.len() > 1 && points[0].distance(points[points.len() - 1]) <= COINCIDENT {
        points.pop();
        closed = true;
    }
    if points.len() < 3 && closed {
        closed = false;
    }
    if points.len() < 2 {
        return None;
    }
    Some(PathEntity {
        polyline: points,
        closed,
        tool_state: source.tool_state,
        layer: source.layer.clone(),
        feed_override: source.feed_override,
        source: source.source,
    })
}

fn joinable(a: &PathEntity, b: &PathEntity) -> bool {
    !b.closed && a.layer == b.layer && a.tool_state == b.tool_state && a.feed_override == b.feed_override
}

/// Chain open paths whose endpoints meet within `tolerance`.
///
/// Paths are visited in document order and each chain grows at its tail and
/// then its head, taking the lowest-numbered candidate first. A chain whose
/// ends meet becomes closed.
pub fn join_paths(paths: Vec<PathEntity>, tolerance: f64) -> Vec<PathEntity> {
    let mut used = vec![false; paths.len()];
    let mut out = Vec::with_capacity(paths.len());

    for i in 0..paths.len() {
        if used[i] {
            continue;
        }
        used[i] = true;
        let mut chain = paths[i].clone();
        if chain.closed {
            out.push(chain);
            continue;
        }

        // Grow at the tail.
        while let Some((j, reversed)) = find_neighbor(&paths, &used, &chain, chain.end(), tolerance) {
            used[j] = true;
            let mut next = paths[j].polyline.clone();
            if reversed {
                next.reverse();
            }
            chain.polyline.extend(next.into_iter().skip(1));
            chain.source = chain.source.min(paths[j].source);
        }
        // Then at the head.
        while let Some((j, reversed)) =
            find_neighbor(&paths, &used, &chain, chain.start(), tolerance)
        {
            used[j] = true;
            let mut prev = paths[j].polyline.clone();
            // The neighbour must end where the chain starts.
            if !reversed {
                prev.reverse();
            }
            prev.pop();
            prev.extend(chain.polyline.iter().copied());
            chain.polyline = prev;
            chain.source = chain.source.min(paths[j].source);
        }

        let n = chain.polyline.len();
        if n > 3 && chain.polyline[0].distance(chain.polyline[n - 1]) <= tolerance {
            chain.polyline.pop();
            chain.closed = true;
        }
        out.push(chain);
    }
    out
}

/// First unused open path with an end within `tolerance` of `at`.
///
/// `reversed` is true when the path's end, not its start, touches `at`.
fn find_neighbor(
    paths: &[PathEntity],
    used: &[bool],
    chain: &PathEntity,
    at: Point,
    tolerance: f64,
) -> Option<(usize, bool)> {
    paths.iter().enumerate().find_map(|(j, candidate)| {
        if used[j] || !joinable(chain, candidate) {
            return None;
        }
        if candidate.start().distance(at) <= tolerance {
            Some((j, false))
        } else if candidate.end().distance(at) <= tolerance {
            Some((j, true))
        } else {
            None
        }
    })
}
