//! Containment-respecting, travel-minimising path order.

use crate::types::PathEntity;
use geo::{Contains, Intersects};
use kurbo::{Point, Rect};
use tracing::debug;

/// Precedence constraints between paths, indexed by arena position.
#[derive(Debug, Clone, Default)]
pub struct PrecedenceGraph {
    /// `successors[a]` holds every path that must come after `a`.
    successors: Vec<Vec<usize>>,
    predecessor_count: Vec<usize>,
}

impl PrecedenceGraph {
    fn new(n: usize) -> Self {
        Self {
            successors: vec![Vec::new(); n],
            predecessor_count: vec![0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    /// Whether `a` is constrained to come directly before `b`.
    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.successors[a].contains(&b)
    }

    pub fn edge_count(&self) -> usize {
        self.successors.iter().map(Vec::len).sum()
    }

    fn add_edge(&mut self, a: usize, b: usize) {
        if !self.has_edge(a, b) {
            self.successors[a].push(b);
            self.predecessor_count[b] += 1;
        }
    }

    fn reaches(&self, from: usize, to: usize) -> bool {
        let mut seen = vec![false; self.len()];
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if std::mem::replace(&mut seen[node], true) {
                continue;
            }
            stack.extend(self.successors[node].iter().copied());
        }
        false
    }
}

struct Shape {
    bounds: Rect,
    polygon: Option<geo::Polygon<f64>>,
    segments: Vec<geo::Line<f64>>,
}

impl Shape {
    fn new(path: &PathEntity) -> Self {
        let coords: Vec<(f64, f64)> = path.polyline.iter().map(|p| (p.x, p.y)).collect();
        let polygon = path
            .closed
            .then(|| geo::Polygon::new(geo::LineString::from(coords), Vec::new()));
        let segments = path
            .segments()
            .map(|(a, b)| geo::Line::new((a.x, a.y), (b.x, b.y)))
            .collect();
        Self {
            bounds: path.bounds(),
            polygon,
            segments,
        }
    }
}

fn rect_within(inner: Rect, outer: Rect) -> bool {
    inner.x0 >= outer.x0 && inner.y0 >= outer.y0 && inner.x1 <= outer.x1 && inner.y1 <= outer.y1
}

fn rects_touch(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}

/// Whether closed `outer` encloses every vertex of `inner`.
fn encloses(outer: &Shape, inner: &PathEntity, inner_shape: &Shape) -> bool {
    let Some(polygon) = &outer.polygon else {
        return false;
    };
    rect_within(inner_shape.bounds, outer.bounds)
        && inner_shape.bounds != outer.bounds
        && inner
            .polyline
            .iter()
            .all(|p| polygon.contains(&geo::Point::new(p.x, p.y)))
}

fn crosses(a: &Shape, b: &Shape) -> bool {
    rects_touch(a.bounds, b.bounds)
        && a.segments
            .iter()
            .any(|sa| b.segments.iter().any(|sb| sa.intersects(sb)))
}

/// Build the precedence graph: enclosed paths before their enclosures, and
/// optionally crossing paths in document order when that adds no cycle.
pub fn build_precedence(paths: &[PathEntity], preserve_overlap_order: bool) -> PrecedenceGraph {
    let shapes: Vec<Shape> = paths.iter().map(Shape::new).collect();
    let mut graph = PrecedenceGraph::new(paths.len());

    for (outer, outer_shape) in shapes.iter().enumerate() {
        for (inner, inner_shape) in shapes.iter().enumerate() {
            if inner != outer && encloses(outer_shape, &paths[inner], inner_shape) {
                graph.add_edge(inner, outer);
            }
        }
    }
    let nested = graph.edge_count();

    if preserve_overlap_order {
        let mut by_source: Vec<usize> = (0..paths.len()).collect();
        by_source.sort_by_key(|&i| (paths[i].source, i));
        for (pos, &a) in by_source.iter().enumerate() {
            for &b in &by_source[pos + 1..] {
                if graph.has_edge(a, b)
                    || graph.has_edge(b, a)
                    || !crosses(&shapes[a], &shapes[b])
                    || graph.reaches(b, a)
                {
                    continue;
                }
                graph.add_edge(a, b);
            }
        }
    }
    debug!(
        paths = paths.len(),
        nested,
        crossing = graph.edge_count() - nested,
        "built precedence graph"
    );
    graph
}

/// Cheapest way into a path from `from`: distance, vertex index, reversed.
fn best_entry(path: &PathEntity, from: Point) -> (f64, usize, bool) {
    if path.closed {
        let (index, dist) = path
            .polyline
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.distance(from)))
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .unwrap_or((0, f64::INFINITY));
        (dist, index, false)
    } else {
        let to_start = path.start().distance(from);
        let to_end = path.end().distance(from);
        if to_end < to_start {
            (to_end, 0, true)
        } else {
            (to_start, 0, false)
        }
    }
}

/// Rotate or reverse a path so it starts at the chosen entry.
fn enter(mut path: PathEntity, vertex: usize, reversed: bool) -> PathEntity {
    if path.closed {
        path.polyline.rotate_left(vertex);
    } else if reversed {
        path.polyline.reverse();
    }
    path
}

/// Order paths greedily by nearest entry from `start`, never placing a path
/// before one it must follow. Ties go to the lower source index.
pub fn order_paths(
    paths: Vec<PathEntity>,
    start: Point,
    preserve_overlap_order: bool,
) -> Vec<PathEntity> {
    let graph = build_precedence(&paths, preserve_overlap_order);
    let mut waiting = graph.predecessor_count.clone();
    let mut slots: Vec<Option<PathEntity>> = paths.into_iter().map(Some).collect();
    let mut ready: Vec<usize> = (0..slots.len()).filter(|&i| waiting[i] == 0).collect();
    let mut ordered = Vec::with_capacity(slots.len());
    let mut position = start;

    while !ready.is_empty() {
        let (slot, (_, vertex, reversed)) = ready
            .iter()
            .enumerate()
            .filter_map(|(slot, &i)| {
                slots[i]
                    .as_ref()
                    .map(|path| (slot, best_entry(path, position), path.source, i))
            })
            .min_by(|a, b| {
                a.1 .0
                    .total_cmp(&b.1 .0)
                    .then(a.2.cmp(&b.2))
                    .then(a.3.cmp(&b.3))
            })
            .map(|(slot, entry, _, _)| (slot, entry))
            .unwrap_or((0, (0.0, 0, false)));

        let index = ready.swap_remove(slot);
        let Some(path) = slots[index].take() else {
            continue;
        };
        let path = enter(path, vertex, reversed);
        position = path.end();
        ordered.push(path);

        for &next in &graph.successors[index] {
            waiting[next] -= 1;
            if waiting[next] == 0 {
                ready.push(next);
            }
        }
    }

    // The graph is acyclic by construction, so every path has been placed.
    debug_assert!(slots.iter().all(Option::is_none));
    ordered
}
