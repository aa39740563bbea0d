//! Connector graph layout
//!
//! Items are nodes, connectors between two nodes are edges. Each connected
//! component with at least two edges is laid out by stress majorization:
//! ideal distances are graph distances times the ideal edge length, and the
//! layout iteratively moves every node toward the position that best matches
//! them. Directed edges add a vertical separation constraint that is
//! re-projected with VPSC after every sweep.
//!
//! Components are then pushed apart so they do not overlap, and with
//! `avoid_overlaps` every node is finally separated from every other.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use vellum_core::{Document, ItemId, Point, Rect};

use crate::error::Result;
use crate::overlap::{apply_moves, padded, separate_rects};
use crate::vpsc::{self, Constraint, Variable};

/// Relative stress change that ends the iteration
const STRESS_TOLERANCE: f64 = 1e-4;

const MAX_ITERATIONS: usize = 100;

/// Graph layout settings
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GraphLayoutOptions {
    /// Target length of every edge
    pub ideal_edge_length: f64,
    /// Point arrowed connectors downward
    pub directed: bool,
    /// Vertical separation of a directed edge, in ideal edge lengths
    pub directed_height_modifier: f64,
    pub avoid_overlaps: bool,
    /// Margin added around every node
    pub connector_spacing: f64,
}

impl Default for GraphLayoutOptions {
    fn default() -> Self {
        Self {
            ideal_edge_length: 100.0,
            directed: false,
            directed_height_modifier: 1.0,
            avoid_overlaps: false,
            connector_spacing: 3.0,
        }
    }
}

/// What a layout pass did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphLayoutReport {
    pub components: usize,
    /// Components laid out by stress majorization
    pub laid_out: usize,
    /// Sweeps summed over all components
    pub iterations: usize,
    pub moved: usize,
    pub rerouted: usize,
}

#[derive(Clone, Copy, Debug)]
struct Edge {
    source: usize,
    target: usize,
    directed: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────────────────────────────────────

/// Lay out `items` along the connectors between them
///
/// Connectors in `items` become edges; only connectors whose two endpoints
/// are both nodes count. Items without a visual box are ignored.
pub fn graph_layout(
    doc: &mut Document,
    items: &[ItemId],
    options: &GraphLayoutOptions,
) -> Result<GraphLayoutReport> {
    let mut nodes = Vec::new();
    let mut rects = Vec::new();
    let mut index: FxHashMap<ItemId, usize> = FxHashMap::default();
    let mut connectors = Vec::new();
    for &id in items {
        let Some(item) = doc.item(id) else {
            continue;
        };
        if let Some(conn) = item.connector {
            connectors.push(conn);
            continue;
        }
        let Some(bbox) = doc.visual_bbox(id) else {
            tracing::debug!("{:?} has no extent; not a layout node", id);
            continue;
        };
        index.insert(id, nodes.len());
        nodes.push(id);
        let spacing = 2.0 * options.connector_spacing;
        rects.push(padded(&bbox, spacing, spacing));
    }

    let edges: Vec<Edge> = connectors
        .iter()
        .filter_map(|conn| {
            let source = *index.get(&conn.start?)?;
            let target = *index.get(&conn.end?)?;
            (source != target).then_some(Edge {
                source,
                target,
                directed: options.directed && conn.directed && conn.has_arrow,
            })
        })
        .collect();

    let mut report = GraphLayoutReport::default();
    let mut centers: Vec<Point> = rects.iter().map(Rect::center).collect();
    let parts = components(nodes.len(), &edges);
    report.components = parts.len();

    // directed separation, in global node indices
    let separation = options.ideal_edge_length * options.directed_height_modifier;
    let mut directed = Vec::new();
    for component in &parts {
        let member: FxHashMap<usize, usize> =
            component.iter().enumerate().map(|(local, &n)| (n, local)).collect();
        let local_edges: Vec<Edge> = edges
            .iter()
            .filter_map(|e| {
                Some(Edge {
                    source: *member.get(&e.source)?,
                    target: *member.get(&e.target)?,
                    directed: e.directed,
                })
            })
            .collect();
        if local_edges.len() < 2 {
            continue;
        }
        directed.extend(
            local_edges
                .iter()
                .filter(|e| e.directed)
                .map(|e| Constraint::new(component[e.source], component[e.target], separation)),
        );

        let mut points: Vec<Point> = component.iter().map(|&n| centers[n]).collect();
        let iterations = stress_majorization(
            &mut points,
            &local_edges,
            options.ideal_edge_length,
            separation,
        )?;
        report.laid_out += 1;
        report.iterations += iterations;
        for (&n, p) in component.iter().zip(points) {
            centers[n] = p;
        }
    }

    separate_components(&parts, &rects, &mut centers)?;

    if options.avoid_overlaps {
        let placed: Vec<Rect> = rects
            .iter()
            .zip(&centers)
            .map(|(r, c)| recentered(r, *c))
            .collect();
        centers = separate_rects(&placed, &directed)?;
    }

    report.moved = apply_moves(doc, &nodes, &rects, &centers)?;
    report.rerouted = doc.reroute_connectors();
    tracing::debug!(
        "graph layout: {} components, {} laid out in {} sweeps, {} items moved",
        report.components,
        report.laid_out,
        report.iterations,
        report.moved
    );
    Ok(report)
}

fn recentered(rect: &Rect, center: Point) -> Rect {
    let old = rect.center();
    rect.offset(center.x - old.x, center.y - old.y)
}

/// Connected components, in order of their first node
fn components(n: usize, edges: &[Edge]) -> Vec<Vec<usize>> {
    let mut adjacency = vec![Vec::new(); n];
    for e in edges {
        adjacency[e.source].push(e.target);
        adjacency[e.target].push(e.source);
    }
    let mut seen = vec![false; n];
    let mut out = Vec::new();
    for start in 0..n {
        if seen[start] {
            continue;
        }
        seen[start] = true;
        let mut component = vec![start];
        let mut head = 0;
        while head < component.len() {
            let v = component[head];
            head += 1;
            for &w in &adjacency[v] {
                if !seen[w] {
                    seen[w] = true;
                    component.push(w);
                }
            }
        }
        out.push(component);
    }
    out
}

/// Push whole components apart, keeping each one rigid
fn separate_components(components: &[Vec<usize>], rects: &[Rect], centers: &mut [Point]) -> Result<()> {
    if components.len() < 2 {
        return Ok(());
    }
    let bounds: Vec<Rect> = components
        .iter()
        .map(|component| {
            component
                .iter()
                .map(|&n| recentered(&rects[n], centers[n]))
                .reduce(|a, b| a.union(&b))
                .unwrap_or_default()
        })
        .collect();
    let moved = separate_rects(&bounds, &[])?;
    for ((component, bound), to) in components.iter().zip(&bounds).zip(moved) {
        let from = bound.center();
        let (dx, dy) = (to.x - from.x, to.y - from.y);
        for &n in component {
            centers[n] = Point::new(centers[n].x + dx, centers[n].y + dy);
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Stress majorization
// ─────────────────────────────────────────────────────────────────────────────

/// All-pairs hop counts by BFS
fn hop_distances(n: usize, edges: &[Edge]) -> Vec<Vec<f64>> {
    let mut adjacency = vec![Vec::new(); n];
    for e in edges {
        adjacency[e.source].push(e.target);
        adjacency[e.target].push(e.source);
    }
    (0..n)
        .map(|start| {
            let mut dist = vec![f64::INFINITY; n];
            dist[start] = 0.0;
            let mut queue = VecDeque::from([start]);
            while let Some(v) = queue.pop_front() {
                for &w in &adjacency[v] {
                    if dist[w].is_infinite() {
                        dist[w] = dist[v] + 1.0;
                        queue.push_back(w);
                    }
                }
            }
            dist
        })
        .collect()
}

/// Fixed unit direction for coincident nodes
fn jitter(i: usize, j: usize) -> Point {
    let angle = ((i * 37 + j * 101) % 360) as f64 * std::f64::consts::PI / 180.0;
    Point::new(angle.cos(), angle.sin())
}

fn stress(points: &[Point], ideal: &[Vec<f64>]) -> f64 {
    let mut total = 0.0;
    for i in 0..points.len() {
        for j in i + 1..points.len() {
            let d = ideal[i][j];
            if d.is_finite() && d > 0.0 {
                let diff = points[i].distance(points[j]) - d;
                total += diff * diff / (d * d);
            }
        }
    }
    total
}

/// Lay out one component in place. Returns the number of sweeps.
fn stress_majorization(
    points: &mut [Point],
    edges: &[Edge],
    edge_length: f64,
    separation: f64,
) -> Result<usize> {
    let n = points.len();
    let ideal: Vec<Vec<f64>> = hop_distances(n, edges)
        .into_iter()
        .map(|row| row.into_iter().map(|hops| hops * edge_length).collect())
        .collect();
    let constraints: Vec<Constraint> = edges
        .iter()
        .filter(|e| e.directed)
        .map(|e| Constraint::new(e.source, e.target, separation))
        .collect();
    let centroid = |points: &[Point]| {
        let (sx, sy) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point::new(sx / n as f64, sy / n as f64)
    };
    let start = centroid(points);

    let mut previous = stress(points, &ideal);
    let mut iterations = 0;
    while iterations < MAX_ITERATIONS {
        iterations += 1;

        // localized majorization: each node moves to the weighted mean of
        // where its partners would put it
        for i in 0..n {
            let (mut sx, mut sy, mut sw) = (0.0, 0.0, 0.0);
            for j in 0..n {
                let d = ideal[i][j];
                if i == j || !d.is_finite() || d <= 0.0 {
                    continue;
                }
                let w = 1.0 / (d * d);
                let delta = Point::new(points[i].x - points[j].x, points[i].y - points[j].y);
                let len = delta.x.hypot(delta.y);
                let unit = if len > 1e-9 {
                    Point::new(delta.x / len, delta.y / len)
                } else {
                    jitter(i, j)
                };
                sx += w * (points[j].x + d * unit.x);
                sy += w * (points[j].y + d * unit.y);
                sw += w;
            }
            if sw > 0.0 {
                points[i] = Point::new(sx / sw, sy / sw);
            }
        }

        if !constraints.is_empty() {
            let vars: Vec<Variable> = points.iter().map(|p| Variable::new(p.y)).collect();
            let ys = vpsc::solve(&vars, &constraints)?;
            for (p, y) in points.iter_mut().zip(ys) {
                p.y = y;
            }
        }

        let current = stress(points, &ideal);
        let change = if previous > 0.0 {
            (previous - current).abs() / previous
        } else {
            0.0
        };
        tracing::trace!("stress sweep {}: {:.6}", iterations, current);
        previous = current;
        if change < STRESS_TOLERANCE {
            break;
        }
    }

    // stress is translation invariant; keep the component where it was
    let end = centroid(points);
    let (dx, dy) = (start.x - end.x, start.y - end.y);
    for p in points.iter_mut() {
        *p = Point::new(p.x + dx, p.y + dy);
    }
    Ok(iterations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(source: usize, target: usize, directed: bool) -> Edge {
        Edge {
            source,
            target,
            directed,
        }
    }

    #[test]
    fn test_components_split_on_missing_edges() {
        let parts = components(5, &[edge(0, 1, false), edge(3, 4, false)]);
        assert_eq!(parts, vec![vec![0, 1], vec![2], vec![3, 4]]);
    }

    #[test]
    fn test_hop_distances() {
        let d = hop_distances(3, &[edge(0, 1, false), edge(1, 2, false)]);
        assert_eq!(d[0], vec![0.0, 1.0, 2.0]);
        assert_eq!(d[2][0], 2.0);
    }

    #[test]
    fn test_path_graph_stretches_to_ideal_length() {
        let mut points = vec![Point::new(0.0, 0.0), Point::new(5.0, 1.0), Point::new(10.0, 0.0)];
        let edges = [edge(0, 1, false), edge(1, 2, false)];
        stress_majorization(&mut points, &edges, 50.0, 0.0).unwrap();
        let d01 = points[0].distance(points[1]);
        let d12 = points[1].distance(points[2]);
        assert!((d01 - 50.0).abs() < 2.0, "{d01}");
        assert!((d12 - 50.0).abs() < 2.0, "{d12}");
    }

    #[test]
    fn test_coincident_nodes_separate() {
        let mut points = vec![Point::ZERO; 3];
        let edges = [edge(0, 1, false), edge(1, 2, false), edge(2, 0, false)];
        stress_majorization(&mut points, &edges, 30.0, 0.0).unwrap();
        for i in 0..3 {
            for j in i + 1..3 {
                assert!(points[i].distance(points[j]) > 10.0, "{points:?}");
            }
        }
    }

    #[test]
    fn test_directed_edges_point_down() {
        let mut points = vec![Point::new(0.0, 100.0), Point::new(0.0, 50.0), Point::new(0.0, 0.0)];
        let edges = [edge(0, 1, true), edge(1, 2, true)];
        stress_majorization(&mut points, &edges, 40.0, 40.0).unwrap();
        assert!(points[1].y - points[0].y >= 40.0 - 1e-6, "{points:?}");
        assert!(points[2].y - points[1].y >= 40.0 - 1e-6, "{points:?}");
    }
}
