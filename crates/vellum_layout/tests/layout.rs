use vellum_core::{
    Color, Connector, Document, Item, ItemId, ItemKind, PathVector, Point, Rect, Size, Style,
};
use vellum_layout::{graph_layout, remove_overlaps, GraphLayoutOptions, OverlapOptions};

fn square(doc: &mut Document, x: f64, y: f64, size: f64) -> ItemId {
    let root = doc.root();
    doc.add_item(
        root,
        Item::path(PathVector::rect(Rect::new(x, y, size, size)), Style::filled(Color::BLUE)),
    )
    .unwrap()
}

fn connect(doc: &mut Document, start: ItemId, end: ItemId, directed: bool) -> ItemId {
    connect_with(doc, start, end, directed, directed)
}

fn connect_with(doc: &mut Document, start: ItemId, end: ItemId, directed: bool, has_arrow: bool) -> ItemId {
    let root = doc.root();
    let mut item = Item::path(PathVector::line(Point::ZERO, Point::ZERO), Style::default());
    item.connector = Some(Connector {
        start: Some(start),
        end: Some(end),
        directed,
        has_arrow,
        dirty: false,
    });
    doc.add_item(root, item).unwrap()
}

fn bbox(doc: &Document, id: ItemId) -> Rect {
    doc.visual_bbox(id).unwrap()
}

fn separation(a: &Rect, b: &Rect) -> (f64, f64) {
    let sx = (b.min_x() - a.max_x()).max(a.min_x() - b.max_x());
    let sy = (b.min_y() - a.max_y()).max(a.min_y() - b.max_y());
    (sx, sy)
}

/// Deterministic pile of overlapping squares
fn pile(doc: &mut Document, count: usize) -> Vec<ItemId> {
    let mut seed = 11u64;
    let mut next = move || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (seed >> 33) as f64 / (1u64 << 31) as f64
    };
    (0..count)
        .map(|_| {
            let size = 10.0 + next() * 20.0;
            square(doc, next() * 60.0, next() * 60.0, size)
        })
        .collect()
}

#[test]
fn overlapping_pairs_end_at_least_a_gap_apart() {
    let mut doc = Document::new(Size::new(200.0, 200.0));
    let items = pile(&mut doc, 14);
    let before: Vec<Rect> = items.iter().map(|&id| bbox(&doc, id)).collect();

    let options = OverlapOptions {
        gap_x: 4.0,
        gap_y: 2.0,
    };
    let moved = remove_overlaps(&mut doc, &items, &options).unwrap();
    assert!(moved > 0);

    let after: Vec<Rect> = items.iter().map(|&id| bbox(&doc, id)).collect();
    for i in 0..items.len() {
        // boxes keep their size
        assert!((after[i].width() - before[i].width()).abs() < 1e-9);
        for j in i + 1..items.len() {
            let (bx, by) = separation(&before[i], &before[j]);
            if bx >= options.gap_x && by >= options.gap_y {
                continue;
            }
            let (sx, sy) = separation(&after[i], &after[j]);
            assert!(
                sx >= options.gap_x - 1e-6 || sy >= options.gap_y - 1e-6,
                "items {i} and {j} still too close: {sx} {sy}"
            );
        }
    }
}

#[test]
fn separated_items_are_not_moved() {
    let mut doc = Document::new(Size::new(100.0, 100.0));
    let a = square(&mut doc, 0.0, 0.0, 10.0);
    let b = square(&mut doc, 50.0, 50.0, 10.0);
    let moved = remove_overlaps(&mut doc, &[a, b], &OverlapOptions::default()).unwrap();
    assert_eq!(moved, 0);
    assert_eq!(bbox(&doc, a), Rect::new(0.0, 0.0, 10.0, 10.0));
}

#[test]
fn connectors_follow_moved_items() {
    let mut doc = Document::new(Size::new(100.0, 100.0));
    let a = square(&mut doc, 0.0, 0.0, 20.0);
    let b = square(&mut doc, 5.0, 0.0, 20.0);
    let link = connect(&mut doc, a, b, false);

    remove_overlaps(&mut doc, &[a, b, link], &OverlapOptions::default()).unwrap();
    assert!(doc.dirty_connectors().is_empty());

    let ItemKind::Path(route) = &doc.item(link).unwrap().kind else {
        panic!("connector is not a path");
    };
    let ends = route.bounds().unwrap();
    let (ca, cb) = (bbox(&doc, a).center(), bbox(&doc, b).center());
    assert!((ends.min_x() - ca.x.min(cb.x)).abs() < 1e-6);
    assert!((ends.max_x() - ca.x.max(cb.x)).abs() < 1e-6);
}

#[test]
fn directed_edges_keep_their_separation() {
    let mut doc = Document::new(Size::new(400.0, 400.0));
    let nodes: Vec<ItemId> = (0..5)
        .map(|i| square(&mut doc, i as f64 * 15.0, 0.0, 12.0))
        .collect();
    let mut items = nodes.clone();
    let edges = [(0, 1), (1, 2), (1, 3), (3, 4)];
    for (s, t) in edges {
        items.push(connect(&mut doc, nodes[s], nodes[t], true));
    }

    let options = GraphLayoutOptions {
        ideal_edge_length: 60.0,
        directed: true,
        directed_height_modifier: 0.5,
        ..Default::default()
    };
    let report = graph_layout(&mut doc, &items, &options).unwrap();
    assert_eq!(report.components, 1);
    assert_eq!(report.laid_out, 1);
    assert!(report.iterations >= 1);

    for (s, t) in edges {
        let dy = bbox(&doc, nodes[t]).center().y - bbox(&doc, nodes[s]).center().y;
        assert!(dy >= 30.0 - 1e-6, "edge {s}->{t}: {dy}");
    }
}

#[test]
fn directed_edges_need_an_arrow() {
    let mut doc = Document::new(Size::new(400.0, 400.0));
    let nodes: Vec<ItemId> = (0..3)
        .map(|i| square(&mut doc, i as f64 * 30.0, 0.0, 10.0))
        .collect();
    let mut items = nodes.clone();
    items.push(connect_with(&mut doc, nodes[0], nodes[1], true, false));
    items.push(connect_with(&mut doc, nodes[1], nodes[2], false, true));

    let options = GraphLayoutOptions {
        ideal_edge_length: 60.0,
        directed: true,
        ..Default::default()
    };
    let report = graph_layout(&mut doc, &items, &options).unwrap();
    assert_eq!(report.laid_out, 1);

    // a collinear chain without constraints stays on its line
    let y0 = bbox(&doc, nodes[0]).center().y;
    for &id in &nodes[1..] {
        let dy = bbox(&doc, id).center().y - y0;
        assert!(dy.abs() < 1e-6, "unexpected vertical offset {dy}");
    }
}

#[test]
fn avoid_overlaps_leaves_no_overlap() {
    let mut doc = Document::new(Size::new(400.0, 400.0));
    let nodes: Vec<ItemId> = (0..4).map(|_| square(&mut doc, 0.0, 0.0, 40.0)).collect();
    let mut items = nodes.clone();
    for (s, t) in [(0, 1), (1, 2), (2, 3), (3, 0)] {
        items.push(connect(&mut doc, nodes[s], nodes[t], false));
    }

    let options = GraphLayoutOptions {
        ideal_edge_length: 10.0,
        avoid_overlaps: true,
        ..Default::default()
    };
    graph_layout(&mut doc, &items, &options).unwrap();

    for i in 0..nodes.len() {
        for j in i + 1..nodes.len() {
            let (sx, sy) = separation(&bbox(&doc, nodes[i]), &bbox(&doc, nodes[j]));
            assert!(sx >= -1e-6 || sy >= -1e-6, "nodes {i} and {j} overlap");
        }
    }
}

#[test]
fn sparse_components_are_left_alone() {
    let mut doc = Document::new(Size::new(400.0, 400.0));
    let a = square(&mut doc, 0.0, 0.0, 10.0);
    let b = square(&mut doc, 20.0, 0.0, 10.0);
    let lone = square(&mut doc, 5000.0, 5000.0, 10.0);
    let link = connect(&mut doc, a, b, false);

    let report = graph_layout(&mut doc, &[a, b, lone, link], &GraphLayoutOptions::default()).unwrap();
    assert_eq!(report.components, 2);
    assert_eq!(report.laid_out, 0);
    assert_eq!(report.moved, 0);
    assert_eq!(bbox(&doc, a), Rect::new(0.0, 0.0, 10.0, 10.0));
}
