use vellum_core::{ItemKind, Rect, SceneFile};

const SCENE: &str = r##"{
    "width": 200, "height": 100,
    "items": [
        {"type": "rect", "id": "a", "x": 0, "y": 0, "width": 20, "height": 10,
         "style": {"fill": "#336699"}},
        {"type": "group", "id": "g", "transform": [2, 0, 0, 2, 50, 0], "children": [
            {"type": "ellipse", "id": "e", "cx": 10, "cy": 10, "rx": 5, "ry": 5}
        ]},
        {"type": "use", "id": "clone", "href": "#a", "x": 100, "y": 40},
        {"type": "connector", "id": "k", "start": "a", "end": "e", "arrow": true}
    ]
}"##;

#[test]
fn clone_bbox_follows_its_offset() {
    let loaded = SceneFile::from_json(SCENE).unwrap().to_document().unwrap();
    let doc = &loaded.document;
    let clone = doc.find("clone").unwrap();
    assert_eq!(doc.visual_bbox(clone), Some(Rect::new(100.0, 40.0, 20.0, 10.0)));
}

#[test]
fn nested_item_moves_in_document_units() {
    let loaded = SceneFile::from_json(SCENE).unwrap().to_document().unwrap();
    let mut doc = loaded.document;
    let e = doc.find("e").unwrap();
    let before = doc.visual_bbox(e).unwrap();
    assert_eq!(before, Rect::new(60.0, 10.0, 20.0, 20.0));

    doc.move_rel(e, 10.0, -4.0).unwrap();
    let after = doc.visual_bbox(e).unwrap();
    assert!((after.x() - 70.0).abs() < 1e-9);
    assert!((after.y() - 6.0).abs() < 1e-9);
    assert!((after.width() - 20.0).abs() < 1e-9);
}

#[test]
fn moved_geometry_survives_a_save() {
    let mut scene = SceneFile::from_json(SCENE).unwrap();
    let mut loaded = scene.to_document().unwrap();
    let a = loaded.document.find("a").unwrap();
    loaded.document.move_rel(a, 5.0, 5.0).unwrap();
    assert_eq!(loaded.document.dirty_connectors().len(), 1);
    assert_eq!(loaded.document.reroute_connectors(), 1);
    scene.store_geometry(&loaded);

    let reloaded = SceneFile::from_json(&scene.to_json().unwrap())
        .unwrap()
        .to_document()
        .unwrap();
    let doc = &reloaded.document;
    let a = doc.find("a").unwrap();
    assert_eq!(doc.visual_bbox(a), Some(Rect::new(5.0, 5.0, 20.0, 10.0)));

    let k = doc.find("k").unwrap();
    let ItemKind::Path(route) = &doc.item(k).unwrap().kind else {
        panic!("connector is not a path");
    };
    // from the center of a to the center of e
    let ends = route.bounds().unwrap();
    assert!((ends.min_x() - 15.0).abs() < 1e-6);
    assert!((ends.max_x() - 70.0).abs() < 1e-6);
    assert!(doc.item(k).unwrap().connector.unwrap().has_arrow);
}
