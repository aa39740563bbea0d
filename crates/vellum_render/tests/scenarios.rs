use rustc_hash::FxHashMap;
use vellum_core::{
    Affine, ClipPath, Color, Document, FontSource, Glyph, Item, ItemKind, Mask, OutlineGlyph, Paint,
    PaintServer, PathVector, Pattern, Rect, Size, Style, TextRun, Units,
};
use vellum_render::{
    ExportOptions, PdfExport, Pixmap, RasterExport, RenderOptions, TextMode,
};

fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> [u8; 4] {
    let p = pixmap.pixel(x, y).unwrap();
    [p.red(), p.green(), p.blue(), p.alpha()]
}

fn raster(doc: &Document, options: ExportOptions) -> Pixmap {
    RasterExport::new(options).render(doc, None).unwrap().pixmap
}

fn rect(x: f64, y: f64, w: f64, h: f64, style: Style) -> Item {
    Item::path(PathVector::rect(Rect::new(x, y, w, h)), style)
}

#[test]
fn solid_red_square_fills_every_pixel() {
    let mut doc = Document::new(Size::new(100.0, 100.0));
    let root = doc.root();
    doc.add_item(root, rect(0.0, 0.0, 100.0, 100.0, Style::filled(Color::RED)))
        .unwrap();

    let pixmap = raster(&doc, ExportOptions::default());
    assert_eq!((pixmap.width(), pixmap.height()), (100, 100));
    assert!(pixmap.pixels().iter().all(|p| {
        (p.red(), p.green(), p.blue(), p.alpha()) == (255, 0, 0, 255)
    }));
}

#[test]
fn half_opaque_group_composites_once() {
    let mut doc = Document::new(Size::new(40.0, 40.0));
    let root = doc.root();
    let mut group = Item::group();
    group.style.opacity = 0.5;
    let group = doc.add_item(root, group).unwrap();
    doc.add_item(group, rect(0.0, 0.0, 40.0, 40.0, Style::filled(Color::BLUE)))
        .unwrap();

    let pixmap = raster(&doc, ExportOptions::default());
    for (x, y) in [(0, 0), (20, 20), (39, 39)] {
        let [r, g, b, a] = pixel(&pixmap, x, y);
        assert!(a == 127 || a == 128, "alpha {a} at {x},{y}");
        // premultiplied blue
        assert_eq!((r, g), (0, 0));
        assert_eq!(b, a);
    }
}

#[test]
fn bbox_pattern_tiles_without_seams() {
    let mut doc = Document::new(Size::new(10.0, 10.0));
    let root = doc.root();

    // each 2x2 tile: blue background, red top-left quarter
    let background = doc.add_detached(rect(0.0, 0.0, 2.0, 2.0, Style::filled(Color::BLUE)));
    let marker = doc.add_detached(rect(0.0, 0.0, 1.0, 1.0, Style::filled(Color::RED)));
    let pattern = doc.add_paint_server(PaintServer::Pattern(Pattern {
        units: Some(Units::ObjectBoundingBox),
        x: Some(0.0),
        y: Some(0.0),
        width: Some(0.2),
        height: Some(0.2),
        children: vec![background, marker],
        ..Default::default()
    }));
    let style = Style {
        fill: Paint::Server {
            id: pattern,
            fallback: None,
        },
        ..Style::default()
    };
    doc.add_item(root, rect(0.0, 0.0, 10.0, 10.0, style)).unwrap();

    // 1 unit = 10 px
    let pixmap = raster(
        &doc,
        ExportOptions {
            dpi: 960.0,
            ..Default::default()
        },
    );
    assert_eq!((pixmap.width(), pixmap.height()), (100, 100));
    assert!(pixmap.pixels().iter().all(|p| p.alpha() == 255), "gap between tiles");

    let mut tiles = 0;
    for ty in 0..5 {
        for tx in 0..5 {
            let (x, y) = (tx * 20, ty * 20);
            assert_eq!(pixel(&pixmap, x + 5, y + 5), [255, 0, 0, 255]);
            assert_eq!(pixel(&pixmap, x + 15, y + 15), [0, 0, 255, 255]);
            assert_eq!(pixel(&pixmap, x + 15, y + 5), [0, 0, 255, 255]);
            tiles += 1;
        }
    }
    assert_eq!(tiles, 25);
}

#[test]
fn clip_dominates_mask() {
    let mut doc = Document::new(Size::new(20.0, 20.0));
    let root = doc.root();

    let clip_child = doc.add_detached(rect(0.0, 0.0, 10.0, 20.0, Style::default()));
    let clip = doc.add_clip_path(ClipPath {
        children: vec![clip_child],
        ..Default::default()
    });
    let mut white = Style::filled(Color::WHITE);
    white.fill_opacity = 0.5;
    let mask_child = doc.add_detached(rect(0.0, 0.0, 20.0, 20.0, white));
    let mask = doc.add_mask(Mask {
        children: vec![mask_child],
        ..Default::default()
    });

    let mut item = rect(0.0, 0.0, 20.0, 20.0, Style::filled(Color::GREEN));
    item.clip_path = Some(clip);
    item.mask = Some(mask);
    item.style.opacity = 0.8;
    doc.add_item(root, item).unwrap();

    let pixmap = raster(&doc, ExportOptions::default());
    // luminance 1 x alpha 0.5 x opacity 0.8
    let expected = 0.5 * 0.8 * 255.0;
    for y in [2, 10, 17] {
        let inside = pixel(&pixmap, 5, y)[3] as f64;
        assert!((inside - expected).abs() <= 2.0, "inside alpha {inside}");
        assert_eq!(pixel(&pixmap, 15, y)[3], 0);
    }
}

#[test]
fn merged_and_layered_opacity_agree() {
    let build = || {
        let mut doc = Document::new(Size::new(10.0, 10.0));
        let root = doc.root();
        let mut style = Style::filled(Color::RED);
        style.fill_opacity = 0.5;
        style.opacity = 0.6;
        doc.add_item(root, rect(0.0, 0.0, 10.0, 10.0, style)).unwrap();
        doc
    };
    let render = |merge_opacity: bool| {
        let options = ExportOptions {
            render: RenderOptions {
                merge_opacity,
                ..Default::default()
            },
            ..Default::default()
        };
        pixel(&raster(&build(), options), 5, 5)[3] as i32
    };

    let merged = render(true);
    let layered = render(false);
    assert!((merged - 77).abs() <= 1, "merged alpha {merged}");
    assert!((merged - layered).abs() <= 1, "{merged} vs {layered}");
}

fn text_document() -> Document {
    let mut doc = Document::new(Size::new(100.0, 40.0));
    let mut glyphs = FxHashMap::default();
    glyphs.insert(
        1,
        OutlineGlyph {
            path: PathVector::rect(Rect::new(50.0, 0.0, 400.0, 700.0)),
            advance: 500.0,
        },
    );
    glyphs.insert(
        2,
        OutlineGlyph {
            path: PathVector::ellipse(250.0, 250.0, 250.0, 350.0),
            advance: 600.0,
        },
    );
    let font = doc.add_font(FontSource::Outlines {
        units_per_em: 1000.0,
        ascent: 800.0,
        descent: -200.0,
        glyphs,
    });
    let run = TextRun {
        font,
        size: 20.0,
        glyphs: vec![
            Glyph { id: 1, x: 10.0, y: 30.0, advance: 10.0 },
            Glyph { id: 2, x: 20.0, y: 30.0, advance: 12.0 },
            Glyph { id: 1, x: 32.0, y: 30.0, advance: 10.0 },
        ],
    };
    let root = doc.root();
    let mut text = Item::new(ItemKind::Text(vec![run]));
    text.style = Style::filled(Color::BLACK);
    doc.add_item(root, text).unwrap();
    doc
}

/// Body of indirect object `id`
fn object(pdf: &str, id: u32) -> &str {
    let head = format!("\n{id} 0 obj\n");
    let start = pdf.find(&head).unwrap() + head.len();
    let len = pdf[start..].find("\nendobj").unwrap();
    &pdf[start..start + len]
}

fn stream_data(body: &str) -> &str {
    let start = body.find("stream\n").unwrap() + "stream\n".len();
    let end = body.rfind("\nendstream").unwrap();
    &body[start..end]
}

/// Object number following `key` in a dictionary, as in `/key 12 0 R`
fn reference(dict: &str, key: &str) -> u32 {
    let at = dict.find(key).unwrap() + key.len();
    dict[at..].split_whitespace().next().unwrap().parse().unwrap()
}

fn numbers(text: &str) -> Vec<f64> {
    text.split_whitespace().filter_map(|t| t.parse().ok()).collect()
}

fn matrix(values: &[f64]) -> Affine {
    Affine::new(values[0], values[1], values[2], values[3], values[4], values[5])
}

/// Page-space box of a Type 3 glyph: its `d1` box through the font matrix
fn type3_glyph_box(pdf: &str, font_id: u32, code: u8) -> Rect {
    let font = object(pdf, font_id);
    let at = font.find("/FontMatrix [").unwrap() + "/FontMatrix [".len();
    let font_matrix = matrix(&numbers(&font[at..at + font[at..].find(']').unwrap()]));
    let procs = &font[font.find("/CharProcs <<").unwrap()..];
    let proc_id = reference(procs, &format!("/g{code} "));
    let data = stream_data(object(pdf, proc_id));
    let header = data.lines().next().unwrap();
    assert!(header.ends_with(" d1"), "{header}");
    let d1 = numbers(header);
    Rect::from_extents(d1[2], d1[3], d1[4], d1[5]).transform(&font_matrix)
}

/// Page-space extent of everything the page content draws: path points
/// (control points included) and Type 3 glyph boxes
fn page_ink(pdf: &str) -> Option<Rect> {
    let page = &pdf[pdf.find("/Type /Page ").unwrap()..];
    let resources = object(pdf, reference(page, "/Resources "));
    let fonts_at = resources.find("/Font <<").unwrap() + "/Font <<".len();
    let fonts = &resources[fonts_at..fonts_at + resources[fonts_at..].find(">>").unwrap()];
    let content = stream_data(object(pdf, reference(page, "/Contents ")));

    let mut ink: Option<Rect> = None;
    let add = |r: Rect, ink: &mut Option<Rect>| *ink = vellum_core::geometry::union_opt(*ink, Some(r));
    let mut ctm = Affine::IDENTITY;
    let mut saved = Vec::new();
    let (mut font, mut tm) = (String::new(), Affine::IDENTITY);
    let mut operands: Vec<&str> = Vec::new();
    for token in content.split_whitespace() {
        let args: Vec<f64> = operands.iter().filter_map(|t| t.parse().ok()).collect();
        match token {
            "q" => saved.push(ctm),
            "Q" => ctm = saved.pop().unwrap(),
            "cm" => ctm = ctm * matrix(&args),
            "m" | "l" | "c" => {
                for pair in args.chunks(2) {
                    let p = ctm.transform_point(vellum_core::Point::new(pair[0], pair[1]));
                    add(Rect::from_extents(p.x, p.y, p.x, p.y), &mut ink);
                }
            }
            "Tf" => font = operands[0].trim_start_matches('/').to_string(),
            "Tm" => tm = matrix(&args),
            "Tj" => {
                let code = u8::from_str_radix(operands[0].trim_matches(|c| c == '<' || c == '>'), 16).unwrap();
                let font_id = reference(fonts, &format!("/{font} "));
                add(type3_glyph_box(pdf, font_id, code).transform(&(ctm * tm)), &mut ink);
            }
            _ => {}
        }
        if token.parse::<f64>().is_ok() || token.starts_with('/') || token.starts_with('<') {
            operands.push(token);
        } else {
            operands.clear();
        }
    }
    ink
}

#[test]
fn embedded_and_outlined_text_share_bounds() {
    let doc = text_document();
    let export = |text_mode: TextMode| {
        let options = ExportOptions {
            render: RenderOptions {
                text_mode,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut out = Vec::new();
        PdfExport::new(options).write(&doc, None, &mut out).unwrap();
        String::from_utf8_lossy(&out).into_owned()
    };

    let embedded_pdf = export(TextMode::Embed);
    let outlined_pdf = export(TextMode::Path);
    assert!(embedded_pdf.contains("/Subtype /Type3"));
    assert!(embedded_pdf.contains("Tj"));
    assert!(!outlined_pdf.contains("Tj"));

    let a = page_ink(&embedded_pdf).unwrap();
    let b = page_ink(&outlined_pdf).unwrap();
    // the first glyph's ink starts at x = 11 user units, 0.75pt each
    assert!((b.min_x() - 8.25).abs() < 1e-3, "{b:?}");
    for (p, q) in [(a.min_x(), b.min_x()), (a.min_y(), b.min_y()), (a.max_x(), b.max_x()), (a.max_y(), b.max_y())] {
        assert!((p - q).abs() < 1e-3, "{a:?} vs {b:?}");
    }
}

#[test]
fn omitted_text_still_rasterizes() {
    let doc = text_document();
    let options = ExportOptions {
        render: RenderOptions {
            text_mode: TextMode::Omit,
            ..Default::default()
        },
        ..Default::default()
    };
    let output = RasterExport::new(options.clone()).render(&doc, None).unwrap();
    assert!(output.report.ink_extents.is_some());

    let mut out = Vec::new();
    let report = PdfExport::new(options).write(&doc, None, &mut out).unwrap();
    assert!(report.ink_extents.is_none());
}

#[test]
fn unknown_glyphs_are_counted() {
    let mut doc = text_document();
    let root = doc.root();
    let text = doc.children(root)[0];
    if let Some(item) = doc.item_mut(text) {
        if let ItemKind::Text(runs) = &mut item.kind {
            runs[0].glyphs.push(Glyph {
                id: vellum_text::EMPTY_GLYPH,
                x: 44.0,
                y: 30.0,
                advance: 0.0,
            });
            runs[0].glyphs.push(Glyph {
                id: vellum_text::UNKNOWN_GLYPH_FLAG | 1,
                x: 44.0,
                y: 30.0,
                advance: 10.0,
            });
        }
    }
    let output = RasterExport::default().render(&doc, None).unwrap();
    assert_eq!(output.report.skipped_glyphs, 2);
}

#[test]
fn exported_item_keeps_ancestor_transform() {
    let mut doc = Document::new(Size::new(50.0, 50.0));
    let root = doc.root();
    let group = doc
        .add_item(root, Item::group().with_transform(Affine::translation(20.0, 20.0)))
        .unwrap();
    doc.add_item(
        group,
        rect(0.0, 0.0, 10.0, 10.0, Style::filled(Color::RED)).with_name("target"),
    )
    .unwrap();
    doc.add_item(root, rect(0.0, 0.0, 10.0, 10.0, Style::filled(Color::BLUE)))
        .unwrap();

    let options = ExportOptions {
        export_id: Some("target".into()),
        ..Default::default()
    };
    let pixmap = raster(&doc, options);
    assert_eq!(pixel(&pixmap, 25, 25), [255, 0, 0, 255]);
    assert_eq!(pixel(&pixmap, 5, 5)[3], 0);
}
