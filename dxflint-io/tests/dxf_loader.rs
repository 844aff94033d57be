use std::fs;
use std::path::PathBuf;

use dxflint_config::AnalysisConfig;
use dxflint_core::drawing::{Drawing, Shape};
use dxflint_engine::{LOAD_ERROR_RULE_ID, Status};
use dxflint_io::{DrawingLoader, DxfFacade, IoError};

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

fn load(name: &str) -> Drawing {
    DxfFacade::new()
        .load(&fixture(name))
        .unwrap_or_else(|err| panic!("读取 {name} 失败: {err}"))
}

#[test]
fn load_basic_entities_reads_header_and_tables() {
    let drawing = load("basic_entities.dxf");
    let header = drawing.header();
    assert_eq!(header.version.as_deref(), Some("AC1015"));
    assert_eq!(header.units, Some(4));

    let size = fs::metadata(fixture("basic_entities.dxf"))
        .expect("fixture metadata")
        .len();
    assert_eq!(header.file_size_bytes, Some(size));

    let engrave = drawing.layer("ENGRAVE").expect("Engrave 图层");
    assert!(engrave.is_off);
    assert_eq!(engrave.color, 5);
    assert_eq!(engrave.name, "Engrave");

    let reference = drawing.layer("REF").expect("REF 图层");
    assert!(reference.is_frozen);
    assert!(reference.is_locked);
    assert!(!reference.is_off);

    let cut = drawing.layer("CUT").expect("CUT 图层");
    assert!(!cut.is_off && !cut.is_frozen && !cut.is_locked);
}

#[test]
fn load_basic_entities_preserves_geometry() {
    let drawing = load("basic_entities.dxf");
    let kinds: Vec<&str> = drawing
        .entities()
        .iter()
        .map(|entity| entity.shape.type_name())
        .collect();
    assert_eq!(
        kinds,
        vec!["LINE", "LWPOLYLINE", "CIRCLE", "ARC", "TEXT", "MTEXT", "SPLINE"]
    );

    let line = &drawing.entities()[0];
    assert_eq!(line.handle.as_deref(), Some("1A"));
    match &line.shape {
        Shape::Line { start, end } => {
            assert_eq!(start.x(), 0.0);
            assert_eq!(end.x(), 100.0);
            assert!((end.z() - 2.5).abs() < 1e-9);
        }
        other => panic!("期望 LINE，实际 {other:?}"),
    }

    let polyline = &drawing.entities()[1];
    assert_eq!(polyline.color, 3);
    assert_eq!(polyline.line_weight, 25);
    match &polyline.shape {
        Shape::Polyline {
            vertices,
            is_closed,
        } => {
            assert!(*is_closed);
            assert_eq!(vertices.len(), 4);
            assert!((vertices[2].bulge - 0.5).abs() < 1e-9);
            assert!(vertices[3].bulge.abs() < 1e-9);
        }
        other => panic!("期望 LWPOLYLINE，实际 {other:?}"),
    }

    match &drawing.entities()[4].shape {
        Shape::Text {
            height, content, ..
        } => {
            assert!((height - 1.5).abs() < 1e-9);
            assert_eq!(content, "45°");
        }
        other => panic!("期望 TEXT，实际 {other:?}"),
    }

    match &drawing.entities()[5].shape {
        Shape::MText { content, .. } => assert_eq!(content, "Line1\nLine2"),
        other => panic!("期望 MTEXT，实际 {other:?}"),
    }

    match &drawing.entities()[6].shape {
        Shape::Other { kind, anchor } => {
            assert_eq!(kind, "SPLINE");
            let anchor = anchor.expect("SPLINE 首个控制点");
            assert_eq!((anchor.x(), anchor.y()), (1.0, 2.0));
        }
        other => panic!("期望 SPLINE，实际 {other:?}"),
    }
}

#[test]
fn load_block_definition_and_insert() {
    let drawing = load("blocks_and_inserts.dxf");
    assert_eq!(drawing.header().units, Some(1));
    assert!(drawing.block("*Model_Space").is_none());

    let logo = drawing.block("logo").expect("LOGO 块");
    assert_eq!(logo.entities.len(), 2, "ATTDEF 不应作为实体");
    assert_eq!((logo.base_point.x(), logo.base_point.y()), (5.0, 5.0));

    assert_eq!(drawing.entities().len(), 2, "ATTRIB/SEQEND 不应作为独立实体");
    match &drawing.entities()[0].shape {
        Shape::Insert {
            block,
            insert,
            scale_x,
            scale_y,
            rotation_deg,
        } => {
            assert_eq!(block, "LOGO");
            assert_eq!((insert.x(), insert.y()), (100.0, 50.0));
            assert_eq!(*scale_x, 2.0);
            assert_eq!(*scale_y, 2.0, "缺省 Y 缩放沿用 X 缩放");
            assert_eq!(*rotation_deg, 90.0);
        }
        other => panic!("期望 INSERT，实际 {other:?}"),
    }
    assert_eq!(drawing.entities()[1].handle.as_deref(), Some("31"));
}

#[test]
fn load_legacy_polyline_sequence() {
    let drawing = load("legacy_polyline.dxf");
    assert_eq!(drawing.header().version.as_deref(), Some("AC1009"));
    assert_eq!(drawing.header().units, None);
    assert_eq!(drawing.entities().len(), 3);

    match &drawing.entities()[0].shape {
        Shape::Polyline {
            vertices,
            is_closed,
        } => {
            assert!(*is_closed);
            assert_eq!(vertices.len(), 3);
            assert!(vertices.iter().all(|v| (v.position.z() - 1.5).abs() < 1e-9));
            assert!((vertices[2].bulge - 1.0).abs() < 1e-9);
        }
        other => panic!("期望 POLYLINE，实际 {other:?}"),
    }

    match &drawing.entities()[1].shape {
        Shape::Other { kind, anchor } => {
            assert_eq!(kind, "POLYFACE");
            assert!(anchor.is_some());
        }
        other => panic!("期望 POLYFACE，实际 {other:?}"),
    }

    assert_eq!(drawing.entities()[2].shape.type_name(), "IMAGE");
}

#[test]
fn malformed_group_code_is_reported() {
    let err = DxfFacade::new()
        .load(&fixture("truncated.dxf"))
        .expect_err("应当解析失败");
    assert!(matches!(err, IoError::InvalidDocument(_)), "{err:?}");
}

#[test]
fn missing_file_is_a_read_error() {
    let err = DxfFacade::new()
        .load(&fixture("does_not_exist.dxf"))
        .expect_err("文件不存在");
    assert!(matches!(err, IoError::ReadError { .. }));
}

#[test]
fn binary_dxf_is_unsupported() {
    let err = DxfFacade::new()
        .parse_str("AutoCAD Binary DXF\r\n\u{1a}\0")
        .expect_err("二进制格式");
    assert!(matches!(err, IoError::UnsupportedFeature(_)));
}

#[test]
fn parse_str_accepts_entities_only_file() {
    let source = "0\nSECTION\n2\nENTITIES\n0\nCIRCLE\n8\nCUT\n10\n1\n20\n2\n40\n3\n0\nENDSEC\n0\nEOF\n";
    let drawing = DxfFacade::new().parse_str(source).expect("parse");
    assert_eq!(drawing.entities().len(), 1);
    assert!(drawing.header().version.is_none());
    assert!(drawing.header().file_size_bytes.is_none());
    assert!(drawing.layer("CUT").is_some(), "实体引用的图层会自动补齐");
}

#[test]
fn entity_missing_required_codes_is_kept_as_malformed() {
    let source = "0\nSECTION\n2\nENTITIES\n\
                  0\nLINE\n8\nCUT\n10\n0\n20\n0\n11\n10\n21\n0\n\
                  0\nCIRCLE\n8\nCUT\n10\n1\n20\n2\n\
                  0\nTEXT\n8\nENGRAVE\n10\n0\n20\n5\n1\nID\n\
                  0\nENDSEC\n0\nEOF\n";
    let drawing = DxfFacade::new().parse_str(source).expect("文件其余部分仍可读取");
    let kinds: Vec<&str> = drawing
        .entities()
        .iter()
        .map(|entity| entity.shape.type_name())
        .collect();
    assert_eq!(kinds, vec!["LINE", "CIRCLE", "TEXT"]);
    match &drawing.entities()[1].shape {
        Shape::Malformed { reason, .. } => assert!(reason.contains("group code 40"), "{reason}"),
        other => panic!("期望 Malformed，实际 {other:?}"),
    }
    assert!(matches!(
        drawing.entities()[2].shape,
        Shape::Malformed { .. }
    ));
}

#[test]
fn malformed_entity_becomes_one_load_error_in_the_report() {
    let drawing = load("partial_entities.dxf");
    assert_eq!(drawing.entities().len(), 3);

    let report = dxflint_engine::analyze(&drawing, &AnalysisConfig::default()).expect("analyze");
    assert_eq!(report.total_entities, 2);
    let load_errors: Vec<_> = report
        .findings()
        .filter(|finding| finding.rule_id == LOAD_ERROR_RULE_ID)
        .collect();
    assert_eq!(load_errors.len(), 1);
    assert!(load_errors[0].description.starts_with("CIRCLE 11 was dropped"));
    assert!(load_errors[0].description.contains("radius"));
    assert_eq!(report.finding_count(), 1);
    assert_eq!(report.status, Status::Rejected);
}
