use dxflint_config::AnalysisConfig;
use dxflint_core::drawing::{BlockDefinition, Drawing, RawEntity, Shape};
use dxflint_core::geometry::Point3;
use dxflint_engine::{AnalysisError, Analyzer, Bucket, LOAD_ERROR_RULE_ID, Report, Status, analyze};

fn pt(x: f64, y: f64) -> Point3 {
    Point3::flat(x, y)
}

fn millimetre_drawing() -> Drawing {
    let mut drawing = Drawing::new();
    drawing.set_version("AC1027");
    drawing.set_units(4);
    drawing
}

fn run(drawing: &Drawing) -> Report {
    analyze(drawing, &AnalysisConfig::default()).expect("analysis should succeed")
}

fn rule_ids(report: &Report) -> Vec<u8> {
    report.findings().map(|finding| finding.rule_id).collect()
}

#[test]
fn clean_drawing_is_ok_with_full_health() {
    let mut drawing = millimetre_drawing();
    drawing.add_polyline([pt(0.0, 0.0), pt(80.0, 0.0), pt(80.0, 60.0), pt(0.0, 60.0)], true, "CUT");
    drawing.add_circle(pt(40.0, 30.0), 12.0, "CUT");
    drawing.add_arc(pt(100.0, 30.0), 10.0, 0.0, 180.0, "MARK");

    let report = run(&drawing);
    assert!(report.is_clean(), "unexpected findings: {:?}", rule_ids(&report));
    assert_eq!(report.health_percentage, 100.0);
    assert_eq!(report.status, Status::Ok);
    assert_eq!(report.total_entities, 3);
    assert_eq!(report.summary.dxf_version, "AC1027");
    assert_eq!(report.summary.units, "millimeters");
    assert_eq!(report.recommendations, vec!["File is ready for laser cutting.".to_string()]);
}

#[test]
fn scenario_a_open_polyline_on_cut_is_rejected() {
    let mut drawing = millimetre_drawing();
    drawing.add_polyline([pt(0.0, 0.0), pt(10.0, 0.0), pt(10.0, 10.0)], false, "CUT");

    let report = run(&drawing);
    assert_eq!(report.critical_errors.len(), 1);
    assert_eq!(report.critical_errors[0].rule_id, 1);
    assert_eq!(report.finding_count(), 1);
    assert_eq!(report.status, Status::Rejected);
}

#[test]
fn scenario_b_reversed_copy_is_one_duplicate() {
    let mut drawing = millimetre_drawing();
    let square = [pt(0.0, 0.0), pt(30.0, 0.0), pt(30.0, 30.0), pt(0.0, 30.0)];
    let first = drawing.add_polyline(square, true, "CUT");
    let second = drawing.add_polyline(square.into_iter().rev(), true, "CUT");

    let report = run(&drawing);
    let duplicates: Vec<_> = report
        .critical_errors
        .iter()
        .filter(|finding| finding.rule_id == 7)
        .collect();
    assert_eq!(duplicates.len(), 1);
    let ids: Vec<&str> = duplicates[0]
        .affected_entity_ids
        .iter()
        .map(|id| id.as_str())
        .collect();
    assert_eq!(ids, vec![first.as_str(), second.as_str()]);
}

#[test]
fn scenario_c_small_text_is_one_warning() {
    let mut drawing = millimetre_drawing();
    drawing.add_text(pt(10.0, 10.0), "SN 001", 1.0, "ENGRAVE");

    let report = run(&drawing);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].rule_id, 13);
    assert_eq!(report.warnings[0].bucket, Bucket::Warning);
}

#[test]
fn scenario_d_unrecognized_layer_is_reported_once() {
    let mut drawing = millimetre_drawing();
    drawing.add_polyline([pt(0.0, 0.0), pt(20.0, 0.0), pt(20.0, 20.0), pt(0.0, 20.0)], true, "MyLayer");
    drawing.add_circle(pt(100.0, 100.0), 5.0, "MyLayer");

    let report = run(&drawing);
    let unrecognized: Vec<_> = report.findings().filter(|f| f.rule_id == 4).collect();
    assert_eq!(unrecognized.len(), 1);
    assert!(unrecognized[0].description.contains("MyLayer"));
    assert_eq!(unrecognized[0].affected_entity_ids.len(), 2);
}

#[test]
fn scenario_e_empty_drawing_has_no_usable_geometry() {
    let err = analyze(&millimetre_drawing(), &AnalysisConfig::default()).expect_err("empty drawing");
    assert!(matches!(err, AnalysisError::NoUsableGeometry { dropped: 0 }));
}

#[test]
fn repeated_analysis_is_byte_identical() {
    let mut drawing = millimetre_drawing();
    drawing.add_polyline([pt(0.0, 0.0), pt(10.0, 0.0), pt(10.0, 10.0)], false, "CUT");
    drawing.add_line(pt(0.0, 50.0), pt(30.0, 50.0), "0");
    drawing.add_line(pt(30.0, 50.0), pt(0.0, 50.0), "0");
    drawing.add_text(pt(0.0, 80.0), "A", 1.5, "Notes");
    drawing.add_other("SPLINE", Some(pt(5.0, 5.0)), "CUT");

    let analyzer = Analyzer::new(AnalysisConfig::default()).expect("analyzer");
    let first = serde_json::to_string(&analyzer.analyze(&drawing).expect("first")).expect("json");
    for _ in 0..5 {
        let again = serde_json::to_string(&analyzer.analyze(&drawing).expect("again")).expect("json");
        assert_eq!(first, again);
    }
}

#[test]
fn one_entity_can_trigger_several_rules() {
    let mut drawing = millimetre_drawing();
    let open = [pt(0.0, 0.0), pt(20.0, 0.0), pt(20.0, 20.0)];
    drawing.add_polyline(open, false, "CUT");
    let copy = drawing.add_entity(
        RawEntity::new(Shape::Polyline {
            vertices: open.into_iter().map(dxflint_core::drawing::PolylineVertex::new).collect(),
            is_closed: false,
        })
        .on_layer("0"),
    );

    let report = run(&drawing);
    let touching: Vec<u8> = report
        .findings()
        .filter(|finding| finding.affected_entity_ids.iter().any(|id| id.as_str() == copy))
        .map(|finding| finding.rule_id)
        .collect();
    assert!(touching.contains(&2), "unlayered: {touching:?}");
    assert!(touching.contains(&7), "duplicate: {touching:?}");
}

#[test]
fn block_cycle_becomes_load_error_not_recursion() {
    let mut drawing = millimetre_drawing();
    let self_ref = RawEntity::new(Shape::Insert {
        block: "LOOP".into(),
        insert: pt(1.0, 1.0),
        scale_x: 1.0,
        scale_y: 1.0,
        rotation_deg: 0.0,
    });
    drawing.add_block(
        BlockDefinition::new("LOOP")
            .with_entity(self_ref)
            .with_entity(
                RawEntity::new(Shape::Circle {
                    center: pt(0.0, 0.0),
                    radius: 10.0,
                })
                .on_layer("CUT"),
            ),
    );
    drawing.add_insert("LOOP", pt(50.0, 50.0), "CUT");

    let report = run(&drawing);
    let load_errors: Vec<_> = report
        .critical_errors
        .iter()
        .filter(|finding| finding.rule_id == LOAD_ERROR_RULE_ID)
        .collect();
    assert_eq!(load_errors.len(), 1);
    assert!(load_errors[0].description.contains("cycle"));
    assert_eq!(report.total_entities, 2);
    assert!(rule_ids(&report).contains(&23));
    assert_eq!(report.status, Status::Rejected);
}

#[test]
fn warnings_only_needs_review() {
    let mut drawing = millimetre_drawing();
    drawing.set_units(1);
    drawing.add_polyline([pt(0.0, 0.0), pt(20.0, 0.0), pt(20.0, 20.0), pt(0.0, 20.0)], true, "CUT");

    let report = run(&drawing);
    assert!(report.critical_errors.is_empty());
    assert_eq!(rule_ids(&report), vec![10]);
    // 5 × 3 / 1 = 15
    assert_eq!(report.health_percentage, 85.0);
    assert_eq!(report.status, Status::NeedsReview);
}

#[test]
fn extreme_coordinates_are_reported_not_fatal() {
    let mut drawing = millimetre_drawing();
    let far = drawing.add_line(pt(1e300, 0.0), pt(1e300, 5.0), "CUT");
    drawing.add_line(pt(0.0, 0.0), pt(20.0, 0.0), "CUT");

    let report = run(&drawing);
    let out_of_area: Vec<_> = report.findings().filter(|f| f.rule_id == 5).collect();
    assert_eq!(out_of_area.len(), 1);
    assert!(out_of_area[0].affected_entity_ids.iter().any(|id| id.as_str() == far));
    assert_eq!(report.status, Status::Rejected);
}
