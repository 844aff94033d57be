//! 几何范围规则：工作区、单件尺寸、整体尺寸、Z 平面。

use super::{Rule, RuleContext};
use crate::findings::Finding;

pub(super) fn out_of_area(ctx: &RuleContext<'_>) -> Vec<Finding> {
    let limit = ctx.config.max_origin_distance_mm;
    ctx.document
        .entities()
        .iter()
        .filter_map(|entity| {
            let distance = entity.bounds?.distance_to_origin();
            (distance > limit).then(|| {
                Rule::OutOfArea
                    .finding(
                        Rule::OutOfArea.severity(),
                        format!(
                            "{} {} lies {distance:.1} mm from the origin (limit {limit} mm)",
                            entity.kind.type_name(),
                            entity.id
                        ),
                    )
                    .affecting_one(&entity.id)
            })
        })
        .collect()
}

/// 只检查矢量路径，按较大的一边判断。
pub(super) fn scale(ctx: &RuleContext<'_>) -> Vec<Finding> {
    let (min, max) = (ctx.config.min_size_mm, ctx.config.max_size_mm);
    let mut findings = Vec::new();
    for entity in ctx.document.entities().iter().filter(|e| e.kind.is_path()) {
        let Some(bounds) = entity.bounds else {
            continue;
        };
        let extent = bounds.largest_extent();
        let (severity, verdict) = if extent < min {
            (4, format!("smaller than {min} mm"))
        } else if extent > max {
            (5, format!("larger than {max} mm"))
        } else {
            continue;
        };
        findings.push(
            Rule::Scale
                .finding(
                    severity,
                    format!(
                        "{} {} measures {:.2}x{:.2} mm, {verdict}",
                        entity.kind.type_name(),
                        entity.id,
                        bounds.width(),
                        bounds.height()
                    ),
                )
                .affecting_one(&entity.id),
        );
    }
    findings
}

pub(super) fn drawing_extents(ctx: &RuleContext<'_>) -> Vec<Finding> {
    let Some(bounds) = ctx.document.path_bounds() else {
        return Vec::new();
    };
    let (min, max) = (ctx.config.min_size_mm, ctx.config.max_size_mm);
    let extent = bounds.largest_extent();
    let verdict = if extent > max {
        format!("exceed {max} mm")
    } else if extent < min {
        format!("are below {min} mm")
    } else {
        return Vec::new();
    };
    vec![Rule::DrawingExtents.finding(
        Rule::DrawingExtents.severity(),
        format!(
            "Drawing extents of {:.0}x{:.0} mm {verdict}",
            bounds.width(),
            bounds.height()
        ),
    )]
}

pub(super) fn z_coordinates(ctx: &RuleContext<'_>) -> Vec<Finding> {
    let tolerance = ctx.config.z_tolerance;
    ctx.document
        .entities()
        .iter()
        .filter_map(|entity| {
            let (low, high) = entity.z_range?;
            let worst = low.abs().max(high.abs());
            (worst > tolerance).then(|| {
                Rule::ZCoordinates
                    .finding(
                        Rule::ZCoordinates.severity(),
                        format!(
                            "{} {} has Z coordinates between {low} and {high}",
                            entity.kind.type_name(),
                            entity.id
                        ),
                    )
                    .affecting_one(&entity.id)
            })
        })
        .collect()
}
