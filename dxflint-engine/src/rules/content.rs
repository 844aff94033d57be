//! 内容类规则：按实体类型或属性做存在性判断。

use dxflint_core::document::{Entity, Units};

use super::{Rule, RuleContext};
use crate::findings::Finding;

const COMPLEX_CURVES: [&str; 2] = ["SPLINE", "ELLIPSE"];
const RASTER_IMAGES: [&str; 1] = ["IMAGE"];
const RASTER_REMNANTS: [&str; 3] = ["WIPEOUT", "OLE2FRAME", "OLEFRAME"];
const QUOTE_CHARS: usize = 32;

/// 每个满足条件的实体各产生一条发现。
fn per_entity<F, D>(ctx: &RuleContext<'_>, rule: Rule, matches: F, describe: D) -> Vec<Finding>
where
    F: Fn(&Entity) -> bool,
    D: Fn(&Entity) -> String,
{
    ctx.document
        .entities()
        .iter()
        .filter(|entity| matches(*entity))
        .map(|entity| {
            rule.finding(rule.severity(), describe(entity))
                .affecting_one(&entity.id)
        })
        .collect()
}

/// 文字实体的标签：`TEXT 1A "SN 001"`，过长的内容截断，换行折叠为空格。
fn text_label(entity: &Entity) -> String {
    let label = format!("{} {}", entity.kind.type_name(), entity.id);
    let content = entity
        .text
        .as_deref()
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    if content.is_empty() {
        return label;
    }
    let mut quoted: String = content.chars().take(QUOTE_CHARS).collect();
    if content.chars().count() > QUOTE_CHARS {
        quoted.push('…');
    }
    format!("{label} \"{quoted}\"")
}

fn kind_in(entity: &Entity, kinds: &[&str]) -> bool {
    kinds.iter().any(|kind| entity.kind.is_other(kind))
}

pub(super) fn editable_text(ctx: &RuleContext<'_>) -> Vec<Finding> {
    per_entity(
        ctx,
        Rule::EditableText,
        |entity| entity.kind.is_text(),
        |entity| {
            format!(
                "{} on layer '{}' is not converted to curves",
                text_label(entity),
                entity.layer
            )
        },
    )
}

pub(super) fn line_weight(ctx: &RuleContext<'_>) -> Vec<Finding> {
    per_entity(
        ctx,
        Rule::LineWeight,
        Entity::has_explicit_line_weight,
        |entity| {
            // 组码 370 以百分之一毫米计
            format!(
                "{} {} has a line weight of {:.2} mm",
                entity.kind.type_name(),
                entity.id,
                f64::from(entity.line_weight) / 100.0
            )
        },
    )
}

/// 未声明单位按毫米处理，不报告。
pub(super) fn units(ctx: &RuleContext<'_>) -> Vec<Finding> {
    let (severity, description) = match ctx.document.units() {
        Units::Inches => (5, "Drawing units are inches; the laser expects millimeters".to_string()),
        Units::Other(code) => (
            3,
            format!("Drawing declares units code {code} instead of millimeters"),
        ),
        Units::Millimeters | Units::Unspecified => return Vec::new(),
    };
    vec![Rule::Units.finding(severity, description)]
}

pub(super) fn small_text(ctx: &RuleContext<'_>) -> Vec<Finding> {
    let min = ctx.config.min_text_height_mm;
    per_entity(
        ctx,
        Rule::SmallText,
        |entity| entity.kind.is_text() && entity.text_height.is_some_and(|height| height < min),
        |entity| {
            format!(
                "{} is {:.2} mm high (minimum {min} mm)",
                text_label(entity),
                entity.text_height.unwrap_or_default()
            )
        },
    )
}

pub(super) fn complex_curves(ctx: &RuleContext<'_>) -> Vec<Finding> {
    per_entity(
        ctx,
        Rule::ComplexCurves,
        |entity| kind_in(entity, &COMPLEX_CURVES),
        |entity| format!("{} {} should be converted to polylines or arcs", entity.kind.type_name(), entity.id),
    )
}

pub(super) fn raster_images(ctx: &RuleContext<'_>) -> Vec<Finding> {
    per_entity(
        ctx,
        Rule::RasterImages,
        |entity| kind_in(entity, &RASTER_IMAGES),
        |entity| format!("Raster image {} on layer '{}'", entity.id, entity.layer),
    )
}

pub(super) fn raster_remnants(ctx: &RuleContext<'_>) -> Vec<Finding> {
    per_entity(
        ctx,
        Rule::RasterRemnants,
        |entity| kind_in(entity, &RASTER_REMNANTS),
        |entity| format!("{} {} is left in the drawing", entity.kind.type_name(), entity.id),
    )
}
