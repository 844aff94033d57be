//! 图层规则。除规则 2 外均按图层汇总，每个图层至多一条发现。

use std::collections::BTreeSet;

use dxflint_core::document::{Entity, EntityId, EntityKind, layer_key};

use super::{Rule, RuleContext};
use crate::findings::Finding;

const DEFAULT_LAYER: &str = "0";

/// 填充与光栅对象归为雕刻意图。
const ENGRAVE_KINDS: [&str; 4] = ["HATCH", "SOLID", "IMAGE", "WIPEOUT"];

fn display_name<'a>(ctx: &'a RuleContext<'_>, key: &'a str) -> &'a str {
    ctx.document
        .layer(key)
        .map(|layer| layer.name.as_str())
        .unwrap_or(key)
}

fn entity_ids<'a, I>(entities: I) -> impl Iterator<Item = &'a EntityId>
where
    I: IntoIterator<Item = &'a &'a Entity>,
{
    entities.into_iter().map(|entity| &entity.id)
}

pub(super) fn unlayered(ctx: &RuleContext<'_>) -> Vec<Finding> {
    ctx.document
        .entities()
        .iter()
        .filter(|entity| {
            let key = layer_key(&entity.layer);
            key.is_empty() || key == DEFAULT_LAYER
        })
        .map(|entity| {
            Rule::Unlayered
                .finding(
                    Rule::Unlayered.severity(),
                    format!(
                        "{} {} is on the default layer '0'",
                        entity.kind.type_name(),
                        entity.id
                    ),
                )
                .affecting_one(&entity.id)
        })
        .collect()
}

pub(super) fn unrecognized_layer(ctx: &RuleContext<'_>) -> Vec<Finding> {
    ctx.entities_by_layer()
        .iter()
        .filter(|(key, _)| key.as_str() != DEFAULT_LAYER && !key.is_empty())
        .filter(|(key, _)| !ctx.config.is_recognized_layer(key))
        .map(|(key, entities)| {
            Rule::UnrecognizedLayer
                .finding(
                    Rule::UnrecognizedLayer.severity(),
                    format!(
                        "Layer '{}' is not recognized ({} entities)",
                        display_name(ctx, key),
                        entities.len()
                    ),
                )
                .affecting(entity_ids(entities))
        })
        .collect()
}

pub(super) fn invisible_layer(ctx: &RuleContext<'_>) -> Vec<Finding> {
    ctx.entities_by_layer()
        .iter()
        .filter(|(key, _)| ctx.document.layer(key).is_some_and(|layer| !layer.visible))
        .map(|(key, entities)| {
            Rule::InvisibleLayer
                .finding(
                    Rule::InvisibleLayer.severity(),
                    format!(
                        "Layer '{}' is hidden or frozen with {} objects",
                        display_name(ctx, key),
                        entities.len()
                    ),
                )
                .affecting(entity_ids(entities))
        })
        .collect()
}

fn is_cut_intent(entity: &Entity) -> bool {
    entity.kind.is_path() && entity.closed
}

fn is_engrave_intent(entity: &Entity) -> bool {
    match &entity.kind {
        EntityKind::Text | EntityKind::MText => true,
        EntityKind::Other(kind) => ENGRAVE_KINDS
            .iter()
            .any(|engrave| kind.eq_ignore_ascii_case(engrave)),
        _ => false,
    }
}

pub(super) fn mixed_intents(ctx: &RuleContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (key, entities) in &ctx.entities_by_layer() {
        let cut: Vec<&&Entity> = entities.iter().filter(|e| is_cut_intent(e)).collect();
        let engrave: Vec<&&Entity> = entities.iter().filter(|e| is_engrave_intent(e)).collect();
        if cut.is_empty() || engrave.is_empty() {
            continue;
        }
        findings.push(
            Rule::MixedIntents
                .finding(
                    Rule::MixedIntents.severity(),
                    format!(
                        "Layer '{}' mixes {} closed cut outlines with {} engraving objects",
                        display_name(ctx, key),
                        cut.len(),
                        engrave.len()
                    ),
                )
                .affecting(entity_ids(cut.into_iter().chain(engrave))),
        );
    }
    findings
}

pub(super) fn reference_layer(ctx: &RuleContext<'_>) -> Vec<Finding> {
    ctx.entities_by_layer()
        .iter()
        .filter_map(|(key, entities)| {
            let name = display_name(ctx, key);
            let pattern = ctx.config.reference_pattern_for(name)?;
            Some(
                Rule::ReferenceLayer
                    .finding(
                        Rule::ReferenceLayer.severity(),
                        format!(
                            "Layer '{name}' matches reference pattern '{pattern}' and holds {} entities",
                            entities.len()
                        ),
                    )
                    .affecting(entity_ids(entities)),
            )
        })
        .collect()
}

pub(super) fn colors_as_process(ctx: &RuleContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (key, entities) in &ctx.entities_by_layer() {
        let colored: Vec<&&Entity> = entities
            .iter()
            .filter(|entity| entity.has_explicit_color())
            .collect();
        if colored.is_empty() {
            continue;
        }
        let colors: BTreeSet<i16> = colored.iter().map(|entity| entity.color).collect();
        let listed: Vec<String> = colors.iter().map(i16::to_string).collect();
        findings.push(
            Rule::ColorsAsProcess
                .finding(
                    Rule::ColorsAsProcess.severity(),
                    format!(
                        "Layer '{}' has {} entities with explicit colors ({})",
                        display_name(ctx, key),
                        colored.len(),
                        listed.join(", ")
                    ),
                )
                .affecting(entity_ids(colored)),
        );
    }
    findings
}

#[cfg(test)]
mod tests {
    use dxflint_config::AnalysisConfig;
    use dxflint_core::document::{Document, Layer, Units};

    use super::*;
    use crate::rules::fixtures::*;

    fn run(rule: fn(&RuleContext<'_>) -> Vec<Finding>, document: &Document) -> Vec<Finding> {
        let config = AnalysisConfig::default();
        rule(&RuleContext::new(document, &config))
    }

    #[test]
    fn default_layer_entities_are_unlayered() {
        let document = document(vec![
            square("1", "0", (0.0, 0.0), 10.0),
            square("2", "CUT", (20.0, 0.0), 10.0),
            text("3", "0", (0.0, 50.0), 5.0),
        ]);
        let findings = run(unlayered, &document);
        assert_eq!(findings.len(), 2);
        assert_eq!(ids(&findings[0]), vec!["1"]);
        assert!(findings[1].description.starts_with("TEXT 3"));
    }

    #[test]
    fn one_finding_per_unrecognized_layer() {
        let document = document(vec![
            square("1", "MyLayer", (0.0, 0.0), 10.0),
            square("2", "mylayer", (20.0, 0.0), 10.0),
            square("3", "Engrave", (40.0, 0.0), 10.0),
            square("4", "0", (60.0, 0.0), 10.0),
        ]);
        let findings = run(unrecognized_layer, &document);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].description.contains("'MyLayer'"));
        assert_eq!(ids(&findings[0]), vec!["1", "2"]);
    }

    #[test]
    fn hidden_layers_with_entities_are_flagged() {
        let mut hidden = Layer::new("CUT");
        hidden.visible = false;
        let mut empty_hidden = Layer::new("MARK");
        empty_hidden.visible = false;
        let document = document_with(
            Units::Millimeters,
            vec![hidden, empty_hidden],
            vec![square("1", "CUT", (0.0, 0.0), 10.0), square("2", "ENGRAVE", (20.0, 0.0), 10.0)],
        );
        let findings = run(invisible_layer, &document);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].description.contains("'CUT'"));
        assert_eq!(ids(&findings[0]), vec!["1"]);
    }

    #[test]
    fn cut_and_engrave_on_one_layer_is_mixed() {
        let document = document(vec![
            square("1", "CUT", (0.0, 0.0), 10.0),
            text("2", "CUT", (0.0, 20.0), 5.0),
            other("3", "HATCH", "CUT", (5.0, 5.0)),
            square("4", "ENGRAVE", (50.0, 0.0), 10.0),
            line("5", "MARK", (0.0, 80.0), (10.0, 80.0)),
            text("6", "MARK", (0.0, 90.0), 5.0),
        ]);
        let findings = run(mixed_intents, &document);
        assert_eq!(findings.len(), 1);
        assert_eq!(ids(&findings[0]), vec!["1", "2", "3"]);
    }

    #[test]
    fn reference_layers_match_by_substring() {
        let document = document(vec![
            square("1", "Sketch-Old", (0.0, 0.0), 10.0),
            square("2", "CUT", (20.0, 0.0), 10.0),
            square("3", "DEFPOINTS", (40.0, 0.0), 10.0),
        ]);
        let findings = run(reference_layer, &document);
        assert_eq!(findings.len(), 2);
        assert!(findings[0].description.contains("'DEFPOINTS'"));
        assert!(findings[1].description.contains("'SKETCH'"));
    }

    #[test]
    fn explicit_colors_are_reported_per_layer() {
        let mut red = square("1", "CUT", (0.0, 0.0), 10.0);
        red.color = 1;
        let mut blue = square("2", "CUT", (20.0, 0.0), 10.0);
        blue.color = 5;
        let mut by_block = square("3", "ENGRAVE", (40.0, 0.0), 10.0);
        by_block.color = 0;
        let document = document(vec![red, blue, by_block, square("4", "CUT", (60.0, 0.0), 10.0)]);
        let findings = run(colors_as_process, &document);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].description.contains("(1, 5)"));
        assert_eq!(ids(&findings[0]), vec!["1", "2"]);
    }
}
