//! 结构与导出规则：DXF 版本、块嵌套、文件复杂度。

use std::collections::BTreeMap;

use dxflint_core::document::{Entity, EntityId};

use super::{Rule, RuleContext};
use crate::findings::Finding;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// 缺少版本标记时不报告。
pub(super) fn version_support(ctx: &RuleContext<'_>) -> Vec<Finding> {
    match ctx.document.version() {
        Some(version) if !ctx.config.supports_version(version) => {
            vec![Rule::VersionSupport.finding(
                Rule::VersionSupport.severity(),
                format!(
                    "File was written as DXF {version}, supported versions are {}",
                    ctx.config.supported_versions.join(", ")
                ),
            )]
        }
        _ => Vec::new(),
    }
}

/// 每个被展开的顶层块参照一条发现，列出其展开出的全部实体。
pub(super) fn nested_blocks(ctx: &RuleContext<'_>) -> Vec<Finding> {
    let mut flattened: BTreeMap<&EntityId, Vec<&Entity>> = BTreeMap::new();
    for entity in ctx.document.entities() {
        if entity.nesting_depth == 0 {
            continue;
        }
        if let Some(insert) = &entity.source_insert {
            flattened.entry(insert).or_default().push(entity);
        }
    }

    flattened
        .into_iter()
        .map(|(insert, members)| {
            let depth = members
                .iter()
                .map(|entity| entity.nesting_depth)
                .max()
                .unwrap_or_default();
            Rule::NestedBlocks
                .finding(
                    Rule::NestedBlocks.severity(),
                    format!(
                        "Block reference {insert} was flattened into {} entities (nesting depth {depth})",
                        members.len()
                    ),
                )
                .affecting(members.iter().map(|entity| &entity.id))
        })
        .collect()
}

pub(super) fn file_complexity(ctx: &RuleContext<'_>) -> Vec<Finding> {
    let config = ctx.config;
    let document = ctx.document;
    let mut reasons = Vec::new();

    let entities = document.entities().len();
    if entities > config.max_entities {
        reasons.push(format!("{entities} entities (limit {})", config.max_entities));
    }
    let points = document.total_vertices();
    if points > config.max_total_points {
        reasons.push(format!("{points} vertices (limit {})", config.max_total_points));
    }
    if let Some(bytes) = document.file_size_bytes() {
        let megabytes = bytes as f64 / BYTES_PER_MB;
        if megabytes > config.max_file_size_mb {
            reasons.push(format!(
                "{megabytes:.2} MB on disk (limit {} MB)",
                config.max_file_size_mb
            ));
        }
    }

    if reasons.is_empty() {
        return Vec::new();
    }
    vec![Rule::FileComplexity.finding(
        Rule::FileComplexity.severity(),
        format!("File is too heavy: {}", reasons.join("; ")),
    )]
}
