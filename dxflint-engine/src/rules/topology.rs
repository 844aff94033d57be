//! 拓扑规则：开放路径、重复矢量、过近矢量、冗余顶点。

use std::collections::{BTreeMap, HashMap};

use dxflint_core::document::{EntityId, EntityKind};
use dxflint_core::geometry::{self, Point2, Signature};

use super::{Rule, RuleContext};
use crate::findings::Finding;

pub(super) fn open_paths(ctx: &RuleContext<'_>) -> Vec<Finding> {
    ctx.document
        .entities()
        .iter()
        .filter(|entity| entity.kind == EntityKind::Polyline)
        .filter(|entity| ctx.config.is_cut_layer(&entity.layer) && !entity.closed)
        .map(|entity| {
            Rule::OpenPaths
                .finding(
                    Rule::OpenPaths.severity(),
                    format!(
                        "Open polyline {} with {} vertices on process layer '{}'",
                        entity.id,
                        entity.vertex_count(),
                        entity.layer
                    ),
                )
                .affecting_one(&entity.id)
        })
        .collect()
}

/// 按几何指纹分组；n 个相同实体产生 n-1 条发现，每条指向首个实体与一个副本。
pub(super) fn duplicate_vectors(ctx: &RuleContext<'_>) -> Vec<Finding> {
    let mut groups: BTreeMap<Signature, Vec<&EntityId>> = BTreeMap::new();
    for entity in ctx.document.entities().iter().filter(|e| e.kind.is_path()) {
        if let Some(signature) =
            geometry::canonical_signature(&entity.vertices, entity.closed, ctx.config.duplicate_tolerance)
        {
            groups.entry(signature).or_default().push(&entity.id);
        }
    }

    let mut findings = Vec::new();
    for ids in groups.values().filter(|ids| ids.len() > 1) {
        let (first, copies) = (ids[0], &ids[1..]);
        for copy in copies {
            findings.push(
                Rule::DuplicateVectors
                    .finding(
                        Rule::DuplicateVectors.severity(),
                        format!(
                            "{copy} duplicates {first} ({} identical overlapping vectors)",
                            ids.len()
                        ),
                    )
                    .affecting([first, *copy]),
            );
        }
    }
    findings
}

type Cell = (i64, i64);

/// 超出 i64 范围的坐标饱和到边界单元，距离仍按真实坐标计算。
fn cell_of(point: Point2, size: f64) -> Cell {
    (
        (point.x() / size).floor() as i64,
        (point.y() / size).floor() as i64,
    )
}

fn neighbour(cell: Cell, dx: i64, dy: i64) -> Option<Cell> {
    Some((cell.0.checked_add(dx)?, cell.1.checked_add(dy)?))
}

/// 网格哈希：单元边长等于最小距离，只需比较相邻 9 个单元。
pub(super) fn close_vectors(ctx: &RuleContext<'_>) -> Vec<Finding> {
    let min_distance = ctx.config.min_vector_distance_mm;
    let coincident = ctx.config.tolerance;
    if min_distance <= coincident {
        return Vec::new();
    }

    let paths: Vec<_> = ctx
        .document
        .entities()
        .iter()
        .filter(|entity| entity.kind.is_path())
        .collect();

    let mut grid: HashMap<Cell, Vec<(usize, Point2)>> = HashMap::new();
    for (index, entity) in paths.iter().enumerate() {
        for vertex in &entity.vertices {
            let point = vertex.xy();
            grid.entry(cell_of(point, min_distance))
                .or_default()
                .push((index, point));
        }
    }

    // 每对实体只保留最近距离
    let mut pairs: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (&cell, members) in &grid {
        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(neighbours) = neighbour(cell, dx, dy).and_then(|key| grid.get(&key)) else {
                    continue;
                };
                for &(a, pa) in members {
                    for &(b, pb) in neighbours {
                        if a >= b {
                            continue;
                        }
                        let distance = pa.distance(pb);
                        if distance > coincident && distance < min_distance {
                            pairs
                                .entry((a, b))
                                .and_modify(|best| *best = best.min(distance))
                                .or_insert(distance);
                        }
                    }
                }
            }
        }
    }

    pairs
        .into_iter()
        .map(|((a, b), distance)| {
            let (first, second) = (&paths[a].id, &paths[b].id);
            Rule::CloseVectors
                .finding(
                    Rule::CloseVectors.severity(),
                    format!(
                        "{first} and {second} come within {distance:.3} mm of each other (minimum {min_distance} mm)"
                    ),
                )
                .affecting([first, second])
        })
        .collect()
}

pub(super) fn excessive_points(ctx: &RuleContext<'_>) -> Vec<Finding> {
    let limit = ctx.config.max_polyline_points;
    ctx.document
        .entities()
        .iter()
        .filter(|entity| entity.kind == EntityKind::Polyline && entity.vertex_count() > limit)
        .map(|entity| {
            Rule::ExcessivePoints
                .finding(
                    Rule::ExcessivePoints.severity(),
                    format!(
                        "Polyline {} has {} vertices (limit {limit})",
                        entity.id,
                        entity.vertex_count()
                    ),
                )
                .affecting_one(&entity.id)
        })
        .collect()
}
