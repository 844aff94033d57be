//! 把解析器输出的原始图纸归一化为只读文档：分配实体 ID、展开块参照、
//! 离散圆与圆弧、计算派生几何属性。单个实体失败只产生加载错误，不中断分析。

use std::collections::HashMap;

use dxflint_config::AnalysisConfig;
use dxflint_core::{
    document::{BlockRef, Document, Entity, EntityId, EntityKind, Layer, Units},
    drawing::{
        COLOR_BY_BLOCK, Drawing, LINE_WEIGHT_BY_BLOCK, RawEntity, Shape,
    },
    geometry::{self, Placement, Point3},
};
use tracing::{debug, warn};

use crate::deadline::Deadline;
use crate::errors::AnalysisError;
use crate::findings::Finding;

/// 每处理多少个实体检查一次时间预算。
const DEADLINE_STRIDE: usize = 256;

#[derive(Debug, Clone)]
pub struct Normalized {
    pub document: Document,
    /// 规则 0：无法归一化的实体。
    pub load_findings: Vec<Finding>,
}

pub fn normalize(
    drawing: &Drawing,
    config: &AnalysisConfig,
    deadline: &Deadline,
) -> Result<Normalized, AnalysisError> {
    let header = drawing.header();
    let mut document = Document::new(
        header.version.clone(),
        Units::from_insunits(header.units),
        header.file_size_bytes,
    );
    for record in drawing.layers() {
        document.insert_layer(Layer {
            name: record.name.clone(),
            visible: !record.is_off && !record.is_frozen,
            locked: record.is_locked,
            color: record.color,
        });
    }

    let ids = top_level_ids(drawing.entities());
    let mut normalizer = Normalizer {
        drawing,
        config,
        deadline,
        document,
        findings: Vec::new(),
        dropped: 0,
        visited: 0,
    };
    let root = Scope::root();
    for (raw, id) in drawing.entities().iter().zip(ids) {
        normalizer.expand(raw, id, &root)?;
    }

    let Normalizer {
        mut document,
        findings,
        dropped,
        ..
    } = normalizer;

    if document.is_empty() {
        warn!(dropped, "归一化后没有可用几何");
        return Err(AnalysisError::NoUsableGeometry { dropped });
    }

    // 实体引用但图层表缺失的图层按可见、未锁定补齐
    let missing: Vec<String> = document
        .entities()
        .iter()
        .filter(|entity| document.layer(&entity.layer).is_none())
        .map(|entity| entity.layer.clone())
        .collect();
    for name in missing {
        if document.insert_layer(Layer::new(name.clone())) {
            debug!(layer = %name, "补齐图层表中缺失的图层");
        }
    }

    debug!(
        entities = document.entities().len(),
        layers = document.layers().count(),
        load_errors = findings.len(),
        "归一化完成"
    );
    Ok(Normalized {
        document,
        load_findings: findings,
    })
}

/// 句柄唯一时直接使用，否则按出现顺序生成 `#<n>`。
fn top_level_ids(entities: &[RawEntity]) -> Vec<EntityId> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for entity in entities {
        if let Some(handle) = usable_handle(entity) {
            *counts.entry(handle).or_default() += 1;
        }
    }
    entities
        .iter()
        .enumerate()
        .map(|(index, entity)| match usable_handle(entity) {
            Some(handle) if counts.get(handle) == Some(&1) => EntityId::new(handle),
            _ => EntityId::new(format!("#{}", index + 1)),
        })
        .collect()
}

fn usable_handle(entity: &RawEntity) -> Option<&str> {
    entity
        .handle
        .as_deref()
        .map(str::trim)
        .filter(|handle| !handle.is_empty())
}

/// 块展开时向下传递的上下文。
#[derive(Debug, Clone)]
struct Scope {
    /// 由内到外依次应用。
    placements: Vec<Placement>,
    /// 展开栈上的块名（大写），用于检测循环引用。
    stack: Vec<String>,
    layer: Option<String>,
    color: i16,
    line_weight: i16,
    top_insert: Option<EntityId>,
    depth: u32,
}

impl Scope {
    fn root() -> Self {
        Self {
            placements: Vec::new(),
            stack: Vec::new(),
            layer: None,
            color: COLOR_BY_BLOCK,
            line_weight: LINE_WEIGHT_BY_BLOCK,
            top_insert: None,
            depth: 0,
        }
    }

    fn transform(&self, point: Point3) -> Point3 {
        self.placements
            .iter()
            .fold(point, |point, placement| placement.apply(point))
    }

    fn scale_length(&self, value: f64) -> f64 {
        self.placements
            .iter()
            .fold(value, |value, placement| placement.scale_length(value))
    }

    fn in_block(&self) -> bool {
        self.depth > 0
    }
}

struct Normalizer<'a> {
    drawing: &'a Drawing,
    config: &'a AnalysisConfig,
    deadline: &'a Deadline,
    document: Document,
    findings: Vec<Finding>,
    dropped: usize,
    visited: usize,
}

/// 单个原始实体转换后的几何。
struct Geometry {
    kind: EntityKind,
    vertices: Vec<Point3>,
    anchor: Option<Point3>,
    declared_closed: bool,
    text_height: Option<f64>,
    text: Option<String>,
}

impl<'a> Normalizer<'a> {
    fn expand(&mut self, raw: &RawEntity, id: EntityId, scope: &Scope) -> Result<(), AnalysisError> {
        self.visited += 1;
        if self.visited % DEADLINE_STRIDE == 0 {
            self.deadline.check()?;
        }

        let layer = self.resolve_layer(raw, scope);
        let color = match raw.color {
            COLOR_BY_BLOCK if scope.in_block() => scope.color,
            color => color,
        };
        let line_weight = match raw.line_weight {
            LINE_WEIGHT_BY_BLOCK if scope.in_block() => scope.line_weight,
            line_weight => line_weight,
        };

        let geometry = match &raw.shape {
            Shape::Insert {
                block,
                insert,
                scale_x,
                scale_y,
                rotation_deg,
            } => {
                let placement = Placement {
                    base_point: Point3::flat(0.0, 0.0),
                    insert: *insert,
                    scale_x: *scale_x,
                    scale_y: *scale_y,
                    rotation: rotation_deg.to_radians(),
                };
                if !placement_is_valid(&placement) {
                    self.drop_entity(&id, raw, "insertion point, scale or rotation is not a finite value");
                    return Ok(());
                }
                match self.unresolved_reason(block, scope) {
                    Some(reason) => {
                        warn!(entity = %id, block = %block, reason = %reason, "块参照无法展开");
                        self.findings.push(
                            Finding::load_error(format!(
                                "Block reference {id} to '{block}' was kept unexpanded: {reason}"
                            ))
                            .affecting_one(&id),
                        );
                        Geometry {
                            kind: EntityKind::Insert(BlockRef {
                                name: block.clone(),
                            }),
                            vertices: Vec::new(),
                            anchor: Some(*insert),
                            declared_closed: false,
                            text_height: None,
                            text: None,
                        }
                    }
                    None => {
                        let child_scope = Scope {
                            placements: self.child_placements(block, placement, scope),
                            stack: {
                                let mut stack = scope.stack.clone();
                                stack.push(block.to_ascii_uppercase());
                                stack
                            },
                            layer: Some(layer),
                            color,
                            line_weight,
                            top_insert: scope.top_insert.clone().or_else(|| Some(id.clone())),
                            depth: scope.depth + 1,
                        };
                        let drawing = self.drawing;
                        let children = drawing
                            .block(block)
                            .map(|definition| definition.entities.as_slice())
                            .unwrap_or_default();
                        for (index, child) in children.iter().enumerate() {
                            let child_id = EntityId::new(format!("{id}/{}", index + 1));
                            self.expand(child, child_id, &child_scope)?;
                        }
                        return Ok(());
                    }
                }
            }
            shape => match shape_geometry(shape) {
                Ok(geometry) => geometry,
                Err(reason) => {
                    self.drop_entity(&id, raw, reason);
                    return Ok(());
                }
            },
        };

        let vertices: Vec<Point3> = geometry
            .vertices
            .into_iter()
            .map(|point| scope.transform(point))
            .collect();
        let anchor = geometry.anchor.map(|point| scope.transform(point));
        let mut entity = Entity::new(id, geometry.kind, layer).with_geometry(
            vertices,
            anchor,
            geometry.declared_closed,
            self.config.tolerance,
        );
        entity.color = color;
        entity.line_weight = line_weight;
        entity.text_height = geometry.text_height.map(|height| scope.scale_length(height));
        entity.text = geometry.text;
        entity.is_block_instance = scope.in_block();
        entity.nesting_depth = scope.depth;
        entity.source_insert = scope.top_insert.clone();
        self.document.push_entity(entity);
        Ok(())
    }

    /// 块内图层 0 上的实体继承插入块参照所在图层。
    fn resolve_layer(&self, raw: &RawEntity, scope: &Scope) -> String {
        let name = raw.layer_name().trim();
        let name = if name.is_empty() { "0" } else { name };
        match (&scope.layer, name) {
            (Some(inherited), "0") => inherited.clone(),
            _ => name.to_string(),
        }
    }

    fn unresolved_reason(&self, block: &str, scope: &Scope) -> Option<String> {
        let key = block.to_ascii_uppercase();
        if scope.stack.contains(&key) {
            return Some("the block references itself (cycle)".to_string());
        }
        if scope.depth >= self.config.max_block_depth {
            return Some(format!(
                "nesting exceeds the maximum depth of {}",
                self.config.max_block_depth
            ));
        }
        if self.drawing.block(block).is_none() {
            return Some("the block is not defined in the drawing".to_string());
        }
        None
    }

    fn child_placements(&self, block: &str, mut placement: Placement, scope: &Scope) -> Vec<Placement> {
        if let Some(definition) = self.drawing.block(block) {
            placement.base_point = definition.base_point;
        }
        let mut placements = Vec::with_capacity(scope.placements.len() + 1);
        placements.push(placement);
        placements.extend(scope.placements.iter().copied());
        placements
    }

    fn drop_entity(&mut self, id: &EntityId, raw: &RawEntity, reason: &str) {
        warn!(entity = %id, kind = raw.shape.type_name(), reason, "丢弃无法归一化的实体");
        self.dropped += 1;
        self.findings.push(
            Finding::load_error(format!(
                "{} {id} was dropped: {reason}",
                raw.shape.type_name()
            ))
            .affecting_one(id),
        );
    }
}

fn placement_is_valid(placement: &Placement) -> bool {
    placement.insert.is_finite()
        && placement.scale_x.is_finite()
        && placement.scale_y.is_finite()
        && placement.rotation.is_finite()
        && placement.scale_x != 0.0
        && placement.scale_y != 0.0
}

fn valid_radius(radius: f64) -> bool {
    radius.is_finite() && radius > 0.0
}

fn shape_geometry(shape: &Shape) -> Result<Geometry, &str> {
    let geometry = match shape {
        Shape::Line { start, end } => Geometry {
            kind: EntityKind::Line,
            vertices: vec![*start, *end],
            anchor: None,
            declared_closed: false,
            text_height: None,
            text: None,
        },
        Shape::Polyline {
            vertices,
            is_closed,
        } => {
            if vertices.is_empty() {
                return Err("polyline has no vertices");
            }
            Geometry {
                kind: EntityKind::Polyline,
                vertices: vertices.iter().map(|vertex| vertex.position).collect(),
                anchor: None,
                declared_closed: *is_closed,
                text_height: None,
                text: None,
            }
        }
        Shape::Circle { center, radius } => {
            if !valid_radius(*radius) {
                return Err("circle radius must be a positive finite number");
            }
            Geometry {
                kind: EntityKind::Circle,
                vertices: geometry::circle_points(*center, *radius),
                anchor: None,
                declared_closed: true,
                text_height: None,
                text: None,
            }
        }
        Shape::Arc {
            center,
            radius,
            start_angle_deg,
            end_angle_deg,
        } => {
            if !valid_radius(*radius) {
                return Err("arc radius must be a positive finite number");
            }
            if !(start_angle_deg.is_finite() && end_angle_deg.is_finite()) {
                return Err("arc angles are not finite");
            }
            Geometry {
                kind: EntityKind::Arc,
                vertices: geometry::arc_points(*center, *radius, *start_angle_deg, *end_angle_deg),
                anchor: None,
                declared_closed: false,
                text_height: None,
                text: None,
            }
        }
        Shape::Text {
            insert,
            height,
            content,
        }
        | Shape::MText {
            insert,
            height,
            content,
        } => {
            if !(height.is_finite() && *height >= 0.0) {
                return Err("text height must be a non-negative finite number");
            }
            let kind = match shape {
                Shape::MText { .. } => EntityKind::MText,
                _ => EntityKind::Text,
            };
            Geometry {
                kind,
                vertices: Vec::new(),
                anchor: Some(*insert),
                declared_closed: false,
                text_height: Some(*height),
                text: Some(content.clone()),
            }
        }
        Shape::Other { kind, anchor } => Geometry {
            kind: EntityKind::Other(kind.to_ascii_uppercase()),
            vertices: Vec::new(),
            anchor: *anchor,
            declared_closed: false,
            text_height: None,
            text: None,
        },
        Shape::Malformed { reason, .. } => return Err(reason.as_str()),
        Shape::Insert { .. } => return Err("block reference reached shape conversion"),
    };

    let finite = geometry.vertices.iter().all(|point| point.is_finite())
        && geometry.anchor.is_none_or(|point| point.is_finite());
    if !finite {
        return Err("geometry contains non-finite coordinates");
    }
    Ok(geometry)
}
