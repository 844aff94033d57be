use std::fs;
use std::path::{Path, PathBuf};

use dxflint_core::{
    drawing::{
        BlockDefinition, COLOR_BY_LAYER, Drawing, LINE_WEIGHT_BY_LAYER, LayerRecord,
        PolylineVertex, RawEntity, Shape,
    },
    geometry::Point3,
};
use thiserror::Error;
use tracing::debug;

const BINARY_SENTINEL: &str = "AutoCAD Binary DXF";

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

/// 把外部文件读成原始图纸。
pub trait DrawingLoader {
    fn load(&self, path: &Path) -> Result<Drawing, IoError>;
}

/// ASCII DXF 读取器。
#[derive(Debug, Default, Clone, Copy)]
pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    /// 解析内存中的 DXF 文本，不记录文件大小。
    pub fn parse_str(&self, source: &str) -> Result<Drawing, IoError> {
        if source.starts_with(BINARY_SENTINEL) {
            return Err(IoError::UnsupportedFeature("二进制 DXF 暂不支持".to_string()));
        }
        let drawing = DxfParser::new(source).parse().map_err(|err| match err {
            DxfError::Unsupported { feature } => IoError::UnsupportedFeature(feature),
            DxfError::Invalid { message } => IoError::InvalidDocument(message),
        })?;
        debug!(
            entities = drawing.entities().len(),
            layers = drawing.layers().count(),
            blocks = drawing.blocks().count(),
            "DXF 解析完成"
        );
        Ok(drawing)
    }
}

impl DrawingLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Drawing, IoError> {
        let bytes = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        // 老版本 DXF 常用本地代码页，非 UTF-8 字节按替换字符处理
        let data = String::from_utf8_lossy(&bytes);
        let mut drawing = self.parse_str(&data)?;
        drawing.set_file_size(bytes.len() as u64);
        Ok(drawing)
    }
}

#[derive(Debug)]
enum DxfError {
    Unsupported { feature: String },
    Invalid { message: String },
}

impl DxfError {
    fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// 所有实体共享的组码：句柄、图层、颜色、线宽与标高。
#[derive(Debug)]
struct CommonFields {
    handle: Option<String>,
    layer: Option<String>,
    color: i16,
    line_weight: i16,
    elevation: Option<f64>,
}

impl Default for CommonFields {
    fn default() -> Self {
        Self {
            handle: None,
            layer: None,
            color: COLOR_BY_LAYER,
            line_weight: LINE_WEIGHT_BY_LAYER,
            elevation: None,
        }
    }
}

impl CommonFields {
    /// 消费公共组码时返回 `true`。
    fn accept(&mut self, code: i32, value: &str, kind: &str) -> Result<bool, DxfError> {
        match code {
            5 => {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    self.handle = Some(trimmed.to_string());
                }
            }
            8 => self.layer = Some(value.trim().to_string()),
            62 => self.color = parse_i16(value, &format!("{kind} 颜色（组码 62）"))?,
            370 => self.line_weight = parse_i16(value, &format!("{kind} 线宽（组码 370）"))?,
            38 => self.elevation = Some(parse_f64(value, &format!("{kind} 标高（组码 38）"))?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn finish(self, shape: Shape) -> RawEntity {
        RawEntity {
            handle: self.handle,
            layer: self.layer,
            color: self.color,
            line_weight: self.line_weight,
            shape,
        }
    }

    /// 缺少必需组码的实体以 `Shape::Malformed` 保留，文件其余部分照常读取。
    fn finish_with(self, kind: &str, shape: EntityResult<Shape>) -> RawEntity {
        match shape {
            Ok(shape) => self.finish(shape),
            Err(reason) => {
                debug!(kind, reason = %reason, "实体缺少必需组码");
                self.finish(Shape::Malformed {
                    kind: kind.to_string(),
                    reason,
                })
            }
        }
    }
}

struct DxfParser<'a> {
    reader: DxfReader<'a>,
}

impl<'a> DxfParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source),
        }
    }

    fn parse(mut self) -> Result<Drawing, DxfError> {
        let mut drawing = Drawing::new();
        while let Some((code, value)) = self.reader.next_pair()? {
            if code == 999 {
                continue;
            }
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                )));
            }
            match value.trim() {
                "SECTION" => {
                    let (name_code, name) = self
                        .reader
                        .next_pair()?
                        .ok_or_else(|| DxfError::invalid("SECTION 缺少名称（组码 2）"))?;
                    if name_code != 2 {
                        return Err(DxfError::invalid(format!(
                            "SECTION 名称使用了组码 {name_code}（期望 2）"
                        )));
                    }
                    match name.trim() {
                        "HEADER" => self.parse_header(&mut drawing)?,
                        "TABLES" => self.parse_tables(&mut drawing)?,
                        "BLOCKS" => self.parse_blocks(&mut drawing)?,
                        "ENTITIES" => self.parse_entities(&mut drawing)?,
                        _ => self.skip_section()?,
                    }
                }
                "EOF" => break,
                unexpected => {
                    return Err(DxfError::invalid(format!(
                        "意外的标记 {unexpected}，期望 SECTION 或 EOF"
                    )));
                }
            }
        }
        Ok(drawing)
    }

    fn skip_section(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "ENDSEC" => break,
                Some(_) => continue,
                None => {
                    return Err(DxfError::invalid("SECTION 未找到 ENDSEC 终止标记"));
                }
            }
        }
        Ok(())
    }

    fn parse_header(&mut self, drawing: &mut Drawing) -> Result<(), DxfError> {
        let mut variable: Option<String> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "ENDSEC" => break,
                Some((9, name)) => variable = Some(name.trim().to_string()),
                Some((code, value)) => match (variable.as_deref(), code) {
                    (Some("$ACADVER"), 1) => drawing.set_version(value.trim()),
                    (Some("$INSUNITS"), 70) => {
                        drawing.set_units(parse_i16(&value, "$INSUNITS（组码 70）")?)
                    }
                    _ => {}
                },
                None => return Err(DxfError::invalid("HEADER 段提前结束")),
            }
        }
        Ok(())
    }

    fn parse_tables(&mut self, drawing: &mut Drawing) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "ENDSEC" => break,
                    "LAYER" => {
                        let record = self.parse_layer_record()?;
                        drawing.add_layer(record);
                    }
                    _ => {}
                },
                Some(_) => continue,
                None => return Err(DxfError::invalid("TABLES 段提前结束")),
            }
        }
        Ok(())
    }

    fn parse_layer_record(&mut self) -> Result<LayerRecord, DxfError> {
        let mut name: Option<String> = None;
        let mut color: Option<i16> = None;
        let mut flags: i16 = 0;
        let mut line_weight: Option<i16> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    2 => name = Some(value.trim().to_string()),
                    62 => color = Some(parse_i16(&value, "LAYER 颜色（组码 62）")?),
                    70 => flags = parse_i16(&value, "LAYER 标志（组码 70）")?,
                    370 => line_weight = Some(parse_i16(&value, "LAYER 线宽（组码 370）")?),
                    _ => {}
                },
                None => return Err(DxfError::invalid("LAYER 记录未正确结束")),
            }
        }

        let name = name.ok_or_else(|| DxfError::invalid("LAYER 记录缺少名称（组码 2）"))?;
        let mut record = LayerRecord::new(name);
        if let Some(color) = color {
            // 负颜色号表示图层关闭
            record.is_off = color < 0;
            record.color = color.saturating_abs();
        }
        record.is_frozen = flags & 0x01 != 0;
        record.is_locked = flags & 0x04 != 0;
        if let Some(line_weight) = line_weight {
            record.line_weight = line_weight;
        }
        Ok(record)
    }

    fn parse_entities(&mut self, drawing: &mut Drawing) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("ENTITIES 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "ENTITIES 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.trim() {
                "ENDSEC" => break,
                kind => {
                    if let Some(entity) = self.parse_entity(kind)? {
                        drawing.add_entity(entity);
                    }
                }
            }
        }
        Ok(())
    }

    fn parse_blocks(&mut self, drawing: &mut Drawing) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("BLOCKS 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "BLOCKS 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.trim() {
                "ENDSEC" => break,
                "BLOCK" => {
                    if let Some(definition) = self.parse_block_definition()? {
                        drawing.add_block(definition);
                    }
                }
                _ => {
                    // 未预期的条目，直接跳过
                    self.skip_entity_body()?;
                }
            }
        }
        Ok(())
    }

    /// 模型/图纸空间块（`*` 开头）不会被插入，返回 `None`。
    fn parse_block_definition(&mut self) -> Result<Option<BlockDefinition>, DxfError> {
        let mut name: Option<String> = None;
        let mut base = [None, None, None];
        let mut entities: Vec<RawEntity> = Vec::new();

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "ENDBLK" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    kind => {
                        if let Some(entity) = self.parse_entity(kind)? {
                            entities.push(entity);
                        }
                    }
                },
                Some((code, value)) => match code {
                    2 => name = Some(value.trim().to_string()),
                    10 => base[0] = Some(parse_f64(&value, "BLOCK 基点 X")?),
                    20 => base[1] = Some(parse_f64(&value, "BLOCK 基点 Y")?),
                    30 => base[2] = Some(parse_f64(&value, "BLOCK 基点 Z")?),
                    _ => {}
                },
                None => {
                    return Err(DxfError::invalid("BLOCK 定义未找到 ENDBLK 终止标记"));
                }
            }
        }

        let name = name.ok_or_else(|| DxfError::invalid("BLOCK 缺少名称（组码 2）"))?;
        if name.starts_with('*') {
            return Ok(None);
        }

        let [x, y, z] = base;
        Ok(Some(BlockDefinition {
            name,
            base_point: Point3::new(x.unwrap_or(0.0), y.unwrap_or(0.0), z.unwrap_or(0.0)),
            entities,
        }))
    }

    /// 附属记录（属性、顶点、序列结束）不构成独立实体，返回 `None`。
    fn parse_entity(&mut self, kind: &str) -> Result<Option<RawEntity>, DxfError> {
        let entity = match kind {
            "LINE" => self.parse_line()?,
            "LWPOLYLINE" => self.parse_lwpolyline()?,
            "POLYLINE" => self.parse_polyline()?,
            "CIRCLE" => self.parse_circle()?,
            "ARC" => self.parse_arc()?,
            "TEXT" => self.parse_text()?,
            "MTEXT" => self.parse_mtext()?,
            "INSERT" => self.parse_insert()?,
            "ATTDEF" | "ATTRIB" | "VERTEX" | "SEQEND" => {
                self.skip_entity_body()?;
                return Ok(None);
            }
            "" => return Err(DxfError::unsupported("实体类型为空")),
            other => self.parse_generic(other)?,
        };
        Ok(Some(entity))
    }

    fn parse_line(&mut self) -> Result<RawEntity, DxfError> {
        let mut common = CommonFields::default();
        let mut start = [None, None, None];
        let mut end = [None, None, None];
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if common.accept(code, &value, "LINE")? {
                        continue;
                    }
                    match code {
                        10 => assign_coord(&mut start[0], &value, "LINE 起点 X")?,
                        20 => assign_coord(&mut start[1], &value, "LINE 起点 Y")?,
                        30 => assign_coord(&mut start[2], &value, "LINE 起点 Z")?,
                        11 => assign_coord(&mut end[0], &value, "LINE 终点 X")?,
                        21 => assign_coord(&mut end[1], &value, "LINE 终点 Y")?,
                        31 => assign_coord(&mut end[2], &value, "LINE 终点 Z")?,
                        _ => {}
                    }
                }
                None => return Err(DxfError::invalid("LINE 未正确结束")),
            }
        }

        let shape = point(start, "start point (group codes 10/20)").and_then(|start| {
            Ok(Shape::Line {
                start,
                end: point(end, "end point (group codes 11/21)")?,
            })
        });
        Ok(common.finish_with("LINE", shape))
    }

    fn parse_circle(&mut self) -> Result<RawEntity, DxfError> {
        let mut common = CommonFields::default();
        let mut center = [None, None, None];
        let mut radius = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if common.accept(code, &value, "CIRCLE")? {
                        continue;
                    }
                    match code {
                        10 => assign_coord(&mut center[0], &value, "CIRCLE 圆心 X")?,
                        20 => assign_coord(&mut center[1], &value, "CIRCLE 圆心 Y")?,
                        30 => assign_coord(&mut center[2], &value, "CIRCLE 圆心 Z")?,
                        40 => assign_coord(&mut radius, &value, "CIRCLE 半径")?,
                        _ => {}
                    }
                }
                None => return Err(DxfError::invalid("CIRCLE 未正确结束")),
            }
        }

        let shape = point(center, "center (group codes 10/20)").and_then(|center| {
            Ok(Shape::Circle {
                center,
                radius: required(radius, "radius (group code 40)")?,
            })
        });
        Ok(common.finish_with("CIRCLE", shape))
    }

    fn parse_arc(&mut self) -> Result<RawEntity, DxfError> {
        let mut common = CommonFields::default();
        let mut center = [None, None, None];
        let mut radius = None;
        let mut start_angle_deg = None;
        let mut end_angle_deg = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if common.accept(code, &value, "ARC")? {
                        continue;
                    }
                    match code {
                        10 => assign_coord(&mut center[0], &value, "ARC 圆心 X")?,
                        20 => assign_coord(&mut center[1], &value, "ARC 圆心 Y")?,
                        30 => assign_coord(&mut center[2], &value, "ARC 圆心 Z")?,
                        40 => assign_coord(&mut radius, &value, "ARC 半径")?,
                        50 => assign_coord(&mut start_angle_deg, &value, "ARC 起始角")?,
                        51 => assign_coord(&mut end_angle_deg, &value, "ARC 终止角")?,
                        _ => {}
                    }
                }
                None => return Err(DxfError::invalid("ARC 未正确结束")),
            }
        }

        let shape = point(center, "center (group codes 10/20)").and_then(|center| {
            Ok(Shape::Arc {
                center,
                radius: required(radius, "radius (group code 40)")?,
                start_angle_deg: required(start_angle_deg, "start angle (group code 50)")?,
                end_angle_deg: required(end_angle_deg, "end angle (group code 51)")?,
            })
        });
        Ok(common.finish_with("ARC", shape))
    }

    fn parse_lwpolyline(&mut self) -> Result<RawEntity, DxfError> {
        let mut common = CommonFields::default();
        let mut is_closed = false;
        let mut points: Vec<(f64, f64, f64)> = Vec::new();
        let mut pending_x: Option<f64> = None;
        let mut pending_y: Option<f64> = None;
        let mut defect: Option<String> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if common.accept(code, &value, "LWPOLYLINE")? {
                        continue;
                    }
                    match code {
                        70 => {
                            let flag = parse_i32(&value, "LWPOLYLINE 标志")?;
                            is_closed = flag & 0x01 == 0x01;
                        }
                        10 => {
                            let x = parse_f64(&value, "LWPOLYLINE 顶点 X")?;
                            if let Some(y) = pending_y.take() {
                                points.push((x, y, 0.0));
                            } else if pending_x.replace(x).is_some() {
                                defect.get_or_insert_with(|| {
                                    "vertex without a Y coordinate (group code 20)".to_string()
                                });
                            }
                        }
                        20 => {
                            let y = parse_f64(&value, "LWPOLYLINE 顶点 Y")?;
                            if let Some(x) = pending_x.take() {
                                points.push((x, y, 0.0));
                            } else if pending_y.replace(y).is_some() {
                                defect.get_or_insert_with(|| {
                                    "vertex without an X coordinate (group code 10)".to_string()
                                });
                            }
                        }
                        42 => {
                            let bulge = parse_f64(&value, "LWPOLYLINE 顶点 bulge")?;
                            match points.last_mut() {
                                Some(last) => last.2 = bulge,
                                None => {
                                    defect.get_or_insert_with(|| {
                                        "bulge before the first vertex (group code 42)".to_string()
                                    });
                                }
                            }
                        }
                        _ => {}
                    }
                }
                None => return Err(DxfError::invalid("LWPOLYLINE 未正确结束")),
            }
        }

        if pending_x.is_some() || pending_y.is_some() {
            defect.get_or_insert_with(|| "incomplete vertex (group codes 10/20)".to_string());
        }
        if let Some(reason) = defect {
            return Ok(common.finish_with("LWPOLYLINE", Err(reason)));
        }

        // LWPOLYLINE 的顶点只有 XY，Z 取实体标高
        let elevation = common.elevation.unwrap_or(0.0);
        let vertices = points
            .into_iter()
            .map(|(x, y, bulge)| PolylineVertex {
                position: Point3::new(x, y, elevation),
                bulge,
            })
            .collect();
        Ok(common.finish(Shape::Polyline {
            vertices,
            is_closed,
        }))
    }

    /// 旧式 POLYLINE：头部之后跟随 VERTEX 记录，以 SEQEND 结束。
    /// 多面网格与多边形网格不是切割路径，按其他对象保留。
    fn parse_polyline(&mut self) -> Result<RawEntity, DxfError> {
        let mut common = CommonFields::default();
        let mut flags: i16 = 0;
        let mut elevation: Option<f64> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if common.accept(code, &value, "POLYLINE")? {
                        continue;
                    }
                    match code {
                        70 => flags = parse_i16(&value, "POLYLINE 标志（组码 70）")?,
                        30 => elevation = Some(parse_f64(&value, "POLYLINE 标高（组码 30）")?),
                        _ => {}
                    }
                }
                None => return Err(DxfError::invalid("POLYLINE 未正确结束")),
            }
        }

        let default_z = elevation.or(common.elevation).unwrap_or(0.0);
        let mut vertices: Vec<PolylineVertex> = Vec::new();
        let mut defect: Option<String> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "VERTEX" => match self.parse_vertex(default_z)? {
                        Some(Ok(vertex)) => vertices.push(vertex),
                        Some(Err(reason)) => {
                            defect.get_or_insert(reason);
                        }
                        None => {}
                    },
                    "SEQEND" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    _ => {
                        self.reader.put_back((0, value));
                        break;
                    }
                },
                Some(_) => continue,
                None => break,
            }
        }

        if let Some(reason) = defect {
            return Ok(common.finish_with("POLYLINE", Err(reason)));
        }
        if flags & (0x10 | 0x40) != 0 {
            let kind = if flags & 0x40 != 0 { "POLYFACE" } else { "POLYMESH" };
            let anchor = vertices.first().map(|vertex| vertex.position);
            return Ok(common.finish(Shape::Other {
                kind: kind.to_string(),
                anchor,
            }));
        }

        Ok(common.finish(Shape::Polyline {
            vertices,
            is_closed: flags & 0x01 != 0,
        }))
    }

    /// 样条控制点（标志 16）不属于实际路径，返回 `None`。
    fn parse_vertex(
        &mut self,
        default_z: f64,
    ) -> Result<Option<EntityResult<PolylineVertex>>, DxfError> {
        let mut position = [None, None, None];
        let mut bulge = 0.0;
        let mut flags: i16 = 0;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    10 => assign_coord(&mut position[0], &value, "VERTEX X")?,
                    20 => assign_coord(&mut position[1], &value, "VERTEX Y")?,
                    30 => assign_coord(&mut position[2], &value, "VERTEX Z")?,
                    42 => bulge = parse_f64(&value, "VERTEX bulge")?,
                    70 => flags = parse_i16(&value, "VERTEX 标志（组码 70）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("VERTEX 未正确结束")),
            }
        }

        if flags & 0x10 != 0 {
            return Ok(None);
        }
        if position[2].is_none() {
            position[2] = Some(default_z);
        }
        Ok(Some(
            point(position, "vertex position (group codes 10/20)")
                .map(|position| PolylineVertex { position, bulge }),
        ))
    }

    fn parse_text(&mut self) -> Result<RawEntity, DxfError> {
        let mut common = CommonFields::default();
        let mut insert = [None, None, None];
        let mut height = None;
        let mut content: Option<String> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if common.accept(code, &value, "TEXT")? {
                        continue;
                    }
                    match code {
                        10 => assign_coord(&mut insert[0], &value, "TEXT 插入点 X")?,
                        20 => assign_coord(&mut insert[1], &value, "TEXT 插入点 Y")?,
                        30 => assign_coord(&mut insert[2], &value, "TEXT 插入点 Z")?,
                        40 => assign_coord(&mut height, &value, "TEXT 高度")?,
                        1 => content = Some(decode_text(&value)),
                        _ => {}
                    }
                }
                None => return Err(DxfError::invalid("TEXT 未正确结束")),
            }
        }

        let shape = point(insert, "insertion point (group codes 10/20)").and_then(|insert| {
            Ok(Shape::Text {
                insert,
                height: required(height, "text height (group code 40)")?,
                content: content.unwrap_or_default(),
            })
        });
        Ok(common.finish_with("TEXT", shape))
    }

    fn parse_mtext(&mut self) -> Result<RawEntity, DxfError> {
        let mut common = CommonFields::default();
        let mut insert = [None, None, None];
        let mut height = None;
        let mut fragments: Vec<String> = Vec::new();
        let mut tail: Option<String> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if common.accept(code, &value, "MTEXT")? {
                        continue;
                    }
                    match code {
                        10 => assign_coord(&mut insert[0], &value, "MTEXT 插入点 X")?,
                        20 => assign_coord(&mut insert[1], &value, "MTEXT 插入点 Y")?,
                        30 => assign_coord(&mut insert[2], &value, "MTEXT 插入点 Z")?,
                        40 => assign_coord(&mut height, &value, "MTEXT 高度")?,
                        // 组码 3 为前置分块，组码 1 为最后一块
                        3 => fragments.push(value),
                        1 => tail = Some(value),
                        _ => {}
                    }
                }
                None => return Err(DxfError::invalid("MTEXT 未正确结束")),
            }
        }

        fragments.extend(tail);
        let content = decode_text(&fragments.concat());
        let shape = point(insert, "insertion point (group codes 10/20)").and_then(|insert| {
            Ok(Shape::MText {
                insert,
                height: required(height, "text height (group code 40)")?,
                content,
            })
        });
        Ok(common.finish_with("MTEXT", shape))
    }

    fn parse_insert(&mut self) -> Result<RawEntity, DxfError> {
        let mut common = CommonFields::default();
        let mut name = None;
        let mut insert = [None, None, None];
        let mut scale_x: Option<f64> = None;
        let mut scale_y: Option<f64> = None;
        let mut rotation_deg: f64 = 0.0;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if common.accept(code, &value, "INSERT")? {
                        continue;
                    }
                    match code {
                        2 => {
                            if name.is_some() {
                                return Err(DxfError::invalid("INSERT 遇到重复的块名（组码 2）"));
                            }
                            name = Some(value.trim().to_string());
                        }
                        10 => assign_coord(&mut insert[0], &value, "INSERT 插入点 X")?,
                        20 => assign_coord(&mut insert[1], &value, "INSERT 插入点 Y")?,
                        30 => assign_coord(&mut insert[2], &value, "INSERT 插入点 Z")?,
                        41 => scale_x = Some(parse_f64(&value, "INSERT 缩放 X")?),
                        42 => scale_y = Some(parse_f64(&value, "INSERT 缩放 Y")?),
                        50 => rotation_deg = parse_f64(&value, "INSERT 旋转角")?,
                        _ => {}
                    }
                }
                None => return Err(DxfError::invalid("INSERT 未正确结束")),
            }
        }

        let scale_x = scale_x.unwrap_or(1.0);
        let scale_y = scale_y.unwrap_or(scale_x);

        // 跟随的 ATTRIB 序列只是块属性值，读取后丢弃
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "ATTRIB" => self.skip_entity_body()?,
                    "SEQEND" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    _ => {
                        self.reader.put_back((0, value));
                        break;
                    }
                },
                Some((code, value)) => {
                    return Err(DxfError::invalid(format!(
                        "INSERT 属性段出现意外组码 {code} 值 {value}"
                    )));
                }
                None => break,
            }
        }

        let shape = match name {
            Some(block) => point(insert, "insertion point (group codes 10/20)").map(|insert| {
                Shape::Insert {
                    block,
                    insert,
                    scale_x,
                    scale_y,
                    rotation_deg,
                }
            }),
            None => Err("missing block name (group code 2)".to_string()),
        };
        Ok(common.finish_with("INSERT", shape))
    }

    /// 其余实体只记录类型与首个坐标，供结构类检查使用。
    fn parse_generic(&mut self, kind: &str) -> Result<RawEntity, DxfError> {
        let mut common = CommonFields::default();
        let mut anchor = [None, None, None];
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if common.accept(code, &value, kind)? {
                        continue;
                    }
                    let slot = match code {
                        10 => &mut anchor[0],
                        20 => &mut anchor[1],
                        30 => &mut anchor[2],
                        _ => continue,
                    };
                    if slot.is_none() {
                        *slot = Some(parse_f64(&value, &format!("{kind} 坐标"))?);
                    }
                }
                None => return Err(DxfError::invalid(format!("{kind} 未正确结束"))),
            }
        }

        let anchor = match anchor {
            [Some(x), Some(y), z] => Some(Point3::new(x, y, z.unwrap_or(0.0))),
            _ => None,
        };
        Ok(common.finish(Shape::Other {
            kind: kind.to_string(),
            anchor,
        }))
    }

    fn skip_entity_body(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }
}

struct DxfReader<'a> {
    lines: std::str::Lines<'a>,
    buffer: Option<(i32, String)>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            buffer: None,
            line_number: 0,
        }
    }

    fn next_pair(&mut self) -> Result<Option<(i32, String)>, DxfError> {
        if let Some(pair) = self.buffer.take() {
            return Ok(Some(pair));
        }

        let code_line = loop {
            match self.lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    // 允许文件末尾的空行
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Ok(None),
            }
        };

        let value_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => {
                return Err(DxfError::invalid(format!(
                    "文件在第 {} 行结束，缺少与组码对应的值行",
                    self.line_number
                )));
            }
        };

        let code = code_line.trim().parse::<i32>().map_err(|_| {
            DxfError::invalid(format!(
                "第 {} 行的组码 \"{}\" 无法解析为整数",
                self.line_number - 1,
                code_line.trim()
            ))
        })?;
        let value = value_line.trim_end_matches('\r').to_string();
        Ok(Some((code, value)))
    }

    fn put_back(&mut self, pair: (i32, String)) {
        debug_assert!(self.buffer.is_none(), "DXF pair 只能回退一次");
        self.buffer = Some(pair);
    }
}

fn assign_coord(slot: &mut Option<f64>, raw: &str, context: &str) -> Result<(), DxfError> {
    if slot.is_some() {
        return Err(DxfError::invalid(format!("{context} 出现重复值")));
    }
    *slot = Some(parse_f64(raw, context)?);
    Ok(())
}

/// 实体级缺陷的原因，写入报告。
type EntityResult<T> = Result<T, String>;

fn required(value: Option<f64>, what: &str) -> EntityResult<f64> {
    value.ok_or_else(|| format!("missing {what}"))
}

/// XY 必须成对出现，缺省 Z 为 0。
fn point(coords: [Option<f64>; 3], what: &str) -> EntityResult<Point3> {
    match coords {
        [Some(x), Some(y), z] => Ok(Point3::new(x, y, z.unwrap_or(0.0))),
        _ => Err(format!("missing {what}")),
    }
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i32(raw: &str, context: &str) -> Result<i32, DxfError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i16(raw: &str, context: &str) -> Result<i16, DxfError> {
    let value = parse_i32(raw, context)?;
    i16::try_from(value)
        .map_err(|_| DxfError::invalid(format!("{context} 超出 i16 范围（值：{value}）")))
}

/// 文字控制码：`%%d`/`%%c`/`%%p` 与 MTEXT 的换行、不换行空格。
const TEXT_ESCAPES: [(&str, &str); 10] = [
    ("%%d", "°"),
    ("%%D", "°"),
    ("%%c", "⌀"),
    ("%%C", "⌀"),
    ("%%p", "±"),
    ("%%P", "±"),
    ("%%%", "%"),
    ("\\P", "\n"),
    ("\\p", "\n"),
    ("\\~", " "),
];

fn decode_text(raw: &str) -> String {
    TEXT_ESCAPES
        .iter()
        .fold(raw.to_string(), |text, (code, replacement)| text.replace(code, replacement))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_skips_trailing_blank_lines() {
        let mut reader = DxfReader::new("0\nEOF\n\n\n");
        assert_eq!(reader.next_pair().expect("pair"), Some((0, "EOF".to_string())));
        assert_eq!(reader.next_pair().expect("eof"), None);
    }

    #[test]
    fn reader_reports_missing_value_line() {
        let mut reader = DxfReader::new("0\nSECTION\n2");
        assert!(reader.next_pair().expect("first pair").is_some());
        assert!(matches!(reader.next_pair(), Err(DxfError::Invalid { .. })));
    }

    #[test]
    fn text_control_codes_are_decoded() {
        assert_eq!(decode_text("45%%d"), "45°");
        assert_eq!(decode_text("%%C10 %%p0.1"), "⌀10 ±0.1");
        assert_eq!(decode_text("50%"), "50%");
        assert_eq!(decode_text("A\\PB\\~C"), "A\nB C");
    }

    #[test]
    fn common_fields_capture_entity_attributes() {
        let mut common = CommonFields::default();
        assert!(common.accept(5, "2A", "LINE").expect("handle"));
        assert!(common.accept(8, " CUT ", "LINE").expect("layer"));
        assert!(common.accept(370, "25", "LINE").expect("weight"));
        assert!(!common.accept(10, "1.0", "LINE").expect("coordinate"));
        let entity = common.finish(Shape::Other {
            kind: "POINT".to_string(),
            anchor: None,
        });
        assert_eq!(entity.handle.as_deref(), Some("2A"));
        assert_eq!(entity.layer.as_deref(), Some("CUT"));
        assert_eq!(entity.line_weight, 25);
        assert_eq!(entity.color, COLOR_BY_LAYER);
    }
}
