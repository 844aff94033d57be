pub mod geometry {
    use std::f64::consts::TAU;
    use std::fmt::{self, Write as _};

    use glam::{DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    /// 圆与圆弧离散化时每整圈使用的线段数（5° 一段）。
    pub const SEGMENTS_PER_TURN: usize = 72;

    /// 签名网格的最小步长，防止容差为 0 时除零。
    const MIN_GRID_STEP: f64 = 1e-9;

    /// 二维点，内部以 `glam::DVec2` 表示。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 三维点。图纸本身是平面的，Z 仅用于检测非零标高。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn flat(x: f64, y: f64) -> Self {
            Self(DVec3::new(x, y, 0.0))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn xy(self) -> Point2 {
            Point2::new(self.0.x, self.0.y)
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框，用于估算实体/文档范围。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        /// 宽高中较大的一个。
        #[inline]
        pub fn largest_extent(&self) -> f64 {
            self.width().max(self.height())
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        pub fn include_bounds(&mut self, other: &Bounds2D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        /// 原点到矩形的最短距离；矩形包含原点时为 0。
        pub fn distance_to_origin(&self) -> f64 {
            let dx = axis_gap(self.min.x(), self.max.x());
            let dy = axis_gap(self.min.y(), self.max.y());
            dx.hypot(dy)
        }
    }

    fn axis_gap(min: f64, max: f64) -> f64 {
        if min > 0.0 {
            min
        } else if max < 0.0 {
            -max
        } else {
            0.0
        }
    }

    /// 块参照的放置变换：先平移基点，再缩放、旋转，最后移到插入点。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct Placement {
        pub base_point: Point3,
        pub insert: Point3,
        pub scale_x: f64,
        pub scale_y: f64,
        pub rotation: f64,
    }

    impl Placement {
        pub fn apply(&self, point: Point3) -> Point3 {
            let local = point.as_vec3() - self.base_point.as_vec3();
            let scaled = DVec2::new(local.x * self.scale_x, local.y * self.scale_y);
            let rotated = DVec2::from_angle(self.rotation).rotate(scaled);
            Point3::new(
                self.insert.x() + rotated.x,
                self.insert.y() + rotated.y,
                self.insert.z() + local.z,
            )
        }

        /// 文字高度等标量随 Y 方向缩放。
        #[inline]
        pub fn scale_length(&self, value: f64) -> f64 {
            value * self.scale_y.abs()
        }
    }

    /// XY 平面内的容差比较，Z 单独处理。
    #[inline]
    pub fn points_equal(a: Point3, b: Point3, tolerance: f64) -> bool {
        a.xy().distance(b.xy()) <= tolerance
    }

    /// 容差意义下互不重合的顶点数。
    pub fn distinct_vertex_count(vertices: &[Point3], tolerance: f64) -> usize {
        let mut distinct: Vec<Point3> = Vec::new();
        for vertex in vertices {
            if !distinct
                .iter()
                .any(|seen| points_equal(*seen, *vertex, tolerance))
            {
                distinct.push(*vertex);
            }
        }
        distinct.len()
    }

    /// 是否至少有 `minimum` 个互不重合的顶点，找到足够数量后立即返回。
    pub fn has_distinct_vertices(vertices: &[Point3], minimum: usize, tolerance: f64) -> bool {
        let mut distinct: Vec<Point3> = Vec::with_capacity(minimum);
        for vertex in vertices {
            if !distinct
                .iter()
                .any(|seen| points_equal(*seen, *vertex, tolerance))
            {
                distinct.push(*vertex);
                if distinct.len() >= minimum {
                    return true;
                }
            }
        }
        distinct.len() >= minimum
    }

    /// 显式闭合或首尾重合即视为闭合；少于 3 个不同顶点的路径无法围成轮廓。
    pub fn is_closed(vertices: &[Point3], declared: bool, tolerance: f64) -> bool {
        let (Some(first), Some(last)) = (vertices.first(), vertices.last()) else {
            return false;
        };
        let loops = declared || (vertices.len() > 1 && points_equal(*first, *last, tolerance));
        loops && has_distinct_vertices(vertices, 3, tolerance)
    }

    /// 空顶点集没有边界框，调用方需自行处理 `None`。
    pub fn bounding_box(vertices: &[Point3]) -> Option<Bounds2D> {
        if vertices.is_empty() {
            return None;
        }
        let mut bounds = Bounds2D::empty();
        for vertex in vertices {
            bounds.include_point(vertex.xy());
        }
        Some(bounds)
    }

    pub fn distance_from_origin(vertices: &[Point3]) -> Option<f64> {
        bounding_box(vertices).map(|bounds| bounds.distance_to_origin())
    }

    pub fn z_range<'a>(points: impl IntoIterator<Item = &'a Point3>) -> Option<(f64, f64)> {
        points.into_iter().fold(None, |range, point| match range {
            None => Some((point.z(), point.z())),
            Some((low, high)) => Some((low.min(point.z()), high.max(point.z()))),
        })
    }

    pub fn polyline_length(vertices: &[Point3], closed: bool) -> f64 {
        let open: f64 = vertices
            .windows(2)
            .map(|pair| pair[0].xy().distance(pair[1].xy()))
            .sum();
        match (vertices.first(), vertices.last()) {
            (Some(first), Some(last)) if closed && vertices.len() > 2 => {
                open + last.xy().distance(first.xy())
            }
            _ => open,
        }
    }

    /// 鞋带公式求面积（取绝对值，与绕向无关）。
    pub fn polygon_area(vertices: &[Point3]) -> f64 {
        let count = vertices.len();
        if count < 3 {
            return 0.0;
        }
        let twice: f64 = (0..count)
            .map(|index| {
                let a = vertices[index];
                let b = vertices[(index + 1) % count];
                a.x() * b.y() - b.x() * a.y()
            })
            .sum();
        (twice * 0.5).abs()
    }

    /// 圆的离散点，不重复首点。
    pub fn circle_points(center: Point3, radius: f64) -> Vec<Point3> {
        (0..SEGMENTS_PER_TURN)
            .map(|step| {
                let angle = TAU * step as f64 / SEGMENTS_PER_TURN as f64;
                Point3::new(
                    center.x() + radius * angle.cos(),
                    center.y() + radius * angle.sin(),
                    center.z(),
                )
            })
            .collect()
    }

    /// 圆弧离散点，角度为度数、逆时针；起止角相同视为整圆。
    pub fn arc_points(center: Point3, radius: f64, start_deg: f64, end_deg: f64) -> Vec<Point3> {
        let mut sweep = (end_deg - start_deg).rem_euclid(360.0);
        if sweep <= f64::EPSILON {
            sweep = 360.0;
        }
        let segments = ((sweep / 360.0) * SEGMENTS_PER_TURN as f64).ceil().max(1.0) as usize;
        let start = start_deg.to_radians();
        let step = sweep.to_radians() / segments as f64;
        (0..=segments)
            .map(|index| {
                let angle = start + step * index as f64;
                Point3::new(
                    center.x() + radius * angle.cos(),
                    center.y() + radius * angle.sin(),
                    center.z(),
                )
            })
            .collect()
    }

    /// 几何指纹：与起点、绕向无关，坐标按容差网格取整。
    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct Signature(String);

    impl Signature {
        #[inline]
        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl fmt::Display for Signature {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    type GridPoint = (i64, i64);

    /// 网格坐标超出 i64 可表示范围时返回 `None`，避免不同坐标饱和成同一点。
    fn snap(point: Point3, step: f64) -> Option<GridPoint> {
        let axis = |value: f64| {
            let scaled = (value / step).round();
            (scaled.is_finite() && scaled.abs() < i64::MAX as f64).then_some(scaled as i64)
        };
        Some((axis(point.x())?, axis(point.y())?))
    }

    pub fn canonical_signature(
        vertices: &[Point3],
        closed: bool,
        tolerance: f64,
    ) -> Option<Signature> {
        if vertices.is_empty() {
            return None;
        }
        let step = tolerance.max(MIN_GRID_STEP);
        let mut points: Vec<GridPoint> = vertices
            .iter()
            .map(|v| snap(*v, step))
            .collect::<Option<_>>()?;
        points.dedup();

        let sequence = if closed {
            if points.len() > 1 && points.first() == points.last() {
                points.pop();
            }
            canonical_loop(&points)
        } else {
            let reversed: Vec<GridPoint> = points.iter().rev().copied().collect();
            if reversed < points { reversed } else { points }
        };

        let mut encoded = String::with_capacity(sequence.len() * 16 + 1);
        encoded.push(if closed { 'C' } else { 'O' });
        for (x, y) in &sequence {
            let _ = write!(encoded, ";{x},{y}");
        }
        Some(Signature(encoded))
    }

    /// 以最小网格点为起点，两个绕向都尝试，取字典序最小的序列。
    fn canonical_loop(points: &[GridPoint]) -> Vec<GridPoint> {
        let Some(min) = points.iter().min().copied() else {
            return Vec::new();
        };
        let reversed: Vec<GridPoint> = points.iter().rev().copied().collect();
        let mut best: Option<Vec<GridPoint>> = None;
        for ring in [points, reversed.as_slice()] {
            for start in (0..ring.len()).filter(|&index| ring[index] == min) {
                let candidate: Vec<GridPoint> = ring[start..]
                    .iter()
                    .chain(&ring[..start])
                    .copied()
                    .collect();
                if best.as_ref().is_none_or(|current| candidate < *current) {
                    best = Some(candidate);
                }
            }
        }
        best.unwrap_or_default()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn square(size: f64) -> Vec<Point3> {
            vec![
                Point3::flat(0.0, 0.0),
                Point3::flat(size, 0.0),
                Point3::flat(size, size),
                Point3::flat(0.0, size),
            ]
        }

        #[test]
        fn points_equal_ignores_z() {
            let a = Point3::new(1.0, 1.0, 0.0);
            let b = Point3::new(1.0005, 1.0, 5.0);
            assert!(points_equal(a, b, 0.001));
            assert!(!points_equal(a, Point3::flat(1.01, 1.0), 0.001));
        }

        #[test]
        fn closure_respects_tolerance_on_both_sides() {
            let mut path = square(10.0);
            path.push(Point3::flat(0.004, 0.0));
            assert!(is_closed(&path, false, 0.01));

            let mut gap = square(10.0);
            gap.push(Point3::flat(0.5, 0.0));
            assert!(!is_closed(&gap, false, 0.01));
        }

        #[test]
        fn declared_closure_needs_three_distinct_vertices() {
            let degenerate = vec![
                Point3::flat(0.0, 0.0),
                Point3::flat(5.0, 0.0),
                Point3::flat(5.004, 0.0),
            ];
            assert_eq!(distinct_vertex_count(&degenerate, 0.01), 2);
            assert!(!is_closed(&degenerate, true, 0.01));
            assert!(is_closed(&square(4.0), true, 0.01));
        }

        #[test]
        fn bounding_box_of_empty_set_is_none() {
            assert!(bounding_box(&[]).is_none());
            let bounds = bounding_box(&square(3.0)).expect("bounds");
            assert_eq!(bounds.width(), 3.0);
            assert_eq!(bounds.height(), 3.0);
        }

        #[test]
        fn distance_from_origin_is_zero_when_box_contains_origin() {
            let around = vec![Point3::flat(-1.0, -1.0), Point3::flat(1.0, 1.0)];
            assert_eq!(distance_from_origin(&around), Some(0.0));

            let far = vec![Point3::flat(3.0, 4.0), Point3::flat(10.0, 10.0)];
            let distance = distance_from_origin(&far).expect("distance");
            assert!((distance - 5.0).abs() < 1e-12);

            let left = vec![Point3::flat(-20.0, -1.0), Point3::flat(-10.0, 1.0)];
            assert_eq!(distance_from_origin(&left), Some(10.0));
        }

        #[test]
        fn signature_ignores_start_vertex_and_winding() {
            let original = square(10.0);
            let mut rotated_reversed: Vec<Point3> = original.iter().rev().copied().collect();
            rotated_reversed.rotate_left(2);

            let a = canonical_signature(&original, true, 0.001).expect("signature");
            let b = canonical_signature(&rotated_reversed, true, 0.001).expect("signature");
            assert_eq!(a, b);
        }

        #[test]
        fn signature_rejects_coordinates_beyond_the_grid() {
            let far = vec![Point3::flat(1e300, 0.0), Point3::flat(2e300, 0.0)];
            assert_eq!(canonical_signature(&far, false, 0.001), None);
            let near_limit = vec![Point3::flat(0.0, 0.0), Point3::flat(1e15, 0.0)];
            assert!(canonical_signature(&near_limit, false, 0.001).is_some());
        }

        #[test]
        fn signature_of_open_path_matches_its_reverse() {
            let path = vec![
                Point3::flat(0.0, 0.0),
                Point3::flat(5.0, 2.0),
                Point3::flat(9.0, -1.0),
            ];
            let reversed: Vec<Point3> = path.iter().rev().copied().collect();
            assert_eq!(
                canonical_signature(&path, false, 0.001),
                canonical_signature(&reversed, false, 0.001)
            );
            assert_ne!(
                canonical_signature(&path, false, 0.001),
                canonical_signature(&path, true, 0.001)
            );
        }

        #[test]
        fn signature_grid_boundary() {
            let base = square(10.0);
            let nudged: Vec<Point3> = base
                .iter()
                .map(|p| Point3::flat(p.x() + 0.0001, p.y()))
                .collect();
            let shifted: Vec<Point3> = base
                .iter()
                .map(|p| Point3::flat(p.x() + 0.002, p.y()))
                .collect();
            let reference = canonical_signature(&base, true, 0.001);
            assert_eq!(reference, canonical_signature(&nudged, true, 0.001));
            assert_ne!(reference, canonical_signature(&shifted, true, 0.001));
            // 放宽容差后同样的偏移被视为重复
            assert_eq!(
                canonical_signature(&base, true, 0.01),
                canonical_signature(&shifted, true, 0.01)
            );
        }

        #[test]
        fn closing_vertex_does_not_change_signature() {
            let mut explicit = square(2.0);
            explicit.push(Point3::flat(0.0, 0.0));
            assert_eq!(
                canonical_signature(&explicit, true, 0.001),
                canonical_signature(&square(2.0), true, 0.001)
            );
        }

        #[test]
        fn length_and_area() {
            let path = square(2.0);
            assert!((polyline_length(&path, false) - 6.0).abs() < 1e-12);
            assert!((polyline_length(&path, true) - 8.0).abs() < 1e-12);
            assert!((polygon_area(&path) - 4.0).abs() < 1e-12);
            let reversed: Vec<Point3> = path.iter().rev().copied().collect();
            assert!((polygon_area(&reversed) - 4.0).abs() < 1e-12);
        }

        #[test]
        fn arc_tessellation_covers_the_sweep() {
            let points = arc_points(Point3::flat(0.0, 0.0), 1.0, 350.0, 10.0);
            assert!(points.len() >= 5);
            let first = points.first().expect("first point");
            assert!((first.x() - 350f64.to_radians().cos()).abs() < 1e-9);
            let last = points.last().expect("last point");
            assert!((last.x() - 10f64.to_radians().cos()).abs() < 1e-9);
            assert_eq!(circle_points(Point3::flat(0.0, 0.0), 2.0).len(), SEGMENTS_PER_TURN);
        }

        #[test]
        fn placement_applies_scale_rotation_and_offset() {
            let placement = Placement {
                base_point: Point3::flat(1.0, 0.0),
                insert: Point3::new(10.0, 10.0, 0.0),
                scale_x: 2.0,
                scale_y: 2.0,
                rotation: std::f64::consts::FRAC_PI_2,
            };
            let moved = placement.apply(Point3::flat(2.0, 0.0));
            assert!((moved.x() - 10.0).abs() < 1e-9);
            assert!((moved.y() - 12.0).abs() < 1e-9);
        }
    }
}

pub mod drawing {
    //! 解析器输出的原始图纸模型：尚未展开块参照，也未计算任何派生属性。

    use std::collections::BTreeMap;

    use serde::{Deserialize, Serialize};

    use crate::geometry::Point3;

    pub const COLOR_BY_BLOCK: i16 = 0;
    pub const COLOR_BY_LAYER: i16 = 256;
    pub const DEFAULT_LAYER_COLOR: i16 = 7;
    pub const LINE_WEIGHT_BY_LAYER: i16 = -1;
    pub const LINE_WEIGHT_BY_BLOCK: i16 = -2;
    pub const LINE_WEIGHT_DEFAULT: i16 = -3;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct DrawingHeader {
        /// `$ACADVER`，例如 `AC1015`。
        pub version: Option<String>,
        /// `$INSUNITS` 原始代码。
        pub units: Option<i16>,
        pub file_size_bytes: Option<u64>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LayerRecord {
        pub name: String,
        pub color: i16,
        pub is_off: bool,
        pub is_frozen: bool,
        pub is_locked: bool,
        pub line_weight: i16,
    }

    impl LayerRecord {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                color: DEFAULT_LAYER_COLOR,
                is_off: false,
                is_frozen: false,
                is_locked: false,
                line_weight: LINE_WEIGHT_DEFAULT,
            }
        }

        pub fn off(mut self) -> Self {
            self.is_off = true;
            self
        }

        pub fn frozen(mut self) -> Self {
            self.is_frozen = true;
            self
        }

        pub fn locked(mut self) -> Self {
            self.is_locked = true;
            self
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PolylineVertex {
        pub position: Point3,
        pub bulge: f64,
    }

    impl PolylineVertex {
        #[inline]
        pub fn new(position: Point3) -> Self {
            Self {
                position,
                bulge: 0.0,
            }
        }
    }

    /// 原始几何形状。角度均为度数，与 DXF 保持一致。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Shape {
        Line {
            start: Point3,
            end: Point3,
        },
        Polyline {
            vertices: Vec<PolylineVertex>,
            is_closed: bool,
        },
        Circle {
            center: Point3,
            radius: f64,
        },
        Arc {
            center: Point3,
            radius: f64,
            start_angle_deg: f64,
            end_angle_deg: f64,
        },
        Text {
            insert: Point3,
            height: f64,
            content: String,
        },
        MText {
            insert: Point3,
            height: f64,
            content: String,
        },
        Insert {
            block: String,
            insert: Point3,
            scale_x: f64,
            scale_y: f64,
            rotation_deg: f64,
        },
        Other {
            kind: String,
            anchor: Option<Point3>,
        },
        /// 缺少必需组码的实体，保留下来交给归一化阶段报告。
        Malformed {
            kind: String,
            reason: String,
        },
    }

    impl Shape {
        pub fn type_name(&self) -> &str {
            match self {
                Shape::Line { .. } => "LINE",
                Shape::Polyline { .. } => "LWPOLYLINE",
                Shape::Circle { .. } => "CIRCLE",
                Shape::Arc { .. } => "ARC",
                Shape::Text { .. } => "TEXT",
                Shape::MText { .. } => "MTEXT",
                Shape::Insert { .. } => "INSERT",
                Shape::Other { kind, .. } | Shape::Malformed { kind, .. } => kind,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RawEntity {
        pub handle: Option<String>,
        /// `None` 表示未写组码 8，按 DXF 约定落在图层 0。
        pub layer: Option<String>,
        pub color: i16,
        pub line_weight: i16,
        pub shape: Shape,
    }

    impl RawEntity {
        pub fn new(shape: Shape) -> Self {
            Self {
                handle: None,
                layer: None,
                color: COLOR_BY_LAYER,
                line_weight: LINE_WEIGHT_BY_LAYER,
                shape,
            }
        }

        pub fn on_layer(mut self, layer: impl Into<String>) -> Self {
            self.layer = Some(layer.into());
            self
        }

        pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
            self.handle = Some(handle.into());
            self
        }

        pub fn with_color(mut self, color: i16) -> Self {
            self.color = color;
            self
        }

        pub fn with_line_weight(mut self, line_weight: i16) -> Self {
            self.line_weight = line_weight;
            self
        }

        #[inline]
        pub fn layer_name(&self) -> &str {
            self.layer.as_deref().unwrap_or("0")
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        pub base_point: Point3,
        pub entities: Vec<RawEntity>,
    }

    impl BlockDefinition {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                base_point: Point3::flat(0.0, 0.0),
                entities: Vec::new(),
            }
        }

        pub fn with_entity(mut self, entity: RawEntity) -> Self {
            self.entities.push(entity);
            self
        }
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Drawing {
        header: DrawingHeader,
        layers: Vec<LayerRecord>,
        /// 键为大写块名，DXF 块名不区分大小写。
        blocks: BTreeMap<String, BlockDefinition>,
        entities: Vec<RawEntity>,
        next_handle: u64,
    }

    impl Drawing {
        pub fn new() -> Self {
            let mut drawing = Self::default();
            drawing.ensure_layer("0");
            drawing
        }

        #[inline]
        pub fn header(&self) -> &DrawingHeader {
            &self.header
        }

        #[inline]
        pub fn header_mut(&mut self) -> &mut DrawingHeader {
            &mut self.header
        }

        pub fn set_version(&mut self, version: impl Into<String>) {
            self.header.version = Some(version.into());
        }

        pub fn set_units(&mut self, units: i16) {
            self.header.units = Some(units);
        }

        pub fn set_file_size(&mut self, bytes: u64) {
            self.header.file_size_bytes = Some(bytes);
        }

        pub fn ensure_layer(&mut self, name: impl AsRef<str>) {
            let name = name.as_ref();
            if self.layer(name).is_none() {
                self.layers.push(LayerRecord::new(name));
            }
        }

        /// 写入图层表；同名（不区分大小写）图层会被替换。
        pub fn add_layer(&mut self, record: LayerRecord) {
            match self
                .layers
                .iter_mut()
                .find(|layer| layer.name.eq_ignore_ascii_case(&record.name))
            {
                Some(existing) => *existing = record,
                None => self.layers.push(record),
            }
        }

        pub fn layer(&self, name: &str) -> Option<&LayerRecord> {
            self.layers
                .iter()
                .find(|layer| layer.name.eq_ignore_ascii_case(name))
        }

        pub fn layers(&self) -> impl Iterator<Item = &LayerRecord> {
            self.layers.iter()
        }

        pub fn add_block(&mut self, definition: BlockDefinition) {
            self.blocks
                .insert(definition.name.to_ascii_uppercase(), definition);
        }

        pub fn block(&self, name: &str) -> Option<&BlockDefinition> {
            self.blocks.get(&name.to_ascii_uppercase())
        }

        pub fn blocks(&self) -> impl Iterator<Item = &BlockDefinition> {
            self.blocks.values()
        }

        #[inline]
        pub fn entities(&self) -> &[RawEntity] {
            &self.entities
        }

        /// 追加实体，缺少句柄时按十六进制顺序生成；返回最终句柄。
        pub fn add_entity(&mut self, mut entity: RawEntity) -> String {
            if let Some(layer) = entity.layer.clone() {
                self.ensure_layer(layer);
            }
            let handle = match entity.handle.clone() {
                Some(handle) => handle,
                None => {
                    let handle = self.next_handle();
                    entity.handle = Some(handle.clone());
                    handle
                }
            };
            self.entities.push(entity);
            handle
        }

        pub fn add_line(&mut self, start: Point3, end: Point3, layer: impl Into<String>) -> String {
            self.add_entity(RawEntity::new(Shape::Line { start, end }).on_layer(layer))
        }

        pub fn add_polyline<I>(
            &mut self,
            vertices: I,
            is_closed: bool,
            layer: impl Into<String>,
        ) -> String
        where
            I: IntoIterator<Item = Point3>,
        {
            let vertices = vertices.into_iter().map(PolylineVertex::new).collect();
            self.add_entity(RawEntity::new(Shape::Polyline { vertices, is_closed }).on_layer(layer))
        }

        pub fn add_circle(&mut self, center: Point3, radius: f64, layer: impl Into<String>) -> String {
            self.add_entity(RawEntity::new(Shape::Circle { center, radius }).on_layer(layer))
        }

        pub fn add_arc(
            &mut self,
            center: Point3,
            radius: f64,
            start_angle_deg: f64,
            end_angle_deg: f64,
            layer: impl Into<String>,
        ) -> String {
            self.add_entity(
                RawEntity::new(Shape::Arc {
                    center,
                    radius,
                    start_angle_deg,
                    end_angle_deg,
                })
                .on_layer(layer),
            )
        }

        pub fn add_text(
            &mut self,
            insert: Point3,
            content: impl Into<String>,
            height: f64,
            layer: impl Into<String>,
        ) -> String {
            self.add_entity(
                RawEntity::new(Shape::Text {
                    insert,
                    height,
                    content: content.into(),
                })
                .on_layer(layer),
            )
        }

        pub fn add_mtext(
            &mut self,
            insert: Point3,
            content: impl Into<String>,
            height: f64,
            layer: impl Into<String>,
        ) -> String {
            self.add_entity(
                RawEntity::new(Shape::MText {
                    insert,
                    height,
                    content: content.into(),
                })
                .on_layer(layer),
            )
        }

        pub fn add_insert(
            &mut self,
            block: impl Into<String>,
            insert: Point3,
            layer: impl Into<String>,
        ) -> String {
            self.add_entity(
                RawEntity::new(Shape::Insert {
                    block: block.into(),
                    insert,
                    scale_x: 1.0,
                    scale_y: 1.0,
                    rotation_deg: 0.0,
                })
                .on_layer(layer),
            )
        }

        pub fn add_other(
            &mut self,
            kind: impl Into<String>,
            anchor: Option<Point3>,
            layer: impl Into<String>,
        ) -> String {
            self.add_entity(
                RawEntity::new(Shape::Other {
                    kind: kind.into(),
                    anchor,
                })
                .on_layer(layer),
            )
        }

        fn next_handle(&mut self) -> String {
            self.next_handle += 1;
            format!("{:X}", self.next_handle)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn drawing_tracks_layers_case_insensitively() {
            let mut drawing = Drawing::new();
            drawing.add_line(Point3::flat(0.0, 0.0), Point3::flat(1.0, 0.0), "Cut");
            drawing.add_line(Point3::flat(0.0, 1.0), Point3::flat(1.0, 1.0), "CUT");
            let names: Vec<&str> = drawing.layers().map(|layer| layer.name.as_str()).collect();
            assert_eq!(names, vec!["0", "Cut"]);

            drawing.add_layer(LayerRecord::new("cut").off());
            assert!(drawing.layer("CUT").expect("layer").is_off);
            assert_eq!(drawing.layers().count(), 2);
        }

        #[test]
        fn generated_handles_are_sequential_hex() {
            let mut drawing = Drawing::new();
            let mut handles = Vec::new();
            for index in 0..11 {
                handles.push(drawing.add_circle(Point3::flat(index as f64, 0.0), 1.0, "CUT"));
            }
            assert_eq!(handles.first().map(String::as_str), Some("1"));
            assert_eq!(handles.last().map(String::as_str), Some("B"));

            let kept = drawing.add_entity(
                RawEntity::new(Shape::Other {
                    kind: "POINT".into(),
                    anchor: None,
                })
                .with_handle("2F"),
            );
            assert_eq!(kept, "2F");
            assert_eq!(drawing.entities().len(), 12);
        }

        #[test]
        fn block_lookup_ignores_case() {
            let mut drawing = Drawing::new();
            drawing.add_block(BlockDefinition::new("Logo"));
            assert!(drawing.block("LOGO").is_some());
            assert!(drawing.block("logo").is_some());
        }
    }
}

pub mod document {
    //! 归一化后的文档模型：块参照已展开，派生几何属性已计算完毕，之后只读。

    use std::collections::BTreeMap;
    use std::fmt;

    use serde::{Deserialize, Serialize};

    use crate::drawing::{COLOR_BY_BLOCK, COLOR_BY_LAYER, DEFAULT_LAYER_COLOR, LINE_WEIGHT_BY_LAYER};
    use crate::geometry::{self, Bounds2D, Point3};

    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct EntityId(String);

    impl EntityId {
        #[inline]
        pub fn new(raw: impl Into<String>) -> Self {
            Self(raw.into())
        }

        #[inline]
        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl fmt::Display for EntityId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl From<&str> for EntityId {
        fn from(value: &str) -> Self {
            Self::new(value)
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct BlockRef {
        pub name: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub enum EntityKind {
        Line,
        Polyline,
        Circle,
        Arc,
        Text,
        MText,
        /// 仅在块无法解析（未定义、循环、嵌套过深）时保留。
        Insert(BlockRef),
        Other(String),
    }

    impl EntityKind {
        /// 激光头会沿其行走的矢量路径。
        #[inline]
        pub fn is_path(&self) -> bool {
            matches!(
                self,
                EntityKind::Line | EntityKind::Polyline | EntityKind::Circle | EntityKind::Arc
            )
        }

        #[inline]
        pub fn is_text(&self) -> bool {
            matches!(self, EntityKind::Text | EntityKind::MText)
        }

        pub fn is_other(&self, name: &str) -> bool {
            matches!(self, EntityKind::Other(kind) if kind.eq_ignore_ascii_case(name))
        }

        pub fn type_name(&self) -> &str {
            match self {
                EntityKind::Line => "LINE",
                EntityKind::Polyline => "POLYLINE",
                EntityKind::Circle => "CIRCLE",
                EntityKind::Arc => "ARC",
                EntityKind::Text => "TEXT",
                EntityKind::MText => "MTEXT",
                EntityKind::Insert(_) => "INSERT",
                EntityKind::Other(kind) => kind,
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Units {
        Millimeters,
        Inches,
        Other(i16),
        #[default]
        Unspecified,
    }

    impl Units {
        /// 按 `$INSUNITS` 代码映射：1 = 英寸，4 = 毫米，0/缺省 = 未指定。
        pub fn from_insunits(code: Option<i16>) -> Self {
            match code {
                None | Some(0) => Units::Unspecified,
                Some(1) => Units::Inches,
                Some(4) => Units::Millimeters,
                Some(other) => Units::Other(other),
            }
        }

        pub fn label(&self) -> String {
            match self {
                Units::Millimeters => "millimeters".to_string(),
                Units::Inches => "inches".to_string(),
                Units::Other(code) => format!("units code {code}"),
                Units::Unspecified => "unspecified".to_string(),
            }
        }
    }

    /// 图层查找键：去除首尾空白后大写。
    pub fn layer_key(name: &str) -> String {
        name.trim().to_ascii_uppercase()
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Layer {
        /// 保留原始大小写用于展示。
        pub name: String,
        pub visible: bool,
        pub locked: bool,
        pub color: i16,
    }

    impl Layer {
        #[inline]
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                visible: true,
                locked: false,
                color: DEFAULT_LAYER_COLOR,
            }
        }

        #[inline]
        pub fn key(&self) -> String {
            layer_key(&self.name)
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Entity {
        pub id: EntityId,
        pub kind: EntityKind,
        pub layer: String,
        pub vertices: Vec<Point3>,
        /// 文字插入点或无法离散的对象位置。
        pub anchor: Option<Point3>,
        pub closed: bool,
        pub line_weight: i16,
        pub text_height: Option<f64>,
        /// 文字内容，已解码控制码。
        pub text: Option<String>,
        pub color: i16,
        pub is_block_instance: bool,
        pub nesting_depth: u32,
        /// 展开自哪个顶层块参照。
        pub source_insert: Option<EntityId>,
        pub bounds: Option<Bounds2D>,
        pub z_range: Option<(f64, f64)>,
    }

    impl Entity {
        pub fn new(id: EntityId, kind: EntityKind, layer: impl Into<String>) -> Self {
            Self {
                id,
                kind,
                layer: layer.into(),
                vertices: Vec::new(),
                anchor: None,
                closed: false,
                line_weight: LINE_WEIGHT_BY_LAYER,
                text_height: None,
                text: None,
                color: COLOR_BY_LAYER,
                is_block_instance: false,
                nesting_depth: 0,
                source_insert: None,
                bounds: None,
                z_range: None,
            }
        }

        /// 设置几何并一次性计算闭合、边界框与 Z 范围。
        pub fn with_geometry(
            mut self,
            vertices: Vec<Point3>,
            anchor: Option<Point3>,
            declared_closed: bool,
            tolerance: f64,
        ) -> Self {
            self.closed = geometry::is_closed(&vertices, declared_closed, tolerance);
            self.bounds = match (geometry::bounding_box(&vertices), anchor) {
                (Some(bounds), _) => Some(bounds),
                (None, Some(point)) => geometry::bounding_box(&[point]),
                (None, None) => None,
            };
            self.z_range = geometry::z_range(vertices.iter().chain(anchor.as_ref()));
            self.vertices = vertices;
            self.anchor = anchor;
            self
        }

        #[inline]
        pub fn vertex_count(&self) -> usize {
            self.vertices.len()
        }

        pub fn path_length(&self) -> f64 {
            geometry::polyline_length(&self.vertices, self.closed)
        }

        /// 线宽大于 0 即为显式线宽；负值均为哨兵（随层/随块/默认）。
        #[inline]
        pub fn has_explicit_line_weight(&self) -> bool {
            self.line_weight > 0
        }

        #[inline]
        pub fn has_explicit_color(&self) -> bool {
            self.color != COLOR_BY_LAYER && self.color != COLOR_BY_BLOCK
        }
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Document {
        version: Option<String>,
        units: Units,
        file_size_bytes: Option<u64>,
        entities: Vec<Entity>,
        layers: BTreeMap<String, Layer>,
    }

    impl Document {
        pub fn new(version: Option<String>, units: Units, file_size_bytes: Option<u64>) -> Self {
            Self {
                version,
                units,
                file_size_bytes,
                entities: Vec::new(),
                layers: BTreeMap::new(),
            }
        }

        #[inline]
        pub fn version(&self) -> Option<&str> {
            self.version.as_deref()
        }

        #[inline]
        pub fn units(&self) -> Units {
            self.units
        }

        #[inline]
        pub fn file_size_bytes(&self) -> Option<u64> {
            self.file_size_bytes
        }

        /// 插入图层；键已存在时保留先到者并返回 `false`。
        pub fn insert_layer(&mut self, layer: Layer) -> bool {
            let key = layer.key();
            if self.layers.contains_key(&key) {
                return false;
            }
            self.layers.insert(key, layer);
            true
        }

        pub fn push_entity(&mut self, entity: Entity) {
            self.entities.push(entity);
        }

        #[inline]
        pub fn entities(&self) -> &[Entity] {
            &self.entities
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.entities.is_empty()
        }

        pub fn layers(&self) -> impl Iterator<Item = &Layer> {
            self.layers.values()
        }

        pub fn layer(&self, name: &str) -> Option<&Layer> {
            self.layers.get(&layer_key(name))
        }

        pub fn layer_names(&self) -> Vec<String> {
            self.layers.values().map(|layer| layer.name.clone()).collect()
        }

        pub fn entities_on<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Entity> + 'a {
            let key = layer_key(name);
            self.entities
                .iter()
                .filter(move |entity| layer_key(&entity.layer) == key)
        }

        pub fn total_vertices(&self) -> usize {
            self.entities.iter().map(Entity::vertex_count).sum()
        }

        /// 所有矢量路径的整体范围。
        pub fn path_bounds(&self) -> Option<Bounds2D> {
            let mut bounds = Bounds2D::empty();
            for entity in self.entities.iter().filter(|e| e.kind.is_path()) {
                if let Some(entity_bounds) = &entity.bounds {
                    bounds.include_bounds(entity_bounds);
                }
            }
            if bounds.is_empty() { None } else { Some(bounds) }
        }
    }

}
