//! 规则目录：封闭枚举，按编号顺序排列，逐条 `match` 分派到各规则族。

mod bounds;
mod content;
mod layers;
mod structure;
mod topology;

use std::collections::BTreeMap;

use dxflint_config::AnalysisConfig;
use dxflint_core::document::{Document, Entity, layer_key};
use serde::Serialize;

use crate::findings::{Bucket, Finding};

/// 规则只读访问的输入。
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub document: &'a Document,
    pub config: &'a AnalysisConfig,
}

impl<'a> RuleContext<'a> {
    pub fn new(document: &'a Document, config: &'a AnalysisConfig) -> Self {
        Self { document, config }
    }

    /// 按图层键分组的实体，保持文档顺序。
    pub(crate) fn entities_by_layer(&self) -> BTreeMap<String, Vec<&'a Entity>> {
        let mut groups: BTreeMap<String, Vec<&'a Entity>> = BTreeMap::new();
        for entity in self.document.entities() {
            groups.entry(layer_key(&entity.layer)).or_default().push(entity);
        }
        groups
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    OpenPaths = 1,
    Unlayered = 2,
    EditableText = 3,
    UnrecognizedLayer = 4,
    OutOfArea = 5,
    InvisibleLayer = 6,
    DuplicateVectors = 7,
    MixedIntents = 8,
    LineWeight = 9,
    Units = 10,
    Scale = 11,
    DrawingExtents = 12,
    SmallText = 13,
    ComplexCurves = 14,
    ReferenceLayer = 15,
    CloseVectors = 16,
    ColorsAsProcess = 17,
    ExcessivePoints = 18,
    RasterImages = 19,
    VersionSupport = 20,
    RasterRemnants = 21,
    ZCoordinates = 22,
    NestedBlocks = 23,
    FileComplexity = 24,
}

/// `dxflint catalog` 输出的静态条目。
#[derive(Debug, Clone, Serialize)]
pub struct RuleInfo {
    pub id: u8,
    pub name: &'static str,
    pub title: &'static str,
    pub bucket: Bucket,
    pub severity: u8,
    pub description: &'static str,
}

impl Rule {
    pub const ALL: [Rule; 24] = [
        Rule::OpenPaths,
        Rule::Unlayered,
        Rule::EditableText,
        Rule::UnrecognizedLayer,
        Rule::OutOfArea,
        Rule::InvisibleLayer,
        Rule::DuplicateVectors,
        Rule::MixedIntents,
        Rule::LineWeight,
        Rule::Units,
        Rule::Scale,
        Rule::DrawingExtents,
        Rule::SmallText,
        Rule::ComplexCurves,
        Rule::ReferenceLayer,
        Rule::CloseVectors,
        Rule::ColorsAsProcess,
        Rule::ExcessivePoints,
        Rule::RasterImages,
        Rule::VersionSupport,
        Rule::RasterRemnants,
        Rule::ZCoordinates,
        Rule::NestedBlocks,
        Rule::FileComplexity,
    ];

    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Rule> {
        Self::ALL.iter().copied().find(|rule| rule.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            Rule::OpenPaths => "open_paths",
            Rule::Unlayered => "unlayered",
            Rule::EditableText => "editable_text",
            Rule::UnrecognizedLayer => "unrecognized_layer",
            Rule::OutOfArea => "out_of_area",
            Rule::InvisibleLayer => "invisible_layer",
            Rule::DuplicateVectors => "duplicate_vectors",
            Rule::MixedIntents => "mixed_intents",
            Rule::LineWeight => "line_weight",
            Rule::Units => "units",
            Rule::Scale => "scale",
            Rule::DrawingExtents => "drawing_extents",
            Rule::SmallText => "small_text",
            Rule::ComplexCurves => "complex_curves",
            Rule::ReferenceLayer => "reference_layer",
            Rule::CloseVectors => "close_vectors",
            Rule::ColorsAsProcess => "colors_as_process",
            Rule::ExcessivePoints => "excessive_points",
            Rule::RasterImages => "raster_images",
            Rule::VersionSupport => "version_support",
            Rule::RasterRemnants => "raster_remnants",
            Rule::ZCoordinates => "z_coordinates",
            Rule::NestedBlocks => "nested_blocks",
            Rule::FileComplexity => "file_complexity",
        }
    }

    pub fn bucket(self) -> Bucket {
        match self {
            Rule::OpenPaths
            | Rule::Unlayered
            | Rule::EditableText
            | Rule::UnrecognizedLayer
            | Rule::OutOfArea
            | Rule::InvisibleLayer
            | Rule::DuplicateVectors
            | Rule::LineWeight => Bucket::Critical,
            Rule::MixedIntents
            | Rule::Units
            | Rule::Scale
            | Rule::DrawingExtents
            | Rule::SmallText
            | Rule::ComplexCurves
            | Rule::ReferenceLayer
            | Rule::CloseVectors
            | Rule::ColorsAsProcess
            | Rule::ExcessivePoints => Bucket::Warning,
            Rule::RasterImages
            | Rule::VersionSupport
            | Rule::RasterRemnants
            | Rule::ZCoordinates
            | Rule::NestedBlocks
            | Rule::FileComplexity => Bucket::ExportError,
        }
    }

    /// 默认严重度；单位与尺寸规则会按具体情况调整。
    pub fn severity(self) -> u8 {
        match self {
            Rule::OpenPaths => 10,
            Rule::Unlayered => 9,
            Rule::EditableText | Rule::OutOfArea | Rule::InvisibleLayer => 8,
            Rule::UnrecognizedLayer | Rule::DuplicateVectors | Rule::RasterImages => 7,
            Rule::LineWeight | Rule::CloseVectors | Rule::VersionSupport | Rule::FileComplexity => 6,
            Rule::MixedIntents | Rule::Units | Rule::DrawingExtents | Rule::ZCoordinates => 5,
            Rule::Scale
            | Rule::SmallText
            | Rule::ExcessivePoints
            | Rule::RasterRemnants
            | Rule::NestedBlocks => 4,
            Rule::ComplexCurves | Rule::ReferenceLayer | Rule::ColorsAsProcess => 3,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Rule::OpenPaths => "Open vectors",
            Rule::Unlayered => "Vectors without an assigned layer",
            Rule::EditableText => "Editable text",
            Rule::UnrecognizedLayer => "Unrecognized layer name",
            Rule::OutOfArea => "Objects outside the work area",
            Rule::InvisibleLayer => "Objects on invisible layers",
            Rule::DuplicateVectors => "Duplicated vectors",
            Rule::MixedIntents => "Cut and engrave mixed on one layer",
            Rule::LineWeight => "Vectors with line weight",
            Rule::Units => "Drawing units are not millimeters",
            Rule::Scale => "Element scale out of range",
            Rule::DrawingExtents => "Drawing extents out of range",
            Rule::SmallText => "Text too small to engrave",
            Rule::ComplexCurves => "Complex curves",
            Rule::ReferenceLayer => "Vectors on reference layers",
            Rule::CloseVectors => "Vectors too close together",
            Rule::ColorsAsProcess => "Colors used to encode process",
            Rule::ExcessivePoints => "Polylines with redundant points",
            Rule::RasterImages => "Embedded raster images",
            Rule::VersionSupport => "Unsupported DXF version",
            Rule::RasterRemnants => "Raster or OLE remnants",
            Rule::ZCoordinates => "Non-planar Z coordinates",
            Rule::NestedBlocks => "Grouped or nested blocks",
            Rule::FileComplexity => "File too heavy",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Rule::OpenPaths => "Polylines on process layers must form closed outlines.",
            Rule::Unlayered => "Entities left on the default layer '0' have no process assigned.",
            Rule::EditableText => "Text and multiline text must be converted to outlines before cutting.",
            Rule::UnrecognizedLayer => "Layers holding geometry must use a recognized process name.",
            Rule::OutOfArea => "Geometry lies farther from the origin than the work area allows.",
            Rule::InvisibleLayer => "Hidden or frozen layers still hold geometry.",
            Rule::DuplicateVectors => "Identical overlapping vectors make the laser cut the same path twice.",
            Rule::MixedIntents => "A layer mixes closed cut outlines with engraving content.",
            Rule::LineWeight => "Entities carry an explicit line weight.",
            Rule::Units => "The drawing declares units other than millimeters.",
            Rule::Scale => "A vector is smaller or larger than the configured size limits.",
            Rule::DrawingExtents => "The overall drawing is smaller or larger than the configured size limits.",
            Rule::SmallText => "Text height is below the minimum engravable height.",
            Rule::ComplexCurves => "Splines and ellipses need conversion to polylines or arcs.",
            Rule::ReferenceLayer => "Geometry sits on layers meant for reference only.",
            Rule::CloseVectors => "Vertices of different vectors are closer than the minimum distance.",
            Rule::ColorsAsProcess => "Per-entity colors are used instead of layers to encode the process.",
            Rule::ExcessivePoints => "Polylines have more vertices than needed.",
            Rule::RasterImages => "Raster images cannot be cut and are lost on export.",
            Rule::VersionSupport => "The DXF version is not in the supported set.",
            Rule::RasterRemnants => "Wipeouts and OLE frames remain in the drawing.",
            Rule::ZCoordinates => "Geometry leaves the Z = 0 plane.",
            Rule::NestedBlocks => "Block references were flattened into their member geometry.",
            Rule::FileComplexity => "The file exceeds entity, vertex or size limits.",
        }
    }

    pub fn cause(self) -> &'static str {
        match self {
            Rule::OpenPaths => "Join or close-path was not applied in the design software.",
            Rule::Unlayered => "Layer assignment was forgotten or elements stayed on the default layer.",
            Rule::EditableText => "Fonts were not converted to vector outlines.",
            Rule::UnrecognizedLayer => "Custom layer names are used.",
            Rule::OutOfArea => "External objects were pasted in or the scale is wrong.",
            Rule::InvisibleLayer => "A layer was hidden or frozen accidentally.",
            Rule::DuplicateVectors => "Objects were copied without removing the original.",
            Rule::MixedIntents => "Different processes were drawn on the same layer.",
            Rule::LineWeight => "The file was exported with line weights.",
            Rule::Units => "The document was set up in another unit system.",
            Rule::Scale => "Wrong scale or unit settings.",
            Rule::DrawingExtents => "Wrong scale or unit settings.",
            Rule::SmallText => "Text was sized for print rather than for engraving.",
            Rule::ComplexCurves => "Curves were exported in their native spline form.",
            Rule::ReferenceLayer => "Construction or guide geometry was left in the file.",
            Rule::CloseVectors => "Vectors were placed too tightly or nearly overlap.",
            Rule::ColorsAsProcess => "Colors were assigned per object instead of by layer.",
            Rule::ExcessivePoints => "Many subdivisions produce noise in the laser motion.",
            Rule::RasterImages => "A bitmap was placed or traced without vectorizing it.",
            Rule::VersionSupport => "The file was saved with a newer or older DXF format.",
            Rule::RasterRemnants => "Masking or embedded objects were left in the drawing.",
            Rule::ZCoordinates => "The design was made in 3D or exported incorrectly.",
            Rule::NestedBlocks => "Geometry was grouped into blocks in the design software.",
            Rule::FileComplexity => "Too many nodes from poor vectorization.",
        }
    }

    pub fn suggestion(self) -> &'static str {
        match self {
            Rule::OpenPaths => "Close every polyline on cut layers.",
            Rule::Unlayered => "Assign every element to a process layer (CUT, ENGRAVE, etc.).",
            Rule::EditableText => "Convert all text to curves or outlines before exporting.",
            Rule::UnrecognizedLayer => "Use the standard layer names: CUT, ENGRAVE, MARK, ETCH, SCORE.",
            Rule::OutOfArea => "Move all objects close to the origin (0,0).",
            Rule::InvisibleLayer => "Turn on and thaw every layer that must be processed.",
            Rule::DuplicateVectors => "Delete the duplicated vectors.",
            Rule::MixedIntents => "Move cut outlines and engraving content to separate layers.",
            Rule::LineWeight => "Export with line weight 0 or ByLayer.",
            Rule::Units => "Set the drawing units to millimeters and check the scale.",
            Rule::Scale => "Check that every element is within the configured size limits.",
            Rule::DrawingExtents => "Check the overall drawing size and units.",
            Rule::SmallText => "Increase the text height or convert it to thicker outlines.",
            Rule::ComplexCurves => "Convert splines and ellipses to polylines or arcs.",
            Rule::ReferenceLayer => "Remove reference layers before exporting.",
            Rule::CloseVectors => "Increase the distance between vectors or merge them.",
            Rule::ColorsAsProcess => "Set entity colors to ByLayer and separate processes by layer.",
            Rule::ExcessivePoints => "Simplify the curve to reduce its points.",
            Rule::RasterImages => "Remove images or vectorize them before exporting.",
            Rule::VersionSupport => "Export as DXF R2010 or R2013.",
            Rule::RasterRemnants => "Delete wipeouts and OLE objects.",
            Rule::ZCoordinates => "Flatten all entities to the Z = 0 plane.",
            Rule::NestedBlocks => "Explode blocks before exporting.",
            Rule::FileComplexity => "Simplify curves and remove unnecessary nodes.",
        }
    }

    /// 报告中的整改建议，每条规则一句。
    pub fn recommendation(self) -> &'static str {
        match self {
            Rule::OpenPaths => "Close all polylines on cut layers.",
            Rule::Unlayered => "Move every element off layer '0' onto a process layer.",
            Rule::EditableText => "Convert all text to curves or outlines.",
            Rule::UnrecognizedLayer => "Use standard layer names: CUT, ENGRAVE, MARK.",
            Rule::OutOfArea => "Move the geometry next to the origin.",
            Rule::InvisibleLayer => "Make every layer with geometry visible.",
            Rule::DuplicateVectors => "Remove duplicated vectors.",
            Rule::MixedIntents => "Keep cutting and engraving on separate layers.",
            Rule::LineWeight => "Reset line weights to 0 or ByLayer.",
            Rule::Units => "Switch the drawing units to millimeters.",
            Rule::Scale => "Review the scale of undersized or oversized elements.",
            Rule::DrawingExtents => "Review the overall drawing size.",
            Rule::SmallText => "Enlarge text below the minimum height.",
            Rule::ComplexCurves => "Convert splines and ellipses to polylines or arcs.",
            Rule::ReferenceLayer => "Delete reference and construction layers.",
            Rule::CloseVectors => "Separate vectors that almost touch.",
            Rule::ColorsAsProcess => "Use layers, not colors, to assign processes.",
            Rule::ExcessivePoints => "Simplify polylines with redundant points.",
            Rule::RasterImages => "Remove or vectorize raster images.",
            Rule::VersionSupport => "Export as DXF R2010 or R2013.",
            Rule::RasterRemnants => "Delete wipeouts and OLE objects.",
            Rule::ZCoordinates => "Flatten the drawing to Z = 0.",
            Rule::NestedBlocks => "Explode blocks before exporting.",
            Rule::FileComplexity => "Reduce the number of entities and nodes.",
        }
    }

    pub fn info(self) -> RuleInfo {
        RuleInfo {
            id: self.id(),
            name: self.name(),
            title: self.title(),
            bucket: self.bucket(),
            severity: self.severity(),
            description: self.description(),
        }
    }

    pub fn catalog() -> Vec<RuleInfo> {
        Self::ALL.iter().map(|rule| rule.info()).collect()
    }

    pub fn evaluate(self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        match self {
            Rule::OpenPaths => topology::open_paths(ctx),
            Rule::Unlayered => layers::unlayered(ctx),
            Rule::EditableText => content::editable_text(ctx),
            Rule::UnrecognizedLayer => layers::unrecognized_layer(ctx),
            Rule::OutOfArea => bounds::out_of_area(ctx),
            Rule::InvisibleLayer => layers::invisible_layer(ctx),
            Rule::DuplicateVectors => topology::duplicate_vectors(ctx),
            Rule::MixedIntents => layers::mixed_intents(ctx),
            Rule::LineWeight => content::line_weight(ctx),
            Rule::Units => content::units(ctx),
            Rule::Scale => bounds::scale(ctx),
            Rule::DrawingExtents => bounds::drawing_extents(ctx),
            Rule::SmallText => content::small_text(ctx),
            Rule::ComplexCurves => content::complex_curves(ctx),
            Rule::ReferenceLayer => layers::reference_layer(ctx),
            Rule::CloseVectors => topology::close_vectors(ctx),
            Rule::ColorsAsProcess => layers::colors_as_process(ctx),
            Rule::ExcessivePoints => topology::excessive_points(ctx),
            Rule::RasterImages => content::raster_images(ctx),
            Rule::VersionSupport => structure::version_support(ctx),
            Rule::RasterRemnants => content::raster_remnants(ctx),
            Rule::ZCoordinates => bounds::z_coordinates(ctx),
            Rule::NestedBlocks => structure::nested_blocks(ctx),
            Rule::FileComplexity => structure::file_complexity(ctx),
        }
    }

    /// 带本规则标题、原因与建议的发现。
    pub(crate) fn finding(self, severity: u8, description: impl Into<String>) -> Finding {
        Finding::new(self.id(), self.bucket(), self.title(), severity, description)
            .cause(self.cause())
            .suggestion(self.suggestion())
    }
}
