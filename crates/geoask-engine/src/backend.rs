//! Boundary traits for the host GIS: the project (layers, selection) and the
//! processing backend (filters, buffers, overlays, reprojection).
//!
//! Dataset handles are opaque to the engine. It only reads the descriptive
//! metadata exposed by [`Dataset`] and passes handles back into
//! [`Processing`] calls.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A failure reported by the host. The message is surfaced verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Host-native field storage types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeFieldType {
    String,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Double,
    Bool,
    Date,
    DateTime,
    Binary,
    Other(String),
}

impl NativeFieldType {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            NativeFieldType::Int32
                | NativeFieldType::UInt32
                | NativeFieldType::Int64
                | NativeFieldType::UInt64
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, NativeFieldType::Double)
    }
}

impl fmt::Display for NativeFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeFieldType::String => f.write_str("string"),
            NativeFieldType::Int32 => f.write_str("int32"),
            NativeFieldType::UInt32 => f.write_str("uint32"),
            NativeFieldType::Int64 => f.write_str("int64"),
            NativeFieldType::UInt64 => f.write_str("uint64"),
            NativeFieldType::Double => f.write_str("double"),
            NativeFieldType::Bool => f.write_str("bool"),
            NativeFieldType::Date => f.write_str("date"),
            NativeFieldType::DateTime => f.write_str("datetime"),
            NativeFieldType::Binary => f.write_str("binary"),
            NativeFieldType::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeField {
    /// Stored field name; filters look fields up by this.
    pub name: String,
    /// Alias shown to users; equals `name` when no alias is set.
    pub display_name: String,
    pub ty: NativeFieldType,
}

impl NativeField {
    pub fn new(name: impl Into<String>, ty: NativeFieldType) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            ty,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }
}

/// An attribute value as stored by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => f.write_str("NULL"),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Integer(n) => write!(f, "{n}"),
            AttributeValue::Real(x) => write!(f, "{x}"),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

/// A category of a categorized renderer. The value may be a single literal,
/// a list of literals sharing one symbol, or absent (the "all other values"
/// bucket).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryValue {
    Null,
    Single(AttributeValue),
    List(Vec<AttributeValue>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererCategory {
    pub value: CategoryValue,
    pub label: String,
}

/// A renderer that classifies features by the value of one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedRenderer {
    pub class_attribute: String,
    pub categories: Vec<RendererCategory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
    Unknown,
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    Meters,
    Kilometers,
    Feet,
    Degrees,
    Other(String),
}

/// A coordinate reference system, identified by its authority id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crs {
    pub auth_id: String,
    pub map_units: DistanceUnit,
}

impl Crs {
    pub fn new(auth_id: impl Into<String>, map_units: DistanceUnit) -> Self {
        Self {
            auth_id: auth_id.into(),
            map_units,
        }
    }

    pub fn is_metric(&self) -> bool {
        self.map_units == DistanceUnit::Meters
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.auth_id)
    }
}

/// A vector dataset handle: a project layer or a derived in-memory result.
pub trait Dataset: Clone + fmt::Debug {
    fn id(&self) -> String;
    fn name(&self) -> String;
    fn short_name(&self) -> Option<String> {
        None
    }
    fn fields(&self) -> Vec<NativeField>;
    fn renderer(&self) -> Option<CategorizedRenderer> {
        None
    }
    fn geometry_kind(&self) -> GeometryKind;
    fn crs(&self) -> Crs;
    fn feature_count(&self) -> usize;
    /// Name of the field that identifies features, if the dataset has one.
    /// Derived in-memory datasets usually do not.
    fn primary_key_field(&self) -> Option<String>;
    /// Value of `field` for every feature, in iteration order. Features
    /// without the field yield `Null`.
    fn attribute_values(&self, field: &str) -> Result<Vec<AttributeValue>, BackendError>;
}

/// The host project owning the layers.
pub trait Project {
    type Dataset: Dataset;

    fn vector_layers(&self) -> Vec<Self::Dataset>;
    fn add_layer(&mut self, data: Self::Dataset) -> Result<(), BackendError>;
    /// Replace `layer`'s selection with the features whose primary key is in `keys`.
    fn select_by_primary_keys(
        &mut self,
        layer: &Self::Dataset,
        keys: &[AttributeValue],
    ) -> Result<(), BackendError>;
    fn selected_feature_count(&self, layer: &Self::Dataset) -> usize;
}

/// Value handed to an equality filter, after type coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", content = "value", rename_all = "snake_case")]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(s) => f.write_str(s),
            FilterValue::Integer(n) => write!(f, "{n}"),
            FilterValue::Float(x) => write!(f, "{x}"),
            FilterValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndCapStyle {
    Round,
    Flat,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStyle {
    Round,
    Miter,
    Bevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferParams {
    /// Distance in the input's CRS units.
    pub distance: f64,
    /// Segments per quarter circle.
    pub segments: u32,
    pub end_cap_style: EndCapStyle,
    pub join_style: JoinStyle,
    pub miter_limit: f64,
    pub dissolve: bool,
}

/// Field handling for overlay operations. Empty field lists keep all fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayParams {
    pub input_fields: Vec<String>,
    pub overlay_fields: Vec<String>,
    pub overlay_fields_prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialPredicate {
    Intersects,
    Contains,
    Disjoint,
    Equals,
    Touches,
    Overlaps,
    Within,
    Crosses,
}

/// Geoprocessing algorithms. Every call returns a new dataset; inputs are
/// never modified.
pub trait Processing<D: Dataset> {
    fn extract_by_attribute(
        &mut self,
        input: &D,
        field: &str,
        value: &FilterValue,
    ) -> Result<D, BackendError>;

    fn buffer(&mut self, input: &D, params: &BufferParams) -> Result<D, BackendError>;

    fn reproject(&mut self, input: &D, target: &Crs) -> Result<D, BackendError>;

    fn union(&mut self, input: &D, overlay: &D, params: &OverlayParams)
        -> Result<D, BackendError>;

    fn difference(&mut self, input: &D, overlay: &D) -> Result<D, BackendError>;

    fn dissolve(&mut self, input: &D, separate_disjoint: bool) -> Result<D, BackendError>;

    fn intersection(
        &mut self,
        input: &D,
        overlay: &D,
        params: &OverlayParams,
    ) -> Result<D, BackendError>;

    fn extract_by_location(
        &mut self,
        input: &D,
        intersect: &D,
        predicate: SpatialPredicate,
    ) -> Result<D, BackendError>;
}
