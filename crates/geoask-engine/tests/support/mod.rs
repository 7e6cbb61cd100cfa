//! In-memory project and processing backend for engine tests.
//!
//! Geometries are axis-aligned envelopes; lines are envelopes with zero
//! height. Degrees convert to meters at a flat 100 km per degree. Every
//! processing call is recorded so tests can assert on the call sequence.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use geoask_engine::backend::{
    AttributeValue, BackendError, BufferParams, CategorizedRenderer, CategoryValue, Crs, Dataset,
    DistanceUnit, FilterValue, GeometryKind, NativeField, NativeFieldType, OverlayParams,
    Processing, Project, RendererCategory, SpatialPredicate,
};

pub const METERS_PER_DEGREE: f64 = 100_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    fn clip(&self, other: &Envelope) -> Envelope {
        Envelope::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        )
    }

    fn cover(&self, other: &Envelope) -> Envelope {
        Envelope::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    fn grow(&self, d: f64) -> Envelope {
        Envelope::new(self.min_x - d, self.min_y - d, self.max_x + d, self.max_y + d)
    }

    fn scale(&self, k: f64) -> Envelope {
        Envelope::new(self.min_x * k, self.min_y * k, self.max_x * k, self.max_y * k)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub attributes: HashMap<String, AttributeValue>,
    pub envelope: Envelope,
}

impl Feature {
    /// A feature with its `fid` attribute set.
    pub fn new(fid: i64, envelope: Envelope) -> Self {
        Self {
            attributes: HashMap::from([("fid".to_string(), AttributeValue::Integer(fid))]),
            envelope,
        }
    }

    pub fn value(&self, field: &str) -> AttributeValue {
        self.attributes
            .get(field)
            .cloned()
            .unwrap_or(AttributeValue::Null)
    }

    pub fn with(mut self, field: &str, value: AttributeValue) -> Self {
        self.attributes.insert(field.to_string(), value);
        self
    }
}

#[derive(Debug, Clone)]
pub struct FakeDataset {
    pub id: String,
    pub name: String,
    pub short_name: Option<String>,
    /// `None` for derived in-memory outputs.
    pub key_field: Option<String>,
    pub fields: Vec<NativeField>,
    pub renderer: Option<CategorizedRenderer>,
    pub kind: GeometryKind,
    pub crs: Crs,
    pub features: Arc<Vec<Feature>>,
}

impl FakeDataset {
    pub fn new(id: &str, name: &str, kind: GeometryKind, crs: Crs) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            short_name: None,
            key_field: Some("fid".to_string()),
            fields: vec![NativeField::new("fid", NativeFieldType::Int64)],
            renderer: None,
            kind,
            crs,
            features: Arc::new(Vec::new()),
        }
    }

    pub fn field(mut self, field: NativeField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn key_field(mut self, field: &str) -> Self {
        self.key_field = Some(field.to_string());
        self
    }

    pub fn without_key(mut self) -> Self {
        self.key_field = None;
        self
    }

    pub fn short_name(mut self, short_name: &str) -> Self {
        self.short_name = Some(short_name.to_string());
        self
    }

    pub fn renderer(mut self, renderer: CategorizedRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn features(mut self, features: Vec<Feature>) -> Self {
        self.features = Arc::new(features);
        self
    }

    pub fn envelopes(&self) -> Vec<Envelope> {
        self.features.iter().map(|f| f.envelope).collect()
    }

    fn derive(&self, id: String, kind: GeometryKind, features: Vec<Feature>) -> Self {
        Self {
            id,
            name: "output".to_string(),
            short_name: None,
            key_field: None,
            fields: self.fields.clone(),
            renderer: None,
            kind,
            crs: self.crs.clone(),
            features: Arc::new(features),
        }
    }
}

impl Dataset for FakeDataset {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn short_name(&self) -> Option<String> {
        self.short_name.clone()
    }

    fn fields(&self) -> Vec<NativeField> {
        self.fields.clone()
    }

    fn renderer(&self) -> Option<CategorizedRenderer> {
        self.renderer.clone()
    }

    fn geometry_kind(&self) -> GeometryKind {
        self.kind
    }

    fn crs(&self) -> Crs {
        self.crs.clone()
    }

    fn feature_count(&self) -> usize {
        self.features.len()
    }

    fn primary_key_field(&self) -> Option<String> {
        self.key_field.clone()
    }

    fn attribute_values(&self, field: &str) -> Result<Vec<AttributeValue>, BackendError> {
        if !self.fields.iter().any(|f| f.name == field) {
            return Err(BackendError::new(format!("{}: no field {field}", self.id)));
        }
        Ok(self.features.iter().map(|f| f.value(field)).collect())
    }
}

#[derive(Debug, Default)]
pub struct FakeProject {
    pub layers: Vec<FakeDataset>,
    pub added: Vec<FakeDataset>,
    selections: HashMap<String, Vec<AttributeValue>>,
}

impl FakeProject {
    pub fn new(layers: Vec<FakeDataset>) -> Self {
        Self {
            layers,
            ..Self::default()
        }
    }

    pub fn selected_keys(&self, layer_id: &str) -> Vec<AttributeValue> {
        self.selections.get(layer_id).cloned().unwrap_or_default()
    }
}

impl Project for FakeProject {
    type Dataset = FakeDataset;

    fn vector_layers(&self) -> Vec<FakeDataset> {
        self.layers.clone()
    }

    fn add_layer(&mut self, data: FakeDataset) -> Result<(), BackendError> {
        self.added.push(data.clone());
        self.layers.push(data);
        Ok(())
    }

    fn select_by_primary_keys(
        &mut self,
        layer: &FakeDataset,
        keys: &[AttributeValue],
    ) -> Result<(), BackendError> {
        let Some(target) = self.layers.iter().find(|l| l.id == layer.id) else {
            return Err(BackendError::new(format!("layer {} is not in the project", layer.id)));
        };
        let Some(key_field) = &target.key_field else {
            return Err(BackendError::new(format!("layer {} has no primary key", layer.id)));
        };
        let selected = target
            .features
            .iter()
            .map(|f| f.value(key_field))
            .filter(|k| keys.contains(k))
            .collect();
        self.selections.insert(layer.id.clone(), selected);
        Ok(())
    }

    fn selected_feature_count(&self, layer: &FakeDataset) -> usize {
        self.selections.get(&layer.id).map_or(0, Vec::len)
    }
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    /// `"<operation> <detail>"` per call, in call order.
    pub calls: Vec<String>,
    pub buffers: Vec<BufferParams>,
    pub filters: Vec<(String, FilterValue)>,
    /// Operation that fails instead of running.
    pub fail_on: Option<&'static str>,
    /// Overwrite `fid` on every output, like hosts that number output
    /// features afresh.
    pub renumber_outputs: bool,
    next_id: usize,
    next_fid: i64,
}

impl FakeBackend {
    pub fn failing_on(operation: &'static str) -> Self {
        Self {
            fail_on: Some(operation),
            ..Self::default()
        }
    }

    pub fn renumbering() -> Self {
        Self {
            renumber_outputs: true,
            ..Self::default()
        }
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls
            .iter()
            .filter(|c| c.split(' ').next() == Some(operation))
            .count()
    }

    pub fn operations(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| c.split(' ').next())
            .collect()
    }

    fn begin(&mut self, operation: &'static str, detail: String) -> Result<String, BackendError> {
        self.calls.push(format!("{operation} {detail}").trim_end().to_string());
        if self.fail_on == Some(operation) {
            return Err(BackendError::new(format!("{operation}: backend exploded")));
        }
        self.next_id += 1;
        Ok(format!("memory:{}", self.next_id))
    }
}

impl FakeBackend {
    fn output(&mut self, mut dataset: FakeDataset) -> FakeDataset {
        if self.renumber_outputs {
            let features = dataset
                .features
                .iter()
                .map(|f| {
                    self.next_fid += 1;
                    let mut f = f.clone();
                    f.attributes
                        .insert("fid".to_string(), AttributeValue::Integer(9000 + self.next_fid));
                    f
                })
                .collect();
            dataset.features = Arc::new(features);
        }
        dataset
    }
}

fn matches_filter(value: Option<&AttributeValue>, wanted: &FilterValue) -> bool {
    match (value, wanted) {
        (Some(AttributeValue::Text(a)), FilterValue::Text(b)) => a == b,
        (Some(AttributeValue::Integer(a)), FilterValue::Integer(b)) => a == b,
        (Some(AttributeValue::Integer(a)), FilterValue::Float(b)) => (*a as f64) == *b,
        (Some(AttributeValue::Real(a)), FilterValue::Float(b)) => a == b,
        (Some(AttributeValue::Real(a)), FilterValue::Integer(b)) => *a == (*b as f64),
        (Some(AttributeValue::Bool(a)), FilterValue::Bool(b)) => a == b,
        _ => false,
    }
}

fn unit_scale(from: &DistanceUnit, to: &DistanceUnit) -> f64 {
    match (from, to) {
        (DistanceUnit::Degrees, DistanceUnit::Meters) => METERS_PER_DEGREE,
        (DistanceUnit::Meters, DistanceUnit::Degrees) => 1.0 / METERS_PER_DEGREE,
        _ => 1.0,
    }
}

impl Processing<FakeDataset> for FakeBackend {
    fn extract_by_attribute(
        &mut self,
        input: &FakeDataset,
        field: &str,
        value: &FilterValue,
    ) -> Result<FakeDataset, BackendError> {
        let id = self.begin("extract_by_attribute", format!("{field}={value}"))?;
        self.filters.push((field.to_string(), value.clone()));
        let features = input
            .features
            .iter()
            .filter(|f| matches_filter(f.attributes.get(field), value))
            .cloned()
            .collect();
        Ok(self.output(input.derive(id, input.kind, features)))
    }

    fn buffer(
        &mut self,
        input: &FakeDataset,
        params: &BufferParams,
    ) -> Result<FakeDataset, BackendError> {
        let id = self.begin("buffer", format!("{}", params.distance))?;
        self.buffers.push(params.clone());
        let features = input
            .features
            .iter()
            .map(|f| Feature {
                envelope: f.envelope.grow(params.distance),
                ..f.clone()
            })
            .collect();
        Ok(self.output(input.derive(id, GeometryKind::Polygon, features)))
    }

    fn reproject(&mut self, input: &FakeDataset, target: &Crs) -> Result<FakeDataset, BackendError> {
        let id = self.begin("reproject", target.auth_id.clone())?;
        let k = unit_scale(&input.crs.map_units, &target.map_units);
        let features = input
            .features
            .iter()
            .map(|f| Feature {
                envelope: f.envelope.scale(k),
                ..f.clone()
            })
            .collect();
        let mut out = input.derive(id, input.kind, features);
        out.crs = target.clone();
        Ok(self.output(out))
    }

    fn union(
        &mut self,
        input: &FakeDataset,
        overlay: &FakeDataset,
        _params: &OverlayParams,
    ) -> Result<FakeDataset, BackendError> {
        let id = self.begin("union", String::new())?;
        let features = input
            .features
            .iter()
            .chain(overlay.features.iter())
            .cloned()
            .collect();
        Ok(self.output(input.derive(id, input.kind, features)))
    }

    fn difference(
        &mut self,
        input: &FakeDataset,
        overlay: &FakeDataset,
    ) -> Result<FakeDataset, BackendError> {
        let id = self.begin("difference", String::new())?;
        let features = input
            .features
            .iter()
            .filter(|f| !overlay.features.iter().any(|o| o.envelope.intersects(&f.envelope)))
            .cloned()
            .collect();
        Ok(self.output(input.derive(id, input.kind, features)))
    }

    fn dissolve(
        &mut self,
        input: &FakeDataset,
        separate_disjoint: bool,
    ) -> Result<FakeDataset, BackendError> {
        let id = self.begin("dissolve", format!("separate_disjoint={separate_disjoint}"))?;
        let mut parts: Vec<Envelope> = Vec::new();
        for f in input.features.iter() {
            let mut merged = f.envelope;
            if separate_disjoint {
                // Absorb every part touching the growing envelope.
                loop {
                    let before = parts.len();
                    parts.retain(|p| {
                        if p.intersects(&merged) {
                            merged = merged.cover(p);
                            false
                        } else {
                            true
                        }
                    });
                    if parts.len() == before {
                        break;
                    }
                }
            } else if let Some(p) = parts.pop() {
                merged = merged.cover(&p);
            }
            parts.push(merged);
        }
        let features = parts
            .into_iter()
            .enumerate()
            .map(|(i, envelope)| Feature::new(i as i64 + 1, envelope))
            .collect();
        Ok(self.output(input.derive(id, input.kind, features)))
    }

    fn intersection(
        &mut self,
        input: &FakeDataset,
        overlay: &FakeDataset,
        _params: &OverlayParams,
    ) -> Result<FakeDataset, BackendError> {
        let id = self.begin("intersection", String::new())?;
        let mut features = Vec::new();
        for f in input.features.iter() {
            for o in overlay.features.iter() {
                if f.envelope.intersects(&o.envelope) {
                    features.push(Feature {
                        envelope: f.envelope.clip(&o.envelope),
                        ..f.clone()
                    });
                }
            }
        }
        Ok(self.output(input.derive(id, input.kind, features)))
    }

    fn extract_by_location(
        &mut self,
        input: &FakeDataset,
        intersect: &FakeDataset,
        predicate: SpatialPredicate,
    ) -> Result<FakeDataset, BackendError> {
        let id = self.begin("extract_by_location", format!("{predicate:?}"))?;
        if predicate != SpatialPredicate::Intersects {
            return Err(BackendError::new(format!("unsupported predicate {predicate:?}")));
        }
        let features = input
            .features
            .iter()
            .filter(|f| intersect.features.iter().any(|o| o.envelope.intersects(&f.envelope)))
            .cloned()
            .collect();
        Ok(self.output(input.derive(id, input.kind, features)))
    }
}

pub fn metric() -> Crs {
    Crs::new("EPSG:3006", DistanceUnit::Meters)
}

pub fn geographic() -> Crs {
    Crs::new("EPSG:4326", DistanceUnit::Degrees)
}

fn text(s: &str) -> AttributeValue {
    AttributeValue::Text(s.to_string())
}

fn category(value: &str, label: &str) -> RendererCategory {
    RendererCategory {
        value: CategoryValue::Single(text(value)),
        label: label.to_string(),
    }
}

/// Buildings, roads and parks around a highway along y = -100.
///
/// Buildings 1 and 4 lie within 500 m of the highway. Building 3 straddles
/// the small road along y = 700. Parks are stored in degrees.
pub fn town() -> FakeProject {
    let buildings = FakeDataset::new("buildings_fasdff3234", "Buildings", GeometryKind::Polygon, metric())
        .field(NativeField::new("type", NativeFieldType::String).with_display_name("Type"))
        .field(
            NativeField::new("year_of_construction", NativeFieldType::Int32)
                .with_display_name("Year of construction"),
        )
        .field(NativeField::new("heritage", NativeFieldType::Int32))
        .renderer(CategorizedRenderer {
            class_attribute: "type".to_string(),
            categories: vec![
                category("res", "residential"),
                category("ind", "industrial"),
                category("com", "commercial"),
                RendererCategory {
                    value: CategoryValue::Null,
                    label: "other".to_string(),
                },
            ],
        })
        .features(vec![
            Feature::new(1, Envelope::new(0.0, 0.0, 10.0, 10.0))
                .with("type", text("res"))
                .with("year_of_construction", AttributeValue::Integer(1950))
                .with("heritage", AttributeValue::Integer(1)),
            Feature::new(2, Envelope::new(5000.0, 0.0, 5010.0, 10.0))
                .with("type", text("ind"))
                .with("year_of_construction", AttributeValue::Integer(1990))
                .with("heritage", AttributeValue::Integer(0)),
            Feature::new(3, Envelope::new(0.0, 695.0, 10.0, 705.0))
                .with("type", text("com"))
                .with("year_of_construction", AttributeValue::Integer(2001))
                .with("heritage", AttributeValue::Integer(0)),
            Feature::new(4, Envelope::new(100.0, 390.0, 110.0, 395.0))
                .with("type", text("res"))
                .with("year_of_construction", AttributeValue::Integer(1950))
                .with("heritage", AttributeValue::Integer(0)),
        ]);

    let roads = FakeDataset::new("roads_fa4123", "Roads", GeometryKind::Line, metric())
        .field(NativeField::new("type", NativeFieldType::String).with_display_name("Type"))
        .field(NativeField::new("width", NativeFieldType::Double).with_display_name("Width"))
        .features(vec![
            Feature::new(1, Envelope::new(-1000.0, -100.0, 1000.0, -100.0))
                .with("type", text("highway"))
                .with("width", AttributeValue::Real(20.0)),
            Feature::new(2, Envelope::new(-1000.0, 700.0, 1000.0, 700.0))
                .with("type", text("small"))
                .with("width", AttributeValue::Real(4.5)),
        ]);

    let parks = FakeDataset::new("parks_7f1e", "Parks", GeometryKind::Polygon, geographic())
        .short_name("green")
        .field(NativeField::new("name", NativeFieldType::String))
        .features(vec![Feature::new(1, Envelope::new(0.0, 0.0, 0.01, 0.01))
            .with("name", text("Central"))]);

    FakeProject::new(vec![buildings, roads, parks])
}

/// Route `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
