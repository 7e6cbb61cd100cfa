//! Interpreter: action tree → processing calls → result sentence.
//!
//! Layer nodes are evaluated depth-first into a [`VectorData`] pair:
//! - `original`: the project layer a `get_layer` resolved to,
//! - `data`: the (possibly derived) dataset produced by the transforms above it.
//!
//! `original` is threaded through every transform unchanged (for binary
//! operations: from `source_a`), so `select` can mark features on the real
//! project layer even when `data` is a derived in-memory dataset.
//!
//! Repeated subtrees are evaluated once per occurrence; there is no memoization.

use std::fmt;

use geoask_dsl::{Action, Layer, Value};
use thiserror::Error;

use crate::backend::{
    AttributeValue, BackendError, BufferParams, Crs, Dataset, DistanceUnit, EndCapStyle,
    FilterValue, GeometryKind, JoinStyle, NativeField, OverlayParams, Processing, Project,
    SpatialPredicate,
};
use crate::config::GeoaskConfig;

pub const ADDED_TO_MAP_MESSAGE: &str = "Added data as a new layer to the map";

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Unknown layer: {layer}")]
    NotFound { layer: String },
    #[error("Unknown field: {field}")]
    UnknownField { field: String },
    #[error("Layer {layer} has no primary key; cannot select features on it")]
    NoPrimaryKey { layer: String },
    #[error("{operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BackendError,
    },
}

/// A resolved layer node.
#[derive(Debug, Clone)]
pub struct VectorData<D> {
    /// The project layer this data is derived from. Selection targets it.
    pub original: D,
    /// The data itself: the original layer or a derived dataset.
    pub data: D,
}

pub struct Executor<'a, P: Project, B> {
    project: &'a mut P,
    backend: &'a mut B,
    metric_crs: Crs,
    buffer_segments: u32,
}

impl<'a, P, B> Executor<'a, P, B>
where
    P: Project,
    B: Processing<P::Dataset>,
{
    pub fn new(project: &'a mut P, backend: &'a mut B, config: &GeoaskConfig) -> Self {
        Self {
            project,
            backend,
            metric_crs: Crs::new(config.metric_crs.clone(), DistanceUnit::Meters),
            buffer_segments: config.buffer_segments,
        }
    }

    /// Execute a single action and describe the outcome in one sentence.
    pub fn execute(&mut self, action: &Action) -> Result<String, ExecError> {
        let result = match action {
            Action::Select { layer } => self.execute_select(layer)?,
            Action::AddToMap { layer } => self.execute_add_to_map(layer)?,
            Action::Count { layer } => self.execute_count(layer)?,
        };
        tracing::info!(action = action.constructor_name(), result = %result, "executed action");
        Ok(result)
    }

    pub fn evaluate(&mut self, layer: &Layer) -> Result<VectorData<P::Dataset>, ExecError> {
        match layer {
            Layer::Source { id } => self.source_layer(id),
            Layer::Filtered {
                source,
                field,
                value,
            } => self.filtered_layer(source, field, value),
            Layer::Buffered { source, distance } => self.buffered_layer(source, *distance),
            Layer::Union { source_a, source_b } => self.union_layer(source_a, source_b),
            Layer::Intersection { source_a, source_b } => {
                self.intersection_layer(source_a, source_b)
            }
            Layer::Difference { source_a, source_b } => {
                self.difference_layer(source_a, source_b)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Layers
    // ------------------------------------------------------------------------

    fn source_layer(&mut self, id: &str) -> Result<VectorData<P::Dataset>, ExecError> {
        let wanted = id.to_lowercase();
        let original = self
            .project
            .vector_layers()
            .into_iter()
            .find(|l| {
                l.id() == id
                    || l.name().to_lowercase() == wanted
                    || l.short_name().is_some_and(|s| s.to_lowercase() == wanted)
            })
            .ok_or_else(|| ExecError::NotFound {
                layer: id.to_string(),
            })?;
        tracing::debug!(
            layer = %id,
            features = original.feature_count(),
            "resolved source layer"
        );
        Ok(VectorData {
            data: original.clone(),
            original,
        })
    }

    fn filtered_layer(
        &mut self,
        source: &Layer,
        field: &str,
        value: &Value,
    ) -> Result<VectorData<P::Dataset>, ExecError> {
        let source = self.evaluate(source)?;
        let fields = source.data.fields();
        let native = lookup_field(&fields, field).ok_or_else(|| ExecError::UnknownField {
            field: field.to_string(),
        })?;
        let value = coerce_filter_value(value, native.ty.is_integer());

        let data = self.run("extract_by_attribute", (&native.name, &value), |b| {
            b.extract_by_attribute(&source.data, &native.name, &value)
        })?;
        tracing::debug!(
            before = source.data.feature_count(),
            after = data.feature_count(),
            "filter applied"
        );
        Ok(VectorData {
            original: source.original,
            data,
        })
    }

    fn buffered_layer(
        &mut self,
        source: &Layer,
        distance: f64,
    ) -> Result<VectorData<P::Dataset>, ExecError> {
        let source = self.evaluate(source)?;
        let source_crs = source.data.crs();
        let params = BufferParams {
            distance,
            segments: self.buffer_segments,
            end_cap_style: EndCapStyle::Round,
            join_style: JoinStyle::Round,
            miter_limit: 2.0,
            dissolve: false,
        };

        let data = if source_crs.is_metric() {
            self.run("buffer", &params, |b| b.buffer(&source.data, &params))?
        } else {
            tracing::warn!(
                crs = %source_crs,
                units = ?source_crs.map_units,
                metric_crs = %self.metric_crs,
                "distance unit is not meters; buffering in the metric CRS"
            );
            let metric_crs = self.metric_crs.clone();
            let projected = self.run("reproject", &metric_crs, |b| {
                b.reproject(&source.data, &metric_crs)
            })?;
            let buffered = self.run("buffer", &params, |b| b.buffer(&projected, &params))?;
            self.run("reproject", &source_crs, |b| {
                b.reproject(&buffered, &source_crs)
            })?
        };

        Ok(VectorData {
            original: source.original,
            data,
        })
    }

    fn union_layer(
        &mut self,
        source_a: &Layer,
        source_b: &Layer,
    ) -> Result<VectorData<P::Dataset>, ExecError> {
        let a = self.evaluate(source_a)?;
        let b = self.evaluate(source_b)?;
        let params = OverlayParams::default();
        let data = self.run("union", &params, |backend| {
            backend.union(&a.data, &b.data, &params)
        })?;
        tracing::debug!(features = data.feature_count(), "union computed");
        Ok(VectorData {
            original: a.original,
            data,
        })
    }

    fn intersection_layer(
        &mut self,
        source_a: &Layer,
        source_b: &Layer,
    ) -> Result<VectorData<P::Dataset>, ExecError> {
        let a = self.evaluate(source_a)?;
        let b = self.evaluate(source_b)?;

        // Dissolve the overlay so overlapping parts do not yield duplicate fragments.
        let overlay = self.run("dissolve", "separate_disjoint=true", |backend| {
            backend.dissolve(&b.data, true)
        })?;

        let polygon_by_line = a.data.geometry_kind() == GeometryKind::Polygon
            && b.data.geometry_kind() == GeometryKind::Line;
        let data = if polygon_by_line {
            // A polygon ∩ line overlay has zero area; keep the touched polygons instead.
            let predicate = SpatialPredicate::Intersects;
            self.run("extract_by_location", predicate, |backend| {
                backend.extract_by_location(&a.data, &overlay, predicate)
            })?
        } else {
            let params = OverlayParams::default();
            self.run("intersection", &params, |backend| {
                backend.intersection(&a.data, &overlay, &params)
            })?
        };

        tracing::debug!(
            before = a.data.feature_count(),
            after = data.feature_count(),
            "intersection computed"
        );
        Ok(VectorData {
            original: a.original,
            data,
        })
    }

    fn difference_layer(
        &mut self,
        source_a: &Layer,
        source_b: &Layer,
    ) -> Result<VectorData<P::Dataset>, ExecError> {
        let a = self.evaluate(source_a)?;
        let b = self.evaluate(source_b)?;
        let data = self.run("difference", (), |backend| {
            backend.difference(&a.data, &b.data)
        })?;
        Ok(VectorData {
            original: a.original,
            data,
        })
    }

    // ------------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------------

    /// Select on the project layer, matching `data`'s features through the
    /// original layer's key field. Derived datasets carry the original's
    /// attributes but not its feature identity.
    fn execute_select(&mut self, layer: &Layer) -> Result<String, ExecError> {
        let resolved = self.evaluate(layer)?;
        let key_field =
            resolved
                .original
                .primary_key_field()
                .ok_or_else(|| ExecError::NoPrimaryKey {
                    layer: resolved.original.name(),
                })?;
        let keys = resolved
            .data
            .attribute_values(&key_field)
            .map_err(|source| ExecError::Backend {
                operation: "attribute_values",
                source,
            })?;
        let keys = unique_keys(keys);
        tracing::debug!(
            key_field = %key_field,
            keys = keys.len(),
            "selecting by primary key"
        );

        self.project
            .select_by_primary_keys(&resolved.original, &keys)
            .map_err(|source| ExecError::Backend {
                operation: "select_by_primary_keys",
                source,
            })?;

        Ok(match self.project.selected_feature_count(&resolved.original) {
            1 => "Selected 1 item".to_string(),
            n => format!("Selected {n} items"),
        })
    }

    fn execute_add_to_map(&mut self, layer: &Layer) -> Result<String, ExecError> {
        let resolved = self.evaluate(layer)?;
        self.project
            .add_layer(resolved.data)
            .map_err(|source| ExecError::Backend {
                operation: "add_layer",
                source,
            })?;
        Ok(ADDED_TO_MAP_MESSAGE.to_string())
    }

    fn execute_count(&mut self, layer: &Layer) -> Result<String, ExecError> {
        let resolved = self.evaluate(layer)?;
        Ok(match resolved.data.feature_count() {
            1 => "There is 1 matching feature".to_string(),
            n => format!("There are {n} matching features"),
        })
    }

    fn run<T>(
        &mut self,
        operation: &'static str,
        params: impl fmt::Debug,
        call: impl FnOnce(&mut B) -> Result<T, BackendError>,
    ) -> Result<T, ExecError> {
        tracing::debug!(operation, params = ?params, "running processing algorithm");
        call(&mut *self.backend).map_err(|source| ExecError::Backend { operation, source })
    }
}

/// Exact name, then case-insensitive name, then case-insensitive alias.
fn lookup_field<'f>(fields: &'f [NativeField], name: &str) -> Option<&'f NativeField> {
    let lower = name.to_lowercase();
    fields
        .iter()
        .find(|f| f.name == name)
        .or_else(|| fields.iter().find(|f| f.name.to_lowercase() == lower))
        .or_else(|| fields.iter().find(|f| f.display_name.to_lowercase() == lower))
}

/// Integer-typed fields often store booleans as 0/1; map yes/no style values
/// onto them. Everything else passes through unchanged.
pub fn coerce_filter_value(value: &Value, field_is_integer: bool) -> FilterValue {
    if field_is_integer {
        match value {
            Value::Text(s) => match s.to_lowercase().as_str() {
                "true" | "yes" => return FilterValue::Integer(1),
                "false" | "no" => return FilterValue::Integer(0),
                _ => {}
            },
            Value::Bool(b) => return FilterValue::Integer(i64::from(*b)),
            Value::Integer(_) | Value::Float(_) => {}
        }
    }
    match value {
        Value::Text(s) => FilterValue::Text(s.clone()),
        Value::Integer(n) => FilterValue::Integer(*n),
        Value::Float(x) => FilterValue::Float(*x),
        Value::Bool(b) => FilterValue::Bool(*b),
    }
}

/// Drop nulls and repeats, keeping first-seen order.
fn unique_keys(keys: Vec<AttributeValue>) -> Vec<AttributeValue> {
    let mut out: Vec<AttributeValue> = Vec::with_capacity(keys.len());
    for key in keys {
        if key != AttributeValue::Null && !out.contains(&key) {
            out.push(key);
        }
    }
    out
}
