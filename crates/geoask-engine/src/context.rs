//! Schema context: what the model is told about the project's layers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{
    AttributeValue, CategorizedRenderer, CategoryValue, Dataset, NativeField, Project,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("layer `{layer}`: field `{field}` has unsupported type `{ty}`")]
    UnsupportedFieldType {
        layer: String,
        field: String,
        ty: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    String,
    Number,
    Boolean,
}

impl SemanticType {
    fn as_str(&self) -> &'static str {
        match self {
            SemanticType::String => "string",
            SemanticType::Number => "number",
            SemanticType::Boolean => "boolean",
        }
    }

    /// `value` as this type, if it can be read as one. Hosts often store
    /// category values as text (`"1"` for a number field).
    fn convert(&self, value: &AttributeValue) -> Option<AttributeValue> {
        use AttributeValue as V;
        match (self, value) {
            (_, V::Null) => None,
            (SemanticType::String, V::Text(_)) => Some(value.clone()),
            (SemanticType::String, other) => Some(V::Text(other.to_string())),
            (SemanticType::Number, V::Integer(_) | V::Real(_)) => Some(value.clone()),
            (SemanticType::Number, V::Bool(b)) => Some(V::Integer(i64::from(*b))),
            (SemanticType::Number, V::Text(s)) => {
                let s = s.trim();
                s.parse::<i64>()
                    .map(V::Integer)
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|x| x.is_finite()).map(V::Real))
            }
            (SemanticType::Boolean, V::Bool(_)) => Some(value.clone()),
            (SemanticType::Boolean, V::Integer(0)) => Some(V::Bool(false)),
            (SemanticType::Boolean, V::Integer(1)) => Some(V::Bool(true)),
            (SemanticType::Boolean, V::Text(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Some(V::Bool(true)),
                "false" | "f" | "no" | "0" => Some(V::Bool(false)),
                _ => None,
            },
            (SemanticType::Boolean, V::Integer(_) | V::Real(_)) => None,
        }
    }
}

/// Raw value → label, in renderer category order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueLabel {
    pub value: AttributeValue,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextField {
    pub id: String,
    pub name: String,
    pub ty: SemanticType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<ValueLabel>>,
}

impl ContextField {
    pub fn prompt(&self) -> String {
        let kind = match &self.values {
            Some(values) if !values.is_empty() => {
                let mut labels: Vec<&str> = Vec::with_capacity(values.len());
                for v in values {
                    if !labels.contains(&v.label.as_str()) {
                        labels.push(&v.label);
                    }
                }
                format!("possible values are {}", labels.join(", "))
            }
            _ => format!("is a {}", self.ty.as_str()),
        };
        if self.id.to_lowercase() == self.name.to_lowercase() {
            format!("{} ({kind})", self.id)
        } else {
            format!("{} (also known as {}, {kind})", self.id, self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextLayer {
    pub id: String,
    pub name: String,
    pub fields: Vec<ContextField>,
}

impl ContextLayer {
    pub fn prompt(&self) -> String {
        let fields = self
            .fields
            .iter()
            .map(ContextField::prompt)
            .collect::<Vec<_>>()
            .join(", ");
        format!("* {} (has attributes {fields})", self.name)
    }
}

/// Read-only snapshot of the project's vector layers for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub layers: Vec<ContextLayer>,
}

impl Context {
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name.as_str()).collect()
    }

    /// One `* layer (...)` line per layer.
    pub fn prompt(&self) -> String {
        self.layers
            .iter()
            .map(ContextLayer::prompt)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn compute_context<P: Project>(project: &P) -> Result<Context, SchemaError> {
    let layers = project
        .vector_layers()
        .iter()
        .map(process_layer)
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(layers = layers.len(), "computed schema context");
    Ok(Context { layers })
}

fn process_layer<D: Dataset>(layer: &D) -> Result<ContextLayer, SchemaError> {
    let name = layer.name();
    let renderer = layer.renderer();
    let fields = layer
        .fields()
        .iter()
        .map(|field| process_field(&name, field, renderer.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ContextLayer {
        id: layer.id(),
        name,
        fields,
    })
}

fn process_field(
    layer: &str,
    field: &NativeField,
    renderer: Option<&CategorizedRenderer>,
) -> Result<ContextField, SchemaError> {
    let ty = semantic_type(layer, field)?;
    let values = match renderer {
        Some(r) if r.class_attribute == field.name => Some(value_labels(layer, field, ty, r)),
        _ => None,
    };
    Ok(ContextField {
        id: field.name.clone(),
        name: field.display_name.clone(),
        ty,
        values,
    })
}

fn semantic_type(layer: &str, field: &NativeField) -> Result<SemanticType, SchemaError> {
    use crate::backend::NativeFieldType as T;
    match &field.ty {
        T::String => Ok(SemanticType::String),
        t if t.is_numeric() => Ok(SemanticType::Number),
        T::Bool => Ok(SemanticType::Boolean),
        other => Err(SchemaError::UnsupportedFieldType {
            layer: layer.to_string(),
            field: field.name.clone(),
            ty: other.to_string(),
        }),
    }
}

fn value_labels(
    layer: &str,
    field: &NativeField,
    ty: SemanticType,
    renderer: &CategorizedRenderer,
) -> Vec<ValueLabel> {
    let mut out: Vec<ValueLabel> = Vec::new();
    for category in &renderer.categories {
        let values: Vec<&AttributeValue> = match &category.value {
            CategoryValue::Null | CategoryValue::Single(AttributeValue::Null) => continue,
            CategoryValue::Single(v) => vec![v],
            CategoryValue::List(vs) => vs.iter().filter(|v| **v != AttributeValue::Null).collect(),
        };
        for raw in values {
            let Some(value) = ty.convert(raw) else {
                tracing::warn!(
                    layer = %layer,
                    field = %field.name,
                    value = %raw,
                    kind = ty.as_str(),
                    "skipping renderer category whose value does not fit the field type"
                );
                continue;
            };
            // Same value twice: the later category wins.
            match out.iter_mut().find(|e| e.value == value) {
                Some(existing) => existing.label = category.label.clone(),
                None => out.push(ValueLabel {
                    value,
                    label: category.label.clone(),
                }),
            }
        }
    }
    out
}
