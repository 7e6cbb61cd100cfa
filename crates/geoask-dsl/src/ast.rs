//! Typed action trees.
//!
//! An action tree is an [`Action`] plus the [`Layer`] subtree it consumes.
//! Trees are plain immutable data: building one never touches a dataset.
//!
//! Binary layer operations carry a *primary* operand (`source_a`). Selection
//! always resolves back to the project layer behind the primary operand; the
//! identity of `source_b` is only used for geometry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A literal argument value (filter values, ids, distances).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "tag", content = "value", rename_all = "snake_case")]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

/// Binary nodes (`Union`, `Intersection`, `Difference`) keep the identity of
/// `source_a`: an action over them targets `source_a`'s project layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    /// A project layer, matched by id, display name or short name.
    Source { id: String },
    Filtered {
        source: Box<Layer>,
        field: String,
        value: Value,
    },
    /// Buffer by `distance` meters.
    Buffered { source: Box<Layer>, distance: f64 },
    Union {
        source_a: Box<Layer>,
        source_b: Box<Layer>,
    },
    Intersection {
        source_a: Box<Layer>,
        source_b: Box<Layer>,
    },
    Difference {
        source_a: Box<Layer>,
        source_b: Box<Layer>,
    },
}

impl Layer {
    pub fn source(id: impl Into<String>) -> Self {
        Layer::Source { id: id.into() }
    }

    pub fn filtered(source: Layer, field: impl Into<String>, value: Value) -> Self {
        Layer::Filtered {
            source: Box::new(source),
            field: field.into(),
            value,
        }
    }

    pub fn buffered(source: Layer, distance: f64) -> Self {
        Layer::Buffered {
            source: Box::new(source),
            distance,
        }
    }

    pub fn union(source_a: Layer, source_b: Layer) -> Self {
        Layer::Union {
            source_a: Box::new(source_a),
            source_b: Box::new(source_b),
        }
    }

    /// Right-fold two or more operands into nested unions:
    /// `[a, b, c]` becomes `union(a, union(b, c))`.
    ///
    /// Returns `None` for fewer than two operands.
    pub fn union_all(mut operands: Vec<Layer>) -> Option<Self> {
        if operands.len() < 2 {
            return None;
        }
        let mut acc = operands.pop()?;
        while let Some(next) = operands.pop() {
            acc = Layer::union(next, acc);
        }
        Some(acc)
    }

    pub fn intersection(source_a: Layer, source_b: Layer) -> Self {
        Layer::Intersection {
            source_a: Box::new(source_a),
            source_b: Box::new(source_b),
        }
    }

    pub fn difference(source_a: Layer, source_b: Layer) -> Self {
        Layer::Difference {
            source_a: Box::new(source_a),
            source_b: Box::new(source_b),
        }
    }

    /// Constructor name of this node in the action language.
    pub fn constructor_name(&self) -> &'static str {
        match self {
            Layer::Source { .. } => "get_layer",
            Layer::Filtered { .. } => "filter",
            Layer::Buffered { .. } => "buffer",
            Layer::Union { .. } => "union",
            Layer::Intersection { .. } => "intersection",
            Layer::Difference { .. } => "difference",
        }
    }

    /// Depth-first, pre-order walk over this subtree.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Layer)) {
        f(self);
        match self {
            Layer::Source { .. } => {}
            Layer::Filtered { source, .. } | Layer::Buffered { source, .. } => source.visit(f),
            Layer::Union { source_a, source_b }
            | Layer::Intersection { source_a, source_b }
            | Layer::Difference { source_a, source_b } => {
                source_a.visit(f);
                source_b.visit(f);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Use this if the user asks for data to be selected or where something is located.
    Select { layer: Layer },
    AddToMap { layer: Layer },
    Count { layer: Layer },
}

impl Action {
    pub fn layer(&self) -> &Layer {
        match self {
            Action::Select { layer } | Action::AddToMap { layer } | Action::Count { layer } => {
                layer
            }
        }
    }

    pub fn constructor_name(&self) -> &'static str {
        match self {
            Action::Select { .. } => "select",
            Action::AddToMap { .. } => "add_to_map",
            Action::Count { .. } => "count",
        }
    }

    /// Every constructor name used by this tree, root first.
    pub fn constructor_names(&self) -> Vec<&'static str> {
        let mut names = vec![self.constructor_name()];
        self.layer().visit(&mut |node| names.push(node.constructor_name()));
        names
    }
}

// ============================================================================
// Rendering back to call syntax
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write_string_literal(f, s),
            Value::Integer(n) => write!(f, "{n}"),
            // `{:?}` always keeps a fraction or exponent, so the literal reads back as a float.
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
        }
    }
}

fn write_string_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("'")?;
    for ch in s.chars() {
        match ch {
            '\\' => f.write_str("\\\\")?,
            '\'' => f.write_str("\\'")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("'")
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.constructor_name();
        match self {
            Layer::Source { id } => {
                write!(f, "{name}(")?;
                write_string_literal(f, id)?;
                f.write_str(")")
            }
            Layer::Filtered {
                source,
                field,
                value,
            } => {
                write!(f, "{name}({source}, ")?;
                write_string_literal(f, field)?;
                write!(f, ", {value})")
            }
            Layer::Buffered { source, distance } => {
                write!(f, "{name}({source}, {})", Value::Float(*distance))
            }
            Layer::Union { source_a, source_b }
            | Layer::Intersection { source_a, source_b }
            | Layer::Difference { source_a, source_b } => {
                write!(f, "{name}({source_a}, {source_b})")
            }
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.constructor_name(), self.layer())
    }
}
