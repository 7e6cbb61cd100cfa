//! Grammar catalog: the fixed set of constructors the action language binds.
//!
//! The catalog is shared by the prompt renderer (so the model sees the
//! vocabulary it may use) and by the compiler (which resolves every call
//! against it). A name missing here can never appear in a compiled tree.

/// Placeholder in `get_layer`'s docstring, replaced with live layer names
/// when the prompt is assembled.
pub const LAYER_NAMES_PLACEHOLDER: &str = "{layer_names}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Layer,
    Str,
    Float,
    Int,
    Bool,
    Union(&'static [ParamType]),
}

impl ParamType {
    /// Python-style rendering used in prompt signatures.
    pub fn render(&self) -> String {
        match self {
            ParamType::Layer => "Layer".to_string(),
            ParamType::Str => "str".to_string(),
            ParamType::Float => "float".to_string(),
            ParamType::Int => "int".to_string(),
            ParamType::Bool => "bool".to_string(),
            ParamType::Union(members) => format!(
                "Union[{}]",
                members
                    .iter()
                    .map(ParamType::render)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub ty: ParamType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Layer,
    Action,
}

impl ReturnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnKind::Layer => "Layer",
            ReturnKind::Action => "Action",
        }
    }
}

/// Which tree node a constructor builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    SourceLayer,
    FilteredLayer,
    BufferedLayer,
    UnionLayer,
    IntersectionLayer,
    DifferenceLayer,
    SelectAction,
    AddToMapAction,
    CountAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constructor {
    pub name: &'static str,
    pub node: NodeKind,
    pub params: &'static [Param],
    pub returns: ReturnKind,
    /// When set, the last parameter may repeat (`union(a, b, c, ...)`).
    pub variadic: bool,
    pub doc: Option<&'static str>,
}

impl Constructor {
    /// `def name(p: T, ...) -> Layer:` followed by an optional docstring and `pass`.
    pub fn signature(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty.render()))
            .collect::<Vec<_>>()
            .join(", ");
        let mut out = format!("def {}({params}) -> {}:", self.name, self.returns.as_str());
        if let Some(doc) = self.doc {
            out.push_str("\n    \"\"\"");
            out.push_str(doc);
            out.push_str("\"\"\"");
        }
        out.push_str("\n    pass");
        out
    }
}

const LAYER: ParamType = ParamType::Layer;
const FILTER_VALUE: ParamType = ParamType::Union(&[
    ParamType::Str,
    ParamType::Float,
    ParamType::Int,
    ParamType::Bool,
]);

const BINARY_PARAMS: &[Param] = &[
    Param {
        name: "source_a",
        ty: LAYER,
    },
    Param {
        name: "source_b",
        ty: LAYER,
    },
];

const ACTION_PARAMS: &[Param] = &[Param {
    name: "layer",
    ty: LAYER,
}];

/// Layer transforms first, then actions; this is also prompt order.
pub const CATALOG: &[Constructor] = &[
    Constructor {
        name: "get_layer",
        node: NodeKind::SourceLayer,
        params: &[Param {
            name: "id",
            ty: ParamType::Str,
        }],
        returns: ReturnKind::Layer,
        variadic: false,
        doc: Some("id must be one of: {layer_names}"),
    },
    Constructor {
        name: "filter",
        node: NodeKind::FilteredLayer,
        params: &[
            Param {
                name: "source",
                ty: LAYER,
            },
            Param {
                name: "field",
                ty: ParamType::Str,
            },
            Param {
                name: "value",
                ty: FILTER_VALUE,
            },
        ],
        returns: ReturnKind::Layer,
        variadic: false,
        doc: None,
    },
    Constructor {
        name: "buffer",
        node: NodeKind::BufferedLayer,
        params: &[
            Param {
                name: "source",
                ty: LAYER,
            },
            Param {
                name: "distance",
                ty: ParamType::Float,
            },
        ],
        returns: ReturnKind::Layer,
        variadic: false,
        doc: None,
    },
    Constructor {
        name: "union",
        node: NodeKind::UnionLayer,
        params: BINARY_PARAMS,
        returns: ReturnKind::Layer,
        variadic: true,
        doc: None,
    },
    Constructor {
        name: "intersection",
        node: NodeKind::IntersectionLayer,
        params: BINARY_PARAMS,
        returns: ReturnKind::Layer,
        variadic: false,
        doc: None,
    },
    Constructor {
        name: "difference",
        node: NodeKind::DifferenceLayer,
        params: BINARY_PARAMS,
        returns: ReturnKind::Layer,
        variadic: false,
        doc: None,
    },
    Constructor {
        name: "select",
        node: NodeKind::SelectAction,
        params: ACTION_PARAMS,
        returns: ReturnKind::Action,
        variadic: false,
        doc: Some(
            "Use this if the user asks for data to be selected or where something is located.",
        ),
    },
    Constructor {
        name: "add_to_map",
        node: NodeKind::AddToMapAction,
        params: ACTION_PARAMS,
        returns: ReturnKind::Action,
        variadic: false,
        doc: None,
    },
    Constructor {
        name: "count",
        node: NodeKind::CountAction,
        params: ACTION_PARAMS,
        returns: ReturnKind::Action,
        variadic: false,
        doc: None,
    },
];

pub fn lookup(name: &str) -> Option<&'static Constructor> {
    CATALOG.iter().find(|c| c.name == name)
}

pub fn action_constructors() -> impl Iterator<Item = &'static Constructor> {
    CATALOG.iter().filter(|c| c.returns == ReturnKind::Action)
}

/// All signatures, one block per constructor, in catalog order.
///
/// The output still contains [`LAYER_NAMES_PLACEHOLDER`]; use
/// [`render_signatures_with_layers`] to fill it in.
pub fn render_signatures() -> Vec<String> {
    CATALOG.iter().map(Constructor::signature).collect()
}

pub fn render_signatures_with_layers(layer_names: &[&str]) -> String {
    render_signatures()
        .join("\n")
        .replace(LAYER_NAMES_PLACEHOLDER, &layer_names.join(", "))
}
