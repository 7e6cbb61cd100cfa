//! Compiler: model-emitted text → action tree.
//!
//! The model answers with Python-looking call expressions such as
//!
//! ```text
//! select(intersection(get_layer('buildings'), buffer(filter(get_layer('roads'), 'type', 'highway'), 500)))
//! ```
//!
//! We never hand that text to an interpreter. It is parsed by a small
//! recursive-descent grammar (calls with literal or nested-call arguments),
//! then evaluated in a sandbox whose only bound names are the constructors
//! in [`crate::grammar::CATALOG`]:
//! - layer constructors build immutable [`Layer`] nodes,
//! - action constructors build an [`Action`] and append it to the result list.
//!
//! Nothing else is reachable from the text: no variables, no attribute
//! access, no imports.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char as pchar, digit1, one_of, satisfy},
    combinator::{not, opt, peek, recognize},
    multi::separated_list0,
    sequence::{pair, terminated, tuple},
    IResult,
};
use thiserror::Error;

use crate::ast::{Action, Layer, Value};
use crate::grammar::{self, Constructor, NodeKind, ParamType};

/// Maximum call nesting accepted from model output.
pub const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("syntax error on line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("line {line}: name `{name}` is not defined")]
    UnknownName { line: usize, name: String },
    #[error("line {line}: {function}() {message}")]
    Arguments {
        line: usize,
        function: String,
        message: String,
    },
    #[error("line {line}: {function}() argument `{param}` expects {expected}, got {found}")]
    Type {
        line: usize,
        function: String,
        param: String,
        expected: String,
        found: String,
    },
}

/// Every action the text constructed, in evaluation order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub actions: Vec<Action>,
    pub warnings: Vec<String>,
}

/// Result of [`compile`]: at most one action plus diagnostics.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Compilation {
    pub action: Option<Action>,
    /// Actions constructed after the first one; evaluated but never executed.
    pub discarded_actions: usize,
    pub warnings: Vec<String>,
}

impl Compilation {
    pub fn is_empty(&self) -> bool {
        self.action.is_none()
    }
}

/// Compile model output, absorbing failures.
///
/// A malformed response degrades to "no action" with the failure recorded in
/// `warnings`; it never becomes an execution fault.
pub fn compile(text: &str) -> Compilation {
    match try_compile(text) {
        Ok(program) => {
            let mut warnings = program.warnings;
            let mut actions = program.actions.into_iter();
            let action = actions.next();
            let discarded_actions = actions.count();
            if discarded_actions > 0 {
                warnings.push(format!(
                    "{discarded_actions} additional action(s) ignored; only the first action is executed"
                ));
            }
            for warning in &warnings {
                tracing::warn!(warning = %warning, "action compilation produced a diagnostic");
            }
            Compilation {
                action,
                discarded_actions,
                warnings,
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "could not compile model output into an action");
            Compilation {
                action: None,
                discarded_actions: 0,
                warnings: vec![err.to_string()],
            }
        }
    }
}

/// Compile model output, returning the first failure as an error.
pub fn try_compile(text: &str) -> Result<Program, CompileError> {
    let source = text.trim_start();
    check_nesting(source)?;
    let statements = parse_program(source)?;

    let mut sandbox = Sandbox {
        source,
        actions: Vec::new(),
    };
    let mut warnings = Vec::new();
    for statement in &statements {
        if let Evaluated::Layer(_) = sandbox.eval(&statement.expr)? {
            warnings.push(format!(
                "line {}: layer expression is not used by any action",
                line_of(source, statement.at)
            ));
        }
    }

    Ok(Program {
        actions: sandbox.actions,
        warnings,
    })
}

// ============================================================================
// Parse tree
// ============================================================================

/// Positions are stored as the length of the remaining input at the start of
/// a node; `source.len() - at` is the byte offset.
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Call {
        name: String,
        args: Vec<Arg>,
        at: usize,
    },
    Name {
        name: String,
        at: usize,
    },
    Literal(Value),
    None,
}

#[derive(Debug, Clone, PartialEq)]
struct Arg {
    keyword: Option<String>,
    value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
struct Statement {
    expr: Expr,
    at: usize,
}

fn parse_program(source: &str) -> Result<Vec<Statement>, CompileError> {
    let mut statements = Vec::new();
    let mut rest = skip_separators(source);

    while !rest.is_empty() {
        let (after, statement) = match statement(rest) {
            Ok(ok) => ok,
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                return Err(syntax_error(source, e.input, "invalid syntax"));
            }
            Err(nom::Err::Incomplete(_)) => {
                return Err(syntax_error(source, "", "unexpected end of input"));
            }
        };
        statements.push(statement);

        let after = skip_inline(after);
        if !(after.is_empty() || after.starts_with('\n') || after.starts_with(';')) {
            return Err(syntax_error(source, after, "expected end of statement"));
        }
        rest = skip_separators(after);
    }

    Ok(statements)
}

fn statement(input: &str) -> IResult<&str, Statement> {
    let at = input.len();
    let (input, _) = opt(terminated(tag("return"), not(peek(satisfy(is_ident_continue)))))(input)?;
    let (input, expr) = expr(input)?;
    Ok((input, Statement { expr, at }))
}

fn expr(input: &str) -> IResult<&str, Expr> {
    let (input, _) = ws(input)?;
    alt((call_or_name, string_expr, number))(input)
}

fn call_or_name(input: &str) -> IResult<&str, Expr> {
    let at = input.len();
    let (input, name) = ident(input)?;
    let (after_ws, _) = ws(input)?;

    let Some(rest) = after_ws.strip_prefix('(') else {
        let expr = match name {
            "True" | "true" => Expr::Literal(Value::Bool(true)),
            "False" | "false" => Expr::Literal(Value::Bool(false)),
            "None" => Expr::None,
            _ => Expr::Name {
                name: name.to_string(),
                at,
            },
        };
        return Ok((input, expr));
    };

    let (rest, args) = separated_list0(comma, arg)(rest)?;
    let (rest, _) = ws(rest)?;
    let (rest, _) = opt(pchar(','))(rest)?;
    let (rest, _) = ws(rest)?;
    let (rest, _) = pchar(')')(rest)?;
    Ok((
        rest,
        Expr::Call {
            name: name.to_string(),
            args,
            at,
        },
    ))
}

fn arg(input: &str) -> IResult<&str, Arg> {
    let (input, _) = ws(input)?;
    let (input, keyword) = opt(terminated(
        ident,
        tuple((ws, pchar('='), not(peek(pchar('='))))),
    ))(input)?;
    let (input, value) = expr(input)?;
    Ok((
        input,
        Arg {
            keyword: keyword.map(str::to_string),
            value,
        },
    ))
}

fn comma(input: &str) -> IResult<&str, ()> {
    let (input, _) = ws(input)?;
    let (input, _) = pchar(',')(input)?;
    let (input, _) = ws(input)?;
    Ok((input, ()))
}

fn ident(input: &str) -> IResult<&str, &str> {
    recognize(pair(take_while1(is_ident_start), take_while(is_ident_continue)))(input)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn number(input: &str) -> IResult<&str, Expr> {
    let (rest, text) = recognize(tuple((
        opt(one_of("+-")),
        alt((
            recognize(pair(digit1, opt(pair(pchar('.'), take_while(|c: char| c.is_ascii_digit()))))),
            recognize(pair(pchar('.'), digit1)),
        )),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;

    let is_float = text.contains(['.', 'e', 'E']);
    let value = if is_float {
        text.parse::<f64>().ok().map(Value::Float)
    } else {
        text.parse::<i64>().ok().map(Value::Integer)
    };
    match value {
        Some(value) => Ok((rest, Expr::Literal(value))),
        None => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        ))),
    }
}

fn string_expr(input: &str) -> IResult<&str, Expr> {
    let (rest, text) = string_literal(input)?;
    Ok((rest, Expr::Literal(Value::Text(text))))
}

/// Single- or double-quoted string with backslash escapes; no line breaks.
fn string_literal(input: &str) -> IResult<&str, String> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, q @ ('\'' | '"'))) => q,
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Char,
            )))
        }
    };

    let mut out = String::new();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, '0')) => out.push('\0'),
                Some((_, e @ ('\\' | '\'' | '"'))) => out.push(e),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => break,
            },
            '\n' => break,
            c if c == quote => return Ok((&input[i + c.len_utf8()..], out)),
            c => out.push(c),
        }
    }

    // Unterminated: commit so `alt` does not try other branches.
    Err(nom::Err::Failure(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// Whitespace (including newlines) and `#` comments.
fn ws(input: &str) -> IResult<&str, ()> {
    let mut rest = input;
    loop {
        let trimmed = rest.trim_start();
        match trimmed.strip_prefix('#') {
            Some(comment) => rest = comment.find('\n').map_or("", |i| &comment[i..]),
            None => return Ok((trimmed, ())),
        }
    }
}

/// Spaces, tabs, carriage returns and a trailing comment, stopping at a newline.
fn skip_inline(input: &str) -> &str {
    let rest = input.trim_start_matches([' ', '\t', '\r']);
    match rest.strip_prefix('#') {
        Some(comment) => comment.find('\n').map_or("", |i| &comment[i..]),
        None => rest,
    }
}

fn skip_separators(input: &str) -> &str {
    let mut rest = input;
    loop {
        let (next, _) = ws(rest).unwrap_or((rest, ()));
        match next.strip_prefix(';') {
            Some(after) => rest = after,
            None => return next,
        }
    }
}

fn check_nesting(source: &str) -> Result<(), CompileError> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (offset, c) in source.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q || c == '\n' {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(syntax_error(
                        source,
                        &source[offset..],
                        &format!("calls nested deeper than {MAX_NESTING} levels"),
                    ));
                }
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

fn position(source: &str, rest_len: usize) -> (usize, usize) {
    let offset = source.len().saturating_sub(rest_len);
    let prefix = &source[..offset];
    let line = prefix.matches('\n').count() + 1;
    let column = prefix.rsplit('\n').next().unwrap_or("").chars().count() + 1;
    (line, column)
}

fn line_of(source: &str, at: usize) -> usize {
    position(source, at).0
}

fn syntax_error(source: &str, rest: &str, message: &str) -> CompileError {
    let (line, column) = position(source, rest.len());
    let near: String = rest.chars().take(24).collect();
    let message = if near.trim().is_empty() {
        message.to_string()
    } else {
        format!("{message} near `{}`", near.trim_end())
    };
    CompileError::Syntax {
        line,
        column,
        message,
    }
}

// ============================================================================
// Sandbox evaluation
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Evaluated {
    Layer(Layer),
    Value(Value),
    None,
}

impl Evaluated {
    fn describe(&self) -> String {
        match self {
            Evaluated::Layer(_) => "Layer".to_string(),
            Evaluated::Value(Value::Text(_)) => "str".to_string(),
            Evaluated::Value(Value::Integer(_)) => "int".to_string(),
            Evaluated::Value(Value::Float(_)) => "float".to_string(),
            Evaluated::Value(Value::Bool(_)) => "bool".to_string(),
            Evaluated::None => "None".to_string(),
        }
    }
}

struct Sandbox<'s> {
    source: &'s str,
    actions: Vec<Action>,
}

impl Sandbox<'_> {
    fn eval(&mut self, expr: &Expr) -> Result<Evaluated, CompileError> {
        match expr {
            Expr::Literal(value) => Ok(Evaluated::Value(value.clone())),
            Expr::None => Ok(Evaluated::None),
            Expr::Name { name, at } => Err(CompileError::UnknownName {
                line: line_of(self.source, *at),
                name: name.clone(),
            }),
            Expr::Call { name, args, at } => {
                let line = line_of(self.source, *at);
                let constructor =
                    grammar::lookup(name).ok_or_else(|| CompileError::UnknownName {
                        line,
                        name: name.clone(),
                    })?;

                // Arguments first, left to right, like a call in the host language.
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push((arg.keyword.as_deref(), self.eval(&arg.value)?));
                }

                let bound = bind_arguments(constructor, evaluated, line)?;
                self.construct(constructor, bound, line)
            }
        }
    }

    fn construct(
        &mut self,
        constructor: &Constructor,
        bound: Vec<Evaluated>,
        line: usize,
    ) -> Result<Evaluated, CompileError> {
        let args = bound
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                let param = constructor.params[i.min(constructor.params.len() - 1)];
                check_type(constructor, param.name, param.ty, value, line)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let shape_error = || CompileError::Arguments {
            line,
            function: constructor.name.to_string(),
            message: "received arguments of an unexpected shape".to_string(),
        };

        let layer = match (constructor.node, args.as_slice()) {
            (NodeKind::SourceLayer, [Checked::Value(Value::Text(id))]) => {
                Layer::Source { id: id.clone() }
            }
            (
                NodeKind::FilteredLayer,
                [Checked::Layer(source), Checked::Value(Value::Text(field)), Checked::Value(value)],
            ) => Layer::filtered(source.clone(), field.clone(), value.clone()),
            (NodeKind::BufferedLayer, [Checked::Layer(source), Checked::Value(Value::Integer(n))]) => {
                Layer::buffered(source.clone(), *n as f64)
            }
            (NodeKind::BufferedLayer, [Checked::Layer(source), Checked::Value(Value::Float(x))]) => {
                Layer::buffered(source.clone(), *x)
            }
            (NodeKind::UnionLayer, operands) => {
                let layers = operands
                    .iter()
                    .map(|arg| match arg {
                        Checked::Layer(layer) => Some(layer.clone()),
                        Checked::Value(_) => None,
                    })
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(shape_error)?;
                Layer::union_all(layers).ok_or_else(|| CompileError::Arguments {
                    line,
                    function: constructor.name.to_string(),
                    message: "needs at least two layers".to_string(),
                })?
            }
            (NodeKind::IntersectionLayer, [Checked::Layer(a), Checked::Layer(b)]) => {
                Layer::intersection(a.clone(), b.clone())
            }
            (NodeKind::DifferenceLayer, [Checked::Layer(a), Checked::Layer(b)]) => {
                Layer::difference(a.clone(), b.clone())
            }
            (NodeKind::SelectAction, [Checked::Layer(layer)]) => {
                self.actions.push(Action::Select {
                    layer: layer.clone(),
                });
                return Ok(Evaluated::None);
            }
            (NodeKind::AddToMapAction, [Checked::Layer(layer)]) => {
                self.actions.push(Action::AddToMap {
                    layer: layer.clone(),
                });
                return Ok(Evaluated::None);
            }
            (NodeKind::CountAction, [Checked::Layer(layer)]) => {
                self.actions.push(Action::Count {
                    layer: layer.clone(),
                });
                return Ok(Evaluated::None);
            }
            _ => return Err(shape_error()),
        };
        Ok(Evaluated::Layer(layer))
    }
}

/// Match positional and keyword arguments to parameter slots.
fn bind_arguments(
    constructor: &Constructor,
    args: Vec<(Option<&str>, Evaluated)>,
    line: usize,
) -> Result<Vec<Evaluated>, CompileError> {
    let fail = |message: String| CompileError::Arguments {
        line,
        function: constructor.name.to_string(),
        message,
    };

    let positional = args.iter().filter(|(kw, _)| kw.is_none()).count();
    let capacity = if constructor.variadic {
        constructor.params.len().max(positional)
    } else {
        constructor.params.len()
    };
    let mut slots: Vec<Option<Evaluated>> = vec![None; capacity];
    let mut next_positional = 0usize;

    for (keyword, value) in args {
        match keyword {
            None => {
                if next_positional >= capacity {
                    return Err(fail(format!(
                        "takes {} positional argument(s) but more were given",
                        constructor.params.len()
                    )));
                }
                slots[next_positional] = Some(value);
                next_positional += 1;
            }
            Some(kw) => {
                let index = constructor
                    .params
                    .iter()
                    .position(|p| p.name == kw)
                    .ok_or_else(|| fail(format!("got an unexpected keyword argument `{kw}`")))?;
                if slots[index].is_some() {
                    return Err(fail(format!("got multiple values for argument `{kw}`")));
                }
                slots[index] = Some(value);
            }
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.ok_or_else(|| {
                let name = constructor.params[i.min(constructor.params.len() - 1)].name;
                fail(format!("missing required argument `{name}`"))
            })
        })
        .collect()
}

#[derive(Debug)]
enum Checked {
    Layer(Layer),
    Value(Value),
}

fn check_type(
    constructor: &Constructor,
    param: &str,
    ty: ParamType,
    value: Evaluated,
    line: usize,
) -> Result<Checked, CompileError> {
    let accepted = match (&ty, value) {
        (ParamType::Layer, Evaluated::Layer(layer)) => Ok(Checked::Layer(layer)),
        (ParamType::Str, Evaluated::Value(v @ Value::Text(_)))
        | (ParamType::Int, Evaluated::Value(v @ Value::Integer(_)))
        | (ParamType::Bool, Evaluated::Value(v @ Value::Bool(_)))
        | (ParamType::Float, Evaluated::Value(v @ (Value::Float(_) | Value::Integer(_)))) => {
            Ok(Checked::Value(v))
        }
        (ParamType::Union(members), Evaluated::Value(v)) => {
            let fits = members.iter().any(|m| match (m, &v) {
                (ParamType::Str, Value::Text(_))
                | (ParamType::Int, Value::Integer(_))
                | (ParamType::Bool, Value::Bool(_))
                | (ParamType::Float, Value::Float(_) | Value::Integer(_)) => true,
                _ => false,
            });
            if fits {
                Ok(Checked::Value(v))
            } else {
                Err(Evaluated::Value(v))
            }
        }
        (_, other) => Err(other),
    };

    accepted.map_err(|found| CompileError::Type {
        line,
        function: constructor.name.to_string(),
        param: param.to_string(),
        expected: ty.render(),
        found: found.describe(),
    })
}
