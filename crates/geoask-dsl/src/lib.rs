//! geoask action language
//!
//! A language model describes a GIS request as a call expression over a fixed
//! vocabulary (`get_layer`, `filter`, `buffer`, `union`, `intersection`,
//! `difference`, `select`, `add_to_map`, `count`). This crate owns:
//! - the grammar catalog and its prompt-facing signatures (`grammar`),
//! - the typed action tree (`ast`),
//! - the compiler from model text to an action tree (`compile`).
//!
//! The compiler is a restricted parser, not an evaluator: the text can only
//! build trees out of catalog constructors.

pub mod ast;
pub mod compile;
pub mod grammar;

pub use ast::{Action, Layer, Value};
pub use compile::{compile, try_compile, Compilation, CompileError, Program};
