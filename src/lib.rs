//! # Fragment Compiler
//!
//! Compiles a single-file reactive component (markup, `{expression}`
//! interpolations and one `<script>` block) into a JavaScript module:
//!
//! - **client**: a factory returning a `create` / `update` / `destroy`
//!   lifecycle that builds the DOM (or adopts server-rendered nodes) and patches
//!   only what a batch of changed names touches.
//! - **server**: a render function returning the markup as a string, with
//!   marker comments the client hydrates against.
//!
//! ## Pipeline
//!
//! 1. `parse` builds the fragment tree and delegates script code to oxc.
//! 2. `scope` resolves every name against a lexical scope arena.
//! 3. `analyze` classifies root bindings and orders `$:` reactive declarations.
//! 4. `codegen` / `server` build an `emit` tree, printed once at the end.
//!
//! Compilation is all-or-nothing: any failure is a `CompilerError` and no
//! partial module is returned.

#[cfg(feature = "napi")]
use napi_derive::napi;

mod analyze;
mod codegen;
mod compile;
mod emit;
mod error;
mod fragment;
mod parse;
mod printer;
mod scope;
mod script;
mod server;
mod visitor;

#[cfg(test)]
mod parse_tests;
#[cfg(test)]
mod runtime_tests;

pub use analyze::{Analysis, ReactiveDeclaration};
pub use compile::{compile, compile_targets, BuildOutput, CompileMode, CompileOptions, CompileResult};
pub use error::CompilerError;
pub use fragment::{AttributeNode, Component, ElementNode, ExpressionNode, Fragment, HydrationSlot, TextNode};
pub use parse::parse;

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Compile from JS. `options_json` is a serialized `CompileOptions`; missing
/// fields take their defaults.
#[cfg(feature = "napi")]
#[napi]
pub fn compile_native(source: String, options_json: Option<String>) -> napi::Result<serde_json::Value> {
    let options: CompileOptions = match options_json {
        Some(json) => serde_json::from_str(&json).map_err(|e| napi::Error::from_reason(e.to_string()))?,
        None => CompileOptions::default(),
    };
    let result = compile(&source, &options).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_value(result).map_err(|e| napi::Error::from_reason(e.to_string()))
}
