//! Script front-end and public compile API.
//!
//! A script is evaluated once; helper calls record Actions into a
//! [`opscript_ir::RuntimeContext`], and the processor turns the collected IR
//! into a `"0x"`-prefixed uppercase hex string of EVM bytecode.

pub mod ast;
mod error;
mod eval;
mod helpers;
pub mod selector;
pub mod syntax;
mod value;

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use smol_str::SmolStr;

pub use error::Error;
pub use value::Value;

/// Extra name bindings visible to the script, in insertion order.
pub type Bindings = IndexMap<SmolStr, Value>;

/// Default filename used for diagnostics when none is given.
pub const DEFAULT_FILENAME: &str = "bytecode";

static DEPLOYER: &str = include_str!("deployer.ops");

/// Compiles a script to bytecode.
///
/// When the script sets `$("deployable", true)`, the output is wrapped by
/// compiling the bundled deployer with `CODE` bound to the inner hex; the
/// deployer never sets the flag itself, so the recursion is one level deep.
pub fn preprocess(source: &str, bindings: Bindings, filename: &str) -> Result<String, Error> {
    let _span = tracing::debug_span!("preprocess", filename).entered();

    let program = ast::parse(source)?;
    let mut evaluator = eval::Evaluator::new(bindings);
    evaluator.run(&program)?;
    evaluator.promote_labels();

    let labels = evaluator.label_bindings();
    let hex = opscript_codegen::compile(&evaluator.ctx, &labels)?;

    if evaluator.ctx.config.deployable {
        tracing::debug!(inner_bytes = (hex.len() - 2) / 2, "wrapping with the bundled deployer");
        let mut inner = Bindings::default();
        inner.insert(SmolStr::new("CODE"), Value::Str(SmolStr::new(&hex)));
        return preprocess(DEPLOYER, inner, "deployer");
    }
    Ok(hex)
}

/// Reads a UTF-8 script file and compiles it; the path becomes the
/// diagnostic filename.
pub fn preprocess_file(path: impl AsRef<Path>, bindings: Bindings) -> Result<String, Error> {
    let path = path.as_ref();
    let source = fs::read_to_string(path)?;
    preprocess(&source, bindings, &path.display().to_string())
}
