//! pest-generated parser for the script surface syntax.

#[derive(pest_derive::Parser)]
#[grammar = "opscript.pest"]
pub struct ScriptParser;
