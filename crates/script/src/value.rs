//! Script-level values: what expressions evaluate to and what helpers accept.

use smol_str::SmolStr;

use opscript_ir::{ActionPointer, Hexable, StackSlot, U256};

/// The duck-typed value domain of the scripting surface, rendered as a sum
/// type. Helper boundaries dispatch on the variant.
#[derive(Debug, Clone)]
pub enum Value {
    /// Result of a helper with nothing to hand back (`$(...)`).
    Unit,
    Int(U256),
    Str(SmolStr),
    Bool(bool),
    /// An IR fragment built by an expression helper (`$concat`, `$pad`,
    /// `$ptr`, `$jumpmap`).
    Hex(Hexable),
    /// Result of an Action helper.
    Action(ActionPointer),
    /// One slot of an Action's virtual stack, obtained by destructuring.
    StackRef(StackSlot),
    /// Object literal, insertion order preserved (`dispatch` tables).
    Map(Vec<(SmolStr, Value)>),
}

impl Value {
    /// Variant name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unit => "nothing",
            Self::Int(_) => "an integer",
            Self::Str(_) => "a string",
            Self::Bool(_) => "a boolean",
            Self::Hex(_) => "a hex value",
            Self::Action(_) => "an action",
            Self::StackRef(_) => "a stack reference",
            Self::Map(_) => "an object",
        }
    }
}

impl From<U256> for Value {
    fn from(v: U256) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Int(U256::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(SmolStr::new(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}
