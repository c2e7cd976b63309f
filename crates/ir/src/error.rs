use smol_str::SmolStr;
use thiserror::Error;

/// Failures that can surface while serialising the flattened item stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    #[error("`$ptr(\"{0}\")` is not bound to an action after the script has run")]
    UnresolvedLabel(SmolStr),

    #[error("jump offset {offset} of `{name}` does not fit in a 2-byte pointer")]
    PointerOverflow { name: SmolStr, offset: u32 },

    #[error("internal error: stack reference reached hex emission")]
    StackRefAtEmission,

    #[error("internal error: action `{0}` was never assigned a byte offset")]
    MissingOffset(SmolStr),
}
