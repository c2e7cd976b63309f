use opscript_ir::{EmitError, SourceLoc};
use smol_str::SmolStr;
use thiserror::Error;

/// Errors raised while the processor turns collected Actions into hex.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error("action `{name}()` at {loc} produced no instructions")]
    EmptyAction { name: SmolStr, loc: SourceLoc },

    #[error("internal error: flattened stream does not begin with an action")]
    NoLeadingAction,

    #[error("stack slot referenced in call to `{helper}()` won't exist on the stack during runtime")]
    SlotGone { helper: SmolStr, loc: SourceLoc },

    #[error("stack slot referenced in call to `{helper}()` is {depth} items deep; DUP16 is the deepest reach")]
    DupTooDeep {
        helper: SmolStr,
        loc: SourceLoc,
        depth: usize,
    },

    #[error("swap index out of range")]
    SwapOutOfRange { helper: SmolStr, loc: SourceLoc },

    #[error(transparent)]
    Emit(#[from] EmitError),
}

impl ProcessError {
    /// Call-site location of the faulting helper, when one is known.
    pub fn loc(&self) -> Option<SourceLoc> {
        match self {
            Self::EmptyAction { loc, .. }
            | Self::SlotGone { loc, .. }
            | Self::DupTooDeep { loc, .. }
            | Self::SwapOutOfRange { loc, .. } => Some(*loc),
            Self::NoLeadingAction | Self::Emit(_) => None,
        }
    }
}
