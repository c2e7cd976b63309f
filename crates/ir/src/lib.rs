pub mod action;
pub mod context;
pub mod error;
pub mod hexable;
pub mod opcode;

pub use action::{Action, ActionId, ActionPointer, Item, SourceLoc, Span, StackSlot, VIRTUAL_STACK_SLOTS};
pub use context::{Config, RuntimeContext};
pub use error::EmitError;
pub use hexable::{minimal_be_bytes, Hexable, PadSide, ResolveEnv, StackRefKind};
pub use opcode::{dup_op, push_op, swap_op, OpCode};

pub use primitive_types::U256;
