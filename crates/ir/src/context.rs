//! The append-only collector helpers write into while a script runs.

use cranelift_entity::PrimaryMap;
use smol_str::SmolStr;

use crate::action::{Action, ActionId, SourceLoc, Span};

/// Process-level flags settable from script code via `$(key, value)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Config {
    /// Re-wrap the output by compiling the bundled deployer with `CODE`
    /// bound to the produced hex.
    pub deployable: bool,
}

/// Owns every Action of one compile.
///
/// Two buckets: `actions` is the main instruction stream, `tail_actions`
/// holds deferred data blobs that must land after all normal code
/// (`allocUnsafe` blobs). Helpers only ever append; nothing mutates a
/// previously pushed Action.
#[derive(Debug, Default)]
pub struct RuntimeContext {
    pub arena: PrimaryMap<ActionId, Action>,
    pub actions: Vec<ActionId>,
    pub tail_actions: Vec<ActionId>,
    pub config: Config,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an Action without scheduling it; [`RuntimeContext::push_action`]
    /// decides the bucket once the helper has finished building it.
    pub fn make_action(&mut self, name: impl Into<SmolStr>, span: Span, loc: SourceLoc) -> ActionId {
        self.arena.push(Action::new(name, span, loc))
    }

    /// Appends a finished Action, routing tail-marked ones into the deferred
    /// bucket.
    pub fn push_action(&mut self, id: ActionId) {
        if self.arena[id].tail {
            self.tail_actions.push(id);
        } else {
            self.actions.push(id);
        }
    }

    pub fn action(&self, id: ActionId) -> &Action {
        &self.arena[id]
    }

    pub fn action_mut(&mut self, id: ActionId) -> &mut Action {
        &mut self.arena[id]
    }

    /// Top-level Actions in emission order: main stream, then tail blobs.
    /// Adopted children are excluded; they are reached through their parent.
    pub fn top_level(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.actions
            .iter()
            .chain(self.tail_actions.iter())
            .copied()
            .filter(|id| self.arena[*id].parent.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_routing() {
        let mut ctx = RuntimeContext::new();
        let a = ctx.make_action("a", Span::default(), SourceLoc::default());
        let b = ctx.make_action("b", Span::default(), SourceLoc::default());
        ctx.action_mut(b).tail = true;
        ctx.push_action(a);
        ctx.push_action(b);
        assert_eq!(ctx.actions, vec![a]);
        assert_eq!(ctx.tail_actions, vec![b]);
        assert_eq!(ctx.top_level().collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn adopted_children_leave_top_level() {
        let mut ctx = RuntimeContext::new();
        let parent = ctx.make_action("outer", Span::default(), SourceLoc::default());
        let child = ctx.make_action("inner", Span::default(), SourceLoc::default());
        ctx.push_action(child);
        ctx.push_action(parent);
        ctx.action_mut(child).parent = Some(parent);
        assert_eq!(ctx.top_level().collect::<Vec<_>>(), vec![parent]);
    }
}
