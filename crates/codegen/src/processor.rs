//! The post-execution pipeline: flatten, simulate, lay out, emit.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use smol_str::SmolStr;

use opscript_ir::{
    dup_op, swap_op, ActionId, Hexable, OpCode, ResolveEnv, RuntimeContext, SourceLoc,
    StackRefKind,
};

use crate::error::ProcessError;

/// Identity of one symbolic stack slot. Two stack positions hold the same
/// value at runtime iff they carry the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StackRefId(u32);

/// The flattened instruction stream plus per-index Action boundary events.
///
/// Several Actions may start (a parent whose first item is a child) or end
/// (a child closing its parent) on the same index; event order is the
/// depth-first walk order, which is what the simulation's open-Action stack
/// expects.
struct Flattened {
    items: Vec<Hexable>,
    starts: FxHashMap<usize, SmallVec<[ActionId; 2]>>,
    ends: FxHashMap<usize, SmallVec<[ActionId; 2]>>,
}

/// Result of the first three passes; ready for emission.
pub struct Processed {
    pub items: Vec<Hexable>,
    pub offsets: FxHashMap<ActionId, u32>,
}

/// Runs flatten, stack simulation and byte layout.
pub fn process(ctx: &RuntimeContext) -> Result<Processed, ProcessError> {
    let mut flat = flatten(ctx)?;
    tracing::debug!(items = flat.items.len(), "flattened action stream");
    simulate(ctx, &mut flat)?;
    let offsets = layout(&flat);
    Ok(Processed {
        items: flat.items,
        offsets,
    })
}

/// Serialises a processed stream, resolving label and action pointers.
pub fn emit(
    ctx: &RuntimeContext,
    processed: &Processed,
    labels: &FxHashMap<SmolStr, ActionId>,
) -> Result<String, ProcessError> {
    let env = ResolveEnv {
        actions: &ctx.arena,
        labels,
        offsets: &processed.offsets,
    };
    let mut out = String::from("0x");
    for item in &processed.items {
        item.write_hex(&mut out, &env)?;
    }
    debug_assert_eq!(out.len() % 2, 0, "odd number of hex digits emitted");
    tracing::debug!(bytes = (out.len() - 2) / 2, "emitted bytecode");
    Ok(out)
}

/// The whole pipeline: collected context -> `"0x..."`.
pub fn compile(
    ctx: &RuntimeContext,
    labels: &FxHashMap<SmolStr, ActionId>,
) -> Result<String, ProcessError> {
    let processed = process(ctx)?;
    emit(ctx, &processed, labels)
}

fn flatten(ctx: &RuntimeContext) -> Result<Flattened, ProcessError> {
    let mut flat = Flattened {
        items: Vec::new(),
        starts: FxHashMap::default(),
        ends: FxHashMap::default(),
    };
    for id in ctx.top_level() {
        flatten_action(ctx, id, &mut flat)?;
    }
    if !flat.items.is_empty() && !flat.starts.contains_key(&0) {
        return Err(ProcessError::NoLeadingAction);
    }
    Ok(flat)
}

fn flatten_action(ctx: &RuntimeContext, id: ActionId, flat: &mut Flattened) -> Result<(), ProcessError> {
    let action = ctx.action(id);
    if action.items.is_empty() && !action.is_jump_destination {
        return Err(ProcessError::EmptyAction {
            name: action.name.clone(),
            loc: action.loc,
        });
    }

    let start = flat.items.len();
    flat.starts.entry(start).or_default().push(id);
    if action.is_jump_destination {
        flat.items.push(Hexable::Op(OpCode::JUMPDEST));
    }
    for item in &action.items {
        match item {
            opscript_ir::Item::Hex(h) => flat.items.push(h.clone()),
            opscript_ir::Item::Child(child) => flatten_action(ctx, *child, flat)?,
        }
    }
    let end = flat.items.len() - 1;
    flat.ends.entry(end).or_default().push(id);
    Ok(())
}

/// Walks the stream once, tracking symbolic slot identities and lowering
/// every stack reference to a concrete DUPn/SWAPn.
fn simulate(ctx: &RuntimeContext, flat: &mut Flattened) -> Result<(), ProcessError> {
    let mut stack: VecDeque<StackRefId> = VecDeque::new();
    let mut open: Vec<ActionId> = Vec::new();
    let mut history: FxHashMap<ActionId, Vec<StackRefId>> = FxHashMap::default();
    let mut next_id = 0u32;
    let mut fresh = move || {
        let id = StackRefId(next_id);
        next_id += 1;
        id
    };

    // Copy of the fields that drive the walk, so the item slot stays free
    // for in-place lowering.
    enum Step {
        Ref(ActionId, u8, StackRefKind),
        Op(OpCode),
        Data,
    }

    for i in 0..flat.items.len() {
        if let Some(entered) = flat.starts.get(&i) {
            open.extend(entered.iter().copied());
        }

        let step = match &flat.items[i] {
            Hexable::StackRef { owner, slot, kind } => Step::Ref(*owner, *slot, *kind),
            Hexable::Op(op) => Step::Op(*op),
            _ => Step::Data,
        };

        match step {
            Step::Ref(owner, slot, kind) => {
                let (helper, loc) = current_call(ctx, &open);
                let slot_gone = || ProcessError::SlotGone {
                    helper: helper.clone(),
                    loc,
                };
                let real = *history
                    .get(&owner)
                    .and_then(|snapshot| snapshot.get(slot as usize))
                    .ok_or_else(slot_gone)?;
                let depth = stack
                    .iter()
                    .position(|r| *r == real)
                    .ok_or_else(slot_gone)?;
                match kind {
                    StackRefKind::Dup => {
                        if depth + 1 > 16 {
                            return Err(ProcessError::DupTooDeep {
                                helper: helper.clone(),
                                loc,
                                depth: depth + 1,
                            });
                        }
                        flat.items[i] = Hexable::Op(dup_op(depth + 1));
                        // The duplicate carries the same identity as its
                        // source slot.
                        stack.push_front(real);
                    }
                    StackRefKind::Swap | StackRefKind::HotSwap => {
                        if depth == 0 || depth > 16 {
                            return Err(ProcessError::SwapOutOfRange {
                                helper: helper.clone(),
                                loc,
                            });
                        }
                        flat.items[i] = Hexable::Op(swap_op(depth));
                        // A hot swap rewrites the slot's runtime value while
                        // keeping its tracked identity in place.
                        if kind == StackRefKind::Swap {
                            stack.swap(0, depth);
                        }
                    }
                }
            }
            Step::Op(op) => {
                if let Some(n) = op.swap_n() {
                    if n >= stack.len() {
                        let (helper, loc) = current_call(ctx, &open);
                        return Err(ProcessError::SwapOutOfRange { helper, loc });
                    }
                    stack.swap(0, n);
                } else if let Some(n) = op.dup_n() {
                    let dup = if n <= stack.len() {
                        stack[n - 1]
                    } else {
                        fresh()
                    };
                    stack.push_front(dup);
                } else {
                    for _ in 0..op.stack_removed() {
                        stack.pop_front();
                    }
                    for _ in 0..op.stack_added() {
                        stack.push_front(fresh());
                    }
                }
            }
            Step::Data => {}
        }

        if let Some(ended) = flat.ends.get(&i) {
            for action in ended {
                history.insert(*action, stack.iter().copied().collect());
                open.pop();
            }
        }
    }
    Ok(())
}

fn current_call(ctx: &RuntimeContext, open: &[ActionId]) -> (SmolStr, SourceLoc) {
    match open.last() {
        Some(id) => {
            let action = ctx.action(*id);
            (action.name.clone(), action.loc)
        }
        None => (SmolStr::new("?"), SourceLoc::default()),
    }
}

/// Computes each Action's jump offset: the byte offset of its first item
/// (its JUMPDEST when it is a destination).
fn layout(flat: &Flattened) -> FxHashMap<ActionId, u32> {
    let mut offsets = FxHashMap::default();
    let mut pos = 0u32;
    for (i, item) in flat.items.iter().enumerate() {
        if let Some(started) = flat.starts.get(&i) {
            for action in started {
                offsets.insert(*action, pos);
            }
        }
        pos += item.byte_length() as u32;
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use opscript_ir::{Item, SourceLoc, Span, U256};

    fn push_literal(ctx: &mut RuntimeContext, value: u64) -> ActionId {
        let id = ctx.make_action("push", Span::default(), SourceLoc::default());
        let lit = Hexable::Literal(U256::from(value));
        ctx.action_mut(id)
            .push_hex(Hexable::Op(opscript_ir::push_op(lit.byte_length())));
        ctx.action_mut(id).push_hex(lit);
        ctx.push_action(id);
        id
    }

    fn ref_action(
        ctx: &mut RuntimeContext,
        name: &str,
        owner: ActionId,
        slot: u8,
        kind: StackRefKind,
    ) -> ActionId {
        let id = ctx.make_action(name, Span::default(), SourceLoc::default());
        ctx.action_mut(id).push_hex(Hexable::StackRef { owner, slot, kind });
        ctx.push_action(id);
        id
    }

    fn no_labels() -> FxHashMap<SmolStr, ActionId> {
        FxHashMap::default()
    }

    #[test]
    fn empty_context_emits_prefix_only() {
        let ctx = RuntimeContext::new();
        assert_eq!(compile(&ctx, &no_labels()).unwrap(), "0x");
    }

    #[test]
    fn jumpdest_prepended_and_offsets_recorded() {
        let mut ctx = RuntimeContext::new();
        push_literal(&mut ctx, 1);
        let main = push_literal(&mut ctx, 2);
        ctx.action_mut(main).is_jump_destination = true;
        let processed = process(&ctx).unwrap();
        assert_eq!(processed.offsets[&main], 2);
        let hex = emit(&ctx, &processed, &no_labels()).unwrap();
        assert_eq!(hex, "0x60015B6002");
    }

    #[test]
    fn empty_action_is_an_error() {
        let mut ctx = RuntimeContext::new();
        let id = ctx.make_action("nothing", Span::default(), SourceLoc::default());
        ctx.push_action(id);
        assert!(matches!(
            compile(&ctx, &no_labels()),
            Err(ProcessError::EmptyAction { .. })
        ));
    }

    #[test]
    fn empty_jump_destination_is_fine() {
        let mut ctx = RuntimeContext::new();
        let id = ctx.make_action("label", Span::default(), SourceLoc::default());
        ctx.action_mut(id).is_jump_destination = true;
        ctx.push_action(id);
        assert_eq!(compile(&ctx, &no_labels()).unwrap(), "0x5B");
    }

    #[test]
    fn dup_reference_lowering() {
        let mut ctx = RuntimeContext::new();
        let owner = push_literal(&mut ctx, 1);
        ref_action(&mut ctx, "dup", owner, 0, StackRefKind::Dup);
        assert_eq!(compile(&ctx, &no_labels()).unwrap(), "0x600180");
    }

    #[test]
    fn dup_reference_below_other_pushes() {
        let mut ctx = RuntimeContext::new();
        let owner = push_literal(&mut ctx, 1);
        push_literal(&mut ctx, 2);
        push_literal(&mut ctx, 3);
        ref_action(&mut ctx, "dup", owner, 0, StackRefKind::Dup);
        // The referenced slot is two items down by the time it is consumed.
        assert_eq!(compile(&ctx, &no_labels()).unwrap(), "0x60016002600382");
    }

    #[test]
    fn consumed_slot_is_gone() {
        let mut ctx = RuntimeContext::new();
        let owner = push_literal(&mut ctx, 1);
        let popper = ctx.make_action("pop", Span::default(), SourceLoc::default());
        ctx.action_mut(popper).push_hex(Hexable::Op(OpCode::POP));
        ctx.push_action(popper);
        ref_action(&mut ctx, "dup", owner, 0, StackRefKind::Dup);
        let err = compile(&ctx, &no_labels()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "stack slot referenced in call to `dup()` won't exist on the stack during runtime"
        );
    }

    #[test]
    fn seventeen_deep_reference_fails() {
        let mut ctx = RuntimeContext::new();
        let first = push_literal(&mut ctx, 0xAA);
        for i in 0..16 {
            push_literal(&mut ctx, i);
        }
        ref_action(&mut ctx, "dup", first, 0, StackRefKind::Dup);
        assert!(matches!(
            compile(&ctx, &no_labels()),
            Err(ProcessError::DupTooDeep { depth: 17, .. })
        ));
    }

    #[test]
    fn sixteen_deep_reference_is_the_limit() {
        let mut ctx = RuntimeContext::new();
        let first = push_literal(&mut ctx, 0xAA);
        for i in 0..15 {
            push_literal(&mut ctx, i);
        }
        ref_action(&mut ctx, "dup", first, 0, StackRefKind::Dup);
        let hex = compile(&ctx, &no_labels()).unwrap();
        assert!(hex.ends_with("8F"), "expected DUP16, got {hex}");
    }

    #[test]
    fn swap_on_single_item_stack() {
        let mut ctx = RuntimeContext::new();
        push_literal(&mut ctx, 1);
        let swapper = ctx.make_action("swap1", Span::default(), SourceLoc::default());
        ctx.action_mut(swapper).push_hex(Hexable::Op(OpCode::SWAP1));
        ctx.push_action(swapper);
        let err = compile(&ctx, &no_labels()).unwrap_err();
        assert_eq!(err.to_string(), "swap index out of range");
    }

    #[test]
    fn hot_swap_keeps_reference_identities() {
        let mut ctx = RuntimeContext::new();
        let owner = push_literal(&mut ctx, 1);
        // set-style write: push the new value, hot-swap it into the slot,
        // drop the displaced value.
        let setter = ctx.make_action("set", Span::default(), SourceLoc::default());
        ctx.action_mut(setter).push_hex(Hexable::Op(OpCode::PUSH1));
        ctx.action_mut(setter).push_hex(Hexable::Literal(U256::from(9u32)));
        ctx.action_mut(setter).push_hex(Hexable::StackRef {
            owner,
            slot: 0,
            kind: StackRefKind::HotSwap,
        });
        ctx.action_mut(setter).push_hex(Hexable::Op(OpCode::POP));
        ctx.push_action(setter);
        // The original slot identity must still be reachable afterwards.
        ref_action(&mut ctx, "dup", owner, 0, StackRefKind::Dup);
        assert_eq!(compile(&ctx, &no_labels()).unwrap(), "0x60016009905080");
    }

    #[test]
    fn plain_swap_permutes_identities() {
        let mut ctx = RuntimeContext::new();
        let owner = push_literal(&mut ctx, 1);
        let setter = ctx.make_action("swapper", Span::default(), SourceLoc::default());
        ctx.action_mut(setter).push_hex(Hexable::Op(OpCode::PUSH1));
        ctx.action_mut(setter).push_hex(Hexable::Literal(U256::from(9u32)));
        ctx.action_mut(setter).push_hex(Hexable::StackRef {
            owner,
            slot: 0,
            kind: StackRefKind::Swap,
        });
        ctx.action_mut(setter).push_hex(Hexable::Op(OpCode::POP));
        ctx.push_action(setter);
        // The swap moved the owner's slot to the top and the POP consumed it.
        ref_action(&mut ctx, "dup", owner, 0, StackRefKind::Dup);
        assert!(matches!(
            compile(&ctx, &no_labels()),
            Err(ProcessError::SlotGone { .. })
        ));
    }

    #[test]
    fn dup_opcode_duplicates_identity() {
        // DUP1 then POP must leave the original slot reachable: the popped
        // copy and the survivor share one identity.
        let mut ctx = RuntimeContext::new();
        let owner = push_literal(&mut ctx, 7);
        let duplicate = ctx.make_action("dup1", Span::default(), SourceLoc::default());
        ctx.action_mut(duplicate).push_hex(Hexable::Op(OpCode::DUP1));
        ctx.action_mut(duplicate).push_hex(Hexable::Op(OpCode::POP));
        ctx.push_action(duplicate);
        ref_action(&mut ctx, "dup", owner, 0, StackRefKind::Dup);
        assert_eq!(compile(&ctx, &no_labels()).unwrap(), "0x6007805080");
    }

    #[test]
    fn child_actions_inline_at_their_position() {
        let mut ctx = RuntimeContext::new();
        let parent = ctx.make_action("outer", Span::default(), SourceLoc::default());
        let child = ctx.make_action("inner", Span::default(), SourceLoc::default());
        ctx.action_mut(child).push_hex(Hexable::Op(OpCode::CALLVALUE));
        ctx.push_action(child);
        ctx.action_mut(child).parent = Some(parent);
        ctx.action_mut(parent).push_hex(Hexable::Op(OpCode::ISZERO));
        ctx.action_mut(parent).items.insert(
            0,
            Item::Child(child),
        );
        ctx.push_action(parent);
        assert_eq!(compile(&ctx, &no_labels()).unwrap(), "0x3415");
    }

    #[test]
    fn tail_actions_emit_last() {
        let mut ctx = RuntimeContext::new();
        let blob = ctx.make_action("blob", Span::default(), SourceLoc::default());
        ctx.action_mut(blob).push_hex(Hexable::Raw(vec![0xDE, 0xAD]));
        ctx.action_mut(blob).tail = true;
        ctx.push_action(blob);
        push_literal(&mut ctx, 1);
        let processed = process(&ctx).unwrap();
        assert_eq!(processed.offsets[&blob], 2);
        assert_eq!(emit(&ctx, &processed, &no_labels()).unwrap(), "0x6001DEAD");
    }
}
