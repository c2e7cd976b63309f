//! Memory materialisation and calldata decoding helpers.

use opscript_ir::{push_op, ActionId, Hexable, OpCode, StackRefKind, U256};
use smol_str::SmolStr;

use super::{arity, synth_push, to_hexable, CallCtx};
use crate::error::Error;
use crate::value::Value;

fn opt_bool(cc: &CallCtx<'_>, v: Option<&Value>, default: bool) -> Result<bool, Error> {
    match v {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(cc.input(format!("{} passed where a boolean is required", other.kind()))),
    }
}

/// Stores `data` at the memory frontier, one 32-byte word at a time; a
/// trailing partial word is shifted into place so its push carries no
/// padding bytes. Leaves `[memOffset, byteLen]` when `push_offsets`.
pub(super) fn emit_alloc(
    cc: &mut CallCtx<'_>,
    id: ActionId,
    data: Hexable,
    push_offsets: bool,
) -> Result<(), Error> {
    let len = data.byte_length();
    if push_offsets {
        synth_push(cc, id, Hexable::Literal(U256::from(len)))?;
        cc.emit_op(id, OpCode::MSIZE);
    }

    let words = len / 32;
    let rem = len % 32;
    for word in 0..words {
        cc.emit_op(id, OpCode::PUSH32);
        cc.emit(
            id,
            Hexable::WordRange {
                inner: Box::new(data.clone()),
                start: word,
                len: 1,
            },
        );
        cc.emit_op(id, OpCode::MSIZE);
        cc.emit_op(id, OpCode::MSTORE);
    }
    if rem > 0 {
        cc.emit_op(id, push_op(rem));
        cc.emit(
            id,
            Hexable::ByteRange {
                inner: Box::new(data.clone()),
                start: 32 * words,
                len: rem,
            },
        );
        synth_push(cc, id, Hexable::Literal(U256::from(8 * (32 - rem))))?;
        cc.emit_op(id, OpCode::SHL);
        cc.emit_op(id, OpCode::MSIZE);
        cc.emit_op(id, OpCode::MSTORE);
    }
    Ok(())
}

pub(super) fn alloc(cc: &mut CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 1, 2)?;
    let data = to_hexable(cc, &args[0])?;
    let push_offsets = opt_bool(cc, args.get(1), true)?;
    let id = cc.begin();
    emit_alloc(cc, id, data, push_offsets)?;
    Ok(cc.finish(id))
}

/// CODECOPYs the data out of the bytecode itself: the blob is deferred to a
/// tail Action so it lands after all executable code.
pub(super) fn alloc_unsafe(cc: &mut CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 1, 1)?;
    let data = to_hexable(cc, &args[0])?;
    let len = data.byte_length();

    let id = cc.begin();
    let blob = cc.ctx.make_action(cc.name.clone(), cc.span, cc.loc);
    cc.ctx.action_mut(blob).push_hex(data);
    cc.ctx.action_mut(blob).tail = true;
    cc.ctx.push_action(blob);

    synth_push(cc, id, Hexable::Literal(U256::from(len)))?;
    cc.emit_op(id, OpCode::MSIZE);
    cc.emit_op(id, OpCode::DUP2);
    cc.emit_op(id, OpCode::PUSH2);
    cc.emit(id, Hexable::ActionPointer(blob));
    cc.emit_op(id, OpCode::DUP3);
    cc.emit_op(id, OpCode::CODECOPY);
    Ok(cc.finish(id))
}

/// `[PUSH len, DUP1, MSIZE, SUB]`: the base of what was just stored.
fn emit_offsets_postlude(cc: &mut CallCtx<'_>, id: ActionId, len: usize) -> Result<(), Error> {
    synth_push(cc, id, Hexable::Literal(U256::from(len)))?;
    cc.emit_op(id, OpCode::DUP1);
    cc.emit_op(id, OpCode::MSIZE);
    cc.emit_op(id, OpCode::SUB);
    Ok(())
}

pub(super) fn alloc_stack(cc: &mut CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 1, 2)?;
    let push_offsets = opt_bool(cc, args.get(1), true)?;
    match &args[0] {
        Value::Int(n) => {
            if *n > U256::from(1024u32) {
                return Err(cc.input("cannot consume more than 1024 stack items"));
            }
            let n = n.low_u64() as usize;
            let id = cc.begin();
            for _ in 0..n {
                cc.emit_op(id, OpCode::MSIZE);
                cc.emit_op(id, OpCode::MSTORE);
            }
            if push_offsets {
                emit_offsets_postlude(cc, id, 32 * n)?;
            }
            Ok(cc.finish(id))
        }
        Value::StackRef(slot) => {
            let slot = *slot;
            let id = cc.begin();
            cc.emit(
                id,
                Hexable::StackRef {
                    owner: slot.owner,
                    slot: slot.slot,
                    kind: StackRefKind::Dup,
                },
            );
            cc.emit_op(id, OpCode::MSIZE);
            cc.emit_op(id, OpCode::MSTORE);
            if push_offsets {
                emit_offsets_postlude(cc, id, 32)?;
            }
            Ok(cc.finish(id))
        }
        other => Err(cc.input(format!(
            "{} passed where a count or stack reference is required",
            other.kind()
        ))),
    }
}

pub(super) fn calldataload(cc: &mut CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 0, 2)?;
    let id = cc.begin();
    if let Some(offset) = args.first() {
        let h = to_hexable(cc, offset)?;
        synth_push(cc, id, h)?;
    }
    cc.emit_op(id, OpCode::CALLDATALOAD);

    let len = match args.get(1) {
        None => 32usize,
        Some(Value::Int(n)) if !n.is_zero() && *n <= U256::from(32u32) => n.low_u64() as usize,
        Some(_) => return Err(cc.input("load width must be between 1 and 32 bytes")),
    };
    if len < 32 {
        synth_push(cc, id, Hexable::Literal(U256::from(8 * (32 - len))))?;
        cc.emit_op(id, OpCode::SHR);
    }
    Ok(cc.finish(id))
}

fn is_dynamic(ty: &str) -> bool {
    matches!(ty, "bytes" | "string")
}

/// The ABI-decoding prologue. The head cursor lives on top of the stack
/// while types are walked; static types leave their word below it, dynamic
/// types leave `[length, dataStart]`.
pub(super) fn calldata_offsets(
    cc: &mut CallCtx<'_>,
    args: &[Value],
    reverse: bool,
) -> Result<Value, Error> {
    if args.is_empty() {
        return Err(cc.input("expected at least one argument type"));
    }
    let mut types = Vec::with_capacity(args.len());
    for v in args {
        match v {
            Value::Str(s) => types.push(SmolStr::new(s.trim())),
            other => {
                return Err(cc.input(format!("{} passed where a type name is required", other.kind())))
            }
        }
    }

    let n = types.len();
    // Forward walks the head slots from the back so the first argument is
    // pushed last and ends up on top; reverse does the opposite.
    let seed = if reverse { 4 } else { 4 + 32 * (n - 1) };
    let order: Vec<usize> = if reverse {
        (0..n).collect()
    } else {
        (0..n).rev().collect()
    };

    let id = cc.begin();
    synth_push(cc, id, Hexable::Literal(U256::from(seed)))?;
    for (done, i) in order.into_iter().enumerate() {
        if is_dynamic(&types[i]) {
            // head word is a pointer: chase it to the length word, then to
            // the start of the data.
            cc.emit_op(id, OpCode::DUP1);
            cc.emit_op(id, OpCode::CALLDATALOAD);
            cc.emit_op(id, OpCode::PUSH1);
            cc.emit(id, Hexable::Literal(U256::from(0x04u32)));
            cc.emit_op(id, OpCode::ADD);
            cc.emit_op(id, OpCode::DUP1);
            cc.emit_op(id, OpCode::CALLDATALOAD);
            cc.emit_op(id, OpCode::SWAP1);
            cc.emit_op(id, OpCode::PUSH1);
            cc.emit(id, Hexable::Literal(U256::from(0x20u32)));
            cc.emit_op(id, OpCode::ADD);
            cc.emit_op(id, OpCode::SWAP2);
        } else {
            cc.emit_op(id, OpCode::DUP1);
            cc.emit_op(id, OpCode::CALLDATALOAD);
            cc.emit_op(id, OpCode::SWAP1);
        }

        if done + 1 < n {
            cc.emit_op(id, OpCode::PUSH1);
            cc.emit(id, Hexable::Literal(U256::from(0x20u32)));
            if reverse {
                cc.emit_op(id, OpCode::ADD);
            } else {
                cc.emit_op(id, OpCode::SWAP1);
                cc.emit_op(id, OpCode::SUB);
            }
        }
    }
    cc.emit_op(id, OpCode::POP);
    Ok(cc.finish(id))
}
