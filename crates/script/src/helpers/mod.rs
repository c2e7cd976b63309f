//! The helper catalogue: every primitive a script can call.

mod expr;
mod mem;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use opscript_ir::{
    push_op, ActionId, ActionPointer, Hexable, Item, OpCode, RuntimeContext, SourceLoc, Span,
    StackRefKind, U256,
};

use crate::error::Error;
use crate::selector::selector;
use crate::value::Value;

/// What a registered helper name resolves to.
pub(crate) enum HelperKind {
    Push,
    PushN(usize),
    Alloc,
    AllocUnsafe,
    AllocStack,
    CallDataOffsets { reverse: bool },
    CallDataLoad,
    Jump { conditional: bool },
    Dispatch,
    Revert,
    AssertNonPayable,
    Assert,
    Bail,
    Set,
    Dup,
    /// Auto-registered default helper: arguments lowered, then the opcode.
    Op(OpCode),
    // Expression helpers; these build values and emit no IR.
    Ptr,
    Concat,
    JumpMap,
    ByteLen,
    HexText,
    Pad,
    Config,
}

/// Builds the full name table: a default helper per opcode (lowercase
/// mnemonic, `return` becomes `ret`), then the hand-written catalogue on
/// top.
pub(crate) fn registry() -> FxHashMap<SmolStr, HelperKind> {
    let mut map = FxHashMap::default();
    for op in OpCode::ALL {
        let name = match *op {
            OpCode::RETURN => SmolStr::new("ret"),
            other => SmolStr::new(other.mnemonic().to_ascii_lowercase()),
        };
        map.insert(name, HelperKind::Op(*op));
    }

    map.insert(SmolStr::new("push"), HelperKind::Push);
    for n in 1..=32usize {
        map.insert(SmolStr::new(format!("push{n}")), HelperKind::PushN(n));
    }
    map.insert(SmolStr::new("alloc"), HelperKind::Alloc);
    map.insert(SmolStr::new("allocUnsafe"), HelperKind::AllocUnsafe);
    map.insert(SmolStr::new("allocStack"), HelperKind::AllocStack);
    map.insert(
        SmolStr::new("pushCallDataOffsets"),
        HelperKind::CallDataOffsets { reverse: false },
    );
    map.insert(
        SmolStr::new("pushCallDataOffsetsReverse"),
        HelperKind::CallDataOffsets { reverse: true },
    );
    map.insert(SmolStr::new("calldataload"), HelperKind::CallDataLoad);
    map.insert(SmolStr::new("jump"), HelperKind::Jump { conditional: false });
    map.insert(SmolStr::new("jumpi"), HelperKind::Jump { conditional: true });
    map.insert(SmolStr::new("dispatch"), HelperKind::Dispatch);
    map.insert(SmolStr::new("revert"), HelperKind::Revert);
    map.insert(SmolStr::new("assertNonPayable"), HelperKind::AssertNonPayable);
    map.insert(SmolStr::new("assert"), HelperKind::Assert);
    map.insert(SmolStr::new("bail"), HelperKind::Bail);
    map.insert(SmolStr::new("set"), HelperKind::Set);
    map.insert(SmolStr::new("dup"), HelperKind::Dup);

    map.insert(SmolStr::new("$ptr"), HelperKind::Ptr);
    map.insert(SmolStr::new("$concat"), HelperKind::Concat);
    map.insert(SmolStr::new("$jumpmap"), HelperKind::JumpMap);
    map.insert(SmolStr::new("$bytelen"), HelperKind::ByteLen);
    map.insert(SmolStr::new("$hex"), HelperKind::HexText);
    map.insert(SmolStr::new("$pad"), HelperKind::Pad);
    map.insert(SmolStr::new("$"), HelperKind::Config);
    map
}

/// One helper invocation: the runtime context plus the call site.
pub(crate) struct CallCtx<'a> {
    pub ctx: &'a mut RuntimeContext,
    pub name: SmolStr,
    pub span: Span,
    pub loc: SourceLoc,
}

impl CallCtx<'_> {
    fn input(&self, msg: impl Into<String>) -> Error {
        Error::InputValidation {
            helper: self.name.clone(),
            msg: msg.into(),
            span: self.span,
            loc: self.loc,
        }
    }

    fn compose_err(&self, msg: impl Into<String>) -> Error {
        Error::Composition {
            helper: self.name.clone(),
            msg: msg.into(),
            span: self.span,
            loc: self.loc,
        }
    }

    fn begin(&mut self) -> ActionId {
        self.ctx.make_action(self.name.clone(), self.span, self.loc)
    }

    fn finish(&mut self, id: ActionId) -> Value {
        self.ctx.push_action(id);
        Value::Action(ActionPointer(id))
    }

    fn emit(&mut self, id: ActionId, hexable: Hexable) {
        self.ctx.action_mut(id).push_hex(hexable);
    }

    fn emit_op(&mut self, id: ActionId, op: OpCode) {
        self.emit(id, Hexable::Op(op));
    }
}

pub(crate) fn call(
    registry: &FxHashMap<SmolStr, HelperKind>,
    ctx: &mut RuntimeContext,
    name: &SmolStr,
    args: Vec<Value>,
    span: Span,
    loc: SourceLoc,
) -> Result<Value, Error> {
    let Some(kind) = registry.get(name) else {
        return Err(Error::UnknownHelper {
            name: name.clone(),
            span,
            loc,
        });
    };
    let mut cc = CallCtx {
        ctx,
        name: name.clone(),
        span,
        loc,
    };
    match kind {
        HelperKind::Push => push(&mut cc, &args),
        HelperKind::PushN(n) => push_n(&mut cc, *n, &args),
        HelperKind::Alloc => mem::alloc(&mut cc, &args),
        HelperKind::AllocUnsafe => mem::alloc_unsafe(&mut cc, &args),
        HelperKind::AllocStack => mem::alloc_stack(&mut cc, &args),
        HelperKind::CallDataOffsets { reverse } => mem::calldata_offsets(&mut cc, &args, *reverse),
        HelperKind::CallDataLoad => mem::calldataload(&mut cc, &args),
        HelperKind::Jump { conditional } => jump(&mut cc, *conditional, &args),
        HelperKind::Dispatch => dispatch(&mut cc, &args),
        HelperKind::Revert => revert(&mut cc, &args),
        HelperKind::AssertNonPayable => assert_non_payable(&mut cc, &args),
        HelperKind::Assert => assert_cond(&mut cc, &args),
        HelperKind::Bail => bail(&mut cc, &args),
        HelperKind::Set => set(&mut cc, &args),
        HelperKind::Dup => dup(&mut cc, &args),
        HelperKind::Op(op) => default_op(&mut cc, *op, &args),
        HelperKind::Ptr => expr::ptr(&cc, &args),
        HelperKind::Concat => expr::concat(&cc, &args),
        HelperKind::JumpMap => expr::jumpmap(&cc, &args),
        HelperKind::ByteLen => expr::bytelen(&cc, &args),
        HelperKind::HexText => expr::hex_text(&cc, &args),
        HelperKind::Pad => expr::pad(&cc, &args),
        HelperKind::Config => expr::config(&mut cc, &args),
    }
}

fn arity(cc: &CallCtx<'_>, args: &[Value], min: usize, max: usize) -> Result<(), Error> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(cc.input(format!(
            "expected {expected} argument(s) but received {}",
            args.len()
        )));
    }
    Ok(())
}

/// `"0xABCD"` (optionally odd-length) -> bytes. `None` when the string is
/// not a hex literal at all.
pub(crate) fn parse_hex_literal(s: &str) -> Option<Vec<u8>> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    };
    hex::decode(padded).ok()
}

/// Converts a script value into raw IR data. Action results and stack
/// references are rejected: they are code, not data.
fn to_hexable(cc: &CallCtx<'_>, v: &Value) -> Result<Hexable, Error> {
    match v {
        Value::Int(n) => Ok(Hexable::Literal(*n)),
        Value::Str(s) => parse_hex_literal(s).map(Hexable::Raw).ok_or_else(|| {
            cc.input("string passed where only a hex literal is allowed; use $hex() for text")
        }),
        Value::Hex(h) => Ok(h.clone()),
        Value::Action(_) => {
            Err(cc.compose_err("an action result cannot be used where raw data is required"))
        }
        Value::StackRef(_) => {
            Err(cc.input("a stack reference cannot be used where raw data is required"))
        }
        other => Err(cc.input(format!("{} cannot be used as a value here", other.kind()))),
    }
}

/// PUSHn chosen by byte length, data following.
fn synth_push(cc: &mut CallCtx<'_>, id: ActionId, h: Hexable) -> Result<(), Error> {
    let n = h.byte_length();
    if n == 0 {
        return Err(cc.input("cannot push an empty value"));
    }
    if n > 32 {
        return Err(cc.input("cannot accept values larger than 32 bytes"));
    }
    cc.emit_op(id, push_op(n));
    cc.emit(id, h);
    Ok(())
}

/// The composition rule: an Action authored inline (its span starts at or
/// after this call's span) is adopted and inlined; one authored earlier in
/// the text is a label and becomes a 2-byte pointer push.
fn compose(cc: &mut CallCtx<'_>, parent: ActionId, ptr: ActionPointer) -> Result<(), Error> {
    let child = ptr.action();
    if cc.ctx.action(child).span >= cc.span {
        if cc.ctx.action(child).parent.is_some() {
            return Err(cc.compose_err("the action result is already owned by another helper"));
        }
        cc.ctx.action_mut(child).parent = Some(parent);
        cc.ctx.action_mut(parent).items.push(Item::Child(child));
    } else {
        cc.emit_op(parent, OpCode::PUSH2);
        cc.emit(parent, Hexable::ActionPointer(child));
    }
    Ok(())
}

/// Lowers one helper argument into `id`'s item list: Actions via the
/// composition rule, stack references as `kind`, everything else as a
/// synthesised push.
fn lower_arg(
    cc: &mut CallCtx<'_>,
    id: ActionId,
    v: &Value,
    kind: StackRefKind,
) -> Result<(), Error> {
    match v {
        Value::Action(ptr) => compose(cc, id, *ptr),
        Value::StackRef(slot) => {
            cc.emit(
                id,
                Hexable::StackRef {
                    owner: slot.owner,
                    slot: slot.slot,
                    kind,
                },
            );
            Ok(())
        }
        other => {
            let h = to_hexable(cc, other)?;
            synth_push(cc, id, h)
        }
    }
}

fn push(cc: &mut CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 1, 1)?;
    let h = to_hexable(cc, &args[0])?;

    let id = cc.begin();
    let len = h.byte_length();
    if matches!(h, Hexable::JumpMap(_)) && len > 32 {
        // Wide jump maps are pushed one 32-byte word at a time.
        for word in 0..len / 32 {
            cc.emit_op(id, OpCode::PUSH32);
            cc.emit(
                id,
                Hexable::WordRange {
                    inner: Box::new(h.clone()),
                    start: word,
                    len: 1,
                },
            );
        }
    } else {
        synth_push(cc, id, h)?;
    }
    Ok(cc.finish(id))
}

fn push_n(cc: &mut CallCtx<'_>, n: usize, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 1, 1)?;
    let h = to_hexable(cc, &args[0])?;
    let actual = h.byte_length();
    if actual != n {
        return Err(Error::PushWidth {
            helper: cc.name.clone(),
            expected: n,
            actual,
            span: cc.span,
            loc: cc.loc,
        });
    }
    let id = cc.begin();
    cc.emit_op(id, push_op(n));
    cc.emit(id, h);
    Ok(cc.finish(id))
}

fn jump(cc: &mut CallCtx<'_>, conditional: bool, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 0, 1)?;
    let id = cc.begin();
    if let Some(target) = args.first() {
        match target {
            Value::Action(ptr) => compose(cc, id, *ptr)?,
            Value::Hex(h @ (Hexable::LabelPointer(_) | Hexable::ActionPointer(_))) => {
                synth_push(cc, id, h.clone())?;
            }
            Value::StackRef(slot) => {
                cc.emit(
                    id,
                    Hexable::StackRef {
                        owner: slot.owner,
                        slot: slot.slot,
                        kind: StackRefKind::Dup,
                    },
                );
            }
            other => {
                return Err(cc.input(format!("{} passed where a jump label is required", other.kind())))
            }
        }
    }
    cc.emit_op(id, if conditional { OpCode::JUMPI } else { OpCode::JUMP });
    Ok(cc.finish(id))
}

fn dispatch(cc: &mut CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 1, 1)?;
    let Value::Map(entries) = &args[0] else {
        return Err(cc.input("expected an object mapping signatures to pointers"));
    };

    let id = cc.begin();
    for (sig, target) in entries {
        let sel = selector(sig).map_err(|msg| cc.input(msg))?;

        // calldataload(0, 4)
        cc.emit_op(id, OpCode::PUSH1);
        cc.emit(id, Hexable::Literal(U256::zero()));
        cc.emit_op(id, OpCode::CALLDATALOAD);
        cc.emit_op(id, OpCode::PUSH1);
        cc.emit(id, Hexable::Literal(U256::from(0xE0u32)));
        cc.emit_op(id, OpCode::SHR);

        cc.emit_op(id, OpCode::PUSH4);
        cc.emit(id, Hexable::Raw(sel.to_vec()));
        cc.emit_op(id, OpCode::EQ);

        let pointer = match target {
            Value::Hex(h @ (Hexable::LabelPointer(_) | Hexable::ActionPointer(_))) => h.clone(),
            Value::Action(ptr) => Hexable::ActionPointer(ptr.action()),
            other => {
                return Err(cc.input(format!(
                    "{} passed where a dispatch target pointer is required",
                    other.kind()
                )))
            }
        };
        cc.emit_op(id, OpCode::PUSH2);
        cc.emit(id, pointer);
        cc.emit_op(id, OpCode::JUMPI);
    }
    Ok(cc.finish(id))
}

/// The ABI error payload of `revert(reason)`: `Error(string)` selector,
/// data offset, then the length-prefixed reason.
fn revert_payload(cc: &CallCtx<'_>, reason: &Value) -> Result<Hexable, Error> {
    let reason = to_hexable(cc, reason)?;
    Ok(Hexable::Concat(vec![
        Hexable::Raw(vec![0x08, 0xC3, 0x79, 0xA0]),
        Hexable::Padded {
            inner: Box::new(Hexable::Literal(U256::from(0x20u32))),
            len: 32,
            side: opscript_ir::PadSide::Left,
        },
        Hexable::SolidityString(Box::new(reason)),
    ]))
}

fn revert(cc: &mut CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 0, 1)?;
    let id = cc.begin();
    if let Some(reason) = args.first() {
        let payload = revert_payload(cc, reason)?;
        mem::emit_alloc(cc, id, payload, true)?;
    }
    cc.emit_op(id, OpCode::REVERT);
    Ok(cc.finish(id))
}

fn emit_bail(cc: &mut CallCtx<'_>, id: ActionId) {
    cc.emit_op(id, OpCode::PUSH1);
    cc.emit(id, Hexable::Literal(U256::zero()));
    cc.emit_op(id, OpCode::DUP1);
    cc.emit_op(id, OpCode::REVERT);
}

fn bail(cc: &mut CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 0, 0)?;
    let id = cc.begin();
    emit_bail(cc, id);
    Ok(cc.finish(id))
}

/// An empty jump-destination Action adopted as a child: the landing site
/// that skips over an inline revert.
fn skip_destination(cc: &mut CallCtx<'_>, parent: ActionId) -> ActionId {
    let skip = cc.ctx.make_action(cc.name.clone(), cc.span, cc.loc);
    cc.ctx.action_mut(skip).is_jump_destination = true;
    cc.ctx.action_mut(skip).parent = Some(parent);
    cc.ctx.push_action(skip);
    skip
}

fn emit_guarded_revert(
    cc: &mut CallCtx<'_>,
    id: ActionId,
    reason: Option<&Value>,
) -> Result<(), Error> {
    let skip = skip_destination(cc, id);
    cc.emit_op(id, OpCode::PUSH2);
    cc.emit(id, Hexable::ActionPointer(skip));
    cc.emit_op(id, OpCode::JUMPI);
    match reason {
        Some(reason) => {
            let payload = revert_payload(cc, reason)?;
            mem::emit_alloc(cc, id, payload, true)?;
            cc.emit_op(id, OpCode::REVERT);
        }
        None => emit_bail(cc, id),
    }
    cc.ctx.action_mut(id).items.push(Item::Child(skip));
    Ok(())
}

fn assert_non_payable(cc: &mut CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 0, 1)?;
    let id = cc.begin();
    cc.emit_op(id, OpCode::CALLVALUE);
    cc.emit_op(id, OpCode::ISZERO);
    emit_guarded_revert(cc, id, args.first())?;
    Ok(cc.finish(id))
}

fn assert_cond(cc: &mut CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 1, 2)?;
    let id = cc.begin();
    // The condition: a stack reference is duplicated, an inline action is
    // adopted and emitted exactly once.
    lower_arg(cc, id, &args[0], StackRefKind::Dup)?;
    emit_guarded_revert(cc, id, args.get(1))?;
    Ok(cc.finish(id))
}

fn set(cc: &mut CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 1, 2)?;
    let Value::StackRef(slot) = &args[0] else {
        return Err(cc.input("expected a stack reference to write into"));
    };
    let slot = *slot;
    let id = cc.begin();
    if let Some(v) = args.get(1) {
        lower_arg(cc, id, v, StackRefKind::Dup)?;
    }
    cc.emit(
        id,
        Hexable::StackRef {
            owner: slot.owner,
            slot: slot.slot,
            kind: StackRefKind::HotSwap,
        },
    );
    cc.emit_op(id, OpCode::POP);
    Ok(cc.finish(id))
}

fn dup(cc: &mut CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 1, 1)?;
    match &args[0] {
        Value::Int(n) => {
            if n.is_zero() || *n > U256::from(16u32) {
                return Err(cc.input("DUP index must be between 1 and 16"));
            }
            let id = cc.begin();
            cc.emit_op(id, opscript_ir::dup_op(n.low_u64() as usize));
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
            Ok(cc.finish(id))
        }
        other => Err(cc.input(format!(
            "{} passed where a stack reference or DUP index is required",
            other.kind()
        ))),
    }
}

fn default_op(cc: &mut CallCtx<'_>, op: OpCode, args: &[Value]) -> Result<Value, Error> {
    let id = cc.begin();
    // Last argument lands lowest on the stack.
    for v in args.iter().rev() {
        lower_arg(cc, id, v, StackRefKind::Dup)?;
    }
    cc.emit_op(id, op);
    Ok(cc.finish(id))
}
