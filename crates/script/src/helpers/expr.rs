//! Expression helpers: pure value construction, no IR emission.

use smol_str::SmolStr;

use opscript_ir::{Hexable, PadSide, U256};

use super::{arity, to_hexable, CallCtx};
use crate::error::Error;
use crate::value::Value;

fn str_arg<'a>(cc: &CallCtx<'_>, v: &'a Value) -> Result<&'a SmolStr, Error> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(cc.input(format!("{} passed where a string is required", other.kind()))),
    }
}

pub(super) fn ptr(cc: &CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 1, 1)?;
    let name = str_arg(cc, &args[0])?;
    Ok(Value::Hex(Hexable::LabelPointer(name.clone())))
}

pub(super) fn concat(cc: &CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    let mut parts = Vec::with_capacity(args.len());
    for v in args {
        parts.push(to_hexable(cc, v)?);
    }
    Ok(Value::Hex(Hexable::Concat(parts)))
}

pub(super) fn jumpmap(cc: &CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    let mut labels = Vec::with_capacity(args.len());
    for v in args {
        labels.push(str_arg(cc, v)?.clone());
    }
    Ok(Value::Hex(Hexable::JumpMap(labels)))
}

pub(super) fn bytelen(cc: &CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 1, 1)?;
    let h = to_hexable(cc, &args[0])?;
    Ok(Value::Int(U256::from(h.byte_length())))
}

/// Text to its big-endian utf-8 integer: `$hex("abc")` is `0x616263`.
pub(super) fn hex_text(cc: &CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 1, 1)?;
    let text = str_arg(cc, &args[0])?;
    let bytes = text.as_bytes();
    if bytes.len() > 32 {
        return Err(cc.input("cannot accept values larger than 32 bytes"));
    }
    Ok(Value::Int(U256::from_big_endian(bytes)))
}

pub(super) fn pad(cc: &CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 2, 3)?;
    let inner = to_hexable(cc, &args[0])?;
    let len = match &args[1] {
        Value::Int(n) if !n.is_zero() && *n <= U256::from(1024u32) => n.low_u64() as usize,
        _ => return Err(cc.input("pad width must be between 1 and 1024 bytes")),
    };
    let side = match args.get(2) {
        None => PadSide::Left,
        Some(v) => match str_arg(cc, v)?.as_str() {
            "left" => PadSide::Left,
            "right" => PadSide::Right,
            other => return Err(cc.input(format!("unknown pad side `{other}`"))),
        },
    };
    Ok(Value::Hex(Hexable::Padded {
        inner: Box::new(inner),
        len,
        side,
    }))
}

/// `$(key, value)`: the only helper that writes runtime-context config.
pub(super) fn config(cc: &mut CallCtx<'_>, args: &[Value]) -> Result<Value, Error> {
    arity(cc, args, 2, 2)?;
    let key = str_arg(cc, &args[0])?.clone();
    match key.as_str() {
        "deployable" => match &args[1] {
            Value::Bool(b) => cc.ctx.config.deployable = *b,
            other => {
                return Err(cc.input(format!(
                    "{} passed where a boolean is required for `deployable`",
                    other.kind()
                )))
            }
        },
        other => return Err(cc.input(format!("unrecognised config key `{other}`"))),
    }
    Ok(Value::Unit)
}
