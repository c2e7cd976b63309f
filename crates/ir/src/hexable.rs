//! The IR value tree: everything that knows how to render itself as hex.

use cranelift_entity::PrimaryMap;
use primitive_types::U256;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{
    action::{Action, ActionId},
    error::EmitError,
    opcode::OpCode,
};

/// How a stack reference is lowered by the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackRefKind {
    /// DUP the referenced slot to the top (the default lowering).
    Dup,
    /// SWAP the top with the referenced slot.
    Swap,
    /// SWAP without permuting the tracked references; the slot's runtime
    /// value changes but its identity does not (`set`).
    HotSwap,
}

/// Zero-padding side for [`Hexable::Padded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadSide {
    Left,
    Right,
}

/// A value with a byte length and a hex rendering.
///
/// `byte_length` is pure and cheap; the offset pass calls it repeatedly.
/// `write_hex` is only valid once the processor has lowered every
/// `StackRef` to an opcode.
#[derive(Debug, Clone)]
pub enum Hexable {
    /// An integer, encoded as its minimal big-endian bytes (zero is one
    /// `0x00` byte).
    Literal(U256),
    /// A byte sequence taken verbatim from the script (hex-string literal or
    /// the deployer's `CODE` blob). Unlike `Literal` it keeps leading zeros
    /// and may exceed 32 bytes.
    Raw(Vec<u8>),
    Op(OpCode),
    Concat(Vec<Hexable>),
    /// `len` bytes of `inner` starting at `start`; reads past the end
    /// produce `0x00`.
    ByteRange {
        inner: Box<Hexable>,
        start: usize,
        len: usize,
    },
    /// `ByteRange` at 32-byte granularity.
    WordRange {
        inner: Box<Hexable>,
        start: usize,
        len: usize,
    },
    /// `inner` zero-padded up to the next multiple of `len` bytes.
    Padded {
        inner: Box<Hexable>,
        len: usize,
        side: PadSide,
    },
    /// 32-byte big-endian length prefix, then `inner` right-padded to a
    /// multiple of 32 bytes.
    SolidityString(Box<Hexable>),
    /// Concatenated 2-byte label offsets, right-padded to a multiple of 32.
    JumpMap(Vec<SmolStr>),
    /// Deferred reference to a named binding; resolved at emission.
    LabelPointer(SmolStr),
    /// 2-byte big-endian byte offset of an Action.
    ActionPointer(ActionId),
    /// Placeholder lowered to DUPn/SWAPn by the processor.
    StackRef {
        owner: ActionId,
        slot: u8,
        kind: StackRefKind,
    },
}

/// Name and offset tables available during emission.
pub struct ResolveEnv<'a> {
    pub actions: &'a PrimaryMap<ActionId, Action>,
    pub labels: &'a FxHashMap<SmolStr, ActionId>,
    pub offsets: &'a FxHashMap<ActionId, u32>,
}

impl ResolveEnv<'_> {
    fn pointer_offset(&self, id: ActionId) -> Result<u32, EmitError> {
        let name = || self.actions[id].name.clone();
        let offset = *self
            .offsets
            .get(&id)
            .ok_or_else(|| EmitError::MissingOffset(name()))?;
        if offset >= 1 << 16 {
            return Err(EmitError::PointerOverflow {
                name: name(),
                offset,
            });
        }
        Ok(offset)
    }

    fn label_offset(&self, label: &SmolStr) -> Result<u32, EmitError> {
        let id = self
            .labels
            .get(label)
            .copied()
            .ok_or_else(|| EmitError::UnresolvedLabel(label.clone()))?;
        self.pointer_offset(id)
    }
}

pub(crate) fn round_up(n: usize, to: usize) -> usize {
    debug_assert!(to > 0);
    n.div_ceil(to) * to
}

/// Minimal big-endian encoding of `v`, at least one byte.
pub fn minimal_be_bytes(v: &U256) -> SmallVec<[u8; 32]> {
    let be = v.to_big_endian();
    let skip = be.iter().take_while(|b| **b == 0).count().min(31);
    SmallVec::from_slice(&be[skip..])
}

impl Hexable {
    pub fn byte_length(&self) -> usize {
        match self {
            Self::Literal(v) => (v.bits().div_ceil(8)).max(1),
            Self::Raw(bytes) => bytes.len(),
            Self::Op(_) => 1,
            Self::Concat(parts) => parts.iter().map(Self::byte_length).sum(),
            Self::ByteRange { len, .. } => *len,
            Self::WordRange { len, .. } => 32 * len,
            Self::Padded { inner, len, .. } => round_up(inner.byte_length(), *len),
            Self::SolidityString(inner) => 32 + round_up(inner.byte_length(), 32),
            Self::JumpMap(labels) => round_up(2 * labels.len(), 32),
            Self::LabelPointer(_) | Self::ActionPointer(_) => 2,
            // Lowered to exactly one DUPn/SWAPn byte.
            Self::StackRef { .. } => 1,
        }
    }

    /// Appends `2 * byte_length()` uppercase hex digits to `out`.
    pub fn write_hex(&self, out: &mut String, env: &ResolveEnv<'_>) -> Result<(), EmitError> {
        match self {
            Self::Literal(v) => push_bytes_hex(out, &minimal_be_bytes(v)),
            Self::Raw(bytes) => push_bytes_hex(out, bytes),
            Self::Op(op) => push_byte_hex(out, op.byte()),
            Self::Concat(parts) => {
                for part in parts {
                    part.write_hex(out, env)?;
                }
            }
            Self::ByteRange { inner, start, len } => {
                write_range(out, env, inner, *start, *len)?;
            }
            Self::WordRange { inner, start, len } => {
                write_range(out, env, inner, 32 * start, 32 * len)?;
            }
            Self::Padded { inner, len, side } => {
                let pad = 2 * (round_up(inner.byte_length(), *len) - inner.byte_length());
                match side {
                    PadSide::Left => {
                        push_zeros(out, pad);
                        inner.write_hex(out, env)?;
                    }
                    PadSide::Right => {
                        inner.write_hex(out, env)?;
                        push_zeros(out, pad);
                    }
                }
            }
            Self::SolidityString(inner) => {
                let len = inner.byte_length();
                out.push_str(&format!("{len:064X}"));
                inner.write_hex(out, env)?;
                push_zeros(out, 2 * (round_up(len, 32) - len));
            }
            Self::JumpMap(labels) => {
                for label in labels {
                    let offset = env.label_offset(label)?;
                    out.push_str(&format!("{offset:04X}"));
                }
                push_zeros(out, 2 * (round_up(2 * labels.len(), 32) - 2 * labels.len()));
            }
            Self::LabelPointer(label) => {
                let offset = env.label_offset(label)?;
                out.push_str(&format!("{offset:04X}"));
            }
            Self::ActionPointer(id) => {
                let offset = env.pointer_offset(*id)?;
                out.push_str(&format!("{offset:04X}"));
            }
            Self::StackRef { .. } => return Err(EmitError::StackRefAtEmission),
        }
        Ok(())
    }
}

fn write_range(
    out: &mut String,
    env: &ResolveEnv<'_>,
    inner: &Hexable,
    start: usize,
    len: usize,
) -> Result<(), EmitError> {
    let mut inner_hex = String::with_capacity(2 * inner.byte_length());
    inner.write_hex(&mut inner_hex, env)?;
    let bytes = inner_hex.as_bytes();
    for i in 2 * start..2 * (start + len) {
        out.push(bytes.get(i).copied().map(char::from).unwrap_or('0'));
    }
    Ok(())
}

fn push_bytes_hex(out: &mut String, bytes: &[u8]) {
    out.push_str(&hex::encode_upper(bytes));
}

fn push_byte_hex(out: &mut String, byte: u8) {
    out.push_str(&format!("{byte:02X}"));
}

fn push_zeros(out: &mut String, digits: usize) {
    for _ in 0..digits {
        out.push('0');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{SourceLoc, Span};

    fn empty_env_parts() -> (
        PrimaryMap<ActionId, Action>,
        FxHashMap<SmolStr, ActionId>,
        FxHashMap<ActionId, u32>,
    ) {
        (PrimaryMap::new(), FxHashMap::default(), FxHashMap::default())
    }

    fn render(h: &Hexable) -> String {
        let (actions, labels, offsets) = empty_env_parts();
        let env = ResolveEnv {
            actions: &actions,
            labels: &labels,
            offsets: &offsets,
        };
        let mut out = String::new();
        h.write_hex(&mut out, &env).unwrap();
        assert_eq!(out.len(), 2 * h.byte_length());
        out
    }

    #[test]
    fn literal_zero_is_one_byte() {
        let h = Hexable::Literal(U256::zero());
        assert_eq!(h.byte_length(), 1);
        assert_eq!(render(&h), "00");
    }

    #[test]
    fn literal_strips_leading_zeros() {
        assert_eq!(render(&Hexable::Literal(U256::from(0xABCDu32))), "ABCD");
        assert_eq!(Hexable::Literal(U256::from(0x0100u32)).byte_length(), 2);
    }

    #[test]
    fn raw_keeps_leading_zeros() {
        let h = Hexable::Raw(vec![0x00, 0xFF]);
        assert_eq!(h.byte_length(), 2);
        assert_eq!(render(&h), "00FF");
    }

    #[test]
    fn byte_range_pads_past_the_end() {
        let h = Hexable::ByteRange {
            inner: Box::new(Hexable::Raw(vec![0xAA, 0xBB])),
            start: 1,
            len: 3,
        };
        assert_eq!(h.byte_length(), 3);
        assert_eq!(render(&h), "BB0000");
    }

    #[test]
    fn word_range_is_byte_range_times_32() {
        let h = Hexable::WordRange {
            inner: Box::new(Hexable::Raw(vec![0x11; 33])),
            start: 1,
            len: 1,
        };
        assert_eq!(h.byte_length(), 32);
        assert_eq!(render(&h), format!("11{}", "00".repeat(31)));
    }

    #[test]
    fn padded_sides() {
        let inner = || Box::new(Hexable::Literal(U256::one()));
        let left = Hexable::Padded {
            inner: inner(),
            len: 4,
            side: PadSide::Left,
        };
        let right = Hexable::Padded {
            inner: inner(),
            len: 4,
            side: PadSide::Right,
        };
        assert_eq!(render(&left), "00000001");
        assert_eq!(render(&right), "01000000");
    }

    #[test]
    fn padded_multiple_is_untouched() {
        let h = Hexable::Padded {
            inner: Box::new(Hexable::Raw(vec![0xAB; 4])),
            len: 4,
            side: PadSide::Left,
        };
        assert_eq!(h.byte_length(), 4);
        assert_eq!(render(&h), "ABABABAB");
    }

    #[test]
    fn solidity_string_layout() {
        let h = Hexable::SolidityString(Box::new(Hexable::Raw(b"abc".to_vec())));
        assert_eq!(h.byte_length(), 64);
        let hex = render(&h);
        assert_eq!(&hex[..64], &format!("{:064X}", 3));
        assert_eq!(&hex[64..70], "616263");
        assert!(hex[70..].bytes().all(|b| b == b'0'));
    }

    #[test]
    fn jumpmap_rounds_to_words() {
        assert_eq!(Hexable::JumpMap(vec![]).byte_length(), 0);
        let three = Hexable::JumpMap(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(three.byte_length(), 32);
        let eighteen = Hexable::JumpMap((0..18).map(|i| SmolStr::new(format!("l{i}"))).collect());
        assert_eq!(eighteen.byte_length(), 64);
    }

    #[test]
    fn jumpmap_resolves_labels() {
        let mut actions = PrimaryMap::new();
        let id = actions.push(Action::new("x", Span::default(), SourceLoc::default()));
        let mut labels = FxHashMap::default();
        labels.insert(SmolStr::new("x"), id);
        let mut offsets = FxHashMap::default();
        offsets.insert(id, 0x1234u32);
        let env = ResolveEnv {
            actions: &actions,
            labels: &labels,
            offsets: &offsets,
        };
        let mut out = String::new();
        Hexable::JumpMap(vec!["x".into()])
            .write_hex(&mut out, &env)
            .unwrap();
        assert!(out.starts_with("1234"));
        assert_eq!(out.len(), 64);
    }

    #[test]
    fn pointer_overflow_is_an_error() {
        let mut actions = PrimaryMap::new();
        let id = actions.push(Action::new("big", Span::default(), SourceLoc::default()));
        let labels = FxHashMap::default();
        let mut offsets = FxHashMap::default();
        offsets.insert(id, 1 << 16);
        let env = ResolveEnv {
            actions: &actions,
            labels: &labels,
            offsets: &offsets,
        };
        let mut out = String::new();
        let err = Hexable::ActionPointer(id).write_hex(&mut out, &env).unwrap_err();
        assert!(matches!(err, EmitError::PointerOverflow { .. }));
    }

    #[test]
    fn stack_ref_never_emits() {
        let (actions, labels, offsets) = empty_env_parts();
        let env = ResolveEnv {
            actions: &actions,
            labels: &labels,
            offsets: &offsets,
        };
        let h = Hexable::StackRef {
            owner: ActionId::from_u32(0),
            slot: 0,
            kind: StackRefKind::Dup,
        };
        assert_eq!(h.byte_length(), 1);
        let mut out = String::new();
        assert_eq!(h.write_hex(&mut out, &env), Err(EmitError::StackRefAtEmission));
    }

    #[test]
    fn byte_length_is_idempotent() {
        let h = Hexable::Concat(vec![
            Hexable::Literal(U256::from(0xFFu32)),
            Hexable::Padded {
                inner: Box::new(Hexable::Raw(vec![1, 2, 3])),
                len: 32,
                side: PadSide::Right,
            },
        ]);
        assert_eq!(h.byte_length(), h.byte_length());
        assert_eq!(h.byte_length(), 33);
    }
}
