//! The fixed EVM instruction table.

/// Generates the opcode enum together with its accessor tables.
///
/// DUPn and SWAPn deliberately report `(0, 1)` and `(0, 0)`: their effect on
/// stack *references* is modelled by the processor, not by the generic delta.
macro_rules! opcodes {
    ($($byte:literal => $name:ident($removed:literal, $added:literal),)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum OpCode {
            $($name = $byte,)*
        }

        impl OpCode {
            /// Every instruction, in opcode order. Used to register the
            /// default helper catalogue.
            pub const ALL: &'static [OpCode] = &[$(OpCode::$name,)*];

            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(OpCode::$name),)*
                    _ => None,
                }
            }

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(OpCode::$name => stringify!($name),)*
                }
            }

            /// (removed, added) as recorded in the table.
            pub fn stack_delta(self) -> (u8, u8) {
                (self.stack_removed(), self.stack_added())
            }

            pub fn stack_removed(self) -> u8 {
                match self {
                    $(OpCode::$name => $removed,)*
                }
            }

            pub fn stack_added(self) -> u8 {
                match self {
                    $(OpCode::$name => $added,)*
                }
            }
        }
    };
}

opcodes! {
    0x00 => STOP(0, 0),
    0x01 => ADD(2, 1),
    0x02 => MUL(2, 1),
    0x03 => SUB(2, 1),
    0x04 => DIV(2, 1),
    0x05 => SDIV(2, 1),
    0x06 => MOD(2, 1),
    0x07 => SMOD(2, 1),
    0x08 => ADDMOD(3, 1),
    0x09 => MULMOD(3, 1),
    0x0A => EXP(2, 1),
    0x0B => SIGNEXTEND(2, 1),
    0x10 => LT(2, 1),
    0x11 => GT(2, 1),
    0x12 => SLT(2, 1),
    0x13 => SGT(2, 1),
    0x14 => EQ(2, 1),
    0x15 => ISZERO(1, 1),
    0x16 => AND(2, 1),
    0x17 => OR(2, 1),
    0x18 => XOR(2, 1),
    0x19 => NOT(1, 1),
    0x1A => BYTE(2, 1),
    0x1B => SHL(2, 1),
    0x1C => SHR(2, 1),
    0x1D => SAR(2, 1),
    0x20 => SHA3(2, 1),
    0x30 => ADDRESS(0, 1),
    0x31 => BALANCE(1, 1),
    0x32 => ORIGIN(0, 1),
    0x33 => CALLER(0, 1),
    0x34 => CALLVALUE(0, 1),
    0x35 => CALLDATALOAD(1, 1),
    0x36 => CALLDATASIZE(0, 1),
    0x37 => CALLDATACOPY(3, 0),
    0x38 => CODESIZE(0, 1),
    0x39 => CODECOPY(3, 0),
    0x3A => GASPRICE(0, 1),
    0x3B => EXTCODESIZE(1, 1),
    0x3C => EXTCODECOPY(4, 0),
    0x3D => RETURNDATASIZE(0, 1),
    0x3E => RETURNDATACOPY(3, 0),
    0x3F => EXTCODEHASH(1, 1),
    0x40 => BLOCKHASH(1, 1),
    0x41 => COINBASE(0, 1),
    0x42 => TIMESTAMP(0, 1),
    0x43 => NUMBER(0, 1),
    0x44 => DIFFICULTY(0, 1),
    0x45 => GASLIMIT(0, 1),
    0x46 => CHAINID(0, 1),
    0x47 => SELFBALANCE(0, 1),
    0x50 => POP(1, 0),
    0x51 => MLOAD(1, 1),
    0x52 => MSTORE(2, 0),
    0x53 => MSTORE8(2, 0),
    0x54 => SLOAD(1, 1),
    0x55 => SSTORE(2, 0),
    0x56 => JUMP(1, 0),
    0x57 => JUMPI(2, 0),
    0x58 => PC(0, 1),
    0x59 => MSIZE(0, 1),
    0x5A => GAS(0, 1),
    0x5B => JUMPDEST(0, 0),
    0x60 => PUSH1(0, 1),
    0x61 => PUSH2(0, 1),
    0x62 => PUSH3(0, 1),
    0x63 => PUSH4(0, 1),
    0x64 => PUSH5(0, 1),
    0x65 => PUSH6(0, 1),
    0x66 => PUSH7(0, 1),
    0x67 => PUSH8(0, 1),
    0x68 => PUSH9(0, 1),
    0x69 => PUSH10(0, 1),
    0x6A => PUSH11(0, 1),
    0x6B => PUSH12(0, 1),
    0x6C => PUSH13(0, 1),
    0x6D => PUSH14(0, 1),
    0x6E => PUSH15(0, 1),
    0x6F => PUSH16(0, 1),
    0x70 => PUSH17(0, 1),
    0x71 => PUSH18(0, 1),
    0x72 => PUSH19(0, 1),
    0x73 => PUSH20(0, 1),
    0x74 => PUSH21(0, 1),
    0x75 => PUSH22(0, 1),
    0x76 => PUSH23(0, 1),
    0x77 => PUSH24(0, 1),
    0x78 => PUSH25(0, 1),
    0x79 => PUSH26(0, 1),
    0x7A => PUSH27(0, 1),
    0x7B => PUSH28(0, 1),
    0x7C => PUSH29(0, 1),
    0x7D => PUSH30(0, 1),
    0x7E => PUSH31(0, 1),
    0x7F => PUSH32(0, 1),
    0x80 => DUP1(0, 1),
    0x81 => DUP2(0, 1),
    0x82 => DUP3(0, 1),
    0x83 => DUP4(0, 1),
    0x84 => DUP5(0, 1),
    0x85 => DUP6(0, 1),
    0x86 => DUP7(0, 1),
    0x87 => DUP8(0, 1),
    0x88 => DUP9(0, 1),
    0x89 => DUP10(0, 1),
    0x8A => DUP11(0, 1),
    0x8B => DUP12(0, 1),
    0x8C => DUP13(0, 1),
    0x8D => DUP14(0, 1),
    0x8E => DUP15(0, 1),
    0x8F => DUP16(0, 1),
    0x90 => SWAP1(0, 0),
    0x91 => SWAP2(0, 0),
    0x92 => SWAP3(0, 0),
    0x93 => SWAP4(0, 0),
    0x94 => SWAP5(0, 0),
    0x95 => SWAP6(0, 0),
    0x96 => SWAP7(0, 0),
    0x97 => SWAP8(0, 0),
    0x98 => SWAP9(0, 0),
    0x99 => SWAP10(0, 0),
    0x9A => SWAP11(0, 0),
    0x9B => SWAP12(0, 0),
    0x9C => SWAP13(0, 0),
    0x9D => SWAP14(0, 0),
    0x9E => SWAP15(0, 0),
    0x9F => SWAP16(0, 0),
    0xA0 => LOG0(2, 0),
    0xA1 => LOG1(3, 0),
    0xA2 => LOG2(4, 0),
    0xA3 => LOG3(5, 0),
    0xA4 => LOG4(6, 0),
    0xF0 => CREATE(3, 1),
    0xF1 => CALL(7, 1),
    0xF2 => CALLCODE(7, 1),
    0xF3 => RETURN(2, 0),
    0xF4 => DELEGATECALL(6, 1),
    0xF5 => CREATE2(4, 1),
    0xFA => STATICCALL(6, 1),
    0xFD => REVERT(2, 0),
    0xFE => INVALID(0, 0),
    0xFF => SELFDESTRUCT(1, 0),
}

impl OpCode {
    pub const fn byte(self) -> u8 {
        self as u8
    }

    pub fn is_push(self) -> bool {
        (0x60..=0x7F).contains(&(self as u8))
    }

    pub fn is_dup(self) -> bool {
        (0x80..=0x8F).contains(&(self as u8))
    }

    pub fn is_swap(self) -> bool {
        (0x90..=0x9F).contains(&(self as u8))
    }

    /// Number of inline data bytes following a PUSHn.
    pub fn push_data_len(self) -> Option<usize> {
        self.is_push().then(|| (self as u8 - 0x5F) as usize)
    }

    /// `n` of DUPn, 1-based.
    pub fn dup_n(self) -> Option<usize> {
        self.is_dup().then(|| (self as u8 - 0x7F) as usize)
    }

    /// `n` of SWAPn, 1-based.
    pub fn swap_n(self) -> Option<usize> {
        self.is_swap().then(|| (self as u8 - 0x8F) as usize)
    }
}

/// PUSHn for an `n`-byte immediate, `1 <= n <= 32`.
pub fn push_op(n_bytes: usize) -> OpCode {
    debug_assert!((1..=32).contains(&n_bytes), "push width out of range: {n_bytes}");
    match OpCode::from_byte(0x5F + n_bytes as u8) {
        Some(op) => op,
        None => unreachable!(),
    }
}

/// DUPn, `1 <= n <= 16`.
pub fn dup_op(n: usize) -> OpCode {
    debug_assert!((1..=16).contains(&n), "DUP out of range: {n}");
    match OpCode::from_byte(0x7F + n as u8) {
        Some(op) => op,
        None => unreachable!(),
    }
}

/// SWAPn, `1 <= n <= 16`.
pub fn swap_op(n: usize) -> OpCode {
    debug_assert!((1..=16).contains(&n), "SWAP out of range: {n}");
    match OpCode::from_byte(0x8F + n as u8) {
        Some(op) => op,
        None => unreachable!(),
    }
}
