//! Register bytecode instruction set
//!
//! Opcode numbers are ABI for the virtual machine: existing values must
//! never change. Gaps in the numbering are reserved.

use serde::{Deserialize, Serialize};

/// One-byte opcodes; operands follow as documented per variant
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    /// dst: u8, const_idx: u16
    LoadConstR = 0,
    /// dst: u8, src: u8
    MoveR = 1,
    /// dst: u8, name_idx: u16
    LoadGlobalR = 2,
    /// src: u8, name_idx: u16
    StoreGlobalR = 3,

    /// dst: u8, l: u8, r: u8
    AddR = 7,
    SubR = 8,
    MulR = 9,
    DivR = 10,
    ModR = 11,
    /// dst: u8, src: u8
    NegR = 12,
    NotR = 13,
    /// dst: u8, l: u8, r: u8
    AndR = 14,
    OrR = 15,
    EqR = 16,
    NeqR = 17,
    LtR = 18,
    GtR = 19,
    LteR = 20,
    GteR = 21,

    /// offset: i32, relative to the byte after the offset field
    JumpR = 22,
    /// cond: u8, offset: i32
    JumpIfR = 23,

    /// func: u8, dst: u8, arity: u8, args: arity x u8
    CallR = 25,
    /// has_value: u8, src: u8 when has_value = 1
    ReturnR = 26,
    /// dst: u8, n: u8, then n x (src: u8, block_id: u16)
    PhiR = 27,
    /// reg: u8, kind: u8, msg_idx: u16
    AssertR = 28,
    /// scope_id: u16
    ScopeEnterR = 29,
    ScopeExitR = 30,

    /// dst: u8, len: u8
    NewListR = 31,
    /// dst: u8, arr: u8, idx: u8
    ListGetR = 32,
    /// arr: u8, idx: u8, src: u8
    ListSetR = 33,
    /// arr: u8, src: u8
    ListAppendR = 34,
    /// dst: u8, arr: u8
    ListLenR = 35,
    /// dst: u8, cond: u8, t: u8, f: u8
    SelectR = 36,
    /// src: u8
    DebugPrint = 37,
    /// dst: u8, obj: u8, name_idx: u16
    GetAttrR = 38,
    /// obj: u8, name_idx: u16, src: u8
    SetAttrR = 39,

    /// dst: u8, l: u8, r: u8
    BitAndR = 40,
    BitOrR = 41,
    BitXorR = 42,
    ShlR = 43,
    ShrR = 44,
    PowR = 45,
    StrictEqR = 46,
    StrictNeqR = 47,
    /// dst: u8, src: u8
    BitNotR = 48,
}

impl Opcode {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abi_opcode_numbers_are_stable() {
        assert_eq!(Opcode::LoadConstR.as_byte(), 0);
        assert_eq!(Opcode::MoveR.as_byte(), 1);
        assert_eq!(Opcode::LoadGlobalR.as_byte(), 2);
        assert_eq!(Opcode::StoreGlobalR.as_byte(), 3);
        assert_eq!(Opcode::AddR.as_byte(), 7);
        assert_eq!(Opcode::ModR.as_byte(), 11);
        assert_eq!(Opcode::NegR.as_byte(), 12);
        assert_eq!(Opcode::GteR.as_byte(), 21);
        assert_eq!(Opcode::JumpR.as_byte(), 22);
        assert_eq!(Opcode::JumpIfR.as_byte(), 23);
        assert_eq!(Opcode::CallR.as_byte(), 25);
        assert_eq!(Opcode::ReturnR.as_byte(), 26);
        assert_eq!(Opcode::PhiR.as_byte(), 27);
        assert_eq!(Opcode::AssertR.as_byte(), 28);
        assert_eq!(Opcode::ScopeExitR.as_byte(), 30);
        assert_eq!(Opcode::DebugPrint.as_byte(), 37);
    }
}
