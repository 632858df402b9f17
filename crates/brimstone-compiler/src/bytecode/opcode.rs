//! Operation codes for the register VM.
//!
//! Instructions address up to three operands (`a`, `b`, `c`) plus a 32-bit
//! immediate. The VM keeps four register files (int, float, string,
//! address); an opcode's documentation states which file each operand
//! lives in. Source operands marked "RK" may carry [`KONST_BIT`] to index
//! the matching constant table instead of a register.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Flag bit marking an RK operand as a constant-table index.
pub const KONST_BIT: u16 = 0x8000;

/// Bytecode operations.
///
/// Unless stated otherwise `a` is the destination register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OpCode {
    // =========================================================================
    // Moves and constant loads
    // =========================================================================
    /// int `a` = int `b`.
    MoveI = 0,
    /// float `a` = float `b`.
    MoveF,
    /// string `a` = string `b`.
    MoveS,
    /// address `a` = address `b`.
    MoveA,
    /// two float regs starting at `a` = regs starting at `b`.
    MoveV2,
    /// three float regs starting at `a` = regs starting at `b`.
    MoveV3,
    /// int `a` = int constant `b`.
    LoadKI,
    /// float `a` = float constant `b`.
    LoadKF,
    /// string `a` = string constant `b`.
    LoadKS,
    /// address `a` = address constant `b`.
    LoadKA,
    /// int `a` = encoded state-label value for label-path constant `b`.
    LoadLabel,

    // =========================================================================
    // Integer arithmetic (RK on b, c)
    // =========================================================================
    AddI,
    SubI,
    MulI,
    /// Signed division.
    DivI,
    /// Unsigned division.
    DivU,
    /// Signed remainder.
    ModI,
    /// Unsigned remainder.
    ModU,
    /// int `a` = -int `b`.
    NegI,
    AndI,
    OrI,
    XorI,
    /// int `a` = ~int `b`.
    NotI,
    ShlI,
    /// Arithmetic shift right.
    ShrI,
    /// Logical shift right.
    ShrU,
    /// int `a` = |int `b`|.
    AbsI,
    MinI,
    MaxI,
    MinU,
    MaxU,

    // =========================================================================
    // Float arithmetic (RK on b, c)
    // =========================================================================
    AddF,
    SubF,
    MulF,
    DivF,
    ModF,
    PowF,
    /// float `a` = -float `b`.
    NegF,
    MinF,
    MaxF,
    /// float `a` = intrinsic `c` applied to float `b`; `c` is a
    /// [`FlopOp`] index.
    Flop,
    /// float `a` = atan2(float `b`, float `c`) in degrees.
    ATan2,

    // =========================================================================
    // Vector arithmetic (registers are the first of 2/3 float slots)
    // =========================================================================
    AddV2,
    SubV2,
    AddV3,
    SubV3,
    /// vec2 `a` = vec2 `b` * float `c`.
    ScaleV2,
    ScaleV3,
    /// vec2 `a` = vec2 `b` / float `c`.
    DivV2,
    DivV3,
    /// float `a` = length of vec2 `b`.
    LenV2,
    LenV3,
    /// vec2 `a` = normalized vec2 `b`.
    UnitV2,
    UnitV3,
    NegV2,
    NegV3,
    /// int `a` = vec2 `b` == vec2 `c`; `imm` nonzero selects approximate
    /// comparison.
    EqV2,
    EqV3,

    // =========================================================================
    // Conversions (a = dst, b = src)
    // =========================================================================
    IntToFloat,
    UintToFloat,
    /// Truncates toward zero.
    FloatToInt,
    FloatToUint,
    IntToStr,
    UintToStr,
    FloatToStr,
    NameToStr,
    SoundToStr,
    ColorToStr,
    SpriteToStr,
    TextureToStr,
    PtrToStr,
    V2ToStr,
    V3ToStr,
    StrToName,
    /// int `a` = int `b` != 0.
    BoolI,
    /// int `a` = float `b` != 0.
    BoolF,
    /// int `a` = string `b` is non-empty.
    BoolS,
    /// int `a` = address `b` is non-null.
    BoolA,

    // =========================================================================
    // Comparisons (int result; RK on b, c)
    // =========================================================================
    EqI,
    LtI,
    LeI,
    LtU,
    LeU,
    EqF,
    LtF,
    LeF,
    /// Approximate float equality (fixed epsilon).
    ApproxEqF,
    /// int `a` = three-way compare of floats `b`, `c`: -1/0/1.
    CmpF,
    EqS,
    /// Byte-wise lexicographic less-than.
    LtS,
    LeS,
    /// Case-insensitive string equality.
    ApproxEqS,
    /// Pointer identity.
    EqA,
    ConcatS,

    // =========================================================================
    // Memory (b = base address reg, c = byte offset)
    // =========================================================================
    Load8,
    Load8U,
    Load16,
    Load16U,
    Load32,
    LoadF32,
    LoadF64,
    LoadS,
    LoadA,
    LoadV2,
    LoadV3,
    Store8,
    Store16,
    Store32,
    StoreF32,
    StoreF64,
    StoreS,
    StoreA,
    StoreV2,
    StoreV3,
    /// address `a` = address `b` + int `c` (byte offset in a register).
    AddrOffset,
    /// address `a` = frame address of register `c` of file `b`; backs
    /// reference arguments to locals.
    RefLocal,
    /// Abort if int `a` is not in `0..imm`.
    BoundCheck,
    /// address `a` = defaults instance of class descriptor `b`.
    LoadDefaults,
    /// address `a` = class descriptor of object `b`.
    ClassOf,
    /// address `a` = address `b` if its class descends from address
    /// constant `c`, else null. The one soft-failure runtime check.
    DynCast,

    // =========================================================================
    // Control flow (targets in `imm`, patched after emission)
    // =========================================================================
    Jmp,
    /// Jump when int `a` is nonzero.
    JumpIfTrue,
    /// Jump when int `a` is zero.
    JumpIfFalse,
    /// Jump when int `a` equals the small immediate value `b`.
    JumpIfEqImm,

    // =========================================================================
    // Calls and returns
    // =========================================================================
    /// Pass one argument register: `a` = register-file index, `b` = RK
    /// operand, `c` = slot width.
    Param,
    /// Call address constant `a` with `b` args and `c` results.
    Call,
    /// Tail call address constant `a` with `b` args; nothing executes in
    /// the caller afterwards.
    Tail,
    /// Receive result: `a` = register-file index, `b` = destination
    /// register, `c` = slot width.
    Result,
    /// Return value `a` (index) from file `b`, RK operand `c`.
    Ret,
    RetVoid,
}

impl OpCode {
    /// Opcode mnemonic for disassembly and test failure messages.
    pub fn name(self) -> String {
        format!("{self:?}")
    }
}

/// Single-operand float intrinsics dispatched through [`OpCode::Flop`].
///
/// Trigonometric entries operate on degrees unless suffixed `Rad`;
/// inverse trig yields degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FlopOp {
    Abs = 0,
    Exp,
    Log,
    Log10,
    Sqrt,
    Ceil,
    Floor,
    Round,
    ACos,
    ASin,
    ATan,
    Cos,
    Sin,
    Tan,
    CosRad,
    SinRad,
    TanRad,
    CosH,
    SinH,
    TanH,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u8() {
        let op = OpCode::AddI;
        let raw: u8 = op.into();
        assert_eq!(OpCode::try_from(raw), Ok(OpCode::AddI));
    }

    #[test]
    fn unknown_byte_is_rejected() {
        assert!(OpCode::try_from(255u8).is_err());
    }

    #[test]
    fn name_matches_variant() {
        assert_eq!(OpCode::ConcatS.name(), "ConcatS");
        assert_eq!(OpCode::JumpIfFalse.name(), "JumpIfFalse");
    }

    #[test]
    fn flop_round_trips() {
        let raw: u8 = FlopOp::Sqrt.into();
        assert_eq!(FlopOp::try_from(raw), Ok(FlopOp::Sqrt));
    }
}
