//! Bytecode types: opcodes, instructions, and constant tables.

mod consts;
mod instr;
mod opcode;

pub use consts::{AddrConst, ConstantTables};
pub use instr::{CodeChunk, Instr};
pub use opcode::{FlopOp, KONST_BIT, OpCode};
