//! Instructions and the per-function code chunk.
//!
//! A [`CodeChunk`] is the emission target: it accepts instructions with up
//! to three operand fields plus an immediate, hands back the offset of
//! each emitted instruction, and supports patching a jump's immediate once
//! its target is known.

use brimstone_core::Span;

use super::OpCode;

/// One emitted instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    pub op: OpCode,
    pub a: u16,
    pub b: u16,
    pub c: u16,
    /// Jump target, bound-check limit, or small literal. Zero when unused.
    pub imm: i32,
}

/// Instruction stream for a single function, with source positions kept
/// alongside for runtime diagnostics.
#[derive(Debug, Clone, Default)]
pub struct CodeChunk {
    instrs: Vec<Instr>,
    spans: Vec<Span>,
}

impl CodeChunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction, returning its offset.
    pub fn push(&mut self, instr: Instr, span: Span) -> usize {
        let offset = self.instrs.len();
        self.instrs.push(instr);
        self.spans.push(span);
        offset
    }

    /// Offset the next instruction will land at.
    pub fn next_offset(&self) -> usize {
        self.instrs.len()
    }

    /// Rewrite the immediate of an already-emitted instruction.
    pub fn patch_imm(&mut self, offset: usize, imm: i32) {
        self.instrs[offset].imm = imm;
    }

    pub fn get(&self, offset: usize) -> Option<&Instr> {
        self.instrs.get(offset)
    }

    pub fn span_at(&self, offset: usize) -> Option<Span> {
        self.spans.get(offset).copied()
    }

    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// The opcode sequence, for tests that only care about shape.
    pub fn ops(&self) -> Vec<OpCode> {
        self.instrs.iter().map(|i| i.op).collect()
    }

    /// Assert the chunk is exactly the given opcode sequence (operands
    /// ignored).
    #[track_caller]
    pub fn assert_ops(&self, expected: &[OpCode]) {
        let actual = self.ops();
        assert_eq!(
            actual, expected,
            "bytecode mismatch\nexpected: {expected:?}\nactual:   {actual:?}",
        );
    }

    /// Assert the given opcodes occur in order (not necessarily adjacent).
    #[track_caller]
    pub fn assert_contains_ops(&self, expected: &[OpCode]) {
        let actual = self.ops();
        let mut want = expected.iter().peekable();
        for op in &actual {
            if want.peek() == Some(&op) {
                want.next();
            }
        }
        let missing: Vec<_> = want.collect();
        assert!(
            missing.is_empty(),
            "missing opcodes {missing:?} in sequence\nactual: {actual:?}",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instr(op: OpCode) -> Instr {
        Instr { op, a: 0, b: 0, c: 0, imm: 0 }
    }

    #[test]
    fn push_returns_offsets_in_order(){
        let mut chunk = CodeChunk::new();
        assert_eq!(chunk.push(instr(OpCode::LoadKI), Span::point(1, 1)), 0);
        assert_eq!(chunk.push(instr(OpCode::AddI), Span::point(1, 3)), 1);
        assert_eq!(chunk.next_offset(), 2);
        assert_eq!(chunk.span_at(1), Some(Span::point(1, 3)));
    }

    #[test]
    fn patch_imm_rewrites() {
        let mut chunk = CodeChunk::new();
        let at = chunk.push(instr(OpCode::Jmp), Span::default());
        chunk.patch_imm(at, 7);
        assert_eq!(chunk.get(at).unwrap().imm, 7);
    }

    #[test]
    fn assert_ops_matches() {
        let mut chunk = CodeChunk::new();
        chunk.push(instr(OpCode::LoadKI), Span::default());
        chunk.push(instr(OpCode::NegI), Span::default());
        chunk.assert_ops(&[OpCode::LoadKI, OpCode::NegI]);
        chunk.assert_contains_ops(&[OpCode::NegI]);
    }

    #[test]
    #[should_panic(expected = "bytecode mismatch")]
    fn assert_ops_mismatch_panics() {
        let mut chunk = CodeChunk::new();
        chunk.push(instr(OpCode::LoadKI), Span::default());
        chunk.assert_ops(&[OpCode::LoadKF]);
    }
}
