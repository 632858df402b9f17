//! Bytecode emission for one function.
//!
//! The [`FunctionBuilder`] is the instruction emission target: it owns the
//! code chunk, the four register pools, the per-kind constant tables, and
//! the flow scopes that collect break/continue sites for backpatching.
//! Jump targets are deferred through [`JumpLabel`] handles; every label
//! must be resolved exactly once before [`FunctionBuilder::finish`].

mod jumps;
mod regs;

use brimstone_core::{NameId, RegClass, Span};
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::bytecode::{AddrConst, CodeChunk, ConstantTables, Instr, OpCode};
use crate::scope::LocalId;

pub use jumps::{FlowError, FlowScopes};
pub use regs::{RegHandle, RegKind, RegPool};

/// Opaque handle to an emitted jump whose target is not yet known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JumpLabel(pub(crate) usize);

/// Builds the bytecode of a single function.
pub struct FunctionBuilder {
    chunk: CodeChunk,
    consts: ConstantTables,
    regs: [RegPool; 4],
    flows: FlowScopes,
    /// Labels created but not yet resolved; must drain before finish.
    open_labels: FxHashSet<usize>,
    /// Fixed registers assigned to local declarations, by LocalId.
    local_regs: Vec<Option<RegHandle>>,
    span: Span,
}

impl FunctionBuilder {
    pub fn new() -> Self {
        Self {
            chunk: CodeChunk::new(),
            consts: ConstantTables::new(),
            regs: [RegPool::new(), RegPool::new(), RegPool::new(), RegPool::new()],
            flows: FlowScopes::new(),
            open_labels: FxHashSet::default(),
            local_regs: Vec::new(),
            span: Span::default(),
        }
    }

    /// Source position attached to subsequently emitted instructions.
    pub fn set_span(&mut self, span: Span) {
        self.span = span;
    }

    // =========================================================================
    // Emission
    // =========================================================================

    /// Emit an instruction, returning its offset.
    pub fn emit(&mut self, op: OpCode, a: u16, b: u16, c: u16) -> usize {
        self.chunk.push(Instr { op, a, b, c, imm: 0 }, self.span)
    }

    /// Emit an instruction with an immediate.
    pub fn emit_imm(&mut self, op: OpCode, a: u16, b: u16, c: u16, imm: i32) -> usize {
        self.chunk.push(Instr { op, a, b, c, imm }, self.span)
    }

    /// Offset the next instruction will land at.
    pub fn next_offset(&self) -> usize {
        self.chunk.next_offset()
    }

    /// Emit a forward jump with an unresolved target.
    ///
    /// `test` is the condition register for the conditional forms and
    /// ignored for [`OpCode::Jmp`].
    pub fn emit_jump(&mut self, op: OpCode, test: u16) -> JumpLabel {
        let at = self.emit_imm(op, test, 0, 0, -1);
        self.open_labels.insert(at);
        JumpLabel(at)
    }

    /// Emit the compact case test: jump when int reg `test` equals `value`.
    pub fn emit_jump_eq_imm(&mut self, test: u16, value: u16) -> JumpLabel {
        let at = self.emit_imm(OpCode::JumpIfEqImm, test, value, 0, -1);
        self.open_labels.insert(at);
        JumpLabel(at)
    }

    /// Resolve a label to the current offset.
    pub fn patch(&mut self, label: JumpLabel) {
        let target = self.next_offset();
        self.patch_to(label, target);
    }

    /// Resolve a label to an explicit offset.
    pub fn patch_to(&mut self, label: JumpLabel, target: usize) {
        let was_open = self.open_labels.remove(&label.0);
        debug_assert!(was_open, "label resolved twice");
        self.chunk.patch_imm(label.0, target as i32);
    }

    /// Emit an unconditional backward jump to a known offset.
    pub fn emit_backward_jump(&mut self, target: usize) {
        self.emit_imm(OpCode::Jmp, 0, 0, 0, target as i32);
    }

    // =========================================================================
    // Registers
    // =========================================================================

    /// Lease `width` contiguous temporaries from `class`'s pool.
    pub fn acquire(&mut self, class: RegClass, width: u8) -> RegHandle {
        let num = self.regs[class.index()].get(width);
        trace!(?class, num, width, "acquire");
        RegHandle::temp(num, class, width)
    }

    /// Lease an address temporary that denotes an assignable location.
    pub fn acquire_target(&mut self) -> RegHandle {
        let num = self.regs[RegClass::Address.index()].get(1);
        RegHandle::target(num)
    }

    /// Return a handle's registers to the pool. No-op for constant-backed,
    /// fixed, void, and final handles.
    pub fn free(&mut self, handle: &RegHandle) {
        if handle.is_pooled() {
            trace!(class = ?handle.class, num = handle.num, "free");
            self.regs[handle.class.index()].ret(handle.num, handle.width);
        }
    }

    /// Re-mark a previously freed handle as live without re-leasing.
    pub fn reuse(&mut self, handle: &RegHandle) {
        if handle.is_pooled() {
            self.regs[handle.class.index()].reuse(handle.num, handle.width);
        }
    }

    /// Leased slot count for one pool; zero for all four once a function
    /// has fully emitted.
    pub fn in_use(&self, class: RegClass) -> usize {
        self.regs[class.index()].in_use()
    }

    pub fn total_in_use(&self) -> usize {
        self.regs.iter().map(|p| p.in_use()).sum()
    }

    pub fn max_regs(&self) -> [u16; 4] {
        [
            self.regs[0].max_used(),
            self.regs[1].max_used(),
            self.regs[2].max_used(),
            self.regs[3].max_used(),
        ]
    }

    // =========================================================================
    // Constants
    // =========================================================================

    pub fn konst_int(&mut self, value: i32) -> RegHandle {
        let idx = self.consts.intern_int(value);
        RegHandle::konst(idx, RegClass::Int)
    }

    pub fn konst_uint(&mut self, value: u32) -> RegHandle {
        self.konst_int(value as i32)
    }

    pub fn konst_name(&mut self, name: NameId) -> RegHandle {
        self.konst_int(name.0 as i32)
    }

    pub fn konst_float(&mut self, value: f64) -> RegHandle {
        let idx = self.consts.intern_float(value);
        RegHandle::konst(idx, RegClass::Float)
    }

    pub fn konst_string(&mut self, value: &str) -> RegHandle {
        let idx = self.consts.intern_string(value);
        RegHandle::konst(idx, RegClass::String)
    }

    pub fn konst_addr(&mut self, value: AddrConst) -> RegHandle {
        let idx = self.consts.intern_addr(value);
        RegHandle::konst(idx, RegClass::Address)
    }

    /// Ensure a handle occupies registers: constant-backed handles load
    /// into a fresh temporary, others pass through.
    pub fn materialize(&mut self, handle: RegHandle) -> RegHandle {
        if !handle.is_konst() {
            return handle;
        }
        let dst = self.acquire(handle.class, 1);
        let op = Self::loadk_op(handle.class);
        self.emit(op, dst.num, handle.num, 0);
        dst
    }

    /// Copy `src` into `dst` (same class and width). Loads constants,
    /// moves registers, skips self-moves.
    pub fn move_to(&mut self, dst: &RegHandle, src: &RegHandle) {
        debug_assert_eq!(dst.class, src.class);
        if src.is_konst() {
            self.emit(Self::loadk_op(src.class), dst.num, src.num, 0);
            return;
        }
        if src.num == dst.num {
            return;
        }
        let op = match (src.class, src.width) {
            (RegClass::Float, 2) => OpCode::MoveV2,
            (RegClass::Float, 3) => OpCode::MoveV3,
            (RegClass::Int, _) => OpCode::MoveI,
            (RegClass::Float, _) => OpCode::MoveF,
            (RegClass::String, _) => OpCode::MoveS,
            (RegClass::Address, _) => OpCode::MoveA,
        };
        self.emit(op, dst.num, src.num, 0);
    }

    fn loadk_op(class: RegClass) -> OpCode {
        match class {
            RegClass::Int => OpCode::LoadKI,
            RegClass::Float => OpCode::LoadKF,
            RegClass::String => OpCode::LoadKS,
            RegClass::Address => OpCode::LoadKA,
        }
    }

    // =========================================================================
    // Flow scopes
    // =========================================================================

    pub fn enter_loop(&mut self) {
        self.flows.enter_loop();
    }

    pub fn enter_switch(&mut self) {
        self.flows.enter_switch();
    }

    /// Emit a break jump, registered on the innermost breakable frame.
    pub fn emit_break(&mut self) -> Result<(), FlowError> {
        let label = self.emit_jump(OpCode::Jmp, 0);
        let res = self.flows.add_break(label);
        if res.is_err() {
            // Unwind the placeholder so finish() does not trip on it.
            self.open_labels.remove(&label.0);
        }
        res
    }

    /// Emit a continue jump, registered on the innermost loop frame.
    pub fn emit_continue(&mut self) -> Result<(), FlowError> {
        let label = self.emit_jump(OpCode::Jmp, 0);
        let res = self.flows.add_continue(label);
        if res.is_err() {
            self.open_labels.remove(&label.0);
        }
        res
    }

    /// Close a loop frame, patching breaks to `break_target` and continues
    /// to `continue_target`.
    pub fn exit_loop(&mut self, break_target: usize, continue_target: usize) {
        let (breaks, continues) = self.flows.exit();
        for label in breaks {
            self.patch_to(label, break_target);
        }
        for label in continues {
            self.patch_to(label, continue_target);
        }
    }

    /// Close a switch frame, patching breaks to `break_target`.
    pub fn exit_switch(&mut self, break_target: usize) {
        let (breaks, continues) = self.flows.exit();
        debug_assert!(continues.is_empty(), "continue registered on a switch");
        for label in breaks {
            self.patch_to(label, break_target);
        }
    }

    // =========================================================================
    // Local variable registers
    // =========================================================================

    /// Record the fixed register assigned to a local declaration.
    pub fn set_local_reg(&mut self, id: LocalId, handle: RegHandle) {
        let idx = id.0 as usize;
        if self.local_regs.len() <= idx {
            self.local_regs.resize(idx + 1, None);
        }
        self.local_regs[idx] = Some(handle);
    }

    /// The fixed register of a declared local.
    pub fn local_reg(&self, id: LocalId) -> RegHandle {
        self.local_regs[id.0 as usize].expect("local emitted before declaration")
    }

    /// Release a local's registers once its owning block has emitted.
    pub fn release_local(&mut self, id: LocalId) {
        if let Some(handle) = self.local_regs[id.0 as usize].take() {
            self.regs[handle.class.index()].ret(handle.num, handle.width);
        }
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Finish the function: verifies every jump label was resolved and no
    /// temporaries leaked, then hands out the chunk, the constant tables,
    /// and the per-file register high-water marks.
    pub fn finish(self) -> (CodeChunk, ConstantTables, [u16; 4]) {
        debug_assert!(
            self.open_labels.is_empty(),
            "{} unresolved jump site(s) at end of function",
            self.open_labels.len()
        );
        debug_assert_eq!(self.total_in_use(), 0, "leaked temporary registers");
        debug_assert_eq!(self.flows.depth(), 0, "unclosed flow scope");
        let max = self.max_regs();
        (self.chunk, self.consts, max)
    }
}

impl Default for FunctionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
