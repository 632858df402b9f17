//! Flow scopes: break/continue jump-site bookkeeping during emission.
//!
//! Loops and switches push a frame; break/continue statements emitted
//! inside register their forward jumps on it. The owning construct pops
//! the frame once its exit addresses are known and patches every site.

use thiserror::Error;

use super::JumpLabel;

/// Break/continue used outside a legal construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("continue statement not inside a loop")]
    NotInLoop,
    #[error("break statement not inside a loop or switch")]
    NotBreakable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Loop,
    Switch,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    breaks: Vec<JumpLabel>,
    continues: Vec<JumpLabel>,
}

/// Stack of open loop/switch frames (innermost last).
#[derive(Debug, Default)]
pub struct FlowScopes {
    frames: Vec<Frame>,
}

impl FlowScopes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_loop(&mut self) {
        self.frames.push(Frame { kind: FrameKind::Loop, breaks: vec![], continues: vec![] });
    }

    pub fn enter_switch(&mut self) {
        self.frames.push(Frame { kind: FrameKind::Switch, breaks: vec![], continues: vec![] });
    }

    /// Register a break site on the innermost frame; a switch claims its
    /// own breaks.
    pub fn add_break(&mut self, label: JumpLabel) -> Result<(), FlowError> {
        self.frames
            .last_mut()
            .map(|f| f.breaks.push(label))
            .ok_or(FlowError::NotBreakable)
    }

    /// Register a continue site on the innermost *loop*, passing through
    /// any intervening switch frames.
    pub fn add_continue(&mut self, label: JumpLabel) -> Result<(), FlowError> {
        self.frames
            .iter_mut()
            .rev()
            .find(|f| f.kind == FrameKind::Loop)
            .map(|f| f.continues.push(label))
            .ok_or(FlowError::NotInLoop)
    }

    /// Pop the innermost frame, returning its (break, continue) sites.
    pub fn exit(&mut self) -> (Vec<JumpLabel>, Vec<JumpLabel>) {
        self.frames
            .pop()
            .map(|f| (f.breaks, f.continues))
            .unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
