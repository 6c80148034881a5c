//! Emission state (§4.1): the single owned struct threaded by `&mut self`
//! through every lowering method in this module's siblings (`expr`,
//! `literal`, `dispatch`, `binop`, `markdup`, `bucket`), mirroring the
//! teacher's `TIRBuilder` — one struct, many `impl` blocks in sibling files,
//! no global mutable state and no monadic state-threading combinator.

mod binop;
mod bucket;
mod dispatch;
mod expr;
mod literal;
mod markdup;

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Expr, ExprId, LetHandle};
use crate::error::EmitError;
use crate::instruction::Instruction;

/// What a [`Mark`] identifies (§3).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MarkKey {
    /// A subexpression's result, used for zero-arity let-bound names.
    Expr(ExprId),
    /// The value bound to a tic-variable of a user-defined `let`.
    TicVar(LetHandle, String),
    /// The complete result of a let-dispatch with a specific actuals tuple.
    Dispatch(LetHandle, Vec<ExprId>),
    /// The per-group value emitted inside a `Split` frame for a given
    /// `where`-clause.
    Group(ExprId),
}

/// A recorded position of a previously emitted value (§3).
#[derive(Clone, Copy, Debug)]
pub struct Mark {
    /// Position in `bytecode` immediately after the value was produced.
    pub index: usize,
    /// The value's depth below the top of stack at the moment of marking.
    pub offset: u32,
}

/// The accumulating state of one emission (§3, §4.1).
pub struct Emission {
    bytecode: Vec<Instruction>,
    marks: HashMap<MarkKey, Mark>,
    /// `where`-origin to its associated extra (non-key) filter predicates,
    /// recorded the first time a `Group` bucket leaf is walked (§4.7).
    buckets: HashMap<ExprId, Vec<Rc<Expr>>>,
    cur_line: Option<(u32, String)>,
}

impl Emission {
    pub fn new() -> Self {
        Self {
            bytecode: Vec::new(),
            marks: HashMap::new(),
            buckets: HashMap::new(),
            cur_line: None,
        }
    }

    /// Current length of `bytecode` — the in-progress append point.
    pub fn len(&self) -> usize {
        self.bytecode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytecode.is_empty()
    }

    /// Append one instruction at the end. Shifts no marks.
    pub fn emit(&mut self, instr: Instruction) {
        self.bytecode.push(instr);
    }

    /// Append several instructions at the end, in order.
    pub fn emit_all(&mut self, instrs: impl IntoIterator<Item = Instruction>) {
        for i in instrs {
            self.emit(i);
        }
    }

    /// Splice a sequence in at absolute position `idx`. Every mark with
    /// `index > idx` shifts by the splice length; marks with `index <= idx`
    /// are unchanged (they denote positions at or before the splice point,
    /// whose meaning the splice does not disturb).
    pub fn emit_at(&mut self, instrs: Vec<Instruction>, idx: usize) {
        let len = instrs.len();
        self.bytecode.splice(idx..idx, instrs);
        if len == 0 {
            return;
        }
        for mark in self.marks.values_mut() {
            if mark.index > idx {
                mark.index += len;
            }
        }
    }

    /// Emit a `Line(n, t)` marker unless it is identical to the last one
    /// emitted (I5).
    pub fn emit_line(&mut self, n: u32, text: &str) {
        if self.cur_line.as_ref().map(|(ln, t)| (*ln, t.as_str())) == Some((n, text)) {
            return;
        }
        self.emit(Instruction::Line(n, text.to_string()));
        self.cur_line = Some((n, text.to_string()));
    }

    /// Record `key -> (idx, offset)`. A programmer error (I4 violation) if
    /// `key` is already present.
    pub fn mark(&mut self, key: MarkKey, idx: usize, offset: u32) -> Result<(), EmitError> {
        if self.marks.contains_key(&key) {
            return Err(EmitError::DuplicateMark(key));
        }
        self.marks.insert(key, Mark { index: idx, offset });
        Ok(())
    }

    /// Record `key` at the current end of bytecode, offset 0 — the common
    /// case for expression- and dispatch-level memoization (§4.3 cases 6-7).
    pub fn mark_here(&mut self, key: MarkKey) -> Result<(), EmitError> {
        let idx = self.len();
        self.mark(key, idx, 0)
    }

    pub fn has_mark(&self, key: &MarkKey) -> bool {
        self.marks.contains_key(key)
    }

    pub fn record_bucket_extras(&mut self, origin: ExprId, extras: Vec<Rc<Expr>>) {
        self.buckets.entry(origin).or_insert(extras);
    }

    /// Running operand-stack depth after `bytecode[..idx]` — the sum of
    /// every instruction's net delta up to (not including) position `idx`.
    pub fn stack_depth_at(&self, idx: usize) -> i64 {
        self.bytecode[..idx].iter().map(Instruction::net_delta).sum()
    }

    /// Running operand-stack depth at the current end of bytecode.
    pub fn current_depth(&self) -> i64 {
        self.stack_depth_at(self.len())
    }

    /// `emit_or_dup(key, thunk)` (§4.3): reuse the mark if present,
    /// otherwise run `thunk` and mark the result at the current end with
    /// offset 0.
    pub fn emit_or_dup(
        &mut self,
        key: MarkKey,
        thunk: impl FnOnce(&mut Self) -> Result<(), EmitError>,
    ) -> Result<(), EmitError> {
        if self.has_mark(&key) {
            return self.emit_dup(&key);
        }
        thunk(self)?;
        self.mark_here(key)
    }

    pub fn into_bytecode(self) -> Vec<Instruction> {
        self.bytecode
    }
}

impl Default for Emission {
    fn default() -> Self {
        Self::new()
    }
}

/// The public entry point (§6): lower a fully elaborated expression to a
/// complete instruction sequence.
pub fn emit(expr: &Expr) -> Result<Vec<Instruction>, EmitError> {
    let mut emission = Emission::new();
    emission.lower_expr(expr)?;
    debug_assert_eq!(
        emission.current_depth(),
        1,
        "a complete emission must leave exactly one value on the stack (I2)"
    );
    Ok(emission.into_bytecode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Op;

    #[test]
    fn emit_line_suppresses_consecutive_duplicates() {
        let mut e = Emission::new();
        e.emit_line(1, "a");
        e.emit_line(1, "a");
        e.emit_line(2, "b");
        e.emit_line(2, "b");
        assert_eq!(
            e.into_bytecode(),
            vec![
                Instruction::Line(1, "a".into()),
                Instruction::Line(2, "b".into()),
            ]
        );
    }

    #[test]
    fn mark_rejects_duplicate_keys() {
        let mut e = Emission::new();
        e.emit(Instruction::PushNum("1".into()));
        let key = MarkKey::Expr(crate::ast::expr_id(&Rc::new(Expr::new(
            crate::span::SourceLoc::dummy(),
            crate::ast::ExprKind::Num("1".into()),
            crate::ast::Provenance::value(),
        ))));
        e.mark_here(key.clone()).unwrap();
        let err = e.mark_here(key).unwrap_err();
        assert!(matches!(err, EmitError::DuplicateMark(_)));
    }

    #[test]
    fn emit_at_shifts_only_marks_strictly_after_the_splice_point() {
        let mut e = Emission::new();
        e.emit(Instruction::PushNum("1".into()));
        e.emit(Instruction::PushNum("2".into()));
        e.mark(MarkKey::Expr(crate::ast::expr_id(&Rc::new(Expr::new(
            crate::span::SourceLoc::dummy(),
            crate::ast::ExprKind::Num("2".into()),
            crate::ast::Provenance::value(),
        )))), 1, 0)
        .unwrap();
        let after_key = MarkKey::Expr(crate::ast::expr_id(&Rc::new(Expr::new(
            crate::span::SourceLoc::dummy(),
            crate::ast::ExprKind::Num("3".into()),
            crate::ast::Provenance::value(),
        ))));
        e.mark(after_key.clone(), 2, 0).unwrap();

        e.emit_at(vec![Instruction::Map1(Op::Neg)], 1);

        assert_eq!(e.marks[&after_key].index, 3);
    }

    #[test]
    fn stack_depth_tracks_net_deltas() {
        let mut e = Emission::new();
        e.emit(Instruction::PushNum("1".into()));
        e.emit(Instruction::PushNum("2".into()));
        e.emit(Instruction::Map2Cross(Op::Add));
        assert_eq!(e.current_depth(), 1);
    }
}
