//! The expression lowerer (§4.2): structural recursion over every AST node
//! kind. Each node first gets a line marker, then its node-specific
//! lowering, then the constraint check (§4.5) that applies any pending
//! `constrainingExpr` filter.

use std::rc::Rc;

use crate::ast::{BinOp, Expr, ExprKind};
use crate::error::EmitError;
use crate::instruction::{Instruction, Op};

use super::{Emission, MarkKey};

fn bin_op_instruction(op: BinOp) -> Op {
    match op {
        BinOp::Add => Op::Add,
        BinOp::Sub => Op::Sub,
        BinOp::Mul => Op::Mul,
        BinOp::Div => Op::Div,
        BinOp::Lt => Op::Lt,
        BinOp::LtEq => Op::LtEq,
        BinOp::Gt => Op::Gt,
        BinOp::GtEq => Op::GtEq,
        BinOp::Eq => Op::Eq,
        BinOp::NotEq => Op::NotEq,
        BinOp::Or => Op::Or,
        BinOp::And => Op::And,
    }
}

/// The direct value-producing children of `e` — exactly the subset this
/// crate recurses into from `lower_expr_kind`. Used by the constraint check
/// (§4.5) to ask whether a child already applied the same constraint.
fn children_of(e: &Expr) -> Vec<Rc<Expr>> {
    match &e.kind {
        ExprKind::Str(_) | ExprKind::Num(_) | ExprKind::Bool(_) => vec![],
        ExprKind::New(c) | ExprKind::Neg(c) | ExprKind::Comp(c) | ExprKind::Paren(c) => {
            vec![Rc::clone(c)]
        }
        ExprKind::Relate { in_, .. } => vec![Rc::clone(in_)],
        ExprKind::Let { right, .. } => vec![Rc::clone(right)],
        ExprKind::TicVar { .. } => vec![],
        ExprKind::BinOp { left, right, .. } => vec![Rc::clone(left), Rc::clone(right)],
        ExprKind::Descent { child, .. } => vec![Rc::clone(child)],
        ExprKind::Deref { left, right }
        | ExprKind::With { left, right }
        | ExprKind::Where { left, right }
        | ExprKind::Union { left, right }
        | ExprKind::Intersect { left, right } => vec![Rc::clone(left), Rc::clone(right)],
        ExprKind::ObjectDef(fields) => fields.iter().map(|(_, v)| Rc::clone(v)).collect(),
        ExprKind::ArrayDef(values) => values.clone(),
        ExprKind::Dispatch { actuals, .. } => actuals.clone(),
    }
}

impl Emission {
    /// Lower one AST node: line marker, node-specific lowering, constraint
    /// check. Every call leaves the operand stack exactly one value deeper
    /// than when it started (I2).
    pub fn lower_expr(&mut self, e: &Rc<Expr>) -> Result<(), EmitError> {
        self.emit_line(e.loc.line, &e.loc.text);
        self.lower_expr_kind(e)?;
        self.emit_constraint_check(e)
    }

    fn lower_expr_kind(&mut self, e: &Rc<Expr>) -> Result<(), EmitError> {
        match &e.kind {
            ExprKind::Str(s) => self.emit(Instruction::PushString(s.clone())),
            ExprKind::Num(n) => self.emit(Instruction::PushNum(n.clone())),
            ExprKind::Bool(true) => self.emit(Instruction::PushTrue),
            ExprKind::Bool(false) => self.emit(Instruction::PushFalse),

            ExprKind::New(child) => {
                self.lower_expr(child)?;
                self.emit(Instruction::Map1(Op::New));
            }
            ExprKind::Neg(child) => {
                self.lower_expr(child)?;
                self.emit(Instruction::Map1(Op::Neg));
            }
            ExprKind::Comp(child) => {
                self.lower_expr(child)?;
                self.emit(Instruction::Map1(Op::Comp));
            }
            // Transparent: the literal source behavior of emitting nothing
            // would violate I2 for a top-level parenthesized expression
            // (SPEC_FULL §9 Open Questions); corrected here to lower the
            // child directly.
            ExprKind::Paren(child) => self.lower_expr(child)?,

            // Only `in_` carries a value; `from`/`to` are provenance-only
            // and were already consumed by the upstream checker.
            ExprKind::Relate { in_, .. } => self.lower_expr(in_)?,

            // The `left` body is lowered lazily at each `Dispatch` site
            // (§4.3), never here.
            ExprKind::Let { right, .. } => self.lower_expr(right)?,

            ExprKind::TicVar { let_, name } => {
                let key = MarkKey::TicVar(let_.clone(), name.clone());
                self.emit_dup(&key)?;
            }

            ExprKind::BinOp { op, left, right } => {
                self.emit_map2(left, right, bin_op_instruction(*op))?;
            }

            ExprKind::Descent { child, property } => {
                self.lower_expr(child)?;
                self.emit(Instruction::PushString(property.clone()));
                // `property` carries scalar (Value) provenance, which the
                // shared-possibilities rule (§4.4) always excludes from a
                // match — so this is unconditionally the cross form.
                let scalar = Self::scalar_provenance();
                let op = if child.provenance.is_matched_with(&scalar) {
                    Instruction::Map2Match(Op::DerefObject)
                } else {
                    Instruction::Map2Cross(Op::DerefObject)
                };
                self.emit(op);
            }

            ExprKind::Deref { left, right } => self.emit_map2(left, right, Op::DerefArray)?,
            ExprKind::With { left, right } => self.emit_map2(left, right, Op::JoinObject)?,
            ExprKind::Where { left, right } => self.emit_filter(left, right)?,

            ExprKind::Union { left, right } => {
                self.lower_expr(left)?;
                self.lower_expr(right)?;
                self.emit(Instruction::IUnion);
            }
            ExprKind::Intersect { left, right } => {
                self.lower_expr(left)?;
                self.lower_expr(right)?;
                self.emit(Instruction::IIntersect);
            }

            ExprKind::ObjectDef(fields) => self.emit_object_literal(fields)?,
            ExprKind::ArrayDef(values) => self.emit_array_literal(values)?,

            ExprKind::Dispatch {
                name,
                actuals,
                binding,
                buckets,
            } => self.emit_dispatch(e, name, actuals, binding, buckets)?,
        }
        Ok(())
    }

    /// The §4.5 constraint check, run after every node.
    fn emit_constraint_check(&mut self, e: &Rc<Expr>) -> Result<(), EmitError> {
        let Some(constraint) = e.constraining_expr.clone() else {
            return Ok(());
        };
        if *constraint == **e {
            return Ok(());
        }
        let already_applied = children_of(e).iter().any(|child| {
            child
                .constraining_expr
                .as_ref()
                .is_some_and(|cc| **cc == *constraint)
        });
        if already_applied {
            return Ok(());
        }

        self.lower_expr(&constraint)?;
        self.emit(Instruction::Dup);
        self.emit(Instruction::Map2Match(Op::Eq));
        self.emit(Instruction::FilterMatch(0, None));
        Ok(())
    }
}
