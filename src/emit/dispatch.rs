//! Dispatch lowering (§4.3): a `Dispatch` node is polymorphic over how its
//! name resolved upstream (`binding`). Each binding kind gets its own
//! emission strategy; user-defined `let`s additionally split on arity and
//! on whether the dispatch is fully applied or a grouping dispatch.

use std::rc::Rc;

use crate::ast::{expr_id, Binding, Bucket, Expr, LetHandle};
use crate::error::EmitError;
use crate::instruction::{Instruction, LoadType, Op, ReduceOp, SetReduceOp};

use super::{Emission, MarkKey};

fn reduce_op(name: &str) -> Option<ReduceOp> {
    Some(match name {
        "count" => ReduceOp::Count,
        "geometricMean" => ReduceOp::GeometricMean,
        "max" => ReduceOp::Max,
        "mean" => ReduceOp::Mean,
        "median" => ReduceOp::Median,
        "min" => ReduceOp::Min,
        "mode" => ReduceOp::Mode,
        "stdDev" => ReduceOp::StdDev,
        "sum" => ReduceOp::Sum,
        "sumSq" => ReduceOp::SumSq,
        "variance" => ReduceOp::Variance,
        _ => return None,
    })
}

impl Emission {
    pub(super) fn emit_dispatch(
        &mut self,
        node: &Rc<Expr>,
        name: &str,
        actuals: &[Rc<Expr>],
        binding: &Binding,
        buckets: &[(String, Bucket)],
    ) -> Result<(), EmitError> {
        match binding {
            Binding::BuiltIn {
                name: bname,
                arity: _,
            } => self.emit_builtin_dispatch(node, bname, actuals),

            // Case 4: stdlib unary/binary, dispatched by provenance.
            Binding::StdlibBuiltIn1(op) => {
                self.lower_expr(&actuals[0])?;
                self.emit(Instruction::Map1(Op::BuiltInFunction1Op(op.clone())));
                Ok(())
            }
            Binding::StdlibBuiltIn2(op) => {
                self.emit_map2(&actuals[0], &actuals[1], Op::BuiltInFunction2Op(op.clone()))
            }

            // Case 5: unknown built-in handled in emit_builtin_dispatch;
            // null binding is always a lowering error.
            Binding::NullBinding => Err(EmitError::NotImplemented {
                description: format!("dispatch `{name}` with a null binding"),
                loc: node.loc.clone(),
            }),

            Binding::UserDef(let_) => self.emit_user_def_dispatch(let_, actuals, buckets),
        }
    }

    fn emit_builtin_dispatch(
        &mut self,
        node: &Rc<Expr>,
        bname: &str,
        actuals: &[Rc<Expr>],
    ) -> Result<(), EmitError> {
        // Case 1: reduction built-ins, arity 1.
        if let Some(op) = reduce_op(bname) {
            self.lower_expr(&actuals[0])?;
            self.emit(Instruction::Reduce(op));
            return Ok(());
        }
        // Case 2: set-reduction built-in, arity 1.
        if bname == "distinct" {
            self.lower_expr(&actuals[0])?;
            self.emit(Instruction::SetReduce(SetReduceOp::Distinct));
            return Ok(());
        }
        // Case 3: load built-in, arity 1.
        if bname == "load" {
            self.lower_expr(&actuals[0])?;
            self.emit(Instruction::LoadLocal(LoadType::Het));
            return Ok(());
        }
        // Case 5: unrecognized built-in name.
        Err(EmitError::NotImplemented {
            description: format!("unrecognized built-in `{bname}`"),
            loc: node.loc.clone(),
        })
    }

    fn emit_user_def_dispatch(
        &mut self,
        let_: &LetHandle,
        actuals: &[Rc<Expr>],
        buckets: &[(String, Bucket)],
    ) -> Result<(), EmitError> {
        // Case 6: zero-arity let, a memoized reference to its body.
        if let_.def().params.is_empty() {
            let body = Rc::clone(&let_.def().body);
            let key = MarkKey::Expr(expr_id(&body));
            return self.emit_or_dup(key, move |this| this.lower_expr(&body));
        }

        // Case 7, fully applied: one mark per actuals tuple, memoized.
        if actuals.len() == let_.def().params.len() {
            let key = MarkKey::Dispatch(let_.clone(), actuals.iter().map(expr_id).collect());
            if self.has_mark(&key) {
                return self.emit_dup(&key);
            }
            for (param, actual) in let_.def().params.iter().zip(actuals) {
                self.lower_expr(actual)?;
                self.mark_here(MarkKey::TicVar(let_.clone(), param.clone()))?;
            }
            self.lower_expr(&let_.def().body)?;
            self.mark_here(key)
        } else {
            // Case 7, grouping dispatch: the actuals/params mismatch is the
            // number of `solve` buckets (§4.7).
            self.emit_group_dispatch(let_, buckets)
        }
    }
}
