//! Bucket/solution lowering (§4.7): the `solve` grouping construct. A
//! grouping dispatch lowers its buckets, brackets them in a `Split`/`Merge`
//! frame, and marks every tic-var and per-group value at the stack offset
//! the frame places it at, so later references inside the body (or further
//! out) can `dup` the right position.

use std::rc::Rc;

use crate::ast::{expr_id, Bucket, Expr, LetHandle, Solution};
use crate::error::EmitError;
use crate::instruction::{Instruction, Op};

use super::{Emission, MarkKey};

/// Every `Group` leaf in `bucket`, pre-order (left before right for
/// `Union`/`Intersect`), paired with its extras. A leaf's origin may repeat
/// across sibling buckets (the solver is free to hand two `solve` operands
/// the same `where`-clause); each occurrence still corresponds to a
/// physically pushed stack value, so callers must not deduplicate this list
/// when counting stack slots — only when deciding what to `mark`.
fn group_leaves(bucket: &Bucket) -> Vec<(Rc<Expr>, Vec<Rc<Expr>>)> {
    match bucket {
        Bucket::Union(l, r) | Bucket::Intersect(l, r) => {
            let mut leaves = group_leaves(l);
            leaves.extend(group_leaves(r));
            leaves
        }
        Bucket::Group { origin, extras, .. } => vec![(Rc::clone(origin), extras.clone())],
    }
}

impl Emission {
    pub(super) fn emit_bucket(&mut self, bucket: &Bucket) -> Result<(), EmitError> {
        match bucket {
            Bucket::Union(l, r) => {
                self.emit_bucket(l)?;
                self.emit_bucket(r)?;
                self.emit(Instruction::ZipBuckets(false));
            }
            Bucket::Intersect(l, r) => {
                self.emit_bucket(l)?;
                self.emit_bucket(r)?;
                self.emit(Instruction::ZipBuckets(true));
            }
            Bucket::Group { forest, .. } => self.emit_solution(forest)?,
        }
        Ok(())
    }

    pub(super) fn emit_solution(&mut self, solution: &Solution) -> Result<(), EmitError> {
        match solution {
            Solution::Conjunction(l, r) => {
                self.emit_solution(l)?;
                self.emit_solution(r)?;
                self.emit(Instruction::Map2Match(Op::And));
            }
            Solution::Disjunction(l, r) => {
                self.emit_solution(l)?;
                self.emit_solution(r)?;
                self.emit(Instruction::Map2Match(Op::Or));
            }
            Solution::Definition(e) => self.lower_expr(e)?,
        }
        Ok(())
    }

    /// Assemble the `Split`/`Merge` frame for a grouping dispatch (§4.7
    /// steps 1-6).
    pub(super) fn emit_group_dispatch(
        &mut self,
        let_: &LetHandle,
        buckets: &[(String, Bucket)],
    ) -> Result<(), EmitError> {
        let n = u32::try_from(buckets.len()).expect("bucket count fits u32");
        let leaves_per_bucket: Vec<Vec<(Rc<Expr>, Vec<Rc<Expr>>)>> =
            buckets.iter().map(|(_, b)| group_leaves(b)).collect();
        let total_leaves: u32 = leaves_per_bucket
            .iter()
            .map(|leaves| u32::try_from(leaves.len()).expect("origin count fits u32"))
            .sum();
        let k = n + total_leaves;

        for (_, bucket) in buckets {
            self.emit_bucket(bucket)?;
        }
        self.emit(Instruction::Split(n, k));

        // Buckets are walked left-to-right, tic-var before its own groups,
        // but `Mark.offset` counts depth *below the top* (§3) and the §4.7
        // layout puts bucket 1 at the bottom of the frame: ticvar_1 is the
        // deepest value, group_{n,last} the shallowest. So walk position and
        // stack offset run in opposite directions — invert with `k - 1 -
        // pos` rather than assigning the raw walk position.
        let split_idx = self.len();
        let mut pos = 0u32;
        for (i, (name, _)) in buckets.iter().enumerate() {
            self.mark(
                MarkKey::TicVar(let_.clone(), name.clone()),
                split_idx,
                k - 1 - pos,
            )?;
            pos += 1;
            for (origin, extras) in &leaves_per_bucket[i] {
                let origin_id = expr_id(origin);
                let key = MarkKey::Group(origin_id);
                // Only the first physical occurrence of a shared origin is
                // marked (I4); later occurrences still consume a slot.
                if !self.has_mark(&key) {
                    self.mark(key, split_idx, k - 1 - pos)?;
                    self.record_bucket_extras(origin_id, extras.clone());
                }
                pos += 1;
            }
        }

        self.lower_expr(&let_.def().body)?;
        self.emit(Instruction::Merge(k));
        Ok(())
    }
}
