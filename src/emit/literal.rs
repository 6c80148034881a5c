//! Object and array literal lowering (§4.2.1, §4.2.2): fields/elements are
//! wrapped individually, then joined within provenance-equal groups, then
//! the groups themselves are cross-joined together. Arrays additionally run
//! a reorder pass afterward, since grouping can scramble source order.

use std::rc::Rc;

use crate::ast::{Expr, Provenance};
use crate::error::EmitError;
use crate::instruction::{Instruction, Op};

use super::Emission;

/// Stable-partitions `0..provs.len()` by provenance equality: indices with
/// equal provenance land in the same group, in first-occurrence order of
/// both the groups and the members within each group. This is the "group by
/// provenance" of §4.2.1/§4.2.2 — a true partition, not a run-length
/// grouping of adjacent equal elements, which is why joining can change
/// field/element order.
fn group_by_provenance(provs: &[Provenance]) -> Vec<Vec<usize>> {
    let mut groups: Vec<(&Provenance, Vec<usize>)> = Vec::new();
    for (i, p) in provs.iter().enumerate() {
        match groups.iter_mut().find(|(gp, _)| *gp == p) {
            Some((_, members)) => members.push(i),
            None => groups.push((p, vec![i])),
        }
    }
    groups.into_iter().map(|(_, members)| members).collect()
}

impl Emission {
    /// Emit every group in `groups`, wrapping each member with `wrap` (which
    /// must leave exactly one value on the stack), joining adjacent members
    /// of a group with the match form unless the group's own provenance is
    /// scalar (§4.2.1), then cross-joining the per-group results together.
    fn emit_grouped_join(
        &mut self,
        groups: &[Vec<usize>],
        provs: &[Provenance],
        join_op: Op,
        mut wrap: impl FnMut(&mut Self, usize) -> Result<(), EmitError>,
    ) -> Result<(), EmitError> {
        let mut first_group = true;
        for group in groups {
            for (pos, &i) in group.iter().enumerate() {
                wrap(self, i)?;
                if pos > 0 {
                    let op = if provs[i] == Provenance::value() {
                        Instruction::Map2Cross(join_op.clone())
                    } else {
                        Instruction::Map2Match(join_op.clone())
                    };
                    self.emit(op);
                }
            }
            if !first_group {
                self.emit(Instruction::Map2Cross(join_op.clone()));
            }
            first_group = false;
        }
        Ok(())
    }

    pub(super) fn emit_object_literal(
        &mut self,
        fields: &[(String, Rc<Expr>)],
    ) -> Result<(), EmitError> {
        let provs: Vec<Provenance> = fields.iter().map(|(_, v)| v.provenance.clone()).collect();
        let groups = group_by_provenance(&provs);
        self.emit_grouped_join(&groups, &provs, Op::JoinObject, |this, i| {
            let (key, value) = &fields[i];
            this.emit(Instruction::PushString(key.clone()));
            this.lower_expr(value)?;
            this.emit(Instruction::Map2Cross(Op::WrapObject));
            Ok(())
        })
    }

    pub(super) fn emit_array_literal(&mut self, values: &[Rc<Expr>]) -> Result<(), EmitError> {
        let provs: Vec<Provenance> = values.iter().map(|v| v.provenance.clone()).collect();
        let groups = group_by_provenance(&provs);
        self.emit_grouped_join(&groups, &provs, Op::JoinArray, |this, i| {
            this.lower_expr(&values[i])?;
            this.emit(Instruction::Map1(Op::WrapArray));
            Ok(())
        })?;

        let emitted_order: Vec<usize> = groups.into_iter().flatten().collect();
        self.emit_array_reorder(&emitted_order);
        Ok(())
    }

    /// Restore source order after provenance-grouped joining (§4.2.2).
    /// `emitted_order[p]` is the source index currently sitting at array
    /// position `p`. For each target index `n` in turn, walk its current
    /// holder down to position `n` one adjacent swap at a time, emitting an
    /// `ArraySwap` per step.
    fn emit_array_reorder(&mut self, emitted_order: &[usize]) {
        let mut current = emitted_order.to_vec();
        for n in 0..current.len() {
            let mut pos = current
                .iter()
                .position(|&source_idx| source_idx == n)
                .expect("every source index appears exactly once");
            while pos > n {
                self.emit(Instruction::PushString((pos - 1).to_string()));
                self.emit(Instruction::Map2Cross(Op::ArraySwap));
                current.swap(pos - 1, pos);
                pos -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, ExprKind};
    use crate::span::SourceLoc;

    fn num(n: &str, prov: Provenance) -> Rc<Expr> {
        Rc::new(Expr::new(SourceLoc::dummy(), ExprKind::Num(n.into()), prov))
    }

    #[test]
    fn array_with_uniform_provenance_needs_no_reorder() {
        let values = vec![num("1", Provenance::value()), num("2", Provenance::value())];
        let mut e = Emission::new();
        e.emit_array_literal(&values).unwrap();
        assert_eq!(
            e.into_bytecode(),
            vec![
                Instruction::PushNum("1".into()),
                Instruction::Map1(Op::WrapArray),
                Instruction::PushNum("2".into()),
                Instruction::Map1(Op::WrapArray),
                Instruction::Map2Cross(Op::JoinArray),
            ]
        );
    }

    #[test]
    fn array_with_mixed_provenance_reorders_after_grouping() {
        // [clicks_a, literal, clicks_b] groups as [0, 2], [1] (two distinct
        // provenances), scrambling source order; the reorder pass must
        // restore it.
        let a = num("a", Provenance::path("/clicks"));
        let lit = num("1", Provenance::value());
        let b = num("b", Provenance::path("/clicks"));
        let values = vec![a, lit, b];

        let mut e = Emission::new();
        e.emit_array_literal(&values).unwrap();
        let bytecode = e.into_bytecode();

        let swap_count = bytecode
            .iter()
            .filter(|i| matches!(i, Instruction::Map2Cross(Op::ArraySwap)))
            .count();
        assert!(swap_count > 0, "grouping scrambled order, a swap is required");
    }

    #[test]
    fn group_by_provenance_partitions_rather_than_runs() {
        let provs = vec![
            Provenance::path("/a"),
            Provenance::value(),
            Provenance::path("/a"),
        ];
        let groups = group_by_provenance(&provs);
        assert_eq!(groups, vec![vec![0, 2], vec![1]]);
    }
}
