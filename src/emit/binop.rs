//! Binary operator and filter provenance dispatch (§4.4): choose between the
//! cross-product and provenance-matched forms of a binary combinator by
//! comparing the two operands' `shared_possibilities`.

use std::rc::Rc;

use crate::ast::{Expr, Provenance};
use crate::error::EmitError;
use crate::instruction::{Instruction, Op};

use super::Emission;

impl Emission {
    /// Lower `left` then `right`, then combine them with `op` — `Map2Cross`
    /// if the two provenances share no possibility, `Map2Match` otherwise.
    pub(super) fn emit_map2(
        &mut self,
        left: &Rc<Expr>,
        right: &Rc<Expr>,
        op: Op,
    ) -> Result<(), EmitError> {
        self.lower_expr(left)?;
        self.lower_expr(right)?;
        if left.provenance.is_matched_with(&right.provenance) {
            self.emit(Instruction::Map2Match(op));
        } else {
            self.emit(Instruction::Map2Cross(op));
        }
        Ok(())
    }

    /// Lower `value` then `predicate`, then filter `value` by `predicate` —
    /// `FilterCross` for unmatched provenance, `FilterMatch` for matched
    /// (§4.4, `where`'s filter form). The predicate is the immediate top of
    /// stack once both sides are lowered, so depth is always 0 with no
    /// auxiliary stream (`None`).
    pub(super) fn emit_filter(
        &mut self,
        value: &Rc<Expr>,
        predicate: &Rc<Expr>,
    ) -> Result<(), EmitError> {
        self.lower_expr(value)?;
        self.lower_expr(predicate)?;
        if value.provenance.is_matched_with(&predicate.provenance) {
            self.emit(Instruction::FilterMatch(0, None));
        } else {
            self.emit(Instruction::FilterCross(0, None));
        }
        Ok(())
    }

    /// Provenance used when an operand has none of its own to compare
    /// against (e.g. a literal fed into `shared_possibilities` directly) —
    /// never matches anything but `Value`/`Null`, so always picks the cross
    /// form, matching a scalar operand's actual join behavior.
    pub(super) fn scalar_provenance() -> Provenance {
        Provenance::value()
    }
}
