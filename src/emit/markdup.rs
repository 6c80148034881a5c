//! The mark-and-dup engine (§4.6): realizes value reuse by retroactively
//! splicing a duplicate into the bytecode at the point the value was
//! originally produced, then retrieving it at the reuse site.
//!
//! `Swap(d)` is this target's sole stack-rearrangement primitive: it
//! exchanges the elements at depth `d-1` and `d` (an *adjacent* exchange),
//! matching the teacher's `StackManager`-style spill/reload helpers, which
//! move values one unit at a time rather than through a single variadic
//! move. Walking a value from depth `a` to the top is therefore a
//! descending chain `Swap(a), Swap(a-1), …, Swap(1)`; walking it back down
//! to depth `b` is the mirrored ascending chain `Swap(1), Swap(2), …,
//! Swap(b)`. Both preserve the relative order of every element the walk
//! passes through.
//!
//! The reuse splice (§4.6) needs both directions twice over: pull the
//! marked value up, `Dup` it, walk the *original* back down to its prior
//! depth (now one deeper, to make room for the copy), then walk the *copy*
//! itself all the way down past everything that existed at the mark.

use super::{Emission, MarkKey};
use crate::error::EmitError;
use crate::instruction::Instruction;

impl Emission {
    /// Pull the element currently at depth `depth` to the top, preserving
    /// the relative order of everything above it.
    fn pull_to_top(depth: u32) -> Vec<Instruction> {
        (1..=depth).rev().map(Instruction::Swap).collect()
    }

    /// Push the element currently just below the top (depth 1) down to
    /// depth `depth`, preserving the relative order of everything it passes.
    fn push_down_to(depth: u32) -> Vec<Instruction> {
        (2..=depth).map(Instruction::Swap).collect()
    }

    /// Push the current top down to depth `depth`, preserving the relative
    /// order of everything it passes through — the mirror image of
    /// `pull_to_top`: same swap arguments, ascending instead of descending.
    fn sink_to_bottom(depth: u32) -> Vec<Instruction> {
        (1..=depth).map(Instruction::Swap).collect()
    }

    /// `emit_dup(key)` (§4.6): realize a reuse of the value recorded under
    /// `key`.
    pub(super) fn emit_dup(&mut self, key: &MarkKey) -> Result<(), EmitError> {
        let mark = *self
            .marks
            .get(key)
            .expect("emit_dup called for an unmarked key");
        let insert_idx = mark.index;
        let offset = mark.offset;

        // Computed against the bytecode as it stands *before* either
        // splice below, per §4.6 steps 1-2.
        let insert_stack = u32::try_from(self.stack_depth_at(insert_idx))
            .expect("stack depth at a mark is always non-negative (I1/I3)");
        let old_end_stack = u32::try_from(self.current_depth())
            .expect("stack depth is always non-negative (I1)");

        // Splice at `insert_idx`: pull the marked value to the top, dup it,
        // restore the *original* to its prior depth (one deeper now, to
        // make room for the copy), then sink the *copy* all the way to the
        // bottom of what existed at `insert_idx`, out of the way of
        // everything emitted since.
        let mut splice = Self::pull_to_top(offset);
        splice.push(Instruction::Dup);
        splice.extend(Self::push_down_to(offset + 1));
        splice.extend(Self::sink_to_bottom(insert_stack));
        self.emit_at(splice, insert_idx);

        // Splice at the current end: pull the preserved duplicate, now at
        // depth `old_end_stack` (everything emitted since `insert_idx` sits
        // above it), back to the top.
        let retrieve = Self::pull_to_top(old_end_stack);
        self.emit_all(retrieve);

        Ok(())
    }
}
