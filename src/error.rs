//! Emitter errors (§7): always a compiler-internal invariant violation, not
//! a diagnostic ever shown to a Quirrel author. The passes upstream of this
//! crate (parser, binder, provenance checker, grouping solver) are the ones
//! that reject malformed queries; by the time an [`crate::ast::Expr`] is
//! handed to [`crate::emit::emit`] it is already known-valid, so every
//! variant here represents a bug in this crate or its input, not user error.

use thiserror::Error;

use crate::emit::MarkKey;
use crate::span::SourceLoc;

#[derive(Debug, Error)]
pub enum EmitError {
    /// A binary operator or filter needed a concrete provenance to choose
    /// between `Map2Cross`/`Map2Match` and found only `Null`/`Value`
    /// sentinels on both sides.
    #[error("null provenance reached where a concrete provenance was required")]
    NullProvenance,

    /// An AST shape this crate does not lower: a `NullBinding` dispatch, a
    /// `BuiltIn` with an unrecognized name, or a `TicVar` whose binding is
    /// not a `UserDef` (§7).
    #[error("not implemented: {description} at {loc:?}")]
    NotImplemented { description: String, loc: SourceLoc },

    /// A mark was recorded twice for the same key (I4) — a bug in the
    /// mark-and-dup splice engine, never a property of valid input.
    #[error("mark already recorded for {0:?}")]
    DuplicateMark(MarkKey),
}
