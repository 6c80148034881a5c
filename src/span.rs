//! Source location tags carried by every AST node.

use serde::{Deserialize, Serialize};

/// A source location: a line number plus the source text of that line.
///
/// This is deliberately coarser than a byte-offset `Span` — the emitter only
/// ever needs enough to reproduce the upstream passes' `Line(n, t)` markers
/// (see [`crate::instruction::Instruction::Line`]), never to recover an
/// exact column for diagnostics (the emitter raises no user-facing
/// diagnostics; see [`crate::error::EmitError`]).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLoc {
    pub line: u32,
    pub text: String,
}

impl SourceLoc {
    pub fn new(line: u32, text: impl Into<String>) -> Self {
        Self {
            line,
            text: text.into(),
        }
    }

    /// A placeholder location for hand-built test fixtures.
    pub fn dummy() -> Self {
        Self {
            line: 0,
            text: String::new(),
        }
    }
}
