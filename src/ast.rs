//! The elaborated Quirrel AST: the emitter's only input.
//!
//! Every node has already been parsed, name-bound, provenance-checked, and
//! (for grouping constructs) solved into bucket/solution trees by passes
//! this crate does not implement (see SPEC_FULL.md §1). Nodes are shared via
//! `Rc` rather than duplicated, matching how the upstream binder hands the
//! emitter back-references into its own tables instead of a fresh copy per
//! occurrence (SPEC_FULL.md §9, "Cyclic graphs").

use std::collections::BTreeSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::span::SourceLoc;

/// A node's provenance: which dataset(s) its value could have come from.
///
/// `possibilities` is the full set, including the sentinel tags `Value` and
/// `Null`; §4.4's "shared possibilities" computation is an intersection of
/// two `possibilities` sets with those two sentinels excluded.
///
/// Derives `Serialize`/`Deserialize` directly (unlike `Expr` and its
/// identity-bearing neighbors): it holds no `Rc`, so there is no pointer
/// sharing for a derived impl to get wrong. The CLI fixture format (`src/
/// fixture.rs`) embeds this type as-is.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProvenanceTag {
    /// A concrete dataset path, e.g. `/clicks`.
    Path(String),
    /// A literal or computed scalar with no dataset origin.
    Value,
    /// The provenance of `null` — compatible with everything, carries no
    /// join information.
    Null,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub possibilities: BTreeSet<ProvenanceTag>,
}

impl Provenance {
    pub fn new(possibilities: impl IntoIterator<Item = ProvenanceTag>) -> Self {
        Self {
            possibilities: possibilities.into_iter().collect(),
        }
    }

    pub fn value() -> Self {
        Self::new([ProvenanceTag::Value])
    }

    pub fn path(p: impl Into<String>) -> Self {
        Self::new([ProvenanceTag::Path(p.into())])
    }

    /// The shared possibilities between two operands (§4.4): the
    /// intersection of their possibility sets, excluding the two sentinels.
    pub fn shared_possibilities(&self, other: &Provenance) -> BTreeSet<ProvenanceTag> {
        self.possibilities
            .intersection(&other.possibilities)
            .filter(|t| !matches!(t, ProvenanceTag::Value | ProvenanceTag::Null))
            .cloned()
            .collect()
    }

    /// Whether two operands of this provenance pair are "aligned" (match
    /// form) or must cross (cross form). See §4.4.
    pub fn is_matched_with(&self, other: &Provenance) -> bool {
        !self.shared_possibilities(other).is_empty()
    }
}

/// Binary arithmetic / comparison / logical operators (§4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eq,
    NotEq,
    Or,
    And,
}

/// A user-defined `let` binding: a name, its tic-variable parameters, and a
/// body lowered lazily at each dispatch site (§4.2, `Let`; §4.3).
///
/// Identity, not structure, is what distinguishes one `let` from another for
/// mark-table purposes (`MarkKey::TicVar`/`MarkKey::Dispatch` in
/// `crate::emit`) — two syntactically identical `let`s are still distinct
/// bindings. `LetHandle` below captures that identity via `Rc` pointer
/// equality.
#[derive(Clone, Debug, PartialEq)]
pub struct LetDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Rc<Expr>,
}

/// A hashable, pointer-identity handle to a `LetDef`, for use as (part of) a
/// mark-table key. Two handles are equal iff they point at the same `LetDef`
/// allocation — never by structural comparison.
///
/// Holds a `Weak`, not an `Rc`: a `let`'s own body routinely contains
/// `TicVar`/`Dispatch` nodes whose handle names the very `LetDef` that
/// contains them (tic-variables are, structurally, a back-edge). An `Rc`
/// field here would make that a genuine reference cycle and, worse, make the
/// back-edge impossible to construct at all in safe Rust (the owning `Rc`
/// doesn't exist yet while its own body is being built). `Weak` sidesteps
/// both problems and is built via `LetDef::new_recursive`, which hands out a
/// `Weak` through `Rc::new_cyclic` before the `Rc` exists. The enclosing
/// `Let` node (`ExprKind::Let::def`) is always an ancestor of anything that
/// dereferences the handle, so `upgrade` in `def()` never fails in practice.
#[derive(Clone, Debug)]
pub struct LetHandle(pub std::rc::Weak<LetDef>);

impl LetHandle {
    /// Resolves the handle back to its `LetDef`.
    ///
    /// # Panics
    /// If the `LetDef` has already been dropped. Every handle is created from
    /// a live `Rc` that an ancestor node keeps alive for the duration of one
    /// `emit` call, so this should never trigger during lowering.
    pub fn def(&self) -> Rc<LetDef> {
        self.0
            .upgrade()
            .expect("LetHandle outlived the LetDef it names")
    }
}

impl PartialEq for LetHandle {
    fn eq(&self, other: &Self) -> bool {
        std::rc::Weak::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for LetHandle {}
impl std::hash::Hash for LetHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (self.0.as_ptr() as usize).hash(state);
    }
}

impl LetDef {
    /// Builds a `LetDef` whose body can reference its own identity via
    /// `LetHandle` (tic-vars naming their enclosing `let`). `build_body`
    /// receives a handle to the not-yet-complete `LetDef` and must produce
    /// the body using it; the `Rc` itself only becomes dereferenceable once
    /// this call returns.
    pub fn new_recursive(
        name: String,
        params: Vec<String>,
        build_body: impl FnOnce(&LetHandle) -> Rc<Expr>,
    ) -> Rc<LetDef> {
        Rc::new_cyclic(|weak| {
            let handle = LetHandle(weak.clone());
            let body = build_body(&handle);
            LetDef { name, params, body }
        })
    }
}

/// A pointer-identity handle to any AST node, used to key `MarkKey::Dispatch`
/// actuals tuples (two dispatch sites share a mark iff every actual is,
/// pointer-for-pointer, the very same subexpression instance).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExprId(usize);

pub fn expr_id(e: &Rc<Expr>) -> ExprId {
    ExprId(Rc::as_ptr(e) as usize)
}

/// How a `Dispatch` name resolves (§6, "binding").
#[derive(Clone, Debug, PartialEq)]
pub enum Binding {
    /// A built-in with a known name and fixed arity (reductions, set
    /// reductions, `load`). Unrecognized names are also represented here and
    /// rejected at lowering time (§7).
    BuiltIn { name: String, arity: u32 },
    /// A unary stdlib function dispatched via provenance (§4.3 case 4).
    StdlibBuiltIn1(String),
    /// A binary stdlib function dispatched via provenance (§4.3 case 4).
    StdlibBuiltIn2(String),
    /// A user-defined `let`.
    UserDef(LetHandle),
    /// Unresolved — always a lowering error (§7).
    NullBinding,
}

/// A grouping bucket (§4.7): the shape of one `solve` operand.
#[derive(Clone, Debug, PartialEq)]
pub enum Bucket {
    Union(Box<Bucket>, Box<Bucket>),
    Intersect(Box<Bucket>, Box<Bucket>),
    Group {
        /// The `where`-clause this group originates from; also the key used
        /// in `Emission::buckets` and `MarkKey::Group`.
        origin: Rc<Expr>,
        forest: Solution,
        /// Filter predicates associated with this group, carried for later
        /// reference by the grouping solver's consumers (opaque to the
        /// emitter beyond recording them in `Emission::buckets`).
        extras: Vec<Rc<Expr>>,
    },
}

/// The condition tree attached to a group (§4.7).
#[derive(Clone, Debug, PartialEq)]
pub enum Solution {
    Conjunction(Box<Solution>, Box<Solution>),
    Disjunction(Box<Solution>, Box<Solution>),
    Definition(Rc<Expr>),
}

/// One AST node. Every node carries its source location and computed
/// provenance; `constraining_expr` is the optional precomputed attribute
/// consumed by the constraint-emission pass (§4.5).
#[derive(Clone, Debug)]
pub struct Expr {
    pub loc: SourceLoc,
    pub kind: ExprKind,
    pub provenance: Provenance,
    pub constraining_expr: Option<Rc<Expr>>,
}

impl Expr {
    pub fn new(loc: SourceLoc, kind: ExprKind, provenance: Provenance) -> Self {
        Self {
            loc,
            kind,
            provenance,
            constraining_expr: None,
        }
    }

    pub fn with_constraint(mut self, constraint: Rc<Expr>) -> Self {
        self.constraining_expr = Some(constraint);
        self
    }

    /// Structural equality ignoring `loc` (and ignoring `constraining_expr`,
    /// which would make this recursive in the wrong direction) — used by
    /// §4.5 to test whether a child's constraining expression is "the same"
    /// as its parent's.
    pub fn same_shape(&self, other: &Expr) -> bool {
        self.kind == other.kind
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Str(String),
    Num(String),
    Bool(bool),

    New(Rc<Expr>),
    Neg(Rc<Expr>),
    Comp(Rc<Expr>),
    Paren(Rc<Expr>),

    /// `Relate(from, to, in)`: only `in` carries a value; `from`/`to` are
    /// provenance-only and consumed entirely by the upstream checker.
    Relate {
        from: Rc<Expr>,
        to: Rc<Expr>,
        in_: Rc<Expr>,
    },

    /// `let id(params) := left in right` — `left` is lowered lazily, once
    /// per distinct dispatch (§4.3), not here.
    Let {
        def: Rc<LetDef>,
        right: Rc<Expr>,
    },

    /// Reference to a tic-variable of an enclosing user-defined `let`.
    TicVar {
        let_: LetHandle,
        name: String,
    },

    BinOp {
        op: BinOp,
        left: Rc<Expr>,
        right: Rc<Expr>,
    },

    Descent {
        child: Rc<Expr>,
        property: String,
    },
    Deref {
        left: Rc<Expr>,
        right: Rc<Expr>,
    },
    With {
        left: Rc<Expr>,
        right: Rc<Expr>,
    },
    Where {
        left: Rc<Expr>,
        right: Rc<Expr>,
    },
    Union {
        left: Rc<Expr>,
        right: Rc<Expr>,
    },
    Intersect {
        left: Rc<Expr>,
        right: Rc<Expr>,
    },

    ObjectDef(Vec<(String, Rc<Expr>)>),
    ArrayDef(Vec<Rc<Expr>>),

    Dispatch {
        name: String,
        actuals: Vec<Rc<Expr>>,
        binding: Binding,
        /// Non-empty only for a grouping dispatch (`actuals.len() !=
        /// def.params.len()`); an ordered `name -> Bucket` map, kept as a
        /// `Vec` to preserve iteration order (§4.7 step 4 walks it
        /// left-to-right).
        buckets: Vec<(String, Bucket)>,
    },
}

// `ExprKind` needs `PartialEq` for `Expr::same_shape`; `Rc<Expr>` compares
// structurally via `Expr`'s own (hand-rolled) `PartialEq`, which ignores
// `provenance`/`constraining_expr`/`loc` — only `kind` participates.
impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}
