//! JSON fixture format for the `quirrelc emit` CLI (§6.1 of SPEC_FULL.md): a
//! serde-friendly mirror of `crate::ast`'s node shapes, with named
//! `let`-bindings standing in for `ast::LetHandle`'s pointer identity (JSON
//! has no notion of "the same allocation"). `FixtureNode::into_ast` converts
//! a parsed fixture into the real `Rc`/`Weak`-sharing AST that `emit::emit`
//! consumes, resolving each `TicVar`/`UserDef` name reference against the
//! innermost enclosing `let` of that name.
//!
//! `ast::Provenance`/`ProvenanceTag`/`BinOp` carry no identity and are reused
//! as-is; everything that names a `let` (`Expr`, `Binding`, `Bucket`,
//! `Solution`) gets a plain mirror here instead of a derived impl on the
//! identity-bearing type itself.

use std::collections::HashMap;
use std::rc::Rc;

use serde::Deserialize;

use crate::ast::{self, BinOp, Expr, ExprKind, LetDef, LetHandle, Provenance};
use crate::span::SourceLoc;

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("fixture references undefined let-binding `{0}`")]
    UnknownLet(String),
}

#[derive(Deserialize)]
pub struct FixtureNode {
    #[serde(default = "SourceLoc::dummy")]
    loc: SourceLoc,
    #[serde(default)]
    provenance: Provenance,
    #[serde(default)]
    constraining_expr: Option<Box<FixtureNode>>,
    #[serde(flatten)]
    kind: FixtureKind,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum FixtureKind {
    Str {
        value: String,
    },
    Num {
        value: String,
    },
    Bool {
        value: bool,
    },
    New {
        child: Box<FixtureNode>,
    },
    Neg {
        child: Box<FixtureNode>,
    },
    Comp {
        child: Box<FixtureNode>,
    },
    Paren {
        child: Box<FixtureNode>,
    },
    Relate {
        from: Box<FixtureNode>,
        to: Box<FixtureNode>,
        #[serde(rename = "in")]
        in_: Box<FixtureNode>,
    },
    Let {
        name: String,
        #[serde(default)]
        params: Vec<String>,
        /// The let's own definition, tic-vars inside it name `name`.
        left: Box<FixtureNode>,
        right: Box<FixtureNode>,
    },
    TicVar {
        #[serde(rename = "let")]
        let_name: String,
        name: String,
    },
    BinOp {
        op: BinOp,
        left: Box<FixtureNode>,
        right: Box<FixtureNode>,
    },
    Descent {
        child: Box<FixtureNode>,
        property: String,
    },
    Deref {
        left: Box<FixtureNode>,
        right: Box<FixtureNode>,
    },
    With {
        left: Box<FixtureNode>,
        right: Box<FixtureNode>,
    },
    Where {
        left: Box<FixtureNode>,
        right: Box<FixtureNode>,
    },
    Union {
        left: Box<FixtureNode>,
        right: Box<FixtureNode>,
    },
    Intersect {
        left: Box<FixtureNode>,
        right: Box<FixtureNode>,
    },
    ObjectDef {
        fields: Vec<(String, FixtureNode)>,
    },
    ArrayDef {
        values: Vec<FixtureNode>,
    },
    Dispatch {
        name: String,
        #[serde(default)]
        actuals: Vec<FixtureNode>,
        binding: FixtureBinding,
        #[serde(default)]
        buckets: Vec<(String, FixtureBucket)>,
    },
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum FixtureBinding {
    BuiltIn { name: String, arity: u32 },
    StdlibBuiltIn1 { op: String },
    StdlibBuiltIn2 { op: String },
    UserDef { let_name: String },
    NullBinding,
}

/// Mirrors `ast::Bucket`. Grouping fixtures are a secondary use of this
/// harness (`tests/scenarios.rs` exercises `solve` lowering directly against
/// `ast` types instead); origin sharing across buckets can't be expressed in
/// plain JSON, so each `Group`'s `origin` converts to its own fresh `Rc` —
/// fine for driving the lowering shape, but two buckets naming "the same"
/// origin in a fixture will not dedup the way a real solved tree would.
#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum FixtureBucket {
    Union {
        left: Box<FixtureBucket>,
        right: Box<FixtureBucket>,
    },
    Intersect {
        left: Box<FixtureBucket>,
        right: Box<FixtureBucket>,
    },
    Group {
        origin: FixtureNode,
        forest: FixtureSolution,
        #[serde(default)]
        extras: Vec<FixtureNode>,
    },
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum FixtureSolution {
    Conjunction {
        left: Box<FixtureSolution>,
        right: Box<FixtureSolution>,
    },
    Disjunction {
        left: Box<FixtureSolution>,
        right: Box<FixtureSolution>,
    },
    Definition {
        expr: Box<FixtureNode>,
    },
}

/// Converts fixtures into real AST nodes, tracking the lexical environment
/// of `let`-names currently in scope.
#[derive(Default)]
struct Converter {
    lets: HashMap<String, LetHandle>,
}

fn dummy_placeholder() -> Rc<Expr> {
    Rc::new(Expr::new(SourceLoc::dummy(), ExprKind::Bool(false), Provenance::default()))
}

impl Converter {
    fn lookup(&self, name: &str) -> Result<LetHandle, FixtureError> {
        self.lets
            .get(name)
            .cloned()
            .ok_or_else(|| FixtureError::UnknownLet(name.to_string()))
    }

    fn convert(&mut self, node: &FixtureNode) -> Result<Rc<Expr>, FixtureError> {
        let kind = self.convert_kind(&node.kind)?;
        let mut e = Expr::new(node.loc.clone(), kind, node.provenance.clone());
        if let Some(c) = &node.constraining_expr {
            e = e.with_constraint(self.convert(c)?);
        }
        Ok(Rc::new(e))
    }

    fn convert_kind(&mut self, kind: &FixtureKind) -> Result<ExprKind, FixtureError> {
        use FixtureKind as F;
        Ok(match kind {
            F::Str { value } => ExprKind::Str(value.clone()),
            F::Num { value } => ExprKind::Num(value.clone()),
            F::Bool { value } => ExprKind::Bool(*value),
            F::New { child } => ExprKind::New(self.convert(child)?),
            F::Neg { child } => ExprKind::Neg(self.convert(child)?),
            F::Comp { child } => ExprKind::Comp(self.convert(child)?),
            F::Paren { child } => ExprKind::Paren(self.convert(child)?),
            F::Relate { from, to, in_ } => ExprKind::Relate {
                from: self.convert(from)?,
                to: self.convert(to)?,
                in_: self.convert(in_)?,
            },
            F::Let {
                name,
                params,
                left,
                right,
            } => {
                let mut build_err = None;
                let def = LetDef::new_recursive(name.clone(), params.clone(), |handle| {
                    self.lets.insert(name.clone(), handle.clone());
                    match self.convert(left) {
                        Ok(body) => body,
                        Err(e) => {
                            build_err = Some(e);
                            dummy_placeholder()
                        }
                    }
                });
                if let Some(e) = build_err {
                    return Err(e);
                }
                let right_expr = self.convert(right)?;
                self.lets.remove(name);
                ExprKind::Let {
                    def,
                    right: right_expr,
                }
            }
            F::TicVar { let_name, name } => ExprKind::TicVar {
                let_: self.lookup(let_name)?,
                name: name.clone(),
            },
            F::BinOp { op, left, right } => ExprKind::BinOp {
                op: *op,
                left: self.convert(left)?,
                right: self.convert(right)?,
            },
            F::Descent { child, property } => ExprKind::Descent {
                child: self.convert(child)?,
                property: property.clone(),
            },
            F::Deref { left, right } => ExprKind::Deref {
                left: self.convert(left)?,
                right: self.convert(right)?,
            },
            F::With { left, right } => ExprKind::With {
                left: self.convert(left)?,
                right: self.convert(right)?,
            },
            F::Where { left, right } => ExprKind::Where {
                left: self.convert(left)?,
                right: self.convert(right)?,
            },
            F::Union { left, right } => ExprKind::Union {
                left: self.convert(left)?,
                right: self.convert(right)?,
            },
            F::Intersect { left, right } => ExprKind::Intersect {
                left: self.convert(left)?,
                right: self.convert(right)?,
            },
            F::ObjectDef { fields } => {
                let mut out = Vec::with_capacity(fields.len());
                for (key, value) in fields {
                    out.push((key.clone(), self.convert(value)?));
                }
                ExprKind::ObjectDef(out)
            }
            F::ArrayDef { values } => {
                let mut out = Vec::with_capacity(values.len());
                for v in values {
                    out.push(self.convert(v)?);
                }
                ExprKind::ArrayDef(out)
            }
            F::Dispatch {
                name,
                actuals,
                binding,
                buckets,
            } => {
                let mut out_actuals = Vec::with_capacity(actuals.len());
                for a in actuals {
                    out_actuals.push(self.convert(a)?);
                }
                let binding = self.convert_binding(binding)?;
                let mut out_buckets = Vec::with_capacity(buckets.len());
                for (bname, b) in buckets {
                    out_buckets.push((bname.clone(), self.convert_bucket(b)?));
                }
                ExprKind::Dispatch {
                    name: name.clone(),
                    actuals: out_actuals,
                    binding,
                    buckets: out_buckets,
                }
            }
        })
    }

    fn convert_binding(&mut self, binding: &FixtureBinding) -> Result<ast::Binding, FixtureError> {
        Ok(match binding {
            FixtureBinding::BuiltIn { name, arity } => ast::Binding::BuiltIn {
                name: name.clone(),
                arity: *arity,
            },
            FixtureBinding::StdlibBuiltIn1 { op } => ast::Binding::StdlibBuiltIn1(op.clone()),
            FixtureBinding::StdlibBuiltIn2 { op } => ast::Binding::StdlibBuiltIn2(op.clone()),
            FixtureBinding::UserDef { let_name } => ast::Binding::UserDef(self.lookup(let_name)?),
            FixtureBinding::NullBinding => ast::Binding::NullBinding,
        })
    }

    fn convert_bucket(&mut self, bucket: &FixtureBucket) -> Result<ast::Bucket, FixtureError> {
        Ok(match bucket {
            FixtureBucket::Union { left, right } => ast::Bucket::Union(
                Box::new(self.convert_bucket(left)?),
                Box::new(self.convert_bucket(right)?),
            ),
            FixtureBucket::Intersect { left, right } => ast::Bucket::Intersect(
                Box::new(self.convert_bucket(left)?),
                Box::new(self.convert_bucket(right)?),
            ),
            FixtureBucket::Group {
                origin,
                forest,
                extras,
            } => {
                let origin = self.convert(origin)?;
                let forest = self.convert_solution(forest)?;
                let mut out_extras = Vec::with_capacity(extras.len());
                for e in extras {
                    out_extras.push(self.convert(e)?);
                }
                ast::Bucket::Group {
                    origin,
                    forest,
                    extras: out_extras,
                }
            }
        })
    }

    fn convert_solution(&mut self, solution: &FixtureSolution) -> Result<ast::Solution, FixtureError> {
        Ok(match solution {
            FixtureSolution::Conjunction { left, right } => ast::Solution::Conjunction(
                Box::new(self.convert_solution(left)?),
                Box::new(self.convert_solution(right)?),
            ),
            FixtureSolution::Disjunction { left, right } => ast::Solution::Disjunction(
                Box::new(self.convert_solution(left)?),
                Box::new(self.convert_solution(right)?),
            ),
            FixtureSolution::Definition { expr } => ast::Solution::Definition(self.convert(expr)?),
        })
    }
}

impl FixtureNode {
    /// Parses and converts a fixture, ready to hand to `emit::emit`.
    pub fn from_json(text: &str) -> Result<Rc<Expr>, FixtureLoadError> {
        let node: FixtureNode = serde_json::from_str(text)?;
        let mut converter = Converter::default();
        Ok(converter.convert(&node)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FixtureLoadError {
    #[error("invalid fixture JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}
