//! The target instruction alphabet (§6): a flat, linear bytecode for a
//! stack-based VM. Every variant's [`Instruction::operand_stack_delta`]
//! reports the `(pops, pushes)` pair the invariant checks (I1/I2) and
//! [`crate::stack_sim`] both lean on.

use std::fmt;

/// Scalar/dataset operators carried by [`Instruction::Map1`],
/// [`Instruction::Map2Cross`] and [`Instruction::Map2Match`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
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

    New,
    Neg,
    Comp,

    WrapObject,
    WrapArray,
    JoinObject,
    JoinArray,
    ArraySwap,
    DerefObject,
    DerefArray,

    BuiltInFunction1Op(String),
    BuiltInFunction2Op(String),
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Add => write!(f, "add"),
            Op::Sub => write!(f, "sub"),
            Op::Mul => write!(f, "mul"),
            Op::Div => write!(f, "div"),
            Op::Lt => write!(f, "lt"),
            Op::LtEq => write!(f, "lteq"),
            Op::Gt => write!(f, "gt"),
            Op::GtEq => write!(f, "gteq"),
            Op::Eq => write!(f, "eq"),
            Op::NotEq => write!(f, "noteq"),
            Op::Or => write!(f, "or"),
            Op::And => write!(f, "and"),
            Op::New => write!(f, "new"),
            Op::Neg => write!(f, "neg"),
            Op::Comp => write!(f, "comp"),
            Op::WrapObject => write!(f, "wrap_object"),
            Op::WrapArray => write!(f, "wrap_array"),
            Op::JoinObject => write!(f, "join_object"),
            Op::JoinArray => write!(f, "join_array"),
            Op::ArraySwap => write!(f, "array_swap"),
            Op::DerefObject => write!(f, "deref_object"),
            Op::DerefArray => write!(f, "deref_array"),
            Op::BuiltInFunction1Op(name) => write!(f, "builtin1({name})"),
            Op::BuiltInFunction2Op(name) => write!(f, "builtin2({name})"),
        }
    }
}

/// Arity-1 reductions (§4.3 case 1): fold a dataset down to a single value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    Count,
    GeometricMean,
    Max,
    Mean,
    Median,
    Min,
    Mode,
    StdDev,
    Sum,
    SumSq,
    Variance,
}

impl fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReduceOp::Count => "count",
            ReduceOp::GeometricMean => "geometricMean",
            ReduceOp::Max => "max",
            ReduceOp::Mean => "mean",
            ReduceOp::Median => "median",
            ReduceOp::Min => "min",
            ReduceOp::Mode => "mode",
            ReduceOp::StdDev => "stdDev",
            ReduceOp::Sum => "sum",
            ReduceOp::SumSq => "sumSq",
            ReduceOp::Variance => "variance",
        };
        write!(f, "{s}")
    }
}

/// Arity-1 set reductions (§4.3 case 2): fold to a deduplicated set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetReduceOp {
    Distinct,
}

impl fmt::Display for SetReduceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetReduceOp::Distinct => write!(f, "distinct"),
        }
    }
}

/// The `load` built-in's dataset kind (§4.3 case 3). Quirrel's source
/// corpus only ever produces heterogeneous (mixed-schema) datasets at this
/// layer, so `Het` is the sole variant; kept as an enum rather than a unit
/// struct to mirror the real instruction's shape and leave room upstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadType {
    Het,
}

impl fmt::Display for LoadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadType::Het => write!(f, "het"),
        }
    }
}

/// One VM instruction (§6).
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    PushString(String),
    PushNum(String),
    PushTrue,
    PushFalse,

    /// Duplicate the top of the operand stack.
    Dup,
    /// Swap the top of the operand stack with the element `n` below it.
    Swap(u32),
    /// A debug marker: the source line and text an instruction sequence was
    /// lowered from. Carries no operand-stack effect; consecutive `Line`s
    /// for the same `(n, t)` are suppressed (I5) by `Emission::emit_line`,
    /// never by the instruction itself.
    Line(u32, String),

    /// Apply a unary operator, pointwise, to a stream.
    Map1(Op),
    /// Apply a binary operator to the cross product of two streams (§4.4).
    Map2Cross(Op),
    /// Apply a binary operator to two provenance-matched streams (§4.4).
    Map2Match(Op),
    /// Filter the cross product of a value stream and a boolean stream.
    /// `pred` names an auxiliary predicate stream already on the stack at
    /// `depth` below the value being filtered; unused (`None`) whenever the
    /// filter's condition is the immediately preceding boolean value.
    FilterCross(u32, Option<u32>),
    /// Filter a provenance-matched value/boolean pair.
    FilterMatch(u32, Option<u32>),

    Reduce(ReduceOp),
    SetReduce(SetReduceOp),
    LoadLocal(LoadType),

    IUnion,
    IIntersect,

    /// Combine two bucket streams; `disjoint` selects intersection- versus
    /// union-shaped zipping (§4.7).
    ZipBuckets(bool),
    /// Open a grouping frame: consumes `n` bucket values, yields `k`
    /// positional tic-var/group values (§4.7).
    Split(u32, u32),
    /// Close the innermost grouping frame opened by `Split(_, k)`, merging
    /// its `k` positional values and the body's result into one per-group
    /// value. `k` mirrors the `Split` it closes — carried here so that
    /// `operand_stack_delta` stays a pure function of the instruction,
    /// rather than needing external frame-depth context during bookkeeping.
    Merge(u32),
}

impl Instruction {
    /// `(pops, pushes)` for this instruction in isolation.
    pub fn operand_stack_delta(&self) -> (u32, u32) {
        match self {
            Instruction::PushString(_) | Instruction::PushNum(_) => (0, 1),
            Instruction::PushTrue | Instruction::PushFalse => (0, 1),

            Instruction::Dup => (0, 1),
            Instruction::Swap(_) => (0, 0),
            Instruction::Line(_, _) => (0, 0),

            Instruction::Map1(_) => (1, 1),
            Instruction::Map2Cross(_) | Instruction::Map2Match(_) => (2, 1),
            Instruction::FilterCross(_, _) | Instruction::FilterMatch(_, _) => (2, 1),

            Instruction::Reduce(_) => (1, 1),
            Instruction::SetReduce(_) => (1, 1),
            Instruction::LoadLocal(_) => (1, 1),

            Instruction::IUnion | Instruction::IIntersect => (2, 1),

            Instruction::ZipBuckets(_) => (2, 1),
            Instruction::Split(n, k) => (*n, *k),
            Instruction::Merge(k) => (*k + 1, 1),
        }
    }

    /// Net change in operand-stack depth: `pushes - pops`.
    pub fn net_delta(&self) -> i64 {
        let (pops, pushes) = self.operand_stack_delta();
        i64::from(pushes) - i64::from(pops)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::PushString(s) => write!(f, "push_string {s:?}"),
            Instruction::PushNum(n) => write!(f, "push_num {n}"),
            Instruction::PushTrue => write!(f, "push_true"),
            Instruction::PushFalse => write!(f, "push_false"),
            Instruction::Dup => write!(f, "dup"),
            Instruction::Swap(n) => write!(f, "swap {n}"),
            Instruction::Line(n, text) => write!(f, "; {n}: {text}"),
            Instruction::Map1(op) => write!(f, "map1 {op}"),
            Instruction::Map2Cross(op) => write!(f, "map2_cross {op}"),
            Instruction::Map2Match(op) => write!(f, "map2_match {op}"),
            Instruction::FilterCross(depth, pred) => {
                write!(f, "filter_cross {depth} {pred:?}")
            }
            Instruction::FilterMatch(depth, pred) => {
                write!(f, "filter_match {depth} {pred:?}")
            }
            Instruction::Reduce(op) => write!(f, "reduce {op}"),
            Instruction::SetReduce(op) => write!(f, "set_reduce {op}"),
            Instruction::LoadLocal(ty) => write!(f, "load_local {ty}"),
            Instruction::IUnion => write!(f, "iunion"),
            Instruction::IIntersect => write!(f, "iintersect"),
            Instruction::ZipBuckets(disjoint) => write!(f, "zip_buckets {disjoint}"),
            Instruction::Split(n, k) => write!(f, "split {n} {k}"),
            Instruction::Merge(k) => write!(f, "merge {k}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_shape() {
        assert_eq!(Instruction::Dup.to_string(), "dup");
        assert_eq!(Instruction::Swap(3).to_string(), "swap 3");
        assert_eq!(
            Instruction::Map2Cross(Op::Add).to_string(),
            "map2_cross add"
        );
        assert_eq!(
            Instruction::Line(12, "a + b".into()).to_string(),
            "; 12: a + b"
        );
    }

    #[test]
    fn all_variants_construct_and_report_a_delta() {
        let ops = vec![
            Instruction::PushString("x".into()),
            Instruction::PushNum("1".into()),
            Instruction::PushTrue,
            Instruction::PushFalse,
            Instruction::Dup,
            Instruction::Swap(1),
            Instruction::Line(1, "foo".into()),
            Instruction::Map1(Op::Neg),
            Instruction::Map2Cross(Op::Add),
            Instruction::Map2Match(Op::Add),
            Instruction::FilterCross(0, None),
            Instruction::FilterMatch(0, None),
            Instruction::Reduce(ReduceOp::Sum),
            Instruction::SetReduce(SetReduceOp::Distinct),
            Instruction::LoadLocal(LoadType::Het),
            Instruction::IUnion,
            Instruction::IIntersect,
            Instruction::ZipBuckets(true),
            Instruction::Split(2, 3),
            Instruction::Merge(3),
        ];
        for op in &ops {
            let _ = op.operand_stack_delta();
            let _ = op.net_delta();
            let _ = op.to_string();
        }
    }

    #[test]
    fn pushes_increase_depth_by_one() {
        for op in [
            Instruction::PushString("x".into()),
            Instruction::PushNum("1".into()),
            Instruction::PushTrue,
            Instruction::PushFalse,
            Instruction::Dup,
        ] {
            assert_eq!(op.net_delta(), 1);
        }
    }

    #[test]
    fn binary_combinators_reduce_depth_by_one() {
        for op in [
            Instruction::Map2Cross(Op::Add),
            Instruction::Map2Match(Op::Add),
            Instruction::FilterCross(0, None),
            Instruction::FilterMatch(0, None),
            Instruction::IUnion,
            Instruction::IIntersect,
            Instruction::ZipBuckets(false),
        ] {
            assert_eq!(op.net_delta(), -1);
        }
    }

    #[test]
    fn split_and_merge_close_a_grouping_frame_to_net_plus_one() {
        // n bucket values already on the stack (net +n so far), Split(n, k)
        // replaces them with k positional values, the body contributes its
        // own +1, and Merge(k) folds all k+1 of those into the frame's
        // single result — the whole dispatch nets +1, per I2.
        let n = 2u32;
        let k = 5u32;
        let split = Instruction::Split(n, k);
        let merge = Instruction::Merge(k);
        assert_eq!(i64::from(n) + split.net_delta() + 1 + merge.net_delta(), 1);
    }
}
