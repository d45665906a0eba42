//! The parsed expression tree and its operators.

use smallvec::SmallVec;

use crate::environment::VarHandle;
use crate::function::FuncContext;
use crate::numeric::Scalar;

/// A prefix operator with exactly one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `!x` — logical not (zero iff `x` is non-zero).
    Not,
    /// `^x` — bitwise not, via [`crate::numeric::to_int`].
    BitNot,
}

/// An infix operator with exactly two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Pow,
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    /// `x = y` — requires a variable reference on the left.
    Assign,
    /// `x, y` — evaluate and discard `x`, then evaluate `y`.
    Comma,
}

impl BinaryOp {
    /// Binding power used to order operators on the shift-reduce stack: a
    /// higher value binds tighter. Ties are broken by [`Self::is_left_assoc`].
    #[must_use]
    pub fn binding_power(self) -> u8 {
        match self {
            Self::Pow => 11,
            Self::Mul | Self::Div | Self::Rem => 10,
            Self::Add | Self::Sub => 9,
            Self::Shl | Self::Shr => 8,
            Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Eq | Self::Ne => 7,
            Self::BitAnd => 6,
            Self::BitOr => 5,
            Self::BitXor => 4,
            Self::And => 3,
            Self::Or => 2,
            Self::Assign => 1,
            Self::Comma => 0,
        }
    }

    /// Whether an operator at equal precedence to its neighbor should be
    /// reduced before the neighbor is shifted. `**`, `=`, and `,` are
    /// right-associative and return `false` so chains of them nest to the
    /// right instead of folding left.
    #[must_use]
    pub fn is_left_assoc(self) -> bool {
        !matches!(self, Self::Pow | Self::Assign | Self::Comma)
    }

    /// Returns `true` if the operator currently on top of the operator stack
    /// (`top`) should be reduced before `incoming` is shifted.
    #[must_use]
    pub fn should_reduce_before(top: Self, incoming: Self) -> bool {
        let (a, b) = (top.binding_power(), incoming.binding_power());
        a > b || (a == b && top.is_left_assoc())
    }
}

/// A node in a parsed expression tree.
///
/// Exclusively owned: no sharing between nodes, so a tree can always be
/// walked or torn down without cycle bookkeeping. [`Drop`] is implemented
/// iteratively (below) so tearing down a deep tree cannot overflow the host
/// stack.
#[derive(Debug)]
pub enum Node {
    Const(Scalar),
    VarRef(VarHandle),
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Func(FuncContext, SmallVec<[Node; 2]>),
}

impl Node {
    /// A deep structural copy: every node is freshly allocated, and every
    /// [`FuncContext`] gets its own fresh, zeroed buffer rather than sharing
    /// the original's. Used to give each call site of a macro its own
    /// independent subtree.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        match self {
            Self::Const(v) => Self::Const(*v),
            Self::VarRef(h) => Self::VarRef(*h),
            Self::Unary(op, child) => Self::Unary(*op, Box::new(child.deep_copy())),
            Self::Binary(op, lhs, rhs) => {
                Self::Binary(*op, Box::new(lhs.deep_copy()), Box::new(rhs.deep_copy()))
            }
            Self::Func(ctx, args) => {
                let fresh = FuncContext::new(ctx.descriptor().clone());
                let args = args.iter().map(Self::deep_copy).collect();
                Self::Func(fresh, args)
            }
        }
    }
}

/// Moves `node`'s direct children out, leaving `node` itself a childless
/// leaf, and returns the children for a caller-driven worklist.
///
/// This is the building block of [`Node`]'s iterative `Drop`: each call
/// detaches exactly one level of the tree without recursing into it.
fn take_children(node: &mut Node) -> SmallVec<[Node; 2]> {
    match node {
        Node::Const(_) | Node::VarRef(_) => SmallVec::new(),
        Node::Unary(_, child) => {
            let mut taken = SmallVec::new();
            taken.push(std::mem::replace(child.as_mut(), Node::Const(0.0)));
            taken
        }
        Node::Binary(_, lhs, rhs) => {
            let mut taken = SmallVec::new();
            taken.push(std::mem::replace(lhs.as_mut(), Node::Const(0.0)));
            taken.push(std::mem::replace(rhs.as_mut(), Node::Const(0.0)));
            taken
        }
        Node::Func(_, args) => args.drain(..).collect(),
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let mut worklist: Vec<Node> = take_children(self).into_vec();
        while let Some(mut child) = worklist.pop() {
            worklist.extend(take_children(&mut child));
            // `child` is dropped here as a childless leaf: its own `Drop`
            // impl re-enters but `take_children` finds nothing left to take,
            // so the recursion bottoms out immediately.
        }
    }
}
