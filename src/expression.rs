/// Top-level parseable calculation.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression<Real> {
    Boolean(BoolExpression<Real>),
    Real(RealExpression<Real>),
}

/// A `bool`-valued expression.
#[derive(Clone, Debug, PartialEq)]
pub enum BoolExpression<Real> {
    // Binary logic.
    And(Box<BoolExpression<Real>>, Box<BoolExpression<Real>>),
    Or(Box<BoolExpression<Real>>, Box<BoolExpression<Real>>),

    // Unary logic.
    Not(Box<BoolExpression<Real>>),

    // Real comparisons.
    Equal(Box<RealExpression<Real>>, Box<RealExpression<Real>>),
    Greater(Box<RealExpression<Real>>, Box<RealExpression<Real>>),
    GreaterEqual(Box<RealExpression<Real>>, Box<RealExpression<Real>>),
    Less(Box<RealExpression<Real>>, Box<RealExpression<Real>>),
    LessEqual(Box<RealExpression<Real>>, Box<RealExpression<Real>>),
    NotEqual(Box<RealExpression<Real>>, Box<RealExpression<Real>>),
}

/// A real-valued expression.
#[derive(Clone, Debug, PartialEq)]
pub enum RealExpression<Real> {
    // Binary real ops.
    Add(Box<RealExpression<Real>>, Box<RealExpression<Real>>),
    Div(Box<RealExpression<Real>>, Box<RealExpression<Real>>),
    Mul(Box<RealExpression<Real>>, Box<RealExpression<Real>>),
    Pow(Box<RealExpression<Real>>, Box<RealExpression<Real>>),
    Sub(Box<RealExpression<Real>>, Box<RealExpression<Real>>),
    Min(Box<RealExpression<Real>>, Box<RealExpression<Real>>),
    Max(Box<RealExpression<Real>>, Box<RealExpression<Real>>),

    // Unary real ops.
    Neg(Box<RealExpression<Real>>),
    Call(Function, Box<RealExpression<Real>>),

    // `condition ? then : otherwise`
    Select(
        Box<BoolExpression<Real>>,
        Box<RealExpression<Real>>,
        Box<RealExpression<Real>>,
    ),

    // Constant.
    Literal(Real),

    // Input variable.
    Binding(BindingId),
}

impl<Real> Expression<Real> {
    /// Number of nodes on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        match self {
            Self::Boolean(b) => Node::Bool(b).depth(),
            Self::Real(r) => Node::Real(r).depth(),
        }
    }
}

impl<Real> RealExpression<Real> {
    /// Number of nodes on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        Node::Real(self).depth()
    }
}

impl<Real> BoolExpression<Real> {
    /// Number of nodes on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        Node::Bool(self).depth()
    }
}

enum Node<'a, Real> {
    Bool(&'a BoolExpression<Real>),
    Real(&'a RealExpression<Real>),
}

impl<Real> Node<'_, Real> {
    // Walks with an explicit stack so arbitrarily deep trees cannot overflow.
    fn depth(self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            let depth = depth + 1;
            match node {
                Self::Bool(b) => match b {
                    BoolExpression::And(lhs, rhs) | BoolExpression::Or(lhs, rhs) => {
                        stack.push((Self::Bool(lhs), depth));
                        stack.push((Self::Bool(rhs), depth));
                    }
                    BoolExpression::Not(operand) => stack.push((Self::Bool(operand), depth)),
                    BoolExpression::Equal(lhs, rhs)
                    | BoolExpression::Greater(lhs, rhs)
                    | BoolExpression::GreaterEqual(lhs, rhs)
                    | BoolExpression::Less(lhs, rhs)
                    | BoolExpression::LessEqual(lhs, rhs)
                    | BoolExpression::NotEqual(lhs, rhs) => {
                        stack.push((Self::Real(lhs), depth));
                        stack.push((Self::Real(rhs), depth));
                    }
                },
                Self::Real(r) => match r {
                    RealExpression::Add(lhs, rhs)
                    | RealExpression::Div(lhs, rhs)
                    | RealExpression::Mul(lhs, rhs)
                    | RealExpression::Pow(lhs, rhs)
                    | RealExpression::Sub(lhs, rhs)
                    | RealExpression::Min(lhs, rhs)
                    | RealExpression::Max(lhs, rhs) => {
                        stack.push((Self::Real(lhs), depth));
                        stack.push((Self::Real(rhs), depth));
                    }
                    RealExpression::Neg(operand) | RealExpression::Call(_, operand) => {
                        stack.push((Self::Real(operand), depth));
                    }
                    RealExpression::Select(condition, then, otherwise) => {
                        stack.push((Self::Bool(condition), depth));
                        stack.push((Self::Real(then), depth));
                        stack.push((Self::Real(otherwise), depth));
                    }
                    RealExpression::Literal(_) | RealExpression::Binding(_) => {}
                },
            }
        }
        deepest
    }
}

/// The single-argument functions an expression may call.
///
/// `min` and `max` take two or more arguments and are represented directly as
/// [`RealExpression::Min`] and [`RealExpression::Max`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Abs,
    Sqrt,
    Cbrt,
    /// Natural logarithm.
    Log,
    Log2,
    Log10,
    Exp,
    Floor,
    Ceil,
    /// Rounds halves toward positive infinity.
    Round,
}

impl Function {
    pub const ALL: [Function; 16] = [
        Self::Sin,
        Self::Cos,
        Self::Tan,
        Self::Asin,
        Self::Acos,
        Self::Atan,
        Self::Abs,
        Self::Sqrt,
        Self::Cbrt,
        Self::Log,
        Self::Log2,
        Self::Log10,
        Self::Exp,
        Self::Floor,
        Self::Ceil,
        Self::Round,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Abs => "abs",
            Self::Sqrt => "sqrt",
            Self::Cbrt => "cbrt",
            Self::Log => "log",
            Self::Log2 => "log2",
            Self::Log10 => "log10",
            Self::Exp => "exp",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Round => "round",
        }
    }
}

/// Names of the variadic functions, which fold into nested binary nodes.
pub const VARIADIC_FUNCTIONS: [&str; 2] = ["min", "max"];

/// Named constants, replaced by literals during parsing. These names can never
/// be bound as variables.
pub const CONSTANTS: [&str; 2] = ["PI", "E"];

/// Index into the `&[&[f64]]` bindings passed to expression evaluation.
pub type BindingId = usize;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_counts_the_longest_path() {
        let leaf = || Box::new(RealExpression::<f64>::Binding(0));
        assert_eq!(RealExpression::<f64>::Literal(1.0).depth(), 1);

        let sum = RealExpression::Add(Box::new(RealExpression::Add(leaf(), leaf())), leaf());
        assert_eq!(sum.depth(), 3);

        let select = RealExpression::Select(
            Box::new(BoolExpression::Not(Box::new(BoolExpression::Less(leaf(), leaf())))),
            leaf(),
            leaf(),
        );
        assert_eq!(Expression::Real(select).depth(), 4);
    }
}
