use std::collections::HashSet;
use std::fmt;

use crate::expression::{
    BindingId, BoolExpression, Expression, Function, RealExpression, CONSTANTS,
    VARIADIC_FUNCTIONS,
};
use crate::FloatExt;

use once_cell::sync::Lazy;
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "grammar.pest"] // relative to project `src`
struct ExpressionParser;

/// Whether an expression produces numbers or truth values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    Real,
    Boolean,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real => f.write_str("real"),
            Self::Boolean => f.write_str("boolean"),
        }
    }
}

/// Everything that can stop an input string from becoming an [`Expression`].
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum ParseError {
    #[error("expression is empty")]
    Empty,

    #[error("syntax error: {0}")]
    Syntax(Box<pest::error::Error<Rule>>),

    #[error("invalid numeric literal `{0}`")]
    Literal(String),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("`{name}` expects {expected} argument(s), found {found}")]
    Arity {
        name: String,
        expected: &'static str,
        found: usize,
    },

    #[error("unbound variable `{0}`")]
    UnboundVariable(String),

    #[error("expected a {expected} expression, found a {found} expression")]
    TypeMismatch {
        expected: ValueType,
        found: ValueType,
    },

    #[error("expression is too complex: {0}")]
    TooComplex(String),
}

/// Longest accepted input, in bytes.
pub const MAX_INPUT_LEN: usize = 1024;

/// Deepest accepted nesting of parentheses, `?:` selections, powers and
/// prefix operators, counted over the raw text before parsing.
pub const MAX_NESTING: usize = 32;

/// Deepest accepted syntax tree. A long flat sum nests one level per term.
pub const MAX_TREE_DEPTH: usize = 128;

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(error: pest::error::Error<Rule>) -> Self {
        Self::Syntax(Box::new(error))
    }
}

impl<Real> Expression<Real> {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Real(_) => ValueType::Real,
            Self::Boolean(_) => ValueType::Boolean,
        }
    }

    /// Requires this expression to be real-valued.
    pub fn into_real(self) -> Result<RealExpression<Real>, ParseError> {
        match self {
            Self::Real(r) => Ok(r),
            Self::Boolean(_) => Err(ParseError::TypeMismatch {
                expected: ValueType::Real,
                found: ValueType::Boolean,
            }),
        }
    }

    /// Requires this expression to be boolean-valued.
    pub fn into_bool(self) -> Result<BoolExpression<Real>, ParseError> {
        match self {
            Self::Boolean(b) => Ok(b),
            Self::Real(_) => Err(ParseError::TypeMismatch {
                expected: ValueType::Boolean,
                found: ValueType::Real,
            }),
        }
    }
}

impl<Real: FloatExt> Expression<Real> {
    /// Parse the expression from `input`.
    ///
    /// `binding_map` determines which variable name maps to each data binding.
    /// As variable names are encountered during parsing, they are replaced by
    /// [`BindingId`]s in the [`Expression`] syntax tree. This allows the
    /// [`Expression`] to be efficiently reused with many different data
    /// bindings. A name the map does not know is an
    /// [`ParseError::UnboundVariable`].
    pub fn parse(
        input: &str,
        binding_map: impl Fn(&str) -> Option<BindingId>,
    ) -> Result<Self, ParseError> {
        if input.trim().is_empty() {
            return Err(ParseError::Empty);
        }
        check_nesting(input)?;
        let mut pairs = ExpressionParser::parse(Rule::calculation, input)?;
        let expression = match pairs.next() {
            Some(expr) => build_expr(expr, &binding_map)?,
            None => return Err(ParseError::Empty),
        };
        let depth = expression.depth();
        if depth > MAX_TREE_DEPTH {
            return Err(ParseError::TooComplex(format!(
                "tree depth {depth} exceeds {MAX_TREE_DEPTH}"
            )));
        }
        Ok(expression)
    }

    /// Parse `input` and require the result to be real-valued.
    pub fn parse_real(
        input: &str,
        binding_map: impl Fn(&str) -> Option<BindingId>,
    ) -> Result<RealExpression<Real>, ParseError> {
        Self::parse(input, binding_map)?.into_real()
    }
}

/// The free variable names referenced by `input`, excluding function names
/// and constants.
pub fn parse_variable_names(input: &str) -> Result<HashSet<String>, ParseError> {
    check_nesting(input)?;
    Ok(ExpressionParser::parse(Rule::calculation, input)?
        .flatten()
        .filter(|p| p.as_rule() == Rule::variable)
        .map(|p| p.as_str())
        .filter(|name| !CONSTANTS.contains(name))
        .map(str::to_string)
        .collect())
}

/// Pass to [`Expression::parse`] if the expression has no variables.
pub fn empty_binding_map(_var_name: &str) -> Option<BindingId> {
    None
}

/// Rejects input whose size or nesting would recurse too deeply through the
/// grammar or the builders below.
fn check_nesting(input: &str) -> Result<(), ParseError> {
    if input.len() > MAX_INPUT_LEN {
        return Err(ParseError::TooComplex(format!(
            "{} bytes exceeds {MAX_INPUT_LEN}",
            input.len()
        )));
    }

    let mut open = 0usize;
    let mut selections = 0;
    let mut powers = 0;
    let mut prefixes = 0;
    let mut nesting = 0;
    for c in input.chars() {
        match c {
            '(' => open += 1,
            ')' => open = open.saturating_sub(1),
            '?' => selections += 1,
            '^' => powers += 1,
            _ => {}
        }
        // A run of signs and `!` is a chain of prefix operators.
        prefixes = match c {
            '-' | '+' | '!' => prefixes + 1,
            c if c.is_whitespace() => prefixes,
            _ => 0,
        };
        nesting = nesting.max(open + selections + powers + prefixes);
    }
    if nesting > MAX_NESTING {
        return Err(ParseError::TooComplex(format!(
            "nesting depth {nesting} exceeds {MAX_NESTING}"
        )));
    }
    Ok(())
}

static PRATT_PARSER: Lazy<PrattParser<Rule>> = Lazy::new(|| {
    use Assoc::*;
    use Rule::*;

    PrattParser::new()
        .op(Op::infix(or, Left))
        .op(Op::infix(and, Left))
        .op(Op::infix(real_eq, Left) | Op::infix(real_neq, Left))
        .op(Op::infix(less, Left)
            | Op::infix(le, Left)
            | Op::infix(greater, Left)
            | Op::infix(ge, Left))
        .op(Op::infix(add, Left) | Op::infix(subtract, Left))
        .op(Op::infix(multiply, Left) | Op::infix(divide, Left))
        .op(Op::prefix(neg) | Op::prefix(pos) | Op::prefix(not))
        .op(Op::infix(power, Right))
});

fn build_expr<Real: FloatExt>(
    pair: Pair<'_, Rule>,
    binding_map: &impl Fn(&str) -> Option<BindingId>,
) -> Result<Expression<Real>, ParseError> {
    let mut inner = pair.into_inner();
    let Some(operation) = inner.next() else {
        unreachable!("`expr` always starts with an `operation`");
    };
    let head = build_operation(operation.into_inner(), binding_map)?;
    match (inner.next(), inner.next()) {
        (Some(then), Some(otherwise)) => Ok(Expression::Real(RealExpression::Select(
            Box::new(head.into_bool()?),
            Box::new(build_expr(then, binding_map)?.into_real()?),
            Box::new(build_expr(otherwise, binding_map)?.into_real()?),
        ))),
        _ => Ok(head),
    }
}

fn build_operation<Real: FloatExt>(
    pairs: Pairs<'_, Rule>,
    binding_map: &impl Fn(&str) -> Option<BindingId>,
) -> Result<Expression<Real>, ParseError> {
    PRATT_PARSER
        .map_primary(|primary| build_primary(primary, binding_map))
        .map_prefix(|op, operand| {
            let operand = operand?;
            match op.as_rule() {
                Rule::neg => Ok(Expression::Real(RealExpression::Neg(Box::new(
                    operand.into_real()?,
                )))),
                Rule::pos => Ok(Expression::Real(operand.into_real()?)),
                Rule::not => Ok(Expression::Boolean(BoolExpression::Not(Box::new(
                    operand.into_bool()?,
                )))),
                x => unreachable!("Unexpected prefix operator {x:?}"),
            }
        })
        .map_infix(|lhs, op, rhs| build_infix(lhs?, op.as_rule(), rhs?))
        .parse(pairs)
}

fn build_primary<Real: FloatExt>(
    pair: Pair<'_, Rule>,
    binding_map: &impl Fn(&str) -> Option<BindingId>,
) -> Result<Expression<Real>, ParseError> {
    match pair.as_rule() {
        Rule::expr => build_expr(pair, binding_map),
        Rule::real_literal => {
            let literal_str = pair.as_str();
            literal_str
                .parse::<Real>()
                .map(|value| Expression::Real(RealExpression::Literal(value)))
                .map_err(|_| ParseError::Literal(literal_str.to_string()))
        }
        Rule::variable => build_variable(pair.as_str(), binding_map),
        Rule::call => build_call(pair, binding_map),
        x => unreachable!("Unexpected primary rule {x:?}"),
    }
}

fn build_variable<Real: FloatExt>(
    name: &str,
    binding_map: &impl Fn(&str) -> Option<BindingId>,
) -> Result<Expression<Real>, ParseError> {
    let constant = match name {
        "PI" => Some(Real::PI()),
        "E" => Some(Real::E()),
        _ => None,
    };
    if let Some(value) = constant {
        return Ok(Expression::Real(RealExpression::Literal(value)));
    }
    binding_map(name)
        .map(|binding| Expression::Real(RealExpression::Binding(binding)))
        .ok_or_else(|| ParseError::UnboundVariable(name.to_string()))
}

type BinaryNode<Real> =
    fn(Box<RealExpression<Real>>, Box<RealExpression<Real>>) -> RealExpression<Real>;

fn build_call<Real: FloatExt>(
    pair: Pair<'_, Rule>,
    binding_map: &impl Fn(&str) -> Option<BindingId>,
) -> Result<Expression<Real>, ParseError> {
    let mut inner = pair.into_inner();
    let Some(name) = inner.next() else {
        unreachable!("`call` always starts with an `identifier`");
    };
    let name = name.as_str();

    // Resolve the callee before touching the arguments, so a call outside the
    // allowlist is always reported as such.
    let function = Function::from_name(name);
    let variadic: Option<BinaryNode<Real>> = match name {
        "min" => Some(RealExpression::Min),
        "max" => Some(RealExpression::Max),
        _ => None,
    };
    if function.is_none() && variadic.is_none() {
        return Err(ParseError::UnknownFunction(name.to_string()));
    }

    let args = inner
        .map(|arg| build_expr(arg, binding_map).and_then(Expression::into_real))
        .collect::<Result<Vec<RealExpression<Real>>, _>>()?;

    if let Some(function) = function {
        let found = args.len();
        let [arg]: [RealExpression<Real>; 1] = args.try_into().map_err(|_| ParseError::Arity {
            name: name.to_string(),
            expected: "1",
            found,
        })?;
        return Ok(Expression::Real(RealExpression::Call(function, Box::new(arg))));
    }

    debug_assert!(VARIADIC_FUNCTIONS.contains(&name));
    let (Some(node), true) = (variadic, args.len() >= 2) else {
        return Err(ParseError::Arity {
            name: name.to_string(),
            expected: "at least 2",
            found: args.len(),
        });
    };
    let mut args = args.into_iter();
    let Some(first) = args.next() else {
        unreachable!("argument count checked above");
    };
    Ok(Expression::Real(
        args.fold(first, |acc, next| node(Box::new(acc), Box::new(next))),
    ))
}

fn build_infix<Real>(
    lhs: Expression<Real>,
    op: Rule,
    rhs: Expression<Real>,
) -> Result<Expression<Real>, ParseError> {
    fn real<Real>(
        node: BinaryNode<Real>,
        lhs: Expression<Real>,
        rhs: Expression<Real>,
    ) -> Result<Expression<Real>, ParseError> {
        Ok(Expression::Real(node(
            Box::new(lhs.into_real()?),
            Box::new(rhs.into_real()?),
        )))
    }

    fn comparison<Real>(
        node: fn(Box<RealExpression<Real>>, Box<RealExpression<Real>>) -> BoolExpression<Real>,
        lhs: Expression<Real>,
        rhs: Expression<Real>,
    ) -> Result<Expression<Real>, ParseError> {
        Ok(Expression::Boolean(node(
            Box::new(lhs.into_real()?),
            Box::new(rhs.into_real()?),
        )))
    }

    fn logic<Real>(
        node: fn(Box<BoolExpression<Real>>, Box<BoolExpression<Real>>) -> BoolExpression<Real>,
        lhs: Expression<Real>,
        rhs: Expression<Real>,
    ) -> Result<Expression<Real>, ParseError> {
        Ok(Expression::Boolean(node(
            Box::new(lhs.into_bool()?),
            Box::new(rhs.into_bool()?),
        )))
    }

    match op {
        Rule::add => real(RealExpression::Add, lhs, rhs),
        Rule::subtract => real(RealExpression::Sub, lhs, rhs),
        Rule::multiply => real(RealExpression::Mul, lhs, rhs),
        Rule::divide => real(RealExpression::Div, lhs, rhs),
        Rule::power => real(RealExpression::Pow, lhs, rhs),
        Rule::real_eq => comparison(BoolExpression::Equal, lhs, rhs),
        Rule::real_neq => comparison(BoolExpression::NotEqual, lhs, rhs),
        Rule::less => comparison(BoolExpression::Less, lhs, rhs),
        Rule::le => comparison(BoolExpression::LessEqual, lhs, rhs),
        Rule::greater => comparison(BoolExpression::Greater, lhs, rhs),
        Rule::ge => comparison(BoolExpression::GreaterEqual, lhs, rhs),
        Rule::and => logic(BoolExpression::And, lhs, rhs),
        Rule::or => logic(BoolExpression::Or, lhs, rhs),
        x => unreachable!("Unexpected operator {x:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding_map(var_name: &str) -> Option<BindingId> {
        match var_name {
            "x" => Some(0),
            "y" => Some(1),
            _ => None,
        }
    }

    #[test]
    fn parse_variable_names_skips_calls_and_constants() {
        let vars = parse_variable_names("x + y * sin(z99) - PI").unwrap();
        assert!(vars.contains("x"), "{vars:?}");
        assert!(vars.contains("y"), "{vars:?}");
        assert!(vars.contains("z99"), "{vars:?}");
        assert!(!vars.contains("sin"), "{vars:?}");
        assert!(!vars.contains("PI"), "{vars:?}");
    }

    #[test]
    fn parse_comparisons() {
        for input in ["x == y", "x != y", "x > y", "x < y", "x <= y", "x >= y"] {
            let parsed = Expression::<f64>::parse(input, binding_map).unwrap();
            assert_eq!(parsed.value_type(), ValueType::Boolean, "{input}");
        }
    }

    #[test]
    fn parse_ternary() {
        let parsed = Expression::<f64>::parse("(x < y) ? 0.5*x + 1 : 0", binding_map).unwrap();
        assert!(matches!(parsed, Expression::Real(RealExpression::Select(..))));
    }

    #[test]
    fn negation_binds_looser_than_power() {
        let parsed = Expression::<f64>::parse_real("-x^2", binding_map).unwrap();
        let RealExpression::Neg(inner) = &parsed else {
            panic!("expected a negation, found {parsed:?}");
        };
        assert!(matches!(**inner, RealExpression::Pow(..)), "{inner:?}");
    }

    #[test]
    fn constants_become_literals() {
        let parsed = Expression::<f64>::parse_real("PI", empty_binding_map).unwrap();
        assert_eq!(parsed, RealExpression::Literal(std::f64::consts::PI));
        let parsed = Expression::<f64>::parse_real("E", empty_binding_map).unwrap();
        assert_eq!(parsed, RealExpression::Literal(std::f64::consts::E));
    }

    #[test]
    fn min_max_fold_arguments() {
        let parsed = Expression::<f64>::parse_real("min(x, y, 3)", binding_map).unwrap();
        assert!(
            matches!(parsed, RealExpression::Min(lhs, _) if matches!(*lhs, RealExpression::Min(..)))
        );
    }

    #[test]
    fn unbound_variable_is_rejected() {
        let err = Expression::<f64>::parse("x + p", binding_map).unwrap_err();
        assert_eq!(err, ParseError::UnboundVariable("p".to_string()));
    }

    #[test]
    fn unknown_function_is_rejected() {
        let err = Expression::<f64>::parse("deleteEverything()", binding_map).unwrap_err();
        assert_eq!(err, ParseError::UnknownFunction("deleteEverything".to_string()));
        let err = Expression::<f64>::parse("Math.sin(x)", binding_map).unwrap_err();
        assert!(matches!(err, ParseError::Syntax(_)), "{err}");
    }

    #[test]
    fn statements_and_code_are_syntax_errors() {
        for input in [
            "x; deleteEverything()",
            "x = 3",
            "`${x}`",
            "\"x\"",
            "[x]",
            "x => x",
            "{ x }",
        ] {
            let err = Expression::<f64>::parse(input, binding_map).unwrap_err();
            assert!(matches!(err, ParseError::Syntax(_)), "{input}: {err}");
        }
    }

    #[test]
    fn arity_is_checked() {
        let err = Expression::<f64>::parse("sin(x, y)", binding_map).unwrap_err();
        assert!(matches!(err, ParseError::Arity { found: 2, .. }), "{err}");
        let err = Expression::<f64>::parse("max(x)", binding_map).unwrap_err();
        assert!(matches!(err, ParseError::Arity { found: 1, .. }), "{err}");
    }

    #[test]
    fn types_are_checked() {
        let err = Expression::<f64>::parse("(x < y) * 3", binding_map).unwrap_err();
        assert_eq!(
            err,
            ParseError::TypeMismatch {
                expected: ValueType::Real,
                found: ValueType::Boolean
            }
        );
        let err = Expression::<f64>::parse("x ? 1 : 2", binding_map).unwrap_err();
        assert!(matches!(err, ParseError::TypeMismatch { .. }), "{err}");
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(
            Expression::<f64>::parse("   ", binding_map).unwrap_err(),
            ParseError::Empty
        );
    }

    fn too_complex(input: &str) -> bool {
        matches!(
            Expression::<f64>::parse(input, binding_map),
            Err(ParseError::TooComplex(_))
        )
    }

    #[test]
    fn deep_nesting_is_too_complex() {
        let deep = format!("{}x{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(too_complex(&deep));
        assert!(matches!(
            parse_variable_names(&deep),
            Err(ParseError::TooComplex(_))
        ));

        // Short enough to pass the length check, too deep for the nesting one.
        assert!(too_complex(&format!("{}x{}", "(".repeat(40), ")".repeat(40))));
        assert!(too_complex(&format!("{}x", "-".repeat(40))));
        assert!(too_complex(&vec!["x"; 40].join("^")));
        assert!(too_complex(&"x < y ? x : ".repeat(40)));

        let nested = format!("{}x{}", "(".repeat(20), ")".repeat(20));
        assert!(Expression::<f64>::parse(&nested, binding_map).is_ok());
    }

    #[test]
    fn long_flat_input_is_too_complex() {
        assert!(too_complex(&vec!["x"; 50_000].join("+")));

        // Within the length limit, but the tree grows one level per term.
        assert!(too_complex(&vec!["x"; 200].join("+")));
        let args = vec!["x"; 200].join(",");
        assert!(too_complex(&format!("max({args})")));

        let sum = vec!["x"; 100].join(" + ");
        let parsed = Expression::<f64>::parse_real(&sum, binding_map).unwrap();
        assert_eq!(parsed.depth(), 100);
    }
}
