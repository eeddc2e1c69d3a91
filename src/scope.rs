//! Which variable names an expression may use, and where their values live.
//!
//! A [`Scope`] is the parse-time half of a binding context: it maps every
//! permitted name to a [`BindingId`], so the expression tree never performs a
//! name lookup during evaluation. Several names may share one slot, which is
//! how `t` and `T` both reach the interactive parameter.

use crate::{BindingId, Expression, ParseError, RealExpression, Registers, CONSTANTS};

/// Name of the sampled abscissa in function and area expressions.
pub const X: &str = "x";
/// The interactive parameter, except inside parametric elements where it is
/// the curve parameter by default.
pub const LOWER_T: &str = "t";
/// Always the interactive parameter.
pub const UPPER_T: &str = "T";

#[derive(Clone, Debug, PartialEq)]
pub struct Scope {
    names: Vec<(String, BindingId)>,
    slots: usize,
}

impl Scope {
    /// Function and area elements: `x` in slot 0, the interactive parameter
    /// (`t` or `T`) in slot 1.
    pub fn function() -> Self {
        Self::from_slots(&[&[X], &[LOWER_T, UPPER_T]])
    }

    /// Point, line, vector, v-line, h-line and text elements: the interactive
    /// parameter (`t` or `T`) in slot 0.
    pub fn annotation() -> Self {
        Self::from_slots(&[&[LOWER_T, UPPER_T]])
    }

    /// Parametric elements: the curve variable in slot 0, the interactive
    /// parameter in slot 1 as `T`, and also as `t` when the curve variable
    /// has a different name.
    pub fn curve(curve_variable: &str) -> Self {
        if curve_variable == LOWER_T {
            Self::from_slots(&[&[LOWER_T], &[UPPER_T]])
        } else {
            Self::from_slots(&[&[curve_variable], &[LOWER_T, UPPER_T]])
        }
    }

    /// One slot per name, in order.
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut scope = Self {
            names: vec![],
            slots: 0,
        };
        for name in names {
            if scope.binding_id(name).is_none() {
                scope.names.push((name.to_string(), scope.slots));
                scope.slots += 1;
            }
        }
        scope
    }

    fn from_slots(slots: &[&[&str]]) -> Self {
        let mut names: Vec<(String, BindingId)> = vec![];
        for (binding, aliases) in slots.iter().enumerate() {
            for name in aliases.iter() {
                if !names.iter().any(|(known, _)| known == name) {
                    names.push((name.to_string(), binding));
                }
            }
        }
        Self {
            names,
            slots: slots.len(),
        }
    }

    pub fn binding_id(&self, name: &str) -> Option<BindingId> {
        self.names
            .iter()
            .find(|(known, _)| known == name)
            .map(|(_, binding)| *binding)
    }

    /// Number of distinct binding columns an evaluation must supply.
    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|(name, _)| name.as_str())
    }

    /// Parse a real-valued expression against this scope.
    pub fn compile(&self, input: &str) -> Result<RealExpression<f64>, ParseError> {
        Expression::parse_real(input, |name| self.binding_id(name))
    }
}

/// Whether `name` can be used as a variable at all.
pub fn is_bindable(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_well = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_well
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !CONSTANTS.contains(&name)
        && crate::Function::from_name(name).is_none()
        && !crate::VARIADIC_FUNCTIONS.contains(&name)
}

/// Evaluate `expression` once against named scalar bindings.
///
/// This is the fail-soft entry point: any parse error, unknown function or
/// unbound variable yields `NaN` (the same "no value here" signal produced by
/// non-finite arithmetic) and a `warn` diagnostic.
pub fn evaluate(expression: &str, bindings: &[(&str, f64)]) -> f64 {
    match try_evaluate(expression, bindings) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(%expression, %error, "expression evaluation failed");
            f64::NAN
        }
    }
}

/// Evaluate `expression` once against named scalar bindings, reporting why it
/// could not be compiled.
pub fn try_evaluate(expression: &str, bindings: &[(&str, f64)]) -> Result<f64, ParseError> {
    let scope = Scope::from_names(bindings.iter().map(|(name, _)| *name));
    let real = scope.compile(expression)?;

    // Later duplicates of a name lose to the first, matching `from_names`.
    let mut columns = vec![[f64::NAN]; scope.slots()];
    for (name, value) in bindings.iter().rev() {
        if let Some(binding) = scope.binding_id(name) {
            columns[binding] = [*value];
        }
    }

    let mut registers = Registers::new(1);
    let output = real.evaluate(columns.as_slice(), &mut registers);
    Ok(output.first().copied().unwrap_or(f64::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_basic_arithmetic() {
        assert_eq!(evaluate("x + 2", &[("x", 5.0)]), 7.0);
        assert_eq!(evaluate("x^2", &[("x", 3.0)]), 9.0);
        assert_eq!(evaluate("4 ^ 3 ^ 2", &[]), 262144.0);
        assert_eq!(evaluate("1 * 2 + 3 * 4", &[]), 14.0);
        assert_eq!(evaluate("8 / 4 * 3", &[]), 6.0);
    }

    #[test]
    fn evaluate_is_deterministic() {
        let bindings = [("x", 0.7), ("t", 2.5)];
        let first = evaluate("sin(x * t) + sqrt(t) / (x - 3)", &bindings);
        for _ in 0..100 {
            assert_eq!(
                evaluate("sin(x * t) + sqrt(t) / (x - 3)", &bindings).to_bits(),
                first.to_bits()
            );
        }
    }

    #[test]
    fn division_by_zero_is_infinite() {
        let value = evaluate("1/x", &[("x", 0.0)]);
        assert!(value.is_infinite(), "{value}");
    }

    #[test]
    fn sqrt_of_negative_is_nan() {
        assert!(evaluate("sqrt(x)", &[("x", -4.0)]).is_nan());
    }

    #[test]
    fn failures_fall_back_to_nan() {
        assert!(evaluate("x; deleteEverything()", &[("x", 1.0)]).is_nan());
        assert!(evaluate("y + 1", &[("x", 1.0)]).is_nan());
        assert!(evaluate("", &[]).is_nan());
        assert!(matches!(
            try_evaluate("y + 1", &[("x", 1.0)]),
            Err(ParseError::UnboundVariable(name)) if name == "y"
        ));
    }

    #[test]
    fn oversized_expressions_fall_back_to_nan() {
        let deep = format!("{}x{}", "(".repeat(10_000), ")".repeat(10_000));
        let long_sum = vec!["x"; 50_000].join("+");
        for expression in [deep, long_sum] {
            assert!(evaluate(&expression, &[("x", 1.0)]).is_nan());
            assert!(matches!(
                try_evaluate(&expression, &[("x", 1.0)]),
                Err(ParseError::TooComplex(_))
            ));
        }
    }

    #[test]
    fn function_scope_aliases_parameter() {
        let scope = Scope::function();
        assert_eq!(scope.slots(), 2);
        assert_eq!(scope.binding_id("x"), Some(0));
        assert_eq!(scope.binding_id("t"), Some(1));
        assert_eq!(scope.binding_id("T"), Some(1));
        assert_eq!(scope.binding_id("y"), None);
    }

    #[test]
    fn curve_scope_separates_local_and_global() {
        let scope = Scope::curve("t");
        assert_eq!(scope.binding_id("t"), Some(0));
        assert_eq!(scope.binding_id("T"), Some(1));

        let scope = Scope::curve("p");
        assert_eq!(scope.binding_id("p"), Some(0));
        assert_eq!(scope.binding_id("t"), Some(1));
        assert_eq!(scope.binding_id("T"), Some(1));
    }

    #[test]
    fn annotation_scope_has_no_x() {
        let scope = Scope::annotation();
        assert!(scope.compile("t + T").is_ok());
        assert!(matches!(
            scope.compile("x"),
            Err(ParseError::UnboundVariable(_))
        ));
    }

    #[test]
    fn bindable_names() {
        assert!(is_bindable("p"));
        assert!(is_bindable("theta_2"));
        assert!(!is_bindable(""));
        assert!(!is_bindable("2p"));
        assert!(!is_bindable("PI"));
        assert!(!is_bindable("sin"));
        assert!(!is_bindable("max"));
        assert!(!is_bindable("a b"));
    }
}
