//! Parametric curves traced over their own parameter, independent of the x
//! domain grid.

use crate::config::{ParametricElement, Range};
use crate::sample::Grid;
use crate::scope::Scope;
use crate::{ParseError, RealExpression, Registers};

/// Both coordinates of a parametric curve, compiled against
/// [`Scope::curve`].
#[derive(Clone, Debug, PartialEq)]
pub struct CurveExpressions {
    pub x: RealExpression<f64>,
    pub y: RealExpression<f64>,
}

impl CurveExpressions {
    pub fn compile(
        curve_variable: &str,
        x_expression: &str,
        y_expression: &str,
    ) -> Result<Self, ParseError> {
        let scope = Scope::curve(curve_variable);
        Ok(Self {
            x: scope.compile(x_expression)?,
            y: scope.compile(y_expression)?,
        })
    }

    pub fn for_element(element: &ParametricElement) -> Result<Self, ParseError> {
        Self::compile(
            &element.curve_variable(),
            &element.x_expression,
            &element.y_expression,
        )
    }

    /// Walk the curve parameter across `range` in `steps` equal increments
    /// (both ends included) with the interactive parameter fixed at `global`.
    /// Points with a non-finite coordinate are left out.
    pub fn trace(&self, range: Range, steps: usize, global: f64) -> Vec<[f64; 2]> {
        let grid = Grid::new(range, steps);
        let param = vec![global; grid.len()];
        let bindings: [&[f64]; 2] = [grid.values(), &param];

        let mut registers = Registers::new(grid.len());
        let xs = self.x.evaluate(&bindings, &mut registers);
        let ys = self.y.evaluate(&bindings, &mut registers);

        xs.iter()
            .zip(ys.iter())
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|(&x, &y)| [x, y])
            .collect()
    }
}

/// Compile and trace a parametric element with its own range and step count.
pub fn trace(element: &ParametricElement, global: f64) -> Result<Vec<[f64; 2]>, ParseError> {
    let curve = CurveExpressions::for_element(element)?;
    Ok(curve.trace(element.curve_range(), element.steps(), global))
}

#[cfg(test)]
mod tests {
    use std::f64::consts::TAU;

    use super::*;
    use crate::config::ElementBase;

    fn parametric(x: &str, y: &str) -> ParametricElement {
        ParametricElement {
            base: ElementBase::new("curve"),
            x_expression: x.to_string(),
            y_expression: y.to_string(),
            t_range: None,
            steps: None,
            curve_variable: None,
        }
    }

    #[test]
    fn unit_circle_closes() {
        let points = trace(&parametric("cos(t)", "sin(t)"), 0.0).unwrap();
        assert_eq!(points.len(), ParametricElement::DEFAULT_STEPS + 1);

        let first = points[0];
        let last = points[points.len() - 1];
        assert!((first[0] - last[0]).abs() < 1e-9 && (first[1] - last[1]).abs() < 1e-9);
        for [x, y] in points {
            assert!((x * x + y * y - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn global_parameter_is_upper_t() {
        let mut element = parametric("sin(3*t)", "sin(T*t)");
        element.t_range = Some(Range::new(0.0, TAU));
        element.steps = Some(200);
        let points = trace(&element, 2.0).unwrap();
        assert_eq!(points.len(), 201);
        let [_, y] = points[50];
        let t = TAU * 50.0 / 200.0;
        assert!((y - (2.0 * t).sin()).abs() < 1e-9);
    }

    #[test]
    fn named_curve_variable_frees_lower_t() {
        let mut element = parametric("t * cos(p)", "2 * sin(p)");
        element.curve_variable = Some("p".to_string());
        let points = trace(&element, 3.0).unwrap();
        let max_x = points.iter().map(|p| p[0]).fold(f64::MIN, f64::max);
        assert!((max_x - 3.0).abs() < 1e-9);
    }

    #[test]
    fn non_finite_points_are_dropped() {
        let mut element = parametric("t", "sqrt(t)");
        element.t_range = Some(Range::new(-1.0, 1.0));
        element.steps = Some(4);
        let points = trace(&element, 0.0).unwrap();
        assert_eq!(points, [[0.0, 0.0], [0.5, 0.5f64.sqrt()], [1.0, 1.0]]);
    }

    #[test]
    fn single_local_name_is_inferred() {
        let points = trace(&parametric("t * cos(p)", "2 * sin(p)"), 3.0).unwrap();
        assert_eq!(points.len(), ParametricElement::DEFAULT_STEPS + 1);
        let max_x = points.iter().map(|p| p[0]).fold(f64::MIN, f64::max);
        assert!((max_x - 3.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_local_names_fail_to_compile() {
        let err = trace(&parametric("cos(p)", "sin(q)"), 0.0).unwrap_err();
        assert_eq!(err, ParseError::UnboundVariable("p".to_string()));
    }
}
