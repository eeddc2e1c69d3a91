//! Uniform sampling of function expressions over the x domain.

use crate::config::Range;
use crate::scope::Scope;
use crate::{ParseError, RealExpression, Registers};

/// Step count used when the caller has no preference. 150 steps give 151
/// samples, which is smooth at lesson-sized viewports.
pub const DEFAULT_RESOLUTION: usize = 150;

/// Hard ceiling on samples per element, keeping a full scene well inside one
/// frame.
pub const MAX_SAMPLES: usize = 300;

/// Evenly spaced abscissae covering a range, both ends included.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    values: Vec<f64>,
}

impl Grid {
    /// `steps` equal increments from `range.min` to `range.max`.
    ///
    /// The step count is clamped to `1..MAX_SAMPLES`. A collapsed range gives
    /// a single sample and a non-finite one gives no samples.
    pub fn new(range: Range, steps: usize) -> Self {
        if !range.is_finite() {
            tracing::debug!(%range, "non-finite range, empty grid");
            return Self { values: vec![] };
        }
        if range.span() == 0.0 {
            return Self {
                values: vec![range.min],
            };
        }

        let steps = steps.clamp(1, MAX_SAMPLES - 1);
        let span = range.span();
        let values = (0..=steps)
            .map(|i| {
                if i == steps {
                    range.max
                } else if span.is_finite() {
                    range.min + span * i as f64 / steps as f64
                } else {
                    // The width overflows; blend the ends instead.
                    let f = i as f64 / steps as f64;
                    range.min * (1.0 - f) + range.max * f
                }
            })
            .collect();
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One sampled point; `y` is `None` where the expression has no finite value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub x: f64,
    pub y: Option<f64>,
}

/// Evaluates function-scoped expressions (see [`Scope::function`]) over a
/// fixed x grid at one value of the interactive parameter.
///
/// Every expression sampled by the same `Sampler` shares its grid, so the
/// outputs line up row for row.
pub struct Sampler {
    grid: Grid,
    param: Vec<f64>,
    registers: Registers<f64>,
}

impl Sampler {
    pub fn new(domain: Range, resolution: usize, t: f64) -> Self {
        let grid = Grid::new(domain, resolution);
        let len = grid.len();
        Self {
            grid,
            param: vec![t; len],
            registers: Registers::new(len),
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Raw values at every grid point, non-finite results included.
    pub fn evaluate(&mut self, expression: &RealExpression<f64>) -> Vec<f64> {
        let bindings: [&[f64]; 2] = [self.grid.values(), &self.param];
        expression.evaluate(&bindings, &mut self.registers)
    }

    /// Values at every grid point with non-finite results recorded as gaps.
    pub fn sample_values(&mut self, expression: &RealExpression<f64>) -> Vec<Option<f64>> {
        let raw = self.evaluate(expression);
        let values = raw.iter().copied().map(finite).collect();
        self.registers.recycle_real(raw);
        values
    }

    pub fn sample(&mut self, expression: &RealExpression<f64>) -> Vec<Sample> {
        let values = self.sample_values(expression);
        self.grid
            .values()
            .iter()
            .zip(values)
            .map(|(&x, y)| Sample { x, y })
            .collect()
    }

    /// A column with no value anywhere, standing in for an expression that
    /// could not be compiled.
    pub fn gaps(&self) -> Vec<Option<f64>> {
        vec![None; self.grid.len()]
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Compile `expression` in function scope and sample it over `domain`.
pub fn sample(
    expression: &str,
    domain: Range,
    resolution: usize,
    t: f64,
) -> Result<Vec<Sample>, ParseError> {
    let compiled = Scope::function().compile(expression)?;
    Ok(Sampler::new(domain, resolution, t).sample(&compiled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_includes_both_ends() {
        let grid = Grid::new(Range::new(-10.0, 10.0), DEFAULT_RESOLUTION);
        assert_eq!(grid.len(), 151);
        assert_eq!(grid.values()[0], -10.0);
        assert_eq!(grid.values()[150], 10.0);
        assert!(grid.values().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn grid_is_bounded() {
        let grid = Grid::new(Range::new(0.0, 1.0), 10_000);
        assert_eq!(grid.len(), MAX_SAMPLES);
        let grid = Grid::new(Range::new(0.0, 1.0), 0);
        assert_eq!(grid.values(), [0.0, 1.0]);
    }

    #[test]
    fn degenerate_domains() {
        assert_eq!(Grid::new(Range::new(2.0, 2.0), 150).values(), [2.0]);
        assert!(Grid::new(Range::new(0.0, f64::INFINITY), 150).is_empty());
        assert!(Grid::new(Range::new(f64::NAN, 1.0), 150).is_empty());
    }

    #[test]
    fn overflowing_width_stays_finite() {
        let grid = Grid::new(Range::new(-1e308, 1e308), 150);
        assert_eq!(grid.len(), 151);
        assert_eq!(grid.values()[0], -1e308);
        assert_eq!(grid.values()[75], 0.0);
        assert_eq!(grid.values()[150], 1e308);
        assert!(grid.values().iter().all(|x| x.is_finite()));
        assert!(grid.values().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn total_function_has_no_gaps() {
        for resolution in [1, 7, 150, 299] {
            let samples = sample("x+2", Range::new(-10.0, 10.0), resolution, 0.0).unwrap();
            assert_eq!(samples.len(), resolution + 1);
            let mut previous = f64::NEG_INFINITY;
            for Sample { x, y } in samples {
                let y = y.expect("x+2 is defined everywhere");
                assert!((y - (x + 2.0)).abs() < 1e-12);
                assert!(y > previous);
                previous = y;
            }
        }
    }

    #[test]
    fn pole_becomes_a_gap() {
        let samples = sample("1/x", Range::new(-5.0, 5.0), 150, 0.0).unwrap();
        let nearest = samples
            .iter()
            .min_by(|a, b| a.x.abs().total_cmp(&b.x.abs()))
            .unwrap();
        assert_eq!(nearest.x, 0.0);
        assert_eq!(nearest.y, None);
        assert!(samples.iter().filter(|s| s.y.is_none()).count() == 1);
        assert!(samples.first().unwrap().y.is_some());
        assert!(samples.last().unwrap().y.is_some());
    }

    #[test]
    fn domain_restriction_leaves_gaps() {
        let samples = sample("sqrt(t^2 - x^2)", Range::new(-5.0, 5.0), 10, 3.0).unwrap();
        let defined: Vec<f64> = samples
            .iter()
            .filter(|s| s.y.is_some())
            .map(|s| s.x)
            .collect();
        assert_eq!(defined, [-3.0, -2.0, -1.0, 0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn parameter_is_bound_as_t_and_upper_t() {
        let samples = sample("x * t + T", Range::new(0.0, 1.0), 1, 2.0).unwrap();
        assert_eq!(samples[0].y, Some(2.0));
        assert_eq!(samples[1].y, Some(4.0));
    }

    #[test]
    fn resampling_is_stable() {
        let compiled = Scope::function().compile("sin(x) * cos(t)").unwrap();
        let mut sampler = Sampler::new(Range::new(-10.0, 10.0), 150, 0.5);
        let first = sampler.sample_values(&compiled);
        let second = sampler.sample_values(&compiled);
        assert_eq!(first, second);
    }
}
