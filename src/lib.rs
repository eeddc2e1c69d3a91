//! Expression-driven graphs for interactive math lessons.
//!
//! A [`VisualizationConfig`] describes one graph: the visible domain, the range
//! of an interactive parameter and a list of typed elements (functions,
//! parametric curves, points, vectors, reference lines, shaded areas, text)
//! whose coordinates are math expressions. [`assemble`] turns a configuration
//! and a control value in `0..=100` into a [`Scene`] of literal coordinates for
//! a 2D charting surface to draw.
//!
//! Expressions are parsed into a closed syntax tree over a fixed grammar
//! (arithmetic, comparisons, `cond ? a : b`, an allowlist of functions, `PI`
//! and `E`). Nothing outside that grammar can be expressed, so configurations
//! from untrusted sources cannot run arbitrary logic.
//!
//! # Why vectors?
//!
//! Performance. A scene is rebuilt on every slider movement, and each function
//! element is evaluated at hundreds of sample points. We amortize the cost of
//! traversing the expression tree by performing intermediate operations on
//! _vectors_ of input data at a time (with optional data parallelism via the
//! `rayon` feature).
//!
//! # Example
//!
//! ```rust
//! use graph_expr::*;
//!
//! assert_eq!(evaluate("x^2 + 1", &[("x", 3.0)]), 10.0);
//! assert!(evaluate("sqrt(x)", &[("x", -4.0)]).is_nan());
//!
//! let config = VisualizationConfig::from_json(
//!     r#"{
//!         "xDomain": [-2, 2],
//!         "yDomain": [-1, 4],
//!         "paramRange": [0, 2],
//!         "paramLabel": "Exponent n",
//!         "elements": [
//!             { "id": "power", "type": "function", "expression": "abs(x)^t" },
//!             { "id": "mark", "type": "point", "x": "1", "y": "1" }
//!         ]
//!     }"#,
//! )
//! .unwrap();
//! let scene = assemble(&config, 50.0);
//! assert_eq!(scene.parameter.value, 1.0);
//! assert_eq!(scene.curves.xs.len(), 151);
//! assert_eq!(scene.annotations.len(), 1);
//! ```
//!
//! Lower-level, the same machinery evaluates any expression over columns of
//! data:
//!
//! ```rust
//! use graph_expr::*;
//!
//! fn binding_map(var_name: &str) -> Option<BindingId> {
//!     match var_name {
//!         "bar" => Some(0),
//!         "baz" => Some(1),
//!         "foo" => Some(2),
//!         _ => None,
//!     }
//! }
//! let real = Expression::parse_real("2 * (foo + bar) * baz", binding_map).unwrap();
//!
//! let bar = [1.0, 2.0, 3.0];
//! let baz = [4.0, 5.0, 6.0];
//! let foo = [7.0, 8.0, 9.0];
//! let bindings: &[&[f64]] = &[&bar, &baz, &foo];
//! let mut registers = Registers::new(3);
//! let output = real.evaluate(bindings, &mut registers);
//! assert_eq!(&output, &[64.0, 100.0, 144.0]);
//! ```

mod evaluate;
mod expression;
mod parse;

pub mod config;
pub mod param;
pub mod sample;
pub mod scene;
pub mod scope;
pub mod trace;

/// Uses the [`pest`] parsing expression grammar language.
///
/// ```text
#[doc = include_str!("grammar.pest")]
/// ```
pub mod grammar_doc {}

pub use config::{ConfigError, Element, Range, VisualizationConfig};
pub use evaluate::*;
pub use expression::*;
pub use parse::{
    empty_binding_map, parse_variable_names, ParseError, ValueType, MAX_INPUT_LEN, MAX_NESTING,
    MAX_TREE_DEPTH,
};
pub use scene::{assemble, Scene, SceneAssembler};
pub use scope::{evaluate, try_evaluate, Scope};

pub trait FloatExt:
    num_traits::Float + num_traits::FloatConst + std::str::FromStr + Send + Sync
{
}
impl FloatExt for f32 {}
impl FloatExt for f64 {}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding_map(var_name: &str) -> Option<BindingId> {
        match var_name {
            "bar" => Some(0),
            "baz" => Some(1),
            "foo" => Some(2),
            _ => None,
        }
    }

    #[test]
    fn real_expression() {
        let real = Expression::parse_real("2 * (foo + bar) * -baz", binding_map).unwrap();

        let bar = [1.0, 2.0, 3.0];
        let baz = [4.0, 5.0, 6.0];
        let foo = [7.0, 8.0, 9.0];
        let bindings = &[bar, baz, foo];
        let mut registers = Registers::new(3);
        let output = real.evaluate(bindings, &mut registers);
        assert_eq!(&output, &[-64.0, -100.0, -144.0]);
        assert_eq!(registers.num_allocations(), 3);
    }

    #[test]
    fn real_op_precedence() {
        let mut registers = Registers::new(1);

        let real = Expression::<f32>::parse_real("1 * 2 + 3 * 4", empty_binding_map).unwrap();
        let output = real.evaluate_without_vars(&mut registers);
        assert_eq!(&output, &[14.0]);

        let real = Expression::<f32>::parse_real("8 / 4 * 3", empty_binding_map).unwrap();
        let output = real.evaluate_without_vars(&mut registers);
        assert_eq!(&output, &[6.0]);

        let real = Expression::<f32>::parse_real("4 ^ 3 ^ 2", empty_binding_map).unwrap();
        let output = real.evaluate_without_vars(&mut registers);
        assert_eq!(&output, &[262144.0]);

        let real = Expression::<f32>::parse_real("-2 ^ 2", empty_binding_map).unwrap();
        let output = real.evaluate_without_vars(&mut registers);
        assert_eq!(&output, &[-4.0]);
    }

    #[test]
    fn bool_expression_with_real_bindings() {
        let parsed = Expression::parse("!(bar < foo && bar < baz)", binding_map).unwrap();
        let bool = parsed.into_bool().unwrap();

        let bar = [1.0, 6.0, 7.0];
        let baz = [2.0, 5.0, 8.0];
        let foo = [3.0, 4.0, 9.0];
        let bindings = &[bar, baz, foo];
        let mut registers = Registers::new(3);
        let output = bool.evaluate(bindings, &mut registers);
        assert_eq!([output[0], output[1], output[2]], [false, true, false]);
        assert_eq!(registers.num_allocations(), 3);
    }

    #[test]
    fn select_with_real_bindings() {
        let real =
            Expression::parse_real("bar > 2 || foo == 9 ? baz : -baz", binding_map).unwrap();

        let bar = [1.0, 2.0, 3.0];
        let baz = [4.0, 5.0, 6.0];
        let foo = [7.0, 9.0, 8.0];
        let bindings = &[bar, baz, foo];
        let mut registers = Registers::new(3);
        let output = real.evaluate(bindings, &mut registers);
        assert_eq!(&output, &[-4.0, 5.0, 6.0]);
    }

    #[test]
    fn naive_allocations_limited_by_recycling() {
        let real = Expression::parse_real(
            "foo + bar + baz + foo + bar + baz + foo + bar + baz",
            binding_map,
        )
        .unwrap();

        let bar = [1.0, 2.0, 3.0];
        let baz = [4.0, 5.0, 6.0];
        let foo = [7.0, 8.0, 9.0];
        let bindings = &[bar, baz, foo];
        let mut registers = Registers::new(3);
        let output = real.evaluate(bindings, &mut registers);
        assert_eq!(&output, &[36.0, 45.0, 54.0]);
        assert_eq!(registers.num_allocations(), 2);
    }

    #[test]
    fn real_bench() {
        fn binding_map(var_name: &str) -> Option<BindingId> {
            match var_name {
                "x" => Some(0),
                "y" => Some(1),
                "z" => Some(2),
                _ => None,
            }
        }
        let real =
            Expression::parse_real("(z + (z^2 - 4*x*y)^0.5) / (2*x)", binding_map).unwrap();

        const LEN: i32 = 1_000_000;
        let x: Vec<_> = (0..LEN).map(|i| i as f32).collect();
        let y: Vec<_> = (0..LEN).map(|i| (LEN - i) as f32).collect();
        let z: Vec<_> = (0..LEN).map(|i| ((LEN / 2) - i) as f32).collect();
        let bindings = &[x, y, z];

        let mut registers = Registers::new(LEN as usize);
        let start = std::time::Instant::now();
        let _output = real.evaluate(bindings, &mut registers);
        let elapsed = start.elapsed().as_micros();
        println!(
            "Took {elapsed} us, {} ns per element",
            (1_000 * elapsed) / LEN as u128
        );
        assert_eq!(registers.num_allocations(), 3);
    }
}
