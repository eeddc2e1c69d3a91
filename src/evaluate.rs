use crate::{BoolExpression, FloatExt, Function, RealExpression};

use bitvec::vec::BitVec;

#[cfg(feature = "rayon")]
use rayon::prelude::{
    IndexedParallelIterator, IntoParallelRefIterator, ParallelExtend, ParallelIterator,
};

impl<Real: FloatExt> BoolExpression<Real> {
    /// Calculates the `bool`-valued results of the expression component-wise.
    pub fn evaluate<R: AsRef<[Real]>>(
        &self,
        bindings: &[R],
        registers: &mut Registers<Real>,
    ) -> BitVec {
        validate_bindings(bindings, registers.register_length);
        self.evaluate_recursive(bindings, registers)
    }

    fn evaluate_recursive<R: AsRef<[Real]>>(
        &self,
        bindings: &[R],
        registers: &mut Registers<Real>,
    ) -> BitVec {
        match self {
            Self::And(lhs, rhs) => {
                evaluate_binary_logic(|lhs, rhs| lhs && rhs, lhs, rhs, bindings, registers)
            }
            Self::Equal(lhs, rhs) => {
                evaluate_real_comparison(|lhs, rhs| lhs == rhs, lhs, rhs, bindings, registers)
            }
            Self::Greater(lhs, rhs) => {
                evaluate_real_comparison(|lhs, rhs| lhs > rhs, lhs, rhs, bindings, registers)
            }
            Self::GreaterEqual(lhs, rhs) => {
                evaluate_real_comparison(|lhs, rhs| lhs >= rhs, lhs, rhs, bindings, registers)
            }
            Self::Less(lhs, rhs) => {
                evaluate_real_comparison(|lhs, rhs| lhs < rhs, lhs, rhs, bindings, registers)
            }
            Self::LessEqual(lhs, rhs) => {
                evaluate_real_comparison(|lhs, rhs| lhs <= rhs, lhs, rhs, bindings, registers)
            }
            Self::Not(only) => !only.evaluate_recursive(bindings, registers),
            Self::NotEqual(lhs, rhs) => {
                evaluate_real_comparison(|lhs, rhs| lhs != rhs, lhs, rhs, bindings, registers)
            }
            Self::Or(lhs, rhs) => {
                evaluate_binary_logic(|lhs, rhs| lhs || rhs, lhs, rhs, bindings, registers)
            }
        }
    }
}

impl<Real: FloatExt> RealExpression<Real> {
    pub fn evaluate_without_vars(&self, registers: &mut Registers<Real>) -> Vec<Real> {
        self.evaluate::<[_; 0]>(&[], registers)
    }

    /// Calculates the real-valued results of the expression component-wise.
    ///
    /// Every binding must hold exactly `registers.register_length()` values.
    /// The returned vector may be handed back with [`Registers::recycle_real`]
    /// once the caller is done with it.
    pub fn evaluate<R: AsRef<[Real]>>(
        &self,
        bindings: &[R],
        registers: &mut Registers<Real>,
    ) -> Vec<Real> {
        validate_bindings(bindings, registers.register_length);
        self.evaluate_recursive(bindings, registers)
    }

    fn evaluate_recursive<R: AsRef<[Real]>>(
        &self,
        bindings: &[R],
        registers: &mut Registers<Real>,
    ) -> Vec<Real> {
        match self {
            Self::Add(lhs, rhs) => {
                evaluate_binary_real_op(|lhs, rhs| lhs + rhs, lhs, rhs, bindings, registers)
            }
            // This branch should only be taken if the entire expression is
            // literally the identity map from one of the bindings.
            Self::Binding(binding) => {
                let mut output = registers.allocate_real();
                output.extend_from_slice(bindings[*binding].as_ref());
                output
            }
            Self::Call(function, only) => {
                evaluate_unary_real_op(unary_fn(*function), only, bindings, registers)
            }
            Self::Div(lhs, rhs) => {
                evaluate_binary_real_op(|lhs, rhs| lhs / rhs, lhs, rhs, bindings, registers)
            }
            Self::Literal(value) => {
                let mut output = registers.allocate_real();
                output.extend(std::iter::repeat(*value).take(registers.register_length));
                output
            }
            Self::Max(lhs, rhs) => evaluate_binary_real_op(nan_max, lhs, rhs, bindings, registers),
            Self::Min(lhs, rhs) => evaluate_binary_real_op(nan_min, lhs, rhs, bindings, registers),
            Self::Mul(lhs, rhs) => {
                evaluate_binary_real_op(|lhs, rhs| lhs * rhs, lhs, rhs, bindings, registers)
            }
            Self::Neg(only) => evaluate_unary_real_op(|only| -only, only, bindings, registers),
            Self::Pow(lhs, rhs) => {
                evaluate_binary_real_op(|lhs, rhs| lhs.powf(rhs), lhs, rhs, bindings, registers)
            }
            Self::Select(condition, then, otherwise) => {
                evaluate_select(condition, then, otherwise, bindings, registers)
            }
            Self::Sub(lhs, rhs) => {
                evaluate_binary_real_op(|lhs, rhs| lhs - rhs, lhs, rhs, bindings, registers)
            }
        }
    }
}

fn unary_fn<Real: FloatExt>(function: Function) -> fn(Real) -> Real {
    match function {
        Function::Sin => Real::sin,
        Function::Cos => Real::cos,
        Function::Tan => Real::tan,
        Function::Asin => Real::asin,
        Function::Acos => Real::acos,
        Function::Atan => Real::atan,
        Function::Abs => Real::abs,
        Function::Sqrt => Real::sqrt,
        Function::Cbrt => Real::cbrt,
        Function::Log => Real::ln,
        Function::Log2 => Real::log2,
        Function::Log10 => Real::log10,
        Function::Exp => Real::exp,
        Function::Floor => Real::floor,
        Function::Ceil => Real::ceil,
        Function::Round => round_half_up,
    }
}

fn round_half_up<Real: FloatExt>(value: Real) -> Real {
    let rounded = value.round();
    // `round` breaks ties away from zero; negative ties go up instead.
    if value < Real::zero() && rounded - value == -(Real::one() / (Real::one() + Real::one())) {
        rounded + Real::one()
    } else {
        rounded
    }
}

fn nan_min<Real: FloatExt>(lhs: Real, rhs: Real) -> Real {
    if lhs.is_nan() || rhs.is_nan() {
        Real::nan()
    } else {
        lhs.min(rhs)
    }
}

fn nan_max<Real: FloatExt>(lhs: Real, rhs: Real) -> Real {
    if lhs.is_nan() || rhs.is_nan() {
        Real::nan()
    } else {
        lhs.max(rhs)
    }
}

fn validate_bindings<T, B: AsRef<[T]>>(input_bindings: &[B], expected_length: usize) {
    for b in input_bindings.iter() {
        assert_eq!(b.as_ref().len(), expected_length);
    }
}

/// Values of a sub-expression: either borrowed straight from the bindings or
/// held in a register that must be recycled afterwards.
enum Operand<'a, Real> {
    Bound(&'a [Real]),
    Register(Vec<Real>),
}

impl<'a, Real: FloatExt> Operand<'a, Real> {
    // Before doing recursive evaluation, we check first if we already have
    // input values in our bindings. This avoids unnecessary copies.
    fn evaluate<R: AsRef<[Real]>>(
        expression: &RealExpression<Real>,
        bindings: &'a [R],
        registers: &mut Registers<Real>,
    ) -> Self {
        match expression {
            RealExpression::Binding(binding) => Self::Bound(bindings[*binding].as_ref()),
            other => Self::Register(other.evaluate_recursive(bindings, registers)),
        }
    }

    fn values(&self) -> &[Real] {
        match self {
            Self::Bound(values) => values,
            Self::Register(values) => values,
        }
    }

    fn recycle(self, registers: &mut Registers<Real>) {
        if let Self::Register(r) = self {
            registers.recycle_real(r);
        }
    }
}

fn evaluate_binary_real_op<Real: FloatExt, R: AsRef<[Real]>>(
    op: fn(Real, Real) -> Real,
    lhs: &RealExpression<Real>,
    rhs: &RealExpression<Real>,
    bindings: &[R],
    registers: &mut Registers<Real>,
) -> Vec<Real> {
    let lhs = Operand::evaluate(lhs, bindings, registers);
    let rhs = Operand::evaluate(rhs, bindings, registers);
    // Allocate this output register as lazily as possible.
    let mut output = registers.allocate_real();

    #[cfg(feature = "rayon")]
    {
        output.par_extend(
            lhs.values()
                .par_iter()
                .zip(rhs.values().par_iter())
                .map(|(lhs, rhs)| op(*lhs, *rhs)),
        );
    }
    #[cfg(not(feature = "rayon"))]
    {
        output.extend(
            lhs.values()
                .iter()
                .zip(rhs.values().iter())
                .map(|(lhs, rhs)| op(*lhs, *rhs)),
        );
    }

    lhs.recycle(registers);
    rhs.recycle(registers);
    output
}

fn evaluate_unary_real_op<Real: FloatExt, R: AsRef<[Real]>>(
    op: fn(Real) -> Real,
    only: &RealExpression<Real>,
    bindings: &[R],
    registers: &mut Registers<Real>,
) -> Vec<Real> {
    let only = Operand::evaluate(only, bindings, registers);
    // Allocate this output register as lazily as possible.
    let mut output = registers.allocate_real();

    #[cfg(feature = "rayon")]
    {
        output.par_extend(only.values().par_iter().map(|only| op(*only)));
    }
    #[cfg(not(feature = "rayon"))]
    {
        output.extend(only.values().iter().map(|only| op(*only)));
    }

    only.recycle(registers);
    output
}

fn evaluate_select<Real: FloatExt, R: AsRef<[Real]>>(
    condition: &BoolExpression<Real>,
    then: &RealExpression<Real>,
    otherwise: &RealExpression<Real>,
    bindings: &[R],
    registers: &mut Registers<Real>,
) -> Vec<Real> {
    let mask = condition.evaluate_recursive(bindings, registers);

    // A uniform mask only ever needs one branch.
    if mask.all() {
        registers.recycle_bool(mask);
        return then.evaluate_recursive(bindings, registers);
    }
    if mask.not_any() {
        registers.recycle_bool(mask);
        return otherwise.evaluate_recursive(bindings, registers);
    }

    let then = Operand::evaluate(then, bindings, registers);
    let otherwise = Operand::evaluate(otherwise, bindings, registers);
    let mut output = registers.allocate_real();
    output.extend(
        mask.iter()
            .by_vals()
            .zip(then.values().iter().zip(otherwise.values().iter()))
            .map(|(take_then, (then, otherwise))| if take_then { *then } else { *otherwise }),
    );

    registers.recycle_bool(mask);
    then.recycle(registers);
    otherwise.recycle(registers);
    output
}

fn evaluate_real_comparison<Real: FloatExt, R: AsRef<[Real]>>(
    op: fn(Real, Real) -> bool,
    lhs: &RealExpression<Real>,
    rhs: &RealExpression<Real>,
    bindings: &[R],
    registers: &mut Registers<Real>,
) -> BitVec {
    let lhs = Operand::evaluate(lhs, bindings, registers);
    let rhs = Operand::evaluate(rhs, bindings, registers);
    // Allocate this output register as lazily as possible.
    let mut output = registers.allocate_bool();
    output.extend(
        lhs.values()
            .iter()
            .zip(rhs.values().iter())
            .map(|(lhs, rhs)| op(*lhs, *rhs)),
    );

    lhs.recycle(registers);
    rhs.recycle(registers);
    output
}

fn evaluate_binary_logic<Real: FloatExt, R: AsRef<[Real]>>(
    op: fn(bool, bool) -> bool,
    lhs: &BoolExpression<Real>,
    rhs: &BoolExpression<Real>,
    bindings: &[R],
    registers: &mut Registers<Real>,
) -> BitVec {
    let lhs_values = lhs.evaluate_recursive(bindings, registers);
    let rhs_values = rhs.evaluate_recursive(bindings, registers);

    // Allocate this output register as lazily as possible.
    let mut output = registers.allocate_bool();
    output.extend(
        lhs_values
            .iter()
            .by_vals()
            .zip(rhs_values.iter().by_vals())
            .map(|(lhs, rhs)| op(lhs, rhs)),
    );

    registers.recycle_bool(lhs_values);
    registers.recycle_bool(rhs_values);
    output
}

/// Scratch space for calculations. Can be reused across evaluations with the
/// same data binding length.
///
/// Attempts to minimize allocations by recycling registers after intermediate
/// calculations have finished.
pub struct Registers<Real> {
    num_allocations: usize,
    real_registers: Vec<Vec<Real>>,
    bool_registers: Vec<BitVec>,
    register_length: usize,
}

impl<Real> Registers<Real> {
    pub fn new(register_length: usize) -> Self {
        Self {
            num_allocations: 0,
            real_registers: vec![],
            bool_registers: vec![],
            register_length,
        }
    }

    pub fn register_length(&self) -> usize {
        self.register_length
    }

    /// Return a finished output so later evaluations can reuse its storage.
    pub fn recycle_real(&mut self, mut used: Vec<Real>) {
        used.clear();
        self.real_registers.push(used);
    }

    fn recycle_bool(&mut self, mut used: BitVec) {
        used.clear();
        self.bool_registers.push(used);
    }

    fn allocate_real(&mut self) -> Vec<Real> {
        self.real_registers.pop().unwrap_or_else(|| {
            self.num_allocations += 1;
            Vec::with_capacity(self.register_length)
        })
    }

    fn allocate_bool(&mut self) -> BitVec {
        self.bool_registers.pop().unwrap_or_else(|| {
            self.num_allocations += 1;
            BitVec::with_capacity(self.register_length)
        })
    }

    pub fn num_allocations(&self) -> usize {
        self.num_allocations
    }
}
