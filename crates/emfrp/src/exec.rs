//! Recursive expression evaluator.
//!
//! Evaluation is synchronous and side-effect free apart from reads through
//! [`NodeLookup`]. The first error aborts the whole evaluation and is
//! returned unchanged; intermediate values are dropped on the way out.

use std::fmt;

use crate::identifier::Identifier;
use crate::parser::{BinaryOperator, Expression, MAX_NESTING};
use crate::value::{Value, ValueKind};

/// Read access into the node store.
pub trait NodeLookup {
    fn lookup_current(&self, name: &str) -> Option<Value>;
    fn lookup_previous(&self, name: &str) -> Option<Value>;
}

/// Per-evaluation state: the store and the node being recomputed, if any.
///
/// `current` is fixed for a whole evaluation, so nothing needs restoring
/// when it fails halfway.
#[derive(Clone, Copy)]
pub struct ExecContext<'a> {
    store: &'a dyn NodeLookup,
    current: Option<&'a str>,
    depth: usize,
}

impl<'a> ExecContext<'a> {
    /// Context for expressions outside any node body, e.g. a REPL line.
    pub fn top_level(store: &'a dyn NodeLookup) -> Self {
        Self {
            store,
            current: None,
            depth: 0,
        }
    }

    /// Context for recomputing the body of node `name`.
    pub fn for_node(store: &'a dyn NodeLookup, name: &'a str) -> Self {
        Self {
            store,
            current: Some(name),
            depth: 0,
        }
    }

    pub fn current(&self) -> Option<&'a str> {
        self.current
    }

    fn descend(&self) -> Result<Self, ExecError> {
        if self.depth >= MAX_NESTING {
            return Err(ExecError::NestingTooDeep);
        }
        Ok(Self {
            depth: self.depth + 1,
            ..*self
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecError {
    /// A node body read its own current value.
    CyclicReference(Identifier),
    /// Unknown node, no previous value yet, or `@last` of another node.
    MissingIdentifier(Identifier),
    TypeMismatch {
        operator: BinaryOperator,
        left: ValueKind,
        right: ValueKind,
    },
    /// The expression tree holds a node the evaluator cannot run.
    InvalidArgument,
    DivisionByZero,
    /// The tree is deeper than the evaluator is willing to recurse.
    NestingTooDeep,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::CyclicReference(name) => write!(f, "cyclic reference: '{name}' reads its own current value"),
            ExecError::MissingIdentifier(name) => write!(f, "missing identifier '{name}'"),
            ExecError::TypeMismatch { operator, left, right } => {
                write!(f, "type mismatch: cannot apply '{operator}' to {left} and {right}")
            }
            ExecError::InvalidArgument => write!(f, "invalid argument: unsupported expression"),
            ExecError::DivisionByZero => write!(f, "division by zero"),
            ExecError::NestingTooDeep => write!(f, "expression nested deeper than {MAX_NESTING} levels"),
        }
    }
}

impl std::error::Error for ExecError {}

pub fn evaluate(expression: &Expression, context: &ExecContext) -> Result<Value, ExecError> {
    let context = &context.descend()?;
    match expression {
        Expression::Integer(value) => Ok(Value::Int(*value)),
        Expression::Boolean(value) => Ok(Value::bool(*value)),
        Expression::Binary { operator, left, right } => evaluate_binary(*operator, left, right, context),
        Expression::If {
            condition,
            then_branch,
            else_branch,
        } => {
            if evaluate(condition, context)?.is_true() {
                evaluate(then_branch, context)
            } else {
                evaluate(else_branch, context)
            }
        }
        Expression::Identifier(name) => {
            if context.current == Some(name.as_str()) {
                return Err(ExecError::CyclicReference(name.clone()));
            }
            context
                .store
                .lookup_current(name)
                .ok_or_else(|| ExecError::MissingIdentifier(name.clone()))
        }
        Expression::LastIdentifier(name) => {
            // Only a node's own history is readable from inside its body.
            if context.current.is_some_and(|current| current != name.as_str()) {
                return Err(ExecError::MissingIdentifier(name.clone()));
            }
            context
                .store
                .lookup_previous(name)
                .ok_or_else(|| ExecError::MissingIdentifier(name.clone()))
        }
        Expression::Invalid => Err(ExecError::InvalidArgument),
    }
}

/// Evaluates `left`, then `right` unless a short-circuit operator already
/// decided the result.
pub fn evaluate_binary(
    operator: BinaryOperator,
    left: &Expression,
    right: &Expression,
    context: &ExecContext,
) -> Result<Value, ExecError> {
    let left = evaluate(left, context)?;
    match operator {
        BinaryOperator::ShortCircuitAnd if left.is_false() => return Ok(Value::FALSE),
        BinaryOperator::ShortCircuitOr if !left.is_false() => return Ok(left),
        _ => {}
    }
    let right = evaluate(right, context)?;

    match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => integer_operation(operator, *a, *b),
        _ => mixed_operation(operator, &left, &right),
    }
}

fn integer_operation(operator: BinaryOperator, a: i32, b: i32) -> Result<Value, ExecError> {
    let value = match operator {
        BinaryOperator::Add => a.wrapping_add(b),
        BinaryOperator::Subtract => a.wrapping_sub(b),
        BinaryOperator::Multiply => a.wrapping_mul(b),
        BinaryOperator::Divide | BinaryOperator::Modulo if b == 0 => return Err(ExecError::DivisionByZero),
        BinaryOperator::Divide => a.wrapping_div(b),
        BinaryOperator::Modulo => a.wrapping_rem(b),
        // Shift amounts are masked to the low five bits.
        BinaryOperator::ShiftLeft => a.wrapping_shl(b as u32),
        BinaryOperator::ShiftRight => a.wrapping_shr(b as u32),
        BinaryOperator::And => a & b,
        BinaryOperator::Or => a | b,
        BinaryOperator::Xor => a ^ b,
        BinaryOperator::LessOrEqual => return Ok(Value::bool(a <= b)),
        BinaryOperator::Less => return Ok(Value::bool(a < b)),
        BinaryOperator::GreaterOrEqual => return Ok(Value::bool(a >= b)),
        BinaryOperator::Greater => return Ok(Value::bool(a > b)),
        BinaryOperator::Equal => return Ok(Value::bool(a == b)),
        BinaryOperator::NotEqual => return Ok(Value::bool(a != b)),
        // The left side did not decide, and an integer right side is never `false`.
        BinaryOperator::ShortCircuitAnd | BinaryOperator::ShortCircuitOr => return Ok(Value::TRUE),
    };
    Ok(Value::Int(value))
}

fn mixed_operation(operator: BinaryOperator, left: &Value, right: &Value) -> Result<Value, ExecError> {
    let (a, b) = (!left.is_false(), !right.is_false());
    let result = match operator {
        BinaryOperator::Equal => left.structurally_equal(right),
        BinaryOperator::NotEqual => !left.structurally_equal(right),
        BinaryOperator::And | BinaryOperator::ShortCircuitAnd => a && b,
        BinaryOperator::Or | BinaryOperator::ShortCircuitOr => a || b,
        BinaryOperator::Xor => a ^ b,
        _ => {
            return Err(ExecError::TypeMismatch {
                operator,
                left: left.kind(),
                right: right.kind(),
            });
        }
    };
    Ok(Value::bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    #[derive(Default)]
    struct Store {
        current: FxHashMap<Identifier, Value>,
        previous: FxHashMap<Identifier, Value>,
    }

    impl Store {
        fn with_current(mut self, name: &str, value: impl Into<Value>) -> Self {
            self.current.insert(name.into(), value.into());
            self
        }

        fn with_previous(mut self, name: &str, value: impl Into<Value>) -> Self {
            self.previous.insert(name.into(), value.into());
            self
        }
    }

    impl NodeLookup for Store {
        fn lookup_current(&self, name: &str) -> Option<Value> {
            self.current.get(name).cloned()
        }

        fn lookup_previous(&self, name: &str) -> Option<Value> {
            self.previous.get(name).cloned()
        }
    }

    fn int(value: i32) -> Expression {
        Expression::Integer(value)
    }

    fn bin(operator: BinaryOperator, left: Expression, right: Expression) -> Expression {
        Expression::binary(operator, left, right)
    }

    fn eval(expression: &Expression) -> Result<Value, ExecError> {
        let store = Store::default();
        evaluate(expression, &ExecContext::top_level(&store))
    }

    #[test]
    fn arithmetic_wraps() {
        use BinaryOperator::*;
        assert_eq!(eval(&bin(Add, int(3), int(4))), Ok(Value::Int(7)));
        assert_eq!(eval(&bin(Add, int(i32::MAX), int(1))), Ok(Value::Int(i32::MIN)));
        assert_eq!(eval(&bin(Multiply, int(65536), int(65536))), Ok(Value::Int(0)));
        assert_eq!(eval(&bin(Subtract, int(i32::MIN), int(1))), Ok(Value::Int(i32::MAX)));
    }

    #[test]
    fn division_truncates_and_remainder_follows_dividend() {
        use BinaryOperator::*;
        assert_eq!(eval(&bin(Divide, int(7), int(2))), Ok(Value::Int(3)));
        assert_eq!(eval(&bin(Divide, int(-7), int(2))), Ok(Value::Int(-3)));
        assert_eq!(eval(&bin(Modulo, int(-7), int(2))), Ok(Value::Int(-1)));
        assert_eq!(eval(&bin(Modulo, int(7), int(-2))), Ok(Value::Int(1)));
        assert_eq!(eval(&bin(Divide, int(i32::MIN), int(-1))), Ok(Value::Int(i32::MIN)));
        assert_eq!(eval(&bin(Modulo, int(i32::MIN), int(-1))), Ok(Value::Int(0)));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        use BinaryOperator::*;
        assert_eq!(eval(&bin(Divide, int(1), int(0))), Err(ExecError::DivisionByZero));
        assert_eq!(eval(&bin(Modulo, int(1), int(0))), Err(ExecError::DivisionByZero));
    }

    #[test]
    fn shifts_and_bitwise() {
        use BinaryOperator::*;
        assert_eq!(eval(&bin(ShiftLeft, int(1), int(4))), Ok(Value::Int(16)));
        assert_eq!(eval(&bin(ShiftRight, int(-16), int(2))), Ok(Value::Int(-4)));
        assert_eq!(eval(&bin(ShiftLeft, int(1), int(33))), Ok(Value::Int(2)));
        assert_eq!(eval(&bin(And, int(0b1100), int(0b1010))), Ok(Value::Int(0b1000)));
        assert_eq!(eval(&bin(Or, int(0b1100), int(0b1010))), Ok(Value::Int(0b1110)));
        assert_eq!(eval(&bin(Xor, int(0b1100), int(0b1010))), Ok(Value::Int(0b0110)));
    }

    #[test]
    fn comparisons_yield_singletons() {
        use BinaryOperator::*;
        for (operator, expected) in [
            (LessOrEqual, true),
            (Less, true),
            (GreaterOrEqual, false),
            (Greater, false),
            (Equal, false),
            (NotEqual, true),
        ] {
            let value = eval(&bin(operator, int(1), int(2))).unwrap();
            assert_eq!(value, Value::bool(expected), "1 {operator} 2");
            assert!(matches!(value, Value::True | Value::False));
        }
    }

    #[test]
    fn short_circuit_skips_right_operand() {
        use BinaryOperator::*;
        let failing = Expression::identifier("undefined");
        assert_eq!(eval(&bin(ShortCircuitAnd, Expression::Boolean(false), failing.clone())), Ok(Value::FALSE));
        assert_eq!(eval(&bin(ShortCircuitOr, Expression::Boolean(true), failing.clone())), Ok(Value::TRUE));
        // Any value other than `false` decides `||` and is returned as-is.
        assert_eq!(eval(&bin(ShortCircuitOr, int(5), failing.clone())), Ok(Value::Int(5)));
        // The right side is evaluated when the left does not decide.
        assert_eq!(
            eval(&bin(ShortCircuitAnd, Expression::Boolean(true), failing.clone())),
            Err(ExecError::MissingIdentifier("undefined".into()))
        );
        assert_eq!(eval(&bin(ShortCircuitOr, Expression::Boolean(false), int(0))), Ok(Value::TRUE));
    }

    #[test]
    fn first_error_wins() {
        use BinaryOperator::*;
        let expression = bin(Add, Expression::identifier("a"), Expression::identifier("b"));
        assert_eq!(eval(&expression), Err(ExecError::MissingIdentifier("a".into())));
    }

    #[test]
    fn logical_operators_coerce_non_integers() {
        use BinaryOperator::*;
        let t = Expression::Boolean(true);
        let f = Expression::Boolean(false);
        assert_eq!(eval(&bin(And, t.clone(), f.clone())), Ok(Value::FALSE));
        assert_eq!(eval(&bin(Or, t.clone(), f.clone())), Ok(Value::TRUE));
        assert_eq!(eval(&bin(Xor, t.clone(), t.clone())), Ok(Value::FALSE));
        // An integer is "not false", even zero.
        assert_eq!(eval(&bin(And, int(0), t.clone())), Ok(Value::TRUE));
    }

    #[test]
    fn equality_on_non_integers() {
        use BinaryOperator::*;
        let t = Expression::Boolean(true);
        let f = Expression::Boolean(false);
        assert_eq!(eval(&bin(Equal, t.clone(), t.clone())), Ok(Value::TRUE));
        assert_eq!(eval(&bin(Equal, t.clone(), f.clone())), Ok(Value::FALSE));
        assert_eq!(eval(&bin(NotEqual, t.clone(), f.clone())), Ok(Value::TRUE));
        assert_eq!(eval(&bin(NotEqual, f.clone(), f.clone())), Ok(Value::FALSE));
        assert_eq!(eval(&bin(Equal, int(1), t.clone())), Ok(Value::FALSE));
        assert_eq!(eval(&bin(NotEqual, int(1), t.clone())), Ok(Value::TRUE));
    }

    #[test]
    fn text_values_from_the_store() {
        use BinaryOperator::*;
        let store = Store::default()
            .with_current("a", Value::text("on"))
            .with_current("b", Value::text("on"))
            .with_current("c", Value::text("off"));
        let context = ExecContext::top_level(&store);
        let a = Expression::identifier("a");
        assert_eq!(evaluate(&bin(Equal, a.clone(), Expression::identifier("b")), &context), Ok(Value::TRUE));
        assert_eq!(evaluate(&bin(Equal, a.clone(), Expression::identifier("c")), &context), Ok(Value::FALSE));
        assert_eq!(
            evaluate(&bin(Add, a.clone(), int(1)), &context),
            Err(ExecError::TypeMismatch {
                operator: Add,
                left: ValueKind::Text,
                right: ValueKind::Integer,
            })
        );
    }

    #[test]
    fn arithmetic_on_booleans_is_a_type_mismatch() {
        let expression = bin(BinaryOperator::Less, Expression::Boolean(true), int(1));
        assert!(matches!(eval(&expression), Err(ExecError::TypeMismatch { .. })));
    }

    #[test]
    fn conditional_evaluates_only_the_taken_branch() {
        let missing = Expression::identifier("missing");
        let taken_then = Expression::conditional(Expression::Boolean(true), int(1), missing.clone());
        let taken_else = Expression::conditional(Expression::Boolean(false), missing.clone(), int(2));
        assert_eq!(eval(&taken_then), Ok(Value::Int(1)));
        assert_eq!(eval(&taken_else), Ok(Value::Int(2)));
        // Anything but the `true` singleton selects the else branch.
        assert_eq!(eval(&Expression::conditional(int(1), int(1), int(2))), Ok(Value::Int(2)));
    }

    #[test]
    fn reading_own_current_value_is_cyclic() {
        let store = Store::default().with_current("x", 1);
        let context = ExecContext::for_node(&store, "x");
        assert_eq!(
            evaluate(&Expression::identifier("x"), &context),
            Err(ExecError::CyclicReference("x".into()))
        );
    }

    #[test]
    fn last_reads_own_previous_value() {
        let store = Store::default().with_current("c", 10).with_previous("c", 3);
        let context = ExecContext::for_node(&store, "c");
        assert_eq!(evaluate(&Expression::last("c"), &context), Ok(Value::Int(3)));
    }

    fn sum_chain(terms: usize) -> Expression {
        (1..terms).fold(int(1), |sum, _| bin(BinaryOperator::Add, sum, int(1)))
    }

    #[test]
    fn deep_trees_fail_instead_of_overflowing() {
        assert_eq!(eval(&sum_chain(10_000)), Err(ExecError::NestingTooDeep));
        assert_eq!(eval(&sum_chain(MAX_NESTING)), Ok(Value::Int(MAX_NESTING as i32)));
        assert_eq!(eval(&sum_chain(MAX_NESTING + 1)), Err(ExecError::NestingTooDeep));
    }

    #[test]
    fn last_of_another_node_is_missing() {
        let store = Store::default().with_current("a", 1).with_previous("a", 0);
        let context = ExecContext::for_node(&store, "b");
        assert_eq!(
            evaluate(&Expression::last("a"), &context),
            Err(ExecError::MissingIdentifier("a".into()))
        );
        // Outside a node body any previous value is readable.
        assert_eq!(evaluate(&Expression::last("a"), &ExecContext::top_level(&store)), Ok(Value::Int(0)));
    }

    #[test]
    fn last_without_history_is_missing() {
        let store = Store::default();
        let context = ExecContext::for_node(&store, "c");
        assert_eq!(
            evaluate(&Expression::last("c"), &context),
            Err(ExecError::MissingIdentifier("c".into()))
        );
    }

    #[test]
    fn invalid_node_is_rejected() {
        assert_eq!(eval(&Expression::Invalid), Err(ExecError::InvalidArgument));
    }
}
