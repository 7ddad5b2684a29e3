use std::collections::HashMap;

use crate::spacial::{Length, Unit};
use crate::warnings::{SourcePosition, WarningCollector};

/// Arithmetic expression of an aperture macro body. Operator precedence and
/// associativity are resolved by the upstream parser; by the time an expression reaches
/// this crate it is already a tree.
#[derive(Debug, Clone, PartialEq)]
pub enum MacroExpression {
    Literal(f64),
    /// `$n` reference
    Variable(u32),
    UnaryMinus(Box<MacroExpression>),
    Binary {
        op: BinaryOperator,
        left: Box<MacroExpression>,
        right: Box<MacroExpression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl MacroExpression {
    pub fn binary(op: BinaryOperator, left: MacroExpression, right: MacroExpression) -> Self {
        MacroExpression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

/// Evaluates macro expressions against a table of numbered variables. One evaluator is
/// created per aperture flash, seeded from the aperture parameters ($1 = first
/// parameter); variable definition statements mutate the table in place.
///
/// A reference to an unset variable makes the whole expression undefined (`None`) and
/// records a warning; the owning statement is then skipped, not drawn.
pub struct MacroExpressionEvaluator {
    unit: Unit,
    variables: HashMap<u32, f64>,
}

impl MacroExpressionEvaluator {
    pub fn new(unit: Unit) -> Self {
        Self {
            unit,
            variables: HashMap::new(),
        }
    }

    pub fn set(&mut self, variable_nr: u32, value: Length) {
        self.variables
            .insert(variable_nr, value.value_in(self.unit));
    }

    pub fn evaluate(
        &self,
        expression: &MacroExpression,
        pos: SourcePosition,
        warnings: &mut WarningCollector,
    ) -> Option<Length> {
        self.evaluate_value(expression, pos, warnings)
            .map(|value| Length::new(self.unit, value))
    }

    fn evaluate_value(
        &self,
        expression: &MacroExpression,
        pos: SourcePosition,
        warnings: &mut WarningCollector,
    ) -> Option<f64> {
        match expression {
            MacroExpression::Literal(value) => Some(*value),
            MacroExpression::Variable(nr) => {
                let value = self.variables.get(nr).copied();
                if value.is_none() {
                    warnings.add(pos, format!("Undefined macro variable ${}", nr));
                }
                value
            }
            MacroExpression::UnaryMinus(inner) => self
                .evaluate_value(inner, pos, warnings)
                .map(|value| -value),
            MacroExpression::Binary {
                op,
                left,
                right,
            } => {
                let left = self.evaluate_value(left, pos, warnings)?;
                let right = self.evaluate_value(right, pos, warnings)?;
                Some(match op {
                    BinaryOperator::Add => left + right,
                    BinaryOperator::Subtract => left - right,
                    BinaryOperator::Multiply => left * right,
                    BinaryOperator::Divide => left / right,
                })
            }
        }
    }
}
