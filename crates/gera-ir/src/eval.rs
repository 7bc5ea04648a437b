//! Constant evaluation of module-level values, `static` expressions and
//! value-match branch values.

use gera_common::ast::{BinaryOp, Node, NodeKind, Target, UnaryOp};
use gera_typeck::{Symbols, TyVar};

use crate::error::LowerError;
use crate::value::StaticValue;

/// Folds a constant-only expression into a value.
pub trait ConstEvaluator {
    fn evaluate(&mut self, node: &Node<TyVar>, symbols: &Symbols) -> Result<StaticValue, LowerError>;
}

/// Largest number of values a folded repeating array may hold, counting
/// the values nested inside each element.
pub const MAX_REPEATED_VALUES: usize = 1 << 20;

/// Folds literals and literal compositions, arithmetic on numbers and
/// references to other constant module variables.
#[derive(Debug, Default)]
pub struct LiteralFolder;

impl ConstEvaluator for LiteralFolder {
    fn evaluate(&mut self, node: &Node<TyVar>, symbols: &Symbols) -> Result<StaticValue, LowerError> {
        let not_constant = |what: &str| LowerError::NotConstant {
            what: what.to_string(),
            span: node.span,
        };
        Ok(match &node.kind {
            NodeKind::Unit => StaticValue::Unit,
            NodeKind::Boolean(b) => StaticValue::Boolean(*b),
            NodeKind::Integer(i) => StaticValue::Integer(*i),
            NodeKind::Float(x) => StaticValue::Float(*x),
            NodeKind::String(s) => StaticValue::String(s.clone()),
            NodeKind::ArrayLiteral(values) => StaticValue::Array(
                values
                    .iter()
                    .map(|value| self.evaluate(value, symbols))
                    .collect::<Result<_, _>>()?,
            ),
            NodeKind::RepeatingArrayLiteral { value, size } => {
                let value = self.evaluate(value, symbols)?;
                let size = match self.evaluate(size, symbols)? {
                    StaticValue::Integer(n) => usize::try_from(n).map_err(|_| not_constant("a negative array size"))?,
                    _ => return Err(not_constant("this array size")),
                };
                let total = size.checked_mul(value.count()).unwrap_or(usize::MAX);
                if total > MAX_REPEATED_VALUES {
                    return Err(not_constant("an array this large"));
                }
                StaticValue::Array(vec![value; size])
            }
            NodeKind::ObjectLiteral(members) => StaticValue::Object(
                members
                    .iter()
                    .map(|(name, value)| Ok((name.clone(), self.evaluate(value, symbols)?)))
                    .collect::<Result<_, LowerError>>()?,
            ),
            NodeKind::VariantLiteral { variant, value } => StaticValue::Variant {
                name: variant.clone(),
                value: Box::new(self.evaluate(value, symbols)?),
            },
            NodeKind::Static(value) => self.evaluate(value, symbols)?,
            NodeKind::Unary { op, value } => match (op, self.evaluate(value, symbols)?) {
                (UnaryOp::Not, StaticValue::Boolean(b)) => StaticValue::Boolean(!b),
                (UnaryOp::Negate, StaticValue::Integer(i)) => StaticValue::Integer(i.wrapping_neg()),
                (UnaryOp::Negate, StaticValue::Float(x)) => StaticValue::Float(-x),
                _ => return Err(not_constant("this operation")),
            },
            NodeKind::Binary { op, left, right } => {
                let left = self.evaluate(left, symbols)?;
                let right = self.evaluate(right, symbols)?;
                fold_binary(*op, &left, &right).ok_or_else(|| not_constant("this operation"))?
            }
            NodeKind::GlobalAccess(Target::Resolved { path, variant }) => {
                let value = symbols
                    .lookup(path)
                    .and_then(|id| symbols.get(id).as_variable())
                    .and_then(|variable| variable.variants.get(*variant))
                    .ok_or_else(|| LowerError::Unresolved {
                        path: Some(path.clone()),
                        span: node.span,
                    })?;
                match &value.value {
                    Some(value) => self.evaluate(value, symbols)?,
                    None => return Err(not_constant("an external variable")),
                }
            }
            NodeKind::GlobalAccess(Target::Pending(_)) => {
                return Err(LowerError::Unresolved {
                    path: None,
                    span: node.span,
                })
            }
            NodeKind::Closure { .. } | NodeKind::ProcedureRef(_) => return Err(not_constant("a closure")),
            NodeKind::ProcedureCall { .. } | NodeKind::Call { .. } | NodeKind::MethodCall { .. } => {
                return Err(not_constant("a call"))
            }
            _ => return Err(not_constant("this expression")),
        })
    }
}

fn fold_binary(op: BinaryOp, left: &StaticValue, right: &StaticValue) -> Option<StaticValue> {
    use StaticValue::{Boolean, Float, Integer};
    if op.is_equality() {
        let equal = left == right;
        return Some(Boolean(if op == BinaryOp::Equals { equal } else { !equal }));
    }
    Some(match (left, right) {
        (Integer(a), Integer(b)) => match op {
            BinaryOp::Add => Integer(a.wrapping_add(*b)),
            BinaryOp::Subtract => Integer(a.wrapping_sub(*b)),
            BinaryOp::Multiply => Integer(a.wrapping_mul(*b)),
            BinaryOp::Divide => Integer(a.checked_div(*b)?),
            BinaryOp::Modulo => Integer(a.checked_rem(*b)?),
            BinaryOp::LessThan => Boolean(a < b),
            BinaryOp::GreaterThan => Boolean(a > b),
            BinaryOp::LessThanEqual => Boolean(a <= b),
            BinaryOp::GreaterThanEqual => Boolean(a >= b),
            _ => return None,
        },
        (Float(a), Float(b)) => match op {
            BinaryOp::Add => Float(a + b),
            BinaryOp::Subtract => Float(a - b),
            BinaryOp::Multiply => Float(a * b),
            BinaryOp::Divide => Float(a / b),
            BinaryOp::Modulo => Float(a % b),
            BinaryOp::LessThan => Boolean(a < b),
            BinaryOp::GreaterThan => Boolean(a > b),
            BinaryOp::LessThanEqual => Boolean(a <= b),
            BinaryOp::GreaterThanEqual => Boolean(a >= b),
            _ => return None,
        },
        (Boolean(a), Boolean(b)) => match op {
            BinaryOp::And => Boolean(*a && *b),
            BinaryOp::Or => Boolean(*a || *b),
            _ => return None,
        },
        _ => return None,
    })
}
