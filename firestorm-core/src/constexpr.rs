//! Compile-time evaluation of literal-only expressions.
//!
//! Arithmetic wraps at 64 bits like the generated code does. Right
//! shift is logical, matching the `lshr` the generator emits.

use crate::ast::{BinaryOp, CompareOp, Expr, UnaryOp};
use crate::error::CoreError;

pub fn evaluate(expr: &Expr) -> Result<i64, CoreError> {
    match expr {
        Expr::Number(value) => Ok(*value),
        Expr::Unary { op, operand } => {
            let value = evaluate(operand)?;
            Ok(match op {
                UnaryOp::Plus => value,
                UnaryOp::Minus => value.wrapping_neg(),
                UnaryOp::Not => bool_to_i64(value == 0),
                UnaryOp::BitNot => !value,
            })
        }
        Expr::Binary { op, lhs, rhs } => {
            let left = evaluate(lhs)?;
            let right = evaluate(rhs)?;
            binary(*op, left, right)
        }
        Expr::Compare { op, lhs, rhs } => {
            let left = evaluate(lhs)?;
            let right = evaluate(rhs)?;
            Ok(bool_to_i64(compare(*op, left, right)))
        }
        Expr::Str(_) => Err(CoreError::ConstExpr(
            "string literals are only allowed as direct initializers".to_string(),
        )),
        Expr::Call(call) => Err(CoreError::ConstExpr(format!(
            "call to '{}' is not a constant expression",
            call.name
        ))),
        Expr::Lookup(name) | Expr::LookupIndexed { name, .. } => Err(CoreError::ConstExpr(
            format!("variable '{name}' is not a constant expression"),
        )),
    }
}

fn binary(op: BinaryOp, left: i64, right: i64) -> Result<i64, CoreError> {
    Ok(match op {
        BinaryOp::Add => left.wrapping_add(right),
        BinaryOp::Sub => left.wrapping_sub(right),
        BinaryOp::Mul => left.wrapping_mul(right),
        BinaryOp::Div => {
            if right == 0 {
                return Err(CoreError::ConstExpr("division by zero".to_string()));
            }
            left.wrapping_div(right)
        }
        BinaryOp::Mod => {
            if right == 0 {
                return Err(CoreError::ConstExpr("modulo by zero".to_string()));
            }
            left.wrapping_rem(right)
        }
        BinaryOp::And => left & right,
        BinaryOp::Or => left | right,
        BinaryOp::Xor => left ^ right,
        BinaryOp::Shl => left.wrapping_shl(right as u32),
        BinaryOp::Shr => (left as u64).wrapping_shr(right as u32) as i64,
    })
}

pub fn compare(op: CompareOp, left: i64, right: i64) -> bool {
    match op {
        CompareOp::Equal => left == right,
        CompareOp::NotEqual => left != right,
        CompareOp::Less => left < right,
        CompareOp::LessEqual => left <= right,
        CompareOp::Greater => left > right,
        CompareOp::GreaterEqual => left >= right,
    }
}

fn bool_to_i64(value: bool) -> i64 {
    if value { 1 } else { 0 }
}
