//! Formula evaluation over the int64 and double domains.
//!
//! Integer evaluation follows native 64-bit wraparound/truncation;
//! division by zero is a `Runtime` error. Float evaluation follows
//! IEEE-754 double semantics — `NaN` and `Inf` propagate without
//! special-casing. Built-in functions and constants live in an immutable
//! static table; external names go through the `VarResolver`.

use crate::model::Value;
use crate::{Error, Result};
use super::ast::{BinaryOp, Expr, UnaryOp, is_builtin_constant};

// ============================================================================
// Variable resolution
// ============================================================================

/// Resolves externally bound names during evaluation.
///
/// The engine binds formula variables to other features; tests bind them
/// to plain values. Lookups run per evaluation — variables are bound by
/// reference, not by value.
pub trait VarResolver {
    fn lookup(&mut self, name: &str) -> Result<Value>;
}

/// Resolver for formulas without external variables.
pub struct EmptyResolver;

impl VarResolver for EmptyResolver {
    fn lookup(&mut self, name: &str) -> Result<Value> {
        Err(Error::Runtime(format!("unknown symbol '{name}' in formula")))
    }
}

impl VarResolver for hashbrown::HashMap<String, Value> {
    fn lookup(&mut self, name: &str) -> Result<Value> {
        self.get(name)
            .cloned()
            .ok_or_else(|| Error::Runtime(format!("unknown symbol '{name}' in formula")))
    }
}

// ============================================================================
// Integer domain
// ============================================================================

pub fn eval_int(expr: &Expr, resolver: &mut dyn VarResolver) -> Result<i64> {
    match expr {
        Expr::Int(v) => Ok(*v),
        Expr::Float(v) => {
            if v.fract() == 0.0 {
                Ok(*v as i64)
            } else {
                Err(Error::Runtime(format!(
                    "float literal {v} in integer formula"
                )))
            }
        }

        Expr::Var(name) => {
            if is_builtin_constant(name) {
                return Err(Error::Runtime(format!(
                    "constant '{name}' is not available in integer formulas"
                )));
            }
            let value = resolver.lookup(name)?;
            match value.as_int() {
                Some(v) => Ok(v),
                None => Err(Error::Runtime(format!(
                    "variable '{name}' is not integral: {value}"
                ))),
            }
        }

        Expr::Unary { op, expr } => {
            let v = eval_int(expr, resolver)?;
            Ok(match op {
                UnaryOp::Neg => v.wrapping_neg(),
                UnaryOp::Not => (v == 0) as i64,
                UnaryOp::BitNot => !v,
            })
        }

        Expr::Binary { left, op, right } => {
            // Short-circuit before evaluating the right-hand side.
            match op {
                BinaryOp::And => {
                    return Ok((eval_int(left, resolver)? != 0
                        && eval_int(right, resolver)? != 0) as i64);
                }
                BinaryOp::Or => {
                    return Ok((eval_int(left, resolver)? != 0
                        || eval_int(right, resolver)? != 0) as i64);
                }
                _ => {}
            }
            let l = eval_int(left, resolver)?;
            let r = eval_int(right, resolver)?;
            match op {
                BinaryOp::Add => Ok(l.wrapping_add(r)),
                BinaryOp::Sub => Ok(l.wrapping_sub(r)),
                BinaryOp::Mul => Ok(l.wrapping_mul(r)),
                BinaryOp::Div => {
                    if r == 0 {
                        Err(Error::Runtime("division by zero in formula".into()))
                    } else {
                        Ok(l.wrapping_div(r))
                    }
                }
                BinaryOp::Rem => {
                    if r == 0 {
                        Err(Error::Runtime("modulo by zero in formula".into()))
                    } else {
                        Ok(l.wrapping_rem(r))
                    }
                }
                BinaryOp::Pow => {
                    if r < 0 {
                        Err(Error::Runtime(format!(
                            "negative exponent {r} in integer formula"
                        )))
                    } else {
                        Ok(l.wrapping_pow(r.min(u32::MAX as i64) as u32))
                    }
                }
                BinaryOp::Shl => Ok(l.wrapping_shl(r as u32)),
                BinaryOp::Shr => Ok(l.wrapping_shr(r as u32)),
                BinaryOp::BitAnd => Ok(l & r),
                BinaryOp::BitOr => Ok(l | r),
                BinaryOp::BitXor => Ok(l ^ r),
                BinaryOp::Eq => Ok((l == r) as i64),
                BinaryOp::Neq => Ok((l != r) as i64),
                BinaryOp::Lt => Ok((l < r) as i64),
                BinaryOp::Lte => Ok((l <= r) as i64),
                BinaryOp::Gt => Ok((l > r) as i64),
                BinaryOp::Gte => Ok((l >= r) as i64),
                BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
            }
        }

        Expr::Ternary { cond, then_expr, else_expr } => {
            if eval_int(cond, resolver)? != 0 {
                eval_int(then_expr, resolver)
            } else {
                eval_int(else_expr, resolver)
            }
        }

        Expr::Call { name, args } => call_int(name, args, resolver),
    }
}

fn call_int(name: &str, args: &[Expr], resolver: &mut dyn VarResolver) -> Result<i64> {
    let arity = |n: usize| -> Result<()> {
        if args.len() == n {
            Ok(())
        } else {
            Err(Error::Runtime(format!(
                "function {name} takes {n} argument(s), got {}",
                args.len()
            )))
        }
    };

    match name.to_ascii_uppercase().as_str() {
        "NEG" => {
            arity(1)?;
            Ok(eval_int(&args[0], resolver)?.wrapping_neg())
        }
        "ABS" => {
            arity(1)?;
            Ok(eval_int(&args[0], resolver)?.wrapping_abs())
        }
        "SGN" => {
            arity(1)?;
            Ok(eval_int(&args[0], resolver)?.signum())
        }
        "MIN" => {
            arity(2)?;
            Ok(eval_int(&args[0], resolver)?.min(eval_int(&args[1], resolver)?))
        }
        "MAX" => {
            arity(2)?;
            Ok(eval_int(&args[0], resolver)?.max(eval_int(&args[1], resolver)?))
        }
        "POW" => {
            arity(2)?;
            let base = eval_int(&args[0], resolver)?;
            let exp = eval_int(&args[1], resolver)?;
            if exp < 0 {
                Err(Error::Runtime(format!("negative exponent {exp} in integer formula")))
            } else {
                Ok(base.wrapping_pow(exp.min(u32::MAX as i64) as u32))
            }
        }
        "SQRT" | "EXP" | "LN" | "LG" | "SIN" | "COS" | "TAN" | "ASIN" | "ACOS" | "ATAN"
        | "ATAN2" | "TRUNC" | "FLOOR" | "CEIL" | "ROUND" => Err(Error::Runtime(format!(
            "function {name} is not available in integer formulas"
        ))),
        _ => Err(Error::Runtime(format!("unknown function '{name}' in formula"))),
    }
}

// ============================================================================
// Float domain
// ============================================================================

pub fn eval_float(expr: &Expr, resolver: &mut dyn VarResolver) -> Result<f64> {
    match expr {
        Expr::Int(v) => Ok(*v as f64),
        Expr::Float(v) => Ok(*v),

        Expr::Var(name) => match name.to_ascii_uppercase().as_str() {
            "PI" => Ok(std::f64::consts::PI),
            "E" => Ok(std::f64::consts::E),
            _ => {
                let value = resolver.lookup(name)?;
                match value.as_float() {
                    Some(v) => Ok(v),
                    None => Err(Error::Runtime(format!(
                        "variable '{name}' is not numeric: {value}"
                    ))),
                }
            }
        },

        Expr::Unary { op, expr } => {
            let v = eval_float(expr, resolver)?;
            match op {
                UnaryOp::Neg => Ok(-v),
                UnaryOp::Not => Ok((v == 0.0) as i64 as f64),
                UnaryOp::BitNot => Err(Error::Runtime(
                    "bitwise operator is not available in float formulas".into(),
                )),
            }
        }

        Expr::Binary { left, op, right } => {
            match op {
                BinaryOp::And => {
                    return Ok((eval_float(left, resolver)? != 0.0
                        && eval_float(right, resolver)? != 0.0) as i64 as f64);
                }
                BinaryOp::Or => {
                    return Ok((eval_float(left, resolver)? != 0.0
                        || eval_float(right, resolver)? != 0.0) as i64 as f64);
                }
                _ => {}
            }
            let l = eval_float(left, resolver)?;
            let r = eval_float(right, resolver)?;
            match op {
                BinaryOp::Add => Ok(l + r),
                BinaryOp::Sub => Ok(l - r),
                BinaryOp::Mul => Ok(l * r),
                BinaryOp::Div => Ok(l / r),
                BinaryOp::Rem => Ok(l % r),
                BinaryOp::Pow => Ok(l.powf(r)),
                BinaryOp::Eq => Ok((l == r) as i64 as f64),
                BinaryOp::Neq => Ok((l != r) as i64 as f64),
                BinaryOp::Lt => Ok((l < r) as i64 as f64),
                BinaryOp::Lte => Ok((l <= r) as i64 as f64),
                BinaryOp::Gt => Ok((l > r) as i64 as f64),
                BinaryOp::Gte => Ok((l >= r) as i64 as f64),
                BinaryOp::Shl | BinaryOp::Shr | BinaryOp::BitAnd | BinaryOp::BitOr
                | BinaryOp::BitXor => Err(Error::Runtime(
                    "bitwise operator is not available in float formulas".into(),
                )),
                BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
            }
        }

        Expr::Ternary { cond, then_expr, else_expr } => {
            if eval_float(cond, resolver)? != 0.0 {
                eval_float(then_expr, resolver)
            } else {
                eval_float(else_expr, resolver)
            }
        }

        Expr::Call { name, args } => call_float(name, args, resolver),
    }
}

fn call_float(name: &str, args: &[Expr], resolver: &mut dyn VarResolver) -> Result<f64> {
    let arity = |n: usize| -> Result<()> {
        if args.len() == n {
            Ok(())
        } else {
            Err(Error::Runtime(format!(
                "function {name} takes {n} argument(s), got {}",
                args.len()
            )))
        }
    };

    let unary = |f: fn(f64) -> f64, args: &[Expr], resolver: &mut dyn VarResolver| -> Result<f64> {
        Ok(f(eval_float(&args[0], resolver)?))
    };

    match name.to_ascii_uppercase().as_str() {
        "NEG" => { arity(1)?; unary(|v| -v, args, resolver) }
        "ABS" => { arity(1)?; unary(f64::abs, args, resolver) }
        "SGN" => { arity(1)?; unary(f64::signum, args, resolver) }
        "TRUNC" => { arity(1)?; unary(f64::trunc, args, resolver) }
        "FLOOR" => { arity(1)?; unary(f64::floor, args, resolver) }
        "CEIL" => { arity(1)?; unary(f64::ceil, args, resolver) }
        "ROUND" => { arity(1)?; unary(f64::round, args, resolver) }
        "SQRT" => { arity(1)?; unary(f64::sqrt, args, resolver) }
        "EXP" => { arity(1)?; unary(f64::exp, args, resolver) }
        "LN" => { arity(1)?; unary(f64::ln, args, resolver) }
        "LG" => { arity(1)?; unary(f64::log10, args, resolver) }
        "SIN" => { arity(1)?; unary(f64::sin, args, resolver) }
        "COS" => { arity(1)?; unary(f64::cos, args, resolver) }
        "TAN" => { arity(1)?; unary(f64::tan, args, resolver) }
        "ASIN" => { arity(1)?; unary(f64::asin, args, resolver) }
        "ACOS" => { arity(1)?; unary(f64::acos, args, resolver) }
        "ATAN" => { arity(1)?; unary(f64::atan, args, resolver) }
        "ATAN2" => {
            arity(2)?;
            Ok(eval_float(&args[0], resolver)?.atan2(eval_float(&args[1], resolver)?))
        }
        "POW" => {
            arity(2)?;
            Ok(eval_float(&args[0], resolver)?.powf(eval_float(&args[1], resolver)?))
        }
        "MIN" => {
            arity(2)?;
            Ok(eval_float(&args[0], resolver)?.min(eval_float(&args[1], resolver)?))
        }
        "MAX" => {
            arity(2)?;
            Ok(eval_float(&args[0], resolver)?.max(eval_float(&args[1], resolver)?))
        }
        _ => Err(Error::Runtime(format!("unknown function '{name}' in formula"))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Program;

    fn eval(src: &str) -> i64 {
        Program::parse(src).unwrap().eval_int(&mut EmptyResolver).unwrap()
    }

    fn evalf(src: &str) -> f64 {
        Program::parse(src).unwrap().eval_float(&mut EmptyResolver).unwrap()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1+2*3"), 7);
        assert_eq!(eval("(1+2)*3"), 9);
        assert_eq!(eval("10 % 3"), 1);
    }

    #[test]
    fn test_division_by_zero() {
        let p = Program::parse("1 / 0").unwrap();
        assert!(matches!(p.eval_int(&mut EmptyResolver), Err(Error::Runtime(_))));
        // Float domain follows IEEE-754.
        assert!(p.eval_float(&mut EmptyResolver).unwrap().is_infinite());
    }

    #[test]
    fn test_bitwise_and_shift() {
        assert_eq!(eval("0xF0 & 0x1F"), 0x10);
        assert_eq!(eval("1 << 4"), 16);
        assert_eq!(eval("256 >> 2"), 64);
        assert_eq!(eval("0xF ^ 0x3"), 0xC);
        assert_eq!(eval("~0"), -1);
    }

    #[test]
    fn test_comparison_yields_zero_or_one() {
        assert_eq!(eval("3 > 2"), 1);
        assert_eq!(eval("3 < 2"), 0);
        assert_eq!(eval("3 = 3"), 1);
        assert_eq!(eval("3 <> 3"), 0);
    }

    #[test]
    fn test_ternary() {
        assert_eq!(eval("1 ? 10 : 20"), 10);
        assert_eq!(eval("0 ? 10 : 20"), 20);
    }

    #[test]
    fn test_logical_short_circuit() {
        // Right side would divide by zero; && must not evaluate it.
        assert_eq!(eval("0 && 1 / 0"), 0);
        assert_eq!(eval("1 || 1 / 0"), 1);
    }

    #[test]
    fn test_wrapping_arithmetic() {
        let p = Program::parse("A + 1").unwrap();
        let mut vars = hashbrown::HashMap::new();
        vars.insert("A".to_string(), Value::Int(i64::MAX));
        assert_eq!(p.eval_int(&mut vars).unwrap(), i64::MIN);
    }

    #[test]
    fn test_variables_resolved_per_evaluation() {
        let p = Program::parse("GAIN * 2").unwrap();
        let mut vars = hashbrown::HashMap::new();
        vars.insert("GAIN".to_string(), Value::Int(10));
        assert_eq!(p.eval_int(&mut vars).unwrap(), 20);
        vars.insert("GAIN".to_string(), Value::Int(11));
        assert_eq!(p.eval_int(&mut vars).unwrap(), 22);
    }

    #[test]
    fn test_unknown_symbol() {
        let p = Program::parse("BOGUS + 1").unwrap();
        assert!(matches!(p.eval_int(&mut EmptyResolver), Err(Error::Runtime(_))));
    }

    #[test]
    fn test_float_functions() {
        assert!((evalf("SQRT(9.0)") - 3.0).abs() < 1e-12);
        assert!((evalf("LG(1000.0)") - 3.0).abs() < 1e-12);
        assert!((evalf("SIN(0.0)")).abs() < 1e-12);
        assert!((evalf("2 * PI") - std::f64::consts::TAU).abs() < 1e-12);
        assert!((evalf("ATAN2(1.0, 1.0)") - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
    }

    #[test]
    fn test_float_nan_propagates() {
        assert!(evalf("SQRT(0.0 - 1.0)").is_nan());
        assert!(evalf("0.0 / 0.0").is_nan());
    }

    #[test]
    fn test_int_rejects_transcendentals() {
        let p = Program::parse("SIN(1)").unwrap();
        assert!(matches!(p.eval_int(&mut EmptyResolver), Err(Error::Runtime(_))));
    }

    #[test]
    fn test_int_functions() {
        assert_eq!(eval("MAX(3, 5)"), 5);
        assert_eq!(eval("MIN(3, 5)"), 3);
        assert_eq!(eval("ABS(0 - 7)"), 7);
        assert_eq!(eval("SGN(0 - 3)"), -1);
        assert_eq!(eval("POW(2, 10)"), 1024);
    }

    #[test]
    fn test_wrong_arity() {
        let p = Program::parse("MAX(1)").unwrap();
        assert!(matches!(p.eval_int(&mut EmptyResolver), Err(Error::Runtime(_))));
    }

    #[test]
    fn test_hex_and_shift_compose() {
        assert_eq!(eval("(0xFF << 8) | 0xAB"), 0xFFAB);
    }
}
