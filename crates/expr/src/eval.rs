//! Stack-machine evaluation of decoded programs.
//!
//! Each instruction pops its operands, type-checks them against the
//! operator's tag and pushes one result. NULL propagates through
//! arithmetic and comparisons; division or modulo by zero yields NULL;
//! `AND`/`OR` follow three-valued logic; `IS_TRUE`/`IS_FALSE` coerce NULL
//! to false. A well-formed program leaves exactly one value on the stack.

use basalt_core::{Error, Result};

use crate::program::{Operator, OperatorVector};
use crate::types::{Operand, OperandType};

/// Evaluates one program against row tuples. Instances are independent;
/// a single instance is single-threaded.
#[derive(Debug)]
pub struct Evaluator {
    program: OperatorVector,
}

fn type_mismatch(expected: OperandType, got: OperandType) -> Error {
    Error::internal(format!(
        "operand type mismatch: operator expects {}, stack holds {}",
        expected, got
    ))
}

macro_rules! binary_numeric {
    ($t:expr, $lhs:expr, $rhs:expr, $int_body:expr, $float_body:expr) => {{
        match ($t, $lhs, $rhs) {
            (OperandType::Int32, Operand::Int32(a), Operand::Int32(b)) => {
                #[allow(clippy::redundant_closure_call)]
                Operand::Int32(match (a, b) {
                    (Some(a), Some(b)) => $int_body(a as i64, b as i64).map(|v: i64| v as i32),
                    _ => None,
                })
            }
            (OperandType::Int64, Operand::Int64(a), Operand::Int64(b)) => {
                #[allow(clippy::redundant_closure_call)]
                Operand::Int64(match (a, b) {
                    (Some(a), Some(b)) => $int_body(a, b),
                    _ => None,
                })
            }
            (OperandType::Float, Operand::Float(a), Operand::Float(b)) => {
                #[allow(clippy::redundant_closure_call)]
                Operand::Float(match (a, b) {
                    (Some(a), Some(b)) => $float_body(a as f64, b as f64).map(|v: f64| v as f32),
                    _ => None,
                })
            }
            (OperandType::Double, Operand::Double(a), Operand::Double(b)) => {
                #[allow(clippy::redundant_closure_call)]
                Operand::Double(match (a, b) {
                    (Some(a), Some(b)) => $float_body(a, b),
                    _ => None,
                })
            }
            (t, a, _) => return Err(type_mismatch(t, a.type_of())),
        }
    }};
}

impl Evaluator {
    pub fn new(program: OperatorVector) -> Self {
        Evaluator { program }
    }

    /// Decode and wrap in one step.
    pub fn from_bytes(code: &[u8]) -> Result<Self> {
        Ok(Evaluator::new(OperatorVector::decode(code)?))
    }

    /// Run the program against one tuple and return the single result.
    pub fn eval(&self, tuple: &[Operand]) -> Result<Operand> {
        let mut stack: Vec<Operand> = Vec::with_capacity(8);

        for op in self.program.ops() {
            match op {
                Operator::Null(t) => stack.push(Operand::null_of(*t)),
                Operator::Const(v) => stack.push(v.clone()),
                Operator::Var(t, index) => {
                    let value = tuple.get(*index as usize).ok_or_else(|| {
                        Error::illegal_parameters(format!(
                            "variable index {} out of range for tuple of {}",
                            index,
                            tuple.len()
                        ))
                    })?;
                    if value.type_of() != *t {
                        return Err(type_mismatch(*t, value.type_of()));
                    }
                    stack.push(value.clone());
                }
                Operator::Pos(t) => {
                    if !t.is_numeric() {
                        return Err(Error::internal(format!("POS is not defined for {}", t)));
                    }
                    let v = Self::pop_typed(&mut stack, *t)?;
                    stack.push(v);
                }
                Operator::Neg(t) => {
                    let v = Self::pop_typed(&mut stack, *t)?;
                    stack.push(Self::negate(*t, v)?)
                }
                Operator::Add(t) => {
                    let rhs = Self::pop_typed(&mut stack, *t)?;
                    let lhs = Self::pop_typed(&mut stack, *t)?;
                    stack.push(Self::add(*t, lhs, rhs)?);
                }
                Operator::Sub(t) => {
                    let rhs = Self::pop_typed(&mut stack, *t)?;
                    let lhs = Self::pop_typed(&mut stack, *t)?;
                    let r = binary_numeric!(
                        *t,
                        lhs,
                        rhs,
                        |a: i64, b: i64| Some(a.wrapping_sub(b)),
                        |a: f64, b: f64| Some(a - b)
                    );
                    stack.push(r);
                }
                Operator::Mul(t) => {
                    let rhs = Self::pop_typed(&mut stack, *t)?;
                    let lhs = Self::pop_typed(&mut stack, *t)?;
                    let r = binary_numeric!(
                        *t,
                        lhs,
                        rhs,
                        |a: i64, b: i64| Some(a.wrapping_mul(b)),
                        |a: f64, b: f64| Some(a * b)
                    );
                    stack.push(r);
                }
                Operator::Div(t) => {
                    let rhs = Self::pop_typed(&mut stack, *t)?;
                    let lhs = Self::pop_typed(&mut stack, *t)?;
                    let r = binary_numeric!(
                        *t,
                        lhs,
                        rhs,
                        |a: i64, b: i64| if b == 0 { None } else { Some(a.wrapping_div(b)) },
                        |a: f64, b: f64| if b == 0.0 { None } else { Some(a / b) }
                    );
                    stack.push(r);
                }
                Operator::Mod(t) => {
                    let rhs = Self::pop_typed(&mut stack, *t)?;
                    let lhs = Self::pop_typed(&mut stack, *t)?;
                    let r = binary_numeric!(
                        *t,
                        lhs,
                        rhs,
                        |a: i64, b: i64| if b == 0 { None } else { Some(a.wrapping_rem(b)) },
                        |a: f64, b: f64| if b == 0.0 { None } else { Some(a % b) }
                    );
                    stack.push(r);
                }
                Operator::Eq(t) => Self::compare(&mut stack, *t, |o| o == std::cmp::Ordering::Equal)?,
                Operator::Ne(t) => Self::compare(&mut stack, *t, |o| o != std::cmp::Ordering::Equal)?,
                Operator::Ge(t) => Self::compare(&mut stack, *t, |o| o != std::cmp::Ordering::Less)?,
                Operator::Gt(t) => {
                    Self::compare(&mut stack, *t, |o| o == std::cmp::Ordering::Greater)?
                }
                Operator::Le(t) => {
                    Self::compare(&mut stack, *t, |o| o != std::cmp::Ordering::Greater)?
                }
                Operator::Lt(t) => Self::compare(&mut stack, *t, |o| o == std::cmp::Ordering::Less)?,
                Operator::IsNull(t) => {
                    let v = Self::pop_typed(&mut stack, *t)?;
                    stack.push(Operand::Bool(Some(v.is_null())));
                }
                Operator::IsTrue(t) => {
                    let v = Self::pop_typed(&mut stack, *t)?;
                    stack.push(Operand::Bool(Some(Self::truthy(*t, &v)?)));
                }
                Operator::IsFalse(t) => {
                    let v = Self::pop_typed(&mut stack, *t)?;
                    let is_false = !v.is_null() && !Self::truthy(*t, &v)?;
                    stack.push(Operand::Bool(Some(is_false)));
                }
                Operator::Not => {
                    let v = Self::pop_bool(&mut stack)?;
                    stack.push(Operand::Bool(v.map(|b| !b)));
                }
                Operator::And => {
                    let rhs = Self::pop_bool(&mut stack)?;
                    let lhs = Self::pop_bool(&mut stack)?;
                    let r = match (lhs, rhs) {
                        (Some(false), _) | (_, Some(false)) => Some(false),
                        (Some(true), Some(true)) => Some(true),
                        _ => None,
                    };
                    stack.push(Operand::Bool(r));
                }
                Operator::Or => {
                    let rhs = Self::pop_bool(&mut stack)?;
                    let lhs = Self::pop_bool(&mut stack)?;
                    let r = match (lhs, rhs) {
                        (Some(true), _) | (_, Some(true)) => Some(true),
                        (Some(false), Some(false)) => Some(false),
                        _ => None,
                    };
                    stack.push(Operand::Bool(r));
                }
                Operator::Cast { src, dst } => {
                    let v = Self::pop_typed(&mut stack, *src)?;
                    stack.push(Self::cast(v, *dst));
                }
            }
        }

        if stack.len() != 1 {
            return Err(Error::illegal_parameters(format!(
                "program leaves {} values on the stack",
                stack.len()
            )));
        }
        Ok(stack.pop().unwrap())
    }

    /// Evaluate as a filter: non-null `true` passes.
    pub fn eval_filter(&self, tuple: &[Operand]) -> Result<bool> {
        Ok(self.eval(tuple)?.is_true())
    }

    fn pop(stack: &mut Vec<Operand>) -> Result<Operand> {
        stack
            .pop()
            .ok_or_else(|| Error::illegal_parameters("stack underflow"))
    }

    fn pop_typed(stack: &mut Vec<Operand>, t: OperandType) -> Result<Operand> {
        let v = Self::pop(stack)?;
        if v.type_of() != t {
            return Err(type_mismatch(t, v.type_of()));
        }
        Ok(v)
    }

    fn pop_bool(stack: &mut Vec<Operand>) -> Result<Option<bool>> {
        match Self::pop_typed(stack, OperandType::Bool)? {
            Operand::Bool(v) => Ok(v),
            _ => unreachable!("pop_typed checked the tag"),
        }
    }

    fn negate(t: OperandType, v: Operand) -> Result<Operand> {
        Ok(match (t, v) {
            (OperandType::Int32, Operand::Int32(v)) => Operand::Int32(v.map(|x| x.wrapping_neg())),
            (OperandType::Int64, Operand::Int64(v)) => Operand::Int64(v.map(|x| x.wrapping_neg())),
            (OperandType::Float, Operand::Float(v)) => Operand::Float(v.map(|x| -x)),
            (OperandType::Double, Operand::Double(v)) => Operand::Double(v.map(|x| -x)),
            (t, v) => return Err(type_mismatch(t, v.type_of())),
        })
    }

    fn add(t: OperandType, lhs: Operand, rhs: Operand) -> Result<Operand> {
        // ADD is additionally defined for STRING as concatenation.
        if t == OperandType::String {
            return match (lhs, rhs) {
                (Operand::String(a), Operand::String(b)) => Ok(Operand::String(match (a, b) {
                    (Some(a), Some(b)) => Some(a + &b),
                    _ => None,
                })),
                (a, _) => Err(type_mismatch(t, a.type_of())),
            };
        }
        let r = binary_numeric!(
            t,
            lhs,
            rhs,
            |a: i64, b: i64| Some(a.wrapping_add(b)),
            |a: f64, b: f64| Some(a + b)
        );
        Ok(r)
    }

    /// Pop two operands of type `t`, compare with numeric widening
    /// (INT32 → INT64 → DOUBLE) and push a nullable bool.
    fn compare(
        stack: &mut Vec<Operand>,
        t: OperandType,
        decide: impl Fn(std::cmp::Ordering) -> bool,
    ) -> Result<()> {
        use std::cmp::Ordering;

        let rhs = Self::pop_typed(stack, t)?;
        let lhs = Self::pop_typed(stack, t)?;
        if lhs.is_null() || rhs.is_null() {
            stack.push(Operand::Bool(None));
            return Ok(());
        }

        let ordering: Ordering = match (lhs, rhs) {
            (Operand::Bool(Some(a)), Operand::Bool(Some(b))) => a.cmp(&b),
            (Operand::Int32(Some(a)), Operand::Int32(Some(b))) => i64::from(a).cmp(&i64::from(b)),
            (Operand::Int64(Some(a)), Operand::Int64(Some(b))) => a.cmp(&b),
            (Operand::Float(Some(a)), Operand::Float(Some(b))) => f64::from(a)
                .partial_cmp(&f64::from(b))
                .unwrap_or(Ordering::Equal),
            (Operand::Double(Some(a)), Operand::Double(Some(b))) => {
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            (Operand::String(Some(a)), Operand::String(Some(b))) => a.cmp(&b),
            (Operand::Decimal(Some(a)), Operand::Decimal(Some(b))) => {
                // Exact textual equality only; decimal ordering is not
                // defined by the wire contract.
                if a == b {
                    Ordering::Equal
                } else if decide(Ordering::Less) != decide(Ordering::Greater) {
                    return Err(Error::internal(
                        "DECIMAL supports only equality comparison",
                    ));
                } else {
                    Ordering::Less
                }
            }
            (a, _) => return Err(type_mismatch(t, a.type_of())),
        };
        stack.push(Operand::Bool(Some(decide(ordering))));
        Ok(())
    }

    fn truthy(t: OperandType, v: &Operand) -> Result<bool> {
        Ok(match v {
            Operand::Bool(b) => b.unwrap_or(false),
            Operand::Int32(x) => x.map(|x| x != 0).unwrap_or(false),
            Operand::Int64(x) => x.map(|x| x != 0).unwrap_or(false),
            Operand::Float(x) => x.map(|x| x != 0.0).unwrap_or(false),
            Operand::Double(x) => x.map(|x| x != 0.0).unwrap_or(false),
            _ => return Err(type_mismatch(t, v.type_of())),
        })
    }

    /// Numeric and bool cross-casts; decode already rejected anything else.
    fn cast(v: Operand, dst: OperandType) -> Operand {
        if v.type_of() == dst {
            return v;
        }
        if v.is_null() {
            return Operand::null_of(dst);
        }
        let as_f64 = match &v {
            Operand::Bool(Some(b)) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Operand::Int32(Some(x)) => f64::from(*x),
            Operand::Int64(Some(x)) => *x as f64,
            Operand::Float(Some(x)) => f64::from(*x),
            Operand::Double(Some(x)) => *x,
            _ => unreachable!("decode allows only numeric/bool cross-casts"),
        };
        // Integer-to-integer goes through i64 to keep exact values; only
        // float sources truncate.
        let as_i64 = match &v {
            Operand::Bool(Some(b)) => i64::from(*b),
            Operand::Int32(Some(x)) => i64::from(*x),
            Operand::Int64(Some(x)) => *x,
            Operand::Float(Some(x)) => *x as i64,
            Operand::Double(Some(x)) => *x as i64,
            _ => unreachable!(),
        };
        match dst {
            OperandType::Bool => Operand::Bool(Some(as_i64 != 0)),
            OperandType::Int32 => Operand::Int32(Some(as_i64 as i32)),
            OperandType::Int64 => Operand::Int64(Some(as_i64)),
            OperandType::Float => Operand::Float(Some(as_f64 as f32)),
            OperandType::Double => Operand::Double(Some(as_f64)),
            OperandType::Decimal | OperandType::String => unreachable!(),
        }
    }
}
