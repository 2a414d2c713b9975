//! `+ - * / %` and the numeric coercions.

use crate::error::{Result, VmError};
use crate::registry::Registry;
use crate::value::{float_value, truthy, type_name, Num, Value};

type BinaryFn = fn(&Value, &Value) -> Result<Value>;

pub(super) fn install(registry: &mut Registry) {
    let binaries: [(&str, BinaryFn); 5] = [
        ("+", add),
        ("-", sub),
        ("*", mul),
        ("/", div),
        ("%", rem),
    ];
    for (name, f) in binaries {
        registry.op(name, move |state, params| {
            state.no_params(&params)?;
            let (x, y) = state.pop_pair()?;
            f(&x, &y)
        });
    }

    registry.op("asbool", |state, params| {
        state.no_params(&params)?;
        Ok(truthy(&state.pop()?))
    });
    registry.op("asint", |state, params| {
        state.no_params(&params)?;
        as_int(&state.pop()?)
    });
    registry.op("asfloat", |state, params| {
        state.no_params(&params)?;
        as_float(&state.pop()?)
    });
}

fn unsupported(symbol: &str, x: &Value, y: &Value) -> VmError {
    VmError::TypeError(format!(
        "unsupported operand type(s) for {symbol}: '{}' and '{}'",
        type_name(x),
        type_name(y)
    ))
}

fn numbers(symbol: &str, x: &Value, y: &Value) -> Result<(Num, Num)> {
    match (Num::of(x), Num::of(y)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(unsupported(symbol, x, y)),
    }
}

fn arithmetic(
    symbol: &str,
    x: &Value,
    y: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value> {
    match numbers(symbol, x, y)? {
        (Num::Int(a), Num::Int(b)) => int_op(a, b)
            .map(Value::from)
            .ok_or(VmError::ArithmeticOverflow),
        (a, b) => float_value(float_op(a.as_f64(), b.as_f64())),
    }
}

fn add(x: &Value, y: &Value) -> Result<Value> {
    match (x, y) {
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::Array(a), Value::Array(b)) => {
            Ok(Value::Array(a.iter().chain(b).cloned().collect()))
        }
        _ => arithmetic("+", x, y, i64::checked_add, |a, b| a + b),
    }
}

fn sub(x: &Value, y: &Value) -> Result<Value> {
    arithmetic("-", x, y, i64::checked_sub, |a, b| a - b)
}

fn mul(x: &Value, y: &Value) -> Result<Value> {
    match (x, y) {
        (Value::String(_) | Value::Array(_), n) | (n, Value::String(_) | Value::Array(_)) => {
            let sequence = if matches!(x, Value::String(_) | Value::Array(_)) { x } else { y };
            match Num::of(n) {
                Some(Num::Int(count)) => repeat(sequence, count),
                _ => Err(unsupported("*", x, y)),
            }
        }
        _ => arithmetic("*", x, y, i64::checked_mul, |a, b| a * b),
    }
}

/// Largest string length or array size `*` will build.
const MAX_REPEAT_LEN: usize = 1 << 28;

/// Repeat a string or array; non-positive counts give an empty result.
fn repeat(sequence: &Value, count: i64) -> Result<Value> {
    let count = usize::try_from(count.max(0)).map_err(|_| VmError::ArithmeticOverflow)?;
    let total = |len: usize| {
        len.checked_mul(count)
            .filter(|&total| total <= MAX_REPEAT_LEN)
            .ok_or(VmError::ArithmeticOverflow)
    };
    match sequence {
        Value::String(s) => {
            total(s.len())?;
            Ok(Value::String(s.repeat(count)))
        }
        Value::Array(items) => {
            let mut out = Vec::new();
            out.try_reserve_exact(total(items.len())?)
                .map_err(|_| VmError::ArithmeticOverflow)?;
            if !items.is_empty() {
                for _ in 0..count {
                    out.extend(items.iter().cloned());
                }
            }
            Ok(Value::Array(out))
        }
        other => Err(VmError::TypeError(format!(
            "cannot repeat a value of type '{}'",
            type_name(other)
        ))),
    }
}

fn div(x: &Value, y: &Value) -> Result<Value> {
    let (a, b) = numbers("/", x, y)?;
    if b.as_f64() == 0.0 {
        return Err(VmError::DivisionByZero);
    }
    float_value(a.as_f64() / b.as_f64())
}

/// Floored modulo: the result takes the sign of the divisor.
fn rem(x: &Value, y: &Value) -> Result<Value> {
    match numbers("%", x, y)? {
        (_, Num::Int(0)) => Err(VmError::DivisionByZero),
        (Num::Int(a), Num::Int(b)) => {
            // i64::MIN % -1 is the only other case checked_rem rejects
            let r = a.checked_rem(b).unwrap_or(0);
            Ok(Value::from(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }))
        }
        (a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            if b == 0.0 {
                return Err(VmError::DivisionByZero);
            }
            let r = a % b;
            float_value(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r })
        }
    }
}

fn as_int(value: &Value) -> Result<Value> {
    let cannot = || VmError::TypeError(format!("cannot convert {} to int", type_name(value)));
    match value {
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| VmError::TypeError(format!("invalid literal for int: '{s}'"))),
        other => match Num::of(other).ok_or_else(cannot)? {
            Num::Int(i) => Ok(Value::from(i)),
            Num::Float(f) if !f.is_finite() => Err(cannot()),
            Num::Float(f) => {
                let truncated = f.trunc();
                if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
                    return Err(VmError::ArithmeticOverflow);
                }
                Ok(Value::from(truncated as i64))
            }
        },
    }
}

fn as_float(value: &Value) -> Result<Value> {
    match value {
        Value::String(s) => {
            let f = s
                .trim()
                .parse::<f64>()
                .map_err(|_| VmError::TypeError(format!("could not convert string to float: '{s}'")))?;
            float_value(f)
        }
        other => match Num::of(other) {
            Some(n) => float_value(n.as_f64()),
            None => Err(VmError::TypeError(format!(
                "cannot convert {} to float",
                type_name(other)
            ))),
        },
    }
}
