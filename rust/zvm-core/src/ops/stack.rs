//! Stack manipulation: dup, swap, drop, size, pack, unpack, set_next_params.

use serde::Deserialize;

use crate::error::{Result, VmError};
use crate::registry::{Output, Registry};
use crate::value::{type_name, Value, ValueKind};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DupParams {
    #[serde(default)]
    deep: bool,
    #[serde(default)]
    offset: usize,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SwapParams {
    #[serde(default = "default_order")]
    order: Vec<usize>,
}

fn default_order() -> Vec<usize> {
    vec![1, 0]
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PackParams {
    n: usize,
    #[serde(default = "default_forward")]
    forward: bool,
    keys: Option<Vec<String>>,
}

fn default_forward() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UnpackParams {
    keys: Option<Vec<String>>,
}

pub(super) fn install(registry: &mut Registry) {
    registry.op("dup", |state, params| {
        let DupParams { deep, offset } = state.decode(params)?;
        let item = state.peek(offset)?;
        Ok(match state.registry().lookup_copier(ValueKind::of(item)) {
            Some(copier) => copier(item, deep),
            None => item.clone(),
        })
    });

    registry.op("swap", |state, params| {
        let SwapParams { order } = state.decode(params)?;
        let size = order.len();
        if let Some(bad) = order.iter().find(|&&offset| offset >= size) {
            return Err(VmError::params(
                state.op_name(),
                format!("offset {bad} is outside the {size} swapped item(s)"),
            ));
        }
        let items = state.popn(size)?;
        Ok(Output::Extend(
            order.iter().rev().map(|&i| items[size - 1 - i].clone()).collect(),
        ))
    });

    registry.op("drop", |state, params| {
        state.no_params(&params)?;
        state.pop().map(drop)
    });

    registry.op("size", |state, params| {
        state.no_params(&params)?;
        Ok(Value::from(state.len()))
    });

    registry.op("pack", |state, params| {
        let PackParams { n, forward, keys } = state.decode(params)?;
        if let Some(keys) = &keys {
            if keys.len() != n {
                return Err(VmError::params(
                    state.op_name(),
                    format!("{} key(s) given for {n} packed item(s)", keys.len()),
                ));
            }
        }
        let mut items = state.popn(n)?;
        if !forward {
            items.reverse();
        }
        Ok(match keys {
            // the first key names the last item, which is the old top of stack
            Some(keys) => Value::Object(keys.into_iter().zip(items.into_iter().rev()).collect()),
            None => Value::Array(items),
        })
    });

    registry.op("unpack", |state, params| {
        let UnpackParams { keys } = state.decode(params)?;
        let composite = state.pop()?;
        match (keys, composite) {
            (None, Value::Array(items)) => Ok(Output::Extend(items)),
            (None, Value::Object(map)) => {
                Ok(Output::Extend(map.into_iter().map(|(key, _)| Value::String(key)).collect()))
            }
            (Some(keys), Value::Object(mut map)) => {
                let mut items = Vec::with_capacity(keys.len());
                for key in keys.iter().rev() {
                    let value = map.remove(key).ok_or_else(|| {
                        VmError::params(state.op_name(), format!("key '{key}' is not in the unpacked value"))
                    })?;
                    items.push(value);
                }
                Ok(Output::Extend(items))
            }
            (None, other) => Err(VmError::TypeError(format!(
                "cannot unpack a value of type '{}' without keys",
                type_name(&other)
            ))),
            (Some(_), other) => Err(VmError::TypeError(format!(
                "unpacking with keys expects an object, got '{}'",
                type_name(&other)
            ))),
        }
    });

    registry.op("set_next_params", |state, params| {
        state.no_params(&params)?;
        match state.pop()? {
            Value::Object(next) => {
                state.frame_mut().next_params = next;
                Ok(())
            }
            other => Err(VmError::TypeError(format!(
                "set_next_params expects an object on top of the stack, got '{}'",
                type_name(&other)
            ))),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::testutil::run;
    use crate::vm::VM;
    use serde_json::json;

    #[test]
    fn dup_with_offset() {
        let stack = run(vec![json!("a"), json!("b")], json!([{"op": "dup", "offset": 1}])).unwrap();
        assert_eq!(stack, vec![json!("a"), json!("b"), json!("a")]);
        assert!(run(vec![], json!([{"op": "dup"}])).unwrap_err().message_contains("cannot pop 1"));
    }

    #[test]
    fn dup_prefers_registered_copier() {
        let mut registry = Registry::with_builtins();
        registry.copier(&[ValueKind::Object], |value, deep| {
            json!({"copy_of": value.clone(), "deep": deep})
        });
        let mut vm = VM::with_registry(registry)
            .with_stack(vec![json!({"k": 1})])
            .with_console(false);
        vm.exec(&json!({"run": [{"op": "dup", "deep": true}]})).unwrap();
        assert_eq!(vm.stack()[1], json!({"copy_of": {"k": 1}, "deep": true}));
    }

    #[test]
    fn swap_orders() {
        let abc = || vec![json!("a"), json!("b"), json!("c")];
        assert_eq!(
            run(abc(), json!([{"op": "swap"}])).unwrap(),
            vec![json!("a"), json!("c"), json!("b")]
        );
        // the item at offset 2 becomes the new top of stack
        assert_eq!(
            run(abc(), json!([{"op": "swap", "order": [2, 0, 1]}])).unwrap(),
            vec![json!("b"), json!("c"), json!("a")]
        );
        assert!(run(abc(), json!([{"op": "swap", "order": [0, 2]}])).is_err());
    }

    #[test]
    fn drop_and_size() {
        let stack = run(vec![json!(1), json!(2)], json!([{"op": "drop"}, {"op": "size"}])).unwrap();
        assert_eq!(stack, vec![json!(1), json!(1)]);
    }

    #[test]
    fn pack_forward_and_reversed() {
        let items = || vec![json!(10), json!(20), json!(30)];
        assert_eq!(
            run(items(), json!([{"op": "pack", "n": 3}])).unwrap(),
            vec![json!([10, 20, 30])]
        );
        assert_eq!(
            run(items(), json!([{"op": "pack", "n": 2, "forward": false}])).unwrap(),
            vec![json!(10), json!([30, 20])]
        );
        assert!(run(items(), json!([{"op": "pack"}])).unwrap_err().message_contains("missing field `n`"));
    }

    #[test]
    fn pack_with_keys_maps_first_key_to_tos() {
        let stack = run(
            vec![json!(1), json!(2)],
            json!([{"op": "pack", "n": 2, "keys": ["top", "under"]}]),
        )
        .unwrap();
        assert_eq!(stack, vec![json!({"top": 2, "under": 1})]);
    }

    #[test]
    fn unpack_with_keys_leaves_first_key_on_top() {
        let stack = run(
            vec![json!({"x": 1, "y": 2, "z": 3})],
            json!([{"op": "unpack", "keys": ["y", "x"]}]),
        )
        .unwrap();
        assert_eq!(stack, vec![json!(1), json!(2)]);
        assert!(run(vec![json!({"x": 1})], json!([{"op": "unpack", "keys": ["q"]}])).is_err());
    }

    #[test]
    fn unpack_without_keys_pushes_object_keys() {
        let stack = run(vec![json!({"b": 1, "a": 2})], json!([{"op": "unpack"}])).unwrap();
        assert_eq!(stack, vec![json!("b"), json!("a")]);
        assert!(run(vec![json!({})], json!([{"op": "unpack"}])).unwrap().is_empty());
        let err = run(vec![json!("ab")], json!([{"op": "unpack"}])).unwrap_err();
        assert!(err.message_contains("cannot unpack a value of type 'string'"), "{err}");
    }

    #[test]
    fn keyed_pack_round_trips() {
        let stack = run(
            vec![json!("a"), json!("b")],
            json!([
                {"op": "pack", "n": 2, "keys": ["first", "second"]},
                {"op": "unpack", "keys": ["first", "second"]}
            ]),
        )
        .unwrap();
        assert_eq!(stack, vec![json!("a"), json!("b")]);
    }

    #[test]
    fn set_next_params_requires_object() {
        let err = run(vec![json!([1])], json!([{"op": "set_next_params"}])).unwrap_err();
        assert!(err.message_contains("expects an object"));
    }
}
