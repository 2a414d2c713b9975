//! Boolean logic and comparisons. Every op here pushes a bool.

use std::cmp::Ordering;

use crate::error::Result;
use crate::registry::Registry;
use crate::value::{compare, truthy, values_equal, Value};

type PredicateFn = fn(&Value, &Value) -> Result<bool>;

pub(super) fn install(registry: &mut Registry) {
    let predicates: [(&str, PredicateFn); 9] = [
        ("and", |x, y| Ok(truthy(x) && truthy(y))),
        ("or", |x, y| Ok(truthy(x) || truthy(y))),
        // symmetric difference of truth values, never bitwise
        ("xor", |x, y| Ok(truthy(x) != truthy(y))),
        ("eq", |x, y| Ok(values_equal(x, y))),
        ("neq", |x, y| Ok(!values_equal(x, y))),
        ("gt", |x, y| Ok(compare(x, y)? == Ordering::Greater)),
        ("ge", |x, y| Ok(compare(x, y)? != Ordering::Less)),
        ("lt", |x, y| Ok(compare(x, y)? == Ordering::Less)),
        ("le", |x, y| Ok(compare(x, y)? != Ordering::Greater)),
    ];
    for (name, predicate) in predicates {
        registry.op(name, move |state, params| {
            state.no_params(&params)?;
            let (x, y) = state.pop_pair()?;
            predicate(&x, &y)
        });
    }

    registry.op("not", |state, params| {
        state.no_params(&params)?;
        Ok(!truthy(&state.pop()?))
    });
}

#[cfg(test)]
mod tests {
    use crate::ops::testutil::run;
    use serde_json::json;

    #[test]
    fn logic_truth_table() {
        let stack = run(
            vec![],
            json!([
                1, "", {"op": "and"},
                0, [1], {"op": "or"},
                2, 3, {"op": "xor"},
                2, 0, {"op": "xor"},
                null, {"op": "not"}
            ]),
        )
        .unwrap();
        assert_eq!(stack, vec![json!(false), json!(true), json!(false), json!(true), json!(true)]);
    }

    #[test]
    fn comparisons_read_x_against_tos() {
        let stack = run(
            vec![],
            json!([
                2, 3, {"op": "lt"},
                2, 3, {"op": "gt"},
                3, 3.0, {"op": "ge"},
                "b", "a", {"op": "le"},
                1, 1.0, {"op": "eq"},
                [1], [1, 2], {"op": "neq"},
                true, 1, {"op": "eq"},
                false, 1, {"op": "neq"}
            ]),
        )
        .unwrap();
        assert_eq!(
            stack,
            vec![
                json!(true), json!(false), json!(true), json!(false),
                json!(true), json!(true), json!(true), json!(true)
            ]
        );
    }

    #[test]
    fn ordering_mixed_types_is_an_error() {
        let err = run(vec![json!("a"), json!(1)], json!([{"op": "lt"}])).unwrap_err();
        assert!(err.message_contains("ordering not supported between 'string' and 'int'"));
    }
}
