//! End-to-end scenarios: whole procedure documents executed on a fresh VM.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{json, Value};
use zvm_core::VM;

/// Helper: exec a document on a quiet VM, return the final stack.
fn exec(document: Value) -> Vec<Value> {
    let mut vm = VM::new().with_console(false);
    vm.exec(&document).expect("procedure should run");
    vm.into_stack()
}

// ─── Arithmetic ───

#[test]
fn s1_addition() {
    assert_eq!(exec(json!({"run": [3, 4, {"op": "+"}]})), vec![json!(7)]);
}

// ─── Loops ───

#[test]
fn s2_while_loop_fills_stack() {
    let stack = exec(json!({"run": [
        {"op": "begin"},
        {"op": "size"}, 5, {"op": "lt"}, {"op": "while"},
        1,
        {"op": "repeat"}
    ]}));
    assert_eq!(stack, vec![json!(1); 5]);
}

// ─── Branching ───

#[test]
fn s3_if_else_both_ways() {
    let branch = |cond: i64| {
        exec(json!({"run": [cond, {"op": "if"}, "yes", {"op": "else"}, "no", {"op": "endif"}]}))
    };
    assert_eq!(branch(1), vec![json!("yes")]);
    assert_eq!(branch(0), vec![json!("no")]);
}

// ─── Stack shaping ───

#[test]
fn s4_reverse_pack_then_unpack() {
    let stack = exec(json!({"run": [
        10, 20, 30,
        {"op": "pack", "n": 3, "forward": false},
        {"op": "unpack"}
    ]}));
    assert_eq!(stack, vec![json!(30), json!(20), json!(10)]);
}

// ─── Formatting ───

#[test]
fn s5_fstring_named_fields() {
    let stack = exec(json!({"run": [{"op": "fstring", "fmt": "a={a},b={b}", "a": 1, "b": 2}]}));
    assert_eq!(stack, vec![json!("a=1,b=2")]);
}

// ─── Composition ───

#[test]
fn s6_inline_include_squares() {
    let mut vm = VM::new().with_console(false);
    vm.exec(&json!({
        "include": {"sq": {"run": [
            {"op": "dup"}, {"op": "*"},
            "scratch", {"op": "put", "uri": "locals:tmp"}
        ]}},
        "run": [5, {"op": "sq"}]
    }))
    .unwrap();
    assert_eq!(vm.stack(), &[json!(25)]);
    assert!(vm.locals().get("tmp").is_none());
}

#[test]
fn includes_can_nest_and_reference_each_other() {
    let stack = exec(json!({
        "include": {
            "sq": {"run": [{"op": "dup"}, {"op": "*"}]},
            "quad": {
                "include": {"twice": {"run": [{"op": "dup"}, {"op": "+"}]}},
                "run": [{"op": "sq"}, {"op": "twice"}]
            }
        },
        "run": [3, {"op": "quad"}]
    }));
    assert_eq!(stack, vec![json!(18)]);
}

#[test]
fn composite_op_params_become_child_locals() {
    let stack = exec(json!({
        "include": {"greet": {
            "set": {"greeting": "hello"},
            "run": [
                {"op": "get", "uri": "locals:greeting"},
                {"op": "get", "uri": "locals:name"},
                {"op": "fstring", "fmt": "{}, {}"}
            ]
        }},
        "run": [{"op": "greet", "name": "zvm"}, {"op": "greet", "greeting": "bye", "name": "all"}]
    }));
    assert_eq!(stack, vec![json!("hello, zvm"), json!("bye, all")]);
}

/// Helper: exec a document with the console on, return the op names it traced.
fn traced_ops(document: Value) -> Vec<String> {
    let lines = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&lines);
    let mut vm = VM::new();
    vm.set_console_writer(move |line| sink.borrow_mut().push(line.to_string()));
    vm.exec(&document).expect("procedure should run");
    let lines = lines.borrow();
    lines
        .iter()
        .map(|line| line.split_whitespace().nth(2).unwrap_or_default().to_string())
        .collect()
}

#[test]
fn logging_false_in_an_include_silences_only_that_frame() {
    let ops = traced_ops(json!({
        "include": {
            "quiet": {"set": {"logging": false}, "run": [{"op": "dup"}]},
            "loud": {"run": [{"op": "drop"}]}
        },
        "run": [1, {"op": "quiet"}, {"op": "loud"}]
    }));
    assert_eq!(ops, vec!["put", "quiet", "loud", "drop"]);
}

#[test]
fn logging_false_is_inherited_by_child_frames() {
    let ops = traced_ops(json!({
        "set": {"logging": false},
        "include": {
            "inner": {"run": [{"op": "dup"}]},
            "loud": {"set": {"logging": true}, "run": [{"op": "drop"}]}
        },
        "run": [1, {"op": "inner"}, {"op": "loud"}]
    }));
    assert_eq!(ops, vec!["drop"]);
}

// ─── Failures ───

#[test]
fn errors_unwind_with_a_stack_trace() {
    let mut vm = VM::new().with_console(false);
    let err = vm
        .exec(&json!({
            "include": {"bad": {"run": [1, {"op": "missing"}]}},
            "run": [0, {"op": "bad"}]
        }))
        .unwrap_err();
    assert!(err.message_contains("unknown op: missing"));
    let frames: Vec<_> = err.frames().iter().map(|f| (f.frame_name.as_str(), f.pc)).collect();
    assert_eq!(frames, vec![("bad", 1), ("root", 1)]);
    // the stack keeps whatever was pushed before the failure
    assert_eq!(vm.stack(), &[json!(0), json!(1)]);
}

#[test]
fn malformed_documents_are_input_errors() {
    let mut vm = VM::new().with_console(false);
    for bad in [
        json!("not a document"),
        json!({"run": 1}),
        json!({"include": {"x": 1}}),
        json!({"include": {"x": {"run": "nope"}}}),
    ] {
        let err = vm.exec(&bad).unwrap_err();
        assert!(err.message_contains("invalid procedure"), "{bad}: {err}");
    }
}

#[test]
fn assertion_message_reaches_the_caller() {
    let mut vm = VM::new().with_console(false);
    let err = vm
        .exec(&json!({"run": [0, {"op": "assert", "error": "must be positive"}]}))
        .unwrap_err();
    assert_eq!(err.root().to_string(), "assertion failed: must be positive");
}
