//! Including a procedure from a `file:` URI behaves exactly like inlining it.

use std::path::PathBuf;

use serde_json::{json, Value};
use zvm_core::{Registry, VM};

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("zvm_include_test_{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn exec(document: &Value) -> Vec<Value> {
    let mut registry = Registry::with_builtins();
    zvm_provider_fs::register(&mut registry);
    let mut vm = VM::with_registry(registry).with_console(false);
    vm.exec(document).expect("procedure should run");
    vm.into_stack()
}

fn cube() -> Value {
    json!({
        "set": {"power": 3},
        "run": [
            {"op": "dup"}, {"op": "dup"}, {"op": "*"}, {"op": "*"},
            {"op": "get", "uri": "locals:power"},
            {"op": "drop"}
        ]
    })
}

#[test]
fn p8_file_include_matches_inline_include() {
    let dir = temp_dir();
    let path = dir.join("cube.json");
    std::fs::write(&path, serde_json::to_string(&cube()).unwrap()).unwrap();
    let uri = zvm_provider_fs::uri_for(&path);

    let run = json!([2, {"op": "cube"}, 3, {"op": "cube"}, {"op": "+"}]);
    let inline = exec(&json!({"include": {"cube": cube()}, "run": run}));
    let from_file = exec(&json!({"include": {"cube": uri}, "run": run}));

    assert_eq!(inline, vec![json!(35)]);
    assert_eq!(from_file, inline);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn included_files_resolve_their_own_includes() {
    let dir = temp_dir();
    let inner = dir.join("inc.hjson");
    std::fs::write(&inner, "{\n  run: [\n    1\n    { op: \"+\" }\n  ]\n}\n").unwrap();
    let outer = dir.join("twice.json5");
    std::fs::write(
        &outer,
        format!(
            "{{include: {{inc: '{}'}}, run: [{{op: 'inc'}}, {{op: 'inc'}}]}}",
            zvm_provider_fs::uri_for(&inner)
        ),
    )
    .unwrap();

    let stack = exec(&json!({
        "include": {"twice": zvm_provider_fs::uri_for(&outer)},
        "run": [40, {"op": "twice"}]
    }));
    assert_eq!(stack, vec![json!(42)]);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn self_including_file_is_a_cycle() {
    let dir = temp_dir();
    let path = dir.join("loop.json");
    let uri = zvm_provider_fs::uri_for(&path);
    std::fs::write(&path, json!({"include": {"again": uri}, "run": []}).to_string()).unwrap();

    let mut registry = Registry::with_builtins();
    zvm_provider_fs::register(&mut registry);
    let mut vm = VM::with_registry(registry).with_console(false);
    let err = vm.exec(&json!({"include": {"start": uri}})).unwrap_err();
    assert!(err.message_contains("include cycle"), "{err}");
    std::fs::remove_dir_all(&dir).unwrap();
}
