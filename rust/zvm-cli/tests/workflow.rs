//! The library paths behind `zvm run`, `zvm eval` and `zvm test`.

use std::path::PathBuf;

use serde_json::json;
use zvm_cli::config::ZvmConfig;

struct TempDir {
    path: PathBuf,
}

impl TempDir {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("zvm_cli_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path).expect("should create temp test directory");
        Self { path }
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

fn quiet_config(dir: &TempDir) -> ZvmConfig {
    let path = dir.path.join("zvm.toml");
    std::fs::write(&path, "[trace]\nconsole = false\n").unwrap();
    ZvmConfig::load_from(&path).unwrap()
}

#[test]
fn run_a_procedure_that_writes_and_reads_files() {
    let dir = TempDir::new();
    let config = quiet_config(&dir);
    let scratch = zvm_provider_fs::uri_for(&dir.path.join("scratch.hjson"));
    let main = dir.path.join("main.json");
    std::fs::write(
        &main,
        json!({
            "run": [
                {"total": 10},
                {"op": "put", "uri": scratch, "mediaType": "application/hjson"},
                {"op": "get", "uri": scratch, "mediaType": "application/hjson"},
                {"op": "unpack", "keys": ["total"]},
                {"op": "fstring", "fmt": "total={:03d}"},
                {"op": "del", "uri": scratch}
            ]
        })
        .to_string(),
    )
    .unwrap();

    let uri = zvm_cli::target_uri(main.to_str().unwrap()).unwrap();
    let mut vm = zvm_cli::new_vm(&config).unwrap();
    vm.run(&uri).unwrap();
    assert_eq!(vm.stack(), &[json!("total=010")]);
    assert!(!dir.path.join("scratch.hjson").exists());
}

#[test]
fn eval_lines_share_one_vm() {
    let dir = TempDir::new();
    let mut vm = zvm_cli::new_vm(&quiet_config(&dir)).unwrap();
    for line in ["6", "7", r#"{"op": "*"}"#, r#"{"op": "put", "uri": "globals:answer"}"#] {
        vm.eval(line).unwrap();
    }
    assert!(vm.stack().is_empty());
    assert_eq!(vm.globals().get("answer"), Some(&json!(42)));
}

#[test]
fn preload_can_be_narrowed() {
    let dir = TempDir::new();
    let mut config = quiet_config(&dir);
    config.modules.preload.clear();
    let mut vm = zvm_cli::new_vm(&config).unwrap();
    let uri = zvm_provider_fs::uri_for(&dir.path.join("zvm.toml"));
    let err = vm.run(&uri).unwrap_err();
    assert!(err.message_contains("no getter registered for scheme 'file'"), "{err}");
    vm.eval("import zvm.fs").unwrap();
    assert!(vm.registry().lookup_getter("file", Some("application/json")).is_ok());
}

#[test]
fn test_command_reports_each_test() {
    let dir = TempDir::new();
    let config = quiet_config(&dir);
    let path = dir.path.join("tested.json5");
    std::fs::write(
        &path,
        r#"{
            run: [{op: "asint"}],
            tests: [
                {name: "parses", setup: [" 12 "], checks: [{answer: [12]}]},
                {name: "truncates", setup: [3.9], checks: [{answer: [3]}]},
                {name: "rejects", setup: ["x"], checks: [{answer: [0]}]},
            ],
        }"#,
    )
    .unwrap();
    let (summary, outcomes) =
        zvm_cli::test_cmd::run_tests(path.to_str().unwrap(), None, &config).unwrap();
    assert_eq!((summary.total, summary.passed, summary.failed), (3, 2, 1));
    assert_eq!(outcomes[2].name, "rejects");
    assert!(!outcomes[2].passed());
}
