//! ZVM CLI library.
//!
//! Assembles the standard registry, loads `zvm.toml`, and provides the
//! `run`/`test`/`eval`/`repl` commands used by the `zvm` binary.

pub mod colors;
pub mod config;
pub mod repl;
pub mod test_cmd;

use std::path::Path;

use config::ZvmConfig;
use zvm_core::{Registry, Result, VmError, VM};

pub const FS_MODULE: &str = "zvm.fs";
pub const HTTP_MODULE: &str = "zvm.http";

/// Built-in ops plus the `zvm.fs` and `zvm.http` host modules.
pub fn standard_registry(config: &ZvmConfig) -> Registry {
    let mut registry = Registry::with_builtins();
    registry.module(FS_MODULE, |r| {
        zvm_provider_fs::register(r);
        Ok(())
    });
    let http = config.http.clone();
    registry.module(HTTP_MODULE, move |r| zvm_provider_http::register(r, &http));
    registry
}

/// A VM over the standard registry with the configured modules imported.
pub fn new_vm(config: &ZvmConfig) -> Result<VM> {
    let mut vm = VM::with_registry(standard_registry(config)).with_console(config.trace.console);
    for module in &config.modules.preload {
        vm.import(module)?;
    }
    Ok(vm)
}

/// Turn a command-line target into a procedure URI. Anything that already
/// parses as a URI with a scheme is kept; other input is a local path.
pub fn target_uri(target: &str) -> Result<String> {
    if let Ok(uri) = url::Url::parse(target) {
        // single letters are Windows drive prefixes, not schemes
        if uri.scheme().len() > 1 {
            return Ok(target.to_string());
        }
    }
    let path = Path::new(target)
        .canonicalize()
        .map_err(|e| VmError::provider(target, format!("cannot open: {}", e)))?;
    Ok(zvm_provider_fs::uri_for(&path))
}

/// Render an error with its unwound frames, innermost first.
pub fn describe_error(error: &VmError) -> String {
    let mut out = error.root().to_string();
    for frame in error.frames() {
        out.push_str(&format!("\n    at {} (pc {})", frame.frame_name, frame.pc));
    }
    out
}
