//! Plugin registry: ops, getters, putters, deleters, copiers and host modules.
//!
//! Every VM owns a `Registry`. Handlers are reference counted, so cloning a
//! registry to seed another VM is cheap. Registration never fails on a key
//! collision; the last registration wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, VmError};
use crate::procedure::Procedure;
use crate::state::State;
use crate::value::{KvArray, Value, ValueKind};

/// Keyword parameters handed to a plugin.
pub type Params = KvArray;

/// What a callable op hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Leave the stack as the handler left it.
    None,
    /// Push one value.
    Push(Value),
    /// Push each value in order; the last becomes the top of the stack.
    Extend(Vec<Value>),
}

impl From<()> for Output {
    fn from(_: ()) -> Self {
        Output::None
    }
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Output::Push(value)
    }
}

impl From<Option<Value>> for Output {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Output::None, Output::Push)
    }
}

impl From<bool> for Output {
    fn from(value: bool) -> Self {
        Output::Push(Value::Bool(value))
    }
}

pub type OpFn = dyn Fn(&mut State<'_>, Params) -> Result<Output> + Send + Sync;
pub type GetterFn = dyn Fn(&mut State<'_>, &str, Params) -> Result<Value> + Send + Sync;
pub type PutterFn = dyn Fn(&mut State<'_>, Value, &str, Params) -> Result<()> + Send + Sync;
pub type DeleterFn = dyn Fn(&mut State<'_>, &str, Params) -> Result<()> + Send + Sync;
pub type CopierFn = dyn Fn(&Value, bool) -> Value + Send + Sync;
pub type ModuleFn = dyn Fn(&mut Registry) -> Result<()> + Send + Sync;

/// An op is either host code or another procedure.
#[derive(Clone)]
pub enum Handler {
    Native(Arc<OpFn>),
    Procedure(Arc<Procedure>),
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Native(_) => f.write_str("Handler::Native(..)"),
            Handler::Procedure(p) => f.debug_tuple("Handler::Procedure").field(p).finish(),
        }
    }
}

type PluginKey = (String, Option<String>);

fn plugin_key(scheme: &str, media_type: Option<&str>) -> PluginKey {
    (scheme.to_string(), media_type.map(str::to_string))
}

#[derive(Clone, Default)]
pub struct Registry {
    ops: HashMap<String, Handler>,
    getters: HashMap<PluginKey, Arc<GetterFn>>,
    putters: HashMap<PluginKey, Arc<PutterFn>>,
    deleters: HashMap<PluginKey, Arc<DeleterFn>>,
    copiers: HashMap<ValueKind, Arc<CopierFn>>,
    modules: HashMap<String, Arc<ModuleFn>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("ops", &self.ops.len())
            .field("getters", &self.getters.len())
            .field("putters", &self.putters.len())
            .field("deleters", &self.deleters.len())
            .field("copiers", &self.copiers.len())
            .field("modules", &self.modules.len())
            .finish()
    }
}

impl Registry {
    /// An empty registry, with no ops at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in ops and the `locals`/`globals` plugins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::ops::install(&mut registry);
        registry
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    pub fn op<F, O>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut State<'_>, Params) -> Result<O> + Send + Sync + 'static,
        O: Into<Output>,
    {
        tracing::trace!(op = name, "registering native op");
        let handler: Arc<OpFn> =
            Arc::new(move |state: &mut State<'_>, params: Params| -> Result<Output> {
                handler(state, params).map(Into::into)
            });
        self.ops.insert(name.to_string(), Handler::Native(handler));
        self
    }

    /// Register a procedure document as an op, validating its shape first.
    pub fn procedure(&mut self, name: &str, document: &Value) -> Result<&mut Self> {
        let procedure = Procedure::from_value(document)
            .map_err(|e| VmError::InvalidProcedure(format!("op '{name}': {}", e.root())))?;
        Ok(self.register_procedure(name, Arc::new(procedure)))
    }

    pub fn register_procedure(&mut self, name: &str, procedure: Arc<Procedure>) -> &mut Self {
        tracing::debug!(op = name, "registering procedure op");
        self.ops.insert(name.to_string(), Handler::Procedure(procedure));
        self
    }

    pub fn getter<F>(&mut self, schemes: &[&str], media_type: Option<&str>, getter: F) -> &mut Self
    where
        F: Fn(&mut State<'_>, &str, Params) -> Result<Value> + Send + Sync + 'static,
    {
        let getter: Arc<GetterFn> = Arc::new(getter);
        for scheme in schemes {
            tracing::trace!(scheme, media_type, "registering getter");
            self.getters.insert(plugin_key(scheme, media_type), Arc::clone(&getter));
        }
        self
    }

    pub fn putter<F>(&mut self, schemes: &[&str], media_type: Option<&str>, putter: F) -> &mut Self
    where
        F: Fn(&mut State<'_>, Value, &str, Params) -> Result<()> + Send + Sync + 'static,
    {
        let putter: Arc<PutterFn> = Arc::new(putter);
        for scheme in schemes {
            tracing::trace!(scheme, media_type, "registering putter");
            self.putters.insert(plugin_key(scheme, media_type), Arc::clone(&putter));
        }
        self
    }

    pub fn deleter<F>(&mut self, schemes: &[&str], media_type: Option<&str>, deleter: F) -> &mut Self
    where
        F: Fn(&mut State<'_>, &str, Params) -> Result<()> + Send + Sync + 'static,
    {
        let deleter: Arc<DeleterFn> = Arc::new(deleter);
        for scheme in schemes {
            tracing::trace!(scheme, media_type, "registering deleter");
            self.deleters.insert(plugin_key(scheme, media_type), Arc::clone(&deleter));
        }
        self
    }

    pub fn copier<F>(&mut self, kinds: &[ValueKind], copier: F) -> &mut Self
    where
        F: Fn(&Value, bool) -> Value + Send + Sync + 'static,
    {
        let copier: Arc<CopierFn> = Arc::new(copier);
        for kind in kinds {
            self.copiers.insert(*kind, Arc::clone(&copier));
        }
        self
    }

    /// Publish a host module that procedures can `import` by name.
    pub fn module<F>(&mut self, name: &str, installer: F) -> &mut Self
    where
        F: Fn(&mut Registry) -> Result<()> + Send + Sync + 'static,
    {
        self.modules.insert(name.to_string(), Arc::new(installer));
        self
    }

    /// Run a host module's installer against this registry.
    pub fn import(&mut self, name: &str) -> Result<()> {
        let installer = self
            .modules
            .get(name)
            .cloned()
            .ok_or_else(|| VmError::UnknownModule(name.to_string()))?;
        tracing::debug!(module = name, "importing host module");
        installer(self)
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    pub fn lookup_op(&self, name: &str) -> Result<Handler> {
        self.ops
            .get(name)
            .cloned()
            .ok_or_else(|| VmError::UnknownOp(name.to_string()))
    }

    pub fn has_op(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    /// Registered op names, sorted.
    pub fn op_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.ops.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn lookup_getter(&self, scheme: &str, media_type: Option<&str>) -> Result<Arc<GetterFn>> {
        self.getters
            .get(&plugin_key(scheme, media_type))
            .cloned()
            .ok_or_else(|| missing("getter", scheme, media_type))
    }

    pub fn lookup_putter(&self, scheme: &str, media_type: Option<&str>) -> Result<Arc<PutterFn>> {
        self.putters
            .get(&plugin_key(scheme, media_type))
            .cloned()
            .ok_or_else(|| missing("putter", scheme, media_type))
    }

    pub fn lookup_deleter(&self, scheme: &str, media_type: Option<&str>) -> Result<Arc<DeleterFn>> {
        self.deleters
            .get(&plugin_key(scheme, media_type))
            .cloned()
            .ok_or_else(|| missing("deleter", scheme, media_type))
    }

    pub fn lookup_copier(&self, kind: ValueKind) -> Option<Arc<CopierFn>> {
        self.copiers.get(&kind).cloned()
    }
}

fn missing(role: &'static str, scheme: &str, media_type: Option<&str>) -> VmError {
    VmError::MissingPlugin {
        role,
        scheme: scheme.to_string(),
        media_type: media_type.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn last_registration_wins() {
        let mut registry = Registry::new();
        registry.op("answer", |_, _| Ok(json!(1)));
        registry.op("answer", |_, _| Ok(json!(2)));
        assert_eq!(registry.op_names(), vec!["answer"]);
        registry.procedure("answer", &json!({"run": [3]})).unwrap();
        assert!(matches!(registry.lookup_op("answer").unwrap(), Handler::Procedure(_)));
    }

    #[test]
    fn procedure_registration_validates_shape() {
        let mut registry = Registry::new();
        let err = registry.procedure("bad", &json!({"run": 3})).unwrap_err();
        assert!(err.to_string().contains("op 'bad'"));
        assert!(!registry.has_op("bad"));
    }

    #[test]
    fn plugins_are_keyed_by_scheme_and_media_type() {
        let mut registry = Registry::new();
        registry.getter(&["http", "https"], Some("application/json"), |_, _, _| Ok(json!(null)));
        assert!(registry.lookup_getter("https", Some("application/json")).is_ok());
        assert!(registry.lookup_getter("https", None).is_err());
        let err = registry.lookup_putter("http", Some("application/json")).err().unwrap();
        assert_eq!(
            err.to_string(),
            "no putter registered for scheme 'http' and media type application/json"
        );
    }

    #[test]
    fn unknown_lookups_name_the_key() {
        let mut registry = Registry::new();
        assert_eq!(registry.lookup_op("zap").unwrap_err().to_string(), "unknown op: zap");
        assert_eq!(registry.import("zvm.nothing").unwrap_err().to_string(), "unknown module: zvm.nothing");
    }

    #[test]
    fn import_runs_the_installer() {
        let mut registry = Registry::new();
        registry.module("demo", |r| {
            r.op("demo.one", |_, _| Ok(json!(1)));
            Ok(())
        });
        assert!(!registry.has_op("demo.one"));
        registry.import("demo").unwrap();
        assert!(registry.has_op("demo.one"));
    }

    #[test]
    fn builtins_cover_the_core_ops() {
        let registry = Registry::with_builtins();
        for name in [
            "+", "-", "*", "/", "%", "and", "or", "xor", "not", "asbool", "asint", "asfloat",
            "eq", "neq", "gt", "ge", "lt", "le", "dup", "swap", "drop", "size", "pack",
            "unpack", "set_next_params", "begin", "repeat", "break", "while", "if", "else",
            "endif", "recurse", "get", "put", "del", "fstring", "assert",
        ] {
            assert!(registry.has_op(name), "missing builtin op {name}");
        }
        assert!(registry.lookup_getter("locals", None).is_ok());
        assert!(registry.lookup_deleter("globals", None).is_ok());
    }
}
