//! Procedure documents and the references that make up their `run` lists.

use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Result, VmError};
use crate::value::{KvArray, Value};

/// A parsed procedure document. Every section is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Procedure {
    #[serde(default)]
    pub import: Vec<String>,
    #[serde(default)]
    pub include: KvArray,
    #[serde(default)]
    pub set: KvArray,
    #[serde(default = "empty_run")]
    pub run: Arc<[Value]>,
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

impl Default for Procedure {
    fn default() -> Self {
        Self {
            import: Vec::new(),
            include: KvArray::new(),
            set: KvArray::new(),
            run: empty_run(),
            tests: Vec::new(),
        }
    }
}

fn empty_run() -> Arc<[Value]> {
    Arc::from(Vec::new())
}

/// One embedded test: an initial stack and the checks run after `exec`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TestCase {
    #[serde(default = "unnamed_test")]
    pub name: String,
    #[serde(default)]
    pub setup: Vec<Value>,
    #[serde(default)]
    pub checks: Vec<Check>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Check {
    #[serde(default)]
    pub answer: Option<Vec<Value>>,
}

fn unnamed_test() -> String {
    "unnamed-test".to_string()
}

/// Where an `include` entry comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum IncludeRef<'a> {
    Uri(&'a str),
    Inline(&'a Value),
}

impl Procedure {
    /// Parse and validate a procedure document.
    pub fn from_value(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(VmError::InvalidProcedure(format!(
                "expected a key-value array, got {}",
                crate::value::type_name(value)
            )));
        }
        let procedure = Procedure::deserialize(value)
            .map_err(|e| VmError::InvalidProcedure(e.to_string()))?;
        for (name, reference) in &procedure.include {
            if !(reference.is_string() || reference.is_object()) {
                return Err(VmError::InvalidProcedure(format!(
                    "include '{name}' is not a uri (string) or an op (key-value array)"
                )));
            }
        }
        for op in procedure.run.iter() {
            OpRef::classify(op)?;
        }
        Ok(procedure)
    }

    pub fn includes(&self) -> impl Iterator<Item = (&str, IncludeRef<'_>)> {
        self.include.iter().map(|(name, reference)| {
            let reference = match reference {
                Value::String(uri) => IncludeRef::Uri(uri),
                other => IncludeRef::Inline(other),
            };
            (name.as_str(), reference)
        })
    }
}

/// One element of a `run` list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpRef<'a> {
    /// `{"op": name, ...params}`
    Invoke { name: &'a str, params: &'a KvArray },
    /// Anything else, pushed verbatim.
    Literal(&'a Value),
}

impl<'a> OpRef<'a> {
    pub fn classify(value: &'a Value) -> Result<Self> {
        match value {
            Value::Object(map) => match map.get("op") {
                Some(Value::String(name)) => Ok(OpRef::Invoke { name, params: map }),
                Some(other) => Err(VmError::InvalidProcedure(format!(
                    "op name must be a string, got {}",
                    crate::value::type_name(other)
                ))),
                None => Ok(OpRef::Literal(value)),
            },
            other => Ok(OpRef::Literal(other)),
        }
    }

    /// Name to show in traces; literals show as `put`.
    pub fn trace_name(&self) -> &'a str {
        match *self {
            OpRef::Invoke { name, .. } => name,
            OpRef::Literal(_) => "put",
        }
    }

    /// Invocation parameters without the `op` key.
    pub fn bindings(params: &KvArray) -> KvArray {
        params
            .iter()
            .filter(|(k, _)| k.as_str() != "op")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
