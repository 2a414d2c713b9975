//! The virtual machine: the shared stack, the global scope, the root frame
//! and the procedure loader.

use std::io::BufRead;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::codec::{self, MediaType};
use crate::error::{Result, VmError};
use crate::frame::Frame;
use crate::procedure::{IncludeRef, Procedure};
use crate::registry::{Output, Params, Registry};
use crate::state::State;
use crate::trace::{ConsoleWriter, DebugCallback, TraceEvent};
use crate::value::{truthy, KvArray, Value};

pub const MAX_CALL_DEPTH: usize = 256;

/// Everything a frame needs from the VM while it dispatches.
pub(crate) struct Machine {
    pub(crate) stack: Vec<Value>,
    pub(crate) globals: KvArray,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) registry: Registry,
    pub(crate) console: bool,
    pub(crate) debug_callback: DebugCallback,
    pub(crate) console_writer: ConsoleWriter,
    pub(crate) max_depth: usize,
}

impl Machine {
    pub(crate) fn new(registry: Registry, stack: Vec<Value>) -> Self {
        Self {
            stack,
            globals: KvArray::new(),
            started_at: Utc::now(),
            registry,
            console: true,
            debug_callback: None,
            console_writer: None,
            max_depth: MAX_CALL_DEPTH,
        }
    }

    pub(crate) fn apply(&mut self, output: Output) {
        match output {
            Output::None => {}
            Output::Push(value) => self.stack.push(value),
            Output::Extend(values) => self.stack.extend(values),
        }
    }

    pub(crate) fn emit(&mut self, event: TraceEvent) {
        if let Some(ref mut cb) = self.debug_callback {
            cb(&event);
        }
    }

    /// Whether steps in `frame` reach the console: the VM switch is on and
    /// the frame's `logging` local, when present, is truthy.
    pub(crate) fn console_enabled(&self, frame: &Frame) -> bool {
        self.console && frame.locals.get("logging").map_or(true, truthy)
    }

    /// Report the op about to be dispatched in `frame`.
    pub(crate) fn trace_step(&mut self, frame: &Frame, op: &str) {
        tracing::trace!(frame = %frame.name, pc = frame.pc, op, "step");
        let console = self.console_enabled(frame);
        if !console && self.debug_callback.is_none() {
            return;
        }
        let event = TraceEvent::Step {
            frame: frame.name.clone(),
            depth: frame.depth,
            pc: frame.pc,
            stack_len: self.stack.len(),
            op: op.to_string(),
            elapsed: Utc::now() - self.started_at,
        };
        if console {
            if let Some(line) = event.console_line() {
                match self.console_writer {
                    Some(ref mut write) => write(&line),
                    None => println!("{line}"),
                }
            }
        }
        self.emit(event);
    }
}

pub struct VM {
    machine: Machine,
    root: Frame,
    /// URIs whose includes are being resolved, outermost first.
    loading: Vec<String>,
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl VM {
    /// A VM over the built-in ops.
    pub fn new() -> Self {
        Self::with_registry(Registry::with_builtins())
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self {
            machine: Machine::new(registry, Vec::new()),
            root: Frame::root(),
            loading: Vec::new(),
        }
    }

    /// Replace the initial stack.
    pub fn with_stack(mut self, stack: Vec<Value>) -> Self {
        self.machine.stack = stack;
        self
    }

    pub fn with_console(mut self, console: bool) -> Self {
        self.machine.console = console;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.machine.max_depth = max_depth;
        self
    }

    pub fn set_console(&mut self, console: bool) {
        self.machine.console = console;
    }

    pub fn set_debug_callback(&mut self, callback: impl FnMut(&TraceEvent) + 'static) {
        self.machine.debug_callback = Some(Box::new(callback));
    }

    /// Send console trace lines to `writer` instead of stdout.
    pub fn set_console_writer(&mut self, writer: impl FnMut(&str) + 'static) {
        self.machine.console_writer = Some(Box::new(writer));
    }

    pub fn stack(&self) -> &[Value] {
        &self.machine.stack
    }

    pub fn stack_mut(&mut self) -> &mut Vec<Value> {
        &mut self.machine.stack
    }

    pub fn into_stack(self) -> Vec<Value> {
        self.machine.stack
    }

    pub fn globals(&self) -> &KvArray {
        &self.machine.globals
    }

    /// The root frame's local scope.
    pub fn locals(&self) -> &KvArray {
        &self.root.locals
    }

    pub fn registry(&self) -> &Registry {
        &self.machine.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.machine.registry
    }

    pub fn import(&mut self, module: &str) -> Result<()> {
        self.machine.registry.import(module)
    }

    // -----------------------------------------------------------------------
    // Loader
    // -----------------------------------------------------------------------

    /// Load a procedure document and run it in the root frame.
    pub fn exec(&mut self, document: &Value) -> Result<()> {
        let procedure = Procedure::from_value(document)?;
        self.exec_procedure(&procedure)
    }

    pub fn exec_procedure(&mut self, procedure: &Procedure) -> Result<()> {
        self.load_dependencies(procedure)?;
        self.root.locals.extend(procedure.set.clone());
        self.root.run(&mut self.machine, Arc::clone(&procedure.run))
    }

    fn load_dependencies(&mut self, procedure: &Procedure) -> Result<()> {
        for module in &procedure.import {
            self.import(module)?;
        }
        for (name, reference) in procedure.includes() {
            self.include(name, reference)?;
        }
        Ok(())
    }

    fn include(&mut self, name: &str, reference: IncludeRef<'_>) -> Result<()> {
        let procedure = match reference {
            IncludeRef::Inline(document) => {
                let procedure = included(name, document)?;
                self.load_dependencies(&procedure)?;
                procedure
            }
            IncludeRef::Uri(uri) => {
                if self.loading.iter().any(|open| open == uri) {
                    return Err(VmError::IncludeCycle(uri.to_string()));
                }
                tracing::debug!(op = name, uri, "including procedure");
                let document = self.fetch(uri)?;
                let procedure = included(name, &document)?;
                self.loading.push(uri.to_string());
                let loaded = self.load_dependencies(&procedure);
                self.loading.pop();
                loaded?;
                procedure
            }
        };
        self.machine
            .registry
            .register_procedure(name, Arc::new(procedure));
        Ok(())
    }

    /// Fetch a document with the getter for its scheme and the media type
    /// implied by its path suffix.
    pub fn fetch(&mut self, uri: &str) -> Result<Value> {
        let parsed = url::Url::parse(uri).map_err(|e| VmError::InvalidUri {
            uri: uri.to_string(),
            message: e.to_string(),
        })?;
        let media_type = MediaType::from_path_suffix(parsed.path());
        let getter = self
            .machine
            .registry
            .lookup_getter(parsed.scheme(), Some(media_type.as_str()))?;
        let mut state = State::new(&mut self.machine, &mut self.root, "get");
        getter(&mut state, uri, Params::new())
    }

    // -----------------------------------------------------------------------
    // Line-oriented entry points
    // -----------------------------------------------------------------------

    /// Evaluate one line: an `import` directive, a procedure URI, or a
    /// single literal or op invocation.
    pub fn eval(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        if let Some(module) = line.strip_prefix("import ") {
            return self.import(module.trim());
        }
        if is_procedure_uri(line) {
            let document = self.fetch(line)?;
            return self.exec(&document);
        }
        let op = codec::parse_literal(line)?;
        self.root.run(&mut self.machine, Arc::from(vec![op]))
    }

    pub fn run(&mut self, uri: &str) -> Result<()> {
        self.eval(uri)
    }

    /// Evaluate every line of `input`, stopping at the first error.
    pub fn repl<R: BufRead>(&mut self, input: R) -> Result<()> {
        for line in input.lines() {
            let line = line.map_err(|e| VmError::provider("<input>", e))?;
            self.eval(&line)?;
        }
        Ok(())
    }
}

fn included(name: &str, document: &Value) -> Result<Procedure> {
    Procedure::from_value(document)
        .map_err(|e| VmError::InvalidProcedure(format!("include '{name}': {}", e.root())))
}

fn is_procedure_uri(line: &str) -> bool {
    match url::Url::parse(line) {
        Ok(uri) => !uri.scheme().is_empty() && !uri.path().is_empty(),
        Err(_) => false,
    }
}
