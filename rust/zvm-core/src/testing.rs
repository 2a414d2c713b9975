//! The embedded test harness: every entry of a procedure's `tests` list
//! runs the whole procedure in a fresh VM and compares the final stack.

use regex::Regex;

use crate::error::{Result, VmError};
use crate::procedure::{Procedure, TestCase};
use crate::registry::Registry;
use crate::value::{values_equal, Value};
use crate::vm::VM;

/// Result of one embedded test.
#[derive(Debug)]
pub struct TestOutcome {
    pub name: String,
    pub checks_passed: usize,
    /// The first failure: an execution error or a failed check.
    pub error: Option<VmError>,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

pub struct TestHarness {
    registry: Registry,
    filter: Option<Regex>,
    console: bool,
}

impl TestHarness {
    /// Tests run quietly against clones of `registry`.
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            filter: None,
            console: false,
        }
    }

    /// Only run tests whose name matches `pattern` at its start.
    pub fn filter(mut self, pattern: &str) -> Result<Self> {
        self.filter = Some(Regex::new(&format!("^(?:{pattern})"))?);
        Ok(self)
    }

    pub fn console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    fn selected<'p>(&'p self, procedure: &'p Procedure) -> impl Iterator<Item = &'p TestCase> {
        procedure
            .tests
            .iter()
            .filter(|test| self.filter.as_ref().map_or(true, |re| re.is_match(&test.name)))
    }

    /// Run the selected tests, stopping at the first failure. Returns the
    /// number of checks that passed.
    pub fn run(&self, document: &Value) -> Result<usize> {
        let procedure = Procedure::from_value(document)?;
        let mut passed = 0;
        for test in self.selected(&procedure) {
            let outcome = self.run_one(&procedure, test);
            if let Some(error) = outcome.error {
                return Err(error);
            }
            passed += outcome.checks_passed;
        }
        Ok(passed)
    }

    /// Run every selected test and report each one.
    pub fn report(&self, document: &Value) -> Result<Vec<TestOutcome>> {
        let procedure = Procedure::from_value(document)?;
        Ok(self
            .selected(&procedure)
            .map(|test| self.run_one(&procedure, test))
            .collect())
    }

    fn run_one(&self, procedure: &Procedure, test: &TestCase) -> TestOutcome {
        let mut outcome = TestOutcome {
            name: test.name.clone(),
            checks_passed: 0,
            error: None,
        };
        let mut vm = VM::with_registry(self.registry.clone())
            .with_stack(test.setup.clone())
            .with_console(self.console);
        if let Err(e) = vm.exec_procedure(procedure) {
            tracing::info!(test = %test.name, error = %e, "test errored");
            outcome.error = Some(e);
            return outcome;
        }
        for (check, expected) in test
            .checks
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.answer.as_ref().map(|a| (i, a)))
        {
            let actual = vm.stack();
            let matches = expected.len() == actual.len()
                && expected.iter().zip(actual).all(|(e, a)| values_equal(e, a));
            if !matches {
                tracing::info!(test = %test.name, check, "check failed");
                outcome.error = Some(VmError::CheckFailed {
                    test: test.name.clone(),
                    check,
                    expected: Value::Array(expected.clone()),
                    actual: Value::Array(actual.to_vec()),
                });
                return outcome;
            }
            outcome.checks_passed += 1;
        }
        tracing::debug!(test = %test.name, checks = outcome.checks_passed, "test passed");
        outcome
    }
}

/// Run a procedure's embedded tests against the built-in ops, stopping at
/// the first failure, and return the number of checks that passed.
pub fn test(document: &Value, pattern: Option<&str>) -> Result<usize> {
    let mut harness = TestHarness::new(Registry::with_builtins());
    if let Some(pattern) = pattern {
        harness = harness.filter(pattern)?;
    }
    harness.run(document)
}
