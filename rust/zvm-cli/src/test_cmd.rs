//! `zvm test`: run a procedure's embedded tests and report each one.

use std::time::Instant;

use crate::colors::{bold, gray, green, red, status_label};
use crate::config::ZvmConfig;
use zvm_core::{TestHarness, TestOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestRunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub checks: usize,
}

impl TestRunSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    fn of(outcomes: &[TestOutcome]) -> Self {
        let passed = outcomes.iter().filter(|o| o.passed()).count();
        Self {
            total: outcomes.len(),
            passed,
            failed: outcomes.len() - passed,
            checks: outcomes.iter().map(|o| o.checks_passed).sum(),
        }
    }
}

/// Fetch the procedure at `target` and run its tests, each in a fresh VM
/// over the configured registry.
pub fn run_tests(
    target: &str,
    filter: Option<&str>,
    config: &ZvmConfig,
) -> Result<(TestRunSummary, Vec<TestOutcome>), String> {
    let uri = crate::target_uri(target).map_err(|e| e.to_string())?;
    let mut loader = crate::new_vm(config).map_err(|e| e.to_string())?;
    let document = loader.fetch(&uri).map_err(|e| crate::describe_error(&e))?;

    let mut harness = TestHarness::new(loader.registry().clone());
    if let Some(pattern) = filter {
        harness = harness.filter(pattern).map_err(|e| e.to_string())?;
    }
    let outcomes = harness.report(&document).map_err(|e| e.to_string())?;
    Ok((TestRunSummary::of(&outcomes), outcomes))
}

fn print_report(summary: &TestRunSummary, outcomes: &[TestOutcome], elapsed: f64) {
    println!(
        "{} {} test{}",
        status_label("Running"),
        summary.total,
        if summary.total == 1 { "" } else { "s" }
    );

    for outcome in outcomes {
        let status = if outcome.passed() {
            green("✓ ok")
        } else {
            red("✗ FAILED")
        };
        println!("  {} {} ... {}", gray("test"), bold(&outcome.name), status);
    }

    if summary.failed > 0 {
        println!("\n{}", bold("--- FAILURES ---"));
        for outcome in outcomes {
            if let Some(ref error) = outcome.error {
                println!("  {} {}:", gray("test"), bold(&outcome.name));
                for line in crate::describe_error(error).lines() {
                    println!("    {}", line);
                }
                println!();
            }
        }
    }

    let mark = if summary.is_success() { green("✓") } else { red("✗") };
    println!(
        "{} Finished in {:.2}s: {} passed, {} failed, {} checks",
        mark, elapsed, summary.passed, summary.failed, summary.checks
    );
}

pub fn cmd_test(target: &str, filter: Option<&str>, config: &ZvmConfig) {
    let start = Instant::now();
    match run_tests(target, filter, config) {
        Ok((summary, outcomes)) => {
            print_report(&summary, &outcomes, start.elapsed().as_secs_f64());
            if !summary.is_success() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("{} {}", red("error:"), e);
            std::process::exit(1);
        }
    }
}
