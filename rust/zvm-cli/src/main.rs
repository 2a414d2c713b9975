//! ZVM CLI: run, test and explore JSON stack-machine procedures.

use std::path::PathBuf;

use clap::{Parser as ClapParser, Subcommand};
use tracing_subscriber::EnvFilter;
use zvm_cli::colors::red;
use zvm_cli::config::ZvmConfig;
use zvm_core::Value;

#[derive(ClapParser)]
#[command(name = "zvm", version, about = "A stack machine for JSON procedures")]
struct Cli {
    /// Use this config file instead of searching for zvm.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a procedure and execute it, then print the final stack
    Run {
        /// Procedure URI, or a path to a local file
        target: String,

        /// Disable the per-op console trace
        #[arg(long, short)]
        quiet: bool,
    },
    /// Run a procedure's embedded tests
    Test {
        /// Procedure URI, or a path to a local file
        target: String,

        /// Only run tests whose name matches this regex
        #[arg(long)]
        filter: Option<String>,
    },
    /// Evaluate lines in one VM and print the stack
    Eval {
        /// Literals, ops such as {"op": "+"}, procedure URIs or `import <module>`
        #[arg(required = true)]
        lines: Vec<String>,

        /// Disable the per-op console trace
        #[arg(long, short)]
        quiet: bool,
    },
    /// Start an interactive REPL
    Repl,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ZVM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", red("error:"), message);
    std::process::exit(1);
}

fn print_stack(stack: &[Value]) {
    for value in stack {
        println!("{}", value);
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ZvmConfig::load_from(path),
        None => ZvmConfig::load(),
    }
    .unwrap_or_else(|e| fail(e));

    match cli.command {
        Commands::Run { target, quiet } => {
            if quiet {
                config.trace.console = false;
            }
            let uri = zvm_cli::target_uri(&target).unwrap_or_else(|e| fail(e));
            let mut vm = zvm_cli::new_vm(&config).unwrap_or_else(|e| fail(e));
            if let Err(e) = vm.run(&uri) {
                fail(zvm_cli::describe_error(&e));
            }
            print_stack(vm.stack());
        }
        Commands::Test { target, filter } => {
            zvm_cli::test_cmd::cmd_test(&target, filter.as_deref(), &config);
        }
        Commands::Eval { lines, quiet } => {
            if quiet {
                config.trace.console = false;
            }
            let mut vm = zvm_cli::new_vm(&config).unwrap_or_else(|e| fail(e));
            for line in &lines {
                if let Err(e) = vm.eval(line) {
                    fail(zvm_cli::describe_error(&e));
                }
            }
            print_stack(vm.stack());
        }
        Commands::Repl => {
            if let Err(e) = zvm_cli::repl::run_repl(&config) {
                fail(e);
            }
        }
    }
}
