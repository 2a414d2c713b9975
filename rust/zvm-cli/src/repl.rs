//! Interactive REPL: each line goes to `VM::eval`, errors are printed and
//! the session carries on.

use std::fs;
use std::path::{Path, PathBuf};

use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use zvm_core::{KvArray, Value, VM};

use crate::colors::{bold, cyan, gray, green, red};
use crate::config::ZvmConfig;

/// REPL commands for tab completion.
const COMMANDS: &[&str] = &[
    ":help", ":stack", ":locals", ":globals", ":ops", ":clear", ":quit",
];

/// Environment variable used to override REPL history location.
const REPL_HISTORY_PATH_ENV: &str = "ZVM_REPL_HISTORY_PATH";

/// Completes meta-commands at the start of a line and op names elsewhere.
struct ZvmHelper {
    ops: Vec<String>,
}

impl ZvmHelper {
    fn candidates(&self, line: &str, word: &str) -> Vec<String> {
        if line.trim_start() == word && word.starts_with(':') {
            COMMANDS
                .iter()
                .filter(|cmd| cmd.starts_with(word))
                .map(|cmd| cmd.to_string())
                .collect()
        } else {
            self.ops
                .iter()
                .filter(|op| op.starts_with(word))
                .cloned()
                .collect()
        }
    }
}

impl Completer for ZvmHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = line[..pos]
            .rfind(|c: char| c.is_whitespace() || c == '"' || c == '{' || c == ',')
            .map(|i| i + 1)
            .unwrap_or(0);
        let word = &line[start..pos];
        if word.is_empty() {
            return Ok((start, Vec::new()));
        }
        let pairs = self
            .candidates(line, word)
            .into_iter()
            .map(|c| Pair {
                display: c.clone(),
                replacement: c,
            })
            .collect();
        Ok((start, pairs))
    }
}

impl Hinter for ZvmHelper {
    type Hint = String;
}

impl Highlighter for ZvmHelper {}

impl Validator for ZvmHelper {}

impl Helper for ZvmHelper {}

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Quit,
    Help,
    Stack,
    Locals,
    Globals,
    Ops,
    Clear,
}

#[derive(Debug, PartialEq, Eq)]
enum ParsedCommand {
    NotACommand,
    UnknownCommand,
    Command(ReplCommand),
}

fn parse_repl_command(line: &str) -> ParsedCommand {
    let trimmed = line.trim();
    if !trimmed.starts_with(':') {
        return ParsedCommand::NotACommand;
    }
    match trimmed {
        ":quit" | ":q" => ParsedCommand::Command(ReplCommand::Quit),
        ":help" | ":h" => ParsedCommand::Command(ReplCommand::Help),
        ":stack" | ":s" => ParsedCommand::Command(ReplCommand::Stack),
        ":locals" => ParsedCommand::Command(ReplCommand::Locals),
        ":globals" => ParsedCommand::Command(ReplCommand::Globals),
        ":ops" => ParsedCommand::Command(ReplCommand::Ops),
        ":clear" | ":c" => ParsedCommand::Command(ReplCommand::Clear),
        _ => ParsedCommand::UnknownCommand,
    }
}

pub fn run_repl(config: &ZvmConfig) -> Result<(), String> {
    let mut vm = crate::new_vm(config).map_err(|e| e.to_string())?;

    println!("{}", bold(&cyan(&format!("ZVM REPL v{}", env!("CARGO_PKG_VERSION")))));
    println!(
        "{}\n",
        gray("Enter a JSON literal, an op such as {\"op\": \"dup\"}, a procedure URI or `import <module>`.")
    );

    let editor_config = rustyline::Config::builder().auto_add_history(true).build();
    let mut rl: Editor<ZvmHelper, DefaultHistory> =
        Editor::with_config(editor_config).map_err(|e| format!("cannot start line editor: {}", e))?;
    rl.set_helper(Some(ZvmHelper { ops: op_names(&vm) }));

    let history_path = get_history_path(config);
    if let Some(ref path) = history_path {
        if path.exists() {
            if let Err(err) = rl.load_history(path) {
                tracing::warn!(path = %path.display(), error = %err, "failed to load REPL history");
            }
        }
    }

    loop {
        match rl.readline(&format!("{} ", green("zvm>"))) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(keep_going) = handle_command(&line, &mut vm) {
                    if !keep_going {
                        break;
                    }
                    continue;
                }
                match vm.eval(&line) {
                    Ok(()) => print_top(vm.stack()),
                    Err(e) => eprintln!("{} {}", red("error:"), crate::describe_error(&e)),
                }
                // imports may have added ops
                if let Some(helper) = rl.helper_mut() {
                    helper.ops = op_names(&vm);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", gray("(Ctrl-D or :quit to exit)"));
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("{} {}", red("error:"), err);
                break;
            }
        }
    }

    if let Some(ref path) = history_path {
        if let Some(parent) = path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %err, "failed to create history directory");
            }
        }
        if let Err(err) = rl.save_history(path) {
            tracing::warn!(path = %path.display(), error = %err, "failed to save REPL history");
        }
    }
    Ok(())
}

fn op_names(vm: &VM) -> Vec<String> {
    vm.registry().op_names().into_iter().map(str::to_string).collect()
}

/// Handle REPL commands. Returns Some(true) to continue, Some(false) to quit,
/// None if not a command.
fn handle_command(line: &str, vm: &mut VM) -> Option<bool> {
    match parse_repl_command(line) {
        ParsedCommand::NotACommand => None,
        ParsedCommand::UnknownCommand => {
            eprintln!("{} unknown command. Type :help for usage.", red("error:"));
            Some(true)
        }
        ParsedCommand::Command(ReplCommand::Quit) => Some(false),
        ParsedCommand::Command(ReplCommand::Help) => {
            print_help();
            Some(true)
        }
        ParsedCommand::Command(ReplCommand::Stack) => {
            print_stack(vm.stack());
            Some(true)
        }
        ParsedCommand::Command(ReplCommand::Locals) => {
            print_scope(vm.locals());
            Some(true)
        }
        ParsedCommand::Command(ReplCommand::Globals) => {
            print_scope(vm.globals());
            Some(true)
        }
        ParsedCommand::Command(ReplCommand::Ops) => {
            println!("{}", vm.registry().op_names().join(" "));
            Some(true)
        }
        ParsedCommand::Command(ReplCommand::Clear) => {
            vm.stack_mut().clear();
            println!("{}", gray("Stack cleared."));
            Some(true)
        }
    }
}

fn print_top(stack: &[Value]) {
    if let Some(top) = stack.last() {
        println!("{} {}", gray(&format!("[{}]", stack.len())), top);
    }
}

fn print_stack(stack: &[Value]) {
    if stack.is_empty() {
        println!("{}", gray("(empty stack)"));
    }
    // top of stack first
    for (i, value) in stack.iter().rev().enumerate() {
        println!("{:4} {}", gray(&i.to_string()), value);
    }
}

fn print_scope(scope: &KvArray) {
    if scope.is_empty() {
        println!("{}", gray("(no variables)"));
    }
    for (key, value) in scope {
        println!("  {} = {}", cyan(key), value);
    }
}

/// Resolve the path to the history file.
///
/// `ZVM_REPL_HISTORY_PATH` wins over `[repl] history`; either may be
/// absolute, `~/...` or relative to HOME. Otherwise `${HOME}/.zvm_history`.
fn resolve_history_path(
    home: Option<&Path>,
    override_path: Option<&str>,
    configured: Option<&str>,
) -> Option<PathBuf> {
    let home_path = || home.map(Path::to_path_buf);

    let chosen = [override_path, configured]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty());
    if let Some(raw) = chosen {
        if raw == "~" {
            return home_path();
        }
        if let Some(rest) = raw.strip_prefix("~/") {
            return home_path().map(|home| home.join(rest));
        }
        let path = PathBuf::from(raw);
        if path.is_relative() {
            return home_path().map(|home| home.join(path));
        }
        return Some(path);
    }
    home_path().map(|home| home.join(".zvm_history"))
}

fn get_history_path(config: &ZvmConfig) -> Option<PathBuf> {
    let override_path = std::env::var(REPL_HISTORY_PATH_ENV).ok();
    resolve_history_path(
        dirs::home_dir().as_deref(),
        override_path.as_deref(),
        config.repl.history.as_deref(),
    )
}

fn print_help() {
    println!("{}", bold("Commands:"));
    println!("  {}  {}", cyan(":help, :h"), gray("Show this help"));
    println!("  {}  {}", cyan(":quit, :q"), gray("Exit the REPL"));
    println!("  {}  {}", cyan(":stack, :s"), gray("Show the stack, top first"));
    println!("  {}  {}", cyan(":locals"), gray("Show root frame locals"));
    println!("  {}  {}", cyan(":globals"), gray("Show globals"));
    println!("  {}  {}", cyan(":ops"), gray("List registered ops"));
    println!("  {}  {}", cyan(":clear, :c"), gray("Empty the stack"));
    println!();
    println!("{}", gray("Input:"));
    println!("  {}", gray("• 3, \"text\", [1, 2]: push a literal"));
    println!("  {}", gray("• {\"op\": \"+\"}: run an op with parameters"));
    println!("  {}", gray("• file:///path/proc.json: fetch and run a procedure"));
    println!("  {}", gray("• import zvm.http: import a host module"));
    println!(
        "  {}",
        gray(&format!("• History file overridable with ${}", REPL_HISTORY_PATH_ENV))
    );
}
