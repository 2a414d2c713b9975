//! Execution trace events and the console trace line.

use chrono::TimeDelta;

/// Type alias for debug callback to simplify type signatures
pub type DebugCallback = Option<Box<dyn FnMut(&TraceEvent)>>;

/// Receives console trace lines in place of stdout.
pub type ConsoleWriter = Option<Box<dyn FnMut(&str)>>;

/// Events emitted during VM execution, for step-through debugging and tracing.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    /// About to dispatch `op` (or `put` for a literal) at `pc`.
    Step {
        frame: String,
        depth: usize,
        pc: isize,
        stack_len: usize,
        op: String,
        elapsed: TimeDelta,
    },
    /// A composite op pushed a child frame.
    Enter { frame: String, depth: usize },
    /// The child frame returned normally.
    Exit { frame: String, depth: usize },
}

impl TraceEvent {
    /// The console form of a `Step` event; other events have none.
    pub fn console_line(&self) -> Option<String> {
        match self {
            TraceEvent::Step {
                depth,
                pc,
                stack_len,
                op,
                elapsed,
                ..
            } => {
                let lpad = "  ".repeat(*depth);
                let rpad = " ".repeat(10usize.saturating_sub(lpad.len()));
                let pc = format!("{pc:02}");
                let pc = &pc[pc.len().saturating_sub(2)..];
                let op: String = op.chars().take(14).collect();
                Some(format!(
                    "{lpad}{pc}{rpad} {stack_len:3} {op:14}{:>18}",
                    format_elapsed(*elapsed)
                ))
            }
            _ => None,
        }
    }
}

/// `HhMMmSS.sssSs`, omitting leading zero components.
pub fn format_elapsed(elapsed: TimeDelta) -> String {
    let total = elapsed.num_milliseconds().max(0) as f64 / 1000.0;
    let hours = (total / 3600.0) as u64;
    let minutes = (total / 60.0) as u64 % 60;
    let seconds = total % 60.0;
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes:>2}m"));
    }
    let secs = format!("{seconds:>6.3}");
    out.push_str(&secs[..secs.len().min(6)]);
    out.push('s');
    out
}
