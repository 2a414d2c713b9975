//! Structured control flow. All of it works by moving the current frame's
//! program counter; the dispatcher increments it after every op.

use crate::error::{Result, VmError};
use crate::frame::Frame;
use crate::registry::Registry;
use crate::value::truthy;

pub(super) fn install(registry: &mut Registry) {
    registry.op("begin", |state, params| {
        state.no_params(&params)?;
        let frame = state.frame_mut();
        frame.begins.push(frame.pc);
        Ok(())
    });

    registry.op("repeat", |state, params| {
        state.no_params(&params)?;
        let frame = state.frame_mut();
        frame.pc = *frame.begins.last().ok_or(VmError::RepeatWithoutBegin)?;
        Ok(())
    });

    registry.op("break", |state, params| {
        state.no_params(&params)?;
        exit_loop(state.frame_mut())
    });

    registry.op("while", |state, params| {
        state.no_params(&params)?;
        if truthy(&state.pop()?) {
            Ok(())
        } else {
            exit_loop(state.frame_mut())
        }
    });

    registry.op("if", |state, params| {
        state.no_params(&params)?;
        if truthy(&state.pop()?) {
            return Ok(());
        }
        let frame = state.frame_mut();
        let mut nested = 0usize;
        for (pc, name) in ops_after(frame) {
            match name.as_str() {
                "if" => nested += 1,
                "else" | "endif" if nested == 0 => {
                    frame.pc = pc;
                    return Ok(());
                }
                "endif" => nested -= 1,
                _ => {}
            }
        }
        Err(VmError::Unterminated("if"))
    });

    registry.op("else", |state, params| {
        state.no_params(&params)?;
        let frame = state.frame_mut();
        let mut nested = 0usize;
        for (pc, name) in ops_after(frame) {
            match name.as_str() {
                "if" => nested += 1,
                "else" if nested == 0 => return Err(VmError::UnboundElse),
                "endif" if nested == 0 => {
                    frame.pc = pc;
                    return Ok(());
                }
                "endif" => nested -= 1,
                _ => {}
            }
        }
        Err(VmError::Unterminated("if"))
    });

    registry.op("endif", |state, params| state.no_params(&params));

    registry.op("recurse", |state, params| {
        state.no_params(&params)?;
        let frame = state.frame_mut();
        frame.begins.clear();
        frame.pc = -1;
        Ok(())
    });
}

/// Jump to the `repeat` closing the innermost open loop and close it.
fn exit_loop(frame: &mut Frame) -> Result<()> {
    let mut nested = 0usize;
    for (pc, name) in ops_after(frame) {
        match name.as_str() {
            "begin" => nested += 1,
            "repeat" if nested == 0 => {
                frame.pc = pc;
                frame.begins.pop();
                return Ok(());
            }
            "repeat" => nested -= 1,
            _ => {}
        }
    }
    Err(VmError::Unterminated("begin"))
}

/// Names of the op invocations after the current one, with their
/// positions. Literals are skipped.
fn ops_after(frame: &Frame) -> Vec<(isize, String)> {
    let start = usize::try_from(frame.pc + 1).unwrap_or(0);
    frame
        .ops
        .iter()
        .enumerate()
        .skip(start)
        .filter_map(|(pc, op)| {
            let name = op.as_object()?.get("op")?.as_str()?;
            Some((isize::try_from(pc).ok()?, name.to_string()))
        })
        .collect()
}
