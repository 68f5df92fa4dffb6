//! Per-invocation execution budget
//!
//! A VM hook fires every `hook_interval` instructions and aborts the call once
//! the instruction count or the wall-clock limit is exceeded. Once tripped the
//! hook is re-armed to fail on every instruction, so a script that swallows the
//! error with `pcall` fails again on the first instruction after the `pcall`
//! returns, and the call is still reported as a timeout.
//!
//! Time spent inside C library functions is invisible to the hook; the
//! sandbox bounds those separately.

use crate::config::ScriptingConfig;
use mlua::{HookTriggers, Lua, VmState};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Limits applied to one script call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptBudget {
    /// Instructions the call may execute
    pub max_instructions: u64,
    /// Instructions between checks
    pub hook_interval: u32,
    /// Optional wall-clock limit
    pub max_wall_time: Option<Duration>,
}

impl From<&ScriptingConfig> for ScriptBudget {
    fn from(config: &ScriptingConfig) -> Self {
        Self {
            max_instructions: config.max_instructions,
            hook_interval: config.hook_interval.max(1),
            max_wall_time: config.max_wall_time_ms.map(Duration::from_millis),
        }
    }
}

/// Which limit a call ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhausted {
    /// Instruction count
    Instructions(u64),
    /// Wall time
    WallTime(Duration),
}

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instructions(limit) => write!(f, "instruction budget of {limit} exceeded"),
            Self::WallTime(limit) => write!(f, "wall-time budget of {}ms exceeded", limit.as_millis()),
        }
    }
}

/// How a budgeted call failed
#[derive(Debug)]
pub enum CallFailure {
    /// The script raised an error
    Lua(mlua::Error),
    /// The budget ran out (whether or not the script caught it)
    Exhausted(Exhausted),
}

/// Run `f` with the budget hook installed
pub fn call_with_budget<R>(
    lua: &Lua,
    budget: ScriptBudget,
    f: impl FnOnce() -> mlua::Result<R>,
) -> Result<R, CallFailure> {
    let tripped: Rc<Cell<Option<Exhausted>>> = Rc::new(Cell::new(None));
    let executed = Rc::new(Cell::new(0u64));
    let started = Instant::now();
    let interval = budget.hook_interval.max(1);

    let hook_tripped = Rc::clone(&tripped);
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(interval),
        move |lua, _debug| {
            let count = executed.get().saturating_add(u64::from(interval));
            executed.set(count);

            let reason = if count > budget.max_instructions {
                Some(Exhausted::Instructions(budget.max_instructions))
            } else {
                budget
                    .max_wall_time
                    .filter(|limit| started.elapsed() >= *limit)
                    .map(Exhausted::WallTime)
            };
            match reason {
                Some(reason) => {
                    hook_tripped.set(Some(reason));
                    lua.set_hook(HookTriggers::new().every_nth_instruction(1), move |_, _| {
                        Err(mlua::Error::RuntimeError(reason.to_string()))
                    });
                    Err(mlua::Error::RuntimeError(reason.to_string()))
                }
                None => Ok(VmState::Continue),
            }
        },
    );
    let result = f();
    lua.remove_hook();

    match (tripped.get(), result) {
        (Some(reason), _) => Err(CallFailure::Exhausted(reason)),
        (None, Ok(value)) => Ok(value),
        (None, Err(e)) => Err(CallFailure::Lua(e)),
    }
}
