use std::rc::Rc;

use crate::lua_vm::{LuaResult, LuaVM};

/// What triggered the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    Call,
    Return,
    Line,
    Count,
}

/// What the hook wants the interpreter to do next. `Yield` suspends the
/// running coroutine before the pending instruction executes, so the
/// instruction re-runs on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Continue,
    Yield,
}

/// Snapshot handed to the hook callback.
pub struct DebugInfo {
    pub event: HookEvent,
    pub line: u32,
    pub source: String,
    /// "main" for the top-level chunk, "Lua" for everything else.
    pub what: &'static str,
}

pub type HookCallback = Rc<dyn Fn(&mut LuaVM, &DebugInfo) -> LuaResult<HookAction>>;

/// Installed hook plus its event mask. `count` of zero disables the
/// count event.
#[derive(Clone)]
pub struct DebugHook {
    pub func: HookCallback,
    pub on_call: bool,
    pub on_return: bool,
    pub on_line: bool,
    pub count: u32,
}

impl DebugHook {
    pub fn new(func: HookCallback) -> DebugHook {
        DebugHook {
            func,
            on_call: false,
            on_return: false,
            on_line: false,
            count: 0,
        }
    }
}
