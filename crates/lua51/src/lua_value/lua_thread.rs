use std::cell::RefCell;
use std::rc::Rc;

use crate::lua_value::{LuaValue, StackRef, UpvalueRef};
use crate::lua_vm::CallFrame;

/// Observable coroutine status. `Initial` is a coroutine that was created
/// but never resumed; Lua reports it as "suspended".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineStatus {
    Initial,
    Suspended,
    Running,
    /// Resumed some other coroutine and is waiting for it.
    Normal,
    Dead,
}

impl CoroutineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CoroutineStatus::Initial | CoroutineStatus::Suspended => "suspended",
            CoroutineStatus::Running => "running",
            CoroutineStatus::Normal => "normal",
            CoroutineStatus::Dead => "dead",
        }
    }
}

/// Execution state owned by one coroutine (or by the main thread while it
/// is parked inside a resume): value stack, frame stack, logical top and
/// the open upvalues pointing into that stack.
pub struct ExecState {
    pub stack: StackRef,
    pub frames: Vec<CallFrame>,
    pub top: usize,
    pub open_upvalues: Vec<UpvalueRef>,
}

impl Default for ExecState {
    fn default() -> ExecState {
        ExecState {
            stack: Rc::new(RefCell::new(Vec::new())),
            frames: Vec::new(),
            top: 0,
            open_upvalues: Vec::new(),
        }
    }
}

/// Where a suspended coroutine must deposit the values the next resume
/// supplies: the register of the CALL that yielded and how many results
/// that call site expects. Absent for a hook-requested yield.
#[derive(Debug, Clone, Copy)]
pub struct ResumeTarget {
    pub result_slot: usize,
    pub want: i32,
}

pub struct LuaThread {
    pub status: CoroutineStatus,
    /// Body function; consumed by the first resume.
    pub entry: Option<LuaValue>,
    /// Saved execution state while not running.
    pub exec: ExecState,
    pub resume_target: Option<ResumeTarget>,
}

impl LuaThread {
    pub fn new(entry: LuaValue) -> LuaThread {
        LuaThread {
            status: CoroutineStatus::Initial,
            entry: Some(entry),
            exec: ExecState::default(),
            resume_target: None,
        }
    }
}
