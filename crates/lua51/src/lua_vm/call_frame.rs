use std::rc::Rc;

use crate::lua_value::LuaClosure;

/// Activation record for one Lua function. `base` is the first register;
/// for vararg functions the extra arguments live just below `base`.
pub struct CallFrame {
    pub closure: Rc<LuaClosure>,
    /// Stack slot holding the function value itself.
    pub func_slot: usize,
    /// First register of this frame.
    pub base: usize,
    pub pc: usize,
    /// Results expected by the caller; -1 means "all of them".
    pub want: i32,
    /// Extra arguments available to VARARG.
    pub num_varargs: usize,
    /// Tail calls collapsed into this frame (for tracebacks).
    pub tail_calls: u32,
    /// Last line reported to the line hook.
    pub hook_line: u32,
}

impl CallFrame {
    pub fn new(closure: Rc<LuaClosure>, func_slot: usize, base: usize, want: i32) -> CallFrame {
        CallFrame {
            closure,
            func_slot,
            base,
            pc: 0,
            want,
            num_varargs: 0,
            tail_calls: 0,
            hook_line: 0,
        }
    }
}
