pub mod call_frame;
pub mod debug;
pub mod execute;
pub mod lua_error;
pub mod metamethod;
pub mod opcode;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use smol_str::SmolStr;

use crate::lua_value::{
    Chunk, ExecState, LuaClosure, LuaFunction, LuaTable, LuaValue, ResumeTarget, TableRef,
    ThreadRef,
};

pub use call_frame::CallFrame;
pub use debug::{DebugHook, DebugInfo, HookAction, HookCallback, HookEvent};
pub use execute::{Resume, MAX_FRAMES, MAX_VALUE_STACK};
pub use lua_error::{LuaError, LuaResult};
pub use metamethod::MetaEvent;

/// Host-session state shared by the libraries: one RNG for math.random
/// and the instant os.clock measures from.
pub struct SessionContext {
    pub rng: StdRng,
    pub start: Instant,
}

impl Default for SessionContext {
    fn default() -> SessionContext {
        SessionContext {
            rng: StdRng::from_entropy(),
            start: Instant::now(),
        }
    }
}

/// Execution context parked while a resumed coroutine runs.
pub(crate) struct SavedContext {
    pub thread: Option<ThreadRef>,
    pub exec: ExecState,
    pub yieldable_at: Option<usize>,
}

/// The interpreter. Owns the globals, the running thread's execution
/// state and the stack of contexts parked by nested resumes.
pub struct LuaVM {
    pub(crate) globals: TableRef,
    pub(crate) exec: ExecState,
    /// Coroutine currently swapped in; None when the main thread runs.
    pub(crate) current: Option<ThreadRef>,
    pub(crate) saved: Vec<SavedContext>,
    /// Values a native handed to yield, waiting for the dispatch loop to
    /// act on them.
    pub(crate) pending_yield: Option<Vec<LuaValue>>,
    pub(crate) staged_resume_target: Option<ResumeTarget>,
    /// Nesting depth of dispatch loops.
    pub(crate) run_depth: usize,
    /// Depth at which a yield may legally suspend; None outside coroutines.
    pub(crate) yieldable_at: Option<usize>,
    /// First argument slot of the running native function.
    pub(crate) native_base: usize,
    pub(crate) native_name: SmolStr,
    pub(crate) hook: Option<DebugHook>,
    pub(crate) hook_count_left: u32,
    pub(crate) in_hook: bool,
    /// Shared metatable giving strings their method sugar.
    pub(crate) string_metatable: Option<TableRef>,
    pub session: SessionContext,
}

impl LuaVM {
    pub fn new() -> LuaVM {
        LuaVM {
            globals: Rc::new(RefCell::new(LuaTable::new())),
            exec: ExecState::default(),
            current: None,
            saved: Vec::new(),
            pending_yield: None,
            staged_resume_target: None,
            run_depth: 0,
            yieldable_at: None,
            native_base: 0,
            native_name: SmolStr::default(),
            hook: None,
            hook_count_left: 0,
            in_hook: false,
            string_metatable: None,
            session: SessionContext::default(),
        }
    }

    pub fn globals(&self) -> TableRef {
        self.globals.clone()
    }

    pub fn get_global(&self, name: &str) -> LuaValue {
        self.globals.borrow().get_str(name)
    }

    pub fn set_global(&mut self, name: &str, value: LuaValue) {
        self.globals.borrow_mut().set_str(name, value);
    }

    /// Expose a host function as a global.
    pub fn register_native(&mut self, name: &str, func: fn(&mut LuaVM) -> LuaResult<usize>) {
        self.set_global(name, LuaValue::native(name, func));
    }

    /// Load source text or a binary chunk (selected by the escape byte the
    /// dump format starts with) into a callable closure.
    pub fn load(&mut self, data: &[u8], chunk_name: &str) -> LuaResult<LuaValue> {
        let chunk = if data.first() == Some(&0x1b) {
            crate::lua_value::chunk_loader::load_chunk(data, chunk_name)?
        } else {
            let text = std::str::from_utf8(data)
                .map_err(|_| LuaError::Syntax("source is not valid UTF-8".to_string()))?;
            crate::compiler::compile(text, chunk_name)?
        };
        Ok(self.make_closure(chunk))
    }

    /// Wrap a top-level prototype in a closure over the current globals.
    pub fn make_closure(&self, chunk: Rc<Chunk>) -> LuaValue {
        LuaValue::Function(LuaFunction::Closure(Rc::new(LuaClosure {
            proto: chunk,
            upvalues: Vec::new(),
            env: RefCell::new(self.globals.clone()),
        })))
    }

    pub fn execute_string(&mut self, text: &str) -> LuaResult<Vec<LuaValue>> {
        self.execute_named(text, "input")
    }

    pub fn execute_named(&mut self, text: &str, chunk_name: &str) -> LuaResult<Vec<LuaValue>> {
        let chunk = crate::compiler::compile(text, chunk_name)?;
        self.execute_chunk(chunk)
    }

    pub fn execute_chunk(&mut self, chunk: Rc<Chunk>) -> LuaResult<Vec<LuaValue>> {
        let f = self.make_closure(chunk);
        self.call_value(&f, &[])
    }

    /// Serialize a Lua function's prototype to the binary chunk format.
    pub fn dump_function(&self, f: &LuaValue, strip: bool) -> LuaResult<Vec<u8>> {
        match f {
            LuaValue::Function(LuaFunction::Closure(c)) => {
                Ok(crate::lua_value::dump_chunk(&c.proto, strip))
            }
            _ => Err(LuaError::runtime("unable to dump given function")),
        }
    }

    /// Install or clear the debug hook.
    pub fn set_hook(&mut self, hook: Option<DebugHook>) {
        self.hook_count_left = hook.as_ref().map(|h| h.count).unwrap_or(0);
        self.hook = hook;
    }

    /// The coroutine currently running, if any.
    pub fn current_thread(&self) -> Option<ThreadRef> {
        self.current.clone()
    }

    /// Hand values to the pending yield. Only meaningful inside a native
    /// called from a coroutine; the dispatch loop suspends right after the
    /// native returns.
    pub fn yield_values(&mut self, values: Vec<LuaValue>) {
        self.pending_yield = Some(values);
    }

    // ---- native-call argument helpers -------------------------------

    /// Number of arguments the running native received. Read it before
    /// pushing results; pushes land above the arguments.
    pub fn arg_count(&self) -> usize {
        self.exec.top.saturating_sub(self.native_base)
    }

    /// Argument by 1-based position, nil when absent.
    pub fn arg(&self, i: usize) -> LuaValue {
        debug_assert!(i >= 1);
        let slot = self.native_base + i - 1;
        if slot < self.exec.top {
            self.sget(slot)
        } else {
            LuaValue::Nil
        }
    }

    /// Push one result for the running native.
    pub fn push(&mut self, v: LuaValue) -> LuaResult<()> {
        let top = self.exec.top;
        self.ensure_stack(top + 1)?;
        self.sset(top, v);
        self.exec.top = top + 1;
        Ok(())
    }

    pub fn arg_error(&self, i: usize, msg: &str) -> LuaError {
        self.rt_error(format!(
            "bad argument #{} to '{}' ({})",
            i, self.native_name, msg
        ))
    }

    fn type_mismatch(&self, i: usize, expected: &str) -> LuaError {
        let got = self.arg(i);
        let got = if got.is_nil() && i > self.arg_count() {
            "no value".to_string()
        } else {
            got.type_name().to_string()
        };
        self.arg_error(i, &format!("{} expected, got {}", expected, got))
    }

    pub fn check_number(&self, i: usize) -> LuaResult<f64> {
        self.arg(i)
            .coerce_number()
            .ok_or_else(|| self.type_mismatch(i, "number"))
    }

    pub fn check_integer(&self, i: usize) -> LuaResult<i64> {
        Ok(self.check_number(i)? as i64)
    }

    pub fn opt_number(&self, i: usize, default: f64) -> LuaResult<f64> {
        if self.arg(i).is_nil() {
            Ok(default)
        } else {
            self.check_number(i)
        }
    }

    pub fn check_str(&self, i: usize) -> LuaResult<String> {
        match self.arg(i) {
            LuaValue::String(s) => Ok(s.to_string()),
            LuaValue::Number(n) => Ok(crate::lua_value::number_to_string(n)),
            _ => Err(self.type_mismatch(i, "string")),
        }
    }

    pub fn opt_str(&self, i: usize, default: &str) -> LuaResult<String> {
        if self.arg(i).is_nil() {
            Ok(default.to_string())
        } else {
            self.check_str(i)
        }
    }

    pub fn check_table(&self, i: usize) -> LuaResult<TableRef> {
        self.arg(i)
            .as_table()
            .cloned()
            .ok_or_else(|| self.type_mismatch(i, "table"))
    }

    pub fn check_function(&self, i: usize) -> LuaResult<LuaValue> {
        let v = self.arg(i);
        match v {
            LuaValue::Function(_) => Ok(v),
            _ => Err(self.type_mismatch(i, "function")),
        }
    }

    pub fn check_thread(&self, i: usize) -> LuaResult<ThreadRef> {
        self.arg(i)
            .as_thread()
            .cloned()
            .ok_or_else(|| self.type_mismatch(i, "coroutine"))
    }

    pub(crate) fn set_string_metatable(&mut self, mt: TableRef) {
        self.string_metatable = Some(mt);
    }
}

impl Default for LuaVM {
    fn default() -> LuaVM {
        LuaVM::new()
    }
}
