use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::lua_value::{Chunk, LuaTable, LuaThread};
use crate::lua_vm::{LuaResult, LuaVM};

pub type TableRef = Rc<RefCell<LuaTable>>;
pub type ThreadRef = Rc<RefCell<LuaThread>>;
pub type UpvalueRef = Rc<RefCell<Upvalue>>;
/// One thread's value stack; shared with the open upvalues pointing
/// into it so they stay valid across coroutine switches.
pub type StackRef = Rc<RefCell<Vec<LuaValue>>>;

/// A value slot captured by one or more closures. While the defining
/// frame is live the cell points into its thread's value stack; closing
/// it snapshots the value. All closures sharing the variable share the
/// cell.
pub enum Upvalue {
    Open { stack: StackRef, slot: usize },
    Closed(LuaValue),
}

impl Upvalue {
    pub fn get(&self) -> LuaValue {
        match self {
            Upvalue::Open { stack, slot } => stack.borrow()[*slot].clone(),
            Upvalue::Closed(v) => v.clone(),
        }
    }

    pub fn set(&mut self, v: LuaValue) {
        match self {
            Upvalue::Open { stack, slot } => stack.borrow_mut()[*slot] = v,
            Upvalue::Closed(slot) => *slot = v,
        }
    }
}

#[derive(Clone)]
pub enum LuaValue {
    Nil,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Table(TableRef),
    Function(LuaFunction),
    Userdata(Rc<LuaUserdata>),
    Thread(ThreadRef),
}

#[derive(Clone)]
pub enum LuaFunction {
    Closure(Rc<LuaClosure>),
    Native(NativeFunction),
}

/// Host function callable from Lua. Arguments sit at 1-based positions in
/// the current native frame; the function pushes its results and returns
/// how many it pushed.
pub type NativeCallback = Rc<dyn Fn(&mut LuaVM) -> LuaResult<usize>>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: SmolStr,
    pub func: NativeCallback,
}

impl NativeFunction {
    pub fn new(name: &str, func: fn(&mut LuaVM) -> LuaResult<usize>) -> NativeFunction {
        NativeFunction {
            name: SmolStr::new(name),
            func: Rc::new(func),
        }
    }

    pub fn from_callback(name: &str, func: NativeCallback) -> NativeFunction {
        NativeFunction {
            name: SmolStr::new(name),
            func,
        }
    }
}

pub struct LuaClosure {
    pub proto: Rc<Chunk>,
    pub upvalues: Vec<UpvalueRef>,
    /// Environment table used by GETGLOBAL/SETGLOBAL; replaceable via setfenv.
    pub env: RefCell<TableRef>,
}

pub struct LuaUserdata {
    pub data: RefCell<Box<dyn Any>>,
    pub metatable: RefCell<Option<TableRef>>,
}

impl LuaValue {
    pub fn from_string(s: impl Into<String>) -> LuaValue {
        LuaValue::String(Rc::from(s.into().as_str()))
    }

    pub fn from_table(t: LuaTable) -> LuaValue {
        LuaValue::Table(Rc::new(RefCell::new(t)))
    }

    pub fn native(name: &str, func: fn(&mut LuaVM) -> LuaResult<usize>) -> LuaValue {
        LuaValue::Function(LuaFunction::Native(NativeFunction::new(name, func)))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, LuaValue::Nil)
    }

    /// Everything except nil and false is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, LuaValue::Nil | LuaValue::Boolean(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            LuaValue::Nil => "nil",
            LuaValue::Boolean(_) => "boolean",
            LuaValue::Number(_) => "number",
            LuaValue::String(_) => "string",
            LuaValue::Table(_) => "table",
            LuaValue::Function(_) => "function",
            LuaValue::Userdata(_) => "userdata",
            LuaValue::Thread(_) => "thread",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            LuaValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Number with string coercion, as arithmetic sees operands.
    pub fn coerce_number(&self) -> Option<f64> {
        match self {
            LuaValue::Number(n) => Some(*n),
            LuaValue::String(s) => str_to_number(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            LuaValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            LuaValue::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_thread(&self) -> Option<&ThreadRef> {
        match self {
            LuaValue::Thread(t) => Some(t),
            _ => None,
        }
    }

    /// tostring without metamethods; used by error formatting and print's
    /// fallback path.
    pub fn display_string(&self) -> String {
        match self {
            LuaValue::Nil => "nil".to_string(),
            LuaValue::Boolean(b) => b.to_string(),
            LuaValue::Number(n) => number_to_string(*n),
            LuaValue::String(s) => s.to_string(),
            LuaValue::Table(t) => format!("table: {:p}", Rc::as_ptr(t)),
            LuaValue::Function(LuaFunction::Closure(c)) => {
                format!("function: {:p}", Rc::as_ptr(c))
            }
            LuaValue::Function(LuaFunction::Native(n)) => {
                format!("function: builtin {:p}", Rc::as_ptr(&n.func))
            }
            LuaValue::Userdata(u) => format!("userdata: {:p}", Rc::as_ptr(u)),
            LuaValue::Thread(t) => format!("thread: {:p}", Rc::as_ptr(t)),
        }
    }
}

impl Default for LuaValue {
    fn default() -> LuaValue {
        LuaValue::Nil
    }
}

impl PartialEq for LuaValue {
    fn eq(&self, other: &LuaValue) -> bool {
        match (self, other) {
            (LuaValue::Nil, LuaValue::Nil) => true,
            (LuaValue::Boolean(a), LuaValue::Boolean(b)) => a == b,
            (LuaValue::Number(a), LuaValue::Number(b)) => a == b,
            (LuaValue::String(a), LuaValue::String(b)) => a == b,
            (LuaValue::Table(a), LuaValue::Table(b)) => Rc::ptr_eq(a, b),
            (LuaValue::Function(a), LuaValue::Function(b)) => a == b,
            (LuaValue::Userdata(a), LuaValue::Userdata(b)) => Rc::ptr_eq(a, b),
            (LuaValue::Thread(a), LuaValue::Thread(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for LuaFunction {
    fn eq(&self, other: &LuaFunction) -> bool {
        match (self, other) {
            (LuaFunction::Closure(a), LuaFunction::Closure(b)) => Rc::ptr_eq(a, b),
            (LuaFunction::Native(a), LuaFunction::Native(b)) => Rc::ptr_eq(&a.func, &b.func),
            _ => false,
        }
    }
}

impl std::fmt::Debug for LuaValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_string())
    }
}

/// Render a number the way Lua prints it: integral values without a
/// fractional part, everything else through the shortest float form.
pub fn number_to_string(n: f64) -> String {
    if n.is_finite() && n.floor() == n && n.abs() < 1e15 {
        let mut buf = itoa::Buffer::new();
        buf.format(n as i64).to_string()
    } else if n.is_nan() {
        "nan".to_string()
    } else if n == f64::INFINITY {
        "inf".to_string()
    } else if n == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{:.14}", n)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

/// Parse a string as a Lua number: optional surrounding space, optional
/// sign, decimal or `0x` hexadecimal.
pub fn str_to_number(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    let (neg, body) = match t.as_bytes()[0] {
        b'-' => (true, &t[1..]),
        b'+' => (false, &t[1..]),
        _ => (false, t),
    };
    let n = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        if hex.is_empty() {
            return None;
        }
        u64::from_str_radix(hex, 16).ok()? as f64
    } else {
        body.parse::<f64>().ok()?
    };
    Some(if neg { -n } else { n })
}
