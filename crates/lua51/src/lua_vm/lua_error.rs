use crate::lua_value::LuaValue;

/// Engine error. Runtime errors carry an arbitrary Lua value (usually a
/// string decorated with `source:line:`), everything else carries a
/// preformatted message.
#[derive(Debug, Clone)]
pub enum LuaError {
    /// Lexical error from the tokenizer
    Lex(String),
    /// Syntax error from the parser/code generator
    Syntax(String),
    /// Runtime error; the payload is the Lua error value
    Runtime(LuaValue),
    /// Malformed binary chunk
    BadChunk(String),
    /// Value-stack or call-stack exhaustion
    StackOverflow,
}

pub type LuaResult<T> = Result<T, LuaError>;

impl LuaError {
    pub fn runtime(msg: impl Into<String>) -> LuaError {
        LuaError::Runtime(LuaValue::from_string(msg.into()))
    }

    /// The error value handed to a protected caller.
    pub fn value(&self) -> LuaValue {
        match self {
            LuaError::Runtime(v) => v.clone(),
            LuaError::Lex(m) | LuaError::Syntax(m) | LuaError::BadChunk(m) => {
                LuaValue::from_string(m.clone())
            }
            LuaError::StackOverflow => LuaValue::from_string("stack overflow".to_string()),
        }
    }

    /// Printable message (for hosts and test diagnostics).
    pub fn message(&self) -> String {
        match self {
            LuaError::Runtime(v) => v.display_string(),
            LuaError::Lex(m) | LuaError::Syntax(m) | LuaError::BadChunk(m) => m.clone(),
            LuaError::StackOverflow => "stack overflow".to_string(),
        }
    }
}

impl std::fmt::Display for LuaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}
