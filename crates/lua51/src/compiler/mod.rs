// Single-pass compiler: source text in, prototype out.

pub mod code;
pub mod expdesc;
pub mod func_state;
pub mod lexer;
pub mod parser;

use std::rc::Rc;

use crate::lua_value::Chunk;
use crate::lua_vm::LuaResult;

/// Compile Lua source into a prototype. Any error aborts the whole
/// compile; no partial prototype escapes.
pub fn compile(text: &str, chunk_name: &str) -> LuaResult<Rc<Chunk>> {
    parser::parse(text, chunk_name)
}
