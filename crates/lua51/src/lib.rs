//! A Lua 5.1 engine: lexer, single-pass compiler, register VM,
//! coroutines and the standard library.

pub mod compiler;
pub mod lib_registry;
pub mod lua_value;
pub mod lua_vm;
pub mod stdlib;

#[cfg(test)]
mod test;

pub use lib_registry::{open_stdlib, Stdlib};
pub use lua_value::{
    dump_chunk, load_chunk, Chunk, LuaFunction, LuaTable, LuaThread, LuaValue, NativeFunction,
};
pub use lua_vm::{
    DebugHook, DebugInfo, HookAction, HookEvent, LuaError, LuaResult, LuaVM, Resume,
};
