pub mod chunk;
pub mod chunk_dumper;
pub mod chunk_loader;
pub mod lua_table;
pub mod lua_thread;
#[allow(clippy::module_inception)]
pub mod lua_value;

pub use chunk::{Chunk, LocVar};
pub use chunk_dumper::dump_chunk;
pub use chunk_loader::load_chunk;
pub use lua_table::{LuaKey, LuaTable};
pub use lua_thread::{CoroutineStatus, ExecState, LuaThread, ResumeTarget};
pub use lua_value::{
    number_to_string, str_to_number, LuaClosure, LuaFunction, LuaUserdata, LuaValue,
    NativeCallback, NativeFunction, StackRef, TableRef, ThreadRef, Upvalue, UpvalueRef,
};
