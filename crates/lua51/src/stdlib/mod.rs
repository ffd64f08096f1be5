pub mod basic;
pub mod coroutine;
pub mod math;
pub mod os;
pub mod string;
pub mod table;

use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::{LuaResult, LuaVM};

pub(crate) fn set_native(t: &mut LuaTable, name: &str, f: fn(&mut LuaVM) -> LuaResult<usize>) {
    t.set_str(name, LuaValue::native(name, f));
}
