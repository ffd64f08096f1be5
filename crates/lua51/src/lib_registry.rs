//! Registration point for the standard library. Each library is an
//! external collaborator that installs its globals through the public VM
//! surface; the engine core never depends on any of them.

use crate::lua_vm::LuaVM;
use crate::stdlib;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stdlib {
    All,
    Base,
    Coroutine,
    String,
    Math,
    Table,
    Os,
}

impl LuaVM {
    pub fn open_stdlib(&mut self, which: Stdlib) {
        match which {
            Stdlib::All => {
                stdlib::basic::open(self);
                stdlib::coroutine::open(self);
                stdlib::string::open(self);
                stdlib::math::open(self);
                stdlib::table::open(self);
                stdlib::os::open(self);
            }
            Stdlib::Base => stdlib::basic::open(self),
            Stdlib::Coroutine => stdlib::coroutine::open(self),
            Stdlib::String => stdlib::string::open(self),
            Stdlib::Math => stdlib::math::open(self),
            Stdlib::Table => stdlib::table::open(self),
            Stdlib::Os => stdlib::os::open(self),
        }
    }
}

/// Open everything.
pub fn open_stdlib(vm: &mut LuaVM) {
    vm.open_stdlib(Stdlib::All);
}
