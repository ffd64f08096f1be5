use std::rc::Rc;

use smol_str::SmolStr;

use crate::lua_vm::opcode::Instruction;
use crate::lua_value::LuaValue;

/// Debug record for one local variable: which pc range it is live over.
#[derive(Debug, Clone)]
pub struct LocVar {
    pub name: SmolStr,
    pub start_pc: u32,
    pub end_pc: u32,
}

/// Compiled function prototype. Produced by the compiler or the binary
/// chunk loader, immutable afterwards and shared behind `Rc` by every
/// closure instantiated from it.
pub struct Chunk {
    pub code: Vec<Instruction>,
    pub constants: Vec<LuaValue>,
    pub protos: Vec<Rc<Chunk>>,
    pub num_params: u8,
    pub is_vararg: bool,
    pub max_stack: u8,
    pub nups: u8,
    pub source: Rc<str>,
    pub line_defined: u32,
    pub last_line_defined: u32,
    // debug info; empty when stripped
    pub line_info: Vec<u32>,
    pub locvars: Vec<LocVar>,
    pub upvalue_names: Vec<SmolStr>,
}

impl Chunk {
    pub fn new(source: Rc<str>) -> Chunk {
        Chunk {
            code: Vec::new(),
            constants: Vec::new(),
            protos: Vec::new(),
            num_params: 0,
            is_vararg: false,
            max_stack: 2,
            nups: 0,
            source,
            line_defined: 0,
            last_line_defined: 0,
            line_info: Vec::new(),
            locvars: Vec::new(),
            upvalue_names: Vec::new(),
        }
    }

    /// Source line for a pc, 0 when debug info was stripped.
    pub fn line_at(&self, pc: usize) -> u32 {
        self.line_info.get(pc).copied().unwrap_or(0)
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<chunk {} ({}-{}) {} instrs, {} consts, {} protos>",
            self.source,
            self.line_defined,
            self.last_line_defined,
            self.code.len(),
            self.constants.len(),
            self.protos.len()
        )
    }
}
