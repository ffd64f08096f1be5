use std::collections::HashMap;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::lua_value::{Chunk, LocVar, LuaValue};
use crate::lua_vm::opcode::{MAX_STACK, NO_JUMP};
use crate::lua_vm::{LuaError, LuaResult};

pub const MAX_LOCALS: usize = 200;
pub const MAX_UPVALUES: usize = 60;

/// Dedup key for the constant pool. Numbers key on canonical bits so
/// 1 and 1.0 share a slot.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum ConstKey {
    Nil,
    Bool(bool),
    Num(u64),
    Str(Rc<str>),
}

/// Lexical block being compiled: tracks the locals that belong to it,
/// whether any of them is captured (forcing a CLOSE on exit) and, for
/// loops, the pending break jumps.
pub struct BlockCnt {
    pub breaklist: i32,
    pub nactvar: u32,
    pub upval: bool,
    pub is_breakable: bool,
}

/// Upvalue slot of the function being compiled: either a local register
/// of the enclosing function or one of its own upvalues.
pub struct UpvalDesc {
    pub name: SmolStr,
    pub in_stack: bool,
    pub index: u32,
}

/// Per-function compile state for the single-pass code generator.
pub struct FuncState {
    pub chunk: Chunk,
    /// Enclosing function's index in the parser's state stack.
    pub prev: Option<usize>,
    pub constants_map: HashMap<ConstKey, usize, ahash::RandomState>,
    pub blocks: Vec<BlockCnt>,
    /// Chain of pending jumps to the next emitted instruction.
    pub jpc: i32,
    /// First pc that is a jump target; instruction merging must not cross it.
    pub last_target: i32,
    /// First free register.
    pub freereg: u32,
    /// Number of active local variables (== first register after them).
    pub nactvar: u32,
    /// Active locals as indices into chunk.locvars.
    pub actvar: Vec<usize>,
    pub upvalues: Vec<UpvalDesc>,
    /// Line attributed to the next emitted instruction.
    pub lastline: u32,
}

impl FuncState {
    pub fn new(source: Rc<str>, line_defined: u32) -> FuncState {
        let mut chunk = Chunk::new(source);
        chunk.line_defined = line_defined;
        FuncState {
            chunk,
            prev: None,
            constants_map: HashMap::default(),
            blocks: Vec::new(),
            jpc: NO_JUMP,
            last_target: 0,
            freereg: 0,
            nactvar: 0,
            actvar: Vec::new(),
            upvalues: Vec::new(),
            lastline: line_defined,
        }
    }

    pub fn pc(&self) -> i32 {
        self.chunk.code.len() as i32
    }

    pub fn syntax_error(&self, msg: &str) -> LuaError {
        LuaError::Syntax(format!("{}:{}: {}", self.chunk.source, self.lastline, msg))
    }

    pub fn add_constant(&mut self, key: ConstKey, value: LuaValue) -> usize {
        if let Some(&i) = self.constants_map.get(&key) {
            return i;
        }
        let i = self.chunk.constants.len();
        self.chunk.constants.push(value);
        self.constants_map.insert(key, i);
        i
    }

    pub fn string_k(&mut self, s: &str) -> usize {
        let rc: Rc<str> = Rc::from(s);
        self.add_constant(ConstKey::Str(rc.clone()), LuaValue::String(rc))
    }

    pub fn number_k(&mut self, n: f64) -> usize {
        let bits = if n == 0.0 { 0.0f64.to_bits() } else { n.to_bits() };
        self.add_constant(ConstKey::Num(bits), LuaValue::Number(n))
    }

    pub fn bool_k(&mut self, b: bool) -> usize {
        self.add_constant(ConstKey::Bool(b), LuaValue::Boolean(b))
    }

    pub fn nil_k(&mut self) -> usize {
        self.add_constant(ConstKey::Nil, LuaValue::Nil)
    }

    /// Innermost active local with this name, as a register index.
    pub fn search_var(&self, name: &str) -> Option<u32> {
        for i in (0..self.nactvar as usize).rev() {
            let lv = self.actvar[i];
            if self.chunk.locvars[lv].name == name {
                return Some(i as u32);
            }
        }
        None
    }

    /// A local at `level` is captured by an inner function; flag the
    /// owning block so leaving it emits CLOSE.
    pub fn mark_upval(&mut self, level: u32) {
        for bl in self.blocks.iter_mut().rev() {
            if bl.nactvar <= level {
                bl.upval = true;
                return;
            }
        }
    }

    pub fn new_local(&mut self, name: SmolStr) -> LuaResult<()> {
        if self.actvar.len() >= MAX_LOCALS {
            return Err(self.syntax_error("too many local variables"));
        }
        let idx = self.chunk.locvars.len();
        self.chunk.locvars.push(LocVar {
            name,
            start_pc: 0,
            end_pc: 0,
        });
        self.actvar.push(idx);
        Ok(())
    }

    /// Activate the last `n` declared locals, starting their debug scope
    /// at the current pc.
    pub fn adjust_locals(&mut self, n: u32) {
        self.nactvar += n;
        let pc = self.pc() as u32;
        for i in (self.nactvar - n)..self.nactvar {
            let lv = self.actvar[i as usize];
            self.chunk.locvars[lv].start_pc = pc;
        }
    }

    /// Deactivate locals down to `to_level`, ending their debug scope.
    pub fn remove_locals(&mut self, to_level: u32) {
        let pc = self.pc() as u32;
        while self.nactvar > to_level {
            self.nactvar -= 1;
            if let Some(lv) = self.actvar.pop() {
                self.chunk.locvars[lv].end_pc = pc;
            }
        }
    }

    pub fn check_stack(&mut self, n: u32) -> LuaResult<()> {
        let needed = self.freereg + n;
        if needed > MAX_STACK {
            return Err(self.syntax_error("function or expression too complex"));
        }
        if needed > self.chunk.max_stack as u32 {
            self.chunk.max_stack = needed as u8;
        }
        Ok(())
    }

    pub fn reserve_regs(&mut self, n: u32) -> LuaResult<()> {
        self.check_stack(n)?;
        self.freereg += n;
        Ok(())
    }
}
