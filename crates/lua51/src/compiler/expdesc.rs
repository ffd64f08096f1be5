use crate::lua_vm::opcode::NO_JUMP;

/// What an expression currently denotes while code is being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpKind {
    /// No value (empty expression list)
    Void,
    Nil,
    True,
    False,
    /// Constant-pool entry; `info` is the index
    K,
    /// Numeric literal not yet in the pool; value in `nval`
    KNum,
    /// Local variable; `info` is the register
    Local,
    /// Upvalue; `info` is the upvalue index
    Upval,
    /// Global; `info` is the constant index of the name
    Global,
    /// Table access; `info` is the table register, `aux` the key RK
    Indexed,
    /// Result of a comparison; `info` is the pc of the pending JMP
    Jump,
    /// Instruction whose destination register is still open; `info` is
    /// its pc
    Reloc,
    /// Value already in a fixed register `info`
    NonReloc,
    /// Open call; `info` is the pc of the CALL
    Call,
    /// Open vararg; `info` is the pc of the VARARG
    Vararg,
}

/// Expression descriptor threaded through the single-pass code
/// generator. `t`/`f` are patch lists of jumps taken when the expression
/// is true/false.
#[derive(Debug, Clone, Copy)]
pub struct ExpDesc {
    pub kind: ExpKind,
    pub info: i32,
    pub aux: i32,
    pub nval: f64,
    pub t: i32,
    pub f: i32,
}

impl ExpDesc {
    pub fn new(kind: ExpKind, info: i32) -> ExpDesc {
        ExpDesc {
            kind,
            info,
            aux: 0,
            nval: 0.0,
            t: NO_JUMP,
            f: NO_JUMP,
        }
    }

    pub fn number(n: f64) -> ExpDesc {
        let mut e = ExpDesc::new(ExpKind::KNum, 0);
        e.nval = n;
        e
    }

    pub fn void() -> ExpDesc {
        ExpDesc::new(ExpKind::Void, 0)
    }

    pub fn has_jumps(&self) -> bool {
        self.t != self.f
    }

    /// Numeric literal with no pending control flow; candidate for
    /// constant folding.
    pub fn is_numeral(&self) -> bool {
        self.kind == ExpKind::KNum && self.t == NO_JUMP && self.f == NO_JUMP
    }

    /// Expression kinds that can produce a variable number of values.
    pub fn has_multret(&self) -> bool {
        matches!(self.kind, ExpKind::Call | ExpKind::Vararg)
    }
}
