// Lua 5.1 instruction set.
//
// Instructions are 32 bits wide:
//   op: bits 0..6    A: bits 6..14    C: bits 14..23    B: bits 23..32
//   Bx = B..C merged (bits 14..32, 18 bits), sBx = Bx biased by 131071.
// B and C operands of many instructions are RK values: if bit 8 (256) is
// set, the operand indexes the constant pool instead of a register.

pub const SIZE_OP: u32 = 6;
pub const SIZE_A: u32 = 8;
pub const SIZE_B: u32 = 9;
pub const SIZE_C: u32 = 9;
pub const SIZE_BX: u32 = SIZE_B + SIZE_C;

pub const POS_OP: u32 = 0;
pub const POS_A: u32 = POS_OP + SIZE_OP;
pub const POS_C: u32 = POS_A + SIZE_A;
pub const POS_B: u32 = POS_C + SIZE_C;
pub const POS_BX: u32 = POS_C;

pub const MAXARG_A: u32 = (1 << SIZE_A) - 1;
pub const MAXARG_B: u32 = (1 << SIZE_B) - 1;
pub const MAXARG_C: u32 = (1 << SIZE_C) - 1;
pub const MAXARG_BX: u32 = (1 << SIZE_BX) - 1;
pub const MAXARG_SBX: i32 = (MAXARG_BX >> 1) as i32;

/// Constant marker bit for RK operands.
pub const BIT_RK: u32 = 1 << (SIZE_B - 1);
/// Largest constant index an RK operand can carry.
pub const MAX_INDEX_RK: u32 = BIT_RK - 1;

/// Invalid register marker used while threading TESTSET patch lists.
pub const NO_REG: u32 = MAXARG_A;

/// Empty jump-list marker.
pub const NO_JUMP: i32 = -1;

/// Elements per SETLIST batch.
pub const FIELDS_PER_FLUSH: u32 = 50;

/// Registers available to a single function.
pub const MAX_STACK: u32 = 250;

#[inline]
pub const fn is_k(x: u32) -> bool {
    x & BIT_RK != 0
}

#[inline]
pub const fn index_k(x: u32) -> usize {
    (x & !BIT_RK) as usize
}

#[inline]
pub const fn rk_as_k(x: u32) -> u32 {
    x | BIT_RK
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Move = 0,
    LoadK = 1,
    LoadBool = 2,
    LoadNil = 3,
    GetUpval = 4,
    GetGlobal = 5,
    GetTable = 6,
    SetGlobal = 7,
    SetUpval = 8,
    SetTable = 9,
    NewTable = 10,
    SelfCall = 11,
    Add = 12,
    Sub = 13,
    Mul = 14,
    Div = 15,
    Mod = 16,
    Pow = 17,
    Unm = 18,
    Not = 19,
    Len = 20,
    Concat = 21,
    Jmp = 22,
    Eq = 23,
    Lt = 24,
    Le = 25,
    Test = 26,
    TestSet = 27,
    Call = 28,
    TailCall = 29,
    Return = 30,
    ForLoop = 31,
    ForPrep = 32,
    TForLoop = 33,
    SetList = 34,
    Close = 35,
    Closure = 36,
    Vararg = 37,
}

impl OpCode {
    pub const COUNT: u8 = 38;

    pub fn from_u8(raw: u8) -> Option<OpCode> {
        if raw < Self::COUNT {
            // discriminants are dense starting at 0
            Some(unsafe { std::mem::transmute::<u8, OpCode>(raw) })
        } else {
            None
        }
    }

    /// Comparison and test opcodes are always followed by a JMP that they
    /// conditionally skip.
    pub fn is_test(self) -> bool {
        matches!(
            self,
            OpCode::Eq | OpCode::Lt | OpCode::Le | OpCode::Test | OpCode::TestSet
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            OpCode::Move => "MOVE",
            OpCode::LoadK => "LOADK",
            OpCode::LoadBool => "LOADBOOL",
            OpCode::LoadNil => "LOADNIL",
            OpCode::GetUpval => "GETUPVAL",
            OpCode::GetGlobal => "GETGLOBAL",
            OpCode::GetTable => "GETTABLE",
            OpCode::SetGlobal => "SETGLOBAL",
            OpCode::SetUpval => "SETUPVAL",
            OpCode::SetTable => "SETTABLE",
            OpCode::NewTable => "NEWTABLE",
            OpCode::SelfCall => "SELF",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Mod => "MOD",
            OpCode::Pow => "POW",
            OpCode::Unm => "UNM",
            OpCode::Not => "NOT",
            OpCode::Len => "LEN",
            OpCode::Concat => "CONCAT",
            OpCode::Jmp => "JMP",
            OpCode::Eq => "EQ",
            OpCode::Lt => "LT",
            OpCode::Le => "LE",
            OpCode::Test => "TEST",
            OpCode::TestSet => "TESTSET",
            OpCode::Call => "CALL",
            OpCode::TailCall => "TAILCALL",
            OpCode::Return => "RETURN",
            OpCode::ForLoop => "FORLOOP",
            OpCode::ForPrep => "FORPREP",
            OpCode::TForLoop => "TFORLOOP",
            OpCode::SetList => "SETLIST",
            OpCode::Close => "CLOSE",
            OpCode::Closure => "CLOSURE",
            OpCode::Vararg => "VARARG",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Instruction(pub u32);

impl Instruction {
    pub const fn create_abc(op: OpCode, a: u32, b: u32, c: u32) -> Instruction {
        Instruction((op as u32) << POS_OP | a << POS_A | b << POS_B | c << POS_C)
    }

    pub const fn create_abx(op: OpCode, a: u32, bx: u32) -> Instruction {
        Instruction((op as u32) << POS_OP | a << POS_A | bx << POS_BX)
    }

    pub const fn create_asbx(op: OpCode, a: u32, sbx: i32) -> Instruction {
        Instruction::create_abx(op, a, (sbx + MAXARG_SBX) as u32)
    }

    pub fn opcode(self) -> Option<OpCode> {
        OpCode::from_u8((self.0 & ((1 << SIZE_OP) - 1)) as u8)
    }

    pub const fn a(self) -> u32 {
        (self.0 >> POS_A) & MAXARG_A
    }

    pub const fn b(self) -> u32 {
        (self.0 >> POS_B) & MAXARG_B
    }

    pub const fn c(self) -> u32 {
        (self.0 >> POS_C) & MAXARG_C
    }

    pub const fn bx(self) -> u32 {
        (self.0 >> POS_BX) & MAXARG_BX
    }

    pub const fn sbx(self) -> i32 {
        self.bx() as i32 - MAXARG_SBX
    }

    pub fn set_opcode(&mut self, op: OpCode) {
        self.0 = (self.0 & !((1 << SIZE_OP) - 1)) | (op as u32);
    }

    pub fn set_a(&mut self, a: u32) {
        self.0 = (self.0 & !(MAXARG_A << POS_A)) | (a << POS_A);
    }

    pub fn set_b(&mut self, b: u32) {
        self.0 = (self.0 & !(MAXARG_B << POS_B)) | (b << POS_B);
    }

    pub fn set_c(&mut self, c: u32) {
        self.0 = (self.0 & !(MAXARG_C << POS_C)) | (c << POS_C);
    }

    pub fn set_bx(&mut self, bx: u32) {
        self.0 = (self.0 & !(MAXARG_BX << POS_BX)) | (bx << POS_BX);
    }

    pub fn set_sbx(&mut self, sbx: i32) {
        self.set_bx((sbx + MAXARG_SBX) as u32);
    }
}

impl std::fmt::Debug for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.opcode() {
            Some(op) => write!(
                f,
                "{} a={} b={} c={} bx={} sbx={}",
                op.name(),
                self.a(),
                self.b(),
                self.c(),
                self.bx(),
                self.sbx()
            ),
            None => write!(f, "<bad opcode {:#010x}>", self.0),
        }
    }
}

/// Encode a capacity hint as a "floating point byte": eeeeexxx meaning
/// (1xxx) << (eeeee - 1) when eeeee > 0, plain xxx otherwise.
pub fn int_to_fb(mut x: u32) -> u32 {
    let mut e = 0u32;
    while x >= 16 {
        x = (x + 1) >> 1;
        e += 1;
    }
    if e == 0 {
        x
    } else {
        ((e + 1) << 3) | (x - 8)
    }
}

pub fn fb_to_int(x: u32) -> u32 {
    let e = (x >> 3) & 0x1f;
    if e == 0 {
        x
    } else {
        ((x & 7) + 8) << (e - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abc_round_trip() {
        let mut i = Instruction::create_abc(OpCode::GetTable, 3, 250, rk_as_k(17));
        assert_eq!(i.opcode(), Some(OpCode::GetTable));
        assert_eq!(i.a(), 3);
        assert_eq!(i.b(), 250);
        assert!(is_k(i.c()));
        assert_eq!(index_k(i.c()), 17);
        i.set_a(7);
        i.set_b(1);
        assert_eq!(i.a(), 7);
        assert_eq!(i.b(), 1);
        assert_eq!(i.opcode(), Some(OpCode::GetTable));
    }

    #[test]
    fn sbx_bias() {
        let i = Instruction::create_asbx(OpCode::Jmp, 0, -1);
        assert_eq!(i.sbx(), -1);
        let j = Instruction::create_asbx(OpCode::ForLoop, 2, -131071);
        assert_eq!(j.sbx(), -131071);
        let mut k = Instruction::create_asbx(OpCode::Jmp, 0, 0);
        k.set_sbx(42);
        assert_eq!(k.sbx(), 42);
    }

    #[test]
    fn floating_byte() {
        for n in [0u32, 1, 7, 8, 15, 16, 17, 50, 100, 1000] {
            let fb = int_to_fb(n);
            assert!(fb <= 255);
            assert!(fb_to_int(fb) >= n);
        }
        assert_eq!(fb_to_int(int_to_fb(0)), 0);
        assert_eq!(fb_to_int(int_to_fb(8)), 8);
    }
}
