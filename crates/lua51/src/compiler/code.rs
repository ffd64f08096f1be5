// Code generation: register discharge of expression descriptors, jump
// list threading, constant folding and operator emission. Companion to
// the parser; together they form the single-pass compiler.

use crate::compiler::expdesc::{ExpDesc, ExpKind};
use crate::compiler::func_state::FuncState;
use crate::lua_vm::opcode::{
    is_k, rk_as_k, Instruction, OpCode, FIELDS_PER_FLUSH, MAXARG_C, MAXARG_SBX, MAX_INDEX_RK,
    NO_JUMP, NO_REG,
};
use crate::lua_vm::LuaResult;

pub const MULTRET: i32 = -1;
pub const UNARY_PRIORITY: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Ne,
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Minus,
    Not,
    Len,
}

impl BinOp {
    /// (left, right) binding powers; right < left makes the operator
    /// right-associative.
    pub fn priority(self) -> (u8, u8) {
        match self {
            BinOp::Add | BinOp::Sub => (6, 6),
            BinOp::Mul | BinOp::Div | BinOp::Mod => (7, 7),
            BinOp::Pow => (10, 9),
            BinOp::Concat => (5, 4),
            BinOp::Ne | BinOp::Eq | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => (3, 3),
            BinOp::And => (2, 2),
            BinOp::Or => (1, 1),
        }
    }
}

impl FuncState {
    fn instr(&self, pc: i32) -> Instruction {
        self.chunk.code[pc as usize]
    }

    fn instr_mut(&mut self, pc: i32) -> &mut Instruction {
        &mut self.chunk.code[pc as usize]
    }

    // ---- raw emission ----

    pub fn code(&mut self, i: Instruction) -> LuaResult<i32> {
        self.discharge_jpc()?;
        self.chunk.code.push(i);
        self.chunk.line_info.push(self.lastline);
        Ok(self.pc() - 1)
    }

    pub fn code_abc(&mut self, op: OpCode, a: u32, b: u32, c: u32) -> LuaResult<i32> {
        self.code(Instruction::create_abc(op, a, b, c))
    }

    pub fn code_abx(&mut self, op: OpCode, a: u32, bx: u32) -> LuaResult<i32> {
        self.code(Instruction::create_abx(op, a, bx))
    }

    pub fn code_asbx(&mut self, op: OpCode, a: u32, sbx: i32) -> LuaResult<i32> {
        self.code(Instruction::create_asbx(op, a, sbx))
    }

    pub fn fix_line(&mut self, line: u32) {
        if let Some(l) = self.chunk.line_info.last_mut() {
            *l = line;
        }
    }

    /// Emit LOADNIL, merging into a previous LOADNIL when the ranges
    /// touch and no jump lands in between.
    pub fn emit_nil(&mut self, from: u32, n: u32) -> LuaResult<()> {
        if self.pc() > self.last_target {
            if self.pc() == 0 {
                // function start: registers are already nil
                if from >= self.nactvar {
                    return Ok(());
                }
            } else {
                let prev = self.instr_mut(self.pc() - 1);
                if prev.opcode() == Some(OpCode::LoadNil)
                    && prev.a() <= from
                    && from <= prev.b() + 1
                {
                    let upper = from + n - 1;
                    if upper > prev.b() {
                        prev.set_b(upper);
                    }
                    return Ok(());
                }
            }
        }
        self.code_abc(OpCode::LoadNil, from, from + n - 1, 0)?;
        Ok(())
    }

    pub fn ret(&mut self, first: u32, nret: i32) -> LuaResult<()> {
        self.code_abc(OpCode::Return, first, (nret + 1) as u32, 0)?;
        Ok(())
    }

    // ---- jump lists ----

    pub fn jump(&mut self) -> LuaResult<i32> {
        let save = self.jpc;
        self.jpc = NO_JUMP;
        let mut j = self.code_asbx(OpCode::Jmp, 0, NO_JUMP)?;
        self.concat(&mut j, save)?;
        Ok(j)
    }

    fn cond_jump(&mut self, op: OpCode, a: u32, b: u32, c: u32) -> LuaResult<i32> {
        self.code_abc(op, a, b, c)?;
        self.jump()
    }

    fn fix_jump(&mut self, pc: i32, dest: i32) -> LuaResult<()> {
        let offset = dest - (pc + 1);
        debug_assert!(dest != NO_JUMP);
        if offset.abs() > MAXARG_SBX {
            return Err(self.syntax_error("control structure too long"));
        }
        self.instr_mut(pc).set_sbx(offset);
        Ok(())
    }

    /// Mark the current pc as a jump target to block peephole merges
    /// across it.
    pub fn get_label(&mut self) -> i32 {
        self.last_target = self.pc();
        self.last_target
    }

    fn get_jump(&self, pc: i32) -> i32 {
        let offset = self.instr(pc).sbx();
        if offset == NO_JUMP {
            NO_JUMP
        } else {
            pc + 1 + offset
        }
    }

    fn jump_control(&self, pc: i32) -> i32 {
        if pc >= 1 && self.instr(pc - 1).opcode().map_or(false, OpCode::is_test) {
            pc - 1
        } else {
            pc
        }
    }

    fn need_value(&self, mut list: i32) -> bool {
        while list != NO_JUMP {
            let i = self.instr(self.jump_control(list));
            if i.opcode() != Some(OpCode::TestSet) {
                return true;
            }
            list = self.get_jump(list);
        }
        false
    }

    fn patch_test_reg(&mut self, node: i32, reg: u32) -> bool {
        let ctl = self.jump_control(node);
        let i = self.instr(ctl);
        if i.opcode() != Some(OpCode::TestSet) {
            return false;
        }
        if reg != NO_REG && reg != i.b() {
            self.instr_mut(ctl).set_a(reg);
        } else {
            // no register to put value or register already has the value
            *self.instr_mut(ctl) = Instruction::create_abc(OpCode::Test, i.b(), 0, i.c());
        }
        true
    }

    fn remove_values(&mut self, mut list: i32) {
        while list != NO_JUMP {
            self.patch_test_reg(list, NO_REG);
            list = self.get_jump(list);
        }
    }

    fn patch_list_aux(
        &mut self,
        mut list: i32,
        vtarget: i32,
        reg: u32,
        dtarget: i32,
    ) -> LuaResult<()> {
        while list != NO_JUMP {
            let next = self.get_jump(list);
            if self.patch_test_reg(list, reg) {
                self.fix_jump(list, vtarget)?;
            } else {
                self.fix_jump(list, dtarget)?;
            }
            list = next;
        }
        Ok(())
    }

    fn discharge_jpc(&mut self) -> LuaResult<()> {
        let list = self.jpc;
        self.jpc = NO_JUMP;
        let pc = self.pc();
        self.patch_list_aux(list, pc, NO_REG, pc)
    }

    pub fn patch_list(&mut self, list: i32, target: i32) -> LuaResult<()> {
        if target == self.pc() {
            self.patch_to_here(list)
        } else {
            debug_assert!(target < self.pc());
            self.patch_list_aux(list, target, NO_REG, target)
        }
    }

    pub fn patch_to_here(&mut self, list: i32) -> LuaResult<()> {
        self.get_label();
        let mut jpc = self.jpc;
        self.concat(&mut jpc, list)?;
        self.jpc = jpc;
        Ok(())
    }

    pub fn concat(&mut self, l1: &mut i32, l2: i32) -> LuaResult<()> {
        if l2 == NO_JUMP {
            return Ok(());
        }
        if *l1 == NO_JUMP {
            *l1 = l2;
            return Ok(());
        }
        let mut list = *l1;
        loop {
            let next = self.get_jump(list);
            if next == NO_JUMP {
                break;
            }
            list = next;
        }
        self.fix_jump(list, l2)
    }

    // ---- register discharge ----

    fn free_reg(&mut self, reg: u32) {
        if !is_k(reg) && reg >= self.nactvar {
            self.freereg -= 1;
            debug_assert_eq!(reg, self.freereg);
        }
    }

    fn free_exp(&mut self, e: &ExpDesc) {
        if e.kind == ExpKind::NonReloc {
            self.free_reg(e.info as u32);
        }
    }

    /// Resolve variable references into value-producing instructions.
    pub fn discharge_vars(&mut self, e: &mut ExpDesc) -> LuaResult<()> {
        match e.kind {
            ExpKind::Local => {
                e.kind = ExpKind::NonReloc;
            }
            ExpKind::Upval => {
                e.info = self.code_abc(OpCode::GetUpval, 0, e.info as u32, 0)?;
                e.kind = ExpKind::Reloc;
            }
            ExpKind::Global => {
                e.info = self.code_abx(OpCode::GetGlobal, 0, e.info as u32)?;
                e.kind = ExpKind::Reloc;
            }
            ExpKind::Indexed => {
                self.free_reg(e.aux as u32);
                self.free_reg(e.info as u32);
                e.info = self.code_abc(OpCode::GetTable, 0, e.info as u32, e.aux as u32)?;
                e.kind = ExpKind::Reloc;
            }
            ExpKind::Call => {
                self.set_one_ret(e);
            }
            ExpKind::Vararg => {
                self.set_one_ret(e);
            }
            _ => {}
        }
        Ok(())
    }

    fn discharge_to_reg(&mut self, e: &mut ExpDesc, reg: u32) -> LuaResult<()> {
        self.discharge_vars(e)?;
        match e.kind {
            ExpKind::Nil => self.emit_nil(reg, 1)?,
            ExpKind::False => {
                self.code_abc(OpCode::LoadBool, reg, 0, 0)?;
            }
            ExpKind::True => {
                self.code_abc(OpCode::LoadBool, reg, 1, 0)?;
            }
            ExpKind::K => {
                self.code_abx(OpCode::LoadK, reg, e.info as u32)?;
            }
            ExpKind::KNum => {
                let k = self.number_k(e.nval) as u32;
                self.code_abx(OpCode::LoadK, reg, k)?;
            }
            ExpKind::Reloc => {
                self.instr_mut(e.info).set_a(reg);
            }
            ExpKind::NonReloc => {
                if reg != e.info as u32 {
                    self.code_abc(OpCode::Move, reg, e.info as u32, 0)?;
                }
            }
            _ => {
                debug_assert!(matches!(e.kind, ExpKind::Void | ExpKind::Jump));
                return Ok(());
            }
        }
        e.info = reg as i32;
        e.kind = ExpKind::NonReloc;
        Ok(())
    }

    fn discharge_to_any_reg(&mut self, e: &mut ExpDesc) -> LuaResult<()> {
        if e.kind != ExpKind::NonReloc {
            self.reserve_regs(1)?;
            self.discharge_to_reg(e, self.freereg - 1)?;
        }
        Ok(())
    }

    fn code_label(&mut self, a: u32, b: u32, jump: u32) -> LuaResult<i32> {
        self.get_label();
        self.code_abc(OpCode::LoadBool, a, b, jump)
    }

    pub fn exp2reg(&mut self, e: &mut ExpDesc, reg: u32) -> LuaResult<()> {
        self.discharge_to_reg(e, reg)?;
        if e.kind == ExpKind::Jump {
            let mut t = e.t;
            self.concat(&mut t, e.info)?;
            e.t = t;
        }
        if e.has_jumps() {
            let mut p_f = NO_JUMP;
            let mut p_t = NO_JUMP;
            if self.need_value(e.t) || self.need_value(e.f) {
                let fj = if e.kind == ExpKind::Jump {
                    NO_JUMP
                } else {
                    self.jump()?
                };
                p_f = self.code_label(reg, 0, 1)?;
                p_t = self.code_label(reg, 1, 0)?;
                self.patch_to_here(fj)?;
            }
            let end = self.get_label();
            self.patch_list_aux(e.f, end, reg, p_f)?;
            self.patch_list_aux(e.t, end, reg, p_t)?;
        }
        e.t = NO_JUMP;
        e.f = NO_JUMP;
        e.info = reg as i32;
        e.kind = ExpKind::NonReloc;
        Ok(())
    }

    pub fn exp2nextreg(&mut self, e: &mut ExpDesc) -> LuaResult<()> {
        self.discharge_vars(e)?;
        self.free_exp(e);
        self.reserve_regs(1)?;
        self.exp2reg(e, self.freereg - 1)
    }

    pub fn exp2anyreg(&mut self, e: &mut ExpDesc) -> LuaResult<u32> {
        self.discharge_vars(e)?;
        if e.kind == ExpKind::NonReloc {
            if !e.has_jumps() {
                return Ok(e.info as u32);
            }
            if e.info as u32 >= self.nactvar {
                let reg = e.info as u32;
                self.exp2reg(e, reg)?;
                return Ok(reg);
            }
        }
        self.exp2nextreg(e)?;
        Ok(e.info as u32)
    }

    pub fn exp2val(&mut self, e: &mut ExpDesc) -> LuaResult<()> {
        if e.has_jumps() {
            self.exp2anyreg(e)?;
            Ok(())
        } else {
            self.discharge_vars(e)
        }
    }

    /// RK operand: a constant index when the value is a foldable constant
    /// that fits, a register otherwise.
    pub fn exp2rk(&mut self, e: &mut ExpDesc) -> LuaResult<u32> {
        self.exp2val(e)?;
        match e.kind {
            ExpKind::KNum | ExpKind::True | ExpKind::False | ExpKind::Nil => {
                if self.chunk.constants.len() as u32 <= MAX_INDEX_RK {
                    let k = match e.kind {
                        ExpKind::KNum => self.number_k(e.nval),
                        ExpKind::True => self.bool_k(true),
                        ExpKind::False => self.bool_k(false),
                        _ => self.nil_k(),
                    };
                    e.info = k as i32;
                    e.kind = ExpKind::K;
                    return Ok(rk_as_k(k as u32));
                }
            }
            ExpKind::K => {
                if (e.info as u32) <= MAX_INDEX_RK {
                    return Ok(rk_as_k(e.info as u32));
                }
            }
            _ => {}
        }
        self.exp2anyreg(e)
    }

    // ---- variables ----

    pub fn store_var(&mut self, var: &ExpDesc, e: &mut ExpDesc) -> LuaResult<()> {
        match var.kind {
            ExpKind::Local => {
                self.free_exp(e);
                self.exp2reg(e, var.info as u32)?;
            }
            ExpKind::Upval => {
                let r = self.exp2anyreg(e)?;
                self.code_abc(OpCode::SetUpval, r, var.info as u32, 0)?;
                self.free_exp(e);
            }
            ExpKind::Global => {
                let r = self.exp2anyreg(e)?;
                self.code_abx(OpCode::SetGlobal, r, var.info as u32)?;
                self.free_exp(e);
            }
            ExpKind::Indexed => {
                let rk = self.exp2rk(e)?;
                self.code_abc(OpCode::SetTable, var.info as u32, var.aux as u32, rk)?;
                self.free_exp(e);
            }
            _ => return Err(self.syntax_error("cannot assign to this expression")),
        }
        Ok(())
    }

    /// `e:key` method lookup: leaves object+method in two fresh registers.
    pub fn op_self(&mut self, e: &mut ExpDesc, key: &mut ExpDesc) -> LuaResult<()> {
        self.exp2anyreg(e)?;
        self.free_exp(e);
        let func = self.freereg;
        self.reserve_regs(2)?;
        let rk = self.exp2rk(key)?;
        self.code_abc(OpCode::SelfCall, func, e.info as u32, rk)?;
        self.free_exp(key);
        e.info = func as i32;
        e.kind = ExpKind::NonReloc;
        Ok(())
    }

    pub fn indexed(&mut self, t: &mut ExpDesc, k: &mut ExpDesc) -> LuaResult<()> {
        t.aux = self.exp2rk(k)? as i32;
        t.kind = ExpKind::Indexed;
        Ok(())
    }

    // ---- calls and multiple results ----

    pub fn set_returns(&mut self, e: &mut ExpDesc, nresults: i32) -> LuaResult<()> {
        if e.kind == ExpKind::Call {
            self.instr_mut(e.info).set_c((nresults + 1) as u32);
        } else if e.kind == ExpKind::Vararg {
            let freereg = self.freereg;
            let i = self.instr_mut(e.info);
            i.set_b((nresults + 1) as u32);
            i.set_a(freereg);
            self.reserve_regs(1)?;
        }
        Ok(())
    }

    pub fn set_multret(&mut self, e: &mut ExpDesc) -> LuaResult<()> {
        self.set_returns(e, MULTRET)
    }

    pub fn set_one_ret(&mut self, e: &mut ExpDesc) {
        if e.kind == ExpKind::Call {
            e.kind = ExpKind::NonReloc;
            e.info = self.instr(e.info).a() as i32;
        } else if e.kind == ExpKind::Vararg {
            self.instr_mut(e.info).set_b(2);
            e.kind = ExpKind::Reloc;
        }
    }

    // ---- boolean control flow ----

    fn invert_jump(&mut self, e: &ExpDesc) {
        let ctl = self.jump_control(e.info);
        let i = self.instr(ctl);
        debug_assert!(
            i.opcode().map_or(false, OpCode::is_test)
                && i.opcode() != Some(OpCode::TestSet)
                && i.opcode() != Some(OpCode::Test)
        );
        let flipped = (i.a() == 0) as u32;
        self.instr_mut(ctl).set_a(flipped);
    }

    fn jump_on_cond(&mut self, e: &mut ExpDesc, cond: bool) -> LuaResult<i32> {
        if e.kind == ExpKind::Reloc {
            let ie = self.instr(e.info);
            if ie.opcode() == Some(OpCode::Not) {
                // remove the NOT and invert the test instead
                self.chunk.code.pop();
                self.chunk.line_info.pop();
                return self.cond_jump(OpCode::Test, ie.b(), 0, !cond as u32);
            }
        }
        self.discharge_to_any_reg(e)?;
        self.free_exp(e);
        self.cond_jump(OpCode::TestSet, NO_REG, e.info as u32, cond as u32)
    }

    pub fn go_if_true(&mut self, e: &mut ExpDesc) -> LuaResult<()> {
        self.discharge_vars(e)?;
        let pc = match e.kind {
            ExpKind::K | ExpKind::KNum | ExpKind::True => NO_JUMP,
            ExpKind::Jump => {
                self.invert_jump(e);
                e.info
            }
            _ => self.jump_on_cond(e, false)?,
        };
        let mut f = e.f;
        self.concat(&mut f, pc)?;
        e.f = f;
        self.patch_to_here(e.t)?;
        e.t = NO_JUMP;
        Ok(())
    }

    pub fn go_if_false(&mut self, e: &mut ExpDesc) -> LuaResult<()> {
        self.discharge_vars(e)?;
        let pc = match e.kind {
            ExpKind::Nil | ExpKind::False => NO_JUMP,
            ExpKind::Jump => e.info,
            _ => self.jump_on_cond(e, true)?,
        };
        let mut t = e.t;
        self.concat(&mut t, pc)?;
        e.t = t;
        self.patch_to_here(e.f)?;
        e.f = NO_JUMP;
        Ok(())
    }

    fn code_not(&mut self, e: &mut ExpDesc) -> LuaResult<()> {
        self.discharge_vars(e)?;
        match e.kind {
            ExpKind::Nil | ExpKind::False => e.kind = ExpKind::True,
            ExpKind::K | ExpKind::KNum | ExpKind::True => e.kind = ExpKind::False,
            ExpKind::Jump => self.invert_jump(e),
            ExpKind::Reloc | ExpKind::NonReloc => {
                self.discharge_to_any_reg(e)?;
                self.free_exp(e);
                e.info = self.code_abc(OpCode::Not, 0, e.info as u32, 0)?;
                e.kind = ExpKind::Reloc;
            }
            _ => debug_assert!(false),
        }
        std::mem::swap(&mut e.t, &mut e.f);
        self.remove_values(e.f);
        self.remove_values(e.t);
        Ok(())
    }

    // ---- operators ----

    fn fold_arith(op: OpCode, v1: f64, v2: f64) -> Option<f64> {
        let r = match op {
            OpCode::Add => v1 + v2,
            OpCode::Sub => v1 - v2,
            OpCode::Mul => v1 * v2,
            OpCode::Div => {
                if v2 == 0.0 {
                    return None;
                }
                v1 / v2
            }
            OpCode::Mod => {
                if v2 == 0.0 {
                    return None;
                }
                v1 - (v1 / v2).floor() * v2
            }
            OpCode::Pow => v1.powf(v2),
            OpCode::Unm => -v1,
            _ => return None,
        };
        if r.is_nan() {
            None
        } else {
            Some(r)
        }
    }

    fn code_arith(&mut self, op: OpCode, e1: &mut ExpDesc, e2: &mut ExpDesc) -> LuaResult<()> {
        if op != OpCode::Len && op != OpCode::Concat && e1.is_numeral() && e2.is_numeral() {
            if let Some(r) = Self::fold_arith(op, e1.nval, e2.nval) {
                e1.nval = r;
                return Ok(());
            }
        }
        let o2 = if op != OpCode::Unm && op != OpCode::Len {
            self.exp2rk(e2)?
        } else {
            0
        };
        let o1 = self.exp2rk(e1)?;
        if o1 > o2 {
            self.free_exp(e1);
            self.free_exp(e2);
        } else {
            self.free_exp(e2);
            self.free_exp(e1);
        }
        e1.info = self.code_abc(op, 0, o1, o2)?;
        e1.kind = ExpKind::Reloc;
        Ok(())
    }

    fn code_comp(
        &mut self,
        op: OpCode,
        cond: bool,
        e1: &mut ExpDesc,
        e2: &mut ExpDesc,
    ) -> LuaResult<()> {
        let mut o1 = self.exp2rk(e1)?;
        let mut o2 = self.exp2rk(e2)?;
        self.free_exp(e2);
        self.free_exp(e1);
        let mut cond = cond;
        if !cond && op != OpCode::Eq {
            // a > b becomes b < a
            std::mem::swap(&mut o1, &mut o2);
            cond = true;
        }
        e1.info = self.cond_jump(op, cond as u32, o1, o2)?;
        e1.kind = ExpKind::Jump;
        Ok(())
    }

    pub fn prefix(&mut self, op: UnOp, e: &mut ExpDesc) -> LuaResult<()> {
        match op {
            UnOp::Minus => {
                let mut fake = ExpDesc::number(0.0);
                if !e.is_numeral() {
                    self.exp2anyreg(e)?;
                }
                self.code_arith(OpCode::Unm, e, &mut fake)
            }
            UnOp::Not => self.code_not(e),
            UnOp::Len => {
                let mut fake = ExpDesc::number(0.0);
                self.exp2anyreg(e)?;
                self.code_arith(OpCode::Len, e, &mut fake)
            }
        }
    }

    pub fn infix(&mut self, op: BinOp, e: &mut ExpDesc) -> LuaResult<()> {
        match op {
            BinOp::And => self.go_if_true(e),
            BinOp::Or => self.go_if_false(e),
            BinOp::Concat => {
                self.exp2nextreg(e)?;
                Ok(())
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Pow => {
                if !e.is_numeral() {
                    self.exp2rk(e)?;
                }
                Ok(())
            }
            _ => {
                self.exp2rk(e)?;
                Ok(())
            }
        }
    }

    pub fn posfix(&mut self, op: BinOp, e1: &mut ExpDesc, e2: &mut ExpDesc) -> LuaResult<()> {
        match op {
            BinOp::And => {
                debug_assert_eq!(e1.t, NO_JUMP);
                self.discharge_vars(e2)?;
                let mut f = e2.f;
                self.concat(&mut f, e1.f)?;
                e2.f = f;
                *e1 = *e2;
                Ok(())
            }
            BinOp::Or => {
                debug_assert_eq!(e1.f, NO_JUMP);
                self.discharge_vars(e2)?;
                let mut t = e2.t;
                self.concat(&mut t, e1.t)?;
                e2.t = t;
                *e1 = *e2;
                Ok(())
            }
            BinOp::Concat => {
                self.exp2val(e2)?;
                if e2.kind == ExpKind::Reloc
                    && self.instr(e2.info).opcode() == Some(OpCode::Concat)
                {
                    debug_assert_eq!(e1.info as u32, self.instr(e2.info).b() - 1);
                    self.free_exp(e1);
                    let b = e1.info as u32;
                    self.instr_mut(e2.info).set_b(b);
                    e1.kind = ExpKind::Reloc;
                    e1.info = e2.info;
                    Ok(())
                } else {
                    self.exp2nextreg(e2)?;
                    self.code_arith(OpCode::Concat, e1, e2)
                }
            }
            BinOp::Add => self.code_arith(OpCode::Add, e1, e2),
            BinOp::Sub => self.code_arith(OpCode::Sub, e1, e2),
            BinOp::Mul => self.code_arith(OpCode::Mul, e1, e2),
            BinOp::Div => self.code_arith(OpCode::Div, e1, e2),
            BinOp::Mod => self.code_arith(OpCode::Mod, e1, e2),
            BinOp::Pow => self.code_arith(OpCode::Pow, e1, e2),
            BinOp::Eq => self.code_comp(OpCode::Eq, true, e1, e2),
            BinOp::Ne => self.code_comp(OpCode::Eq, false, e1, e2),
            BinOp::Lt => self.code_comp(OpCode::Lt, true, e1, e2),
            BinOp::Le => self.code_comp(OpCode::Le, true, e1, e2),
            BinOp::Gt => self.code_comp(OpCode::Lt, false, e1, e2),
            BinOp::Ge => self.code_comp(OpCode::Le, false, e1, e2),
        }
    }

    // ---- table constructor flushing ----

    pub fn set_list(&mut self, base: u32, nelems: u32, tostore: i32) -> LuaResult<()> {
        let c = (nelems - 1) / FIELDS_PER_FLUSH + 1;
        let b = if tostore == MULTRET { 0 } else { tostore as u32 };
        debug_assert!(tostore != 0);
        if c <= MAXARG_C {
            self.code_abc(OpCode::SetList, base, b, c)?;
        } else {
            self.code_abc(OpCode::SetList, base, b, 0)?;
            // batch number too large for C: store it as a raw trailing word
            self.chunk.code.push(Instruction(c));
            self.chunk.line_info.push(self.lastline);
        }
        self.freereg = base + 1;
        Ok(())
    }
}
