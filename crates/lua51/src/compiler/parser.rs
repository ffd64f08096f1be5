// Recursive-descent parser emitting bytecode as it goes. Grammar and
// emission order follow the Lua 5.1 reference language; there is no AST.

use std::rc::Rc;

use smol_str::SmolStr;

use crate::compiler::code::{BinOp, UnOp, MULTRET, UNARY_PRIORITY};
use crate::compiler::expdesc::{ExpDesc, ExpKind};
use crate::compiler::func_state::{BlockCnt, FuncState, UpvalDesc, MAX_UPVALUES};
use crate::compiler::lexer::{Lexer, Token};
use crate::lua_value::Chunk;
use crate::lua_vm::opcode::{int_to_fb, OpCode, FIELDS_PER_FLUSH, NO_JUMP, NO_REG};
use crate::lua_vm::{LuaError, LuaResult};

const MAX_SYNTAX_DEPTH: usize = 200;

pub struct Parser<'s> {
    lex: Lexer<'s>,
    fs: Vec<FuncState>,
    depth: usize,
}

struct ConsControl {
    /// Pending last list item.
    v: ExpDesc,
    /// pc of the NEWTABLE, for patching size hints.
    pc: i32,
    na: u32,
    nh: u32,
    tostore: u32,
}

pub fn parse(text: &str, chunk_name: &str) -> LuaResult<Rc<Chunk>> {
    let mut p = Parser {
        lex: Lexer::new(text, chunk_name)?,
        fs: Vec::new(),
        depth: 0,
    };
    p.open_func(0);
    p.fs().chunk.is_vararg = true;
    p.chunk_body()?;
    if p.lex.token != Token::Eof {
        return Err(p.error_expected("<eof>"));
    }
    let fs = p.close_func()?;
    debug_assert!(p.fs.is_empty());
    Ok(Rc::new(fs.chunk))
}

impl<'s> Parser<'s> {
    /// Current function state, with the emission line synced to the last
    /// consumed token.
    fn fs(&mut self) -> &mut FuncState {
        let line = self.lex.last_line;
        let f = self.fs.last_mut().expect("active function state");
        f.lastline = line;
        f
    }

    fn open_func(&mut self, line_defined: u32) {
        let mut fs = FuncState::new(self.lex.source.clone(), line_defined);
        fs.prev = if self.fs.is_empty() {
            None
        } else {
            Some(self.fs.len() - 1)
        };
        self.fs.push(fs);
    }

    fn close_func(&mut self) -> LuaResult<FuncState> {
        {
            let fs = self.fs();
            fs.remove_locals(0);
            fs.ret(0, 0)?;
        }
        Ok(self.fs.pop().expect("active function state"))
    }

    // ---- token plumbing ----

    fn error_expected(&self, what: &str) -> LuaError {
        LuaError::Syntax(format!(
            "{}:{}: '{}' expected near '{}'",
            self.lex.source,
            self.lex.token_line,
            what,
            self.lex.token.describe()
        ))
    }

    fn syntax_error(&self, msg: &str) -> LuaError {
        LuaError::Syntax(format!(
            "{}:{}: {} near '{}'",
            self.lex.source,
            self.lex.token_line,
            msg,
            self.lex.token.describe()
        ))
    }

    fn test_next(&mut self, t: &Token) -> LuaResult<bool> {
        if self.lex.token == *t {
            self.lex.next_token()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn test_next_char(&mut self, c: u8) -> LuaResult<bool> {
        self.test_next(&Token::Char(c))
    }

    fn check_next(&mut self, t: &Token) -> LuaResult<()> {
        if !self.test_next(t)? {
            return Err(self.error_expected(&t.describe()));
        }
        Ok(())
    }

    fn check_next_char(&mut self, c: u8) -> LuaResult<()> {
        self.check_next(&Token::Char(c))
    }

    /// Like check_next, but reports where the construct being closed
    /// started when it spans lines.
    fn check_match(&mut self, what: &Token, who: &Token, line: u32) -> LuaResult<()> {
        if self.test_next(what)? {
            return Ok(());
        }
        if line == self.lex.token_line {
            Err(self.error_expected(&what.describe()))
        } else {
            Err(LuaError::Syntax(format!(
                "{}:{}: '{}' expected (to close '{}' at line {}) near '{}'",
                self.lex.source,
                self.lex.token_line,
                what.describe(),
                who.describe(),
                line,
                self.lex.token.describe()
            )))
        }
    }

    fn check_name(&mut self) -> LuaResult<SmolStr> {
        match &self.lex.token {
            Token::Name(s) => {
                let name = s.clone();
                self.lex.next_token()?;
                Ok(name)
            }
            _ => Err(self.error_expected("<name>")),
        }
    }

    fn block_follow(&self) -> bool {
        matches!(
            self.lex.token,
            Token::Else | Token::Elseif | Token::End | Token::Until | Token::Eof
        )
    }

    // ---- blocks and scopes ----

    fn enter_block(&mut self, is_breakable: bool) {
        let fs = self.fs();
        debug_assert_eq!(fs.freereg, fs.nactvar);
        let nactvar = fs.nactvar;
        fs.blocks.push(BlockCnt {
            breaklist: NO_JUMP,
            nactvar,
            upval: false,
            is_breakable,
        });
    }

    fn leave_block(&mut self) -> LuaResult<()> {
        let fs = self.fs();
        let bl = fs.blocks.pop().expect("open block");
        fs.remove_locals(bl.nactvar);
        if bl.upval {
            fs.code_abc(OpCode::Close, bl.nactvar, 0, 0)?;
        }
        debug_assert_eq!(bl.nactvar, fs.nactvar);
        fs.freereg = fs.nactvar;
        fs.patch_to_here(bl.breaklist)
    }

    fn block(&mut self) -> LuaResult<()> {
        self.enter_block(false);
        self.chunk_body()?;
        self.leave_block()
    }

    fn chunk_body(&mut self) -> LuaResult<()> {
        let mut is_last = false;
        while !is_last && !self.block_follow() {
            is_last = self.statement()?;
            self.test_next_char(b';')?;
            let fs = self.fs();
            debug_assert!(fs.freereg >= fs.nactvar);
            fs.freereg = fs.nactvar;
        }
        Ok(())
    }

    // ---- variable resolution ----

    fn single_var(&mut self) -> LuaResult<ExpDesc> {
        let name = self.check_name()?;
        let mut e = ExpDesc::void();
        let top = self.fs.len() as i32 - 1;
        let kind = self.single_var_aux(top, &name, &mut e, true)?;
        if kind == ExpKind::Global {
            e.info = self.fs().string_k(&name) as i32;
        }
        Ok(e)
    }

    fn single_var_aux(
        &mut self,
        level: i32,
        name: &str,
        e: &mut ExpDesc,
        base: bool,
    ) -> LuaResult<ExpKind> {
        if level < 0 {
            *e = ExpDesc::new(ExpKind::Global, NO_REG as i32);
            return Ok(ExpKind::Global);
        }
        let fsi = level as usize;
        if let Some(reg) = self.fs[fsi].search_var(name) {
            *e = ExpDesc::new(ExpKind::Local, reg as i32);
            if !base {
                self.fs[fsi].mark_upval(reg);
            }
            return Ok(ExpKind::Local);
        }
        if self.single_var_aux(level - 1, name, e, false)? == ExpKind::Global {
            return Ok(ExpKind::Global);
        }
        let idx = self.index_upvalue(fsi, name, e)?;
        *e = ExpDesc::new(ExpKind::Upval, idx as i32);
        Ok(ExpKind::Upval)
    }

    /// Find or add an upvalue of function `fsi` for a variable that
    /// resolved in an enclosing function.
    fn index_upvalue(&mut self, fsi: usize, name: &str, v: &ExpDesc) -> LuaResult<usize> {
        let in_stack = v.kind == ExpKind::Local;
        let fs = &mut self.fs[fsi];
        for (i, uv) in fs.upvalues.iter().enumerate() {
            if uv.in_stack == in_stack && uv.index == v.info as u32 {
                return Ok(i);
            }
        }
        if fs.upvalues.len() >= MAX_UPVALUES {
            return Err(fs.syntax_error("too many upvalues"));
        }
        fs.upvalues.push(UpvalDesc {
            name: SmolStr::new(name),
            in_stack,
            index: v.info as u32,
        });
        fs.chunk.upvalue_names.push(SmolStr::new(name));
        fs.chunk.nups += 1;
        Ok(fs.upvalues.len() - 1)
    }

    // ---- expressions ----

    fn string_exp(&mut self, s: &str) -> ExpDesc {
        let k = self.fs().string_k(s);
        ExpDesc::new(ExpKind::K, k as i32)
    }

    fn unop_of_token(&self) -> Option<UnOp> {
        match self.lex.token {
            Token::Not => Some(UnOp::Not),
            Token::Char(b'-') => Some(UnOp::Minus),
            Token::Char(b'#') => Some(UnOp::Len),
            _ => None,
        }
    }

    fn binop_of_token(&self) -> Option<BinOp> {
        match self.lex.token {
            Token::Char(b'+') => Some(BinOp::Add),
            Token::Char(b'-') => Some(BinOp::Sub),
            Token::Char(b'*') => Some(BinOp::Mul),
            Token::Char(b'/') => Some(BinOp::Div),
            Token::Char(b'%') => Some(BinOp::Mod),
            Token::Char(b'^') => Some(BinOp::Pow),
            Token::Concat => Some(BinOp::Concat),
            Token::Ne => Some(BinOp::Ne),
            Token::Eq => Some(BinOp::Eq),
            Token::Char(b'<') => Some(BinOp::Lt),
            Token::Le => Some(BinOp::Le),
            Token::Char(b'>') => Some(BinOp::Gt),
            Token::Ge => Some(BinOp::Ge),
            Token::And => Some(BinOp::And),
            Token::Or => Some(BinOp::Or),
            _ => None,
        }
    }

    fn expr(&mut self) -> LuaResult<ExpDesc> {
        self.subexpr(0)
    }

    fn subexpr(&mut self, limit: u8) -> LuaResult<ExpDesc> {
        self.depth += 1;
        if self.depth > MAX_SYNTAX_DEPTH {
            self.depth -= 1;
            return Err(self.syntax_error("chunk has too many syntax levels"));
        }
        let mut v = if let Some(u) = self.unop_of_token() {
            self.lex.next_token()?;
            let mut v = self.subexpr(UNARY_PRIORITY)?;
            self.fs().prefix(u, &mut v)?;
            v
        } else {
            self.simple_exp()?
        };
        while let Some(op) = self.binop_of_token() {
            if op.priority().0 <= limit {
                break;
            }
            self.lex.next_token()?;
            self.fs().infix(op, &mut v)?;
            let mut v2 = self.subexpr(op.priority().1)?;
            self.fs().posfix(op, &mut v, &mut v2)?;
        }
        self.depth -= 1;
        Ok(v)
    }

    fn simple_exp(&mut self) -> LuaResult<ExpDesc> {
        let e = match &self.lex.token {
            Token::Number(n) => ExpDesc::number(*n),
            Token::Str(s) => {
                let s = s.clone();
                self.string_exp(&s)
            }
            Token::Nil => ExpDesc::new(ExpKind::Nil, 0),
            Token::True => ExpDesc::new(ExpKind::True, 0),
            Token::False => ExpDesc::new(ExpKind::False, 0),
            Token::Dots => {
                let fs = self.fs();
                if !fs.chunk.is_vararg {
                    return Err(
                        self.syntax_error("cannot use '...' outside a vararg function")
                    );
                }
                let pc = self.fs().code_abc(OpCode::Vararg, 0, 1, 0)?;
                ExpDesc::new(ExpKind::Vararg, pc)
            }
            Token::Char(b'{') => return self.constructor(),
            Token::Function => {
                let line = self.lex.token_line;
                self.lex.next_token()?;
                return self.body(false, line);
            }
            _ => return self.primary_exp(),
        };
        self.lex.next_token()?;
        Ok(e)
    }

    fn prefix_exp(&mut self) -> LuaResult<ExpDesc> {
        match &self.lex.token {
            Token::Name(_) => self.single_var(),
            Token::Char(b'(') => {
                let line = self.lex.token_line;
                self.lex.next_token()?;
                let mut v = self.expr()?;
                self.check_match(&Token::Char(b')'), &Token::Char(b'('), line)?;
                // parentheses truncate multiple results to one
                self.fs().discharge_vars(&mut v)?;
                Ok(v)
            }
            _ => Err(self.syntax_error("unexpected symbol")),
        }
    }

    fn primary_exp(&mut self) -> LuaResult<ExpDesc> {
        let mut v = self.prefix_exp()?;
        loop {
            match &self.lex.token {
                Token::Char(b'.') => {
                    self.field_sel(&mut v)?;
                }
                Token::Char(b'[') => {
                    self.fs().exp2anyreg(&mut v)?;
                    let mut key = self.yindex()?;
                    self.fs().indexed(&mut v, &mut key)?;
                }
                Token::Char(b':') => {
                    self.lex.next_token()?;
                    let name = self.check_name()?;
                    let mut key = self.string_exp(&name);
                    self.fs().op_self(&mut v, &mut key)?;
                    self.func_args(&mut v)?;
                }
                Token::Char(b'(') | Token::Str(_) | Token::Char(b'{') => {
                    self.fs().exp2nextreg(&mut v)?;
                    self.func_args(&mut v)?;
                }
                _ => return Ok(v),
            }
        }
    }

    fn field_sel(&mut self, v: &mut ExpDesc) -> LuaResult<()> {
        self.fs().exp2anyreg(v)?;
        self.lex.next_token()?; // '.' or ':'
        let name = self.check_name()?;
        let mut key = self.string_exp(&name);
        self.fs().indexed(v, &mut key)
    }

    fn yindex(&mut self) -> LuaResult<ExpDesc> {
        self.lex.next_token()?; // '['
        let mut v = self.expr()?;
        self.fs().exp2val(&mut v)?;
        self.check_next_char(b']')?;
        Ok(v)
    }

    fn func_args(&mut self, f: &mut ExpDesc) -> LuaResult<()> {
        let line = self.lex.token_line;
        let mut args = match &self.lex.token {
            Token::Char(b'(') => {
                self.lex.next_token()?;
                if self.lex.token == Token::Char(b')') {
                    ExpDesc::void()
                } else {
                    let (_, mut e) = self.explist1()?;
                    if e.has_multret() {
                        self.fs().set_multret(&mut e)?;
                    }
                    e
                }
            }
            Token::Str(s) => {
                let s = s.clone();
                let e = self.string_exp(&s);
                self.lex.next_token()?;
                // literal argument: no closing paren to match
                return self.finish_call(f, e, line);
            }
            Token::Char(b'{') => {
                let e = self.constructor()?;
                return self.finish_call(f, e, line);
            }
            _ => return Err(self.syntax_error("function arguments expected")),
        };
        self.check_match(&Token::Char(b')'), &Token::Char(b'('), line)?;
        self.finish_call(f, args, line)
    }

    fn finish_call(&mut self, f: &mut ExpDesc, mut args: ExpDesc, line: u32) -> LuaResult<()> {
        debug_assert_eq!(f.kind, ExpKind::NonReloc);
        let base = f.info as u32;
        let nparams = if args.has_multret() {
            MULTRET
        } else {
            if args.kind != ExpKind::Void {
                self.fs().exp2nextreg(&mut args)?;
            }
            let fs = self.fs();
            (fs.freereg - (base + 1)) as i32
        };
        let fs = self.fs();
        f.info = fs.code_abc(OpCode::Call, base, (nparams + 1) as u32, 2)?;
        f.kind = ExpKind::Call;
        fs.fix_line(line);
        // one result by default; call reuses the function's register
        fs.freereg = base + 1;
        Ok(())
    }

    fn explist1(&mut self) -> LuaResult<(u32, ExpDesc)> {
        let mut n = 1u32;
        let mut e = self.expr()?;
        while self.test_next_char(b',')? {
            self.fs().exp2nextreg(&mut e)?;
            e = self.expr()?;
            n += 1;
        }
        Ok((n, e))
    }

    // ---- table constructors ----

    fn constructor(&mut self) -> LuaResult<ExpDesc> {
        let line = self.lex.token_line;
        let pc = self.fs().code_abc(OpCode::NewTable, 0, 0, 0)?;
        let mut t = ExpDesc::new(ExpKind::Reloc, pc);
        self.fs().exp2nextreg(&mut t)?;
        let mut cc = ConsControl {
            v: ExpDesc::void(),
            pc,
            na: 0,
            nh: 0,
            tostore: 0,
        };
        self.check_next_char(b'{')?;
        loop {
            if self.lex.token == Token::Char(b'}') {
                break;
            }
            self.close_list_field(&t, &mut cc)?;
            match &self.lex.token {
                Token::Name(_) => {
                    if *self.lex.peek()? == Token::Char(b'=') {
                        self.rec_field(&t, &mut cc)?;
                    } else {
                        self.list_field(&mut cc)?;
                    }
                }
                Token::Char(b'[') => self.rec_field(&t, &mut cc)?,
                _ => self.list_field(&mut cc)?,
            }
            if !self.test_next_char(b',')? && !self.test_next_char(b';')? {
                break;
            }
        }
        self.check_match(&Token::Char(b'}'), &Token::Char(b'{'), line)?;
        self.last_list_field(&t, &mut cc)?;
        let fs = self.fs();
        let i = &mut fs.chunk.code[cc.pc as usize];
        i.set_b(int_to_fb(cc.na));
        i.set_c(int_to_fb(cc.nh));
        Ok(t)
    }

    fn list_field(&mut self, cc: &mut ConsControl) -> LuaResult<()> {
        cc.v = self.expr()?;
        cc.na += 1;
        cc.tostore += 1;
        Ok(())
    }

    fn rec_field(&mut self, t: &ExpDesc, cc: &mut ConsControl) -> LuaResult<()> {
        let reg = self.fs().freereg;
        let mut key = match &self.lex.token {
            Token::Name(_) => {
                let name = self.check_name()?;
                self.string_exp(&name)
            }
            _ => self.yindex()?,
        };
        cc.nh += 1;
        self.check_next_char(b'=')?;
        let fs = self.fs();
        let rk_key = fs.exp2rk(&mut key)?;
        let mut val = self.expr()?;
        let fs = self.fs();
        let rk_val = fs.exp2rk(&mut val)?;
        fs.code_abc(OpCode::SetTable, t.info as u32, rk_key, rk_val)?;
        fs.freereg = reg;
        Ok(())
    }

    fn close_list_field(&mut self, t: &ExpDesc, cc: &mut ConsControl) -> LuaResult<()> {
        if cc.v.kind == ExpKind::Void {
            return Ok(());
        }
        self.fs().exp2nextreg(&mut cc.v)?;
        cc.v = ExpDesc::void();
        if cc.tostore == FIELDS_PER_FLUSH {
            self.fs()
                .set_list(t.info as u32, cc.na, cc.tostore as i32)?;
            cc.tostore = 0;
        }
        Ok(())
    }

    fn last_list_field(&mut self, t: &ExpDesc, cc: &mut ConsControl) -> LuaResult<()> {
        if cc.tostore == 0 {
            return Ok(());
        }
        if cc.v.has_multret() {
            self.fs().set_multret(&mut cc.v)?;
            self.fs().set_list(t.info as u32, cc.na, MULTRET)?;
            // the multi-value expression is not counted in the size hint
            cc.na -= 1;
        } else {
            if cc.v.kind != ExpKind::Void {
                self.fs().exp2nextreg(&mut cc.v)?;
            }
            self.fs()
                .set_list(t.info as u32, cc.na, cc.tostore as i32)?;
        }
        Ok(())
    }

    // ---- function bodies ----

    fn body(&mut self, needself: bool, line: u32) -> LuaResult<ExpDesc> {
        self.open_func(line);
        self.check_next_char(b'(')?;
        if needself {
            let fs = self.fs();
            fs.new_local(SmolStr::new("self"))?;
            fs.adjust_locals(1);
        }
        self.parlist()?;
        self.check_next_char(b')')?;
        self.chunk_body()?;
        self.fs().chunk.last_line_defined = self.lex.token_line;
        self.check_match(&Token::End, &Token::Function, line)?;
        let child = self.close_func()?;
        self.push_closure(child)
    }

    fn parlist(&mut self) -> LuaResult<()> {
        let mut nparams = 0u32;
        if self.lex.token != Token::Char(b')') {
            loop {
                match &self.lex.token {
                    Token::Name(_) => {
                        let name = self.check_name()?;
                        self.fs().new_local(name)?;
                        nparams += 1;
                    }
                    Token::Dots => {
                        self.lex.next_token()?;
                        self.fs().chunk.is_vararg = true;
                        break;
                    }
                    _ => return Err(self.syntax_error("<name> or '...' expected")),
                }
                if self.fs().chunk.is_vararg || !self.test_next_char(b',')? {
                    break;
                }
            }
        }
        let fs = self.fs();
        fs.adjust_locals(nparams);
        fs.chunk.num_params = fs.nactvar as u8;
        let n = fs.nactvar;
        fs.reserve_regs(n)
    }

    fn push_closure(&mut self, child: FuncState) -> LuaResult<ExpDesc> {
        let upvalues = child.upvalues;
        let fs = self.fs();
        fs.chunk.protos.push(Rc::new(child.chunk));
        let idx = (fs.chunk.protos.len() - 1) as u32;
        let pc = fs.code_abx(OpCode::Closure, 0, idx)?;
        for uv in &upvalues {
            let op = if uv.in_stack {
                OpCode::Move
            } else {
                OpCode::GetUpval
            };
            fs.code_abc(op, 0, uv.index, 0)?;
        }
        Ok(ExpDesc::new(ExpKind::Reloc, pc))
    }

    // ---- statements ----

    /// Parse one statement; true when it must be the last of its block.
    fn statement(&mut self) -> LuaResult<bool> {
        let line = self.lex.token_line;
        match self.lex.token {
            Token::If => {
                self.if_stat(line)?;
                Ok(false)
            }
            Token::While => {
                self.while_stat(line)?;
                Ok(false)
            }
            Token::Do => {
                self.lex.next_token()?;
                self.block()?;
                self.check_match(&Token::End, &Token::Do, line)?;
                Ok(false)
            }
            Token::For => {
                self.for_stat(line)?;
                Ok(false)
            }
            Token::Repeat => {
                self.repeat_stat(line)?;
                Ok(false)
            }
            Token::Function => {
                self.func_stat(line)?;
                Ok(false)
            }
            Token::Local => {
                self.lex.next_token()?;
                if self.test_next(&Token::Function)? {
                    self.local_func(line)?;
                } else {
                    self.local_stat()?;
                }
                Ok(false)
            }
            Token::Return => {
                self.return_stat()?;
                Ok(true)
            }
            Token::Break => {
                self.lex.next_token()?;
                self.break_stat()?;
                Ok(true)
            }
            _ => {
                self.expr_stat()?;
                Ok(false)
            }
        }
    }

    fn cond(&mut self) -> LuaResult<i32> {
        let mut v = self.expr()?;
        if v.kind == ExpKind::Nil {
            v.kind = ExpKind::False;
        }
        self.fs().go_if_true(&mut v)?;
        Ok(v.f)
    }

    fn test_then_block(&mut self) -> LuaResult<i32> {
        self.lex.next_token()?; // 'if' or 'elseif'
        let condexit = self.cond()?;
        self.check_next(&Token::Then)?;
        self.block()?;
        Ok(condexit)
    }

    fn if_stat(&mut self, line: u32) -> LuaResult<()> {
        let mut flist = self.test_then_block()?;
        let mut escapelist = NO_JUMP;
        while self.lex.token == Token::Elseif {
            let j = self.fs().jump()?;
            let fs = self.fs();
            fs.concat(&mut escapelist, j)?;
            fs.patch_to_here(flist)?;
            flist = self.test_then_block()?;
        }
        if self.lex.token == Token::Else {
            let j = self.fs().jump()?;
            let fs = self.fs();
            fs.concat(&mut escapelist, j)?;
            fs.patch_to_here(flist)?;
            self.lex.next_token()?;
            self.block()?;
        } else {
            self.fs().concat(&mut escapelist, flist)?;
        }
        self.fs().patch_to_here(escapelist)?;
        self.check_match(&Token::End, &Token::If, line)
    }

    fn while_stat(&mut self, line: u32) -> LuaResult<()> {
        self.lex.next_token()?;
        let while_init = self.fs().get_label();
        let condexit = self.cond()?;
        self.enter_block(true);
        self.check_next(&Token::Do)?;
        self.block()?;
        let j = self.fs().jump()?;
        self.fs().patch_list(j, while_init)?;
        self.check_match(&Token::End, &Token::While, line)?;
        self.leave_block()?;
        self.fs().patch_to_here(condexit)
    }

    fn repeat_stat(&mut self, line: u32) -> LuaResult<()> {
        let repeat_init = self.fs().get_label();
        self.enter_block(true); // loop block
        self.enter_block(false); // scope block
        self.lex.next_token()?;
        self.chunk_body()?;
        self.check_match(&Token::Until, &Token::Repeat, line)?;
        // the condition can still see the loop body's locals
        let condexit = self.cond()?;
        let scope_has_upval = self.fs().blocks.last().map_or(false, |b| b.upval);
        if !scope_has_upval {
            self.leave_block()?;
            self.fs().patch_list(condexit, repeat_init)?;
        } else {
            // captured locals must be closed each iteration
            self.break_stat()?;
            self.fs().patch_to_here(condexit)?;
            self.leave_block()?;
            let j = self.fs().jump()?;
            self.fs().patch_list(j, repeat_init)?;
        }
        self.leave_block()
    }

    fn exp1(&mut self) -> LuaResult<()> {
        let mut e = self.expr()?;
        self.fs().exp2nextreg(&mut e)
    }

    fn for_stat(&mut self, line: u32) -> LuaResult<()> {
        self.lex.next_token()?;
        self.enter_block(true);
        let name = self.check_name()?;
        match self.lex.token {
            Token::Char(b'=') => self.for_num(name, line)?,
            Token::Char(b',') | Token::In => self.for_list(name)?,
            _ => return Err(self.syntax_error("'=' or 'in' expected")),
        }
        self.check_match(&Token::End, &Token::For, line)?;
        self.leave_block()
    }

    fn for_num(&mut self, varname: SmolStr, line: u32) -> LuaResult<()> {
        let base = self.fs().freereg;
        {
            let fs = self.fs();
            fs.new_local(SmolStr::new("(for index)"))?;
            fs.new_local(SmolStr::new("(for limit)"))?;
            fs.new_local(SmolStr::new("(for step)"))?;
            fs.new_local(varname)?;
        }
        self.check_next_char(b'=')?;
        self.exp1()?; // initial value
        self.check_next_char(b',')?;
        self.exp1()?; // limit
        if self.test_next_char(b',')? {
            self.exp1()?; // step
        } else {
            let fs = self.fs();
            let k = fs.number_k(1.0) as u32;
            let reg = fs.freereg;
            fs.code_abx(OpCode::LoadK, reg, k)?;
            fs.reserve_regs(1)?;
        }
        self.for_body(base, line, 1, true)
    }

    fn for_list(&mut self, indexname: SmolStr) -> LuaResult<()> {
        let base = self.fs().freereg;
        let mut nvars = 1u32;
        {
            let fs = self.fs();
            fs.new_local(SmolStr::new("(for generator)"))?;
            fs.new_local(SmolStr::new("(for state)"))?;
            fs.new_local(SmolStr::new("(for control)"))?;
            fs.new_local(indexname)?;
        }
        while self.test_next_char(b',')? {
            let name = self.check_name()?;
            self.fs().new_local(name)?;
            nvars += 1;
        }
        self.check_next(&Token::In)?;
        let line = self.lex.token_line;
        let (nexps, mut e) = self.explist1()?;
        self.adjust_assign(3, nexps, &mut e)?;
        self.fs().check_stack(3)?; // room to call the generator
        self.for_body(base, line, nvars, false)
    }

    fn for_body(&mut self, base: u32, line: u32, nvars: u32, isnum: bool) -> LuaResult<()> {
        self.fs().adjust_locals(3); // control variables
        self.check_next(&Token::Do)?;
        let prep = if isnum {
            self.fs().code_asbx(OpCode::ForPrep, base, NO_JUMP)?
        } else {
            self.fs().jump()?
        };
        self.enter_block(false); // scope for declared variables
        {
            let fs = self.fs();
            fs.adjust_locals(nvars);
            fs.reserve_regs(nvars)?;
        }
        self.block()?;
        self.leave_block()?;
        let fs = self.fs();
        fs.patch_to_here(prep)?;
        let endfor = if isnum {
            fs.code_asbx(OpCode::ForLoop, base, NO_JUMP)?
        } else {
            fs.code_abc(OpCode::TForLoop, base, 0, nvars)?
        };
        fs.fix_line(line); // pretend the loop op starts the loop
        let back = if isnum { endfor } else { fs.jump()? };
        fs.patch_list(back, prep + 1)
    }

    fn func_name(&mut self) -> LuaResult<(ExpDesc, bool)> {
        let mut v = self.single_var()?;
        while self.lex.token == Token::Char(b'.') {
            self.field_sel(&mut v)?;
        }
        let mut needself = false;
        if self.lex.token == Token::Char(b':') {
            needself = true;
            self.field_sel(&mut v)?;
        }
        Ok((v, needself))
    }

    fn func_stat(&mut self, line: u32) -> LuaResult<()> {
        self.lex.next_token()?;
        let (v, needself) = self.func_name()?;
        let mut b = self.body(needself, line)?;
        self.fs().store_var(&v, &mut b)?;
        self.fs().fix_line(line);
        Ok(())
    }

    fn local_func(&mut self, line: u32) -> LuaResult<()> {
        let name = self.check_name()?;
        let v;
        {
            let fs = self.fs();
            fs.new_local(name)?;
            v = ExpDesc::new(ExpKind::Local, fs.freereg as i32);
            fs.reserve_regs(1)?;
            fs.adjust_locals(1);
        }
        let mut b = self.body(false, line)?;
        let fs = self.fs();
        fs.store_var(&v, &mut b)?;
        // the local function can see itself from its first instruction
        let pc = fs.pc() as u32;
        let lv = *fs.actvar.last().expect("just declared");
        fs.chunk.locvars[lv].start_pc = pc;
        Ok(())
    }

    fn local_stat(&mut self) -> LuaResult<()> {
        let mut nvars = 0u32;
        loop {
            let name = self.check_name()?;
            self.fs().new_local(name)?;
            nvars += 1;
            if !self.test_next_char(b',')? {
                break;
            }
        }
        let (nexps, mut e) = if self.test_next_char(b'=')? {
            self.explist1()?
        } else {
            (0, ExpDesc::void())
        };
        self.adjust_assign(nvars, nexps, &mut e)?;
        self.fs().adjust_locals(nvars);
        Ok(())
    }

    fn adjust_assign(&mut self, nvars: u32, nexps: u32, e: &mut ExpDesc) -> LuaResult<()> {
        let fs = self.fs();
        let mut extra = nvars as i32 - nexps as i32;
        if e.has_multret() {
            extra += 1; // includes the call itself
            if extra < 0 {
                extra = 0;
            }
            fs.set_returns(e, extra)?;
            if extra > 1 {
                fs.reserve_regs((extra - 1) as u32)?;
            }
        } else {
            if e.kind != ExpKind::Void {
                fs.exp2nextreg(e)?;
            }
            if extra > 0 {
                let reg = fs.freereg;
                fs.reserve_regs(extra as u32)?;
                fs.emit_nil(reg, extra as u32)?;
            }
        }
        Ok(())
    }

    fn is_var_kind(kind: ExpKind) -> bool {
        matches!(
            kind,
            ExpKind::Local | ExpKind::Upval | ExpKind::Global | ExpKind::Indexed
        )
    }

    fn expr_stat(&mut self) -> LuaResult<()> {
        let v = self.primary_exp()?;
        if v.kind == ExpKind::Call {
            // statement call: discard all results
            self.fs().chunk.code[v.info as usize].set_c(1);
            Ok(())
        } else {
            self.assignment(v)
        }
    }

    fn assignment(&mut self, first: ExpDesc) -> LuaResult<()> {
        if !Self::is_var_kind(first.kind) {
            return Err(self.syntax_error("syntax error"));
        }
        let mut targets = vec![first];
        while self.test_next_char(b',')? {
            let nv = self.primary_exp()?;
            if !Self::is_var_kind(nv.kind) {
                return Err(self.syntax_error("syntax error"));
            }
            if nv.kind == ExpKind::Local {
                self.check_conflict(&mut targets, &nv)?;
            }
            targets.push(nv);
        }
        self.check_next_char(b'=')?;
        let (nexps, mut e) = self.explist1()?;
        let nvars = targets.len() as u32;
        if nexps != nvars {
            self.adjust_assign(nvars, nexps, &mut e)?;
            if nexps > nvars {
                self.fs().freereg -= nexps - nvars; // drop extra values
            }
        } else {
            let fs = self.fs();
            fs.set_one_ret(&mut e);
            fs.store_var(targets.last().expect("nonempty"), &mut e)?;
            targets.pop();
        }
        // remaining targets take consecutive registers, last to first
        for t in targets.iter().rev() {
            let fs = self.fs();
            let mut v = ExpDesc::new(ExpKind::NonReloc, fs.freereg as i32 - 1);
            fs.store_var(t, &mut v)?;
        }
        Ok(())
    }

    /// A later target shadows a local used as table or key by an earlier
    /// indexed target; evaluate through a safe copy.
    fn check_conflict(&mut self, targets: &mut [ExpDesc], nv: &ExpDesc) -> LuaResult<()> {
        let fs = self.fs();
        let extra = fs.freereg as i32;
        let mut conflict = false;
        for t in targets.iter_mut() {
            if t.kind == ExpKind::Indexed {
                if t.info == nv.info {
                    conflict = true;
                    t.info = extra;
                }
                if t.aux == nv.info {
                    conflict = true;
                    t.aux = extra;
                }
            }
        }
        if conflict {
            fs.code_abc(OpCode::Move, extra as u32, nv.info as u32, 0)?;
            fs.reserve_regs(1)?;
        }
        Ok(())
    }

    fn return_stat(&mut self) -> LuaResult<()> {
        self.lex.next_token()?; // 'return'
        let (first, nret);
        if self.block_follow() || self.lex.token == Token::Char(b';') {
            first = 0;
            nret = 0;
        } else {
            let (n, mut e) = self.explist1()?;
            if e.has_multret() {
                self.fs().set_multret(&mut e)?;
                if e.kind == ExpKind::Call && n == 1 {
                    // lone call: turn it into a tail call
                    let fs = self.fs();
                    let nact = fs.nactvar;
                    let i = &mut fs.chunk.code[e.info as usize];
                    i.set_opcode(OpCode::TailCall);
                    debug_assert_eq!(i.a(), nact);
                }
                first = self.fs().nactvar;
                nret = MULTRET;
            } else if n == 1 {
                first = self.fs().exp2anyreg(&mut e)?;
                nret = 1;
            } else {
                let fs = self.fs();
                fs.exp2nextreg(&mut e)?;
                first = fs.nactvar;
                nret = (fs.freereg - first) as i32;
                debug_assert_eq!(nret as u32, n);
            }
        }
        self.fs().ret(first, nret)
    }

    fn break_stat(&mut self) -> LuaResult<()> {
        let fs = self.fs();
        let mut upval = false;
        let mut target = None;
        for (i, bl) in fs.blocks.iter().enumerate().rev() {
            if bl.is_breakable {
                target = Some(i);
                break;
            }
            upval |= bl.upval;
        }
        let i = match target {
            Some(i) => i,
            None => return Err(fs.syntax_error("no loop to break")),
        };
        if upval {
            let level = fs.blocks[i].nactvar;
            fs.code_abc(OpCode::Close, level, 0, 0)?;
        }
        let j = fs.jump()?;
        let mut list = fs.blocks[i].breaklist;
        fs.concat(&mut list, j)?;
        fs.blocks[i].breaklist = list;
        Ok(())
    }
}
