use std::cell::RefCell;
use std::rc::Rc;

use crate::lua_value::{
    Chunk, CoroutineStatus, LuaClosure, LuaFunction, LuaTable, LuaValue, NativeFunction,
    ResumeTarget, ThreadRef, Upvalue, UpvalueRef,
};
use crate::lua_vm::debug::HookEvent;
use crate::lua_vm::metamethod::{MetaEvent, MAX_META_DEPTH};
use crate::lua_vm::opcode::{fb_to_int, index_k, is_k, OpCode, FIELDS_PER_FLUSH};
use crate::lua_vm::{CallFrame, LuaError, LuaResult, LuaVM, SavedContext};

/// Call-frame nesting limit; exceeding it is a catchable "stack overflow".
pub const MAX_FRAMES: usize = 200;
/// Hard cap on one thread's value stack.
pub const MAX_VALUE_STACK: usize = 1 << 20;

/// How a dispatch loop ended: the frame at the floor returned, or the
/// running coroutine suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Return,
    Yield,
}

/// Outcome of resuming a coroutine.
pub enum Resume {
    /// The body returned; payload is its return values.
    Return(Vec<LuaValue>),
    /// The body suspended; payload is what it passed to yield.
    Yield(Vec<LuaValue>),
    /// The body raised; the coroutine is now dead.
    Error(LuaValue),
}

impl LuaVM {
    pub(crate) fn sget(&self, i: usize) -> LuaValue {
        self.exec.stack.borrow()[i].clone()
    }

    pub(crate) fn sset(&self, i: usize, v: LuaValue) {
        self.exec.stack.borrow_mut()[i] = v;
    }

    pub(crate) fn ensure_stack(&mut self, need: usize) -> LuaResult<()> {
        let len = self.exec.stack.borrow().len();
        if need > len {
            if need > MAX_VALUE_STACK {
                return Err(LuaError::StackOverflow);
            }
            let new_len = need.max(len * 2).min(MAX_VALUE_STACK);
            self.exec.stack.borrow_mut().resize(new_len, LuaValue::Nil);
        }
        Ok(())
    }

    /// `source:line:` of the innermost Lua frame, for error decoration.
    pub(crate) fn where_prefix(&self) -> String {
        match self.exec.frames.last() {
            Some(f) => {
                let line = f.closure.proto.line_at(f.pc.saturating_sub(1));
                format!("{}:{}: ", f.closure.proto.source, line)
            }
            None => String::new(),
        }
    }

    pub(crate) fn rt_error(&self, msg: impl AsRef<str>) -> LuaError {
        LuaError::runtime(format!("{}{}", self.where_prefix(), msg.as_ref()))
    }

    fn rk(&self, base: usize, constants: &[LuaValue], x: u32) -> LuaResult<LuaValue> {
        if is_k(x) {
            constants
                .get(index_k(x))
                .cloned()
                .ok_or_else(|| LuaError::runtime("constant index out of range"))
        } else {
            Ok(self.sget(base + x as usize))
        }
    }

    fn konst(&self, proto: &Chunk, idx: u32) -> LuaResult<LuaValue> {
        proto
            .constants
            .get(idx as usize)
            .cloned()
            .ok_or_else(|| LuaError::runtime("constant index out of range"))
    }

    fn skip_next(&mut self) {
        if let Some(f) = self.exec.frames.last_mut() {
            f.pc += 1;
        }
    }

    fn jump(&mut self, sbx: i32, code_len: usize) -> LuaResult<()> {
        let f = self
            .exec
            .frames
            .last_mut()
            .ok_or_else(|| LuaError::runtime("jump without a frame"))?;
        let target = f.pc as i64 + sbx as i64;
        if target < 0 || target > code_len as i64 {
            return Err(LuaError::runtime("jump target out of range"));
        }
        f.pc = target as usize;
        Ok(())
    }

    /// The open upvalue cell for a stack slot, creating it on first capture.
    pub(crate) fn find_upvalue(&mut self, slot: usize) -> UpvalueRef {
        for uv in &self.exec.open_upvalues {
            if let Upvalue::Open { slot: s, .. } = &*uv.borrow() {
                if *s == slot {
                    return uv.clone();
                }
            }
        }
        let uv = Rc::new(RefCell::new(Upvalue::Open {
            stack: self.exec.stack.clone(),
            slot,
        }));
        self.exec.open_upvalues.push(uv.clone());
        uv
    }

    /// Snapshot every open upvalue at or above `level` into its cell.
    pub(crate) fn close_upvalues(&mut self, level: usize) {
        let mut i = 0;
        while i < self.exec.open_upvalues.len() {
            let slot = match &*self.exec.open_upvalues[i].borrow() {
                Upvalue::Open { slot, .. } if *slot >= level => Some(*slot),
                _ => None,
            };
            match slot {
                Some(s) => {
                    let v = self.exec.stack.borrow()[s].clone();
                    *self.exec.open_upvalues[i].borrow_mut() = Upvalue::Closed(v);
                    self.exec.open_upvalues.swap_remove(i);
                }
                None => i += 1,
            }
        }
    }

    /// Resolve the value at `func_slot` to a function, unwrapping `__call`
    /// handlers by shifting the arguments right and inserting the original
    /// value as the first argument.
    pub(crate) fn resolve_callable(
        &mut self,
        func_slot: usize,
        nargs: &mut usize,
    ) -> LuaResult<LuaFunction> {
        for _ in 0..MAX_META_DEPTH {
            let v = self.sget(func_slot);
            if let LuaValue::Function(f) = v {
                return Ok(f);
            }
            let handler = self
                .metamethod_of(&v, MetaEvent::Call)
                .ok_or_else(|| self.rt_error(format!("attempt to call a {} value", v.type_name())))?;
            self.ensure_stack(func_slot + 2 + *nargs)?;
            {
                let mut s = self.exec.stack.borrow_mut();
                for j in (0..=*nargs).rev() {
                    s[func_slot + 1 + j] = s[func_slot + j].clone();
                }
                s[func_slot] = handler;
            }
            *nargs += 1;
            self.exec.top = func_slot + 1 + *nargs;
        }
        Err(self.rt_error("'__call' chain too long; possible loop"))
    }

    /// Push a frame for a Lua closure. The caller has placed the function
    /// at `func_slot` and `nargs` arguments right after it.
    pub(crate) fn precall(
        &mut self,
        cl: Rc<LuaClosure>,
        func_slot: usize,
        nargs: usize,
        want: i32,
    ) -> LuaResult<()> {
        if self.exec.frames.len() >= MAX_FRAMES {
            return Err(LuaError::StackOverflow);
        }
        let proto = cl.proto.clone();
        let nparams = proto.num_params as usize;
        let max_stack = proto.max_stack as usize;
        let base;
        let num_varargs;
        if proto.is_vararg {
            // fixed parameters move above the arguments; the leftovers
            // stay below the new base for VARARG to read
            base = func_slot + 1 + nargs;
            self.ensure_stack(base + 256)?;
            let fixed = nargs.min(nparams);
            {
                let mut s = self.exec.stack.borrow_mut();
                for j in 0..fixed {
                    s[base + j] = std::mem::replace(&mut s[func_slot + 1 + j], LuaValue::Nil);
                }
                for j in fixed..max_stack {
                    s[base + j] = LuaValue::Nil;
                }
            }
            num_varargs = nargs.saturating_sub(nparams);
        } else {
            base = func_slot + 1;
            self.ensure_stack(base + 256)?;
            {
                // registers beyond the declared parameters start out nil
                let mut s = self.exec.stack.borrow_mut();
                for j in nargs.min(nparams)..max_stack {
                    s[base + j] = LuaValue::Nil;
                }
            }
            num_varargs = 0;
        }
        let mut frame = CallFrame::new(cl, func_slot, base, want);
        frame.num_varargs = num_varargs;
        self.exec.frames.push(frame);
        self.exec.top = base + max_stack;
        self.fire_hook(HookEvent::Call)?;
        Ok(())
    }

    /// Run a native function in place: arguments at `func_slot+1..`,
    /// results moved down to start at `func_slot`.
    pub(crate) fn call_native(
        &mut self,
        nf: &NativeFunction,
        func_slot: usize,
        nargs: usize,
        want: i32,
    ) -> LuaResult<()> {
        let base = func_slot + 1;
        self.ensure_stack(base + nargs)?;
        self.exec.top = base + nargs;
        let saved_base = std::mem::replace(&mut self.native_base, base);
        let saved_name = std::mem::replace(&mut self.native_name, nf.name.clone());
        let func = nf.func.clone();
        let outcome = func(self);
        self.native_base = saved_base;
        self.native_name = saved_name;
        let n = outcome?;
        let first = self
            .exec
            .top
            .checked_sub(n)
            .filter(|f| *f >= func_slot)
            .ok_or_else(|| {
                LuaError::runtime(format!(
                    "native function '{}' returned more results than it pushed",
                    nf.name
                ))
            })?;
        {
            let mut s = self.exec.stack.borrow_mut();
            for j in 0..n {
                s[func_slot + j] = s[first + j].clone();
            }
        }
        if want < 0 {
            self.exec.top = func_slot + n;
        } else {
            let w = want as usize;
            self.ensure_stack(func_slot + w)?;
            let mut s = self.exec.stack.borrow_mut();
            for j in n..w {
                s[func_slot + j] = LuaValue::Nil;
            }
            drop(s);
            self.exec.top = func_slot + w;
        }
        Ok(())
    }

    /// Call whatever sits at `func_slot`. Used by the host API, metamethod
    /// dispatch and the generic for loop; yields cannot cross it.
    pub(crate) fn call_at(&mut self, func_slot: usize, nargs: usize, want: i32) -> LuaResult<()> {
        let mut nargs = nargs;
        let callee = self.resolve_callable(func_slot, &mut nargs)?;
        match callee {
            LuaFunction::Native(nf) => {
                self.call_native(&nf, func_slot, nargs, want)?;
                if self.pending_yield.is_some() {
                    self.pending_yield = None;
                    return Err(self.rt_error("attempt to yield across C-call boundary"));
                }
                Ok(())
            }
            LuaFunction::Closure(cl) => {
                let floor = self.exec.frames.len();
                self.precall(cl, func_slot, nargs, want)?;
                match self.run(floor)? {
                    Flow::Return => Ok(()),
                    Flow::Yield => {
                        self.pending_yield = None;
                        Err(self.rt_error("attempt to yield across C-call boundary"))
                    }
                }
            }
        }
    }

    /// Call a function value with plain argument/result vectors.
    pub fn call_value(&mut self, f: &LuaValue, args: &[LuaValue]) -> LuaResult<Vec<LuaValue>> {
        let func_slot = self.exec.top;
        self.ensure_stack(func_slot + 1 + args.len())?;
        {
            let mut s = self.exec.stack.borrow_mut();
            s[func_slot] = f.clone();
            for (j, a) in args.iter().enumerate() {
                s[func_slot + 1 + j] = a.clone();
            }
        }
        self.exec.top = func_slot + 1 + args.len();
        self.call_at(func_slot, args.len(), -1)?;
        let results = {
            let s = self.exec.stack.borrow();
            s[func_slot..self.exec.top].to_vec()
        };
        self.exec.top = func_slot;
        Ok(results)
    }

    /// Protected call: errors are caught, the stack is unwound back to the
    /// call point, and the error value is returned.
    pub fn pcall_value(&mut self, f: &LuaValue, args: &[LuaValue]) -> Result<Vec<LuaValue>, LuaValue> {
        let frames = self.exec.frames.len();
        let top = self.exec.top;
        match self.call_value(f, args) {
            Ok(r) => Ok(r),
            Err(e) => {
                self.close_upvalues(top);
                self.exec.frames.truncate(frames);
                self.exec.top = top;
                Err(e.value())
            }
        }
    }

    fn do_return(&mut self, first: usize, n: usize, floor: usize) -> LuaResult<bool> {
        self.fire_hook(HookEvent::Return)?;
        let frame = self
            .exec
            .frames
            .pop()
            .ok_or_else(|| LuaError::runtime("return without a frame"))?;
        self.close_upvalues(frame.base);
        let fslot = frame.func_slot;
        {
            let mut s = self.exec.stack.borrow_mut();
            for j in 0..n {
                s[fslot + j] = s[first + j].clone();
            }
        }
        if frame.want < 0 {
            self.exec.top = fslot + n;
        } else {
            let w = frame.want as usize;
            self.ensure_stack(fslot + w)?;
            {
                let mut s = self.exec.stack.borrow_mut();
                for j in n..w {
                    s[fslot + j] = LuaValue::Nil;
                }
            }
            self.exec.top = match self.exec.frames.last() {
                Some(caller) => caller.base + caller.closure.proto.max_stack as usize,
                None => fslot + w,
            };
        }
        Ok(self.exec.frames.len() <= floor)
    }

    pub(crate) fn run(&mut self, floor: usize) -> LuaResult<Flow> {
        self.run_depth += 1;
        let r = self.run_inner(floor);
        self.run_depth -= 1;
        r
    }

    fn run_inner(&mut self, floor: usize) -> LuaResult<Flow> {
        loop {
            if self.hook.is_some() && !self.in_hook {
                self.pre_instruction_hooks()?;
                if self.pending_yield.is_some() {
                    if self.yieldable_at == Some(self.run_depth) {
                        // suspend before the pending instruction so it
                        // re-executes on resume
                        self.staged_resume_target = None;
                        return Ok(Flow::Yield);
                    }
                    self.pending_yield = None;
                    return Err(self.rt_error("attempt to yield across C-call boundary"));
                }
            }
            let (proto, base, pc) = {
                let f = self
                    .exec
                    .frames
                    .last_mut()
                    .ok_or_else(|| LuaError::runtime("no active frame"))?;
                let p = f.closure.proto.clone();
                let pc = f.pc;
                f.pc += 1;
                (p, f.base, pc)
            };
            let i = *proto
                .code
                .get(pc)
                .ok_or_else(|| LuaError::runtime("control fell off the end of the function"))?;
            let op = i
                .opcode()
                .ok_or_else(|| LuaError::runtime("bad opcode in chunk"))?;
            let a = i.a() as usize;
            let ra = base + a;
            match op {
                OpCode::Move => {
                    let v = self.sget(base + i.b() as usize);
                    self.sset(ra, v);
                }
                OpCode::LoadK => {
                    let v = self.konst(&proto, i.bx())?;
                    self.sset(ra, v);
                }
                OpCode::LoadBool => {
                    self.sset(ra, LuaValue::Boolean(i.b() != 0));
                    if i.c() != 0 {
                        self.skip_next();
                    }
                }
                OpCode::LoadNil => {
                    let rb = base + i.b() as usize;
                    let mut s = self.exec.stack.borrow_mut();
                    for j in ra..=rb {
                        s[j] = LuaValue::Nil;
                    }
                }
                OpCode::GetUpval => {
                    let uv = {
                        let f = self
                            .exec
                            .frames
                            .last()
                            .ok_or_else(|| LuaError::runtime("no active frame"))?;
                        f.closure
                            .upvalues
                            .get(i.b() as usize)
                            .cloned()
                            .ok_or_else(|| LuaError::runtime("upvalue index out of range"))?
                    };
                    let v = uv.borrow().get();
                    self.sset(ra, v);
                }
                OpCode::SetUpval => {
                    let uv = {
                        let f = self
                            .exec
                            .frames
                            .last()
                            .ok_or_else(|| LuaError::runtime("no active frame"))?;
                        f.closure
                            .upvalues
                            .get(i.b() as usize)
                            .cloned()
                            .ok_or_else(|| LuaError::runtime("upvalue index out of range"))?
                    };
                    uv.borrow_mut().set(self.sget(ra));
                }
                OpCode::GetGlobal => {
                    let env = self.current_env()?;
                    let key = self.konst(&proto, i.bx())?;
                    let v = self.index_get(LuaValue::Table(env), key)?;
                    self.sset(ra, v);
                }
                OpCode::SetGlobal => {
                    let env = self.current_env()?;
                    let key = self.konst(&proto, i.bx())?;
                    let v = self.sget(ra);
                    self.index_set(LuaValue::Table(env), key, v)?;
                }
                OpCode::GetTable => {
                    let obj = self.sget(base + i.b() as usize);
                    let key = self.rk(base, &proto.constants, i.c())?;
                    let v = self.index_get(obj, key)?;
                    self.sset(ra, v);
                }
                OpCode::SetTable => {
                    let obj = self.sget(ra);
                    let key = self.rk(base, &proto.constants, i.b())?;
                    let v = self.rk(base, &proto.constants, i.c())?;
                    self.index_set(obj, key, v)?;
                }
                OpCode::NewTable => {
                    let narr = fb_to_int(i.b()) as usize;
                    let nrec = fb_to_int(i.c()) as usize;
                    self.sset(ra, LuaValue::from_table(LuaTable::with_capacity(narr, nrec)));
                }
                OpCode::SelfCall => {
                    let obj = self.sget(base + i.b() as usize);
                    self.sset(ra + 1, obj.clone());
                    let key = self.rk(base, &proto.constants, i.c())?;
                    let v = self.index_get(obj, key)?;
                    self.sset(ra, v);
                }
                OpCode::Add
                | OpCode::Sub
                | OpCode::Mul
                | OpCode::Div
                | OpCode::Mod
                | OpCode::Pow => {
                    let l = self.rk(base, &proto.constants, i.b())?;
                    let r = self.rk(base, &proto.constants, i.c())?;
                    let v = self.arith(op, l, r)?;
                    self.sset(ra, v);
                }
                OpCode::Unm => {
                    let v = self.sget(base + i.b() as usize);
                    let r = self.arith(OpCode::Unm, v.clone(), v)?;
                    self.sset(ra, r);
                }
                OpCode::Not => {
                    let v = self.sget(base + i.b() as usize);
                    self.sset(ra, LuaValue::Boolean(!v.is_truthy()));
                }
                OpCode::Len => {
                    let v = self.sget(base + i.b() as usize);
                    let r = self.length_of(&v)?;
                    self.sset(ra, r);
                }
                OpCode::Concat => {
                    let b = i.b() as usize;
                    let c = i.c() as usize;
                    let mut acc = self.sget(base + c);
                    let mut j = c;
                    while j > b {
                        j -= 1;
                        let lhs = self.sget(base + j);
                        acc = self.concat_pair(lhs, acc)?;
                    }
                    self.sset(ra, acc);
                }
                OpCode::Jmp => {
                    self.jump(i.sbx(), proto.code.len())?;
                }
                OpCode::Eq => {
                    let l = self.rk(base, &proto.constants, i.b())?;
                    let r = self.rk(base, &proto.constants, i.c())?;
                    let res = self.value_equals(&l, &r)?;
                    if res != (a != 0) {
                        self.skip_next();
                    }
                }
                OpCode::Lt => {
                    let l = self.rk(base, &proto.constants, i.b())?;
                    let r = self.rk(base, &proto.constants, i.c())?;
                    let res = self.less_than(&l, &r)?;
                    if res != (a != 0) {
                        self.skip_next();
                    }
                }
                OpCode::Le => {
                    let l = self.rk(base, &proto.constants, i.b())?;
                    let r = self.rk(base, &proto.constants, i.c())?;
                    let res = self.less_equal(&l, &r)?;
                    if res != (a != 0) {
                        self.skip_next();
                    }
                }
                OpCode::Test => {
                    if self.sget(ra).is_truthy() != (i.c() != 0) {
                        self.skip_next();
                    }
                }
                OpCode::TestSet => {
                    let v = self.sget(base + i.b() as usize);
                    if v.is_truthy() == (i.c() != 0) {
                        self.sset(ra, v);
                    } else {
                        self.skip_next();
                    }
                }
                OpCode::Call => {
                    let b = i.b() as usize;
                    let mut nargs = if b == 0 {
                        self.exec.top - ra - 1
                    } else {
                        b - 1
                    };
                    self.exec.top = ra + 1 + nargs;
                    let want = i.c() as i32 - 1;
                    let callee = self.resolve_callable(ra, &mut nargs)?;
                    match callee {
                        LuaFunction::Closure(cl) => {
                            self.precall(cl, ra, nargs, want)?;
                        }
                        LuaFunction::Native(nf) => {
                            self.call_native(&nf, ra, nargs, want)?;
                            if self.pending_yield.is_some() {
                                self.check_yield_at(ra, want)?;
                                return Ok(Flow::Yield);
                            }
                            if want >= 0 {
                                if let Some(f) = self.exec.frames.last() {
                                    self.exec.top = f.base + f.closure.proto.max_stack as usize;
                                }
                            }
                        }
                    }
                }
                OpCode::TailCall => {
                    let b = i.b() as usize;
                    let mut nargs = if b == 0 {
                        self.exec.top - ra - 1
                    } else {
                        b - 1
                    };
                    self.exec.top = ra + 1 + nargs;
                    let callee = self.resolve_callable(ra, &mut nargs)?;
                    match callee {
                        LuaFunction::Native(nf) => {
                            // behaves like an ordinary call; the RETURN
                            // that follows forwards every result
                            self.call_native(&nf, ra, nargs, -1)?;
                            if self.pending_yield.is_some() {
                                self.check_yield_at(ra, -1)?;
                                return Ok(Flow::Yield);
                            }
                        }
                        LuaFunction::Closure(cl) => {
                            self.close_upvalues(base);
                            let frame = self
                                .exec
                                .frames
                                .pop()
                                .ok_or_else(|| LuaError::runtime("tail call without a frame"))?;
                            let fslot = frame.func_slot;
                            {
                                let mut s = self.exec.stack.borrow_mut();
                                for j in 0..=nargs {
                                    s[fslot + j] = s[ra + j].clone();
                                }
                            }
                            self.exec.top = fslot + 1 + nargs;
                            self.precall(cl, fslot, nargs, frame.want)?;
                            if let Some(nf) = self.exec.frames.last_mut() {
                                nf.tail_calls = frame.tail_calls + 1;
                            }
                        }
                    }
                }
                OpCode::Return => {
                    let b = i.b() as usize;
                    let n = if b == 0 { self.exec.top - ra } else { b - 1 };
                    if self.do_return(ra, n, floor)? {
                        return Ok(Flow::Return);
                    }
                }
                OpCode::ForLoop => {
                    let step = self
                        .sget(ra + 2)
                        .as_number()
                        .ok_or_else(|| self.rt_error("'for' step must be a number"))?;
                    let idx = self
                        .sget(ra)
                        .as_number()
                        .ok_or_else(|| self.rt_error("'for' initial value must be a number"))?
                        + step;
                    let limit = self
                        .sget(ra + 1)
                        .as_number()
                        .ok_or_else(|| self.rt_error("'for' limit must be a number"))?;
                    let continuing = if step > 0.0 { idx <= limit } else { idx >= limit };
                    if continuing {
                        self.jump(i.sbx(), proto.code.len())?;
                        self.sset(ra, LuaValue::Number(idx));
                        self.sset(ra + 3, LuaValue::Number(idx));
                    }
                }
                OpCode::ForPrep => {
                    let init = self
                        .sget(ra)
                        .coerce_number()
                        .ok_or_else(|| self.rt_error("'for' initial value must be a number"))?;
                    let limit = self
                        .sget(ra + 1)
                        .coerce_number()
                        .ok_or_else(|| self.rt_error("'for' limit must be a number"))?;
                    let step = self
                        .sget(ra + 2)
                        .coerce_number()
                        .ok_or_else(|| self.rt_error("'for' step must be a number"))?;
                    self.sset(ra, LuaValue::Number(init - step));
                    self.sset(ra + 1, LuaValue::Number(limit));
                    self.sset(ra + 2, LuaValue::Number(step));
                    self.jump(i.sbx(), proto.code.len())?;
                }
                OpCode::TForLoop => {
                    let func = self.sget(ra);
                    let state = self.sget(ra + 1);
                    let ctrl = self.sget(ra + 2);
                    let results = self.call_value(&func, &[state, ctrl])?;
                    let nres = i.c() as usize;
                    self.ensure_stack(ra + 3 + nres)?;
                    for j in 0..nres {
                        self.sset(ra + 3 + j, results.get(j).cloned().unwrap_or(LuaValue::Nil));
                    }
                    let first = self.sget(ra + 3);
                    if !first.is_nil() {
                        self.sset(ra + 2, first);
                    } else {
                        // loop is over: skip the back-jump
                        self.skip_next();
                    }
                }
                OpCode::SetList => {
                    let b = i.b() as usize;
                    let n = if b == 0 { self.exec.top - ra - 1 } else { b };
                    let batch = if i.c() == 0 {
                        // count lives in the next code word
                        let f = self
                            .exec
                            .frames
                            .last_mut()
                            .ok_or_else(|| LuaError::runtime("no active frame"))?;
                        let raw = proto
                            .code
                            .get(f.pc)
                            .ok_or_else(|| LuaError::runtime("truncated SETLIST"))?
                            .0;
                        f.pc += 1;
                        raw as usize
                    } else {
                        i.c() as usize
                    };
                    let target = self.sget(ra);
                    let tref = target
                        .as_table()
                        .cloned()
                        .ok_or_else(|| self.rt_error("list initializer target is not a table"))?;
                    let offset = (batch - 1) * FIELDS_PER_FLUSH as usize;
                    {
                        let s = self.exec.stack.borrow();
                        let mut t = tref.borrow_mut();
                        for j in 1..=n {
                            t.set_int(offset + j, s[ra + j].clone());
                        }
                    }
                    if b == 0 {
                        if let Some(f) = self.exec.frames.last() {
                            self.exec.top = f.base + f.closure.proto.max_stack as usize;
                        }
                    }
                }
                OpCode::Close => {
                    self.close_upvalues(ra);
                }
                OpCode::Closure => {
                    let child = proto
                        .protos
                        .get(i.bx() as usize)
                        .cloned()
                        .ok_or_else(|| LuaError::runtime("prototype index out of range"))?;
                    let nups = child.nups as usize;
                    let cur = {
                        let f = self
                            .exec
                            .frames
                            .last()
                            .ok_or_else(|| LuaError::runtime("no active frame"))?;
                        f.closure.clone()
                    };
                    let mut ups = Vec::with_capacity(nups);
                    for j in 0..nups {
                        let pseudo = *proto
                            .code
                            .get(pc + 1 + j)
                            .ok_or_else(|| LuaError::runtime("truncated closure capture"))?;
                        match pseudo.opcode() {
                            Some(OpCode::Move) => {
                                ups.push(self.find_upvalue(base + pseudo.b() as usize));
                            }
                            Some(OpCode::GetUpval) => {
                                let uv = cur
                                    .upvalues
                                    .get(pseudo.b() as usize)
                                    .cloned()
                                    .ok_or_else(|| LuaError::runtime("upvalue index out of range"))?;
                                ups.push(uv);
                            }
                            _ => return Err(LuaError::runtime("bad closure capture")),
                        }
                    }
                    if let Some(f) = self.exec.frames.last_mut() {
                        f.pc = pc + 1 + nups;
                    }
                    let env = cur.env.borrow().clone();
                    let closure = LuaClosure {
                        proto: child,
                        upvalues: ups,
                        env: RefCell::new(env),
                    };
                    self.sset(
                        ra,
                        LuaValue::Function(LuaFunction::Closure(Rc::new(closure))),
                    );
                }
                OpCode::Vararg => {
                    let nvar = {
                        let f = self
                            .exec
                            .frames
                            .last()
                            .ok_or_else(|| LuaError::runtime("no active frame"))?;
                        f.num_varargs
                    };
                    let b = i.b() as usize;
                    if b == 0 {
                        self.ensure_stack(ra + nvar)?;
                        let mut s = self.exec.stack.borrow_mut();
                        for j in 0..nvar {
                            s[ra + j] = s[base - nvar + j].clone();
                        }
                        drop(s);
                        self.exec.top = ra + nvar;
                    } else {
                        let want = b - 1;
                        let mut s = self.exec.stack.borrow_mut();
                        for j in 0..want {
                            s[ra + j] = if j < nvar {
                                s[base - nvar + j].clone()
                            } else {
                                LuaValue::Nil
                            };
                        }
                    }
                }
            }
        }
    }

    /// Environment table of the running closure.
    fn current_env(&self) -> LuaResult<crate::lua_value::TableRef> {
        let f = self
            .exec
            .frames
            .last()
            .ok_or_else(|| LuaError::runtime("no active frame"))?;
        let env = f.closure.env.borrow().clone();
        Ok(env)
    }

    /// A native just requested a yield; either stage the resume target or
    /// reject the yield depending on where we are.
    fn check_yield_at(&mut self, result_slot: usize, want: i32) -> LuaResult<()> {
        match self.yieldable_at {
            Some(d) if d == self.run_depth => {
                self.staged_resume_target = Some(ResumeTarget { result_slot, want });
                Ok(())
            }
            Some(_) => {
                self.pending_yield = None;
                Err(self.rt_error("attempt to yield across C-call boundary"))
            }
            None => {
                self.pending_yield = None;
                Err(self.rt_error("attempt to yield from outside a coroutine"))
            }
        }
    }

    /// Resume a coroutine with `args`. Swaps the thread's execution state
    /// in, runs until it returns, yields or fails, and swaps back.
    pub fn resume(&mut self, co: &ThreadRef, args: Vec<LuaValue>) -> Resume {
        let status = co.borrow().status;
        match status {
            CoroutineStatus::Dead => {
                return Resume::Error(LuaValue::from_string("cannot resume dead coroutine"))
            }
            CoroutineStatus::Running | CoroutineStatus::Normal => {
                return Resume::Error(LuaValue::from_string(
                    "cannot resume non-suspended coroutine",
                ))
            }
            CoroutineStatus::Initial | CoroutineStatus::Suspended => {}
        }
        if self.saved.len() >= MAX_FRAMES {
            return Resume::Error(LuaValue::from_string("too many nested coroutines"));
        }
        if let Some(prev) = &self.current {
            prev.borrow_mut().status = CoroutineStatus::Normal;
        }
        let co_exec = std::mem::take(&mut co.borrow_mut().exec);
        let parked = std::mem::replace(&mut self.exec, co_exec);
        self.saved.push(SavedContext {
            thread: self.current.take(),
            exec: parked,
            yieldable_at: self.yieldable_at,
        });
        self.current = Some(co.clone());
        co.borrow_mut().status = CoroutineStatus::Running;
        self.yieldable_at = Some(self.run_depth + 1);

        let entry = co.borrow_mut().entry.take();
        let outcome = match entry {
            Some(f) => self.start_coroutine(f, args),
            None => self.reenter_coroutine(co, args),
        };
        let result = match outcome {
            Ok(Flow::Return) => {
                self.pending_yield = None;
                let values = {
                    let s = self.exec.stack.borrow();
                    s[0..self.exec.top].to_vec()
                };
                co.borrow_mut().status = CoroutineStatus::Dead;
                Resume::Return(values)
            }
            Ok(Flow::Yield) => {
                let values = self.pending_yield.take().unwrap_or_default();
                let mut c = co.borrow_mut();
                c.status = CoroutineStatus::Suspended;
                c.resume_target = self.staged_resume_target.take();
                Resume::Yield(values)
            }
            Err(e) => {
                co.borrow_mut().status = CoroutineStatus::Dead;
                Resume::Error(e.value())
            }
        };

        if let Some(saved) = self.saved.pop() {
            let co_exec = std::mem::replace(&mut self.exec, saved.exec);
            co.borrow_mut().exec = co_exec;
            self.yieldable_at = saved.yieldable_at;
            self.current = saved.thread;
        }
        if let Some(cur) = &self.current {
            cur.borrow_mut().status = CoroutineStatus::Running;
        }
        result
    }

    fn start_coroutine(&mut self, f: LuaValue, args: Vec<LuaValue>) -> LuaResult<Flow> {
        self.exec.stack.borrow_mut().clear();
        self.exec.frames.clear();
        self.exec.open_upvalues.clear();
        self.exec.top = 0;
        let nargs = args.len();
        self.ensure_stack(1 + nargs)?;
        {
            let mut s = self.exec.stack.borrow_mut();
            s[0] = f.clone();
            for (j, a) in args.into_iter().enumerate() {
                s[1 + j] = a;
            }
        }
        self.exec.top = 1 + nargs;
        match f {
            LuaValue::Function(LuaFunction::Closure(cl)) => {
                self.precall(cl, 0, nargs, -1)?;
                self.run(0)
            }
            _ => Err(LuaError::runtime("coroutine body is not a Lua function")),
        }
    }

    fn reenter_coroutine(&mut self, co: &ThreadRef, args: Vec<LuaValue>) -> LuaResult<Flow> {
        let target = co.borrow_mut().resume_target.take();
        if let Some(rt) = target {
            // deliver the resume arguments to the call site that yielded
            let n = args.len();
            let slot = rt.result_slot;
            if rt.want < 0 {
                self.ensure_stack(slot + n)?;
                {
                    let mut s = self.exec.stack.borrow_mut();
                    for (j, a) in args.into_iter().enumerate() {
                        s[slot + j] = a;
                    }
                }
                self.exec.top = slot + n;
            } else {
                let want = rt.want as usize;
                self.ensure_stack(slot + want.max(n))?;
                {
                    let mut s = self.exec.stack.borrow_mut();
                    let mut it = args.into_iter();
                    for j in 0..want {
                        s[slot + j] = it.next().unwrap_or(LuaValue::Nil);
                    }
                }
                if let Some(f) = self.exec.frames.last() {
                    self.exec.top = f.base + f.closure.proto.max_stack as usize;
                }
            }
        }
        self.run(0)
    }

    fn pre_instruction_hooks(&mut self) -> LuaResult<()> {
        let hook = match &self.hook {
            Some(h) => h.clone(),
            None => return Ok(()),
        };
        if self.exec.frames.is_empty() {
            return Ok(());
        }
        if hook.count > 0 {
            if self.hook_count_left <= 1 {
                self.hook_count_left = hook.count;
                self.fire_hook(HookEvent::Count)?;
            } else {
                self.hook_count_left -= 1;
            }
        }
        if hook.on_line {
            let changed = {
                let f = match self.exec.frames.last() {
                    Some(f) => f,
                    None => return Ok(()),
                };
                let line = f.closure.proto.line_at(f.pc);
                if line != f.hook_line {
                    Some(line)
                } else {
                    None
                }
            };
            if let Some(line) = changed {
                if let Some(f) = self.exec.frames.last_mut() {
                    f.hook_line = line;
                }
                self.fire_hook(HookEvent::Line)?;
            }
        }
        Ok(())
    }

    pub(crate) fn fire_hook(&mut self, event: HookEvent) -> LuaResult<()> {
        let hook = match &self.hook {
            Some(h) => h.clone(),
            None => return Ok(()),
        };
        let wanted = match event {
            HookEvent::Call => hook.on_call,
            HookEvent::Return => hook.on_return,
            HookEvent::Line => hook.on_line,
            HookEvent::Count => hook.count > 0,
        };
        if !wanted || self.in_hook {
            return Ok(());
        }
        let info = match self.exec.frames.last() {
            Some(f) => crate::lua_vm::debug::DebugInfo {
                event,
                line: f.closure.proto.line_at(f.pc),
                source: f.closure.proto.source.to_string(),
                what: if f.closure.proto.line_defined == 0 {
                    "main"
                } else {
                    "Lua"
                },
            },
            None => crate::lua_vm::debug::DebugInfo {
                event,
                line: 0,
                source: String::new(),
                what: "native",
            },
        };
        self.in_hook = true;
        let r = (hook.func)(self, &info);
        self.in_hook = false;
        match r? {
            crate::lua_vm::debug::HookAction::Continue => Ok(()),
            crate::lua_vm::debug::HookAction::Yield => {
                if self.pending_yield.is_none() {
                    self.pending_yield = Some(Vec::new());
                }
                Ok(())
            }
        }
    }
}
