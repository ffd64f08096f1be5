use crate::lua_value::{number_to_string, LuaValue, TableRef};
use crate::lua_vm::opcode::OpCode;
use crate::lua_vm::{LuaResult, LuaVM};

/// Longest `__index`/`__newindex` chain followed before the lookup is
/// declared a loop.
pub const MAX_META_DEPTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaEvent {
    Index,
    NewIndex,
    Call,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Unm,
    Concat,
    Len,
    Eq,
    Lt,
    Le,
    Tostring,
    Metatable,
}

impl MetaEvent {
    pub fn name(self) -> &'static str {
        match self {
            MetaEvent::Index => "__index",
            MetaEvent::NewIndex => "__newindex",
            MetaEvent::Call => "__call",
            MetaEvent::Add => "__add",
            MetaEvent::Sub => "__sub",
            MetaEvent::Mul => "__mul",
            MetaEvent::Div => "__div",
            MetaEvent::Mod => "__mod",
            MetaEvent::Pow => "__pow",
            MetaEvent::Unm => "__unm",
            MetaEvent::Concat => "__concat",
            MetaEvent::Len => "__len",
            MetaEvent::Eq => "__eq",
            MetaEvent::Lt => "__lt",
            MetaEvent::Le => "__le",
            MetaEvent::Tostring => "__tostring",
            MetaEvent::Metatable => "__metatable",
        }
    }
}

impl LuaVM {
    /// Metatable of any value. Strings share one table (installed by the
    /// string library); most other types have none.
    pub fn metatable_of(&self, v: &LuaValue) -> Option<TableRef> {
        match v {
            LuaValue::Table(t) => t.borrow().metatable(),
            LuaValue::Userdata(u) => u.metatable.borrow().clone(),
            LuaValue::String(_) => self.string_metatable.clone(),
            _ => None,
        }
    }

    /// Non-nil handler for `event` on `v`, if any.
    pub fn metamethod_of(&self, v: &LuaValue, event: MetaEvent) -> Option<LuaValue> {
        let mt = self.metatable_of(v)?;
        let h = mt.borrow().get_str(event.name());
        if h.is_nil() {
            None
        } else {
            Some(h)
        }
    }

    /// Call a handler and keep its first result.
    fn call_handler(&mut self, h: &LuaValue, args: &[LuaValue]) -> LuaResult<LuaValue> {
        let results = self.call_value(h, args)?;
        Ok(results.into_iter().next().unwrap_or(LuaValue::Nil))
    }

    /// `obj[key]` with full metamethod semantics. Table handlers chain
    /// until a raw hit, a function handler, or the depth limit.
    pub fn index_get(&mut self, obj: LuaValue, key: LuaValue) -> LuaResult<LuaValue> {
        let mut cur = obj;
        for _ in 0..MAX_META_DEPTH {
            if let LuaValue::Table(t) = &cur {
                let raw = t.borrow().get(&key);
                if !raw.is_nil() {
                    return Ok(raw);
                }
                match self.metamethod_of(&cur, MetaEvent::Index) {
                    None => return Ok(LuaValue::Nil),
                    Some(h @ LuaValue::Function(_)) => return self.call_handler(&h, &[cur, key]),
                    Some(next) => cur = next,
                }
            } else {
                match self.metamethod_of(&cur, MetaEvent::Index) {
                    None => {
                        return Err(
                            self.rt_error(format!("attempt to index a {} value", cur.type_name()))
                        )
                    }
                    Some(h @ LuaValue::Function(_)) => return self.call_handler(&h, &[cur, key]),
                    Some(next) => cur = next,
                }
            }
        }
        Err(self.rt_error("'__index' chain too long; possible loop"))
    }

    /// `obj[key] = value` with full metamethod semantics. `__newindex`
    /// fires only when the raw slot is empty.
    pub fn index_set(&mut self, obj: LuaValue, key: LuaValue, value: LuaValue) -> LuaResult<()> {
        let mut cur = obj;
        for _ in 0..MAX_META_DEPTH {
            if let LuaValue::Table(t) = &cur {
                let present = !t.borrow().get(&key).is_nil();
                if present {
                    t.borrow_mut()
                        .set(key, value)
                        .map_err(|m| self.rt_error(m))?;
                    return Ok(());
                }
                match self.metamethod_of(&cur, MetaEvent::NewIndex) {
                    None => {
                        t.borrow_mut()
                            .set(key, value)
                            .map_err(|m| self.rt_error(m))?;
                        return Ok(());
                    }
                    Some(h @ LuaValue::Function(_)) => {
                        self.call_value(&h, &[cur, key, value])?;
                        return Ok(());
                    }
                    Some(next) => cur = next,
                }
            } else {
                match self.metamethod_of(&cur, MetaEvent::NewIndex) {
                    None => {
                        return Err(
                            self.rt_error(format!("attempt to index a {} value", cur.type_name()))
                        )
                    }
                    Some(h @ LuaValue::Function(_)) => {
                        self.call_value(&h, &[cur, key, value])?;
                        return Ok(());
                    }
                    Some(next) => cur = next,
                }
            }
        }
        Err(self.rt_error("'__newindex' chain too long; possible loop"))
    }

    /// Arithmetic with number coercion of string operands, falling back
    /// to the operator's handler.
    pub fn arith(&mut self, op: OpCode, l: LuaValue, r: LuaValue) -> LuaResult<LuaValue> {
        if let (Some(a), Some(b)) = (l.coerce_number(), r.coerce_number()) {
            let n = match op {
                OpCode::Add => a + b,
                OpCode::Sub => a - b,
                OpCode::Mul => a * b,
                OpCode::Div => a / b,
                OpCode::Mod => a - (a / b).floor() * b,
                OpCode::Pow => a.powf(b),
                OpCode::Unm => -a,
                _ => return Err(self.rt_error("bad arithmetic opcode")),
            };
            return Ok(LuaValue::Number(n));
        }
        let event = match op {
            OpCode::Add => MetaEvent::Add,
            OpCode::Sub => MetaEvent::Sub,
            OpCode::Mul => MetaEvent::Mul,
            OpCode::Div => MetaEvent::Div,
            OpCode::Mod => MetaEvent::Mod,
            OpCode::Pow => MetaEvent::Pow,
            OpCode::Unm => MetaEvent::Unm,
            _ => return Err(self.rt_error("bad arithmetic opcode")),
        };
        let handler = self
            .metamethod_of(&l, event)
            .or_else(|| self.metamethod_of(&r, event));
        if let Some(h) = handler {
            return self.call_handler(&h, &[l, r]);
        }
        let bad = if l.coerce_number().is_none() { &l } else { &r };
        Err(self.rt_error(format!(
            "attempt to perform arithmetic on a {} value",
            bad.type_name()
        )))
    }

    /// Equality: raw for mismatched types; `__eq` fires only when both
    /// operands are tables (or both userdata) carrying the same handler.
    pub fn value_equals(&mut self, l: &LuaValue, r: &LuaValue) -> LuaResult<bool> {
        if l == r {
            return Ok(true);
        }
        let comparable = matches!(
            (l, r),
            (LuaValue::Table(_), LuaValue::Table(_))
                | (LuaValue::Userdata(_), LuaValue::Userdata(_))
        );
        if !comparable {
            return Ok(false);
        }
        let h1 = self.metamethod_of(l, MetaEvent::Eq);
        let h2 = self.metamethod_of(r, MetaEvent::Eq);
        match (h1, h2) {
            (Some(a), Some(b)) if a == b => {
                let v = self.call_handler(&a, &[l.clone(), r.clone()])?;
                Ok(v.is_truthy())
            }
            _ => Ok(false),
        }
    }

    fn compare_error(&self, l: &LuaValue, r: &LuaValue) -> crate::lua_vm::LuaError {
        if l.type_name() == r.type_name() {
            self.rt_error(format!("attempt to compare two {} values", l.type_name()))
        } else {
            self.rt_error(format!(
                "attempt to compare {} with {}",
                l.type_name(),
                r.type_name()
            ))
        }
    }

    pub fn less_than(&mut self, l: &LuaValue, r: &LuaValue) -> LuaResult<bool> {
        match (l, r) {
            (LuaValue::Number(a), LuaValue::Number(b)) => Ok(a < b),
            (LuaValue::String(a), LuaValue::String(b)) => Ok(a.as_ref() < b.as_ref()),
            _ => {
                let handler = self
                    .metamethod_of(l, MetaEvent::Lt)
                    .or_else(|| self.metamethod_of(r, MetaEvent::Lt));
                match handler {
                    Some(h) => Ok(self.call_handler(&h, &[l.clone(), r.clone()])?.is_truthy()),
                    None => Err(self.compare_error(l, r)),
                }
            }
        }
    }

    pub fn less_equal(&mut self, l: &LuaValue, r: &LuaValue) -> LuaResult<bool> {
        match (l, r) {
            (LuaValue::Number(a), LuaValue::Number(b)) => Ok(a <= b),
            (LuaValue::String(a), LuaValue::String(b)) => Ok(a.as_ref() <= b.as_ref()),
            _ => {
                let handler = self
                    .metamethod_of(l, MetaEvent::Le)
                    .or_else(|| self.metamethod_of(r, MetaEvent::Le));
                if let Some(h) = handler {
                    return Ok(self.call_handler(&h, &[l.clone(), r.clone()])?.is_truthy());
                }
                // a <= b as not (b < a)
                let lt = self
                    .metamethod_of(l, MetaEvent::Lt)
                    .or_else(|| self.metamethod_of(r, MetaEvent::Lt));
                match lt {
                    Some(h) => Ok(!self.call_handler(&h, &[r.clone(), l.clone()])?.is_truthy()),
                    None => Err(self.compare_error(l, r)),
                }
            }
        }
    }

    fn concat_str(v: &LuaValue) -> Option<String> {
        match v {
            LuaValue::String(s) => Some(s.to_string()),
            LuaValue::Number(n) => Some(number_to_string(*n)),
            _ => None,
        }
    }

    /// One step of `..`: strings and numbers join directly, anything else
    /// goes through `__concat` (left operand first).
    pub fn concat_pair(&mut self, l: LuaValue, r: LuaValue) -> LuaResult<LuaValue> {
        if let (Some(mut a), Some(b)) = (Self::concat_str(&l), Self::concat_str(&r)) {
            a.push_str(&b);
            return Ok(LuaValue::from_string(a));
        }
        let handler = self
            .metamethod_of(&l, MetaEvent::Concat)
            .or_else(|| self.metamethod_of(&r, MetaEvent::Concat));
        if let Some(h) = handler {
            return self.call_handler(&h, &[l, r]);
        }
        let bad = if Self::concat_str(&l).is_none() { &l } else { &r };
        Err(self.rt_error(format!(
            "attempt to concatenate a {} value",
            bad.type_name()
        )))
    }

    /// `#v`. Tables honor `__len` before the border rule; strings are
    /// byte length.
    pub fn length_of(&mut self, v: &LuaValue) -> LuaResult<LuaValue> {
        match v {
            LuaValue::String(s) => Ok(LuaValue::Number(s.len() as f64)),
            LuaValue::Table(t) => {
                if let Some(h) = self.metamethod_of(v, MetaEvent::Len) {
                    return self.call_handler(&h, &[v.clone()]);
                }
                Ok(LuaValue::Number(t.borrow().len() as f64))
            }
            _ => {
                if let Some(h) = self.metamethod_of(v, MetaEvent::Len) {
                    return self.call_handler(&h, &[v.clone()]);
                }
                Err(self.rt_error(format!(
                    "attempt to get length of a {} value",
                    v.type_name()
                )))
            }
        }
    }

    /// tostring with `__tostring`.
    pub fn tostring_value(&mut self, v: &LuaValue) -> LuaResult<String> {
        if let Some(h) = self.metamethod_of(v, MetaEvent::Tostring) {
            let r = self.call_handler(&h, &[v.clone()])?;
            return match r {
                LuaValue::String(s) => Ok(s.to_string()),
                LuaValue::Number(n) => Ok(number_to_string(n)),
                _ => Err(self.rt_error("'__tostring' must return a string")),
            };
        }
        Ok(v.display_string())
    }
}
