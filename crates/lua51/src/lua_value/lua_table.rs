use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::lua_value::{LuaFunction, LuaUserdata, LuaValue, TableRef, ThreadRef};

/// Hybrid Lua table: a dense array part for keys 1..=n plus a hash part
/// for everything else. Assigning nil removes hash keys and punches holes
/// in the array part; reads of absent keys yield nil.
pub struct LuaTable {
    array: Vec<LuaValue>,
    hash: HashMap<LuaKey, LuaValue, ahash::RandomState>,
    metatable: Option<TableRef>,
}

/// Hashable table key. Rejects nil and NaN at construction; integral
/// floats share one representation so `t[1]` and `t[1.0]` agree, and
/// -0.0 collapses onto 0.0.
#[derive(Clone)]
pub enum LuaKey {
    Boolean(bool),
    Number(u64),
    Str(Rc<str>),
    Table(TableRef),
    Function(LuaFunction),
    Userdata(Rc<LuaUserdata>),
    Thread(ThreadRef),
}

fn canonical_bits(n: f64) -> u64 {
    if n == 0.0 {
        0.0f64.to_bits()
    } else {
        n.to_bits()
    }
}

impl LuaKey {
    pub fn from_value(v: &LuaValue) -> Result<LuaKey, &'static str> {
        match v {
            LuaValue::Nil => Err("table index is nil"),
            LuaValue::Number(n) if n.is_nan() => Err("table index is NaN"),
            LuaValue::Number(n) => Ok(LuaKey::Number(canonical_bits(*n))),
            LuaValue::Boolean(b) => Ok(LuaKey::Boolean(*b)),
            LuaValue::String(s) => Ok(LuaKey::Str(s.clone())),
            LuaValue::Table(t) => Ok(LuaKey::Table(t.clone())),
            LuaValue::Function(f) => Ok(LuaKey::Function(f.clone())),
            LuaValue::Userdata(u) => Ok(LuaKey::Userdata(u.clone())),
            LuaValue::Thread(t) => Ok(LuaKey::Thread(t.clone())),
        }
    }

    pub fn to_value(&self) -> LuaValue {
        match self {
            LuaKey::Boolean(b) => LuaValue::Boolean(*b),
            LuaKey::Number(bits) => LuaValue::Number(f64::from_bits(*bits)),
            LuaKey::Str(s) => LuaValue::String(s.clone()),
            LuaKey::Table(t) => LuaValue::Table(t.clone()),
            LuaKey::Function(f) => LuaValue::Function(f.clone()),
            LuaKey::Userdata(u) => LuaValue::Userdata(u.clone()),
            LuaKey::Thread(t) => LuaValue::Thread(t.clone()),
        }
    }
}

impl PartialEq for LuaKey {
    fn eq(&self, other: &LuaKey) -> bool {
        match (self, other) {
            (LuaKey::Boolean(a), LuaKey::Boolean(b)) => a == b,
            (LuaKey::Number(a), LuaKey::Number(b)) => a == b,
            (LuaKey::Str(a), LuaKey::Str(b)) => a == b,
            (LuaKey::Table(a), LuaKey::Table(b)) => Rc::ptr_eq(a, b),
            (LuaKey::Function(a), LuaKey::Function(b)) => a == b,
            (LuaKey::Userdata(a), LuaKey::Userdata(b)) => Rc::ptr_eq(a, b),
            (LuaKey::Thread(a), LuaKey::Thread(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for LuaKey {}

impl Hash for LuaKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            LuaKey::Boolean(b) => {
                0u8.hash(state);
                b.hash(state);
            }
            LuaKey::Number(bits) => {
                1u8.hash(state);
                bits.hash(state);
            }
            LuaKey::Str(s) => {
                2u8.hash(state);
                s.as_bytes().hash(state);
            }
            LuaKey::Table(t) => {
                3u8.hash(state);
                (Rc::as_ptr(t) as usize).hash(state);
            }
            LuaKey::Function(LuaFunction::Closure(c)) => {
                4u8.hash(state);
                (Rc::as_ptr(c) as usize).hash(state);
            }
            LuaKey::Function(LuaFunction::Native(n)) => {
                5u8.hash(state);
                (Rc::as_ptr(&n.func) as *const () as usize).hash(state);
            }
            LuaKey::Userdata(u) => {
                6u8.hash(state);
                (Rc::as_ptr(u) as usize).hash(state);
            }
            LuaKey::Thread(t) => {
                7u8.hash(state);
                (Rc::as_ptr(t) as usize).hash(state);
            }
        }
    }
}

/// Positive integral index usable in the array part.
fn array_index(v: &LuaValue) -> Option<usize> {
    match v {
        LuaValue::Number(n) if n.floor() == *n && *n >= 1.0 && *n <= (usize::MAX / 2) as f64 => {
            Some(*n as usize)
        }
        _ => None,
    }
}

impl LuaTable {
    pub fn new() -> LuaTable {
        LuaTable {
            array: Vec::new(),
            hash: HashMap::default(),
            metatable: None,
        }
    }

    pub fn with_capacity(narr: usize, nrec: usize) -> LuaTable {
        LuaTable {
            array: Vec::with_capacity(narr),
            hash: HashMap::with_capacity_and_hasher(nrec, ahash::RandomState::default()),
            metatable: None,
        }
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.clone()
    }

    pub fn set_metatable(&mut self, mt: Option<TableRef>) {
        self.metatable = mt;
    }

    /// Raw read; never consults metamethods. Nil and NaN keys read as
    /// absent rather than erroring.
    pub fn get(&self, key: &LuaValue) -> LuaValue {
        if let Some(i) = array_index(key) {
            if i <= self.array.len() {
                return self.array[i - 1].clone();
            }
        }
        match LuaKey::from_value(key) {
            Ok(k) => self.hash.get(&k).cloned().unwrap_or(LuaValue::Nil),
            Err(_) => LuaValue::Nil,
        }
    }

    pub fn get_str(&self, key: &str) -> LuaValue {
        self.hash
            .get(&LuaKey::Str(Rc::from(key)))
            .cloned()
            .unwrap_or(LuaValue::Nil)
    }

    pub fn get_int(&self, i: usize) -> LuaValue {
        if i >= 1 && i <= self.array.len() {
            self.array[i - 1].clone()
        } else {
            self.hash
                .get(&LuaKey::Number(canonical_bits(i as f64)))
                .cloned()
                .unwrap_or(LuaValue::Nil)
        }
    }

    /// Raw write. Errors on nil or NaN keys.
    pub fn set(&mut self, key: LuaValue, value: LuaValue) -> Result<(), &'static str> {
        if let Some(i) = array_index(&key) {
            self.set_int(i, value);
            return Ok(());
        }
        let k = LuaKey::from_value(&key)?;
        if value.is_nil() {
            self.hash.remove(&k);
        } else {
            self.hash.insert(k, value);
        }
        Ok(())
    }

    pub fn set_str(&mut self, key: &str, value: LuaValue) {
        let k = LuaKey::Str(Rc::from(key));
        if value.is_nil() {
            self.hash.remove(&k);
        } else {
            self.hash.insert(k, value);
        }
    }

    pub fn set_int(&mut self, i: usize, value: LuaValue) {
        debug_assert!(i >= 1);
        let len = self.array.len();
        if i <= len {
            if value.is_nil() && i == len {
                self.array.pop();
                while matches!(self.array.last(), Some(LuaValue::Nil)) {
                    self.array.pop();
                }
            } else {
                self.array[i - 1] = value;
            }
        } else if i == len + 1 && !value.is_nil() {
            self.array.push(value);
            self.absorb_from_hash();
        } else {
            let k = LuaKey::Number(canonical_bits(i as f64));
            if value.is_nil() {
                self.hash.remove(&k);
            } else {
                self.hash.insert(k, value);
            }
        }
    }

    /// Pull keys that became contiguous with the array part out of the
    /// hash part.
    fn absorb_from_hash(&mut self) {
        loop {
            let next = self.array.len() + 1;
            let k = LuaKey::Number(canonical_bits(next as f64));
            match self.hash.remove(&k) {
                Some(v) => self.array.push(v),
                None => break,
            }
        }
    }

    /// A border: an n such that t[n] is non-nil and t[n+1] is nil. With
    /// holes present, any border may be returned.
    pub fn len(&self) -> usize {
        let n = self.array.len();
        if n > 0 && self.array[n - 1].is_nil() {
            // hole at the end: binary search inside the array part
            let mut i = 0usize;
            let mut j = n;
            while j - i > 1 {
                let m = (i + j) / 2;
                if self.array[m - 1].is_nil() {
                    j = m;
                } else {
                    i = m;
                }
            }
            return i;
        }
        if self.hash.is_empty() || self.get_int(n + 1).is_nil() {
            return n;
        }
        // keys continue in the hash part: double until past a border,
        // then binary search
        let mut i = n + 1;
        let mut j = i;
        loop {
            i = j;
            match j.checked_mul(2) {
                Some(j2) if !self.get_int(j2).is_nil() => j = j2,
                Some(j2) => {
                    j = j2;
                    break;
                }
                None => {
                    // pathological: fall back to linear scan
                    let mut k = 1;
                    while !self.get_int(k).is_nil() {
                        k += 1;
                    }
                    return k - 1;
                }
            }
        }
        while j - i > 1 {
            let m = (i + j) / 2;
            if self.get_int(m).is_nil() {
                j = m;
            } else {
                i = m;
            }
        }
        i
    }

    pub fn is_empty(&self) -> bool {
        self.array.iter().all(|v| v.is_nil()) && self.hash.is_empty()
    }

    /// Enumeration step: nil starts the walk, the last returned key
    /// continues it. Order is array part then hash part, stable while the
    /// table is unmodified. An unknown key is an error.
    pub fn next(&self, key: &LuaValue) -> Result<Option<(LuaValue, LuaValue)>, &'static str> {
        let start = match key {
            LuaValue::Nil => 0,
            _ => {
                if let Some(i) = array_index(key) {
                    if i <= self.array.len() {
                        i
                    } else {
                        return self.next_in_hash(key);
                    }
                } else {
                    return self.next_in_hash(key);
                }
            }
        };
        for (idx, v) in self.array.iter().enumerate().skip(start) {
            if !v.is_nil() {
                return Ok(Some((LuaValue::Number((idx + 1) as f64), v.clone())));
            }
        }
        Ok(self.first_hash_entry())
    }

    fn first_hash_entry(&self) -> Option<(LuaValue, LuaValue)> {
        self.hash
            .iter()
            .next()
            .map(|(k, v)| (k.to_value(), v.clone()))
    }

    fn next_in_hash(&self, key: &LuaValue) -> Result<Option<(LuaValue, LuaValue)>, &'static str> {
        let k = LuaKey::from_value(key).map_err(|_| "invalid key to 'next'")?;
        let mut it = self.hash.iter();
        for (cur, _) in it.by_ref() {
            if *cur == k {
                return Ok(it.next().map(|(nk, nv)| (nk.to_value(), nv.clone())));
            }
        }
        Err("invalid key to 'next'")
    }
}

impl Default for LuaTable {
    fn default() -> LuaTable {
        LuaTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_float_keys_alias() {
        let mut t = LuaTable::new();
        t.set(LuaValue::Number(1.0), LuaValue::Boolean(true)).unwrap();
        assert_eq!(t.get(&LuaValue::Number(1.0)), LuaValue::Boolean(true));
        assert_eq!(t.get_int(1), LuaValue::Boolean(true));
        t.set(LuaValue::Number(-0.0), LuaValue::Number(7.0)).unwrap();
        assert_eq!(t.get(&LuaValue::Number(0.0)), LuaValue::Number(7.0));
    }

    #[test]
    fn nil_write_removes() {
        let mut t = LuaTable::new();
        t.set_str("k", LuaValue::Number(1.0));
        t.set_str("k", LuaValue::Nil);
        assert!(t.get_str("k").is_nil());
        assert!(t.is_empty());
    }

    #[test]
    fn bad_keys_rejected() {
        let mut t = LuaTable::new();
        assert!(t.set(LuaValue::Nil, LuaValue::Number(1.0)).is_err());
        assert!(t.set(LuaValue::Number(f64::NAN), LuaValue::Number(1.0)).is_err());
        // reads of the same keys are just absent
        assert!(t.get(&LuaValue::Nil).is_nil());
        assert!(t.get(&LuaValue::Number(f64::NAN)).is_nil());
    }

    #[test]
    fn border_contiguous() {
        let mut t = LuaTable::new();
        for i in 1..=10 {
            t.set_int(i, LuaValue::Number(i as f64));
        }
        assert_eq!(t.len(), 10);
        t.set_int(10, LuaValue::Nil);
        assert_eq!(t.len(), 9);
    }

    #[test]
    fn border_through_hash_part() {
        let mut t = LuaTable::new();
        // write far indexes first so they land in the hash part
        for i in (1..=64).rev() {
            t.set(LuaValue::Number(i as f64), LuaValue::Boolean(true))
                .unwrap();
        }
        assert_eq!(t.len(), 64);
    }

    #[test]
    fn border_with_hole_is_a_border() {
        let mut t = LuaTable::new();
        for i in 1..=5 {
            t.set_int(i, LuaValue::Number(i as f64));
        }
        t.set_int(3, LuaValue::Nil);
        let n = t.len();
        assert!(!t.get_int(n).is_nil() || n == 0);
        assert!(t.get_int(n + 1).is_nil());
    }

    #[test]
    fn next_walks_everything_once() {
        let mut t = LuaTable::new();
        t.set_int(1, LuaValue::Number(10.0));
        t.set_int(2, LuaValue::Number(20.0));
        t.set_str("x", LuaValue::Number(30.0));
        t.set_str("y", LuaValue::Number(40.0));
        let mut seen = 0;
        let mut key = LuaValue::Nil;
        while let Some((k, _)) = t.next(&key).unwrap() {
            seen += 1;
            key = k;
        }
        assert_eq!(seen, 4);
    }

    #[test]
    fn next_unknown_key_errors() {
        let t = LuaTable::new();
        assert!(t.next(&LuaValue::Number(5.0)).is_err());
    }
}
