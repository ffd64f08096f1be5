use crate::test::run;

#[test]
fn index_table_chain() {
    run(r#"
        local base = {greet = "hi"}
        local mid = setmetatable({extra = true}, {__index = base})
        local obj = setmetatable({}, {__index = mid})
        assert(obj.greet == "hi")
        assert(obj.extra == true)
        assert(obj.missing == nil)
        -- raw hits shadow the chain
        obj.greet = "hello"
        assert(obj.greet == "hello")
        assert(base.greet == "hi")
    "#);
}

#[test]
fn index_function_receives_table_and_key() {
    run(r#"
        local t = setmetatable({}, {
            __index = function(t, k) return "<" .. k .. ">" end,
        })
        assert(t.anything == "<anything>")
        assert(t[1] == "<1>")
    "#);
}

#[test]
fn newindex_intercepts_only_fresh_keys() {
    run(r#"
        local writes = {}
        local t = setmetatable({present = 1}, {
            __newindex = function(t, k, v) writes[k] = v end,
        })
        t.fresh = "trapped"
        assert(writes.fresh == "trapped")
        assert(rawget(t, "fresh") == nil)
        t.present = 2                     -- raw slot exists: no trap
        assert(t.present == 2)
        assert(writes.present == nil)
        rawset(t, "direct", 3)            -- rawset never traps
        assert(writes.direct == nil and t.direct == 3)
    "#);
}

#[test]
fn arithmetic_metamethods() {
    run(r#"
        local mt = {}
        local function wrap(n) return setmetatable({n = n}, mt) end
        mt.__add = function(a, b) return wrap(a.n + b.n) end
        mt.__sub = function(a, b) return wrap(a.n - b.n) end
        mt.__mul = function(a, b) return wrap(a.n * b.n) end
        mt.__unm = function(a) return wrap(-a.n) end
        local a, b = wrap(6), wrap(7)
        assert((a + b).n == 13)
        assert((a - b).n == -1)
        assert((a * b).n == 42)
        assert((-a).n == -6)
    "#);
}

#[test]
fn arithmetic_falls_back_to_either_operand() {
    run(r#"
        local mt = {__add = function(a, b)
            local an = type(a) == "number" and a or a.n
            local bn = type(b) == "number" and b or b.n
            return an + bn
        end}
        local v = setmetatable({n = 5}, mt)
        assert(v + 1 == 6)
        assert(1 + v == 6)
    "#);
}

#[test]
fn eq_requires_matching_handlers() {
    run(r#"
        local mt = {__eq = function(a, b) return a.id == b.id end}
        local a = setmetatable({id = 1}, mt)
        local b = setmetatable({id = 1}, mt)
        local c = setmetatable({id = 2}, mt)
        assert(a == b)
        assert(a ~= c)
        -- different types never consult __eq
        assert(not (a == 1))
        local other = setmetatable({id = 1}, {__eq = function() return true end})
        assert(not (a == other))
    "#);
}

#[test]
fn ordering_metamethods() {
    run(r#"
        local mt = {__lt = function(a, b) return a.v < b.v end}
        local small = setmetatable({v = 1}, mt)
        local big = setmetatable({v = 2}, mt)
        assert(small < big)
        assert(big > small)
        -- __le falls back to not (b < a)
        assert(small <= big)
        assert(small <= setmetatable({v = 1}, mt))
        assert(not (big <= small))
    "#);
}

#[test]
fn concat_len_call_tostring() {
    run(r#"
        local mt = {
            __concat = function(a, b)
                local function s(x) return type(x) == "table" and x.tag or tostring(x) end
                return s(a) .. "+" .. s(b)
            end,
            __len = function() return 99 end,
            __call = function(self, x, y) return x * y end,
            __tostring = function(self) return "tagged:" .. self.tag end,
        }
        local t = setmetatable({tag = "T"}, mt)
        assert(t .. "end" == "T+end")
        assert("start" .. t == "start+T")
        assert(#t == 99)
        assert(t(6, 7) == 42)
        assert(tostring(t) == "tagged:T")
    "#);
}

#[test]
fn metatable_protection() {
    run(r#"
        local t = setmetatable({}, {__metatable = "locked"})
        assert(getmetatable(t) == "locked")
        local ok = pcall(setmetatable, t, {})
        assert(not ok)
        local plain = setmetatable({}, {})
        assert(type(getmetatable(plain)) == "table")
        setmetatable(plain, nil)
        assert(getmetatable(plain) == nil)
    "#);
}

#[test]
fn call_metamethod_chains_through_callables() {
    run(r#"
        local target = function(self, a) return a + 1 end
        local callable = setmetatable({}, {__call = target})
        assert(callable(41) == 42)
        local ok = pcall(function() return (nil)() end)
        assert(not ok)
    "#);
}

#[test]
fn index_on_non_table_values() {
    run(r#"
        local ok, err = pcall(function() return (nil).x end)
        assert(not ok)
        local ok2 = pcall(function() return (true).x end)
        assert(not ok2)
        -- strings index through their shared metatable
        assert(("abc").len ~= nil)
    "#);
}
