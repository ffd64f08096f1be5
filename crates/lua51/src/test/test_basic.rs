use crate::lua_value::LuaValue;
use crate::test::{eval, run};

#[test]
fn return_literal() {
    let r = eval("return 99");
    assert_eq!(r, vec![LuaValue::Number(99.0)]);
}

#[test]
fn local_sum() {
    let r = eval("local a,b,c=3,7,8; return a+b+c");
    assert_eq!(r, vec![LuaValue::Number(18.0)]);
}

#[test]
fn local_concat() {
    let r = eval("local a,b,c=\"foo\",\"bar\",\"baz\"; return a..b..c");
    assert_eq!(r[0].as_str(), Some("foobarbaz"));
}

#[test]
fn multiple_returns_and_adjustment() {
    run(r#"
        local function three() return 1, 2, 3 end
        local a, b = three()
        assert(a == 1 and b == 2)
        local c, d, e, f = three()
        assert(c == 1 and d == 2 and e == 3 and f == nil)
        -- parentheses truncate to one value
        local g, h = (three())
        assert(g == 1 and h == nil)
        local t = {three()}
        assert(#t == 3)
        local u = {three(), three()}
        assert(#u == 4)
    "#);
}

#[test]
fn varargs() {
    run(r#"
        local function count(...) return select('#', ...) end
        assert(count() == 0)
        assert(count(nil) == 1)
        assert(count(1, 2, 3) == 3)
        local function tail(...) local _, b = ... return b end
        assert(tail(10, 20, 30) == 20)
        local function pack(...) return {n = select('#', ...), ...} end
        local p = pack('a', 'b')
        assert(p.n == 2 and p[1] == 'a' and p[2] == 'b')
    "#);
}

#[test]
fn method_definitions_and_calls() {
    run(r#"
        local account = {balance = 0}
        function account:deposit(v) self.balance = self.balance + v end
        function account.peek(self) return self.balance end
        account:deposit(100)
        account:deposit(20)
        assert(account:peek() == 120)
    "#);
}

#[test]
fn nested_function_definitions() {
    run(r#"
        local lib = {inner = {}}
        function lib.inner.make(x) return x * 2 end
        assert(lib.inner.make(21) == 42)
    "#);
}

#[test]
fn string_methods_via_sugar() {
    run(r#"
        local s = "Hello"
        assert(s:len() == 5)
        assert(s:upper() == "HELLO")
        assert(("abc"):rep(2) == "abcabc")
        assert(s:sub(2, 3) == "el")
    "#);
}

#[test]
fn global_assignment_and_env_table() {
    run(r#"
        answer = 42
        assert(_G.answer == 42)
        _G.question = "life"
        assert(question == "life")
        assert(_VERSION == "Lua 5.1")
    "#);
}

#[test]
fn deep_tail_recursion() {
    run(r#"
        local function loop(n)
            if n == 0 then return "ok" end
            return loop(n - 1)
        end
        assert(loop(100000) == "ok")
    "#);
}

#[test]
fn setfenv_sandboxes_a_function() {
    run(r#"
        local function probe() return secret end
        setfenv(probe, {secret = "inside"})
        assert(probe() == "inside")
        assert(secret == nil)
        assert(getfenv(probe).secret == "inside")
    "#);
}
