use crate::test::run;

#[test]
fn arithmetic_and_precedence() {
    run(r#"
        assert(2 + 3 * 4 == 14)
        assert((2 + 3) * 4 == 20)
        assert(2 ^ 3 ^ 2 == 512)          -- right associative
        assert(-2 ^ 2 == -4)              -- unary binds looser than ^
        assert(7 % 3 == 1)
        assert(-7 % 3 == 2)               -- floored modulo
        assert(7 / 2 == 3.5)
        assert(2 ^ -1 == 0.5)
    "#);
}

#[test]
fn string_number_coercion() {
    run(r#"
        assert("10" + 5 == 15)
        assert("3" * "4" == 12)
        assert(10 .. 20 == "1020")
        assert("0x10" + 0 == 16)
        assert(tonumber("  42  ") == 42)
        assert(tonumber("abc") == nil)
        assert(tonumber("ff", 16) == 255)
        assert(tonumber("z", 36) == 35)
    "#);
}

#[test]
fn division_and_modulo_edge_cases() {
    run(r#"
        assert(1 / 0 == math.huge)
        assert(-1 / 0 == -math.huge)
        local nan = 0 / 0
        assert(nan ~= nan)
        local m = 1 % 0
        assert(m ~= m)                    -- NaN
    "#);
}

#[test]
fn comparisons() {
    run(r#"
        assert(1 < 2 and 2 <= 2 and 3 > 2 and 3 >= 3)
        assert("abc" < "abd")
        assert("Z" < "a")
        assert(not (1 == "1"))            -- no coercion in equality
        assert(1 ~= "1")
        local ok = pcall(function() return 1 < "2" end)
        assert(not ok)                    -- no coercion in ordering
    "#);
}

#[test]
fn boolean_operators_pass_values() {
    run(r#"
        assert((false or "fallback") == "fallback")
        assert((nil and 1) == nil)
        assert((1 and 2) == 2)
        assert((false and error("never")) == false)
        local x = nil
        local y = x or 7
        assert(y == 7)
        assert(not nil == true)
        assert(not 0 == false)            -- zero is truthy
    "#);
}

#[test]
fn concat_is_right_associative() {
    run(r#"
        local a = 1 .. 2 .. 3
        assert(a == "123")
        assert(type(a) == "string")
        assert("x" .. 1 + 1 == "x2")      -- arithmetic binds tighter
    "#);
}

#[test]
fn length_operator() {
    run(r#"
        assert(#"hello" == 5)
        assert(#"" == 0)
        assert(#{1, 2, 3} == 3)
        local ok = pcall(function() return #42 end)
        assert(not ok)
    "#);
}

#[test]
fn constant_folding_agrees_with_runtime() {
    run(r#"
        local a = 2 + 3
        local b = 5
        assert(a == b)
        local c = 2 ^ 10
        assert(c == 1024)
        -- folding must not fold these into errors
        local d = 1 % 0
        assert(d ~= d)
    "#);
}
