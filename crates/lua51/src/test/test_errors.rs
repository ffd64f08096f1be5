use crate::test::{fails, run};

#[test]
fn pcall_catches_and_reports() {
    run(r#"
        local ok, err = pcall(function() error("boom") end)
        assert(not ok)
        assert(type(err) == "string")
        assert(err:sub(-4) == "boom")
        -- position info is prefixed for string errors
        assert(#err > #"boom")
    "#);
}

#[test]
fn error_level_zero_keeps_message_raw() {
    run(r#"
        local ok, err = pcall(function() error("plain", 0) end)
        assert(not ok)
        assert(err == "plain")
    "#);
}

#[test]
fn error_values_survive_untouched() {
    run(r#"
        local payload = {code = 404}
        local ok, err = pcall(function() error(payload) end)
        assert(not ok)
        assert(err == payload)
        assert(err.code == 404)

        local ok2, err2 = pcall(function() error(42) end)
        assert(not ok2 and err2 == 42)
    "#);
}

#[test]
fn runtime_type_errors_are_catchable() {
    run(r#"
        local ok, err = pcall(function() return {} + 1 end)
        assert(not ok)
        assert(err:sub(-#"attempt to perform arithmetic on a table value")
            == "attempt to perform arithmetic on a table value")
        local ok2, err2 = pcall(function() local x = nil return x.field end)
        assert(not ok2)
        local ok3 = pcall(function() return #true end)
        assert(not ok3)
    "#);
}

#[test]
fn nested_pcall_restores_each_level() {
    run(r#"
        local ok, v = pcall(function()
            local innerok, innererr = pcall(error, "inner")
            assert(not innerok)
            return "outer survived"
        end)
        assert(ok and v == "outer survived")
    "#);
}

#[test]
fn pcall_of_non_function_value() {
    run(r#"
        local ok, err = pcall(nil)
        assert(not ok)
        local ok2 = pcall(42)
        assert(not ok2)
    "#);
}

#[test]
fn xpcall_runs_the_handler() {
    run(r#"
        local ok, handled = xpcall(
            function() error("original") end,
            function(e) return "handled: " .. e end
        )
        assert(not ok)
        assert(handled:sub(1, 9) == "handled: ")
        local ok2, v = xpcall(function() return 7 end, error)
        assert(ok2 and v == 7)
    "#);
}

#[test]
fn assert_passes_values_through() {
    run(r#"
        local a, b = assert(1, 2)
        assert(a == 1 and b == 2)
        local ok, err = pcall(assert, false)
        assert(not ok and err:sub(-#"assertion failed!") == "assertion failed!")
        local ok2, err2 = pcall(assert, nil, "custom")
        assert(not ok2 and err2 == "custom")
    "#);
}

#[test]
fn deep_recursion_overflows_catchably() {
    run(r#"
        local function f(n) return 1 + f(n + 1) end
        local ok, err = pcall(f, 1)
        assert(not ok)
        assert(err == "stack overflow")
        -- the interpreter keeps working afterwards
        assert(1 + 1 == 2)
    "#);
}

#[test]
fn syntax_errors_abort_compilation() {
    let msg = fails("local = 5");
    assert!(msg.contains("near"), "unexpected message: {}", msg);
    let msg2 = fails("if true then");
    assert!(msg2.contains("end"), "unexpected message: {}", msg2);
    let msg3 = fails("return 1 +");
    assert!(!msg3.is_empty());
}

#[test]
fn lexical_errors_abort_compilation() {
    let msg = fails("local s = \"unfinished");
    assert!(!msg.is_empty());
    let msg2 = fails("local x = 1e");
    assert!(!msg2.is_empty());
}

#[test]
fn runtime_errors_carry_source_and_line() {
    let msg = fails("local x\nlocal y\nreturn x + y");
    assert!(msg.contains("test:3:"), "unexpected message: {}", msg);
}
