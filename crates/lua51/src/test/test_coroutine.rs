use crate::test::run;

#[test]
fn yield_four_times_then_return() {
    run(r#"
        local co = coroutine.create(function()
            for i = 1, 4 do coroutine.yield(i) end
            return "done"
        end)
        for i = 1, 4 do
            local ok, v = coroutine.resume(co)
            assert(ok and v == i)
            assert(coroutine.status(co) == "suspended")
        end
        local ok, v = coroutine.resume(co)
        assert(ok and v == "done")
        assert(coroutine.status(co) == "dead")
        local ok2, err = coroutine.resume(co)
        assert(not ok2)
        assert(err == "cannot resume dead coroutine")
    "#);
}

#[test]
fn values_flow_both_ways() {
    run(r#"
        local co = coroutine.create(function(a, b)
            assert(a == 1 and b == 2)
            local c, d = coroutine.yield(a + b)
            assert(c == 10 and d == 20)
            local e = coroutine.yield(c + d)
            return e * 2
        end)
        local ok, sum = coroutine.resume(co, 1, 2)
        assert(ok and sum == 3)
        local ok2, sum2 = coroutine.resume(co, 10, 20)
        assert(ok2 and sum2 == 30)
        local ok3, final = coroutine.resume(co, 50)
        assert(ok3 and final == 100)
    "#);
}

#[test]
fn fresh_coroutine_reports_suspended() {
    run(r#"
        local co = coroutine.create(function() end)
        assert(coroutine.status(co) == "suspended")
        assert(type(co) == "thread")
    "#);
}

#[test]
fn wrap_forwards_values_and_errors() {
    run(r#"
        local gen = coroutine.wrap(function()
            coroutine.yield("a")
            coroutine.yield("b")
            error("boom")
        end)
        assert(gen() == "a")
        assert(gen() == "b")
        local ok, err = pcall(gen)
        assert(not ok)
        assert(type(err) == "string")
    "#);
}

#[test]
fn running_identifies_the_current_thread() {
    run(r#"
        assert(coroutine.running() == nil)
        local co
        co = coroutine.create(function()
            assert(coroutine.running() == co)
        end)
        assert(coroutine.resume(co))
        assert(coroutine.running() == nil)
    "#);
}

#[test]
fn nested_coroutines() {
    run(r#"
        local inner = coroutine.create(function()
            coroutine.yield("inner-1")
            return "inner-done"
        end)
        local outer = coroutine.create(function()
            local ok, v = coroutine.resume(inner)
            assert(ok and v == "inner-1")
            coroutine.yield("outer-1")
            local ok2, v2 = coroutine.resume(inner)
            assert(ok2 and v2 == "inner-done")
            return "outer-done"
        end)
        local ok, v = coroutine.resume(outer)
        assert(ok and v == "outer-1")
        assert(coroutine.status(inner) == "suspended")
        local ok2, v2 = coroutine.resume(outer)
        assert(ok2 and v2 == "outer-done")
    "#);
}

#[test]
fn error_in_body_kills_coroutine_and_reports() {
    run(r#"
        local co = coroutine.create(function()
            error("inside")
        end)
        local ok, err = coroutine.resume(co)
        assert(not ok)
        assert(err:sub(-6) == "inside")
        assert(coroutine.status(co) == "dead")
    "#);
}

#[test]
fn pcall_inside_coroutine_catches_without_killing() {
    run(r#"
        local co = coroutine.create(function()
            local ok, err = pcall(function() error("caught") end)
            assert(not ok)
            coroutine.yield("still alive")
            return "finished"
        end)
        local ok, v = coroutine.resume(co)
        assert(ok and v == "still alive")
        assert(coroutine.status(co) == "suspended")
        local ok2, v2 = coroutine.resume(co)
        assert(ok2 and v2 == "finished")
    "#);
}

#[test]
fn yield_across_native_boundary_is_rejected() {
    run(r#"
        local co = coroutine.create(function()
            -- pcall is a native frame: a yield may not cross it
            local ok, err = pcall(coroutine.yield, 1)
            assert(not ok)
            return err
        end)
        local ok, err = coroutine.resume(co)
        assert(ok)
        assert(err:sub(-#"attempt to yield across C-call boundary")
            == "attempt to yield across C-call boundary")
    "#);
}

#[test]
fn yield_outside_coroutine_fails() {
    run(r#"
        local ok, err = pcall(coroutine.yield)
        assert(not ok)
    "#);
}

#[test]
fn tail_yield_forwards_results() {
    run(r#"
        local co = coroutine.create(function()
            return coroutine.yield("first")
        end)
        local ok, v = coroutine.resume(co)
        assert(ok and v == "first")
        local ok2, a, b = coroutine.resume(co, "x", "y")
        assert(ok2 and a == "x" and b == "y")
        assert(coroutine.status(co) == "dead")
    "#);
}
