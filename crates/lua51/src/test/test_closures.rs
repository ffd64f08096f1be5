use crate::test::run;

#[test]
fn closures_share_one_upvalue() {
    run(r#"
        local function make()
            local x = 0
            local function inc() x = x + 1 return x end
            local function get() return x end
            return inc, get
        end
        local inc, get = make()
        inc()
        inc()
        assert(get() == 2)
    "#);
}

#[test]
fn separate_scopes_get_separate_upvalues() {
    run(r#"
        local function make()
            local x = 0
            return function() x = x + 1 return x end
        end
        local a = make()
        local b = make()
        assert(a() == 1 and a() == 2)
        assert(b() == 1)
        assert(a() == 3)
    "#);
}

#[test]
fn upvalue_closes_when_scope_exits() {
    run(r#"
        local fns = {}
        do
            local v = "captured"
            fns.read = function() return v end
            fns.write = function(x) v = x end
        end
        -- the scope is gone but the cell survives, still shared
        assert(fns.read() == "captured")
        fns.write("changed")
        assert(fns.read() == "changed")
    "#);
}

#[test]
fn loop_iterations_capture_fresh_variables() {
    run(r#"
        local fs = {}
        for i = 1, 3 do
            fs[i] = function() return i end
        end
        assert(fs[1]() == 1 and fs[2]() == 2 and fs[3]() == 3)
    "#);
}

#[test]
fn nested_closures_reach_outer_upvalues() {
    run(r#"
        local function outer()
            local a = 1
            return function()
                local b = 10
                return function() return a + b end
            end
        end
        assert(outer()()() == 11)
    "#);
}

#[test]
fn counter_state_is_private() {
    run(r#"
        local function counter(start)
            local n = start
            return function()
                n = n + 1
                return n
            end
        end
        local c1 = counter(0)
        local c2 = counter(100)
        assert(c1() == 1)
        assert(c2() == 101)
        assert(c1() == 2)
        assert(c2() == 102)
    "#);
}

#[test]
fn recursive_local_function_sees_itself() {
    run(r#"
        local function fib(n)
            if n < 2 then return n end
            return fib(n - 1) + fib(n - 2)
        end
        assert(fib(10) == 55)
    "#);
}

#[test]
fn upvalue_shared_across_coroutine_boundary() {
    run(r#"
        local x = 1
        local reader = function() return x end
        local co = coroutine.create(function() return reader() end)
        x = 2
        local ok, v = coroutine.resume(co)
        assert(ok and v == 2)
    "#);
}
