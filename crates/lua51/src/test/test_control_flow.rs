use crate::test::run;

#[test]
fn if_elseif_else() {
    run(r#"
        local function classify(n)
            if n < 0 then return "neg"
            elseif n == 0 then return "zero"
            elseif n < 10 then return "small"
            else return "big" end
        end
        assert(classify(-5) == "neg")
        assert(classify(0) == "zero")
        assert(classify(3) == "small")
        assert(classify(99) == "big")
    "#);
}

#[test]
fn while_loop_with_break() {
    run(r#"
        local i, total = 1, 0
        while true do
            total = total + i
            if i == 10 then break end
            i = i + 1
        end
        assert(total == 55)
        local n = 0
        while n < 0 do n = n + 1 end
        assert(n == 0)                    -- body may run zero times
    "#);
}

#[test]
fn repeat_until_sees_block_locals() {
    run(r#"
        local tries = 0
        repeat
            tries = tries + 1
            local done = tries >= 3
        until done                         -- condition reads the block local
        assert(tries == 3)
    "#);
}

#[test]
fn numeric_for() {
    run(r#"
        local total = 0
        for i = 1, 5 do total = total + i end
        assert(total == 15)
        local down = {}
        for i = 3, 1, -1 do down[#down + 1] = i end
        assert(down[1] == 3 and down[3] == 1)
        local hits = 0
        for i = 1, 10, 4 do hits = hits + 1 end
        assert(hits == 3)                  -- 1, 5, 9
        for i = 5, 1 do error("never runs") end
        local f = 0
        for i = 0.5, 2.5, 0.5 do f = f + 1 end
        assert(f == 5)
        -- the control variable is per-loop and private
        local i = "outer"
        for i = 1, 2 do end
        assert(i == "outer")
    "#);
}

#[test]
fn generic_for() {
    run(r#"
        local t = {10, 20, 30}
        local sum, count = 0, 0
        for i, v in ipairs(t) do
            sum = sum + v
            count = count + 1
            assert(t[i] == v)
        end
        assert(sum == 60 and count == 3)

        local seen = {}
        for k, v in pairs({a = 1, b = 2}) do seen[k] = v end
        assert(seen.a == 1 and seen.b == 2)

        -- custom stateless iterator
        local function range(n)
            return function(_, i)
                i = i + 1
                if i <= n then return i end
            end, nil, 0
        end
        local total = 0
        for i in range(4) do total = total + i end
        assert(total == 10)
    "#);
}

#[test]
fn nested_loops_and_breaks() {
    run(r#"
        local pairs_found = 0
        for i = 1, 3 do
            for j = 1, 3 do
                if j > i then break end
                pairs_found = pairs_found + 1
            end
        end
        assert(pairs_found == 6)
    "#);
}

#[test]
fn break_closes_loop_locals_captured_by_closures() {
    run(r#"
        local grab
        local i = 1
        while true do
            local v = i * 10
            grab = function() return v end
            if i == 2 then break end
            i = i + 1
        end
        assert(grab() == 20)
    "#);
}
