use crate::test::run;

#[test]
fn record_constructor() {
    run(r#"
        local t = {a = 1, b = 2, c = 3}
        assert(t.a == 1 and t.b == 2 and t.c == 3)
        assert(t.d == nil)
    "#);
}

#[test]
fn constructor_forms() {
    run(r#"
        local k = "key"
        local t = {
            10,
            [k] = "by-expr",
            named = true,
            20,
            [5] = "five",
            30,
        }
        assert(t[1] == 10 and t[2] == 20 and t[3] == 30)
        assert(t.key == "by-expr")
        assert(t.named == true)
        assert(t[5] == "five")
    "#);
}

#[test]
fn long_list_constructor_batches() {
    // more items than one SETLIST batch holds
    let mut src = String::from("local t = {");
    for i in 1..=120 {
        src.push_str(&format!("{},", i));
    }
    src.push_str(
        "}\nassert(#t == 120)\nfor i = 1, 120 do assert(t[i] == i) end\nreturn true",
    );
    run(&src);
}

#[test]
fn border_on_contiguous_keys() {
    run(r#"
        local t = {}
        for i = 1, 100 do t[i] = i * i end
        assert(#t == 100)
        t[101] = 1
        assert(#t == 101)
    "#);
}

#[test]
fn nil_assignment_removes() {
    run(r#"
        local t = {x = 1, 1, 2, 3}
        t.x = nil
        assert(t.x == nil)
        t[3] = nil
        assert(t[3] == nil)
        assert(t[1] == 1 and t[2] == 2)
        -- a border still holds the invariant t[n+1] == nil
        local n = #t
        assert(t[n + 1] == nil)
    "#);
}

#[test]
fn integral_float_keys_alias() {
    run(r#"
        local t = {}
        t[1] = "one"
        assert(t[1.0] == "one")
        t[2.0] = "two"
        assert(t[2] == "two")
    "#);
}

#[test]
fn invalid_keys_error() {
    run(r#"
        local t = {}
        local ok1 = pcall(function() t[nil] = 1 end)
        assert(not ok1)
        local ok2 = pcall(function() t[0/0] = 1 end)
        assert(not ok2)
        -- reads of those keys are just nil
        assert(t[nil] == nil)
    "#);
}

#[test]
fn next_enumerates_everything() {
    run(r#"
        local t = {1, 2, 3, x = "a", y = "b"}
        local count = 0
        local k, v = next(t)
        while k do
            count = count + 1
            k, v = next(t, k)
        end
        assert(count == 5)
        assert(next({}) == nil)
    "#);
}

#[test]
fn table_library() {
    run(r#"
        local t = {1, 2, 4}
        table.insert(t, 5)
        assert(#t == 4 and t[4] == 5)
        table.insert(t, 3, 3)
        assert(#t == 5 and t[3] == 3 and t[4] == 4)
        local removed = table.remove(t, 1)
        assert(removed == 1 and t[1] == 2 and #t == 4)
        local last = table.remove(t)
        assert(last == 5 and #t == 3)
        assert(table.concat({"a", "b", "c"}, "-") == "a-b-c")
        assert(table.concat({1, 2, 3}) == "123")
        assert(table.concat({}, ",") == "")
        assert(table.getn({9, 9, 9}) == 3)
        assert(table.remove({}) == nil)
    "#);
}

#[test]
fn unpack_and_select() {
    run(r##"
        local a, b, c = unpack({"x", "y", "z"})
        assert(a == "x" and b == "y" and c == "z")
        local p, q = unpack({1, 2, 3}, 2)
        assert(p == 2 and q == 3)
        assert(select("#", unpack({}, 1, 0)) == 0)
        assert(select(2, "a", "b", "c") == "b")
        assert(select(-1, "a", "b", "c") == "c")
    "##);
}
