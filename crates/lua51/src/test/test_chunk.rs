//! Dump/load round trips through the binary chunk format, driven from
//! the host side.

use crate::lua_value::LuaValue;
use crate::test::new_vm;

const FIB: &str = r#"
    local function fib(n)
        if n < 2 then return n end
        return fib(n - 1) + fib(n - 2)
    end
    return fib(10), "done"
"#;

#[test]
fn dump_then_load_preserves_behavior() {
    let mut vm = new_vm();
    let f = vm.load(FIB.as_bytes(), "fib").unwrap();
    let direct = vm.call_value(&f, &[]).unwrap();
    assert_eq!(direct[0], LuaValue::Number(55.0));
    assert_eq!(direct[1], LuaValue::from_string("done"));

    let bytes = vm.dump_function(&f, false).unwrap();
    assert_eq!(bytes[0], 0x1b);

    let reloaded = vm.load(&bytes, "fib").unwrap();
    let via_dump = vm.call_value(&reloaded, &[]).unwrap();
    assert_eq!(direct, via_dump);
}

#[test]
fn dump_is_a_fixed_point() {
    let mut vm = new_vm();
    let f = vm.load(FIB.as_bytes(), "fib").unwrap();
    let first = vm.dump_function(&f, false).unwrap();
    let reloaded = vm.load(&first, "fib").unwrap();
    let second = vm.dump_function(&reloaded, false).unwrap();
    assert_eq!(first, second);
}

#[test]
fn stripped_dump_still_runs() {
    let mut vm = new_vm();
    let f = vm.load(FIB.as_bytes(), "fib").unwrap();
    let full = vm.dump_function(&f, false).unwrap();
    let stripped = vm.dump_function(&f, true).unwrap();
    assert!(stripped.len() < full.len());

    let reloaded = vm.load(&stripped, "fib").unwrap();
    let out = vm.call_value(&reloaded, &[]).unwrap();
    assert_eq!(out[0], LuaValue::Number(55.0));
}

#[test]
fn loaded_chunk_sees_arguments_and_globals() {
    let mut vm = new_vm();
    let f = vm
        .load(b"local a, b = ... return a * b + base", "args")
        .unwrap();
    vm.set_global("base", LuaValue::Number(1.0));
    let bytes = vm.dump_function(&f, false).unwrap();
    let g = vm.load(&bytes, "args").unwrap();
    let out = vm
        .call_value(&g, &[LuaValue::Number(6.0), LuaValue::Number(7.0)])
        .unwrap();
    assert_eq!(out[0], LuaValue::Number(43.0));
}

#[test]
fn nested_prototypes_survive_the_trip() {
    let mut vm = new_vm();
    let src = r#"
        local acc = 0
        local function add(n)
            return function() acc = acc + n return acc end
        end
        local bump = add(5)
        bump()
        return bump()
    "#;
    let f = vm.load(src.as_bytes(), "nested").unwrap();
    let bytes = vm.dump_function(&f, false).unwrap();
    let g = vm.load(&bytes, "nested").unwrap();
    let out = vm.call_value(&g, &[]).unwrap();
    assert_eq!(out[0], LuaValue::Number(10.0));
}

#[test]
fn truncated_chunk_is_rejected() {
    let mut vm = new_vm();
    let f = vm.load(b"return 1", "tiny").unwrap();
    let bytes = vm.dump_function(&f, false).unwrap();
    assert!(vm.load(&bytes[..bytes.len() / 2], "tiny").is_err());
    assert!(vm.load(&bytes[..4], "tiny").is_err());
}

#[test]
fn dumping_a_native_function_fails() {
    let mut vm = new_vm();
    let print = vm.get_global("print");
    assert!(vm.dump_function(&print, false).is_err());
}
