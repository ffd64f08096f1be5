//! Debug hooks and host-registered natives, exercised from the Rust side.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::lua_value::{LuaThread, LuaValue};
use crate::lua_vm::{DebugHook, HookAction, HookEvent, LuaResult, LuaVM, Resume};
use crate::test::new_vm;

#[test]
fn count_hook_fires_periodically() {
    let mut vm = new_vm();
    let hits = Rc::new(Cell::new(0u32));
    let hits_in_hook = hits.clone();
    let mut hook = DebugHook::new(Rc::new(move |_vm, info| {
        assert_eq!(info.event, HookEvent::Count);
        hits_in_hook.set(hits_in_hook.get() + 1);
        Ok(HookAction::Continue)
    }));
    hook.count = 10;
    vm.set_hook(Some(hook));
    vm.execute_string("local s = 0 for i = 1, 200 do s = s + i end return s")
        .unwrap();
    assert!(hits.get() >= 5, "only {} count events", hits.get());
}

#[test]
fn call_and_return_hooks_observe_frames() {
    let mut vm = new_vm();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    let mut hook = DebugHook::new(Rc::new(move |_vm, info| {
        sink.borrow_mut().push((info.event, info.what));
        Ok(HookAction::Continue)
    }));
    hook.on_call = true;
    hook.on_return = true;
    vm.set_hook(Some(hook));
    vm.execute_string(
        r#"
        local function inner() return 1 end
        local function outer() return inner() + inner() end
        return outer()
    "#,
    )
    .unwrap();
    vm.set_hook(None);

    let events = events.borrow();
    let calls = events.iter().filter(|(e, _)| *e == HookEvent::Call).count();
    let returns = events
        .iter()
        .filter(|(e, _)| *e == HookEvent::Return)
        .count();
    assert!(calls >= 4, "saw {} call events", calls);
    assert!(returns >= 4, "saw {} return events", returns);
    // the first call event belongs to the top-level chunk
    assert_eq!(events[0], (HookEvent::Call, "main"));
    assert!(events.iter().any(|(_, w)| *w == "Lua"));
}

#[test]
fn line_hook_tracks_line_changes() {
    let mut vm = new_vm();
    let lines = Rc::new(RefCell::new(Vec::new()));
    let sink = lines.clone();
    let mut hook = DebugHook::new(Rc::new(move |_vm, info| {
        assert_eq!(info.event, HookEvent::Line);
        sink.borrow_mut().push(info.line);
        Ok(HookAction::Continue)
    }));
    hook.on_line = true;
    vm.set_hook(Some(hook));
    vm.execute_string("local a = 1\nlocal b = 2\nreturn a + b")
        .unwrap();
    vm.set_hook(None);

    let lines = lines.borrow();
    assert!(lines.contains(&1) && lines.contains(&2) && lines.contains(&3));
}

#[test]
fn hook_can_suspend_a_coroutine() {
    let mut vm = new_vm();
    let body = vm
        .load(b"local i = 0 while true do i = i + 1 end", "spin")
        .unwrap();
    let co = Rc::new(RefCell::new(LuaThread::new(body)));

    let mut hook = DebugHook::new(Rc::new(|_vm, _info| Ok(HookAction::Yield)));
    hook.count = 100;
    vm.set_hook(Some(hook));

    match vm.resume(&co, Vec::new()) {
        Resume::Yield(values) => assert!(values.is_empty()),
        other => panic!("expected a yield, got {:?}", kind(&other)),
    }
    // the loop is still suspended mid-flight and can be interrupted again
    match vm.resume(&co, Vec::new()) {
        Resume::Yield(_) => {}
        other => panic!("expected a yield, got {:?}", kind(&other)),
    }
    vm.set_hook(None);
}

fn kind(r: &Resume) -> &'static str {
    match r {
        Resume::Return(_) => "return",
        Resume::Yield(_) => "yield",
        Resume::Error(_) => "error",
    }
}

fn native_addall(vm: &mut LuaVM) -> LuaResult<usize> {
    let n = vm.arg_count();
    let mut sum = 0.0;
    for i in 1..=n {
        sum += vm.check_number(i)?;
    }
    vm.push(LuaValue::Number(sum))?;
    Ok(1)
}

fn native_bounds(vm: &mut LuaVM) -> LuaResult<usize> {
    let t = vm.check_table(1)?;
    let len = t.borrow().len();
    vm.push(LuaValue::Number(1.0))?;
    vm.push(LuaValue::Number(len as f64))?;
    Ok(2)
}

#[test]
fn registered_native_sees_arguments() {
    let mut vm = new_vm();
    vm.register_native("addall", native_addall);
    let out = vm
        .execute_string("return addall(1, 2, 3, 4), addall(), addall(10)")
        .unwrap();
    assert_eq!(out[0], LuaValue::Number(10.0));
    assert_eq!(out[1], LuaValue::Number(0.0));
    assert_eq!(out[2], LuaValue::Number(10.0));
}

#[test]
fn registered_native_returns_multiple_values() {
    let mut vm = new_vm();
    vm.register_native("bounds", native_bounds);
    let out = vm
        .execute_string("local lo, hi = bounds({'a', 'b', 'c'}) return lo, hi")
        .unwrap();
    assert_eq!(out[0], LuaValue::Number(1.0));
    assert_eq!(out[1], LuaValue::Number(3.0));
}

#[test]
fn native_argument_errors_name_the_function() {
    let mut vm = new_vm();
    vm.register_native("addall", native_addall);
    let out = vm
        .execute_string("local ok, err = pcall(addall, {}) return err")
        .unwrap();
    match &out[0] {
        LuaValue::String(s) => assert!(
            s.contains("bad argument #1 to 'addall'"),
            "unexpected message: {}",
            s
        ),
        other => panic!("expected a string error, got {}", other.type_name()),
    }
}
