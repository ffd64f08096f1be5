//! The math library. Random numbers come from the per-session RNG so
//! separate interpreters never share generator state.

use rand::Rng;
use rand::SeedableRng;

use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::{LuaResult, LuaVM};
use crate::stdlib::set_native;

pub fn open(vm: &mut LuaVM) {
    let mut t = LuaTable::new();
    set_native(&mut t, "abs", lua_abs);
    set_native(&mut t, "ceil", lua_ceil);
    set_native(&mut t, "floor", lua_floor);
    set_native(&mut t, "sqrt", lua_sqrt);
    set_native(&mut t, "exp", lua_exp);
    set_native(&mut t, "log", lua_log);
    set_native(&mut t, "pow", lua_pow);
    set_native(&mut t, "fmod", lua_fmod);
    set_native(&mut t, "modf", lua_modf);
    set_native(&mut t, "max", lua_max);
    set_native(&mut t, "min", lua_min);
    set_native(&mut t, "random", lua_random);
    set_native(&mut t, "randomseed", lua_randomseed);
    t.set_str("pi", LuaValue::Number(std::f64::consts::PI));
    t.set_str("huge", LuaValue::Number(f64::INFINITY));
    vm.set_global("math", LuaValue::from_table(t));
}

fn unary(vm: &mut LuaVM, f: fn(f64) -> f64) -> LuaResult<usize> {
    let x = vm.check_number(1)?;
    vm.push(LuaValue::Number(f(x)))?;
    Ok(1)
}

fn lua_abs(vm: &mut LuaVM) -> LuaResult<usize> {
    unary(vm, f64::abs)
}

fn lua_ceil(vm: &mut LuaVM) -> LuaResult<usize> {
    unary(vm, f64::ceil)
}

fn lua_floor(vm: &mut LuaVM) -> LuaResult<usize> {
    unary(vm, f64::floor)
}

fn lua_sqrt(vm: &mut LuaVM) -> LuaResult<usize> {
    unary(vm, f64::sqrt)
}

fn lua_exp(vm: &mut LuaVM) -> LuaResult<usize> {
    unary(vm, f64::exp)
}

fn lua_log(vm: &mut LuaVM) -> LuaResult<usize> {
    unary(vm, f64::ln)
}

fn lua_pow(vm: &mut LuaVM) -> LuaResult<usize> {
    let x = vm.check_number(1)?;
    let y = vm.check_number(2)?;
    vm.push(LuaValue::Number(x.powf(y)))?;
    Ok(1)
}

fn lua_fmod(vm: &mut LuaVM) -> LuaResult<usize> {
    let x = vm.check_number(1)?;
    let y = vm.check_number(2)?;
    vm.push(LuaValue::Number(x % y))?;
    Ok(1)
}

fn lua_modf(vm: &mut LuaVM) -> LuaResult<usize> {
    let x = vm.check_number(1)?;
    let int = x.trunc();
    vm.push(LuaValue::Number(int))?;
    vm.push(LuaValue::Number(x - int))?;
    Ok(2)
}

fn fold(vm: &mut LuaVM, pick: fn(f64, f64) -> f64) -> LuaResult<usize> {
    let n = vm.arg_count();
    let mut best = vm.check_number(1)?;
    for i in 2..=n {
        best = pick(best, vm.check_number(i)?);
    }
    vm.push(LuaValue::Number(best))?;
    Ok(1)
}

fn lua_max(vm: &mut LuaVM) -> LuaResult<usize> {
    fold(vm, f64::max)
}

fn lua_min(vm: &mut LuaVM) -> LuaResult<usize> {
    fold(vm, f64::min)
}

fn lua_random(vm: &mut LuaVM) -> LuaResult<usize> {
    let n = vm.arg_count();
    let v = match n {
        0 => vm.session.rng.gen::<f64>(),
        1 => {
            let m = vm.check_number(1)? as i64;
            if m < 1 {
                return Err(vm.arg_error(1, "interval is empty"));
            }
            vm.session.rng.gen_range(1..=m) as f64
        }
        _ => {
            let lo = vm.check_number(1)? as i64;
            let hi = vm.check_number(2)? as i64;
            if lo > hi {
                return Err(vm.arg_error(2, "interval is empty"));
            }
            vm.session.rng.gen_range(lo..=hi) as f64
        }
    };
    vm.push(LuaValue::Number(v))?;
    Ok(1)
}

fn lua_randomseed(vm: &mut LuaVM) -> LuaResult<usize> {
    let seed = vm.check_number(1)?;
    vm.session.rng = rand::rngs::StdRng::seed_from_u64(seed.to_bits());
    Ok(0)
}
