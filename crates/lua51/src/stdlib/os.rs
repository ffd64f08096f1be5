//! The os library: wall-clock time through chrono, elapsed time through
//! the session start instant.

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike, Utc};

use crate::lua_value::{LuaTable, LuaValue, TableRef};
use crate::lua_vm::{LuaResult, LuaVM};
use crate::stdlib::set_native;

pub fn open(vm: &mut LuaVM) {
    let mut t = LuaTable::new();
    set_native(&mut t, "time", lua_time);
    set_native(&mut t, "clock", lua_clock);
    set_native(&mut t, "date", lua_date);
    set_native(&mut t, "difftime", lua_difftime);
    set_native(&mut t, "getenv", lua_getenv);
    vm.set_global("os", LuaValue::from_table(t));
}

fn field(t: &TableRef, name: &str) -> Option<i64> {
    t.borrow().get_str(name).as_number().map(|n| n as i64)
}

fn lua_time(vm: &mut LuaVM) -> LuaResult<usize> {
    let stamp = match vm.arg(1).as_table() {
        None => Some(Local::now().timestamp()),
        Some(t) => {
            let year = field(t, "year");
            let month = field(t, "month");
            let day = field(t, "day");
            match (year, month, day) {
                (Some(y), Some(m), Some(d)) => {
                    let hour = field(t, "hour").unwrap_or(12);
                    let min = field(t, "min").unwrap_or(0);
                    let sec = field(t, "sec").unwrap_or(0);
                    NaiveDate::from_ymd_opt(y as i32, m as u32, d as u32)
                        .and_then(|date| date.and_hms_opt(hour as u32, min as u32, sec as u32))
                        .and_then(|naive| Local.from_local_datetime(&naive).single())
                        .map(|dt| dt.timestamp())
                }
                _ => return Err(vm.arg_error(1, "missing date field")),
            }
        }
    };
    match stamp {
        Some(s) => vm.push(LuaValue::Number(s as f64))?,
        None => vm.push(LuaValue::Nil)?,
    }
    Ok(1)
}

fn lua_clock(vm: &mut LuaVM) -> LuaResult<usize> {
    let elapsed = vm.session.start.elapsed().as_secs_f64();
    vm.push(LuaValue::Number(elapsed))?;
    Ok(1)
}

fn date_table<Tz: TimeZone>(dt: &DateTime<Tz>) -> LuaTable {
    let mut t = LuaTable::new();
    t.set_str("year", LuaValue::Number(dt.year() as f64));
    t.set_str("month", LuaValue::Number(dt.month() as f64));
    t.set_str("day", LuaValue::Number(dt.day() as f64));
    t.set_str("hour", LuaValue::Number(dt.hour() as f64));
    t.set_str("min", LuaValue::Number(dt.minute() as f64));
    t.set_str("sec", LuaValue::Number(dt.second() as f64));
    t.set_str(
        "wday",
        LuaValue::Number(dt.weekday().number_from_sunday() as f64),
    );
    t.set_str("yday", LuaValue::Number(dt.ordinal() as f64));
    t.set_str("isdst", LuaValue::Boolean(false));
    t
}

fn lua_date(vm: &mut LuaVM) -> LuaResult<usize> {
    let spec = vm.opt_str(1, "%c")?;
    let stamp = if vm.arg(2).is_nil() {
        Local::now().timestamp()
    } else {
        vm.check_number(2)? as i64
    };
    let (spec, utc) = match spec.strip_prefix('!') {
        Some(rest) => (rest.to_string(), true),
        None => (spec, false),
    };
    let local = match Local.timestamp_opt(stamp, 0).single() {
        Some(dt) => dt,
        None => return Err(vm.arg_error(2, "time out of range")),
    };
    if spec == "*t" {
        let t = if utc {
            date_table(&local.with_timezone(&Utc))
        } else {
            date_table(&local)
        };
        vm.push(LuaValue::from_table(t))?;
        return Ok(1);
    }
    let rendered = if utc {
        local.with_timezone(&Utc).format(&spec).to_string()
    } else {
        local.format(&spec).to_string()
    };
    vm.push(LuaValue::from_string(rendered))?;
    Ok(1)
}

fn lua_difftime(vm: &mut LuaVM) -> LuaResult<usize> {
    let t2 = vm.check_number(1)?;
    let t1 = vm.opt_number(2, 0.0)?;
    vm.push(LuaValue::Number(t2 - t1))?;
    Ok(1)
}

fn lua_getenv(vm: &mut LuaVM) -> LuaResult<usize> {
    let name = vm.check_str(1)?;
    match std::env::var(&name) {
        Ok(v) => vm.push(LuaValue::from_string(v))?,
        Err(_) => vm.push(LuaValue::Nil)?,
    }
    Ok(1)
}
