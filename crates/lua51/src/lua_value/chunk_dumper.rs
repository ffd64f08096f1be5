// Binary chunk writer. Structural inverse of chunk_loader; always emits
// the little-endian flavor of the Lua 5.1 format.

use crate::lua_value::{Chunk, LuaValue};

pub const SIGNATURE: &[u8; 4] = b"\x1bLua";
pub const VERSION: u8 = 0x51;
pub const FORMAT: u8 = 0;

pub const TAG_NIL: u8 = 0;
pub const TAG_BOOLEAN: u8 = 1;
pub const TAG_NUMBER: u8 = 3;
pub const TAG_STRING: u8 = 4;

/// Serialize a prototype tree. With `strip` set, line info, local names
/// and upvalue names are omitted.
pub fn dump_chunk(chunk: &Chunk, strip: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(64 + chunk.code.len() * 8);
    write_header(&mut out);
    write_function(&mut out, chunk, strip, true);
    out
}

fn write_header(out: &mut Vec<u8>) {
    out.extend_from_slice(SIGNATURE);
    out.push(VERSION);
    out.push(FORMAT);
    out.push(1); // little-endian
    out.push(4); // sizeof(int)
    out.push(4); // sizeof(size_t)
    out.push(4); // sizeof(Instruction)
    out.push(8); // sizeof(lua_Number)
    out.push(0); // numbers are floating point
}

fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_f64(out: &mut Vec<u8>, v: f64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    if s.is_empty() {
        write_u32(out, 0);
    } else {
        // length includes the trailing NUL
        write_u32(out, s.len() as u32 + 1);
        out.extend_from_slice(s.as_bytes());
        out.push(0);
    }
}

fn write_function(out: &mut Vec<u8>, chunk: &Chunk, strip: bool, top: bool) {
    if strip && !top {
        write_string(out, "");
    } else {
        write_string(out, &chunk.source);
    }
    write_u32(out, chunk.line_defined);
    write_u32(out, chunk.last_line_defined);
    out.push(chunk.nups);
    out.push(chunk.num_params);
    out.push(if chunk.is_vararg { 2 } else { 0 });
    out.push(chunk.max_stack);

    write_u32(out, chunk.code.len() as u32);
    for i in &chunk.code {
        write_u32(out, i.0);
    }

    write_u32(out, chunk.constants.len() as u32);
    for k in &chunk.constants {
        match k {
            LuaValue::Nil => out.push(TAG_NIL),
            LuaValue::Boolean(b) => {
                out.push(TAG_BOOLEAN);
                out.push(*b as u8);
            }
            LuaValue::Number(n) => {
                out.push(TAG_NUMBER);
                write_f64(out, *n);
            }
            LuaValue::String(s) => {
                out.push(TAG_STRING);
                write_string(out, s);
            }
            // the compiler only ever interns the four kinds above
            _ => out.push(TAG_NIL),
        }
    }

    write_u32(out, chunk.protos.len() as u32);
    for p in &chunk.protos {
        write_function(out, p, strip, false);
    }

    if strip {
        write_u32(out, 0);
        write_u32(out, 0);
        write_u32(out, 0);
    } else {
        write_u32(out, chunk.line_info.len() as u32);
        for line in &chunk.line_info {
            write_u32(out, *line);
        }
        write_u32(out, chunk.locvars.len() as u32);
        for lv in &chunk.locvars {
            write_string(out, &lv.name);
            write_u32(out, lv.start_pc);
            write_u32(out, lv.end_pc);
        }
        write_u32(out, chunk.upvalue_names.len() as u32);
        for name in &chunk.upvalue_names {
            write_string(out, name);
        }
    }
}
