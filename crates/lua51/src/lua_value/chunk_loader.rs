// Binary chunk reader for the Lua 5.1 format. Accepts chunks of either
// endianness by swapping multi-byte fields; everything else about the
// declared layout (sizes, number format) must match exactly.

use std::rc::Rc;

use smol_str::SmolStr;

use crate::lua_value::chunk_dumper::{
    FORMAT, SIGNATURE, TAG_BOOLEAN, TAG_NIL, TAG_NUMBER, TAG_STRING, VERSION,
};
use crate::lua_value::{Chunk, LocVar, LuaValue};
use crate::lua_vm::opcode::Instruction;
use crate::lua_vm::{LuaError, LuaResult};

const HEADER_LEN: usize = 12;
const MAX_NESTING: usize = 200;

pub fn load_chunk(data: &[u8], chunk_name: &str) -> LuaResult<Rc<Chunk>> {
    let mut r = Reader {
        data,
        pos: 0,
        swap: false,
        name: chunk_name.to_string(),
    };
    r.header()?;
    let source: Rc<str> = Rc::from(chunk_name);
    let chunk = r.function(&source, 0)?;
    Ok(Rc::new(chunk))
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    swap: bool,
    name: String,
}

impl<'a> Reader<'a> {
    fn bad(&self, what: &str) -> LuaError {
        LuaError::BadChunk(format!("{}: {} in precompiled chunk", self.name, what))
    }

    fn bytes(&mut self, n: usize) -> LuaResult<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(self.bad("unexpected end"));
        }
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn byte(&mut self) -> LuaResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> LuaResult<u32> {
        let b = self.bytes(4)?;
        let raw = [b[0], b[1], b[2], b[3]];
        Ok(if self.swap {
            u32::from_be_bytes(raw)
        } else {
            u32::from_le_bytes(raw)
        })
    }

    fn f64(&mut self) -> LuaResult<f64> {
        let b = self.bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        if self.swap {
            raw.reverse();
        }
        Ok(f64::from_le_bytes(raw))
    }

    fn string(&mut self) -> LuaResult<Option<String>> {
        let len = self.u32()? as usize;
        if len == 0 {
            return Ok(None);
        }
        let b = self.bytes(len)?;
        // drop the trailing NUL
        let b = &b[..len - 1];
        match std::str::from_utf8(b) {
            Ok(s) => Ok(Some(s.to_string())),
            Err(_) => Ok(Some(String::from_utf8_lossy(b).into_owned())),
        }
    }

    fn header(&mut self) -> LuaResult<()> {
        if self.data.len() < HEADER_LEN {
            return Err(self.bad("truncated header"));
        }
        if &self.data[0..4] != SIGNATURE {
            return Err(self.bad("bad signature"));
        }
        if self.data[4] != VERSION {
            return Err(self.bad("version mismatch"));
        }
        if self.data[5] != FORMAT {
            return Err(self.bad("incompatible format"));
        }
        match self.data[6] {
            1 => self.swap = false,
            0 => self.swap = true,
            _ => return Err(self.bad("bad endianness flag")),
        }
        // int, size_t, Instruction, lua_Number sizes and the integral flag
        if self.data[7] != 4
            || self.data[8] != 4
            || self.data[9] != 4
            || self.data[10] != 8
            || self.data[11] != 0
        {
            return Err(self.bad("incompatible platform sizes"));
        }
        self.pos = HEADER_LEN;
        Ok(())
    }

    fn function(&mut self, parent_source: &Rc<str>, depth: usize) -> LuaResult<Chunk> {
        if depth > MAX_NESTING {
            return Err(self.bad("nesting too deep"));
        }
        let source: Rc<str> = match self.string()? {
            Some(s) => Rc::from(s.as_str()),
            None => parent_source.clone(),
        };
        let mut chunk = Chunk::new(source.clone());
        chunk.line_defined = self.u32()?;
        chunk.last_line_defined = self.u32()?;
        chunk.nups = self.byte()?;
        chunk.num_params = self.byte()?;
        let vararg = self.byte()?;
        if vararg > 7 {
            return Err(self.bad("bad vararg flag"));
        }
        chunk.is_vararg = vararg & 2 != 0;
        chunk.max_stack = self.byte()?;

        let ncode = self.u32()? as usize;
        chunk.code.reserve(ncode);
        for _ in 0..ncode {
            let raw = self.u32()?;
            let instr = Instruction(raw);
            if instr.opcode().is_none() {
                return Err(self.bad("bad opcode"));
            }
            chunk.code.push(instr);
        }

        let nconst = self.u32()? as usize;
        chunk.constants.reserve(nconst);
        for _ in 0..nconst {
            let v = match self.byte()? {
                TAG_NIL => LuaValue::Nil,
                TAG_BOOLEAN => LuaValue::Boolean(self.byte()? != 0),
                TAG_NUMBER => LuaValue::Number(self.f64()?),
                TAG_STRING => {
                    LuaValue::from_string(self.string()?.unwrap_or_default())
                }
                _ => return Err(self.bad("bad constant tag")),
            };
            chunk.constants.push(v);
        }

        let nproto = self.u32()? as usize;
        chunk.protos.reserve(nproto);
        for _ in 0..nproto {
            chunk.protos.push(Rc::new(self.function(&source, depth + 1)?));
        }

        let nlines = self.u32()? as usize;
        chunk.line_info.reserve(nlines);
        for _ in 0..nlines {
            chunk.line_info.push(self.u32()?);
        }
        let nlocs = self.u32()? as usize;
        chunk.locvars.reserve(nlocs);
        for _ in 0..nlocs {
            let name = SmolStr::new(self.string()?.unwrap_or_default());
            let start_pc = self.u32()?;
            let end_pc = self.u32()?;
            chunk.locvars.push(LocVar {
                name,
                start_pc,
                end_pc,
            });
        }
        let nups = self.u32()? as usize;
        chunk.upvalue_names.reserve(nups);
        for _ in 0..nups {
            chunk
                .upvalue_names
                .push(SmolStr::new(self.string()?.unwrap_or_default()));
        }
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua_value::chunk_dumper::dump_chunk;
    use crate::lua_vm::opcode::OpCode;

    fn tiny_chunk() -> Chunk {
        let mut c = Chunk::new(Rc::from("@test"));
        c.max_stack = 2;
        c.code.push(Instruction::create_abx(OpCode::LoadK, 0, 0));
        c.code.push(Instruction::create_abc(OpCode::Return, 0, 2, 0));
        c.constants.push(LuaValue::Number(42.0));
        c.constants.push(LuaValue::from_string("hi"));
        c.line_info.extend_from_slice(&[1, 1]);
        c
    }

    #[test]
    fn round_trip_is_stable() {
        let c = tiny_chunk();
        let d1 = dump_chunk(&c, false);
        let loaded = load_chunk(&d1, "@test").unwrap();
        let d2 = dump_chunk(&loaded, false);
        assert_eq!(d1, d2);
    }

    #[test]
    fn strip_removes_debug_info() {
        let c = tiny_chunk();
        let d = dump_chunk(&c, true);
        let loaded = load_chunk(&d, "@test").unwrap();
        assert!(loaded.line_info.is_empty());
        assert!(loaded.locvars.is_empty());
        assert!(d.len() < dump_chunk(&c, false).len());
    }

    #[test]
    fn rejects_bad_version() {
        let mut d = dump_chunk(&tiny_chunk(), false);
        d[4] = 0x52;
        assert!(load_chunk(&d, "t").is_err());
    }

    #[test]
    fn rejects_bad_sizes() {
        let mut d = dump_chunk(&tiny_chunk(), false);
        d[8] = 8; // size_t
        assert!(load_chunk(&d, "t").is_err());
    }

    #[test]
    fn rejects_truncation() {
        let d = dump_chunk(&tiny_chunk(), false);
        for cut in [3, 11, 20, d.len() - 1] {
            assert!(load_chunk(&d[..cut], "t").is_err());
        }
    }

    #[test]
    fn rejects_bad_vararg_flag() {
        let mut d = dump_chunk(&tiny_chunk(), false);
        // header(12) + source string(4 + 6) + two line ints(8) + nups + numparams
        let vararg_pos = 12 + 4 + 6 + 8 + 2;
        assert_eq!(d[vararg_pos], 0);
        d[vararg_pos] = 8;
        assert!(load_chunk(&d, "t").is_err());
    }

    #[test]
    fn loads_big_endian() {
        // hand-built big-endian chunk: function with a single RETURN
        let be = |v: u32| v.to_be_bytes();
        let mut d = Vec::new();
        d.extend_from_slice(b"\x1bLua");
        d.extend_from_slice(&[0x51, 0, 0, 4, 4, 4, 8, 0]);
        d.extend_from_slice(&be(0)); // no source
        d.extend_from_slice(&be(0));
        d.extend_from_slice(&be(0));
        d.extend_from_slice(&[0, 0, 2, 2]); // nups, params, vararg, maxstack
        d.extend_from_slice(&be(1)); // one instruction
        d.extend_from_slice(&be(Instruction::create_abc(OpCode::Return, 0, 1, 0).0));
        d.extend_from_slice(&be(0)); // constants
        d.extend_from_slice(&be(0)); // protos
        d.extend_from_slice(&be(0)); // lines
        d.extend_from_slice(&be(0)); // locvars
        d.extend_from_slice(&be(0)); // upvalues
        let loaded = load_chunk(&d, "@be").unwrap();
        assert!(loaded.is_vararg);
        assert_eq!(loaded.code.len(), 1);
        assert_eq!(loaded.code[0].opcode(), Some(OpCode::Return));
    }
}
