use std::rc::Rc;

use smol_str::SmolStr;

use crate::lua_value::str_to_number;
use crate::lua_vm::{LuaError, LuaResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // keywords
    And,
    Break,
    Do,
    Else,
    Elseif,
    End,
    False,
    For,
    Function,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    True,
    Until,
    While,
    // multi-char symbols
    Concat, // ..
    Dots,   // ...
    Eq,     // ==
    Ge,     // >=
    Le,     // <=
    Ne,     // ~=
    // literals and names
    Number(f64),
    Name(SmolStr),
    Str(String),
    /// Any single-character symbol.
    Char(u8),
    Eof,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::And => "and".into(),
            Token::Break => "break".into(),
            Token::Do => "do".into(),
            Token::Else => "else".into(),
            Token::Elseif => "elseif".into(),
            Token::End => "end".into(),
            Token::False => "false".into(),
            Token::For => "for".into(),
            Token::Function => "function".into(),
            Token::If => "if".into(),
            Token::In => "in".into(),
            Token::Local => "local".into(),
            Token::Nil => "nil".into(),
            Token::Not => "not".into(),
            Token::Or => "or".into(),
            Token::Repeat => "repeat".into(),
            Token::Return => "return".into(),
            Token::Then => "then".into(),
            Token::True => "true".into(),
            Token::Until => "until".into(),
            Token::While => "while".into(),
            Token::Concat => "..".into(),
            Token::Dots => "...".into(),
            Token::Eq => "==".into(),
            Token::Ge => ">=".into(),
            Token::Le => "<=".into(),
            Token::Ne => "~=".into(),
            Token::Number(n) => crate::lua_value::number_to_string(*n),
            Token::Name(s) => s.to_string(),
            Token::Str(s) => s.clone(),
            Token::Char(c) => (*c as char).to_string(),
            Token::Eof => "<eof>".into(),
        }
    }
}

fn keyword(s: &str) -> Option<Token> {
    Some(match s {
        "and" => Token::And,
        "break" => Token::Break,
        "do" => Token::Do,
        "else" => Token::Else,
        "elseif" => Token::Elseif,
        "end" => Token::End,
        "false" => Token::False,
        "for" => Token::For,
        "function" => Token::Function,
        "if" => Token::If,
        "in" => Token::In,
        "local" => Token::Local,
        "nil" => Token::Nil,
        "not" => Token::Not,
        "or" => Token::Or,
        "repeat" => Token::Repeat,
        "return" => Token::Return,
        "then" => Token::Then,
        "true" => Token::True,
        "until" => Token::Until,
        "while" => Token::While,
        _ => return None,
    })
}

pub struct Lexer<'s> {
    src: &'s [u8],
    pos: usize,
    pub line: u32,
    pub source: Rc<str>,
    /// Current token and the line it started on.
    pub token: Token,
    pub token_line: u32,
    /// Line of the previously consumed token; code emission attributes
    /// instructions to it.
    pub last_line: u32,
    ahead: Option<(Token, u32)>,
}

impl<'s> Lexer<'s> {
    pub fn new(text: &'s str, chunk_name: &str) -> LuaResult<Lexer<'s>> {
        let mut lx = Lexer {
            src: text.as_bytes(),
            pos: 0,
            line: 1,
            source: Rc::from(chunk_name),
            token: Token::Eof,
            token_line: 1,
            last_line: 1,
            ahead: None,
        };
        lx.next_token()?;
        Ok(lx)
    }

    pub fn error(&self, msg: &str) -> LuaError {
        LuaError::Lex(format!(
            "{}:{}: {} near '{}'",
            self.source,
            self.token_line,
            msg,
            self.token.describe()
        ))
    }

    fn scan_error(&self, msg: &str, near: &str) -> LuaError {
        LuaError::Lex(format!(
            "{}:{}: {} near '{}'",
            self.source, self.line, msg, near
        ))
    }

    pub fn next_token(&mut self) -> LuaResult<()> {
        self.last_line = self.token_line;
        match self.ahead.take() {
            Some((t, l)) => {
                self.token = t;
                self.token_line = l;
            }
            None => {
                let (t, l) = self.scan()?;
                self.token = t;
                self.token_line = l;
            }
        }
        Ok(())
    }

    pub fn peek(&mut self) -> LuaResult<&Token> {
        if self.ahead.is_none() {
            let t = self.scan()?;
            self.ahead = Some(t);
        }
        Ok(&self.ahead.as_ref().unwrap().0)
    }

    fn cur(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn at(&self, off: usize) -> Option<u8> {
        self.src.get(self.pos + off).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    /// Consume a \n, \r, \r\n or \n\r sequence as one line break.
    fn newline(&mut self) {
        let first = self.cur();
        self.bump();
        if let (Some(a), Some(b)) = (first, self.cur()) {
            if (b == b'\n' || b == b'\r') && b != a {
                self.bump();
            }
        }
        self.line += 1;
    }

    fn scan(&mut self) -> LuaResult<(Token, u32)> {
        loop {
            let c = match self.cur() {
                None => return Ok((Token::Eof, self.line)),
                Some(c) => c,
            };
            match c {
                b'\n' | b'\r' => self.newline(),
                b' ' | b'\t' | b'\x0b' | b'\x0c' => self.bump(),
                b'-' => {
                    if self.at(1) != Some(b'-') {
                        self.bump();
                        return Ok((Token::Char(b'-'), self.line));
                    }
                    self.pos += 2;
                    // long comment?
                    if self.cur() == Some(b'[') {
                        if let Some(level) = self.long_bracket_level() {
                            self.read_long_string(level, true)?;
                            continue;
                        }
                    }
                    while let Some(c) = self.cur() {
                        if c == b'\n' || c == b'\r' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return self.scan_token(),
            }
        }
    }

    fn scan_token(&mut self) -> LuaResult<(Token, u32)> {
        let line = self.line;
        let c = self.cur().unwrap_or(0);
        let tok = match c {
            b'=' => {
                self.bump();
                if self.cur() == Some(b'=') {
                    self.bump();
                    Token::Eq
                } else {
                    Token::Char(b'=')
                }
            }
            b'<' => {
                self.bump();
                if self.cur() == Some(b'=') {
                    self.bump();
                    Token::Le
                } else {
                    Token::Char(b'<')
                }
            }
            b'>' => {
                self.bump();
                if self.cur() == Some(b'=') {
                    self.bump();
                    Token::Ge
                } else {
                    Token::Char(b'>')
                }
            }
            b'~' => {
                self.bump();
                if self.cur() == Some(b'=') {
                    self.bump();
                    Token::Ne
                } else {
                    return Err(self.scan_error("unexpected symbol", "~"));
                }
            }
            b'"' | b'\'' => return Ok((self.read_string(c)?, line)),
            b'[' => {
                if let Some(level) = self.long_bracket_level() {
                    let s = self.read_long_string(level, false)?;
                    return Ok((Token::Str(s), line));
                }
                self.bump();
                Token::Char(b'[')
            }
            b'.' => {
                if self.at(1).map_or(false, |d| d.is_ascii_digit()) {
                    return Ok((self.read_number()?, line));
                }
                self.bump();
                if self.cur() == Some(b'.') {
                    self.bump();
                    if self.cur() == Some(b'.') {
                        self.bump();
                        Token::Dots
                    } else {
                        Token::Concat
                    }
                } else {
                    Token::Char(b'.')
                }
            }
            b'0'..=b'9' => return Ok((self.read_number()?, line)),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let start = self.pos;
                while let Some(c) = self.cur() {
                    if c.is_ascii_alphanumeric() || c == b'_' {
                        self.bump();
                    } else {
                        break;
                    }
                }
                let s = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
                match keyword(s) {
                    Some(k) => k,
                    None => Token::Name(SmolStr::new(s)),
                }
            }
            b'+' | b'-' | b'*' | b'/' | b'%' | b'^' | b'#' | b'(' | b')' | b'{' | b'}'
            | b']' | b';' | b':' | b',' => {
                self.bump();
                Token::Char(c)
            }
            _ => {
                return Err(self.scan_error(
                    "unexpected symbol",
                    &(c as char).to_string(),
                ))
            }
        };
        Ok((tok, line))
    }

    fn read_number(&mut self) -> LuaResult<Token> {
        let start = self.pos;
        if self.cur() == Some(b'0') && matches!(self.at(1), Some(b'x') | Some(b'X')) {
            self.pos += 2;
            while self.cur().map_or(false, |c| c.is_ascii_hexdigit()) {
                self.bump();
            }
        } else {
            let mut seen_e = false;
            while let Some(c) = self.cur() {
                match c {
                    b'0'..=b'9' | b'.' => self.bump(),
                    b'e' | b'E' if !seen_e => {
                        seen_e = true;
                        self.bump();
                        if matches!(self.cur(), Some(b'+') | Some(b'-')) {
                            self.bump();
                        }
                    }
                    _ => break,
                }
            }
        }
        // trailing alphanumerics make the numeral malformed (e.g. 3x)
        let bad_tail = self
            .cur()
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == b'_');
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        if bad_tail {
            return Err(self.scan_error("malformed number", text));
        }
        match str_to_number(text) {
            Some(n) => Ok(Token::Number(n)),
            None => Err(self.scan_error("malformed number", text)),
        }
    }

    fn read_string(&mut self, delim: u8) -> LuaResult<Token> {
        self.bump();
        let mut out = Vec::new();
        loop {
            let c = match self.cur() {
                None => return Err(self.scan_error("unfinished string", "<eof>")),
                Some(c) => c,
            };
            match c {
                b'\n' | b'\r' => {
                    return Err(self.scan_error(
                        "unfinished string",
                        &String::from_utf8_lossy(&out),
                    ))
                }
                b'\\' => {
                    self.bump();
                    let e = match self.cur() {
                        None => return Err(self.scan_error("unfinished string", "<eof>")),
                        Some(e) => e,
                    };
                    match e {
                        b'a' => {
                            out.push(7);
                            self.bump();
                        }
                        b'b' => {
                            out.push(8);
                            self.bump();
                        }
                        b'f' => {
                            out.push(12);
                            self.bump();
                        }
                        b'n' => {
                            out.push(b'\n');
                            self.bump();
                        }
                        b'r' => {
                            out.push(b'\r');
                            self.bump();
                        }
                        b't' => {
                            out.push(b'\t');
                            self.bump();
                        }
                        b'v' => {
                            out.push(11);
                            self.bump();
                        }
                        b'\n' | b'\r' => {
                            self.newline();
                            out.push(b'\n');
                        }
                        b'0'..=b'9' => {
                            let mut n: u32 = 0;
                            let mut digits = 0;
                            while digits < 3 {
                                match self.cur() {
                                    Some(d) if d.is_ascii_digit() => {
                                        n = n * 10 + (d - b'0') as u32;
                                        digits += 1;
                                        self.bump();
                                    }
                                    _ => break,
                                }
                            }
                            if n > 255 {
                                return Err(
                                    self.scan_error("escape sequence too large", &n.to_string())
                                );
                            }
                            out.push(n as u8);
                        }
                        _ => {
                            // \\, \", \', and any other char escape to itself
                            out.push(e);
                            self.bump();
                        }
                    }
                }
                _ if c == delim => {
                    self.bump();
                    break;
                }
                _ => {
                    out.push(c);
                    self.bump();
                }
            }
        }
        Ok(Token::Str(String::from_utf8_lossy(&out).into_owned()))
    }

    /// At a '[': number of '=' signs of a long bracket, or None if this
    /// is not one. Does not consume unless it is.
    fn long_bracket_level(&mut self) -> Option<usize> {
        debug_assert_eq!(self.cur(), Some(b'['));
        let mut level = 0;
        while self.at(1 + level) == Some(b'=') {
            level += 1;
        }
        if self.at(1 + level) == Some(b'[') {
            self.pos += level + 2;
            Some(level)
        } else {
            None
        }
    }

    fn read_long_string(&mut self, level: usize, is_comment: bool) -> LuaResult<String> {
        // skip a newline immediately after the opening bracket
        if matches!(self.cur(), Some(b'\n') | Some(b'\r')) {
            self.newline();
        }
        let mut out = Vec::new();
        loop {
            let c = match self.cur() {
                None => {
                    let what = if is_comment {
                        "unfinished long comment"
                    } else {
                        "unfinished long string"
                    };
                    return Err(self.scan_error(what, "<eof>"));
                }
                Some(c) => c,
            };
            match c {
                b']' => {
                    let mut eqs = 0;
                    while self.at(1 + eqs) == Some(b'=') {
                        eqs += 1;
                    }
                    if eqs == level && self.at(1 + eqs) == Some(b']') {
                        self.pos += level + 2;
                        break;
                    }
                    out.push(c);
                    self.bump();
                }
                b'\n' | b'\r' => {
                    self.newline();
                    out.push(b'\n');
                }
                _ => {
                    out.push(c);
                    self.bump();
                }
            }
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_tokens(src: &str) -> Vec<Token> {
        let mut lx = Lexer::new(src, "t").unwrap();
        let mut out = Vec::new();
        while lx.token != Token::Eof {
            out.push(lx.token.clone());
            lx.next_token().unwrap();
        }
        out
    }

    #[test]
    fn keywords_and_names() {
        let toks = all_tokens("local x = while_not");
        assert_eq!(
            toks,
            vec![
                Token::Local,
                Token::Name(SmolStr::new("x")),
                Token::Char(b'='),
                Token::Name(SmolStr::new("while_not")),
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(all_tokens("3"), vec![Token::Number(3.0)]);
        assert_eq!(all_tokens("3.25"), vec![Token::Number(3.25)]);
        assert_eq!(all_tokens("1e2"), vec![Token::Number(100.0)]);
        assert_eq!(all_tokens("0xFF"), vec![Token::Number(255.0)]);
        assert_eq!(all_tokens(".5"), vec![Token::Number(0.5)]);
        assert!(Lexer::new("3x", "t").is_err());
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(
            all_tokens(r#""a\n\065\"""#),
            vec![Token::Str("a\nA\"".to_string())]
        );
        assert_eq!(
            all_tokens("[[line\nline]]"),
            vec![Token::Str("line\nline".to_string())]
        );
        assert_eq!(
            all_tokens("[==[ a]] ]==]"),
            vec![Token::Str(" a]] ".to_string())]
        );
        assert!(Lexer::new("\"open", "t").is_err());
        assert!(Lexer::new("[[open", "t").is_err());
    }

    #[test]
    fn symbols() {
        assert_eq!(
            all_tokens("== ~= <= >= .. ... . < ="),
            vec![
                Token::Eq,
                Token::Ne,
                Token::Le,
                Token::Ge,
                Token::Concat,
                Token::Dots,
                Token::Char(b'.'),
                Token::Char(b'<'),
                Token::Char(b'='),
            ]
        );
    }

    #[test]
    fn comments_and_lines() {
        let mut lx = Lexer::new("-- c\n--[[ long\ncomment ]] x", "t").unwrap();
        assert_eq!(lx.token, Token::Name(SmolStr::new("x")));
        assert_eq!(lx.token_line, 3);
        lx.next_token().unwrap();
        assert_eq!(lx.token, Token::Eof);
    }
}
