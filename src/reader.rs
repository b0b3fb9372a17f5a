//! Forward-only token cursor over JSON text.
//!
//! [`TokenReader`] works on one buffer at a time. When the buffer ends in the
//! middle of a token and more data may follow (`is_final_block == false`),
//! [`TokenReader::read`] returns `Ok(false)` without consuming anything. The
//! caller keeps the unconsumed tail (`buffer[bytes_consumed()..]`), appends
//! more input and builds a new reader from [`TokenReader::into_state`].
//!
//! ```rust
//! use frameconv::reader::{TokenReader, TokenType};
//!
//! let mut reader = TokenReader::new(br#"{"a": [1, tr"#, false);
//! assert!(reader.read().unwrap());
//! assert_eq!(reader.token_type(), TokenType::StartObject);
//! assert!(reader.read().unwrap());
//! assert_eq!(reader.token_type(), TokenType::PropertyName);
//! assert!(reader.read().unwrap());
//! assert!(reader.read().unwrap());
//! assert_eq!(reader.token_type(), TokenType::Number);
//! // `tr` may still become `true`
//! assert!(!reader.read().unwrap());
//! ```

use crate::{Error, Result};
use std::borrow::Cow;
use std::fmt;

/// Kinds of tokens produced by the cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenType {
    #[default]
    None,
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    PropertyName,
    String,
    Number,
    True,
    False,
    Null,
}

impl TokenType {
    /// Returns `true` for tokens that begin a value.
    #[must_use]
    pub const fn starts_value(self) -> bool {
        matches!(
            self,
            TokenType::StartObject
                | TokenType::StartArray
                | TokenType::String
                | TokenType::Number
                | TokenType::True
                | TokenType::False
                | TokenType::Null
        )
    }

    #[must_use]
    pub const fn is_scalar(self) -> bool {
        matches!(
            self,
            TokenType::String
                | TokenType::Number
                | TokenType::True
                | TokenType::False
                | TokenType::Null
        )
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenType::None => "nothing",
            TokenType::StartObject => "'{'",
            TokenType::EndObject => "'}'",
            TokenType::StartArray => "'['",
            TokenType::EndArray => "']'",
            TokenType::PropertyName => "property name",
            TokenType::String => "string",
            TokenType::Number => "number",
            TokenType::True => "true",
            TokenType::False => "false",
            TokenType::Null => "null",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

/// Position bookkeeping that survives across buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Location {
    line: usize,
    column: usize,
    offset: usize,
}

impl Default for Location {
    fn default() -> Self {
        Location {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

/// Reader state carried between buffers of the same document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReaderState {
    containers: Vec<Container>,
    token_type: TokenType,
    location: Location,
    root_done: bool,
}

impl ReaderState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current container nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.containers.len()
    }

    /// Absolute offset of the first byte not yet consumed.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.location.offset
    }

    #[must_use]
    pub fn line(&self) -> usize {
        self.location.line
    }
}

/// Saved reader position inside the current buffer.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    position: usize,
    token_start: usize,
    token_end: usize,
    has_escapes: bool,
    state: ReaderState,
}

impl Checkpoint {
    /// Buffer position this checkpoint was taken at.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }
}

/// Scanner cursor used while a token is tentatively read.
#[derive(Clone, Copy)]
struct Scan {
    pos: usize,
    location: Location,
}

enum Lexed {
    Token {
        token_type: TokenType,
        start: usize,
        end: usize,
        has_escapes: bool,
    },
    Incomplete,
    End,
}

/// A forward-only reader over one buffer of JSON text.
pub struct TokenReader<'a> {
    buffer: &'a [u8],
    is_final_block: bool,
    position: usize,
    state: ReaderState,
    token_start: usize,
    token_end: usize,
    has_escapes: bool,
}

impl<'a> TokenReader<'a> {
    /// Creates a reader for the first buffer of a document.
    #[must_use]
    pub fn new(buffer: &'a [u8], is_final_block: bool) -> Self {
        Self::with_state(buffer, is_final_block, ReaderState::default())
    }

    /// Creates a reader continuing a document from a previous buffer.
    #[must_use]
    pub fn with_state(buffer: &'a [u8], is_final_block: bool, state: ReaderState) -> Self {
        TokenReader {
            buffer,
            is_final_block,
            position: 0,
            state,
            token_start: 0,
            token_end: 0,
            has_escapes: false,
        }
    }

    /// Consumes the reader, returning the state to resume with.
    #[must_use]
    pub fn into_state(self) -> ReaderState {
        self.state
    }

    #[must_use]
    pub fn state(&self) -> &ReaderState {
        &self.state
    }

    #[must_use]
    pub fn is_final_block(&self) -> bool {
        self.is_final_block
    }

    /// Number of bytes of the current buffer fully consumed.
    #[must_use]
    pub fn bytes_consumed(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn token_type(&self) -> TokenType {
        self.state.token_type
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.state.containers.len()
    }

    #[must_use]
    pub fn line(&self) -> usize {
        self.state.location.line
    }

    /// Absolute byte offset of the reader in the whole document.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.state.location.offset
    }

    /// Returns `true` once the root value has been fully read.
    #[must_use]
    pub fn is_root_complete(&self) -> bool {
        self.state.root_done
    }

    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            position: self.position,
            token_start: self.token_start,
            token_end: self.token_end,
            has_escapes: self.has_escapes,
            state: self.state.clone(),
        }
    }

    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.position = checkpoint.position;
        self.token_start = checkpoint.token_start;
        self.token_end = checkpoint.token_end;
        self.has_escapes = checkpoint.has_escapes;
        self.state = checkpoint.state;
    }

    /// Creates an independent reader over the same buffer positioned at
    /// `checkpoint`.
    #[must_use]
    pub fn fork(&self, checkpoint: &Checkpoint) -> TokenReader<'a> {
        TokenReader {
            buffer: self.buffer,
            is_final_block: self.is_final_block,
            position: checkpoint.position,
            state: checkpoint.state.clone(),
            token_start: checkpoint.token_start,
            token_end: checkpoint.token_end,
            has_escapes: checkpoint.has_escapes,
        }
    }

    fn syntax_error(&self, location: Location, msg: &str) -> Error {
        Error::syntax(location.line, location.column, location.offset, msg)
    }

    /// Advances to the next token.
    ///
    /// Returns `Ok(false)` when the buffer does not contain the whole token
    /// and more input may follow; nothing is consumed in that case.
    pub fn read(&mut self) -> Result<bool> {
        let mut scan = Scan {
            pos: self.position,
            location: self.state.location,
        };
        self.skip_whitespace(&mut scan);

        if self.state.root_done {
            return if scan.pos < self.buffer.len() {
                Err(self.syntax_error(scan.location, "trailing data after the root value"))
            } else {
                self.commit_whitespace(scan);
                Ok(false)
            };
        }

        let expect_name = self.expects_property_name();
        let prev = self.state.token_type;
        let in_container = self.state.containers.last().copied();

        // A separator is required between siblings.
        let after_value = matches!(
            prev,
            TokenType::EndObject
                | TokenType::EndArray
                | TokenType::String
                | TokenType::Number
                | TokenType::True
                | TokenType::False
                | TokenType::Null
        );
        let mut needs_name = expect_name;
        if after_value && in_container.is_some() {
            match self.peek(scan.pos) {
                None => return self.incomplete(),
                Some(b',') => {
                    self.advance(&mut scan, 1);
                    self.skip_whitespace(&mut scan);
                    needs_name = in_container == Some(Container::Object);
                    match self.peek(scan.pos) {
                        None => return self.incomplete(),
                        Some(b'}') | Some(b']') => {
                            return Err(self.syntax_error(scan.location, "trailing comma"));
                        }
                        _ => {}
                    }
                }
                Some(b'}') if in_container == Some(Container::Object) => {}
                Some(b']') if in_container == Some(Container::Array) => {}
                Some(_) => {
                    return Err(self.syntax_error(scan.location, "expected ',' or end of container"));
                }
            }
        }

        let lexed = self.lex(&mut scan, needs_name)?;
        match lexed {
            Lexed::Incomplete => self.incomplete(),
            Lexed::End => {
                if self.is_final_block {
                    Err(self.syntax_error(scan.location, "unexpected end of input"))
                } else {
                    self.commit_whitespace(scan);
                    Ok(false)
                }
            }
            Lexed::Token {
                token_type,
                start,
                end,
                has_escapes,
            } => {
                self.validate_transition(token_type, scan.location)?;
                match token_type {
                    TokenType::StartObject => self.state.containers.push(Container::Object),
                    TokenType::StartArray => self.state.containers.push(Container::Array),
                    TokenType::EndObject | TokenType::EndArray => {
                        self.state.containers.pop();
                    }
                    _ => {}
                }
                self.state.token_type = token_type;
                self.token_start = start;
                self.token_end = end;
                self.has_escapes = has_escapes;
                self.position = scan.pos;
                self.state.location = scan.location;
                if self.state.containers.is_empty()
                    && token_type != TokenType::PropertyName
                    && token_type != TokenType::StartObject
                    && token_type != TokenType::StartArray
                {
                    self.state.root_done = true;
                }
                Ok(true)
            }
        }
    }

    fn incomplete(&self) -> Result<bool> {
        if self.is_final_block {
            Err(self.syntax_error(self.state.location, "unexpected end of input"))
        } else {
            Ok(false)
        }
    }

    fn commit_whitespace(&mut self, scan: Scan) {
        self.position = scan.pos;
        self.state.location = scan.location;
    }

    fn expects_property_name(&self) -> bool {
        self.state.token_type == TokenType::StartObject
    }

    fn validate_transition(&self, next: TokenType, location: Location) -> Result<()> {
        let prev = self.state.token_type;
        let container = self.state.containers.last().copied();
        let ok = match next {
            TokenType::EndObject => {
                container == Some(Container::Object) && prev != TokenType::PropertyName
            }
            TokenType::EndArray => container == Some(Container::Array),
            TokenType::PropertyName => container == Some(Container::Object),
            _ => match container {
                None => prev == TokenType::None,
                Some(Container::Object) => prev == TokenType::PropertyName,
                Some(Container::Array) => true,
            },
        };
        if ok {
            Ok(())
        } else {
            Err(self.syntax_error(location, &format!("unexpected {} after {}", next, prev)))
        }
    }

    fn peek(&self, pos: usize) -> Option<u8> {
        self.buffer.get(pos).copied()
    }

    fn advance(&self, scan: &mut Scan, count: usize) {
        scan.pos += count;
        scan.location.column += count;
        scan.location.offset += count;
    }

    fn skip_whitespace(&self, scan: &mut Scan) {
        while let Some(b) = self.peek(scan.pos) {
            match b {
                b' ' | b'\t' | b'\r' => self.advance(scan, 1),
                b'\n' => {
                    scan.pos += 1;
                    scan.location.offset += 1;
                    scan.location.line += 1;
                    scan.location.column = 1;
                }
                _ => break,
            }
        }
    }

    fn lex(&self, scan: &mut Scan, needs_name: bool) -> Result<Lexed> {
        let Some(b) = self.peek(scan.pos) else {
            return Ok(Lexed::End);
        };
        let single = |token_type| Lexed::Token {
            token_type,
            start: 0,
            end: 0,
            has_escapes: false,
        };
        if needs_name && b != b'"' && b != b'}' {
            return Err(self.syntax_error(scan.location, "expected property name"));
        }
        match b {
            b'{' => {
                self.advance(scan, 1);
                Ok(single(TokenType::StartObject))
            }
            b'}' => {
                self.advance(scan, 1);
                Ok(single(TokenType::EndObject))
            }
            b'[' => {
                self.advance(scan, 1);
                Ok(single(TokenType::StartArray))
            }
            b']' => {
                self.advance(scan, 1);
                Ok(single(TokenType::EndArray))
            }
            b'"' => self.lex_string(scan, needs_name),
            b't' => self.lex_literal(scan, b"true", TokenType::True),
            b'f' => self.lex_literal(scan, b"false", TokenType::False),
            b'n' => self.lex_literal(scan, b"null", TokenType::Null),
            b'-' | b'0'..=b'9' => self.lex_number(scan),
            _ => Err(self.syntax_error(scan.location, "unexpected character")),
        }
    }

    fn lex_literal(&self, scan: &mut Scan, literal: &[u8], token_type: TokenType) -> Result<Lexed> {
        let available = &self.buffer[scan.pos..];
        let n = available.len().min(literal.len());
        if available[..n] != literal[..n] {
            return Err(self.syntax_error(scan.location, "invalid literal"));
        }
        if n < literal.len() {
            return Ok(Lexed::Incomplete);
        }
        let start = scan.pos;
        self.advance(scan, literal.len());
        Ok(Lexed::Token {
            token_type,
            start,
            end: scan.pos,
            has_escapes: false,
        })
    }

    fn lex_number(&self, scan: &mut Scan) -> Result<Lexed> {
        let start = scan.pos;
        let mut pos = scan.pos;
        if self.peek(pos) == Some(b'-') {
            pos += 1;
        }
        let int_start = pos;
        while matches!(self.peek(pos), Some(b'0'..=b'9')) {
            pos += 1;
        }
        let mut digits = pos - int_start;
        if self.peek(pos) == Some(b'.') {
            pos += 1;
            let frac_start = pos;
            while matches!(self.peek(pos), Some(b'0'..=b'9')) {
                pos += 1;
            }
            if pos == frac_start && pos < self.buffer.len() {
                return Err(self.syntax_error(scan.location, "expected digit after '.'"));
            }
            digits += pos - frac_start;
        }
        if matches!(self.peek(pos), Some(b'e') | Some(b'E')) {
            pos += 1;
            if matches!(self.peek(pos), Some(b'+') | Some(b'-')) {
                pos += 1;
            }
            let exp_start = pos;
            while matches!(self.peek(pos), Some(b'0'..=b'9')) {
                pos += 1;
            }
            if pos == exp_start && pos < self.buffer.len() {
                return Err(self.syntax_error(scan.location, "expected digit in exponent"));
            }
        }
        if pos == self.buffer.len() && !self.is_final_block {
            return Ok(Lexed::Incomplete);
        }
        if digits == 0 {
            return Err(self.syntax_error(scan.location, "invalid number"));
        }
        let text = &self.buffer[start..pos];
        if matches!(text.last(), Some(b'.') | Some(b'e') | Some(b'E') | Some(b'+') | Some(b'-')) {
            return Err(self.syntax_error(scan.location, "invalid number"));
        }
        self.advance(scan, pos - start);
        Ok(Lexed::Token {
            token_type: TokenType::Number,
            start,
            end: pos,
            has_escapes: false,
        })
    }

    fn lex_string(&self, scan: &mut Scan, is_name: bool) -> Result<Lexed> {
        let start = scan.pos + 1;
        let mut pos = start;
        let mut has_escapes = false;
        loop {
            match self.peek(pos) {
                None => return Ok(Lexed::Incomplete),
                Some(b'"') => break,
                Some(b'\\') => {
                    has_escapes = true;
                    pos += 2;
                }
                Some(b) if b < 0x20 => {
                    return Err(self.syntax_error(scan.location, "control character in string"));
                }
                Some(_) => pos += 1,
            }
        }
        let end = pos;
        let mut after = pos + 1;
        if is_name {
            // The colon belongs to the property-name token.
            let mut lookahead = Scan {
                pos: after,
                location: scan.location,
            };
            self.skip_whitespace(&mut lookahead);
            match self.peek(lookahead.pos) {
                None => return Ok(Lexed::Incomplete),
                Some(b':') => after = lookahead.pos + 1,
                Some(_) => {
                    return Err(self.syntax_error(scan.location, "expected ':' after property name"));
                }
            }
        }
        if std::str::from_utf8(&self.buffer[start..end]).is_err() {
            return Err(self.syntax_error(scan.location, "invalid UTF-8 in string"));
        }
        let mut location = scan.location;
        for &b in &self.buffer[scan.pos..after] {
            location.offset += 1;
            if b == b'\n' {
                location.line += 1;
                location.column = 1;
            } else {
                location.column += 1;
            }
        }
        scan.pos = after;
        scan.location = location;
        Ok(Lexed::Token {
            token_type: if is_name {
                TokenType::PropertyName
            } else {
                TokenType::String
            },
            start,
            end,
            has_escapes,
        })
    }

    /// Raw bytes of the current token, without quotes.
    #[must_use]
    pub fn value_span(&self) -> &'a [u8] {
        &self.buffer[self.token_start..self.token_end]
    }

    /// Raw text of a number token.
    pub fn number_text(&self) -> Result<&'a str> {
        if self.state.token_type != TokenType::Number {
            return Err(Error::unexpected_token("number", self.state.token_type));
        }
        std::str::from_utf8(self.value_span()).map_err(Error::custom)
    }

    /// Unescaped text of a string or property-name token.
    pub fn get_str(&self) -> Result<Cow<'a, str>> {
        match self.state.token_type {
            TokenType::String | TokenType::PropertyName => {}
            other => return Err(Error::unexpected_token("string", other)),
        }
        let raw = std::str::from_utf8(self.value_span()).map_err(Error::custom)?;
        if self.has_escapes {
            unescape(raw).map(Cow::Owned)
        } else {
            Ok(Cow::Borrowed(raw))
        }
    }

    pub fn get_bool(&self) -> Result<bool> {
        match self.state.token_type {
            TokenType::True => Ok(true),
            TokenType::False => Ok(false),
            other => Err(Error::unexpected_token("boolean", other)),
        }
    }

    /// Skips the current value.
    ///
    /// On a property name the following value is skipped; on a start token
    /// the reader moves to the matching end token. Returns `Ok(false)` and
    /// leaves the reader untouched if the value is not fully buffered.
    pub fn try_skip(&mut self) -> Result<bool> {
        let checkpoint = self.checkpoint();
        match self.skip_inner() {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.restore(checkpoint);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn skip_inner(&mut self) -> Result<bool> {
        if self.state.token_type == TokenType::PropertyName && !self.read()? {
            return Ok(false);
        }
        match self.state.token_type {
            TokenType::StartObject | TokenType::StartArray => {
                let depth = self.current_depth() - 1;
                while self.current_depth() > depth {
                    if !self.read()? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    /// Returns `true` if the value starting at the current token is fully
    /// buffered. The reader position is unchanged.
    pub fn has_complete_value(&mut self) -> Result<bool> {
        if self.is_final_block || self.state.token_type.is_scalar() {
            return Ok(true);
        }
        let checkpoint = self.checkpoint();
        let complete = self.skip_inner();
        self.restore(checkpoint);
        complete
    }
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000C}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('u') => {
                let high = read_hex4(&mut chars)?;
                let code = if (0xD800..0xDC00).contains(&high) {
                    if chars.next() != Some('\\') || chars.next() != Some('u') {
                        return Err(Error::custom("unpaired surrogate in string escape"));
                    }
                    let low = read_hex4(&mut chars)?;
                    if !(0xDC00..0xE000).contains(&low) {
                        return Err(Error::custom("invalid low surrogate in string escape"));
                    }
                    0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
                } else {
                    high
                };
                let ch = char::from_u32(code)
                    .ok_or_else(|| Error::custom("invalid unicode code point"))?;
                out.push(ch);
            }
            Some(other) => {
                return Err(Error::custom(format!("invalid escape '\\{}'", other)));
            }
            None => return Err(Error::custom("unterminated escape")),
        }
    }
    Ok(out)
}

fn read_hex4(chars: &mut std::str::Chars<'_>) -> Result<u32> {
    let mut code = 0u32;
    for _ in 0..4 {
        let digit = chars
            .next()
            .and_then(|c| c.to_digit(16))
            .ok_or_else(|| Error::custom("invalid unicode escape (expected 4 hex digits)"))?;
        code = code * 16 + digit;
    }
    Ok(code)
}
