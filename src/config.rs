// src/config.rs

//! Parser for the ACL block format used by the index, manifests, and
//! user configuration.
//!
//! The format is a tree of named blocks holding typed fields:
//!
//! ```text
//! Registry {
//!     string url = "https://example.org/index.acl";
//!     int priority = 100;
//!     bool require_signatures = false;
//!
//!     Package "snake" {
//!         string[] versions = { "1.0", "0.9" };
//!
//!         Version "1.0" {
//!             string pkg_url = "https://example.org/snake-1.0.pkg";
//!         }
//!     }
//! }
//! ```
//!
//! Blocks may carry a quoted label (`Package "snake"`), which is how
//! repeatable blocks are addressed. `/* */` and `//` comments are
//! allowed anywhere whitespace is. A bare dotted path on the right-hand
//! side of a field is a cross-reference, inlined by [`Block::resolve`].
//!
//! Lookup uses dotted path expressions: `Registry.Package["snake"].url`
//! addresses by block name and label, and `[N]` indexes into a string
//! list. Keys are case-sensitive. A missing key is reported distinctly
//! from a value of the wrong type.

use crate::error::{Error, Result};
use std::fmt;
use std::path::Path;

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<String>),
    /// Unresolved cross-reference (dotted path); replaced by `resolve`.
    Ref(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::List(items) => write!(f, "{{ {} }}", items.join(", ")),
            Value::Ref(path) => write!(f, "-> {path}"),
        }
    }
}

/// A named field inside a block.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

/// A block: name, optional label, fields, and child blocks.
///
/// The root returned by the parser is an anonymous block whose children
/// are the file's top-level blocks.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub name: String,
    pub label: Option<String>,
    pub fields: Vec<Field>,
    pub children: Vec<Block>,
}

impl Block {
    /// Parse a configuration document from a string.
    pub fn parse_str(text: &str) -> Result<Block> {
        let mut p = Parser::new(text);
        let mut root = Block::default();
        p.skip_ws();
        while !p.at_end() {
            root.children.push(p.parse_block()?);
            p.skip_ws();
        }
        Ok(root)
    }

    /// Parse a configuration document from a file.
    pub fn parse_file(path: &Path) -> Result<Block> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::ParseFailed(format!("cannot read {}: {e}", path.display()))
        })?;
        Block::parse_str(&text)
    }

    /// Inline cross-references. A field whose value is a bare dotted
    /// path is replaced with the scalar that path names; a dangling
    /// reference fails resolution.
    pub fn resolve(&mut self) -> Result<()> {
        let snapshot = self.clone();
        resolve_in(&snapshot, self)
    }

    /// Look up a string by path expression. A trailing `[N]` indexes
    /// into a string list.
    pub fn get_str(&self, path: &str) -> Result<&str> {
        match self.lookup_entry(path)? {
            (Value::Str(s), None) => Ok(s),
            (Value::List(items), Some(n)) => items
                .get(n)
                .map(String::as_str)
                .ok_or_else(|| Error::ConfigMissing(format!("{path}: index out of range"))),
            (other, _) => Err(Error::ParseFailed(format!(
                "'{path}' is not a string (got {other})"
            ))),
        }
    }

    /// Look up an integer by path expression.
    pub fn get_int(&self, path: &str) -> Result<i64> {
        match self.lookup(path)? {
            Value::Int(v) => Ok(*v),
            other => Err(Error::ParseFailed(format!(
                "'{path}' is not an int (got {other})"
            ))),
        }
    }

    /// Look up a float by path expression.
    pub fn get_float(&self, path: &str) -> Result<f64> {
        match self.lookup(path)? {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            other => Err(Error::ParseFailed(format!(
                "'{path}' is not a float (got {other})"
            ))),
        }
    }

    /// Look up a boolean by path expression.
    pub fn get_bool(&self, path: &str) -> Result<bool> {
        match self.lookup(path)? {
            Value::Bool(v) => Ok(*v),
            other => Err(Error::ParseFailed(format!(
                "'{path}' is not a bool (got {other})"
            ))),
        }
    }

    /// Look up a string list by path expression.
    pub fn get_list(&self, path: &str) -> Result<&[String]> {
        match self.lookup(path)? {
            Value::List(items) => Ok(items),
            other => Err(Error::ParseFailed(format!(
                "'{path}' is not a list (got {other})"
            ))),
        }
    }

    /// Resolve a dotted path expression to a field value.
    ///
    /// Missing keys are `ConfigMissing`; a malformed expression is
    /// `ParseFailed`.
    pub fn lookup(&self, path: &str) -> Result<&Value> {
        Ok(self.lookup_entry(path)?.0)
    }

    /// Like `lookup`, but a trailing `[N]` on a field is returned as a
    /// separate index instead of being applied to a child block.
    fn lookup_entry(&self, path: &str) -> Result<(&Value, Option<usize>)> {
        let segments = parse_path(path)?;
        let mut cur = self;

        for (i, seg) in segments.iter().enumerate() {
            let last = i + 1 == segments.len();

            if last {
                if let Some(field) = cur.fields.iter().find(|f| f.name == seg.name) {
                    return match &seg.selector {
                        Some(Selector::Index(n)) => Ok((&field.value, Some(*n))),
                        Some(Selector::Label(_)) => Err(Error::ParseFailed(format!(
                            "{path}: label selector applied to a field"
                        ))),
                        None => Ok((&field.value, None)),
                    };
                }
            }

            match cur.child(&seg.name, seg.selector.as_ref()) {
                Some(block) => cur = block,
                None => return Err(Error::ConfigMissing(path.to_string())),
            }
        }

        Err(Error::ConfigMissing(path.to_string()))
    }

    /// Index into a string list addressed by `path[N]`.
    pub fn get_list_item(&self, path: &str, index: usize) -> Result<&str> {
        let items = self.get_list(path)?;
        items
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| Error::ConfigMissing(format!("{path}[{index}]")))
    }

    fn child(&self, name: &str, selector: Option<&Selector>) -> Option<&Block> {
        match selector {
            Some(Selector::Label(label)) => self
                .children
                .iter()
                .find(|b| b.name == name && b.label.as_deref() == Some(label.as_str())),
            Some(Selector::Index(n)) => {
                self.children.iter().filter(|b| b.name == name).nth(*n)
            }
            None => self.children.iter().find(|b| b.name == name),
        }
    }
}

fn resolve_in(root: &Block, block: &mut Block) -> Result<()> {
    for field in &mut block.fields {
        if let Value::Ref(target) = &field.value {
            let resolved = root.lookup(target)?;
            if matches!(resolved, Value::Ref(_)) {
                return Err(Error::ParseFailed(format!(
                    "reference '{target}' points at another reference"
                )));
            }
            field.value = resolved.clone();
        }
    }
    for child in &mut block.children {
        resolve_in(root, child)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Path expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Selector {
    Label(String),
    Index(usize),
}

#[derive(Debug)]
struct Segment {
    name: String,
    selector: Option<Selector>,
}

/// Split `A.B["x"].c[0]` into segments.
fn parse_path(path: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let bytes = path.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        while i < bytes.len() && bytes[i] != b'.' && bytes[i] != b'[' {
            i += 1;
        }
        let name = &path[start..i];
        if name.is_empty() {
            return Err(Error::ParseFailed(format!("bad path expression '{path}'")));
        }

        let mut selector = None;
        if i < bytes.len() && bytes[i] == b'[' {
            i += 1;
            if i < bytes.len() && bytes[i] == b'"' {
                i += 1;
                let lstart = i;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += 1;
                }
                if i >= bytes.len() {
                    return Err(Error::ParseFailed(format!(
                        "unterminated label in '{path}'"
                    )));
                }
                selector = Some(Selector::Label(path[lstart..i].to_string()));
                i += 1; // closing quote
            } else {
                let nstart = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let digits = &path[nstart..i];
                let n: usize = digits.parse().map_err(|_| {
                    Error::ParseFailed(format!("bad index in path '{path}'"))
                })?;
                selector = Some(Selector::Index(n));
            }
            if i >= bytes.len() || bytes[i] != b']' {
                return Err(Error::ParseFailed(format!("missing ']' in '{path}'")));
            }
            i += 1;
        }

        segments.push(Segment {
            name: name.to_string(),
            selector,
        });

        if i < bytes.len() {
            if bytes[i] != b'.' {
                return Err(Error::ParseFailed(format!(
                    "unexpected character after segment in '{path}'"
                )));
            }
            i += 1;
        }
    }

    if segments.is_empty() {
        return Err(Error::ParseFailed("empty path expression".to_string()));
    }
    Ok(segments)
}

// ---------------------------------------------------------------------------
// Document parser
// ---------------------------------------------------------------------------

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0, line: 1 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        if c == b'\n' {
            self.line += 1;
        }
        self.pos += 1;
        Some(c)
    }

    fn err(&self, msg: &str) -> Error {
        Error::ParseFailed(format!("line {}: {msg}", self.line))
    }

    fn skip_ws(&mut self) {
        loop {
            match self.peek() {
                Some(c) if (c as char).is_whitespace() => {
                    self.bump();
                }
                Some(b'/') => {
                    let rest = &self.text.as_bytes()[self.pos..];
                    if rest.starts_with(b"//") {
                        while let Some(c) = self.bump() {
                            if c == b'\n' {
                                break;
                            }
                        }
                    } else if rest.starts_with(b"/*") {
                        self.bump();
                        self.bump();
                        loop {
                            match self.bump() {
                                Some(b'*') if self.peek() == Some(b'/') => {
                                    self.bump();
                                    break;
                                }
                                Some(_) => continue,
                                None => break,
                            }
                        }
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
    }

    fn ident(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.bump();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.err("expected identifier"));
        }
        Ok(self.text[start..self.pos].to_string())
    }

    fn quoted(&mut self) -> Result<String> {
        if self.bump() != Some(b'"') {
            return Err(self.err("expected '\"'"));
        }
        let mut out: Vec<u8> = Vec::new();
        loop {
            match self.bump() {
                Some(b'"') => {
                    return Ok(String::from_utf8_lossy(&out).into_owned());
                }
                Some(b'\\') => match self.bump() {
                    Some(b'"') => out.push(b'"'),
                    Some(b'\\') => out.push(b'\\'),
                    Some(b'n') => out.push(b'\n'),
                    Some(b't') => out.push(b'\t'),
                    Some(c) => {
                        out.push(b'\\');
                        out.push(c);
                    }
                    None => return Err(self.err("unterminated string")),
                },
                Some(c) => out.push(c),
                None => return Err(self.err("unterminated string")),
            }
        }
    }

    fn expect(&mut self, c: u8) -> Result<()> {
        if self.bump() == Some(c) {
            Ok(())
        } else {
            Err(self.err(&format!("expected '{}'", c as char)))
        }
    }

    /// `Name ["label"] { item* }`
    fn parse_block(&mut self) -> Result<Block> {
        let name = self.ident()?;
        self.skip_ws();
        self.parse_block_after_name(name)
    }

    fn parse_block_after_name(&mut self, name: String) -> Result<Block> {
        let label = if self.peek() == Some(b'"') {
            let l = self.quoted()?;
            self.skip_ws();
            Some(l)
        } else {
            None
        };

        self.expect(b'{')?;

        let mut block = Block {
            name,
            label,
            fields: Vec::new(),
            children: Vec::new(),
        };

        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'}') => {
                    self.bump();
                    return Ok(block);
                }
                Some(_) => {
                    let ident = self.ident()?;
                    self.skip_ws();
                    match ident.as_str() {
                        // type keyword starts a field, anything else a
                        // nested block ("string[]" declares a list)
                        "string" | "int" | "float" | "bool" => {
                            let is_list = if self.peek() == Some(b'[') {
                                self.bump();
                                self.expect(b']')?;
                                self.skip_ws();
                                true
                            } else {
                                false
                            };
                            block.fields.push(self.parse_field(&ident, is_list)?);
                        }
                        _ => {
                            let child = self.parse_block_after_name(ident)?;
                            block.children.push(child);
                        }
                    }
                }
                None => return Err(self.err("unexpected end of input, missing '}'")),
            }
        }
    }

    /// `<type> name = value ;`
    fn parse_field(&mut self, ty: &str, is_list: bool) -> Result<Field> {
        let name = self.ident()?;
        self.skip_ws();
        self.expect(b'=')?;
        self.skip_ws();

        let value = if is_list {
            if ty != "string" {
                return Err(self.err("only string[] lists are supported"));
            }
            self.parse_list()?
        } else {
            match ty {
                "string" => {
                    if self.peek() == Some(b'"') {
                        Value::Str(self.quoted()?)
                    } else {
                        // bare dotted path = cross-reference
                        Value::Ref(self.bare_token()?)
                    }
                }
                "bool" => match self.bare_token()?.as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    other => return Err(self.err(&format!("bad bool '{other}'"))),
                },
                "int" => {
                    let tok = self.bare_token()?;
                    Value::Int(
                        tok.parse()
                            .map_err(|_| self.err(&format!("bad int '{tok}'")))?,
                    )
                }
                "float" => {
                    let tok = self.bare_token()?;
                    Value::Float(
                        tok.parse()
                            .map_err(|_| self.err(&format!("bad float '{tok}'")))?,
                    )
                }
                _ => unreachable!("caller filtered type keywords"),
            }
        };

        self.skip_ws();
        self.expect(b';')?;
        Ok(Field { name, value })
    }

    /// `{ "a", "b" }` — empty lists are allowed.
    fn parse_list(&mut self) -> Result<Value> {
        self.expect(b'{')?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'}') => {
                    self.bump();
                    return Ok(Value::List(items));
                }
                Some(b'"') => {
                    items.push(self.quoted()?);
                    self.skip_ws();
                    if self.peek() == Some(b',') {
                        self.bump();
                    }
                }
                _ => return Err(self.err("expected string or '}' in list")),
            }
        }
    }

    /// A run of non-whitespace, non-delimiter characters.
    fn bare_token(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if (c as char).is_whitespace() || c == b';' || c == b'}' {
                break;
            }
            self.bump();
        }
        if self.pos == start {
            return Err(self.err("expected value"));
        }
        Ok(self.text[start..self.pos].to_string())
    }
}
