// SPDX-License-Identifier: Apache-2.0

//! Persisted text form of a configuration tree:
//!
//! ```text
//! // rtconf-config-version: 1
//! interfaces {
//!     ethernet eth0 {
//!         address 192.0.2.1/24;
//!         description "uplink to ISP";
//!         disable;
//!     }
//! }
//! ```

use std::iter::Peekable;
use std::str::CharIndices;

use crate::{
    ConfigNode, ConfigPath, ConfigTree, ErrorKind, NodeData, RtconfError,
    Schema,
};

pub const CONFIG_VERSION: &str = "1";
const HEADER_PREFIX: &str = "//";
const VERSION_KEY: &str = "rtconf-config-version";
const INDENT: &str = "    ";

/// Serialize `tree` with the version header.
pub fn to_text(tree: &ConfigTree) -> String {
    let mut out = format!("{HEADER_PREFIX} {VERSION_KEY}: {CONFIG_VERSION}\n");
    write_children(tree.root(), 0, &mut out);
    out
}

fn write_children(node: &ConfigNode, depth: usize, out: &mut String) {
    let indent = INDENT.repeat(depth);
    for child in node.children() {
        let name = child.name();
        match child.data() {
            NodeData::Container(_) => {
                out.push_str(&format!("{indent}{name} {{\n"));
                write_children(child, depth + 1, out);
                out.push_str(&format!("{indent}}}\n"));
            }
            NodeData::Tag(instances) => {
                for instance in instances {
                    out.push_str(&format!(
                        "{indent}{name} {} {{\n",
                        quote(instance.name())
                    ));
                    write_children(instance, depth + 1, out);
                    out.push_str(&format!("{indent}}}\n"));
                }
            }
            NodeData::Leaf(None) => {
                out.push_str(&format!("{indent}{name};\n"));
            }
            NodeData::Leaf(Some(v)) => {
                out.push_str(&format!(
                    "{indent}{name} {};\n",
                    quote(&v.to_string())
                ));
            }
            NodeData::LeafList(vs) => {
                for v in vs {
                    out.push_str(&format!(
                        "{indent}{name} {};\n",
                        quote(&v.to_string())
                    ));
                }
            }
        }
    }
}

fn quote(value: &str) -> String {
    let needs_quote = value.is_empty()
        || value.contains("//")
        || value.contains("/*")
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '{' | '}' | ';' | '"' | '\\'));
    if !needs_quote {
        return value.to_string();
    }
    let mut ret = String::from('"');
    for c in value.chars() {
        match c {
            '"' => ret.push_str("\\\""),
            '\\' => ret.push_str("\\\\"),
            '\n' => ret.push_str("\\n"),
            '\t' => ret.push_str("\\t"),
            _ => ret.push(c),
        }
    }
    ret.push('"');
    ret
}

/// Header `key: value` pairs found before the configuration body.
pub fn read_header(content: &str) -> Vec<(String, String)> {
    let mut ret = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.strip_prefix(HEADER_PREFIX) {
            Some(rest) => {
                if let Some((k, v)) = rest.split_once(':') {
                    ret.push((k.trim().to_string(), v.trim().to_string()));
                }
            }
            None => break,
        }
    }
    ret
}

/// Parse the text form, validating every node and value against `schema`.
pub fn from_text(
    schema: &Schema,
    content: &str,
) -> Result<ConfigTree, RtconfError> {
    for (key, value) in read_header(content) {
        if key == VERSION_KEY && value != CONFIG_VERSION {
            log::warn!(
                "Configuration was written with format version {value}, \
                loading it as version {CONFIG_VERSION}"
            );
        }
    }
    let tokens = tokenize(content)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        schema,
        tree: ConfigTree::new(),
    };
    parser.parse_block(&ConfigPath::new(), None)?;
    Ok(parser.tree)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    LeftBrace,
    RightBrace,
    Semicolon,
}

enum Terminator {
    Open,
    Close,
    Semicolon,
    Eof,
}

#[derive(Debug, Clone)]
struct PositionedToken {
    token: Token,
    line: usize,
}

fn syntax_error(line: usize, msg: String) -> RtconfError {
    let e = RtconfError::new(
        ErrorKind::InvalidArgument,
        format!("line {line}: {msg}"),
    );
    log::error!("{}", e);
    e
}

fn tokenize(content: &str) -> Result<Vec<PositionedToken>, RtconfError> {
    let mut ret = Vec::new();
    let mut line = 1usize;
    let mut chars = content.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => (),
            '{' => ret.push(PositionedToken {
                token: Token::LeftBrace,
                line,
            }),
            '}' => ret.push(PositionedToken {
                token: Token::RightBrace,
                line,
            }),
            ';' => ret.push(PositionedToken {
                token: Token::Semicolon,
                line,
            }),
            '"' => {
                let start_line = line;
                let word = read_quoted(&mut chars, &mut line)?;
                ret.push(PositionedToken {
                    token: Token::Word(word),
                    line: start_line,
                });
            }
            '/' if matches!(chars.peek(), Some((_, '/'))) => {
                if !ret.is_empty() {
                    return Err(syntax_error(
                        line,
                        "header lines are only allowed before the \
                        configuration body"
                            .to_string(),
                    ));
                }
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                chars.next();
                let start_line = line;
                let mut prev = ' ';
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                    }
                    if prev == '*' && c == '/' {
                        closed = true;
                        break;
                    }
                    prev = c;
                }
                if !closed {
                    return Err(syntax_error(
                        start_line,
                        "unterminated comment".to_string(),
                    ));
                }
            }
            _ => {
                let mut word = c.to_string();
                while let Some((_, next)) = chars.peek() {
                    if next.is_whitespace()
                        || matches!(next, '{' | '}' | ';' | '"')
                    {
                        break;
                    }
                    word.push(*next);
                    chars.next();
                }
                ret.push(PositionedToken {
                    token: Token::Word(word),
                    line,
                });
            }
        }
    }
    Ok(ret)
}

fn read_quoted(
    chars: &mut Peekable<CharIndices>,
    line: &mut usize,
) -> Result<String, RtconfError> {
    let start_line = *line;
    let mut ret = String::new();
    while let Some((_, c)) = chars.next() {
        match c {
            '"' => return Ok(ret),
            '\\' => match chars.next() {
                Some((_, '"')) => ret.push('"'),
                Some((_, '\\')) => ret.push('\\'),
                Some((_, 'n')) => ret.push('\n'),
                Some((_, 't')) => ret.push('\t'),
                Some((_, other)) => {
                    return Err(syntax_error(
                        *line,
                        format!("unknown escape sequence '\\{other}'"),
                    ));
                }
                None => break,
            },
            '\n' => {
                *line += 1;
                ret.push(c);
            }
            _ => ret.push(c),
        }
    }
    Err(syntax_error(start_line, "unterminated quoted string".to_string()))
}

struct Parser<'a> {
    tokens: Vec<PositionedToken>,
    pos: usize,
    schema: &'a Schema,
    tree: ConfigTree,
}

impl<'a> Parser<'a> {
    // `open_line` is the line of the opening brace when parsing a nested
    // block, `None` for the top level.
    fn parse_block(
        &mut self,
        path: &ConfigPath,
        open_line: Option<usize>,
    ) -> Result<(), RtconfError> {
        loop {
            let mut words = Vec::new();
            let mut line = open_line.unwrap_or(1);
            let terminator = loop {
                match self.tokens.get(self.pos) {
                    Some(PositionedToken {
                        token: Token::Word(w),
                        line: l,
                    }) => {
                        words.push(w.clone());
                        line = *l;
                        self.pos += 1;
                    }
                    Some(t) => {
                        line = t.line;
                        self.pos += 1;
                        break match t.token {
                            Token::LeftBrace => Terminator::Open,
                            Token::RightBrace => Terminator::Close,
                            _ => Terminator::Semicolon,
                        };
                    }
                    None => break Terminator::Eof,
                }
            };
            match terminator {
                Terminator::Eof => {
                    if !words.is_empty() {
                        return Err(syntax_error(
                            line,
                            format!(
                                "unexpected end of input after '{}'",
                                words.join(" ")
                            ),
                        ));
                    }
                    if let Some(l) = open_line {
                        return Err(syntax_error(
                            l,
                            "unclosed block".to_string(),
                        ));
                    }
                    return Ok(());
                }
                Terminator::Close => {
                    if !words.is_empty() {
                        return Err(syntax_error(
                            line,
                            format!("missing ';' after '{}'", words.join(" ")),
                        ));
                    }
                    if open_line.is_none() {
                        return Err(syntax_error(
                            line,
                            "unexpected '}'".to_string(),
                        ));
                    }
                    return Ok(());
                }
                Terminator::Semicolon => self.parse_leaf(path, &words, line)?,
                Terminator::Open => {
                    let child = self.open_node(path, &words, line)?;
                    self.parse_block(&child, Some(line))?;
                }
            }
        }
    }

    fn parse_leaf(
        &mut self,
        path: &ConfigPath,
        words: &[String],
        line: usize,
    ) -> Result<(), RtconfError> {
        let (name, value) = match words {
            [name] => (name, None),
            [name, value] => (name, Some(value.as_str())),
            _ => {
                return Err(syntax_error(
                    line,
                    format!("invalid statement '{}'", words.join(" ")),
                ));
            }
        };
        let leaf_path = path.child(name);
        let r = self.schema.resolve(&leaf_path).map_err(|e| at_line(e, line))?;
        if !r.is_leaf() {
            return Err(schema_error(
                line,
                format!("[{leaf_path}] is not a leaf node"),
            ));
        }
        if !r.is_multi() && self.tree.exists(&leaf_path) {
            return Err(duplicate(line, &leaf_path));
        }
        self.tree
            .set(self.schema, &leaf_path, value)
            .map_err(|e| at_line(e, line))
    }

    fn open_node(
        &mut self,
        path: &ConfigPath,
        words: &[String],
        line: usize,
    ) -> Result<ConfigPath, RtconfError> {
        let node_path = match words {
            [name] => {
                let p = path.child(name);
                let r = self.schema.resolve(&p).map_err(|e| at_line(e, line))?;
                if !r.is_container() {
                    return Err(schema_error(
                        line,
                        format!("[{p}] is not a container node"),
                    ));
                }
                p
            }
            [name, id] => {
                let p = path.child(name);
                if !self.schema.is_tag(&p) {
                    return Err(schema_error(
                        line,
                        format!("[{p}] is not a tag node"),
                    ));
                }
                p.child(id)
            }
            _ => {
                return Err(syntax_error(
                    line,
                    format!("invalid block '{}'", words.join(" ")),
                ));
            }
        };
        if self.tree.exists(&node_path) {
            return Err(duplicate(line, &node_path));
        }
        self.tree
            .set(self.schema, &node_path, None)
            .map_err(|e| at_line(e, line))?;
        Ok(node_path)
    }
}

fn at_line(e: RtconfError, line: usize) -> RtconfError {
    let msg = if e.path().is_empty() {
        format!("line {line}: {}", e.msg())
    } else {
        format!("line {line}: [{}] {}", e.path(), e.msg())
    };
    RtconfError::new(e.kind(), msg)
}

fn schema_error(line: usize, msg: String) -> RtconfError {
    RtconfError::new(ErrorKind::SchemaViolation, format!("line {line}: {msg}"))
}

fn duplicate(line: usize, path: &ConfigPath) -> RtconfError {
    schema_error(line, format!("duplicate node [{path}]"))
}
