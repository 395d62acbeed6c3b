// SPDX-License-Identifier: Apache-2.0

//! Small text template language used to generate daemon configuration.
//!
//! * `{{ a.b | join(", ") | default("x") }}` prints a value
//! * `{% if a %}` / `{% elif not b %}` / `{% else %}` / `{% endif %}`
//! * `{% for item in seq %}` and `{% for key, value in map %}` with
//!   `loop.index`, `loop.first` and `loop.last`
//! * `{% include "id" %}` and `{# comment #}`
//!
//! A newline following a block tag is dropped, and so is indentation
//! preceding a block tag standing alone on its line.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::{ErrorKind, RtconfError};

const MAX_INCLUDE_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Expr,
    Stmt,
    Comment,
}

impl TagKind {
    fn close(&self) -> &'static str {
        match self {
            Self::Expr => "}}",
            Self::Stmt => "%}",
            Self::Comment => "#}",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Expr(String, usize),
    Stmt(String, usize),
}

fn find_tag_start(s: &str) -> Option<(usize, TagKind)> {
    let mut iter = s.char_indices().peekable();
    while let Some((pos, c)) = iter.next() {
        if c == '{' {
            match iter.peek() {
                Some((_, '{')) => return Some((pos, TagKind::Expr)),
                Some((_, '%')) => return Some((pos, TagKind::Stmt)),
                Some((_, '#')) => return Some((pos, TagKind::Comment)),
                _ => (),
            }
        }
    }
    None
}

fn is_blank(s: &str) -> bool {
    s.chars().all(|c| c == ' ' || c == '\t')
}

fn split_segments(id: &str, src: &str) -> Result<Vec<Segment>, RtconfError> {
    let mut ret = Vec::new();
    let mut line = 1usize;
    let mut rest = src;
    let mut after_block = false;
    let mut at_line_start = true;

    loop {
        let tag = find_tag_start(rest);
        let raw = match tag {
            Some((pos, _)) => &rest[..pos],
            None => rest,
        };
        let mut text = raw;
        if after_block {
            if let Some(stripped) = text.strip_prefix('\n') {
                text = stripped;
                at_line_start = true;
            }
        }
        let mut text = text.to_string();
        if let Some((_, kind)) = tag {
            if kind != TagKind::Expr {
                match text.rfind('\n') {
                    Some(nl) if is_blank(&text[nl + 1..]) => {
                        text.truncate(nl + 1)
                    }
                    None if at_line_start && is_blank(&text) => text.clear(),
                    _ => (),
                }
            }
        }
        if !raw.is_empty() {
            at_line_start = raw.ends_with('\n');
        }
        if !text.is_empty() {
            ret.push(Segment::Text(text));
        }
        line += raw.matches('\n').count();

        let (pos, kind) = match tag {
            Some(t) => t,
            None => break,
        };
        let body_start = pos + 2;
        let end = match rest[body_start..].find(kind.close()) {
            Some(e) => e + body_start,
            None => {
                return Err(render_error(
                    id,
                    line,
                    format!("unterminated tag, expecting '{}'", kind.close()),
                ));
            }
        };
        let inner = rest[body_start..end].trim_matches('-').trim().to_string();
        match kind {
            TagKind::Expr => ret.push(Segment::Expr(inner, line)),
            TagKind::Stmt => ret.push(Segment::Stmt(inner, line)),
            TagKind::Comment => (),
        }
        line += rest[body_start..end].matches('\n').count();
        rest = &rest[end + 2..];
        after_block = kind != TagKind::Expr;
        if kind == TagKind::Expr {
            at_line_start = false;
        }
    }
    Ok(ret)
}

#[derive(Clone, PartialEq, Debug)]
enum ExprToken {
    Ident(String, usize),
    Str(String, usize),
    Num(i64, usize),
    Pipe(usize),
    LeftParen(usize),
    RightParen(usize),
    Comma(usize),
    Equal(usize),
    NotEqual(usize),
}

impl ExprToken {
    fn pos(&self) -> usize {
        match self {
            Self::Ident(_, p)
            | Self::Str(_, p)
            | Self::Num(_, p)
            | Self::Pipe(p)
            | Self::LeftParen(p)
            | Self::RightParen(p)
            | Self::Comma(p)
            | Self::Equal(p)
            | Self::NotEqual(p) => *p,
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Self::Ident(s, _) if s == keyword)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn tokenize_expr(src: &str) -> Result<Vec<ExprToken>, String> {
    let mut ret = Vec::new();
    let mut iter = src.char_indices().peekable();

    while let Some((pos, c)) = iter.next() {
        match c {
            ' ' | '\t' | '\n' => (),
            '|' => ret.push(ExprToken::Pipe(pos)),
            '(' => ret.push(ExprToken::LeftParen(pos)),
            ')' => ret.push(ExprToken::RightParen(pos)),
            ',' => ret.push(ExprToken::Comma(pos)),
            '=' | '!' => match iter.next() {
                Some((_, '=')) => ret.push(if c == '=' {
                    ExprToken::Equal(pos)
                } else {
                    ExprToken::NotEqual(pos)
                }),
                _ => {
                    return Err(format!(
                        "expecting '{c}=' at position {pos}"
                    ));
                }
            },
            '"' | '\'' => {
                let mut s = String::new();
                let mut closed = false;
                while let Some((_, n)) = iter.next() {
                    if n == c {
                        closed = true;
                        break;
                    } else if n == '\\' {
                        match iter.next() {
                            Some((_, 'n')) => s.push('\n'),
                            Some((_, 't')) => s.push('\t'),
                            Some((_, e)) => s.push(e),
                            None => break,
                        }
                    } else {
                        s.push(n);
                    }
                }
                if !closed {
                    return Err(format!(
                        "unterminated string starting at position {pos}"
                    ));
                }
                ret.push(ExprToken::Str(s, pos));
            }
            c if is_ident_char(c) => {
                let mut s = c.to_string();
                while let Some((_, n)) = iter.peek() {
                    if !is_ident_char(*n) {
                        break;
                    }
                    s.push(*n);
                    iter.next();
                }
                match s.parse::<i64>() {
                    Ok(n) => ret.push(ExprToken::Num(n, pos)),
                    Err(_) => ret.push(ExprToken::Ident(s, pos)),
                }
            }
            _ => {
                return Err(format!(
                    "unexpected character '{c}' at position {pos}"
                ));
            }
        }
    }
    Ok(ret)
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Path(Vec<String>),
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
enum Filter {
    Join(String),
    Default(Value),
    Length,
    Upper,
    Lower,
}

#[derive(Debug, Clone, PartialEq)]
struct Expr {
    operand: Operand,
    filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq)]
enum Cond {
    Truthy(Expr),
    Equal(Expr, Expr),
    NotEqual(Expr, Expr),
    In(Expr, Expr),
    Not(Box<Cond>),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Print(Expr, usize),
    If(Vec<(Cond, Vec<Node>)>, Vec<Node>),
    For {
        vars: Vec<String>,
        iterable: Expr,
        body: Vec<Node>,
        line: usize,
    },
    Include(String, usize),
}

struct ExprParser {
    tokens: Vec<ExprToken>,
    pos: usize,
}

impl ExprParser {
    fn new(src: &str) -> Result<Self, String> {
        Ok(Self {
            tokens: tokenize_expr(src)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&ExprToken> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<ExprToken> {
        let ret = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        ret
    }

    fn done(&self) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(format!("unexpected token at position {}", t.pos())),
        }
    }

    fn literal(&mut self) -> Result<Value, String> {
        match self.next() {
            Some(ExprToken::Str(s, _)) => Ok(Value::String(s)),
            Some(ExprToken::Num(n, _)) => Ok(Value::from(n)),
            Some(ExprToken::Ident(s, _)) if s == "true" || s == "false" => {
                Ok(Value::Bool(s == "true"))
            }
            Some(t) => Err(format!("expecting a literal at position {}", t.pos())),
            None => Err("expecting a literal".to_string()),
        }
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let operand = match self.next() {
            Some(ExprToken::Ident(s, _)) if s == "true" || s == "false" => {
                Operand::Literal(Value::Bool(s == "true"))
            }
            Some(ExprToken::Ident(s, pos)) => {
                if s.split('.').any(|p| p.is_empty()) {
                    return Err(format!("invalid name '{s}' at position {pos}"));
                }
                Operand::Path(s.split('.').map(|p| p.to_string()).collect())
            }
            Some(ExprToken::Str(s, _)) => Operand::Literal(Value::String(s)),
            Some(ExprToken::Num(n, _)) => Operand::Literal(Value::from(n)),
            Some(t) => {
                return Err(format!(
                    "expecting a name or literal at position {}",
                    t.pos()
                ));
            }
            None => return Err("expecting an expression".to_string()),
        };
        let mut filters = Vec::new();
        while let Some(ExprToken::Pipe(_)) = self.peek() {
            self.pos += 1;
            filters.push(self.filter()?);
        }
        Ok(Expr { operand, filters })
    }

    fn filter(&mut self) -> Result<Filter, String> {
        let (name, pos) = match self.next() {
            Some(ExprToken::Ident(s, pos)) => (s, pos),
            _ => return Err("expecting a filter name after '|'".to_string()),
        };
        let arg = if let Some(ExprToken::LeftParen(_)) = self.peek() {
            self.pos += 1;
            let v = self.literal()?;
            match self.next() {
                Some(ExprToken::RightParen(_)) => Some(v),
                _ => return Err(format!("expecting ')' after filter {name}")),
            }
        } else {
            None
        };
        match (name.as_str(), arg) {
            ("join", Some(Value::String(sep))) => Ok(Filter::Join(sep)),
            ("join", None) => Ok(Filter::Join(String::new())),
            ("default", Some(v)) => Ok(Filter::Default(v)),
            ("length", None) => Ok(Filter::Length),
            ("upper", None) => Ok(Filter::Upper),
            ("lower", None) => Ok(Filter::Lower),
            _ => Err(format!("invalid filter '{name}' at position {pos}")),
        }
    }

    fn cond(&mut self) -> Result<Cond, String> {
        let mut left = self.and_cond()?;
        while self.peek().map(|t| t.is_keyword("or")) == Some(true) {
            self.pos += 1;
            let right = self.and_cond()?;
            left = Cond::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_cond(&mut self) -> Result<Cond, String> {
        let mut left = self.not_cond()?;
        while self.peek().map(|t| t.is_keyword("and")) == Some(true) {
            self.pos += 1;
            let right = self.not_cond()?;
            left = Cond::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_cond(&mut self) -> Result<Cond, String> {
        if self.peek().map(|t| t.is_keyword("not")) == Some(true) {
            self.pos += 1;
            return Ok(Cond::Not(Box::new(self.not_cond()?)));
        }
        let left = self.expr()?;
        match self.peek() {
            Some(ExprToken::Equal(_)) => {
                self.pos += 1;
                Ok(Cond::Equal(left, self.expr()?))
            }
            Some(ExprToken::NotEqual(_)) => {
                self.pos += 1;
                Ok(Cond::NotEqual(left, self.expr()?))
            }
            Some(t) if t.is_keyword("in") => {
                self.pos += 1;
                Ok(Cond::In(left, self.expr()?))
            }
            _ => Ok(Cond::Truthy(left)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BlockEnd {
    Elif(String),
    Else,
    EndIf,
    EndFor,
    Eof,
}

struct TemplateParser<'a> {
    id: &'a str,
    segments: Vec<Segment>,
    pos: usize,
}

impl<'a> TemplateParser<'a> {
    fn err(&self, line: usize, msg: String) -> RtconfError {
        render_error(self.id, line, msg)
    }

    fn parse_nodes(&mut self) -> Result<(Vec<Node>, BlockEnd, usize), RtconfError> {
        let mut nodes = Vec::new();
        while let Some(segment) = self.segments.get(self.pos).cloned() {
            self.pos += 1;
            match segment {
                Segment::Text(t) => nodes.push(Node::Text(t)),
                Segment::Expr(src, line) => {
                    let mut p =
                        ExprParser::new(&src).map_err(|e| self.err(line, e))?;
                    let expr = p.expr().map_err(|e| self.err(line, e))?;
                    p.done().map_err(|e| self.err(line, e))?;
                    nodes.push(Node::Print(expr, line));
                }
                Segment::Stmt(src, line) => {
                    let (keyword, rest) = match src.split_once(char::is_whitespace) {
                        Some((k, r)) => (k.to_string(), r.trim().to_string()),
                        None => (src.clone(), String::new()),
                    };
                    match keyword.as_str() {
                        "if" => nodes.push(self.parse_if(&rest, line)?),
                        "for" => nodes.push(self.parse_for(&rest, line)?),
                        "include" => {
                            let mut p = ExprParser::new(&rest)
                                .map_err(|e| self.err(line, e))?;
                            match p.literal() {
                                Ok(Value::String(id)) => {
                                    p.done().map_err(|e| self.err(line, e))?;
                                    nodes.push(Node::Include(id, line));
                                }
                                _ => {
                                    return Err(self.err(
                                        line,
                                        "include expects a quoted template id"
                                            .to_string(),
                                    ));
                                }
                            }
                        }
                        "elif" => return Ok((nodes, BlockEnd::Elif(rest), line)),
                        "else" => return Ok((nodes, BlockEnd::Else, line)),
                        "endif" => return Ok((nodes, BlockEnd::EndIf, line)),
                        "endfor" => return Ok((nodes, BlockEnd::EndFor, line)),
                        _ => {
                            return Err(self.err(
                                line,
                                format!("unknown statement '{keyword}'"),
                            ));
                        }
                    }
                }
            }
        }
        Ok((nodes, BlockEnd::Eof, 0))
    }

    fn parse_cond(&self, src: &str, line: usize) -> Result<Cond, RtconfError> {
        let mut p = ExprParser::new(src).map_err(|e| self.err(line, e))?;
        let cond = p.cond().map_err(|e| self.err(line, e))?;
        p.done().map_err(|e| self.err(line, e))?;
        Ok(cond)
    }

    fn parse_if(&mut self, src: &str, line: usize) -> Result<Node, RtconfError> {
        let mut branches = vec![];
        let mut cond = self.parse_cond(src, line)?;
        loop {
            let (body, end, end_line) = self.parse_nodes()?;
            branches.push((cond, body));
            match end {
                BlockEnd::Elif(src) => {
                    cond = self.parse_cond(&src, end_line)?;
                }
                BlockEnd::Else => {
                    let (otherwise, end, end_line) = self.parse_nodes()?;
                    if end != BlockEnd::EndIf {
                        return Err(self.err(
                            end_line.max(line),
                            "expecting endif after else".to_string(),
                        ));
                    }
                    return Ok(Node::If(branches, otherwise));
                }
                BlockEnd::EndIf => return Ok(Node::If(branches, Vec::new())),
                _ => {
                    return Err(self.err(line, "unclosed if block".to_string()));
                }
            }
        }
    }

    fn parse_for(&mut self, src: &str, line: usize) -> Result<Node, RtconfError> {
        let (vars, iterable) = match src.split_once(" in ") {
            Some((v, i)) => (v, i),
            None => {
                return Err(self.err(
                    line,
                    "expecting 'for <name> in <expression>'".to_string(),
                ));
            }
        };
        let vars: Vec<String> =
            vars.split(',').map(|v| v.trim().to_string()).collect();
        if vars.is_empty()
            || vars.len() > 2
            || vars
                .iter()
                .any(|v| v.is_empty() || !v.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        {
            return Err(self.err(line, format!("invalid loop variables '{src}'")));
        }
        let mut p = ExprParser::new(iterable).map_err(|e| self.err(line, e))?;
        let iterable = p.expr().map_err(|e| self.err(line, e))?;
        p.done().map_err(|e| self.err(line, e))?;
        let (body, end, _) = self.parse_nodes()?;
        if end != BlockEnd::EndFor {
            return Err(self.err(line, "unclosed for block".to_string()));
        }
        Ok(Node::For {
            vars,
            iterable,
            body,
            line,
        })
    }
}

/// Parsed template, ready to be rendered many times.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    id: String,
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(id: &str, src: &str) -> Result<Self, RtconfError> {
        let mut parser = TemplateParser {
            id,
            segments: split_segments(id, src)?,
            pos: 0,
        };
        let (nodes, end, line) = parser.parse_nodes()?;
        if end != BlockEnd::Eof {
            return Err(render_error(
                id,
                line,
                format!("unexpected {end:?} statement"),
            ));
        }
        Ok(Self {
            id: id.to_string(),
            nodes,
        })
    }

    pub fn id(&self) -> &str {
        self.id.as_str()
    }
}

/// Named templates which can include each other.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    templates: HashMap<String, Template>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: &str, src: &str) -> Result<(), RtconfError> {
        self.templates.insert(id.to_string(), Template::parse(id, src)?);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    pub fn render(&self, id: &str, view: &Value) -> Result<String, RtconfError> {
        let template = self.templates.get(id).ok_or_else(|| {
            RtconfError::new(
                ErrorKind::RenderError,
                format!("Template {id} does not exist"),
            )
        })?;
        let mut ctx = Context {
            set: self,
            root: view,
            scopes: Vec::new(),
            depth: 0,
        };
        let mut out = String::new();
        ctx.render_nodes(template, &template.nodes, &mut out)?;
        Ok(out)
    }
}

struct Context<'a> {
    set: &'a TemplateSet,
    root: &'a Value,
    scopes: Vec<Map<String, Value>>,
    depth: usize,
}

impl<'a> Context<'a> {
    fn lookup(&self, path: &[String]) -> Option<Value> {
        let (first, rest) = path.split_first()?;
        let mut cur = self
            .scopes
            .iter()
            .rev()
            .find_map(|s| s.get(first))
            .or_else(|| self.root.get(first))?;
        for name in rest {
            cur = match cur {
                Value::Object(m) => m.get(name)?,
                Value::Array(a) => a.get(name.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(cur.clone())
    }

    fn eval(&self, t: &Template, expr: &Expr, line: usize) -> Result<Option<Value>, RtconfError> {
        let mut value = match &expr.operand {
            Operand::Literal(v) => Some(v.clone()),
            Operand::Path(p) => self.lookup(p),
        };
        for filter in expr.filters.iter() {
            value = match (filter, value) {
                (Filter::Default(d), None) | (Filter::Default(d), Some(Value::Null)) => {
                    Some(d.clone())
                }
                (Filter::Default(_), v) => v,
                (_, None) => return Ok(None),
                (Filter::Join(sep), Some(Value::Array(items))) => {
                    let mut strs = Vec::new();
                    for item in items.iter() {
                        strs.push(scalar_string(item).ok_or_else(|| {
                            render_error(
                                &t.id,
                                line,
                                format!("cannot join non scalar value in {}", expr_name(expr)),
                            )
                        })?);
                    }
                    Some(Value::String(strs.join(sep)))
                }
                (Filter::Join(_), Some(v)) => Some(v),
                (Filter::Length, Some(v)) => Some(Value::from(match &v {
                    Value::Array(a) => a.len(),
                    Value::Object(m) => m.len(),
                    Value::String(s) => s.chars().count(),
                    _ => 0,
                })),
                (Filter::Upper, Some(v)) => {
                    scalar_string(&v).map(|s| Value::String(s.to_uppercase()))
                }
                (Filter::Lower, Some(v)) => {
                    scalar_string(&v).map(|s| Value::String(s.to_lowercase()))
                }
            };
        }
        Ok(value)
    }

    // Mappings are true when present so valueless leaves test as set.
    fn truthy(value: &Option<Value>) -> bool {
        match value {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64() != Some(0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(_)) => true,
        }
    }

    fn test(&self, t: &Template, cond: &Cond, line: usize) -> Result<bool, RtconfError> {
        Ok(match cond {
            Cond::Truthy(e) => Self::truthy(&self.eval(t, e, line)?),
            Cond::Equal(a, b) => loose_eq(&self.eval(t, a, line)?, &self.eval(t, b, line)?),
            Cond::NotEqual(a, b) => !loose_eq(&self.eval(t, a, line)?, &self.eval(t, b, line)?),
            Cond::In(a, b) => {
                let needle = self.eval(t, a, line)?.and_then(|v| scalar_string(&v));
                match (needle, self.eval(t, b, line)?) {
                    (Some(n), Some(Value::Array(items))) => {
                        items.iter().any(|i| scalar_string(i).as_deref() == Some(n.as_str()))
                    }
                    (Some(n), Some(Value::Object(m))) => m.contains_key(&n),
                    (Some(n), Some(Value::String(s))) => s.contains(n.as_str()),
                    _ => false,
                }
            }
            Cond::Not(c) => !self.test(t, c, line)?,
            Cond::And(a, b) => self.test(t, a, line)? && self.test(t, b, line)?,
            Cond::Or(a, b) => self.test(t, a, line)? || self.test(t, b, line)?,
        })
    }

    fn render_nodes(
        &mut self,
        t: &Template,
        nodes: &[Node],
        out: &mut String,
    ) -> Result<(), RtconfError> {
        for node in nodes {
            match node {
                Node::Text(s) => out.push_str(s),
                Node::Print(expr, line) => match self.eval(t, expr, *line)? {
                    None => {
                        return Err(render_error(
                            &t.id,
                            *line,
                            format!("undefined value '{}'", expr_name(expr)),
                        ));
                    }
                    Some(v) => match scalar_string(&v) {
                        Some(s) => out.push_str(&s),
                        None => {
                            return Err(render_error(
                                &t.id,
                                *line,
                                format!("cannot print non scalar value '{}'", expr_name(expr)),
                            ));
                        }
                    },
                },
                Node::If(branches, otherwise) => {
                    let mut matched = false;
                    for (cond, body) in branches {
                        if self.test(t, cond, 0)? {
                            self.render_nodes(t, body, out)?;
                            matched = true;
                            break;
                        }
                    }
                    if !matched {
                        self.render_nodes(t, otherwise, out)?;
                    }
                }
                Node::For {
                    vars,
                    iterable,
                    body,
                    line,
                } => {
                    let items: Vec<(Value, Value)> = match self.eval(t, iterable, *line)? {
                        Some(Value::Array(a)) => {
                            a.into_iter().map(|v| (Value::Null, v)).collect()
                        }
                        Some(Value::Object(m)) => {
                            m.into_iter().map(|(k, v)| (Value::String(k), v)).collect()
                        }
                        None | Some(Value::Null) => Vec::new(),
                        Some(_) => {
                            return Err(render_error(
                                &t.id,
                                *line,
                                format!("'{}' is not iterable", expr_name(iterable)),
                            ));
                        }
                    };
                    let length = items.len();
                    for (index, (key, value)) in items.into_iter().enumerate() {
                        let mut scope = Map::new();
                        match vars.as_slice() {
                            [single] => {
                                let v = if key.is_null() { value } else { key };
                                scope.insert(single.clone(), v);
                            }
                            [k, v] => {
                                scope.insert(k.clone(), key);
                                scope.insert(v.clone(), value);
                            }
                            _ => (),
                        }
                        scope.insert(
                            "loop".to_string(),
                            serde_json::json!({
                                "index": index + 1,
                                "index0": index,
                                "first": index == 0,
                                "last": index + 1 == length,
                                "length": length,
                            }),
                        );
                        self.scopes.push(scope);
                        let ret = self.render_nodes(t, body, out);
                        self.scopes.pop();
                        ret?;
                    }
                }
                Node::Include(id, line) => {
                    if self.depth >= MAX_INCLUDE_DEPTH {
                        return Err(render_error(
                            &t.id,
                            *line,
                            format!("include depth exceeded while including {id}"),
                        ));
                    }
                    let set = self.set;
                    let included = set.templates.get(id).ok_or_else(|| {
                        render_error(&t.id, *line, format!("included template {id} does not exist"))
                    })?;
                    self.depth += 1;
                    let ret = self.render_nodes(included, &included.nodes, out);
                    self.depth -= 1;
                    ret?;
                }
            }
        }
        Ok(())
    }
}

fn expr_name(expr: &Expr) -> String {
    match &expr.operand {
        Operand::Path(p) => p.join("."),
        Operand::Literal(v) => v.to_string(),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

// Configuration values are strings, compare "10" and 10 as equal.
fn loose_eq(a: &Option<Value>, b: &Option<Value>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => match (scalar_string(a), scalar_string(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (None, None) => true,
        _ => false,
    }
}

fn render_error(id: &str, line: usize, msg: String) -> RtconfError {
    let e = RtconfError::new(
        ErrorKind::RenderError,
        format!("Template {id} line {line}: {msg}"),
    );
    log::error!("{}", e);
    e
}
