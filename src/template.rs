//! SQL template engine.
//!
//! # Responsibility
//! - Parse SQL templates (interpolation, conditionals, loops) into an AST at
//!   registration time so malformed templates fail early.
//! - Render templates against a named binding into literal SQL.
//! - Rewrite `#{name}` placeholders into positional bind markers while
//!   collecting bound values in occurrence order.
//!
//! # Invariants
//! - Rendering never fails: absent names interpolate as empty text and bind
//!   as `Value::Null`.
//! - Duplicate placeholders are re-resolved per occurrence.

use crate::meta::Value;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#\{([A-Za-z_0-9]+)\}").expect("placeholder pattern"));

/// One named value in a template binding.
#[derive(Debug, Clone)]
pub enum Bind {
    Value(Value),
    /// Collection-valued binding, iterable by `{% for %}`.
    List(Vec<Value>),
}

impl Bind {
    pub fn null() -> Self {
        Bind::Value(Value::Null)
    }
}

impl From<Value> for Bind {
    fn from(value: Value) -> Self {
        Bind::Value(value)
    }
}

impl From<i64> for Bind {
    fn from(value: i64) -> Self {
        Bind::Value(Value::Integer(value))
    }
}

impl From<f64> for Bind {
    fn from(value: f64) -> Self {
        Bind::Value(Value::Real(value))
    }
}

impl From<bool> for Bind {
    fn from(value: bool) -> Self {
        Bind::Value(Value::Integer(i64::from(value)))
    }
}

impl From<&str> for Bind {
    fn from(value: &str) -> Self {
        Bind::Value(Value::Text(value.to_string()))
    }
}

impl From<String> for Bind {
    fn from(value: String) -> Self {
        Bind::Value(Value::Text(value))
    }
}

/// Named-parameter binding a template is evaluated against.
pub type Binding = BTreeMap<String, Bind>;

/// Template syntax failure, raised at registration time.
#[derive(Debug)]
pub enum TemplateError {
    Unterminated {
        construct: &'static str,
        position: usize,
    },
    EmptyExpression {
        position: usize,
    },
    UnknownTag(String),
    UnexpectedTag(String),
    MissingEnd(&'static str),
    BadFor(String),
}

impl Display for TemplateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unterminated {
                construct,
                position,
            } => write!(f, "unterminated `{construct}` at byte {position}"),
            Self::EmptyExpression { position } => {
                write!(f, "empty expression at byte {position}")
            }
            Self::UnknownTag(tag) => write!(f, "unknown tag `{{% {tag} %}}`"),
            Self::UnexpectedTag(tag) => write!(f, "unexpected tag `{{% {tag} %}}`"),
            Self::MissingEnd(tag) => write!(f, "missing `{{% {tag} %}}`"),
            Self::BadFor(tag) => {
                write!(f, "malformed loop `{{% {tag} %}}`, expected `for <var> in <name>`")
            }
        }
    }
}

impl Error for TemplateError {}

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Var(String),
    If {
        cond: String,
        then_nodes: Vec<Node>,
        else_nodes: Vec<Node>,
    },
    For {
        var: String,
        list: String,
        body: Vec<Node>,
    },
}

#[derive(Debug, Clone)]
enum Token {
    Text(String),
    Var(String),
    Tag(String),
}

/// A parsed SQL template.
///
/// Language: `${name}` interpolates the bound value's literal text,
/// `{% if name %} .. {% else %} .. {% endif %}` branches on truthiness
/// (present and not null/zero/empty), `{% for x in name %} .. {% endfor %}`
/// iterates a list-valued binding with `x` shadowing outer names.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let tokens = lex(text)?;
        let mut idx = 0;
        let (nodes, stopped_at) = parse_nodes(&tokens, &mut idx, &[])?;
        debug_assert!(stopped_at.is_none());
        Ok(Self {
            source: text.to_string(),
            nodes,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The set of `#{name}` identifiers the template can bind, in first
    /// occurrence order. Used for registration-time diagnostics.
    pub fn placeholders(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for caps in PLACEHOLDER.captures_iter(&self.source) {
            let name = caps[1].to_string();
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }

    /// Evaluates the template against `binding`, producing literal SQL text
    /// that may still contain `#{name}` placeholders.
    pub fn render(&self, binding: &Binding) -> String {
        let mut out = String::with_capacity(self.source.len());
        let mut locals = Binding::new();
        render_nodes(&self.nodes, binding, &mut locals, &mut out);
        out
    }
}

/// Rewrites every `#{identifier}` into a `?` bind marker, appending the
/// binding's value for that identifier (null when absent) to the returned
/// parameter list in occurrence order.
pub fn bind_placeholders(raw_sql: &str, binding: &Binding) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    let sql = PLACEHOLDER
        .replace_all(raw_sql, |caps: &regex::Captures<'_>| {
            let value = match binding.get(&caps[1]) {
                Some(Bind::Value(v)) => v.clone(),
                Some(Bind::List(_)) | None => Value::Null,
            };
            params.push(value);
            "?"
        })
        .into_owned();
    (sql, params)
}

fn lex(text: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut rest = text;
    let mut offset = 0usize;

    loop {
        let var_at = rest.find("${");
        let tag_at = rest.find("{%");
        let (pos, is_var) = match (var_at, tag_at) {
            (None, None) => {
                if !rest.is_empty() {
                    tokens.push(Token::Text(rest.to_string()));
                }
                return Ok(tokens);
            }
            (Some(v), None) => (v, true),
            (None, Some(t)) => (t, false),
            (Some(v), Some(t)) => {
                if v < t {
                    (v, true)
                } else {
                    (t, false)
                }
            }
        };

        if pos > 0 {
            tokens.push(Token::Text(rest[..pos].to_string()));
        }
        let body = &rest[pos + 2..];
        let (close, close_len, construct) = if is_var {
            (body.find('}'), 1, "${")
        } else {
            (body.find("%}"), 2, "{%")
        };
        let close = close.ok_or(TemplateError::Unterminated {
            construct,
            position: offset + pos,
        })?;
        let inner = body[..close].trim();
        if inner.is_empty() {
            return Err(TemplateError::EmptyExpression {
                position: offset + pos,
            });
        }
        tokens.push(if is_var {
            Token::Var(inner.to_string())
        } else {
            Token::Tag(inner.to_string())
        });

        let consumed = pos + 2 + close + close_len;
        offset += consumed;
        rest = &rest[consumed..];
    }
}

fn tag_keyword(tag: &str) -> &str {
    tag.split_whitespace().next().unwrap_or("")
}

fn parse_nodes(
    tokens: &[Token],
    idx: &mut usize,
    stop: &[&str],
) -> Result<(Vec<Node>, Option<String>), TemplateError> {
    let mut nodes = Vec::new();

    while *idx < tokens.len() {
        match &tokens[*idx] {
            Token::Text(text) => {
                nodes.push(Node::Text(text.clone()));
                *idx += 1;
            }
            Token::Var(name) => {
                nodes.push(Node::Var(name.clone()));
                *idx += 1;
            }
            Token::Tag(tag) => {
                let keyword = tag_keyword(tag);
                if stop.contains(&keyword) {
                    *idx += 1;
                    return Ok((nodes, Some(keyword.to_string())));
                }
                match keyword {
                    "if" => {
                        let cond = tag["if".len()..].trim().to_string();
                        if cond.is_empty() {
                            return Err(TemplateError::UnknownTag(tag.clone()));
                        }
                        *idx += 1;
                        let (then_nodes, stopped) =
                            parse_nodes(tokens, idx, &["else", "endif"])?;
                        let else_nodes = match stopped.as_deref() {
                            Some("else") => {
                                let (else_nodes, stopped) =
                                    parse_nodes(tokens, idx, &["endif"])?;
                                if stopped.is_none() {
                                    return Err(TemplateError::MissingEnd("endif"));
                                }
                                else_nodes
                            }
                            Some("endif") => Vec::new(),
                            _ => return Err(TemplateError::MissingEnd("endif")),
                        };
                        nodes.push(Node::If {
                            cond,
                            then_nodes,
                            else_nodes,
                        });
                    }
                    "for" => {
                        let parts: Vec<&str> = tag.split_whitespace().collect();
                        if parts.len() != 4 || parts[2] != "in" {
                            return Err(TemplateError::BadFor(tag.clone()));
                        }
                        let (var, list) = (parts[1].to_string(), parts[3].to_string());
                        *idx += 1;
                        let (body, stopped) = parse_nodes(tokens, idx, &["endfor"])?;
                        if stopped.is_none() {
                            return Err(TemplateError::MissingEnd("endfor"));
                        }
                        nodes.push(Node::For { var, list, body });
                    }
                    "else" | "endif" | "endfor" => {
                        return Err(TemplateError::UnexpectedTag(tag.clone()));
                    }
                    _ => return Err(TemplateError::UnknownTag(tag.clone())),
                }
            }
        }
    }

    if let Some(expected) = stop.iter().find(|s| s.starts_with("end")) {
        return Err(TemplateError::MissingEnd(match *expected {
            "endif" => "endif",
            _ => "endfor",
        }));
    }
    Ok((nodes, None))
}

fn lookup<'a>(name: &str, binding: &'a Binding, locals: &'a Binding) -> Option<&'a Bind> {
    locals.get(name).or_else(|| binding.get(name))
}

fn literal_text(bind: &Bind) -> String {
    match bind {
        Bind::Value(Value::Null) => String::new(),
        Bind::Value(Value::Integer(v)) => v.to_string(),
        Bind::Value(Value::Real(v)) => v.to_string(),
        Bind::Value(Value::Text(v)) => v.clone(),
        Bind::Value(Value::Blob(_)) => String::new(),
        Bind::List(items) => items
            .iter()
            .map(|v| literal_text(&Bind::Value(v.clone())))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn truthy(bind: Option<&Bind>) -> bool {
    match bind {
        None => false,
        Some(Bind::Value(Value::Null)) => false,
        Some(Bind::Value(Value::Integer(v))) => *v != 0,
        Some(Bind::Value(Value::Real(v))) => *v != 0.0,
        Some(Bind::Value(Value::Text(v))) => !v.is_empty(),
        Some(Bind::Value(Value::Blob(v))) => !v.is_empty(),
        Some(Bind::List(items)) => !items.is_empty(),
    }
}

fn render_nodes(nodes: &[Node], binding: &Binding, locals: &mut Binding, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var(name) => {
                if let Some(bind) = lookup(name, binding, locals) {
                    out.push_str(&literal_text(bind));
                }
            }
            Node::If {
                cond,
                then_nodes,
                else_nodes,
            } => {
                if truthy(lookup(cond, binding, locals)) {
                    render_nodes(then_nodes, binding, locals, out);
                } else {
                    render_nodes(else_nodes, binding, locals, out);
                }
            }
            Node::For { var, list, body } => {
                let items = match lookup(list, binding, locals) {
                    Some(Bind::List(items)) => items.clone(),
                    _ => Vec::new(),
                };
                let shadowed = locals.remove(var);
                for item in items {
                    locals.insert(var.clone(), Bind::Value(item));
                    render_nodes(body, binding, locals, out);
                }
                locals.remove(var);
                if let Some(previous) = shadowed {
                    locals.insert(var.clone(), previous);
                }
            }
        }
    }
}
