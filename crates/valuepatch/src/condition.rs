//! C7: the condition tree gating a patch node, plus the tiny infix parser
//! that turns a human-writable expression string into one.
use std::fmt;

use regex::Regex;

use crate::error::Result;
use crate::path::Path;
use crate::value::{Patchable, Scalar, ScalarKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn eval(self, ord: Option<std::cmp::Ordering>, eq: bool) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => eq,
            CompareOp::Ne => !eq,
            CompareOp::Lt => ord == Some(Less),
            CompareOp::Le => matches!(ord, Some(Less) | Some(Equal)),
            CompareOp::Gt => ord == Some(Greater),
            CompareOp::Ge => matches!(ord, Some(Greater) | Some(Equal)),
        }
    }
}

/// A literal embedded directly in a condition expression (`/count > 3`).
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
}

impl Literal {
    fn as_scalar(&self) -> Scalar<'_> {
        match self {
            Literal::Null => Scalar::Null,
            Literal::Bool(b) => Scalar::Bool(*b),
            Literal::Int(i) => Scalar::Int(*i),
            Literal::Float(f) => Scalar::Float(*f),
            Literal::Str(s) => Scalar::Str(s.as_str()),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(v) => write!(f, "{v}"),
            Literal::Str(s) => write!(f, "\"{s}\""),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        })
    }
}

#[derive(Debug, Clone)]
pub enum Condition {
    Compare {
        path: Path,
        op: CompareOp,
        literal: Literal,
    },
    CompareField {
        left: Path,
        op: CompareOp,
        right: Path,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Matches {
        path: Path,
        pattern: String,
    },
    TypeIs {
        path: Path,
        type_name: String,
    },
    Exists(Path),
}

impl Condition {
    /// Evaluate against `root`, per §4.7: a path that fails to resolve makes
    /// `Exists` false and every other predicate referencing it false too
    /// (never an error — a missing value simply doesn't satisfy the guard).
    pub fn evaluate(&self, root: &dyn Patchable) -> Result<bool> {
        Ok(match self {
            Condition::Exists(path) => crate::path::resolve(root, path).is_ok(),
            Condition::Compare { path, op, literal } => {
                let Ok(value) = crate::path::resolve(root, path) else {
                    return Ok(false);
                };
                let Some(scalar) = value.scalar() else {
                    return Ok(false);
                };
                let lit = literal.as_scalar();
                op.eval(Some(scalar.cmp_ord(&lit)), scalar.scalar_eq(&lit))
            }
            Condition::CompareField { left, op, right } => {
                let (Ok(l), Ok(r)) = (
                    crate::path::resolve(root, left),
                    crate::path::resolve(root, right),
                ) else {
                    return Ok(false);
                };
                let (Some(ls), Some(rs)) = (l.scalar(), r.scalar()) else {
                    return Ok(false);
                };
                op.eval(Some(ls.cmp_ord(&rs)), ls.scalar_eq(&rs))
            }
            Condition::And(cs) => {
                for c in cs {
                    if !c.evaluate(root)? {
                        return Ok(false);
                    }
                }
                true
            }
            Condition::Or(cs) => {
                for c in cs {
                    if c.evaluate(root)? {
                        return Ok(true);
                    }
                }
                false
            }
            Condition::Not(c) => !c.evaluate(root)?,
            Condition::Matches { path, pattern } => {
                let Ok(value) = crate::path::resolve(root, path) else {
                    return Ok(false);
                };
                let Some(Scalar::Str(s)) = value.scalar() else {
                    return Ok(false);
                };
                // Conditions never raise: a malformed pattern resolves to false
                // rather than propagating an error out of evaluate().
                let Ok(re) = Regex::new(pattern) else {
                    return Ok(false);
                };
                re.is_match(s)
            }
            Condition::TypeIs { path, type_name } => {
                let Ok(value) = crate::path::resolve(root, path) else {
                    return Ok(false);
                };
                match value.sum_variant() {
                    Some((variant, _)) => variant == type_name,
                    None => value.kind_name() == type_name,
                }
            }
        })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Exists(path) => write!(f, "{path}"),
            Condition::Compare { path, op, literal } => write!(f, "{path} {op} {literal}"),
            Condition::CompareField { left, op, right } => write!(f, "{left} {op} {right}"),
            Condition::And(cs) => write_joined(f, cs, "&&"),
            Condition::Or(cs) => write_joined(f, cs, "||"),
            Condition::Not(c) => write!(f, "!({c})"),
            Condition::Matches { path, pattern } => write!(f, "{path} ~ \"{pattern}\""),
            Condition::TypeIs { path, type_name } => write!(f, "@type({path}, {type_name})"),
        }
    }
}

/// Every conjunct/disjunct is wrapped in parens so the rendered form is
/// unambiguous to re-parse regardless of nesting.
fn write_joined(f: &mut fmt::Formatter<'_>, cs: &[Condition], op: &str) -> fmt::Result {
    for (i, c) in cs.iter().enumerate() {
        if i > 0 {
            write!(f, " {op} ")?;
        }
        write!(f, "({c})")?;
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected end of condition expression")]
    UnexpectedEof,
    #[error("unexpected token {0:?} at position {1}")]
    UnexpectedToken(String, usize),
    #[error("unknown comparison operator {0:?}")]
    UnknownOperator(String),
    #[error("malformed path literal {0:?}")]
    BadPath(String),
}

/// Parses a small infix grammar:
/// `expr := term (("&&" | "||") term)*`
/// `term := "!" term | "(" expr ")" | cmp`
/// `cmp  := path op (path | literal)` or a bare path (sugar for `Exists`).
pub fn parse(input: &str) -> std::result::Result<Condition, ParseError> {
    let tokens = tokenize(input)?;
    let mut pos = 0;
    let cond = parse_or(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(ParseError::UnexpectedToken(tokens[pos].clone(), pos));
    }
    Ok(cond)
}

fn tokenize(input: &str) -> std::result::Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if "()!".contains(c) {
            tokens.push(c.to_string());
            i += 1;
            continue;
        }
        if c == '&' || c == '|' {
            if i + 1 < chars.len() && chars[i + 1] == c {
                tokens.push(format!("{c}{c}"));
                i += 2;
                continue;
            }
            return Err(ParseError::UnexpectedToken(c.to_string(), i));
        }
        if "<>=!".contains(c) {
            let mut op = c.to_string();
            if i + 1 < chars.len() && chars[i + 1] == '=' {
                op.push('=');
                i += 2;
            } else {
                i += 1;
            }
            tokens.push(op);
            continue;
        }
        if c == '"' {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != '"' {
                i += 1;
            }
            if i >= chars.len() {
                return Err(ParseError::UnexpectedToken(
                    chars[start..].iter().collect(),
                    start,
                ));
            }
            i += 1;
            tokens.push(chars[start..i].iter().collect());
            continue;
        }
        // bare word: path, number, or keyword literal
        let start = i;
        while i < chars.len() && !chars[i].is_whitespace() && !"()!&|".contains(chars[i]) {
            i += 1;
        }
        tokens.push(chars[start..i].iter().collect());
    }
    Ok(tokens)
}

fn parse_or(tokens: &[String], pos: &mut usize) -> std::result::Result<Condition, ParseError> {
    let mut lhs = parse_and(tokens, pos)?;
    while peek(tokens, *pos) == Some("||") {
        *pos += 1;
        let rhs = parse_and(tokens, pos)?;
        lhs = match lhs {
            Condition::Or(mut cs) => {
                cs.push(rhs);
                Condition::Or(cs)
            }
            other => Condition::Or(vec![other, rhs]),
        };
    }
    Ok(lhs)
}

fn parse_and(tokens: &[String], pos: &mut usize) -> std::result::Result<Condition, ParseError> {
    let mut lhs = parse_unary(tokens, pos)?;
    while peek(tokens, *pos) == Some("&&") {
        *pos += 1;
        let rhs = parse_unary(tokens, pos)?;
        lhs = match lhs {
            Condition::And(mut cs) => {
                cs.push(rhs);
                Condition::And(cs)
            }
            other => Condition::And(vec![other, rhs]),
        };
    }
    Ok(lhs)
}

fn parse_unary(tokens: &[String], pos: &mut usize) -> std::result::Result<Condition, ParseError> {
    if peek(tokens, *pos) == Some("!") {
        *pos += 1;
        return Ok(Condition::Not(Box::new(parse_unary(tokens, pos)?)));
    }
    if peek(tokens, *pos) == Some("(") {
        *pos += 1;
        let inner = parse_or(tokens, pos)?;
        expect(tokens, pos, ")")?;
        return Ok(inner);
    }
    parse_cmp(tokens, pos)
}

fn parse_cmp(tokens: &[String], pos: &mut usize) -> std::result::Result<Condition, ParseError> {
    let head = next(tokens, pos)?;
    if head.starts_with("@type(") && head.ends_with(')') {
        let inner = &head["@type(".len()..head.len() - 1];
        let (path, ty) = inner
            .split_once(',')
            .ok_or_else(|| ParseError::BadPath(head.clone()))?;
        return Ok(Condition::TypeIs {
            path: Path::parse(path.trim()).map_err(|_| ParseError::BadPath(path.to_string()))?,
            type_name: ty.trim().to_string(),
        });
    }
    let path = Path::parse(&head).map_err(|_| ParseError::BadPath(head.clone()))?;
    match peek(tokens, *pos) {
        None => Ok(Condition::Exists(path)),
        Some(op_tok) if is_op(op_tok) => {
            let op = parse_op(op_tok)?;
            *pos += 1;
            let rhs = next(tokens, pos)?;
            if let Ok(rhs_path) = Path::parse(&rhs) {
                if rhs.starts_with('/') {
                    return Ok(Condition::CompareField {
                        left: path,
                        op,
                        right: rhs_path,
                    });
                }
            }
            Ok(Condition::Compare {
                path,
                op,
                literal: parse_literal(&rhs),
            })
        }
        Some("~") => {
            *pos += 1;
            let pattern = next(tokens, pos)?;
            Ok(Condition::Matches {
                path,
                pattern: unquote(&pattern),
            })
        }
        _ => Ok(Condition::Exists(path)),
    }
}

fn is_op(tok: &str) -> bool {
    matches!(tok, "==" | "!=" | "<" | "<=" | ">" | ">=")
}

fn parse_op(tok: &str) -> std::result::Result<CompareOp, ParseError> {
    Ok(match tok {
        "==" => CompareOp::Eq,
        "!=" => CompareOp::Ne,
        "<" => CompareOp::Lt,
        "<=" => CompareOp::Le,
        ">" => CompareOp::Gt,
        ">=" => CompareOp::Ge,
        other => return Err(ParseError::UnknownOperator(other.to_string())),
    })
}

fn parse_literal(tok: &str) -> Literal {
    if tok.starts_with('"') {
        return Literal::Str(unquote(tok));
    }
    match tok {
        "null" => return Literal::Null,
        "true" => return Literal::Bool(true),
        "false" => return Literal::Bool(false),
        _ => {}
    }
    if let Ok(i) = tok.parse::<i128>() {
        return Literal::Int(i);
    }
    if let Ok(f) = tok.parse::<f64>() {
        return Literal::Float(f);
    }
    Literal::Str(tok.to_string())
}

fn unquote(tok: &str) -> String {
    tok.trim_matches('"').to_string()
}

fn peek<'a>(tokens: &'a [String], pos: usize) -> Option<&'a str> {
    tokens.get(pos).map(|s| s.as_str())
}

fn next(tokens: &[String], pos: &mut usize) -> std::result::Result<String, ParseError> {
    let tok = tokens.get(*pos).cloned().ok_or(ParseError::UnexpectedEof)?;
    *pos += 1;
    Ok(tok)
}

fn expect(tokens: &[String], pos: &mut usize, want: &str) -> std::result::Result<(), ParseError> {
    let tok = next(tokens, pos)?;
    if tok != want {
        return Err(ParseError::UnexpectedToken(tok, *pos - 1));
    }
    Ok(())
}

#[allow(dead_code)]
fn scalar_key_literal(l: &Literal) -> Option<ScalarKey> {
    match l {
        Literal::Str(s) => Some(ScalarKey::String(s.clone())),
        Literal::Int(i) => Some(ScalarKey::Int(*i)),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_simple_comparison() {
        let cond = parse("/count > 3").unwrap();
        assert!(matches!(
            cond,
            Condition::Compare {
                op: CompareOp::Gt,
                ..
            }
        ));
    }

    #[test]
    fn parses_conjunction_and_negation() {
        let cond = parse("/a == 1 && !/b").unwrap();
        assert!(matches!(cond, Condition::And(_)));
    }

    #[test]
    fn bare_path_means_exists() {
        let cond = parse("/maybe/field").unwrap();
        assert!(matches!(cond, Condition::Exists(_)));
    }

    #[test]
    fn displays_and_reparses_to_an_equivalent_condition() {
        let cond = parse("/a == 1 && !/b").unwrap();
        let rendered = cond.to_string();
        let reparsed = parse(&rendered).unwrap();
        assert_eq!(format!("{cond:?}"), format!("{reparsed:?}"));
    }

    #[test]
    fn evaluates_against_a_struct_free_value() {
        let cond = Condition::Compare {
            path: Path::root(),
            op: CompareOp::Ge,
            literal: Literal::Int(3),
        };
        let v: i64 = 5;
        assert!(cond.evaluate(&v).unwrap());
        let v2: i64 = 1;
        assert!(!cond.evaluate(&v2).unwrap());
    }

    #[test]
    fn a_malformed_regex_resolves_to_false_instead_of_raising() {
        let cond = Condition::Matches {
            path: Path::root(),
            pattern: "(unclosed".to_string(),
        };
        let v = "anything".to_string();
        assert!(!cond.evaluate(&v).unwrap());
    }
}
