//! C2: RFC 6901 paths over any [`Patchable`] value.
//!
//! The token tape follows the teacher's `doc::ptr::Pointer`: a compact
//! `TinyVec`-backed encoding rather than `Vec<String>`, so walking a path on
//! the diff/apply hot path doesn't allocate per segment.
use std::fmt;
use std::str::FromStr;

use tinyvec::TinyVec;

use crate::error::{Error, Result};
use crate::value::{MapEntries, Patchable, ScalarKey};

/// A single parsed path token. An all-digit, non-"next" token is ambiguous
/// between a map string key and a sequence index until the container it's
/// applied against decides.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Index(usize),
    Property(String),
    /// RFC 6901's `-` token: one past the end of a sequence.
    NextIndex,
}

impl Default for Token {
    fn default() -> Self {
        Token::NextIndex
    }
}

/// A normalized RFC 6901 path. The empty path is the document root.
#[derive(Clone, PartialEq, Eq, Default, Hash)]
pub struct Path(TinyVec<[Token; 4]>);

impl Path {
    pub fn root() -> Path {
        Path(TinyVec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push_property(&mut self, name: impl Into<String>) {
        self.0.push(Token::Property(name.into()));
    }

    pub fn push_index(&mut self, index: usize) {
        self.0.push(Token::Index(index));
    }

    pub fn pushed_property(&self, name: impl Into<String>) -> Path {
        let mut p = self.clone();
        p.push_property(name);
        p
    }

    pub fn pushed_index(&self, index: usize) -> Path {
        let mut p = self.clone();
        p.push_index(index);
        p
    }

    pub fn pop(&mut self) -> Option<Token> {
        self.0.pop()
    }

    /// Splits off the final token, returning `(parent, last)`.
    pub fn split_last(&self) -> Option<(Path, Token)> {
        let mut parent = self.clone();
        let last = parent.0.pop()?;
        Some((parent, last))
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses an RFC 6901 pointer string (`""`, `"/"`, `"/a/0/~1b"`).
    pub fn parse(s: &str) -> Result<Path> {
        if s.is_empty() {
            return Ok(Path::root());
        }
        if !s.starts_with('/') {
            return Err(Error::Encoding(format!(
                "path {s:?} must be empty or start with '/'"
            )));
        }
        let mut tokens = TinyVec::new();
        for raw in s.split('/').skip(1) {
            let unescaped = raw.replace("~1", "/").replace("~0", "~");
            tokens.push(if unescaped == "-" {
                Token::NextIndex
            } else if let Ok(index) = usize::from_str(&unescaped) {
                // Reject leading-zero / '+' forms as indices, same as the
                // teacher's Pointer::from_str: they're valid property names
                // but never valid RFC 6901 array indices.
                if unescaped == "0" || !unescaped.starts_with('0') {
                    Token::Index(index)
                } else {
                    Token::Property(unescaped)
                }
            } else {
                Token::Property(unescaped)
            });
        }
        Ok(Path(tokens))
    }

    pub fn join(&self, suffix: &Path) -> Path {
        let mut out = self.clone();
        out.0.extend(suffix.0.iter().cloned());
        out
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn escape(s: &str) -> String {
            s.replace('~', "~0").replace('/', "~1")
        }
        for token in self.0.iter() {
            write!(f, "/")?;
            match token {
                Token::Index(i) => write!(f, "{i}")?,
                Token::Property(p) => write!(f, "{}", escape(p))?,
                Token::NextIndex => write!(f, "-")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

impl FromStr for Path {
    type Err = Error;
    fn from_str(s: &str) -> Result<Path> {
        Path::parse(s)
    }
}

impl<S: AsRef<str>> From<S> for Path {
    fn from(s: S) -> Path {
        Path::parse(s.as_ref()).unwrap_or_else(|_| Path::root())
    }
}

/// Resolve(root, path): walk `root`, auto-dereferencing pointers, selecting
/// the container branch by runtime kind at each step.
pub fn resolve<'v>(root: &'v dyn Patchable, path: &Path) -> Result<&'v dyn Patchable> {
    let mut cur = root;
    for (i, token) in path.tokens().enumerate() {
        cur = step(cur, token).ok_or_else(|| Error::PathNotFound(prefix(path, i + 1)))?;
    }
    Ok(cur)
}

fn step<'v>(cur: &'v dyn Patchable, token: &Token) -> Option<&'v dyn Patchable> {
    // Auto-dereference pointers/sums before dispatching on the token.
    if let Some(target) = cur.pointer_target() {
        return target.and_then(|inner| step(inner, token));
    }
    if let Some((_, payload)) = cur.sum_variant() {
        return step(payload, token);
    }
    match token {
        Token::Property(name) => {
            if let Some(fields) = cur.struct_fields() {
                return fields.get(name);
            }
            if let Some(map) = cur.map_entries() {
                return map.get(&ScalarKey::String(name.clone()));
            }
            None
        }
        Token::Index(idx) => {
            if let Some(seq) = cur.seq_items() {
                return seq.get(*idx);
            }
            if let Some(map) = cur.map_entries() {
                return map.get(&index_key(map, *idx));
            }
            None
        }
        Token::NextIndex => None,
    }
}

/// Coerces an index token to the key type the map actually uses, per §4.2:
/// a map declared with integer keys is indexed by `ScalarKey::Int`, not the
/// string rendering of the index. Inferred from the container's existing
/// keys, since `MapEntries` carries no separate declared-key-type field.
fn index_key<M: MapEntries + ?Sized>(map: &M, idx: usize) -> ScalarKey {
    if map.keys().iter().any(|k| matches!(k, ScalarKey::Int(_))) {
        ScalarKey::Int(idx as i128)
    } else {
        ScalarKey::String(idx.to_string())
    }
}

fn prefix(path: &Path, n: usize) -> Path {
    let mut out = Path::root();
    for t in path.tokens().take(n) {
        out.0.push(t.clone());
    }
    out
}

/// Mutable counterpart of [`resolve`], stopping one level short: returns the
/// parent container and the final token so the caller can choose the right
/// mutation (`get_mut` to recurse further, or a whole-slot replace).
pub fn resolve_parent<'v>(
    root: &'v mut dyn Patchable,
    path: &Path,
) -> Result<(&'v mut dyn Patchable, Token)> {
    let (parent_path, last) = path
        .split_last()
        .ok_or_else(|| Error::PathNotFound(Path::root()))?;
    let parent = resolve_mut(root, &parent_path)?;
    Ok((parent, last))
}

pub fn resolve_mut<'v>(root: &'v mut dyn Patchable, path: &Path) -> Result<&'v mut dyn Patchable> {
    let mut cur = root;
    for (i, token) in path.tokens().enumerate() {
        cur = step_mut(cur, token).ok_or_else(|| Error::PathNotFound(prefix(path, i + 1)))?;
    }
    Ok(cur)
}

fn step_mut<'v>(cur: &'v mut dyn Patchable, token: &Token) -> Option<&'v mut dyn Patchable> {
    if cur.pointer_target().is_some() {
        return cur.pointer_target_mut()?.and_then(|inner| step_mut(inner, token));
    }
    if cur.sum_variant().is_some() {
        let (_, payload) = cur.sum_variant_mut()?;
        return step_mut(payload, token);
    }
    match token {
        Token::Property(name) => {
            if cur.struct_fields().is_some() {
                return cur.struct_fields_mut()?.get_mut(name);
            }
            if cur.map_entries().is_some() {
                return cur.map_entries_mut()?.get_mut(&ScalarKey::String(name.clone()));
            }
            None
        }
        Token::Index(idx) => {
            if cur.seq_items().is_some() {
                return cur.seq_items_mut()?.get_mut(*idx);
            }
            if cur.map_entries().is_some() {
                let key = index_key(cur.map_entries()?, *idx);
                return cur.map_entries_mut()?.get_mut(&key);
            }
            None
        }
        Token::NextIndex => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_and_displays_round_trip() {
        for case in ["", "/foo/2/a~1b", "/foo/2/b~0", "/foo/0", "/foo/-"] {
            let p = Path::parse(case).unwrap();
            assert_eq!(p.to_string(), case);
        }
    }

    #[test]
    fn distinguishes_index_like_properties() {
        let p = Path::parse("/01/+2/-3/4/-").unwrap();
        let toks: Vec<_> = p.tokens().cloned().collect();
        assert_eq!(
            toks,
            vec![
                Token::Property("01".into()),
                Token::Property("+2".into()),
                Token::Property("-3".into()),
                Token::Index(4),
                Token::NextIndex,
            ]
        );
    }

    #[test]
    fn rejects_unrooted_paths() {
        assert!(Path::parse("foo/bar").is_err());
    }
}
