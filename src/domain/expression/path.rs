//! Dotted/bracketed path syntax shared by flat keys and variable references
//!
//! `items[0].name`, `nodeA.items[*].id`, `[2]` (root array element).
//! Property names that would otherwise read as syntax are quoted: `['user.name']`.

use std::fmt;

/// One step of a parsed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object property (`.name`)
    Property(String),
    /// Exact array index (`[3]`)
    Index(usize),
    /// Every array element (`[*]`)
    Wildcard,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property(name) => write!(f, "{}", name),
            Self::Index(index) => write!(f, "[{}]", index),
            Self::Wildcard => write!(f, "[*]"),
        }
    }
}

/// Parse a path into segments; the empty string is the root (no segments)
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, String> {
    let mut segments = Vec::new();
    let mut name = String::new();
    let mut after_bracket = false;
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !name.is_empty() {
                    segments.push(PathSegment::Property(std::mem::take(&mut name)));
                } else if !after_bracket {
                    return Err(format!("empty segment in '{}'", path));
                }

                if chars.peek().is_none() {
                    return Err(format!("trailing '.' in '{}'", path));
                }
                after_bracket = false;
            }
            '[' => {
                if !name.is_empty() {
                    segments.push(PathSegment::Property(std::mem::take(&mut name)));
                }

                if chars.peek() == Some(&'\'') {
                    chars.next();
                    segments.push(PathSegment::Property(parse_quoted(&mut chars, path)?));
                } else {
                    let mut inner = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(ch) => inner.push(ch),
                            None => return Err(format!("unclosed '[' in '{}'", path)),
                        }
                    }
                    segments.push(parse_bracket(&inner, path)?);
                }
                after_bracket = true;
            }
            ']' => return Err(format!("unexpected ']' in '{}'", path)),
            _ => {
                if after_bracket {
                    return Err(format!("expected '.' or '[' after ']' in '{}'", path));
                }
                name.push(c);
            }
        }
    }

    if !name.is_empty() {
        segments.push(PathSegment::Property(name));
    }

    Ok(segments)
}

/// Read a quoted property after `['` up to and including the closing `']`
fn parse_quoted(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    path: &str,
) -> Result<String, String> {
    let mut name = String::new();
    loop {
        match chars.next() {
            Some('\\') => match chars.next() {
                Some(escaped) => name.push(escaped),
                None => return Err(format!("dangling escape in '{}'", path)),
            },
            Some('\'') => break,
            Some(ch) => name.push(ch),
            None => return Err(format!("unclosed quote in '{}'", path)),
        }
    }

    match chars.next() {
        Some(']') => Ok(name),
        _ => Err(format!("expected ']' after quoted name in '{}'", path)),
    }
}

fn parse_bracket(inner: &str, path: &str) -> Result<PathSegment, String> {
    if inner == "*" {
        return Ok(PathSegment::Wildcard);
    }

    if inner.is_empty() || !inner.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("invalid index '[{}]' in '{}'", inner, path));
    }

    inner
        .parse::<usize>()
        .map(PathSegment::Index)
        .map_err(|e| format!("invalid index '[{}]' in '{}': {}", inner, path, e))
}

/// Join a child property onto a key prefix, quoting names that contain path syntax
pub fn join_key(prefix: &str, child: &str) -> String {
    if needs_quoting(child) {
        let escaped = child.replace('\\', "\\\\").replace('\'', "\\'");
        format!("{}['{}']", prefix, escaped)
    } else if prefix.is_empty() {
        child.to_string()
    } else {
        format!("{}.{}", prefix, child)
    }
}

fn needs_quoting(name: &str) -> bool {
    name.is_empty() || name.contains(['.', '[', ']', '\'', '\\'])
}

/// Append an index to a key prefix
pub fn index_key(prefix: &str, index: usize) -> String {
    format!("{}[{}]", prefix, index)
}
