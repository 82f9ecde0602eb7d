//! Minimal JSONPath selector
//!
//! Supported: `$`, `.name`, `['name']`, `[n]` (negative counts from the end),
//! `[*]` / `.*`, and recursive descent `..name` / `..*`. A path without the
//! leading `$` is read relative to the document root.

use serde_json::Value;

use crate::domain::workflow::WorkflowError;

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Child(String),
    Index(i64),
    Wildcard,
    Descendant(String),
    DescendantAll,
}

/// Select every node matched by `path`, in document order
pub fn select<'a>(document: &'a Value, path: &str) -> Result<Vec<&'a Value>, WorkflowError> {
    let steps = parse(path).map_err(|message| WorkflowError::invalid_reference(path, message))?;

    let mut current = vec![document];
    for step in &steps {
        let mut next = Vec::new();
        for node in current {
            apply_step(node, step, &mut next);
        }
        current = next;
    }

    Ok(current)
}

/// Select the first node matched by `path`
pub fn select_first<'a>(document: &'a Value, path: &str) -> Result<Option<&'a Value>, WorkflowError> {
    Ok(select(document, path)?.into_iter().next())
}

fn apply_step<'a>(node: &'a Value, step: &Step, out: &mut Vec<&'a Value>) {
    match step {
        Step::Child(name) => {
            if let Some(child) = node.as_object().and_then(|map| map.get(name)) {
                out.push(child);
            }
        }
        Step::Index(index) => {
            if let Some(items) = node.as_array() {
                let resolved = if *index < 0 {
                    items.len() as i64 + index
                } else {
                    *index
                };
                if let Some(item) = usize::try_from(resolved).ok().and_then(|i| items.get(i)) {
                    out.push(item);
                }
            }
        }
        Step::Wildcard => match node {
            Value::Object(map) => out.extend(map.values()),
            Value::Array(items) => out.extend(items.iter()),
            _ => {}
        },
        Step::Descendant(name) => collect_named(node, name, out),
        Step::DescendantAll => collect_all(node, out),
    }
}

fn collect_named<'a>(node: &'a Value, name: &str, out: &mut Vec<&'a Value>) {
    match node {
        Value::Object(map) => {
            if let Some(found) = map.get(name) {
                out.push(found);
            }
            for child in map.values() {
                collect_named(child, name, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_named(item, name, out);
            }
        }
        _ => {}
    }
}

fn collect_all<'a>(node: &'a Value, out: &mut Vec<&'a Value>) {
    let children: Box<dyn Iterator<Item = &'a Value>> = match node {
        Value::Object(map) => Box::new(map.values()),
        Value::Array(items) => Box::new(items.iter()),
        _ => return,
    };

    for child in children {
        out.push(child);
        collect_all(child, out);
    }
}

fn parse(path: &str) -> Result<Vec<Step>, String> {
    let trimmed = path.trim();
    let body = trimmed.strip_prefix('$').unwrap_or(trimmed);
    let chars: Vec<char> = body.chars().collect();
    let mut steps = Vec::new();
    let mut i = 0;

    // relative form: "user.name" reads as "$.user.name"
    if !chars.is_empty() && chars[0] != '.' && chars[0] != '[' {
        let (name, end) = read_name(&chars, 0);
        steps.push(name_step(name, false)?);
        i = end;
    }

    while i < chars.len() {
        match chars[i] {
            '.' => {
                let recursive = chars.get(i + 1) == Some(&'.');
                let start = if recursive { i + 2 } else { i + 1 };
                if recursive && chars.get(start) == Some(&'[') {
                    return Err("recursive descent must be followed by a name".to_string());
                }
                let (name, end) = read_name(&chars, start);
                if name.is_empty() {
                    return Err(format!("empty segment at position {}", i));
                }
                steps.push(name_step(name, recursive)?);
                i = end;
            }
            '[' => {
                let close = find_close(&chars, i + 1)
                    .ok_or_else(|| format!("unclosed '[' at position {}", i))?;
                let inner: String = chars[i + 1..close].iter().collect();
                steps.push(bracket_step(inner.trim())?);
                i = close + 1;
            }
            other => return Err(format!("unexpected '{}' at position {}", other, i)),
        }
    }

    Ok(steps)
}

fn read_name(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && chars[end] != '.' && chars[end] != '[' {
        end += 1;
    }
    (chars[start..end].iter().collect(), end)
}

fn name_step(name: String, recursive: bool) -> Result<Step, String> {
    match (name.as_str(), recursive) {
        ("", _) => Err("empty segment".to_string()),
        ("*", false) => Ok(Step::Wildcard),
        ("*", true) => Ok(Step::DescendantAll),
        (_, false) => Ok(Step::Child(name)),
        (_, true) => Ok(Step::Descendant(name)),
    }
}

fn find_close(chars: &[char], start: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (offset, c) in chars[start..].iter().enumerate() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(*c),
            (Some(q), c) if *c == q => quote = None,
            (None, ']') => return Some(start + offset),
            _ => {}
        }
    }
    None
}

fn bracket_step(inner: &str) -> Result<Step, String> {
    if inner == "*" {
        return Ok(Step::Wildcard);
    }

    let quoted = (inner.starts_with('\'') && inner.ends_with('\''))
        || (inner.starts_with('"') && inner.ends_with('"'));
    if quoted && inner.len() >= 2 {
        return Ok(Step::Child(inner[1..inner.len() - 1].to_string()));
    }

    inner
        .parse::<i64>()
        .map(Step::Index)
        .map_err(|_| format!("invalid bracket expression '[{}]'", inner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "store": {
                "name": "corner",
                "items": [
                    {"title": "pen", "price": 1.5},
                    {"title": "book", "price": 12},
                    {"title": "lamp", "price": 30, "tags": {"title": "nested"}}
                ]
            }
        })
    }

    #[test]
    fn test_child_and_index() {
        let document = doc();
        assert_eq!(select(&document, "$.store.name").unwrap(), vec![&json!("corner")]);
        assert_eq!(
            select(&document, "$.store.items[1].title").unwrap(),
            vec![&json!("book")]
        );
        assert_eq!(
            select(&document, "$.store.items[-1].price").unwrap(),
            vec![&json!(30)]
        );
        assert_eq!(select(&document, "$['store']['name']").unwrap(), vec![&json!("corner")]);
    }

    #[test]
    fn test_relative_path() {
        let document = doc();
        assert_eq!(select(&document, "store.name").unwrap(), vec![&json!("corner")]);
    }

    #[test]
    fn test_wildcard() {
        let document = doc();
        let prices = select(&document, "$.store.items[*].price").unwrap();
        assert_eq!(prices, vec![&json!(1.5), &json!(12), &json!(30)]);
    }

    #[test]
    fn test_recursive_descent() {
        let document = doc();
        let titles = select(&document, "$..title").unwrap();
        assert_eq!(titles.len(), 4);
        assert!(titles.contains(&&json!("nested")));
    }

    #[test]
    fn test_root_and_misses() {
        let document = doc();
        assert_eq!(select(&document, "$").unwrap(), vec![&document]);
        assert!(select(&document, "$.store.missing").unwrap().is_empty());
        assert!(select(&document, "$.store.items[9]").unwrap().is_empty());
        assert_eq!(select_first(&document, "$.store.missing").unwrap(), None);
    }

    #[test]
    fn test_malformed_path() {
        let document = doc();
        assert!(matches!(
            select(&document, "$.store[abc]"),
            Err(WorkflowError::InvalidReference { .. })
        ));
        assert!(select(&document, "$.store[0").is_err());
        assert!(select(&document, "$.").is_err());
    }
}
