//! Variable document paths.
//!
//! Variables are a plain JSON document. Paths like `a.b[0].c` are tokenized
//! **once** into an explicit [`PathSegment`] sequence, which is then reused
//! by the flattener, the by-path getter/setter, and the delta differ — there
//! is no ad hoc string splitting anywhere else in the workspace.

use serde_json::Value;
use thiserror::Error;

/// The variable document type. A JSON object at the top level by convention,
/// but the pipeline tolerates any JSON value.
pub type Variables = Value;

/// One step through a variable document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object key access: `.name`
    Key(String),
    /// Array element access: `[3]`
    Index(usize),
}

#[derive(Debug, Clone, Error)]
pub enum PathError {
    #[error("invalid path at byte {pos}: {reason}")]
    Invalid { pos: usize, reason: String },
}

/// Tokenize a path string (`a.b[0].c`) into segments.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, PathError> {
    let bytes = path.as_bytes();
    let mut segments = Vec::new();
    let mut pos = 0;

    if bytes.is_empty() {
        return Err(PathError::Invalid {
            pos: 0,
            reason: "empty path".into(),
        });
    }

    while pos < bytes.len() {
        match bytes[pos] {
            b'[' => {
                let close = path[pos..].find(']').ok_or_else(|| PathError::Invalid {
                    pos,
                    reason: "unterminated index".into(),
                })? + pos;
                let digits = &path[pos + 1..close];
                let index: usize = digits.parse().map_err(|_| PathError::Invalid {
                    pos: pos + 1,
                    reason: format!("bad index '{digits}'"),
                })?;
                segments.push(PathSegment::Index(index));
                pos = close + 1;
            }
            b'.' => {
                // Separator; a trailing or doubled dot is malformed.
                pos += 1;
                if pos >= bytes.len() || bytes[pos] == b'.' || bytes[pos] == b'[' {
                    return Err(PathError::Invalid {
                        pos,
                        reason: "expected key after '.'".into(),
                    });
                }
            }
            _ => {
                let rest = &path[pos..];
                let end = rest
                    .find(|c| c == '.' || c == '[')
                    .map(|i| pos + i)
                    .unwrap_or(bytes.len());
                segments.push(PathSegment::Key(path[pos..end].to_string()));
                pos = end;
            }
        }
    }

    Ok(segments)
}

/// Render segments back to the canonical `a.b[0].c` form.
pub fn render_path(segments: &[PathSegment]) -> String {
    let mut out = String::new();
    for seg in segments {
        match seg {
            PathSegment::Key(k) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(k);
            }
            PathSegment::Index(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            }
        }
    }
    out
}

/// Resolve a path against a document.
pub fn get_path<'a>(root: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    let mut current = root;
    for seg in segments {
        current = match seg {
            PathSegment::Key(k) => current.as_object()?.get(k)?,
            PathSegment::Index(i) => current.as_array()?.get(*i)?,
        };
    }
    Some(current)
}

/// Set a value at a path, creating intermediate objects as needed.
///
/// Array segments only write into existing slots or append at `len`;
/// anything else returns `false` without touching the document.
pub fn set_path(root: &mut Value, segments: &[PathSegment], value: Value) -> bool {
    let Some((last, prefix)) = segments.split_last() else {
        *root = value;
        return true;
    };

    let mut current = root;
    for seg in prefix {
        current = match seg {
            PathSegment::Key(k) => match current {
                Value::Object(map) => map
                    .entry(k.clone())
                    .or_insert_with(|| Value::Object(serde_json::Map::new())),
                _ => return false,
            },
            PathSegment::Index(i) => match current.as_array_mut() {
                Some(arr) if *i < arr.len() => &mut arr[*i],
                _ => return false,
            },
        };
    }

    match last {
        PathSegment::Key(k) => match current.as_object_mut() {
            Some(obj) => {
                obj.insert(k.clone(), value);
                true
            }
            None => false,
        },
        PathSegment::Index(i) => match current.as_array_mut() {
            Some(arr) if *i < arr.len() => {
                arr[*i] = value;
                true
            }
            Some(arr) if *i == arr.len() => {
                arr.push(value);
                true
            }
            _ => false,
        },
    }
}

/// Flatten a document into `(path, leaf)` pairs.
///
/// Scalars and empty containers are leaves; array indices render as `[i]`.
/// Pairs come back in document order.
pub fn flatten(root: &Value) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    let mut prefix = Vec::new();
    flatten_into(root, &mut prefix, &mut out);
    out
}

fn flatten_into(value: &Value, prefix: &mut Vec<PathSegment>, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (k, v) in map {
                prefix.push(PathSegment::Key(k.clone()));
                flatten_into(v, prefix, out);
                prefix.pop();
            }
        }
        Value::Array(arr) if !arr.is_empty() => {
            for (i, v) in arr.iter().enumerate() {
                prefix.push(PathSegment::Index(i));
                flatten_into(v, prefix, out);
                prefix.pop();
            }
        }
        leaf => out.push((render_path(prefix), leaf.clone())),
    }
}
