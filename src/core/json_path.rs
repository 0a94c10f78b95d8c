//! Dotted-path extraction over decoded JSON
//!
//! Providers answer "list models" with differently shaped documents:
//! `{"data":[{"id":..}]}`, `{"models":[{"name":..}]}`,
//! `{"modelSummaries":[{"modelId":..}]}`. A path such as `data.id` walks every
//! segment but the last through nested objects, then reads the last segment as
//! a string field from each element of the array it reached.

use serde_json::Value;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    EmptyPath,
    /// A segment between two dots (or at either end) is empty.
    EmptySegment { position: usize },
    /// The value reached before `segment` is not an object.
    NotAnObject { segment: String, position: usize },
    /// The object reached before `segment` has no such key.
    MissingKey { segment: String, position: usize },
    /// The walk ended on something other than an array, object or null.
    NotAnArray { segment: String, position: usize },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::EmptyPath => write!(f, "JSON path is empty"),
            PathError::EmptySegment { position } => {
                write!(f, "JSON path has an empty segment at position {position}")
            }
            PathError::NotAnObject { segment, position } => write!(
                f,
                "expected an object before segment '{segment}' (position {position})"
            ),
            PathError::MissingKey { segment, position } => {
                write!(f, "key '{segment}' not found (position {position})")
            }
            PathError::NotAnArray { segment, position } => write!(
                f,
                "expected an array of records at '{segment}' (position {position})"
            ),
        }
    }
}

impl Error for PathError {}

/// A validated dotted path. Parsing up front lets the provider table reject a
/// bad path at load time instead of on the first catalog request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<String>,
}

impl JsonPath {
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(PathError::EmptyPath);
        }

        let mut segments = Vec::new();
        for (position, segment) in path.split('.').enumerate() {
            if segment.is_empty() {
                return Err(PathError::EmptySegment { position });
            }
            segments.push(segment.to_string());
        }

        Ok(Self { segments })
    }

    /// The field read from every record; always present because a parsed
    /// path has at least one segment.
    fn field(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn extract(&self, document: &Value) -> Result<Vec<String>, PathError> {
        let (walk, _) = self.segments.split_at(self.segments.len() - 1);
        let target = descend(document, walk, 0)?;
        let last_position = self.segments.len() - 1;
        collect_field(target, self.field(), last_position)
    }
}

/// Recursive walk through the object segments. The last walked segment names
/// the record array; returns `None` when that key is absent or `null`, which
/// counts as an empty catalog.
fn descend<'a>(
    value: &'a Value,
    segments: &[String],
    position: usize,
) -> Result<Option<&'a Value>, PathError> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(Some(value));
    };

    let Value::Object(map) = value else {
        return Err(PathError::NotAnObject {
            segment: segment.clone(),
            position,
        });
    };

    match map.get(segment) {
        None | Some(Value::Null) if rest.is_empty() => Ok(None),
        Some(next) => descend(next, rest, position + 1),
        None => Err(PathError::MissingKey {
            segment: segment.clone(),
            position,
        }),
    }
}

fn collect_field(
    target: Option<&Value>,
    field: &str,
    position: usize,
) -> Result<Vec<String>, PathError> {
    let records: &[Value] = match target {
        None => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(record @ Value::Object(_)) => std::slice::from_ref(record),
        Some(_) => {
            return Err(PathError::NotAnArray {
                segment: field.to_string(),
                position,
            })
        }
    };

    // Records without a string field are skipped: catalogs mix typed and
    // malformed entries.
    Ok(records
        .iter()
        .filter_map(|record| record.get(field).and_then(Value::as_str))
        .map(str::to_owned)
        .collect())
}

/// Parse `path` and extract from `document` in one step.
pub fn extract_strings(document: &Value, path: &str) -> Result<Vec<String>, PathError> {
    JsonPath::parse(path)?.extract(document)
}
