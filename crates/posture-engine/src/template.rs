//! Template resolver: path expressions and `{{ expr }}` placeholders
//!
//! Paths support dotted field access (`a.b`), numeric indexing (`a[0]`),
//! and bracket-with-no-index (`a[]`), which iterates all elements and
//! flattens the results into a list. Field lookup falls back from exact
//! to case-insensitive to underscore-normalized matching, so a check
//! written against `group_id` still finds an emitted `GroupId`. That
//! fallback lives here, once, rather than in every rule file.
//!
//! Pure functions over `serde_json::Value`; no I/O.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Outcome of resolving a path against a value.
///
/// `Absent` (a missing intermediate segment) is distinct from both
/// `null` and an empty list; operators decide how to treat each.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// No value at this path
    Absent,
    /// A single value (possibly `null` or an array the response contained)
    One(Value),
    /// A flattened list produced by `[]` iteration
    Many(Vec<Value>),
}

impl Resolved {
    /// Whether the path resolved to nothing
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Collapse into a plain value; `Absent` becomes `None`
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Absent => None,
            Self::One(v) => Some(v),
            Self::Many(list) => Some(Value::Array(list)),
        }
    }

    /// Human rendering for diagnostics (`absent` vs `null` vs `[]`)
    pub fn describe(&self) -> String {
        match self {
            Self::Absent => "absent".to_string(),
            Self::One(v) => v.to_string(),
            Self::Many(list) => Value::Array(list.clone()).to_string(),
        }
    }
}

/// One parsed path segment: a field name plus trailing index operations
#[derive(Debug, Clone, PartialEq)]
struct Segment {
    field: String,
    indexes: Vec<Index>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Index {
    /// `[3]`
    At(usize),
    /// `[]`: iterate and flatten
    All,
}

fn parse_segment(raw: &str) -> Option<Segment> {
    let bracket = raw.find('[').unwrap_or(raw.len());
    let field = raw[..bracket].to_string();
    let mut indexes = Vec::new();

    let mut rest = &raw[bracket..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let close = stripped.find(']')?;
        let inner = stripped[..close].trim();
        if inner.is_empty() {
            indexes.push(Index::All);
        } else {
            indexes.push(Index::At(inner.parse().ok()?));
        }
        rest = &stripped[close + 1..];
    }
    if !rest.is_empty() {
        return None;
    }

    Some(Segment { field, indexes })
}

fn parse_path(path: &str) -> Option<Vec<Segment>> {
    path.split('.').map(parse_segment).collect()
}

/// Normalize a field name for the last-resort match: lowercase, no underscores
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Field lookup with exact -> case-insensitive -> normalized fallback
pub fn lookup_field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    if let Some(v) = object.get(name) {
        return Some(v);
    }
    if let Some((_, v)) = object.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
        return Some(v);
    }
    let wanted = normalize(name);
    object
        .iter()
        .find(|(k, _)| normalize(k) == wanted)
        .map(|(_, v)| v)
}

/// Walking state: either one value or an already-flattened list
enum Cursor<'a> {
    One(&'a Value),
    Many(Vec<&'a Value>),
    Absent,
}

impl<'a> Cursor<'a> {
    fn field(self, name: &str) -> Cursor<'a> {
        match self {
            Cursor::One(Value::Object(map)) => match lookup_field(map, name) {
                Some(v) => Cursor::One(v),
                None => Cursor::Absent,
            },
            Cursor::Many(list) => {
                let hits: Vec<&Value> = list
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::Object(map) => lookup_field(map, name),
                        _ => None,
                    })
                    .collect();
                Cursor::Many(hits)
            }
            _ => Cursor::Absent,
        }
    }

    fn index(self, index: Index) -> Cursor<'a> {
        match (self, index) {
            (Cursor::One(Value::Array(arr)), Index::At(n)) => match arr.get(n) {
                Some(v) => Cursor::One(v),
                None => Cursor::Absent,
            },
            (Cursor::One(Value::Array(arr)), Index::All) => Cursor::Many(arr.iter().collect()),
            (Cursor::Many(list), Index::All) => {
                // Flatten one level: each element must itself be an array
                let mut flat = Vec::new();
                for v in list {
                    if let Value::Array(arr) = v {
                        flat.extend(arr.iter());
                    }
                }
                Cursor::Many(flat)
            }
            (Cursor::Many(list), Index::At(n)) => {
                let hits: Vec<&Value> = list
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::Array(arr) => arr.get(n),
                        _ => None,
                    })
                    .collect();
                Cursor::Many(hits)
            }
            _ => Cursor::Absent,
        }
    }
}

fn walk<'a>(mut cursor: Cursor<'a>, segments: &[Segment]) -> Cursor<'a> {
    for segment in segments {
        if !segment.field.is_empty() {
            cursor = cursor.field(&segment.field);
        }
        for index in &segment.indexes {
            cursor = cursor.index(*index);
        }
    }
    cursor
}

fn finish(cursor: Cursor<'_>) -> Resolved {
    match cursor {
        Cursor::Absent => Resolved::Absent,
        Cursor::One(v) => Resolved::One(v.clone()),
        Cursor::Many(list) => Resolved::Many(list.into_iter().cloned().collect()),
    }
}

/// Resolve a dotted/indexed path against a root value
pub fn resolve_path(root: &Value, path: &str) -> Resolved {
    let Some(segments) = parse_path(path) else {
        return Resolved::Absent;
    };
    finish(walk(Cursor::One(root), &segments))
}

/// Named values a template expression can reference: saved responses and
/// the loop variable (`item` / `resource` / the step's `param` name)
#[derive(Debug, Clone, Default)]
pub struct Context {
    vars: Map<String, Value>,
}

impl Context {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a name to a value, replacing any previous binding
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Look up a bound value by exact name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Resolve a path expression whose first segment names a bound variable
    pub fn resolve(&self, expr: &str) -> Resolved {
        let Some(segments) = parse_path(expr) else {
            return Resolved::Absent;
        };
        let Some(first) = segments.first() else {
            return Resolved::Absent;
        };
        let Some(root) = lookup_field(&self.vars, &first.field) else {
            return Resolved::Absent;
        };

        // Indexes on the first segment apply to the variable itself
        let mut cursor = Cursor::One(root);
        for index in &first.indexes {
            cursor = cursor.index(*index);
        }
        finish(walk(cursor, &segments[1..]))
    }
}

/// Resolves `{{ expr }}` placeholders against a [`Context`]
#[derive(Debug)]
pub struct TemplateResolver {
    pattern: Regex,
}

impl Default for TemplateResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateResolver {
    /// Create a resolver with the standard `{{ expr }}` syntax
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("valid placeholder regex"),
        }
    }

    /// Render a template string.
    ///
    /// A template that is exactly one placeholder yields the raw resolved
    /// value (preserving its JSON type); placeholders embedded in larger
    /// text stringify. Absent expressions render as `null` / empty text.
    pub fn render(&self, template: &str, ctx: &Context) -> Value {
        let trimmed = template.trim();
        if let Some(caps) = self.pattern.captures(trimmed) {
            if caps.get(0).map(|m| m.as_str()) == Some(trimmed) {
                let expr = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                return ctx.resolve(expr).into_value().unwrap_or(Value::Null);
            }
        }

        if !self.pattern.is_match(template) {
            return Value::String(template.to_string());
        }

        let rendered = self.pattern.replace_all(template, |caps: &regex::Captures| {
            let expr = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            match ctx.resolve(expr).into_value() {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => String::new(),
            }
        });
        Value::String(rendered.into_owned())
    }

    /// Render every string parameter; non-strings pass through untouched
    pub fn render_params(
        &self,
        params: &BTreeMap<String, Value>,
        ctx: &Context,
    ) -> Map<String, Value> {
        let mut out = Map::new();
        for (name, value) in params {
            let rendered = match value {
                Value::String(template) => self.render(template, ctx),
                other => other.clone(),
            };
            out.insert(name.clone(), rendered);
        }
        out
    }
}
