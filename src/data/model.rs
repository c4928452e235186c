use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::units::{Quantity, SkyPosition};

// ---------------------------------------------------------------------------
// Artifact – whatever a loader hands back
// ---------------------------------------------------------------------------

/// An opaque loaded object (image, cube, profile, ...).
///
/// The container only caches and hands it out; callers downcast it to the
/// concrete type their loader produced.
pub type Artifact = Arc<dyn Any + Send + Sync>;

// ---------------------------------------------------------------------------
// Value – a typed configuration value
// ---------------------------------------------------------------------------

/// A configuration value after coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Quantity(Quantity),
    Path(PathBuf),
    /// Composed from `ra`, `dec` and `frame` options.
    Position(SkyPosition),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Quantity(q) => write!(f, "{q}"),
            Value::Path(p) => write!(f, "{}", p.display()),
            Value::Position(p) => write!(f, "{p}"),
        }
    }
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_quantity(&self) -> Option<&Quantity> {
        match self {
            Value::Quantity(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&PathBuf> {
        match self {
            Value::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_position(&self) -> Option<&SkyPosition> {
        match self {
            Value::Position(p) => Some(p),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Quantity> for Value {
    fn from(q: Quantity) -> Self {
        Value::Quantity(q)
    }
}

// ---------------------------------------------------------------------------
// ValueKind – the coercion requested by a getter or a `*_type` option
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Str,
    Int,
    Float,
    Bool,
    Quantity,
    Path,
}

impl ValueKind {
    /// Kinds a `loader_<key>_type` option may name.
    pub const LOADER_KINDS: [ValueKind; 4] = [
        ValueKind::Int,
        ValueKind::Float,
        ValueKind::Bool,
        ValueKind::Quantity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Str => "str",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Bool => "bool",
            ValueKind::Quantity => "quantity",
            ValueKind::Path => "path",
        }
    }

    pub fn is_loader_kind(&self) -> bool {
        Self::LOADER_KINDS.contains(self)
    }

    /// Coerce raw configuration text. `None` means the text is malformed
    /// for this kind.
    pub fn coerce(&self, raw: &str) -> Option<Value> {
        let text = raw.trim();
        match self {
            ValueKind::Str => Some(Value::Str(raw.to_string())),
            ValueKind::Int => text.parse::<i64>().ok().map(Value::Int),
            ValueKind::Float => text.parse::<f64>().ok().map(Value::Float),
            ValueKind::Bool => parse_bool(text).map(Value::Bool),
            ValueKind::Quantity => Quantity::parse(text).map(Value::Quantity),
            ValueKind::Path => {
                if text.is_empty() {
                    None
                } else {
                    Some(Value::Path(expand_user(text)))
                }
            }
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "str" => Ok(ValueKind::Str),
            "int" => Ok(ValueKind::Int),
            "float" => Ok(ValueKind::Float),
            "bool" => Ok(ValueKind::Bool),
            "quantity" => Ok(ValueKind::Quantity),
            "path" => Ok(ValueKind::Path),
            other => Err(format!("unknown value kind '{other}'")),
        }
    }
}

/// Boolean spellings accepted in configuration files.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Some(true),
        "0" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_user(text: &str) -> PathBuf {
    if text == "~" || text.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut path = PathBuf::from(home);
            if let Some(rest) = text.strip_prefix("~/") {
                path.push(rest);
            }
            return path;
        }
    }
    PathBuf::from(text)
}

// ---------------------------------------------------------------------------
// LoaderArgs – keyword arguments handed to a loader
// ---------------------------------------------------------------------------

/// Ordered keyword arguments for a loader call. Inserting an existing key
/// overwrites its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoaderArgs {
    entries: Vec<(String, Value)>,
}

impl LoaderArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Overlay `other` on top of `self`.
    pub fn extend(&mut self, other: LoaderArgs) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for LoaderArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut args = LoaderArgs::new();
        for (key, value) in iter {
            args.insert(key, value);
        }
        args
    }
}
