//! Memento tables: named, typed bindings into a configuration value with a
//! textual `name=value,name=value` form.
//!
//! A table is built once per configuration type and reused. Each binding owns
//! an [`Accessor`] (a pair of plain function pointers into the target plus the
//! codec for its value kind) and the last canonical text of the value.
//!
//! ```
//! use pioneer_link::memento::{Accessor, MementoTable};
//!
//! #[derive(Default)]
//! struct Settings {
//!     count: i64,
//!     label: String,
//! }
//!
//! let mut table = MementoTable::<Settings>::new();
//! table.add("count", Accessor::integer(0, 100, |s: &Settings| s.count, |s: &mut Settings, v| s.count = v)).unwrap();
//! table.add("label", Accessor::text(|s: &Settings| s.label.clone(), |s: &mut Settings, v| s.label = v)).unwrap();
//!
//! let mut settings = Settings::default();
//! let report = table.fill(&mut settings, "count=5,label=hello");
//! assert!(report.is_clean());
//! assert_eq!(table.write_tuples(), "count=5,label=hello");
//! ```

use arrayvec::ArrayString;
use heapless::Vec;
use thiserror::Error;
use tracing::warn;

pub const MAX_MEMENTO_BINDINGS: usize = 32;
pub const MAX_NAME_LEN: usize = 32;

const TUPLE_SEPARATOR: char = ',';
const VALUE_SEPARATOR: char = '=';
const ESCAPE: char = '\\';

pub type BindingName = ArrayString<MAX_NAME_LEN>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MementoError {
    #[error("parameter '{0}' already exists")]
    DuplicateName(String),
    #[error("invalid parameter name '{0}'")]
    InvalidName(String),
    #[error("memento table is full")]
    TableFull,
    #[error("unknown parameter '{0}'")]
    UnknownName(String),
    #[error("malformed tuple '{0}'")]
    MalformedTuple(String),
    #[error("invalid value '{value}' for '{name}': {reason}")]
    BadValue {
        name: String,
        value: String,
        reason: &'static str,
    },
    #[error("value {value} for '{name}' outside [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: i64,
        min: i64,
        max: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Float,
    Text,
    Boolean,
    Enumerated,
}

/// Typed read/write access into `T`, tagged by value kind.
pub enum Accessor<T> {
    Integer {
        min: i64,
        max: i64,
        get: fn(&T) -> i64,
        set: fn(&mut T, i64),
    },
    Float {
        get: fn(&T) -> f64,
        set: fn(&mut T, f64),
    },
    Text {
        get: fn(&T) -> String,
        set: fn(&mut T, String),
    },
    Boolean {
        get: fn(&T) -> bool,
        set: fn(&mut T, bool),
    },
    Enumerated {
        labels: &'static [&'static str],
        get: fn(&T) -> usize,
        set: fn(&mut T, usize),
    },
}

impl<T> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Accessor<T> {}

impl<T> core::fmt::Debug for Accessor<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Accessor::Integer { min, max, .. } => write!(f, "Integer[{}, {}]", min, max),
            Accessor::Enumerated { labels, .. } => write!(f, "Enumerated{:?}", labels),
            other => write!(f, "{:?}", other.kind()),
        }
    }
}

impl<T> Accessor<T> {
    pub fn integer(min: i64, max: i64, get: fn(&T) -> i64, set: fn(&mut T, i64)) -> Self {
        Accessor::Integer { min, max, get, set }
    }

    pub fn float(get: fn(&T) -> f64, set: fn(&mut T, f64)) -> Self {
        Accessor::Float { get, set }
    }

    pub fn text(get: fn(&T) -> String, set: fn(&mut T, String)) -> Self {
        Accessor::Text { get, set }
    }

    pub fn boolean(get: fn(&T) -> bool, set: fn(&mut T, bool)) -> Self {
        Accessor::Boolean { get, set }
    }

    pub fn enumerated(labels: &'static [&'static str], get: fn(&T) -> usize, set: fn(&mut T, usize)) -> Self {
        Accessor::Enumerated { labels, get, set }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Accessor::Integer { .. } => ValueKind::Integer,
            Accessor::Float { .. } => ValueKind::Float,
            Accessor::Text { .. } => ValueKind::Text,
            Accessor::Boolean { .. } => ValueKind::Boolean,
            Accessor::Enumerated { .. } => ValueKind::Enumerated,
        }
    }

    /// Parses `raw`, stores it into `target` and returns the canonical text.
    /// `target` is untouched on error.
    fn cast(&self, target: &mut T, name: &str, raw: &str) -> Result<String, MementoError> {
        let bad_value = |reason| MementoError::BadValue {
            name: name.to_string(),
            value: raw.to_string(),
            reason,
        };

        match *self {
            Accessor::Integer { min, max, set, .. } => {
                let value: i64 = raw.trim().parse().map_err(|_| bad_value("expected an integer"))?;
                if value < min || value > max {
                    return Err(MementoError::OutOfRange {
                        name: name.to_string(),
                        value,
                        min,
                        max,
                    });
                }
                set(target, value);
                Ok(value.to_string())
            }
            Accessor::Float { set, .. } => {
                let value: f64 = raw.trim().parse().map_err(|_| bad_value("expected a number"))?;
                if !value.is_finite() {
                    return Err(bad_value("expected a finite number"));
                }
                set(target, value);
                Ok(format_float(value))
            }
            Accessor::Text { set, .. } => {
                set(target, raw.to_string());
                Ok(raw.to_string())
            }
            Accessor::Boolean { set, .. } => {
                let value = parse_bool(raw.trim()).ok_or_else(|| bad_value("expected true/false/1/0"))?;
                set(target, value);
                Ok(value.to_string())
            }
            Accessor::Enumerated { labels, set, .. } => {
                let trimmed = raw.trim();
                let index = labels
                    .iter()
                    .position(|label| *label == trimmed)
                    .ok_or_else(|| bad_value("not one of the allowed values"))?;
                set(target, index);
                Ok(trimmed.to_string())
            }
        }
    }

    fn uncast(&self, source: &T) -> String {
        match *self {
            Accessor::Integer { get, .. } => get(source).to_string(),
            Accessor::Float { get, .. } => format_float(get(source)),
            Accessor::Text { get, .. } => get(source),
            Accessor::Boolean { get, .. } => get(source).to_string(),
            Accessor::Enumerated { labels, get, .. } => labels.get(get(source)).copied().unwrap_or_default().to_string(),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    if raw == "1" || raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw == "0" || raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

// Rust's float Display is the shortest text that parses back to the same value.
fn format_float(value: f64) -> String {
    format!("{}", value)
}

#[derive(Debug)]
pub struct Binding<T> {
    name: BindingName,
    accessor: Accessor<T>,
    default: Option<String>,
    text: Option<String>,
}

impl<T> Binding<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.accessor.kind()
    }

    /// Canonical text of the value as last filled or uncast.
    pub fn value_text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn default_value(&mut self, value: &str) -> &mut Self {
        self.default = Some(value.to_string());
        self
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FillReport {
    pub applied: usize,
    pub failures: std::vec::Vec<MementoError>,
}

impl FillReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub struct MementoTable<T> {
    bindings: Vec<Binding<T>, MAX_MEMENTO_BINDINGS>,
}

impl<T> Default for MementoTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MementoTable<T> {
    pub fn new() -> Self {
        Self { bindings: Vec::new() }
    }

    /// Registers a binding. Names are unique within a table.
    pub fn add(&mut self, name: &str, accessor: Accessor<T>) -> Result<&mut Binding<T>, MementoError> {
        if name.is_empty() || name.contains(&[TUPLE_SEPARATOR, VALUE_SEPARATOR, ESCAPE][..]) || name.trim() != name {
            return Err(MementoError::InvalidName(name.to_string()));
        }
        if self.get(name).is_some() {
            return Err(MementoError::DuplicateName(name.to_string()));
        }

        let binding = Binding {
            name: BindingName::from(name).map_err(|_| MementoError::InvalidName(name.to_string()))?,
            accessor,
            default: None,
            text: None,
        };
        self.bindings.push(binding).map_err(|_| MementoError::TableFull)?;
        self.bindings.last_mut().ok_or(MementoError::TableFull)
    }

    pub fn get(&self, name: &str) -> Option<&Binding<T>> {
        self.bindings.iter().find(|binding| binding.name.as_str() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|binding| binding.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Applies every binding's default value to `target`.
    pub fn set_defaults(&mut self, target: &mut T) -> FillReport {
        let mut report = FillReport::default();
        for binding in self.bindings.iter_mut() {
            let Some(default) = binding.default.as_deref() else {
                continue;
            };
            match binding.accessor.cast(target, &binding.name, default) {
                Ok(text) => {
                    binding.text = Some(text);
                    report.applied += 1;
                }
                Err(e) => {
                    warn!("bad default: {}", e);
                    report.failures.push(e);
                }
            }
        }
        report
    }

    /// Best-effort fill from `name=value,...`. Unknown names and bad values
    /// are reported per entry; the remaining entries are still applied.
    pub fn fill(&mut self, target: &mut T, tuples: &str) -> FillReport {
        let mut report = FillReport::default();

        for entry in split_unescaped(tuples, TUPLE_SEPARATOR) {
            if entry.trim().is_empty() {
                continue;
            }

            let result = match split_once_unescaped(entry, VALUE_SEPARATOR) {
                Some((name, raw)) => self.apply(target, name.trim(), &unescape(raw)),
                None => Err(MementoError::MalformedTuple(entry.trim().to_string())),
            };

            match result {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    warn!("memento fill: {}", e);
                    report.failures.push(e);
                }
            }
        }

        report
    }

    fn apply(&mut self, target: &mut T, name: &str, raw: &str) -> Result<(), MementoError> {
        let binding = self
            .bindings
            .iter_mut()
            .find(|binding| binding.name.as_str() == name)
            .ok_or_else(|| MementoError::UnknownName(name.to_string()))?;

        let text = binding.accessor.cast(target, name, raw)?;
        binding.text = Some(text);
        Ok(())
    }

    /// Re-derives every binding's text from `source`, for values changed
    /// outside the table.
    pub fn uncast_all(&mut self, source: &T) {
        for binding in self.bindings.iter_mut() {
            binding.text = Some(binding.accessor.uncast(source));
        }
    }

    /// Serializes known values in insertion order.
    pub fn write_tuples(&self) -> String {
        let mut out = String::new();
        for binding in self.bindings.iter() {
            let Some(text) = binding.text.as_deref() else {
                continue;
            };
            if !out.is_empty() {
                out.push(TUPLE_SEPARATOR);
            }
            out.push_str(&binding.name);
            out.push(VALUE_SEPARATOR);
            escape_into(&mut out, text);
        }
        out
    }
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        if c == TUPLE_SEPARATOR || c == VALUE_SEPARATOR || c == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            // A trailing lone backslash is kept as-is.
            out.push(chars.next().unwrap_or(ESCAPE));
        } else {
            out.push(c);
        }
    }
    out
}

fn split_unescaped(input: &str, separator: char) -> std::vec::Vec<&str> {
    let mut parts = std::vec::Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if c == ESCAPE {
            escaped = true;
        } else if c == separator {
            parts.push(&input[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&input[start..]);
    parts
}

fn split_once_unescaped(input: &str, separator: char) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if c == ESCAPE {
            escaped = true;
        } else if c == separator {
            return Some((&input[..i], &input[i + c.len_utf8()..]));
        }
    }
    None
}
