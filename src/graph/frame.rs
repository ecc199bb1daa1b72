//! Frames: the identifying attributes of a calling-context node.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single frame attribute value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrameValue {
    /// Integer attribute, such as a line number.
    Int(i64),
    /// String attribute, such as a function or file name.
    Str(String),
}

impl FrameValue {
    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FrameValue::Str(s) => Some(s),
            FrameValue::Int(_) => None,
        }
    }
}

impl fmt::Display for FrameValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameValue::Int(v) => write!(f, "{v}"),
            FrameValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FrameValue {
    fn from(value: i64) -> Self {
        FrameValue::Int(value)
    }
}

impl From<i32> for FrameValue {
    fn from(value: i32) -> Self {
        FrameValue::Int(i64::from(value))
    }
}

impl From<&str> for FrameValue {
    fn from(value: &str) -> Self {
        FrameValue::Str(value.to_owned())
    }
}

impl From<String> for FrameValue {
    fn from(value: String) -> Self {
        FrameValue::Str(value)
    }
}

/// Identifying attributes of a node (function name, file, line, type, ...).
///
/// Frames are totally ordered and hashable so they can break ties when
/// ordering nodes and act as keys in caller-side lookups.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frame {
    attrs: BTreeMap<String, FrameValue>,
}

impl Frame {
    /// Creates an empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a frame carrying only a `name` attribute.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new().with("name", name.into())
    }

    /// Adds (or replaces) an attribute and returns the frame.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FrameValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Looks up an attribute.
    pub fn get(&self, key: &str) -> Option<&FrameValue> {
        self.attrs.get(key)
    }

    /// The `name` attribute when it is a string.
    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(FrameValue::as_str)
    }

    /// Iterates attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FrameValue)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Whether the frame has no attributes.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Frame
where
    K: Into<String>,
    V: Into<FrameValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            attrs: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name() {
            return f.write_str(name);
        }
        f.write_str("{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        f.write_str("}")
    }
}
