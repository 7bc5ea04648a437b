use std::fmt;

use serde::Serialize;

/// A namespaced symbol path such as `core::length` or `app::main`.
///
/// Paths are compared element-wise; the last element is the symbol's own
/// name and everything before it is the module it lives in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Path {
    elements: Vec<String>,
}

impl Path {
    pub fn new(elements: Vec<String>) -> Self {
        Path { elements }
    }

    /// Parse a `::`-separated path. Empty segments are dropped.
    pub fn parse(text: &str) -> Self {
        Path {
            elements: text
                .split("::")
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn single(name: impl Into<String>) -> Self {
        Path {
            elements: vec![name.into()],
        }
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The last element, or `""` for an empty path.
    pub fn name(&self) -> &str {
        self.elements.last().map(String::as_str).unwrap_or("")
    }

    /// Everything but the last element.
    pub fn module(&self) -> Path {
        let end = self.elements.len().saturating_sub(1);
        Path {
            elements: self.elements[..end].to_vec(),
        }
    }

    /// `self::other`.
    pub fn join(&self, other: &Path) -> Path {
        let mut elements = self.elements.clone();
        elements.extend(other.elements.iter().cloned());
        Path { elements }
    }

    /// The single name of a one-element path.
    pub fn as_local(&self) -> Option<&str> {
        match self.elements.as_slice() {
            [name] => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.elements.join("::"))
    }
}
