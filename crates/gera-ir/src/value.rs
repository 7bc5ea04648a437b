//! Compile-time values and the static-value table.

use std::fmt;

use serde::Serialize;

/// Index into [`StaticValues`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StaticId(pub usize);

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum StaticValue {
    Unit,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<StaticValue>),
    Object(Vec<(String, StaticValue)>),
    Variant { name: String, value: Box<StaticValue> },
}

impl StaticValue {
    /// Values without mutable storage anywhere inside them. Only these may
    /// be shared between use sites.
    pub fn is_immutable(&self) -> bool {
        match self {
            StaticValue::Unit
            | StaticValue::Boolean(_)
            | StaticValue::Integer(_)
            | StaticValue::Float(_)
            | StaticValue::String(_) => true,
            StaticValue::Variant { value, .. } => value.is_immutable(),
            StaticValue::Array(_) | StaticValue::Object(_) => false,
        }
    }

    /// This value plus every value nested inside it.
    pub fn count(&self) -> usize {
        1 + match self {
            StaticValue::Array(values) => values.iter().map(StaticValue::count).sum(),
            StaticValue::Object(members) => members.iter().map(|(_, value)| value.count()).sum(),
            StaticValue::Variant { value, .. } => value.count(),
            _ => 0,
        }
    }
}

impl fmt::Display for StaticValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaticValue::Unit => write!(f, "unit"),
            StaticValue::Boolean(b) => write!(f, "{}", b),
            StaticValue::Integer(i) => write!(f, "{}", i),
            StaticValue::Float(x) => write!(f, "{:?}", x),
            StaticValue::String(s) => write!(f, "{:?}", s),
            StaticValue::Array(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
            StaticValue::Object(members) => {
                write!(f, "{{ ")?;
                for (i, (name, value)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", name, value)?;
                }
                write!(f, " }}")
            }
            StaticValue::Variant { name, value } => write!(f, "#{} {}", name, value),
        }
    }
}

/// Every value hoisted out of the lowered bodies, referenced by index.
#[derive(Debug, Default, Serialize)]
pub struct StaticValues {
    values: Vec<StaticValue>,
}

impl StaticValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, reusing an equal immutable entry if there is one.
    pub fn add(&mut self, value: StaticValue) -> StaticId {
        if value.is_immutable() {
            if let Some(i) = self.values.iter().position(|existing| *existing == value) {
                return StaticId(i);
            }
        }
        self.values.push(value);
        StaticId(self.values.len() - 1)
    }

    pub fn get(&self, id: StaticId) -> &StaticValue {
        &self.values[id.0]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StaticId, &StaticValue)> {
        self.values.iter().enumerate().map(|(i, value)| (StaticId(i), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immutable_values_are_shared() {
        let mut table = StaticValues::new();
        let a = table.add(StaticValue::Integer(1));
        let b = table.add(StaticValue::Boolean(true));
        let c = table.add(StaticValue::Integer(1));
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn mutable_values_are_never_shared() {
        let mut table = StaticValues::new();
        let array = StaticValue::Array(vec![StaticValue::Integer(1)]);
        let a = table.add(array.clone());
        let b = table.add(array);
        assert_ne!(a, b);
        let boxed = StaticValue::Variant {
            name: "some".to_string(),
            value: Box::new(StaticValue::Object(vec![])),
        };
        assert!(!boxed.is_immutable());
    }

    #[test]
    fn count_includes_nested_values() {
        let value = StaticValue::Array(vec![
            StaticValue::Integer(1),
            StaticValue::Variant {
                name: "some".to_string(),
                value: Box::new(StaticValue::Unit),
            },
        ]);
        assert_eq!(value.count(), 4);
    }

    #[test]
    fn display() {
        let value = StaticValue::Object(vec![
            ("x".to_string(), StaticValue::Integer(1)),
            (
                "y".to_string(),
                StaticValue::Variant {
                    name: "some".to_string(),
                    value: Box::new(StaticValue::String("a".to_string())),
                },
            ),
        ]);
        assert_eq!(value.to_string(), r#"{ x = 1, y = #some "a" }"#);
    }
}
