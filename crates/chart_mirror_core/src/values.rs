//! Value tree used as the rendering context.
//!
//! Chart values arrive as YAML and are converted into a closed [`Value`]
//! enum before rendering. [`normalize`] then replaces every null found
//! inside a map with an empty string so templates never print a missing
//! value marker.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// A node of the rendering context.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// Absent or explicit null.
    #[default]
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Integer(i64),
    /// Floating point scalar.
    Float(f64),
    /// String scalar.
    String(String),
    /// Ordered sequence.
    Sequence(Vec<Value>),
    /// Map with string keys.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Look up a dotted field path below this node.
    ///
    /// An empty path yields the node itself. Any segment that does not name
    /// a map entry yields `None`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chart_mirror_core::values::Value;
    ///
    /// let yaml: serde_yaml::Value = serde_yaml::from_str("image: {tag: '1.19'}").expect("yaml");
    /// let values = Value::from(yaml);
    /// assert_eq!(
    ///     values.lookup(&["image", "tag"]),
    ///     Some(&Value::String("1.19".to_owned()))
    /// );
    /// assert_eq!(values.lookup(&["image", "missing"]), None);
    /// ```
    #[must_use]
    pub fn lookup(&self, path: &[&str]) -> Option<&Self> {
        path.iter().try_fold(self, |node, segment| match node {
            Self::Map(map) => map.get(*segment),
            _ => None,
        })
    }

    /// Template truthiness: false, zero, empty and null are false.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(flag) => *flag,
            Self::Integer(number) => *number != 0,
            Self::Float(number) => *number != 0.0,
            Self::String(text) => !text.is_empty(),
            Self::Sequence(items) => !items.is_empty(),
            Self::Map(map) => !map.is_empty(),
        }
    }

    /// Name of the node's kind as it appears in template diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "nil",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "int",
            Self::Float(_) => "float64",
            Self::String(_) => "string",
            Self::Sequence(_) => "slice",
            Self::Map(_) => "map",
        }
    }

    /// Build a map node from `(key, value)` pairs.
    #[must_use]
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Self)>,
        K: Into<String>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::String(text.to_owned())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::String(text)
    }
}

impl From<serde_yaml::Value> for Value {
    fn from(value: serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Null => Self::Null,
            serde_yaml::Value::Bool(flag) => Self::Bool(flag),
            serde_yaml::Value::Number(number) => number
                .as_i64()
                .map(Self::Integer)
                .or_else(|| number.as_f64().map(Self::Float))
                .unwrap_or_else(|| Self::String(number.to_string())),
            serde_yaml::Value::String(text) => Self::String(text),
            serde_yaml::Value::Sequence(items) => {
                Self::Sequence(items.into_iter().map(Self::from).collect())
            }
            serde_yaml::Value::Mapping(mapping) => Self::Map(
                mapping
                    .into_iter()
                    .map(|(key, value)| (key_text(key), Self::from(value)))
                    .collect(),
            ),
            serde_yaml::Value::Tagged(tagged) => Self::from(tagged.value),
        }
    }
}

fn key_text(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(text) => text,
        other => Value::from(other).to_string(),
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(flag) => serializer.serialize_bool(*flag),
            Self::Integer(number) => serializer.serialize_i64(*number),
            Self::Float(number) => serializer.serialize_f64(*number),
            Self::String(text) => serializer.serialize_str(text),
            Self::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(map) => {
                let mut entries = serializer.serialize_map(Some(map.len()))?;
                for (key, item) in map {
                    entries.serialize_entry(key, item)?;
                }
                entries.end()
            }
        }
    }
}

/// Formats the way template output prints values: scalars bare,
/// sequences as `[a b]`, maps as `map[k:v]`, null as the empty string.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Integer(number) => write!(f, "{number}"),
            Self::Float(number) => write!(f, "{number}"),
            Self::String(text) => f.write_str(text),
            Self::Sequence(items) => {
                f.write_str("[")?;
                for (position, item) in items.iter().enumerate() {
                    if position > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("map[")?;
                for (position, (key, item)) in map.iter().enumerate() {
                    if position > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{key}:{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Replace nulls inside maps with empty strings, recursing into nested maps.
///
/// Sequences are left untouched, as is a top-level scalar.
#[must_use]
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Map(map) => Value::Map(
            map.into_iter()
                .map(|(key, item)| {
                    let item = match item {
                        Value::Null => Value::String(String::new()),
                        nested @ Value::Map(_) => normalize(nested),
                        other => other,
                    };
                    (key, item)
                })
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(yaml: &str) -> Value {
        let raw: serde_yaml::Value = serde_yaml::from_str(yaml).expect("valid yaml");
        Value::from(raw)
    }

    #[test]
    fn normalize_replaces_nested_nulls() {
        let values = normalize(parse("a: ~\nb:\n  c: null\n  d: kept\n"));
        assert_eq!(values.lookup(&["a"]), Some(&Value::from("")));
        assert_eq!(values.lookup(&["b", "c"]), Some(&Value::from("")));
        assert_eq!(values.lookup(&["b", "d"]), Some(&Value::from("kept")));
    }

    #[test]
    fn normalize_leaves_sequences_alone() {
        let values = normalize(parse("list: [~, {x: ~}]\n"));
        assert_eq!(
            values.lookup(&["list"]),
            Some(&Value::Sequence(vec![
                Value::Null,
                Value::map([("x", Value::Null)]),
            ]))
        );
    }

    #[test]
    fn normalize_keeps_top_level_null() {
        assert_eq!(normalize(Value::Null), Value::Null);
    }

    #[rstest]
    #[case("x: 3", "3")]
    #[case("x: 1.5", "1.5")]
    #[case("x: true", "true")]
    #[case("x: [a, b]", "[a b]")]
    #[case("x: {k: v, n: 1}", "map[k:v n:1]")]
    #[case("x: ~", "")]
    fn display_matches_template_output(#[case] yaml: &str, #[case] expected: &str) {
        let values = parse(yaml);
        let node = values.lookup(&["x"]).expect("x present");
        assert_eq!(node.to_string(), expected);
    }

    #[rstest]
    #[case("x: 0", false)]
    #[case("x: ''", false)]
    #[case("x: []", false)]
    #[case("x: false", false)]
    #[case("x: ~", false)]
    #[case("x: 0.5", true)]
    #[case("x: text", true)]
    #[case("x: {a: 1}", true)]
    fn truthiness(#[case] yaml: &str, #[case] expected: bool) {
        let values = parse(yaml);
        let node = values.lookup(&["x"]).expect("x present");
        assert_eq!(node.is_truthy(), expected);
    }

    #[test]
    fn non_string_keys_become_text() {
        let values = parse("1: one\ntrue: yes\n");
        assert_eq!(values.lookup(&["1"]), Some(&Value::from("one")));
        assert!(values.lookup(&["true"]).is_some());
    }

    #[test]
    fn serializes_as_yaml_in_key_order() {
        let values = parse("b: [1, two]\na: {c: true, d: ~}\n");
        let yaml = serde_yaml::to_string(&values).expect("serialize");
        assert_eq!(yaml, "a:\n  c: true\n  d: null\nb:\n- 1\n- two\n");
    }

    #[test]
    fn lookup_through_scalar_fails() {
        let values = parse("a: text");
        assert_eq!(values.lookup(&["a", "b"]), None);
        assert_eq!(values.lookup(&[]), Some(&values));
    }
}
