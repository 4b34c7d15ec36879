//! Watch paths.
//!
//! A path is a dot-delimited chain of property names, e.g.
//! `"user.address.city"`. Only letters and digits (any script), `_`, `$`
//! and `.` are allowed; anything else (brackets, spaces, operators) is
//! rejected.

use std::fmt;
use std::str::FromStr;

use super::Value;
use crate::error::{ReactiveError, Result};

/// A parsed watch path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// Parse a dot-delimited path.
    pub fn parse(path: &str) -> Result<Self> {
        let valid = path
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '.' | '\u{b7}'));
        if !valid {
            return Err(ReactiveError::InvalidPath(path.to_string()));
        }
        Ok(Self {
            segments: path.split('.').map(str::to_string).collect(),
        })
    }

    /// The property names, in access order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Read the path below `root`, recording every property read.
    ///
    /// Array segments are indices, or `length`. Anything unreachable reads
    /// as [`Value::Undefined`].
    pub fn resolve(&self, root: &Value) -> Value {
        let mut current = root.clone();
        for segment in &self.segments {
            current = match &current {
                Value::Object(object) => object.get(segment),
                Value::Array(array) if segment == "length" => Value::from(array.len()),
                Value::Array(array) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| array.get(index))
                    .unwrap_or_default(),
                _ => return Value::Undefined,
            };
        }
        current
    }
}

impl FromStr for Path {
    type Err = ReactiveError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Computation, Mode};

    #[test]
    fn parses_dot_paths() {
        let path = Path::parse("user.$meta.first_name").unwrap();
        assert_eq!(path.segments(), ["user", "$meta", "first_name"]);
        assert_eq!(path.to_string(), "user.$meta.first_name");
    }

    #[test]
    fn accepts_non_ascii_letters() {
        let path = Path::parse("données.prénom·x").unwrap();
        assert_eq!(path.segments(), ["données", "prénom·x"]);

        let root = Value::object([("données", Value::object([("x", Value::from(1))]))]);
        assert_eq!(Path::parse("données.x").unwrap().resolve(&root), Value::from(1));
    }

    #[test]
    fn rejects_non_path_expressions() {
        for bad in ["a[0]", "a + b", "fn()", "a-b", "a b"] {
            assert!(matches!(Path::parse(bad), Err(ReactiveError::InvalidPath(_))), "{bad}");
        }
    }

    #[test]
    fn resolves_objects_and_arrays() {
        let root = Value::object([
            ("user", Value::object([("name", Value::from("ada"))])),
            ("tags", Value::array(vec![Value::from("a"), Value::from("b")])),
        ]);

        assert_eq!(Path::parse("user.name").unwrap().resolve(&root), Value::from("ada"));
        assert_eq!(Path::parse("tags.1").unwrap().resolve(&root), Value::from("b"));
        assert_eq!(Path::parse("tags.length").unwrap().resolve(&root), Value::from(2));
        assert_eq!(Path::parse("user.name.first").unwrap().resolve(&root), Value::Undefined);
        assert_eq!(Path::parse("missing.deeper").unwrap().resolve(&root), Value::Undefined);
    }

    #[test]
    fn invalid_path_computation_yields_undefined() {
        let root = Value::object([("a", Value::from(1))]);
        let computation = Computation::path_builder(root, "a[0]")
            .mode(Mode::user())
            .build()
            .unwrap();

        assert_eq!(computation.value(), Some(Value::Undefined));
        assert_eq!(computation.dependency_count(), 0);
    }

    #[test]
    fn path_computation_tracks_every_hop() {
        let inner = Value::object([("b", Value::from(1))]);
        let root = Value::object([("a", inner.clone())]);
        let computation = Computation::path_builder(root.clone(), "a.b")
            .mode(Mode::render().immediate())
            .build()
            .unwrap();

        // Swap the intermediate object
        let replacement = Value::object([("b", Value::from(2))]);
        root.as_object().unwrap().set("a", replacement.clone()).unwrap();
        assert_eq!(computation.value(), Some(Value::from(2)));

        // The old intermediate is no longer a dependency
        inner.as_object().unwrap().set("b", Value::from(99)).unwrap();
        assert_eq!(computation.value(), Some(Value::from(2)));

        replacement.as_object().unwrap().set("b", Value::from(3)).unwrap();
        assert_eq!(computation.value(), Some(Value::from(3)));
    }
}
