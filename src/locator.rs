//! Splits a request path into a resource name and an optional identifier typed by shape.

use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;

/// Primary-key value taken from a path segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identifier {
    Integer(i64),
    /// Canonical 8-4-4-4-12 hex text, as written in the path.
    Uuid(String),
}

impl Identifier {
    pub fn to_value(&self) -> Value {
        match self {
            Identifier::Integer(n) => Value::Number((*n).into()),
            Identifier::Uuid(s) => Value::String(s.clone()),
        }
    }

    /// Identifier for a primary-key value already held in a field map.
    pub fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => n.as_i64().map(Identifier::Integer),
            Value::String(s) => match_identifier(s),
            _ => None,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Integer(n) => write!(f, "{}", n),
            Identifier::Uuid(s) => f.write_str(s),
        }
    }
}

type Matcher = (Regex, fn(&str) -> Option<Identifier>);

/// Shape matchers in priority order: integer first, then UUID.
fn matchers() -> &'static [Matcher] {
    static MATCHERS: OnceLock<Vec<Matcher>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        let shapes: [(&str, fn(&str) -> Option<Identifier>); 2] = [
            (r"^[0-9]+$", |s| s.parse::<i64>().ok().map(Identifier::Integer)),
            (
                r"^[0-9a-fA-F]{8}-(?:[0-9a-fA-F]{4}-){3}[0-9a-fA-F]{12}$",
                |s| Some(Identifier::Uuid(s.to_string())),
            ),
        ];
        shapes
            .into_iter()
            .filter_map(|(pattern, make)| Regex::new(pattern).ok().map(|re| (re, make)))
            .collect()
    })
}

fn match_identifier(segment: &str) -> Option<Identifier> {
    matchers()
        .iter()
        .find(|(re, _)| re.is_match(segment))
        .and_then(|(_, make)| make(segment))
}

fn is_placeholder(segment: &str) -> bool {
    segment.starts_with('{') && segment.ends_with('}')
}

/// Parsed `(resource, identifier)` pair for a path such as `/stocks/1/product`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceLocator {
    resource: String,
    identifier: Option<Identifier>,
}

impl ResourceLocator {
    pub fn parse(path: &str) -> Self {
        let segments: Vec<&str> = path
            .split('/')
            .filter(|s| !s.is_empty() && !is_placeholder(s))
            .collect();

        let found = segments
            .iter()
            .rev()
            .find_map(|s| match_identifier(s).map(|id| (*s, id)));

        let resource = match &found {
            Some((text, _)) => segments
                .iter()
                .filter(|s| *s != text)
                .copied()
                .collect::<Vec<_>>()
                .join("."),
            None => segments.join("."),
        };

        ResourceLocator {
            resource,
            identifier: found.map(|(_, id)| id),
        }
    }

    /// Resource name: one segment verbatim, several dot-joined.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// `None` means a collection request.
    pub fn identifier(&self) -> Option<&Identifier> {
        self.identifier.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_path_has_no_identifier() {
        let loc = ResourceLocator::parse("/stocks");
        assert_eq!(loc.resource(), "stocks");
        assert_eq!(loc.identifier(), None);

        let loc = ResourceLocator::parse("/shop/stocks/");
        assert_eq!(loc.resource(), "shop.stocks");
        assert_eq!(loc.identifier(), None);
    }

    #[test]
    fn trailing_integer_is_identifier() {
        let loc = ResourceLocator::parse("/stocks/42");
        assert_eq!(loc.resource(), "stocks");
        assert_eq!(loc.identifier(), Some(&Identifier::Integer(42)));
    }

    #[test]
    fn uuid_segment_is_identifier() {
        let id = "3f2504e0-4f89-11d3-9a0c-0305e82c3301";
        let loc = ResourceLocator::parse(&format!("/users/{}", id));
        assert_eq!(loc.resource(), "users");
        assert_eq!(loc.identifier(), Some(&Identifier::Uuid(id.to_string())));
        assert_eq!(loc.identifier().unwrap().to_string(), id);
    }

    #[test]
    fn nested_path_joins_remaining_segments() {
        let loc = ResourceLocator::parse("/stocks/1/product");
        assert_eq!(loc.resource(), "stocks.product");
        assert_eq!(loc.identifier(), Some(&Identifier::Integer(1)));
    }

    #[test]
    fn identifier_text_never_counted_twice() {
        let loc = ResourceLocator::parse("/7/stocks/7");
        assert_eq!(loc.resource(), "stocks");
        assert_eq!(loc.identifier(), Some(&Identifier::Integer(7)));
    }

    #[test]
    fn placeholders_and_non_canonical_shapes_are_ignored() {
        let loc = ResourceLocator::parse("/stocks/{id}");
        assert_eq!(loc.resource(), "stocks");
        assert_eq!(loc.identifier(), None);

        let loc = ResourceLocator::parse("/stocks/12a");
        assert_eq!(loc.resource(), "stocks.12a");
        assert_eq!(loc.identifier(), None);

        let loc = ResourceLocator::parse("/users/3f2504e04f8911d39a0c0305e82c3301");
        assert_eq!(loc.identifier(), None);
    }

    #[test]
    fn integer_overflow_is_not_an_identifier() {
        let loc = ResourceLocator::parse("/stocks/99999999999999999999999");
        assert_eq!(loc.identifier(), None);
    }

    #[test]
    fn identifier_to_value() {
        assert_eq!(Identifier::Integer(3).to_value(), serde_json::json!(3));
        assert_eq!(Identifier::from_value(&serde_json::json!(5)), Some(Identifier::Integer(5)));
        assert_eq!(Identifier::from_value(&serde_json::json!(true)), None);
    }
}
