//! Query filters translated to query-string parameters.
//!
//! ```
//! use backslash_core::filter::{field, Filter};
//!
//! let mut url = url::Url::parse("http://localhost/rest/tests").unwrap();
//! Filter::from(field("duration").ge(1).le(2))
//!     .field_eq("status", "FAILURE")
//!     .apply(&mut url);
//! assert_eq!(
//!     url.query(),
//!     Some("duration=ge%3A1&duration=le%3A2&status=FAILURE")
//! );
//! ```

use std::fmt::Display;
use url::Url;

/// Comparison operator understood by collection endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Chained comparisons on a single field. Each comparison becomes one
/// `field=op:value` parameter, so `field("x").ge(1).le(2)` is a closed range.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    name: String,
    comparisons: Vec<(Operator, String)>,
}

pub fn field(name: impl Into<String>) -> FieldFilter {
    FieldFilter {
        name: name.into(),
        comparisons: Vec::new(),
    }
}

#[allow(clippy::should_implement_trait)]
impl FieldFilter {
    pub fn compare(mut self, operator: Operator, value: impl Display) -> FieldFilter {
        self.comparisons.push((operator, value.to_string()));
        self
    }

    pub fn eq(self, value: impl Display) -> FieldFilter {
        self.compare(Operator::Eq, value)
    }

    pub fn ne(self, value: impl Display) -> FieldFilter {
        self.compare(Operator::Ne, value)
    }

    pub fn lt(self, value: impl Display) -> FieldFilter {
        self.compare(Operator::Lt, value)
    }

    pub fn le(self, value: impl Display) -> FieldFilter {
        self.compare(Operator::Le, value)
    }

    pub fn gt(self, value: impl Display) -> FieldFilter {
        self.compare(Operator::Gt, value)
    }

    pub fn ge(self, value: impl Display) -> FieldFilter {
        self.compare(Operator::Ge, value)
    }

    fn apply(&self, url: &mut Url) {
        if self.comparisons.is_empty() {
            return;
        }
        let mut pairs = url.query_pairs_mut();
        for (operator, value) in &self.comparisons {
            pairs.append_pair(&self.name, &format!("{operator}:{value}"));
        }
    }
}

/// A set of predicates and plain `field=value` equalities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<FieldFilter>,
    fields: Vec<(String, String)>,
}

impl Filter {
    pub fn new() -> Filter {
        Filter::default()
    }

    pub fn predicate(mut self, predicate: FieldFilter) -> Filter {
        self.predicates.push(predicate);
        self
    }

    pub fn field_eq(mut self, name: impl Into<String>, value: impl Display) -> Filter {
        self.fields.push((name.into(), value.to_string()));
        self
    }

    /// Appends the filter to the query string of `url`. Predicates go first.
    pub fn apply(&self, url: &mut Url) {
        for predicate in &self.predicates {
            predicate.apply(url);
        }
        if !self.fields.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.fields);
        }
    }
}

impl From<FieldFilter> for Filter {
    fn from(predicate: FieldFilter) -> Filter {
        Filter::new().predicate(predicate)
    }
}
