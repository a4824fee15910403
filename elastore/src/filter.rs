//! Filter expressions
//!
//! ```
//! use elastore::filter::field;
//!
//! let red = field("color").eq("red");
//! let heavy = field("weight").gte(80).when(false); // inactive, dropped before compilation
//! assert!(red.is_active());
//! assert!(!heavy.is_active());
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neq,
    Like,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Between,
    Contains,
}

impl Operator {
    pub const ALL: [Operator; 11] = [
        Operator::Eq,
        Operator::Neq,
        Operator::Like,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::In,
        Operator::NotIn,
        Operator::Between,
        Operator::Contains,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Like => "like",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Between => "between",
            Operator::Contains => "contains",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which clause a `Like` filter contributes to. Earlier releases disagreed
/// on this, so it is configurable; `Include` places it with the positive
/// predicates, `Exclude` routes it to `must_not`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikePolarity {
    #[default]
    Include,
    Exclude,
}

/// A single predicate on one field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    field: String,
    operator: Operator,
    values: Vec<Value>,
    active: bool,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: Operator, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            values,
            active: true,
        }
    }

    /// Keep the filter only when `active` is true
    pub fn when(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }

    /// Nested document path: the field name before its first `.`
    pub fn nested_path(&self) -> Option<&str> {
        self.field.split_once('.').map(|(path, _)| path)
    }

    /// The value at `idx` as a float. `Ok(None)` when there is no such value.
    pub fn number_at(&self, idx: usize) -> Result<Option<f64>> {
        match self.values.get(idx) {
            None => Ok(None),
            Some(value) => to_f64(value).map(Some).ok_or_else(|| Error::Conversion {
                field: self.field.clone(),
                value: value.to_string(),
            }),
        }
    }
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Start a filter on `name`
pub fn field(name: impl Into<String>) -> FieldRef {
    FieldRef(name.into())
}

/// Field half of a filter; each method picks the operator
#[derive(Debug, Clone)]
pub struct FieldRef(String);

impl FieldRef {
    fn single(self, operator: Operator, value: impl Into<Value>) -> Filter {
        Filter::new(self.0, operator, vec![value.into()])
    }

    fn many<I, V>(self, operator: Operator, values: I) -> Filter
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::new(self.0, operator, values.into_iter().map(Into::into).collect())
    }

    pub fn eq(self, value: impl Into<Value>) -> Filter {
        self.single(Operator::Eq, value)
    }

    pub fn neq(self, value: impl Into<Value>) -> Filter {
        self.single(Operator::Neq, value)
    }

    pub fn like(self, pattern: impl Into<String>) -> Filter {
        self.single(Operator::Like, pattern.into())
    }

    pub fn gt(self, value: impl Into<Value>) -> Filter {
        self.single(Operator::Gt, value)
    }

    pub fn gte(self, value: impl Into<Value>) -> Filter {
        self.single(Operator::Gte, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Filter {
        self.single(Operator::Lt, value)
    }

    pub fn lte(self, value: impl Into<Value>) -> Filter {
        self.single(Operator::Lte, value)
    }

    pub fn is_in<I, V>(self, values: I) -> Filter
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.many(Operator::In, values)
    }

    pub fn not_in<I, V>(self, values: I) -> Filter
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.many(Operator::NotIn, values)
    }

    /// Closed range `[from, to]`
    pub fn between(self, from: impl Into<Value>, to: impl Into<Value>) -> Filter {
        Filter::new(self.0, Operator::Between, vec![from.into(), to.into()])
    }

    /// Open-ended range `[from, ..)`
    pub fn at_least(self, from: impl Into<Value>) -> Filter {
        self.single(Operator::Between, from)
    }

    pub fn contains(self, value: impl Into<Value>) -> Filter {
        self.single(Operator::Contains, value)
    }
}
