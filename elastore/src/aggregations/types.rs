//! Aggregation functions and decoded results

use crate::entity::Timestamp;
use crate::error::Error;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggFunc {
    Sum,
    Avg,
    Min,
    Max,
    /// Approximate distinct count for scalar aggregations, document count per bucket
    Count,
}

impl AggFunc {
    /// Also the sub-aggregation key used under buckets
    pub fn as_str(&self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Avg => "avg",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Count => "count",
        }
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggFunc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(AggFunc::Sum),
            "avg" => Ok(AggFunc::Avg),
            "min" => Ok(AggFunc::Min),
            "max" => Ok(AggFunc::Max),
            "count" => Ok(AggFunc::Count),
            _ => Err(Error::UnsupportedFunction(s.to_string())),
        }
    }
}

/// Document count and computed value of one bucket
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DataPoint {
    pub count: i64,
    pub value: f64,
}

impl DataPoint {
    pub fn new(count: i64, value: f64) -> Self {
        Self { count, value }
    }
}

/// Bucket key of a terms aggregation
#[derive(Debug, Clone)]
pub enum GroupKey {
    Str(String),
    Int(i64),
    Float(f64),
}

impl GroupKey {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            GroupKey::Str(s) => Some(s),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            GroupKey::Str(_) => 0,
            GroupKey::Int(_) => 1,
            GroupKey::Float(_) => 2,
        }
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            GroupKey::Str(s) => s.hash(state),
            GroupKey::Int(i) => i.hash(state),
            GroupKey::Float(f) => f.to_bits().hash(state),
        }
    }
}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (GroupKey::Str(a), GroupKey::Str(b)) => a.cmp(b),
            (GroupKey::Int(a), GroupKey::Int(b)) => a.cmp(b),
            (GroupKey::Float(a), GroupKey::Float(b)) => a.total_cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Str(s) => f.write_str(s),
            GroupKey::Int(i) => write!(f, "{}", i),
            GroupKey::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for GroupKey {
    fn from(s: &str) -> Self {
        GroupKey::Str(s.to_string())
    }
}

impl From<String> for GroupKey {
    fn from(s: String) -> Self {
        GroupKey::Str(s)
    }
}

impl From<i64> for GroupKey {
    fn from(i: i64) -> Self {
        GroupKey::Int(i)
    }
}

impl From<f64> for GroupKey {
    fn from(f: f64) -> Self {
        GroupKey::Float(f)
    }
}

/// Per-group data points. `total` is the sum of the bucket values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedResult {
    pub groups: HashMap<GroupKey, DataPoint>,
    pub total: f64,
}

impl GroupedResult {
    /// Document count per group
    pub fn counts(&self) -> HashMap<GroupKey, i64> {
        self.groups.iter().map(|(k, p)| (k.clone(), p.count)).collect()
    }

    pub fn get(&self, key: impl Into<GroupKey>) -> Option<&DataPoint> {
        self.groups.get(&key.into())
    }
}

/// Data points keyed by bucket start. `total` is the sum of the bucket values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    pub buckets: BTreeMap<Timestamp, DataPoint>,
    pub total: f64,
}

/// Per-group data points for every time bucket
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries2D {
    pub buckets: BTreeMap<Timestamp, HashMap<GroupKey, DataPoint>>,
    pub total: f64,
}
