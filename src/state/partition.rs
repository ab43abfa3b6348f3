use std::fmt;
use std::str::FromStr;

/// A crawl-scoped namespace isolating cache and progress state
///
/// In the catalog this is a release year, but nothing below the crawl
/// controller relies on that: the value is only ever used as an opaque key
/// and as a directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Partition(String);

impl Partition {
    /// Creates a partition from an arbitrary key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Creates a year partition
    pub fn year(year: i32) -> Self {
        Self(year.to_string())
    }

    /// Returns the partition key
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the year this partition stands for, if it is one
    pub fn as_year(&self) -> Option<i32> {
        self.0.parse().ok()
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identifier of a catalog item (the number in `/film/<id>/`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub i64);

impl ItemId {
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ItemId)
    }
}

impl From<i64> for ItemId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}
