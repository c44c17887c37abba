use std::collections::BTreeMap;

use crate::DataType;

/// Tag key/value pairs of a series, ordered by key.
pub type Tags = BTreeMap<String, String>;

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    String(String),
    Boolean(bool),
}

impl FieldValue {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Float(_) => DataType::Float,
            Self::Integer(_) => DataType::Integer,
            Self::String(_) => DataType::String,
            Self::Boolean(_) => DataType::Boolean,
        }
    }
}

/// A timestamped value produced by a [`PointIterator`](crate::PointIterator).
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Measurement name.
    pub name: String,
    /// Grouping tags of the series the point belongs to.
    pub tags: Tags,
    /// Nanoseconds since the epoch.
    pub time: i64,
    pub value: FieldValue,
}

impl Point {
    pub fn new(name: impl Into<String>, tags: Tags, time: i64, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            tags,
            time,
            value,
        }
    }
}
