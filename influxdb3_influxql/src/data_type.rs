use std::fmt::Display;

/// The kind of value stored in a field.
///
/// Variants are declared in rank order: when two shards disagree on the type
/// of a field, the variant that sorts first is the one a query sees. The
/// [`DataType::Unknown`] sentinel never takes part in that comparison.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataType {
    #[default]
    Unknown,
    Float,
    Integer,
    String,
    Boolean,
    Time,
    Duration,
}

impl DataType {
    /// Returns true for the [`DataType::Unknown`] sentinel.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Ordinal rank of this type. Lower ranks win schema conflicts.
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Float => "float",
            Self::Integer => "integer",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Time => "time",
            Self::Duration => "duration",
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
