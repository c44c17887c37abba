//! Measurement sources of a query's `FROM` clause.

use std::fmt::{self, Display, Formatter, Write};

use regex::Regex;

/// The name part of a [`Measurement`], either a concrete name or a regular
/// expression matched against the measurement names of a shard.
#[derive(Debug, Clone)]
pub enum MeasurementName {
    Name(String),
    Regex(Regex),
}

impl MeasurementName {
    /// Returns true if the name is a regular expression that needs expanding.
    pub fn is_regex(&self) -> bool {
        matches!(self, Self::Regex(_))
    }

    /// Returns the concrete name, or `None` for a regular expression.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Regex(_) => None,
        }
    }
}

impl PartialEq for MeasurementName {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Name(a), Self::Name(b)) => a == b,
            (Self::Regex(a), Self::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl Eq for MeasurementName {}

impl Display for MeasurementName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write_identifier(f, name),
            Self::Regex(re) => {
                f.write_char('/')?;
                for c in re.as_str().chars() {
                    if c == '/' {
                        f.write_str("\\/")?;
                    } else {
                        f.write_char(c)?;
                    }
                }
                f.write_char('/')
            }
        }
    }
}

/// A measurement source, optionally qualified by database and retention
/// policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    pub database: Option<String>,
    pub retention_policy: Option<String>,
    pub name: MeasurementName,
}

impl Measurement {
    /// An unqualified measurement with a concrete name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            database: None,
            retention_policy: None,
            name: MeasurementName::Name(name.into()),
        }
    }

    /// An unqualified measurement matching `re`.
    pub fn regex(re: Regex) -> Self {
        Self {
            database: None,
            retention_policy: None,
            name: MeasurementName::Regex(re),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_retention_policy(mut self, retention_policy: impl Into<String>) -> Self {
        self.retention_policy = Some(retention_policy.into());
        self
    }

    /// Copy of this measurement's qualifiers with a concrete `name`.
    ///
    /// Used when expanding a regular expression source into the measurements
    /// it matches.
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            database: self.database.clone(),
            retention_policy: self.retention_policy.clone(),
            name: MeasurementName::Name(name.into()),
        }
    }
}

impl Display for Measurement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match (&self.database, &self.retention_policy) {
            (None, None) => write!(f, "{}", self.name),
            (Some(db), None) => {
                write_identifier(f, db)?;
                write!(f, "..{}", self.name)
            }
            (None, Some(rp)) => {
                write_identifier(f, rp)?;
                write!(f, ".{}", self.name)
            }
            (Some(db), Some(rp)) => {
                write_identifier(f, db)?;
                f.write_char('.')?;
                write_identifier(f, rp)?;
                write!(f, ".{}", self.name)
            }
        }
    }
}

/// The ordered list of measurements named by a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sources(Vec<Measurement>);

impl Sources {
    pub fn new(sources: impl IntoIterator<Item = Measurement>) -> Self {
        Self(sources.into_iter().collect())
    }

    /// Concrete measurement names referenced by these sources, in order.
    ///
    /// Regular expression sources are skipped; expand them first.
    pub fn names(&self) -> Vec<String> {
        self.0
            .iter()
            .filter_map(|m| m.name.as_name())
            .map(ToString::to_string)
            .collect()
    }

    /// Returns true if any source is a regular expression.
    pub fn has_regex(&self) -> bool {
        self.0.iter().any(|m| m.name.is_regex())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Measurement> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Measurement> for Sources {
    fn from_iter<T: IntoIterator<Item = Measurement>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl IntoIterator for Sources {
    type Item = Measurement;
    type IntoIter = std::vec::IntoIter<Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Sources {
    type Item = &'a Measurement;
    type IntoIter = std::slice::Iter<'a, Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Display for Sources {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, m) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{m}")?;
        }
        Ok(())
    }
}

fn is_unquoted_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Write `s` as an InfluxQL identifier, double quoting it when required.
fn write_identifier(f: &mut Formatter<'_>, s: &str) -> fmt::Result {
    if is_unquoted_identifier(s) {
        return f.write_str(s);
    }
    f.write_char('"')?;
    for c in s.chars() {
        match c {
            '\n' => f.write_str("\\n")?,
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_display() {
        assert_eq!(Measurement::new("cpu").to_string(), "cpu");
        assert_eq!(
            Measurement::new("cpu").with_database("telegraf").to_string(),
            "telegraf..cpu"
        );
        assert_eq!(
            Measurement::new("cpu")
                .with_retention_policy("autogen")
                .to_string(),
            "autogen.cpu"
        );
        assert_eq!(
            Measurement::new("cpu")
                .with_database("telegraf")
                .with_retention_policy("autogen")
                .to_string(),
            "telegraf.autogen.cpu"
        );
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(Measurement::new("disk io").to_string(), r#""disk io""#);
        assert_eq!(Measurement::new("1cpu").to_string(), r#""1cpu""#);
        assert_eq!(Measurement::new(r#"a"b"#).to_string(), r#""a\"b""#);
        assert_eq!(Measurement::new("_cpu_0").to_string(), "_cpu_0");
    }

    #[test]
    fn test_regex_display() {
        let m = Measurement::regex(Regex::new("^cpu/.*").unwrap()).with_database("db0");
        assert_eq!(m.to_string(), r"db0../^cpu\/.*/");
    }

    #[test]
    fn test_sources_names_skip_regex() {
        let sources = Sources::new([
            Measurement::new("cpu"),
            Measurement::regex(Regex::new("^disk").unwrap()),
            Measurement::new("mem"),
        ]);
        assert_eq!(sources.names(), vec!["cpu", "mem"]);
        assert!(sources.has_regex());
        assert_eq!(sources.to_string(), "cpu, /^disk/, mem");
    }

    #[test]
    fn test_with_name_keeps_qualifiers() {
        let re = Measurement::regex(Regex::new(".*").unwrap())
            .with_database("db")
            .with_retention_policy("rp");
        let m = re.with_name("cpu");
        assert_eq!(m, Measurement::new("cpu").with_database("db").with_retention_policy("rp"));
    }
}
