use crate::{Expr, Tags};

/// A group of series that share the same values for the `GROUP BY` tags.
#[derive(Debug, Clone)]
pub struct TagSet {
    /// Grouping key, `k1=v1,k2=v2` over the grouping dimensions. Tag sets are
    /// ordered by this key.
    pub key: Vec<u8>,
    /// Values of the grouping dimensions.
    pub tags: Tags,
    /// Keys of the series that belong to this group.
    pub series_keys: Vec<String>,
    /// Residual predicate a shard applies when iterating the group.
    pub filter: Option<Expr>,
}

impl TagSet {
    /// Create an empty tag set for the grouping `tags`.
    pub fn new(tags: Tags) -> Self {
        Self {
            key: encode_key(&tags),
            tags,
            series_keys: vec![],
            filter: None,
        }
    }

    pub fn add_series(&mut self, series_key: impl Into<String>) {
        self.series_keys.push(series_key.into());
    }

    pub fn with_filter(mut self, filter: Option<Expr>) -> Self {
        self.filter = filter;
        self
    }

    /// The grouping key rendered as UTF-8, for logging.
    pub fn key_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }
}

/// Encode grouping tags as a tag set key.
pub fn encode_key(tags: &Tags) -> Vec<u8> {
    let mut key = Vec::new();
    for (i, (k, v)) in tags.iter().enumerate() {
        if i > 0 {
            key.push(b',');
        }
        key.extend_from_slice(k.as_bytes());
        key.push(b'=');
        key.extend_from_slice(v.as_bytes());
    }
    key
}

/// Apply `SLIMIT` and `SOFFSET` to a list of tag sets.
///
/// A zero `slimit` means no limit. When both are zero the input is returned
/// untouched.
pub fn limit_tag_sets(mut tag_sets: Vec<TagSet>, slimit: usize, soffset: usize) -> Vec<TagSet> {
    if slimit == 0 && soffset == 0 {
        return tag_sets;
    }
    if soffset >= tag_sets.len() {
        return vec![];
    }

    let end = match slimit {
        0 => tag_sets.len(),
        n => soffset.saturating_add(n).min(tag_sets.len()),
    };
    tag_sets.truncate(end);
    tag_sets.drain(..soffset);
    tag_sets
}
