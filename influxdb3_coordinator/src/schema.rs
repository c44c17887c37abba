//! Merging of per-shard schema information.

use std::collections::{BTreeMap, BTreeSet};

use influxdb3_influxql::DataType;

/// Field name to field type.
pub type FieldTypes = BTreeMap<String, DataType>;

/// Tag keys usable as `GROUP BY` dimensions.
pub type Dimensions = BTreeSet<String>;

/// Field types and dimensions accumulated across shards.
///
/// When shards disagree on a field's type the type with the lowest rank wins.
/// [`DataType::Unknown`] is never recorded.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldDimensions {
    pub fields: FieldTypes,
    pub dimensions: Dimensions,
}

impl FieldDimensions {
    /// Merge one shard's field types and dimensions.
    pub fn merge(&mut self, fields: FieldTypes, dimensions: Dimensions) {
        for (name, typ) in fields {
            if typ.is_unknown() {
                continue;
            }
            self.fields
                .entry(name)
                .and_modify(|existing| {
                    if typ < *existing {
                        *existing = typ;
                    }
                })
                .or_insert(typ);
        }
        self.dimensions.extend(dimensions);
    }

    pub fn into_parts(self) -> (FieldTypes, Dimensions) {
        (self.fields, self.dimensions)
    }
}
