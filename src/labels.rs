use std::collections::HashMap;

use crate::error::{Error, Result};

/// Column holding the raw annotated text.
pub const TEXT_COLUMN: &str = "text";
/// Prefix carried by every target column in the source dataset.
pub const TARGET_PREFIX: &str = "target_";
/// The target columns kept from the source dataset, in schema order.
/// This order fixes the label identifiers for the whole run.
pub const TARGET_COLUMNS: [&str; 7] = [
    "target_race",
    "target_religion",
    "target_origin",
    "target_gender",
    "target_sexuality",
    "target_age",
    "target_disability",
];

/// Bidirectional id <-> name table for the hate speech categories.
///
/// Built once from the dataset target columns (prefix stripped) and never
/// mutated afterwards. Label identifiers follow the column order.
#[derive(Debug, Clone)]
pub struct LabelMap {
    id2label: Vec<String>,
    label2id: HashMap<String, usize>,
}

impl LabelMap {
    /// Builds the mapping from a list of target column names.
    ///
    /// Columns must carry the `target_` prefix; anything else is a schema
    /// mismatch and fails fast.
    pub fn from_columns(columns: &[&str]) -> Result<Self> {
        let mut id2label = Vec::with_capacity(columns.len());
        let mut label2id = HashMap::with_capacity(columns.len());

        for column in columns {
            if *column == TEXT_COLUMN {
                continue;
            }
            let label = column
                .strip_prefix(TARGET_PREFIX)
                .ok_or_else(|| Error::Schema(column.to_string()))?;

            label2id.insert(label.to_string(), id2label.len());
            id2label.push(label.to_string());
        }

        Ok(Self { id2label, label2id })
    }

    /// The mapping over the default dataset schema.
    pub fn from_dataset_schema() -> Result<Self> {
        Self::from_columns(&TARGET_COLUMNS)
    }

    /// Number of known categories.
    pub fn len(&self) -> usize {
        self.id2label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id2label.is_empty()
    }

    /// Category name for a label identifier.
    pub fn name(&self, id: usize) -> Option<&str> {
        self.id2label.get(id).map(String::as_str)
    }

    /// Label identifier for a category name.
    pub fn id(&self, name: &str) -> Option<usize> {
        self.label2id.get(name).copied()
    }

    /// All category names, ordered by label identifier.
    pub fn names(&self) -> &[String] {
        &self.id2label
    }
}
