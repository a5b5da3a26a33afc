//! Template metadata and responses
//!
//! Field definitions are loaded once per template; responses change on
//! every edit and only through [`ResponseStore::save`].

pub mod field;
pub mod response;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use field::{ElementIndex, FieldDefinition};
pub use response::{Response, ResponseChange, ResponseStore, StoreError, StoreResult};

use crate::expression::FragmentTable;
use crate::{config, InternalResult};

/// A template as exported by the builder: its fragments and its elements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub fragments: FragmentTable,
    #[serde(default)]
    pub elements: Vec<FieldDefinition>,
}

impl Template {
    pub fn from_file<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        config::from_file(path)
    }

    pub fn from_str(s: &str) -> InternalResult<Self> {
        config::from_str(s)
    }

    pub fn element(&self, code: &str) -> Option<&FieldDefinition> {
        self.elements.iter().find(|e| e.code == code)
    }

    /// Elements in section/page/element order.
    pub fn ordered_elements(&self) -> Vec<&FieldDefinition> {
        let mut elements: Vec<_> = self.elements.iter().collect();
        elements.sort_by_key(|e| e.index);
        elements
    }
}
