//! Read-only views derived from a configuration document.
//!
//! Views are rebuilt from scratch for every handle and ordered by code, so
//! two processes reading the same configuration produce identical views.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use crate::store::ConfigDocument;

/// The document declares something twice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate data source code [{0}]")]
    DuplicateDataSourceCode(String),
    #[error("data source identifier {0} used more than once")]
    DuplicateDataSourceId(u32),
    #[error("duplicate attribute type code [{0}]")]
    DuplicateAttributeCode(String),
}

/// A data source as exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub data_source_code: String,
    pub data_source_id: u32,
}

/// Data sources by code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSourceRegistry {
    by_code: BTreeMap<String, DataSource>,
}

impl DataSourceRegistry {
    pub fn from_document(document: &ConfigDocument) -> Result<Self, RegistryError> {
        let mut by_code = BTreeMap::new();
        let mut ids = BTreeSet::new();
        for def in &document.data_sources {
            if !ids.insert(def.id) {
                return Err(RegistryError::DuplicateDataSourceId(def.id));
            }
            let entry = DataSource {
                data_source_code: def.code.clone(),
                data_source_id: def.id,
            };
            if by_code.insert(def.code.clone(), entry).is_some() {
                return Err(RegistryError::DuplicateDataSourceCode(def.code.clone()));
            }
        }
        Ok(Self { by_code })
    }

    pub fn get(&self, code: &str) -> Option<&DataSource> {
        self.by_code.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.by_code.contains_key(code)
    }

    /// All data sources ordered by code.
    pub fn iter(&self) -> impl Iterator<Item = &DataSource> {
        self.by_code.values()
    }

    pub fn codes(&self) -> Vec<String> {
        self.by_code.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// An attribute type as exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeType {
    pub attribute_code: String,
    pub attribute_id: u32,
    pub feature_code: String,
    pub element_code: String,
}

/// Attribute types by code, plus the feature → attribute mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeIndex {
    by_code: BTreeMap<String, AttributeType>,
    by_feature: BTreeMap<String, Vec<String>>,
}

impl AttributeIndex {
    pub fn from_document(document: &ConfigDocument) -> Result<Self, RegistryError> {
        let mut index = Self::default();
        for def in &document.attribute_types {
            let attr = AttributeType {
                attribute_code: def.code.clone(),
                attribute_id: def.id,
                feature_code: def.feature.clone(),
                element_code: def.element.clone(),
            };
            if index.by_code.insert(def.code.clone(), attr).is_some() {
                return Err(RegistryError::DuplicateAttributeCode(def.code.clone()));
            }
            index.by_feature.entry(def.feature.clone()).or_default().push(def.code.clone());
        }
        Ok(index)
    }

    pub fn get(&self, code: &str) -> Option<&AttributeType> {
        self.by_code.get(code)
    }

    /// Attribute types ordered by code.
    pub fn iter(&self) -> impl Iterator<Item = &AttributeType> {
        self.by_code.values()
    }

    /// Attribute codes feeding `feature`, in document order.
    pub fn for_feature(&self, feature: &str) -> &[String] {
        self.by_feature.get(feature).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DataSourceDef;

    #[test]
    fn test_registry_is_ordered_and_deterministic() {
        let mut doc = ConfigDocument::initial();
        doc.add_data_source("ALPHA").unwrap();

        let a = DataSourceRegistry::from_document(&doc).unwrap();
        let b = DataSourceRegistry::from_document(&doc.clone()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.codes(), vec!["ALPHA", "SEARCH", "TEST"]);
        assert_eq!(a.get("ALPHA").unwrap().data_source_id, 3);
        assert!(!a.contains("FOO"));
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut doc = ConfigDocument::initial();
        doc.data_sources.push(DataSourceDef { code: "TEST".into(), id: 50 });
        assert_eq!(
            DataSourceRegistry::from_document(&doc),
            Err(RegistryError::DuplicateDataSourceCode("TEST".into()))
        );

        let mut doc = ConfigDocument::initial();
        doc.data_sources.push(DataSourceDef { code: "OTHER".into(), id: 1 });
        assert_eq!(
            DataSourceRegistry::from_document(&doc),
            Err(RegistryError::DuplicateDataSourceId(1))
        );
    }

    #[test]
    fn test_feature_mapping() {
        let index = AttributeIndex::from_document(&ConfigDocument::initial()).unwrap();
        assert_eq!(index.for_feature("NAME"), ["NAME_FIRST", "NAME_LAST", "NAME_ORG"]);
        assert!(index.for_feature("ADDRESS").is_empty());
        assert_eq!(index.get("DATE_OF_BIRTH").unwrap().feature_code, "DOB");
    }
}
