//! Configuration blob and its structured document form.
//!
//! A blob is the opaque text a store hands out. The document is what a blob
//! parses into: data sources, entity types and attribute types with their
//! feature mappings. Serialized field names follow the engine's upper-case
//! JSON conventions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw configuration text as published in a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBlob {
    text: String,
}

impl ConfigBlob {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Serialize a document into a blob.
    pub fn from_document(document: &ConfigDocument) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_string_pretty(document)?))
    }

    /// Parse the blob text.
    pub fn parse(&self) -> Result<ConfigDocument, serde_json::Error> {
        serde_json::from_str(&self.text)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// A data source declared by the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceDef {
    #[serde(rename = "DSRC_CODE")]
    pub code: String,
    #[serde(rename = "DSRC_ID")]
    pub id: u32,
}

/// An entity type declared by the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeDef {
    #[serde(rename = "ETYPE_CODE")]
    pub code: String,
    #[serde(rename = "ETYPE_ID")]
    pub id: u32,
}

/// An attribute type and the feature element it feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeTypeDef {
    #[serde(rename = "ATTR_CODE")]
    pub code: String,
    #[serde(rename = "ATTR_ID")]
    pub id: u32,
    #[serde(rename = "FTYPE_CODE")]
    pub feature: String,
    #[serde(rename = "FELEM_CODE")]
    pub element: String,
}

/// A document edit that cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("data source code [{0}] is already declared")]
    DuplicateDataSource(String),

    #[error("no data source identifier left after {0}")]
    DataSourceIdsExhausted(u32),
}

/// Structured form of a configuration blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(rename = "CFG_DSRC", default)]
    pub data_sources: Vec<DataSourceDef>,
    #[serde(rename = "CFG_ETYPE", default)]
    pub entity_types: Vec<EntityTypeDef>,
    #[serde(rename = "CFG_ATTR", default)]
    pub attribute_types: Vec<AttributeTypeDef>,
}

impl ConfigDocument {
    /// The document a fresh repository starts with.
    pub fn initial() -> Self {
        let attr = |code: &str, id: u32, feature: &str, element: &str| AttributeTypeDef {
            code: code.to_string(),
            id,
            feature: feature.to_string(),
            element: element.to_string(),
        };

        Self {
            data_sources: vec![
                DataSourceDef { code: "TEST".to_string(), id: 1 },
                DataSourceDef { code: "SEARCH".to_string(), id: 2 },
            ],
            entity_types: vec![
                EntityTypeDef { code: "GENERIC".to_string(), id: 3 },
                EntityTypeDef { code: "PERSON".to_string(), id: 1 },
                EntityTypeDef { code: "ORGANIZATION".to_string(), id: 2 },
            ],
            attribute_types: vec![
                attr("NAME_FIRST", 1001, "NAME", "GIVEN_NAME"),
                attr("NAME_LAST", 1002, "NAME", "SUR_NAME"),
                attr("NAME_ORG", 1003, "NAME", "ORG_NAME"),
                attr("DATE_OF_BIRTH", 1101, "DOB", "DATE"),
                attr("EMAIL_ADDRESS", 1201, "EMAIL", "ADDR"),
                attr("PHONE_NUMBER", 1301, "PHONE", "PHONE_NUM"),
            ],
        }
    }

    /// Whether a data source with `code` is declared.
    pub fn has_data_source(&self, code: &str) -> bool {
        self.data_sources.iter().any(|ds| ds.code == code)
    }

    /// Add a data source, assigning the identifier after the highest declared one.
    pub fn add_data_source(&mut self, code: &str) -> Result<DataSourceDef, DocumentError> {
        if self.has_data_source(code) {
            return Err(DocumentError::DuplicateDataSource(code.to_string()));
        }
        let highest = self.data_sources.iter().map(|ds| ds.id).max().unwrap_or(0);
        let id = highest
            .checked_add(1)
            .ok_or(DocumentError::DataSourceIdsExhausted(highest))?;
        let def = DataSourceDef { code: code.to_string(), id };
        self.data_sources.push(def.clone());
        Ok(def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_document_conversion() {
        let doc = ConfigDocument::initial();
        let blob = ConfigBlob::from_document(&doc).unwrap();
        assert!(blob.as_str().contains("\"DSRC_CODE\": \"TEST\""));
        assert_eq!(blob.parse().unwrap(), doc);
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let doc = ConfigBlob::new(r#"{"CFG_DSRC":[{"DSRC_CODE":"A","DSRC_ID":4}]}"#)
            .parse()
            .unwrap();
        assert_eq!(doc.data_sources.len(), 1);
        assert!(doc.entity_types.is_empty());
        assert!(doc.attribute_types.is_empty());
    }

    #[test]
    fn test_add_data_source_assigns_next_id() {
        let mut doc = ConfigDocument::initial();
        let added = doc.add_data_source("FOO").unwrap();
        assert_eq!(added.id, 3);
        assert!(doc.has_data_source("FOO"));

        // Already declared
        assert_eq!(doc.add_data_source("FOO"), Err(DocumentError::DuplicateDataSource("FOO".into())));
        assert!(doc.add_data_source("TEST").is_err());
    }

    #[test]
    fn test_add_data_source_past_highest_id() {
        let mut doc = ConfigDocument::initial();
        doc.data_sources.push(DataSourceDef { code: "BIG".into(), id: u32::MAX });

        let err = doc.add_data_source("FOO").unwrap_err();
        assert_eq!(err, DocumentError::DataSourceIdsExhausted(u32::MAX));
        assert!(!doc.has_data_source("FOO"));
    }

    #[test]
    fn test_malformed_blob_fails_to_parse() {
        assert!(ConfigBlob::new("{not json").parse().is_err());
    }
}
