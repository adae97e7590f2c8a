// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const NO_VALUE_KEY: &str = "---";
pub const NO_VALUE_TEXT: &str = "---";
pub const SEARCH_HEADER_KEY: &str = "FilterHeader";
pub const SEARCH_DIVIDER_KEY: &str = "divider_filterHeader";
pub const ADD_NEW_KEY: &str = "new";
pub const ADD_NEW_TEXT: &str = "+ Add new";
pub const MISSING_DISPLAY_NAME: &str = "Display Name is not available";

/// Saved query type of the "advanced find" base view for an entity.
pub const ADVANCED_FIND_QUERY_TYPE: i32 = 64;

/// Keys that render in fixed regions (search box, footer) or as decoration and
/// never show up in the filterable list.
pub const SENTINEL_KEYS: [&str; 13] = [
    "divider",
    ADD_NEW_KEY,
    SEARCH_HEADER_KEY,
    SEARCH_DIVIDER_KEY,
    "mru",
    "mru_divider1",
    "mru_divider2",
    "mru_divider3",
    "mru_divider4",
    "mru_divider5",
    "records_header",
    "favorite",
    "divider_addNew",
];

pub fn is_sentinel_key(key: &str) -> bool {
    SENTINEL_KEYS.contains(&key)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewReference {
    pub target_entity: String,
    pub explicit_view_id: Option<String>,
}

impl ViewReference {
    pub fn new(target_entity: impl Into<String>, explicit_view_id: Option<String>) -> Self {
        Self {
            target_entity: target_entity.into(),
            explicit_view_id: explicit_view_id.filter(|id| !id.trim().is_empty()),
        }
    }

    pub fn query(&self) -> ViewQuery {
        match &self.explicit_view_id {
            Some(id) => ViewQuery::ById(id.clone()),
            None => ViewQuery::SystemView {
                entity: self.target_entity.clone(),
                query_type: ADVANCED_FIND_QUERY_TYPE,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependentConstraint {
    pub attribute_name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViewQuery {
    ById(String),
    SystemView { entity: String, query_type: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub id: String,
    pub returned_type_code: String,
    pub fetch_xml: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub logical_name: String,
    pub primary_id_attribute: String,
    pub primary_name_attribute: String,
    pub display_name: String,
}

/// One row returned by the record store, keyed by attribute logical name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(BTreeMap<String, Value>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, attribute: &str, value: impl Into<Value>) -> Self {
        self.insert(attribute, value);
        self
    }

    pub fn insert(&mut self, attribute: &str, value: impl Into<Value>) {
        self.0.insert(attribute.to_owned(), value.into());
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.0.get(attribute)
    }

    /// Attribute value as display text; strings as-is, numbers and booleans
    /// formatted, null and compound values absent.
    pub fn text(&self, attribute: &str) -> Option<String> {
        match self.0.get(attribute)? {
            Value::String(value) => Some(value.clone()),
            Value::Number(value) => Some(value.to_string()),
            Value::Bool(value) => Some(value.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl FromIterator<(String, Value)> for RawRecord {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionKind {
    Normal,
    Reserved,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionData {
    pub label: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionItem {
    pub key: String,
    pub text: String,
    pub kind: OptionKind,
    pub data: Option<OptionData>,
}

impl OptionItem {
    pub fn normal(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
            kind: OptionKind::Normal,
            data: None,
        }
    }

    pub fn reserved(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
            kind: OptionKind::Reserved,
            data: None,
        }
    }

    pub fn no_value() -> Self {
        Self::reserved(NO_VALUE_KEY, NO_VALUE_TEXT)
    }

    pub fn is_reserved(&self) -> bool {
        self.kind == OptionKind::Reserved
    }

    pub fn is_no_value(&self) -> bool {
        self.key == NO_VALUE_KEY
    }

    pub fn is_add_new(&self) -> bool {
        self.key == ADD_NEW_KEY
    }

    pub fn label(&self) -> Option<&str> {
        self.data.as_ref().and_then(|data| data.label.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputValue {
    pub id: String,
    pub display_name: String,
    pub entity_type: String,
}

#[cfg(test)]
mod tests {
    use super::{RawRecord, ViewQuery, ViewReference, is_sentinel_key};
    use serde_json::json;

    #[test]
    fn view_reference_prefers_explicit_id() {
        let by_id = ViewReference::new("account", Some("v-1".to_owned()));
        assert_eq!(by_id.query(), ViewQuery::ById("v-1".to_owned()));

        let fallback = ViewReference::new("account", Some("  ".to_owned()));
        assert_eq!(
            fallback.query(),
            ViewQuery::SystemView {
                entity: "account".to_owned(),
                query_type: 64,
            }
        );
    }

    #[test]
    fn raw_record_text_formats_scalars_only() {
        let record = RawRecord::new()
            .with("name", "Contoso")
            .with("count", 3)
            .with("parent", json!({"id": "x"}))
            .with("empty", json!(null));

        assert_eq!(record.text("name").as_deref(), Some("Contoso"));
        assert_eq!(record.text("count").as_deref(), Some("3"));
        assert_eq!(record.text("parent"), None);
        assert_eq!(record.text("empty"), None);
        assert_eq!(record.text("missing"), None);
    }

    #[test]
    fn no_value_key_is_not_a_sentinel() {
        assert!(is_sentinel_key("FilterHeader"));
        assert!(is_sentinel_key("mru_divider5"));
        assert!(!is_sentinel_key("---"));
    }
}
