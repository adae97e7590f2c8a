// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{AssemblySettings, DependentConstraint, NO_VALUE_KEY, OutputValue, ViewReference};

pub const LCID_TOKEN: &str = "{lcid}";
pub const DEFAULT_SEARCH_PLACEHOLDER: &str = "Search...";

/// The bound relationship field the control edits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupBinding {
    pub target_entity: Option<String>,
    pub view_id: Option<String>,
    pub value: Option<OutputValue>,
}

/// The parent field whose value scopes the candidate records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependentBinding {
    pub attribute_name: String,
    pub value_id: Option<String>,
}

/// Everything the host exposes to one control instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostParameters {
    pub lookup: LookupBinding,
    pub dependant_lookup: Option<DependentBinding>,
    pub sort_by_name: Option<String>,
    pub add_search: Option<String>,
    pub add_new: Option<String>,
    pub attribute_mask: Option<String>,
    pub language_id: u32,
    pub search_placeholder: String,
    pub disabled: bool,
}

impl Default for HostParameters {
    fn default() -> Self {
        Self {
            lookup: LookupBinding::default(),
            dependant_lookup: None,
            sort_by_name: None,
            add_search: None,
            add_new: None,
            attribute_mask: None,
            language_id: 1033,
            search_placeholder: DEFAULT_SEARCH_PLACEHOLDER.to_owned(),
            disabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangedInput {
    Lookup,
    DependantLookup,
    Disabled,
}

impl HostParameters {
    pub fn target_entity(&self) -> Option<&str> {
        self.lookup
            .target_entity
            .as_deref()
            .map(str::trim)
            .filter(|entity| !entity.is_empty())
    }

    pub fn view_reference(&self) -> Option<ViewReference> {
        let entity = self.target_entity()?;
        Some(ViewReference::new(entity, self.lookup.view_id.clone()))
    }

    pub fn dependent_id(&self) -> Option<&str> {
        self.dependant_lookup
            .as_ref()
            .and_then(|binding| binding.value_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    pub fn dependent_constraint(&self) -> Option<DependentConstraint> {
        let binding = self.dependant_lookup.as_ref()?;
        let value = self.dependent_id()?;
        if binding.attribute_name.trim().is_empty() {
            tracing::warn!(
                value,
                "dependent lookup has a value but no attribute name; ignoring constraint"
            );
            return None;
        }
        Some(DependentConstraint {
            attribute_name: binding.attribute_name.clone(),
            value: value.to_owned(),
        })
    }

    pub fn localized_attribute(&self) -> Option<String> {
        localized_attribute_name(self.attribute_mask.as_deref()?, self.language_id)
    }

    pub fn selected_key(&self) -> String {
        self.lookup
            .value
            .as_ref()
            .map(|value| value.id.clone())
            .unwrap_or_else(|| NO_VALUE_KEY.to_owned())
    }

    pub fn assembly_settings(&self) -> AssemblySettings {
        AssemblySettings {
            sort_by_name: flag_enabled(self.sort_by_name.as_deref()),
            include_search_header: flag_enabled(self.add_search.as_deref()),
            search_placeholder: self.search_placeholder.clone(),
            include_add_new: flag_enabled(self.add_new.as_deref()),
        }
    }
}

/// Host string flags are enabled only by the exact value `"1"`.
pub fn flag_enabled(raw: Option<&str>) -> bool {
    raw == Some("1")
}

pub fn localized_attribute_name(mask: &str, language_id: u32) -> Option<String> {
    let mask = mask.trim();
    if mask.is_empty() {
        return None;
    }
    Some(mask.replacen(LCID_TOKEN, &language_id.to_string(), 1))
}

#[cfg(test)]
mod tests {
    use super::{DependentBinding, HostParameters, LookupBinding, flag_enabled, localized_attribute_name};
    use crate::{DependentConstraint, OutputValue};

    #[test]
    fn flags_only_accept_one() {
        assert!(flag_enabled(Some("1")));
        assert!(!flag_enabled(Some("0")));
        assert!(!flag_enabled(Some("true")));
        assert!(!flag_enabled(None));
    }

    #[test]
    fn localized_attribute_substitutes_lcid() {
        assert_eq!(
            localized_attribute_name("name_{lcid}", 1031).as_deref(),
            Some("name_1031")
        );
        assert_eq!(
            localized_attribute_name("label", 1031).as_deref(),
            Some("label")
        );
        assert_eq!(localized_attribute_name("  ", 1031), None);
    }

    #[test]
    fn dependent_constraint_requires_value_and_attribute() {
        let mut params = HostParameters {
            dependant_lookup: Some(DependentBinding {
                attribute_name: "countryid".to_owned(),
                value_id: Some("c-1".to_owned()),
            }),
            ..HostParameters::default()
        };
        assert_eq!(
            params.dependent_constraint(),
            Some(DependentConstraint {
                attribute_name: "countryid".to_owned(),
                value: "c-1".to_owned(),
            })
        );

        params.dependant_lookup = Some(DependentBinding {
            attribute_name: String::new(),
            value_id: Some("c-1".to_owned()),
        });
        assert_eq!(params.dependent_constraint(), None);
        assert_eq!(params.dependent_id(), Some("c-1"));

        params.dependant_lookup = Some(DependentBinding {
            attribute_name: "countryid".to_owned(),
            value_id: None,
        });
        assert_eq!(params.dependent_constraint(), None);
    }

    #[test]
    fn selected_key_defaults_to_no_value() {
        let mut params = HostParameters::default();
        assert_eq!(params.selected_key(), "---");

        params.lookup = LookupBinding {
            target_entity: Some("city".to_owned()),
            view_id: None,
            value: Some(OutputValue {
                id: "x-1".to_owned(),
                display_name: "Berlin".to_owned(),
                entity_type: "city".to_owned(),
            }),
        };
        assert_eq!(params.selected_key(), "x-1");
    }

    #[test]
    fn blank_target_entity_has_no_view_reference() {
        let params = HostParameters {
            lookup: LookupBinding {
                target_entity: Some("  ".to_owned()),
                ..LookupBinding::default()
            },
            ..HostParameters::default()
        };
        assert!(params.view_reference().is_none());
    }
}
