// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::cmp::Ordering;

use crate::{
    ADD_NEW_KEY, ADD_NEW_TEXT, MISSING_DISPLAY_NAME, OptionData, OptionItem, RawRecord,
    SEARCH_DIVIDER_KEY, SEARCH_HEADER_KEY,
};

/// Attribute names used to turn a record into an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFields<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub localized: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblySettings {
    pub sort_by_name: bool,
    pub include_search_header: bool,
    pub search_placeholder: String,
    pub include_add_new: bool,
}

/// Maps records to options and adds the reserved entries around them.
///
/// Order of the output: search header and its divider (when enabled), the "no
/// value" entry, the record options, and the "add new" action (when enabled).
pub fn assemble(
    records: &[RawRecord],
    fields: &RecordFields<'_>,
    settings: &AssemblySettings,
) -> Vec<OptionItem> {
    let mut record_options = records
        .iter()
        .filter_map(|record| {
            let Some(id) = record.text(fields.id).filter(|id| !id.is_empty()) else {
                tracing::debug!(id_field = fields.id, "skipping record without an id");
                return None;
            };
            Some(OptionItem::normal(id, display_text(record, fields)))
        })
        .collect::<Vec<_>>();

    if settings.sort_by_name {
        record_options.sort_by(|left, right| compare_display_text(&left.text, &right.text));
    }

    let mut options = Vec::with_capacity(record_options.len() + 4);
    if settings.include_search_header {
        options.push(OptionItem {
            data: Some(OptionData {
                label: Some(settings.search_placeholder.clone()),
                icon: None,
            }),
            ..OptionItem::reserved(SEARCH_HEADER_KEY, "-")
        });
        options.push(OptionItem::reserved(SEARCH_DIVIDER_KEY, "-"));
    }
    options.push(OptionItem::no_value());
    options.extend(record_options);
    if settings.include_add_new {
        options.push(OptionItem {
            data: Some(OptionData {
                label: None,
                icon: Some("Add".to_owned()),
            }),
            ..OptionItem::reserved(ADD_NEW_KEY, ADD_NEW_TEXT)
        });
    }
    options
}

/// Localized value when present and non-empty, else the primary name, else a
/// fixed placeholder.
pub fn display_text(record: &RawRecord, fields: &RecordFields<'_>) -> String {
    fields
        .localized
        .and_then(|field| record.text(field))
        .filter(|text| !text.is_empty())
        .or_else(|| record.text(fields.name))
        .unwrap_or_else(|| MISSING_DISPLAY_NAME.to_owned())
}

pub fn compare_display_text(left: &str, right: &str) -> Ordering {
    left.to_lowercase().cmp(&right.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::{AssemblySettings, RecordFields, assemble, display_text};
    use crate::{OptionKind, RawRecord};

    const FIELDS: RecordFields<'static> = RecordFields {
        id: "id",
        name: "name",
        localized: None,
    };

    fn records(pairs: &[(&str, &str)]) -> Vec<RawRecord> {
        pairs
            .iter()
            .map(|(id, name)| RawRecord::new().with("id", *id).with("name", *name))
            .collect()
    }

    fn record_texts(options: &[crate::OptionItem]) -> Vec<&str> {
        options
            .iter()
            .filter(|option| option.kind == OptionKind::Normal)
            .map(|option| option.text.as_str())
            .collect()
    }

    #[test]
    fn sort_by_name_is_case_insensitive() {
        let settings = AssemblySettings {
            sort_by_name: true,
            ..AssemblySettings::default()
        };
        let options = assemble(&records(&[("1", "Bravo"), ("2", "alpha")]), &FIELDS, &settings);

        assert_eq!(options[0].key, "---");
        assert_eq!(options[0].text, "---");
        assert_eq!(options[0].kind, OptionKind::Reserved);
        assert_eq!(record_texts(&options), vec!["alpha", "Bravo"]);
    }

    #[test]
    fn unsorted_preserves_input_order() {
        let options = assemble(
            &records(&[("1", "Bravo"), ("2", "alpha"), ("3", "Charlie")]),
            &FIELDS,
            &AssemblySettings::default(),
        );
        assert_eq!(record_texts(&options), vec!["Bravo", "alpha", "Charlie"]);
    }

    #[test]
    fn sort_keeps_ties_in_input_order() {
        let settings = AssemblySettings {
            sort_by_name: true,
            ..AssemblySettings::default()
        };
        let options = assemble(
            &records(&[("1", "beta"), ("2", "Alpha"), ("3", "BETA"), ("4", "alpha")]),
            &FIELDS,
            &settings,
        );
        let keys = options
            .iter()
            .skip(1)
            .map(|option| option.key.as_str())
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["2", "4", "1", "3"]);
    }

    #[test]
    fn search_header_precedes_no_value() {
        let settings = AssemblySettings {
            include_search_header: true,
            search_placeholder: "Search records".to_owned(),
            ..AssemblySettings::default()
        };
        let options = assemble(&records(&[("1", "Contoso")]), &FIELDS, &settings);
        let keys = options
            .iter()
            .map(|option| option.key.as_str())
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["FilterHeader", "divider_filterHeader", "---", "1"]);
        assert_eq!(options[0].label(), Some("Search records"));
    }

    #[test]
    fn add_new_is_appended_last() {
        let settings = AssemblySettings {
            include_add_new: true,
            ..AssemblySettings::default()
        };
        let options = assemble(&records(&[("1", "Contoso")]), &FIELDS, &settings);
        let last = options.last().expect("options should not be empty");
        assert!(last.is_add_new());
        assert!(last.is_reserved());
    }

    #[test]
    fn display_text_falls_back_from_localized_to_name_to_placeholder() {
        let fields = RecordFields {
            localized: Some("name_1031"),
            ..FIELDS
        };
        let localized = RawRecord::new()
            .with("id", "1")
            .with("name", "Germany")
            .with("name_1031", "Deutschland");
        let empty_localized = RawRecord::new()
            .with("id", "2")
            .with("name", "France")
            .with("name_1031", "");
        let nameless = RawRecord::new().with("id", "3");

        assert_eq!(display_text(&localized, &fields), "Deutschland");
        assert_eq!(display_text(&empty_localized, &fields), "France");
        assert_eq!(
            display_text(&nameless, &fields),
            "Display Name is not available"
        );
    }

    #[test]
    fn records_without_ids_are_skipped() {
        let input = vec![
            RawRecord::new().with("name", "orphan"),
            RawRecord::new().with("id", "1").with("name", "kept"),
        ];
        let options = assemble(&input, &FIELDS, &AssemblySettings::default());
        assert_eq!(record_texts(&options), vec!["kept"]);
    }

    #[test]
    fn assemble_is_deterministic() {
        let settings = AssemblySettings {
            sort_by_name: true,
            include_search_header: true,
            search_placeholder: "Search".to_owned(),
            include_add_new: true,
        };
        let input = records(&[("1", "b"), ("2", "A"), ("3", "c")]);
        assert_eq!(
            assemble(&input, &FIELDS, &settings),
            assemble(&input, &FIELDS, &settings)
        );
    }
}
