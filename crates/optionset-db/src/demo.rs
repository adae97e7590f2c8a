// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use optionset_app::{ADVANCED_FIND_QUERY_TYPE, EntityMetadata, RawRecord};

use crate::{NewView, Store};

pub const DEMO_COUNTRY_VIEW_ID: &str = "6a1f3c52-0c4e-4d8b-9b61-1f0c6e3a0001";
pub const DEMO_CITY_VIEW_ID: &str = "6a1f3c52-0c4e-4d8b-9b61-1f0c6e3a0002";
pub const DEMO_ALL_CITIES_VIEW_ID: &str = "6a1f3c52-0c4e-4d8b-9b61-1f0c6e3a0003";
/// City column holding the parent country id.
pub const DEMO_DEPENDENT_ATTRIBUTE: &str = "countryid";

const PUBLIC_VIEW_QUERY_TYPE: i32 = 0;

// (id, English, German)
const COUNTRIES: [(&str, &str, &str); 6] = [
    ("country-de", "Germany", "Deutschland"),
    ("country-fr", "France", "Frankreich"),
    ("country-it", "Italy", "Italien"),
    ("country-es", "Spain", "Spanien"),
    ("country-jp", "Japan", "Japan"),
    ("country-nl", "Netherlands", "Niederlande"),
];

// (id, country id, English, German, statecode)
const CITIES: [(&str, &str, &str, &str, i64); 20] = [
    ("city-berlin", "country-de", "Berlin", "Berlin", 0),
    ("city-hamburg", "country-de", "Hamburg", "Hamburg", 0),
    ("city-munich", "country-de", "Munich", "München", 0),
    ("city-cologne", "country-de", "Cologne", "Köln", 0),
    ("city-bonn", "country-de", "Bonn", "Bonn", 1),
    ("city-paris", "country-fr", "Paris", "Paris", 0),
    ("city-lyon", "country-fr", "Lyon", "Lyon", 0),
    ("city-marseille", "country-fr", "Marseille", "Marseille", 0),
    ("city-rome", "country-it", "Rome", "Rom", 0),
    ("city-milan", "country-it", "Milan", "Mailand", 0),
    ("city-naples", "country-it", "Naples", "Neapel", 0),
    ("city-venice", "country-it", "Venice", "Venedig", 0),
    ("city-madrid", "country-es", "Madrid", "Madrid", 0),
    ("city-barcelona", "country-es", "Barcelona", "Barcelona", 0),
    ("city-seville", "country-es", "Seville", "Sevilla", 0),
    ("city-tokyo", "country-jp", "Tokyo", "Tokio", 0),
    ("city-kyoto", "country-jp", "Kyoto", "Kyoto", 0),
    ("city-osaka", "country-jp", "Osaka", "Osaka", 0),
    ("city-amsterdam", "country-nl", "Amsterdam", "Amsterdam", 0),
    ("city-the-hague", "country-nl", "The Hague", "Den Haag", 0),
];

const COUNTRY_LOOKUP_FETCH: &str = r#"<fetch version="1.0" output-format="xml-platform" mapping="logical" distinct="false"><entity name="country"><attribute name="countryid"/><attribute name="name"/><order attribute="name" descending="false"/></entity></fetch>"#;

const CITY_LOOKUP_FETCH: &str = r#"<fetch version="1.0" output-format="xml-platform" mapping="logical" distinct="false"><entity name="city"><attribute name="cityid"/><attribute name="name"/><attribute name="countryid"/><order attribute="name" descending="false"/><filter type="and"><condition attribute="statecode" operator="eq" value="0"/></filter></entity></fetch>"#;

const ALL_CITIES_FETCH: &str = r#"<fetch version="1.0" mapping="logical"><entity name="city"><all-attributes/><order attribute="name"/></entity></fetch>"#;

impl Store {
    /// Seeds countries, cities and their lookup views. Does nothing when the
    /// database already defines the demo entities.
    pub fn seed_demo_data(&self) -> Result<()> {
        if self.list_entities()?.iter().any(|entity| entity.logical_name == "country") {
            tracing::debug!("demo data already present");
            return Ok(());
        }

        self.define_entity(&EntityMetadata {
            logical_name: "country".to_owned(),
            primary_id_attribute: "countryid".to_owned(),
            primary_name_attribute: "name".to_owned(),
            display_name: "Country".to_owned(),
        })?;
        self.define_entity(&EntityMetadata {
            logical_name: "city".to_owned(),
            primary_id_attribute: "cityid".to_owned(),
            primary_name_attribute: "name".to_owned(),
            display_name: "City".to_owned(),
        })?;

        for view in [
            NewView {
                id: DEMO_COUNTRY_VIEW_ID.to_owned(),
                name: "Country Lookup View".to_owned(),
                entity: "country".to_owned(),
                query_type: ADVANCED_FIND_QUERY_TYPE,
                is_default: true,
                fetch_xml: COUNTRY_LOOKUP_FETCH.to_owned(),
            },
            NewView {
                id: DEMO_CITY_VIEW_ID.to_owned(),
                name: "City Lookup View".to_owned(),
                entity: "city".to_owned(),
                query_type: ADVANCED_FIND_QUERY_TYPE,
                is_default: true,
                fetch_xml: CITY_LOOKUP_FETCH.to_owned(),
            },
            NewView {
                id: DEMO_ALL_CITIES_VIEW_ID.to_owned(),
                name: "All Cities".to_owned(),
                entity: "city".to_owned(),
                query_type: PUBLIC_VIEW_QUERY_TYPE,
                is_default: false,
                fetch_xml: ALL_CITIES_FETCH.to_owned(),
            },
        ] {
            self.save_view(&view)?;
        }

        for (id, english, german) in COUNTRIES {
            let record = RawRecord::new()
                .with("countryid", id)
                .with("name", english)
                .with("name_1033", english)
                .with("name_1031", german);
            self.insert_record("country", &record)
                .with_context(|| format!("seed country {english}"))?;
        }

        for (id, country_id, english, german, statecode) in CITIES {
            let record = RawRecord::new()
                .with("cityid", id)
                .with("name", english)
                .with("name_1033", english)
                .with("name_1031", german)
                .with(DEMO_DEPENDENT_ATTRIBUTE, country_id)
                .with("statecode", statecode);
            self.insert_record("city", &record)
                .with_context(|| format!("seed city {english}"))?;
        }

        tracing::info!(
            countries = COUNTRIES.len(),
            cities = CITIES.len(),
            "seeded demo data"
        );
        Ok(())
    }
}
