// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use optionset_app::{
    ChangedInput, Control, ControlView, DependentBinding, EntityMetadata, HostParameters,
    LookupBinding, MetadataProvider, QueryDocument, RawRecord, RecordStore, SelectorCommand,
    ViewQuery,
};
use optionset_db::{
    DEMO_ALL_CITIES_VIEW_ID, DEMO_CITY_VIEW_ID, DEMO_DEPENDENT_ATTRIBUTE, NewView, Store,
    validate_db_path,
};
use optionset_testkit::{CityFaker, RecordingHost, RecordingSurface, geometry, temp_db_path};
use std::time::Instant;

fn demo_store() -> Result<Store> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    store.seed_demo_data()?;
    Ok(store)
}

fn city_params(country: Option<&str>) -> HostParameters {
    HostParameters {
        lookup: LookupBinding {
            target_entity: Some("city".to_owned()),
            view_id: None,
            value: None,
        },
        dependant_lookup: Some(DependentBinding {
            attribute_name: DEMO_DEPENDENT_ATTRIBUTE.to_owned(),
            value_id: country.map(str::to_owned),
        }),
        sort_by_name: Some("1".to_owned()),
        add_search: Some("1".to_owned()),
        attribute_mask: Some("name_{lcid}".to_owned()),
        language_id: 1031,
        ..HostParameters::default()
    }
}

#[test]
fn validate_db_path_rejects_uri_forms() {
    assert!(validate_db_path("file:test.db").is_err());
    assert!(validate_db_path("https://example.com/db.sqlite").is_err());
    assert!(validate_db_path("db.sqlite?mode=ro").is_err());
    assert!(validate_db_path("").is_err());
    assert!(validate_db_path("/tmp/optionset.db").is_ok());
    assert!(validate_db_path(":memory:").is_ok());
}

#[test]
fn bootstrap_is_idempotent_on_disk() -> Result<()> {
    let (_dir, path) = temp_db_path()?;
    {
        let store = Store::open(&path)?;
        store.bootstrap()?;
        store.seed_demo_data()?;
    }
    let reopened = Store::open(&path)?;
    reopened.bootstrap()?;
    reopened.seed_demo_data()?;
    assert_eq!(reopened.record_count("country")?, 6);
    assert_eq!(reopened.record_count("city")?, 20);
    Ok(())
}

#[test]
fn bootstrap_rejects_schema_missing_required_column() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    store.raw_connection().execute_batch(
        "
        DROP TABLE saved_queries;
        CREATE TABLE saved_queries (
          id TEXT PRIMARY KEY,
          name TEXT NOT NULL,
          returned_type_code TEXT NOT NULL,
          created_at TEXT NOT NULL
        );
        ",
    )?;

    let err = store
        .bootstrap()
        .expect_err("schema validation should fail");
    let message = err.to_string();
    assert!(message.contains("table `saved_queries` is missing required columns"));
    assert!(message.contains("fetch_xml"));
    Ok(())
}

#[test]
fn metadata_for_unknown_entity_is_an_error() -> Result<()> {
    let store = demo_store()?;
    let metadata = store.entity_metadata("city")?;
    assert_eq!(metadata.primary_id_attribute, "cityid");
    assert_eq!(metadata.primary_name_attribute, "name");

    let err = store
        .entity_metadata("planet")
        .expect_err("planet is not defined");
    assert!(err.to_string().contains("planet"));
    Ok(())
}

#[test]
fn system_view_prefers_default_lookup_view() -> Result<()> {
    let store = demo_store()?;
    let views = store.retrieve_views(&ViewQuery::SystemView {
        entity: "city".to_owned(),
        query_type: 64,
    })?;
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].id, DEMO_CITY_VIEW_ID);

    let by_id = store.retrieve_views(&ViewQuery::ById(
        DEMO_ALL_CITIES_VIEW_ID.to_uppercase(),
    ))?;
    assert_eq!(by_id.len(), 1);
    assert_eq!(by_id[0].returned_type_code, "city");
    Ok(())
}

#[test]
fn save_view_rejects_mismatched_entity() -> Result<()> {
    let store = demo_store()?;
    let err = store
        .save_view(&NewView {
            id: "bad".to_owned(),
            name: "Bad".to_owned(),
            entity: "city".to_owned(),
            query_type: 64,
            is_default: false,
            fetch_xml: r#"<fetch><entity name="country"/></fetch>"#.to_owned(),
        })
        .expect_err("entity mismatch should fail");
    assert!(err.to_string().contains("queries `country`"));
    Ok(())
}

#[test]
fn retrieve_multiple_projects_and_filters() -> Result<()> {
    let store = demo_store()?;
    let fetch = r#"<fetch><entity name="city"><attribute name="name"/><attribute name="name_1031"/><order attribute="name"/><filter><condition attribute="countryid" operator="eq" value="country-de"/><condition attribute="statecode" operator="eq" value="0"/></filter></entity></fetch>"#;
    let records = store.retrieve_multiple("city", fetch)?;

    let names = records
        .iter()
        .filter_map(|record| record.text("name_1031"))
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Berlin", "Köln", "Hamburg", "München"]);
    assert!(records.iter().all(|record| record.get("statecode").is_none()));
    assert!(records.iter().all(|record| record.text("cityid").is_some()));
    Ok(())
}

#[test]
fn retrieve_multiple_rejects_wrong_collection() -> Result<()> {
    let store = demo_store()?;
    let err = store
        .retrieve_multiple("country", r#"<fetch><entity name="city"/></fetch>"#)
        .expect_err("collection mismatch should fail");
    assert!(err.to_string().contains("`country` collection"));
    Ok(())
}

#[test]
fn insert_record_generates_ids_and_round_trips_values() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    store.define_entity(&EntityMetadata {
        logical_name: "city".to_owned(),
        primary_id_attribute: "cityid".to_owned(),
        primary_name_attribute: "name".to_owned(),
        display_name: "City".to_owned(),
    })?;

    let mut faker = CityFaker::new(11);
    let generated = faker.cities("country-x", 3);
    for record in &generated {
        store.insert_record("city", record)?;
    }
    let created_id = store.insert_record("city", &RawRecord::new().with("name", "Nowhere"))?;
    assert_eq!(created_id, "city-0004");

    let stored = store.list_records("city")?;
    assert_eq!(stored.len(), 4);
    assert_eq!(stored[..3], generated[..]);
    assert_eq!(stored[3].text("cityid").as_deref(), Some("city-0004"));
    Ok(())
}

#[test]
fn create_record_requires_a_name() -> Result<()> {
    let store = demo_store()?;
    assert!(store.create_record("city", "  ", &RawRecord::new()).is_err());

    let created = store.create_record(
        "city",
        "Dresden",
        &RawRecord::new().with(DEMO_DEPENDENT_ATTRIBUTE, "country-de"),
    )?;
    assert_eq!(created.display_name, "Dresden");
    assert_eq!(created.entity_type, "city");

    let german = store.retrieve_multiple(
        "city",
        r#"<fetch><entity name="city"><filter><condition attribute="countryid" operator="eq" value="country-de"/></filter></entity></fetch>"#,
    )?;
    assert!(german.iter().any(|record| record.text("cityid") == Some(created.id.clone())));
    Ok(())
}

#[test]
fn control_resolves_localized_dependent_options() -> Result<()> {
    let store = demo_store()?;
    let mut control = Control::new(city_params(Some("country-it")));
    let events = control.initialize(&store);
    control.run_requests(&store, events);

    let texts = control
        .options()
        .iter()
        .map(|option| option.text.as_str())
        .collect::<Vec<_>>();
    assert_eq!(texts, vec!["-", "-", "---", "Mailand", "Neapel", "Rom", "Venedig"]);
    Ok(())
}

#[test]
fn parent_change_reloads_cities_through_sqlite() -> Result<()> {
    let store = demo_store()?;
    let mut host = RecordingHost::default();
    let mut surface = RecordingSurface::default();
    let mut control = Control::new(city_params(Some("country-fr")));
    let events = control.initialize(&store);
    control.run_requests(&store, events);

    control.handle(
        SelectorCommand::Toggle {
            geometry: geometry(40.0, 900.0),
            at: Instant::now(),
        },
        &mut surface,
        &mut host,
    );
    control.handle(
        SelectorCommand::Choose("city-lyon".to_owned()),
        &mut surface,
        &mut host,
    );
    assert_eq!(
        control.produce_output().map(|value| value.id),
        Some("city-lyon".to_owned())
    );

    let events = control.on_inputs_changed(
        city_params(Some("country-jp")),
        &[ChangedInput::DependantLookup],
        &store,
        &mut host,
    );
    control.run_requests(&store, events);

    assert_eq!(control.produce_output(), None);
    assert_eq!(host.notifications, 2);
    let ControlView::Ready(view) = control.view() else {
        panic!("control should be ready after reload");
    };
    assert_eq!(view.trigger_text, "---");
    let keys = control
        .options()
        .iter()
        .filter(|option| option.key.starts_with("city-"))
        .map(|option| option.key.as_str())
        .collect::<Vec<_>>();
    assert_eq!(keys, vec!["city-kyoto", "city-osaka", "city-tokyo"]);
    Ok(())
}

#[test]
fn view_query_never_accumulates_conditions() -> Result<()> {
    let store = demo_store()?;
    let stored = store.retrieve_views(&ViewQuery::ById(DEMO_CITY_VIEW_ID.to_owned()))?;
    let base = QueryDocument::parse(&stored[0].fetch_xml)?;

    let mut control = Control::new(city_params(Some("country-de")));
    let mut host = RecordingHost::default();
    let events = control.initialize(&store);
    control.run_requests(&store, events);
    for country in ["country-fr", "country-es", "country-nl"] {
        let events = control.on_inputs_changed(
            city_params(Some(country)),
            &[ChangedInput::DependantLookup],
            &store,
            &mut host,
        );
        control.run_requests(&store, events);
    }

    let after = store.retrieve_views(&ViewQuery::ById(DEMO_CITY_VIEW_ID.to_owned()))?;
    assert_eq!(QueryDocument::parse(&after[0].fetch_xml)?, base);
    assert_eq!(base.conditions().len(), 1);
    Ok(())
}
