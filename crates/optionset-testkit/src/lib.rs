// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use optionset_app::{
    EntityMetadata, Geometry, Host, InputSurface, Listener, MetadataProvider, OutputValue,
    QueryDocument, RawRecord, Rect, RecordStore, ViewDefinition, ViewQuery, Viewport,
};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const COUNTRY_VIEW_ID: &str = "00000000-0000-0000-0000-00000000c001";
pub const CITY_VIEW_ID: &str = "00000000-0000-0000-0000-00000000c002";

pub const COUNTRY_VIEW: &str = r#"<fetch version="1.0" mapping="logical"><entity name="country"><attribute name="countryid"/><attribute name="name"/><order attribute="name"/></entity></fetch>"#;
pub const CITY_VIEW: &str = r#"<fetch version="1.0" mapping="logical"><entity name="city"><attribute name="cityid"/><attribute name="name"/><attribute name="countryid"/><filter type="and"><condition attribute="statecode" operator="eq" value="0"/></filter></entity></fetch>"#;

const CITY_PREFIXES: [&str; 12] = [
    "North", "South", "East", "West", "New", "Old", "Upper", "Lower", "Port", "Fort", "Lake",
    "Mount",
];
const CITY_ROOTS: [&str; 16] = [
    "haven", "field", "ford", "bridge", "wood", "stone", "brook", "ridge", "vale", "moor",
    "water", "gate", "mill", "castle", "wick", "burgh",
];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Seeded generator of city records for larger option lists.
#[derive(Debug, Clone)]
pub struct CityFaker {
    rng: DeterministicRng,
    next_id: u64,
}

impl CityFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            next_id: 1,
        }
    }

    pub fn city_name(&mut self) -> String {
        let prefix = CITY_PREFIXES[self.rng.int_n(CITY_PREFIXES.len())];
        let mut root = CITY_ROOTS[self.rng.int_n(CITY_ROOTS.len())].to_owned();
        if let Some(first) = root.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        format!("{prefix} {root}")
    }

    pub fn city(&mut self, country_id: &str) -> RawRecord {
        let id = format!("city-{:04}", self.next_id);
        self.next_id += 1;
        RawRecord::new()
            .with("cityid", id)
            .with("name", self.city_name())
            .with("countryid", country_id)
            .with("statecode", 0)
    }

    pub fn cities(&mut self, country_id: &str, count: usize) -> Vec<RawRecord> {
        (0..count).map(|_| self.city(country_id)).collect()
    }
}

pub fn country_metadata() -> EntityMetadata {
    EntityMetadata {
        logical_name: "country".to_owned(),
        primary_id_attribute: "countryid".to_owned(),
        primary_name_attribute: "name".to_owned(),
        display_name: "Country".to_owned(),
    }
}

pub fn city_metadata() -> EntityMetadata {
    EntityMetadata {
        logical_name: "city".to_owned(),
        primary_id_attribute: "cityid".to_owned(),
        primary_name_attribute: "name".to_owned(),
        display_name: "City".to_owned(),
    }
}

pub fn country(id: &str, name: &str, name_1031: &str) -> RawRecord {
    RawRecord::new()
        .with("countryid", id)
        .with("name", name)
        .with("name_1033", name)
        .with("name_1031", name_1031)
}

pub fn city(id: &str, name: &str, country_id: &str) -> RawRecord {
    RawRecord::new()
        .with("cityid", id)
        .with("name", name)
        .with("countryid", country_id)
        .with("statecode", 0)
}

/// In-memory metadata and record service with call recording.
///
/// Record filtering understands `eq` conditions only, which is what the
/// control adds; richer evaluation lives in the SQLite store.
#[derive(Debug, Default)]
pub struct FakeService {
    metadata: BTreeMap<String, EntityMetadata>,
    views: Vec<ViewDefinition>,
    records: BTreeMap<String, Vec<RawRecord>>,
    view_queries: RefCell<Vec<ViewQuery>>,
    executed: RefCell<Vec<(String, String)>>,
    fail_metadata: Cell<bool>,
    fail_records: Cell<bool>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Countries and cities with one system view per entity.
    pub fn geography() -> Self {
        let mut service = Self::new();
        service.add_entity(country_metadata());
        service.add_entity(city_metadata());
        service.add_view(COUNTRY_VIEW_ID, "country", COUNTRY_VIEW);
        service.add_view(CITY_VIEW_ID, "city", CITY_VIEW);
        for record in [
            country("de", "Germany", "Deutschland"),
            country("fr", "France", "Frankreich"),
            country("it", "Italy", "Italien"),
        ] {
            service.add_record("country", record);
        }
        for record in [
            city("de-ber", "Berlin", "de"),
            city("de-ham", "hamburg", "de"),
            city("de-mun", "Munich", "de"),
            city("fr-par", "Paris", "fr"),
            city("fr-lyo", "Lyon", "fr"),
            city("it-rom", "Rome", "it"),
        ] {
            service.add_record("city", record);
        }
        service
    }

    pub fn add_entity(&mut self, metadata: EntityMetadata) {
        self.metadata.insert(metadata.logical_name.clone(), metadata);
    }

    pub fn add_view(&mut self, id: &str, entity: &str, fetch_xml: &str) {
        self.views.push(ViewDefinition {
            id: id.to_owned(),
            returned_type_code: entity.to_owned(),
            fetch_xml: fetch_xml.to_owned(),
        });
    }

    pub fn add_record(&mut self, entity: &str, record: RawRecord) {
        self.records.entry(entity.to_owned()).or_default().push(record);
    }

    pub fn set_fail_metadata(&self, fail: bool) {
        self.fail_metadata.set(fail);
    }

    pub fn set_fail_records(&self, fail: bool) {
        self.fail_records.set(fail);
    }

    pub fn view_queries(&self) -> Vec<ViewQuery> {
        self.view_queries.borrow().clone()
    }

    pub fn executed(&self) -> Vec<(String, String)> {
        self.executed.borrow().clone()
    }

    pub fn last_executed_document(&self) -> Result<QueryDocument> {
        let executed = self.executed.borrow();
        let (_, fetch_xml) = executed.last().context("no query was executed")?;
        Ok(QueryDocument::parse(fetch_xml)?)
    }
}

impl MetadataProvider for FakeService {
    fn entity_metadata(&self, entity: &str) -> Result<EntityMetadata> {
        if self.fail_metadata.get() {
            bail!("metadata service unavailable");
        }
        self.metadata
            .get(entity)
            .cloned()
            .ok_or_else(|| anyhow!("entity {entity} does not exist"))
    }
}

impl RecordStore for FakeService {
    fn retrieve_views(&self, query: &ViewQuery) -> Result<Vec<ViewDefinition>> {
        self.view_queries.borrow_mut().push(query.clone());
        Ok(self
            .views
            .iter()
            .filter(|view| match query {
                ViewQuery::ById(id) => &view.id == id,
                ViewQuery::SystemView { entity, .. } => &view.returned_type_code == entity,
            })
            .cloned()
            .collect())
    }

    fn retrieve_multiple(&self, entity: &str, fetch_xml: &str) -> Result<Vec<RawRecord>> {
        if self.fail_records.get() {
            bail!("record service unavailable");
        }
        self.executed
            .borrow_mut()
            .push((entity.to_owned(), fetch_xml.to_owned()));

        let doc = QueryDocument::parse(fetch_xml)?;
        let conditions = doc
            .conditions()
            .into_iter()
            .filter(|condition| condition.attribute("operator") == Some("eq"))
            .filter_map(|condition| {
                Some((condition.attribute("attribute")?, condition.attribute("value")?))
            })
            .collect::<Vec<_>>();

        Ok(self
            .records
            .get(entity)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| {
                        conditions.iter().all(|(attribute, value)| {
                            record.text(attribute).as_deref() == Some(*value)
                        })
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Host that counts notifications and answers create requests from a queue.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub notifications: usize,
    pub create_requests: Vec<String>,
    pub next_created: Option<OutputValue>,
}

impl Host for RecordingHost {
    fn notify_output_changed(&mut self) {
        self.notifications += 1;
    }

    fn create_record(&mut self, entity: &str) -> Result<Option<OutputValue>> {
        self.create_requests.push(entity.to_owned());
        Ok(self.next_created.take())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceCall {
    Attach(Listener),
    Detach(Listener),
}

/// Input surface that logs every attach and detach.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub calls: Vec<SurfaceCall>,
}

impl RecordingSurface {
    pub fn attached(&self) -> Vec<Listener> {
        let mut attached = Vec::new();
        for call in &self.calls {
            match call {
                SurfaceCall::Attach(listener) => attached.push(*listener),
                SurfaceCall::Detach(listener) => attached.retain(|item| item != listener),
            }
        }
        attached
    }

    pub fn attach_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, SurfaceCall::Attach(_)))
            .count()
    }

    pub fn detach_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, SurfaceCall::Detach(_)))
            .count()
    }
}

impl InputSurface for RecordingSurface {
    fn attach(&mut self, listener: Listener) {
        self.calls.push(SurfaceCall::Attach(listener));
    }

    fn detach(&mut self, listener: Listener) {
        self.calls.push(SurfaceCall::Detach(listener));
    }
}

/// Trigger 200 units wide at `top`, inside a viewport `height` tall.
pub fn geometry(top: f32, height: f32) -> Geometry {
    Geometry {
        trigger: Rect::new(10.0, top, 200.0, 32.0),
        viewport: Viewport {
            width: 1024.0,
            height,
        },
    }
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("optionset.db");
    Ok((dir, db_path))
}
