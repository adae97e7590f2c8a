// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;

use crate::{
    DependentConstraint, EntityMetadata, LookupError, QueryDocument, QueryParseError, RawRecord,
    ViewDefinition, ViewQuery, ViewReference,
};

pub trait MetadataProvider {
    fn entity_metadata(&self, entity: &str) -> Result<EntityMetadata>;
}

/// Remote record access: saved view lookup and FetchXML execution.
pub trait RecordStore {
    fn retrieve_views(&self, query: &ViewQuery) -> Result<Vec<ViewDefinition>>;
    fn retrieve_multiple(&self, entity: &str, fetch_xml: &str) -> Result<Vec<RawRecord>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub view_id: String,
    pub entity: String,
    pub fetch_xml: String,
    pub records: Vec<RawRecord>,
}

/// Parses a fresh document from the view's FetchXML and applies the
/// dependent filter and localized projection to it.
pub fn prepare_query(
    base_fetch_xml: &str,
    dependent: Option<&DependentConstraint>,
    localized_attribute: Option<&str>,
) -> Result<QueryDocument, QueryParseError> {
    let mut doc = QueryDocument::parse(base_fetch_xml)?;
    if let Some(dependent) = dependent {
        doc.add_condition(&dependent.attribute_name, "eq", &dependent.value);
    }
    if let Some(attribute) = localized_attribute.filter(|name| !name.is_empty()) {
        doc.add_projected_attribute(attribute);
    }
    Ok(doc)
}

pub struct QueryResolver<'a> {
    store: &'a dyn RecordStore,
}

impl<'a> QueryResolver<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self { store }
    }

    pub fn fetch_view(&self, view: &ViewReference) -> Result<ViewDefinition, LookupError> {
        let query = view.query();
        let mut views = self
            .store
            .retrieve_views(&query)
            .map_err(|error| LookupError::from_anyhow(&view.target_entity, &error))?;
        if views.len() > 1 {
            tracing::debug!(
                entity = %view.target_entity,
                count = views.len(),
                "more than one view matched; using the first"
            );
        }
        if views.is_empty() {
            return Err(LookupError::resolution(
                &view.target_entity,
                match &query {
                    ViewQuery::ById(id) => format!("view {id} not found"),
                    ViewQuery::SystemView { query_type, .. } => {
                        format!("no system view of query type {query_type}")
                    }
                },
            ));
        }
        Ok(views.swap_remove(0))
    }

    /// Fetches the base view, scopes it and runs it. Each call starts from
    /// the stored view text, so conditions from earlier calls never leak in.
    pub fn resolve(
        &self,
        view: &ViewReference,
        dependent: Option<&DependentConstraint>,
        localized_attribute: Option<&str>,
    ) -> Result<Resolution, LookupError> {
        let definition = self.fetch_view(view)?;
        let doc = prepare_query(&definition.fetch_xml, dependent, localized_attribute)
            .map_err(|error| LookupError::resolution(&view.target_entity, error))?;
        let fetch_xml = doc.serialize();

        let entity = if definition.returned_type_code.is_empty() {
            view.target_entity.clone()
        } else {
            definition.returned_type_code.clone()
        };
        tracing::debug!(view_id = %definition.id, %entity, %fetch_xml, "executing view query");

        let records = self
            .store
            .retrieve_multiple(&entity, &fetch_xml)
            .map_err(|error| LookupError::from_anyhow(&view.target_entity, &error))?;

        Ok(Resolution {
            view_id: definition.id,
            entity,
            fetch_xml,
            records,
        })
    }
}

/// One resolution attempt, tagged so late results can be recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRequest {
    pub sequence: u64,
    pub view: ViewReference,
    pub dependent: Option<DependentConstraint>,
    pub localized_attribute: Option<String>,
}

impl ResolutionRequest {
    pub fn execute(&self, store: &dyn RecordStore) -> ResolutionOutcome {
        let result = QueryResolver::new(store).resolve(
            &self.view,
            self.dependent.as_ref(),
            self.localized_attribute.as_deref(),
        );
        ResolutionOutcome {
            sequence: self.sequence,
            result,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionOutcome {
    pub sequence: u64,
    pub result: Result<Resolution, LookupError>,
}
