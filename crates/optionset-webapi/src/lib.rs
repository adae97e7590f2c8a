// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use optionset_app::{
    EntityMetadata, MetadataProvider, OutputValue, RawRecord, RecordStore, ViewDefinition,
    ViewQuery,
};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

const FORMATTED_VALUE_ANNOTATION: &str = "OData.Community.Display.V1.FormattedValue";
const FORMATTED_VALUES_PREFERENCE: &str =
    "odata.include-annotations=\"OData.Community.Display.V1.FormattedValue\"";

/// Blocking client for the Dataverse Web API (`.../api/data/v9.2`).
#[derive(Debug)]
pub struct Client {
    base_url: String,
    timeout: Duration,
    http: HttpClient,
    entity_sets: Mutex<BTreeMap<String, EntityDefinition>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EntityDefinition {
    metadata: EntityMetadata,
    entity_set_name: String,
}

impl Client {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("webapi.base_url must not be empty");
        }
        let parsed = Url::parse(&base_url)
            .with_context(|| format!("webapi.base_url {base_url:?} is not a valid URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "webapi.base_url must use http or https, got {}://",
                parsed.scheme()
            );
        }
        if timeout.is_zero() {
            bail!("webapi.timeout must be positive");
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("odata-maxversion", HeaderValue::from_static("4.0"));
        headers.insert("odata-version", HeaderValue::from_static("4.0"));
        if let Some(token) = token.map(str::trim).filter(|token| !token.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("bearer token contains characters not allowed in a header")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            http,
            entity_sets: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Creates a record with only its primary name set and returns it as a
    /// lookup value.
    pub fn create_record(&self, entity: &str, name: &str) -> Result<OutputValue> {
        let name = name.trim();
        if name.is_empty() {
            bail!("a new {entity} needs a name");
        }
        let definition = self.definition(entity)?;
        let mut body = Map::new();
        body.insert(
            definition.metadata.primary_name_attribute.clone(),
            Value::String(name.to_owned()),
        );

        let url = format!("{}/{}", self.base_url, definition.entity_set_name);
        let created: Map<String, Value> = self.send_json(
            self.http
                .post(&url)
                .header("Prefer", "return=representation")
                .json(&body),
            &format!("create {entity}"),
        )?;

        let id = created
            .get(&definition.metadata.primary_id_attribute)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                anyhow!(
                    "created {entity} response has no `{}`",
                    definition.metadata.primary_id_attribute
                )
            })?;
        tracing::info!(entity, id, "record created through the web api");
        Ok(OutputValue {
            id: id.to_owned(),
            display_name: name.to_owned(),
            entity_type: entity.to_owned(),
        })
    }

    fn definition(&self, entity: &str) -> Result<EntityDefinition> {
        validate_logical_name(entity)?;
        if let Some(cached) = self.cached_definition(entity) {
            return Ok(cached);
        }

        let url = format!(
            "{}/EntityDefinitions(LogicalName='{entity}')?$select=LogicalName,PrimaryIdAttribute,PrimaryNameAttribute,EntitySetName,DisplayName",
            self.base_url
        );
        let raw: EntityDefinitionResponse =
            self.send_json(self.http.get(&url), &format!("load metadata for {entity}"))?;

        let display_name = raw
            .display_name
            .and_then(|label| label.user_localized_label)
            .map(|label| label.label)
            .unwrap_or_else(|| raw.logical_name.clone());
        let definition = EntityDefinition {
            metadata: EntityMetadata {
                logical_name: raw.logical_name,
                primary_id_attribute: raw.primary_id_attribute,
                primary_name_attribute: raw.primary_name_attribute.unwrap_or_default(),
                display_name,
            },
            entity_set_name: raw.entity_set_name,
        };

        if let Ok(mut cache) = self.entity_sets.lock() {
            cache.insert(entity.to_owned(), definition.clone());
        }
        Ok(definition)
    }

    fn cached_definition(&self, entity: &str) -> Option<EntityDefinition> {
        self.entity_sets
            .lock()
            .ok()
            .and_then(|cache| cache.get(entity).cloned())
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        action: &str,
    ) -> Result<T> {
        let response = request
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::warn!(action, status = status.as_u16(), "web api request failed");
            return Err(clean_error_response(status, &body));
        }
        response
            .json::<T>()
            .with_context(|| format!("{action}: decode response"))
    }
}

impl MetadataProvider for Client {
    fn entity_metadata(&self, entity: &str) -> Result<EntityMetadata> {
        Ok(self.definition(entity)?.metadata)
    }
}

impl RecordStore for Client {
    fn retrieve_views(&self, query: &ViewQuery) -> Result<Vec<ViewDefinition>> {
        let url = format!("{}/savedqueries?{}", self.base_url, saved_query_filter(query)?);
        let response: CollectionResponse<SavedQuery> =
            self.send_json(self.http.get(&url), "retrieve saved views")?;
        Ok(response
            .value
            .into_iter()
            .map(|view| ViewDefinition {
                id: view.savedqueryid,
                returned_type_code: view.returnedtypecode,
                fetch_xml: view.fetchxml,
            })
            .collect())
    }

    fn retrieve_multiple(&self, entity: &str, fetch_xml: &str) -> Result<Vec<RawRecord>> {
        let definition = self.definition(entity)?;
        let url = format!(
            "{}/{}?fetchXml={}",
            self.base_url,
            definition.entity_set_name,
            encode_query_value(fetch_xml)
        );
        let response: CollectionResponse<Map<String, Value>> = self.send_json(
            self.http.get(&url).header("Prefer", FORMATTED_VALUES_PREFERENCE),
            &format!("retrieve {entity} records"),
        )?;
        tracing::debug!(entity, count = response.value.len(), "retrieved records");
        Ok(response.value.into_iter().map(strip_annotations).collect())
    }
}

/// OData query string for a saved view lookup.
pub fn saved_query_filter(query: &ViewQuery) -> Result<String> {
    let filter = match query {
        ViewQuery::ById(id) => {
            validate_view_id(id)?;
            format!("savedqueryid eq {id}")
        }
        ViewQuery::SystemView { entity, query_type } => {
            validate_logical_name(entity)?;
            format!("returnedtypecode eq '{entity}' and querytype eq {query_type}")
        }
    };
    Ok(format!(
        "$top=1&$select=savedqueryid,fetchxml,returnedtypecode&$filter={}",
        encode_query_value(&filter)
    ))
}

pub fn encode_query_value(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn validate_logical_name(entity: &str) -> Result<()> {
    if entity.is_empty()
        || !entity
            .bytes()
            .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'_')
    {
        bail!("{entity:?} is not a valid entity logical name");
    }
    Ok(())
}

fn validate_view_id(id: &str) -> Result<()> {
    let trimmed = id.trim_matches(|ch| ch == '{' || ch == '}');
    if trimmed.len() != 36
        || !trimmed
            .bytes()
            .all(|byte| byte.is_ascii_hexdigit() || byte == b'-')
    {
        bail!("view id {id:?} is not a GUID");
    }
    Ok(())
}

fn strip_annotations(record: Map<String, Value>) -> RawRecord {
    record
        .into_iter()
        .filter_map(|(name, value)| {
            let annotated = name
                .split_once('@')
                .map(|(attribute, annotation)| (attribute.to_owned(), annotation.to_owned()));
            match annotated {
                None => Some((name, value)),
                Some((attribute, annotation))
                    if !attribute.is_empty() && annotation == FORMATTED_VALUE_ANNOTATION =>
                {
                    Some((format!("{attribute}_formatted"), value))
                }
                Some(_) => None,
            }
        })
        .collect()
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    anyhow!(
        "cannot reach {} -- check [webapi].base_url and network access ({})",
        base_url,
        error
    )
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<ODataErrorEnvelope>(body)
        && let Some(error) = parsed.error
        && !error.message.is_empty()
    {
        return anyhow!("server error ({}): {}", status.as_u16(), error.message);
    }

    if status == StatusCode::UNAUTHORIZED {
        return anyhow!(
            "server returned 401 -- set the bearer token in the env var named by [webapi].token_env"
        );
    }

    if !body.is_empty() && body.len() < 100 && !body.contains('{') {
        return anyhow!("server error ({}): {}", status.as_u16(), body);
    }

    anyhow!("server returned {}", status.as_u16())
}

#[derive(Debug, Deserialize)]
struct CollectionResponse<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct SavedQuery {
    savedqueryid: String,
    returnedtypecode: String,
    fetchxml: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EntityDefinitionResponse {
    logical_name: String,
    primary_id_attribute: String,
    primary_name_attribute: Option<String>,
    entity_set_name: String,
    display_name: Option<LocalizedLabels>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LocalizedLabels {
    user_localized_label: Option<LocalizedLabel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LocalizedLabel {
    label: String,
}

#[derive(Debug, Deserialize)]
struct ODataErrorEnvelope {
    error: Option<ODataError>,
}

#[derive(Debug, Deserialize)]
struct ODataError {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::{
        clean_error_response, encode_query_value, saved_query_filter, strip_annotations,
    };
    use anyhow::Result;
    use optionset_app::ViewQuery;
    use reqwest::StatusCode;
    use serde_json::json;

    #[test]
    fn encode_query_value_uses_percent_twenty_for_spaces() {
        assert_eq!(
            encode_query_value(r#"<fetch version="1.0">"#),
            "%3Cfetch%20version%3D%221.0%22%3E"
        );
    }

    #[test]
    fn system_view_filter_targets_query_type() -> Result<()> {
        let query = saved_query_filter(&ViewQuery::SystemView {
            entity: "city".to_owned(),
            query_type: 64,
        })?;
        assert!(query.starts_with("$top=1&$select=savedqueryid,fetchxml,returnedtypecode&$filter="));
        assert!(query.ends_with("returnedtypecode%20eq%20%27city%27%20and%20querytype%20eq%2064"));
        Ok(())
    }

    #[test]
    fn filters_reject_injection() {
        assert!(
            saved_query_filter(&ViewQuery::SystemView {
                entity: "city' or 1 eq 1".to_owned(),
                query_type: 64,
            })
            .is_err()
        );
        assert!(saved_query_filter(&ViewQuery::ById("not-a-guid".to_owned())).is_err());
        assert!(
            saved_query_filter(&ViewQuery::ById(
                "{6A1F3C52-0C4E-4D8B-9B61-1F0C6E3A0001}".to_owned()
            ))
            .is_ok()
        );
    }

    #[test]
    fn annotations_are_removed_or_renamed() {
        let record = strip_annotations(
            json!({
                "@odata.etag": "W/\"1\"",
                "cityid": "c-1",
                "statecode": 0,
                "statecode@OData.Community.Display.V1.FormattedValue": "Active",
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        );
        let names = record
            .attributes()
            .map(|(name, _)| name.to_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["cityid", "statecode", "statecode_formatted"]);
    }

    #[test]
    fn error_messages_prefer_odata_message() {
        let error = clean_error_response(
            StatusCode::NOT_FOUND,
            r#"{"error":{"code":"0x80040217","message":"savedquery With Id = x Does Not Exist"}}"#,
        );
        assert_eq!(
            error.to_string(),
            "server error (404): savedquery With Id = x Does Not Exist"
        );

        let unauthorized = clean_error_response(StatusCode::UNAUTHORIZED, "");
        assert!(unauthorized.to_string().contains("token_env"));
    }
}
