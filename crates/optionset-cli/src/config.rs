// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use optionset_app::{DEFAULT_SEARCH_PLACEHOLDER, DependentBinding, HostParameters, LookupBinding};
use optionset_tui::{LookupField, ScreenConfig};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const CONFIG_VERSION: i64 = 1;
const DEFAULT_TOKEN_ENV: &str = "OPTIONSET_TOKEN";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LANGUAGE_ID: u32 = 1033;
const LOG_ENV: &str = "OPTIONSET_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Demo,
    Sqlite,
    WebApi,
}

impl SourceKind {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "demo" => Ok(Self::Demo),
            "sqlite" => Ok(Self::Sqlite),
            "webapi" => Ok(Self::WebApi),
            other => bail!("source.kind must be one of demo, sqlite, webapi; got {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub webapi: WebApi,
    #[serde(default)]
    pub control: Control,
    #[serde(default)]
    pub parent: Option<Parent>,
    #[serde(default)]
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            source: Source::default(),
            webapi: WebApi::default(),
            control: Control::default(),
            parent: Some(Parent::default()),
            logging: Logging::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Source {
    pub kind: Option<String>,
    pub db_path: Option<String>,
}

impl Default for Source {
    fn default() -> Self {
        Self {
            kind: Some("demo".to_owned()),
            db_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebApi {
    pub base_url: Option<String>,
    pub token_env: Option<String>,
    pub timeout: Option<String>,
}

impl Default for WebApi {
    fn default() -> Self {
        Self {
            base_url: None,
            token_env: Some(DEFAULT_TOKEN_ENV.to_owned()),
            timeout: Some("5s".to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Control {
    pub label: Option<String>,
    pub entity: Option<String>,
    pub view_id: Option<String>,
    pub sort_by_name: Option<bool>,
    pub add_search: Option<bool>,
    pub add_new: Option<bool>,
    pub attribute_mask: Option<String>,
    pub language_id: Option<u32>,
    pub search_placeholder: Option<String>,
    pub disabled: Option<bool>,
}

impl Default for Control {
    fn default() -> Self {
        Self {
            label: Some("City".to_owned()),
            entity: Some("city".to_owned()),
            view_id: None,
            sort_by_name: Some(true),
            add_search: Some(true),
            add_new: Some(true),
            attribute_mask: Some("name_{lcid}".to_owned()),
            language_id: Some(DEFAULT_LANGUAGE_ID),
            search_placeholder: Some(DEFAULT_SEARCH_PLACEHOLDER.to_owned()),
            disabled: Some(false),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Parent {
    pub label: Option<String>,
    pub entity: Option<String>,
    pub view_id: Option<String>,
    pub dependent_attribute: Option<String>,
}

impl Default for Parent {
    fn default() -> Self {
        Self {
            label: Some("Country".to_owned()),
            entity: Some("country".to_owned()),
            view_id: None,
            dependent_attribute: Some(optionset_db::DEMO_DEPENDENT_ATTRIBUTE.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logging {
    pub level: Option<String>,
    pub file: Option<String>,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: Some(DEFAULT_LOG_LEVEL.to_owned()),
            file: None,
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("OPTIONSET_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set OPTIONSET_CONFIG_PATH to the config file")
        })?;
        Ok(config_root
            .join(optionset_db::APP_NAME)
            .join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and place values under [source], [webapi], [control], [parent], and [logging]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let kind = self
            .source_kind()
            .with_context(|| format!("invalid [source] in {}", path.display()))?;

        if let Some(db_path) = &self.source.db_path {
            optionset_db::validate_db_path(db_path)?;
        }

        if kind == SourceKind::WebApi && self.webapi_base_url().is_none() {
            bail!(
                "source.kind = \"webapi\" in {} requires webapi.base_url",
                path.display()
            );
        }

        if let Some(timeout) = &self.webapi.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed.is_zero() {
                bail!(
                    "webapi.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        if let Some(token_env) = &self.webapi.token_env
            && token_env.trim().is_empty()
        {
            bail!("webapi.token_env in {} must not be empty", path.display());
        }

        if self
            .control
            .entity
            .as_deref()
            .is_some_and(|entity| entity.trim().is_empty())
        {
            bail!("control.entity in {} must not be empty", path.display());
        }

        if let Some(parent) = &self.parent {
            if parent
                .entity
                .as_deref()
                .is_none_or(|entity| entity.trim().is_empty())
            {
                bail!("parent.entity in {} is required", path.display());
            }
            if parent
                .dependent_attribute
                .as_deref()
                .is_none_or(|attribute| attribute.trim().is_empty())
            {
                bail!(
                    "parent.dependent_attribute in {} names the child column holding the parent id and is required",
                    path.display()
                );
            }
        }

        if let Some(level) = &self.logging.level {
            EnvFilter::try_new(level).with_context(|| {
                format!("logging.level {level:?} in {} is not a valid filter", path.display())
            })?;
        }

        Ok(())
    }

    pub fn source_kind(&self) -> Result<SourceKind> {
        SourceKind::parse(self.source.kind.as_deref().unwrap_or("demo"))
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.source.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => optionset_db::default_db_path(),
        }
    }

    pub fn webapi_base_url(&self) -> Option<&str> {
        self.webapi
            .base_url
            .as_deref()
            .map(|url| url.trim().trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }

    pub fn webapi_token_env(&self) -> &str {
        self.webapi
            .token_env
            .as_deref()
            .unwrap_or(DEFAULT_TOKEN_ENV)
    }

    /// Bearer token from the environment variable named by `webapi.token_env`.
    pub fn webapi_token(&self) -> Option<String> {
        env::var(self.webapi_token_env())
            .ok()
            .filter(|token| !token.trim().is_empty())
    }

    pub fn webapi_timeout(&self) -> Result<Duration> {
        parse_duration(self.webapi.timeout.as_deref().unwrap_or("5s"))
    }

    pub fn log_filter(&self) -> String {
        env::var(LOG_ENV)
            .ok()
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| {
                self.logging
                    .level
                    .clone()
                    .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned())
            })
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        if let Some(file) = &self.logging.file {
            return Ok(PathBuf::from(file));
        }
        let root = dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .ok_or_else(|| anyhow!("cannot resolve a log directory; set logging.file"))?;
        Ok(root.join(optionset_db::APP_NAME).join("optionset.log"))
    }

    pub fn screen_config(&self) -> ScreenConfig {
        let defaults = Control::default();
        let control = &self.control;
        let parent = self.parent.as_ref().map(|parent| LookupField {
            label: parent
                .label
                .clone()
                .or_else(|| parent.entity.clone())
                .unwrap_or_default(),
            params: HostParameters {
                lookup: LookupBinding {
                    target_entity: parent.entity.clone(),
                    view_id: parent.view_id.clone(),
                    value: None,
                },
                sort_by_name: Some(flag(true)),
                add_search: Some(flag(true)),
                ..HostParameters::default()
            },
        });

        let child = LookupField {
            label: control
                .label
                .clone()
                .or_else(|| control.entity.clone())
                .unwrap_or_default(),
            params: HostParameters {
                lookup: LookupBinding {
                    target_entity: control.entity.clone(),
                    view_id: control.view_id.clone(),
                    value: None,
                },
                dependant_lookup: self.parent.as_ref().map(|parent| DependentBinding {
                    attribute_name: parent.dependent_attribute.clone().unwrap_or_default(),
                    value_id: None,
                }),
                sort_by_name: Some(flag(control.sort_by_name.unwrap_or(false))),
                add_search: Some(flag(control.add_search.unwrap_or(false))),
                add_new: Some(flag(control.add_new.unwrap_or(false))),
                attribute_mask: control.attribute_mask.clone(),
                language_id: control
                    .language_id
                    .or(defaults.language_id)
                    .unwrap_or(DEFAULT_LANGUAGE_ID),
                search_placeholder: control
                    .search_placeholder
                    .clone()
                    .or(defaults.search_placeholder)
                    .unwrap_or_default(),
                disabled: control.disabled.unwrap_or(false),
            },
        };

        ScreenConfig {
            title: optionset_db::APP_NAME.to_owned(),
            parent,
            child,
        }
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# optionset config\n# Place this file at: {}\n\nversion = 1\n\n[source]\n# demo (in-memory sample data), sqlite, or webapi\nkind = \"demo\"\n# db_path = \"/absolute/path/to/optionset.db\"\n\n[webapi]\n# base_url = \"https://example.crm.dynamics.com/api/data/v9.2\"\ntoken_env = \"{}\"\ntimeout = \"5s\"\n\n[control]\nlabel = \"City\"\nentity = \"city\"\n# view_id = \"00000000-0000-0000-0000-000000000000\"\nsort_by_name = true\nadd_search = true\nadd_new = true\nattribute_mask = \"name_{{lcid}}\"\nlanguage_id = {}\nsearch_placeholder = \"{}\"\n\n[parent]\nlabel = \"Country\"\nentity = \"country\"\ndependent_attribute = \"{}\"\n\n[logging]\nlevel = \"{}\"\n# file = \"/absolute/path/to/optionset.log\"\n",
            path.display(),
            DEFAULT_TOKEN_ENV,
            DEFAULT_LANGUAGE_ID,
            DEFAULT_SEARCH_PLACEHOLDER,
            optionset_db::DEMO_DEPENDENT_ATTRIBUTE,
            DEFAULT_LOG_LEVEL,
        )
    }
}

fn flag(enabled: bool) -> String {
    if enabled { "1" } else { "0" }.to_owned()
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 5s)")
}

#[cfg(test)]
mod tests {
    use super::{Config, SourceKind, parse_duration};
    use anyhow::Result;
    use optionset_app::flag_enabled;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_demo_defaults() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert_eq!(config.source_kind()?, SourceKind::Demo);

        let screen = config.screen_config();
        let parent = screen.parent.expect("demo config has a parent field");
        assert_eq!(parent.params.lookup.target_entity.as_deref(), Some("country"));
        assert_eq!(screen.child.params.target_entity(), Some("city"));
        assert_eq!(
            screen.child.params.localized_attribute().as_deref(),
            Some("name_1033")
        );
        assert_eq!(
            screen
                .child
                .params
                .dependant_lookup
                .map(|binding| binding.attribute_name)
                .as_deref(),
            Some("countryid")
        );
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[control]\nentity = \"account\"\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[control]"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 2\n")?;
        let error = Config::load(&path).expect_err("v2 config should fail");
        assert!(error.to_string().contains("unsupported config version 2"));
        Ok(())
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn control_section_maps_to_host_parameters() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[source]\nkind = \"sqlite\"\ndb_path = \"/tmp/lookups.db\"\n[control]\nlabel = \"Account\"\nentity = \"account\"\nview_id = \"6a1f3c52-0c4e-4d8b-9b61-1f0c6e3a0009\"\nsort_by_name = false\nadd_search = true\nattribute_mask = \"name_{lcid}\"\nlanguage_id = 1031\ndisabled = true\n",
        )?;
        let config = Config::load(&path)?;
        assert_eq!(config.source_kind()?, SourceKind::Sqlite);
        assert_eq!(config.db_path()?, PathBuf::from("/tmp/lookups.db"));

        let screen = config.screen_config();
        assert!(screen.parent.is_none());
        let params = screen.child.params;
        assert_eq!(screen.child.label, "Account");
        assert!(params.dependant_lookup.is_none());
        assert!(!flag_enabled(params.sort_by_name.as_deref()));
        assert!(flag_enabled(params.add_search.as_deref()));
        assert!(!flag_enabled(params.add_new.as_deref()));
        assert_eq!(params.localized_attribute().as_deref(), Some("name_1031"));
        assert_eq!(
            params.lookup.view_id.as_deref(),
            Some("6a1f3c52-0c4e-4d8b-9b61-1f0c6e3a0009")
        );
        assert_eq!(params.search_placeholder, "Search...");
        assert!(params.disabled);
        Ok(())
    }

    #[test]
    fn unknown_source_kind_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[source]\nkind = \"ftp\"\n")?;
        let error = Config::load(&path).expect_err("unknown source should fail");
        assert!(format!("{error:#}").contains("demo, sqlite, webapi"));
        Ok(())
    }

    #[test]
    fn webapi_source_requires_base_url() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[source]\nkind = \"webapi\"\n")?;
        let error = Config::load(&path).expect_err("missing base_url should fail");
        assert!(error.to_string().contains("requires webapi.base_url"));

        let (_temp, path) = write_config(
            "version = 1\n[source]\nkind = \"webapi\"\n[webapi]\nbase_url = \"https://example.crm.dynamics.com/api/data/v9.2//\"\ntimeout = \"500ms\"\n",
        )?;
        let config = Config::load(&path)?;
        assert_eq!(
            config.webapi_base_url(),
            Some("https://example.crm.dynamics.com/api/data/v9.2")
        );
        assert_eq!(config.webapi_timeout()?, Duration::from_millis(500));
        Ok(())
    }

    #[test]
    fn webapi_token_comes_from_named_env_var() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) =
            write_config("version = 1\n[webapi]\ntoken_env = \"OPTIONSET_TEST_TOKEN\"\n")?;
        let config = Config::load(&path)?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("OPTIONSET_TEST_TOKEN", "secret");
        }
        let token = config.webapi_token();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("OPTIONSET_TEST_TOKEN");
        }
        assert_eq!(token.as_deref(), Some("secret"));
        assert_eq!(config.webapi_token(), None);
        Ok(())
    }

    #[test]
    fn parent_requires_dependent_attribute() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[parent]\nentity = \"country\"\n")?;
        let error = Config::load(&path).expect_err("parent without attribute should fail");
        assert!(error.to_string().contains("parent.dependent_attribute"));
        Ok(())
    }

    #[test]
    fn empty_control_entity_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[control]\nentity = \"  \"\n")?;
        let error = Config::load(&path).expect_err("empty entity should fail");
        assert!(error.to_string().contains("control.entity"));
        Ok(())
    }

    #[test]
    fn db_path_rejects_uri_style_value() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[source]\nkind = \"sqlite\"\ndb_path = \"https://evil.example/optionset.db\"\n",
        )?;
        assert!(Config::load(&path).is_err());
        Ok(())
    }

    #[test]
    fn invalid_log_level_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[logging]\nlevel = \"=[\"\n")?;
        let error = Config::load(&path).expect_err("bad filter should fail");
        assert!(error.to_string().contains("logging.level"));
        Ok(())
    }

    #[test]
    fn log_filter_prefers_env_override() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config("version = 1\n[logging]\nlevel = \"warn\"\n")?;
        let config = Config::load(&path)?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::remove_var("OPTIONSET_LOG");
        }
        assert_eq!(config.log_filter(), "warn");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("OPTIONSET_LOG", "optionset_app=debug");
        }
        let overridden = config.log_filter();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("OPTIONSET_LOG");
        }
        assert_eq!(overridden, "optionset_app=debug");
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("OPTIONSET_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("OPTIONSET_CONFIG_PATH");
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn timeouts_parse_ms_seconds_and_minutes() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("5s")?, Duration::from_secs(5));
        assert_eq!(parse_duration("2m")?, Duration::from_secs(120));
        assert!(parse_duration("soon").is_err());
        Ok(())
    }

    #[test]
    fn zero_timeout_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[webapi]\ntimeout = \"0s\"\n")?;
        let error = Config::load(&path).expect_err("zero timeout should fail");
        assert!(error.to_string().contains("must be positive"));
        Ok(())
    }

    #[test]
    fn example_config_round_trips_through_load() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, Config::example_config(&path))?;
        let config = Config::load(&path)?;
        assert_eq!(config.source_kind()?, SourceKind::Demo);
        assert_eq!(
            config.screen_config().child.params.attribute_mask.as_deref(),
            Some("name_{lcid}")
        );
        Ok(())
    }
}
