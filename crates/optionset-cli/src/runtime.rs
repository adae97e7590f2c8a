// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use optionset_app::{
    Control, ControlEvent, DependentConstraint, MetadataProvider, OutputValue, RawRecord,
    RecordStore, ResolutionRequest,
};
use optionset_db::Store;
use optionset_tui::{InternalEvent, LookupField, LookupRuntime, ScreenConfig, SlotId};
use optionset_webapi::Client;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread;

pub struct StoreRuntime<'a> {
    store: &'a Store,
}

impl<'a> StoreRuntime<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }
}

impl LookupRuntime for StoreRuntime<'_> {
    fn metadata(&self) -> &dyn MetadataProvider {
        self.store
    }

    fn records(&self) -> &dyn RecordStore {
        self.store
    }

    fn create_record(
        &mut self,
        entity: &str,
        name: &str,
        parent: Option<&DependentConstraint>,
    ) -> Result<OutputValue> {
        let mut extra = RawRecord::new();
        if let Some(parent) = parent {
            extra.insert(&parent.attribute_name, parent.value.as_str());
        }
        self.store.create_record(entity, name, &extra)
    }
}

/// Web API runtime. Resolutions run on a worker thread so a slow server
/// never blocks the terminal.
pub struct WebApiRuntime {
    client: Arc<Client>,
}

impl WebApiRuntime {
    pub fn new(client: Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl LookupRuntime for WebApiRuntime {
    fn metadata(&self) -> &dyn MetadataProvider {
        self.client.as_ref()
    }

    fn records(&self) -> &dyn RecordStore {
        self.client.as_ref()
    }

    fn create_record(
        &mut self,
        entity: &str,
        name: &str,
        parent: Option<&DependentConstraint>,
    ) -> Result<OutputValue> {
        if let Some(parent) = parent {
            tracing::warn!(
                entity,
                attribute = %parent.attribute_name,
                "quick-create over the web api does not bind the parent lookup"
            );
        }
        self.client.create_record(entity, name)
    }

    fn spawn_resolution(
        &mut self,
        slot: SlotId,
        request: ResolutionRequest,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let client = Arc::clone(&self.client);
        thread::Builder::new()
            .name(format!("resolve-{}", request.sequence))
            .spawn(move || {
                let outcome = request.execute(client.as_ref());
                if tx.send(InternalEvent::Resolved { slot, outcome }).is_err() {
                    tracing::debug!("resolution finished after the form closed");
                }
            })
            .context("spawn resolution worker")?;
        Ok(())
    }
}

/// Runs every configured field through a full initialize and resolution
/// cycle without opening the terminal. Returns each field label with the
/// number of records it resolved.
pub fn check_fields(
    provider: &dyn MetadataProvider,
    store: &dyn RecordStore,
    config: &ScreenConfig,
) -> Result<Vec<(String, usize)>> {
    config
        .parent
        .iter()
        .chain(std::iter::once(&config.child))
        .map(|field| check_field(provider, store, field))
        .collect()
}

fn check_field(
    provider: &dyn MetadataProvider,
    store: &dyn RecordStore,
    field: &LookupField,
) -> Result<(String, usize)> {
    let mut control = Control::new(field.params.clone());
    let events = control.initialize(provider);
    let events = control.run_requests(store, events);

    let mut loaded = None;
    for event in events {
        match event {
            ControlEvent::FallbackRendered(reason) => {
                bail!("{}: {reason}", field.label);
            }
            ControlEvent::OptionsLoaded { count } => loaded = Some(count),
            _ => {}
        }
    }
    let count = loaded.ok_or_else(|| anyhow!("{}: no options were resolved", field.label))?;
    tracing::info!(field = %field.label, count, "lookup field checked");
    Ok((field.label.clone(), count))
}
