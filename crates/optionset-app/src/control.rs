// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Host-facing lifecycle of one lookup control.
//!
//! The control never performs I/O on its own. Resolution work is handed to
//! the caller as a [`ResolutionRequest`] and the result comes back through
//! [`Control::apply_resolution`]. Only the most recent request is honored.

use anyhow::Result;

use crate::{
    ChangedInput, EntityMetadata, HostParameters, InputSurface, MetadataProvider, NO_VALUE_KEY,
    OptionItem, OutputValue, RecordFields, RecordStore, ResolutionOutcome, ResolutionRequest,
    Selector, SelectorCommand, SelectorEvent, SelectorProps, SelectorView, assemble,
};

pub const FALLBACK_TEXT: &str = "---";

/// Callbacks into the hosting form.
pub trait Host {
    /// Tells the host that [`Control::produce_output`] has a new value.
    fn notify_output_changed(&mut self);

    /// Runs the host's quick-create flow. `Ok(None)` means the user cancelled.
    fn create_record(&mut self, entity: &str) -> Result<Option<OutputValue>> {
        tracing::debug!(entity, "host has no create flow");
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    OutputChanged(Option<OutputValue>),
    ResolutionRequested(ResolutionRequest),
    ResolutionDiscarded { sequence: u64 },
    OptionsLoaded { count: usize },
    FallbackRendered(String),
    Selector(SelectorEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlView {
    Loading,
    Fallback(String),
    Ready(SelectorView),
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Loading,
    Ready,
    Fallback,
    Destroyed,
}

#[derive(Debug)]
pub struct Control {
    params: HostParameters,
    metadata: Option<EntityMetadata>,
    options: Vec<OptionItem>,
    output: Option<OutputValue>,
    selected_key: String,
    parent_id: Option<String>,
    created_id: Option<String>,
    selector: Selector,
    phase: Phase,
    last_sequence: u64,
    in_flight: Option<u64>,
}

impl Control {
    pub fn new(params: HostParameters) -> Self {
        let selected_key = params.selected_key();
        let output = params.lookup.value.clone();
        let parent_id = params.dependent_id().map(str::to_owned);
        Self {
            params,
            metadata: None,
            options: Vec::new(),
            output,
            selected_key,
            parent_id,
            created_id: None,
            selector: Selector::new(),
            phase: Phase::Uninitialized,
            last_sequence: 0,
            in_flight: None,
        }
    }

    pub fn params(&self) -> &HostParameters {
        &self.params
    }

    pub fn options(&self) -> &[OptionItem] {
        &self.options
    }

    pub fn selected_key(&self) -> &str {
        &self.selected_key
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    pub fn is_destroyed(&self) -> bool {
        self.phase == Phase::Destroyed
    }

    /// Loads metadata for the target entity and requests the first option
    /// list. Calling it again after a failure retries from scratch.
    pub fn initialize(&mut self, provider: &dyn MetadataProvider) -> Vec<ControlEvent> {
        if self.phase == Phase::Destroyed {
            return Vec::new();
        }
        let Some(entity) = self.params.target_entity().map(str::to_owned) else {
            tracing::warn!("lookup target entity is not configured");
            return self.fallback("lookup target entity is not configured".to_owned());
        };

        match provider.entity_metadata(&entity) {
            Ok(metadata) => {
                tracing::debug!(
                    %entity,
                    id = %metadata.primary_id_attribute,
                    name = %metadata.primary_name_attribute,
                    "loaded entity metadata"
                );
                self.metadata = Some(metadata);
            }
            Err(error) => {
                tracing::error!(%entity, error = format!("{error:#}"), "entity metadata failed");
                return self.fallback(format!("load metadata for {entity}: {error:#}"));
            }
        }

        self.begin_resolution().into_iter().collect()
    }

    /// Applies new host parameters. A changed parent value clears the output
    /// and the stale options before the refetch is requested; a changed bound
    /// value only updates the selection. When metadata never loaded, the
    /// refetch starts over from `provider`.
    pub fn on_inputs_changed(
        &mut self,
        params: HostParameters,
        changed: &[ChangedInput],
        provider: &dyn MetadataProvider,
        host: &mut dyn Host,
    ) -> Vec<ControlEvent> {
        if self.phase == Phase::Destroyed {
            return Vec::new();
        }
        self.params = params;
        let mut events = Vec::new();

        if changed.contains(&ChangedInput::DependantLookup) {
            let parent_id = self.params.dependent_id().map(str::to_owned);
            if parent_id != self.parent_id {
                tracing::debug!(
                    from = ?self.parent_id,
                    to = ?parent_id,
                    "parent value changed; clearing selection"
                );
                self.parent_id = parent_id;
                self.output = None;
                self.selected_key = NO_VALUE_KEY.to_owned();
                self.created_id = None;
                self.options.clear();
                host.notify_output_changed();
                events.push(ControlEvent::OutputChanged(None));
                if self.metadata.is_none() {
                    events.extend(self.initialize(provider));
                } else {
                    events.extend(self.begin_resolution());
                }
                return events;
            }
        }

        if changed.contains(&ChangedInput::Lookup) {
            self.output = self.params.lookup.value.clone();
            self.selected_key = self
                .created_id
                .clone()
                .unwrap_or_else(|| self.params.selected_key());
        }
        events
    }

    /// Starts a new resolution attempt and supersedes any outstanding one.
    pub fn begin_resolution(&mut self) -> Option<ControlEvent> {
        if self.phase == Phase::Destroyed || self.metadata.is_none() {
            return None;
        }
        let view = self.params.view_reference()?;
        self.last_sequence += 1;
        let request = ResolutionRequest {
            sequence: self.last_sequence,
            view,
            dependent: self.params.dependent_constraint(),
            localized_attribute: self.params.localized_attribute(),
        };
        if let Some(stale) = self.in_flight.replace(request.sequence) {
            tracing::debug!(stale, superseded_by = request.sequence, "superseding resolution");
        }
        self.phase = Phase::Loading;
        Some(ControlEvent::ResolutionRequested(request))
    }

    pub fn apply_resolution(&mut self, outcome: ResolutionOutcome) -> Vec<ControlEvent> {
        if self.in_flight != Some(outcome.sequence) {
            tracing::debug!(
                sequence = outcome.sequence,
                current = ?self.in_flight,
                "discarding stale resolution"
            );
            return vec![ControlEvent::ResolutionDiscarded {
                sequence: outcome.sequence,
            }];
        }
        self.in_flight = None;

        let resolution = match outcome.result {
            Ok(resolution) => resolution,
            Err(error) => {
                tracing::error!(%error, "option resolution failed");
                return self.fallback(error.to_string());
            }
        };
        let Some(metadata) = self.metadata.as_ref() else {
            return self.fallback("entity metadata is unavailable".to_owned());
        };

        let localized = self.params.localized_attribute();
        let fields = RecordFields {
            id: &metadata.primary_id_attribute,
            name: &metadata.primary_name_attribute,
            localized: localized.as_deref(),
        };
        self.options = assemble(
            &resolution.records,
            &fields,
            &self.params.assembly_settings(),
        );
        if let Some(created) = self.created_id.take() {
            self.selected_key = created;
        }
        self.phase = Phase::Ready;

        let count = resolution.records.len();
        tracing::info!(
            entity = %resolution.entity,
            view_id = %resolution.view_id,
            count,
            "options loaded"
        );
        vec![ControlEvent::OptionsLoaded { count }]
    }

    /// Runs every requested resolution against `store` right away and feeds
    /// the outcomes back in. Returns the input events followed by the results.
    pub fn run_requests(
        &mut self,
        store: &dyn RecordStore,
        events: Vec<ControlEvent>,
    ) -> Vec<ControlEvent> {
        let mut all = Vec::with_capacity(events.len() + 1);
        for event in events {
            let request = match &event {
                ControlEvent::ResolutionRequested(request) => Some(request.clone()),
                _ => None,
            };
            all.push(event);
            if let Some(request) = request {
                let outcome = request.execute(store);
                all.extend(self.apply_resolution(outcome));
            }
        }
        all
    }

    pub fn handle(
        &mut self,
        command: SelectorCommand,
        surface: &mut dyn InputSurface,
        host: &mut dyn Host,
    ) -> Vec<ControlEvent> {
        if !matches!(self.phase, Phase::Ready | Phase::Loading) {
            return Vec::new();
        }
        let props = SelectorProps {
            options: &self.options,
            selected_key: Some(&self.selected_key),
            disabled: self.params.disabled,
        };
        let selector_events = self.selector.dispatch(&props, command, surface);

        // While loading the selector can still open and close, but nothing
        // is committed until the new option list is in place.
        let ready = self.phase == Phase::Ready;
        let mut events = Vec::new();
        for event in selector_events {
            match &event {
                SelectorEvent::Selected(_) | SelectorEvent::AddNewRequested if !ready => {
                    tracing::debug!(?event, "ignoring selection while options load");
                    events.push(ControlEvent::Selector(event.clone()));
                }
                SelectorEvent::Selected(option) => {
                    events.push(ControlEvent::Selector(event.clone()));
                    events.push(self.commit(option.clone(), host));
                }
                SelectorEvent::AddNewRequested => {
                    events.push(ControlEvent::Selector(event.clone()));
                    events.extend(self.create_record(host));
                }
                _ => events.push(ControlEvent::Selector(event.clone())),
            }
        }
        events
    }

    /// Takes a record the host created outside of [`Control::handle`] as the
    /// new value and reloads the options so it can be shown as selected.
    pub fn accept_created_record(
        &mut self,
        created: OutputValue,
        host: &mut dyn Host,
    ) -> Vec<ControlEvent> {
        if self.phase == Phase::Destroyed {
            return Vec::new();
        }
        tracing::info!(entity = %created.entity_type, id = %created.id, "record created");
        self.selected_key = created.id.clone();
        self.created_id = Some(created.id.clone());
        self.output = Some(created);
        host.notify_output_changed();

        let mut events = vec![ControlEvent::OutputChanged(self.output.clone())];
        events.extend(self.begin_resolution());
        events
    }

    /// The value reported to the host. `None` means no value.
    pub fn produce_output(&self) -> Option<OutputValue> {
        self.output.clone()
    }

    pub fn view(&self) -> ControlView {
        match self.phase {
            Phase::Uninitialized | Phase::Loading => ControlView::Loading,
            Phase::Fallback => ControlView::Fallback(FALLBACK_TEXT.to_owned()),
            Phase::Destroyed => ControlView::Destroyed,
            Phase::Ready => ControlView::Ready(self.selector.view(&SelectorProps {
                options: &self.options,
                selected_key: Some(&self.selected_key),
                disabled: self.params.disabled,
            })),
        }
    }

    /// Releases listeners and drops pending work; later outcomes are ignored.
    pub fn teardown(&mut self, surface: &mut dyn InputSurface) -> Vec<ControlEvent> {
        if self.phase == Phase::Destroyed {
            return Vec::new();
        }
        let events = self
            .selector
            .teardown(surface)
            .into_iter()
            .map(ControlEvent::Selector)
            .collect();
        self.phase = Phase::Destroyed;
        self.in_flight = None;
        self.options.clear();
        tracing::debug!("control destroyed");
        events
    }

    fn commit(&mut self, option: OptionItem, host: &mut dyn Host) -> ControlEvent {
        self.output = if option.is_no_value() {
            None
        } else {
            Some(OutputValue {
                id: option.key.clone(),
                display_name: option.text.clone(),
                entity_type: self.params.target_entity().unwrap_or_default().to_owned(),
            })
        };
        self.selected_key = option.key;
        self.created_id = None;
        host.notify_output_changed();
        ControlEvent::OutputChanged(self.output.clone())
    }

    fn create_record(&mut self, host: &mut dyn Host) -> Vec<ControlEvent> {
        let Some(entity) = self.params.target_entity().map(str::to_owned) else {
            return Vec::new();
        };
        let created = match host.create_record(&entity) {
            Ok(Some(created)) => created,
            Ok(None) => {
                tracing::debug!(%entity, "record creation cancelled");
                return Vec::new();
            }
            Err(error) => {
                tracing::warn!(%entity, error = format!("{error:#}"), "record creation failed");
                return Vec::new();
            }
        };

        self.accept_created_record(created, host)
    }

    fn fallback(&mut self, reason: String) -> Vec<ControlEvent> {
        self.phase = Phase::Fallback;
        self.options.clear();
        vec![ControlEvent::FallbackRendered(reason)]
    }
}
