// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
    MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use optionset_app::{
    ADD_NEW_KEY, ChangedInput, Control, ControlEvent, ControlView, DependentConstraint, Geometry,
    Host, HostParameters, InputSurface, Listener, MetadataProvider, OutputValue, OverlayView,
    Point, RecordStore, ResolutionOutcome, ResolutionRequest, SelectorCommand, Viewport,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

/// Selector geometry is measured in layout units, not cells, so the overlay
/// placement threshold keeps its meaning on a terminal.
pub const UNITS_PER_COLUMN: f32 = 8.0;
pub const UNITS_PER_ROW: f32 = 20.0;

const FIELD_HEIGHT: u16 = 3;
const MAX_FIELD_WIDTH: u16 = 48;
const MIN_OVERLAY_WIDTH: u16 = 28;
const PAGE_ROWS: isize = 10;
const LOADING_TEXT: &str = "Loading...";
const NO_MATCHES_TEXT: &str = "no matches";
const HELP_TEXT: &str = "tab: next field | enter: open | esc: close | ctrl+n: add new | q: quit";
const PROMPT_HELP_TEXT: &str = "enter: create | esc: cancel";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotId {
    Parent,
    Child,
}

/// One lookup field on the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupField {
    pub label: String,
    pub params: HostParameters,
}

/// The form layout: an optional parent lookup that scopes the child lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenConfig {
    pub title: String,
    pub parent: Option<LookupField>,
    pub child: LookupField,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    Resolved {
        slot: SlotId,
        outcome: ResolutionOutcome,
    },
}

/// Data access used by the form. Resolution may finish on another thread;
/// results always come back through the internal event channel.
pub trait LookupRuntime {
    fn metadata(&self) -> &dyn MetadataProvider;
    fn records(&self) -> &dyn RecordStore;
    fn create_record(
        &mut self,
        entity: &str,
        name: &str,
        parent: Option<&DependentConstraint>,
    ) -> Result<OutputValue>;
    fn spawn_resolution(
        &mut self,
        slot: SlotId,
        request: ResolutionRequest,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let outcome = request.execute(self.records());
        tx.send(InternalEvent::Resolved { slot, outcome })
            .map_err(|_| anyhow!("resolution channel closed"))?;
        Ok(())
    }
}

/// Listener registry for the terminal. Mouse capture stays on for the whole
/// session; the registry decides which selectors see global input.
#[derive(Debug, Default)]
pub struct TerminalSurface {
    attached: HashMap<Listener, usize>,
}

impl TerminalSurface {
    pub fn is_attached(&self, listener: Listener) -> bool {
        self.attached.get(&listener).is_some_and(|count| *count > 0)
    }

    pub fn is_idle(&self) -> bool {
        self.attached.values().all(|count| *count == 0)
    }
}

impl InputSurface for TerminalSurface {
    fn attach(&mut self, listener: Listener) {
        *self.attached.entry(listener).or_default() += 1;
        tracing::trace!(?listener, "listener attached");
    }

    fn detach(&mut self, listener: Listener) {
        if let Some(count) = self.attached.get_mut(&listener) {
            *count = count.saturating_sub(1);
        }
        tracing::trace!(?listener, "listener detached");
    }
}

#[derive(Debug, Default)]
struct FieldHost {
    notifications: usize,
    create_requested: Option<String>,
}

impl Host for FieldHost {
    fn notify_output_changed(&mut self) {
        self.notifications += 1;
    }

    fn create_record(&mut self, entity: &str) -> Result<Option<OutputValue>> {
        // Finished by the name prompt.
        self.create_requested = Some(entity.to_owned());
        Ok(None)
    }
}

#[derive(Debug)]
struct Slot {
    id: SlotId,
    label: String,
    params: HostParameters,
    control: Control,
    notifications: usize,
}

impl Slot {
    fn new(id: SlotId, field: LookupField) -> Self {
        Self {
            id,
            label: field.label,
            control: Control::new(field.params.clone()),
            params: field.params,
            notifications: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CreatePrompt {
    slot: usize,
    entity: String,
    name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OverlayLayout {
    area: Rect,
    search_row: Option<u16>,
    item_rows: Vec<(u16, String)>,
    add_new_row: Option<u16>,
    offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum OverlayTarget {
    Item(String),
    AddNew,
    Chrome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OverlayRow {
    text: String,
    highlighted: bool,
    muted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ScreenLayout {
    header: Rect,
    fields: Vec<Rect>,
    status: Rect,
}

#[derive(Debug)]
pub struct Screen {
    title: String,
    slots: Vec<Slot>,
    focus: usize,
    surface: TerminalSurface,
    area: Rect,
    fields: Vec<Rect>,
    overlay: Option<(usize, OverlayLayout)>,
    prompt: Option<CreatePrompt>,
    status: Option<String>,
}

impl Screen {
    pub fn new(config: ScreenConfig) -> Self {
        let mut slots = Vec::with_capacity(2);
        let parent_value = config
            .parent
            .as_ref()
            .and_then(|field| field.params.lookup.value.as_ref())
            .map(|value| value.id.clone());
        let has_parent = config.parent.is_some();
        if let Some(parent) = config.parent {
            slots.push(Slot::new(SlotId::Parent, parent));
        }

        let mut child = config.child;
        if has_parent && let Some(binding) = child.params.dependant_lookup.as_mut() {
            binding.value_id = parent_value;
        }
        slots.push(Slot::new(SlotId::Child, child));

        Self {
            title: config.title,
            slots,
            focus: 0,
            surface: TerminalSurface::default(),
            area: Rect::default(),
            fields: Vec::new(),
            overlay: None,
            prompt: None,
            status: None,
        }
    }

    pub fn initialize<R: LookupRuntime>(&mut self, runtime: &mut R, tx: &Sender<InternalEvent>) {
        for index in 0..self.slots.len() {
            let events = self.slots[index].control.initialize(runtime.metadata());
            self.process_events(runtime, tx, index, events);
        }
        self.refresh_layout(self.area);
    }

    pub fn control(&self, slot: SlotId) -> Option<&Control> {
        self.slot(slot).map(|slot| &slot.control)
    }

    pub fn output(&self, slot: SlotId) -> Option<OutputValue> {
        self.slot(slot).and_then(|slot| slot.control.produce_output())
    }

    /// Number of times the field reported a changed value to the form.
    pub fn notifications(&self, slot: SlotId) -> usize {
        self.slot(slot).map_or(0, |slot| slot.notifications)
    }

    pub fn focus(&self) -> SlotId {
        self.slots
            .get(self.focus)
            .map_or(SlotId::Child, |slot| slot.id)
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn surface(&self) -> &TerminalSurface {
        &self.surface
    }

    pub fn is_prompting(&self) -> bool {
        self.prompt.is_some()
    }

    /// Recomputes field and overlay positions for `area` and tells the open
    /// selector where its overlay landed.
    pub fn refresh_layout(&mut self, area: Rect) {
        self.area = area;
        self.fields = screen_layout(area, self.slots.len()).fields;
        self.overlay = None;

        let Some(index) = self.open_slot() else {
            return;
        };
        let (Some(field), ControlView::Ready(view)) =
            (self.fields.get(index).copied(), self.slots[index].control.view())
        else {
            return;
        };
        let Some(overlay) = view.overlay else {
            return;
        };
        let layout = overlay_layout(&overlay, field, area);
        let mut host = FieldHost::default();
        self.slots[index].control.handle(
            SelectorCommand::PlaceOverlay(unit_rect(layout.area)),
            &mut self.surface,
            &mut host,
        );
        self.overlay = Some((index, layout));
    }

    pub fn teardown(&mut self) {
        for slot in &mut self.slots {
            slot.control.teardown(&mut self.surface);
        }
        self.overlay = None;
        self.prompt = None;
    }

    fn slot(&self, id: SlotId) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.id == id)
    }

    fn index_of(&self, id: SlotId) -> Option<usize> {
        self.slots.iter().position(|slot| slot.id == id)
    }

    fn open_slot(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.control.selector().is_open())
    }

    fn open_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.control.selector().is_open())
            .map(|(index, _)| index)
            .collect()
    }

    fn cycle_focus(&mut self, delta: isize) {
        let count = self.slots.len() as isize;
        if count > 0 {
            self.focus = (self.focus as isize + delta).rem_euclid(count) as usize;
        }
    }

    fn geometry_for(&self, index: usize) -> Option<Geometry> {
        let field = self.fields.get(index)?;
        Some(Geometry {
            trigger: unit_rect(*field),
            viewport: Viewport {
                width: f32::from(self.area.width) * UNITS_PER_COLUMN,
                height: f32::from(self.area.height) * UNITS_PER_ROW,
            },
        })
    }

    fn field_at(&self, column: u16, row: u16) -> Option<usize> {
        self.fields
            .iter()
            .position(|field| cell_in(*field, column, row))
    }

    fn overlay_target(&self, column: u16, row: u16) -> Option<(usize, OverlayTarget)> {
        let (index, layout) = self.overlay.as_ref()?;
        if !cell_in(layout.area, column, row) {
            return None;
        }
        if let Some((_, key)) = layout.item_rows.iter().find(|(item_row, _)| *item_row == row) {
            return Some((*index, OverlayTarget::Item(key.clone())));
        }
        if layout.add_new_row == Some(row) {
            return Some((*index, OverlayTarget::AddNew));
        }
        Some((*index, OverlayTarget::Chrome))
    }

    fn search_enabled(&self, index: usize) -> bool {
        matches!(
            self.slots.get(index).map(|slot| slot.control.view()),
            Some(ControlView::Ready(view))
                if view.overlay.as_ref().is_some_and(|overlay| overlay.search.is_some())
        )
    }

    fn search_text(&self, index: usize) -> String {
        self.slots
            .get(index)
            .map(|slot| slot.control.selector().search_text().to_owned())
            .unwrap_or_default()
    }

    fn apply_internal_event<R: LookupRuntime>(
        &mut self,
        runtime: &mut R,
        tx: &Sender<InternalEvent>,
        event: InternalEvent,
    ) {
        match event {
            InternalEvent::Resolved { slot, outcome } => {
                let Some(index) = self.index_of(slot) else {
                    return;
                };
                let events = self.slots[index].control.apply_resolution(outcome);
                self.process_events(runtime, tx, index, events);
                self.refresh_layout(self.area);
            }
        }
    }

    fn process_events<R: LookupRuntime>(
        &mut self,
        runtime: &mut R,
        tx: &Sender<InternalEvent>,
        index: usize,
        events: Vec<ControlEvent>,
    ) {
        let mut queue = events
            .into_iter()
            .map(|event| (index, event))
            .collect::<VecDeque<_>>();

        while let Some((index, event)) = queue.pop_front() {
            let Some(slot) = self.slots.get_mut(index) else {
                continue;
            };
            match event {
                ControlEvent::ResolutionRequested(request) => {
                    let sequence = request.sequence;
                    if let Err(error) = runtime.spawn_resolution(slot.id, request, tx.clone()) {
                        tracing::error!(
                            field = %slot.label,
                            sequence,
                            error = format!("{error:#}"),
                            "could not start resolution"
                        );
                        self.status = Some(format!("{}: {error:#}", slot.label));
                    }
                }
                ControlEvent::FallbackRendered(reason) => {
                    self.status = Some(format!("{}: {reason}", slot.label));
                }
                ControlEvent::OptionsLoaded { count } => {
                    tracing::debug!(field = %slot.label, count, "options ready");
                }
                ControlEvent::OutputChanged(value) => {
                    // The form writes the value back into the bound input.
                    slot.params.lookup.value = value.clone();
                    let mut host = FieldHost::default();
                    let echoed = slot.control.on_inputs_changed(
                        slot.params.clone(),
                        &[ChangedInput::Lookup],
                        runtime.metadata(),
                        &mut host,
                    );
                    queue.extend(echoed.into_iter().map(|event| (index, event)));

                    if slot.id == SlotId::Parent
                        && let Some(child) = self.index_of(SlotId::Child)
                    {
                        let child_slot = &mut self.slots[child];
                        if let Some(binding) = child_slot.params.dependant_lookup.as_mut() {
                            binding.value_id = value.map(|value| value.id);
                        }
                        let mut host = FieldHost::default();
                        let events = child_slot.control.on_inputs_changed(
                            child_slot.params.clone(),
                            &[ChangedInput::DependantLookup],
                            runtime.metadata(),
                            &mut host,
                        );
                        child_slot.notifications += host.notifications;
                        queue.extend(events.into_iter().map(|event| (child, event)));
                    }
                }
                ControlEvent::ResolutionDiscarded { .. } | ControlEvent::Selector(_) => {}
            }
        }
    }
}

pub fn run_app<R: LookupRuntime>(screen: &mut Screen, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen, EnableMouseCapture)
        .context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    let (internal_tx, internal_rx) = mpsc::channel();

    let result = terminal
        .size()
        .context("read terminal size")
        .and_then(|size| {
            screen.refresh_layout(Rect::new(0, 0, size.width, size.height));
            screen.initialize(runtime, &internal_tx);
            event_loop(&mut terminal, screen, runtime, &internal_tx, &internal_rx)
        });

    screen.teardown();
    disable_raw_mode().context("disable raw mode")?;
    execute!(
        io::stdout(),
        DisableMouseCapture,
        terminal::LeaveAlternateScreen
    )
    .context("leave alternate screen")?;
    result
}

fn event_loop<R: LookupRuntime>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    screen: &mut Screen,
    runtime: &mut R,
    internal_tx: &Sender<InternalEvent>,
    internal_rx: &Receiver<InternalEvent>,
) -> Result<()> {
    loop {
        process_internal_events(screen, runtime, internal_tx, internal_rx);

        terminal
            .draw(|frame| render(frame, screen))
            .context("draw frame")?;

        if !event::poll(Duration::from_millis(120)).context("poll event")? {
            continue;
        }
        match event::read().context("read event")? {
            Event::Key(key) => {
                if handle_key_event(screen, runtime, internal_tx, key, Instant::now()) {
                    return Ok(());
                }
            }
            Event::Mouse(mouse) => {
                handle_mouse_event(screen, runtime, internal_tx, mouse, Instant::now());
            }
            Event::Resize(width, height) => {
                handle_resize(screen, runtime, internal_tx, Rect::new(0, 0, width, height));
            }
            _ => {}
        }
    }
}

pub fn process_internal_events<R: LookupRuntime>(
    screen: &mut Screen,
    runtime: &mut R,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        screen.apply_internal_event(runtime, tx, event);
    }
}

/// Returns `true` when the user asked to quit.
pub fn handle_key_event<R: LookupRuntime>(
    screen: &mut Screen,
    runtime: &mut R,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
    now: Instant,
) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }
    if screen.prompt.is_some() {
        handle_prompt_key(screen, runtime, tx, key);
        return false;
    }

    let index = screen.focus;
    let open = screen
        .slots
        .get(index)
        .is_some_and(|slot| slot.control.selector().is_open());
    if open {
        handle_open_key(screen, runtime, tx, index, key, now);
        return false;
    }

    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Tab => screen.cycle_focus(1),
        KeyCode::BackTab => screen.cycle_focus(-1),
        KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Down => {
            if let Some(geometry) = screen.geometry_for(index) {
                dispatch(
                    screen,
                    runtime,
                    tx,
                    index,
                    SelectorCommand::Toggle { geometry, at: now },
                );
            }
        }
        _ => {}
    }
    false
}

fn handle_open_key<R: LookupRuntime>(
    screen: &mut Screen,
    runtime: &mut R,
    tx: &Sender<InternalEvent>,
    index: usize,
    key: KeyEvent,
    now: Instant,
) {
    let command = match key.code {
        KeyCode::Esc => SelectorCommand::Dismiss { at: now },
        KeyCode::Up => SelectorCommand::MoveHighlight(-1),
        KeyCode::Down => SelectorCommand::MoveHighlight(1),
        KeyCode::PageUp => SelectorCommand::MoveHighlight(-PAGE_ROWS),
        KeyCode::PageDown => SelectorCommand::MoveHighlight(PAGE_ROWS),
        KeyCode::Enter => SelectorCommand::ChooseHighlighted,
        KeyCode::Tab => {
            dispatch(screen, runtime, tx, index, SelectorCommand::Dismiss { at: now });
            screen.cycle_focus(1);
            return;
        }
        KeyCode::Char('n') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            SelectorCommand::Choose(ADD_NEW_KEY.to_owned())
        }
        KeyCode::Backspace if screen.search_enabled(index) => {
            let mut text = screen.search_text(index);
            text.pop();
            SelectorCommand::SetSearch(text)
        }
        KeyCode::Char(ch) if screen.search_enabled(index) => {
            let mut text = screen.search_text(index);
            text.push(ch);
            SelectorCommand::SetSearch(text)
        }
        _ => return,
    };
    dispatch(screen, runtime, tx, index, command);
}

fn handle_prompt_key<R: LookupRuntime>(
    screen: &mut Screen,
    runtime: &mut R,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(prompt) = screen.prompt.as_mut() else {
        return;
    };
    match key.code {
        KeyCode::Esc => {
            screen.prompt = None;
            screen.status = Some("creation cancelled".to_owned());
        }
        KeyCode::Backspace => {
            prompt.name.pop();
        }
        KeyCode::Char(ch) => prompt.name.push(ch),
        KeyCode::Enter => submit_create_prompt(screen, runtime, tx),
        _ => {}
    }
}

fn submit_create_prompt<R: LookupRuntime>(
    screen: &mut Screen,
    runtime: &mut R,
    tx: &Sender<InternalEvent>,
) {
    let Some(prompt) = screen.prompt.take() else {
        return;
    };
    let Some(parent) = screen
        .slots
        .get(prompt.slot)
        .map(|slot| slot.params.dependent_constraint())
    else {
        return;
    };

    match runtime.create_record(&prompt.entity, &prompt.name, parent.as_ref()) {
        Ok(created) => {
            screen.status = Some(format!("created {}", created.display_name));
            let mut host = FieldHost::default();
            let slot = &mut screen.slots[prompt.slot];
            let events = slot.control.accept_created_record(created, &mut host);
            slot.notifications += host.notifications;
            screen.process_events(runtime, tx, prompt.slot, events);
            screen.refresh_layout(screen.area);
        }
        Err(error) => {
            tracing::warn!(entity = %prompt.entity, error = format!("{error:#}"), "create failed");
            screen.status = Some(format!("create {} failed: {error:#}", prompt.entity));
            screen.prompt = Some(prompt);
        }
    }
}

pub fn handle_mouse_event<R: LookupRuntime>(
    screen: &mut Screen,
    runtime: &mut R,
    tx: &Sender<InternalEvent>,
    mouse: MouseEvent,
    now: Instant,
) {
    if screen.prompt.is_some() {
        return;
    }
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            if let Some((index, target)) = screen.overlay_target(mouse.column, mouse.row) {
                match target {
                    OverlayTarget::Item(key) => {
                        dispatch(screen, runtime, tx, index, SelectorCommand::Choose(key));
                    }
                    OverlayTarget::AddNew => dispatch(
                        screen,
                        runtime,
                        tx,
                        index,
                        SelectorCommand::Choose(ADD_NEW_KEY.to_owned()),
                    ),
                    OverlayTarget::Chrome => {}
                }
                return;
            }

            if screen.surface.is_attached(Listener::PointerDown) {
                let position = point_at(mouse.column, mouse.row);
                for index in screen.open_slots() {
                    dispatch(
                        screen,
                        runtime,
                        tx,
                        index,
                        SelectorCommand::PointerDown { position, at: now },
                    );
                }
            }

            if let Some(index) = screen.field_at(mouse.column, mouse.row) {
                screen.focus = index;
                if let Some(geometry) = screen.geometry_for(index) {
                    dispatch(
                        screen,
                        runtime,
                        tx,
                        index,
                        SelectorCommand::Toggle { geometry, at: now },
                    );
                }
            }
        }
        MouseEventKind::ScrollDown | MouseEventKind::ScrollUp => {
            if !screen.surface.is_attached(Listener::Scroll) {
                return;
            }
            let delta = if mouse.kind == MouseEventKind::ScrollDown {
                1
            } else {
                -1
            };
            let over_overlay = screen.overlay_target(mouse.column, mouse.row);
            for index in screen.open_slots() {
                let command = match &over_overlay {
                    Some((overlay_index, _)) if *overlay_index == index => {
                        SelectorCommand::MoveHighlight(delta)
                    }
                    _ => match screen.geometry_for(index) {
                        Some(geometry) => SelectorCommand::ViewportChanged(geometry),
                        None => continue,
                    },
                };
                dispatch(screen, runtime, tx, index, command);
            }
        }
        _ => {}
    }
}

pub fn handle_resize<R: LookupRuntime>(
    screen: &mut Screen,
    runtime: &mut R,
    tx: &Sender<InternalEvent>,
    area: Rect,
) {
    screen.refresh_layout(area);
    if !screen.surface.is_attached(Listener::Resize) {
        return;
    }
    for index in screen.open_slots() {
        if let Some(geometry) = screen.geometry_for(index) {
            dispatch(
                screen,
                runtime,
                tx,
                index,
                SelectorCommand::ViewportChanged(geometry),
            );
        }
    }
}

fn dispatch<R: LookupRuntime>(
    screen: &mut Screen,
    runtime: &mut R,
    tx: &Sender<InternalEvent>,
    index: usize,
    command: SelectorCommand,
) {
    let Some(slot) = screen.slots.get_mut(index) else {
        return;
    };
    let mut host = FieldHost::default();
    let events = slot.control.handle(command, &mut screen.surface, &mut host);
    slot.notifications += host.notifications;
    if let Some(entity) = host.create_requested {
        screen.prompt = Some(CreatePrompt {
            slot: index,
            entity,
            name: String::new(),
        });
    }
    screen.process_events(runtime, tx, index, events);
    screen.refresh_layout(screen.area);
}

pub fn unit_rect(rect: Rect) -> optionset_app::Rect {
    optionset_app::Rect::new(
        f32::from(rect.x) * UNITS_PER_COLUMN,
        f32::from(rect.y) * UNITS_PER_ROW,
        f32::from(rect.width) * UNITS_PER_COLUMN,
        f32::from(rect.height) * UNITS_PER_ROW,
    )
}

/// Center of a terminal cell in layout units.
pub fn point_at(column: u16, row: u16) -> Point {
    Point {
        x: (f32::from(column) + 0.5) * UNITS_PER_COLUMN,
        y: (f32::from(row) + 0.5) * UNITS_PER_ROW,
    }
}

fn cell_in(rect: Rect, column: u16, row: u16) -> bool {
    column >= rect.x && column < rect.right() && row >= rect.y && row < rect.bottom()
}

fn screen_layout(area: Rect, field_count: usize) -> ScreenLayout {
    let mut constraints = vec![Constraint::Length(3)];
    constraints.extend(std::iter::repeat_n(
        Constraint::Length(FIELD_HEIGHT + 1),
        field_count,
    ));
    constraints.push(Constraint::Min(0));
    constraints.push(Constraint::Length(3));
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    let fields = chunks[1..=field_count]
        .iter()
        .map(|chunk| Rect {
            x: chunk.x + 1,
            y: chunk.y + 1,
            width: chunk.width.saturating_sub(2).min(MAX_FIELD_WIDTH),
            height: FIELD_HEIGHT.min(chunk.height.saturating_sub(1)),
        })
        .collect();
    ScreenLayout {
        header: chunks[0],
        fields,
        status: chunks[field_count + 2],
    }
}

fn overlay_layout(overlay: &OverlayView, trigger: Rect, area: Rect) -> OverlayLayout {
    let search_rows = u16::from(overlay.search.is_some());
    let add_new_rows = u16::from(overlay.add_new.is_some());
    let item_rows = u16::try_from(overlay.items.len().max(1)).unwrap_or(u16::MAX);
    let wanted = item_rows
        .saturating_add(search_rows + add_new_rows)
        .saturating_add(2);

    let space = match overlay.direction {
        optionset_app::Direction::Below => area.bottom().saturating_sub(trigger.bottom()),
        optionset_app::Direction::Above => trigger.y.saturating_sub(area.y),
    };
    let height = wanted.min(space).max(3).min(area.height);
    let mut y = match overlay.direction {
        optionset_app::Direction::Below => trigger.bottom(),
        optionset_app::Direction::Above => trigger.y.saturating_sub(height),
    };
    if y.saturating_add(height) > area.bottom() {
        y = area.bottom().saturating_sub(height);
    }
    let width = trigger
        .width
        .max(MIN_OVERLAY_WIDTH)
        .min(area.right().saturating_sub(trigger.x));
    let rect = Rect::new(trigger.x, y, width, height);

    let inner_top = y + 1;
    let inner_height = height.saturating_sub(2);
    let capacity = inner_height.saturating_sub(search_rows + add_new_rows);
    let offset = overlay
        .highlight
        .map_or(0, |highlight| (highlight + 1).saturating_sub(usize::from(capacity)));
    let item_rows = overlay
        .items
        .iter()
        .skip(offset)
        .take(usize::from(capacity))
        .enumerate()
        .map(|(row, item)| (inner_top + search_rows + row as u16, item.key.clone()))
        .collect();

    OverlayLayout {
        area: rect,
        search_row: (search_rows > 0 && inner_height > 0).then_some(inner_top),
        item_rows,
        add_new_row: (add_new_rows > 0 && inner_height > search_rows)
            .then(|| inner_top + inner_height - 1),
        offset,
    }
}

fn overlay_rows(overlay: &OverlayView, layout: &OverlayLayout) -> Vec<OverlayRow> {
    let mut rows = Vec::new();
    if let Some(search) = &overlay.search {
        let (text, muted) = if search.text.is_empty() {
            (search.placeholder.clone(), true)
        } else {
            (search.text.clone(), false)
        };
        rows.push(OverlayRow {
            text: format!("/ {text}"),
            highlighted: false,
            muted,
        });
    }

    if overlay.items.is_empty() {
        rows.push(OverlayRow {
            text: format!("  {NO_MATCHES_TEXT}"),
            highlighted: false,
            muted: true,
        });
    }
    for (index, item) in overlay
        .items
        .iter()
        .enumerate()
        .skip(layout.offset)
        .take(layout.item_rows.len())
    {
        let mark = if item.checked { "✓" } else { " " };
        rows.push(OverlayRow {
            text: format!("{mark} {}", item.text),
            highlighted: overlay.highlight == Some(index),
            muted: false,
        });
    }

    if let (Some(text), Some(add_new_row)) = (&overlay.add_new, layout.add_new_row) {
        let first_row = layout.area.y + 1;
        while first_row + (rows.len() as u16) < add_new_row {
            rows.push(OverlayRow {
                text: String::new(),
                highlighted: false,
                muted: false,
            });
        }
        rows.push(OverlayRow {
            text: text.clone(),
            highlighted: false,
            muted: false,
        });
    }
    rows
}

fn trigger_text(view: &ControlView) -> String {
    match view {
        ControlView::Loading => LOADING_TEXT.to_owned(),
        ControlView::Fallback(text) => text.clone(),
        ControlView::Ready(view) => {
            let arrow = if view.overlay.is_some() { "▴" } else { "▾" };
            format!("{} {arrow}", view.trigger_text)
        }
        ControlView::Destroyed => String::new(),
    }
}

fn output_summary(screen: &Screen) -> String {
    screen
        .slots
        .iter()
        .map(|slot| match slot.control.produce_output() {
            Some(value) => format!("{}: {} ({})", slot.label, value.display_name, value.id),
            None => format!("{}: ---", slot.label),
        })
        .collect::<Vec<_>>()
        .join("   ")
}

fn status_text(screen: &Screen) -> String {
    if screen.prompt.is_some() {
        return PROMPT_HELP_TEXT.to_owned();
    }
    screen
        .status
        .clone()
        .unwrap_or_else(|| HELP_TEXT.to_owned())
}

fn render(frame: &mut ratatui::Frame<'_>, screen: &Screen) {
    let layout = screen_layout(frame.area(), screen.slots.len());

    let header = Paragraph::new(output_summary(screen)).block(
        Block::default()
            .title(screen.title.as_str())
            .borders(Borders::ALL),
    );
    frame.render_widget(header, layout.header);

    for (index, (slot, field)) in screen.slots.iter().zip(&layout.fields).enumerate() {
        let view = slot.control.view();
        let mut style = Style::default();
        if index == screen.focus {
            style = style.fg(Color::Cyan).add_modifier(Modifier::BOLD);
        }
        if slot.params.disabled {
            style = style.fg(Color::DarkGray);
        }
        let trigger = Paragraph::new(trigger_text(&view)).block(
            Block::default()
                .title(slot.label.as_str())
                .borders(Borders::ALL)
                .style(style),
        );
        frame.render_widget(trigger, *field);
    }

    let status = Paragraph::new(status_text(screen))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout.status);

    if let Some((index, overlay_layout)) = &screen.overlay
        && let Some(slot) = screen.slots.get(*index)
        && let ControlView::Ready(view) = slot.control.view()
        && let Some(overlay) = view.overlay
    {
        let lines = overlay_rows(&overlay, overlay_layout)
            .into_iter()
            .map(|row| {
                let mut style = Style::default();
                if row.highlighted {
                    style = style.add_modifier(Modifier::REVERSED);
                }
                if row.muted {
                    style = style.fg(Color::DarkGray);
                }
                Line::styled(row.text, style)
            })
            .collect::<Vec<_>>();
        frame.render_widget(Clear, overlay_layout.area);
        frame.render_widget(
            Paragraph::new(lines).block(
                Block::default()
                    .borders(Borders::ALL)
                    .style(Style::default().fg(Color::Cyan)),
            ),
            overlay_layout.area,
        );
    }

    if let Some(prompt) = &screen.prompt {
        let area = centered_rect(50, 20, frame.area());
        frame.render_widget(Clear, area);
        let input = Paragraph::new(format!("{}▏", prompt.name)).block(
            Block::default()
                .title(format!("new {}", prompt.entity))
                .borders(Borders::ALL),
        );
        frame.render_widget(input, area);
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
