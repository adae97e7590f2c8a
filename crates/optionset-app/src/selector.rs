// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Searchable single-select state machine.
//!
//! The selector is controlled: the caller passes the options and the selected
//! key on every dispatch and receives [`SelectorEvent`]s back. Only the search
//! text, open/closed state, placement and highlight live here.

use std::time::{Duration, Instant};

use crate::{ADD_NEW_KEY, OptionItem, SEARCH_HEADER_KEY, is_sentinel_key};

/// Minimum space below the trigger for the overlay to open downwards.
pub const PLACEMENT_THRESHOLD: f32 = 300.0;
/// Window in which a trigger activation right after a dismissal is swallowed.
pub const DISMISS_GUARD: Duration = Duration::from_millis(250);
pub const DEFAULT_TRIGGER_TEXT: &str = "Select an option";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x < self.x + self.width
            && point.y >= self.y
            && point.y < self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

/// Trigger bounds and viewport size, measured by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub trigger: Rect,
    pub viewport: Viewport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Above,
    Below,
}

pub fn placement_for(geometry: &Geometry) -> Direction {
    let space_below = geometry.viewport.height - geometry.trigger.bottom();
    if space_below >= PLACEMENT_THRESHOLD {
        Direction::Below
    } else {
        Direction::Above
    }
}

/// Global subscriptions the selector holds while open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listener {
    PointerDown,
    Scroll,
    Resize,
}

pub const OPEN_LISTENERS: [Listener; 3] = [Listener::PointerDown, Listener::Scroll, Listener::Resize];

/// The shared input surface (window, terminal) listeners are registered on.
pub trait InputSurface {
    fn attach(&mut self, listener: Listener);
    fn detach(&mut self, listener: Listener);
}

#[derive(Debug, Clone, Copy)]
pub struct SelectorProps<'a> {
    pub options: &'a [OptionItem],
    pub selected_key: Option<&'a str>,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectorCommand {
    Toggle { geometry: Geometry, at: Instant },
    PointerDown { position: Point, at: Instant },
    ViewportChanged(Geometry),
    Dismiss { at: Instant },
    PlaceOverlay(Rect),
    SetSearch(String),
    Choose(String),
    MoveHighlight(isize),
    ChooseHighlighted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Toggled,
    Selected,
    AddNew,
    OutsidePointer,
    Dismissed,
    Teardown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectorEvent {
    Opened { direction: Direction, min_width: f32 },
    Closed(CloseReason),
    DirectionChanged(Direction),
    SearchChanged(String),
    Selected(OptionItem),
    AddNewRequested,
    ToggleSuppressed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchBoxView {
    pub placeholder: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub key: String,
    pub text: String,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayView {
    pub direction: Direction,
    pub min_width: f32,
    pub search: Option<SearchBoxView>,
    pub items: Vec<ItemView>,
    pub highlight: Option<usize>,
    pub add_new: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorView {
    pub trigger_text: String,
    pub disabled: bool,
    pub overlay: Option<OverlayView>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    search_text: String,
    is_open: bool,
    direction: Direction,
    trigger: Option<Rect>,
    overlay: Option<Rect>,
    highlight: usize,
    dismissed_at: Option<Instant>,
    listeners_attached: bool,
}

impl Default for Selector {
    fn default() -> Self {
        Self {
            search_text: String::new(),
            is_open: false,
            direction: Direction::Below,
            trigger: None,
            overlay: None,
            highlight: 0,
            dismissed_at: None,
            listeners_attached: false,
        }
    }
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn trigger_width(&self) -> f32 {
        self.trigger.map(|rect| rect.width).unwrap_or_default()
    }

    pub fn highlight(&self) -> usize {
        self.highlight
    }

    pub fn listeners_attached(&self) -> bool {
        self.listeners_attached
    }

    pub fn dispatch(
        &mut self,
        props: &SelectorProps<'_>,
        command: SelectorCommand,
        surface: &mut dyn InputSurface,
    ) -> Vec<SelectorEvent> {
        match command {
            SelectorCommand::Toggle { geometry, at } => self.toggle(props, geometry, at, surface),
            SelectorCommand::PointerDown { position, at } => {
                if !self.is_open {
                    return Vec::new();
                }
                let inside_trigger = self.trigger.is_some_and(|rect| rect.contains(position));
                let inside_overlay = self.overlay.is_some_and(|rect| rect.contains(position));
                if inside_trigger || inside_overlay {
                    return Vec::new();
                }
                self.dismissed_at = Some(at);
                self.close(CloseReason::OutsidePointer, surface)
            }
            SelectorCommand::ViewportChanged(geometry) => {
                if !self.is_open {
                    return Vec::new();
                }
                self.trigger = Some(geometry.trigger);
                let direction = placement_for(&geometry);
                if direction == self.direction {
                    return Vec::new();
                }
                self.direction = direction;
                vec![SelectorEvent::DirectionChanged(direction)]
            }
            SelectorCommand::Dismiss { at } => {
                if !self.is_open {
                    return Vec::new();
                }
                self.dismissed_at = Some(at);
                self.close(CloseReason::Dismissed, surface)
            }
            SelectorCommand::PlaceOverlay(rect) => {
                if self.is_open {
                    self.overlay = Some(rect);
                }
                Vec::new()
            }
            SelectorCommand::SetSearch(text) => {
                if text == self.search_text {
                    return Vec::new();
                }
                self.search_text = text.clone();
                self.highlight = 0;
                vec![SelectorEvent::SearchChanged(text)]
            }
            SelectorCommand::Choose(key) => self.choose(props, &key, surface),
            SelectorCommand::MoveHighlight(delta) => {
                let count = filter_options(props.options, &self.search_text).len();
                if count > 0 {
                    let next = (self.highlight as isize).saturating_add(delta);
                    self.highlight = next.clamp(0, count as isize - 1) as usize;
                }
                Vec::new()
            }
            SelectorCommand::ChooseHighlighted => {
                let key = filter_options(props.options, &self.search_text)
                    .get(self.highlight)
                    .map(|option| option.key.clone());
                match key {
                    Some(key) => self.choose(props, &key, surface),
                    None => Vec::new(),
                }
            }
        }
    }

    /// Closes the overlay if open so no listener outlives the selector.
    pub fn teardown(&mut self, surface: &mut dyn InputSurface) -> Vec<SelectorEvent> {
        if self.is_open {
            self.close(CloseReason::Teardown, surface)
        } else {
            Vec::new()
        }
    }

    pub fn view(&self, props: &SelectorProps<'_>) -> SelectorView {
        let trigger_text = props
            .selected_key
            .and_then(|key| props.options.iter().find(|option| option.key == key))
            .map(|option| option.text.clone())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| DEFAULT_TRIGGER_TEXT.to_owned());

        let overlay = self.is_open.then(|| {
            let items = filter_options(props.options, &self.search_text)
                .into_iter()
                .map(|option| ItemView {
                    key: option.key.clone(),
                    text: option.text.clone(),
                    checked: props.selected_key == Some(option.key.as_str()),
                })
                .collect::<Vec<_>>();
            let search = props
                .options
                .iter()
                .find(|option| option.key == SEARCH_HEADER_KEY)
                .map(|header| SearchBoxView {
                    placeholder: header.label().unwrap_or_default().to_owned(),
                    text: self.search_text.clone(),
                });
            let add_new = props
                .options
                .iter()
                .find(|option| option.key == ADD_NEW_KEY)
                .map(|option| option.text.clone());
            let highlight = (!items.is_empty()).then(|| self.highlight.min(items.len() - 1));

            OverlayView {
                direction: self.direction,
                min_width: self.trigger_width(),
                search,
                items,
                highlight,
                add_new,
            }
        });

        SelectorView {
            trigger_text,
            disabled: props.disabled,
            overlay,
        }
    }

    fn toggle(
        &mut self,
        props: &SelectorProps<'_>,
        geometry: Geometry,
        at: Instant,
        surface: &mut dyn InputSurface,
    ) -> Vec<SelectorEvent> {
        if let Some(dismissed_at) = self.dismissed_at.take()
            && at.saturating_duration_since(dismissed_at) < DISMISS_GUARD
        {
            return vec![SelectorEvent::ToggleSuppressed];
        }

        if self.is_open {
            return self.close(CloseReason::Toggled, surface);
        }
        if props.disabled {
            return Vec::new();
        }

        self.is_open = true;
        self.trigger = Some(geometry.trigger);
        self.direction = placement_for(&geometry);
        self.highlight = props
            .selected_key
            .and_then(|key| {
                filter_options(props.options, &self.search_text)
                    .iter()
                    .position(|option| option.key == key)
            })
            .unwrap_or(0);

        if !self.listeners_attached {
            for listener in OPEN_LISTENERS {
                surface.attach(listener);
            }
            self.listeners_attached = true;
        }

        vec![SelectorEvent::Opened {
            direction: self.direction,
            min_width: geometry.trigger.width,
        }]
    }

    fn choose(
        &mut self,
        props: &SelectorProps<'_>,
        key: &str,
        surface: &mut dyn InputSurface,
    ) -> Vec<SelectorEvent> {
        if !self.is_open {
            return Vec::new();
        }

        if key == ADD_NEW_KEY {
            if !props.options.iter().any(|option| option.key == ADD_NEW_KEY) {
                return Vec::new();
            }
            let mut events = vec![SelectorEvent::AddNewRequested];
            events.extend(self.close(CloseReason::AddNew, surface));
            return events;
        }

        let Some(option) = filter_options(props.options, &self.search_text)
            .into_iter()
            .find(|option| option.key == key)
            .cloned()
        else {
            return Vec::new();
        };

        let mut events = vec![SelectorEvent::Selected(option)];
        events.extend(self.close(CloseReason::Selected, surface));
        events
    }

    fn close(&mut self, reason: CloseReason, surface: &mut dyn InputSurface) -> Vec<SelectorEvent> {
        self.is_open = false;
        self.overlay = None;
        if self.listeners_attached {
            for listener in OPEN_LISTENERS {
                surface.detach(listener);
            }
            self.listeners_attached = false;
        }
        vec![SelectorEvent::Closed(reason)]
    }
}

/// Options shown in the scrollable list for the given search text.
pub fn filter_options<'a>(options: &'a [OptionItem], search_text: &str) -> Vec<&'a OptionItem> {
    let needle = search_text.to_lowercase();
    options
        .iter()
        .filter(|option| !is_sentinel_key(&option.key))
        .filter(|option| option.text.to_lowercase().contains(&needle))
        .collect()
}
