use kuchiki::NodeRef;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::dom;
use crate::services::{DictionaryEntry, DictionaryService};
use crate::services::dictionary::best_match;
use crate::token::Token;
use crate::wrap::{self, ATTR_HOVER_ENABLED};

pub const HIDE_DELAY: Duration = Duration::from_millis(69);
pub const BRIDGE_GAP: f64 = 8.0;
pub const LOOKUP_POS: [&str; 4] = ["NOUN", "VERB", "ADJ", "ADV"];
const NOT_FOUND: &str = "Data not found.";

pub trait HoverTarget: Clone + PartialEq {
    fn hover_enabled(&self) -> bool;
    fn token(&self) -> Option<Token>;
}

impl HoverTarget for NodeRef {
    fn hover_enabled(&self) -> bool {
        dom::attr(self, ATTR_HOVER_ENABLED).as_deref() == Some("true")
    }

    fn token(&self) -> Option<Token> {
        wrap::span_token(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            right: left + width,
            bottom: top + height,
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub span: Rect,
    pub tooltip: Rect,
}

impl Geometry {
    // The corridor between span and tooltip, padded by `BRIDGE_GAP`, in which
    // the pointer may travel without the tooltip hiding.
    pub fn bridge_contains(&self, x: f64, y: f64) -> bool {
        let left = self.span.left.min(self.tooltip.left) - BRIDGE_GAP;
        let right = self.span.right.max(self.tooltip.right) + BRIDGE_GAP;
        let (top, bottom) = if self.tooltip.top >= self.span.bottom {
            (self.span.bottom, self.tooltip.top)
        } else {
            (self.tooltip.bottom, self.span.top)
        };
        let bridge = Rect {
            left,
            top: top - BRIDGE_GAP,
            right,
            bottom: bottom + BRIDGE_GAP,
        };
        bridge.contains(x, y)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HoverState<S> {
    Idle,
    Hovering(S),
    Locked(S),
    DictionaryMode(S, DictionaryEntry),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HoverEvent<S> {
    PointerEnterSpan(S),
    PointerLeaveSpan {
        into_tooltip: bool,
    },
    PointerMove {
        x: f64,
        y: f64,
        over_tooltip: bool,
        over_span: bool,
        geometry: Option<Geometry>,
    },
    TooltipEnter,
    TooltipLeave {
        into_active_span: bool,
    },
    ClickSpan(S),
    ClickElsewhere,
    HideTimerElapsed(u64),
    LookupRequested,
    LookupSucceeded(DictionaryEntry),
    LookupFailed(String),
    BackFromDictionary,
    ExcludeRequested,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HoverEffect<S> {
    Show(S, HoverView),
    Hide,
    ScheduleHide { timer: u64, delay: Duration },
    CancelHide(u64),
    Lookup { word: String },
    ShowDictionary(DictionaryEntry),
    Notice(String),
    Exclude(S),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoverView {
    pub surface: String,
    pub reading: String,
    pub lemma: String,
    pub pos: String,
    pub tag: String,
    pub dep: String,
    pub morph: String,
    pub entity: String,
    pub lookup_available: bool,
}

impl HoverView {
    pub fn from_token(token: &Token) -> Self {
        let or_missing = |value: &str| {
            let value = value.trim();
            if value.is_empty() {
                NOT_FOUND.to_string()
            } else {
                value.to_string()
            }
        };
        let morph = token
            .morph
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect::<Vec<_>>()
            .join(", ");
        let entity = if token.ent_type.is_empty() {
            String::new()
        } else {
            format!("{} ({})", token.ent_type, token.ent_iob)
        };
        Self {
            surface: or_missing(&token.surface),
            reading: or_missing(&token.reading),
            lemma: or_missing(&token.lemma),
            pos: or_missing(&token.pos),
            tag: or_missing(&token.tag),
            dep: or_missing(&token.dep),
            morph: or_missing(&morph),
            entity: or_missing(&entity),
            lookup_available: supports_lookup(&token.pos),
        }
    }
}

pub fn supports_lookup(pos: &str) -> bool {
    LOOKUP_POS.contains(&pos.trim().to_uppercase().as_str())
}

pub fn lookup_word(token: &Token) -> String {
    let lemma = token.lemma.trim();
    if lemma.is_empty() {
        token.surface.trim().to_string()
    } else {
        lemma.to_string()
    }
}

pub struct HoverController<S> {
    state: HoverState<S>,
    pending_hide: Option<u64>,
    next_timer: u64,
    dictionary_enabled: bool,
}

impl<S: HoverTarget> Default for HoverController<S> {
    fn default() -> Self {
        Self::new(true)
    }
}

impl<S: HoverTarget> HoverController<S> {
    pub fn new(dictionary_enabled: bool) -> Self {
        Self {
            state: HoverState::Idle,
            pending_hide: None,
            next_timer: 0,
            dictionary_enabled,
        }
    }

    pub fn state(&self) -> &HoverState<S> {
        &self.state
    }

    pub fn active(&self) -> Option<&S> {
        match &self.state {
            HoverState::Idle => None,
            HoverState::Hovering(span)
            | HoverState::Locked(span)
            | HoverState::DictionaryMode(span, _) => Some(span),
        }
    }

    pub fn pending_hide(&self) -> Option<u64> {
        self.pending_hide
    }

    pub fn set_dictionary_enabled(&mut self, enabled: bool) {
        self.dictionary_enabled = enabled;
    }

    pub fn reset(&mut self) {
        self.state = HoverState::Idle;
        self.pending_hide = None;
    }

    pub fn handle(&mut self, event: HoverEvent<S>) -> Vec<HoverEffect<S>> {
        let mut effects = Vec::new();
        match event {
            HoverEvent::PointerEnterSpan(span) => {
                if self.is_pinned() || !span.hover_enabled() {
                    return effects;
                }
                if self.active() == Some(&span) && self.pending_hide.is_none() {
                    return effects;
                }
                self.cancel_hide(&mut effects);
                self.activate(span, &mut effects);
            }
            HoverEvent::PointerLeaveSpan { into_tooltip } => {
                if matches!(self.state, HoverState::Hovering(_)) && !into_tooltip {
                    self.schedule_hide(&mut effects);
                }
            }
            HoverEvent::PointerMove {
                x,
                y,
                over_tooltip,
                over_span,
                geometry,
            } => {
                let in_bridge = geometry
                    .map(|geometry| geometry.bridge_contains(x, y))
                    .unwrap_or(false);
                if self.pending_hide.is_some() {
                    if in_bridge || over_tooltip || over_span {
                        self.cancel_hide(&mut effects);
                    }
                } else if matches!(self.state, HoverState::Hovering(_))
                    && !in_bridge
                    && !over_tooltip
                    && !over_span
                {
                    self.schedule_hide(&mut effects);
                }
            }
            HoverEvent::TooltipEnter => {
                self.cancel_hide(&mut effects);
                if let HoverState::Hovering(span) = &self.state {
                    self.state = HoverState::Locked(span.clone());
                }
            }
            HoverEvent::TooltipLeave { into_active_span } => {
                if let HoverState::Locked(span) = &self.state {
                    self.state = HoverState::Hovering(span.clone());
                    if !into_active_span {
                        self.schedule_hide(&mut effects);
                    }
                }
            }
            HoverEvent::ClickSpan(span) => match &self.state {
                HoverState::Hovering(active) if *active == span => {
                    self.cancel_hide(&mut effects);
                    self.state = HoverState::Locked(span);
                }
                HoverState::Locked(active) | HoverState::DictionaryMode(active, _)
                    if *active == span =>
                {
                    self.state = HoverState::Hovering(span);
                }
                _ => {
                    self.cancel_hide(&mut effects);
                    if span.hover_enabled() {
                        self.activate(span, &mut effects);
                    } else {
                        self.hide(&mut effects);
                    }
                }
            },
            HoverEvent::ClickElsewhere => {
                self.cancel_hide(&mut effects);
                self.hide(&mut effects);
            }
            HoverEvent::HideTimerElapsed(timer) => {
                if self.pending_hide != Some(timer) {
                    debug!("ignoring stale hide timer {}", timer);
                    return effects;
                }
                self.pending_hide = None;
                if matches!(self.state, HoverState::Hovering(_)) {
                    self.hide(&mut effects);
                }
            }
            HoverEvent::LookupRequested => {
                let Some(token) = self.active().and_then(|span| span.token()) else {
                    return effects;
                };
                if !self.dictionary_enabled {
                    effects.push(HoverEffect::Notice("Dictionary lookup is disabled.".to_string()));
                    return effects;
                }
                if !supports_lookup(&token.pos) {
                    effects.push(HoverEffect::Notice(
                        "Lookup is only available for nouns, verbs, adjectives and adverbs."
                            .to_string(),
                    ));
                    return effects;
                }
                if let HoverState::Hovering(span) = &self.state {
                    self.state = HoverState::Locked(span.clone());
                }
                self.cancel_hide(&mut effects);
                effects.push(HoverEffect::Lookup {
                    word: lookup_word(&token),
                });
            }
            HoverEvent::LookupSucceeded(entry) => match &self.state {
                HoverState::Hovering(span) | HoverState::Locked(span) => {
                    self.state = HoverState::DictionaryMode(span.clone(), entry.clone());
                    effects.push(HoverEffect::ShowDictionary(entry));
                }
                _ => debug!("dropping lookup result; tooltip no longer active"),
            },
            HoverEvent::LookupFailed(reason) => {
                if self.active().is_some() {
                    debug!("lookup failed: {}", reason);
                    effects.push(HoverEffect::Notice("Lookup failed.".to_string()));
                }
            }
            HoverEvent::BackFromDictionary => {
                if let HoverState::DictionaryMode(span, _) = &self.state {
                    let span = span.clone();
                    let view = span
                        .token()
                        .map(|token| HoverView::from_token(&token))
                        .unwrap_or_else(|| HoverView::from_token(&Token::default()));
                    self.state = HoverState::Locked(span.clone());
                    effects.push(HoverEffect::Show(span, view));
                }
            }
            HoverEvent::ExcludeRequested => {
                if let Some(span) = self.active().cloned() {
                    self.cancel_hide(&mut effects);
                    self.hide(&mut effects);
                    effects.push(HoverEffect::Exclude(span));
                }
            }
        }
        effects
    }

    pub async fn lookup<D>(&mut self, dictionary: &D) -> Vec<HoverEffect<S>>
    where
        D: DictionaryService + ?Sized,
    {
        let mut effects = self.handle(HoverEvent::LookupRequested);
        let Some(word) = effects.iter().find_map(|effect| match effect {
            HoverEffect::Lookup { word } => Some(word.clone()),
            _ => None,
        }) else {
            return effects;
        };
        let outcome = match dictionary.lookup(&word).await {
            Ok(entries) => best_match(entries),
            Err(err) => Err(err),
        };
        let follow_up = match outcome {
            Ok(entry) => self.handle(HoverEvent::LookupSucceeded(entry)),
            Err(err) => self.handle(HoverEvent::LookupFailed(err.to_string())),
        };
        effects.extend(follow_up);
        effects
    }

    fn is_pinned(&self) -> bool {
        matches!(
            self.state,
            HoverState::Locked(_) | HoverState::DictionaryMode(_, _)
        )
    }

    fn activate(&mut self, span: S, effects: &mut Vec<HoverEffect<S>>) {
        let view = span
            .token()
            .map(|token| HoverView::from_token(&token))
            .unwrap_or_else(|| HoverView::from_token(&Token::default()));
        self.state = HoverState::Hovering(span.clone());
        effects.push(HoverEffect::Show(span, view));
    }

    fn hide(&mut self, effects: &mut Vec<HoverEffect<S>>) {
        if matches!(self.state, HoverState::Idle) {
            return;
        }
        self.state = HoverState::Idle;
        effects.push(HoverEffect::Hide);
    }

    fn schedule_hide(&mut self, effects: &mut Vec<HoverEffect<S>>) {
        if self.pending_hide.is_some() {
            return;
        }
        self.next_timer += 1;
        self.pending_hide = Some(self.next_timer);
        effects.push(HoverEffect::ScheduleHide {
            timer: self.next_timer,
            delay: HIDE_DELAY,
        });
    }

    fn cancel_hide(&mut self, effects: &mut Vec<HoverEffect<S>>) {
        if let Some(timer) = self.pending_hide.take() {
            effects.push(HoverEffect::CancelHide(timer));
        }
    }
}
