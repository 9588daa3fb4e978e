//! Page Context
//!
//! Everything the page side of the highlighter needs between events: the
//! explicit application state (url, activation, current color), the store
//! handle, and the listener registry. Events are handled one at a time on the
//! caller's thread; nothing here is `Send`.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::capture::{self, CaptureRejection, Selection};
use crate::dom::{Document, NodeId};
use crate::model::{HighlightColor, HighlightRecord, UpdateHighlight};
use crate::restore::{self, MARKER_ID_ATTR, RestoreReport};
use crate::store::{ACTIVE_KEY, HighlightStore};

/// Cross-context messages sent by the popup and background collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    ToggleActivation,
    RefreshHighlights,
    GetHighlights,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageReply {
    ToggleActivation { active: bool },
    RefreshHighlights { report: RestoreReport },
    GetHighlights { highlights: Vec<HighlightRecord> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState {
    pub url: String,
    pub active: bool,
    pub color: HighlightColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SelectionChange,
    PointerRelease,
    MarkerClick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    SelectionChange(Selection),
    PointerRelease(Selection),
    MarkerClick(NodeId),
}

impl PageEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PageEvent::SelectionChange(_) => EventKind::SelectionChange,
            PageEvent::PointerRelease(_) => EventKind::PointerRelease,
            PageEvent::MarkerClick(_) => EventKind::MarkerClick,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    SelectionTracked { pending: bool },
    Captured(HighlightRecord),
    Rejected(CaptureRejection),
    MarkerResolved(Option<HighlightRecord>),
}

type Callback = Rc<RefCell<dyn FnMut(&EventOutcome)>>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<(u64, EventKind, Callback)>,
}

/// Listener registry. Each registration returns a [`Subscription`]; dropping
/// it removes the listener.
#[derive(Clone, Default)]
pub struct Listeners {
    registry: Rc<RefCell<Registry>>,
}

impl Listeners {
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: FnMut(&EventOutcome) + 'static,
    {
        let callback: Callback = Rc::new(RefCell::new(callback));
        let mut registry = self.registry.borrow_mut();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.entries.push((id, kind, callback));
        Subscription {
            id,
            registry: Rc::downgrade(&self.registry),
        }
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every listener registered for `kind`. Listeners may drop their
    /// own or other subscriptions while being called.
    pub fn dispatch(&self, kind: EventKind, outcome: &EventOutcome) -> usize {
        let callbacks: Vec<Callback> = self
            .registry
            .borrow()
            .entries
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, callback)| Rc::clone(callback))
            .collect();
        for callback in &callbacks {
            (&mut *callback.borrow_mut())(outcome);
        }
        callbacks.len()
    }
}

#[must_use = "dropping a Subscription removes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<RefCell<Registry>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .borrow_mut()
                .entries
                .retain(|(id, _, _)| *id != self.id);
        }
    }
}

pub struct PageContext {
    state: PageState,
    store: HighlightStore,
    listeners: Listeners,
    pending: Option<Selection>,
}

impl PageContext {
    /// Builds the context for `url`, reading the persisted activation flag.
    /// Capture is active unless it was switched off earlier.
    pub fn load(url: &str, store: HighlightStore, color: HighlightColor) -> Result<Self> {
        let active = store.read_flag(ACTIVE_KEY, true)?;
        Ok(PageContext {
            state: PageState {
                url: url.to_string(),
                active,
                color,
            },
            store,
            listeners: Listeners::default(),
            pending: None,
        })
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub fn pending_selection(&self) -> Option<&Selection> {
        self.pending.as_ref()
    }

    pub fn set_color(&mut self, color: HighlightColor) {
        self.state.color = color;
    }

    pub fn toggle_activation(&mut self) -> Result<bool> {
        let active = !self.state.active;
        self.store.write_flag(ACTIVE_KEY, active)?;
        self.state.active = active;
        tracing::info!(active, "highlighting toggled");
        Ok(active)
    }

    /// Runs a restoration pass for this page's records.
    pub fn refresh(&self, doc: &mut Document) -> Result<RestoreReport> {
        let records = self.store.list_by_url(&self.state.url)?;
        Ok(restore::restore_all(doc, &records))
    }

    pub fn handle_message(&mut self, message: Message, doc: &mut Document) -> Result<MessageReply> {
        tracing::debug!(?message, url = %self.state.url, "message received");
        match message {
            Message::ToggleActivation => Ok(MessageReply::ToggleActivation {
                active: self.toggle_activation()?,
            }),
            Message::RefreshHighlights => Ok(MessageReply::RefreshHighlights {
                report: self.refresh(doc)?,
            }),
            Message::GetHighlights => Ok(MessageReply::GetHighlights {
                highlights: self.store.list_by_url(&self.state.url)?,
            }),
        }
    }

    pub fn handle_event(&mut self, doc: &mut Document, event: PageEvent) -> Result<EventOutcome> {
        let outcome = match event {
            PageEvent::SelectionChange(selection) => {
                self.pending = (!selection.is_collapsed()).then_some(selection);
                EventOutcome::SelectionTracked {
                    pending: self.pending.is_some(),
                }
            }
            PageEvent::PointerRelease(selection) => {
                self.pending = None;
                self.on_release(doc, &selection)?
            }
            PageEvent::MarkerClick(node) => EventOutcome::MarkerResolved(self.highlight_at(doc, node)?),
        };

        self.listeners.dispatch(event.kind(), &outcome);
        Ok(outcome)
    }

    fn on_release(&self, doc: &mut Document, selection: &Selection) -> Result<EventOutcome> {
        let record = match capture::capture(
            doc,
            selection,
            &self.state.url,
            self.state.active,
            self.state.color,
        ) {
            Ok(record) => record,
            Err(rejection) => {
                tracing::debug!(reason = %rejection, "selection not captured");
                return Ok(EventOutcome::Rejected(rejection));
            }
        };

        self.store.append(record.clone())?;
        tracing::info!(id = %record.id, url = %record.url, "highlight captured");
        self.refresh(doc)?;
        Ok(EventOutcome::Captured(record))
    }

    /// Resolves the record owning the marker at or above `node`.
    pub fn highlight_at(&self, doc: &Document, node: NodeId) -> Result<Option<HighlightRecord>> {
        let Some(id) = restore::marker_for(doc, node).and_then(|m| doc.attr(m, MARKER_ID_ATTR)) else {
            return Ok(None);
        };
        self.store.get(id)
    }

    pub fn edit_highlight(
        &self,
        doc: &mut Document,
        id: &str,
        update: &UpdateHighlight,
    ) -> Result<Option<HighlightRecord>> {
        let updated = self.store.update(id, update)?;
        if updated.is_some() {
            self.refresh(doc)?;
        }
        Ok(updated)
    }

    pub fn delete_highlight(&self, doc: &mut Document, id: &str) -> Result<bool> {
        let removed = self.store.remove(id)?;
        if removed {
            self.refresh(doc)?;
        }
        Ok(removed)
    }
}
