//! Typed publish/subscribe channel for widget interaction events.

use std::fmt::Debug;
use std::hash::Hash;

use hashbrown::HashMap;

use crate::api::NearestKind;
use crate::config::{InspectorMode, TokenSelection};
use crate::search::MetaField;

/// An event that can travel through an [`EventBus`].
pub trait BusEvent {
    type Name: Copy + Eq + Hash + Debug;

    fn name(&self) -> Self::Name;
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    TokenClicked(TokenSelection),
    TokenMaskToggled(TokenSelection),
    HeadClicked { head: usize },
    AllHeadsSelected,
    NoHeadsSelected,
    LayerChanged { layer: u32 },
    ThresholdChanged { threshold: f32 },
    SentenceSubmitted { sentence: String },
    ZeroedToggled { zeroed: bool },
    MetaMatchChanged(MetaField),
    MetaMaxChanged(MetaField),
    InspectorModeChanged(InspectorMode),
    OffsetWindowChanged { offsets: Vec<i32> },
    /// Nearest-neighbour search seeded by the selected token.
    SearchRequested { kind: NearestKind },
    RetryRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    TokenClicked,
    TokenMaskToggled,
    HeadClicked,
    AllHeadsSelected,
    NoHeadsSelected,
    LayerChanged,
    ThresholdChanged,
    SentenceSubmitted,
    ZeroedToggled,
    MetaMatchChanged,
    MetaMaxChanged,
    InspectorModeChanged,
    OffsetWindowChanged,
    SearchRequested,
    RetryRequested,
}

impl EventName {
    pub const ALL: [EventName; 15] = [
        EventName::TokenClicked,
        EventName::TokenMaskToggled,
        EventName::HeadClicked,
        EventName::AllHeadsSelected,
        EventName::NoHeadsSelected,
        EventName::LayerChanged,
        EventName::ThresholdChanged,
        EventName::SentenceSubmitted,
        EventName::ZeroedToggled,
        EventName::MetaMatchChanged,
        EventName::MetaMaxChanged,
        EventName::InspectorModeChanged,
        EventName::OffsetWindowChanged,
        EventName::SearchRequested,
        EventName::RetryRequested,
    ];
}

impl BusEvent for AppEvent {
    type Name = EventName;

    fn name(&self) -> EventName {
        match self {
            AppEvent::TokenClicked(_) => EventName::TokenClicked,
            AppEvent::TokenMaskToggled(_) => EventName::TokenMaskToggled,
            AppEvent::HeadClicked { .. } => EventName::HeadClicked,
            AppEvent::AllHeadsSelected => EventName::AllHeadsSelected,
            AppEvent::NoHeadsSelected => EventName::NoHeadsSelected,
            AppEvent::LayerChanged { .. } => EventName::LayerChanged,
            AppEvent::ThresholdChanged { .. } => EventName::ThresholdChanged,
            AppEvent::SentenceSubmitted { .. } => EventName::SentenceSubmitted,
            AppEvent::ZeroedToggled { .. } => EventName::ZeroedToggled,
            AppEvent::MetaMatchChanged(_) => EventName::MetaMatchChanged,
            AppEvent::MetaMaxChanged(_) => EventName::MetaMaxChanged,
            AppEvent::InspectorModeChanged(_) => EventName::InspectorModeChanged,
            AppEvent::OffsetWindowChanged { .. } => EventName::OffsetWindowChanged,
            AppEvent::SearchRequested { .. } => EventName::SearchRequested,
            AppEvent::RetryRequested => EventName::RetryRequested,
        }
    }
}

type Listener<E> = Box<dyn FnMut(&E)>;

/// Handle returned by [`EventBus::subscribe`], used to unbind a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription<N> {
    name: N,
    id: u64,
}

pub struct EventBus<E: BusEvent> {
    listeners: HashMap<E::Name, Vec<(u64, Listener<E>)>>,
    next_id: u64,
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            listeners: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `listener` to `name`; listeners fire in bind order.
    pub fn subscribe(
        &mut self,
        name: E::Name,
        listener: impl FnMut(&E) + 'static,
    ) -> Subscription<E::Name> {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners
            .entry(name)
            .or_default()
            .push((id, Box::new(listener)));
        Subscription { name, id }
    }

    pub fn unsubscribe(&mut self, sub: Subscription<E::Name>) -> bool {
        let Some(list) = self.listeners.get_mut(&sub.name) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != sub.id);
        before != list.len()
    }

    /// Delivers `event` to every listener bound to its name. No listeners is fine.
    pub fn emit(&mut self, event: &E) {
        let name = event.name();
        if let Some(list) = self.listeners.get_mut(&name) {
            tracing::trace!(?name, listeners = list.len(), "emit");
            for (_, listener) in list.iter_mut() {
                listener(event);
            }
        }
    }

    pub fn listener_count(&self, name: E::Name) -> usize {
        self.listeners.get(&name).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn listeners_fire_in_bind_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::<AppEvent>::new();
        for tag in ["first", "second", "third"] {
            let log = log.clone();
            bus.subscribe(EventName::HeadClicked, move |ev| {
                if let AppEvent::HeadClicked { head } = ev {
                    log.borrow_mut().push((tag, *head));
                }
            });
        }

        bus.emit(&AppEvent::HeadClicked { head: 4 });
        assert_eq!(
            *log.borrow(),
            vec![("first", 4), ("second", 4), ("third", 4)]
        );
    }

    #[test]
    fn emit_without_listeners_is_noop() {
        let mut bus = EventBus::<AppEvent>::new();
        bus.emit(&AppEvent::RetryRequested);
        assert_eq!(bus.listener_count(EventName::RetryRequested), 0);
    }

    #[test]
    fn other_names_are_not_delivered() {
        let hits = Rc::new(RefCell::new(0));
        let mut bus = EventBus::<AppEvent>::new();
        let h = hits.clone();
        bus.subscribe(EventName::AllHeadsSelected, move |_| *h.borrow_mut() += 1);

        bus.emit(&AppEvent::NoHeadsSelected);
        bus.emit(&AppEvent::AllHeadsSelected);
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn unsubscribe_removes_only_that_listener() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::<AppEvent>::new();
        let a = {
            let hits = hits.clone();
            bus.subscribe(EventName::RetryRequested, move |_| hits.borrow_mut().push('a'))
        };
        {
            let hits = hits.clone();
            bus.subscribe(EventName::RetryRequested, move |_| hits.borrow_mut().push('b'));
        }

        assert!(bus.unsubscribe(a));
        assert!(!bus.unsubscribe(a));
        bus.emit(&AppEvent::RetryRequested);
        assert_eq!(*hits.borrow(), vec!['b']);
    }
}
