//! Event Bus - the hand-off between reactive effects and the runtime.
//!
//! Effects run synchronously inside `Signal::set`, often while the runtime is
//! in the middle of mutating the tree. They therefore never touch the tree:
//! each one only pushes an [`Event`] onto a shared queue, and the runtime's
//! pump drains the queue once the current step has finished.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde_json::Value;
use spark_signals::{effect, effect_scope, Signal};

use crate::loader::SensorDef;
use crate::types::NodeId;

// =============================================================================
// Events
// =============================================================================

/// Who is waiting for a download to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waiter {
    /// A node waiting for its own template.
    Become(NodeId),
    /// A node waiting for one of its requirements.
    Requirement(NodeId),
    /// A chain waiting for its item template.
    Chain(NodeId),
}

impl Waiter {
    pub fn node(&self) -> NodeId {
        match self {
            Waiter::Become(id) | Waiter::Requirement(id) | Waiter::Chain(id) => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// `url` finished downloading.
    Fetched { url: String, waiter: Waiter },
    /// A chain's source collection changed.
    ListChanged { chain: NodeId, items: Value },
    /// A cog's data source changed.
    SourceChanged { node: NodeId, value: Value },
    /// A pinion's URL slot changed.
    UrlChanged { node: NodeId, url: Value },
    /// A watched slot of sensor `sensor` changed.
    Sensed { node: NodeId, sensor: usize, value: Value },
}

impl Event {
    pub fn node(&self) -> NodeId {
        match self {
            Event::Fetched { waiter, .. } => waiter.node(),
            Event::ListChanged { chain, .. } => *chain,
            Event::SourceChanged { node, .. }
            | Event::UrlChanged { node, .. }
            | Event::Sensed { node, .. } => *node,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: Rc<RefCell<VecDeque<Event>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: Event) {
        self.events.borrow_mut().push_back(event);
    }

    pub fn pop(&self) -> Option<Event> {
        self.events.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

// =============================================================================
// Watching
// =============================================================================

/// Push `to_event(value)` whenever `slot` changes.
///
/// With `immediate` the current value is reported right away too. Returns
/// the stop handle.
pub fn watch<F>(slot: &Signal<Value>, queue: &EventQueue, immediate: bool, to_event: F) -> impl FnOnce() + use<F>
where
    F: Fn(Value) -> Event + 'static,
{
    let slot = slot.clone();
    let queue = queue.clone();
    let mut first = true;

    let scope = effect_scope(false);
    scope.run(move || {
        let _effect_cleanup = effect(move || {
            let value = slot.get();
            let skip = first && !immediate;
            first = false;
            if !skip {
                queue.push(to_event(value));
            }
        });
    });

    move || {
        scope.stop();
    }
}

// =============================================================================
// Sensors
// =============================================================================

/// Runtime state of one declared sensor.
pub struct SensorState {
    pub def: Rc<SensorDef>,
    /// Watched slots in declaration order.
    pub slots: Vec<(String, Signal<Value>)>,
    /// Last value delivered, for `change` filtering.
    pub last: Option<Value>,
    /// Set after a `once` sensor delivered.
    pub done: bool,
}

impl SensorState {
    pub fn new(def: Rc<SensorDef>, slots: Vec<(String, Signal<Value>)>) -> Self {
        Self {
            def,
            slots,
            last: None,
            done: false,
        }
    }

    /// Value to deliver for a change carrying `value`.
    ///
    /// Multi-slot sensors deliver one object with every watched slot.
    pub fn merged(&self, value: Value) -> Value {
        if self.slots.len() < 2 {
            return value;
        }
        let map = self
            .slots
            .iter()
            .map(|(name, slot)| (name.clone(), slot.get()))
            .collect();
        Value::Object(map)
    }

    /// Record a delivery. False when the value must be dropped.
    pub fn accept(&mut self, value: &Value) -> bool {
        if self.done {
            return false;
        }
        if self.def.change && self.last.as_ref() == Some(value) {
            return false;
        }
        self.last = Some(value.clone());
        if self.def.once {
            self.done = true;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spark_signals::signal;

    #[test]
    fn test_watch_pushes_changes() {
        let queue = EventQueue::new();
        let slot = signal(json!(1));
        let node = NodeId(7);
        let stop = watch(&slot, &queue, false, move |url| Event::UrlChanged { node, url });
        assert!(queue.is_empty());

        slot.set(json!(2));
        assert_eq!(
            queue.pop(),
            Some(Event::UrlChanged {
                node,
                url: json!(2)
            })
        );

        stop();
        slot.set(json!(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_watch_immediate() {
        let queue = EventQueue::new();
        let slot = signal(json!([1]));
        let chain = NodeId(3);
        let _stop = watch(&slot, &queue, true, move |items| Event::ListChanged { chain, items });
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().map(|e| e.node()), Some(chain));
    }

    #[test]
    fn test_sensor_change_and_once() {
        let def = SensorDef {
            change: true,
            ..Default::default()
        };
        let mut state = SensorState::new(Rc::new(def), Vec::new());
        assert!(state.accept(&json!(1)));
        assert!(!state.accept(&json!(1)));
        assert!(state.accept(&json!(2)));

        let once = SensorDef {
            once: true,
            ..Default::default()
        };
        let mut state = SensorState::new(Rc::new(once), Vec::new());
        assert!(state.accept(&json!(1)));
        assert!(!state.accept(&json!(2)));
    }

    #[test]
    fn test_sensor_merges_multiple_slots() {
        let a = signal(json!(1));
        let b = signal(json!("x"));
        let state = SensorState::new(
            Rc::new(SensorDef::default()),
            vec![("a".into(), a), ("b".into(), b)],
        );
        assert_eq!(state.merged(json!(null)), json!({"a": 1, "b": "x"}));
    }
}
