//! In-process event hub shared by several windows.
//!
//! # Responsibility
//! - Hand out one `HubEndpoint` per window.
//! - Queue published events and deliver them when the host pumps the hub.
//!
//! # Invariants
//! - Delivery is FIFO across the whole hub; events published while
//!   dispatching are delivered in the same `dispatch_pending` call.
//! - Every subscriber of a topic receives the event, including the window
//!   that published it.
//! - Subscribers of one topic are called in subscription order.
//! - No hub borrow is held while handlers run.

use super::{BusError, BusEvent, BusHandler, BusResult, EventBus, SubscriptionId, WindowId};
use crate::config::is_valid_event_name;
use log::{debug, warn};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

/// Upper bound of deliveries per `dispatch_pending` call; stops runaway
/// publish feedback between handlers.
pub const MAX_DELIVERIES_PER_DISPATCH: usize = 10_000;

struct HubSubscription {
    id: SubscriptionId,
    window: WindowId,
    topic: String,
    handler: BusHandler,
}

struct HubState {
    subscriptions: Vec<HubSubscription>,
    queue: VecDeque<BusEvent>,
    next_subscription_id: u64,
    available: bool,
    published_by: BTreeMap<WindowId, u64>,
}

impl Default for HubState {
    fn default() -> Self {
        Self {
            subscriptions: Vec::new(),
            queue: VecDeque::new(),
            next_subscription_id: 1,
            available: true,
            published_by: BTreeMap::new(),
        }
    }
}

/// Event system of one desktop shell process.
#[derive(Clone, Default)]
pub struct LocalEventHub {
    state: Rc<RefCell<HubState>>,
}

impl LocalEventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects a new window to the hub.
    pub fn endpoint(&self, label: impl Into<String>) -> HubEndpoint {
        HubEndpoint {
            hub: self.clone(),
            window_id: WindowId::new(),
            label: label.into(),
        }
    }

    /// Marks the channel as (un)available. While unavailable, publish and
    /// subscribe fail with `BusError::Unavailable`; queued events are kept.
    pub fn set_available(&self, available: bool) {
        self.state.borrow_mut().available = available;
    }

    pub fn is_available(&self) -> bool {
        self.state.borrow().available
    }

    /// Number of events waiting for dispatch.
    pub fn pending_count(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Total accepted publishes across all windows.
    pub fn published_count(&self) -> u64 {
        self.state.borrow().published_by.values().sum()
    }

    /// Accepted publishes from one window.
    pub fn published_by(&self, window: WindowId) -> u64 {
        self.state
            .borrow()
            .published_by
            .get(&window)
            .copied()
            .unwrap_or(0)
    }

    /// Number of active subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.state
            .borrow()
            .subscriptions
            .iter()
            .filter(|subscription| subscription.topic == topic)
            .count()
    }

    /// Delivers queued events until the queue is empty.
    ///
    /// Returns the number of handler invocations. Stops early, leaving the
    /// rest queued, once `MAX_DELIVERIES_PER_DISPATCH` is reached.
    pub fn dispatch_pending(&self) -> usize {
        let mut delivered = 0;
        loop {
            let Some(event) = self.state.borrow_mut().queue.pop_front() else {
                break;
            };
            let handlers = self.handlers_for(&event.topic);
            for handler in handlers {
                handler(&event);
                delivered += 1;
            }
            if delivered >= MAX_DELIVERIES_PER_DISPATCH {
                warn!(
                    "event=bus_dispatch module=bus status=truncated delivered={} pending={}",
                    delivered,
                    self.pending_count()
                );
                break;
            }
        }
        delivered
    }

    fn handlers_for(&self, topic: &str) -> Vec<BusHandler> {
        self.state
            .borrow()
            .subscriptions
            .iter()
            .filter(|subscription| subscription.topic == topic)
            .map(|subscription| Rc::clone(&subscription.handler))
            .collect()
    }

    fn ensure_ready(&self, topic: &str) -> BusResult<()> {
        if !is_valid_event_name(topic) {
            return Err(BusError::InvalidTopic(topic.to_string()));
        }
        if !self.is_available() {
            return Err(BusError::Unavailable);
        }
        Ok(())
    }
}

/// One window's connection to a `LocalEventHub`.
#[derive(Clone)]
pub struct HubEndpoint {
    hub: LocalEventHub,
    window_id: WindowId,
    label: String,
}

impl HubEndpoint {
    /// Number of subscriptions this window holds on the hub.
    pub fn subscription_count(&self) -> usize {
        self.hub
            .state
            .borrow()
            .subscriptions
            .iter()
            .filter(|subscription| subscription.window == self.window_id)
            .count()
    }
}

impl EventBus for HubEndpoint {
    fn window_id(&self) -> WindowId {
        self.window_id
    }

    fn publish(&self, topic: &str, payload: Value) -> BusResult<()> {
        self.hub.ensure_ready(topic)?;
        let mut state = self.hub.state.borrow_mut();
        state.queue.push_back(BusEvent {
            topic: topic.to_string(),
            payload,
            source: self.window_id,
        });
        *state.published_by.entry(self.window_id).or_insert(0) += 1;
        debug!(
            "event=bus_publish module=bus status=queued window={} topic={}",
            self.label, topic
        );
        Ok(())
    }

    fn subscribe(&self, topic: &str, handler: BusHandler) -> BusResult<SubscriptionId> {
        self.hub.ensure_ready(topic)?;
        let mut state = self.hub.state.borrow_mut();
        let id = SubscriptionId(state.next_subscription_id);
        state.next_subscription_id += 1;
        state.subscriptions.push(HubSubscription {
            id,
            window: self.window_id,
            topic: topic.to_string(),
            handler,
        });
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.hub.state.borrow_mut();
        let before = state.subscriptions.len();
        state.subscriptions.retain(|subscription| subscription.id != id);
        state.subscriptions.len() != before
    }
}
