//! Cross-window publish/subscribe boundary.
//!
//! # Responsibility
//! - Define the transport contract the sync layer publishes and listens on.
//! - Provide `LocalEventHub`, an in-process model of the shell event system.
//!
//! # Invariants
//! - Payloads are JSON values; the transport never inspects them.
//! - Handlers must not panic: a panicking handler unwinds through the
//!   transport's dispatch loop.

use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use uuid::Uuid;

pub mod local_hub;

pub type BusResult<T> = Result<T, BusError>;

/// Handler invoked for each delivered event.
pub type BusHandler = Rc<dyn Fn(&BusEvent)>;

/// Transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Channel not ready or shut down.
    Unavailable,
    /// Topic violates the shell's event naming rules.
    InvalidTopic(String),
}

impl Display for BusError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "event bus unavailable"),
            Self::InvalidTopic(topic) => write!(f, "invalid event topic: {topic}"),
        }
    }
}

impl Error for BusError {}

/// Stable identity of one window connected to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(Uuid);

impl WindowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WindowId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for WindowId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle returned by `subscribe`, used to stop delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

/// One delivered event.
#[derive(Debug, Clone, PartialEq)]
pub struct BusEvent {
    pub topic: String,
    pub payload: Value,
    /// Window that published the event.
    pub source: WindowId,
}

/// Publish/subscribe transport between sibling windows.
pub trait EventBus {
    /// Identity stamped as `source` on this endpoint's publishes.
    fn window_id(&self) -> WindowId;
    /// Broadcasts `payload` on `topic` to every subscribed window.
    fn publish(&self, topic: &str, payload: Value) -> BusResult<()>;
    /// Starts delivering `topic` events to `handler`.
    fn subscribe(&self, topic: &str, handler: BusHandler) -> BusResult<SubscriptionId>;
    /// Stops delivery for `id`. Returns `false` for unknown ids.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}
