//! Cross-cutting services: notifications and persistence.

mod notifier;
mod repository;

pub use notifier::{
    Event, LogNotifier, Notifier, NotifierRegistry, OpportunityEvent, SystemErrorEvent,
    TradeEvent, WebhookNotifier,
};
pub use repository::{JsonlRepository, MemoryRepository, Repository};
