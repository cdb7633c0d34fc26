//! Real-time event fan-out: broadcaster, subscriptions, filters

mod broadcaster;
mod filters;

pub use broadcaster::{EventBroadcaster, SubscriptionHandle};
pub use filters::EventFilter;
