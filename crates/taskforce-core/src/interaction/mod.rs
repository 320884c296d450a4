//! Human-in-the-loop suspension

mod broker;

pub use broker::{BrokerTimeouts, InputOutcome, InteractionBroker, ResolveOutcome};
