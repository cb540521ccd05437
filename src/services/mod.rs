pub mod backend;
pub mod backoff;
pub mod bootstrap;
pub mod client;
pub mod context;
pub mod fetchers;
pub mod identity;
pub mod mutations;
pub mod notifications;
pub mod recommendations;
pub mod scheduler;
pub mod session;
pub mod single_flight;
pub mod store;

#[cfg(test)]
mod test_support;

pub use backend::{Backend, HttpBackend};
pub use client::SyncClient;
pub use identity::{IdentityEvent, IdentityProvider, SharedTokenProvider};
pub use mutations::MutationOutcome;
