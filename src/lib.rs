//! Client-side state synchronization and optimistic-mutation engine for a
//! rate-limited movie backend.

pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
