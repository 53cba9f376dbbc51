//! Server unit and integration tests.
//!
//! Tests are organized into modules by feature area:
//! - `common` - Shared test helpers and utilities
//! - `membership` - Groups, memberships and invitations
//! - `ledger` - Cart item CRUD, invariants and notifications
//! - `realtime` - Hub fan-out as seen from the server
//! - `retry` - Store failure injection with mockall
//! - `http` - Routes exercised over a real listener
//! - `ws` - WebSocket subscriptions from a real client

pub mod common;

mod membership;
mod retry;
