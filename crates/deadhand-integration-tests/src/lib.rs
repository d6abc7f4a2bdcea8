//! Cross-crate tests for the switch release path.
//!
//! - `readiness_flow`: heartbeats through relays, monitor polling and
//!   network aggregation.
//! - `simulation_flow`: dry-run simulation against monitored guardians.
//! - `release_lifecycle`: encrypt, arm, distribute, expire, open shares and
//!   decrypt.
