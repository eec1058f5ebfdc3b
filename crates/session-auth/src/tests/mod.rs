//! Session lifecycle tests.
//!
//! - `harness.rs`     - Mock transport, mock auth endpoints, TestSession
//! - `scheduling.rs`  - Renewal timer placement, re-arming and cancellation
//! - `single_flight.rs` - One refresh shared by concurrent callers
//! - `retry.rs`       - 401 refresh-and-retry, masked network failures
//! - `lifecycle.rs`   - Login, restore, teardown and stale refresh results

pub(crate) mod harness;
