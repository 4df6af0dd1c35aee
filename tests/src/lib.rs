//! # Dgas Services Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/
//! │   └── auth_benchmarks.rs   # signing, recovery, request verification
//! └── src/integration/
//!     ├── signing_flow.rs      # client signing → verifier
//!     ├── task_flow.rs         # dispatcher ↔ listener over one bus
//!     └── gateway_flow.rs      # signed HTTP → gateway → task queue
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p dgas-tests
//! cargo test -p dgas-tests integration::task_flow::
//! cargo bench -p dgas-tests
//! ```

#![allow(dead_code)]

pub mod integration;
