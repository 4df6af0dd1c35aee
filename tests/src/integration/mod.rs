//! Cross-crate flows.

pub mod gateway_flow;
pub mod signing_flow;
pub mod task_flow;
