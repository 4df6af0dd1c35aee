//! # Domain Layer
//!
//! Pure cryptographic and encoding logic with no I/O dependencies.

pub mod ecdsa;
pub mod encoding;
pub mod entities;
pub mod errors;
pub mod signing_string;
