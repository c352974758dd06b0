//! Hashing and message authentication.

pub mod digest;
pub mod webhook;
