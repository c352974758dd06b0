//! Wire formats of the licensing API.

pub mod models;
