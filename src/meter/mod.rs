//! Usage statistics computed from the validation log.

pub mod usage;
