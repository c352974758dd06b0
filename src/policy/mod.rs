//! Access policy: caller tiers and license ownership matching.

pub mod ownership;
pub mod tier;
