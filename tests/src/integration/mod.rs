//! Cross-crate integration tests.

pub mod fixtures;

mod flows;
mod lifecycle;
mod naming;
