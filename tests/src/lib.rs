//! # Event Bus Test Suite
//!
//! End-to-end flows across the event bus crates, driven through the
//! in-memory broker.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs   # Shared events, handlers and bus builders
//!     ├── flows.rs      # Publish → route → dispatch → settle
//!     ├── naming.rs     # Prefix/suffix conventions end to end
//!     └── lifecycle.rs  # Unsubscribe and dispose
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p eventbus-tests
//! cargo test -p eventbus-tests integration::flows::
//! ```

#![allow(dead_code)]

pub mod integration;
