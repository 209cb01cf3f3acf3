//! Shared infrastructure utilities for evote.
//!
//! - **`atomic_write`**: crash-safe file persistence (temp + rename) for the
//!   credential file and config edits
//! - **`security`**: scrubbing bearer tokens out of text bound for logs or the UI

pub mod atomic_write;
pub mod security;

pub use atomic_write::{FileVisibility, atomic_write, ensure_private_dir, remove_if_exists};
pub use security::redact_tokens;
