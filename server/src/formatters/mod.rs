//! Reply Formatting
//!
//! Renders scheduling records as chat-friendly text.

pub mod agenda;
pub mod message_threads;

pub use agenda::format_agenda;
pub use message_threads::format_message_threads;
