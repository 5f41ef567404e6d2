//! Code-section scanning
//!
//! Routines that cannot be reached through data are found by masked byte patterns
//! near known anchors: a virtual table slot, or a reference to a string literal.

pub mod dispatch;
pub mod formatter;
pub mod xref;

pub use dispatch::find_event_dispatch;
pub use formatter::find_string_formatter;
pub use xref::{find_rip_reference, resolve_call, resolve_relative};
