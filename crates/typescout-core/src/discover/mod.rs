//! Field-offset discoverers
//!
//! Each submodule adds `discover_*` stages to
//! [`DiscoverySession`](crate::session::DiscoverySession); the session runs them in
//! dependency order. Pure scoring helpers sit next to the stage that uses them.

pub mod agreement;
mod class;
mod function;
pub mod meta_kind;
mod object;
mod precision;
mod property;
mod routines;
pub mod strategy;
mod structure;
mod typed;
mod world;

pub use agreement::{Agreement, Threshold};
pub use meta_kind::MetaKind;
pub use precision::detect_precision;
pub use strategy::{FallbackChain, Resolved};
