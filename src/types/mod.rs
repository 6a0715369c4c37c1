//! Core types for Tycho.

pub mod message;
pub mod generation;
pub mod stream;
pub mod usage;

pub use message::*;
pub use generation::*;
pub use stream::*;
pub use usage::*;
