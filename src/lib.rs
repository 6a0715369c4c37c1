//! Tycho — provider dispatch and middleware for language model calls.
//!
//! Turns an opaque `provider:model` identifier into a uniformly-shaped,
//! ready-to-call model handle, with an ordered middleware chain composed
//! around every call.
//!
//! # Quick Start
//!
//! ```no_run
//! use tycho::prelude::*;
//!
//! # async fn example() -> tycho::error::Result<()> {
//! let factory = ModelFactory::from_env();
//! let model = factory.get_model("anthropic:claude-sonnet-4-5")?;
//! let response = model
//!     .generate(&GenerateRequest::new(vec![ModelMessage::user("Hello!")]))
//!     .await?;
//! println!("{}", response.text);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod factory;
pub mod middleware;
pub mod prelude;
pub mod provider;
pub mod registry;
pub mod types;
