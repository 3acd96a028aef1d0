//! Common types shared by the gym console crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
