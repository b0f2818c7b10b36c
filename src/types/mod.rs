//! Shared types for rootline

mod error;

pub use error::{Result, RootlineError};
