//! Case database row model

pub mod tsk;
mod types;

pub use types::*;
