//! HTTP request handlers.

pub mod fragments;
pub mod health;

pub use fragments::*;
pub use health::*;
