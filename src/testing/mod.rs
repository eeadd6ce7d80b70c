//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for exercising the tools without
//! a broker or a live session.

pub mod mocks;

pub use mocks::*;
