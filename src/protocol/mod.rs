//! Session wire types and topic layout
//!
//! This module implements the message structures exchanged with a human
//! participant over a session connection.

pub mod messages;
pub mod topics;

pub use messages::*;
pub use topics::*;
