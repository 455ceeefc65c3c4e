//! Core data model for the operation engine

pub mod operation;
pub mod target;

pub use operation::{OpStatus, Operation};
pub use target::Target;
