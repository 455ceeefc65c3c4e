//! Long-lived background workers

pub mod auto_trigger;
