//! fleetpatchd Library
//!
//! Core modules for the fleet patching and disk maintenance engine.

pub mod app;
pub mod catalog;
pub mod channel;
pub mod disk;
pub mod errors;
pub mod inventory;
pub mod logs;
pub mod models;
pub mod notify;
pub mod osdetect;
pub mod runner;
pub mod storage;
pub mod store;
pub mod utils;
pub mod workers;
