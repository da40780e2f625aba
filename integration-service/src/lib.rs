//! Provider integration service: usage reporting, activity tracking and
//! maintenance scheduling.

pub mod cli;
pub mod config;
pub mod ipc;
pub mod models;
pub mod services;
pub mod startup;
