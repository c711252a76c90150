//! Shared data model for the clawdeck control panel.

pub mod config;
pub mod edit;
pub mod event;
pub mod gateway;
pub mod probe;
pub mod system;
pub mod wizard;
