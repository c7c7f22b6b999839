//! Offline-first session layer for the rider and driver apps: the logged-in actor and
//! its trip history on the device, queues for ratings and profile edits that could
//! not be sent, and the reconciliation pass that syncs both with the backend.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
