//! Core identity and session logic for fleetgate

pub mod auth;
pub mod config;
pub mod db;
