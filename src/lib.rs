//! Calorie tracking client.
//!
//! Computes the daily calorie budget from a user's profile and weight goal, keeps the
//! per-day meal ledger, asks a vision model for calorie estimates of meal photos and
//! talks to the registration/login/profile backend.

pub mod auth;
pub mod client;
pub mod config;
pub mod context;
pub mod errors;
pub mod ledger;
pub mod models;
pub mod store;
pub mod targets;
pub mod tracker;
pub mod vision;
