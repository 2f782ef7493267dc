//! Photo face-detection pipeline
//!
//! Uploaded photos become pending jobs in PostgreSQL, their IDs travel over a
//! Redis queue, and a worker process runs the external detector on each one
//! and records the face count (or an error) back on the job.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
pub mod startup;
