//! Course marketplace and SCORM package backend.
//!
//! Packages flow through [`archive`] (validation), [`extract`] (unpacking),
//! [`registry`] (bookkeeping) and [`launch`] (URL resolution); the content
//! player then reports learner state to [`progress`].

pub mod archive;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod launch;
pub mod mailer;
pub mod manifest;
pub mod models;
pub mod progress;
pub mod registry;
pub mod routes;
pub mod state;
pub mod store;

pub use routes::router;
pub use state::AppState;
