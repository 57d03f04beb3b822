//! # Elearn API Server Library
//!
//! HTTP surface of the e-learning platform: authentication, course
//! authoring and consumption, FedaPay payment webhooks and callbacks,
//! progress, certificates and management views.
//!
//! ## Modules
//!
//! - `app`: application state and router builder
//! - `config`: configuration from the environment
//! - `error`: error handling and HTTP response mapping
//! - `middleware`: tower layers
//! - `routes`: route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
