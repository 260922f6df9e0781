//! mysite - blog, shop and account management site
//!
//! This library provides the models, storage, services and HTTP layer;
//! the `mysite` binary runs the server and management commands.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod templates;
