//! Integration test modules

mod auth;
mod results;
mod voting;
