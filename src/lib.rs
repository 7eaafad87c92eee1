pub mod app;
pub mod batch;
pub mod config;
pub mod domain;
pub mod error;
pub mod eutils;
pub mod idset;
pub mod outcome;
pub mod output;
pub mod prompt;
pub mod reconcile;
pub mod session;
pub mod store;
