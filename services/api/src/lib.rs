pub mod adapters;
pub mod config;
pub mod error;
pub mod roast_worker;
pub mod web;
