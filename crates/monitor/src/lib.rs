pub mod alerter;
pub mod collector;
pub mod config;
pub mod engine;
pub mod explorer;
pub mod heights;
pub mod incident;
pub mod models;
pub mod storage;
pub mod timefmt;
