pub mod action;
pub mod config;
pub mod errors;
pub mod logging;
pub mod parser;
pub mod runner;
pub mod runtime;
pub mod ui;
pub mod workbench;
