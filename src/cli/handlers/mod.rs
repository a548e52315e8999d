// src/cli/handlers/mod.rs

pub mod build;
pub mod commons;
pub mod fetch;
pub mod init;
pub mod show;
pub mod status;
