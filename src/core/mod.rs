// src/core/mod.rs

pub mod arch;
pub mod build;
pub mod definition;
pub mod host;
pub mod options;
pub mod registry;
pub mod resolver;
