#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod fetch;
pub mod formats;
pub mod gate;
pub mod links;
pub mod llm;
pub mod logging;
pub mod platform;
pub mod refs;
pub mod summary;
pub mod track;
