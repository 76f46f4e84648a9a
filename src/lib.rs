//! Chunked BAQ query client and its command-line front end.

pub mod baq;
pub mod commands;
pub mod config;
