//! pdfchat core library: assistant API client, response collection, conversation orchestration,
//! per-session page state, and the web server used by the CLI.

pub mod assistants;
pub mod collector;
pub mod config;
pub mod conversation;
pub mod render;
pub mod session;
pub mod web;
