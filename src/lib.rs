//! Relays Notion records that reach "Done" to a Telegram chat and lets a
//! reviewer approve them back into "Scheduled".
pub mod chat;
pub mod config;
pub mod content;
pub mod format;
pub mod handlers;
pub mod model;
pub mod notion;
pub mod poller;
