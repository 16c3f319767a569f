//! Huddle - real-time messaging and presence engine
//!
//! Keeps connected clients of a team workspace in sync: who is online, who
//! is typing, and the ordered stream of message changes in every channel.
//! The client-side reconciliation layer merges that stream with paginated
//! REST history.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
