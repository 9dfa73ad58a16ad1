//! Parley - Real-Time Chat Backend
//!
//! This crate implements the message delivery and notification fanout core
//! of a multi-instance chat service.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
