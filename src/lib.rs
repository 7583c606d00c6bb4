//! Library exports for the go-link redirector
//!
//! This module exposes internal components for testing and potential library usage.

pub mod clicks;
pub mod config;
pub mod database;
pub mod error;
pub mod handler;
pub mod keyword;
pub mod memory;
pub mod middleware;
pub mod model;
pub mod ranking;
pub mod registry;
pub mod resolver;
pub mod route;
pub mod transfer;
