//! Core application module
//!
//! This module contains the application entry point and the Cosmic
//! Application that hosts the scanner screen.

pub mod app;
