//! Widgets for the scanner window

pub mod scanner;
