//! Machine configuration and step tracing for polar printers.

pub mod config;
pub mod machine;
