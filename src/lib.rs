// Core library for the Gantry request pipeline
// This module contains the handler metadata, compilation, and dispatch components

pub mod adapter;
pub mod compiler;
pub mod container;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod exceptions;
pub mod handler;
pub mod http;
pub mod logging;
pub mod metadata;
pub mod params;
pub mod pipeline;
pub mod resolver;
pub mod response_filter;
pub mod status;

// Re-export commonly used types
pub use adapter::*;
pub use compiler::*;
pub use container::*;
pub use context::*;
pub use dispatcher::*;
pub use error::*;
pub use exceptions::*;
pub use handler::*;
pub use http::*;
pub use logging::*;
pub use metadata::*;
pub use params::*;
pub use pipeline::*;
pub use resolver::*;
pub use response_filter::*;
pub use status::*;
