//! Infrastructure layer

pub mod host;
pub mod registry;
