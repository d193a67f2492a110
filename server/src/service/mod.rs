//! Service layer

pub mod dispatcher;
pub mod executor;
pub mod sanitize;
