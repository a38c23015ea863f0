//! Background job dispatch.

mod dispatcher;

pub use dispatcher::JobDispatcher;
