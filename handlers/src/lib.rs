pub mod handler;
pub mod hrf;
pub mod activation;
pub mod noise;

pub use handler::{build_handlers, Handler, HandlerChain, HandlerError, TimeCourse, TimePoint};
