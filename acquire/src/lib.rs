pub mod args;
pub mod template;
pub mod metadata;
pub mod engine;
