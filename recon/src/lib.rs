pub mod args;
pub mod haar;
pub mod density;
pub mod reconstructor;
pub mod output;
pub mod analysis;
