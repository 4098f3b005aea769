pub mod sampler;
pub mod cartesian;
pub mod spiral;
pub mod evi;
pub mod plan;

pub use sampler::{build_sampler, Sampler, SamplerError, Trajectory};
pub use plan::AcquisitionPlan;
