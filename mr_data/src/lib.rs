pub mod measurement;
pub mod cfl;
pub mod ground_truth;
