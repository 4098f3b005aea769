pub mod nufft;
pub mod smaps;

pub use nufft::{build_operator, FftBackend, NufftError, NufftOperator, Nudft};
pub use smaps::{coil_combine, coil_image, smaps};
