pub mod tissue;
pub mod phantom;
pub mod frame_state;

pub use phantom::{Phantom, PhantomError};
pub use frame_state::FrameState;
