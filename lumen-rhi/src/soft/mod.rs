//! CPU reference backend.
//!
//! Work is recorded into self-contained command streams and replayed by a dedicated queue
//! thread in submission order. Copies and clears really move bytes, draws and dispatches
//! are counted, and an optional validation layer checks resource states as they execute.

mod command;
mod device;
mod fence;
mod queue;
mod resource;
mod swapchain;
mod validation;

pub use command::SoftCommandList;
pub use device::SoftDevice;
pub use fence::SoftFence;
pub use resource::{SoftBuffer, SoftPipeline, SoftShader, SoftTexture};
pub use swapchain::SoftSwapchain;
