use std::any::Any;
use crate::error::RhiResult;

/// A monotonically increasing 64-bit timeline shared by the CPU and the GPU.
///
/// Signaled values never decrease. Waiting for a value nobody signals blocks forever,
/// unless the device that would signal it is lost.
pub trait Fence: Send + Sync + std::fmt::Debug {
    /// Highest value reached so far.
    fn completed_value(&self) -> u64;

    /// Signal from the CPU. Values lower than the current one are ignored.
    fn signal(&self, value: u64);

    /// Block the calling thread until the fence reaches `value`.
    ///
    /// Fails with [`RhiError::DeviceLost`](crate::RhiError::DeviceLost) if the queue that
    /// signals the fence stopped before reaching it.
    fn wait(&self, value: u64) -> RhiResult<()>;

    #[inline]
    fn is_complete(&self, value: u64) -> bool {
        self.completed_value() >= value
    }

    fn as_any(&self) -> &dyn Any;
}
