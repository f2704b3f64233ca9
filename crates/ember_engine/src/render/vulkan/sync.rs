//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! Fences are the only synchronization object this core needs: every one-shot
//! command sequence blocks on a dedicated fence before its resources are
//! reused or discarded.

use ash::{vk, Device};
use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};

/// Default fence wait timeout: effectively wait forever
pub const DEFAULT_FENCE_TIMEOUT: u64 = u64::MAX;

/// Fence wrapper with RAII cleanup
///
/// A fence is either signaled or unsignaled; the initial state is chosen at
/// construction. Resetting a fence while a submission referencing it is still
/// in flight is a caller contract, not something the fence can enforce.
pub struct Fence {
    device: Device,
    fence: vk::Fence,
    name: String,
}

impl Fence {
    /// Create a new fence with an explicit initial state
    pub fn new(ctx: &DeviceContext, name: &str, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            ctx.device().create_fence(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device: ctx.raw_device(),
            fence,
            name: name.to_string(),
        })
    }

    /// Create an unsignaled fence, hand it to the caller's submission closure,
    /// then block until the fence signals or the timeout elapses
    ///
    /// This combines the pervasive setup-time pattern "build a one-shot fence,
    /// submit, wait on it" into one call.
    pub fn for_submission<F>(
        ctx: &DeviceContext,
        name: &str,
        timeout_ns: u64,
        submit: F,
    ) -> VulkanResult<Self>
    where
        F: FnOnce(vk::Fence) -> VulkanResult<()>,
    {
        let fence = Self::new(ctx, name, false)?;
        submit(fence.fence)?;
        fence.wait(timeout_ns)?;
        Ok(fence)
    }

    /// Block until the fence signals or the timeout elapses
    ///
    /// A timeout is reported as [`VulkanError::FenceTimeout`], never as a
    /// false success. Waiting on an already-signaled fence returns immediately.
    pub fn wait(&self, timeout_ns: u64) -> VulkanResult<()> {
        let result = unsafe {
            self.device.wait_for_fences(&[self.fence], true, timeout_ns)
        };

        match result {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => {
                log::warn!("Fence '{}' wait timed out after {} ns", self.name, timeout_ns);
                Err(VulkanError::FenceTimeout { timeout_ns })
            }
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Reset the fence to the unsignaled state
    ///
    /// Must only be called when no pending submission references this fence.
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device.reset_fences(&[self.fence])
                .map_err(VulkanError::Api)
        }
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time validation of the fence API surface; exercising the
    /// behavior itself needs a live device.
    #[test]
    fn test_fence_api_signatures() {
        let _new: fn(&DeviceContext, &str, bool) -> VulkanResult<Fence> = Fence::new;
        let _wait: fn(&Fence, u64) -> VulkanResult<()> = Fence::wait;
        let _reset: fn(&Fence) -> VulkanResult<()> = Fence::reset;
    }

    #[test]
    fn test_default_timeout_is_unbounded() {
        assert_eq!(DEFAULT_FENCE_TIMEOUT, u64::MAX);
    }
}
