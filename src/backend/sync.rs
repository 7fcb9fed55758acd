// Synchronization primitives
//
// One frame in flight: two semaphores order acquire -> render -> present on
// the GPU, and one fence stops the CPU from reusing them too early.

use anyhow::{Context, Result};
use ash::vk;
use super::VulkanDevice;

pub struct FrameSync {
    /// Signalled by acquire, waited on by the submit
    pub present_complete: vk::Semaphore,
    /// Signalled by the submit, waited on by present
    pub render_complete: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let fence_info = vk::FenceCreateInfo::builder()
            .flags(vk::FenceCreateFlags::SIGNALED); // First frame must not block

        let sync = Self {
            present_complete: device.create_semaphore()?,
            render_complete: device.create_semaphore()?,
            in_flight_fence: unsafe {
                device.device.create_fence(&fence_info, None)
                    .context("Failed to create fence")?
            },
        };
        log::info!("Semaphores created");

        Ok(sync)
    }

    /// Block until the previous submission finished, then re-arm the fence
    pub fn wait_and_reset(&self, device: &ash::Device) -> Result<()> {
        unsafe {
            device.wait_for_fences(&[self.in_flight_fence], true, u64::MAX)
                .context("Failed waiting for previous frame")?;
            device.reset_fences(&[self.in_flight_fence])
                .context("Failed to reset frame fence")?;
        }
        Ok(())
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.present_complete, None);
            device.destroy_semaphore(self.render_complete, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
