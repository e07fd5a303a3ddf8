// Synchronization primitives
//
// One triple per frame slot: two GPU-side semaphores and one CPU-observable
// fence. The fence starts signaled so the first frame does not block.

use ash::vk;

use crate::error::{RenderError, Result};

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &ash::Device) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            let image_available = device
                .create_semaphore(&semaphore_info, None)
                .map_err(RenderError::SyncObjectCreationFailed)?;

            let render_finished = match device.create_semaphore(&semaphore_info, None) {
                Ok(semaphore) => semaphore,
                Err(result) => {
                    device.destroy_semaphore(image_available, None);
                    return Err(RenderError::SyncObjectCreationFailed(result));
                }
            };

            let in_flight = match device.create_fence(&fence_info, None) {
                Ok(fence) => fence,
                Err(result) => {
                    device.destroy_semaphore(render_finished, None);
                    device.destroy_semaphore(image_available, None);
                    return Err(RenderError::SyncObjectCreationFailed(result));
                }
            };

            Ok(Self {
                image_available,
                render_finished,
                in_flight,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight, None);
        }
    }
}
