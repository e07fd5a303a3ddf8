// Backend module - Vulkan abstraction layer
//
// Thin wrapper around ash: device/session root, swapchain, pipeline,
// shaders, sync objects, and the teardown plan.

pub mod device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod teardown;

pub use device::VulkanDevice;
pub use swapchain::Swapchain;
