// Error kinds for the render session.
//
// Every fallible GPU call maps to exactly one variant, so the failing step
// is visible in the diagnostic and at each call site. Everything here is
// fatal; the only soft condition in the whole design (a non-optimal present
// result) never becomes an error and is logged by the caller instead.

use ash::vk;
use thiserror::Error;

pub type Result<T, E = RenderError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to load the Vulkan library: {0}")]
    LibraryLoadFailed(String),

    #[error("window could not be opened: {0}")]
    NoWindow(String),

    #[error("failed to get a native window handle: {0}")]
    NoWindowHandle(String),

    #[error("instance creation failed: {0}")]
    InstanceCreationFailed(vk::Result),

    #[error("debug messenger setup failed: {0}")]
    DebugMessengerCreationFailed(vk::Result),

    #[error("surface creation failed: {0}")]
    SurfaceCreationFailed(vk::Result),

    #[error("no Vulkan-capable devices available")]
    NoDevicesAvailable,

    #[error("no suitable GPU found")]
    NoSuitableDevice,

    #[error("device capability query failed: {0}")]
    DeviceQueryFailed(vk::Result),

    #[error("logical device creation failed: {0}")]
    DeviceCreationFailed(vk::Result),

    #[error("swapchain creation failed: {0}")]
    SwapchainCreationFailed(vk::Result),

    #[error("image view creation failed: {0}")]
    ImageViewCreationFailed(vk::Result),

    #[error("render pass creation failed: {0}")]
    RenderPassCreationFailed(vk::Result),

    #[error("shader {0:?} not found")]
    ShaderNotFound(String),

    #[error("shader {name:?} is not valid SPIR-V: {source}")]
    InvalidShaderBytecode {
        name: String,
        source: std::io::Error,
    },

    #[error("shader module creation failed for {name:?}: {result}")]
    ShaderModuleCreationFailed { name: String, result: vk::Result },

    #[error("pipeline layout creation failed: {0}")]
    PipelineLayoutCreationFailed(vk::Result),

    #[error("graphics pipeline creation failed: {0}")]
    GraphicsPipelineCreationFailed(vk::Result),

    #[error("framebuffer creation failed: {0}")]
    FramebufferCreationFailed(vk::Result),

    #[error("command pool creation failed: {0}")]
    CommandPoolCreationFailed(vk::Result),

    #[error("command buffer allocation failed: {0}")]
    CommandBufferAllocationFailed(vk::Result),

    #[error("command buffer begin failed: {0}")]
    CommandBufferBeginFailed(vk::Result),

    #[error("command buffer recording failed: {0}")]
    CommandBufferRecordFailed(vk::Result),

    #[error("sync object creation failed: {0}")]
    SyncObjectCreationFailed(vk::Result),

    #[error("fence wait failed: {0}")]
    FenceWaitFailed(vk::Result),

    #[error("device idle wait failed: {0}")]
    DeviceWaitFailed(vk::Result),

    #[error("swapchain image acquire failed: {0}")]
    AcquireImageFailed(vk::Result),

    #[error("queue submit failed: {0}")]
    QueueSubmitFailed(vk::Result),
}
