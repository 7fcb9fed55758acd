// Backend module - Vulkan abstraction layer
//
// Thin helpers around ash. Each file owns one step of bringing the
// triangle on screen; the renderer calls them in order.

pub mod buffer;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use swapchain::Swapchain;
