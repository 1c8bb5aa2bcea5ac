//! 渲染图依赖的图形 API 接口
//!
//! - `GfxDevice`: 资源创建，command pool / fence / semaphore 的池化借出
//! - `GfxQueue`: submit 与 present
//! - `GfxSwapchain`: 获取可呈现的 image
//! - `GfxCommandEncoder`: command buffer 录制
//!
//! `RecordingDevice` 是一个只在 CPU 上运行的实现，用于测试和 demo。

pub mod barrier;
pub mod command;
pub mod device;
pub mod error;
pub mod queue;
pub mod recording_device;
pub mod resource_state;
pub mod swapchain;

pub use barrier::{GfxBufferBarrier, GfxImageBarrier};
pub use command::{GfxClearValue, GfxCommandEncoder, GfxCommandPool, GfxRenderingAttachment, GfxRenderingInfo};
pub use device::{GfxBufferCreateInfo, GfxDevice, GfxImageCreateInfo, GfxSemaphoreType, QueueType};
pub use error::{GfxError, GfxResult};
pub use queue::{GfxQueue, GfxSemaphoreInfo, GfxSubmitInfo};
pub use resource_state::ResourceState;
pub use swapchain::GfxSwapchain;
