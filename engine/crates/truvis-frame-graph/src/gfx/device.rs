use ash::vk;

use crate::gfx::command::{GfxCommandEncoder, GfxCommandPool};
use crate::gfx::error::GfxResult;
use crate::gfx::queue::{GfxQueue, GfxSemaphoreInfo};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum QueueType {
    #[default]
    Graphics,
    Compute,
    Transfer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxSemaphoreType {
    Binary,
    Timeline,
}

/// 创建 image 所需的信息
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxImageCreateInfo {
    pub name: String,
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub image_type: vk::ImageType,
    pub mip_levels: u32,
    pub array_layers: u32,
}

impl GfxImageCreateInfo {
    pub fn new_2d(
        name: impl Into<String>,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            name: name.into(),
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            format,
            usage,
            image_type: vk::ImageType::TYPE_2D,
            mip_levels: 1,
            array_layers: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxBufferCreateInfo {
    pub name: String,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

/// 图形设备
///
/// 负责 GPU 对象的创建与销毁，以及 command pool、fence、semaphore 的池化借出。
/// 借出的对象必须通过对应的 release 接口归还，调用方不拥有它们。
pub trait GfxDevice: Send + Sync {
    // resources
    fn create_image(&self, info: &GfxImageCreateInfo) -> GfxResult<vk::Image>;
    fn destroy_image(&self, image: vk::Image);
    fn create_buffer(&self, info: &GfxBufferCreateInfo) -> GfxResult<vk::Buffer>;
    fn destroy_buffer(&self, buffer: vk::Buffer);

    // pooled objects
    fn acquire_command_pool(&self, queue_type: QueueType) -> GfxResult<Box<dyn GfxCommandPool>>;
    fn release_command_pool(&self, pool: Box<dyn GfxCommandPool>);

    fn acquire_fence(&self, signaled: bool) -> GfxResult<vk::Fence>;
    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()>;
    fn wait_fence(&self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<()>;
    fn release_fence(&self, fence: vk::Fence);

    fn acquire_semaphore(&self, semaphore_type: GfxSemaphoreType) -> GfxResult<vk::Semaphore>;
    fn release_semaphore(&self, semaphore: vk::Semaphore);

    // queues
    fn queue(&self, queue_type: QueueType) -> &dyn GfxQueue;

    /// 录制一段一次性的命令并同步提交，返回时 GPU 已经执行完毕
    fn execute_single_commands(
        &self,
        queue_type: QueueType,
        wait_infos: &[GfxSemaphoreInfo],
        signal_infos: &[GfxSemaphoreInfo],
        record: &mut dyn FnMut(&mut dyn GfxCommandEncoder),
    ) -> GfxResult<()>;

    fn wait_idle(&self) -> GfxResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_create_info_2d() {
        let info = GfxImageCreateInfo::new_2d(
            "scene_color",
            vk::Extent2D {
                width: 800,
                height: 600,
            },
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
        );
        assert_eq!(info.extent.depth, 1);
        assert_eq!(info.image_type, vk::ImageType::TYPE_2D);
        assert_eq!(info.mip_levels, 1);
    }
}
