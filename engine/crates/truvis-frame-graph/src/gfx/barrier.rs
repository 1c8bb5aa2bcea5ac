use ash::vk;

use crate::gfx::resource_state::ResourceState;

/// 图像状态转换 barrier
///
/// 只记录 image 和前后两个状态，stage/access/layout 在转换为 Vulkan 结构体时由状态推导。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxImageBarrier {
    pub image: vk::Image,
    pub aspect: vk::ImageAspectFlags,
    pub old_state: ResourceState,
    pub new_state: ResourceState,
}

impl GfxImageBarrier {
    #[inline]
    pub fn new(image: vk::Image, old_state: ResourceState, new_state: ResourceState) -> Self {
        Self {
            image,
            aspect: vk::ImageAspectFlags::COLOR,
            old_state,
            new_state,
        }
    }

    /// builder
    #[inline]
    pub fn with_aspect(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.aspect = aspect;
        self
    }

    /// 转换为 Vulkan barrier，layer 和 miplevel 都使用默认值
    pub fn vk_barrier(&self) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2 {
            src_stage_mask: self.old_state.stage(),
            src_access_mask: self.old_state.src_access(),
            dst_stage_mask: self.new_state.stage(),
            dst_access_mask: self.new_state.access(),
            old_layout: self.old_state.layout(),
            new_layout: self.new_state.layout(),
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: self.image,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: self.aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        }
    }
}

/// 缓冲区状态转换 barrier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxBufferBarrier {
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    /// WHOLE_SIZE 表示整个缓冲区
    pub size: vk::DeviceSize,
    pub old_state: ResourceState,
    pub new_state: ResourceState,
}

impl GfxBufferBarrier {
    #[inline]
    pub fn new(buffer: vk::Buffer, old_state: ResourceState, new_state: ResourceState) -> Self {
        Self {
            buffer,
            offset: 0,
            size: vk::WHOLE_SIZE,
            old_state,
            new_state,
        }
    }

    pub fn vk_barrier(&self) -> vk::BufferMemoryBarrier2<'static> {
        vk::BufferMemoryBarrier2 {
            src_stage_mask: self.old_state.stage(),
            src_access_mask: self.old_state.src_access(),
            dst_stage_mask: self.new_state.stage(),
            dst_access_mask: self.new_state.access(),
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            buffer: self.buffer,
            offset: self.offset,
            size: self.size,
            ..Default::default()
        }
    }
}
