use ash::vk;

use crate::gfx::barrier::{GfxBufferBarrier, GfxImageBarrier};
use crate::gfx::device::QueueType;
use crate::gfx::error::GfxResult;
use crate::gfx::resource_state::ResourceState;

/// attachment 的清除值
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GfxClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl GfxClearValue {
    pub fn vk_clear_value(&self) -> vk::ClearValue {
        match *self {
            Self::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            Self::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GfxRenderingAttachment {
    pub image: vk::Image,
    /// attachment 在 rendering 期间所处的状态，决定 image layout
    pub state: ResourceState,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_value: GfxClearValue,
}

impl GfxRenderingAttachment {
    pub fn cleared(image: vk::Image, state: ResourceState, clear_value: GfxClearValue) -> Self {
        Self {
            image,
            state,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value,
        }
    }

    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.state.layout()
    }
}

/// dynamic rendering 的参数
#[derive(Clone, Debug, PartialEq)]
pub struct GfxRenderingInfo {
    pub render_area: vk::Rect2D,
    pub color_attachments: Vec<GfxRenderingAttachment>,
    pub depth_attachment: Option<GfxRenderingAttachment>,
}

impl GfxRenderingInfo {
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            color_attachments: Vec::new(),
            depth_attachment: None,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.color_attachments.is_empty() && self.depth_attachment.is_none()
    }
}

/// command buffer 的录制接口
///
/// 每个方法对应一条（或一组）vkCmd* 调用。
pub trait GfxCommandEncoder: Send {
    fn vk_handle(&self) -> vk::CommandBuffer;

    // lifetime
    fn begin(&mut self) -> GfxResult<()>;
    fn end(&mut self) -> GfxResult<()>;

    // debug
    fn set_debug_name(&mut self, name: &str);
    fn begin_label(&mut self, label: &str, color: [f32; 4]);
    fn end_label(&mut self);

    // sync
    /// - command type: action
    /// - supported queue types: graphics, compute, transfer
    fn pipeline_barrier(&mut self, image_barriers: &[GfxImageBarrier], buffer_barriers: &[GfxBufferBarrier]);

    // rendering
    /// - command type: action, state
    /// - supported queue types: graphics
    fn begin_rendering(&mut self, info: &GfxRenderingInfo);
    fn end_rendering(&mut self);

    // transfer
    /// 要求 src 处于 TRANSFER_SRC，dst 处于 TRANSFER_DST，且 extent 完全一致
    fn copy_image(&mut self, src: vk::Image, dst: vk::Image, extent: vk::Extent3D);
    /// 可缩放的拷贝
    fn blit_image(
        &mut self,
        src: vk::Image,
        src_extent: vk::Extent2D,
        dst: vk::Image,
        dst_extent: vk::Extent2D,
        filter: vk::Filter,
    );
    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]);

    // state
    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);
    fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    );
    fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, offset: u32, data: &[u8]);
    fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]);
    fn bind_index_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType);
    fn set_viewport(&mut self, viewport: vk::Viewport);
    fn set_scissor(&mut self, scissor: vk::Rect2D);

    // action
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn dispatch(&mut self, group_count: [u32; 3]);
}

/// command pool，只能被一个线程独占使用
pub trait GfxCommandPool: Send {
    fn vk_handle(&self) -> vk::CommandPool;
    fn queue_type(&self) -> QueueType;

    /// 重置 pool，之前分配的所有 command buffer 都会失效
    fn reset(&mut self) -> GfxResult<()>;
    fn allocate(&mut self, name: &str) -> GfxResult<Box<dyn GfxCommandEncoder>>;
}
