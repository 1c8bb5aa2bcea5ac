use ash::vk;

use crate::gfx::GfxCommandEncoder;
use crate::render_graph::handle::RgResourceHandle;
use crate::render_graph::physical_cache::RgPhysicalCache;
use crate::render_graph::resource_registry::RgResourceRegistry;

/// pass 录制回调能看到的全部接口
///
/// 进入回调时 barrier 已经插入、rendering 已经开始；
/// 这里只暴露 bind/draw/dispatch/copy，回调无法插入 barrier 或结束 rendering。
pub struct RgPassRecorder<'a> {
    pub(crate) cmd: &'a mut dyn GfxCommandEncoder,
    pub(crate) pass_name: &'a str,
    pub(crate) registry: &'a RgResourceRegistry,
    pub(crate) cache: &'a RgPhysicalCache,
    pub(crate) render_extent: vk::Extent2D,
}

// getters
impl RgPassRecorder<'_> {
    #[inline]
    pub fn pass_name(&self) -> &str {
        self.pass_name
    }

    /// color/depth 输出的尺寸，没有 attachment 时为 0
    #[inline]
    pub fn render_extent(&self) -> vk::Extent2D {
        self.render_extent
    }

    #[inline]
    pub fn image(&self, handle: RgResourceHandle) -> Option<vk::Image> {
        self.cache.image(handle)
    }

    #[inline]
    pub fn buffer(&self, handle: RgResourceHandle) -> Option<vk::Buffer> {
        self.cache.buffer(handle)
    }

    pub fn image_by_name(&self, name: &str) -> Option<vk::Image> {
        self.registry.handle(name).and_then(|handle| self.cache.image(handle))
    }

    pub fn buffer_by_name(&self, name: &str) -> Option<vk::Buffer> {
        self.registry.handle(name).and_then(|handle| self.cache.buffer(handle))
    }
}

// state
impl RgPassRecorder<'_> {
    #[inline]
    pub fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.cmd.bind_pipeline(bind_point, pipeline);
    }

    #[inline]
    pub fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        self.cmd.bind_descriptor_sets(bind_point, layout, first_set, descriptor_sets);
    }

    #[inline]
    pub fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, offset: u32, data: &[u8]) {
        self.cmd.push_constants(layout, stages, offset, data);
    }

    #[inline]
    pub fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        self.cmd.bind_vertex_buffers(first_binding, buffers, offsets);
    }

    #[inline]
    pub fn bind_index_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        self.cmd.bind_index_buffer(buffer, offset, index_type);
    }

    #[inline]
    pub fn set_viewport(&mut self, viewport: vk::Viewport) {
        self.cmd.set_viewport(viewport);
    }

    #[inline]
    pub fn set_scissor(&mut self, scissor: vk::Rect2D) {
        self.cmd.set_scissor(scissor);
    }

    /// viewport 和 scissor 都覆盖整个 render extent
    pub fn set_full_viewport(&mut self) {
        let extent = self.render_extent;
        self.cmd.set_viewport(vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        self.cmd.set_scissor(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        });
    }
}

// action
impl RgPassRecorder<'_> {
    #[inline]
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.cmd.draw(vertex_count, instance_count, first_vertex, first_instance);
    }

    #[inline]
    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.cmd.draw_indexed(index_count, instance_count, first_index, vertex_offset, first_instance);
    }

    #[inline]
    pub fn dispatch(&mut self, group_count: [u32; 3]) {
        self.cmd.dispatch(group_count);
    }

    #[inline]
    pub fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.cmd.copy_buffer(src, dst, regions);
    }
}
