//! Barrier 自动计算
//!
//! 按 pass 的声明顺序模拟执行，比较资源的当前状态与 pass 要求的状态，
//! 状态不同时生成一个 barrier 并更新资源的当前状态。

use ash::vk;

use crate::gfx::{GfxBufferBarrier, GfxImageBarrier, ResourceState};
use crate::render_graph::handle::RgResourceHandle;
use crate::render_graph::pass::RgRenderPass;
use crate::render_graph::resource::RgResourceKind;
use crate::render_graph::resource_registry::RgResourceRegistry;

/// 图像 Barrier 描述
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgImageBarrierDesc {
    pub handle: RgResourceHandle,
    pub src_state: ResourceState,
    pub dst_state: ResourceState,
    /// 图像 aspect（COLOR / DEPTH / STENCIL）
    pub aspect: vk::ImageAspectFlags,
}

impl RgImageBarrierDesc {
    pub fn new(handle: RgResourceHandle, src_state: ResourceState, dst_state: ResourceState) -> Self {
        Self {
            handle,
            src_state,
            dst_state,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    pub fn with_aspect(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.aspect = aspect;
        self
    }

    /// 需要提供实际的 vk::Image handle
    pub fn to_gfx_barrier(&self, image: vk::Image) -> GfxImageBarrier {
        GfxImageBarrier::new(image, self.src_state, self.dst_state).with_aspect(self.aspect)
    }
}

/// 缓冲区 Barrier 描述
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgBufferBarrierDesc {
    pub handle: RgResourceHandle,
    pub src_state: ResourceState,
    pub dst_state: ResourceState,
}

impl RgBufferBarrierDesc {
    pub fn new(handle: RgResourceHandle, src_state: ResourceState, dst_state: ResourceState) -> Self {
        Self {
            handle,
            src_state,
            dst_state,
        }
    }

    pub fn to_gfx_barrier(&self, buffer: vk::Buffer) -> GfxBufferBarrier {
        GfxBufferBarrier::new(buffer, self.src_state, self.dst_state)
    }
}

/// Pass 执行前需要的 Barrier 集合
#[derive(Clone, Debug, Default)]
pub struct PassBarriers {
    pub image_barriers: Vec<RgImageBarrierDesc>,
    pub buffer_barriers: Vec<RgBufferBarrierDesc>,
}

impl PassBarriers {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add_image_barrier(&mut self, desc: RgImageBarrierDesc) {
        self.image_barriers.push(desc);
    }

    #[inline]
    pub fn add_buffer_barrier(&mut self, desc: RgBufferBarrierDesc) {
        self.buffer_barriers.push(desc);
    }

    #[inline]
    pub fn has_barriers(&self) -> bool {
        !self.image_barriers.is_empty() || !self.buffer_barriers.is_empty()
    }

    #[inline]
    pub fn image_barrier_count(&self) -> usize {
        self.image_barriers.len()
    }

    #[inline]
    pub fn buffer_barrier_count(&self) -> usize {
        self.buffer_barriers.len()
    }

    pub fn image_barrier_for(&self, handle: RgResourceHandle) -> Option<&RgImageBarrierDesc> {
        self.image_barriers.iter().find(|desc| desc.handle == handle)
    }

    pub fn buffer_barrier_for(&self, handle: RgResourceHandle) -> Option<&RgBufferBarrierDesc> {
        self.buffer_barriers.iter().find(|desc| desc.handle == handle)
    }
}

pub struct BarrierSynthesizer;

impl BarrierSynthesizer {
    /// 为每个 pass 计算 barrier，返回值与 `passes` 一一对应
    ///
    /// 会更新 registry 中每个资源的 `current_state`。
    pub fn synthesize(passes: &[RgRenderPass], registry: &mut RgResourceRegistry) -> Vec<PassBarriers> {
        passes.iter().map(|pass| Self::synthesize_pass(pass, registry)).collect()
    }

    fn synthesize_pass(pass: &RgRenderPass, registry: &mut RgResourceRegistry) -> PassBarriers {
        let mut barriers = PassBarriers::new();

        for (handle, required_state) in pass.resource_states() {
            let Some(resource) = registry.get_mut(handle) else {
                continue;
            };

            let current_state = resource.current_state;
            if current_state == required_state {
                continue;
            }

            match resource.kind {
                RgResourceKind::Image => barriers.add_image_barrier(
                    RgImageBarrierDesc::new(handle, current_state, required_state).with_aspect(resource.aspect()),
                ),
                RgResourceKind::Buffer => {
                    barriers.add_buffer_barrier(RgBufferBarrierDesc::new(handle, current_state, required_state))
                }
            }
            resource.current_state = required_state;
        }

        barriers
    }
}
