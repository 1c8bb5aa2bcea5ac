use ash::vk;
use itertools::Itertools;

use crate::gfx::device::QueueType;
use crate::gfx::error::GfxResult;
use crate::gfx::swapchain::GfxSwapchain;

/// 提交时需要等待或者发出的 semaphore
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxSemaphoreInfo {
    /// Vulkan semaphore 原始句柄
    pub semaphore: vk::Semaphore,
    /// 等待/发出信号的 pipeline stage
    pub stage: vk::PipelineStageFlags2,
    /// Timeline semaphore 的值（binary semaphore 为 None）
    pub value: Option<u64>,
}

impl GfxSemaphoreInfo {
    #[inline]
    pub fn binary(semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        Self {
            semaphore,
            stage,
            value: None,
        }
    }

    #[inline]
    pub fn timeline(semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2, value: u64) -> Self {
        Self {
            semaphore,
            stage,
            value: Some(value),
        }
    }

    #[inline]
    pub fn is_timeline(&self) -> bool {
        self.value.is_some()
    }

    pub fn vk_info(&self) -> vk::SemaphoreSubmitInfo<'static> {
        vk::SemaphoreSubmitInfo::default()
            .semaphore(self.semaphore)
            .stage_mask(self.stage)
            .value(self.value.unwrap_or_default())
    }
}

/// 一次 queue submit 中的一个 batch
///
/// 只保存句柄，在真正提交时才转换为 `vk::SubmitInfo2`，因此可以跨线程传递。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GfxSubmitInfo {
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub wait_infos: Vec<GfxSemaphoreInfo>,
    pub signal_infos: Vec<GfxSemaphoreInfo>,
}

impl GfxSubmitInfo {
    pub fn new(command_buffers: &[vk::CommandBuffer]) -> Self {
        Self {
            command_buffers: command_buffers.to_vec(),
            wait_infos: vec![],
            signal_infos: vec![],
        }
    }

    #[inline]
    pub fn wait(mut self, info: GfxSemaphoreInfo) -> Self {
        self.wait_infos.push(info);
        self
    }

    #[inline]
    pub fn signal(mut self, info: GfxSemaphoreInfo) -> Self {
        self.signal_infos.push(info);
        self
    }

    /// 将另一个 batch 合并进来，保持 command buffer 的相对顺序
    pub fn merge(&mut self, other: GfxSubmitInfo) {
        self.command_buffers.extend(other.command_buffers);
        self.wait_infos.extend(other.wait_infos);
        self.signal_infos.extend(other.signal_infos);
    }

    pub fn waits_on(&self, semaphore: vk::Semaphore) -> bool {
        self.wait_infos.iter().any(|info| info.semaphore == semaphore)
    }

    pub fn signals(&self, semaphore: vk::Semaphore) -> bool {
        self.signal_infos.iter().any(|info| info.semaphore == semaphore)
    }

    // vk 转换
    pub fn vk_command_buffer_infos(&self) -> Vec<vk::CommandBufferSubmitInfo<'static>> {
        self.command_buffers
            .iter()
            .map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(*cmd))
            .collect_vec()
    }

    pub fn vk_wait_infos(&self) -> Vec<vk::SemaphoreSubmitInfo<'static>> {
        self.wait_infos.iter().map(GfxSemaphoreInfo::vk_info).collect_vec()
    }

    pub fn vk_signal_infos(&self) -> Vec<vk::SemaphoreSubmitInfo<'static>> {
        self.signal_infos.iter().map(GfxSemaphoreInfo::vk_info).collect_vec()
    }
}

/// GPU 队列
pub trait GfxQueue: Send + Sync {
    fn queue_type(&self) -> QueueType;

    /// 按顺序提交所有 batch，`fence` 在全部 batch 执行完毕后被 signal
    fn submit(&self, batches: &[GfxSubmitInfo], fence: Option<vk::Fence>) -> GfxResult<()>;

    /// 呈现 swapchain 当前的 image
    fn present(&self, swapchain: &dyn GfxSwapchain, wait_semaphores: &[vk::Semaphore]) -> GfxResult<()>;

    fn wait_idle(&self) -> GfxResult<()>;
}
