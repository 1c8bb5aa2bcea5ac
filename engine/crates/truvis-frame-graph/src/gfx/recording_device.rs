//! 只在 CPU 上运行的 Gfx 后端
//!
//! 不访问任何 GPU，所有调用都被记录到事件日志中，供测试和 demo 检查。
//! 同时会校验 semaphore 的等待是否有对应的 signal，并统计资源的创建与销毁次数。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::vk;
use ash::vk::Handle;
use itertools::Itertools;

use crate::gfx::barrier::{GfxBufferBarrier, GfxImageBarrier};
use crate::gfx::command::{GfxCommandEncoder, GfxCommandPool, GfxRenderingInfo};
use crate::gfx::device::{GfxBufferCreateInfo, GfxDevice, GfxImageCreateInfo, GfxSemaphoreType, QueueType};
use crate::gfx::error::{GfxError, GfxResult};
use crate::gfx::queue::{GfxQueue, GfxSemaphoreInfo, GfxSubmitInfo};
use crate::gfx::swapchain::GfxSwapchain;

/// 被录制到 command buffer 中的一条命令
#[derive(Clone, Debug)]
pub enum GfxCommand {
    Begin,
    End,
    BeginLabel(String),
    EndLabel,
    PipelineBarrier {
        image_barriers: Vec<GfxImageBarrier>,
        buffer_barriers: Vec<GfxBufferBarrier>,
    },
    BeginRendering {
        render_area: vk::Rect2D,
        color_images: Vec<vk::Image>,
        depth_image: Option<vk::Image>,
    },
    EndRendering,
    CopyImage {
        src: vk::Image,
        dst: vk::Image,
        extent: vk::Extent3D,
    },
    BlitImage {
        src: vk::Image,
        src_extent: vk::Extent2D,
        dst: vk::Image,
        dst_extent: vk::Extent2D,
        filter: vk::Filter,
    },
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        region_count: usize,
    },
    BindPipeline {
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    },
    BindDescriptorSets {
        bind_point: vk::PipelineBindPoint,
        first_set: u32,
        set_count: usize,
    },
    PushConstants {
        stages: vk::ShaderStageFlags,
        offset: u32,
        size: usize,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<vk::Buffer>,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    },
    SetViewport,
    SetScissor(vk::Rect2D),
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    Dispatch([u32; 3]),
}

#[derive(Clone, Debug)]
pub struct RecordedCommandBuffer {
    pub handle: vk::CommandBuffer,
    pub name: String,
    pub queue_type: QueueType,
    pub commands: Vec<GfxCommand>,
}

impl RecordedCommandBuffer {
    pub fn image_barriers(&self) -> Vec<GfxImageBarrier> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                GfxCommand::PipelineBarrier { image_barriers, .. } => Some(image_barriers.clone()),
                _ => None,
            })
            .flatten()
            .collect_vec()
    }

    pub fn buffer_barriers(&self) -> Vec<GfxBufferBarrier> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                GfxCommand::PipelineBarrier { buffer_barriers, .. } => Some(buffer_barriers.clone()),
                _ => None,
            })
            .flatten()
            .collect_vec()
    }
}

/// 设备上发生的一次调用
#[derive(Clone, Debug)]
pub enum GfxEvent {
    CreateImage {
        image: vk::Image,
        name: String,
        usage: vk::ImageUsageFlags,
        extent: vk::Extent3D,
        format: vk::Format,
    },
    DestroyImage(vk::Image),
    CreateBuffer {
        buffer: vk::Buffer,
        name: String,
        usage: vk::BufferUsageFlags,
        size: vk::DeviceSize,
    },
    DestroyBuffer(vk::Buffer),
    AcquireCommandPool {
        pool: vk::CommandPool,
        queue_type: QueueType,
    },
    ResetCommandPool(vk::CommandPool),
    ReleaseCommandPool(vk::CommandPool),
    AcquireFence(vk::Fence),
    ResetFence(vk::Fence),
    WaitFence(vk::Fence),
    ReleaseFence(vk::Fence),
    AcquireSemaphore {
        semaphore: vk::Semaphore,
        semaphore_type: GfxSemaphoreType,
    },
    ReleaseSemaphore(vk::Semaphore),
    AcquireNextImage {
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        signal: vk::Semaphore,
    },
    Submit {
        queue_type: QueueType,
        batches: Vec<GfxSubmitInfo>,
        fence: Option<vk::Fence>,
    },
    Present {
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphores: Vec<vk::Semaphore>,
    },
    SingleCommands {
        queue_type: QueueType,
        command_buffer: vk::CommandBuffer,
        wait_infos: Vec<GfxSemaphoreInfo>,
        signal_infos: Vec<GfxSemaphoreInfo>,
    },
    WaitIdle,
}

/// 资源与池化对象的计数
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GfxCounters {
    pub images_created: usize,
    pub images_destroyed: usize,
    pub buffers_created: usize,
    pub buffers_destroyed: usize,
    /// 销毁了不存在（或已经销毁）的对象
    pub invalid_destroys: usize,
    pub live_command_pools: usize,
    pub live_fences: usize,
    pub live_semaphores: usize,
}

impl GfxCounters {
    #[inline]
    pub fn live_images(&self) -> usize {
        self.images_created - self.images_destroyed
    }

    #[inline]
    pub fn live_buffers(&self) -> usize {
        self.buffers_created - self.buffers_destroyed
    }
}

#[derive(Default)]
struct RecordingState {
    next_handle: u64,
    events: Vec<GfxEvent>,
    command_buffers: Vec<RecordedCommandBuffer>,
    counters: GfxCounters,

    live_images: HashSet<vk::Image>,
    live_buffers: HashSet<vk::Buffer>,
    free_command_pools: Vec<(QueueType, vk::CommandPool)>,
    /// fence -> signaled
    fences: HashMap<vk::Fence, bool>,
    semaphores: HashMap<vk::Semaphore, GfxSemaphoreType>,

    /// 已经 signal、还没有被等待的 binary semaphore
    pending_binary: HashSet<vk::Semaphore>,
    timeline_values: HashMap<vk::Semaphore, u64>,
    sync_violations: Vec<String>,

    // failure injection
    allocation_countdown: Option<usize>,
    fail_next_command_pool: bool,
    device_lost: bool,
}

impl RecordingState {
    fn alloc_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn check_allocation(&mut self, name: &str) -> GfxResult<()> {
        match self.allocation_countdown {
            Some(0) => {
                self.allocation_countdown = None;
                log::warn!("injected allocation failure: {}", name);
                Err(GfxError::OutOfDeviceMemory)
            }
            Some(n) => {
                self.allocation_countdown = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn wait_semaphore(&mut self, semaphore: vk::Semaphore, value: Option<u64>, context: &str) {
        match value {
            Some(value) => {
                let signaled = self.timeline_values.get(&semaphore).copied().unwrap_or_default();
                if signaled < value {
                    self.sync_violations.push(format!(
                        "{}: wait timeline {:?} for {} but only {} was signaled",
                        context, semaphore, value, signaled
                    ));
                }
            }
            None => {
                if !self.pending_binary.remove(&semaphore) {
                    self.sync_violations
                        .push(format!("{}: wait binary {:?} that has no pending signal", context, semaphore));
                }
            }
        }
    }

    fn signal_semaphore(&mut self, semaphore: vk::Semaphore, value: Option<u64>, context: &str) {
        match value {
            Some(value) => {
                let current = self.timeline_values.entry(semaphore).or_default();
                if value <= *current {
                    let current = *current;
                    self.sync_violations.push(format!(
                        "{}: timeline {:?} signaled {} after {}",
                        context, semaphore, value, current
                    ));
                } else {
                    *current = value;
                }
            }
            None => {
                if !self.pending_binary.insert(semaphore) {
                    self.sync_violations
                        .push(format!("{}: binary {:?} signaled twice without wait", context, semaphore));
                }
            }
        }
    }

    fn process_batch(&mut self, waits: &[GfxSemaphoreInfo], signals: &[GfxSemaphoreInfo], context: &str) {
        for info in waits {
            self.wait_semaphore(info.semaphore, info.value, context);
        }
        for info in signals {
            self.signal_semaphore(info.semaphore, info.value, context);
        }
    }
}

fn lock(state: &Mutex<RecordingState>) -> MutexGuard<'_, RecordingState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// CPU-only 的 GfxDevice 实现
pub struct RecordingDevice {
    state: Arc<Mutex<RecordingState>>,
    graphics_queue: RecordingQueue,
    compute_queue: RecordingQueue,
    transfer_queue: RecordingQueue,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl RecordingDevice {
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(RecordingState::default()));
        let queue = |queue_type| RecordingQueue {
            queue_type,
            state: state.clone(),
        };
        Self {
            graphics_queue: queue(QueueType::Graphics),
            compute_queue: queue(QueueType::Compute),
            transfer_queue: queue(QueueType::Transfer),
            state,
        }
    }

    /// 创建一个和当前设备共享事件日志的 swapchain
    pub fn create_swapchain(&self, extent: vk::Extent2D, format: vk::Format, image_count: u32) -> RecordingSwapchain {
        let mut state = lock(&self.state);
        let handle = vk::SwapchainKHR::from_raw(state.alloc_handle());
        let images = (0..image_count).map(|_| vk::Image::from_raw(state.alloc_handle())).collect_vec();

        RecordingSwapchain {
            handle,
            images,
            current_index: 0,
            extent,
            format,
            out_of_date: false,
            state: self.state.clone(),
        }
    }
}

// failure injection
impl RecordingDevice {
    /// 再成功 `count` 次资源创建之后，下一次创建失败（仅一次）
    pub fn fail_allocation_after(&self, count: usize) {
        lock(&self.state).allocation_countdown = Some(count);
    }

    /// 下一次 `acquire_command_pool` 返回 `OutOfDeviceMemory`（仅一次）
    pub fn fail_next_command_pool(&self) {
        lock(&self.state).fail_next_command_pool = true;
    }

    /// 之后所有 submit 都返回 `DeviceLost`
    pub fn set_device_lost(&self, lost: bool) {
        lock(&self.state).device_lost = lost;
    }
}

// getters
impl RecordingDevice {
    pub fn events(&self) -> Vec<GfxEvent> {
        lock(&self.state).events.clone()
    }

    pub fn clear_events(&self) {
        let mut state = lock(&self.state);
        state.events.clear();
        state.command_buffers.clear();
    }

    pub fn counters(&self) -> GfxCounters {
        lock(&self.state).counters
    }

    pub fn sync_violations(&self) -> Vec<String> {
        lock(&self.state).sync_violations.clone()
    }

    pub fn command_buffer(&self, handle: vk::CommandBuffer) -> Option<RecordedCommandBuffer> {
        lock(&self.state).command_buffers.iter().find(|cmd| cmd.handle == handle).cloned()
    }

    /// 最近一次以 `name` 命名并录制完成的 command buffer
    pub fn command_buffer_named(&self, name: &str) -> Option<RecordedCommandBuffer> {
        lock(&self.state).command_buffers.iter().rev().find(|cmd| cmd.name == name).cloned()
    }

    pub fn submits(&self) -> Vec<Vec<GfxSubmitInfo>> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|event| match event {
                GfxEvent::Submit { batches, .. } => Some(batches.clone()),
                _ => None,
            })
            .collect_vec()
    }

    pub fn present_count(&self) -> usize {
        lock(&self.state).events.iter().filter(|event| matches!(event, GfxEvent::Present { .. })).count()
    }

    pub fn single_commands(&self) -> Vec<RecordedCommandBuffer> {
        let state = lock(&self.state);
        state
            .events
            .iter()
            .filter_map(|event| match event {
                GfxEvent::SingleCommands { command_buffer, .. } => {
                    state.command_buffers.iter().find(|cmd| cmd.handle == *command_buffer).cloned()
                }
                _ => None,
            })
            .collect_vec()
    }
}

impl GfxDevice for RecordingDevice {
    fn create_image(&self, info: &GfxImageCreateInfo) -> GfxResult<vk::Image> {
        let mut state = lock(&self.state);
        state.check_allocation(&info.name)?;

        let image = vk::Image::from_raw(state.alloc_handle());
        state.live_images.insert(image);
        state.counters.images_created += 1;
        state.events.push(GfxEvent::CreateImage {
            image,
            name: info.name.clone(),
            usage: info.usage,
            extent: info.extent,
            format: info.format,
        });
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        let mut state = lock(&self.state);
        if state.live_images.remove(&image) {
            state.counters.images_destroyed += 1;
        } else {
            log::error!("destroy unknown image: {:?}", image);
            state.counters.invalid_destroys += 1;
        }
        state.events.push(GfxEvent::DestroyImage(image));
    }

    fn create_buffer(&self, info: &GfxBufferCreateInfo) -> GfxResult<vk::Buffer> {
        let mut state = lock(&self.state);
        state.check_allocation(&info.name)?;

        let buffer = vk::Buffer::from_raw(state.alloc_handle());
        state.live_buffers.insert(buffer);
        state.counters.buffers_created += 1;
        state.events.push(GfxEvent::CreateBuffer {
            buffer,
            name: info.name.clone(),
            usage: info.usage,
            size: info.size,
        });
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = lock(&self.state);
        if state.live_buffers.remove(&buffer) {
            state.counters.buffers_destroyed += 1;
        } else {
            log::error!("destroy unknown buffer: {:?}", buffer);
            state.counters.invalid_destroys += 1;
        }
        state.events.push(GfxEvent::DestroyBuffer(buffer));
    }

    fn acquire_command_pool(&self, queue_type: QueueType) -> GfxResult<Box<dyn GfxCommandPool>> {
        let mut state = lock(&self.state);
        if std::mem::take(&mut state.fail_next_command_pool) {
            log::warn!("injected command pool failure: {:?} queue", queue_type);
            return Err(GfxError::OutOfDeviceMemory);
        }
        let recycled = state.free_command_pools.iter().position(|(ty, _)| *ty == queue_type);
        let pool = match recycled {
            Some(idx) => state.free_command_pools.swap_remove(idx).1,
            None => vk::CommandPool::from_raw(state.alloc_handle()),
        };
        state.counters.live_command_pools += 1;
        state.events.push(GfxEvent::AcquireCommandPool { pool, queue_type });

        Ok(Box::new(RecordingCommandPool {
            handle: pool,
            queue_type,
            state: self.state.clone(),
        }))
    }

    fn release_command_pool(&self, pool: Box<dyn GfxCommandPool>) {
        let mut state = lock(&self.state);
        state.counters.live_command_pools -= 1;
        state.free_command_pools.push((pool.queue_type(), pool.vk_handle()));
        state.events.push(GfxEvent::ReleaseCommandPool(pool.vk_handle()));
    }

    fn acquire_fence(&self, signaled: bool) -> GfxResult<vk::Fence> {
        let mut state = lock(&self.state);
        let fence = vk::Fence::from_raw(state.alloc_handle());
        state.fences.insert(fence, signaled);
        state.counters.live_fences += 1;
        state.events.push(GfxEvent::AcquireFence(fence));
        Ok(fence)
    }

    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()> {
        let mut state = lock(&self.state);
        let signaled = state
            .fences
            .get_mut(&fence)
            .ok_or_else(|| GfxError::Internal(format!("reset unknown fence {:?}", fence)))?;
        *signaled = false;
        state.events.push(GfxEvent::ResetFence(fence));
        Ok(())
    }

    fn wait_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> GfxResult<()> {
        let mut state = lock(&self.state);
        state.events.push(GfxEvent::WaitFence(fence));
        match state.fences.get(&fence) {
            Some(true) => Ok(()),
            // 没有任何 submit 会 signal 这个 fence，真实设备上会一直等到超时
            Some(false) => Err(GfxError::Vk(vk::Result::TIMEOUT)),
            None => Err(GfxError::Internal(format!("wait unknown fence {:?}", fence))),
        }
    }

    fn release_fence(&self, fence: vk::Fence) {
        let mut state = lock(&self.state);
        if state.fences.remove(&fence).is_some() {
            state.counters.live_fences -= 1;
        } else {
            state.counters.invalid_destroys += 1;
        }
        state.events.push(GfxEvent::ReleaseFence(fence));
    }

    fn acquire_semaphore(&self, semaphore_type: GfxSemaphoreType) -> GfxResult<vk::Semaphore> {
        let mut state = lock(&self.state);
        let semaphore = vk::Semaphore::from_raw(state.alloc_handle());
        state.semaphores.insert(semaphore, semaphore_type);
        state.counters.live_semaphores += 1;
        state.events.push(GfxEvent::AcquireSemaphore {
            semaphore,
            semaphore_type,
        });
        Ok(semaphore)
    }

    fn release_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = lock(&self.state);
        if state.semaphores.remove(&semaphore).is_some() {
            state.counters.live_semaphores -= 1;
        } else {
            state.counters.invalid_destroys += 1;
        }
        state.pending_binary.remove(&semaphore);
        state.timeline_values.remove(&semaphore);
        state.events.push(GfxEvent::ReleaseSemaphore(semaphore));
    }

    fn queue(&self, queue_type: QueueType) -> &dyn GfxQueue {
        match queue_type {
            QueueType::Graphics => &self.graphics_queue,
            QueueType::Compute => &self.compute_queue,
            QueueType::Transfer => &self.transfer_queue,
        }
    }

    fn execute_single_commands(
        &self,
        queue_type: QueueType,
        wait_infos: &[GfxSemaphoreInfo],
        signal_infos: &[GfxSemaphoreInfo],
        record: &mut dyn FnMut(&mut dyn GfxCommandEncoder),
    ) -> GfxResult<()> {
        let handle = {
            let mut state = lock(&self.state);
            if state.device_lost {
                return Err(GfxError::DeviceLost);
            }
            vk::CommandBuffer::from_raw(state.alloc_handle())
        };

        let mut encoder = RecordingCommandEncoder::new(handle, queue_type, self.state.clone());
        encoder.set_debug_name("single-commands");
        encoder.begin()?;
        record(&mut encoder);
        encoder.end()?;

        let mut state = lock(&self.state);
        state.process_batch(wait_infos, signal_infos, "single-commands");
        state.events.push(GfxEvent::SingleCommands {
            queue_type,
            command_buffer: handle,
            wait_infos: wait_infos.to_vec(),
            signal_infos: signal_infos.to_vec(),
        });
        Ok(())
    }

    fn wait_idle(&self) -> GfxResult<()> {
        let mut state = lock(&self.state);
        state.events.push(GfxEvent::WaitIdle);
        if state.device_lost { Err(GfxError::DeviceLost) } else { Ok(()) }
    }
}

pub struct RecordingQueue {
    queue_type: QueueType,
    state: Arc<Mutex<RecordingState>>,
}

impl GfxQueue for RecordingQueue {
    fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    fn submit(&self, batches: &[GfxSubmitInfo], fence: Option<vk::Fence>) -> GfxResult<()> {
        let mut state = lock(&self.state);
        if state.device_lost {
            return Err(GfxError::DeviceLost);
        }

        for (idx, batch) in batches.iter().enumerate() {
            let context = format!("submit batch {}", idx);
            for cmd in &batch.command_buffers {
                if !state.command_buffers.iter().any(|recorded| recorded.handle == *cmd) {
                    state.sync_violations.push(format!("{}: command buffer {:?} was never ended", context, cmd));
                }
            }
            state.process_batch(&batch.wait_infos, &batch.signal_infos, &context);
        }

        if let Some(fence) = fence {
            match state.fences.get_mut(&fence) {
                Some(signaled) if *signaled => {
                    return Err(GfxError::Internal(format!("submit with signaled fence {:?}", fence)));
                }
                Some(signaled) => *signaled = true,
                None => return Err(GfxError::Internal(format!("submit with unknown fence {:?}", fence))),
            }
        }

        state.events.push(GfxEvent::Submit {
            queue_type: self.queue_type,
            batches: batches.to_vec(),
            fence,
        });
        Ok(())
    }

    fn present(&self, swapchain: &dyn GfxSwapchain, wait_semaphores: &[vk::Semaphore]) -> GfxResult<()> {
        let mut state = lock(&self.state);
        if state.device_lost {
            return Err(GfxError::DeviceLost);
        }
        for semaphore in wait_semaphores {
            state.wait_semaphore(*semaphore, None, "present");
        }
        state.events.push(GfxEvent::Present {
            swapchain: swapchain.handle(),
            image_index: swapchain.current_image_index(),
            wait_semaphores: wait_semaphores.to_vec(),
        });
        Ok(())
    }

    fn wait_idle(&self) -> GfxResult<()> {
        let mut state = lock(&self.state);
        state.events.push(GfxEvent::WaitIdle);
        if state.device_lost { Err(GfxError::DeviceLost) } else { Ok(()) }
    }
}

pub struct RecordingCommandPool {
    handle: vk::CommandPool,
    queue_type: QueueType,
    state: Arc<Mutex<RecordingState>>,
}

impl GfxCommandPool for RecordingCommandPool {
    fn vk_handle(&self) -> vk::CommandPool {
        self.handle
    }

    fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    fn reset(&mut self) -> GfxResult<()> {
        lock(&self.state).events.push(GfxEvent::ResetCommandPool(self.handle));
        Ok(())
    }

    fn allocate(&mut self, name: &str) -> GfxResult<Box<dyn GfxCommandEncoder>> {
        let handle = vk::CommandBuffer::from_raw(lock(&self.state).alloc_handle());
        let mut encoder = RecordingCommandEncoder::new(handle, self.queue_type, self.state.clone());
        encoder.name = name.to_string();
        Ok(Box::new(encoder))
    }
}

/// 命令先记录在本地，`end()` 时写入设备的日志
pub struct RecordingCommandEncoder {
    handle: vk::CommandBuffer,
    name: String,
    queue_type: QueueType,
    commands: Vec<GfxCommand>,
    recording: bool,
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingCommandEncoder {
    fn new(handle: vk::CommandBuffer, queue_type: QueueType, state: Arc<Mutex<RecordingState>>) -> Self {
        Self {
            handle,
            name: String::new(),
            queue_type,
            commands: Vec::new(),
            recording: false,
            state,
        }
    }
}

impl GfxCommandEncoder for RecordingCommandEncoder {
    fn vk_handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    fn begin(&mut self) -> GfxResult<()> {
        if self.recording {
            return Err(GfxError::Internal(format!("command buffer {} is already recording", self.name)));
        }
        self.recording = true;
        self.commands.push(GfxCommand::Begin);
        Ok(())
    }

    fn end(&mut self) -> GfxResult<()> {
        if !self.recording {
            return Err(GfxError::Internal(format!("command buffer {} is not recording", self.name)));
        }
        self.recording = false;
        self.commands.push(GfxCommand::End);

        lock(&self.state).command_buffers.push(RecordedCommandBuffer {
            handle: self.handle,
            name: self.name.clone(),
            queue_type: self.queue_type,
            commands: std::mem::take(&mut self.commands),
        });
        Ok(())
    }

    fn set_debug_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn begin_label(&mut self, label: &str, _color: [f32; 4]) {
        self.commands.push(GfxCommand::BeginLabel(label.to_string()));
    }

    fn end_label(&mut self) {
        self.commands.push(GfxCommand::EndLabel);
    }

    fn pipeline_barrier(&mut self, image_barriers: &[GfxImageBarrier], buffer_barriers: &[GfxBufferBarrier]) {
        self.commands.push(GfxCommand::PipelineBarrier {
            image_barriers: image_barriers.to_vec(),
            buffer_barriers: buffer_barriers.to_vec(),
        });
    }

    fn begin_rendering(&mut self, info: &GfxRenderingInfo) {
        self.commands.push(GfxCommand::BeginRendering {
            render_area: info.render_area,
            color_images: info.color_attachments.iter().map(|a| a.image).collect_vec(),
            depth_image: info.depth_attachment.map(|a| a.image),
        });
    }

    fn end_rendering(&mut self) {
        self.commands.push(GfxCommand::EndRendering);
    }

    fn copy_image(&mut self, src: vk::Image, dst: vk::Image, extent: vk::Extent3D) {
        self.commands.push(GfxCommand::CopyImage { src, dst, extent });
    }

    fn blit_image(
        &mut self,
        src: vk::Image,
        src_extent: vk::Extent2D,
        dst: vk::Image,
        dst_extent: vk::Extent2D,
        filter: vk::Filter,
    ) {
        self.commands.push(GfxCommand::BlitImage {
            src,
            src_extent,
            dst,
            dst_extent,
            filter,
        });
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.commands.push(GfxCommand::CopyBuffer {
            src,
            dst,
            region_count: regions.len(),
        });
    }

    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.commands.push(GfxCommand::BindPipeline { bind_point, pipeline });
    }

    fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        _layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        self.commands.push(GfxCommand::BindDescriptorSets {
            bind_point,
            first_set,
            set_count: descriptor_sets.len(),
        });
    }

    fn push_constants(&mut self, _layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, offset: u32, data: &[u8]) {
        self.commands.push(GfxCommand::PushConstants {
            stages,
            offset,
            size: data.len(),
        });
    }

    fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[vk::Buffer], _offsets: &[vk::DeviceSize]) {
        self.commands.push(GfxCommand::BindVertexBuffers {
            first_binding,
            buffers: buffers.to_vec(),
        });
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer, _offset: vk::DeviceSize, index_type: vk::IndexType) {
        self.commands.push(GfxCommand::BindIndexBuffer { buffer, index_type });
    }

    fn set_viewport(&mut self, _viewport: vk::Viewport) {
        self.commands.push(GfxCommand::SetViewport);
    }

    fn set_scissor(&mut self, scissor: vk::Rect2D) {
        self.commands.push(GfxCommand::SetScissor(scissor));
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, _first_vertex: u32, _first_instance: u32) {
        self.commands.push(GfxCommand::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.commands.push(GfxCommand::DrawIndexed {
            index_count,
            instance_count,
        });
    }

    fn dispatch(&mut self, group_count: [u32; 3]) {
        self.commands.push(GfxCommand::Dispatch(group_count));
    }
}

/// 配合 RecordingDevice 使用的 swapchain
pub struct RecordingSwapchain {
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    current_index: u32,
    extent: vk::Extent2D,
    format: vk::Format,
    out_of_date: bool,
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingSwapchain {
    /// 模拟窗口大小变化，之后的 acquire 会返回 `SwapchainOutOfDate`
    pub fn set_out_of_date(&mut self, out_of_date: bool) {
        self.out_of_date = out_of_date;
    }

    /// 重建 swapchain：新的 extent、新的 image
    pub fn recreate(&mut self, extent: vk::Extent2D) {
        let mut state = lock(&self.state);
        self.images = self.images.iter().map(|_| vk::Image::from_raw(state.alloc_handle())).collect_vec();
        self.current_index = 0;
        self.extent = extent;
        self.out_of_date = false;
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }
}

impl GfxSwapchain for RecordingSwapchain {
    fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    fn acquire_next_image(&mut self, signal_semaphore: vk::Semaphore) -> GfxResult<u32> {
        if self.out_of_date {
            return Err(GfxError::SwapchainOutOfDate);
        }
        if self.images.is_empty() {
            return Err(GfxError::Internal("swapchain has no image".to_string()));
        }

        self.current_index = (self.current_index + 1) % self.images.len() as u32;

        let mut state = lock(&self.state);
        state.signal_semaphore(signal_semaphore, None, "acquire-next-image");
        state.events.push(GfxEvent::AcquireNextImage {
            swapchain: self.handle,
            image_index: self.current_index,
            signal: signal_semaphore,
        });
        Ok(self.current_index)
    }

    fn current_image_index(&self) -> u32 {
        self.current_index
    }

    fn current_image(&self) -> vk::Image {
        self.images.get(self.current_index as usize).copied().unwrap_or_default()
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn format(&self) -> vk::Format {
        self.format
    }
}
