//! RenderGraph 入口
//!
//! 持有资源注册表、pass 列表和物理资源缓存，负责 build 和 execute。
//!
//! 一帧的执行顺序：
//! 1. build：为所有被写入的非 external 资源创建物理资源
//! 2. 获取 swapchain image（如果绑定了 swapchain）
//! 3. 按声明顺序计算 barrier
//! 4. 并行录制所有 pass，等待全部完成
//! 5. 按 submission level 分组，沿依赖边串联每个 queue 的 timeline 并提交
//! 6. 拷贝到 swapchain 并 present

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use ash::vk;
use indexmap::IndexMap;
use itertools::Itertools;

use crate::gfx::{
    GfxBufferCreateInfo, GfxCommandPool, GfxDevice, GfxImageCreateInfo, GfxSemaphoreInfo, GfxSemaphoreType,
    GfxSwapchain, QueueType, ResourceState,
};
use crate::render_graph::barrier::{BarrierSynthesizer, PassBarriers};
use crate::render_graph::dependency::RgDependencyGraph;
use crate::render_graph::error::{RgError, RgResult};
use crate::render_graph::executor::{RgPassSubmission, RgRecordContext, RgTask, RgTaskExecutor, record_pass};
use crate::render_graph::frame_stats::RgFrameStats;
use crate::render_graph::handle::{RgPassHandle, RgResourceHandle};
use crate::render_graph::pass::{RgPassBuilder, RgRenderPass, bind_external};
use crate::render_graph::physical_cache::{RgPhysicalCache, RgPhysicalResource};
use crate::render_graph::resource::{RgExternalResource, RgResource, RgResourceKind};
use crate::render_graph::resource_registry::RgResourceRegistry;
use crate::render_graph::scheduler::{RgPresentSource, RgQueueTimeline, RgSubmissionScheduler};
use crate::render_graph::settings::RgSettings;

/// 一帧中借出的同步对象，帧结束或者失败时归还
#[derive(Default)]
struct RgFrameSync {
    semaphores: Vec<vk::Semaphore>,
    /// 从 device 借出的 fence；使用调用方 fence 时为 None
    owned_fence: Option<vk::Fence>,
    submitted: bool,
    /// barrier 计算之前的资源状态，没有提交任何东西时用于回滚
    saved_states: Vec<(RgResourceHandle, ResourceState)>,
}

/// 渲染图
pub struct RenderGraph {
    device: Arc<dyn GfxDevice>,
    executor: Box<dyn RgTaskExecutor>,
    settings: RgSettings,

    registry: RgResourceRegistry,
    passes: Vec<RgRenderPass>,
    pass_names: HashMap<String, RgPassHandle>,
    /// 与 `passes` 一一对应，pass 第一次录制时借出
    command_pools: Vec<Option<Box<dyn GfxCommandPool>>>,
    cache: RgPhysicalCache,

    /// 最近一次 execute 的结果，用于调试
    last_barriers: Vec<PassBarriers>,
    last_levels: Vec<usize>,

    /// 每个 queue 一个 timeline，值跨帧递增
    timelines: IndexMap<QueueType, RgQueueTimeline>,
    /// 使用调用方 fence 的帧，semaphore 在下一次 execute 开始时归还
    deferred_semaphores: Vec<vk::Semaphore>,

    frame_stats: RgFrameStats,
}

// new & init
impl RenderGraph {
    pub fn new(device: Arc<dyn GfxDevice>, executor: Box<dyn RgTaskExecutor>, settings: RgSettings) -> Self {
        log::info!(
            "render graph created: {} recording worker(s), blit filter {:?}",
            executor.worker_count(),
            settings.blit_filter
        );
        Self {
            device,
            executor,
            settings,
            registry: RgResourceRegistry::new(),
            passes: Vec::new(),
            pass_names: HashMap::new(),
            command_pools: Vec::new(),
            cache: RgPhysicalCache::new(),
            last_barriers: Vec::new(),
            last_levels: Vec::new(),
            timelines: IndexMap::new(),
            deferred_semaphores: Vec::new(),
            frame_stats: RgFrameStats::default(),
        }
    }
}

// declare
impl RenderGraph {
    /// 创建 pass；同名 pass 已经存在时返回已有的 pass
    pub fn create_pass(&mut self, name: &str, queue_type: QueueType) -> RgPassBuilder<'_> {
        let handle = match self.pass_names.get(name) {
            Some(&handle) => {
                let existing = self.passes[handle.index()].queue_type;
                if existing != queue_type {
                    log::warn!(
                        "pass `{}` already exists on {:?} queue, ignoring requested {:?}",
                        name,
                        existing,
                        queue_type
                    );
                }
                handle
            }
            None => {
                let handle = RgPassHandle(self.passes.len());
                self.passes.push(RgRenderPass::new(name, handle, queue_type));
                self.command_pools.push(None);
                self.pass_names.insert(name.to_string(), handle);
                handle
            }
        };

        RgPassBuilder {
            pass: &mut self.passes[handle.index()],
            registry: &mut self.registry,
            cache: &mut self.cache,
        }
    }

    /// 把调用方持有的 GPU 对象绑定到 `name`，graph 不会销毁它
    pub fn import_resource(&mut self, name: &str, external: RgExternalResource) -> RgResourceHandle {
        let handle = self.registry.resolve_or_create(name, external.kind());
        bind_external(&mut self.registry, &mut self.cache, handle, external);
        handle
    }
}

// getters
impl RenderGraph {
    #[inline]
    pub fn settings(&self) -> &RgSettings {
        &self.settings
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn GfxDevice> {
        &self.device
    }

    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn get_pass(&self, name: &str) -> Option<&RgRenderPass> {
        self.pass_names.get(name).map(|handle| &self.passes[handle.index()])
    }

    #[inline]
    pub fn resource(&self, name: &str) -> Option<&RgResource> {
        self.registry.get_by_name(name)
    }

    #[inline]
    pub fn resource_handle(&self, name: &str) -> Option<RgResourceHandle> {
        self.registry.handle(name)
    }

    pub fn physical_resource(&self, name: &str) -> Option<&RgPhysicalResource> {
        self.registry.handle(name).and_then(|handle| self.cache.get(handle))
    }

    pub fn physical_image(&self, name: &str) -> Option<vk::Image> {
        self.registry.handle(name).and_then(|handle| self.cache.image(handle))
    }

    pub fn physical_buffer(&self, name: &str) -> Option<vk::Buffer> {
        self.registry.handle(name).and_then(|handle| self.cache.buffer(handle))
    }

    /// 最近一次 execute 中 pass 的 barrier
    pub fn pass_barriers(&self, name: &str) -> Option<&PassBarriers> {
        self.pass_names.get(name).and_then(|handle| self.last_barriers.get(handle.index()))
    }

    /// 最近一次 execute 中 pass 的 submission level
    pub fn pass_level(&self, name: &str) -> Option<usize> {
        self.pass_names.get(name).and_then(|handle| self.last_levels.get(handle.index()).copied())
    }

    /// `queue_type` 的 timeline semaphore 最后一次 signal 的值，还没有用到过时为 0
    pub fn timeline_value(&self, queue_type: QueueType) -> u64 {
        self.timelines.get(&queue_type).map(|timeline| timeline.value).unwrap_or(0)
    }

    #[inline]
    pub fn frame_stats(&self) -> &RgFrameStats {
        &self.frame_stats
    }
}

// build
impl RenderGraph {
    /// 为所有被写入的、非 external 的、还没有物理资源的虚拟资源创建物理资源
    ///
    /// `output` 会额外带上 `TRANSFER_SRC`，以便拷贝到 swapchain。
    /// 创建失败时立即返回，已经创建的资源保留在缓存中，再次调用会从失败处继续。
    pub fn build(&mut self, output: &str) -> RgResult<()> {
        let output_handle = self.output_handle(output)?;

        let mut created = 0;
        for (handle, resource) in self.registry.iter() {
            if !resource.is_pass_output() || resource.is_external() {
                continue;
            }
            if let Some(physical) = self.cache.get(handle) {
                if handle == output_handle
                    && let RgPhysicalResource::Image { usage, .. } = physical
                    && !usage.contains(vk::ImageUsageFlags::TRANSFER_SRC)
                {
                    log::warn!("output `{}` was allocated without TRANSFER_SRC", resource.name());
                }
                continue;
            }

            let physical = match resource.kind() {
                RgResourceKind::Image => {
                    let info = resource.image_info().ok_or_else(|| RgError::MissingInfo(resource.name().to_string()))?;
                    let mut usage = resource.image_usage();
                    if handle == output_handle {
                        usage |= vk::ImageUsageFlags::TRANSFER_SRC;
                    }
                    let image = self.device.create_image(&GfxImageCreateInfo::new_2d(
                        resource.name(),
                        info.extent,
                        info.format,
                        usage,
                    ))?;
                    RgPhysicalResource::Image {
                        image,
                        extent: info.extent,
                        format: info.format,
                        usage,
                        external: false,
                    }
                }
                RgResourceKind::Buffer => {
                    let info =
                        resource.buffer_info().ok_or_else(|| RgError::MissingInfo(resource.name().to_string()))?;
                    let usage = resource.buffer_usage();
                    let buffer = self.device.create_buffer(&GfxBufferCreateInfo {
                        name: resource.name().to_string(),
                        size: info.size,
                        usage,
                    })?;
                    RgPhysicalResource::Buffer {
                        buffer,
                        size: info.size,
                        usage,
                        external: false,
                    }
                }
            };
            self.cache.insert(handle, physical);
            created += 1;
        }

        if created > 0 {
            log::info!(
                "render graph build: {} resource(s) allocated, {} cached, {} pass(es)",
                created,
                self.cache.len(),
                self.passes.len()
            );
        }
        Ok(())
    }

    fn output_handle(&self, output: &str) -> RgResult<RgResourceHandle> {
        self.registry
            .handle(output)
            .filter(|handle| self.registry.get(*handle).is_some_and(|resource| resource.kind() == RgResourceKind::Image))
            .ok_or_else(|| RgError::UnknownOutput(output.to_string()))
    }
}

// execute
impl RenderGraph {
    /// 执行一帧
    ///
    /// - `fence`: 调用方提供的 fence，由调用方决定何时等待；为 None 时从 device 借出一个并同步等待
    /// - `swapchain`: 绑定时把 `output` 拷贝（或 blit）到 swapchain 并 present
    ///
    /// # Panics
    /// 设备丢失时记录错误并 panic，其余错误通过返回值传递。
    pub fn execute(
        &mut self,
        output: &str,
        fence: Option<vk::Fence>,
        swapchain: Option<&mut dyn GfxSwapchain>,
    ) -> RgResult<()> {
        let frame_start = Instant::now();
        match self.execute_frame(output, fence, swapchain) {
            Ok(()) => {
                self.frame_stats.record(frame_start.elapsed());
                log::debug!(
                    "frame {}: {:.3} ms, {:.0} fps",
                    self.frame_stats.frame_count(),
                    self.frame_stats.frame_time_ms(),
                    self.frame_stats.fps()
                );
                Ok(())
            }
            Err(err) if err.is_fatal() => {
                log::error!("render graph: unrecoverable GPU error: {}", err);
                panic!("render graph: unrecoverable GPU error: {}", err);
            }
            Err(err) => {
                log::warn!("render graph: frame aborted: {}", err);
                Err(err)
            }
        }
    }

    fn execute_frame(
        &mut self,
        output: &str,
        fence: Option<vk::Fence>,
        swapchain: Option<&mut dyn GfxSwapchain>,
    ) -> RgResult<()> {
        self.build(output)?;
        let output_handle = self.output_handle(output)?;
        if !self.cache.contains(output_handle) {
            return Err(RgError::UnknownOutput(output.to_string()));
        }

        // 调用方在再次 execute 之前已经等待过上一帧的 fence
        for semaphore in std::mem::take(&mut self.deferred_semaphores) {
            self.device.release_semaphore(semaphore);
        }

        let mut frame = RgFrameSync::default();
        let result = self
            .record_and_submit(output_handle, fence, swapchain, &mut frame)
            .and_then(|()| self.wait_frame(&frame));

        match result {
            Ok(()) => {
                self.finish_frame(frame);
                Ok(())
            }
            Err(err) => {
                self.abandon_frame(frame);
                Err(err)
            }
        }
    }

    fn record_and_submit(
        &mut self,
        output_handle: RgResourceHandle,
        fence: Option<vk::Fence>,
        mut swapchain: Option<&mut dyn GfxSwapchain>,
        frame: &mut RgFrameSync,
    ) -> RgResult<()> {
        // 1. 获取 swapchain image，失败时资源状态还没有被修改
        let acquire_wait = match swapchain.as_deref_mut() {
            Some(swapchain) => {
                let semaphore = self.device.acquire_semaphore(GfxSemaphoreType::Binary)?;
                frame.semaphores.push(semaphore);
                swapchain.acquire_next_image(semaphore)?;
                Some(GfxSemaphoreInfo::binary(semaphore, vk::PipelineStageFlags2::ALL_COMMANDS))
            }
            None => None,
        };

        // 2. submission level 与 barrier，barrier 计算会推进资源的当前状态
        let dependencies = RgDependencyGraph::analyze(&self.passes, &self.registry);
        self.last_levels = dependencies.levels().to_vec();
        frame.saved_states =
            self.registry.iter().map(|(handle, resource)| (handle, resource.current_state())).collect_vec();
        self.last_barriers = BarrierSynthesizer::synthesize(&self.passes, &mut self.registry);
        if self.settings.print_plan {
            self.print_execution_plan();
        }

        // 3. 录制，swapchain 的 acquire 由最后一个访问输出的 pass 等待
        let acquire_pass = self.passes.iter().rposition(|pass| pass.required_state(output_handle).is_some());
        let mut present_waits = Vec::new();
        if acquire_pass.is_none() {
            present_waits.extend(acquire_wait);
        }
        let submissions = self.record_passes(acquire_pass.zip(acquire_wait))?;

        // 4. 提交
        let fence = match fence {
            Some(fence) => fence,
            None => {
                let fence = self.device.acquire_fence(false)?;
                frame.owned_fence = Some(fence);
                fence
            }
        };
        self.device.reset_fence(fence)?;

        let mut groups = RgSubmissionScheduler::group_submissions(submissions, &self.last_levels);
        if groups.len() > 1 || swapchain.is_some() {
            let frame_waits = RgSubmissionScheduler::chain_timeline(
                self.device.as_ref(),
                &mut groups,
                &dependencies,
                &mut self.timelines,
                vk::PipelineStageFlags2::TRANSFER,
            )?;
            present_waits.extend(frame_waits);
        }
        frame.submitted = true;
        let submit_calls = RgSubmissionScheduler::submit_groups(self.device.as_ref(), &groups, Some(fence))?;
        log::debug!("{} submission group(s) in {} submit call(s)", groups.len(), submit_calls);

        // 5. present
        if let Some(swapchain) = swapchain.as_deref() {
            let render_complete = self.device.acquire_semaphore(GfxSemaphoreType::Binary)?;
            frame.semaphores.push(render_complete);
            let source = self.present_source(output_handle)?;

            let result = RgSubmissionScheduler::present(
                self.device.as_ref(),
                swapchain,
                source,
                &present_waits,
                render_complete,
                self.settings.blit_filter.vk_filter(),
            );
            if let Some(resource) = self.registry.get_mut(output_handle) {
                resource.current_state = ResourceState::CopySource;
            }
            result?;
        }

        Ok(())
    }

    /// 并行录制所有 pass，返回按 pass 顺序排列的提交描述
    fn record_passes(&mut self, acquire: Option<(usize, GfxSemaphoreInfo)>) -> RgResult<Vec<RgPassSubmission>> {
        let ctx = RgRecordContext {
            device: self.device.as_ref(),
            registry: &self.registry,
            cache: &self.cache,
            settings: &self.settings,
        };
        let results = Mutex::new(Vec::with_capacity(self.passes.len()));

        let tasks = self
            .passes
            .iter()
            .zip(self.command_pools.iter_mut())
            .zip(self.last_barriers.iter())
            .enumerate()
            .map(|(idx, ((pass, pool_slot), barriers))| {
                let waits = acquire
                    .filter(|(pass_idx, _)| *pass_idx == idx)
                    .map(|(_, wait)| wait)
                    .into_iter()
                    .collect_vec();
                let results = &results;
                Box::new(move || {
                    let result = record_pass(ctx, pass, barriers, pool_slot, &waits);
                    results.lock().unwrap_or_else(PoisonError::into_inner).push((idx, result));
                }) as RgTask<'_>
            })
            .collect_vec();

        self.executor.run_all(tasks);

        let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, result)| result).collect()
    }

    fn present_source(&self, output_handle: RgResourceHandle) -> RgResult<RgPresentSource> {
        let resource = self
            .registry
            .get(output_handle)
            .ok_or_else(|| RgError::UnknownResource(self.registry.name_of(output_handle).to_string()))?;
        match self.cache.get(output_handle) {
            Some(RgPhysicalResource::Image { image, extent, .. }) => Ok(RgPresentSource {
                image: *image,
                extent: *extent,
                state: resource.current_state(),
                aspect: resource.aspect(),
            }),
            _ => Err(RgError::UnknownOutput(resource.name().to_string())),
        }
    }

    fn wait_frame(&self, frame: &RgFrameSync) -> RgResult<()> {
        if let Some(fence) = frame.owned_fence {
            self.device.wait_fence(fence, self.settings.fence_timeout_ns)?;
        }
        Ok(())
    }

    fn finish_frame(&mut self, frame: RgFrameSync) {
        match frame.owned_fence {
            Some(fence) => {
                self.device.release_fence(fence);
                for semaphore in frame.semaphores {
                    self.device.release_semaphore(semaphore);
                }
            }
            None => self.deferred_semaphores = frame.semaphores,
        }
    }

    fn abandon_frame(&mut self, frame: RgFrameSync) {
        if frame.submitted {
            if let Err(err) = self.device.wait_idle() {
                log::error!("render graph: wait idle after failed frame: {}", err);
            }
        } else {
            // GPU 没有执行这一帧，下一帧的 barrier 仍然从原来的状态出发
            for (handle, state) in frame.saved_states {
                if let Some(resource) = self.registry.get_mut(handle) {
                    resource.current_state = state;
                }
            }
        }
        if let Some(fence) = frame.owned_fence {
            self.device.release_fence(fence);
        }
        for semaphore in frame.semaphores {
            self.device.release_semaphore(semaphore);
        }
    }
}

// teardown
impl RenderGraph {
    /// 销毁所有非 external 的物理资源，归还池化对象，清空所有声明
    pub fn reset(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            log::error!("render graph reset: wait idle failed: {}", err);
        }

        let destroyed = self.cache.destroy_all(self.device.as_ref());
        for pool in self.command_pools.drain(..).flatten() {
            self.device.release_command_pool(pool);
        }
        for semaphore in self.deferred_semaphores.drain(..) {
            self.device.release_semaphore(semaphore);
        }
        for (_, timeline) in self.timelines.drain(..) {
            self.device.release_semaphore(timeline.semaphore);
        }

        self.registry.clear();
        self.passes.clear();
        self.pass_names.clear();
        self.last_barriers.clear();
        self.last_levels.clear();

        log::info!("render graph reset: {} physical resource(s) destroyed", destroyed);
    }
}

impl Drop for RenderGraph {
    fn drop(&mut self) {
        self.reset();
    }
}

// debug
impl RenderGraph {
    /// 打印最近一次 execute 的执行计划
    pub fn print_execution_plan(&self) {
        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║              RenderGraph Execution Plan                          ║");
        log::info!("╠══════════════════════════════════════════════════════════════════╣");
        log::info!(
            "║ Total Passes: {}  |  Resources: {}  |  Order: [{}]",
            self.passes.len(),
            self.registry.len(),
            self.passes.iter().map(|pass| pass.name()).join(" → ")
        );
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        for (idx, pass) in self.passes.iter().enumerate() {
            log::info!("");
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!(
                "│ [{}/{}] Pass: \"{}\" ({:?} queue, level {})",
                idx + 1,
                self.passes.len(),
                pass.name(),
                pass.queue_type(),
                self.last_levels.get(idx).map(|level| level.to_string()).unwrap_or_else(|| "-".to_string())
            );
            log::info!("├─────────────────────────────────────────────────────────────────┤");

            for (handle, state) in pass.resource_states() {
                let marker = if pass.writes(handle) { "✏️ " } else { "📖" };
                log::info!(
                    "│   {} \"{}\" @ {:?} (stage: {:?}, access: {:?})",
                    marker,
                    self.registry.name_of(handle),
                    state,
                    state.stage(),
                    state.access()
                );
            }

            if let Some(barriers) = self.last_barriers.get(idx)
                && barriers.has_barriers()
            {
                log::info!("├─────────────────────────────────────────────────────────────────┤");
                log::info!(
                    "│ Barriers: {} image, {} buffer",
                    barriers.image_barrier_count(),
                    barriers.buffer_barrier_count()
                );
                for barrier in &barriers.image_barriers {
                    log::info!(
                        "│   🔒 Image \"{}\": {:?} → {:?} ({:?} → {:?}, aspect {:?})",
                        self.registry.name_of(barrier.handle),
                        barrier.src_state,
                        barrier.dst_state,
                        barrier.src_state.layout(),
                        barrier.dst_state.layout(),
                        barrier.aspect
                    );
                }
                for barrier in &barriers.buffer_barriers {
                    log::info!(
                        "│   🔒 Buffer \"{}\": {:?} → {:?}",
                        self.registry.name_of(barrier.handle),
                        barrier.src_state,
                        barrier.dst_state
                    );
                }
            }
            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;
    use crate::gfx::recording_device::{GfxCommand, GfxEvent, RecordingDevice};
    use crate::gfx::GfxError;
    use crate::render_graph::executor::{InlineExecutor, RayonExecutor};
    use crate::render_graph::resource::{RgPassBufferInfo, RgPassImageInfo};

    const RGBA8: vk::Format = vk::Format::R8G8B8A8_UNORM;

    fn new_graph() -> (Arc<RecordingDevice>, RenderGraph) {
        truvis_crate_tools::init_log::init_test_log();
        let device = Arc::new(RecordingDevice::new());
        let graph = RenderGraph::new(device.clone(), Box::new(InlineExecutor), RgSettings::default());
        (device, graph)
    }

    /// forward 写 scene_color，post 采样 scene_color
    fn declare_forward_post(graph: &mut RenderGraph) {
        let info = RgPassImageInfo::new(800, 600, RGBA8);
        let mut forward = graph.create_pass("forward", QueueType::Graphics);
        forward.set_color_output("scene_color", Some(info), None);
        forward.record_execute(|recorder| {
            recorder.set_full_viewport();
            recorder.draw(3, 1, 0, 0);
        });

        let mut post = graph.create_pass("post", QueueType::Graphics);
        post.add_texture_input("scene_color", None);
        post.record_execute(|recorder| recorder.dispatch([100, 75, 1]));
    }

    fn swapchain(device: &RecordingDevice, width: u32, height: u32) -> crate::gfx::recording_device::RecordingSwapchain {
        device.create_swapchain(vk::Extent2D { width, height }, vk::Format::B8G8R8A8_UNORM, 3)
    }

    #[test]
    fn test_scene_color_scenario() {
        let (device, mut graph) = new_graph();
        declare_forward_post(&mut graph);
        let mut swapchain = swapchain(&device, 800, 600);

        graph.build("scene_color").unwrap();
        let usage = match graph.physical_resource("scene_color") {
            Some(RgPhysicalResource::Image { usage, .. }) => *usage,
            other => panic!("unexpected physical resource {:?}", other),
        };
        assert!(usage.contains(
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC
        ));

        graph.execute("scene_color", None, Some(&mut swapchain)).unwrap();
        let scene_color = graph.physical_image("scene_color").unwrap();

        let forward = device.command_buffer_named("forward").unwrap();
        let forward_barriers = forward.image_barriers();
        assert_eq!(forward_barriers.len(), 1);
        assert_eq!(forward_barriers[0].image, scene_color);
        assert_eq!(forward_barriers[0].old_state, ResourceState::Undefined);
        assert_eq!(forward_barriers[0].new_state, ResourceState::RenderTarget);

        let post = device.command_buffer_named("post").unwrap();
        let post_barriers = post.image_barriers();
        assert_eq!(post_barriers.len(), 1);
        assert_eq!(post_barriers[0].old_state, ResourceState::RenderTarget);
        assert_eq!(post_barriers[0].new_state, ResourceState::ShaderResource);

        let single = device.single_commands();
        assert_eq!(single.len(), 1);
        let copy = single[0].commands.iter().find_map(|cmd| match cmd {
            GfxCommand::CopyImage { src, dst, .. } => Some((*src, *dst)),
            _ => None,
        });
        assert_eq!(copy, Some((scene_color, swapchain.current_image())));

        // present 等待的是搬运命令 signal 的 render-complete semaphore
        let events = device.events();
        let render_complete = events.iter().find_map(|event| match event {
            GfxEvent::SingleCommands { signal_infos, .. } => Some(signal_infos[0].semaphore),
            _ => None,
        });
        let present_waits = events.iter().find_map(|event| match event {
            GfxEvent::Present { wait_semaphores, .. } => Some(wait_semaphores.clone()),
            _ => None,
        });
        assert_eq!(present_waits, render_complete.map(|semaphore| vec![semaphore]));

        // acquire 的 semaphore 由 post 等待
        let acquire = events.iter().find_map(|event| match event {
            GfxEvent::AcquireNextImage { signal, .. } => Some(*signal),
            _ => None,
        });
        let post_submit = device
            .submits()
            .into_iter()
            .flatten()
            .find(|batch| batch.command_buffers.contains(&post.handle))
            .unwrap();
        assert!(post_submit.waits_on(acquire.unwrap()));

        assert_eq!(graph.resource("scene_color").unwrap().current_state(), ResourceState::CopySource);
        assert!(device.sync_violations().is_empty(), "{:?}", device.sync_violations());
    }

    #[test]
    fn test_zero_barriers_when_states_match() {
        let (device, mut graph) = new_graph();
        declare_forward_post(&mut graph);
        graph.create_pass("tonemap", QueueType::Graphics).add_texture_input("scene_color", None);

        graph.execute("scene_color", None, None).unwrap();

        assert_eq!(graph.pass_barriers("post").unwrap().image_barrier_count(), 1);
        assert!(!graph.pass_barriers("tonemap").unwrap().has_barriers());
        let tonemap = device.command_buffer_named("tonemap").unwrap();
        assert!(tonemap.image_barriers().is_empty());
    }

    #[test]
    fn test_build_idempotent() {
        let (device, mut graph) = new_graph();
        declare_forward_post(&mut graph);
        graph
            .create_pass("simulate", QueueType::Compute)
            .add_buffer_output("particles", Some(RgPassBufferInfo::new(4096)), None);

        graph.build("scene_color").unwrap();
        let image = graph.physical_image("scene_color");
        let buffer = graph.physical_buffer("particles");
        graph.build("scene_color").unwrap();

        assert!(image.is_some() && buffer.is_some());
        assert_eq!(graph.physical_image("scene_color"), image);
        assert_eq!(graph.physical_buffer("particles"), buffer);
        let counters = device.counters();
        assert_eq!(counters.images_created, 1);
        assert_eq!(counters.buffers_created, 1);
    }

    #[test]
    fn test_no_present_without_swapchain() {
        let (device, mut graph) = new_graph();
        graph
            .create_pass("forward", QueueType::Graphics)
            .set_color_output("scene_color", Some(RgPassImageInfo::new(64, 64, RGBA8)), None);

        graph.execute("scene_color", None, None).unwrap();

        assert_eq!(device.present_count(), 0);
        assert!(device.single_commands().is_empty());
        assert!(!device.events().iter().any(|event| matches!(event, GfxEvent::AcquireSemaphore { .. })));
        assert_eq!(device.submits().len(), 1);
        // 借出的 fence 已经等待并归还
        assert_eq!(device.counters().live_fences, 0);
    }

    #[test]
    fn test_blit_when_extent_differs() {
        let (device, mut graph) = new_graph();
        declare_forward_post(&mut graph);
        let mut swapchain = swapchain(&device, 1280, 720);

        graph.execute("scene_color", None, Some(&mut swapchain)).unwrap();

        let single = device.single_commands();
        assert!(single[0].commands.iter().any(|cmd| matches!(cmd, GfxCommand::BlitImage { .. })));
        assert!(!single[0].commands.iter().any(|cmd| matches!(cmd, GfxCommand::CopyImage { .. })));
        assert_eq!(device.present_count(), 1);
    }

    #[test]
    fn test_teardown_counts() {
        let device = Arc::new(RecordingDevice::new());
        let external_image = device
            .create_image(&GfxImageCreateInfo::new_2d(
                "history",
                vk::Extent2D { width: 800, height: 600 },
                RGBA8,
                vk::ImageUsageFlags::SAMPLED,
            ))
            .unwrap();

        {
            let mut graph = RenderGraph::new(device.clone(), Box::new(InlineExecutor), RgSettings::default());
            declare_forward_post(&mut graph);
            graph.import_resource(
                "history",
                RgExternalResource::image(external_image, RgPassImageInfo::new(800, 600, RGBA8))
                    .with_state(ResourceState::ShaderResource),
            );
            graph.create_pass("post", QueueType::Graphics).add_texture_input("history", None);
            graph
                .create_pass("cull", QueueType::Compute)
                .add_buffer_output("visible", Some(RgPassBufferInfo::new(256)), None);

            graph.execute("scene_color", None, None).unwrap();
            graph.execute("scene_color", None, None).unwrap();

            // reset 之后重新声明，再次分配
            graph.reset();
            declare_forward_post(&mut graph);
            graph.execute("scene_color", None, None).unwrap();
        }

        let counters = device.counters();
        // history 由调用方创建，graph 创建了两次 scene_color 和一次 visible
        assert_eq!(counters.images_created, 3);
        assert_eq!(counters.images_destroyed, 2);
        assert_eq!(counters.buffers_created, 1);
        assert_eq!(counters.buffers_destroyed, 1);
        assert_eq!(counters.invalid_destroys, 0);
        assert_eq!(counters.live_images(), 1);
        let external_destroyed = device
            .events()
            .iter()
            .any(|event| matches!(event, GfxEvent::DestroyImage(image) if *image == external_image));
        assert!(!external_destroyed);
        assert_eq!(counters.live_command_pools, 0);
        assert_eq!(counters.live_fences, 0);
        assert_eq!(counters.live_semaphores, 0);
    }

    #[test]
    fn test_independent_passes_not_chained() {
        let (device, mut graph) = new_graph();
        let shadow_info = RgPassImageInfo::new(2048, 2048, vk::Format::D32_SFLOAT);
        graph
            .create_pass("shadow", QueueType::Graphics)
            .set_depth_stencil_output("shadow_map", Some(shadow_info), None);
        graph
            .create_pass("geometry", QueueType::Graphics)
            .set_color_output("gbuffer", Some(RgPassImageInfo::new(800, 600, RGBA8)), None);
        let mut lighting = graph.create_pass("lighting", QueueType::Graphics);
        lighting.add_texture_input("shadow_map", None);
        lighting.add_texture_input("gbuffer", None);
        lighting.set_color_output("lit", Some(RgPassImageInfo::new(800, 600, RGBA8)), None);

        graph.execute("lit", None, None).unwrap();

        assert_eq!(graph.pass_level("shadow"), Some(0));
        assert_eq!(graph.pass_level("geometry"), Some(0));
        assert_eq!(graph.pass_level("lighting"), Some(1));

        let shadow = device.command_buffer_named("shadow").unwrap().handle;
        let geometry = device.command_buffer_named("geometry").unwrap().handle;
        let lighting = device.command_buffer_named("lighting").unwrap().handle;

        let batches = device.submits().into_iter().flatten().collect_vec();
        let first = batches.iter().find(|batch| batch.command_buffers.contains(&shadow)).unwrap();
        // shadow 与 geometry 在同一个 batch 中，之间没有任何等待
        assert!(first.command_buffers.contains(&geometry));
        assert!(first.wait_infos.is_empty());

        let second = batches.iter().find(|batch| batch.command_buffers.contains(&lighting)).unwrap();
        assert_eq!(second.wait_infos.len(), 1);
        assert!(second.wait_infos[0].is_timeline());
        assert!(device.sync_violations().is_empty());
    }

    #[test]
    fn test_allocation_failure_retry() {
        let (device, mut graph) = new_graph();
        declare_forward_post(&mut graph);
        graph
            .create_pass("bloom", QueueType::Graphics)
            .set_color_output("bloom", Some(RgPassImageInfo::new(400, 300, RGBA8)), None);

        device.fail_allocation_after(1);
        let err = graph.build("scene_color").unwrap_err();
        assert!(matches!(err, RgError::Gfx(GfxError::OutOfDeviceMemory)));
        assert_eq!(device.counters().images_created, 1);
        let first = graph.physical_image("scene_color");
        assert!(first.is_some());
        assert!(graph.physical_image("bloom").is_none());

        // 再次 build 从失败处继续
        graph.build("scene_color").unwrap();
        assert_eq!(graph.physical_image("scene_color"), first);
        assert!(graph.physical_image("bloom").is_some());
        assert_eq!(device.counters().images_created, 2);
    }

    #[test]
    fn test_missing_info_and_unknown_output() {
        let (_device, mut graph) = new_graph();
        graph.create_pass("forward", QueueType::Graphics).set_color_output("scene_color", None, None);
        graph
            .create_pass("cull", QueueType::Compute)
            .add_buffer_output("visible", Some(RgPassBufferInfo::new(64)), None);

        assert!(matches!(graph.build("scene_color"), Err(RgError::MissingInfo(name)) if name == "scene_color"));
        assert!(matches!(graph.build("final"), Err(RgError::UnknownOutput(_))));
        assert!(matches!(graph.execute("visible", None, None), Err(RgError::UnknownOutput(_))));
    }

    #[test]
    #[should_panic(expected = "unrecoverable GPU error")]
    fn test_device_lost_is_fatal() {
        let (device, mut graph) = new_graph();
        declare_forward_post(&mut graph);
        device.set_device_lost(true);
        let _ = graph.execute("scene_color", None, None);
    }

    #[test]
    fn test_out_of_date_swapchain_is_recoverable() {
        let (device, mut graph) = new_graph();
        declare_forward_post(&mut graph);
        let mut swapchain = swapchain(&device, 800, 600);
        swapchain.set_out_of_date(true);

        let err = graph.execute("scene_color", None, Some(&mut swapchain)).unwrap_err();
        assert!(err.is_swapchain_out_of_date());
        assert!(device.submits().is_empty());
        // 没有提交任何东西，资源状态保持不变
        assert_eq!(graph.resource("scene_color").unwrap().current_state(), ResourceState::Undefined);
        assert_eq!(device.counters().live_semaphores, 0);

        swapchain.recreate(vk::Extent2D { width: 1024, height: 768 });
        graph.execute("scene_color", None, Some(&mut swapchain)).unwrap();
        assert_eq!(device.present_count(), 1);
        assert!(device.sync_violations().is_empty());
    }

    #[test]
    fn test_caller_fence() {
        let (device, mut graph) = new_graph();
        declare_forward_post(&mut graph);
        let mut swapchain = swapchain(&device, 800, 600);
        let fence = device.acquire_fence(true).unwrap();

        graph.execute("scene_color", Some(fence), Some(&mut swapchain)).unwrap();

        let events = device.events();
        assert!(events.iter().any(|event| matches!(event, GfxEvent::ResetFence(f) if *f == fence)));
        assert!(!events.iter().any(|event| matches!(event, GfxEvent::WaitFence(_))));
        let last_submit_fence = events.iter().rev().find_map(|event| match event {
            GfxEvent::Submit { fence, .. } => Some(*fence),
            _ => None,
        });
        assert_eq!(last_submit_fence, Some(Some(fence)));
        // acquire + render-complete 延后归还，timeline 常驻
        assert_eq!(device.counters().live_semaphores, 3);

        device.wait_fence(fence, u64::MAX).unwrap();
        graph.execute("scene_color", Some(fence), Some(&mut swapchain)).unwrap();
        assert_eq!(device.counters().live_semaphores, 3);
        assert_eq!(graph.timeline_value(QueueType::Graphics), 4);
        assert_eq!(graph.timeline_value(QueueType::Compute), 0);
        assert!(device.sync_violations().is_empty());

        drop(graph);
        assert_eq!(device.counters().live_semaphores, 0);
        device.release_fence(fence);
    }

    #[test]
    fn test_unrelated_queues_do_not_wait() {
        let (device, mut graph) = new_graph();
        let shadow_info = RgPassImageInfo::new(1024, 1024, vk::Format::D32_SFLOAT);
        graph
            .create_pass("shadow", QueueType::Graphics)
            .set_depth_stencil_output("shadow_map", Some(shadow_info), None);
        let mut culling = graph.create_pass("culling", QueueType::Compute);
        culling.add_buffer_output("cull_out", Some(RgPassBufferInfo::new(1024)), None);
        culling.record_execute(|recorder| recorder.dispatch([16, 1, 1]));

        graph.execute("shadow_map", None, None).unwrap();

        assert_eq!(graph.pass_level("shadow"), Some(0));
        assert_eq!(graph.pass_level("culling"), Some(0));

        let shadow = device.command_buffer_named("shadow").unwrap().handle;
        let culling = device.command_buffer_named("culling").unwrap().handle;
        let batches = device.submits().into_iter().flatten().collect_vec();
        let shadow_batch = batches.iter().find(|batch| batch.command_buffers.contains(&shadow)).unwrap();
        let culling_batch = batches.iter().find(|batch| batch.command_buffers.contains(&culling)).unwrap();
        assert!(shadow_batch.wait_infos.is_empty());
        assert!(culling_batch.wait_infos.is_empty(), "{:?}", culling_batch.wait_infos);

        // 两个 queue 各自推进自己的 timeline
        assert_eq!(graph.timeline_value(QueueType::Graphics), 1);
        assert_eq!(graph.timeline_value(QueueType::Compute), 1);
        assert!(device.sync_violations().is_empty(), "{:?}", device.sync_violations());
    }

    #[test]
    fn test_failed_recording_keeps_states() {
        let (device, mut graph) = new_graph();
        declare_forward_post(&mut graph);

        device.fail_next_command_pool();
        let err = graph.execute("scene_color", None, None).unwrap_err();
        assert!(matches!(err, RgError::Gfx(GfxError::OutOfDeviceMemory)));
        assert!(device.submits().is_empty());
        assert_eq!(graph.resource("scene_color").unwrap().current_state(), ResourceState::Undefined);
        assert_eq!(graph.frame_stats().frame_count(), 0);

        // 重试时 barrier 仍然从 Undefined 出发
        graph.execute("scene_color", None, None).unwrap();
        let forward_barriers = device.command_buffer_named("forward").unwrap().image_barriers();
        assert_eq!(forward_barriers.len(), 1);
        assert_eq!(forward_barriers[0].old_state, ResourceState::Undefined);
        assert_eq!(forward_barriers[0].new_state, ResourceState::RenderTarget);
        assert_eq!(graph.resource("scene_color").unwrap().current_state(), ResourceState::ShaderResource);
        assert_eq!(device.counters().live_command_pools, 2);
        assert!(device.sync_violations().is_empty(), "{:?}", device.sync_violations());
    }

    #[test]
    fn test_frame_stats() {
        let (_device, mut graph) = new_graph();
        declare_forward_post(&mut graph);
        assert_eq!(graph.frame_stats().frame_count(), 0);
        assert_eq!(graph.frame_stats().fps(), 0.0);

        graph.execute("scene_color", None, None).unwrap();
        graph.execute("scene_color", None, None).unwrap();
        assert!(graph.execute("final", None, None).is_err());

        let stats = graph.frame_stats();
        assert_eq!(stats.frame_count(), 2);
        assert!(stats.frame_time() > std::time::Duration::ZERO);
        assert!(stats.fps() > 0.0 && stats.fps().is_finite());
        assert!(stats.average_fps() > 0.0);
    }

    #[test]
    fn test_rayon_executor_frame() {
        let device = Arc::new(RecordingDevice::new());
        let mut graph = RenderGraph::new(
            device.clone(),
            Box::new(RayonExecutor::new(4).unwrap()),
            RgSettings {
                print_plan: true,
                ..Default::default()
            },
        );

        let info = RgPassImageInfo::new(256, 256, RGBA8);
        for idx in 0..8 {
            graph
                .create_pass(&format!("blur-{}", idx), QueueType::Graphics)
                .set_color_output(&format!("layer-{}", idx), Some(info), None);
        }
        let mut composite = graph.create_pass("composite", QueueType::Graphics);
        for idx in 0..8 {
            composite.add_texture_input(&format!("layer-{}", idx), None);
        }
        composite.set_color_output("final", Some(info), None);

        let mut swapchain = swapchain(&device, 256, 256);
        for _ in 0..3 {
            graph.execute("final", None, Some(&mut swapchain)).unwrap();
        }

        assert_eq!(device.present_count(), 3);
        for idx in 0..8 {
            assert_eq!(graph.pass_level(&format!("blur-{}", idx)), Some(0));
        }
        assert_eq!(graph.pass_level("composite"), Some(1));
        // 每个 pass 的 command pool 只借出一次
        assert_eq!(device.counters().live_command_pools, 9);
        assert!(device.sync_violations().is_empty(), "{:?}", device.sync_violations());
    }

    #[test]
    fn test_create_pass_idempotent() {
        let (_device, mut graph) = new_graph();
        let first = graph.create_pass("forward", QueueType::Graphics).handle();
        let second = graph.create_pass("forward", QueueType::Compute).handle();

        assert_eq!(first, second);
        assert_eq!(graph.pass_count(), 1);
        assert_eq!(graph.get_pass("forward").unwrap().queue_type(), QueueType::Graphics);
        assert!(graph.get_pass("post").is_none());
    }

    #[test]
    fn test_import_buffer() {
        let (device, mut graph) = new_graph();
        let buffer = vk::Buffer::from_raw(0xbeef);
        graph.import_resource("camera", RgExternalResource::buffer(buffer, 256).with_state(ResourceState::UniformBuffer));
        let mut forward = graph.create_pass("forward", QueueType::Graphics);
        forward.add_uniform_buffer_input("camera", None);
        forward.set_color_output("scene_color", Some(RgPassImageInfo::new(32, 32, RGBA8)), None);

        graph.execute("scene_color", None, None).unwrap();

        assert_eq!(graph.physical_buffer("camera"), Some(buffer));
        assert!(graph.pass_barriers("forward").unwrap().buffer_barriers.is_empty());
        assert_eq!(device.counters().buffers_created, 0);
    }
}
