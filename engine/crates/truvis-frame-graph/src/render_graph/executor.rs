//! Pass 录制
//!
//! 每个 pass 的录制是一个独立的任务：使用 pass 自己的 command pool，
//! 插入 barrier，开始 rendering，调用用户回调，结束 command buffer。
//! 任务之间不共享可变状态，结果写入一个由 mutex 保护的列表。

use ash::vk;

use crate::gfx::{
    GfxBufferBarrier, GfxClearValue, GfxCommandPool, GfxDevice, GfxImageBarrier, GfxRenderingAttachment,
    GfxRenderingInfo, GfxSemaphoreInfo, GfxSubmitInfo, QueueType, ResourceState,
};
use crate::render_graph::barrier::PassBarriers;
use crate::render_graph::error::{RgError, RgResult};
use crate::render_graph::handle::{RgPassHandle, RgResourceHandle};
use crate::render_graph::pass::RgRenderPass;
use crate::render_graph::pass_context::RgPassRecorder;
use crate::render_graph::physical_cache::RgPhysicalCache;
use crate::render_graph::resource_registry::RgResourceRegistry;
use crate::render_graph::settings::RgSettings;

const PASS_LABEL_COLOR: [f32; 4] = [0.6, 0.6, 0.6, 1.0];

/// 一个录制任务
pub type RgTask<'a> = Box<dyn FnOnce() + Send + 'a>;

/// 执行录制任务的线程池抽象
pub trait RgTaskExecutor: Send + Sync {
    /// 执行所有任务，全部完成后才返回
    fn run_all<'a>(&self, tasks: Vec<RgTask<'a>>);

    fn worker_count(&self) -> usize;
}

/// 在调用线程上按顺序执行
#[derive(Default)]
pub struct InlineExecutor;

impl RgTaskExecutor for InlineExecutor {
    fn run_all<'a>(&self, tasks: Vec<RgTask<'a>>) {
        for task in tasks {
            task();
        }
    }

    fn worker_count(&self) -> usize {
        1
    }
}

/// 使用独立的 rayon 线程池并行录制
pub struct RayonExecutor {
    pool: rayon::ThreadPool,
}

impl RayonExecutor {
    /// `worker_threads` 为 0 时使用 rayon 的默认线程数
    pub fn new(worker_threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .thread_name(|idx| format!("rg-worker-{}", idx))
            .build()?;
        log::info!("render graph worker pool: {} threads", pool.current_num_threads());
        Ok(Self { pool })
    }
}

impl RgTaskExecutor for RayonExecutor {
    fn run_all<'a>(&self, tasks: Vec<RgTask<'a>>) {
        self.pool.scope(|scope| {
            for task in tasks {
                scope.spawn(move |_| task());
            }
        });
    }

    fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }
}

/// 录制阶段只读共享的数据
#[derive(Clone, Copy)]
pub(crate) struct RgRecordContext<'a> {
    pub device: &'a dyn GfxDevice,
    pub registry: &'a RgResourceRegistry,
    pub cache: &'a RgPhysicalCache,
    pub settings: &'a RgSettings,
}

/// 一个 pass 录制完成后的提交描述
#[derive(Clone, Debug)]
pub struct RgPassSubmission {
    pub pass: RgPassHandle,
    pub queue_type: QueueType,
    pub submit_info: GfxSubmitInfo,
}

/// 录制一个 pass
///
/// `pool_slot` 是该 pass 独占的 command pool，为空时从 device 借出一个并留在 slot 中，
/// 之后的帧会复用它。
pub(crate) fn record_pass(
    ctx: RgRecordContext<'_>,
    pass: &RgRenderPass,
    barriers: &PassBarriers,
    pool_slot: &mut Option<Box<dyn GfxCommandPool>>,
    waits: &[GfxSemaphoreInfo],
) -> RgResult<RgPassSubmission> {
    // 先解析所有物理资源，失败时不会留下录制到一半的 command buffer
    let (image_barriers, buffer_barriers) = resolve_barriers(ctx, barriers)?;
    let render_extent = pass_render_extent(ctx.registry, pass);
    let rendering_info = resolve_rendering_info(ctx, pass, render_extent)?;

    let pool = match pool_slot.take() {
        Some(pool) => pool,
        None => ctx.device.acquire_command_pool(pass.queue_type)?,
    };
    let pool = pool_slot.insert(pool);
    pool.reset()?;

    let mut cmd = pool.allocate(&pass.name)?;
    cmd.begin()?;
    cmd.set_debug_name(&pass.name);
    if ctx.settings.debug_labels {
        cmd.begin_label(&pass.name, PASS_LABEL_COLOR);
    }

    if !image_barriers.is_empty() || !buffer_barriers.is_empty() {
        cmd.pipeline_barrier(&image_barriers, &buffer_barriers);
    }

    let rendering = !rendering_info.is_empty();
    if rendering {
        cmd.begin_rendering(&rendering_info);
    }

    match &pass.record_callback {
        Some(callback) => {
            let mut recorder = RgPassRecorder {
                cmd: cmd.as_mut(),
                pass_name: &pass.name,
                registry: ctx.registry,
                cache: ctx.cache,
                render_extent,
            };
            callback(&mut recorder);
        }
        None => log::warn!("pass `{}` has no record callback", pass.name),
    }

    if rendering {
        cmd.end_rendering();
    }
    if ctx.settings.debug_labels {
        cmd.end_label();
    }
    cmd.end()?;

    let mut submit_info = GfxSubmitInfo::new(&[cmd.vk_handle()]);
    for wait in waits {
        submit_info = submit_info.wait(*wait);
    }

    Ok(RgPassSubmission {
        pass: pass.handle,
        queue_type: pass.queue_type,
        submit_info,
    })
}

fn resolve_barriers(
    ctx: RgRecordContext<'_>,
    barriers: &PassBarriers,
) -> RgResult<(Vec<GfxImageBarrier>, Vec<GfxBufferBarrier>)> {
    let image_barriers = barriers
        .image_barriers
        .iter()
        .map(|desc| resolve_image(ctx, desc.handle).map(|image| desc.to_gfx_barrier(image)))
        .collect::<RgResult<Vec<_>>>()?;
    let buffer_barriers = barriers
        .buffer_barriers
        .iter()
        .map(|desc| {
            ctx.cache
                .buffer(desc.handle)
                .map(|buffer| desc.to_gfx_barrier(buffer))
                .ok_or_else(|| unresolved(ctx.registry, desc.handle))
        })
        .collect::<RgResult<Vec<_>>>()?;

    Ok((image_barriers, buffer_barriers))
}

fn resolve_rendering_info(
    ctx: RgRecordContext<'_>,
    pass: &RgRenderPass,
    render_extent: vk::Extent2D,
) -> RgResult<GfxRenderingInfo> {
    let mut info = GfxRenderingInfo::new(render_extent);

    for handle in &pass.color_outputs {
        let image = resolve_image(ctx, *handle)?;
        info.color_attachments.push(GfxRenderingAttachment::cleared(
            image,
            ResourceState::RenderTarget,
            GfxClearValue::Color(ctx.settings.clear_color),
        ));
    }
    if let Some(handle) = pass.depth_output {
        let image = resolve_image(ctx, handle)?;
        info.depth_attachment = Some(GfxRenderingAttachment::cleared(
            image,
            ResourceState::DepthStencil,
            GfxClearValue::DepthStencil {
                depth: 1.0,
                stencil: 0,
            },
        ));
    }

    Ok(info)
}

/// color 输出优先，其次是 depth，最后是 storage image 输出
fn pass_render_extent(registry: &RgResourceRegistry, pass: &RgRenderPass) -> vk::Extent2D {
    pass.color_outputs
        .iter()
        .copied()
        .chain(pass.depth_output)
        .chain(pass.texture_outputs.iter().copied())
        .find_map(|handle| registry.get(handle).and_then(|resource| resource.image_info()))
        .map(|info| info.extent)
        .unwrap_or_default()
}

fn resolve_image(ctx: RgRecordContext<'_>, handle: RgResourceHandle) -> RgResult<vk::Image> {
    ctx.cache.image(handle).ok_or_else(|| unresolved(ctx.registry, handle))
}

fn unresolved(registry: &RgResourceRegistry, handle: RgResourceHandle) -> RgError {
    RgError::UnresolvedResource(registry.name_of(handle).to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::gfx::recording_device::{GfxCommand, RecordingDevice};
    use crate::gfx::GfxImageCreateInfo;
    use crate::render_graph::barrier::BarrierSynthesizer;
    use crate::render_graph::pass::RgPassBuilder;
    use crate::render_graph::physical_cache::RgPhysicalResource;
    use crate::render_graph::resource::RgPassImageInfo;

    struct Fixture {
        device: RecordingDevice,
        passes: Vec<RgRenderPass>,
        registry: RgResourceRegistry,
        cache: RgPhysicalCache,
        settings: RgSettings,
    }

    impl Fixture {
        fn new(count: usize) -> Self {
            Self {
                device: RecordingDevice::new(),
                passes: (0..count)
                    .map(|idx| RgRenderPass::new(format!("pass-{}", idx), RgPassHandle(idx), QueueType::Graphics))
                    .collect(),
                registry: RgResourceRegistry::new(),
                cache: RgPhysicalCache::new(),
                settings: RgSettings::default(),
            }
        }

        fn builder(&mut self, idx: usize) -> RgPassBuilder<'_> {
            RgPassBuilder {
                pass: &mut self.passes[idx],
                registry: &mut self.registry,
                cache: &mut self.cache,
            }
        }

        fn allocate(&mut self, handle: RgResourceHandle) -> vk::Image {
            let resource = self.registry.get(handle).unwrap();
            let info = resource.image_info().unwrap();
            let image = self
                .device
                .create_image(&GfxImageCreateInfo::new_2d(
                    resource.name(),
                    info.extent,
                    info.format,
                    resource.image_usage(),
                ))
                .unwrap();
            self.cache.insert(
                handle,
                RgPhysicalResource::Image {
                    image,
                    extent: info.extent,
                    format: info.format,
                    usage: resource.image_usage(),
                    external: false,
                },
            );
            image
        }

        fn ctx(&self) -> RgRecordContext<'_> {
            RgRecordContext {
                device: &self.device,
                registry: &self.registry,
                cache: &self.cache,
                settings: &self.settings,
            }
        }
    }

    #[test]
    fn test_inline_executor_runs_in_order() {
        let order = Mutex::new(Vec::new());
        let tasks: Vec<RgTask<'_>> = (0..4)
            .map(|idx| {
                let order = &order;
                Box::new(move || order.lock().unwrap().push(idx)) as RgTask<'_>
            })
            .collect();

        InlineExecutor.run_all(tasks);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_rayon_executor_joins_all_tasks() {
        let executor = RayonExecutor::new(3).unwrap();
        assert_eq!(executor.worker_count(), 3);

        let counter = AtomicUsize::new(0);
        let tasks: Vec<RgTask<'_>> = (0..32)
            .map(|_| {
                let counter = &counter;
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }) as RgTask<'_>
            })
            .collect();

        executor.run_all(tasks);
        // run_all 返回时所有任务都已完成
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn test_record_pass_command_order() {
        let mut fixture = Fixture::new(1);
        let info = RgPassImageInfo::new(320, 240, vk::Format::R8G8B8A8_UNORM);
        let color = fixture.builder(0).set_color_output("scene_color", Some(info), None);
        fixture.builder(0).record_execute(|recorder| {
            assert_eq!(recorder.render_extent(), vk::Extent2D { width: 320, height: 240 });
            assert!(recorder.image_by_name("scene_color").is_some());
            recorder.set_full_viewport();
            recorder.draw(3, 1, 0, 0);
        });
        let image = fixture.allocate(color);

        let barriers = BarrierSynthesizer::synthesize(&fixture.passes, &mut fixture.registry);
        let mut pool = None;
        let submission = record_pass(fixture.ctx(), &fixture.passes[0], &barriers[0], &mut pool, &[]).unwrap();

        assert!(pool.is_some());
        assert_eq!(submission.pass, RgPassHandle(0));
        assert_eq!(submission.submit_info.command_buffers.len(), 1);
        assert!(submission.submit_info.wait_infos.is_empty());

        let recorded = fixture.device.command_buffer(submission.submit_info.command_buffers[0]).unwrap();
        assert_eq!(recorded.name, "pass-0");
        let kinds: Vec<&str> = recorded
            .commands
            .iter()
            .map(|cmd| match cmd {
                GfxCommand::Begin => "begin",
                GfxCommand::BeginLabel(_) => "label",
                GfxCommand::PipelineBarrier { .. } => "barrier",
                GfxCommand::BeginRendering { .. } => "rendering",
                GfxCommand::SetViewport | GfxCommand::SetScissor(_) => "viewport",
                GfxCommand::Draw { .. } => "draw",
                GfxCommand::EndRendering => "end-rendering",
                GfxCommand::EndLabel => "end-label",
                GfxCommand::End => "end",
                _ => "other",
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "begin",
                "label",
                "barrier",
                "rendering",
                "viewport",
                "viewport",
                "draw",
                "end-rendering",
                "end-label",
                "end"
            ]
        );
        assert_eq!(recorded.image_barriers()[0].image, image);
    }

    #[test]
    fn test_pool_reused_and_waits_attached() {
        let mut fixture = Fixture::new(1);
        fixture.settings.debug_labels = false;
        let info = RgPassImageInfo::new(16, 16, vk::Format::R8G8B8A8_UNORM);
        let color = fixture.builder(0).add_texture_output("lut", Some(info), None);
        fixture.allocate(color);

        let semaphore = fixture.device.acquire_semaphore(crate::gfx::GfxSemaphoreType::Binary).unwrap();
        let wait = GfxSemaphoreInfo::binary(semaphore, vk::PipelineStageFlags2::ALL_COMMANDS);
        let barriers = PassBarriers::new();

        let mut pool = None;
        record_pass(fixture.ctx(), &fixture.passes[0], &barriers, &mut pool, &[]).unwrap();
        let first_pool = pool.as_ref().map(|pool| pool.vk_handle());
        let submission = record_pass(fixture.ctx(), &fixture.passes[0], &barriers, &mut pool, &[wait]).unwrap();

        assert_eq!(pool.as_ref().map(|pool| pool.vk_handle()), first_pool);
        assert_eq!(fixture.device.counters().live_command_pools, 1);
        assert!(submission.submit_info.waits_on(semaphore));

        // 没有 attachment，也没有 barrier
        let recorded = fixture.device.command_buffer(submission.submit_info.command_buffers[0]).unwrap();
        assert!(recorded.commands.iter().all(|cmd| !matches!(
            cmd,
            GfxCommand::BeginRendering { .. } | GfxCommand::PipelineBarrier { .. } | GfxCommand::BeginLabel(_)
        )));
    }

    #[test]
    fn test_unresolved_resource() {
        let mut fixture = Fixture::new(1);
        let info = RgPassImageInfo::new(16, 16, vk::Format::D32_SFLOAT);
        fixture.builder(0).set_depth_stencil_output("depth", Some(info), None);

        let barriers = BarrierSynthesizer::synthesize(&fixture.passes, &mut fixture.registry);
        let mut pool = None;
        let result = record_pass(fixture.ctx(), &fixture.passes[0], &barriers[0], &mut pool, &[]);

        assert!(matches!(result, Err(RgError::UnresolvedResource(name)) if name == "depth"));
        // 失败发生在借出 command pool 之前
        assert!(pool.is_none());
    }
}
