//! 提交与呈现
//!
//! 录制完成之后在单线程上执行：
//! 1. 按 (level, queue) 把 pass 的提交描述合并成 submission group
//! 2. 每个 queue 一个 timeline semaphore，group 只等待持有其前驱 pass 的 group
//! 3. 同一个 queue 上连续的 group 通过一次 submit 提交
//! 4. 可选地把最终输出拷贝到 swapchain 并 present

use std::collections::HashMap;

use ash::vk;
use indexmap::IndexMap;
use indexmap::map::Entry;
use itertools::Itertools;

use crate::gfx::{
    GfxCommandEncoder, GfxDevice, GfxImageBarrier, GfxResult, GfxSemaphoreInfo, GfxSemaphoreType, GfxSubmitInfo,
    GfxSwapchain, QueueType, ResourceState,
};
use crate::render_graph::dependency::RgDependencyGraph;
use crate::render_graph::executor::RgPassSubmission;
use crate::render_graph::handle::RgPassHandle;

/// 同一个 level、同一个 queue 上的 pass，合并为一个 submit batch
#[derive(Clone, Debug)]
pub struct RgSubmissionGroup {
    pub level: usize,
    pub queue_type: QueueType,
    pub passes: Vec<RgPassHandle>,
    pub submit_info: GfxSubmitInfo,
}

/// 一个 queue 上的 timeline semaphore，以及它最后一次 signal 的值
#[derive(Clone, Copy, Debug)]
pub struct RgQueueTimeline {
    pub semaphore: vk::Semaphore,
    pub value: u64,
}

/// 被呈现的最终输出
#[derive(Clone, Copy, Debug)]
pub struct RgPresentSource {
    pub image: vk::Image,
    pub extent: vk::Extent2D,
    /// 输出当前所处的状态
    pub state: ResourceState,
    pub aspect: vk::ImageAspectFlags,
}

pub struct RgSubmissionScheduler;

// group
impl RgSubmissionScheduler {
    /// `levels[i]` 是第 i 个 pass 的 submission level
    ///
    /// group 按 (level, 第一个 pass 的索引) 排序，group 内的 pass 保持声明顺序。
    pub fn group_submissions(mut submissions: Vec<RgPassSubmission>, levels: &[usize]) -> Vec<RgSubmissionGroup> {
        submissions.sort_by_key(|submission| (levels[submission.pass.index()], submission.pass.index()));

        let mut groups: IndexMap<(usize, QueueType), RgSubmissionGroup> = IndexMap::new();
        for submission in submissions {
            let level = levels[submission.pass.index()];
            let group = groups.entry((level, submission.queue_type)).or_insert_with(|| RgSubmissionGroup {
                level,
                queue_type: submission.queue_type,
                passes: Vec::new(),
                submit_info: GfxSubmitInfo::default(),
            });
            group.passes.push(submission.pass);
            group.submit_info.merge(submission.submit_info);
        }

        groups.into_values().collect_vec()
    }

    /// 每个 group 在自己 queue 的 timeline 上 signal 下一个值，只等待持有其前驱 pass 的 group
    ///
    /// 同一个 queue 的 timeline 按提交顺序递增，所以每个 queue 只需要等待前驱 group 中最大的值；
    /// 没有前驱的 group 不等待任何东西。某个 queue 第一次用到时才从 device 借出它的 timeline。
    ///
    /// 返回等待本帧所有 group 完成所需的 wait，每个用到的 queue 一个，stage 为 `final_stage`。
    pub fn chain_timeline(
        device: &dyn GfxDevice,
        groups: &mut [RgSubmissionGroup],
        dependencies: &RgDependencyGraph,
        timelines: &mut IndexMap<QueueType, RgQueueTimeline>,
        final_stage: vk::PipelineStageFlags2,
    ) -> GfxResult<Vec<GfxSemaphoreInfo>> {
        let mut group_of_pass = HashMap::new();
        let mut signals = Vec::with_capacity(groups.len());
        let mut frame_final: IndexMap<QueueType, (vk::Semaphore, u64)> = IndexMap::new();

        for (group_idx, group) in groups.iter_mut().enumerate() {
            let timeline = match timelines.entry(group.queue_type) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let semaphore = device.acquire_semaphore(GfxSemaphoreType::Timeline)?;
                    log::debug!("timeline semaphore {:?} created for {:?} queue", semaphore, group.queue_type);
                    entry.insert(RgQueueTimeline { semaphore, value: 0 })
                }
            };
            timeline.value += 1;

            group.submit_info.signal_infos.push(GfxSemaphoreInfo::timeline(
                timeline.semaphore,
                vk::PipelineStageFlags2::ALL_COMMANDS,
                timeline.value,
            ));
            signals.push((group.queue_type, timeline.semaphore, timeline.value));
            frame_final.insert(group.queue_type, (timeline.semaphore, timeline.value));
            group_of_pass.extend(group.passes.iter().map(|pass| (pass.index(), group_idx)));
        }

        for (group_idx, group) in groups.iter_mut().enumerate() {
            // queue -> 需要等待的最大值
            let mut producers: IndexMap<QueueType, (vk::Semaphore, u64)> = IndexMap::new();
            let producer_groups = group
                .passes
                .iter()
                .flat_map(|pass| dependencies.get_predecessors(pass.index()))
                .filter_map(|pred| group_of_pass.get(&pred).copied())
                .filter(|producer| *producer != group_idx);
            for producer in producer_groups {
                let (queue_type, semaphore, value) = signals[producer];
                let wait = producers.entry(queue_type).or_insert((semaphore, value));
                wait.1 = wait.1.max(value);
            }

            group.submit_info.wait_infos.extend(producers.into_values().map(|(semaphore, value)| {
                GfxSemaphoreInfo::timeline(semaphore, vk::PipelineStageFlags2::ALL_COMMANDS, value)
            }));
        }

        Ok(frame_final
            .into_values()
            .map(|(semaphore, value)| GfxSemaphoreInfo::timeline(semaphore, final_stage, value))
            .collect_vec())
    }
}

// submit
impl RgSubmissionScheduler {
    /// 同一个 queue 上连续的 group 合成一次 submit 调用，fence 挂在最后一次调用上
    ///
    /// 返回 submit 调用的次数。
    pub fn submit_groups(
        device: &dyn GfxDevice,
        groups: &[RgSubmissionGroup],
        fence: Option<vk::Fence>,
    ) -> GfxResult<usize> {
        let grouped = groups.iter().group_by(|group| group.queue_type);
        let runs = grouped
            .into_iter()
            .map(|(queue_type, run)| (queue_type, run.map(|group| group.submit_info.clone()).collect_vec()))
            .collect_vec();

        let run_count = runs.len();
        if run_count == 0 {
            // 没有任何 pass 时仍然需要 signal fence
            if let Some(fence) = fence {
                device.queue(QueueType::Graphics).submit(&[], Some(fence))?;
            }
            return Ok(0);
        }
        for (idx, (queue_type, batches)) in runs.into_iter().enumerate() {
            let run_fence = if idx + 1 == run_count { fence } else { None };
            log::debug!("submit {} batch(es) to {:?} queue", batches.len(), queue_type);
            device.queue(queue_type).submit(&batches, run_fence)?;
        }

        Ok(run_count)
    }
}

// present
impl RgSubmissionScheduler {
    /// 把最终输出搬运到 swapchain 当前的 image 上并 present
    ///
    /// 尺寸完全一致时使用 copy，否则使用 blit 缩放。搬运命令等待 `waits`，
    /// 完成后 signal `render_complete`，present 等待 `render_complete`。
    pub fn present(
        device: &dyn GfxDevice,
        swapchain: &dyn GfxSwapchain,
        source: RgPresentSource,
        waits: &[GfxSemaphoreInfo],
        render_complete: vk::Semaphore,
        filter: vk::Filter,
    ) -> GfxResult<()> {
        let swapchain_image = swapchain.current_image();
        let swapchain_extent = swapchain.extent();
        let use_copy = source.extent == swapchain_extent;
        log::debug!(
            "present {}x{} -> {}x{} via {}",
            source.extent.width,
            source.extent.height,
            swapchain_extent.width,
            swapchain_extent.height,
            if use_copy { "copy" } else { "blit" }
        );

        let signals = [GfxSemaphoreInfo::binary(render_complete, vk::PipelineStageFlags2::ALL_COMMANDS)];

        let mut record = |cmd: &mut dyn GfxCommandEncoder| {
            let mut to_transfer = Vec::with_capacity(2);
            if source.state != ResourceState::CopySource {
                to_transfer.push(
                    GfxImageBarrier::new(source.image, source.state, ResourceState::CopySource)
                        .with_aspect(source.aspect),
                );
            }
            to_transfer.push(GfxImageBarrier::new(
                swapchain_image,
                ResourceState::Undefined,
                ResourceState::CopyDestination,
            ));
            cmd.pipeline_barrier(&to_transfer, &[]);

            if use_copy {
                cmd.copy_image(
                    source.image,
                    swapchain_image,
                    vk::Extent3D {
                        width: source.extent.width,
                        height: source.extent.height,
                        depth: 1,
                    },
                );
            } else {
                cmd.blit_image(source.image, source.extent, swapchain_image, swapchain_extent, filter);
            }

            cmd.pipeline_barrier(
                &[GfxImageBarrier::new(swapchain_image, ResourceState::CopyDestination, ResourceState::Present)],
                &[],
            );
        };
        device.execute_single_commands(QueueType::Graphics, waits, &signals, &mut record)?;

        device.queue(QueueType::Graphics).present(swapchain, &[render_complete])
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;
    use crate::gfx::recording_device::{GfxCommand, GfxEvent, RecordingDevice};
    use crate::render_graph::pass::{RgPassBuilder, RgRenderPass};
    use crate::render_graph::physical_cache::RgPhysicalCache;
    use crate::render_graph::resource::{RgPassBufferInfo, RgPassImageInfo};
    use crate::render_graph::resource_registry::RgResourceRegistry;

    fn submission(pass: usize, queue_type: QueueType) -> RgPassSubmission {
        RgPassSubmission {
            pass: RgPassHandle(pass),
            queue_type,
            submit_info: GfxSubmitInfo::new(&[vk::CommandBuffer::from_raw(100 + pass as u64)]),
        }
    }

    #[test]
    fn test_group_by_level_and_queue() {
        // shadow(0) 和 geometry(1) 没有依赖；culling(2) 在 compute queue 上
        let submissions = vec![
            submission(3, QueueType::Graphics),
            submission(1, QueueType::Graphics),
            submission(2, QueueType::Compute),
            submission(0, QueueType::Graphics),
        ];
        let levels = [0, 0, 0, 1];

        let groups = RgSubmissionScheduler::group_submissions(submissions, &levels);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].passes, vec![RgPassHandle(0), RgPassHandle(1)]);
        assert_eq!(groups[0].submit_info.command_buffers.len(), 2);
        assert_eq!(groups[1].queue_type, QueueType::Compute);
        assert_eq!(groups[2].level, 1);
        assert_eq!(groups[2].passes, vec![RgPassHandle(3)]);
    }

    fn builder<'a>(
        pass: &'a mut RgRenderPass,
        registry: &'a mut RgResourceRegistry,
        cache: &'a mut RgPhysicalCache,
    ) -> RgPassBuilder<'a> {
        RgPassBuilder { pass, registry, cache }
    }

    /// shadow(G) 与 culling(C) 互不相关，lighting(G) 读取两者
    fn shadow_culling_lighting() -> (Vec<RgRenderPass>, RgDependencyGraph) {
        let mut passes = [
            RgRenderPass::new("shadow", RgPassHandle(0), QueueType::Graphics),
            RgRenderPass::new("culling", RgPassHandle(1), QueueType::Compute),
            RgRenderPass::new("lighting", RgPassHandle(2), QueueType::Graphics),
        ];
        let mut registry = RgResourceRegistry::new();
        let mut cache = RgPhysicalCache::new();

        let depth = RgPassImageInfo::new(1024, 1024, vk::Format::D32_SFLOAT);
        let [shadow, culling, lighting] = &mut passes;
        builder(shadow, &mut registry, &mut cache).set_depth_stencil_output("shadow_map", Some(depth), None);
        builder(culling, &mut registry, &mut cache).add_buffer_output(
            "cull_out",
            Some(RgPassBufferInfo::new(256)),
            None,
        );
        let mut lighting = builder(lighting, &mut registry, &mut cache);
        lighting.add_texture_input("shadow_map", None);
        lighting.add_storage_buffer_input("cull_out", None);

        let dependencies = RgDependencyGraph::analyze(&passes, &registry);
        (passes.into(), dependencies)
    }

    #[test]
    fn test_timeline_waits_only_on_producers() {
        let device = RecordingDevice::new();
        let (passes, dependencies) = shadow_culling_lighting();
        assert_eq!(dependencies.levels(), &[0, 0, 1]);

        let mut timelines = IndexMap::new();
        let submissions = passes.iter().map(|pass| submission(pass.handle().index(), pass.queue_type())).collect_vec();
        let mut groups = RgSubmissionScheduler::group_submissions(submissions, dependencies.levels());
        let waits = RgSubmissionScheduler::chain_timeline(
            &device,
            &mut groups,
            &dependencies,
            &mut timelines,
            vk::PipelineStageFlags2::TRANSFER,
        )
        .unwrap();

        let graphics = timelines[&QueueType::Graphics];
        let compute = timelines[&QueueType::Compute];
        assert_ne!(graphics.semaphore, compute.semaphore);
        assert_eq!((graphics.value, compute.value), (2, 1));

        // 同一个 level 上的 shadow 与 culling 互不等待
        assert_eq!(groups[0].passes, vec![RgPassHandle(0)]);
        assert!(groups[0].submit_info.wait_infos.is_empty());
        assert_eq!(groups[1].queue_type, QueueType::Compute);
        assert!(groups[1].submit_info.wait_infos.is_empty());
        assert!(groups[1].submit_info.signals(compute.semaphore));

        let lighting_waits = &groups[2].submit_info.wait_infos;
        assert_eq!(lighting_waits.len(), 2);
        assert!(lighting_waits.contains(&GfxSemaphoreInfo::timeline(
            graphics.semaphore,
            vk::PipelineStageFlags2::ALL_COMMANDS,
            1
        )));
        assert!(lighting_waits.contains(&GfxSemaphoreInfo::timeline(
            compute.semaphore,
            vk::PipelineStageFlags2::ALL_COMMANDS,
            1
        )));

        assert_eq!(
            waits,
            vec![
                GfxSemaphoreInfo::timeline(graphics.semaphore, vk::PipelineStageFlags2::TRANSFER, 2),
                GfxSemaphoreInfo::timeline(compute.semaphore, vk::PipelineStageFlags2::TRANSFER, 1),
            ]
        );
    }

    #[test]
    fn test_timeline_values_continue_across_frames() {
        let device = RecordingDevice::new();
        let (passes, dependencies) = shadow_culling_lighting();
        let mut timelines = IndexMap::new();

        for _ in 0..2 {
            let submissions =
                passes.iter().map(|pass| submission(pass.handle().index(), pass.queue_type())).collect_vec();
            let mut groups = RgSubmissionScheduler::group_submissions(submissions, dependencies.levels());
            RgSubmissionScheduler::chain_timeline(
                &device,
                &mut groups,
                &dependencies,
                &mut timelines,
                vk::PipelineStageFlags2::TRANSFER,
            )
            .unwrap();
            RgSubmissionScheduler::submit_groups(&device, &groups, None).unwrap();
        }

        assert_eq!(timelines[&QueueType::Graphics].value, 4);
        assert_eq!(timelines[&QueueType::Compute].value, 2);
        // 每个 queue 只借出一个 timeline
        assert_eq!(device.counters().live_semaphores, 2);
        assert!(device.sync_violations().is_empty(), "{:?}", device.sync_violations());
    }

    #[test]
    fn test_submit_runs_per_queue() {
        let device = RecordingDevice::new();
        let fence = device.acquire_fence(false).unwrap();
        let (passes, dependencies) = shadow_culling_lighting();

        let submissions = passes.iter().map(|pass| submission(pass.handle().index(), pass.queue_type())).collect_vec();
        let mut groups = RgSubmissionScheduler::group_submissions(submissions, dependencies.levels());
        let mut timelines = IndexMap::new();
        RgSubmissionScheduler::chain_timeline(
            &device,
            &mut groups,
            &dependencies,
            &mut timelines,
            vk::PipelineStageFlags2::TRANSFER,
        )
        .unwrap();

        let calls = RgSubmissionScheduler::submit_groups(&device, &groups, Some(fence)).unwrap();
        assert_eq!(calls, 3);

        let submit_events = device
            .events()
            .into_iter()
            .filter_map(|event| match event {
                GfxEvent::Submit {
                    queue_type,
                    batches,
                    fence,
                } => Some((queue_type, batches.len(), fence)),
                _ => None,
            })
            .collect_vec();
        assert_eq!(
            submit_events,
            vec![
                (QueueType::Graphics, 1, None),
                (QueueType::Compute, 1, None),
                (QueueType::Graphics, 1, Some(fence)),
            ]
        );
        device.wait_fence(fence, u64::MAX).unwrap();
        assert!(device.sync_violations().is_empty(), "{:?}", device.sync_violations());
    }

    fn present_with_extent(output_extent: vk::Extent2D) -> (RecordingDevice, vk::Semaphore) {
        let device = RecordingDevice::new();
        let mut swapchain =
            device.create_swapchain(vk::Extent2D { width: 800, height: 600 }, vk::Format::B8G8R8A8_UNORM, 2);
        let acquire = device.acquire_semaphore(GfxSemaphoreType::Binary).unwrap();
        let render_complete = device.acquire_semaphore(GfxSemaphoreType::Binary).unwrap();
        swapchain.acquire_next_image(acquire).unwrap();

        let source = RgPresentSource {
            image: vk::Image::from_raw(999),
            extent: output_extent,
            state: ResourceState::ShaderResource,
            aspect: vk::ImageAspectFlags::COLOR,
        };
        RgSubmissionScheduler::present(
            &device,
            &swapchain,
            source,
            &[GfxSemaphoreInfo::binary(acquire, vk::PipelineStageFlags2::TRANSFER)],
            render_complete,
            vk::Filter::LINEAR,
        )
        .unwrap();
        (device, render_complete)
    }

    #[test]
    fn test_present_copy_when_extent_matches() {
        let (device, render_complete) = present_with_extent(vk::Extent2D { width: 800, height: 600 });

        let single = device.single_commands();
        assert_eq!(single.len(), 1);
        assert!(single[0].commands.iter().any(|cmd| matches!(cmd, GfxCommand::CopyImage { .. })));
        assert!(!single[0].commands.iter().any(|cmd| matches!(cmd, GfxCommand::BlitImage { .. })));

        let barriers = single[0].image_barriers();
        assert_eq!(barriers.len(), 3);
        assert_eq!(barriers[0].new_state, ResourceState::CopySource);
        assert_eq!(barriers[2].new_state, ResourceState::Present);

        let present = device.events().into_iter().find_map(|event| match event {
            GfxEvent::Present { wait_semaphores, .. } => Some(wait_semaphores),
            _ => None,
        });
        assert_eq!(present, Some(vec![render_complete]));
        assert!(device.sync_violations().is_empty());
    }

    #[test]
    fn test_present_blit_when_extent_differs() {
        let (device, _) = present_with_extent(vk::Extent2D { width: 1920, height: 1080 });

        let single = device.single_commands();
        let blit = single[0].commands.iter().find_map(|cmd| match cmd {
            GfxCommand::BlitImage {
                src_extent,
                dst_extent,
                filter,
                ..
            } => Some((*src_extent, *dst_extent, *filter)),
            _ => None,
        });
        assert_eq!(
            blit,
            Some((
                vk::Extent2D { width: 1920, height: 1080 },
                vk::Extent2D { width: 800, height: 600 },
                vk::Filter::LINEAR
            ))
        );
        assert_eq!(device.present_count(), 1);
    }
}
