use std::sync::Arc;

use anyhow::Context;
use ash::vk;
use truvis_frame_graph::gfx::recording_device::RecordingDevice;
use truvis_frame_graph::gfx::{GfxBufferCreateInfo, GfxDevice};
use truvis_frame_graph::render_graph::{QueueType, RayonExecutor, RenderGraph, RgSettings};

mod deferred_passes;

use deferred_passes::{FINAL_OUTPUT, declare_passes};

const FRAME_COUNT: usize = 6;
/// 在这一帧之前模拟一次窗口大小变化
const RESIZE_FRAME: usize = 3;

fn load_settings() -> anyhow::Result<RgSettings> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(RgSettings::default());
    };
    let content = std::fs::read_to_string(&path).with_context(|| format!("failed to read settings `{}`", path))?;
    let settings = RgSettings::from_toml_str(&content).with_context(|| format!("invalid settings `{}`", path))?;
    log::info!("settings loaded from {}", path);
    Ok(settings)
}

fn main() -> anyhow::Result<()> {
    truvis_crate_tools::init_log::init_log();

    let settings = load_settings()?;
    let device = Arc::new(RecordingDevice::new());
    let executor = RayonExecutor::new(settings.worker_threads).context("failed to build recording thread pool")?;

    let extent = vk::Extent2D {
        width: 800,
        height: 600,
    };
    let mut swapchain = device.create_swapchain(extent, vk::Format::B8G8R8A8_UNORM, 3);
    let camera = device.create_buffer(&GfxBufferCreateInfo {
        name: "camera".to_string(),
        size: 256,
        usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
    })?;

    let mut graph = RenderGraph::new(device.clone(), Box::new(executor), settings);
    declare_passes(&mut graph, extent, camera);

    for frame in 0..FRAME_COUNT {
        if frame == RESIZE_FRAME {
            swapchain.set_out_of_date(true);
        }

        match graph.execute(FINAL_OUTPUT, None, Some(&mut swapchain)) {
            Ok(()) => {}
            Err(err) if err.is_swapchain_out_of_date() => {
                // 输出尺寸不变，present 时 blit 到新的 swapchain 尺寸
                log::warn!("frame {}: {}, recreating swapchain", frame, err);
                swapchain.recreate(vk::Extent2D {
                    width: 1280,
                    height: 720,
                });
                graph.execute(FINAL_OUTPUT, None, Some(&mut swapchain))?;
            }
            Err(err) => return Err(err.into()),
        }
        log::info!(
            "frame {} presented in {:.3} ms, timeline graphics {} / compute {}",
            frame,
            graph.frame_stats().frame_time_ms(),
            graph.timeline_value(QueueType::Graphics),
            graph.timeline_value(QueueType::Compute)
        );
    }

    graph.print_execution_plan();
    let stats = *graph.frame_stats();
    log::info!("{} frame(s), average {:.1} fps", stats.frame_count(), stats.average_fps());
    drop(graph);
    device.destroy_buffer(camera);

    let counters = device.counters();
    log::info!(
        "images: {} created / {} destroyed, buffers: {} created / {} destroyed, presents: {}",
        counters.images_created,
        counters.images_destroyed,
        counters.buffers_created,
        counters.buffers_destroyed,
        device.present_count()
    );
    let violations = device.sync_violations();
    if violations.is_empty() {
        log::info!("no synchronization violations");
    } else {
        for violation in &violations {
            log::error!("sync violation: {}", violation);
        }
        anyhow::bail!("{} synchronization violation(s)", violations.len());
    }
    Ok(())
}
