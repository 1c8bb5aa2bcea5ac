//! 声明式帧图
//!
//! 每帧声明一组 pass 以及它们读写的命名资源，由 graph 负责资源分配、
//! barrier 计算、并行录制、跨 queue 的同步提交和最终的 present。
//!
//! # 核心概念
//!
//! - **RgResourceHandle**: 命名虚拟资源的句柄，同名资源在 reset 之前始终对应同一个句柄
//! - **RgPassBuilder**: pass 的声明接口，声明时累积资源的 usage 和要求的状态
//! - **BarrierSynthesizer**: 按声明顺序比较资源的当前状态与要求的状态，生成 barrier
//! - **RgTaskExecutor**: 每个 pass 一个录制任务，可以在线程池上并行执行
//! - **RgSubmissionScheduler**: 按 submission level 分组提交，每个 queue 一个 timeline semaphore，只等待真正的前驱
//! - **RenderGraph**: 以上所有部分的入口
//!
//! # 使用示例
//!
//! ```ignore
//! use truvis_frame_graph::render_graph::*;
//!
//! let mut graph = RenderGraph::new(device, Box::new(InlineExecutor), RgSettings::default());
//!
//! let mut forward = graph.create_pass("forward", QueueType::Graphics);
//! forward.set_color_output("scene_color", Some(RgPassImageInfo::new(800, 600, vk::Format::R8G8B8A8_UNORM)), None);
//! forward.record_execute(|recorder| {
//!     recorder.set_full_viewport();
//!     recorder.draw(3, 1, 0, 0);
//! });
//!
//! graph.create_pass("post", QueueType::Graphics).add_texture_input("scene_color", None);
//!
//! graph.execute("scene_color", None, Some(&mut swapchain))?;
//! ```
//!
//! # 模块结构
//!
//! - `handle`: 资源与 pass 句柄
//! - `resource` / `resource_registry`: 虚拟资源与名字注册表
//! - `physical_cache`: 虚拟资源对应的 GPU 对象
//! - `pass` / `pass_context`: pass 声明接口与录制接口
//! - `barrier`: 自动 barrier 计算
//! - `dependency`: pass 之间的依赖与 submission level
//! - `executor`: 录制任务与线程池
//! - `scheduler`: 提交与 present
//! - `frame_stats`: 帧耗时与帧率
//! - `graph`: 入口

mod barrier;
mod dependency;
mod error;
mod executor;
mod frame_stats;
mod graph;
mod handle;
mod pass;
mod pass_context;
mod physical_cache;
mod resource;
mod resource_registry;
mod scheduler;
mod settings;

// Re-exports
pub use barrier::{BarrierSynthesizer, PassBarriers, RgBufferBarrierDesc, RgImageBarrierDesc};
pub use dependency::RgDependencyGraph;
pub use error::{RgError, RgResult};
pub use executor::{InlineExecutor, RayonExecutor, RgPassSubmission, RgTask, RgTaskExecutor};
pub use frame_stats::RgFrameStats;
pub use graph::RenderGraph;
pub use handle::{RgPassHandle, RgResourceHandle};
pub use pass::{RgPassBuilder, RgRecordCallback, RgRenderPass};
pub use pass_context::RgPassRecorder;
pub use physical_cache::{RgPhysicalCache, RgPhysicalResource};
pub use resource::{RgExternalResource, RgPassBufferInfo, RgPassImageInfo, RgResource, RgResourceKind};
pub use resource_registry::RgResourceRegistry;
pub use scheduler::{RgPresentSource, RgQueueTimeline, RgSubmissionGroup, RgSubmissionScheduler};
pub use settings::{RgBlitFilter, RgSettings};

pub use crate::gfx::{QueueType, ResourceState};
