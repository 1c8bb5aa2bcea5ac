//! 虚拟资源
//!
//! 一个名字在 graph 的生命周期内只对应一个 `RgResource`。
//! usage 和 info 在声明阶段累积，build 时根据最终结果创建物理资源。

use ash::vk;

use crate::gfx::resource_state::{ResourceState, infer_image_aspect};
use crate::render_graph::handle::RgPassHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgResourceKind {
    Image,
    Buffer,
}

/// pass 对输出 image 的描述
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgPassImageInfo {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
}

impl RgPassImageInfo {
    #[inline]
    pub fn new(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            extent: vk::Extent2D { width, height },
            format,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgPassBufferInfo {
    pub size: vk::DeviceSize,
}

impl RgPassBufferInfo {
    #[inline]
    pub fn new(size: vk::DeviceSize) -> Self {
        Self { size }
    }
}

/// 由调用方持有的 GPU 对象，导入后 graph 只使用、不销毁
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RgExternalResource {
    Image {
        image: vk::Image,
        info: RgPassImageInfo,
        initial_state: ResourceState,
    },
    Buffer {
        buffer: vk::Buffer,
        info: RgPassBufferInfo,
        initial_state: ResourceState,
    },
}

impl RgExternalResource {
    pub fn image(image: vk::Image, info: RgPassImageInfo) -> Self {
        Self::Image {
            image,
            info,
            initial_state: ResourceState::Undefined,
        }
    }

    pub fn buffer(buffer: vk::Buffer, size: vk::DeviceSize) -> Self {
        Self::Buffer {
            buffer,
            info: RgPassBufferInfo::new(size),
            initial_state: ResourceState::Undefined,
        }
    }

    /// 导入时资源已经处于的状态
    pub fn with_state(self, state: ResourceState) -> Self {
        match self {
            Self::Image { image, info, .. } => Self::Image {
                image,
                info,
                initial_state: state,
            },
            Self::Buffer { buffer, info, .. } => Self::Buffer {
                buffer,
                info,
                initial_state: state,
            },
        }
    }

    #[inline]
    pub fn kind(&self) -> RgResourceKind {
        match self {
            Self::Image { .. } => RgResourceKind::Image,
            Self::Buffer { .. } => RgResourceKind::Buffer,
        }
    }

    #[inline]
    pub fn initial_state(&self) -> ResourceState {
        match self {
            Self::Image { initial_state, .. } | Self::Buffer { initial_state, .. } => *initial_state,
        }
    }
}

/// 渲染图中的虚拟资源
#[derive(Debug)]
pub struct RgResource {
    pub(crate) name: String,
    pub(crate) kind: RgResourceKind,

    /// 所有声明的 usage 的并集
    pub(crate) image_usage: vk::ImageUsageFlags,
    pub(crate) buffer_usage: vk::BufferUsageFlags,
    pub(crate) access: vk::AccessFlags2,

    pub(crate) image_info: Option<RgPassImageInfo>,
    pub(crate) buffer_info: Option<RgPassBufferInfo>,

    /// 调用方持有，graph 不会创建或者销毁
    pub(crate) external: bool,

    pub(crate) reading_passes: Vec<RgPassHandle>,
    pub(crate) writing_passes: Vec<RgPassHandle>,

    /// 在 execute 过程中随 barrier 更新
    pub(crate) current_state: ResourceState,
}

// new & init
impl RgResource {
    pub(crate) fn new(name: impl Into<String>, kind: RgResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            image_usage: vk::ImageUsageFlags::empty(),
            buffer_usage: vk::BufferUsageFlags::empty(),
            access: vk::AccessFlags2::NONE,
            image_info: None,
            buffer_info: None,
            external: false,
            reading_passes: Vec::new(),
            writing_passes: Vec::new(),
            current_state: ResourceState::Undefined,
        }
    }
}

// getters
impl RgResource {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> RgResourceKind {
        self.kind
    }

    #[inline]
    pub fn image_usage(&self) -> vk::ImageUsageFlags {
        self.image_usage
    }

    #[inline]
    pub fn buffer_usage(&self) -> vk::BufferUsageFlags {
        self.buffer_usage
    }

    #[inline]
    pub fn access(&self) -> vk::AccessFlags2 {
        self.access
    }

    #[inline]
    pub fn image_info(&self) -> Option<RgPassImageInfo> {
        self.image_info
    }

    #[inline]
    pub fn buffer_info(&self) -> Option<RgPassBufferInfo> {
        self.buffer_info
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        self.external
    }

    #[inline]
    pub fn reading_passes(&self) -> &[RgPassHandle] {
        &self.reading_passes
    }

    #[inline]
    pub fn writing_passes(&self) -> &[RgPassHandle] {
        &self.writing_passes
    }

    /// 是否被某个 pass 作为输出写入
    #[inline]
    pub fn is_pass_output(&self) -> bool {
        !self.writing_passes.is_empty()
    }

    #[inline]
    pub fn current_state(&self) -> ResourceState {
        self.current_state
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.image_info
            .map(|info| infer_image_aspect(info.format))
            .unwrap_or(vk::ImageAspectFlags::COLOR)
    }
}

// tools
impl RgResource {
    pub(crate) fn add_reader(&mut self, pass: RgPassHandle) {
        if !self.reading_passes.contains(&pass) {
            self.reading_passes.push(pass);
        }
    }

    pub(crate) fn add_writer(&mut self, pass: RgPassHandle) {
        if !self.writing_passes.contains(&pass) {
            self.writing_passes.push(pass);
        }
    }
}
