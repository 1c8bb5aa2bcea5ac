use ash::vk;
use slotmap::SecondaryMap;

use crate::gfx::GfxDevice;
use crate::render_graph::handle::RgResourceHandle;

/// 虚拟资源对应的 GPU 对象
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RgPhysicalResource {
    Image {
        image: vk::Image,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        external: bool,
    },
    Buffer {
        buffer: vk::Buffer,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        external: bool,
    },
}

impl RgPhysicalResource {
    #[inline]
    pub fn is_external(&self) -> bool {
        match self {
            Self::Image { external, .. } | Self::Buffer { external, .. } => *external,
        }
    }
}

/// 物理资源缓存
///
/// build 阶段写入，execute 阶段只读。非 external 的条目由缓存负责销毁。
#[derive(Default)]
pub struct RgPhysicalCache {
    entries: SecondaryMap<RgResourceHandle, RgPhysicalResource>,
}

impl RgPhysicalCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn insert(&mut self, handle: RgResourceHandle, resource: RgPhysicalResource) {
        self.entries.insert(handle, resource);
    }

    #[inline]
    pub fn get(&self, handle: RgResourceHandle) -> Option<&RgPhysicalResource> {
        self.entries.get(handle)
    }

    #[inline]
    pub fn contains(&self, handle: RgResourceHandle) -> bool {
        self.entries.contains_key(handle)
    }

    pub fn image(&self, handle: RgResourceHandle) -> Option<vk::Image> {
        match self.entries.get(handle)? {
            RgPhysicalResource::Image { image, .. } => Some(*image),
            RgPhysicalResource::Buffer { .. } => None,
        }
    }

    pub fn buffer(&self, handle: RgResourceHandle) -> Option<vk::Buffer> {
        match self.entries.get(handle)? {
            RgPhysicalResource::Buffer { buffer, .. } => Some(*buffer),
            RgPhysicalResource::Image { .. } => None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 销毁所有非 external 的物理资源并清空缓存，返回销毁的数量
    pub fn destroy_all(&mut self, device: &dyn GfxDevice) -> usize {
        let mut destroyed = 0;
        for (_, resource) in self.entries.drain() {
            match resource {
                RgPhysicalResource::Image {
                    image, external: false, ..
                } => device.destroy_image(image),
                RgPhysicalResource::Buffer {
                    buffer, external: false, ..
                } => device.destroy_buffer(buffer),
                _ => continue,
            }
            destroyed += 1;
        }
        destroyed
    }
}
