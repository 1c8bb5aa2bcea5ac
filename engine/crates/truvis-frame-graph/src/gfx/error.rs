use ash::vk;

pub type GfxResult<T> = Result<T, GfxError>;

/// Gfx 层调用失败的原因
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GfxError {
    #[error("out of host memory")]
    OutOfHostMemory,
    #[error("out of device memory")]
    OutOfDeviceMemory,
    #[error("GPU device lost")]
    DeviceLost,
    #[error("swapchain out of date, needs recreation")]
    SwapchainOutOfDate,
    #[error("surface lost, needs recreation")]
    SurfaceLost,
    #[error("failed to create resource `{0}`")]
    ResourceCreation(String),
    #[error("vulkan error: {0:?}")]
    Vk(vk::Result),
    #[error("internal gfx error: {0}")]
    Internal(String),
}

impl GfxError {
    /// device lost 之后无法恢复
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceLost)
    }

    /// 重建 swapchain 之后可以重新执行当前帧
    #[inline]
    pub fn is_swapchain_recoverable(&self) -> bool {
        matches!(self, Self::SwapchainOutOfDate | Self::SurfaceLost)
    }
}

impl From<vk::Result> for GfxError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => Self::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => Self::OutOfDeviceMemory,
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::SwapchainOutOfDate,
            vk::Result::ERROR_SURFACE_LOST_KHR => Self::SurfaceLost,
            other => Self::Vk(other),
        }
    }
}
