use ash::vk;

use crate::gfx::error::GfxResult;

/// 可呈现的 swapchain
///
/// `acquire_next_image` 之后 `current_image` 才有效。
pub trait GfxSwapchain: Send {
    fn handle(&self) -> vk::SwapchainKHR;

    /// 获取下一张可用的 image，image 可用时 `signal_semaphore` 会被 signal
    ///
    /// swapchain 过期时返回 `GfxError::SwapchainOutOfDate`
    fn acquire_next_image(&mut self, signal_semaphore: vk::Semaphore) -> GfxResult<u32>;

    fn current_image_index(&self) -> u32;
    fn current_image(&self) -> vk::Image;

    fn extent(&self) -> vk::Extent2D;
    fn format(&self) -> vk::Format;

    #[inline]
    fn width(&self) -> u32 {
        self.extent().width
    }
    #[inline]
    fn height(&self) -> u32 {
        self.extent().height
    }
}
