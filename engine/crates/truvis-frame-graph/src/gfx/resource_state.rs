//! 资源状态定义
//!
//! 将抽象的资源使用方式映射到 Vulkan 的 pipeline stage、access mask 和 image layout。

use ash::vk;

/// 资源在 GPU 上的使用状态
///
/// barrier 的生成完全依赖于状态之间的比较：状态相同则不需要 barrier。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// 未定义状态（初始状态或不关心内容）
    #[default]
    Undefined,
    VertexBuffer,
    UniformBuffer,
    IndexBuffer,
    /// 颜色附件输出
    RenderTarget,
    /// storage image / storage buffer 读写
    UnorderedAccess,
    DepthStencil,
    /// 着色器只读采样
    ShaderResource,
    StreamOut,
    IndirectArgument,
    CopySource,
    CopyDestination,
    /// 呈现（swapchain image）
    Present,
    /// 通用布局（可用于任何操作，但性能可能不是最优）
    General,
    AccelStructRead,
    AccelStructWrite,
}

impl ResourceState {
    /// 写操作的 access flags
    const WRITE_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
        vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw()
            | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
            | vk::AccessFlags2::MEMORY_WRITE.as_raw()
            | vk::AccessFlags2::TRANSFORM_FEEDBACK_WRITE_EXT.as_raw()
            | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR.as_raw(),
    );

    /// Pipeline stage
    pub fn stage(self) -> vk::PipelineStageFlags2 {
        match self {
            Self::Undefined => vk::PipelineStageFlags2::TOP_OF_PIPE,
            Self::VertexBuffer => vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT,
            Self::IndexBuffer => vk::PipelineStageFlags2::INDEX_INPUT,
            Self::UniformBuffer => {
                vk::PipelineStageFlags2::VERTEX_SHADER
                    | vk::PipelineStageFlags2::FRAGMENT_SHADER
                    | vk::PipelineStageFlags2::COMPUTE_SHADER
            }
            Self::RenderTarget => vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            Self::UnorderedAccess => {
                vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER
            }
            Self::DepthStencil => {
                vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS
            }
            Self::ShaderResource => {
                vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER
            }
            Self::StreamOut => vk::PipelineStageFlags2::TRANSFORM_FEEDBACK_EXT,
            Self::IndirectArgument => vk::PipelineStageFlags2::DRAW_INDIRECT,
            Self::CopySource | Self::CopyDestination => vk::PipelineStageFlags2::TRANSFER,
            Self::Present => vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            Self::General => vk::PipelineStageFlags2::ALL_COMMANDS,
            Self::AccelStructRead => {
                vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR
                    | vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR
            }
            Self::AccelStructWrite => vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
        }
    }

    /// Access mask
    pub fn access(self) -> vk::AccessFlags2 {
        match self {
            Self::Undefined | Self::Present => vk::AccessFlags2::NONE,
            Self::VertexBuffer => vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
            Self::IndexBuffer => vk::AccessFlags2::INDEX_READ,
            Self::UniformBuffer => vk::AccessFlags2::UNIFORM_READ,
            Self::RenderTarget => vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            Self::UnorderedAccess => vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE,
            Self::DepthStencil => {
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE
            }
            Self::ShaderResource => vk::AccessFlags2::SHADER_SAMPLED_READ,
            Self::StreamOut => vk::AccessFlags2::TRANSFORM_FEEDBACK_WRITE_EXT,
            Self::IndirectArgument => vk::AccessFlags2::INDIRECT_COMMAND_READ,
            Self::CopySource => vk::AccessFlags2::TRANSFER_READ,
            Self::CopyDestination => vk::AccessFlags2::TRANSFER_WRITE,
            Self::General => vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
            Self::AccelStructRead => vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR,
            Self::AccelStructWrite => vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
        }
    }

    /// Image layout，buffer 状态没有 layout，统一返回 UNDEFINED
    pub fn layout(self) -> vk::ImageLayout {
        match self {
            Self::RenderTarget => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Self::UnorderedAccess | Self::General => vk::ImageLayout::GENERAL,
            Self::DepthStencil => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            Self::ShaderResource => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Self::CopySource => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            Self::CopyDestination => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Self::Present => vk::ImageLayout::PRESENT_SRC_KHR,
            _ => vk::ImageLayout::UNDEFINED,
        }
    }

    /// 检查是否为写操作
    #[inline]
    pub fn is_write(self) -> bool {
        self.access().intersects(Self::WRITE_ACCESS)
    }

    /// 获取用于 barrier src 的 access（去掉读操作）
    #[inline]
    pub fn src_access(self) -> vk::AccessFlags2 {
        self.access()
            & !(vk::AccessFlags2::SHADER_SAMPLED_READ
                | vk::AccessFlags2::SHADER_STORAGE_READ
                | vk::AccessFlags2::TRANSFER_READ
                | vk::AccessFlags2::MEMORY_READ
                | vk::AccessFlags2::UNIFORM_READ
                | vk::AccessFlags2::COLOR_ATTACHMENT_READ
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ)
    }
}

/// 从格式推断 aspect
pub fn infer_image_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_states() {
        assert!(ResourceState::RenderTarget.is_write());
        assert!(ResourceState::UnorderedAccess.is_write());
        assert!(ResourceState::CopyDestination.is_write());
        assert!(!ResourceState::ShaderResource.is_write());
        assert!(!ResourceState::Present.is_write());
        assert!(!ResourceState::Undefined.is_write());
    }

    #[test]
    fn test_src_access_drops_reads() {
        let src = ResourceState::RenderTarget.src_access();
        assert_eq!(src, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(ResourceState::ShaderResource.src_access(), vk::AccessFlags2::NONE);
    }

    #[test]
    fn test_layouts() {
        assert_eq!(ResourceState::RenderTarget.layout(), vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(ResourceState::ShaderResource.layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(ResourceState::UniformBuffer.layout(), vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn test_infer_aspect() {
        assert_eq!(infer_image_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            infer_image_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(infer_image_aspect(vk::Format::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
    }
}
