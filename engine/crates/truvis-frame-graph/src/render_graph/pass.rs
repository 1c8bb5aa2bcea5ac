//! Pass 定义和声明接口
//!
//! `RgPassBuilder` 用于声明 pass 读写的资源，声明会同时：
//! - 累积资源的 usage 和 access
//! - 把 pass 登记到资源的 reading/writing 列表
//! - 记录 pass 对该资源要求的状态（同一资源以最后一次声明为准）

use ash::vk;
use indexmap::IndexMap;

use crate::gfx::{QueueType, ResourceState};
use crate::render_graph::handle::{RgPassHandle, RgResourceHandle};
use crate::render_graph::pass_context::RgPassRecorder;
use crate::render_graph::physical_cache::{RgPhysicalCache, RgPhysicalResource};
use crate::render_graph::resource::{
    RgExternalResource, RgPassBufferInfo, RgPassImageInfo, RgResource, RgResourceKind,
};
use crate::render_graph::resource_registry::RgResourceRegistry;

/// pass 的录制回调
///
/// 只能通过 `RgPassRecorder` 录制 bind/draw/dispatch/copy，barrier 和 rendering 由 graph 负责。
pub type RgRecordCallback = Box<dyn Fn(&mut RgPassRecorder<'_>) + Send + Sync>;

/// 渲染图中的一个 pass
pub struct RgRenderPass {
    pub(crate) name: String,
    pub(crate) handle: RgPassHandle,
    pub(crate) queue_type: QueueType,

    pub(crate) color_outputs: Vec<RgResourceHandle>,
    pub(crate) depth_output: Option<RgResourceHandle>,
    pub(crate) texture_inputs: Vec<RgResourceHandle>,
    pub(crate) texture_outputs: Vec<RgResourceHandle>,
    pub(crate) storage_buffer_inputs: Vec<RgResourceHandle>,
    pub(crate) storage_buffer_outputs: Vec<RgResourceHandle>,
    pub(crate) uniform_buffer_inputs: Vec<RgResourceHandle>,

    /// 该 pass 对每个资源要求的状态，按声明顺序
    pub(crate) resource_states: IndexMap<RgResourceHandle, ResourceState>,

    pub(crate) record_callback: Option<RgRecordCallback>,
}

// new & init
impl RgRenderPass {
    pub(crate) fn new(name: impl Into<String>, handle: RgPassHandle, queue_type: QueueType) -> Self {
        Self {
            name: name.into(),
            handle,
            queue_type,
            color_outputs: Vec::new(),
            depth_output: None,
            texture_inputs: Vec::new(),
            texture_outputs: Vec::new(),
            storage_buffer_inputs: Vec::new(),
            storage_buffer_outputs: Vec::new(),
            uniform_buffer_inputs: Vec::new(),
            resource_states: IndexMap::new(),
            record_callback: None,
        }
    }
}

// getters
impl RgRenderPass {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn handle(&self) -> RgPassHandle {
        self.handle
    }

    #[inline]
    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    #[inline]
    pub fn color_outputs(&self) -> &[RgResourceHandle] {
        &self.color_outputs
    }

    #[inline]
    pub fn depth_output(&self) -> Option<RgResourceHandle> {
        self.depth_output
    }

    #[inline]
    pub fn texture_inputs(&self) -> &[RgResourceHandle] {
        &self.texture_inputs
    }

    #[inline]
    pub fn texture_outputs(&self) -> &[RgResourceHandle] {
        &self.texture_outputs
    }

    #[inline]
    pub fn storage_buffer_inputs(&self) -> &[RgResourceHandle] {
        &self.storage_buffer_inputs
    }

    #[inline]
    pub fn storage_buffer_outputs(&self) -> &[RgResourceHandle] {
        &self.storage_buffer_outputs
    }

    #[inline]
    pub fn uniform_buffer_inputs(&self) -> &[RgResourceHandle] {
        &self.uniform_buffer_inputs
    }

    #[inline]
    pub fn required_state(&self, handle: RgResourceHandle) -> Option<ResourceState> {
        self.resource_states.get(&handle).copied()
    }

    #[inline]
    pub fn resource_states(&self) -> impl Iterator<Item = (RgResourceHandle, ResourceState)> + '_ {
        self.resource_states.iter().map(|(handle, state)| (*handle, *state))
    }

    #[inline]
    pub fn has_record_callback(&self) -> bool {
        self.record_callback.is_some()
    }

    /// pass 是否写入该资源
    pub fn writes(&self, handle: RgResourceHandle) -> bool {
        self.color_outputs.contains(&handle)
            || self.depth_output == Some(handle)
            || self.texture_outputs.contains(&handle)
            || self.storage_buffer_outputs.contains(&handle)
    }

    /// pass 是否读取该资源
    pub fn reads(&self, handle: RgResourceHandle) -> bool {
        self.texture_inputs.contains(&handle)
            || self.storage_buffer_inputs.contains(&handle)
            || self.uniform_buffer_inputs.contains(&handle)
    }
}

/// 一次声明对资源的影响
struct RgUsageDecl {
    kind: RgResourceKind,
    image_usage: vk::ImageUsageFlags,
    buffer_usage: vk::BufferUsageFlags,
    access: vk::AccessFlags2,
    state: ResourceState,
    is_write: bool,
}

impl RgUsageDecl {
    fn image(usage: vk::ImageUsageFlags, access: vk::AccessFlags2, state: ResourceState, is_write: bool) -> Self {
        Self {
            kind: RgResourceKind::Image,
            image_usage: usage,
            buffer_usage: vk::BufferUsageFlags::empty(),
            access,
            state,
            is_write,
        }
    }

    fn buffer(usage: vk::BufferUsageFlags, access: vk::AccessFlags2, state: ResourceState, is_write: bool) -> Self {
        Self {
            kind: RgResourceKind::Buffer,
            image_usage: vk::ImageUsageFlags::empty(),
            buffer_usage: usage,
            access,
            state,
            is_write,
        }
    }
}

/// pass 的声明接口，由 `RenderGraph::create_pass` 返回
pub struct RgPassBuilder<'a> {
    pub(crate) pass: &'a mut RgRenderPass,
    pub(crate) registry: &'a mut RgResourceRegistry,
    pub(crate) cache: &'a mut RgPhysicalCache,
}

// inputs
impl RgPassBuilder<'_> {
    /// 作为 sampled image 读取
    pub fn add_texture_input(&mut self, name: &str, external: Option<RgExternalResource>) -> RgResourceHandle {
        let handle = self.declare(
            name,
            RgUsageDecl::image(
                vk::ImageUsageFlags::SAMPLED,
                vk::AccessFlags2::SHADER_SAMPLED_READ,
                ResourceState::ShaderResource,
                false,
            ),
            external,
        );
        push_unique(&mut self.pass.texture_inputs, handle);
        handle
    }

    /// 作为 storage buffer 读取
    pub fn add_storage_buffer_input(&mut self, name: &str, external: Option<RgExternalResource>) -> RgResourceHandle {
        let handle = self.declare(
            name,
            RgUsageDecl::buffer(
                vk::BufferUsageFlags::STORAGE_BUFFER,
                vk::AccessFlags2::SHADER_STORAGE_READ,
                ResourceState::UnorderedAccess,
                false,
            ),
            external,
        );
        push_unique(&mut self.pass.storage_buffer_inputs, handle);
        handle
    }

    pub fn add_uniform_buffer_input(&mut self, name: &str, external: Option<RgExternalResource>) -> RgResourceHandle {
        let handle = self.declare(
            name,
            RgUsageDecl::buffer(
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::AccessFlags2::UNIFORM_READ,
                ResourceState::UniformBuffer,
                false,
            ),
            external,
        );
        push_unique(&mut self.pass.uniform_buffer_inputs, handle);
        handle
    }
}

// outputs
impl RgPassBuilder<'_> {
    /// 作为 storage buffer 写入
    pub fn add_buffer_output(
        &mut self,
        name: &str,
        info: Option<RgPassBufferInfo>,
        external: Option<RgExternalResource>,
    ) -> RgResourceHandle {
        let handle = self.declare(
            name,
            RgUsageDecl::buffer(
                vk::BufferUsageFlags::STORAGE_BUFFER,
                vk::AccessFlags2::SHADER_STORAGE_WRITE,
                ResourceState::UnorderedAccess,
                true,
            ),
            external,
        );
        if let Some(info) = info
            && let Some(resource) = self.registry.get_mut(handle)
        {
            resource.buffer_info = Some(info);
        }
        push_unique(&mut self.pass.storage_buffer_outputs, handle);
        handle
    }

    /// 作为 storage image 写入
    pub fn add_texture_output(
        &mut self,
        name: &str,
        info: Option<RgPassImageInfo>,
        external: Option<RgExternalResource>,
    ) -> RgResourceHandle {
        let handle = self.declare(
            name,
            RgUsageDecl::image(
                vk::ImageUsageFlags::STORAGE,
                vk::AccessFlags2::SHADER_STORAGE_WRITE,
                ResourceState::UnorderedAccess,
                true,
            ),
            external,
        );
        self.set_image_info(handle, info);
        push_unique(&mut self.pass.texture_outputs, handle);
        handle
    }

    pub fn set_color_output(
        &mut self,
        name: &str,
        info: Option<RgPassImageInfo>,
        external: Option<RgExternalResource>,
    ) -> RgResourceHandle {
        let handle = self.declare(
            name,
            RgUsageDecl::image(
                vk::ImageUsageFlags::COLOR_ATTACHMENT,
                vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                ResourceState::RenderTarget,
                true,
            ),
            external,
        );
        self.set_image_info(handle, info);
        push_unique(&mut self.pass.color_outputs, handle);
        handle
    }

    /// 每个 pass 只有一个 depth 输出，重复调用会替换之前的声明
    pub fn set_depth_stencil_output(
        &mut self,
        name: &str,
        info: Option<RgPassImageInfo>,
        external: Option<RgExternalResource>,
    ) -> RgResourceHandle {
        let handle = self.declare(
            name,
            RgUsageDecl::image(
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
                ResourceState::DepthStencil,
                true,
            ),
            external,
        );
        self.set_image_info(handle, info);
        self.pass.depth_output = Some(handle);
        handle
    }
}

// record
impl RgPassBuilder<'_> {
    /// 设置 pass 的录制回调
    pub fn record_execute<F>(&mut self, callback: F)
    where
        F: Fn(&mut RgPassRecorder<'_>) + Send + Sync + 'static,
    {
        self.pass.record_callback = Some(Box::new(callback));
    }

    #[inline]
    pub fn handle(&self) -> RgPassHandle {
        self.pass.handle
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.pass.name
    }
}

// tools
impl RgPassBuilder<'_> {
    fn declare(&mut self, name: &str, decl: RgUsageDecl, external: Option<RgExternalResource>) -> RgResourceHandle {
        let handle = self.registry.resolve_or_create(name, decl.kind);
        let pass = self.pass.handle;

        if let Some(resource) = self.registry.get_mut(handle) {
            resource.image_usage |= decl.image_usage;
            resource.buffer_usage |= decl.buffer_usage;
            resource.access |= decl.access;
            if decl.is_write {
                resource.add_writer(pass);
            } else {
                resource.add_reader(pass);
            }
        }

        self.pass.resource_states.insert(handle, decl.state);

        if let Some(external) = external {
            bind_external(self.registry, self.cache, handle, external);
        }
        handle
    }

    fn set_image_info(&mut self, handle: RgResourceHandle, info: Option<RgPassImageInfo>) {
        if let Some(info) = info
            && let Some(resource) = self.registry.get_mut(handle)
        {
            resource.image_info = Some(info);
        }
    }
}

fn push_unique(list: &mut Vec<RgResourceHandle>, handle: RgResourceHandle) {
    if !list.contains(&handle) {
        list.push(handle);
    }
}

/// 把调用方持有的 GPU 对象绑定到虚拟资源上
///
/// 重复绑定同一个对象不做任何事。
///
/// # Panics
/// - 对象类型与资源类型不一致
/// - 资源已经绑定了另一个物理资源
pub(crate) fn bind_external(
    registry: &mut RgResourceRegistry,
    cache: &mut RgPhysicalCache,
    handle: RgResourceHandle,
    external: RgExternalResource,
) {
    let Some(resource) = registry.get_mut(handle) else {
        return;
    };
    assert_eq!(
        resource.kind,
        external.kind(),
        "RenderGraph: cannot import a {:?} as `{}`",
        external.kind(),
        resource.name
    );

    if let Some(existing) = cache.get(handle) {
        let same_object = match (*existing, external) {
            (RgPhysicalResource::Image { image, .. }, RgExternalResource::Image { image: new, .. }) => image == new,
            (RgPhysicalResource::Buffer { buffer, .. }, RgExternalResource::Buffer { buffer: new, .. }) => {
                buffer == new
            }
            _ => false,
        };
        assert!(
            existing.is_external() && same_object,
            "RenderGraph: resource `{}` is already bound to another physical resource",
            resource.name
        );
        return;
    }

    let physical = external_physical(resource, &external);

    match external {
        RgExternalResource::Image { info, .. } => resource.image_info = Some(info),
        RgExternalResource::Buffer { info, .. } => resource.buffer_info = Some(info),
    }
    resource.external = true;
    resource.current_state = external.initial_state();
    cache.insert(handle, physical);
}

fn external_physical(resource: &RgResource, external: &RgExternalResource) -> RgPhysicalResource {
    match *external {
        RgExternalResource::Image { image, info, .. } => RgPhysicalResource::Image {
            image,
            extent: info.extent,
            format: info.format,
            usage: resource.image_usage,
            external: true,
        },
        RgExternalResource::Buffer { buffer, info, .. } => RgPhysicalResource::Buffer {
            buffer,
            size: info.size,
            usage: resource.buffer_usage,
            external: true,
        },
    }
}
