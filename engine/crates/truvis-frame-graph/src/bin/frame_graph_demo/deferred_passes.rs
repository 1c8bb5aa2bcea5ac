use ash::vk;
use truvis_frame_graph::render_graph::{
    QueueType, RenderGraph, RgExternalResource, RgPassBufferInfo, RgPassImageInfo, ResourceState,
};

pub const SHADOW_MAP_SIZE: u32 = 2048;
pub const MAX_LIGHTS: u64 = 1024;
pub const FINAL_OUTPUT: &str = "final";

/// 一个简化的延迟渲染管线
///
/// shadow 与 gbuffer 互不依赖，light culling 在 compute queue 上执行，
/// lighting 等待三者完成，post 写出最终结果。
pub fn declare_passes(graph: &mut RenderGraph, extent: vk::Extent2D, camera: vk::Buffer) {
    let color_info = RgPassImageInfo::new(extent.width, extent.height, vk::Format::R16G16B16A16_SFLOAT);
    let normal_info = RgPassImageInfo::new(extent.width, extent.height, vk::Format::R8G8B8A8_SNORM);
    let depth_info = RgPassImageInfo::new(extent.width, extent.height, vk::Format::D32_SFLOAT);
    let shadow_info = RgPassImageInfo::new(SHADOW_MAP_SIZE, SHADOW_MAP_SIZE, vk::Format::D32_SFLOAT);
    let final_info = RgPassImageInfo::new(extent.width, extent.height, vk::Format::R8G8B8A8_UNORM);

    graph.import_resource(
        "camera",
        RgExternalResource::buffer(camera, 256).with_state(ResourceState::UniformBuffer),
    );

    let mut shadow = graph.create_pass("shadow", QueueType::Graphics);
    shadow.add_uniform_buffer_input("camera", None);
    shadow.set_depth_stencil_output("shadow_map", Some(shadow_info), None);
    shadow.record_execute(|recorder| {
        recorder.set_full_viewport();
        recorder.draw(36, 64, 0, 0);
    });

    let mut gbuffer = graph.create_pass("gbuffer", QueueType::Graphics);
    gbuffer.add_uniform_buffer_input("camera", None);
    gbuffer.set_color_output("gbuffer_albedo", Some(color_info), None);
    gbuffer.set_color_output("gbuffer_normal", Some(normal_info), None);
    gbuffer.set_depth_stencil_output("scene_depth", Some(depth_info), None);
    gbuffer.record_execute(|recorder| {
        recorder.set_full_viewport();
        recorder.draw(36, 64, 0, 0);
    });

    let mut light_culling = graph.create_pass("light_culling", QueueType::Compute);
    light_culling.add_uniform_buffer_input("camera", None);
    light_culling.add_buffer_output("light_list", Some(RgPassBufferInfo::new(MAX_LIGHTS * 16)), None);
    light_culling.record_execute(|recorder| recorder.dispatch([(MAX_LIGHTS / 64) as u32, 1, 1]));

    let mut lighting = graph.create_pass("lighting", QueueType::Graphics);
    lighting.add_texture_input("shadow_map", None);
    lighting.add_texture_input("gbuffer_albedo", None);
    lighting.add_texture_input("gbuffer_normal", None);
    lighting.add_texture_input("scene_depth", None);
    lighting.add_storage_buffer_input("light_list", None);
    lighting.set_color_output("lit", Some(color_info), None);
    lighting.record_execute(|recorder| {
        recorder.set_full_viewport();
        recorder.draw(3, 1, 0, 0);
    });

    let mut post = graph.create_pass("post", QueueType::Graphics);
    post.add_texture_input("lit", None);
    post.add_texture_output(FINAL_OUTPUT, Some(final_info), None);
    post.record_execute(|recorder| {
        let extent = recorder.render_extent();
        recorder.dispatch([extent.width.div_ceil(8), extent.height.div_ceil(8), 1]);
    });
}
