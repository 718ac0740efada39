//! The null backend: accepts every command and produces nothing. Useful for
//! dedicated servers and for exercising the recording side without any
//! device. Resource bookkeeping is real so statistics and leak detection
//! behave exactly as on a live backend.

use render_backend_traits::traits::{CommandReceiver, RenderBackend};
use render_backend_traits::types::{
    FramebufferDescriptor, ProgramDescriptor, ResourceStatistics, Texture2dArrayDescriptor,
    Texture2dDescriptor, VertexArrayDescriptor,
};
use render_types::command_buffer::CommandBuffer;
use render_types::pipeline_state::PipelineStateDescriptor;
use render_types::root_signature::RootSignatureDescriptor;
use render_types::sampler::SamplerStateDescriptor;
use render_types::types::{
    BufferUsage, Capabilities, ClearFlags, ColorRgba, IndexBufferFormat, MapFlags,
    MappedSubresource, MapType, NativeWindowHandle, PrimitiveTopology, RendererId, ResourceId,
    ScissorRectangle, ShaderLanguage, TextureFormat, Viewport,
};

use crate::backends::common::BackendCore;

pub const NULL_BACKEND_NAME: &str = "Null";

fn null_capabilities() -> Capabilities {
    Capabilities {
        maximum_number_of_viewports: 16,
        maximum_number_of_simultaneous_render_targets: 8,
        maximum_texture_dimension: 16384,
        maximum_number_of_2d_texture_array_slices: 2048,
        maximum_uniform_buffer_size: 64 * 1024,
        maximum_texture_buffer_size: 128 * 1024 * 1024,
        maximum_indirect_buffer_size: 64 * 1024,
        maximum_number_of_multisamples: 8,
        individual_uniforms: true,
        instanced_arrays: true,
        draw_instanced: true,
        base_vertex: true,
        native_multi_threading: false,
        vertex_shader: true,
        fragment_shader: true,
        geometry_shader: true,
        tessellation_shaders: true,
        maximum_number_of_patch_vertices: 32,
        maximum_number_of_gs_output_vertices: 1024,
    }
}

#[derive(Debug)]
pub struct NullBackend {
    core: BackendCore,
}

impl NullBackend {
    pub fn new(renderer_id: RendererId, debug_enabled: bool) -> Self {
        Self {
            core: BackendCore::new(
                renderer_id,
                NULL_BACKEND_NAME,
                null_capabilities(),
                vec![ShaderLanguage::Null],
                debug_enabled,
            ),
        }
    }
}

impl CommandReceiver for NullBackend {
    fn copy_uniform_buffer_data(&mut self, _uniform_buffer: ResourceId, _data: &[u8]) {}
    fn copy_texture_buffer_data(&mut self, _texture_buffer: ResourceId, _data: &[u8]) {}
    fn set_graphics_root_signature(&mut self, _root_signature: ResourceId) {}
    fn set_graphics_root_descriptor_table(
        &mut self,
        _root_parameter_index: u32,
        _resource: ResourceId,
    ) {
    }
    fn set_pipeline_state(&mut self, _pipeline_state: ResourceId) {}
    fn ia_set_vertex_array(&mut self, _vertex_array: ResourceId) {}
    fn ia_set_primitive_topology(&mut self, _primitive_topology: PrimitiveTopology) {}
    fn rs_set_viewports(&mut self, _viewports: &[Viewport]) {}
    fn rs_set_scissor_rectangles(&mut self, _scissor_rectangles: &[ScissorRectangle]) {}
    fn om_set_render_target(&mut self, _render_target: Option<ResourceId>) {}
    fn clear(&mut self, _flags: ClearFlags, _color: ColorRgba, _z: f32, _stencil: u32) {}
    fn draw_emulated(&mut self, _emulation_data: &[u8], _offset: u32, _number_of_draws: u32) {}
    fn draw_indexed_emulated(&mut self, _emulation_data: &[u8], _offset: u32, _number_of_draws: u32) {
    }
    fn draw_indirect(&mut self, _indirect_buffer: ResourceId, _offset: u32, _number_of_draws: u32) {}
    fn draw_indexed_indirect(
        &mut self,
        _indirect_buffer: ResourceId,
        _offset: u32,
        _number_of_draws: u32,
    ) {
    }
    fn resolve_multisample_framebuffer(
        &mut self,
        _destination_render_target: ResourceId,
        _source_multisample_framebuffer: ResourceId,
    ) {
    }
    fn copy_resource(&mut self, _destination_resource: ResourceId, _source_resource: ResourceId) {}
    fn set_debug_marker(&mut self, _name: &str) {}
    fn begin_debug_event(&mut self, _name: &str) {}
    fn end_debug_event(&mut self) {}
}

impl RenderBackend for NullBackend {
    fn name(&self) -> &'static str {
        NULL_BACKEND_NAME
    }

    fn renderer_id(&self) -> RendererId {
        self.core.registry().owner()
    }

    fn is_initialized(&self) -> bool {
        self.core.is_initialized()
    }

    fn is_debug_enabled(&self) -> bool {
        self.core.is_debug_enabled()
    }

    fn shader_languages(&self) -> &[ShaderLanguage] {
        self.core.shader_languages()
    }

    fn capabilities(&self) -> &Capabilities {
        self.core.capabilities()
    }

    fn statistics(&self) -> ResourceStatistics {
        self.core.statistics()
    }

    fn main_swap_chain(&self) -> Option<ResourceId> {
        self.core.main_swap_chain()
    }

    fn create_swap_chain(&mut self, native_window_handle: NativeWindowHandle) -> Option<ResourceId> {
        self.core.create_swap_chain(native_window_handle)
    }

    fn create_framebuffer(&mut self, descriptor: &FramebufferDescriptor) -> Option<ResourceId> {
        self.core.create_framebuffer(descriptor)
    }

    fn create_index_buffer(
        &mut self,
        format: IndexBufferFormat,
        number_of_bytes: usize,
        usage: BufferUsage,
        data: Option<&[u8]>,
    ) -> Option<ResourceId> {
        self.core
            .create_index_buffer(format, number_of_bytes, usage, data)
    }

    fn create_vertex_buffer(
        &mut self,
        number_of_bytes: usize,
        usage: BufferUsage,
        data: Option<&[u8]>,
    ) -> Option<ResourceId> {
        self.core.create_vertex_buffer(number_of_bytes, usage, data)
    }

    fn create_uniform_buffer(
        &mut self,
        number_of_bytes: usize,
        usage: BufferUsage,
        data: Option<&[u8]>,
    ) -> Option<ResourceId> {
        self.core.create_uniform_buffer(number_of_bytes, usage, data)
    }

    fn create_texture_buffer(
        &mut self,
        number_of_bytes: usize,
        texture_format: TextureFormat,
        usage: BufferUsage,
        data: Option<&[u8]>,
    ) -> Option<ResourceId> {
        self.core
            .create_texture_buffer(number_of_bytes, texture_format, usage, data)
    }

    fn create_indirect_buffer(
        &mut self,
        number_of_bytes: usize,
        usage: BufferUsage,
        emulation_data: Option<&[u8]>,
    ) -> Option<ResourceId> {
        self.core
            .create_indirect_buffer(number_of_bytes, usage, emulation_data)
    }

    fn create_texture_2d(
        &mut self,
        descriptor: &Texture2dDescriptor,
        data: Option<&[u8]>,
    ) -> Option<ResourceId> {
        self.core.create_texture_2d(descriptor, data)
    }

    fn create_texture_2d_array(
        &mut self,
        descriptor: &Texture2dArrayDescriptor,
        data: Option<&[u8]>,
    ) -> Option<ResourceId> {
        self.core.create_texture_2d_array(descriptor, data)
    }

    fn create_root_signature(&mut self, descriptor: &RootSignatureDescriptor) -> Option<ResourceId> {
        self.core.create_root_signature(descriptor)
    }

    fn create_pipeline_state(&mut self, descriptor: &PipelineStateDescriptor) -> Option<ResourceId> {
        self.core.create_pipeline_state(descriptor)
    }

    fn create_sampler_state(&mut self, descriptor: &SamplerStateDescriptor) -> Option<ResourceId> {
        self.core.create_sampler_state(descriptor)
    }

    fn create_program(&mut self, descriptor: &ProgramDescriptor) -> Option<ResourceId> {
        self.core.create_program(descriptor)
    }

    fn create_vertex_array(&mut self, descriptor: &VertexArrayDescriptor) -> Option<ResourceId> {
        self.core.create_vertex_array(descriptor)
    }

    fn retain_resource(&mut self, resource: ResourceId) {
        if let Err(error) = self.core.registry_mut().retain(resource) {
            self.core.registry().log_command_error("retain", &error);
        }
    }

    fn release_resource(&mut self, resource: ResourceId) {
        if let Err(error) = self.core.registry_mut().release(resource) {
            self.core.registry().log_command_error("release", &error);
        }
    }

    fn set_resource_debug_name(&mut self, resource: ResourceId, name: &str) {
        if let Err(error) = self.core.registry_mut().set_debug_name(resource, name) {
            self.core
                .registry()
                .log_command_error("set_debug_name", &error);
        }
    }

    fn internal_resource_handle(&self, resource: ResourceId) -> Option<u64> {
        self.core.internal_resource_handle(resource)
    }

    fn render_target_size(&self, render_target: ResourceId) -> Option<(u32, u32)> {
        self.core.render_target_size(render_target)
    }

    fn map(
        &mut self,
        _resource: ResourceId,
        _subresource: u32,
        _map_type: MapType,
        _flags: MapFlags,
    ) -> Option<MappedSubresource> {
        // Nothing to map; callers are required to handle the null mapping.
        None
    }

    fn unmap(&mut self, _resource: ResourceId, _subresource: u32) {}

    fn begin_scene(&mut self) -> bool {
        self.core.begin_scene()
    }

    fn submit_command_buffer(&mut self, _command_buffer: &CommandBuffer) {
        // All packets are accepted and discarded.
    }

    fn end_scene(&mut self) {
        self.core.end_scene()
    }

    fn flush(&mut self) {}

    fn finish(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_chain_lifecycle_is_counted() {
        let mut backend = NullBackend::new(RendererId(900), false);
        let swap_chain = backend.create_swap_chain(1).unwrap();
        assert_eq!(backend.statistics().number_of_current_resources_total(), 1);
        assert_eq!(backend.main_swap_chain(), Some(swap_chain));
        backend.release_resource(swap_chain);
        assert_eq!(backend.statistics().number_of_current_resources_total(), 0);
        assert_eq!(backend.main_swap_chain(), None);
    }

    #[test]
    fn map_returns_the_null_mapping() {
        let mut backend = NullBackend::new(RendererId(901), false);
        let buffer = backend
            .create_uniform_buffer(64, BufferUsage::DynamicDraw, None)
            .unwrap();
        assert!(backend
            .map(buffer, 0, MapType::WriteDiscard, MapFlags::empty())
            .is_none());
        backend.release_resource(buffer);
    }
}
