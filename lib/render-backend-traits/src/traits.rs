use render_types::command_buffer::CommandBuffer;
use render_types::pipeline_state::PipelineStateDescriptor;
use render_types::root_signature::RootSignatureDescriptor;
use render_types::sampler::SamplerStateDescriptor;
use render_types::types::{
    BufferUsage, Capabilities, ClearFlags, ColorRgba, IndexBufferFormat, MapFlags,
    MappedSubresource, MapType, NativeWindowHandle, PrimitiveTopology, RendererId, ResourceId,
    ScissorRectangle, ShaderLanguage, TextureFormat, Viewport,
};

use crate::types::{
    FramebufferDescriptor, ProgramDescriptor, ResourceStatistics, Texture2dArrayDescriptor,
    Texture2dDescriptor, VertexArrayDescriptor,
};

/// Receiver half of the renderer contract: the operations command packets
/// dispatch into. Kept separate from [`RenderBackend`] so submission can be
/// tested against a mock that records calls.
///
/// All coordinates are top-left origin; a backend whose native API counts
/// from the bottom-left flips internally against the current render target
/// height. Per-operation failures (unknown resource, owner mismatch) are
/// absorbed as diagnostics, never propagated.
pub trait CommandReceiver {
    fn copy_uniform_buffer_data(&mut self, uniform_buffer: ResourceId, data: &[u8]);
    fn copy_texture_buffer_data(&mut self, texture_buffer: ResourceId, data: &[u8]);

    fn set_graphics_root_signature(&mut self, root_signature: ResourceId);
    fn set_graphics_root_descriptor_table(&mut self, root_parameter_index: u32, resource: ResourceId);
    fn set_pipeline_state(&mut self, pipeline_state: ResourceId);
    fn ia_set_vertex_array(&mut self, vertex_array: ResourceId);
    fn ia_set_primitive_topology(&mut self, primitive_topology: PrimitiveTopology);
    fn rs_set_viewports(&mut self, viewports: &[Viewport]);
    fn rs_set_scissor_rectangles(&mut self, scissor_rectangles: &[ScissorRectangle]);
    fn om_set_render_target(&mut self, render_target: Option<ResourceId>);

    fn clear(&mut self, flags: ClearFlags, color: ColorRgba, z: f32, stencil: u32);

    /// Walks packed [`DrawInstancedArguments`] records starting at
    /// `offset` bytes into `emulation_data` and issues one draw per record.
    ///
    /// [`DrawInstancedArguments`]: render_types::types::DrawInstancedArguments
    fn draw_emulated(&mut self, emulation_data: &[u8], offset: u32, number_of_draws: u32);
    fn draw_indexed_emulated(&mut self, emulation_data: &[u8], offset: u32, number_of_draws: u32);
    /// Draw sourced from an indirect buffer owned by this renderer; backends
    /// without native indirect draws fall back to walking the buffer's
    /// emulation data.
    fn draw_indirect(&mut self, indirect_buffer: ResourceId, offset: u32, number_of_draws: u32);
    fn draw_indexed_indirect(&mut self, indirect_buffer: ResourceId, offset: u32, number_of_draws: u32);

    fn resolve_multisample_framebuffer(
        &mut self,
        destination_render_target: ResourceId,
        source_multisample_framebuffer: ResourceId,
    );
    fn copy_resource(&mut self, destination_resource: ResourceId, source_resource: ResourceId);

    /// The debug triple may be ignored by release backends.
    fn set_debug_marker(&mut self, name: &str);
    fn begin_debug_event(&mut self, name: &str);
    fn end_debug_event(&mut self);
}

/// The full abstract renderer every backend satisfies: resource factories,
/// the frame bracket and synchronization on top of [`CommandReceiver`].
///
/// Factories return retained handles; a `None` is a null handle, accompanied
/// by a diagnostic. Initialization failure of the whole backend is
/// observable through `is_initialized() == false` (also the device-lost
/// signal).
pub trait RenderBackend: CommandReceiver {
    fn name(&self) -> &'static str;
    fn renderer_id(&self) -> RendererId;
    fn is_initialized(&self) -> bool;
    fn is_debug_enabled(&self) -> bool;
    fn shader_languages(&self) -> &[ShaderLanguage];
    fn capabilities(&self) -> &Capabilities;
    fn statistics(&self) -> ResourceStatistics;
    fn main_swap_chain(&self) -> Option<ResourceId>;

    fn create_swap_chain(&mut self, native_window_handle: NativeWindowHandle) -> Option<ResourceId>;
    fn create_framebuffer(&mut self, descriptor: &FramebufferDescriptor) -> Option<ResourceId>;
    fn create_index_buffer(
        &mut self,
        format: IndexBufferFormat,
        number_of_bytes: usize,
        usage: BufferUsage,
        data: Option<&[u8]>,
    ) -> Option<ResourceId>;
    fn create_vertex_buffer(
        &mut self,
        number_of_bytes: usize,
        usage: BufferUsage,
        data: Option<&[u8]>,
    ) -> Option<ResourceId>;
    fn create_uniform_buffer(
        &mut self,
        number_of_bytes: usize,
        usage: BufferUsage,
        data: Option<&[u8]>,
    ) -> Option<ResourceId>;
    fn create_texture_buffer(
        &mut self,
        number_of_bytes: usize,
        texture_format: TextureFormat,
        usage: BufferUsage,
        data: Option<&[u8]>,
    ) -> Option<ResourceId>;
    /// `emulation_data` carries packed draw-argument records for backends
    /// that execute indirect draws on the CPU.
    fn create_indirect_buffer(
        &mut self,
        number_of_bytes: usize,
        usage: BufferUsage,
        emulation_data: Option<&[u8]>,
    ) -> Option<ResourceId>;
    fn create_texture_2d(
        &mut self,
        descriptor: &Texture2dDescriptor,
        data: Option<&[u8]>,
    ) -> Option<ResourceId>;
    fn create_texture_2d_array(
        &mut self,
        descriptor: &Texture2dArrayDescriptor,
        data: Option<&[u8]>,
    ) -> Option<ResourceId>;
    fn create_root_signature(&mut self, descriptor: &RootSignatureDescriptor) -> Option<ResourceId>;
    fn create_pipeline_state(&mut self, descriptor: &PipelineStateDescriptor) -> Option<ResourceId>;
    fn create_sampler_state(&mut self, descriptor: &SamplerStateDescriptor) -> Option<ResourceId>;
    fn create_program(&mut self, descriptor: &ProgramDescriptor) -> Option<ResourceId>;
    fn create_vertex_array(&mut self, descriptor: &VertexArrayDescriptor) -> Option<ResourceId>;

    fn retain_resource(&mut self, resource: ResourceId);
    fn release_resource(&mut self, resource: ResourceId);
    fn set_resource_debug_name(&mut self, resource: ResourceId, name: &str);
    /// Backend-opaque handle for sibling native APIs. Callers must not
    /// release it.
    fn internal_resource_handle(&self, resource: ResourceId) -> Option<u64>;
    /// Width and height of a render target (swap chain, framebuffer or
    /// render-target texture).
    fn render_target_size(&self, render_target: ResourceId) -> Option<(u32, u32)>;

    /// May return a null mapping (`None`); callers must check. Mapping READ
    /// or READ_WRITE may block until the last GPU write completed; this and
    /// `finish()` are the only blocking points.
    fn map(
        &mut self,
        resource: ResourceId,
        subresource: u32,
        map_type: MapType,
        flags: MapFlags,
    ) -> Option<MappedSubresource>;
    fn unmap(&mut self, resource: ResourceId, subresource: u32);

    /// False when a scene is already open or the backend is dead.
    fn begin_scene(&mut self) -> bool;
    fn submit_command_buffer(&mut self, command_buffer: &CommandBuffer);
    fn end_scene(&mut self);
    /// Issues queued work without waiting.
    fn flush(&mut self);
    /// Blocks until the device finished all queued work.
    fn finish(&mut self);
}
