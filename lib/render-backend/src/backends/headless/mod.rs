//! The headless backend: a CPU-side renderer that executes the full command
//! contract without any device. Root-signature binding is emulated through
//! per-parameter slots, buffers and textures are plain memory, and the
//! native coordinate origin is bottom-left, so viewports and scissors are
//! flipped against the current render target height exactly like a GL-family
//! driver would. All current state is observable, which makes this the
//! backend the test suites run against.

use render_backend_traits::traits::{CommandReceiver, RenderBackend};
use render_backend_traits::types::{
    CommandError, FramebufferDescriptor, ProgramDescriptor, ResourceStatistics,
    Texture2dArrayDescriptor, Texture2dDescriptor, VertexArrayDescriptor,
};
use render_types::command_buffer::CommandBuffer;
use render_types::pipeline_state::PipelineStateDescriptor;
use render_types::root_signature::RootSignatureDescriptor;
use render_types::sampler::SamplerStateDescriptor;
use render_types::types::{
    BufferUsage, Capabilities, ClearFlags, ColorRgba, DrawIndexedInstancedArguments,
    DrawInstancedArguments, IndexBufferFormat, MapFlags, MappedSubresource, MapType,
    NativeWindowHandle, PrimitiveTopology, RendererId, ResourceId, ResourceType,
    ScissorRectangle, ShaderLanguage, TextureFormat, Viewport,
};

use crate::backends::common::BackendCore;
use crate::dispatch::{dispatch_command_buffer, dispatch_filtered, is_upload_function};
use crate::resources::{ResourcePayload, ResourceRegistry};

pub const HEADLESS_BACKEND_NAME: &str = "Headless";

fn headless_capabilities() -> Capabilities {
    Capabilities {
        maximum_number_of_viewports: 16,
        maximum_number_of_simultaneous_render_targets: 8,
        maximum_texture_dimension: 16384,
        maximum_number_of_2d_texture_array_slices: 512,
        maximum_uniform_buffer_size: 64 * 1024,
        maximum_texture_buffer_size: 128 * 1024 * 1024,
        maximum_indirect_buffer_size: 1024 * 1024,
        maximum_number_of_multisamples: 8,
        individual_uniforms: false,
        instanced_arrays: true,
        draw_instanced: true,
        base_vertex: true,
        native_multi_threading: false,
        vertex_shader: true,
        fragment_shader: true,
        geometry_shader: false,
        tessellation_shaders: false,
        maximum_number_of_patch_vertices: 0,
        maximum_number_of_gs_output_vertices: 0,
    }
}

/// What is bound right now. Bound slots hold one registry reference each
/// until overwritten or cleared.
#[derive(Debug, Default)]
struct CurrentState {
    root_signature: Option<ResourceId>,
    descriptor_tables: Vec<Option<ResourceId>>,
    pipeline_state: Option<ResourceId>,
    vertex_array: Option<ResourceId>,
    primitive_topology: PrimitiveTopology,
    render_target: Option<ResourceId>,
    viewports: Vec<Viewport>,
    native_viewports: Vec<Viewport>,
    scissor_rectangles: Vec<ScissorRectangle>,
    native_scissor_rectangles: Vec<ScissorRectangle>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedClear {
    pub flags: ClearFlags,
    pub color: ColorRgba,
    pub z: f32,
    pub stencil: u32,
}

#[derive(Debug)]
pub struct HeadlessBackend {
    core: BackendCore,
    current: CurrentState,
    number_of_draw_calls: u64,
    last_draws: Vec<DrawInstancedArguments>,
    last_indexed_draws: Vec<DrawIndexedInstancedArguments>,
    last_clear: Option<RecordedClear>,
    number_of_resolves: u64,
    debug_event_depth: u32,
}

impl HeadlessBackend {
    pub fn new(renderer_id: RendererId, debug_enabled: bool) -> Self {
        Self {
            core: BackendCore::new(
                renderer_id,
                HEADLESS_BACKEND_NAME,
                headless_capabilities(),
                vec![ShaderLanguage::Glsl, ShaderLanguage::Essl],
                debug_enabled,
            ),
            current: CurrentState::default(),
            number_of_draw_calls: 0,
            last_draws: Vec::new(),
            last_indexed_draws: Vec::new(),
            last_clear: None,
            number_of_resolves: 0,
            debug_event_depth: 0,
        }
    }

    // ---- observable current state, used by the law tests ----

    pub fn current_root_signature(&self) -> Option<ResourceId> {
        self.current.root_signature
    }

    pub fn current_descriptor_table(&self, root_parameter_index: u32) -> Option<ResourceId> {
        self.current
            .descriptor_tables
            .get(root_parameter_index as usize)
            .copied()
            .flatten()
    }

    pub fn current_pipeline_state(&self) -> Option<ResourceId> {
        self.current.pipeline_state
    }

    pub fn current_vertex_array(&self) -> Option<ResourceId> {
        self.current.vertex_array
    }

    pub fn current_primitive_topology(&self) -> PrimitiveTopology {
        self.current.primitive_topology
    }

    pub fn current_render_target(&self) -> Option<ResourceId> {
        self.current.render_target
    }

    pub fn current_viewports(&self) -> &[Viewport] {
        &self.current.viewports
    }

    /// Viewports after the bottom-left origin flip, i.e. what the native API
    /// would receive.
    pub fn native_viewports(&self) -> &[Viewport] {
        &self.current.native_viewports
    }

    pub fn current_scissor_rectangles(&self) -> &[ScissorRectangle] {
        &self.current.scissor_rectangles
    }

    pub fn native_scissor_rectangles(&self) -> &[ScissorRectangle] {
        &self.current.native_scissor_rectangles
    }

    pub fn number_of_draw_calls(&self) -> u64 {
        self.number_of_draw_calls
    }

    pub fn last_draws(&self) -> &[DrawInstancedArguments] {
        &self.last_draws
    }

    pub fn last_indexed_draws(&self) -> &[DrawIndexedInstancedArguments] {
        &self.last_indexed_draws
    }

    pub fn last_clear(&self) -> Option<RecordedClear> {
        self.last_clear
    }

    pub fn number_of_resolves(&self) -> u64 {
        self.number_of_resolves
    }

    /// Drops the device: `is_initialized()` flips to false, factories hand
    /// back null handles and scenes no longer open. A real driver flips the
    /// same switch on a TDR or surface loss.
    pub fn simulate_device_loss(&mut self) {
        self.core.mark_device_lost();
    }

    /// Copy of a resource's CPU store, for asserting upload results.
    pub fn resource_data(&self, resource: ResourceId) -> Option<Vec<u8>> {
        self.core
            .registry()
            .resolve(resource)
            .ok()
            .and_then(|entry| entry.payload.cpu_store().cloned())
    }

    // ---- binding helpers ----

    /// Retains `new`, releases the old occupant, stores `new` in the slot.
    /// Retain-before-release keeps a rebind of the same resource alive.
    fn rebind(registry: &mut ResourceRegistry, slot: &mut Option<ResourceId>, new: Option<ResourceId>) {
        if let Some(id) = new {
            if registry.retain(id).is_err() {
                return;
            }
        }
        if let Some(old) = slot.take() {
            let _ = registry.release(old);
        }
        *slot = new;
    }

    fn drop_descriptor_tables(&mut self) {
        for slot in std::mem::take(&mut self.current.descriptor_tables) {
            if let Some(id) = slot {
                let _ = self.core.registry_mut().release(id);
            }
        }
    }

    fn clear_bindings(&mut self) {
        self.drop_descriptor_tables();
        for slot in [
            &mut self.current.root_signature,
            &mut self.current.pipeline_state,
            &mut self.current.vertex_array,
            &mut self.current.render_target,
        ] {
            if let Some(id) = slot.take() {
                let _ = self.core.registry_mut().release(id);
            }
        }
    }

    fn log_dropped(&self, operation: &str, error: &CommandError) {
        self.core.registry().log_command_error(operation, error);
    }

    /// Height of whatever the next draw would land in; the flip reference.
    fn render_target_height(&self) -> Option<u32> {
        let target = self.current.render_target.or(self.core.main_swap_chain())?;
        self.core
            .render_target_size(target)
            .map(|(_, height)| height)
    }

    fn flip_viewport(viewport: &Viewport, render_target_height: u32) -> Viewport {
        Viewport {
            top_left_y: render_target_height as f32 - viewport.top_left_y - viewport.height,
            ..*viewport
        }
    }

    fn flip_scissor(scissor: &ScissorRectangle, render_target_height: u32) -> ScissorRectangle {
        ScissorRectangle {
            top_left_x: scissor.top_left_x,
            top_left_y: render_target_height as i32 - scissor.bottom_right_y,
            bottom_right_x: scissor.bottom_right_x,
            bottom_right_y: render_target_height as i32 - scissor.top_left_y,
        }
    }

    fn is_bindable(resource_type: ResourceType) -> bool {
        matches!(
            resource_type,
            ResourceType::UniformBuffer
                | ResourceType::TextureBuffer
                | ResourceType::IndirectBuffer
                | ResourceType::Texture2d
                | ResourceType::Texture2dArray
                | ResourceType::SamplerState
        )
    }

    fn record_emulated_draws(&mut self, emulation_data: &[u8], offset: u32, number_of_draws: u32) {
        self.last_draws.clear();
        for index in 0..number_of_draws as usize {
            let start = offset as usize + index * DrawInstancedArguments::PACKED_SIZE;
            let Some(arguments) =
                emulation_data.get(start..).and_then(DrawInstancedArguments::read_packed)
            else {
                log::error!(
                    "{HEADLESS_BACKEND_NAME}: draw emulation data ends after {index} of \
                     {number_of_draws} records"
                );
                break;
            };
            if arguments.start_instance_location != 0 {
                log::error!(
                    "{HEADLESS_BACKEND_NAME}: non-zero start instance location is not supported \
                     by the emulated draw path"
                );
                continue;
            }
            self.number_of_draw_calls += 1;
            self.last_draws.push(arguments);
        }
    }

    fn record_emulated_indexed_draws(
        &mut self,
        emulation_data: &[u8],
        offset: u32,
        number_of_draws: u32,
    ) {
        self.last_indexed_draws.clear();
        for index in 0..number_of_draws as usize {
            let start = offset as usize + index * DrawIndexedInstancedArguments::PACKED_SIZE;
            let Some(arguments) = emulation_data
                .get(start..)
                .and_then(DrawIndexedInstancedArguments::read_packed)
            else {
                log::error!(
                    "{HEADLESS_BACKEND_NAME}: indexed draw emulation data ends after {index} of \
                     {number_of_draws} records"
                );
                break;
            };
            if arguments.start_instance_location != 0 {
                log::error!(
                    "{HEADLESS_BACKEND_NAME}: non-zero start instance location is not supported \
                     by the emulated draw path"
                );
                continue;
            }
            self.number_of_draw_calls += 1;
            self.last_indexed_draws.push(arguments);
        }
    }

    fn copy_into_store(
        &mut self,
        resource: ResourceId,
        expected: ResourceType,
        operation: &str,
        data: &[u8],
    ) {
        let result = self
            .core
            .registry()
            .resolve_expecting(resource, expected)
            .map(|_| ());
        if let Err(error) = result {
            self.log_dropped(operation, &error);
            return;
        }
        let entry = match self.core.registry_mut().resolve_mut(resource) {
            Ok(entry) => entry,
            Err(error) => {
                self.log_dropped(operation, &error);
                return;
            }
        };
        let Some(store) = entry.payload.cpu_store_mut() else {
            log::error!("{HEADLESS_BACKEND_NAME}: {operation} target has no backing store");
            return;
        };
        if data.len() > store.len() {
            log::error!(
                "{HEADLESS_BACKEND_NAME}: {operation} of {} bytes into a {} byte buffer, \
                 truncating",
                data.len(),
                store.len()
            );
        }
        let n = data.len().min(store.len());
        store[..n].copy_from_slice(&data[..n]);
    }

    fn pitches(payload: &ResourcePayload) -> (u32, u32) {
        match payload {
            ResourcePayload::Texture2d { descriptor, .. } => {
                let row = descriptor.width
                    * descriptor.texture_format.bytes_per_texel().unwrap_or(0) as u32;
                (row, row * descriptor.height)
            }
            ResourcePayload::Texture2dArray { descriptor, .. } => {
                let row = descriptor.width
                    * descriptor.texture_format.bytes_per_texel().unwrap_or(0) as u32;
                (row, row * descriptor.height)
            }
            _ => (0, 0),
        }
    }
}

impl CommandReceiver for HeadlessBackend {
    fn copy_uniform_buffer_data(&mut self, uniform_buffer: ResourceId, data: &[u8]) {
        self.copy_into_store(
            uniform_buffer,
            ResourceType::UniformBuffer,
            "copy_uniform_buffer_data",
            data,
        );
    }

    fn copy_texture_buffer_data(&mut self, texture_buffer: ResourceId, data: &[u8]) {
        self.copy_into_store(
            texture_buffer,
            ResourceType::TextureBuffer,
            "copy_texture_buffer_data",
            data,
        );
    }

    fn set_graphics_root_signature(&mut self, root_signature: ResourceId) {
        let parameter_count = match self
            .core
            .registry()
            .resolve_expecting(root_signature, ResourceType::RootSignature)
        {
            Ok(entry) => match &entry.payload {
                ResourcePayload::RootSignature { descriptor } => descriptor.parameters.len(),
                _ => 0,
            },
            Err(error) => {
                self.log_dropped("set_graphics_root_signature", &error);
                return;
            }
        };
        Self::rebind(
            self.core.registry_mut(),
            &mut self.current.root_signature,
            Some(root_signature),
        );
        // A new binding layout invalidates every bound table.
        self.drop_descriptor_tables();
        self.current.descriptor_tables = vec![None; parameter_count];
    }

    fn set_graphics_root_descriptor_table(&mut self, root_parameter_index: u32, resource: ResourceId) {
        if self.current.root_signature.is_none() {
            log::error!(
                "{HEADLESS_BACKEND_NAME}: set_graphics_root_descriptor_table without a bound \
                 root signature"
            );
            return;
        }
        if root_parameter_index as usize >= self.current.descriptor_tables.len() {
            log::error!(
                "{HEADLESS_BACKEND_NAME}: root parameter index {root_parameter_index} is out of \
                 range ({} parameters)",
                self.current.descriptor_tables.len()
            );
            return;
        }
        match self.core.registry().resolve(resource) {
            Ok(entry) if Self::is_bindable(entry.header.resource_type) => {}
            Ok(entry) => {
                log::error!(
                    "{HEADLESS_BACKEND_NAME}: a {} cannot be bound through a descriptor table",
                    entry.header.resource_type.name()
                );
                return;
            }
            Err(error) => {
                self.log_dropped("set_graphics_root_descriptor_table", &error);
                return;
            }
        }
        let slot = &mut self.current.descriptor_tables[root_parameter_index as usize];
        Self::rebind(self.core.registry_mut(), slot, Some(resource));
    }

    fn set_pipeline_state(&mut self, pipeline_state: ResourceId) {
        if let Err(error) = self
            .core
            .registry()
            .resolve_expecting(pipeline_state, ResourceType::PipelineState)
        {
            self.log_dropped("set_pipeline_state", &error);
            return;
        }
        Self::rebind(
            self.core.registry_mut(),
            &mut self.current.pipeline_state,
            Some(pipeline_state),
        );
    }

    fn ia_set_vertex_array(&mut self, vertex_array: ResourceId) {
        if let Err(error) = self
            .core
            .registry()
            .resolve_expecting(vertex_array, ResourceType::VertexArray)
        {
            self.log_dropped("ia_set_vertex_array", &error);
            return;
        }
        Self::rebind(
            self.core.registry_mut(),
            &mut self.current.vertex_array,
            Some(vertex_array),
        );
    }

    fn ia_set_primitive_topology(&mut self, primitive_topology: PrimitiveTopology) {
        self.current.primitive_topology = primitive_topology;
    }

    fn rs_set_viewports(&mut self, viewports: &[Viewport]) {
        let maximum = self.core.capabilities().maximum_number_of_viewports as usize;
        if viewports.len() > maximum {
            log::error!(
                "{HEADLESS_BACKEND_NAME}: {} viewports submitted, backend maximum is {maximum}",
                viewports.len()
            );
            return;
        }
        self.current.viewports = viewports.to_vec();
        self.current.native_viewports = match self.render_target_height() {
            Some(height) => viewports
                .iter()
                .map(|viewport| Self::flip_viewport(viewport, height))
                .collect(),
            None => viewports.to_vec(),
        };
    }

    fn rs_set_scissor_rectangles(&mut self, scissor_rectangles: &[ScissorRectangle]) {
        self.current.scissor_rectangles = scissor_rectangles.to_vec();
        self.current.native_scissor_rectangles = match self.render_target_height() {
            Some(height) => scissor_rectangles
                .iter()
                .map(|scissor| Self::flip_scissor(scissor, height))
                .collect(),
            None => scissor_rectangles.to_vec(),
        };
    }

    fn om_set_render_target(&mut self, render_target: Option<ResourceId>) {
        if let Some(id) = render_target {
            if self.core.render_target_size(id).is_none() {
                match self.core.registry().resolve(id) {
                    Ok(_) => log::error!(
                        "{HEADLESS_BACKEND_NAME}: resource {id} cannot act as a render target"
                    ),
                    Err(error) => self.log_dropped("om_set_render_target", &error),
                }
                return;
            }
        }
        Self::rebind(
            self.core.registry_mut(),
            &mut self.current.render_target,
            render_target,
        );
    }

    fn clear(&mut self, flags: ClearFlags, color: ColorRgba, z: f32, stencil: u32) {
        self.last_clear = Some(RecordedClear {
            flags,
            color,
            z,
            stencil,
        });
        // For texture render targets the color clear is actually performed so
        // readbacks observe it.
        if !flags.contains(ClearFlags::COLOR) {
            return;
        }
        let Some(target) = self.current.render_target else {
            return;
        };
        let Ok(entry) = self.core.registry_mut().resolve_mut(target) else {
            return;
        };
        if let ResourcePayload::Texture2d { descriptor, data } = &mut entry.payload {
            if descriptor.texture_format == TextureFormat::Rgba8 {
                let texel = [
                    (color.r.clamp(0.0, 1.0) * 255.0) as u8,
                    (color.g.clamp(0.0, 1.0) * 255.0) as u8,
                    (color.b.clamp(0.0, 1.0) * 255.0) as u8,
                    (color.a.clamp(0.0, 1.0) * 255.0) as u8,
                ];
                for chunk in data.chunks_exact_mut(4) {
                    chunk.copy_from_slice(&texel);
                }
            }
        }
    }

    fn draw_emulated(&mut self, emulation_data: &[u8], offset: u32, number_of_draws: u32) {
        self.record_emulated_draws(emulation_data, offset, number_of_draws);
    }

    fn draw_indexed_emulated(&mut self, emulation_data: &[u8], offset: u32, number_of_draws: u32) {
        self.record_emulated_indexed_draws(emulation_data, offset, number_of_draws);
    }

    fn draw_indirect(&mut self, indirect_buffer: ResourceId, offset: u32, number_of_draws: u32) {
        // No native indirect path; walk the buffer's emulation data.
        let emulation_data = match self
            .core
            .registry()
            .resolve_expecting(indirect_buffer, ResourceType::IndirectBuffer)
        {
            Ok(entry) => entry.payload.cpu_store().cloned().unwrap_or_default(),
            Err(error) => {
                self.log_dropped("draw_indirect", &error);
                return;
            }
        };
        self.record_emulated_draws(&emulation_data, offset, number_of_draws);
    }

    fn draw_indexed_indirect(&mut self, indirect_buffer: ResourceId, offset: u32, number_of_draws: u32) {
        let emulation_data = match self
            .core
            .registry()
            .resolve_expecting(indirect_buffer, ResourceType::IndirectBuffer)
        {
            Ok(entry) => entry.payload.cpu_store().cloned().unwrap_or_default(),
            Err(error) => {
                self.log_dropped("draw_indexed_indirect", &error);
                return;
            }
        };
        self.record_emulated_indexed_draws(&emulation_data, offset, number_of_draws);
    }

    fn resolve_multisample_framebuffer(
        &mut self,
        destination_render_target: ResourceId,
        source_multisample_framebuffer: ResourceId,
    ) {
        let source_color = match self
            .core
            .registry()
            .resolve_expecting(source_multisample_framebuffer, ResourceType::Framebuffer)
        {
            Ok(entry) => match &entry.payload {
                ResourcePayload::Framebuffer { descriptor, .. } => {
                    descriptor.color_attachments.first().copied()
                }
                _ => None,
            },
            Err(error) => {
                self.log_dropped("resolve_multisample_framebuffer", &error);
                return;
            }
        };
        if let Some(source) = source_color {
            self.copy_resource(destination_render_target, source);
        }
        self.number_of_resolves += 1;
    }

    fn copy_resource(&mut self, destination_resource: ResourceId, source_resource: ResourceId) {
        let source_data = match self.core.registry().resolve(source_resource) {
            Ok(entry) => entry.payload.cpu_store().cloned(),
            Err(error) => {
                self.log_dropped("copy_resource", &error);
                return;
            }
        };
        let Some(source_data) = source_data else {
            log::error!("{HEADLESS_BACKEND_NAME}: copy_resource source has no backing store");
            return;
        };
        let destination = match self.core.registry_mut().resolve_mut(destination_resource) {
            Ok(entry) => entry,
            Err(error) => {
                self.log_dropped("copy_resource", &error);
                return;
            }
        };
        let Some(store) = destination.payload.cpu_store_mut() else {
            log::error!("{HEADLESS_BACKEND_NAME}: copy_resource destination has no backing store");
            return;
        };
        if store.len() != source_data.len() {
            log::error!(
                "{HEADLESS_BACKEND_NAME}: copy_resource size mismatch ({} vs {} bytes)",
                source_data.len(),
                store.len()
            );
            return;
        }
        store.copy_from_slice(&source_data);
    }

    fn set_debug_marker(&mut self, name: &str) {
        if self.core.is_debug_enabled() {
            log::debug!("{HEADLESS_BACKEND_NAME}: marker '{name}'");
        }
    }

    fn begin_debug_event(&mut self, name: &str) {
        self.debug_event_depth += 1;
        if self.core.is_debug_enabled() {
            log::debug!("{HEADLESS_BACKEND_NAME}: event begin '{name}'");
        }
    }

    fn end_debug_event(&mut self) {
        if self.debug_event_depth == 0 {
            log::warn!("{HEADLESS_BACKEND_NAME}: end_debug_event without a matching begin");
            return;
        }
        self.debug_event_depth -= 1;
    }
}

impl RenderBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        HEADLESS_BACKEND_NAME
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
            self.log_dropped("retain", &error);
        }
    }

    fn release_resource(&mut self, resource: ResourceId) {
        if let Err(error) = self.core.registry_mut().release(resource) {
            self.log_dropped("release", &error);
        }
    }

    fn set_resource_debug_name(&mut self, resource: ResourceId, name: &str) {
        if let Err(error) = self.core.registry_mut().set_debug_name(resource, name) {
            self.log_dropped("set_debug_name", &error);
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
        resource: ResourceId,
        subresource: u32,
        map_type: MapType,
        _flags: MapFlags,
    ) -> Option<MappedSubresource> {
        if subresource != 0 {
            log::error!(
                "{HEADLESS_BACKEND_NAME}: only subresource 0 exists on CPU-side resources"
            );
            return None;
        }
        let entry = match self.core.registry_mut().resolve_mut(resource) {
            Ok(entry) => entry,
            Err(error) => {
                log::error!("{HEADLESS_BACKEND_NAME}: map dropped: {error}");
                return None;
            }
        };
        if entry.mapped {
            log::error!("{HEADLESS_BACKEND_NAME}: resource {resource} is already mapped");
            return None;
        }
        let (row_pitch, depth_pitch) = Self::pitches(&entry.payload);
        let Some(store) = entry.payload.cpu_store_mut() else {
            log::error!(
                "{HEADLESS_BACKEND_NAME}: resource {resource} has no mappable backing store"
            );
            return None;
        };
        if map_type == MapType::WriteDiscard {
            // Orphan the backing store.
            store.fill(0);
        }
        entry.mapped = true;
        Some(MappedSubresource {
            data: store.as_mut_ptr(),
            row_pitch,
            depth_pitch,
        })
    }

    fn unmap(&mut self, resource: ResourceId, _subresource: u32) {
        match self.core.registry_mut().resolve_mut(resource) {
            Ok(entry) => {
                if !entry.mapped {
                    log::warn!("{HEADLESS_BACKEND_NAME}: unmap of a resource that is not mapped");
                }
                entry.mapped = false;
            }
            Err(error) => log::error!("{HEADLESS_BACKEND_NAME}: unmap dropped: {error}"),
        }
    }

    fn begin_scene(&mut self) -> bool {
        self.core.begin_scene()
    }

    fn submit_command_buffer(&mut self, command_buffer: &CommandBuffer) {
        // Everything the buffer references stays alive for the whole walk.
        let mut retained = Vec::with_capacity(command_buffer.referenced_resources().len());
        for &resource in command_buffer.referenced_resources() {
            if self.core.registry_mut().retain(resource).is_ok() {
                retained.push(resource);
            }
        }
        if self.core.is_scene_open() {
            dispatch_command_buffer(command_buffer, self);
        } else {
            log::warn!(
                "{HEADLESS_BACKEND_NAME}: submission outside an open scene executes upload \
                 packets only"
            );
            dispatch_filtered(command_buffer, self, is_upload_function);
        }
        for resource in retained {
            let _ = self.core.registry_mut().release(resource);
        }
    }

    fn end_scene(&mut self) {
        self.core.end_scene()
    }

    fn flush(&mut self) {
        // Nothing is queued; every command executed synchronously.
    }

    fn finish(&mut self) {
        // Synchronous execution, the device is always done.
    }
}

impl Drop for HeadlessBackend {
    fn drop(&mut self) {
        // Shutdown implicitly waits for the device, then the bound slots give
        // up their references so only true leaks remain for the registry's
        // leak report.
        self.finish();
        self.clear_bindings();
    }
}

#[cfg(test)]
mod tests {
    use render_types::root_signature::{
        DescriptorRange, DescriptorRangeType, RootParameter, RootSignatureDescriptor,
        RootSignatureFlags, ShaderVisibility,
    };

    use super::*;

    fn backend(id: u64) -> HeadlessBackend {
        HeadlessBackend::new(RendererId(id), true)
    }

    fn single_table_signature(backend: &mut HeadlessBackend) -> ResourceId {
        backend
            .create_root_signature(&RootSignatureDescriptor {
                parameters: vec![RootParameter::DescriptorTable {
                    descriptor_ranges: vec![DescriptorRange::new(
                        DescriptorRangeType::Srv,
                        1,
                        0,
                        "AlbedoMap",
                    )],
                    shader_visibility: ShaderVisibility::Fragment,
                }],
                static_samplers: Vec::new(),
                flags: RootSignatureFlags::empty(),
            })
            .unwrap()
    }

    #[test]
    fn viewport_flip_against_bottom_left_origin() {
        let mut backend = backend(50);
        let _swap_chain = backend.create_swap_chain(1).unwrap();
        backend.rs_set_viewports(&[Viewport {
            top_left_x: 0.0,
            top_left_y: 10.0,
            width: 100.0,
            height: 50.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }]);
        // 800x600 default canvas: y' = 600 - 10 - 50.
        let native = backend.native_viewports()[0];
        assert_eq!(native.top_left_x, 0.0);
        assert_eq!(native.top_left_y, 540.0);
        assert_eq!(native.width, 100.0);
        assert_eq!(native.height, 50.0);
    }

    #[test]
    fn scissor_flip_preserves_the_rectangle() {
        let mut backend = backend(51);
        let _swap_chain = backend.create_swap_chain(1).unwrap();
        backend.rs_set_scissor_rectangles(&[ScissorRectangle {
            top_left_x: 10,
            top_left_y: 20,
            bottom_right_x: 110,
            bottom_right_y: 70,
        }]);
        let native = backend.native_scissor_rectangles()[0];
        assert_eq!(native.top_left_y, 600 - 70);
        assert_eq!(native.bottom_right_y, 600 - 20);
        assert_eq!(native.bottom_right_x - native.top_left_x, 100);
    }

    #[test]
    fn bound_slot_retains_until_overwritten() {
        let mut backend = backend(52);
        let root_signature = single_table_signature(&mut backend);
        backend.set_graphics_root_signature(root_signature);
        // The caller's reference goes away; the bound slot keeps it alive.
        backend.release_resource(root_signature);
        assert_eq!(
            backend
                .statistics()
                .number_of_current_resources(ResourceType::RootSignature),
            1
        );
        let replacement = single_table_signature(&mut backend);
        backend.set_graphics_root_signature(replacement);
        assert_eq!(
            backend
                .statistics()
                .number_of_current_resources(ResourceType::RootSignature),
            1
        );
        backend.release_resource(replacement);
    }

    #[test]
    fn foreign_resource_binding_changes_nothing() {
        let mut owning = backend(53);
        let mut other = backend(54);
        let root_signature = single_table_signature(&mut other);
        let texture = owning
            .create_texture_2d(&Texture2dDescriptor::new(64, 64, TextureFormat::Rgba8), None)
            .unwrap();

        other.set_graphics_root_signature(root_signature);
        other.set_graphics_root_descriptor_table(0, texture);
        assert_eq!(other.current_descriptor_table(0), None);

        owning.release_resource(texture);
        other.release_resource(root_signature);
    }

    #[test]
    fn write_discard_map_orphans_the_store() {
        let mut backend = backend(55);
        let buffer = backend
            .create_uniform_buffer(16, BufferUsage::DynamicDraw, Some(&[0xffu8; 16]))
            .unwrap();
        let mapping = backend
            .map(buffer, 0, MapType::WriteDiscard, MapFlags::empty())
            .unwrap();
        unsafe {
            assert_eq!(*mapping.data, 0);
            *mapping.data = 42;
        }
        backend.unmap(buffer, 0);
        assert_eq!(backend.resource_data(buffer).unwrap()[0], 42);
        backend.release_resource(buffer);
    }

    #[test]
    fn double_map_fails_with_a_null_mapping() {
        let mut backend = backend(56);
        let buffer = backend
            .create_uniform_buffer(16, BufferUsage::DynamicDraw, None)
            .unwrap();
        assert!(backend
            .map(buffer, 0, MapType::Write, MapFlags::empty())
            .is_some());
        assert!(backend
            .map(buffer, 0, MapType::Write, MapFlags::empty())
            .is_none());
        backend.unmap(buffer, 0);
        backend.release_resource(buffer);
    }

    #[test]
    fn device_loss_turns_factories_into_null_handle_mills() {
        let mut backend = backend(60);
        assert!(backend.is_initialized());
        let buffer = backend
            .create_uniform_buffer(16, BufferUsage::DynamicDraw, None)
            .unwrap();

        backend.simulate_device_loss();
        assert!(!backend.is_initialized());
        assert!(backend
            .create_uniform_buffer(16, BufferUsage::DynamicDraw, None)
            .is_none());
        assert!(!backend.begin_scene());
        // Already created resources are still releasable for teardown.
        backend.release_resource(buffer);
        assert_eq!(backend.statistics().number_of_current_resources_total(), 0);
    }

    #[test]
    fn nested_begin_scene_is_rejected() {
        let mut backend = backend(58);
        assert!(backend.begin_scene());
        assert!(!backend.begin_scene());
        backend.end_scene();
        assert!(backend.begin_scene());
        backend.end_scene();
    }

    #[test]
    fn submission_outside_a_scene_executes_uploads_only() {
        let mut backend = backend(59);
        let uniform_buffer = backend
            .create_uniform_buffer(16, BufferUsage::DynamicDraw, None)
            .unwrap();

        let mut command_buffer = render_types::command_buffer::CommandBuffer::new();
        command_buffer.copy_uniform_buffer_data(uniform_buffer, &[7u8; 16]);
        command_buffer.clear(ClearFlags::COLOR, ColorRgba::WHITE, 1.0, 0);
        backend.submit_command_buffer(&command_buffer);

        // The streaming packet ran, the render-state packet was dropped.
        assert_eq!(backend.resource_data(uniform_buffer).unwrap(), vec![7u8; 16]);
        assert_eq!(backend.last_clear(), None);
        backend.release_resource(uniform_buffer);
    }

    #[test]
    fn indirect_draws_walk_the_emulation_data() {
        let mut backend = backend(57);
        let mut emulation_data = Vec::new();
        for start in 0..3u32 {
            DrawInstancedArguments {
                vertex_count_per_instance: 3,
                instance_count: 1,
                start_vertex_location: start * 3,
                start_instance_location: 0,
            }
            .write_packed(&mut emulation_data);
        }
        let indirect_buffer = backend
            .create_indirect_buffer(
                emulation_data.len(),
                BufferUsage::StaticDraw,
                Some(&emulation_data),
            )
            .unwrap();
        backend.draw_indirect(indirect_buffer, 0, 3);
        assert_eq!(backend.number_of_draw_calls(), 3);
        assert_eq!(backend.last_draws()[2].start_vertex_location, 6);
        backend.release_resource(indirect_buffer);
    }
}
