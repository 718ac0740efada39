//! Factory machinery shared by the shipped backends. Resource validation and
//! bookkeeping is backend-independent; what differs per backend is how
//! dispatched commands are executed, not how descriptors are checked.

use render_backend_traits::types::{
    FramebufferDescriptor, ProgramDescriptor, ResourceCreationError, ResourceStatistics,
    Texture2dArrayDescriptor, Texture2dDescriptor, VertexArrayDescriptor,
};
use render_types::pipeline_state::PipelineStateDescriptor;
use render_types::root_signature::RootSignatureDescriptor;
use render_types::sampler::SamplerStateDescriptor;
use render_types::types::{
    BufferUsage, Capabilities, IndexBufferFormat, NativeWindowHandle, RendererId, ResourceId,
    ResourceType, ShaderLanguage, TextureFormat,
};

use crate::resources::{ResourcePayload, ResourceRegistry};

/// Canvas size a swap chain reports when the window system cannot be asked,
/// which is always the case for the CPU-side backends.
pub const DEFAULT_CANVAS_WIDTH: u32 = 800;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 600;

/// Backend-independent part of a renderer: the resource registry, the
/// capability set and the frame-bracket flag.
#[derive(Debug)]
pub struct BackendCore {
    registry: ResourceRegistry,
    backend_name: &'static str,
    capabilities: Capabilities,
    shader_languages: Vec<ShaderLanguage>,
    debug_enabled: bool,
    scene_open: bool,
    main_swap_chain: Option<ResourceId>,
    initialized: bool,
}

impl BackendCore {
    pub fn new(
        owner: RendererId,
        backend_name: &'static str,
        capabilities: Capabilities,
        shader_languages: Vec<ShaderLanguage>,
        debug_enabled: bool,
    ) -> Self {
        Self {
            registry: ResourceRegistry::new(owner, backend_name),
            backend_name,
            capabilities,
            shader_languages,
            debug_enabled,
            scene_open: false,
            main_swap_chain: None,
            initialized: true,
        }
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.registry
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn shader_languages(&self) -> &[ShaderLanguage] {
        &self.shader_languages
    }

    pub fn is_debug_enabled(&self) -> bool {
        self.debug_enabled
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Device loss surfaces through `is_initialized()` flipping to false;
    /// from then on every factory hands back null handles and the caller
    /// policy decides about recreation.
    pub fn mark_device_lost(&mut self) {
        if self.initialized {
            log::error!("{}: the device was lost", self.backend_name);
            self.initialized = false;
        }
    }

    fn device_lost(&self) -> bool {
        if !self.initialized {
            self.report("a resource", &ResourceCreationError::DeviceLost);
            return true;
        }
        false
    }

    pub fn statistics(&self) -> ResourceStatistics {
        self.registry.statistics()
    }

    pub fn main_swap_chain(&self) -> Option<ResourceId> {
        // The renderer remembers its main swap chain without retaining it;
        // the caller's reference controls the lifetime.
        self.main_swap_chain
            .filter(|id| self.registry.contains(*id))
    }

    pub fn is_scene_open(&self) -> bool {
        self.scene_open
    }

    pub fn begin_scene(&mut self) -> bool {
        if self.scene_open || !self.initialized {
            log::warn!(
                "{}: begin_scene rejected ({})",
                self.backend_name,
                if self.scene_open {
                    "a scene is already open"
                } else {
                    "the renderer is not initialized"
                }
            );
            return false;
        }
        self.scene_open = true;
        true
    }

    pub fn end_scene(&mut self) {
        if !self.scene_open {
            log::warn!("{}: end_scene without an open scene", self.backend_name);
        }
        self.scene_open = false;
    }

    fn report(&self, what: &str, error: &ResourceCreationError) {
        log::error!("{}: creating {what} failed: {error}", self.backend_name);
    }

    pub fn create_swap_chain(
        &mut self,
        native_window_handle: NativeWindowHandle,
    ) -> Option<ResourceId> {
        if self.device_lost() {
            return None;
        }
        let id = self.registry.insert(ResourcePayload::SwapChain {
            native_window_handle,
            width: DEFAULT_CANVAS_WIDTH,
            height: DEFAULT_CANVAS_HEIGHT,
        });
        if self.main_swap_chain().is_none() {
            self.main_swap_chain = Some(id);
        }
        Some(id)
    }

    pub fn create_framebuffer(&mut self, descriptor: &FramebufferDescriptor) -> Option<ResourceId> {
        if self.device_lost() {
            return None;
        }
        match self.checked_framebuffer_size(descriptor) {
            Ok((width, height)) => Some(self.registry.insert(ResourcePayload::Framebuffer {
                descriptor: descriptor.clone(),
                width,
                height,
            })),
            Err(error) => {
                self.report("a framebuffer", &error);
                None
            }
        }
    }

    fn checked_framebuffer_size(
        &self,
        descriptor: &FramebufferDescriptor,
    ) -> Result<(u32, u32), ResourceCreationError> {
        let mut size = None;
        for attachment in descriptor
            .color_attachments
            .iter()
            .chain(descriptor.depth_stencil_attachment.iter())
        {
            let entry = self
                .registry
                .resolve(*attachment)
                .map_err(|_| ResourceCreationError::UnknownResource {
                    resource: *attachment,
                })?;
            let (attachment_size, is_render_target) = match &entry.payload {
                ResourcePayload::Texture2d { descriptor, .. } => (
                    (descriptor.width, descriptor.height),
                    descriptor.render_target,
                ),
                ResourcePayload::Texture2dArray { descriptor, .. } => (
                    (descriptor.width, descriptor.height),
                    descriptor.render_target,
                ),
                _ => {
                    return Err(ResourceCreationError::WrongResourceType {
                        resource: *attachment,
                        expected: "render-target texture",
                        actual: entry.header.resource_type.name(),
                    })
                }
            };
            if !is_render_target {
                return Err(ResourceCreationError::InvalidPipelineState(format!(
                    "texture {attachment} was not created with the render-target flag"
                )));
            }
            size = Some(attachment_size);
        }
        size.ok_or_else(|| {
            ResourceCreationError::InvalidPipelineState("framebuffer has no attachments".into())
        })
    }

    fn buffer_store(number_of_bytes: usize, data: Option<&[u8]>) -> Vec<u8> {
        let mut store = vec![0u8; number_of_bytes];
        if let Some(data) = data {
            let n = data.len().min(number_of_bytes);
            store[..n].copy_from_slice(&data[..n]);
        }
        store
    }

    pub fn create_index_buffer(
        &mut self,
        format: IndexBufferFormat,
        number_of_bytes: usize,
        usage: BufferUsage,
        data: Option<&[u8]>,
    ) -> Option<ResourceId> {
        if self.device_lost() {
            return None;
        }
        Some(self.registry.insert(ResourcePayload::IndexBuffer {
            format,
            usage,
            data: Self::buffer_store(number_of_bytes, data),
        }))
    }

    pub fn create_vertex_buffer(
        &mut self,
        number_of_bytes: usize,
        usage: BufferUsage,
        data: Option<&[u8]>,
    ) -> Option<ResourceId> {
        if self.device_lost() {
            return None;
        }
        Some(self.registry.insert(ResourcePayload::VertexBuffer {
            usage,
            data: Self::buffer_store(number_of_bytes, data),
        }))
    }

    pub fn create_uniform_buffer(
        &mut self,
        number_of_bytes: usize,
        usage: BufferUsage,
        data: Option<&[u8]>,
    ) -> Option<ResourceId> {
        if self.device_lost() {
            return None;
        }
        Some(self.registry.insert(ResourcePayload::UniformBuffer {
            usage,
            data: Self::buffer_store(number_of_bytes, data),
        }))
    }

    pub fn create_texture_buffer(
        &mut self,
        number_of_bytes: usize,
        texture_format: TextureFormat,
        usage: BufferUsage,
        data: Option<&[u8]>,
    ) -> Option<ResourceId> {
        if self.device_lost() {
            return None;
        }
        Some(self.registry.insert(ResourcePayload::TextureBuffer {
            format: texture_format,
            usage,
            data: Self::buffer_store(number_of_bytes, data),
        }))
    }

    pub fn create_indirect_buffer(
        &mut self,
        number_of_bytes: usize,
        usage: BufferUsage,
        emulation_data: Option<&[u8]>,
    ) -> Option<ResourceId> {
        if self.device_lost() {
            return None;
        }
        Some(self.registry.insert(ResourcePayload::IndirectBuffer {
            usage,
            emulation_data: Self::buffer_store(number_of_bytes, emulation_data),
        }))
    }

    fn texture_store(
        width: u32,
        height: u32,
        slices: u32,
        format: TextureFormat,
        data: Option<&[u8]>,
    ) -> Vec<u8> {
        match format.bytes_per_texel() {
            Some(bytes_per_texel) => {
                let size = width as usize * height as usize * slices as usize * bytes_per_texel;
                Self::buffer_store(size, data)
            }
            // Block-compressed data is kept verbatim.
            None => data.map(<[u8]>::to_vec).unwrap_or_default(),
        }
    }

    pub fn create_texture_2d(
        &mut self,
        descriptor: &Texture2dDescriptor,
        data: Option<&[u8]>,
    ) -> Option<ResourceId> {
        if self.device_lost() {
            return None;
        }
        if let Err(error) = self.check_texture(
            descriptor.width,
            descriptor.height,
            1,
            descriptor.multisample_count,
            data,
        ) {
            self.report("a 2d texture", &error);
            return None;
        }
        Some(self.registry.insert(ResourcePayload::Texture2d {
            data: Self::texture_store(
                descriptor.width,
                descriptor.height,
                1,
                descriptor.texture_format,
                data,
            ),
            descriptor: descriptor.clone(),
        }))
    }

    pub fn create_texture_2d_array(
        &mut self,
        descriptor: &Texture2dArrayDescriptor,
        data: Option<&[u8]>,
    ) -> Option<ResourceId> {
        if self.device_lost() {
            return None;
        }
        if let Err(error) = self.check_texture(
            descriptor.width,
            descriptor.height,
            descriptor.number_of_slices,
            descriptor.multisample_count,
            data,
        ) {
            self.report("a 2d texture array", &error);
            return None;
        }
        Some(self.registry.insert(ResourcePayload::Texture2dArray {
            data: Self::texture_store(
                descriptor.width,
                descriptor.height,
                descriptor.number_of_slices,
                descriptor.texture_format,
                data,
            ),
            descriptor: descriptor.clone(),
        }))
    }

    fn check_texture(
        &self,
        width: u32,
        height: u32,
        slices: u32,
        multisample_count: u8,
        data: Option<&[u8]>,
    ) -> Result<(), ResourceCreationError> {
        if width == 0 || height == 0 || slices == 0 {
            return Err(ResourceCreationError::InvalidPipelineState(
                "texture extent must not be zero".into(),
            ));
        }
        let maximum = self.capabilities.maximum_texture_dimension;
        if width > maximum || height > maximum {
            return Err(ResourceCreationError::InvalidPipelineState(format!(
                "texture extent {width}x{height} exceeds the backend maximum of {maximum}"
            )));
        }
        if multisample_count > 1 && data.is_some() {
            return Err(ResourceCreationError::InvalidPipelineState(
                "multisample textures cannot carry initial data".into(),
            ));
        }
        Ok(())
    }

    pub fn create_root_signature(
        &mut self,
        descriptor: &RootSignatureDescriptor,
    ) -> Option<ResourceId> {
        if self.device_lost() {
            return None;
        }
        if let Err(error) = descriptor.validate() {
            self.report(
                "a root signature",
                &ResourceCreationError::InvalidRootSignature(error),
            );
            return None;
        }
        // The registry copy is the owning copy; the caller keeps theirs.
        Some(self.registry.insert(ResourcePayload::RootSignature {
            descriptor: descriptor.clone(),
        }))
    }

    pub fn create_pipeline_state(
        &mut self,
        descriptor: &PipelineStateDescriptor,
    ) -> Option<ResourceId> {
        if self.device_lost() {
            return None;
        }
        if let Err(error) = self.check_pipeline_state(descriptor) {
            self.report("a pipeline state", &error);
            return None;
        }
        Some(self.registry.insert(ResourcePayload::PipelineState {
            descriptor: descriptor.clone(),
        }))
    }

    fn check_pipeline_state(
        &self,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<(), ResourceCreationError> {
        self.check_type(descriptor.root_signature, ResourceType::RootSignature)?;
        match descriptor.program {
            Some(program) => self.check_type(program, ResourceType::Program)?,
            None => {
                return Err(ResourceCreationError::InvalidPipelineState(
                    "program is null".into(),
                ))
            }
        }
        Ok(())
    }

    fn check_type(
        &self,
        resource: ResourceId,
        expected: ResourceType,
    ) -> Result<(), ResourceCreationError> {
        let entry = self
            .registry
            .resolve(resource)
            .map_err(|_| ResourceCreationError::UnknownResource { resource })?;
        if entry.header.resource_type != expected {
            return Err(ResourceCreationError::WrongResourceType {
                resource,
                expected: expected.name(),
                actual: entry.header.resource_type.name(),
            });
        }
        Ok(())
    }

    pub fn create_sampler_state(
        &mut self,
        descriptor: &SamplerStateDescriptor,
    ) -> Option<ResourceId> {
        if self.device_lost() {
            return None;
        }
        Some(self.registry.insert(ResourcePayload::SamplerState {
            descriptor: descriptor.clone(),
        }))
    }

    pub fn create_program(&mut self, descriptor: &ProgramDescriptor) -> Option<ResourceId> {
        if self.device_lost() {
            return None;
        }
        if descriptor.number_of_stages() == 0 {
            self.report(
                "a program",
                &ResourceCreationError::InvalidPipelineState(
                    "a program needs at least one shader stage".into(),
                ),
            );
            return None;
        }
        Some(self.registry.insert(ResourcePayload::Program {
            descriptor: descriptor.clone(),
        }))
    }

    pub fn create_vertex_array(&mut self, descriptor: &VertexArrayDescriptor) -> Option<ResourceId> {
        if self.device_lost() {
            return None;
        }
        for vertex_buffer in &descriptor.vertex_buffers {
            if let Err(error) =
                self.check_type(vertex_buffer.vertex_buffer, ResourceType::VertexBuffer)
            {
                self.report("a vertex array", &error);
                return None;
            }
        }
        if let Some(index_buffer) = descriptor.index_buffer {
            if let Err(error) = self.check_type(index_buffer, ResourceType::IndexBuffer) {
                self.report("a vertex array", &error);
                return None;
            }
        }
        Some(self.registry.insert(ResourcePayload::VertexArray {
            descriptor: descriptor.clone(),
        }))
    }

    /// Width and height of anything that can act as a render target.
    pub fn render_target_size(&self, render_target: ResourceId) -> Option<(u32, u32)> {
        let entry = self.registry.resolve(render_target).ok()?;
        match &entry.payload {
            ResourcePayload::SwapChain { width, height, .. }
            | ResourcePayload::Framebuffer { width, height, .. } => Some((*width, *height)),
            ResourcePayload::Texture2d { descriptor, .. } if descriptor.render_target => {
                Some((descriptor.width, descriptor.height))
            }
            _ => None,
        }
    }

    pub fn internal_resource_handle(&self, resource: ResourceId) -> Option<u64> {
        let entry = self.registry.resolve(resource).ok()?;
        // For CPU-backed resources the "native handle" is the store address,
        // good enough for sibling-API interop tests; otherwise the raw id.
        Some(
            entry
                .payload
                .cpu_store()
                .map(|store| store.as_ptr() as u64)
                .unwrap_or(resource.0),
        )
    }
}
