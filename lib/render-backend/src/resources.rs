//! Renderer-owned resource storage. Every resource lives in exactly one
//! registry (the registry of the renderer that created it); handles are plain
//! ids that encode the owning renderer, so the owner-identity check is a
//! cheap integer compare. Reference counts are non-atomic: the submission
//! timeline is single-threaded by contract.

use hashlink::LinkedHashMap;
use render_backend_traits::types::{
    FramebufferDescriptor, ProgramDescriptor, ResourceStatistics, Texture2dArrayDescriptor,
    Texture2dDescriptor, VertexArrayDescriptor,
};
use render_backend_traits::types::CommandError;
use render_types::pipeline_state::PipelineStateDescriptor;
use render_types::root_signature::RootSignatureDescriptor;
use render_types::sampler::SamplerStateDescriptor;
use render_types::types::{
    BufferUsage, IndexBufferFormat, NativeWindowHandle, RendererId, ResourceId, ResourceType,
    TextureFormat,
};

/// Resource ids carry the owning renderer in their upper bits; the low bits
/// are a per-renderer running index.
const OWNER_SHIFT: u32 = 40;
const INDEX_MASK: u64 = (1 << OWNER_SHIFT) - 1;

pub fn owner_of(resource: ResourceId) -> RendererId {
    RendererId(resource.0 >> OWNER_SHIFT)
}

/// Shared header of every resource variant.
#[derive(Debug)]
pub struct ResourceHeader {
    pub resource_type: ResourceType,
    pub owner: RendererId,
    pub references: u32,
    pub debug_name: Option<String>,
}

/// Type-specific payload. CPU-side backends keep the backing store inline;
/// a GPU backend would keep its API object handles here instead.
#[derive(Debug)]
pub enum ResourcePayload {
    RootSignature {
        descriptor: RootSignatureDescriptor,
    },
    Program {
        descriptor: ProgramDescriptor,
    },
    VertexArray {
        descriptor: VertexArrayDescriptor,
    },
    SwapChain {
        native_window_handle: NativeWindowHandle,
        width: u32,
        height: u32,
    },
    Framebuffer {
        descriptor: FramebufferDescriptor,
        width: u32,
        height: u32,
    },
    IndexBuffer {
        format: IndexBufferFormat,
        usage: BufferUsage,
        data: Vec<u8>,
    },
    VertexBuffer {
        usage: BufferUsage,
        data: Vec<u8>,
    },
    UniformBuffer {
        usage: BufferUsage,
        data: Vec<u8>,
    },
    TextureBuffer {
        format: TextureFormat,
        usage: BufferUsage,
        data: Vec<u8>,
    },
    IndirectBuffer {
        usage: BufferUsage,
        emulation_data: Vec<u8>,
    },
    Texture2d {
        descriptor: Texture2dDescriptor,
        data: Vec<u8>,
    },
    Texture2dArray {
        descriptor: Texture2dArrayDescriptor,
        data: Vec<u8>,
    },
    PipelineState {
        descriptor: PipelineStateDescriptor,
    },
    SamplerState {
        descriptor: SamplerStateDescriptor,
    },
}

impl ResourcePayload {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            ResourcePayload::RootSignature { .. } => ResourceType::RootSignature,
            ResourcePayload::Program { .. } => ResourceType::Program,
            ResourcePayload::VertexArray { .. } => ResourceType::VertexArray,
            ResourcePayload::SwapChain { .. } => ResourceType::SwapChain,
            ResourcePayload::Framebuffer { .. } => ResourceType::Framebuffer,
            ResourcePayload::IndexBuffer { .. } => ResourceType::IndexBuffer,
            ResourcePayload::VertexBuffer { .. } => ResourceType::VertexBuffer,
            ResourcePayload::UniformBuffer { .. } => ResourceType::UniformBuffer,
            ResourcePayload::TextureBuffer { .. } => ResourceType::TextureBuffer,
            ResourcePayload::IndirectBuffer { .. } => ResourceType::IndirectBuffer,
            ResourcePayload::Texture2d { .. } => ResourceType::Texture2d,
            ResourcePayload::Texture2dArray { .. } => ResourceType::Texture2dArray,
            ResourcePayload::PipelineState { .. } => ResourceType::PipelineState,
            ResourcePayload::SamplerState { .. } => ResourceType::SamplerState,
        }
    }

    /// Mutable CPU backing store, for the map/unmap protocol and data
    /// uploads. `None` for resources without one.
    pub fn cpu_store_mut(&mut self) -> Option<&mut Vec<u8>> {
        match self {
            ResourcePayload::IndexBuffer { data, .. }
            | ResourcePayload::VertexBuffer { data, .. }
            | ResourcePayload::UniformBuffer { data, .. }
            | ResourcePayload::TextureBuffer { data, .. }
            | ResourcePayload::Texture2d { data, .. }
            | ResourcePayload::Texture2dArray { data, .. } => Some(data),
            ResourcePayload::IndirectBuffer { emulation_data, .. } => Some(emulation_data),
            _ => None,
        }
    }

    /// Resources this payload keeps alive: a composite resource holds one
    /// internal reference per referent, released again when the composite
    /// is destroyed.
    pub fn referenced_resources(&self) -> Vec<ResourceId> {
        match self {
            ResourcePayload::Framebuffer { descriptor, .. } => descriptor
                .color_attachments
                .iter()
                .copied()
                .chain(descriptor.depth_stencil_attachment)
                .collect(),
            ResourcePayload::VertexArray { descriptor } => descriptor
                .vertex_buffers
                .iter()
                .map(|slot| slot.vertex_buffer)
                .chain(descriptor.index_buffer)
                .collect(),
            ResourcePayload::PipelineState { descriptor } => std::iter::once(descriptor.root_signature)
                .chain(descriptor.program)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn cpu_store(&self) -> Option<&Vec<u8>> {
        match self {
            ResourcePayload::IndexBuffer { data, .. }
            | ResourcePayload::VertexBuffer { data, .. }
            | ResourcePayload::UniformBuffer { data, .. }
            | ResourcePayload::TextureBuffer { data, .. }
            | ResourcePayload::Texture2d { data, .. }
            | ResourcePayload::Texture2dArray { data, .. } => Some(data),
            ResourcePayload::IndirectBuffer { emulation_data, .. } => Some(emulation_data),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct ResourceEntry {
    pub header: ResourceHeader,
    pub payload: ResourcePayload,
    pub mapped: bool,
}

/// The single owning container of all resources one renderer created.
#[derive(Debug)]
pub struct ResourceRegistry {
    owner: RendererId,
    backend_name: &'static str,
    next_resource_index: u64,
    resources: LinkedHashMap<ResourceId, ResourceEntry>,
    statistics: ResourceStatistics,
}

impl ResourceRegistry {
    pub fn new(owner: RendererId, backend_name: &'static str) -> Self {
        Self {
            owner,
            backend_name,
            next_resource_index: 1,
            resources: LinkedHashMap::new(),
            statistics: ResourceStatistics::default(),
        }
    }

    pub fn owner(&self) -> RendererId {
        self.owner
    }

    pub fn statistics(&self) -> ResourceStatistics {
        self.statistics
    }

    /// Inserts a freshly created resource with one reference, the caller's.
    /// Composite resources retain their referents so nothing a live
    /// resource points at can be destroyed underneath it.
    pub fn insert(&mut self, payload: ResourcePayload) -> ResourceId {
        let resource_type = payload.resource_type();
        debug_assert!(self.next_resource_index <= INDEX_MASK);
        let id = ResourceId((self.owner.0 << OWNER_SHIFT) | self.next_resource_index);
        self.next_resource_index += 1;
        for referenced in payload.referenced_resources() {
            // Referents were validated by the factory before the insert.
            let _ = self.retain(referenced);
        }
        self.resources.insert(
            id,
            ResourceEntry {
                header: ResourceHeader {
                    resource_type,
                    owner: self.owner,
                    references: 1,
                    debug_name: None,
                },
                payload,
                mapped: false,
            },
        );
        self.statistics.on_created(resource_type);
        id
    }

    /// Owner-identity gate every resolving operation goes through.
    fn check_owner(&self, resource: ResourceId) -> Result<(), CommandError> {
        if owner_of(resource) != self.owner {
            return Err(CommandError::OwnerMismatch { resource });
        }
        Ok(())
    }

    pub fn resolve(&self, resource: ResourceId) -> Result<&ResourceEntry, CommandError> {
        self.check_owner(resource)?;
        self.resources
            .get(&resource)
            .ok_or(CommandError::UnknownResource { resource })
    }

    pub fn resolve_mut(&mut self, resource: ResourceId) -> Result<&mut ResourceEntry, CommandError> {
        self.check_owner(resource)?;
        self.resources
            .get_mut(&resource)
            .ok_or(CommandError::UnknownResource { resource })
    }

    pub fn resolve_expecting(
        &self,
        resource: ResourceId,
        expected: ResourceType,
    ) -> Result<&ResourceEntry, CommandError> {
        let entry = self.resolve(resource)?;
        if entry.header.resource_type != expected {
            return Err(CommandError::WrongResourceType {
                resource,
                expected: expected.name(),
                actual: entry.header.resource_type.name(),
            });
        }
        Ok(entry)
    }

    pub fn retain(&mut self, resource: ResourceId) -> Result<(), CommandError> {
        let entry = self.resolve_mut(resource)?;
        entry.header.references += 1;
        Ok(())
    }

    /// Drops one reference, destroying the resource when the count reaches
    /// zero. Destruction releases the internal references of composite
    /// resources, which may cascade.
    pub fn release(&mut self, resource: ResourceId) -> Result<(), CommandError> {
        let entry = self.resolve_mut(resource)?;
        debug_assert!(entry.header.references > 0);
        entry.header.references -= 1;
        if entry.header.references == 0 {
            let resource_type = entry.header.resource_type;
            let referenced = entry.payload.referenced_resources();
            self.resources.remove(&resource);
            self.statistics.on_destroyed(resource_type);
            for referenced in referenced {
                let _ = self.release(referenced);
            }
        }
        Ok(())
    }

    pub fn set_debug_name(&mut self, resource: ResourceId, name: &str) -> Result<(), CommandError> {
        self.resolve_mut(resource)?.header.debug_name = Some(name.to_string());
        Ok(())
    }

    pub fn contains(&self, resource: ResourceId) -> bool {
        self.resources.contains_key(&resource)
    }

    /// Diagnostic helper used by backends when a per-command failure is
    /// absorbed.
    pub fn log_command_error(&self, operation: &str, error: &CommandError) {
        log::error!(
            "{}: {operation} dropped: {error}",
            self.backend_name
        );
    }
}

impl Drop for ResourceRegistry {
    /// Leak detection at shutdown: one diagnostic per leaked resource plus a
    /// summary. Never aborts.
    fn drop(&mut self) {
        if self.resources.is_empty() {
            return;
        }
        for (id, entry) in self.resources.iter() {
            let name = entry
                .header
                .debug_name
                .as_deref()
                .unwrap_or("<unnamed>");
            log::warn!(
                "{}: leaked {} {id} ('{name}', {} reference(s) at shutdown)",
                self.backend_name,
                entry.header.resource_type.name(),
                entry.header.references
            );
        }
        log::warn!(
            "{}: {} resource(s) still alive at renderer shutdown",
            self.backend_name,
            self.resources.len()
        );
    }
}
