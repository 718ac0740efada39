use render_types::root_signature::RootSignatureError;
use render_types::types::{BufferUsage, ResourceId, ResourceType, TextureFormat};
use thiserror::Error;

/// Why a factory handed back a null handle or a command was dropped.
/// Factories log these as diagnostics instead of propagating them; a failed
/// creation is never fatal to the renderer.
#[derive(Debug, Error)]
pub enum ResourceCreationError {
    #[error("invalid root signature: {0}")]
    InvalidRootSignature(#[from] RootSignatureError),
    #[error("invalid pipeline state: {0}")]
    InvalidPipelineState(String),
    #[error("referenced resource {resource} is unknown to this renderer")]
    UnknownResource { resource: ResourceId },
    #[error("referenced resource {resource} is a {actual}, expected a {expected}")]
    WrongResourceType {
        resource: ResourceId,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("the device was lost")]
    DeviceLost,
}

/// Per-command failure. These never propagate out of a submission; the
/// dispatching renderer absorbs them and emits one diagnostic per failure,
/// dropping the sub-operation rather than the frame.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("resource {resource} was created by another renderer")]
    OwnerMismatch { resource: ResourceId },
    #[error("resource {resource} is unknown to this renderer")]
    UnknownResource { resource: ResourceId },
    #[error("resource {resource} is a {actual}, expected a {expected}")]
    WrongResourceType {
        resource: ResourceId,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("command packet with dispatch-function index {function_index} is corrupt: {reason}")]
    CorruptPacket { function_index: u32, reason: String },
    #[error("dispatch-function index {function_index} is out of range")]
    UnknownFunction { function_index: u32 },
}

/// Live resource accounting, queryable at any time and checked at renderer
/// teardown for leaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceStatistics {
    created: [u64; ResourceType::COUNT],
    current: [u64; ResourceType::COUNT],
}

impl Default for ResourceStatistics {
    fn default() -> Self {
        Self {
            created: [0; ResourceType::COUNT],
            current: [0; ResourceType::COUNT],
        }
    }
}

impl ResourceStatistics {
    pub fn on_created(&mut self, ty: ResourceType) {
        self.created[ty as usize] += 1;
        self.current[ty as usize] += 1;
    }

    pub fn on_destroyed(&mut self, ty: ResourceType) {
        debug_assert!(self.current[ty as usize] > 0);
        self.current[ty as usize] = self.current[ty as usize].saturating_sub(1);
    }

    pub fn number_of_created_resources(&self, ty: ResourceType) -> u64 {
        self.created[ty as usize]
    }

    pub fn number_of_current_resources(&self, ty: ResourceType) -> u64 {
        self.current[ty as usize]
    }

    /// Total live resources over all types.
    pub fn number_of_current_resources_total(&self) -> u64 {
        self.current.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture2dDescriptor {
    pub width: u32,
    pub height: u32,
    pub texture_format: TextureFormat,
    pub mipmaps: bool,
    pub render_target: bool,
    pub multisample_count: u8,
}

impl Texture2dDescriptor {
    pub fn new(width: u32, height: u32, texture_format: TextureFormat) -> Self {
        Self {
            width,
            height,
            texture_format,
            mipmaps: false,
            render_target: false,
            multisample_count: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture2dArrayDescriptor {
    pub width: u32,
    pub height: u32,
    pub number_of_slices: u32,
    pub texture_format: TextureFormat,
    pub mipmaps: bool,
    pub render_target: bool,
    pub multisample_count: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexBufferDescriptor {
    pub format: render_types::types::IndexBufferFormat,
    pub number_of_bytes: usize,
    pub usage: BufferUsage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferDescriptor {
    pub color_attachments: Vec<ResourceId>,
    pub depth_stencil_attachment: Option<ResourceId>,
}

/// One vertex-buffer slot of a vertex array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexArrayVertexBuffer {
    pub vertex_buffer: ResourceId,
    pub bytes_per_vertex: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexArrayDescriptor {
    pub vertex_buffers: Vec<VertexArrayVertexBuffer>,
    pub index_buffer: Option<ResourceId>,
}

/// Shader stage sources plus the preprocessor define block derived from the
/// resolved shader-combination key. A stage that is `None` is absent from
/// the program.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProgramDescriptor {
    pub vertex_shader_source: Option<String>,
    pub tess_control_shader_source: Option<String>,
    pub tess_eval_shader_source: Option<String>,
    pub geometry_shader_source: Option<String>,
    pub fragment_shader_source: Option<String>,
    pub combination_defines: String,
}

impl ProgramDescriptor {
    pub fn number_of_stages(&self) -> usize {
        [
            self.vertex_shader_source.is_some(),
            self.tess_control_shader_source.is_some(),
            self.tess_eval_shader_source.is_some(),
            self.geometry_shader_source.is_some(),
            self.fragment_shader_source.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_track_created_and_current_separately() {
        let mut statistics = ResourceStatistics::default();
        statistics.on_created(ResourceType::Texture2d);
        statistics.on_created(ResourceType::Texture2d);
        statistics.on_destroyed(ResourceType::Texture2d);
        assert_eq!(
            statistics.number_of_created_resources(ResourceType::Texture2d),
            2
        );
        assert_eq!(
            statistics.number_of_current_resources(ResourceType::Texture2d),
            1
        );
        assert_eq!(statistics.number_of_current_resources_total(), 1);
    }
}
