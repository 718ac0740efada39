//! Command packet payloads. One struct per command variant; the payloads are
//! bincode-encoded into the command-buffer arena and decoded again by the
//! backend dispatch table. Variable-size tails (viewport arrays, upload
//! bytes, debug names, draw-argument records) travel in the packet's
//! auxiliary memory, not in the payload.

use bincode::{Decode, Encode};
use num_derive::FromPrimitive;

use crate::types::{ClearFlags, ColorRgba, PrimitiveTopology, ResourceId};

/// Dispatch-function index of a command packet. The per-backend dispatch
/// table is indexed by this value; its arity is checked against [`COUNT`]
/// so a forgotten entry fails at compile time.
///
/// [`COUNT`]: CommandFunction::COUNT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode)]
#[repr(u32)]
pub enum CommandFunction {
    CopyUniformBufferData = 0,
    CopyTextureBufferData,
    SetGraphicsRootSignature,
    SetGraphicsRootDescriptorTable,
    SetPipelineState,
    SetVertexArray,
    SetPrimitiveTopology,
    SetViewports,
    SetScissorRectangles,
    SetRenderTarget,
    Clear,
    ResolveMultisampleFramebuffer,
    CopyResource,
    Draw,
    DrawIndexed,
    SetDebugMarker,
    BeginDebugEvent,
    EndDebugEvent,
}

impl CommandFunction {
    pub const COUNT: usize = 18;
}

/// Upload into a uniform buffer; the bytes are the packet's auxiliary
/// memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandCopyUniformBufferData {
    pub uniform_buffer: ResourceId,
    pub number_of_bytes: u32,
}

/// Upload into a texture buffer; the bytes are the packet's auxiliary
/// memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandCopyTextureBufferData {
    pub texture_buffer: ResourceId,
    pub number_of_bytes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandSetGraphicsRootSignature {
    pub root_signature: ResourceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandSetGraphicsRootDescriptorTable {
    pub root_parameter_index: u32,
    pub resource: ResourceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandSetPipelineState {
    pub pipeline_state: ResourceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandSetVertexArray {
    pub vertex_array: ResourceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandSetPrimitiveTopology {
    pub primitive_topology: PrimitiveTopology,
}

/// The viewport records follow as packed [`Viewport`] entries in auxiliary
/// memory.
///
/// [`Viewport`]: crate::types::Viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandSetViewports {
    pub number_of_viewports: u32,
}

/// The scissor records follow as packed [`ScissorRectangle`] entries in
/// auxiliary memory.
///
/// [`ScissorRectangle`]: crate::types::ScissorRectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandSetScissorRectangles {
    pub number_of_scissor_rectangles: u32,
}

/// `None` unbinds the current render target (subsequent draws go nowhere).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandSetRenderTarget {
    pub render_target: Option<ResourceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct CommandClear {
    pub flags: ClearFlags,
    pub color: ColorRgba,
    pub z: f32,
    pub stencil: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandResolveMultisampleFramebuffer {
    pub destination_render_target: ResourceId,
    pub source_multisample_framebuffer: ResourceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandCopyResource {
    pub destination_resource: ResourceId,
    pub source_resource: ResourceId,
}

/// A draw sourced either from an indirect buffer (`indirect_buffer` set,
/// auxiliary memory empty) or from inline emulation records in auxiliary
/// memory (`indirect_buffer` unset). `indirect_buffer_offset` is in bytes in
/// either case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandDraw {
    pub indirect_buffer: Option<ResourceId>,
    pub indirect_buffer_offset: u32,
    pub number_of_draws: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandDrawIndexed {
    pub indirect_buffer: Option<ResourceId>,
    pub indirect_buffer_offset: u32,
    pub number_of_draws: u32,
}

/// Marker/event text is UTF-8 in auxiliary memory. Backends may ignore the
/// debug triple entirely in release builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandSetDebugMarker {
    pub name_length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandBeginDebugEvent {
    pub name_length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandEndDebugEvent {}

#[cfg(test)]
mod tests {
    use num_traits::FromPrimitive;

    use super::*;

    #[test]
    fn dispatch_indices_are_dense() {
        for index in 0..CommandFunction::COUNT {
            assert!(CommandFunction::from_usize(index).is_some());
        }
        assert!(CommandFunction::from_usize(CommandFunction::COUNT).is_none());
    }
}
