//! Deferred command recording. A command buffer is one contiguous byte arena
//! holding a singly-linked chain of command packets; every packet is a fixed
//! header, the bincode-encoded payload of its variant and optional auxiliary
//! bytes for variable-size tails. Recording is append-only and single-writer,
//! packets execute in insertion order at submission.

use bincode::Encode;
use num_traits::FromPrimitive;

use crate::commands::{
    CommandBeginDebugEvent, CommandClear, CommandCopyResource, CommandCopyTextureBufferData,
    CommandCopyUniformBufferData, CommandDraw, CommandDrawIndexed, CommandEndDebugEvent,
    CommandFunction, CommandResolveMultisampleFramebuffer, CommandSetDebugMarker,
    CommandSetGraphicsRootDescriptorTable, CommandSetGraphicsRootSignature,
    CommandSetPipelineState, CommandSetPrimitiveTopology, CommandSetRenderTarget,
    CommandSetScissorRectangles, CommandSetVertexArray, CommandSetViewports,
};
use crate::types::{
    ClearFlags, ColorRgba, DrawIndexedInstancedArguments, DrawInstancedArguments,
    PrimitiveTopology, ResourceId, ScissorRectangle, Viewport,
};

/// "No next packet" marker inside a packet header.
pub const NEXT_PACKET_SENTINEL: u32 = u32::MAX;

/// Fixed per-packet header: dispatch-function index, byte offset of the next
/// packet (or the all-ones sentinel), payload size, auxiliary size. All
/// little-endian `u32`s.
pub const PACKET_HEADER_SIZE: usize = 16;

const DEFAULT_ARENA_CAPACITY: usize = 8 * 1024;

/// One decoded packet position inside the arena.
#[derive(Debug, Clone, Copy)]
pub struct CommandPacket<'a> {
    pub function_index: u32,
    pub payload: &'a [u8],
    pub auxiliary: &'a [u8],
}

impl<'a> CommandPacket<'a> {
    /// `None` when the dispatch-function index is out of range; submission
    /// treats such packets as corrupt and stops the walk.
    pub fn function(&self) -> Option<CommandFunction> {
        CommandFunction::from_u32(self.function_index)
    }
}

#[derive(Debug, Default)]
pub struct CommandBuffer {
    data: Vec<u8>,
    previous_packet_offset: Option<u32>,
    number_of_packets: u32,
    referenced_resources: Vec<ResourceId>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ARENA_CAPACITY)
    }

    pub fn with_capacity(number_of_bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(number_of_bytes),
            previous_packet_offset: None,
            number_of_packets: 0,
            referenced_resources: Vec::new(),
        }
    }

    pub fn number_of_packets(&self) -> u32 {
        self.number_of_packets
    }

    pub fn is_empty(&self) -> bool {
        self.number_of_packets == 0
    }

    pub fn number_of_bytes(&self) -> usize {
        self.data.len()
    }

    /// Every resource any recorded packet refers to, in recording order.
    /// Submission retains these for the duration of the dispatch walk so no
    /// resource dies while a packet referring to it is in flight.
    pub fn referenced_resources(&self) -> &[ResourceId] {
        &self.referenced_resources
    }

    /// Resets the packet chain but keeps the arena allocation, so steady-state
    /// re-recording allocates nothing once the buffer is warm.
    pub fn clear_for_reuse(&mut self) {
        self.data.clear();
        self.previous_packet_offset = None;
        self.number_of_packets = 0;
        self.referenced_resources.clear();
    }

    pub fn iter(&self) -> CommandPacketIter<'_> {
        CommandPacketIter {
            data: &self.data,
            next_offset: if self.number_of_packets > 0 {
                Some(0)
            } else {
                None
            },
        }
    }

    fn push_packet(&mut self, function: CommandFunction, payload: &impl Encode, auxiliary: &[u8]) {
        let packet_offset = self.data.len();
        debug_assert!(packet_offset < NEXT_PACKET_SENTINEL as usize);

        // Header with the payload size patched in after encoding.
        self.data
            .extend_from_slice(&(function as u32).to_le_bytes());
        self.data.extend_from_slice(&NEXT_PACKET_SENTINEL.to_le_bytes());
        self.data.extend_from_slice(&0u32.to_le_bytes());
        self.data
            .extend_from_slice(&(auxiliary.len() as u32).to_le_bytes());

        match bincode::encode_into_std_write(payload, &mut self.data, bincode::config::standard())
        {
            Ok(payload_size) => {
                let size_field = packet_offset + 8;
                self.data[size_field..size_field + 4]
                    .copy_from_slice(&(payload_size as u32).to_le_bytes());
            }
            Err(_) => {
                // Command payloads are plain data, encoding cannot fail; if it
                // ever does, drop the packet instead of corrupting the chain.
                debug_assert!(false, "command payload encoding failed");
                self.data.truncate(packet_offset);
                return;
            }
        }
        self.data.extend_from_slice(auxiliary);

        if let Some(previous) = self.previous_packet_offset {
            let next_field = previous as usize + 4;
            self.data[next_field..next_field + 4]
                .copy_from_slice(&(packet_offset as u32).to_le_bytes());
        }
        self.previous_packet_offset = Some(packet_offset as u32);
        self.number_of_packets += 1;
    }

    fn reference(&mut self, resource: ResourceId) {
        self.referenced_resources.push(resource);
    }

    pub fn copy_uniform_buffer_data(&mut self, uniform_buffer: ResourceId, data: &[u8]) {
        self.reference(uniform_buffer);
        self.push_packet(
            CommandFunction::CopyUniformBufferData,
            &CommandCopyUniformBufferData {
                uniform_buffer,
                number_of_bytes: data.len() as u32,
            },
            data,
        );
    }

    pub fn copy_texture_buffer_data(&mut self, texture_buffer: ResourceId, data: &[u8]) {
        self.reference(texture_buffer);
        self.push_packet(
            CommandFunction::CopyTextureBufferData,
            &CommandCopyTextureBufferData {
                texture_buffer,
                number_of_bytes: data.len() as u32,
            },
            data,
        );
    }

    pub fn set_graphics_root_signature(&mut self, root_signature: ResourceId) {
        self.reference(root_signature);
        self.push_packet(
            CommandFunction::SetGraphicsRootSignature,
            &CommandSetGraphicsRootSignature { root_signature },
            &[],
        );
    }

    pub fn set_graphics_root_descriptor_table(
        &mut self,
        root_parameter_index: u32,
        resource: ResourceId,
    ) {
        self.reference(resource);
        self.push_packet(
            CommandFunction::SetGraphicsRootDescriptorTable,
            &CommandSetGraphicsRootDescriptorTable {
                root_parameter_index,
                resource,
            },
            &[],
        );
    }

    pub fn set_pipeline_state(&mut self, pipeline_state: ResourceId) {
        self.reference(pipeline_state);
        self.push_packet(
            CommandFunction::SetPipelineState,
            &CommandSetPipelineState { pipeline_state },
            &[],
        );
    }

    pub fn set_vertex_array(&mut self, vertex_array: ResourceId) {
        self.reference(vertex_array);
        self.push_packet(
            CommandFunction::SetVertexArray,
            &CommandSetVertexArray { vertex_array },
            &[],
        );
    }

    pub fn set_primitive_topology(&mut self, primitive_topology: PrimitiveTopology) {
        self.push_packet(
            CommandFunction::SetPrimitiveTopology,
            &CommandSetPrimitiveTopology { primitive_topology },
            &[],
        );
    }

    pub fn set_viewports(&mut self, viewports: &[Viewport]) {
        let mut auxiliary = Vec::with_capacity(viewports.len() * Viewport::PACKED_SIZE);
        for viewport in viewports {
            viewport.write_packed(&mut auxiliary);
        }
        self.push_packet(
            CommandFunction::SetViewports,
            &CommandSetViewports {
                number_of_viewports: viewports.len() as u32,
            },
            &auxiliary,
        );
    }

    pub fn set_scissor_rectangles(&mut self, scissor_rectangles: &[ScissorRectangle]) {
        let mut auxiliary =
            Vec::with_capacity(scissor_rectangles.len() * ScissorRectangle::PACKED_SIZE);
        for scissor_rectangle in scissor_rectangles {
            scissor_rectangle.write_packed(&mut auxiliary);
        }
        self.push_packet(
            CommandFunction::SetScissorRectangles,
            &CommandSetScissorRectangles {
                number_of_scissor_rectangles: scissor_rectangles.len() as u32,
            },
            &auxiliary,
        );
    }

    pub fn set_render_target(&mut self, render_target: Option<ResourceId>) {
        if let Some(render_target) = render_target {
            self.reference(render_target);
        }
        self.push_packet(
            CommandFunction::SetRenderTarget,
            &CommandSetRenderTarget { render_target },
            &[],
        );
    }

    pub fn clear(&mut self, flags: ClearFlags, color: ColorRgba, z: f32, stencil: u32) {
        self.push_packet(
            CommandFunction::Clear,
            &CommandClear {
                flags,
                color,
                z,
                stencil,
            },
            &[],
        );
    }

    pub fn resolve_multisample_framebuffer(
        &mut self,
        destination_render_target: ResourceId,
        source_multisample_framebuffer: ResourceId,
    ) {
        self.reference(destination_render_target);
        self.reference(source_multisample_framebuffer);
        self.push_packet(
            CommandFunction::ResolveMultisampleFramebuffer,
            &CommandResolveMultisampleFramebuffer {
                destination_render_target,
                source_multisample_framebuffer,
            },
            &[],
        );
    }

    pub fn copy_resource(&mut self, destination_resource: ResourceId, source_resource: ResourceId) {
        self.reference(destination_resource);
        self.reference(source_resource);
        self.push_packet(
            CommandFunction::CopyResource,
            &CommandCopyResource {
                destination_resource,
                source_resource,
            },
            &[],
        );
    }

    /// Draw with inline emulation records carried in auxiliary memory.
    pub fn draw(&mut self, draws: &[DrawInstancedArguments]) {
        let mut auxiliary = Vec::with_capacity(draws.len() * DrawInstancedArguments::PACKED_SIZE);
        for arguments in draws {
            arguments.write_packed(&mut auxiliary);
        }
        self.push_packet(
            CommandFunction::Draw,
            &CommandDraw {
                indirect_buffer: None,
                indirect_buffer_offset: 0,
                number_of_draws: draws.len() as u32,
            },
            &auxiliary,
        );
    }

    /// Convenience wrapper recording a single non-indexed draw.
    pub fn draw_single(
        &mut self,
        vertex_count_per_instance: u32,
        instance_count: u32,
        start_vertex_location: u32,
        start_instance_location: u32,
    ) {
        self.draw(&[DrawInstancedArguments {
            vertex_count_per_instance,
            instance_count,
            start_vertex_location,
            start_instance_location,
        }]);
    }

    pub fn draw_indirect(
        &mut self,
        indirect_buffer: ResourceId,
        indirect_buffer_offset: u32,
        number_of_draws: u32,
    ) {
        self.reference(indirect_buffer);
        self.push_packet(
            CommandFunction::Draw,
            &CommandDraw {
                indirect_buffer: Some(indirect_buffer),
                indirect_buffer_offset,
                number_of_draws,
            },
            &[],
        );
    }

    pub fn draw_indexed(&mut self, draws: &[DrawIndexedInstancedArguments]) {
        let mut auxiliary =
            Vec::with_capacity(draws.len() * DrawIndexedInstancedArguments::PACKED_SIZE);
        for arguments in draws {
            arguments.write_packed(&mut auxiliary);
        }
        self.push_packet(
            CommandFunction::DrawIndexed,
            &CommandDrawIndexed {
                indirect_buffer: None,
                indirect_buffer_offset: 0,
                number_of_draws: draws.len() as u32,
            },
            &auxiliary,
        );
    }

    pub fn draw_indexed_single(
        &mut self,
        index_count_per_instance: u32,
        instance_count: u32,
        start_index_location: u32,
        base_vertex_location: i32,
        start_instance_location: u32,
    ) {
        self.draw_indexed(&[DrawIndexedInstancedArguments {
            index_count_per_instance,
            instance_count,
            start_index_location,
            base_vertex_location,
            start_instance_location,
        }]);
    }

    pub fn draw_indexed_indirect(
        &mut self,
        indirect_buffer: ResourceId,
        indirect_buffer_offset: u32,
        number_of_draws: u32,
    ) {
        self.reference(indirect_buffer);
        self.push_packet(
            CommandFunction::DrawIndexed,
            &CommandDrawIndexed {
                indirect_buffer: Some(indirect_buffer),
                indirect_buffer_offset,
                number_of_draws,
            },
            &[],
        );
    }

    pub fn set_debug_marker(&mut self, name: &str) {
        self.push_packet(
            CommandFunction::SetDebugMarker,
            &CommandSetDebugMarker {
                name_length: name.len() as u32,
            },
            name.as_bytes(),
        );
    }

    pub fn begin_debug_event(&mut self, name: &str) {
        self.push_packet(
            CommandFunction::BeginDebugEvent,
            &CommandBeginDebugEvent {
                name_length: name.len() as u32,
            },
            name.as_bytes(),
        );
    }

    pub fn end_debug_event(&mut self) {
        self.push_packet(CommandFunction::EndDebugEvent, &CommandEndDebugEvent {}, &[]);
    }
}

#[derive(Debug)]
pub struct CommandPacketIter<'a> {
    data: &'a [u8],
    next_offset: Option<u32>,
}

impl<'a> Iterator for CommandPacketIter<'a> {
    type Item = CommandPacket<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.next_offset.take()? as usize;
        if offset + PACKET_HEADER_SIZE > self.data.len() {
            return None;
        }
        let field = |index: usize| -> u32 {
            let start = offset + index * 4;
            u32::from_le_bytes(self.data[start..start + 4].try_into().unwrap_or([0; 4]))
        };
        let function_index = field(0);
        let next_packet = field(1);
        let payload_size = field(2) as usize;
        let auxiliary_size = field(3) as usize;

        let payload_start = offset + PACKET_HEADER_SIZE;
        let auxiliary_start = payload_start + payload_size;
        let packet_end = auxiliary_start + auxiliary_size;
        if packet_end > self.data.len() {
            return None;
        }
        if next_packet != NEXT_PACKET_SENTINEL {
            self.next_offset = Some(next_packet);
        }
        Some(CommandPacket {
            function_index,
            payload: &self.data[payload_start..auxiliary_start],
            auxiliary: &self.data[auxiliary_start..packet_end],
        })
    }
}
