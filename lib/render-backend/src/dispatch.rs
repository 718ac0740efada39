//! Command submission: walks a command buffer's packet chain and invokes one
//! dispatch function per packet. The dispatch table is a static array of
//! function pointers indexed by the packet's dispatch-function index; the
//! array length is the variant count, so a missing entry is a compile error,
//! not a runtime surprise.

use bincode::Decode;
use render_backend_traits::traits::CommandReceiver;
use render_backend_traits::types::CommandError;
use render_types::command_buffer::{CommandBuffer, CommandPacket};
use render_types::commands::{
    CommandBeginDebugEvent, CommandClear, CommandCopyResource, CommandCopyTextureBufferData,
    CommandCopyUniformBufferData, CommandDraw, CommandDrawIndexed, CommandFunction,
    CommandResolveMultisampleFramebuffer, CommandSetDebugMarker,
    CommandSetGraphicsRootDescriptorTable, CommandSetGraphicsRootSignature,
    CommandSetPipelineState, CommandSetPrimitiveTopology, CommandSetRenderTarget,
    CommandSetScissorRectangles, CommandSetVertexArray, CommandSetViewports,
};
use render_types::types::{ScissorRectangle, Viewport};

pub type CommandDispatchFunction =
    fn(&CommandPacket<'_>, &mut dyn CommandReceiver) -> Result<(), CommandError>;

/// Table arity == command variant count by construction; adding a command
/// variant without adding an entry here fails to compile.
pub static COMMAND_DISPATCH_TABLE: [CommandDispatchFunction; CommandFunction::COUNT] = [
    copy_uniform_buffer_data,
    copy_texture_buffer_data,
    set_graphics_root_signature,
    set_graphics_root_descriptor_table,
    set_pipeline_state,
    set_vertex_array,
    set_primitive_topology,
    set_viewports,
    set_scissor_rectangles,
    set_render_target,
    clear,
    resolve_multisample_framebuffer,
    copy_resource,
    draw,
    draw_indexed,
    set_debug_marker,
    begin_debug_event,
    end_debug_event,
];

/// True for packets that stream data into resources rather than changing
/// render state; these still execute outside an open scene.
pub fn is_upload_function(function: CommandFunction) -> bool {
    matches!(
        function,
        CommandFunction::CopyUniformBufferData | CommandFunction::CopyTextureBufferData
    )
}

/// Walks the chain head to sentinel. Per-packet failures are absorbed with a
/// diagnostic; an out-of-range dispatch-function index ends the walk since
/// the chain can no longer be trusted.
pub fn dispatch_command_buffer(command_buffer: &CommandBuffer, receiver: &mut dyn CommandReceiver) {
    dispatch_filtered(command_buffer, receiver, |_| true)
}

pub fn dispatch_filtered(
    command_buffer: &CommandBuffer,
    receiver: &mut dyn CommandReceiver,
    mut wanted: impl FnMut(CommandFunction) -> bool,
) {
    for packet in command_buffer.iter() {
        let Some(function) = packet.function() else {
            let error = CommandError::UnknownFunction {
                function_index: packet.function_index,
            };
            log::error!("command buffer corrupt, dropping the rest of the submission: {error}");
            return;
        };
        if !wanted(function) {
            continue;
        }
        if let Err(error) = COMMAND_DISPATCH_TABLE[function as usize](&packet, receiver) {
            log::error!("command {function:?} dropped: {error}");
        }
    }
}

fn decode_payload<T: Decode>(packet: &CommandPacket<'_>) -> Result<T, CommandError> {
    bincode::decode_from_slice(packet.payload, bincode::config::standard())
        .map(|(payload, _)| payload)
        .map_err(|error| CommandError::CorruptPacket {
            function_index: packet.function_index,
            reason: error.to_string(),
        })
}

fn auxiliary_text<'a>(packet: &CommandPacket<'a>, length: u32) -> Result<&'a str, CommandError> {
    let bytes = packet
        .auxiliary
        .get(..length as usize)
        .ok_or_else(|| CommandError::CorruptPacket {
            function_index: packet.function_index,
            reason: "auxiliary memory shorter than the declared text".into(),
        })?;
    std::str::from_utf8(bytes).map_err(|_| CommandError::CorruptPacket {
        function_index: packet.function_index,
        reason: "debug text is not valid UTF-8".into(),
    })
}

fn copy_uniform_buffer_data(
    packet: &CommandPacket<'_>,
    receiver: &mut dyn CommandReceiver,
) -> Result<(), CommandError> {
    let payload: CommandCopyUniformBufferData = decode_payload(packet)?;
    receiver.copy_uniform_buffer_data(payload.uniform_buffer, packet.auxiliary);
    Ok(())
}

fn copy_texture_buffer_data(
    packet: &CommandPacket<'_>,
    receiver: &mut dyn CommandReceiver,
) -> Result<(), CommandError> {
    let payload: CommandCopyTextureBufferData = decode_payload(packet)?;
    receiver.copy_texture_buffer_data(payload.texture_buffer, packet.auxiliary);
    Ok(())
}

fn set_graphics_root_signature(
    packet: &CommandPacket<'_>,
    receiver: &mut dyn CommandReceiver,
) -> Result<(), CommandError> {
    let payload: CommandSetGraphicsRootSignature = decode_payload(packet)?;
    receiver.set_graphics_root_signature(payload.root_signature);
    Ok(())
}

fn set_graphics_root_descriptor_table(
    packet: &CommandPacket<'_>,
    receiver: &mut dyn CommandReceiver,
) -> Result<(), CommandError> {
    let payload: CommandSetGraphicsRootDescriptorTable = decode_payload(packet)?;
    receiver.set_graphics_root_descriptor_table(payload.root_parameter_index, payload.resource);
    Ok(())
}

fn set_pipeline_state(
    packet: &CommandPacket<'_>,
    receiver: &mut dyn CommandReceiver,
) -> Result<(), CommandError> {
    let payload: CommandSetPipelineState = decode_payload(packet)?;
    receiver.set_pipeline_state(payload.pipeline_state);
    Ok(())
}

fn set_vertex_array(
    packet: &CommandPacket<'_>,
    receiver: &mut dyn CommandReceiver,
) -> Result<(), CommandError> {
    let payload: CommandSetVertexArray = decode_payload(packet)?;
    receiver.ia_set_vertex_array(payload.vertex_array);
    Ok(())
}

fn set_primitive_topology(
    packet: &CommandPacket<'_>,
    receiver: &mut dyn CommandReceiver,
) -> Result<(), CommandError> {
    let payload: CommandSetPrimitiveTopology = decode_payload(packet)?;
    receiver.ia_set_primitive_topology(payload.primitive_topology);
    Ok(())
}

fn set_viewports(
    packet: &CommandPacket<'_>,
    receiver: &mut dyn CommandReceiver,
) -> Result<(), CommandError> {
    let payload: CommandSetViewports = decode_payload(packet)?;
    let count = payload.number_of_viewports as usize;
    if packet.auxiliary.len() < count * Viewport::PACKED_SIZE {
        return Err(CommandError::CorruptPacket {
            function_index: packet.function_index,
            reason: "auxiliary memory shorter than the declared viewport array".into(),
        });
    }
    let mut viewports = Vec::with_capacity(count);
    for index in 0..count {
        let start = index * Viewport::PACKED_SIZE;
        if let Some(viewport) = Viewport::read_packed(&packet.auxiliary[start..]) {
            viewports.push(viewport);
        }
    }
    receiver.rs_set_viewports(&viewports);
    Ok(())
}

fn set_scissor_rectangles(
    packet: &CommandPacket<'_>,
    receiver: &mut dyn CommandReceiver,
) -> Result<(), CommandError> {
    let payload: CommandSetScissorRectangles = decode_payload(packet)?;
    let count = payload.number_of_scissor_rectangles as usize;
    if packet.auxiliary.len() < count * ScissorRectangle::PACKED_SIZE {
        return Err(CommandError::CorruptPacket {
            function_index: packet.function_index,
            reason: "auxiliary memory shorter than the declared scissor array".into(),
        });
    }
    let mut scissor_rectangles = Vec::with_capacity(count);
    for index in 0..count {
        let start = index * ScissorRectangle::PACKED_SIZE;
        if let Some(scissor) = ScissorRectangle::read_packed(&packet.auxiliary[start..]) {
            scissor_rectangles.push(scissor);
        }
    }
    receiver.rs_set_scissor_rectangles(&scissor_rectangles);
    Ok(())
}

fn set_render_target(
    packet: &CommandPacket<'_>,
    receiver: &mut dyn CommandReceiver,
) -> Result<(), CommandError> {
    let payload: CommandSetRenderTarget = decode_payload(packet)?;
    receiver.om_set_render_target(payload.render_target);
    Ok(())
}

fn clear(
    packet: &CommandPacket<'_>,
    receiver: &mut dyn CommandReceiver,
) -> Result<(), CommandError> {
    let payload: CommandClear = decode_payload(packet)?;
    receiver.clear(payload.flags, payload.color, payload.z, payload.stencil);
    Ok(())
}

fn resolve_multisample_framebuffer(
    packet: &CommandPacket<'_>,
    receiver: &mut dyn CommandReceiver,
) -> Result<(), CommandError> {
    let payload: CommandResolveMultisampleFramebuffer = decode_payload(packet)?;
    receiver.resolve_multisample_framebuffer(
        payload.destination_render_target,
        payload.source_multisample_framebuffer,
    );
    Ok(())
}

fn copy_resource(
    packet: &CommandPacket<'_>,
    receiver: &mut dyn CommandReceiver,
) -> Result<(), CommandError> {
    let payload: CommandCopyResource = decode_payload(packet)?;
    receiver.copy_resource(payload.destination_resource, payload.source_resource);
    Ok(())
}

fn draw(packet: &CommandPacket<'_>, receiver: &mut dyn CommandReceiver) -> Result<(), CommandError> {
    let payload: CommandDraw = decode_payload(packet)?;
    match payload.indirect_buffer {
        Some(indirect_buffer) => receiver.draw_indirect(
            indirect_buffer,
            payload.indirect_buffer_offset,
            payload.number_of_draws,
        ),
        None => receiver.draw_emulated(
            packet.auxiliary,
            payload.indirect_buffer_offset,
            payload.number_of_draws,
        ),
    }
    Ok(())
}

fn draw_indexed(
    packet: &CommandPacket<'_>,
    receiver: &mut dyn CommandReceiver,
) -> Result<(), CommandError> {
    let payload: CommandDrawIndexed = decode_payload(packet)?;
    match payload.indirect_buffer {
        Some(indirect_buffer) => receiver.draw_indexed_indirect(
            indirect_buffer,
            payload.indirect_buffer_offset,
            payload.number_of_draws,
        ),
        None => receiver.draw_indexed_emulated(
            packet.auxiliary,
            payload.indirect_buffer_offset,
            payload.number_of_draws,
        ),
    }
    Ok(())
}

fn set_debug_marker(
    packet: &CommandPacket<'_>,
    receiver: &mut dyn CommandReceiver,
) -> Result<(), CommandError> {
    let payload: CommandSetDebugMarker = decode_payload(packet)?;
    let name = auxiliary_text(packet, payload.name_length)?;
    receiver.set_debug_marker(name);
    Ok(())
}

fn begin_debug_event(
    packet: &CommandPacket<'_>,
    receiver: &mut dyn CommandReceiver,
) -> Result<(), CommandError> {
    let payload: CommandBeginDebugEvent = decode_payload(packet)?;
    let name = auxiliary_text(packet, payload.name_length)?;
    receiver.begin_debug_event(name);
    Ok(())
}

fn end_debug_event(
    _packet: &CommandPacket<'_>,
    receiver: &mut dyn CommandReceiver,
) -> Result<(), CommandError> {
    receiver.end_debug_event();
    Ok(())
}

#[cfg(test)]
mod tests {
    use render_types::types::{ClearFlags, ColorRgba, PrimitiveTopology, ResourceId};

    use super::*;

    /// Records every receiver call with its argument values.
    #[derive(Debug, Default)]
    struct RecordingReceiver {
        calls: Vec<String>,
    }

    impl CommandReceiver for RecordingReceiver {
        fn copy_uniform_buffer_data(&mut self, uniform_buffer: ResourceId, data: &[u8]) {
            self.calls
                .push(format!("copy_uniform_buffer_data({uniform_buffer}, {} bytes)", data.len()));
        }
        fn copy_texture_buffer_data(&mut self, texture_buffer: ResourceId, data: &[u8]) {
            self.calls
                .push(format!("copy_texture_buffer_data({texture_buffer}, {} bytes)", data.len()));
        }
        fn set_graphics_root_signature(&mut self, root_signature: ResourceId) {
            self.calls.push(format!("set_graphics_root_signature({root_signature})"));
        }
        fn set_graphics_root_descriptor_table(
            &mut self,
            root_parameter_index: u32,
            resource: ResourceId,
        ) {
            self.calls.push(format!(
                "set_graphics_root_descriptor_table({root_parameter_index}, {resource})"
            ));
        }
        fn set_pipeline_state(&mut self, pipeline_state: ResourceId) {
            self.calls.push(format!("set_pipeline_state({pipeline_state})"));
        }
        fn ia_set_vertex_array(&mut self, vertex_array: ResourceId) {
            self.calls.push(format!("ia_set_vertex_array({vertex_array})"));
        }
        fn ia_set_primitive_topology(&mut self, primitive_topology: PrimitiveTopology) {
            self.calls
                .push(format!("ia_set_primitive_topology({primitive_topology:?})"));
        }
        fn rs_set_viewports(&mut self, viewports: &[render_types::types::Viewport]) {
            self.calls.push(format!("rs_set_viewports({})", viewports.len()));
        }
        fn rs_set_scissor_rectangles(
            &mut self,
            scissor_rectangles: &[render_types::types::ScissorRectangle],
        ) {
            self.calls
                .push(format!("rs_set_scissor_rectangles({})", scissor_rectangles.len()));
        }
        fn om_set_render_target(&mut self, render_target: Option<ResourceId>) {
            self.calls.push(format!("om_set_render_target({render_target:?})"));
        }
        fn clear(&mut self, flags: ClearFlags, color: ColorRgba, z: f32, stencil: u32) {
            self.calls.push(format!(
                "clear({:#x}, [{}, {}, {}, {}], {z}, {stencil})",
                flags.bits(),
                color.r,
                color.g,
                color.b,
                color.a
            ));
        }
        fn draw_emulated(&mut self, emulation_data: &[u8], offset: u32, number_of_draws: u32) {
            self.calls.push(format!(
                "draw_emulated({} bytes, {offset}, {number_of_draws})",
                emulation_data.len()
            ));
        }
        fn draw_indexed_emulated(
            &mut self,
            emulation_data: &[u8],
            offset: u32,
            number_of_draws: u32,
        ) {
            self.calls.push(format!(
                "draw_indexed_emulated({} bytes, {offset}, {number_of_draws})",
                emulation_data.len()
            ));
        }
        fn draw_indirect(&mut self, indirect_buffer: ResourceId, offset: u32, number_of_draws: u32) {
            self.calls
                .push(format!("draw_indirect({indirect_buffer}, {offset}, {number_of_draws})"));
        }
        fn draw_indexed_indirect(
            &mut self,
            indirect_buffer: ResourceId,
            offset: u32,
            number_of_draws: u32,
        ) {
            self.calls.push(format!(
                "draw_indexed_indirect({indirect_buffer}, {offset}, {number_of_draws})"
            ));
        }
        fn resolve_multisample_framebuffer(
            &mut self,
            destination_render_target: ResourceId,
            source_multisample_framebuffer: ResourceId,
        ) {
            self.calls.push(format!(
                "resolve_multisample_framebuffer({destination_render_target}, {source_multisample_framebuffer})"
            ));
        }
        fn copy_resource(&mut self, destination_resource: ResourceId, source_resource: ResourceId) {
            self.calls
                .push(format!("copy_resource({destination_resource}, {source_resource})"));
        }
        fn set_debug_marker(&mut self, name: &str) {
            self.calls.push(format!("set_debug_marker({name})"));
        }
        fn begin_debug_event(&mut self, name: &str) {
            self.calls.push(format!("begin_debug_event({name})"));
        }
        fn end_debug_event(&mut self) {
            self.calls.push("end_debug_event".into());
        }
    }

    #[test]
    fn packet_round_trip_preserves_order_and_arguments() {
        let mut command_buffer = CommandBuffer::new();
        command_buffer.set_pipeline_state(ResourceId(7));
        command_buffer.set_vertex_array(ResourceId(9));
        command_buffer.draw_single(3, 1, 0, 0);

        let mut receiver = RecordingReceiver::default();
        dispatch_command_buffer(&command_buffer, &mut receiver);
        assert_eq!(
            receiver.calls,
            [
                "set_pipeline_state(#7)",
                "ia_set_vertex_array(#9)",
                "draw_emulated(16 bytes, 0, 1)",
            ]
        );
    }

    #[test]
    fn clear_arguments_survive_the_round_trip() {
        let mut command_buffer = CommandBuffer::new();
        command_buffer.clear(ClearFlags::COLOR, ColorRgba::new(1.0, 0.0, 0.0, 1.0), 1.0, 0);

        let mut receiver = RecordingReceiver::default();
        dispatch_command_buffer(&command_buffer, &mut receiver);
        assert_eq!(receiver.calls, ["clear(0x1, [1, 0, 0, 1], 1, 0)"]);
    }

    #[test]
    fn debug_text_travels_through_auxiliary_memory() {
        let mut command_buffer = CommandBuffer::new();
        command_buffer.begin_debug_event("shadow pass");
        command_buffer.set_debug_marker("cascade 0");
        command_buffer.end_debug_event();

        let mut receiver = RecordingReceiver::default();
        dispatch_command_buffer(&command_buffer, &mut receiver);
        assert_eq!(
            receiver.calls,
            [
                "begin_debug_event(shadow pass)",
                "set_debug_marker(cascade 0)",
                "end_debug_event",
            ]
        );
    }

    #[test]
    fn filtered_dispatch_keeps_upload_packets_only() {
        let mut command_buffer = CommandBuffer::new();
        command_buffer.copy_uniform_buffer_data(ResourceId(1), &[0u8; 64]);
        command_buffer.clear(ClearFlags::COLOR, ColorRgba::BLACK, 1.0, 0);

        let mut receiver = RecordingReceiver::default();
        dispatch_filtered(&command_buffer, &mut receiver, is_upload_function);
        assert_eq!(receiver.calls, ["copy_uniform_buffer_data(#1, 64 bytes)"]);
    }

    #[test]
    fn indirect_draws_route_to_the_indirect_entry_point() {
        let mut command_buffer = CommandBuffer::new();
        command_buffer.draw_indirect(ResourceId(5), 32, 4);
        command_buffer.draw_indexed_indirect(ResourceId(6), 0, 2);

        let mut receiver = RecordingReceiver::default();
        dispatch_command_buffer(&command_buffer, &mut receiver);
        assert_eq!(
            receiver.calls,
            ["draw_indirect(#5, 32, 4)", "draw_indexed_indirect(#6, 0, 2)"]
        );
    }
}
