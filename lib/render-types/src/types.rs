use bincode::{BorrowDecode, Decode, Encode};
use bitflags::bitflags;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};

/// Opaque platform window handle, e.g. an `HWND` or X11 window id.
pub type NativeWindowHandle = u64;

/// Identity of a renderer instance. Resources remember which renderer
/// created them; every operation consuming a resource re-checks this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub struct RendererId(pub u64);

/// Handle to a renderer-owned resource. Plain index, only meaningful
/// together with the renderer that handed it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct ResourceId(pub u64);

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode)]
#[repr(u32)]
pub enum ResourceType {
    RootSignature = 0,
    Program,
    VertexArray,
    SwapChain,
    Framebuffer,
    IndexBuffer,
    VertexBuffer,
    UniformBuffer,
    TextureBuffer,
    IndirectBuffer,
    Texture2d,
    Texture2dArray,
    PipelineState,
    SamplerState,
    VertexShader,
    TessControlShader,
    TessEvalShader,
    GeometryShader,
    FragmentShader,
}

impl ResourceType {
    pub const COUNT: usize = 19;

    pub const ALL: [ResourceType; Self::COUNT] = [
        ResourceType::RootSignature,
        ResourceType::Program,
        ResourceType::VertexArray,
        ResourceType::SwapChain,
        ResourceType::Framebuffer,
        ResourceType::IndexBuffer,
        ResourceType::VertexBuffer,
        ResourceType::UniformBuffer,
        ResourceType::TextureBuffer,
        ResourceType::IndirectBuffer,
        ResourceType::Texture2d,
        ResourceType::Texture2dArray,
        ResourceType::PipelineState,
        ResourceType::SamplerState,
        ResourceType::VertexShader,
        ResourceType::TessControlShader,
        ResourceType::TessEvalShader,
        ResourceType::GeometryShader,
        ResourceType::FragmentShader,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ResourceType::RootSignature => "root signature",
            ResourceType::Program => "program",
            ResourceType::VertexArray => "vertex array",
            ResourceType::SwapChain => "swap chain",
            ResourceType::Framebuffer => "framebuffer",
            ResourceType::IndexBuffer => "index buffer",
            ResourceType::VertexBuffer => "vertex buffer",
            ResourceType::UniformBuffer => "uniform buffer",
            ResourceType::TextureBuffer => "texture buffer",
            ResourceType::IndirectBuffer => "indirect buffer",
            ResourceType::Texture2d => "2d texture",
            ResourceType::Texture2dArray => "2d texture array",
            ResourceType::PipelineState => "pipeline state",
            ResourceType::SamplerState => "sampler state",
            ResourceType::VertexShader => "vertex shader",
            ResourceType::TessControlShader => "tessellation control shader",
            ResourceType::TessEvalShader => "tessellation evaluation shader",
            ResourceType::GeometryShader => "geometry shader",
            ResourceType::FragmentShader => "fragment shader",
        }
    }
}

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode, Serialize,
    Deserialize,
)]
#[repr(u32)]
pub enum TextureFormat {
    R8 = 0,
    #[default]
    Rgba8,
    Rgba16F,
    Rgba32F,
    Bc1,
    Bc2,
    Bc3,
    D32Float,
    Unknown,
}

impl TextureFormat {
    /// Bytes of one texel for the uncompressed formats, `None` for
    /// block-compressed ones.
    pub fn bytes_per_texel(&self) -> Option<usize> {
        match self {
            TextureFormat::R8 => Some(1),
            TextureFormat::Rgba8 => Some(4),
            TextureFormat::Rgba16F => Some(8),
            TextureFormat::Rgba32F => Some(16),
            TextureFormat::D32Float => Some(4),
            TextureFormat::Bc1 | TextureFormat::Bc2 | TextureFormat::Bc3 => None,
            TextureFormat::Unknown => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode)]
#[repr(u32)]
pub enum IndexBufferFormat {
    #[default]
    U16 = 0,
    U32,
}

impl IndexBufferFormat {
    pub fn byte_size(&self) -> usize {
        match self {
            IndexBufferFormat::U16 => 2,
            IndexBufferFormat::U32 => 4,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum BufferUsage {
    #[default]
    StaticDraw,
    DynamicDraw,
    StreamDraw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum MapType {
    Read,
    Write,
    ReadWrite,
    WriteDiscard,
    WriteNoOverwrite,
}

impl MapType {
    pub fn wants_read(&self) -> bool {
        matches!(self, MapType::Read | MapType::ReadWrite)
    }

    pub fn wants_write(&self) -> bool {
        !matches!(self, MapType::Read)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MapFlags: u32 {
        const DO_NOT_WAIT = 1 << 0;
    }
}

/// Result of a successful `map()`. `data` stays valid until the matching
/// `unmap()`; the registry must not be mutated in between (single submission
/// thread contract).
#[derive(Debug, Clone, Copy)]
pub struct MappedSubresource {
    pub data: *mut u8,
    pub row_pitch: u32,
    pub depth_pitch: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode)]
#[repr(u32)]
pub enum PrimitiveTopology {
    Unknown = 0,
    PointList = 1,
    LineList = 2,
    LineStrip = 3,
    #[default]
    TriangleList = 4,
    TriangleStrip = 5,
}

/// Top-left origin viewport rectangle. Backends whose native API counts from
/// the bottom-left flip against the current render target height.
#[derive(Debug, Default, Clone, Copy, PartialEq, Encode, Decode)]
pub struct Viewport {
    pub top_left_x: f32,
    pub top_left_y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Packed size of one viewport record in command auxiliary memory.
    pub const PACKED_SIZE: usize = 24;

    pub fn from_size(width: f32, height: f32) -> Self {
        Self {
            top_left_x: 0.0,
            top_left_y: 0.0,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn write_packed(&self, out: &mut Vec<u8>) {
        for value in [
            self.top_left_x,
            self.top_left_y,
            self.width,
            self.height,
            self.min_depth,
            self.max_depth,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }

    pub fn read_packed(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::PACKED_SIZE {
            return None;
        }
        let mut values = [0.0f32; 6];
        for (i, value) in values.iter_mut().enumerate() {
            *value = f32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().ok()?);
        }
        Some(Self {
            top_left_x: values[0],
            top_left_y: values[1],
            width: values[2],
            height: values[3],
            min_depth: values[4],
            max_depth: values[5],
        })
    }
}

/// Top-left origin scissor rectangle, half-open like a D3D `RECT`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct ScissorRectangle {
    pub top_left_x: i32,
    pub top_left_y: i32,
    pub bottom_right_x: i32,
    pub bottom_right_y: i32,
}

impl ScissorRectangle {
    pub const PACKED_SIZE: usize = 16;

    pub fn write_packed(&self, out: &mut Vec<u8>) {
        for value in [
            self.top_left_x,
            self.top_left_y,
            self.bottom_right_x,
            self.bottom_right_y,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }

    pub fn read_packed(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::PACKED_SIZE {
            return None;
        }
        let mut values = [0i32; 4];
        for (i, value) in values.iter_mut().enumerate() {
            *value = i32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().ok()?);
        }
        Some(Self {
            top_left_x: values[0],
            top_left_y: values[1],
            bottom_right_x: values[2],
            bottom_right_y: values[3],
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ClearFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

impl Encode for ClearFlags {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> Result<(), bincode::error::EncodeError> {
        self.bits().encode(encoder)
    }
}

impl Decode for ClearFlags {
    fn decode<D: bincode::de::Decoder>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        Ok(Self::from_bits_retain(u32::decode(decoder)?))
    }
}

impl<'de> BorrowDecode<'de> for ClearFlags {
    fn borrow_decode<D: bincode::de::BorrowDecoder<'de>>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        Self::decode(decoder)
    }
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct ColorRgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ColorRgba {
    pub const BLACK: ColorRgba = ColorRgba::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: ColorRgba = ColorRgba::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn as_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl From<[f32; 4]> for ColorRgba {
    fn from(value: [f32; 4]) -> Self {
        Self::new(value[0], value[1], value[2], value[3])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum ShaderLanguage {
    Glsl,
    Essl,
    Hlsl,
    SpirV,
    /// Consumes everything, produces nothing.
    Null,
}

/// Flat capability set of one renderer backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub maximum_number_of_viewports: u32,
    pub maximum_number_of_simultaneous_render_targets: u32,
    pub maximum_texture_dimension: u32,
    pub maximum_number_of_2d_texture_array_slices: u32,
    pub maximum_uniform_buffer_size: u32,
    pub maximum_texture_buffer_size: u32,
    pub maximum_indirect_buffer_size: u32,
    pub maximum_number_of_multisamples: u8,
    pub individual_uniforms: bool,
    pub instanced_arrays: bool,
    pub draw_instanced: bool,
    pub base_vertex: bool,
    pub native_multi_threading: bool,
    pub vertex_shader: bool,
    pub fragment_shader: bool,
    pub geometry_shader: bool,
    pub tessellation_shaders: bool,
    pub maximum_number_of_patch_vertices: u32,
    pub maximum_number_of_gs_output_vertices: u32,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            maximum_number_of_viewports: 1,
            maximum_number_of_simultaneous_render_targets: 1,
            maximum_texture_dimension: 2048,
            maximum_number_of_2d_texture_array_slices: 0,
            maximum_uniform_buffer_size: 0,
            maximum_texture_buffer_size: 0,
            maximum_indirect_buffer_size: 0,
            maximum_number_of_multisamples: 1,
            individual_uniforms: false,
            instanced_arrays: false,
            draw_instanced: false,
            base_vertex: false,
            native_multi_threading: false,
            vertex_shader: true,
            fragment_shader: true,
            geometry_shader: false,
            tessellation_shaders: false,
            maximum_number_of_patch_vertices: 0,
            maximum_number_of_gs_output_vertices: 0,
        }
    }
}

/// One entry of indirect-buffer emulation data for a non-indexed draw.
/// The packed layout is the wire layout inside indirect buffers and command
/// auxiliary memory, so the record is written field by field, little-endian.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct DrawInstancedArguments {
    pub vertex_count_per_instance: u32,
    pub instance_count: u32,
    pub start_vertex_location: u32,
    pub start_instance_location: u32,
}

impl DrawInstancedArguments {
    pub const PACKED_SIZE: usize = 16;

    pub fn write_packed(&self, out: &mut Vec<u8>) {
        for value in [
            self.vertex_count_per_instance,
            self.instance_count,
            self.start_vertex_location,
            self.start_instance_location,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }

    pub fn read_packed(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::PACKED_SIZE {
            return None;
        }
        let mut values = [0u32; 4];
        for (i, value) in values.iter_mut().enumerate() {
            *value = u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().ok()?);
        }
        Some(Self {
            vertex_count_per_instance: values[0],
            instance_count: values[1],
            start_vertex_location: values[2],
            start_instance_location: values[3],
        })
    }
}

/// One entry of indirect-buffer emulation data for an indexed draw.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct DrawIndexedInstancedArguments {
    pub index_count_per_instance: u32,
    pub instance_count: u32,
    pub start_index_location: u32,
    pub base_vertex_location: i32,
    pub start_instance_location: u32,
}

impl DrawIndexedInstancedArguments {
    pub const PACKED_SIZE: usize = 20;

    pub fn write_packed(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.index_count_per_instance.to_le_bytes());
        out.extend_from_slice(&self.instance_count.to_le_bytes());
        out.extend_from_slice(&self.start_index_location.to_le_bytes());
        out.extend_from_slice(&self.base_vertex_location.to_le_bytes());
        out.extend_from_slice(&self.start_instance_location.to_le_bytes());
    }

    pub fn read_packed(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::PACKED_SIZE {
            return None;
        }
        let u = |i: usize| -> Option<u32> {
            Some(u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().ok()?))
        };
        Some(Self {
            index_count_per_instance: u(0)?,
            instance_count: u(1)?,
            start_index_location: u(2)?,
            base_vertex_location: u(3)? as i32,
            start_instance_location: u(4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_packed_round_trip() {
        let viewport = Viewport {
            top_left_x: 0.0,
            top_left_y: 10.0,
            width: 100.0,
            height: 50.0,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let mut bytes = Vec::new();
        viewport.write_packed(&mut bytes);
        assert_eq!(bytes.len(), Viewport::PACKED_SIZE);
        assert_eq!(Viewport::read_packed(&bytes), Some(viewport));
    }

    #[test]
    fn draw_arguments_packed_layout_is_little_endian() {
        let args = DrawInstancedArguments {
            vertex_count_per_instance: 3,
            instance_count: 1,
            start_vertex_location: 0,
            start_instance_location: 0,
        };
        let mut bytes = Vec::new();
        args.write_packed(&mut bytes);
        assert_eq!(bytes[0..4], [3, 0, 0, 0]);
        assert_eq!(DrawInstancedArguments::read_packed(&bytes), Some(args));
    }

    #[test]
    fn indexed_draw_arguments_preserve_negative_base_vertex() {
        let args = DrawIndexedInstancedArguments {
            index_count_per_instance: 6,
            instance_count: 2,
            start_index_location: 3,
            base_vertex_location: -4,
            start_instance_location: 0,
        };
        let mut bytes = Vec::new();
        args.write_packed(&mut bytes);
        assert_eq!(
            DrawIndexedInstancedArguments::read_packed(&bytes),
            Some(args)
        );
    }
}
