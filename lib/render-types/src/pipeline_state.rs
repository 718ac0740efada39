//! Immutable draw configuration. A pipeline state, once created, never
//! changes; a different configuration is a different pipeline state, keyed
//! by the structural hash of its descriptor.

use std::hash::{Hash, Hasher};

use bincode::{BorrowDecode, Decode, Encode};
use bitflags::bitflags;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::sampler::ComparisonFunc;
use crate::types::{PrimitiveTopology, ResourceId};

pub const MAXIMUM_NUMBER_OF_RENDER_TARGETS: usize = 8;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode)]
#[repr(u32)]
pub enum FillMode {
    Wireframe = 2,
    #[default]
    Solid = 3,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode)]
#[repr(u32)]
pub enum CullMode {
    None = 1,
    Front = 2,
    #[default]
    Back = 3,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode)]
#[repr(u32)]
pub enum ConservativeRasterizationMode {
    #[default]
    Off = 0,
    On = 1,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode)]
#[repr(u32)]
pub enum DepthWriteMask {
    Zero = 0,
    #[default]
    All = 1,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode)]
#[repr(u32)]
pub enum StencilOp {
    #[default]
    Keep = 1,
    Zero = 2,
    Replace = 3,
    IncrSat = 4,
    DecrSat = 5,
    Invert = 6,
    Incr = 7,
    Decr = 8,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode)]
#[repr(u32)]
pub enum Blend {
    Zero = 1,
    #[default]
    One = 2,
    SrcColor = 3,
    InvSrcColor = 4,
    SrcAlpha = 5,
    InvSrcAlpha = 6,
    DestAlpha = 7,
    InvDestAlpha = 8,
    DestColor = 9,
    InvDestColor = 10,
    SrcAlphaSat = 11,
    BlendFactor = 14,
    InvBlendFactor = 15,
    Src1Color = 16,
    InvSrc1Color = 17,
    Src1Alpha = 18,
    InvSrc1Alpha = 19,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode)]
#[repr(u32)]
pub enum BlendOp {
    #[default]
    Add = 1,
    Subtract = 2,
    RevSubtract = 3,
    Min = 4,
    Max = 5,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ColorWriteMask: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        Self::ALL
    }
}

impl Encode for ColorWriteMask {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> Result<(), bincode::error::EncodeError> {
        self.bits().encode(encoder)
    }
}

impl Decode for ColorWriteMask {
    fn decode<D: bincode::de::Decoder>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        Ok(Self::from_bits_retain(u8::decode(decoder)?))
    }
}

impl<'de> BorrowDecode<'de> for ColorWriteMask {
    fn borrow_decode<D: bincode::de::BorrowDecoder<'de>>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        Self::decode(decoder)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct RasterizerState {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip_enable: bool,
    pub multisample_enable: bool,
    pub antialiased_line_enable: bool,
    pub forced_sample_count: u32,
    pub conservative_rasterization_mode: ConservativeRasterizationMode,
    pub scissor_enable: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::Back,
            front_counter_clockwise: false,
            depth_bias: 0,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_clip_enable: true,
            multisample_enable: false,
            antialiased_line_enable: false,
            forced_sample_count: 0,
            conservative_rasterization_mode: ConservativeRasterizationMode::Off,
            scissor_enable: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct StencilOpDesc {
    pub stencil_fail_op: StencilOp,
    pub stencil_depth_fail_op: StencilOp,
    pub stencil_pass_op: StencilOp,
    pub stencil_func: ComparisonFunc,
}

impl StencilOpDesc {
    fn default_face() -> Self {
        Self {
            stencil_fail_op: StencilOp::Keep,
            stencil_depth_fail_op: StencilOp::Keep,
            stencil_pass_op: StencilOp::Keep,
            stencil_func: ComparisonFunc::Always,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct DepthStencilState {
    pub depth_enable: bool,
    pub depth_write_mask: DepthWriteMask,
    pub depth_func: ComparisonFunc,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front_face: StencilOpDesc,
    pub back_face: StencilOpDesc,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write_mask: DepthWriteMask::All,
            depth_func: ComparisonFunc::Less,
            stencil_enable: false,
            stencil_read_mask: 0xff,
            stencil_write_mask: 0xff,
            front_face: StencilOpDesc::default_face(),
            back_face: StencilOpDesc::default_face(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct RenderTargetBlendDesc {
    pub blend_enable: bool,
    pub src_blend: Blend,
    pub dest_blend: Blend,
    pub blend_op: BlendOp,
    pub src_blend_alpha: Blend,
    pub dest_blend_alpha: Blend,
    pub blend_op_alpha: BlendOp,
    pub render_target_write_mask: ColorWriteMask,
}

impl Default for RenderTargetBlendDesc {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_blend: Blend::One,
            dest_blend: Blend::Zero,
            blend_op: BlendOp::Add,
            src_blend_alpha: Blend::One,
            dest_blend_alpha: Blend::Zero,
            blend_op_alpha: BlendOp::Add,
            render_target_write_mask: ColorWriteMask::ALL,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Encode, Decode)]
pub struct BlendState {
    pub alpha_to_coverage_enable: bool,
    pub independent_blend_enable: bool,
    pub render_targets: [RenderTargetBlendDesc; MAXIMUM_NUMBER_OF_RENDER_TARGETS],
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode)]
#[repr(u32)]
pub enum VertexAttributeFormat {
    Float1 = 0,
    Float2,
    #[default]
    Float3,
    Float4,
    R8G8B8A8Unorm,
    R8G8B8A8Uint,
    Short2,
    Short4,
    Uint1,
}

impl VertexAttributeFormat {
    pub fn number_of_bytes(&self) -> usize {
        match self {
            VertexAttributeFormat::Float1 | VertexAttributeFormat::Uint1 => 4,
            VertexAttributeFormat::Float2 => 8,
            VertexAttributeFormat::Float3 => 12,
            VertexAttributeFormat::Float4 => 16,
            VertexAttributeFormat::R8G8B8A8Unorm | VertexAttributeFormat::R8G8B8A8Uint => 4,
            VertexAttributeFormat::Short2 => 4,
            VertexAttributeFormat::Short4 => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct VertexAttribute {
    pub vertex_attribute_format: VertexAttributeFormat,
    /// Attribute name for shader languages binding by name; at most 32 bytes
    /// on disk.
    pub name: String,
    pub semantic_index: u32,
    pub input_slot: u32,
    pub aligned_byte_offset: u32,
    /// 0: per-vertex data; n > 0: advance per n instances.
    pub instances_per_element: u32,
}

/// Full descriptor a pipeline state is created from. Immutable after
/// creation; identity is the structural hash.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct PipelineStateDescriptor {
    pub root_signature: ResourceId,
    /// Compiled shader stages. `None` only makes sense for stageless
    /// configurations and is rejected by factories otherwise.
    pub program: Option<ResourceId>,
    pub vertex_attributes: Vec<VertexAttribute>,
    pub primitive_topology: PrimitiveTopology,
    pub rasterizer_state: RasterizerState,
    pub depth_stencil_state: DepthStencilState,
    pub blend_state: BlendState,
}

impl PipelineStateDescriptor {
    /// Hash over the encoded descriptor bytes. Two structurally equal
    /// descriptors hash identically; any field change produces a different
    /// pipeline-state key.
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        match bincode::encode_to_vec(self, bincode::config::standard()) {
            Ok(bytes) => bytes.hash(&mut hasher),
            Err(_) => {
                debug_assert!(false, "pipeline state descriptor encoding cannot fail");
            }
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> PipelineStateDescriptor {
        PipelineStateDescriptor {
            root_signature: ResourceId(1),
            program: Some(ResourceId(2)),
            vertex_attributes: vec![VertexAttribute {
                vertex_attribute_format: VertexAttributeFormat::Float3,
                name: "Position".into(),
                semantic_index: 0,
                input_slot: 0,
                aligned_byte_offset: 0,
                instances_per_element: 0,
            }],
            primitive_topology: PrimitiveTopology::TriangleList,
            rasterizer_state: RasterizerState::default(),
            depth_stencil_state: DepthStencilState::default(),
            blend_state: BlendState::default(),
        }
    }

    #[test]
    fn structural_hash_is_stable_for_equal_descriptors() {
        assert_eq!(descriptor().structural_hash(), descriptor().structural_hash());
    }

    #[test]
    fn structural_hash_differs_when_state_changes() {
        let base = descriptor();
        let mut wireframe = descriptor();
        wireframe.rasterizer_state.fill_mode = FillMode::Wireframe;
        assert_ne!(base.structural_hash(), wireframe.structural_hash());
    }
}
