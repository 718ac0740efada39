use bincode::{Decode, Encode};
use num_derive::FromPrimitive;

/// Filter selection, numeric values following the Direct3D 12 convention.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode)]
#[repr(u32)]
pub enum FilterMode {
    MinMagMipPoint = 0x0,
    MinMagPointMipLinear = 0x1,
    MinPointMagLinearMipPoint = 0x14,
    #[default]
    MinMagMipLinear = 0x15,
    Anisotropic = 0x55,
    ComparisonMinMagMipPoint = 0x80,
    ComparisonMinMagMipLinear = 0x95,
    ComparisonAnisotropic = 0xd5,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode)]
#[repr(u32)]
pub enum TextureAddressMode {
    Wrap = 1,
    Mirror = 2,
    #[default]
    Clamp = 3,
    Border = 4,
    MirrorOnce = 5,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode)]
#[repr(u32)]
pub enum ComparisonFunc {
    #[default]
    Never = 1,
    Less = 2,
    Equal = 3,
    LessEqual = 4,
    Greater = 5,
    NotEqual = 6,
    GreaterEqual = 7,
    Always = 8,
}

/// Sampler-state descriptor with Direct3D-style defaults: trilinear
/// filtering, clamp addressing, the full mip chain, no comparison.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct SamplerStateDescriptor {
    pub filter: FilterMode,
    pub address_u: TextureAddressMode,
    pub address_v: TextureAddressMode,
    pub address_w: TextureAddressMode,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub comparison_func: ComparisonFunc,
    pub border_color: [f32; 4],
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerStateDescriptor {
    fn default() -> Self {
        Self {
            filter: FilterMode::MinMagMipLinear,
            address_u: TextureAddressMode::Clamp,
            address_v: TextureAddressMode::Clamp,
            address_w: TextureAddressMode::Clamp,
            mip_lod_bias: 0.0,
            max_anisotropy: 16,
            comparison_func: ComparisonFunc::Never,
            border_color: [1.0, 1.0, 1.0, 1.0],
            min_lod: f32::MIN,
            max_lod: f32::MAX,
        }
    }
}
