//! Abstract binding-layout declaration. The numeric conventions follow
//! Direct3D 12 so backends without a native root-signature concept can
//! emulate the layout by binding ranges sequentially.

use bincode::{BorrowDecode, Decode, Encode};
use bitflags::bitflags;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sampler::{ComparisonFunc, FilterMode, SamplerStateDescriptor, TextureAddressMode};

/// Longest `base_shader_register_name` a descriptor range may carry.
pub const MAXIMUM_SHADER_REGISTER_NAME_LENGTH: usize = 32;

/// `offset_in_descriptors_from_table_start` value meaning "append after the
/// previous range".
pub const OFFSET_APPEND: u32 = u32::MAX;

/// `sampler_root_parameter_index` value meaning "no paired sampler slot".
pub const NO_SAMPLER_ROOT_PARAMETER: u32 = u32::MAX;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode)]
#[repr(u32)]
pub enum DescriptorRangeType {
    #[default]
    Srv = 0,
    Uav,
    Cbv,
    Sampler,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Encode, Decode)]
#[repr(u32)]
pub enum ShaderVisibility {
    #[default]
    All = 0,
    Vertex,
    TessControl,
    TessEval,
    Geometry,
    Fragment,
}

/// A contiguous block of resource views addressable through one root
/// parameter index.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct DescriptorRange {
    pub range_type: DescriptorRangeType,
    pub number_of_descriptors: u32,
    pub base_shader_register: u32,
    pub register_space: u32,
    pub offset_in_descriptors_from_table_start: u32,
    /// Register name for shader languages that bind by name instead of by
    /// register number. At most [`MAXIMUM_SHADER_REGISTER_NAME_LENGTH`] bytes.
    pub base_shader_register_name: String,
    /// For non-sampler ranges that need a paired sampler slot: index of the
    /// root parameter carrying the sampler, else [`NO_SAMPLER_ROOT_PARAMETER`].
    pub sampler_root_parameter_index: u32,
}

impl DescriptorRange {
    pub fn new(
        range_type: DescriptorRangeType,
        number_of_descriptors: u32,
        base_shader_register: u32,
        base_shader_register_name: &str,
    ) -> Self {
        Self {
            range_type,
            number_of_descriptors,
            base_shader_register,
            register_space: 0,
            offset_in_descriptors_from_table_start: OFFSET_APPEND,
            base_shader_register_name: base_shader_register_name.into(),
            sampler_root_parameter_index: NO_SAMPLER_ROOT_PARAMETER,
        }
    }
}

impl Default for DescriptorRange {
    fn default() -> Self {
        Self::new(DescriptorRangeType::Srv, 1, 0, "")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum RootParameter {
    DescriptorTable {
        descriptor_ranges: Vec<DescriptorRange>,
        shader_visibility: ShaderVisibility,
    },
    Constants32Bit {
        number_of_32bit_values: u32,
        shader_register: u32,
        register_space: u32,
        shader_visibility: ShaderVisibility,
    },
    ConstantBufferView {
        shader_register: u32,
        register_space: u32,
        shader_visibility: ShaderVisibility,
    },
    ShaderResourceView {
        shader_register: u32,
        register_space: u32,
        shader_visibility: ShaderVisibility,
    },
    UnorderedAccessView {
        shader_register: u32,
        register_space: u32,
        shader_visibility: ShaderVisibility,
    },
}

impl RootParameter {
    pub fn shader_visibility(&self) -> ShaderVisibility {
        match self {
            RootParameter::DescriptorTable {
                shader_visibility, ..
            }
            | RootParameter::Constants32Bit {
                shader_visibility, ..
            }
            | RootParameter::ConstantBufferView {
                shader_visibility, ..
            }
            | RootParameter::ShaderResourceView {
                shader_visibility, ..
            }
            | RootParameter::UnorderedAccessView {
                shader_visibility, ..
            } => *shader_visibility,
        }
    }

    pub fn descriptor_ranges(&self) -> &[DescriptorRange] {
        match self {
            RootParameter::DescriptorTable {
                descriptor_ranges, ..
            } => descriptor_ranges,
            _ => &[],
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct RootSignatureFlags: u32 {
        const ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT = 1 << 0;
        const DENY_VERTEX_SHADER_ROOT_ACCESS = 1 << 1;
        const DENY_TESS_CONTROL_SHADER_ROOT_ACCESS = 1 << 2;
        const DENY_TESS_EVAL_SHADER_ROOT_ACCESS = 1 << 3;
        const DENY_GEOMETRY_SHADER_ROOT_ACCESS = 1 << 4;
        const DENY_FRAGMENT_SHADER_ROOT_ACCESS = 1 << 5;
    }
}

impl Encode for RootSignatureFlags {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> Result<(), bincode::error::EncodeError> {
        self.bits().encode(encoder)
    }
}

impl Decode for RootSignatureFlags {
    fn decode<D: bincode::de::Decoder>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        Ok(Self::from_bits_retain(u32::decode(decoder)?))
    }
}

impl<'de> BorrowDecode<'de> for RootSignatureFlags {
    fn borrow_decode<D: bincode::de::BorrowDecoder<'de>>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        Self::decode(decoder)
    }
}

/// Sampler baked into the root signature itself instead of being bound as a
/// resource.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct StaticSampler {
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
    pub shader_register: u32,
    pub register_space: u32,
    pub shader_visibility: ShaderVisibility,
}

impl StaticSampler {
    pub fn from_sampler_state(
        sampler_state: &SamplerStateDescriptor,
        shader_register: u32,
        shader_visibility: ShaderVisibility,
    ) -> Self {
        Self {
            filter: sampler_state.filter,
            address_u: sampler_state.address_u,
            address_v: sampler_state.address_v,
            address_w: sampler_state.address_w,
            mip_lod_bias: sampler_state.mip_lod_bias,
            max_anisotropy: sampler_state.max_anisotropy,
            comparison_func: sampler_state.comparison_func,
            border_color: sampler_state.border_color,
            min_lod: sampler_state.min_lod,
            max_lod: sampler_state.max_lod,
            shader_register,
            register_space: 0,
            shader_visibility,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RootSignatureError {
    #[error("descriptor range name '{name}' exceeds {MAXIMUM_SHADER_REGISTER_NAME_LENGTH} bytes")]
    RegisterNameTooLong { name: String },
    #[error(
        "sampler root parameter index {index} of parameter {parameter} is out of range \
         (the signature has {parameter_count} parameters)"
    )]
    SamplerRootParameterOutOfRange {
        parameter: usize,
        index: u32,
        parameter_count: usize,
    },
    #[error("root parameter {parameter} pairs with parameter {index}, which holds no sampler range")]
    SamplerRootParameterNotASampler { parameter: usize, index: u32 },
    #[error("descriptor table of root parameter {parameter} declares no ranges")]
    EmptyDescriptorTable { parameter: usize },
}

/// Complete root-signature declaration. The descriptor takes ownership of all
/// range and sampler arrays, so callers are free to drop their copies after
/// creation.
#[derive(Debug, Default, Clone, PartialEq, Encode, Decode)]
pub struct RootSignatureDescriptor {
    pub parameters: Vec<RootParameter>,
    pub static_samplers: Vec<StaticSampler>,
    pub flags: RootSignatureFlags,
}

impl RootSignatureDescriptor {
    /// Structural validation: cross-references between ranges and parameters
    /// must resolve, register names must fit the fixed on-disk buffers.
    pub fn validate(&self) -> Result<(), RootSignatureError> {
        for (parameter_index, parameter) in self.parameters.iter().enumerate() {
            let ranges = parameter.descriptor_ranges();
            if matches!(parameter, RootParameter::DescriptorTable { .. }) && ranges.is_empty() {
                return Err(RootSignatureError::EmptyDescriptorTable {
                    parameter: parameter_index,
                });
            }
            for range in ranges {
                if range.base_shader_register_name.len() > MAXIMUM_SHADER_REGISTER_NAME_LENGTH {
                    return Err(RootSignatureError::RegisterNameTooLong {
                        name: range.base_shader_register_name.clone(),
                    });
                }
                let sampler_index = range.sampler_root_parameter_index;
                if range.range_type != DescriptorRangeType::Sampler
                    && sampler_index != NO_SAMPLER_ROOT_PARAMETER
                {
                    let Some(target) = self.parameters.get(sampler_index as usize) else {
                        return Err(RootSignatureError::SamplerRootParameterOutOfRange {
                            parameter: parameter_index,
                            index: sampler_index,
                            parameter_count: self.parameters.len(),
                        });
                    };
                    let has_sampler_range = target
                        .descriptor_ranges()
                        .iter()
                        .any(|r| r.range_type == DescriptorRangeType::Sampler);
                    if !has_sampler_range {
                        return Err(RootSignatureError::SamplerRootParameterNotASampler {
                            parameter: parameter_index,
                            index: sampler_index,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Number of descriptors a slot-based backend needs to reserve for the
    /// given parameter, resolving `OFFSET_APPEND` sequentially.
    pub fn number_of_descriptors(&self, root_parameter_index: u32) -> u32 {
        let Some(parameter) = self.parameters.get(root_parameter_index as usize) else {
            return 0;
        };
        let mut end = 0u32;
        let mut next_offset = 0u32;
        for range in parameter.descriptor_ranges() {
            let offset = if range.offset_in_descriptors_from_table_start == OFFSET_APPEND {
                next_offset
            } else {
                range.offset_in_descriptors_from_table_start
            };
            next_offset = offset + range.number_of_descriptors;
            end = end.max(next_offset);
        }
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(ranges: Vec<DescriptorRange>) -> RootParameter {
        RootParameter::DescriptorTable {
            descriptor_ranges: ranges,
            shader_visibility: ShaderVisibility::Fragment,
        }
    }

    #[test]
    fn validate_accepts_paired_sampler_slot() {
        let mut texture_range =
            DescriptorRange::new(DescriptorRangeType::Srv, 1, 0, "AlbedoMap");
        texture_range.sampler_root_parameter_index = 1;
        let descriptor = RootSignatureDescriptor {
            parameters: vec![
                table(vec![texture_range]),
                table(vec![DescriptorRange::new(
                    DescriptorRangeType::Sampler,
                    1,
                    0,
                    "SamplerLinear",
                )]),
            ],
            static_samplers: Vec::new(),
            flags: RootSignatureFlags::ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
        };
        assert_eq!(descriptor.validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_dangling_sampler_reference() {
        let mut texture_range = DescriptorRange::new(DescriptorRangeType::Srv, 1, 0, "AlbedoMap");
        texture_range.sampler_root_parameter_index = 7;
        let descriptor = RootSignatureDescriptor {
            parameters: vec![table(vec![texture_range])],
            static_samplers: Vec::new(),
            flags: RootSignatureFlags::empty(),
        };
        assert!(matches!(
            descriptor.validate(),
            Err(RootSignatureError::SamplerRootParameterOutOfRange { index: 7, .. })
        ));
    }

    #[test]
    fn validate_rejects_oversized_register_name() {
        let descriptor = RootSignatureDescriptor {
            parameters: vec![table(vec![DescriptorRange::new(
                DescriptorRangeType::Srv,
                1,
                0,
                "a_register_name_that_is_way_too_long_for_the_fixed_buffer",
            )])],
            static_samplers: Vec::new(),
            flags: RootSignatureFlags::empty(),
        };
        assert!(matches!(
            descriptor.validate(),
            Err(RootSignatureError::RegisterNameTooLong { .. })
        ));
    }

    #[test]
    fn append_offsets_resolve_sequentially() {
        let descriptor = RootSignatureDescriptor {
            parameters: vec![table(vec![
                DescriptorRange::new(DescriptorRangeType::Srv, 2, 0, "MapA"),
                DescriptorRange::new(DescriptorRangeType::Srv, 3, 2, "MapB"),
            ])],
            static_samplers: Vec::new(),
            flags: RootSignatureFlags::empty(),
        };
        assert_eq!(descriptor.number_of_descriptors(0), 5);
        assert_eq!(descriptor.number_of_descriptors(1), 0);
    }
}
