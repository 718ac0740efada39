//! Typed material property values with semantic usage tags. Property sets
//! are flat vectors strictly sorted by property id, so lookups are binary
//! searches and on-disk vectors can be memory-walked in order.

use num_derive::FromPrimitive;
use render_types::pipeline_state::{
    Blend, BlendOp, ConservativeRasterizationMode, CullMode, DepthWriteMask, FillMode, StencilOp,
};
use render_types::sampler::{ComparisonFunc, FilterMode, TextureAddressMode};

use crate::MaterialError;

/// 32-bit FNV-1a over the UTF-8 name, computable at compile time. Property,
/// technique and asset ids all use this hash.
pub const fn fnv1a_32(name: &str) -> u32 {
    let bytes = name.as_bytes();
    let mut hash: u32 = 0x811c_9dc5;
    let mut i = 0;
    while i < bytes.len() {
        hash = (hash ^ bytes[i] as u32).wrapping_mul(0x0100_0193);
        i += 1;
    }
    hash
}

/// Sentinel for "not set yet".
pub const UNINITIALIZED_ID: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialPropertyId(pub u32);

impl MaterialPropertyId {
    pub const fn from_name(name: &str) -> Self {
        Self(fnv1a_32(name))
    }

    pub const fn uninitialized() -> Self {
        Self(UNINITIALIZED_ID)
    }

    pub fn is_initialized(&self) -> bool {
        self.0 != UNINITIALIZED_ID
    }
}

/// Stable 32-bit id of a compiled asset, hashed from its source name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(pub u32);

impl AssetId {
    pub const fn from_name(name: &str) -> Self {
        Self(fnv1a_32(name))
    }

    pub const fn uninitialized() -> Self {
        Self(UNINITIALIZED_ID)
    }

    pub fn is_initialized(&self) -> bool {
        self.0 != UNINITIALIZED_ID
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u32)]
pub enum MaterialPropertyUsage {
    #[default]
    Unknown = 0,
    Static,
    Dynamic,
    RasterizerState,
    DepthStencilState,
    BlendState,
    SamplerState,
    Texture,
    ShaderCombination,
}

/// On-disk tag of a property value; the numeric values are part of the
/// binary material formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u32)]
pub enum MaterialPropertyValueType {
    Boolean = 0,
    Integer,
    Integer2,
    Integer3,
    Integer4,
    Float,
    Float2,
    Float3,
    Float4,
    FillMode,
    CullMode,
    ConservativeRasterizationMode,
    DepthWriteMask,
    StencilOp,
    ComparisonFunc,
    Blend,
    BlendOp,
    FilterMode,
    TextureAddressMode,
    AssetId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialPropertyValue {
    Boolean(bool),
    Integer(i32),
    Integer2([i32; 2]),
    Integer3([i32; 3]),
    Integer4([i32; 4]),
    Float(f32),
    Float2([f32; 2]),
    Float3([f32; 3]),
    Float4([f32; 4]),
    FillMode(FillMode),
    CullMode(CullMode),
    ConservativeRasterizationMode(ConservativeRasterizationMode),
    DepthWriteMask(DepthWriteMask),
    StencilOp(StencilOp),
    ComparisonFunc(ComparisonFunc),
    Blend(Blend),
    BlendOp(BlendOp),
    FilterMode(FilterMode),
    TextureAddressMode(TextureAddressMode),
    AssetId(AssetId),
}

impl MaterialPropertyValue {
    pub fn value_type(&self) -> MaterialPropertyValueType {
        match self {
            MaterialPropertyValue::Boolean(_) => MaterialPropertyValueType::Boolean,
            MaterialPropertyValue::Integer(_) => MaterialPropertyValueType::Integer,
            MaterialPropertyValue::Integer2(_) => MaterialPropertyValueType::Integer2,
            MaterialPropertyValue::Integer3(_) => MaterialPropertyValueType::Integer3,
            MaterialPropertyValue::Integer4(_) => MaterialPropertyValueType::Integer4,
            MaterialPropertyValue::Float(_) => MaterialPropertyValueType::Float,
            MaterialPropertyValue::Float2(_) => MaterialPropertyValueType::Float2,
            MaterialPropertyValue::Float3(_) => MaterialPropertyValueType::Float3,
            MaterialPropertyValue::Float4(_) => MaterialPropertyValueType::Float4,
            MaterialPropertyValue::FillMode(_) => MaterialPropertyValueType::FillMode,
            MaterialPropertyValue::CullMode(_) => MaterialPropertyValueType::CullMode,
            MaterialPropertyValue::ConservativeRasterizationMode(_) => {
                MaterialPropertyValueType::ConservativeRasterizationMode
            }
            MaterialPropertyValue::DepthWriteMask(_) => MaterialPropertyValueType::DepthWriteMask,
            MaterialPropertyValue::StencilOp(_) => MaterialPropertyValueType::StencilOp,
            MaterialPropertyValue::ComparisonFunc(_) => MaterialPropertyValueType::ComparisonFunc,
            MaterialPropertyValue::Blend(_) => MaterialPropertyValueType::Blend,
            MaterialPropertyValue::BlendOp(_) => MaterialPropertyValueType::BlendOp,
            MaterialPropertyValue::FilterMode(_) => MaterialPropertyValueType::FilterMode,
            MaterialPropertyValue::TextureAddressMode(_) => {
                MaterialPropertyValueType::TextureAddressMode
            }
            MaterialPropertyValue::AssetId(_) => MaterialPropertyValueType::AssetId,
        }
    }

    /// Value as it participates in shader-combination keys; booleans encode
    /// as 0/1, enums as their numeric convention value.
    pub fn as_shader_combination_integer(&self) -> Option<i32> {
        match self {
            MaterialPropertyValue::Boolean(value) => Some(*value as i32),
            MaterialPropertyValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Serialization into a uniform-buffer element: scalars and vectors in
    /// little-endian, booleans widened to `i32`, enums as their numeric
    /// value. Texture references do not appear inside uniform data.
    pub fn write_uniform_bytes(&self, out: &mut Vec<u8>) {
        match self {
            MaterialPropertyValue::Boolean(value) => {
                out.extend_from_slice(&(*value as i32).to_le_bytes())
            }
            MaterialPropertyValue::Integer(value) => out.extend_from_slice(&value.to_le_bytes()),
            MaterialPropertyValue::Integer2(values) => {
                for value in values {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            MaterialPropertyValue::Integer3(values) => {
                for value in values {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            MaterialPropertyValue::Integer4(values) => {
                for value in values {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            MaterialPropertyValue::Float(value) => out.extend_from_slice(&value.to_le_bytes()),
            MaterialPropertyValue::Float2(values) => {
                for value in values {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            MaterialPropertyValue::Float3(values) => {
                for value in values {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            MaterialPropertyValue::Float4(values) => {
                for value in values {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            MaterialPropertyValue::FillMode(value) => {
                out.extend_from_slice(&(*value as i32).to_le_bytes())
            }
            MaterialPropertyValue::CullMode(value) => {
                out.extend_from_slice(&(*value as i32).to_le_bytes())
            }
            MaterialPropertyValue::ConservativeRasterizationMode(value) => {
                out.extend_from_slice(&(*value as i32).to_le_bytes())
            }
            MaterialPropertyValue::DepthWriteMask(value) => {
                out.extend_from_slice(&(*value as i32).to_le_bytes())
            }
            MaterialPropertyValue::StencilOp(value) => {
                out.extend_from_slice(&(*value as i32).to_le_bytes())
            }
            MaterialPropertyValue::ComparisonFunc(value) => {
                out.extend_from_slice(&(*value as i32).to_le_bytes())
            }
            MaterialPropertyValue::Blend(value) => {
                out.extend_from_slice(&(*value as i32).to_le_bytes())
            }
            MaterialPropertyValue::BlendOp(value) => {
                out.extend_from_slice(&(*value as i32).to_le_bytes())
            }
            MaterialPropertyValue::FilterMode(value) => {
                out.extend_from_slice(&(*value as i32).to_le_bytes())
            }
            MaterialPropertyValue::TextureAddressMode(value) => {
                out.extend_from_slice(&(*value as i32).to_le_bytes())
            }
            MaterialPropertyValue::AssetId(value) => out.extend_from_slice(&value.0.to_le_bytes()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialProperty {
    pub property_id: MaterialPropertyId,
    pub usage: MaterialPropertyUsage,
    pub value: MaterialPropertyValue,
}

impl MaterialProperty {
    pub fn new(
        property_id: MaterialPropertyId,
        usage: MaterialPropertyUsage,
        value: MaterialPropertyValue,
    ) -> Self {
        Self {
            property_id,
            usage,
            value,
        }
    }
}

/// Flat property vector, strictly ordered by property id. `O(log n)` lookup.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MaterialProperties {
    properties: Vec<MaterialProperty>,
}

impl MaterialProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds from an arbitrarily ordered vector; duplicates violate the
    /// strict ordering and are rejected.
    pub fn from_unsorted(mut properties: Vec<MaterialProperty>) -> Result<Self, MaterialError> {
        properties.sort_by_key(|property| property.property_id);
        for pair in properties.windows(2) {
            if pair[0].property_id == pair[1].property_id {
                return Err(MaterialError::UnsortedProperties);
            }
        }
        Ok(Self { properties })
    }

    /// Wraps an already sorted vector, verifying the strict ordering.
    pub fn from_sorted(properties: Vec<MaterialProperty>) -> Result<Self, MaterialError> {
        let sorted = properties
            .windows(2)
            .all(|pair| pair[0].property_id < pair[1].property_id);
        if !sorted {
            return Err(MaterialError::UnsortedProperties);
        }
        Ok(Self { properties })
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn as_slice(&self) -> &[MaterialProperty] {
        &self.properties
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MaterialProperty> {
        self.properties.iter()
    }

    pub fn get(&self, property_id: MaterialPropertyId) -> Option<&MaterialProperty> {
        self.properties
            .binary_search_by_key(&property_id, |property| property.property_id)
            .ok()
            .map(|index| &self.properties[index])
    }

    pub fn value(&self, property_id: MaterialPropertyId) -> Option<MaterialPropertyValue> {
        self.get(property_id).map(|property| property.value)
    }

    /// Inserts or replaces, keeping the vector ordered.
    pub fn set(&mut self, property: MaterialProperty) {
        match self
            .properties
            .binary_search_by_key(&property.property_id, |p| p.property_id)
        {
            Ok(index) => self.properties[index] = property,
            Err(index) => self.properties.insert(index, property),
        }
    }

    /// Replaces the value of an existing property, enforcing the schema's
    /// usage and value type.
    pub fn set_value_checked(
        &mut self,
        property_id: MaterialPropertyId,
        value: MaterialPropertyValue,
    ) -> Result<(), MaterialError> {
        let index = self
            .properties
            .binary_search_by_key(&property_id, |p| p.property_id)
            .map_err(|_| MaterialError::UnknownProperty { property_id })?;
        if self.properties[index].value.value_type() != value.value_type() {
            return Err(MaterialError::ValueTypeMismatch { property_id });
        }
        self.properties[index].value = value;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a MaterialProperties {
    type Item = &'a MaterialProperty;
    type IntoIter = std::slice::Iter<'a, MaterialProperty>;

    fn into_iter(self) -> Self::IntoIter {
        self.properties.iter()
    }
}
