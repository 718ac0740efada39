//! Shader property sets and the deterministic shader-combination key they
//! produce. A shader property is an integer-valued knob participating in
//! shader permutation selection; the variant space is bounded by per-property
//! maximum values fixed at blueprint load time.

use crate::property::MaterialPropertyId;

pub type ShaderPropertyId = MaterialPropertyId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderProperty {
    pub property_id: ShaderPropertyId,
    pub value: i32,
}

/// Sorted id/value pairs. Also used for the ancillary per-property tables
/// (visual importance, maximum integer value).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShaderProperties {
    properties: Vec<ShaderProperty>,
}

impl ShaderProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn as_slice(&self) -> &[ShaderProperty] {
        &self.properties
    }

    pub fn set(&mut self, property_id: ShaderPropertyId, value: i32) {
        match self
            .properties
            .binary_search_by_key(&property_id, |property| property.property_id)
        {
            Ok(index) => self.properties[index].value = value,
            Err(index) => self
                .properties
                .insert(index, ShaderProperty { property_id, value }),
        }
    }

    pub fn get(&self, property_id: ShaderPropertyId) -> Option<i32> {
        self.properties
            .binary_search_by_key(&property_id, |property| property.property_id)
            .ok()
            .map(|index| self.properties[index].value)
    }

    pub fn get_or(&self, property_id: ShaderPropertyId, fallback: i32) -> i32 {
        self.get(property_id).unwrap_or(fallback)
    }

    /// Zeroes the non-zero property with the lowest visual importance,
    /// shrinking the requested variant towards one that exists. Properties
    /// without an importance entry count as least important. Returns false
    /// once every property is zero.
    pub fn zero_least_important(&mut self, visual_importance: &ShaderProperties) -> bool {
        let victim = self
            .properties
            .iter()
            .enumerate()
            .filter(|(_, property)| property.value != 0)
            .min_by_key(|(_, property)| visual_importance.get_or(property.property_id, i32::MIN))
            .map(|(index, _)| index);
        match victim {
            Some(index) => {
                self.properties[index].value = 0;
                true
            }
            None => false,
        }
    }
}

impl FromIterator<(ShaderPropertyId, i32)> for ShaderProperties {
    fn from_iter<T: IntoIterator<Item = (ShaderPropertyId, i32)>>(iter: T) -> Self {
        let mut properties = ShaderProperties::new();
        for (property_id, value) in iter {
            properties.set(property_id, value);
        }
        properties
    }
}

/// Byte-identical for identical inputs: id and clamped value pairs in id
/// order, little-endian. Used as the pipeline-cache key component and to
/// derive the combination preprocessor defines.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct ShaderCombinationKey {
    bytes: Vec<u8>,
}

impl ShaderCombinationKey {
    /// Builds the key from the SHADER_COMBINATION subset of an effective
    /// property set. Integer values are clamped into
    /// `[0, maximum_integer_values[id]]`; properties without a declared
    /// maximum clamp to non-negative only.
    pub fn build(
        combination_properties: &ShaderProperties,
        maximum_integer_values: &ShaderProperties,
    ) -> Self {
        let mut bytes = Vec::with_capacity(combination_properties.len() * 8);
        for property in combination_properties.as_slice() {
            let mut value = property.value.max(0);
            if let Some(maximum) = maximum_integer_values.get(property.property_id) {
                value = value.min(maximum);
            }
            bytes.extend_from_slice(&property.property_id.0.to_le_bytes());
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Preprocessor block handed to shader compilation; one define per
    /// combination property, named by the id hash.
    pub fn to_defines(&self) -> String {
        let mut defines = String::new();
        for chunk in self.bytes.chunks_exact(8) {
            let id = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let value = i32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            defines.push_str(&format!("#define PROPERTY_{id:08X} {value}\n"));
        }
        defines
    }
}
