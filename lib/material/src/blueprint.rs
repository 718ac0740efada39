//! Material blueprints: the template a material instance is derived from.
//! A blueprint carries the property schema with defaults, the owned
//! root-signature declaration, the pipeline-state skeleton, uniform and
//! texture-buffer layouts, sampler states and texture bindings, plus the
//! shader-combination tables bounding the variant space.

use num_derive::FromPrimitive;
use render_backend_traits::types::ProgramDescriptor;
use render_types::pipeline_state::{
    BlendState, DepthStencilState, RasterizerState, VertexAttribute,
};
use render_types::root_signature::RootSignatureDescriptor;
use render_types::sampler::SamplerStateDescriptor;
use render_types::types::PrimitiveTopology;

use crate::property::{
    AssetId, MaterialProperties, MaterialProperty, MaterialPropertyId, MaterialPropertyUsage,
    MaterialPropertyValue,
};
use crate::shader_properties::{ShaderCombinationKey, ShaderProperties};
use crate::{MaterialError, MAXIMUM_NUMBER_OF_SHADER_COMBINATION_PROPERTIES};

/// Who fills a uniform/texture buffer and how often.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u32)]
pub enum BufferUsageSemantic {
    #[default]
    Unknown = 0,
    /// Once per pass, values from the pass context.
    Pass,
    /// Per material, values from the effective property set.
    Material,
    /// Per renderable instance.
    Instance,
}

/// Values the runtime pass context contributes to PASS-usage buffers. The
/// compositor owns the provider; there is no process-wide listener.
pub trait PassValueProvider {
    fn pass_value(&self, property_id: MaterialPropertyId) -> Option<MaterialPropertyValue>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniformBufferDefinition {
    pub root_parameter_index: u32,
    pub usage: BufferUsageSemantic,
    pub number_of_elements: u32,
    pub number_of_bytes_per_element: u32,
    /// Properties of one element, in element byte order.
    pub element_properties: Vec<MaterialProperty>,
}

impl UniformBufferDefinition {
    /// Serializes one element: each declared property in order, looked up
    /// through `value_of` (falling back to the declared default), padded to
    /// the declared element size.
    pub fn fill_element(
        &self,
        value_of: impl Fn(MaterialPropertyId) -> Option<MaterialPropertyValue>,
    ) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.number_of_bytes_per_element as usize);
        for property in &self.element_properties {
            let value = value_of(property.property_id).unwrap_or(property.value);
            value.write_uniform_bytes(&mut bytes);
        }
        if bytes.len() > self.number_of_bytes_per_element as usize {
            log::warn!(
                "uniform buffer element overflows its declared {} bytes ({} written), truncating",
                self.number_of_bytes_per_element,
                bytes.len()
            );
        }
        bytes.resize(self.number_of_bytes_per_element as usize, 0);
        bytes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureBufferDefinition {
    pub root_parameter_index: u32,
    pub usage: BufferUsageSemantic,
    pub number_of_elements: u32,
    pub number_of_bytes_per_element: u32,
    pub element_properties: Vec<MaterialProperty>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerStateDefinition {
    pub root_parameter_index: u32,
    pub sampler_state: SamplerStateDescriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDefinition {
    pub root_parameter_index: u32,
    pub default_texture_asset_id: AssetId,
    /// Material property (usage TEXTURE) an instance may override the asset
    /// with; `None` pins the default.
    pub material_property_id: Option<MaterialPropertyId>,
}

/// Shader blueprint assets per stage; uninitialized ids mark absent stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderStageAssets {
    pub vertex: AssetId,
    pub tessellation_control: AssetId,
    pub tessellation_evaluation: AssetId,
    pub geometry: AssetId,
    pub fragment: AssetId,
}

impl Default for ShaderStageAssets {
    fn default() -> Self {
        Self {
            vertex: AssetId::uninitialized(),
            tessellation_control: AssetId::uninitialized(),
            tessellation_evaluation: AssetId::uninitialized(),
            geometry: AssetId::uninitialized(),
            fragment: AssetId::uninitialized(),
        }
    }
}

impl ShaderStageAssets {
    pub fn number_of_stages(&self) -> usize {
        [
            self.vertex,
            self.tessellation_control,
            self.tessellation_evaluation,
            self.geometry,
            self.fragment,
        ]
        .into_iter()
        .filter(AssetId::is_initialized)
        .count()
    }
}

/// The fixed-function part of the blueprint's pipeline state, before any
/// per-material specialization.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PipelineStateTemplate {
    pub vertex_attributes: Vec<VertexAttribute>,
    pub primitive_topology: PrimitiveTopology,
    pub rasterizer_state: RasterizerState,
    pub depth_stencil_state: DepthStencilState,
    pub blend_state: BlendState,
}

/// Output of a blueprint/instance resolve: everything the compositor needs
/// to obtain a pipeline state and record bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMaterial {
    pub properties: MaterialProperties,
    /// The SHADER_COMBINATION subset the key was built from; kept so a
    /// failed pipeline creation can fall back to a visually less important
    /// variant.
    pub combination_properties: ShaderProperties,
    pub shader_combination_key: ShaderCombinationKey,
    pub pipeline_state: PipelineStateTemplate,
}

// Well-known state-override property ids; the names are the ones the asset
// compiler writes.
const FILL_MODE: MaterialPropertyId = MaterialPropertyId::from_name("FillMode");
const CULL_MODE: MaterialPropertyId = MaterialPropertyId::from_name("CullMode");
const CONSERVATIVE_RASTERIZATION: MaterialPropertyId =
    MaterialPropertyId::from_name("ConservativeRasterizationMode");
const DEPTH_ENABLE: MaterialPropertyId = MaterialPropertyId::from_name("DepthEnable");
const DEPTH_WRITE_MASK: MaterialPropertyId = MaterialPropertyId::from_name("DepthWriteMask");
const DEPTH_FUNC: MaterialPropertyId = MaterialPropertyId::from_name("DepthFunc");
const STENCIL_ENABLE: MaterialPropertyId = MaterialPropertyId::from_name("StencilEnable");
const ALPHA_TO_COVERAGE: MaterialPropertyId =
    MaterialPropertyId::from_name("AlphaToCoverageEnable");
const BLEND_ENABLE: MaterialPropertyId = MaterialPropertyId::from_name("BlendEnable");
const SRC_BLEND: MaterialPropertyId = MaterialPropertyId::from_name("SrcBlend");
const DEST_BLEND: MaterialPropertyId = MaterialPropertyId::from_name("DestBlend");
const BLEND_OP: MaterialPropertyId = MaterialPropertyId::from_name("BlendOp");
const SRC_BLEND_ALPHA: MaterialPropertyId = MaterialPropertyId::from_name("SrcBlendAlpha");
const DEST_BLEND_ALPHA: MaterialPropertyId = MaterialPropertyId::from_name("DestBlendAlpha");
const BLEND_OP_ALPHA: MaterialPropertyId = MaterialPropertyId::from_name("BlendOpAlpha");

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialBlueprint {
    pub asset_id: AssetId,
    /// Sorted schema: defaults plus usage per property.
    pub schema: MaterialProperties,
    pub root_signature: RootSignatureDescriptor,
    pub pipeline_state: PipelineStateTemplate,
    pub shader_stages: ShaderStageAssets,
    /// Stage sources attached after shader blueprint loading; combination
    /// defines are filled in per resolve.
    pub stage_sources: ProgramDescriptor,
    pub uniform_buffers: Vec<UniformBufferDefinition>,
    pub texture_buffers: Vec<TextureBufferDefinition>,
    pub sampler_states: Vec<SamplerStateDefinition>,
    pub textures: Vec<TextureDefinition>,
    pub visual_importance: ShaderProperties,
    pub maximum_integer_values: ShaderProperties,
    /// Explicit opt-in for blueprints that really need a larger variant
    /// space than the default cap.
    pub allow_crazy_number_of_shader_combinations: bool,
}

impl MaterialBlueprint {
    pub fn new(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            schema: MaterialProperties::new(),
            root_signature: RootSignatureDescriptor::default(),
            pipeline_state: PipelineStateTemplate::default(),
            shader_stages: ShaderStageAssets::default(),
            stage_sources: ProgramDescriptor::default(),
            uniform_buffers: Vec::new(),
            texture_buffers: Vec::new(),
            sampler_states: Vec::new(),
            textures: Vec::new(),
            visual_importance: ShaderProperties::new(),
            maximum_integer_values: ShaderProperties::new(),
            allow_crazy_number_of_shader_combinations: false,
        }
    }

    pub fn number_of_shader_combination_properties(&self) -> usize {
        self.schema
            .iter()
            .filter(|property| property.usage == MaterialPropertyUsage::ShaderCombination)
            .count()
    }

    /// The load-time variant-space bound: refuses blueprints whose
    /// SHADER_COMBINATION property count exceeds the cap without the
    /// explicit opt-in.
    pub fn validate(&self) -> Result<(), MaterialError> {
        let count = self.number_of_shader_combination_properties();
        if count > MAXIMUM_NUMBER_OF_SHADER_COMBINATION_PROPERTIES
            && !self.allow_crazy_number_of_shader_combinations
        {
            return Err(MaterialError::TooManyShaderCombinationProperties {
                count,
                maximum: MAXIMUM_NUMBER_OF_SHADER_COMBINATION_PROPERTIES,
            });
        }
        Ok(())
    }

    /// Schema with per-property overrides applied. Overrides referencing
    /// unknown properties or disagreeing on usage or value type are load
    /// errors, not silent drops.
    pub fn effective_properties(
        &self,
        overrides: &MaterialProperties,
    ) -> Result<MaterialProperties, MaterialError> {
        let mut effective = self.schema.clone();
        for override_property in overrides {
            let declared = effective
                .get(override_property.property_id)
                .copied()
                .ok_or(MaterialError::UnknownProperty {
                    property_id: override_property.property_id,
                })?;
            if override_property.usage != MaterialPropertyUsage::Unknown
                && override_property.usage != declared.usage
            {
                return Err(MaterialError::UsageMismatch {
                    property_id: override_property.property_id,
                    expected: declared.usage,
                    found: override_property.usage,
                });
            }
            effective.set_value_checked(override_property.property_id, override_property.value)?;
        }
        Ok(effective)
    }

    /// The SHADER_COMBINATION subset of an effective property set as sorted
    /// integer pairs.
    pub fn shader_combination_properties(&self, effective: &MaterialProperties) -> ShaderProperties {
        let mut combination = ShaderProperties::new();
        for property in effective {
            if property.usage != MaterialPropertyUsage::ShaderCombination {
                continue;
            }
            match property.value.as_shader_combination_integer() {
                Some(value) => combination.set(property.property_id, value),
                None => log::warn!(
                    "shader-combination property {:?} has a non-integer value and is skipped",
                    property.property_id
                ),
            }
        }
        combination
    }

    /// Pipeline-state skeleton with RASTERIZER/DEPTH_STENCIL/BLEND/SAMPLER
    /// state property overrides folded in.
    pub fn specialized_pipeline_state(&self, effective: &MaterialProperties) -> PipelineStateTemplate {
        let mut state = self.pipeline_state.clone();
        for property in effective {
            match property.usage {
                MaterialPropertyUsage::RasterizerState => {
                    Self::apply_rasterizer_override(&mut state.rasterizer_state, property)
                }
                MaterialPropertyUsage::DepthStencilState => {
                    Self::apply_depth_stencil_override(&mut state.depth_stencil_state, property)
                }
                MaterialPropertyUsage::BlendState => {
                    Self::apply_blend_override(&mut state.blend_state, property)
                }
                _ => {}
            }
        }
        state
    }

    fn apply_rasterizer_override(state: &mut RasterizerState, property: &MaterialProperty) {
        match (property.property_id, property.value) {
            (id, MaterialPropertyValue::FillMode(fill_mode)) if id == FILL_MODE => {
                state.fill_mode = fill_mode
            }
            (id, MaterialPropertyValue::CullMode(cull_mode)) if id == CULL_MODE => {
                state.cull_mode = cull_mode
            }
            (id, MaterialPropertyValue::ConservativeRasterizationMode(mode))
                if id == CONSERVATIVE_RASTERIZATION =>
            {
                state.conservative_rasterization_mode = mode
            }
            _ => log::warn!(
                "unrecognized rasterizer-state property {:?}",
                property.property_id
            ),
        }
    }

    fn apply_depth_stencil_override(state: &mut DepthStencilState, property: &MaterialProperty) {
        match (property.property_id, property.value) {
            (id, MaterialPropertyValue::Boolean(enable)) if id == DEPTH_ENABLE => {
                state.depth_enable = enable
            }
            (id, MaterialPropertyValue::DepthWriteMask(mask)) if id == DEPTH_WRITE_MASK => {
                state.depth_write_mask = mask
            }
            (id, MaterialPropertyValue::ComparisonFunc(func)) if id == DEPTH_FUNC => {
                state.depth_func = func
            }
            (id, MaterialPropertyValue::Boolean(enable)) if id == STENCIL_ENABLE => {
                state.stencil_enable = enable
            }
            _ => log::warn!(
                "unrecognized depth-stencil-state property {:?}",
                property.property_id
            ),
        }
    }

    fn apply_blend_override(state: &mut BlendState, property: &MaterialProperty) {
        let render_target = &mut state.render_targets[0];
        match (property.property_id, property.value) {
            (id, MaterialPropertyValue::Boolean(enable)) if id == ALPHA_TO_COVERAGE => {
                state.alpha_to_coverage_enable = enable
            }
            (id, MaterialPropertyValue::Boolean(enable)) if id == BLEND_ENABLE => {
                render_target.blend_enable = enable
            }
            (id, MaterialPropertyValue::Blend(blend)) if id == SRC_BLEND => {
                render_target.src_blend = blend
            }
            (id, MaterialPropertyValue::Blend(blend)) if id == DEST_BLEND => {
                render_target.dest_blend = blend
            }
            (id, MaterialPropertyValue::BlendOp(op)) if id == BLEND_OP => {
                render_target.blend_op = op
            }
            (id, MaterialPropertyValue::Blend(blend)) if id == SRC_BLEND_ALPHA => {
                render_target.src_blend_alpha = blend
            }
            (id, MaterialPropertyValue::Blend(blend)) if id == DEST_BLEND_ALPHA => {
                render_target.dest_blend_alpha = blend
            }
            (id, MaterialPropertyValue::BlendOp(op)) if id == BLEND_OP_ALPHA => {
                render_target.blend_op_alpha = op
            }
            _ => log::warn!(
                "unrecognized blend-state property {:?}",
                property.property_id
            ),
        }
    }

    /// Full resolution in one call: effective properties, the clamped
    /// shader-combination key and the specialized pipeline state. The
    /// bindings are derived from the definitions plus the returned effective
    /// set (see [`Self::texture_asset_id`]).
    pub fn resolve(&self, overrides: &MaterialProperties) -> Result<ResolvedMaterial, MaterialError> {
        let properties = self.effective_properties(overrides)?;
        let combination_properties = self.shader_combination_properties(&properties);
        let shader_combination_key =
            ShaderCombinationKey::build(&combination_properties, &self.maximum_integer_values);
        let pipeline_state = self.specialized_pipeline_state(&properties);
        Ok(ResolvedMaterial {
            properties,
            combination_properties,
            shader_combination_key,
            pipeline_state,
        })
    }

    /// Texture to bind for a texture definition: the instance override when
    /// the effective set carries one, the blueprint default otherwise.
    pub fn texture_asset_id(
        &self,
        definition: &TextureDefinition,
        effective: &MaterialProperties,
    ) -> AssetId {
        definition
            .material_property_id
            .and_then(|property_id| effective.value(property_id))
            .and_then(|value| match value {
                MaterialPropertyValue::AssetId(asset_id) => Some(asset_id),
                _ => None,
            })
            .unwrap_or(definition.default_texture_asset_id)
    }
}

#[cfg(test)]
mod tests {
    use render_types::pipeline_state::CullMode;

    use super::*;

    fn blueprint_with_combinations(count: usize, allow: bool) -> MaterialBlueprint {
        let mut blueprint = MaterialBlueprint::new(AssetId::from_name("TestBlueprint"));
        let mut properties = Vec::new();
        for index in 0..count {
            properties.push(MaterialProperty::new(
                MaterialPropertyId::from_name(&format!("Combination{index}")),
                MaterialPropertyUsage::ShaderCombination,
                MaterialPropertyValue::Integer(0),
            ));
        }
        blueprint.schema = MaterialProperties::from_unsorted(properties).unwrap();
        blueprint.allow_crazy_number_of_shader_combinations = allow;
        blueprint
    }

    #[test]
    fn combination_cap_is_enforced_at_validation() {
        assert_eq!(blueprint_with_combinations(4, false).validate(), Ok(()));
        assert_eq!(
            blueprint_with_combinations(5, false).validate(),
            Err(MaterialError::TooManyShaderCombinationProperties {
                count: 5,
                maximum: 4
            })
        );
        assert_eq!(blueprint_with_combinations(5, true).validate(), Ok(()));
    }

    #[test]
    fn cap_violation_message_names_count_and_limit() {
        let error = blueprint_with_combinations(5, false).validate().unwrap_err();
        let message = error.to_string();
        assert!(message.contains('5'));
        assert!(message.contains('4'));
        assert!(message.contains("invalid pipeline state"));
    }

    #[test]
    fn override_with_wrong_value_type_is_rejected() {
        let id = MaterialPropertyId::from_name("Metalness");
        let mut blueprint = MaterialBlueprint::new(AssetId::from_name("B"));
        blueprint.schema = MaterialProperties::from_unsorted(vec![MaterialProperty::new(
            id,
            MaterialPropertyUsage::Static,
            MaterialPropertyValue::Float(0.0),
        )])
        .unwrap();

        let mut overrides = MaterialProperties::new();
        overrides.set(MaterialProperty::new(
            id,
            MaterialPropertyUsage::Static,
            MaterialPropertyValue::Boolean(true),
        ));
        assert_eq!(
            blueprint.effective_properties(&overrides),
            Err(MaterialError::ValueTypeMismatch { property_id: id })
        );
    }

    #[test]
    fn resolve_is_deterministic() {
        let mut blueprint = blueprint_with_combinations(3, false);
        blueprint
            .maximum_integer_values
            .set(MaterialPropertyId::from_name("Combination0"), 2);
        let mut overrides = MaterialProperties::new();
        overrides.set(MaterialProperty::new(
            MaterialPropertyId::from_name("Combination0"),
            MaterialPropertyUsage::ShaderCombination,
            MaterialPropertyValue::Integer(7),
        ));

        let first = blueprint.resolve(&overrides).unwrap();
        let second = blueprint.resolve(&overrides).unwrap();
        assert_eq!(
            first.shader_combination_key.bytes(),
            second.shader_combination_key.bytes()
        );
        // 7 clamps into [0, 2].
        let clamped =
            i32::from_le_bytes(first.shader_combination_key.bytes()[4..8].try_into().unwrap());
        assert_eq!(clamped, 2);
    }

    #[test]
    fn cull_mode_override_specializes_the_pipeline_state() {
        let mut blueprint = MaterialBlueprint::new(AssetId::from_name("B"));
        blueprint.schema = MaterialProperties::from_unsorted(vec![MaterialProperty::new(
            CULL_MODE,
            MaterialPropertyUsage::RasterizerState,
            MaterialPropertyValue::CullMode(CullMode::Back),
        )])
        .unwrap();

        let mut overrides = MaterialProperties::new();
        overrides.set(MaterialProperty::new(
            CULL_MODE,
            MaterialPropertyUsage::RasterizerState,
            MaterialPropertyValue::CullMode(CullMode::None),
        ));
        let resolved = blueprint.resolve(&overrides).unwrap();
        assert_eq!(resolved.pipeline_state.rasterizer_state.cull_mode, CullMode::None);
        // The blueprint itself is untouched.
        assert_eq!(blueprint.pipeline_state.rasterizer_state.cull_mode, CullMode::Back);
    }

    #[test]
    fn texture_override_resolves_through_the_property() {
        let texture_property = MaterialPropertyId::from_name("AlbedoMap");
        let mut blueprint = MaterialBlueprint::new(AssetId::from_name("B"));
        blueprint.schema = MaterialProperties::from_unsorted(vec![MaterialProperty::new(
            texture_property,
            MaterialPropertyUsage::Texture,
            MaterialPropertyValue::AssetId(AssetId::from_name("DefaultWhite")),
        )])
        .unwrap();
        let definition = TextureDefinition {
            root_parameter_index: 2,
            default_texture_asset_id: AssetId::from_name("DefaultWhite"),
            material_property_id: Some(texture_property),
        };

        let mut overrides = MaterialProperties::new();
        overrides.set(MaterialProperty::new(
            texture_property,
            MaterialPropertyUsage::Texture,
            MaterialPropertyValue::AssetId(AssetId::from_name("RustyMetal")),
        ));
        let effective = blueprint.effective_properties(&overrides).unwrap();
        assert_eq!(
            blueprint.texture_asset_id(&definition, &effective),
            AssetId::from_name("RustyMetal")
        );
        assert_eq!(
            blueprint.texture_asset_id(&definition, &blueprint.schema),
            AssetId::from_name("DefaultWhite")
        );
    }
}
