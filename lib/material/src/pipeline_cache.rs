//! Pipeline-state cache: `(blueprint, shader-combination key, dynamic state)`
//! to pipeline-state handle. A miss compiles the stage program for the
//! combination and creates the pipeline state; steady-state rendering must
//! hit this cache, resource churn per frame is a defect.

use std::hash::{Hash, Hasher};

use hashlink::LinkedHashMap;
use render_backend_traits::traits::RenderBackend;
use render_backend_traits::types::ProgramDescriptor;
use render_types::pipeline_state::PipelineStateDescriptor;
use render_types::types::ResourceId;

use crate::blueprint::{MaterialBlueprint, PipelineStateTemplate, ResolvedMaterial};
use crate::property::AssetId;
use crate::shader_properties::ShaderCombinationKey;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineCacheKey {
    blueprint: AssetId,
    shader_combination: ShaderCombinationKey,
    dynamic_state_hash: u64,
}

fn dynamic_state_hash(template: &PipelineStateTemplate) -> u64 {
    // The debug rendering spells out every field including float bit
    // patterns, which sidesteps the missing float Hash impl.
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    format!("{template:?}").hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Default)]
pub struct PipelineStateCache {
    root_signatures: LinkedHashMap<AssetId, ResourceId>,
    programs: LinkedHashMap<(AssetId, ShaderCombinationKey), ResourceId>,
    pipeline_states: LinkedHashMap<PipelineCacheKey, ResourceId>,
    number_of_misses: u64,
    number_of_hits: u64,
}

impl PipelineStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn number_of_pipeline_states(&self) -> usize {
        self.pipeline_states.len()
    }

    pub fn number_of_hits(&self) -> u64 {
        self.number_of_hits
    }

    pub fn number_of_misses(&self) -> u64 {
        self.number_of_misses
    }

    /// The blueprint's root signature, created once per blueprint and reused
    /// afterwards.
    pub fn root_signature(
        &mut self,
        backend: &mut dyn RenderBackend,
        blueprint: &MaterialBlueprint,
    ) -> Option<ResourceId> {
        if let Some(id) = self.root_signatures.get(&blueprint.asset_id) {
            return Some(*id);
        }
        let id = backend.create_root_signature(&blueprint.root_signature)?;
        self.root_signatures.insert(blueprint.asset_id, id);
        Some(id)
    }

    fn program(
        &mut self,
        backend: &mut dyn RenderBackend,
        blueprint: &MaterialBlueprint,
        shader_combination: &ShaderCombinationKey,
    ) -> Option<ResourceId> {
        let key = (blueprint.asset_id, shader_combination.clone());
        if let Some(id) = self.programs.get(&key) {
            return Some(*id);
        }
        let descriptor = ProgramDescriptor {
            combination_defines: shader_combination.to_defines(),
            ..blueprint.stage_sources.clone()
        };
        let id = backend.create_program(&descriptor)?;
        self.programs.insert(key, id);
        Some(id)
    }

    /// Cache lookup with create-on-miss. Two identical resolves return the
    /// same handle.
    pub fn pipeline_state(
        &mut self,
        backend: &mut dyn RenderBackend,
        blueprint: &MaterialBlueprint,
        resolved: &ResolvedMaterial,
    ) -> Option<ResourceId> {
        let key = PipelineCacheKey {
            blueprint: blueprint.asset_id,
            shader_combination: resolved.shader_combination_key.clone(),
            dynamic_state_hash: dynamic_state_hash(&resolved.pipeline_state),
        };
        if let Some(id) = self.pipeline_states.get(&key) {
            self.number_of_hits += 1;
            return Some(*id);
        }
        self.number_of_misses += 1;

        let root_signature = self.root_signature(backend, blueprint)?;
        let program = self.program(backend, blueprint, &resolved.shader_combination_key)?;
        let descriptor = PipelineStateDescriptor {
            root_signature,
            program: Some(program),
            vertex_attributes: resolved.pipeline_state.vertex_attributes.clone(),
            primitive_topology: resolved.pipeline_state.primitive_topology,
            rasterizer_state: resolved.pipeline_state.rasterizer_state,
            depth_stencil_state: resolved.pipeline_state.depth_stencil_state,
            blend_state: resolved.pipeline_state.blend_state,
        };
        let id = backend.create_pipeline_state(&descriptor)?;
        self.pipeline_states.insert(key, id);
        Some(id)
    }

    /// Like [`Self::pipeline_state`], but on creation failure falls back to
    /// visually less important variants: the combination property with the
    /// lowest visual importance is zeroed and the lookup retried, until a
    /// pipeline state exists or the combination is exhausted. The rendered
    /// result degrades, the frame does not drop.
    pub fn pipeline_state_with_fallback(
        &mut self,
        backend: &mut dyn RenderBackend,
        blueprint: &MaterialBlueprint,
        resolved: &ResolvedMaterial,
    ) -> Option<ResourceId> {
        if let Some(id) = self.pipeline_state(backend, blueprint, resolved) {
            return Some(id);
        }
        let mut reduced = resolved.clone();
        while reduced
            .combination_properties
            .zero_least_important(&blueprint.visual_importance)
        {
            reduced.shader_combination_key = ShaderCombinationKey::build(
                &reduced.combination_properties,
                &blueprint.maximum_integer_values,
            );
            log::warn!(
                "pipeline state for blueprint {:?} unavailable, falling back to a reduced \
                 shader combination",
                blueprint.asset_id
            );
            if let Some(id) = self.pipeline_state(backend, blueprint, &reduced) {
                return Some(id);
            }
        }
        None
    }

    /// Hands every cached handle back to the renderer. Call before dropping
    /// the cache; the cache cannot release without a backend.
    pub fn release_resources(&mut self, backend: &mut dyn RenderBackend) {
        while let Some((_, id)) = self.pipeline_states.pop_front() {
            backend.release_resource(id);
        }
        while let Some((_, id)) = self.programs.pop_front() {
            backend.release_resource(id);
        }
        while let Some((_, id)) = self.root_signatures.pop_front() {
            backend.release_resource(id);
        }
        self.number_of_hits = 0;
        self.number_of_misses = 0;
    }
}
