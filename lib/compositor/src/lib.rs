//! The per-frame submit loop: walks renderable items, resolves each item's
//! material instance through its blueprint to a cached pipeline state,
//! records the minimal command packet set into a reused command buffer and
//! hands the buffer to the renderer. Pass values are supplied by an injected
//! provider owned by the compositor instance; there is no process-wide
//! listener.

use anyhow::bail;
use hashlink::LinkedHashMap;
use material::blueprint::{
    BufferUsageSemantic, MaterialBlueprint, PassValueProvider, UniformBufferDefinition,
};
use material::instance::{MaterialInstance, MaterialTechniqueId};
use material::pipeline_cache::PipelineStateCache;
use material::property::{AssetId, MaterialProperties};
use render_backend_traits::traits::RenderBackend;
use render_types::command_buffer::CommandBuffer;
use render_types::types::{
    BufferUsage, ClearFlags, ColorRgba, DrawIndexedInstancedArguments, DrawInstancedArguments,
    ResourceId, ScissorRectangle, Viewport,
};

/// Geometry of one renderable item, already uploaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ItemGeometry {
    NonIndexed(DrawInstancedArguments),
    Indexed(DrawIndexedInstancedArguments),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderableItem {
    pub material_asset_id: AssetId,
    pub vertex_array: ResourceId,
    pub geometry: ItemGeometry,
}

/// Render-target staging recorded after the items of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingOperation {
    ResolveMultisample {
        destination_render_target: ResourceId,
        source_multisample_framebuffer: ResourceId,
    },
    CopyResource {
        destination_resource: ResourceId,
        source_resource: ResourceId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewDescriptor {
    pub render_target: Option<ResourceId>,
    pub viewport: Viewport,
    pub scissor: Option<ScissorRectangle>,
    pub clear: Option<(ClearFlags, ColorRgba, f32, u32)>,
    pub technique: MaterialTechniqueId,
    pub debug_name: String,
    pub staging: Vec<StagingOperation>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStatistics {
    pub items_rendered: u32,
    pub items_skipped: u32,
    pub packets_submitted: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BufferSlotKey {
    blueprint: AssetId,
    definition_index: usize,
}

/// One rendered-view driver. Owns the pipeline-state cache, the reused
/// command buffer, the registered assets and the pass-value provider.
pub struct CompositorInstance {
    pipeline_cache: PipelineStateCache,
    command_buffer: CommandBuffer,
    pass_provider: Box<dyn PassValueProvider>,
    blueprints: LinkedHashMap<AssetId, MaterialBlueprint>,
    materials: LinkedHashMap<AssetId, MaterialInstance>,
    textures: LinkedHashMap<AssetId, ResourceId>,
    uniform_buffers: LinkedHashMap<BufferSlotKey, ResourceId>,
    sampler_states: LinkedHashMap<BufferSlotKey, ResourceId>,
    frames_rendered: u64,
}

impl CompositorInstance {
    pub fn new(pass_provider: Box<dyn PassValueProvider>) -> Self {
        Self {
            pipeline_cache: PipelineStateCache::new(),
            command_buffer: CommandBuffer::new(),
            pass_provider,
            blueprints: LinkedHashMap::new(),
            materials: LinkedHashMap::new(),
            textures: LinkedHashMap::new(),
            uniform_buffers: LinkedHashMap::new(),
            sampler_states: LinkedHashMap::new(),
            frames_rendered: 0,
        }
    }

    pub fn pipeline_cache(&self) -> &PipelineStateCache {
        &self.pipeline_cache
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn register_blueprint(&mut self, blueprint: MaterialBlueprint) {
        self.blueprints.insert(blueprint.asset_id, blueprint);
    }

    pub fn register_material(&mut self, material: MaterialInstance) {
        self.materials.insert(material.asset_id, material);
    }

    /// Registered blueprint by asset id, mutable so shader sources loaded
    /// later can be attached in place.
    pub fn blueprint_mut(&mut self, asset_id: AssetId) -> Option<&mut MaterialBlueprint> {
        self.blueprints.get_mut(&asset_id)
    }

    /// Associates a loaded GPU texture with its asset id. The caller keeps
    /// its reference; the compositor only records the id into command
    /// packets.
    pub fn register_texture(&mut self, asset_id: AssetId, texture: ResourceId) {
        self.textures.insert(asset_id, texture);
    }

    /// Renders one view: scene bracket, per-item resolve and record, submit.
    /// Items whose material cannot be resolved are skipped with a
    /// diagnostic; the frame always completes.
    pub fn render_view(
        &mut self,
        backend: &mut dyn RenderBackend,
        view: &ViewDescriptor,
        items: &[RenderableItem],
    ) -> anyhow::Result<FrameStatistics> {
        if !backend.begin_scene() {
            bail!("begin_scene failed, dropping the view '{}'", view.debug_name);
        }
        let mut statistics = FrameStatistics::default();

        // Split borrows: the record path needs the cache and the registries
        // at the same time.
        let Self {
            pipeline_cache,
            command_buffer,
            pass_provider,
            blueprints,
            materials,
            textures,
            uniform_buffers,
            sampler_states,
            ..
        } = self;

        command_buffer.clear_for_reuse();
        if !view.debug_name.is_empty() {
            command_buffer.begin_debug_event(&view.debug_name);
        }
        command_buffer.set_render_target(view.render_target);
        command_buffer.set_viewports(&[view.viewport]);
        if let Some(scissor) = view.scissor {
            command_buffer.set_scissor_rectangles(&[scissor]);
        }
        if let Some((flags, color, z, stencil)) = view.clear {
            command_buffer.clear(flags, color, z, stencil);
        }

        let mut bound_root_signature = None;
        let mut bound_pipeline_state = None;
        for item in items {
            let outcome = record_item(
                backend,
                command_buffer,
                pipeline_cache,
                pass_provider.as_ref(),
                blueprints,
                materials,
                textures,
                uniform_buffers,
                sampler_states,
                view.technique,
                item,
                &mut bound_root_signature,
                &mut bound_pipeline_state,
            );
            match outcome {
                Ok(()) => statistics.items_rendered += 1,
                Err(reason) => {
                    statistics.items_skipped += 1;
                    log::warn!(
                        "skipping item with material {:?}: {reason}",
                        item.material_asset_id
                    );
                }
            }
        }

        for staging in &view.staging {
            match *staging {
                StagingOperation::ResolveMultisample {
                    destination_render_target,
                    source_multisample_framebuffer,
                } => command_buffer.resolve_multisample_framebuffer(
                    destination_render_target,
                    source_multisample_framebuffer,
                ),
                StagingOperation::CopyResource {
                    destination_resource,
                    source_resource,
                } => command_buffer.copy_resource(destination_resource, source_resource),
            }
        }
        if !view.debug_name.is_empty() {
            command_buffer.end_debug_event();
        }

        statistics.packets_submitted = command_buffer.number_of_packets();
        backend.submit_command_buffer(command_buffer);
        backend.end_scene();
        self.frames_rendered += 1;
        Ok(statistics)
    }

    /// Hands every renderer-owned handle the compositor created back to the
    /// renderer. Must run before the renderer is torn down.
    pub fn release_gpu_resources(&mut self, backend: &mut dyn RenderBackend) {
        while let Some((_, id)) = self.uniform_buffers.pop_front() {
            backend.release_resource(id);
        }
        while let Some((_, id)) = self.sampler_states.pop_front() {
            backend.release_resource(id);
        }
        self.pipeline_cache.release_resources(backend);
    }
}

/// Fills one uniform-buffer element from the effective property set (PASS
/// buffers pull from the pass provider instead).
fn fill_uniform_element(
    definition: &UniformBufferDefinition,
    effective: &MaterialProperties,
    pass_provider: &dyn PassValueProvider,
) -> Vec<u8> {
    definition.fill_element(|property_id| match definition.usage {
        BufferUsageSemantic::Pass => pass_provider.pass_value(property_id),
        _ => effective.value(property_id),
    })
}

#[allow(clippy::too_many_arguments)]
fn record_item(
    backend: &mut dyn RenderBackend,
    command_buffer: &mut CommandBuffer,
    pipeline_cache: &mut PipelineStateCache,
    pass_provider: &dyn PassValueProvider,
    blueprints: &LinkedHashMap<AssetId, MaterialBlueprint>,
    materials: &LinkedHashMap<AssetId, MaterialInstance>,
    textures: &LinkedHashMap<AssetId, ResourceId>,
    uniform_buffers: &mut LinkedHashMap<BufferSlotKey, ResourceId>,
    sampler_states: &mut LinkedHashMap<BufferSlotKey, ResourceId>,
    technique_id: MaterialTechniqueId,
    item: &RenderableItem,
    bound_root_signature: &mut Option<ResourceId>,
    bound_pipeline_state: &mut Option<ResourceId>,
) -> Result<(), String> {
    let material = materials
        .get(&item.material_asset_id)
        .ok_or("material is not registered")?;
    let technique = material
        .select_technique(technique_id)
        .ok_or("material has no techniques")?;
    let blueprint = blueprints
        .get(&technique.material_blueprint_asset_id)
        .ok_or("material blueprint is not registered")?;

    let resolved = blueprint
        .resolve(&material.properties)
        .map_err(|error| error.to_string())?;
    let pipeline_state = pipeline_cache
        .pipeline_state_with_fallback(backend, blueprint, &resolved)
        .ok_or("pipeline state creation failed")?;
    let root_signature = pipeline_cache
        .root_signature(backend, blueprint)
        .ok_or("root signature creation failed")?;

    // Minimal packet set: only record what actually changed.
    if *bound_root_signature != Some(root_signature) {
        command_buffer.set_graphics_root_signature(root_signature);
        *bound_root_signature = Some(root_signature);
    }
    if *bound_pipeline_state != Some(pipeline_state) {
        command_buffer.set_pipeline_state(pipeline_state);
        *bound_pipeline_state = Some(pipeline_state);
    }

    for (definition_index, definition) in blueprint.uniform_buffers.iter().enumerate() {
        let key = BufferSlotKey {
            blueprint: blueprint.asset_id,
            definition_index,
        };
        let uniform_buffer = match uniform_buffers.get(&key) {
            Some(id) => *id,
            None => {
                let size =
                    definition.number_of_elements as usize * definition.number_of_bytes_per_element as usize;
                let id = backend
                    .create_uniform_buffer(size, BufferUsage::DynamicDraw, None)
                    .ok_or("uniform buffer creation failed")?;
                uniform_buffers.insert(key, id);
                id
            }
        };
        let element = fill_uniform_element(definition, &resolved.properties, pass_provider);
        command_buffer.copy_uniform_buffer_data(uniform_buffer, &element);
        command_buffer
            .set_graphics_root_descriptor_table(definition.root_parameter_index, uniform_buffer);
    }

    for (definition_index, definition) in blueprint.sampler_states.iter().enumerate() {
        let key = BufferSlotKey {
            blueprint: blueprint.asset_id,
            definition_index,
        };
        let sampler_state = match sampler_states.get(&key) {
            Some(id) => *id,
            None => {
                let id = backend
                    .create_sampler_state(&definition.sampler_state)
                    .ok_or("sampler state creation failed")?;
                sampler_states.insert(key, id);
                id
            }
        };
        command_buffer
            .set_graphics_root_descriptor_table(definition.root_parameter_index, sampler_state);
    }

    for definition in &blueprint.textures {
        let asset_id = blueprint.texture_asset_id(definition, &resolved.properties);
        let Some(texture) = textures.get(&asset_id) else {
            // Missing texture: the item still draws, just without this map.
            log::warn!("texture asset {asset_id:?} is not loaded");
            continue;
        };
        command_buffer.set_graphics_root_descriptor_table(definition.root_parameter_index, *texture);
    }

    command_buffer.set_vertex_array(item.vertex_array);
    command_buffer.set_primitive_topology(resolved.pipeline_state.primitive_topology);
    match item.geometry {
        ItemGeometry::NonIndexed(arguments) => command_buffer.draw(&[arguments]),
        ItemGeometry::Indexed(arguments) => command_buffer.draw_indexed(&[arguments]),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use material::blueprint::{SamplerStateDefinition, TextureDefinition};
    use material::instance::{MaterialTechnique, DEFAULT_TECHNIQUE_ID};
    use material::property::{
        MaterialProperty, MaterialPropertyId, MaterialPropertyUsage, MaterialPropertyValue,
    };
    use render_backend::backend::{create_render_backend, BackendKind};
    use render_backend_traits::types::{
        ProgramDescriptor, Texture2dDescriptor, VertexArrayDescriptor, VertexArrayVertexBuffer,
    };
    use render_types::root_signature::{
        DescriptorRange, DescriptorRangeType, RootParameter, RootSignatureDescriptor,
        RootSignatureFlags, ShaderVisibility,
    };
    use render_types::sampler::SamplerStateDescriptor;
    use render_types::types::TextureFormat;

    use super::*;

    struct FixedPassValues;

    impl PassValueProvider for FixedPassValues {
        fn pass_value(&self, property_id: MaterialPropertyId) -> Option<MaterialPropertyValue> {
            (property_id == MaterialPropertyId::from_name("PassIntensity"))
                .then_some(MaterialPropertyValue::Float(2.0))
        }
    }

    fn table(range_type: DescriptorRangeType, register_name: &str) -> RootParameter {
        RootParameter::DescriptorTable {
            descriptor_ranges: vec![DescriptorRange::new(range_type, 1, 0, register_name)],
            shader_visibility: ShaderVisibility::All,
        }
    }

    fn forward_blueprint() -> MaterialBlueprint {
        let mut blueprint = MaterialBlueprint::new(AssetId::from_name("ForwardBlueprint"));
        blueprint.schema = material::property::MaterialProperties::from_unsorted(vec![
            MaterialProperty::new(
                MaterialPropertyId::from_name("Metalness"),
                MaterialPropertyUsage::Static,
                MaterialPropertyValue::Float(0.5),
            ),
            MaterialProperty::new(
                MaterialPropertyId::from_name("UseAlphaMap"),
                MaterialPropertyUsage::ShaderCombination,
                MaterialPropertyValue::Boolean(false),
            ),
            MaterialProperty::new(
                MaterialPropertyId::from_name("AlbedoMap"),
                MaterialPropertyUsage::Texture,
                MaterialPropertyValue::AssetId(AssetId::from_name("DefaultWhite")),
            ),
        ])
        .unwrap();
        blueprint.root_signature = RootSignatureDescriptor {
            parameters: vec![
                table(DescriptorRangeType::Cbv, "MaterialUniformBuffer"),
                table(DescriptorRangeType::Sampler, "SamplerLinear"),
                table(DescriptorRangeType::Srv, "AlbedoMap"),
            ],
            static_samplers: Vec::new(),
            flags: RootSignatureFlags::ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
        };
        blueprint.stage_sources = ProgramDescriptor {
            vertex_shader_source: Some("void main() {}".into()),
            fragment_shader_source: Some("void main() {}".into()),
            ..ProgramDescriptor::default()
        };
        blueprint.uniform_buffers.push(UniformBufferDefinition {
            root_parameter_index: 0,
            usage: BufferUsageSemantic::Material,
            number_of_elements: 1,
            number_of_bytes_per_element: 16,
            element_properties: vec![MaterialProperty::new(
                MaterialPropertyId::from_name("Metalness"),
                MaterialPropertyUsage::Static,
                MaterialPropertyValue::Float(0.5),
            )],
        });
        blueprint.sampler_states.push(SamplerStateDefinition {
            root_parameter_index: 1,
            sampler_state: SamplerStateDescriptor::default(),
        });
        blueprint.textures.push(TextureDefinition {
            root_parameter_index: 2,
            default_texture_asset_id: AssetId::from_name("DefaultWhite"),
            material_property_id: Some(MaterialPropertyId::from_name("AlbedoMap")),
        });
        blueprint
    }

    fn crate_material() -> MaterialInstance {
        let mut material = MaterialInstance::new(AssetId::from_name("CrateMaterial"));
        material.techniques.push(MaterialTechnique {
            material_technique_id: DEFAULT_TECHNIQUE_ID,
            material_blueprint_asset_id: AssetId::from_name("ForwardBlueprint"),
        });
        material
    }

    #[test]
    fn frame_renders_items_and_reuses_pipeline_states() {
        let mut backend = create_render_backend(BackendKind::Headless, 1, false, true);
        let backend = backend.as_mut();
        let _swap_chain = backend.create_swap_chain(1).unwrap();

        let texture = backend
            .create_texture_2d(&Texture2dDescriptor::new(4, 4, TextureFormat::Rgba8), None)
            .unwrap();
        let vertex_buffer = backend
            .create_vertex_buffer(3 * 28, BufferUsage::StaticDraw, None)
            .unwrap();
        let vertex_array = backend
            .create_vertex_array(&VertexArrayDescriptor {
                vertex_buffers: vec![VertexArrayVertexBuffer {
                    vertex_buffer,
                    bytes_per_vertex: 28,
                }],
                index_buffer: None,
            })
            .unwrap();

        let mut compositor = CompositorInstance::new(Box::new(FixedPassValues));
        compositor.register_blueprint(forward_blueprint());
        compositor.register_material(crate_material());
        compositor.register_texture(AssetId::from_name("DefaultWhite"), texture);

        let view = ViewDescriptor {
            render_target: None,
            viewport: Viewport::from_size(800.0, 600.0),
            scissor: None,
            clear: Some((ClearFlags::COLOR | ClearFlags::DEPTH, ColorRgba::BLACK, 1.0, 0)),
            technique: DEFAULT_TECHNIQUE_ID,
            debug_name: "forward pass".into(),
            staging: Vec::new(),
        };
        let items = [RenderableItem {
            material_asset_id: AssetId::from_name("CrateMaterial"),
            vertex_array,
            geometry: ItemGeometry::NonIndexed(DrawInstancedArguments {
                vertex_count_per_instance: 3,
                instance_count: 1,
                start_vertex_location: 0,
                start_instance_location: 0,
            }),
        }];

        let first = compositor.render_view(backend, &view, &items).unwrap();
        assert_eq!(first.items_rendered, 1);
        assert_eq!(first.items_skipped, 0);
        assert_eq!(compositor.pipeline_cache().number_of_misses(), 1);

        let second = compositor.render_view(backend, &view, &items).unwrap();
        assert_eq!(second.items_rendered, 1);
        // Identical resolve, identical pipeline-state handle.
        assert_eq!(compositor.pipeline_cache().number_of_hits(), 1);
        assert_eq!(compositor.pipeline_cache().number_of_pipeline_states(), 1);
        assert_eq!(compositor.frames_rendered(), 2);

        compositor.release_gpu_resources(backend);
        backend.release_resource(vertex_array);
        backend.release_resource(vertex_buffer);
        backend.release_resource(texture);
    }

    #[test]
    fn unregistered_material_skips_the_item_but_finishes_the_frame() {
        let mut backend = create_render_backend(BackendKind::Headless, 1, false, false);
        let backend = backend.as_mut();
        let _swap_chain = backend.create_swap_chain(1).unwrap();
        let vertex_buffer = backend
            .create_vertex_buffer(12, BufferUsage::StaticDraw, None)
            .unwrap();
        let vertex_array = backend
            .create_vertex_array(&VertexArrayDescriptor {
                vertex_buffers: vec![VertexArrayVertexBuffer {
                    vertex_buffer,
                    bytes_per_vertex: 12,
                }],
                index_buffer: None,
            })
            .unwrap();

        let mut compositor = CompositorInstance::new(Box::new(FixedPassValues));
        let view = ViewDescriptor {
            render_target: None,
            viewport: Viewport::from_size(800.0, 600.0),
            scissor: None,
            clear: None,
            technique: DEFAULT_TECHNIQUE_ID,
            debug_name: String::new(),
            staging: Vec::new(),
        };
        let items = [RenderableItem {
            material_asset_id: AssetId::from_name("MissingMaterial"),
            vertex_array,
            geometry: ItemGeometry::NonIndexed(DrawInstancedArguments::default()),
        }];

        let statistics = compositor.render_view(backend, &view, &items).unwrap();
        assert_eq!(statistics.items_rendered, 0);
        assert_eq!(statistics.items_skipped, 1);

        compositor.release_gpu_resources(backend);
        backend.release_resource(vertex_array);
        backend.release_resource(vertex_buffer);
    }

    #[test]
    fn pass_values_feed_pass_usage_uniform_buffers() {
        let definition = UniformBufferDefinition {
            root_parameter_index: 0,
            usage: BufferUsageSemantic::Pass,
            number_of_elements: 1,
            number_of_bytes_per_element: 4,
            element_properties: vec![MaterialProperty::new(
                MaterialPropertyId::from_name("PassIntensity"),
                MaterialPropertyUsage::Static,
                MaterialPropertyValue::Float(0.0),
            )],
        };
        let bytes = fill_uniform_element(
            &definition,
            &material::property::MaterialProperties::new(),
            &FixedPassValues,
        );
        assert_eq!(bytes, 2.0f32.to_le_bytes());
    }
}
