//! High-level wiring: one object owning the renderer, the compositor and
//! the loaded assets. Binary assets stream in through the loaders, GPU
//! objects are created once at load, and per-frame work reduces to resolve,
//! record and submit.

use anyhow::{anyhow, Context};
use compositor::{CompositorInstance, FrameStatistics, ItemGeometry, RenderableItem, ViewDescriptor};
use hashlink::LinkedHashMap;
use material::blueprint::PassValueProvider;
use material::property::AssetId;
use render_assets::asset_ids::AssetIdMapping;
use render_assets::material_asset::load_material;
use render_assets::material_blueprint::load_material_blueprint;
use render_assets::mesh::{load_mesh, GpuMesh, SubMesh};
use render_assets::shader_blueprint::{attach_shader_blueprint, load_shader_blueprint};
use render_assets::texture::load_texture;
use render_assets::AssetLoadError;
use render_backend_traits::traits::RenderBackend;
use render_types::types::{
    DrawIndexedInstancedArguments, DrawInstancedArguments, NativeWindowHandle, ResourceId,
};

use crate::config::RenderConfig;

#[derive(Debug)]
struct LoadedMesh {
    gpu: GpuMesh,
    sub_meshes: Vec<SubMesh>,
    indexed: bool,
}

/// Owns a renderer, a compositor instance and every GPU object created for
/// loaded assets. Dropping the runtime releases them in dependency order and
/// leaves the leak report to the renderer teardown.
pub struct RendererRuntime {
    backend: Box<dyn RenderBackend>,
    compositor: CompositorInstance,
    asset_ids: AssetIdMapping,
    meshes: LinkedHashMap<AssetId, LoadedMesh>,
    textures: LinkedHashMap<AssetId, ResourceId>,
}

impl RendererRuntime {
    pub fn new(
        config: &RenderConfig,
        native_window_handle: NativeWindowHandle,
        use_external_context: bool,
        pass_provider: Box<dyn PassValueProvider>,
        asset_ids: AssetIdMapping,
    ) -> anyhow::Result<Self> {
        let mut backend = crate::create_renderer(config, native_window_handle, use_external_context)?;
        if !backend.is_initialized() {
            return Err(anyhow!("the {} renderer failed to initialize", backend.name()));
        }
        backend
            .create_swap_chain(native_window_handle)
            .context("main swap chain creation")?;
        Ok(Self {
            backend,
            compositor: CompositorInstance::new(pass_provider),
            asset_ids,
            meshes: LinkedHashMap::new(),
            textures: LinkedHashMap::new(),
        })
    }

    pub fn backend(&mut self) -> &mut dyn RenderBackend {
        self.backend.as_mut()
    }

    pub fn compositor(&mut self) -> &mut CompositorInstance {
        &mut self.compositor
    }

    pub fn load_material_blueprint(
        &mut self,
        bytes: &[u8],
        asset_id: AssetId,
        allow_crazy_number_of_shader_combinations: bool,
    ) -> Result<(), AssetLoadError> {
        let blueprint = load_material_blueprint(
            &mut &bytes[..],
            asset_id,
            &self.asset_ids,
            allow_crazy_number_of_shader_combinations,
        )?;
        self.compositor.register_blueprint(blueprint);
        Ok(())
    }

    /// Loads a shader blueprint and attaches its source to the registered
    /// material blueprints whose stages reference it.
    pub fn load_shader_blueprint(
        &mut self,
        bytes: &[u8],
        asset_id: AssetId,
        material_blueprints: &[AssetId],
    ) -> Result<(), AssetLoadError> {
        let shader_blueprint = load_shader_blueprint(&mut &bytes[..], asset_id)?;
        for blueprint_asset in material_blueprints {
            match self.compositor.blueprint_mut(*blueprint_asset) {
                Some(blueprint) => {
                    attach_shader_blueprint(blueprint, &shader_blueprint);
                }
                None => log::warn!(
                    "shader blueprint {asset_id:?}: material blueprint {blueprint_asset:?} is \
                     not registered"
                ),
            }
        }
        Ok(())
    }

    pub fn load_material(&mut self, bytes: &[u8], asset_id: AssetId) -> Result<(), AssetLoadError> {
        let material = load_material(&mut &bytes[..], asset_id, &self.asset_ids)?;
        self.compositor.register_material(material);
        Ok(())
    }

    pub fn load_texture(&mut self, bytes: &[u8], asset_id: AssetId) -> Result<(), AssetLoadError> {
        let texture = load_texture(&mut &bytes[..])?;
        let resource = texture
            .upload(self.backend.as_mut())
            .ok_or_else(|| AssetLoadError::Corrupt("texture upload failed".into()))?;
        if let Some(previous) = self.textures.insert(asset_id, resource) {
            self.backend.release_resource(previous);
        }
        self.compositor.register_texture(asset_id, resource);
        Ok(())
    }

    pub fn load_mesh(&mut self, bytes: &[u8], asset_id: AssetId) -> Result<(), AssetLoadError> {
        let mesh = load_mesh(&mut &bytes[..], &self.asset_ids)?;
        let gpu = mesh
            .upload(self.backend.as_mut())
            .ok_or_else(|| AssetLoadError::Corrupt("mesh upload failed".into()))?;
        if let Some(previous) = self.meshes.insert(
            asset_id,
            LoadedMesh {
                gpu,
                sub_meshes: mesh.sub_meshes.clone(),
                indexed: !mesh.index_data.is_empty(),
            },
        ) {
            previous.gpu.release(self.backend.as_mut());
        }
        Ok(())
    }

    /// One renderable item per sub-mesh, drawing the sub-mesh's index range
    /// with the sub-mesh's material.
    pub fn renderable_items(&self, mesh_asset_id: AssetId) -> Option<Vec<RenderableItem>> {
        let mesh = self.meshes.get(&mesh_asset_id)?;
        Some(
            mesh.sub_meshes
                .iter()
                .map(|sub_mesh| RenderableItem {
                    material_asset_id: sub_mesh.material_asset_id,
                    vertex_array: mesh.gpu.vertex_array,
                    geometry: if mesh.indexed {
                        ItemGeometry::Indexed(DrawIndexedInstancedArguments {
                            index_count_per_instance: sub_mesh.number_of_indices,
                            instance_count: 1,
                            start_index_location: sub_mesh.start_index_location,
                            base_vertex_location: 0,
                            start_instance_location: 0,
                        })
                    } else {
                        ItemGeometry::NonIndexed(DrawInstancedArguments {
                            vertex_count_per_instance: sub_mesh.number_of_indices,
                            instance_count: 1,
                            start_vertex_location: sub_mesh.start_index_location,
                            start_instance_location: 0,
                        })
                    },
                })
                .collect(),
        )
    }

    pub fn render_view(
        &mut self,
        view: &ViewDescriptor,
        items: &[RenderableItem],
    ) -> anyhow::Result<FrameStatistics> {
        self.compositor
            .render_view(self.backend.as_mut(), view, items)
    }

    fn release_all(&mut self) {
        while let Some((_, mesh)) = self.meshes.pop_front() {
            mesh.gpu.release(self.backend.as_mut());
        }
        while let Some((_, texture)) = self.textures.pop_front() {
            self.backend.release_resource(texture);
        }
        self.compositor.release_gpu_resources(self.backend.as_mut());
        if let Some(swap_chain) = self.backend.main_swap_chain() {
            self.backend.release_resource(swap_chain);
        }
        self.backend.finish();
    }
}

impl Drop for RendererRuntime {
    fn drop(&mut self) {
        self.release_all();
    }
}
