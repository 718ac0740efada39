//! The mesh binary format: packed vertex and index blobs, vertex-attribute
//! descriptors and sub-mesh ranges. The writer side also carries the
//! QTangent conversion the mesh compiler applies to tangent-space bases.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use material::property::AssetId;
use num_traits::FromPrimitive;
use render_backend_traits::traits::RenderBackend;
use render_backend_traits::types::{VertexArrayDescriptor, VertexArrayVertexBuffer};
use render_types::pipeline_state::{VertexAttribute, VertexAttributeFormat};
use render_types::types::{BufferUsage, IndexBufferFormat, PrimitiveTopology, ResourceId};

use crate::asset_ids::AssetIdMapping;
use crate::header::{read_and_check_header, read_fixed_string, write_fixed_string, write_header};
use crate::AssetLoadError;

pub const MESH_FORMAT_TYPE: &[u8; 4] = b"MSH1";
pub const MESH_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubMesh {
    pub material_asset_id: AssetId,
    pub primitive_topology: PrimitiveTopology,
    pub start_index_location: u32,
    pub number_of_indices: u32,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MeshResource {
    pub bytes_per_vertex: u32,
    pub index_format: IndexBufferFormat,
    pub vertex_data: Vec<u8>,
    pub index_data: Vec<u8>,
    pub vertex_attributes: Vec<VertexAttribute>,
    pub sub_meshes: Vec<SubMesh>,
}

impl MeshResource {
    pub fn number_of_vertices(&self) -> u32 {
        if self.bytes_per_vertex == 0 {
            return 0;
        }
        (self.vertex_data.len() / self.bytes_per_vertex as usize) as u32
    }

    pub fn number_of_indices(&self) -> u32 {
        (self.index_data.len() / self.index_format.byte_size()) as u32
    }

    /// Creates the GPU-side objects for this mesh. A `None` means one of the
    /// factories failed; whatever was created up to that point is released
    /// again.
    pub fn upload(&self, backend: &mut dyn RenderBackend) -> Option<GpuMesh> {
        let vertex_buffer = backend.create_vertex_buffer(
            self.vertex_data.len(),
            BufferUsage::StaticDraw,
            Some(&self.vertex_data),
        )?;
        let index_buffer = if self.index_data.is_empty() {
            None
        } else {
            match backend.create_index_buffer(
                self.index_format,
                self.index_data.len(),
                BufferUsage::StaticDraw,
                Some(&self.index_data),
            ) {
                Some(index_buffer) => Some(index_buffer),
                None => {
                    backend.release_resource(vertex_buffer);
                    return None;
                }
            }
        };
        let vertex_array = match backend.create_vertex_array(&VertexArrayDescriptor {
            vertex_buffers: vec![VertexArrayVertexBuffer {
                vertex_buffer,
                bytes_per_vertex: self.bytes_per_vertex,
            }],
            index_buffer,
        }) {
            Some(vertex_array) => vertex_array,
            None => {
                backend.release_resource(vertex_buffer);
                if let Some(index_buffer) = index_buffer {
                    backend.release_resource(index_buffer);
                }
                return None;
            }
        };
        Some(GpuMesh {
            vertex_buffer,
            index_buffer,
            vertex_array,
        })
    }
}

/// Retained handles of an uploaded mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuMesh {
    pub vertex_buffer: ResourceId,
    pub index_buffer: Option<ResourceId>,
    pub vertex_array: ResourceId,
}

impl GpuMesh {
    pub fn release(self, backend: &mut dyn RenderBackend) {
        backend.release_resource(self.vertex_array);
        backend.release_resource(self.vertex_buffer);
        if let Some(index_buffer) = self.index_buffer {
            backend.release_resource(index_buffer);
        }
    }
}

pub(crate) fn read_vertex_attribute(reader: &mut impl Read) -> Result<VertexAttribute, AssetLoadError> {
    let format_raw = reader.read_u32::<LittleEndian>()?;
    let vertex_attribute_format = VertexAttributeFormat::from_u32(format_raw)
        .ok_or_else(|| AssetLoadError::Corrupt(format!("unknown vertex attribute format {format_raw}")))?;
    let name = read_fixed_string(reader)?;
    Ok(VertexAttribute {
        vertex_attribute_format,
        name,
        semantic_index: reader.read_u32::<LittleEndian>()?,
        input_slot: reader.read_u32::<LittleEndian>()?,
        aligned_byte_offset: reader.read_u32::<LittleEndian>()?,
        instances_per_element: reader.read_u32::<LittleEndian>()?,
    })
}

pub(crate) fn write_vertex_attribute(
    writer: &mut impl Write,
    attribute: &VertexAttribute,
) -> Result<(), AssetLoadError> {
    writer.write_u32::<LittleEndian>(attribute.vertex_attribute_format as u32)?;
    write_fixed_string(writer, &attribute.name)?;
    writer.write_u32::<LittleEndian>(attribute.semantic_index)?;
    writer.write_u32::<LittleEndian>(attribute.input_slot)?;
    writer.write_u32::<LittleEndian>(attribute.aligned_byte_offset)?;
    writer.write_u32::<LittleEndian>(attribute.instances_per_element)?;
    Ok(())
}

/// Loads a mesh, translating sub-mesh material references through the
/// package's id table.
pub fn load_mesh(
    reader: &mut impl Read,
    asset_ids: &AssetIdMapping,
) -> Result<MeshResource, AssetLoadError> {
    read_and_check_header(reader, MESH_FORMAT_TYPE, MESH_FORMAT_VERSION)?;

    let bytes_per_vertex = reader.read_u32::<LittleEndian>()?;
    let vertex_count = reader.read_u32::<LittleEndian>()?;
    let index_format_raw = reader.read_u32::<LittleEndian>()?;
    let index_format = IndexBufferFormat::from_u32(index_format_raw)
        .ok_or_else(|| AssetLoadError::Corrupt(format!("unknown index format {index_format_raw}")))?;
    let index_count = reader.read_u32::<LittleEndian>()?;
    let vertex_attribute_count = reader.read_u32::<LittleEndian>()?;
    let sub_mesh_count = reader.read_u32::<LittleEndian>()?;

    let mut vertex_data = vec![0u8; bytes_per_vertex as usize * vertex_count as usize];
    reader.read_exact(&mut vertex_data)?;
    let mut index_data = vec![0u8; index_format.byte_size() * index_count as usize];
    reader.read_exact(&mut index_data)?;

    let mut vertex_attributes = Vec::with_capacity(vertex_attribute_count as usize);
    for _ in 0..vertex_attribute_count {
        vertex_attributes.push(read_vertex_attribute(reader)?);
    }

    let mut sub_meshes = Vec::with_capacity(sub_mesh_count as usize);
    for _ in 0..sub_mesh_count {
        let material_asset_id = asset_ids.translate(AssetId(reader.read_u32::<LittleEndian>()?));
        let topology_raw = reader.read_u32::<LittleEndian>()?;
        let primitive_topology = PrimitiveTopology::from_u32(topology_raw)
            .ok_or_else(|| AssetLoadError::Corrupt(format!("unknown primitive topology {topology_raw}")))?;
        let start_index_location = reader.read_u32::<LittleEndian>()?;
        let number_of_indices = reader.read_u32::<LittleEndian>()?;
        if start_index_location + number_of_indices > index_count {
            return Err(AssetLoadError::Corrupt(format!(
                "sub-mesh index range {start_index_location}+{number_of_indices} exceeds the \
                 {index_count} indices of the mesh"
            )));
        }
        sub_meshes.push(SubMesh {
            material_asset_id,
            primitive_topology,
            start_index_location,
            number_of_indices,
        });
    }

    Ok(MeshResource {
        bytes_per_vertex,
        index_format,
        vertex_data,
        index_data,
        vertex_attributes,
        sub_meshes,
    })
}

/// Compiler-side counterpart of [`load_mesh`].
pub fn write_mesh(writer: &mut impl Write, mesh: &MeshResource) -> Result<(), AssetLoadError> {
    write_header(writer, MESH_FORMAT_TYPE, MESH_FORMAT_VERSION)?;
    writer.write_u32::<LittleEndian>(mesh.bytes_per_vertex)?;
    writer.write_u32::<LittleEndian>(mesh.number_of_vertices())?;
    writer.write_u32::<LittleEndian>(mesh.index_format as u32)?;
    writer.write_u32::<LittleEndian>(mesh.number_of_indices())?;
    writer.write_u32::<LittleEndian>(mesh.vertex_attributes.len() as u32)?;
    writer.write_u32::<LittleEndian>(mesh.sub_meshes.len() as u32)?;
    writer.write_all(&mesh.vertex_data)?;
    writer.write_all(&mesh.index_data)?;
    for attribute in &mesh.vertex_attributes {
        write_vertex_attribute(writer, attribute)?;
    }
    for sub_mesh in &mesh.sub_meshes {
        writer.write_u32::<LittleEndian>(sub_mesh.material_asset_id.0)?;
        writer.write_u32::<LittleEndian>(sub_mesh.primitive_topology as u32)?;
        writer.write_u32::<LittleEndian>(sub_mesh.start_index_location)?;
        writer.write_u32::<LittleEndian>(sub_mesh.number_of_indices)?;
    }
    Ok(())
}

/// Smallest |w| that survives 16-bit quantization; keeps the reflection sign
/// representable.
const QTANGENT_W_BIAS: f32 = 1.0 / 32767.0;

/// Converts a (tangent, binormal, normal) basis into a unit quaternion
/// quantized to four 16-bit signed normalized integers. A reflected basis
/// (left-handed, as produced by mirrored UVs) is encoded in the sign of W;
/// |W| is biased away from zero so the sign survives quantization.
pub fn encode_qtangent(tangent: [f32; 3], binormal: [f32; 3], normal: [f32; 3]) -> [i16; 4] {
    let cross = [
        tangent[1] * binormal[2] - tangent[2] * binormal[1],
        tangent[2] * binormal[0] - tangent[0] * binormal[2],
        tangent[0] * binormal[1] - tangent[1] * binormal[0],
    ];
    let determinant = cross[0] * normal[0] + cross[1] * normal[1] + cross[2] * normal[2];
    let reflected = determinant < 0.0;
    let binormal = if reflected {
        [-binormal[0], -binormal[1], -binormal[2]]
    } else {
        binormal
    };

    let mut q = quaternion_from_rows(tangent, binormal, normal);

    // Canonical non-negative w first, then the reflection flips the whole
    // quaternion; -q and q rotate identically, so only the stored sign
    // changes.
    if q[3] < 0.0 {
        q = [-q[0], -q[1], -q[2], -q[3]];
    }
    if q[3] < QTANGENT_W_BIAS {
        let scale = (1.0 - QTANGENT_W_BIAS * QTANGENT_W_BIAS).sqrt()
            / (q[0] * q[0] + q[1] * q[1] + q[2] * q[2]).sqrt();
        q = [q[0] * scale, q[1] * scale, q[2] * scale, QTANGENT_W_BIAS];
    }
    if reflected {
        q = [-q[0], -q[1], -q[2], -q[3]];
    }

    q.map(|component| (component.clamp(-1.0, 1.0) * 32767.0).round() as i16)
}

fn quaternion_from_rows(r0: [f32; 3], r1: [f32; 3], r2: [f32; 3]) -> [f32; 4] {
    let (m00, m01, m02) = (r0[0], r0[1], r0[2]);
    let (m10, m11, m12) = (r1[0], r1[1], r1[2]);
    let (m20, m21, m22) = (r2[0], r2[1], r2[2]);
    let trace = m00 + m11 + m22;
    let q = if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0;
        [(m12 - m21) / s, (m20 - m02) / s, (m01 - m10) / s, s / 4.0]
    } else if m00 > m11 && m00 > m22 {
        let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
        [s / 4.0, (m01 + m10) / s, (m02 + m20) / s, (m12 - m21) / s]
    } else if m11 > m22 {
        let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
        [(m01 + m10) / s, s / 4.0, (m12 + m21) / s, (m20 - m02) / s]
    } else {
        let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
        [(m02 + m20) / s, (m12 + m21) / s, s / 4.0, (m01 - m10) / s]
    };
    let norm = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
    q.map(|component| component / norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basis_from_qtangent(encoded: [i16; 4]) -> ([f32; 3], [f32; 3], [f32; 3], bool) {
        let q = encoded.map(|component| component as f32 / 32767.0);
        let reflected = q[3] < 0.0;
        let (x, y, z, w) = (q[0], q[1], q[2], q[3]);
        let tangent = [
            1.0 - 2.0 * (y * y + z * z),
            2.0 * (x * y + w * z),
            2.0 * (x * z - w * y),
        ];
        let binormal = [
            2.0 * (x * y - w * z),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z + w * x),
        ];
        let normal = [
            2.0 * (x * z + w * y),
            2.0 * (y * z - w * x),
            1.0 - 2.0 * (x * x + y * y),
        ];
        let binormal = if reflected {
            [-binormal[0], -binormal[1], -binormal[2]]
        } else {
            binormal
        };
        (tangent, binormal, normal, reflected)
    }

    fn assert_close(actual: [f32; 3], expected: [f32; 3]) {
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-3, "{actual:?} vs {expected:?}");
        }
    }

    #[test]
    fn identity_basis_encodes_as_identity_quaternion() {
        let encoded = encode_qtangent([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]);
        assert_eq!(encoded, [0, 0, 0, 32767]);
    }

    #[test]
    fn reflected_basis_carries_a_negative_w() {
        let encoded = encode_qtangent([1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 1.0]);
        assert!(encoded[3] < 0);
        let (tangent, binormal, normal, reflected) = basis_from_qtangent(encoded);
        assert!(reflected);
        assert_close(tangent, [1.0, 0.0, 0.0]);
        assert_close(binormal, [0.0, -1.0, 0.0]);
        assert_close(normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn rotated_basis_round_trips_within_quantization() {
        // 90 degrees about the x axis.
        let tangent = [1.0, 0.0, 0.0];
        let binormal = [0.0, 0.0, 1.0];
        let normal = [0.0, -1.0, 0.0];
        let (t, b, n, reflected) = basis_from_qtangent(encode_qtangent(tangent, binormal, normal));
        assert!(!reflected);
        assert_close(t, tangent);
        assert_close(b, binormal);
        assert_close(n, normal);
    }

    #[test]
    fn w_never_quantizes_to_zero() {
        // 180 degrees about z: w is exactly zero before the bias.
        let encoded = encode_qtangent([-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 1.0]);
        assert_ne!(encoded[3], 0);
    }

    #[test]
    fn mesh_round_trip_preserves_counts_and_data() {
        let mesh = MeshResource {
            bytes_per_vertex: 28,
            index_format: IndexBufferFormat::U16,
            vertex_data: (0..3 * 28).map(|byte| byte as u8).collect(),
            index_data: vec![0, 0, 1, 0, 2, 0],
            vertex_attributes: vec![VertexAttribute {
                vertex_attribute_format: VertexAttributeFormat::Float3,
                name: "Position".into(),
                semantic_index: 0,
                input_slot: 0,
                aligned_byte_offset: 0,
                instances_per_element: 0,
            }],
            sub_meshes: vec![SubMesh {
                material_asset_id: AssetId(77),
                primitive_topology: PrimitiveTopology::TriangleList,
                start_index_location: 0,
                number_of_indices: 3,
            }],
        };

        let mut bytes = Vec::new();
        write_mesh(&mut bytes, &mesh).unwrap();
        let loaded = load_mesh(&mut bytes.as_slice(), &AssetIdMapping::new()).unwrap();
        assert_eq!(loaded, mesh);
        assert_eq!(loaded.number_of_vertices(), 3);
        assert_eq!(loaded.vertex_data.len(), 3 * 28);
        assert_eq!(loaded.sub_meshes[0].number_of_indices, 3);
    }

    #[test]
    fn sub_mesh_ranges_must_fit_the_index_buffer() {
        let mut mesh = MeshResource {
            bytes_per_vertex: 4,
            index_format: IndexBufferFormat::U16,
            vertex_data: vec![0; 12],
            index_data: vec![0; 6],
            vertex_attributes: Vec::new(),
            sub_meshes: Vec::new(),
        };
        mesh.sub_meshes.push(SubMesh {
            material_asset_id: AssetId(1),
            primitive_topology: PrimitiveTopology::TriangleList,
            start_index_location: 2,
            number_of_indices: 4,
        });
        let mut bytes = Vec::new();
        write_mesh(&mut bytes, &mesh).unwrap();
        assert!(matches!(
            load_mesh(&mut bytes.as_slice(), &AssetIdMapping::new()),
            Err(AssetLoadError::Corrupt(_))
        ));
    }

    #[test]
    fn mesh_id_remapping_applies_to_sub_mesh_materials() {
        let mesh = MeshResource {
            bytes_per_vertex: 4,
            index_format: IndexBufferFormat::U16,
            vertex_data: vec![0; 4],
            index_data: Vec::new(),
            vertex_attributes: Vec::new(),
            sub_meshes: vec![SubMesh {
                material_asset_id: AssetId(5),
                primitive_topology: PrimitiveTopology::TriangleList,
                start_index_location: 0,
                number_of_indices: 0,
            }],
        };
        let mut bytes = Vec::new();
        write_mesh(&mut bytes, &mesh).unwrap();
        let mut mapping = AssetIdMapping::new();
        mapping.insert(AssetId(5), AssetId(500));
        let loaded = load_mesh(&mut bytes.as_slice(), &mapping).unwrap();
        assert_eq!(loaded.sub_meshes[0].material_asset_id, AssetId(500));
    }
}
