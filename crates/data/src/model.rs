//! Ship mesh wire format.
//!
//! A model buffer is four length-prefixed sections back to back:
//!
//! ```text
//! [vertexSectionLen][normalSectionLen][uvSectionLen][matSectionLen]
//! <vertex section>:   [meshCount] { [floatCount] f32[floatCount] }*meshCount
//! <normal section>:   [meshCount] { [tripleCount] (f32 x3)*tripleCount }*meshCount
//! <uv section>:       [meshCount] { [floatCount] f32[floatCount] }*meshCount
//! <material section>: u32[matSectionLen/4]
//! ```
//!
//! All integers are little-endian u32. Each section repeats the mesh count,
//! so a corrupt section can be skipped by its declared length and the rest
//! of the buffer still parses. Boundary disagreements are logged, never
//! fatal: the viewer must render whatever partial data survived.

use crate::error::DecodeError;
use crate::reader::ByteReader;

/// One mesh of a ship model: planar attribute arrays plus a vertex count
/// implied by `vertices.len() / 3`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    /// x/y/z triples, flat.
    pub vertices: Vec<f32>,
    /// Normal triples, flat (the wire format nests them; decode flattens).
    pub normals: Vec<f32>,
    /// u/v pairs, flat.
    pub uvs: Vec<f32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }
}

/// A decoded ship model for one level of detail.
///
/// `id` and `lod` identify the fetch this model came from and act as the
/// reload key: the renderer rebuilds GPU state only when they change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShipModel {
    pub id: u32,
    pub lod: String,
    pub meshes: Vec<MeshData>,
    /// One material id per mesh.
    pub material_ids: Vec<u32>,
}

const HEADER_LEN: usize = 4 * 4;

impl ShipModel {
    /// Parse a model buffer. Only a buffer too short for the section-length
    /// header is a hard error; anything after that decodes best-effort.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut header = ByteReader::new(bytes);
        let (Some(vert_len), Some(norm_len), Some(uv_len), Some(mat_len)) = (
            header.u32(),
            header.u32(),
            header.u32(),
            header.u32(),
        ) else {
            return Err(DecodeError::Truncated {
                offset: 0,
                needed: HEADER_LEN,
                len: bytes.len(),
            });
        };

        let mut offset = HEADER_LEN;
        let vertices = read_float_lists(section(bytes, offset, vert_len as usize, "vertex"), "vertex");
        offset += vert_len as usize;
        let normals = read_normal_lists(section(bytes, offset, norm_len as usize, "normal"));
        offset += norm_len as usize;
        let uvs = read_float_lists(section(bytes, offset, uv_len as usize, "uv"), "uv");
        offset += uv_len as usize;
        let material_ids = read_material_ids(section(bytes, offset, mat_len as usize, "material"));
        offset += mat_len as usize;

        if offset != bytes.len() {
            tracing::warn!(offset, total = bytes.len(), "total length mismatch");
        }

        let mesh_count = vertices.len();
        if normals.len() != mesh_count || uvs.len() != mesh_count {
            tracing::warn!(
                vertices = mesh_count,
                normals = normals.len(),
                uvs = uvs.len(),
                "section mesh counts disagree"
            );
        }
        if material_ids.len() != mesh_count {
            tracing::warn!(
                materials = material_ids.len(),
                meshes = mesh_count,
                "material count does not match mesh count"
            );
        }

        let mut normals = normals.into_iter();
        let mut uvs = uvs.into_iter();
        let meshes = vertices
            .into_iter()
            .map(|vertices| MeshData {
                vertices,
                normals: normals.next().unwrap_or_default(),
                uvs: uvs.next().unwrap_or_default(),
            })
            .collect();

        Ok(Self {
            id: 0,
            lod: String::new(),
            meshes,
            material_ids,
        })
    }

    /// Tag a decoded model with the identity of the fetch that produced it.
    pub fn with_identity(mut self, id: u32, lod: impl Into<String>) -> Self {
        self.id = id;
        self.lod = lod.into();
        self
    }

    /// Inverse of [`ShipModel::decode`]; used by the export tooling and by
    /// round-trip tests.
    pub fn encode(&self) -> Vec<u8> {
        let vertex_section = encode_float_lists(self.meshes.iter().map(|m| &m.vertices));
        let normal_section = encode_normal_lists(self.meshes.iter().map(|m| &m.normals));
        let uv_section = encode_float_lists(self.meshes.iter().map(|m| &m.uvs));

        let mut out = Vec::with_capacity(
            HEADER_LEN
                + vertex_section.len()
                + normal_section.len()
                + uv_section.len()
                + self.material_ids.len() * 4,
        );
        out.extend_from_slice(&(vertex_section.len() as u32).to_le_bytes());
        out.extend_from_slice(&(normal_section.len() as u32).to_le_bytes());
        out.extend_from_slice(&(uv_section.len() as u32).to_le_bytes());
        out.extend_from_slice(&((self.material_ids.len() * 4) as u32).to_le_bytes());
        out.extend_from_slice(&vertex_section);
        out.extend_from_slice(&normal_section);
        out.extend_from_slice(&uv_section);
        for id in &self.material_ids {
            out.extend_from_slice(&id.to_le_bytes());
        }
        out
    }
}

/// Slice out a declared section, clamping to the buffer end with a log when
/// the declared length overruns it.
fn section<'a>(bytes: &'a [u8], offset: usize, len: usize, what: &str) -> &'a [u8] {
    let start = offset.min(bytes.len());
    let end = offset.saturating_add(len);
    if end > bytes.len() {
        tracing::warn!(what, offset, len, total = bytes.len(), "section runs past buffer end");
        &bytes[start..]
    } else {
        &bytes[start..end]
    }
}

/// `[count] { [n] f32[n] }*count` — the vertex and uv section shape.
fn read_float_lists(sect: &[u8], what: &str) -> Vec<Vec<f32>> {
    let mut r = ByteReader::new(sect);
    let Some(count) = r.u32() else {
        tracing::warn!(what, "section too short for mesh count");
        return Vec::new();
    };

    let mut lists = Vec::new();
    for _ in 0..count {
        let Some(n) = r.u32() else { break };
        let Some(values) = r.f32s(n as usize) else { break };
        lists.push(values);
    }

    if lists.len() != count as usize || r.remaining() != 0 {
        tracing::warn!(
            what,
            consumed = r.offset(),
            declared = sect.len(),
            "section length mismatch"
        );
    }
    lists
}

/// `[count] { [triples] (f32 x3)*triples }*count`, flattened on read.
fn read_normal_lists(sect: &[u8]) -> Vec<Vec<f32>> {
    let mut r = ByteReader::new(sect);
    let Some(count) = r.u32() else {
        tracing::warn!("normal section too short for mesh count");
        return Vec::new();
    };

    let mut lists = Vec::new();
    for _ in 0..count {
        let Some(triples) = r.u32() else { break };
        let Some(floats) = (triples as usize).checked_mul(3) else { break };
        let Some(values) = r.f32s(floats) else { break };
        lists.push(values);
    }

    if lists.len() != count as usize || r.remaining() != 0 {
        tracing::warn!(
            consumed = r.offset(),
            declared = sect.len(),
            "normal section length mismatch"
        );
    }
    lists
}

fn read_material_ids(sect: &[u8]) -> Vec<u32> {
    if sect.len() % 4 != 0 {
        tracing::warn!(len = sect.len(), "material section not a multiple of 4");
    }
    sect.chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn encode_float_lists<'a>(lists: impl ExactSizeIterator<Item = &'a Vec<f32>>) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(lists.len() as u32).to_le_bytes());
    for list in lists {
        out.extend_from_slice(&(list.len() as u32).to_le_bytes());
        for v in list {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out
}

fn encode_normal_lists<'a>(lists: impl ExactSizeIterator<Item = &'a Vec<f32>>) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(lists.len() as u32).to_le_bytes());
    for list in lists {
        out.extend_from_slice(&((list.len() / 3) as u32).to_le_bytes());
        for v in list {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> ShipModel {
        ShipModel {
            id: 7,
            lod: "level0".into(),
            meshes: vec![
                MeshData {
                    vertices: vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
                    normals: vec![0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
                    uvs: vec![0.0, 0.5, 1.0, 0.25],
                },
                MeshData {
                    vertices: vec![-1.0, -2.0, -3.0],
                    normals: vec![1.0, 0.0, 0.0],
                    uvs: vec![0.75, 0.75],
                },
            ],
            material_ids: vec![3, 1],
        }
    }

    #[test]
    fn roundtrip() {
        let model = sample_model();
        let decoded = ShipModel::decode(&model.encode())
            .unwrap()
            .with_identity(7, "level0");
        assert_eq!(decoded, model);
    }

    #[test]
    fn roundtrip_empty() {
        let model = ShipModel::default();
        let decoded = ShipModel::decode(&model.encode()).unwrap();
        assert_eq!(decoded.meshes.len(), 0);
        assert_eq!(decoded.material_ids.len(), 0);
    }

    #[test]
    fn header_too_short_is_fatal() {
        assert!(ShipModel::decode(&[0u8; 11]).is_err());
    }

    #[test]
    fn truncated_tail_keeps_parsed_meshes() {
        let encoded = sample_model().encode();
        // Chop into the material section: meshes should survive.
        let cut = encoded.len() - 6;
        let decoded = ShipModel::decode(&encoded[..cut]).unwrap();
        assert_eq!(decoded.meshes.len(), 2);
        assert_eq!(decoded.meshes[0].vertex_count(), 2);
        assert!(decoded.material_ids.len() < 2);
    }

    #[test]
    fn corrupt_vertex_section_resyncs_on_declared_length() {
        let mut encoded = sample_model().encode();
        // Inflate the first mesh's float count past its section.
        let first_count_at = 16 + 4;
        encoded[first_count_at..first_count_at + 4].copy_from_slice(&9999u32.to_le_bytes());
        let decoded = ShipModel::decode(&encoded).unwrap();
        // Vertex data is lost, but the later sections still parse.
        assert_eq!(decoded.material_ids, vec![3, 1]);
    }
}
