//! Mesh output: the active frontier as triangles or an indexed vertex batch.

use std::collections::HashMap;

use glam::Vec3;

use crate::camera::VisState;
use crate::terrain::bintree::TreeIndex;
use crate::terrain::triangle_table::TriIndex;

use super::TileMeshManager;

/// One active triangle in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderTriangle {
    pub tree: TreeIndex,
    pub tri: TriIndex,
    /// Apex, v0, v1
    pub vertices: [Vec3; 3],
    pub vis: VisState,
}

/// GPU-ready terrain vertex.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TerrainVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

static_assertions::assert_eq_size!(TerrainVertex, [u8; 24]);

/// Indexed triangle list with vertices shared across triangles and tiles.
#[derive(Clone, Debug, Default)]
pub struct TerrainMeshData {
    pub vertices: Vec<TerrainVertex>,
    pub indices: Vec<u32>,
}

impl TerrainMeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Raw bytes for a vertex buffer upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

impl TileMeshManager {
    /// Every active triangle of every tree, visible or not.
    pub fn render_triangles(&self) -> impl Iterator<Item = RenderTriangle> + '_ {
        self.trees.iter().flat_map(|tree| {
            tree.active_triangles().map(move |node| RenderTriangle {
                tree: tree.index(),
                tri: node.tri,
                vertices: tree.triangle_world(node.tri),
                vis: node.vis,
            })
        })
    }

    /// Build an indexed batch of the active triangles, wound counter-clockwise
    /// seen from above.
    pub fn vertex_batch(&self, visible_only: bool) -> TerrainMeshData {
        let mut data = TerrainMeshData::default();
        let mut lookup: HashMap<(u32, u32), u32> = HashMap::new();

        for tree in &self.trees {
            for node in tree.active_triangles() {
                if visible_only && !node.vis.is_visible() {
                    continue;
                }

                let mut corner = [0u32; 3];
                for (slot, v) in self.table.vertices(node.tri).into_iter().enumerate() {
                    let point = tree.global_point(self.table.grid_point(v));
                    corner[slot] = *lookup.entry(point).or_insert_with(|| {
                        let position = tree.vertex_world(v);
                        let normal = self
                            .field
                            .vertex_normal(point.0 as usize, point.1 as usize, 1.0)
                            .unwrap_or(Vec3::Y);
                        data.vertices.push(TerrainVertex {
                            position: position.to_array(),
                            normal: normal.to_array(),
                        });
                        (data.vertices.len() - 1) as u32
                    });
                }

                let [a, b, c] = corner.map(|i| Vec3::from_array(data.vertices[i as usize].position));
                if (b - a).cross(c - a).y < 0.0 {
                    corner.swap(1, 2);
                }
                data.indices.extend_from_slice(&corner);
            }
        }
        data
    }
}
