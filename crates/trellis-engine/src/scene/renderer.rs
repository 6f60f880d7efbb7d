use glam::Mat4;

use crate::render::{RenderCtx, RenderTarget};

use super::Mesh;

/// Stable handle to a mesh owned by a [`Renderer`].
///
/// Ids are issued in increasing order and never reused.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct MeshId(u64);

/// Flat, insertion-ordered list of meshes drawn in one render pass.
///
/// Removal is deferred: a mesh marked for deletion stays in the list until the
/// next [`sweep`](Self::sweep) (run at the start of every [`render`](Self::render)),
/// which frees its GPU resources.
#[derive(Default)]
pub struct Renderer {
    /// Sorted by id, since ids increase and sweeping preserves order.
    meshes: Vec<(MeshId, Mesh)>,
    next_id: u64,
    warned_no_shader: bool,
}

impl Renderer {
    /// Vertex count at which [`Mesh::add_vertex`] starts a new buffer.
    pub const MAX_BUFFER_SIZE: usize = 100_000;

    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `mesh` and appends it to the draw list.
    pub fn add(&mut self, mesh: Mesh) -> MeshId {
        let id = MeshId(self.next_id);
        self.next_id += 1;
        self.meshes.push((id, mesh));
        id
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        let i = self.index_of(id)?;
        Some(&self.meshes[i].1)
    }

    pub fn mesh_mut(&mut self, id: MeshId) -> Option<&mut Mesh> {
        let i = self.index_of(id)?;
        Some(&mut self.meshes[i].1)
    }

    /// Marks the mesh for deletion. Returns `false` if `id` is unknown.
    pub fn remove(&mut self, id: MeshId) -> bool {
        match self.mesh_mut(id) {
            Some(mesh) => {
                mesh.mark_for_deletion();
                true
            }
            None => false,
        }
    }

    /// Number of meshes, including those pending deletion.
    #[inline]
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Meshes in draw order.
    pub fn iter(&self) -> impl Iterator<Item = (MeshId, &Mesh)> {
        self.meshes.iter().map(|(id, m)| (*id, m))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (MeshId, &mut Mesh)> {
        self.meshes.iter_mut().map(|(id, m)| (*id, m))
    }

    /// Drops every mesh marked for deletion after freeing its GPU resources.
    ///
    /// Survivors keep their relative order. Returns the number of meshes removed.
    pub fn sweep(&mut self) -> usize {
        let before = self.meshes.len();
        self.meshes.retain_mut(|(_, mesh)| {
            if mesh.is_marked_for_deletion() {
                mesh.free_gpu_resources();
                return false;
            }
            true
        });
        let removed = before - self.meshes.len();
        if removed > 0 {
            log::debug!("swept {removed} mesh(es), {} remaining", self.meshes.len());
        }
        removed
    }

    /// Draws every visible mesh into `target`, composing `global` with each mesh's
    /// local transform.
    ///
    /// Existing color and depth contents are loaded, not cleared.
    pub fn render(&mut self, ctx: &RenderCtx<'_>, target: &mut RenderTarget<'_>, global: Mat4) {
        self.sweep();

        // Depth is used only when both a view and a format are given, so the
        // pipelines and the pass agree.
        let depth_view = target.depth_view.filter(|_| ctx.depth_format.is_some());
        let ctx = RenderCtx {
            depth_format: depth_view.and(ctx.depth_format),
            ..*ctx
        };

        let mut any_ready = false;
        for (_, mesh) in self.meshes.iter_mut() {
            if mesh.is_visible() && mesh.shader_program().is_none() && !self.warned_no_shader {
                log::debug!("mesh without shader program skipped");
                self.warned_no_shader = true;
            }
            any_ready |= mesh.prepare(&ctx, global);
        }

        if !any_ready {
            return;
        }

        let mut pass = target.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("trellis mesh pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: depth_view.map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        for (_, mesh) in self.meshes.iter() {
            mesh.draw(&mut pass);
        }
    }

    fn index_of(&self, id: MeshId) -> Option<usize> {
        self.meshes.binary_search_by_key(&id, |(i, _)| *i).ok()
    }
}
