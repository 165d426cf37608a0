//! Mesh table and node tree of a cache, plus per-tick helpers that walk the
//! tree in depth-first pre-order (the order of the static node table and of
//! the per-tick node blocks).

use log::{debug, warn};

use crate::encoder_buffer::EncoderBuffer;
use crate::encoder_options::EncoderOptions;
use crate::mesh::{Mesh, MeshFrameInput, MeshSource};
use crate::node::{Node, NodeFrame};
use crate::status::{GeomCacheError, Status, StatusResult};
use crate::vector_extensions::{Aabb, QuatTns};

#[derive(Debug, Clone)]
pub struct Scene {
    meshes: Vec<Mesh>,
    root: Node,
}

/// World-space state of a node at one tick.
#[derive(Debug, Clone, Copy)]
struct WorldState {
    transform: QuatTns,
    visible: bool,
}

impl Scene {
    pub fn new(root: Node) -> Self {
        Self {
            meshes: Vec::new(),
            root,
        }
    }

    /// Adds a mesh to the table and returns its index.
    ///
    /// A constant mesh whose content hash and streams match a mesh already in
    /// the table is not added again; the existing index is returned.
    pub fn add_mesh(&mut self, mesh: Mesh) -> usize {
        if let Some(existing) = self.meshes.iter().position(|m| m.can_share_with(&mesh)) {
            debug!("Sharing mesh '{}' with '{}'", mesh.name(), self.meshes[existing].name());
            return existing;
        }
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    /// Compiles `source` and adds it to the table.
    ///
    /// A mesh breaking the ingestion contract is skipped with a warning and
    /// `None` is returned, so the caller leaves its nodes out of the tree.
    /// Other errors are returned as is.
    pub fn add_mesh_source(
        &mut self,
        source: &MeshSource,
        first_frame: &MeshFrameInput,
        options: &EncoderOptions,
    ) -> StatusResult<Option<usize>> {
        match Mesh::build(source, first_frame, options) {
            Ok(mesh) => Ok(Some(self.add_mesh(mesh))),
            Err(err) if err.is_mesh_local() => {
                warn!("Skipping mesh '{}': {}", source.name, err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn set_root(&mut self, root: Node) {
        self.root = root;
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn num_nodes(&self) -> usize {
        self.root.count()
    }

    /// Nodes in depth-first pre-order.
    pub fn nodes_depth_first(&self) -> Vec<&Node> {
        fn walk<'a>(node: &'a Node, out: &mut Vec<&'a Node>) {
            out.push(node);
            for child in &node.children {
                walk(child, out);
            }
        }
        let mut out = Vec::with_capacity(self.num_nodes());
        walk(&self.root, &mut out);
        out
    }

    /// Indices of meshes with at least one animated stream, in table order.
    pub fn animated_mesh_indices(&self) -> Vec<usize> {
        self.meshes
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_animated())
            .map(|(i, _)| i)
            .collect()
    }

    /// Checks node mesh references against the mesh table.
    pub fn validate(&self) -> Status {
        for node in self.nodes_depth_first() {
            if let Some(index) = node.kind.mesh_index() {
                if index >= self.meshes.len() {
                    return Err(GeomCacheError::InvalidParameter(format!(
                        "node '{}' references mesh {} of {}",
                        node.name,
                        index,
                        self.meshes.len()
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_frames(&self, frames: &[NodeFrame]) -> Status {
        let expected = self.num_nodes();
        if frames.len() != expected {
            return Err(GeomCacheError::FrameSequence(format!(
                "got {} node frames for {} nodes",
                frames.len(),
                expected
            )));
        }
        Ok(())
    }

    /// World transform and propagated visibility per node, depth-first.
    fn world_states(&self, frames: &[NodeFrame]) -> StatusResult<Vec<WorldState>> {
        self.check_frames(frames)?;

        fn walk(node: &Node, parent: WorldState, frames: &[NodeFrame], out: &mut Vec<WorldState>) {
            let frame = &frames[out.len()];
            let local = if node.is_animated() {
                frame.transform
            } else {
                node.initial_transform
            };
            let state = WorldState {
                transform: parent.transform * local,
                visible: parent.visible && frame.visible,
            };
            out.push(state);
            for child in &node.children {
                walk(child, state, frames, out);
            }
        }

        let mut out = Vec::with_capacity(frames.len());
        let root_parent = WorldState {
            transform: QuatTns::IDENTITY,
            visible: true,
        };
        walk(&self.root, root_parent, frames, &mut out);
        Ok(out)
    }

    /// Visibility per node after hiding the subtrees of invisible ancestors.
    pub fn propagate_visibility(&self, frames: &[NodeFrame]) -> StatusResult<Vec<bool>> {
        Ok(self.world_states(frames)?.into_iter().map(|s| s.visible).collect())
    }

    /// Number of visible nodes referencing each mesh at this tick.
    pub fn mesh_use_counts(&self, frames: &[NodeFrame]) -> StatusResult<Vec<u32>> {
        let states = self.world_states(frames)?;
        let mut counts = vec![0u32; self.meshes.len()];
        for (node, state) in self.nodes_depth_first().into_iter().zip(&states) {
            if let Some(index) = node.kind.mesh_index() {
                if state.visible {
                    if let Some(count) = counts.get_mut(index) {
                        *count += 1;
                    }
                }
            }
        }
        Ok(counts)
    }

    /// World bounds of all visible mesh nodes at this tick.
    pub fn frame_aabb(&self, frames: &[NodeFrame]) -> StatusResult<Aabb> {
        let states = self.world_states(frames)?;
        let mut aabb = Aabb::empty();
        for (node, state) in self.nodes_depth_first().into_iter().zip(&states) {
            if let (Some(index), true) = (node.kind.mesh_index(), state.visible) {
                if let Some(mesh) = self.meshes.get(index) {
                    aabb.add(&mesh.aabb().transformed(&state.transform));
                }
            }
        }
        Ok(aabb)
    }

    /// Writes the per-tick node blocks in tree order.
    pub fn encode_node_frames(&self, frames: &[NodeFrame], buffer: &mut EncoderBuffer) -> Status {
        let visibility = self.propagate_visibility(frames)?;
        for ((node, frame), visible) in self.nodes_depth_first().into_iter().zip(frames).zip(visibility) {
            frame.encode(visible, node.is_animated(), buffer);
        }
        Ok(())
    }

    /// Writes the static data block payload: counts, node records, mesh records.
    pub fn encode_static(&self, buffer: &mut EncoderBuffer, use_32bit_indices: bool) {
        let nodes = self.nodes_depth_first();
        buffer.encode_u32(nodes.len() as u32);
        buffer.encode_u32(self.meshes.len() as u32);
        for node in nodes {
            node.encode_static(buffer);
        }
        for mesh in &self.meshes {
            mesh.encode_static(buffer, use_32bit_indices);
        }
    }
}
