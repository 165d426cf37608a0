use crate::encoder_buffer::EncoderBuffer;
use crate::file_format::{NodeType, TransformType, NO_MESH_INDEX};
use crate::vector_extensions::QuatTns;

/// What a scene node carries besides its transform.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Transform,
    /// Index into the scene mesh table.
    Mesh { mesh_index: usize },
    /// Opaque physics proxy serialized by ingestion.
    PhysicsGeometry { blob: Vec<u8> },
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Transform => NodeType::Transform,
            NodeKind::Mesh { .. } => NodeType::Mesh,
            NodeKind::PhysicsGeometry { .. } => NodeType::PhysicsGeometry,
        }
    }

    pub fn mesh_index(&self) -> Option<usize> {
        match self {
            NodeKind::Mesh { mesh_index } => Some(*mesh_index),
            _ => None,
        }
    }
}

/// Scene hierarchy entry. Children are owned by their parent.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub transform_type: TransformType,
    /// Local transform at tick 0.
    pub initial_transform: QuatTns,
    pub visible: bool,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            transform_type: TransformType::Constant,
            initial_transform: QuatTns::IDENTITY,
            visible: true,
            children: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform_type: TransformType, initial_transform: QuatTns) -> Self {
        self.transform_type = transform_type;
        self.initial_transform = initial_transform;
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_animated(&self) -> bool {
        self.transform_type == TransformType::Animated
    }

    /// Number of nodes in this subtree including `self`.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Node::count).sum::<usize>()
    }

    /// Writes the static node record, without children.
    pub fn encode_static(&self, buffer: &mut EncoderBuffer) {
        buffer.encode_u8(self.kind.node_type() as u8);
        buffer.encode_u8(self.transform_type as u8);
        buffer.encode_u8(self.visible as u8);
        buffer.encode_u8(0);
        let mesh_index = self.kind.mesh_index().map_or(NO_MESH_INDEX, |i| i as u32);
        buffer.encode_u32(mesh_index);
        buffer.encode_u32(self.children.len() as u32);
        buffer.encode_string(&self.name);
        buffer.encode_f32_slice(&self.initial_transform.to_floats());
        if let NodeKind::PhysicsGeometry { blob } = &self.kind {
            buffer.encode_u32(blob.len() as u32);
            buffer.encode_bytes(blob);
        }
    }
}

/// Per-tick local transform and visibility of one node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeFrame {
    pub transform: QuatTns,
    pub visible: bool,
}

impl Default for NodeFrame {
    fn default() -> Self {
        Self {
            transform: QuatTns::IDENTITY,
            visible: true,
        }
    }
}

impl NodeFrame {
    pub fn new(transform: QuatTns, visible: bool) -> Self {
        Self { transform, visible }
    }

    /// Writes the per-tick node block. `visible` is the propagated flag.
    pub fn encode(&self, visible: bool, animated: bool, buffer: &mut EncoderBuffer) {
        buffer.encode_u8(visible as u8);
        buffer.encode_padding(3);
        if animated {
            buffer.encode_f32_slice(&self.transform.to_floats());
        }
    }
}
