use spatia_3d::VertexBufferError;

/// An error type for building a bounding volume hierarchy.
#[derive(thiserror::Error, Debug)]
pub enum BvhError {
    /// The primitive count does not fit the signed node encoding.
    #[error("too many primitives for a bvh: {0}")]
    TooManyPrimitives(usize),

    /// Point radius must be finite and positive.
    #[error("point radius must be finite and positive, got {0}")]
    InvalidRadius(f32),

    /// A triangle references a vertex outside the buffer.
    #[error("triangle {triangle} references vertex {index} but the buffer has {len} vertices")]
    TriangleIndexOutOfBounds {
        /// Index of the offending triangle.
        triangle: usize,
        /// The out of range vertex index.
        index: u32,
        /// Number of vertices in the buffer.
        len: usize,
    },

    /// The vertex buffer has no usable positions.
    #[error(transparent)]
    VertexBuffer(#[from] VertexBufferError),

    /// The builder thread could not be started.
    #[error("failed to spawn the bvh builder thread")]
    Spawn(#[from] std::io::Error),
}
