use glam::{DVec3, Vec3};

/// Kinds of per-point attributes a [`VertexBuffer`] may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttribute {
    /// 3D position, the only attribute used for geometry.
    Position,
    /// Surface normal.
    Normal,
    /// RGBA color.
    Color,
    /// First texture coordinate set.
    Uv0,
    /// Auxiliary user data.
    Aux,
}

impl VertexAttribute {
    /// Every attribute kind, in bit order.
    pub const ALL: [VertexAttribute; 5] = [
        VertexAttribute::Position,
        VertexAttribute::Normal,
        VertexAttribute::Color,
        VertexAttribute::Uv0,
        VertexAttribute::Aux,
    ];

    /// Bit of this attribute in [`VertexBuffer::attribute_mask`].
    #[inline]
    pub fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// Errors raised when reading a vertex buffer.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum VertexBufferError {
    /// The buffer does not provide the requested attribute.
    #[error("vertex buffer has no {0:?} attribute")]
    MissingAttribute(VertexAttribute),

    /// The attribute layout cannot hold the advertised number of records.
    #[error(
        "invalid {attribute:?} layout: {elements} elements with stride {stride} \
         cannot hold {len} records in {available} floats"
    )]
    InvalidLayout {
        /// Attribute being read.
        attribute: VertexAttribute,
        /// Components per record.
        elements: usize,
        /// Floats between consecutive records.
        stride: usize,
        /// Number of records advertised by the buffer.
        len: usize,
        /// Number of floats actually exposed.
        available: usize,
    },

    /// An optional attribute does not have one entry per point.
    #[error("expected {expected} {attribute:?} entries, got {actual}")]
    LengthMismatch {
        /// Attribute being set.
        attribute: VertexAttribute,
        /// Number of points in the buffer.
        expected: usize,
        /// Number of entries provided.
        actual: usize,
    },
}

/// Read-only access to a buffer of per-point attributes.
///
/// Attributes are exposed as flat `f32` slices where record `i` starts at
/// `i * stride(kind)` and holds `elements(kind)` components. An attribute
/// with zero elements is absent.
pub trait VertexBuffer: Send + Sync {
    /// Number of records in the buffer.
    fn len(&self) -> usize;

    /// Flat storage of the given attribute, if present.
    fn attributes(&self, attribute: VertexAttribute) -> Option<&[f32]>;

    /// Number of floats between consecutive records of the attribute.
    fn stride(&self, attribute: VertexAttribute) -> usize;

    /// Number of components of the attribute, `0` when absent.
    fn elements(&self, attribute: VertexAttribute) -> usize;

    /// Check if the buffer holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bit mask of the attributes present in the buffer.
    fn attribute_mask(&self) -> u32 {
        VertexAttribute::ALL
            .iter()
            .filter(|attribute| self.elements(**attribute) > 0)
            .fold(0, |mask, attribute| mask | attribute.bit())
    }
}

/// A vertex buffer holding positions and optional colors in host memory.
#[derive(Debug, Clone, Default)]
pub struct CpuVertexBuffer {
    positions: Vec<[f32; 3]>,
    colors: Option<Vec<[f32; 4]>>,
}

impl CpuVertexBuffer {
    /// Create a new vertex buffer from positions only.
    pub fn new(positions: Vec<[f32; 3]>) -> Self {
        Self {
            positions,
            colors: None,
        }
    }

    /// Create a new vertex buffer with one RGBA color per position.
    pub fn with_colors(
        positions: Vec<[f32; 3]>,
        colors: Vec<[f32; 4]>,
    ) -> Result<Self, VertexBufferError> {
        if positions.len() != colors.len() {
            return Err(VertexBufferError::LengthMismatch {
                attribute: VertexAttribute::Color,
                expected: positions.len(),
                actual: colors.len(),
            });
        }
        Ok(Self {
            positions,
            colors: Some(colors),
        })
    }

    /// Get as reference the positions in the buffer.
    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    /// Get as reference the colors in the buffer.
    pub fn colors(&self) -> Option<&[[f32; 4]]> {
        self.colors.as_deref()
    }
}

impl From<Vec<Vec3>> for CpuVertexBuffer {
    fn from(points: Vec<Vec3>) -> Self {
        Self::new(points.into_iter().map(|p| p.to_array()).collect())
    }
}

impl VertexBuffer for CpuVertexBuffer {
    fn len(&self) -> usize {
        self.positions.len()
    }

    fn attributes(&self, attribute: VertexAttribute) -> Option<&[f32]> {
        match attribute {
            VertexAttribute::Position => Some(self.positions.as_flattened()),
            VertexAttribute::Color => self.colors.as_deref().map(|c| c.as_flattened()),
            _ => None,
        }
    }

    fn stride(&self, attribute: VertexAttribute) -> usize {
        self.elements(attribute)
    }

    fn elements(&self, attribute: VertexAttribute) -> usize {
        match attribute {
            VertexAttribute::Position => 3,
            VertexAttribute::Color if self.colors.is_some() => 4,
            _ => 0,
        }
    }
}

/// A validated view over the positions of a [`VertexBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct PositionView<'a> {
    data: &'a [f32],
    stride: usize,
    len: usize,
}

impl<'a> PositionView<'a> {
    /// Create a view over the `Position` attribute of a buffer.
    ///
    /// Fails when the attribute is missing, has fewer than three components,
    /// or the exposed storage is too short for the advertised length.
    pub fn new<B: VertexBuffer + ?Sized>(buffer: &'a B) -> Result<Self, VertexBufferError> {
        let attribute = VertexAttribute::Position;
        let elements = buffer.elements(attribute);
        let data = buffer
            .attributes(attribute)
            .filter(|_| elements > 0)
            .ok_or(VertexBufferError::MissingAttribute(attribute))?;

        let stride = buffer.stride(attribute);
        let len = buffer.len();
        let required = match len {
            0 => 0,
            n => (n - 1) * stride + 3,
        };

        if elements < 3 || stride < elements || data.len() < required {
            return Err(VertexBufferError::InvalidLayout {
                attribute,
                elements,
                stride,
                len,
                available: data.len(),
            });
        }

        Ok(Self { data, stride, len })
    }

    /// Get the number of positions.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the view is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the position at `index`.
    ///
    /// Panics if `index >= len()`.
    #[inline]
    pub fn get(&self, index: usize) -> Vec3 {
        let offset = index * self.stride;
        Vec3::new(
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        )
    }

    /// Get the position at `index` in double precision.
    #[inline]
    pub fn get_f64(&self, index: usize) -> DVec3 {
        self.get(index).as_dvec3()
    }

    /// Iterate over all positions.
    pub fn iter(&self) -> impl Iterator<Item = Vec3> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }
}
