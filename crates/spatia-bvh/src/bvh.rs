use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::JoinHandle;

use glam::Vec3;
use spatia_3d::{Aabb, PositionView, Ray};

use crate::error::BvhError;
use crate::primitive::Primitive;

/// Root value while no tree is published.
const NOT_READY: usize = usize::MAX;

/// Node and leaf references share an `i32`, internal nodes take at most `2n - 1` slots.
const MAX_PRIMITIVES: usize = i32::MAX as usize / 2;

/// A decoded child reference of a [`BvhNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Child {
    /// Index of an internal node in the arena.
    Node(usize),
    /// Index of a primitive.
    Leaf(usize),
}

impl Child {
    /// Decode a child reference. Negative values are leaves, offset by one so
    /// that primitive `0` stays distinct from node `0`.
    #[inline]
    pub fn decode(raw: i32) -> Self {
        if raw < 0 {
            Child::Leaf((-(raw as i64) - 1) as usize)
        } else {
            Child::Node(raw as usize)
        }
    }

    /// Encode the child reference.
    #[inline]
    pub fn encode(self) -> i32 {
        // both indices are bounded by `MAX_PRIMITIVES` at construction
        match self {
            Child::Node(index) => index as i32,
            Child::Leaf(primitive) => -(primitive as i32) - 1,
        }
    }
}

/// A binary node of the hierarchy with the boxes of both children.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhNode {
    /// Encoded left child, see [`Child::decode`].
    pub left: i32,
    /// Encoded right child, see [`Child::decode`].
    pub right: i32,
    /// Bound of everything below the left child.
    pub left_box: Aabb,
    /// Bound of everything below the right child.
    pub right_box: Aabb,
}

impl BvhNode {
    /// The decoded left child.
    pub fn left_child(&self) -> Child {
        Child::decode(self.left)
    }

    /// The decoded right child.
    pub fn right_child(&self) -> Child {
        Child::decode(self.right)
    }

    /// Bound of the whole subtree.
    pub fn bounds(&self) -> Aabb {
        self.left_box + self.right_box
    }
}

/// The closest hit found so far during a traversal.
#[derive(Debug, Clone, Copy)]
pub struct HitRecord<T> {
    /// Index of the hit primitive, `None` until something is hit.
    pub index: Option<usize>,
    /// Distance along the ray of the hit.
    pub distance: f32,
    /// Primitive specific hit data.
    pub payload: T,
}

impl<T: Default> Default for HitRecord<T> {
    fn default() -> Self {
        Self {
            index: None,
            distance: f32::INFINITY,
            payload: T::default(),
        }
    }
}

impl<T> HitRecord<T> {
    /// Keep the hit if it is closer than the current one.
    #[inline]
    pub fn update(&mut self, index: usize, distance: f32, payload: T) {
        if distance < self.distance {
            self.index = Some(index);
            self.distance = distance;
            self.payload = payload;
        }
    }
}

/// The nearest hit of a ray query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    /// Index of the hit primitive.
    pub primitive_index: usize,
    /// Distance from the ray origin to the hit.
    pub distance: f32,
    /// The reported hit point: the point itself for point clouds, the
    /// interpolated surface point for triangles.
    pub point: Vec3,
    /// Barycentric weights of the hit for triangles.
    pub barycentric: Option<Vec3>,
}

struct Shared<P> {
    primitives: P,
    nodes: OnceLock<Vec<BvhNode>>,
    root: AtomicUsize,
    running: AtomicBool,
}

impl<P: Primitive> Shared<P> {
    fn new(primitives: P) -> Self {
        Self {
            primitives,
            nodes: OnceLock::new(),
            root: AtomicUsize::new(NOT_READY),
            running: AtomicBool::new(true),
        }
    }

    fn build(&self) {
        let now = std::time::Instant::now();

        let positions = match PositionView::new(self.primitives.buffer()) {
            Ok(positions) => positions,
            Err(err) => {
                log::error!("bvh: cannot read positions: {err}");
                return;
            }
        };

        let len = self.primitives.len();
        let mut ids = (0..len as u32).collect::<Vec<_>>();
        let mut builder = Builder {
            primitives: &self.primitives,
            positions,
            running: &self.running,
            nodes: Vec::with_capacity(len.saturating_sub(1).max(1)),
        };

        let Some(root) = builder.build(&mut ids, 0) else {
            log::debug!("bvh: build of {len} primitives cancelled");
            return;
        };

        let num_nodes = builder.nodes.len();
        if self.nodes.set(builder.nodes).is_ok() {
            self.root.store(root, Ordering::Release);
            log::debug!(
                "bvh: built {num_nodes} nodes over {len} primitives in {:?}",
                now.elapsed()
            );
        }
    }

    fn published(&self) -> Option<(usize, &[BvhNode])> {
        let root = self.root.load(Ordering::Acquire);
        if root == NOT_READY {
            return None;
        }
        self.nodes.get().map(|nodes| (root, nodes.as_slice()))
    }
}

struct Builder<'a, P> {
    primitives: &'a P,
    positions: PositionView<'a>,
    running: &'a AtomicBool,
    nodes: Vec<BvhNode>,
}

impl<P: Primitive> Builder<'_, P> {
    fn leaf(&self, id: u32) -> (i32, Aabb) {
        let id = id as usize;
        (
            Child::Leaf(id).encode(),
            self.primitives.aabb(&self.positions, id),
        )
    }

    /// Append the subtree over `ids` in post-order and return its node index,
    /// or `None` once the build is cancelled.
    fn build(&mut self, ids: &mut [u32], axis: usize) -> Option<usize> {
        let node = match ids.len() {
            0 => return None,
            1 => {
                let (leaf, aabb) = self.leaf(ids[0]);
                BvhNode {
                    left: leaf,
                    right: leaf,
                    left_box: aabb,
                    right_box: aabb,
                }
            }
            2 => {
                let (left, left_box) = self.leaf(ids[0]);
                let (right, right_box) = self.leaf(ids[1]);
                BvhNode {
                    left,
                    right,
                    left_box,
                    right_box,
                }
            }
            _ => {
                if !self.running.load(Ordering::Relaxed) {
                    return None;
                }

                let (primitives, positions) = (self.primitives, &self.positions);
                ids.sort_unstable_by(|&a, &b| {
                    let ka = primitives.sort_key(positions, a as usize, axis);
                    let kb = primitives.sort_key(positions, b as usize, axis);
                    ka.total_cmp(&kb)
                });

                let next = (axis + 1) % 3;
                let (lower, upper) = ids.split_at_mut(ids.len() / 2);
                let left = self.build(lower, next)?;
                let right = self.build(upper, next)?;

                BvhNode {
                    left: Child::Node(left).encode(),
                    right: Child::Node(right).encode(),
                    left_box: self.nodes[left].bounds(),
                    right_box: self.nodes[right].bounds(),
                }
            }
        };

        self.nodes.push(node);
        Some(self.nodes.len() - 1)
    }
}

/// A bounding volume hierarchy built in the background.
///
/// [`Bvh::new`] starts one builder thread and returns immediately. Queries
/// issued before the tree is published report no hit; once published the tree
/// is immutable and can be queried from any number of threads.
///
/// Dropping the hierarchy stops the builder before its next subdivision and
/// waits for the thread to exit.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use glam::Vec3;
/// use spatia_3d::CpuVertexBuffer;
/// use spatia_bvh::{Bvh, Points};
///
/// let cloud = CpuVertexBuffer::new(vec![[0.0, 0.0, -5.0], [3.0, 0.0, -5.0]]);
/// let bvh = Bvh::new(Points::new(Arc::new(cloud))).unwrap();
/// bvh.wait();
///
/// let hit = bvh.intersect(Vec3::ZERO, Vec3::NEG_Z).unwrap();
/// assert_eq!(hit.primitive_index, 0);
/// ```
pub struct Bvh<P: Primitive> {
    shared: Arc<Shared<P>>,
    builder: Mutex<Option<JoinHandle<()>>>,
}

impl<P: Primitive> Bvh<P> {
    /// Start building a hierarchy over `primitives`.
    ///
    /// An empty primitive set spawns nothing and never becomes ready.
    pub fn new(primitives: P) -> Result<Self, BvhError> {
        let len = primitives.len();
        if len > MAX_PRIMITIVES {
            return Err(BvhError::TooManyPrimitives(len));
        }
        PositionView::new(primitives.buffer())?;

        let shared = Arc::new(Shared::new(primitives));

        let builder = if len == 0 {
            None
        } else {
            let shared = shared.clone();
            let handle = std::thread::Builder::new()
                .name("bvh-builder".to_string())
                .spawn(move || shared.build())?;
            Some(handle)
        };

        Ok(Self {
            shared,
            builder: Mutex::new(builder),
        })
    }

    /// The primitive set of the hierarchy.
    pub fn primitives(&self) -> &P {
        &self.shared.primitives
    }

    /// Check if the tree has been published.
    pub fn is_ready(&self) -> bool {
        self.shared.published().is_some()
    }

    /// Block until the builder thread has exited.
    ///
    /// Returns immediately for an empty primitive set or a finished build.
    pub fn wait(&self) {
        let handle = self
            .builder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        join_builder(handle);
    }

    /// The node arena in post-order, once published.
    pub fn nodes(&self) -> Option<&[BvhNode]> {
        self.shared.published().map(|(_, nodes)| nodes)
    }

    /// Arena index of the root node, once published.
    pub fn root(&self) -> Option<usize> {
        self.shared.published().map(|(root, _)| root)
    }

    /// Find the nearest primitive hit by the ray.
    ///
    /// Returns `None` on a miss, for a zero direction and while the tree is
    /// not ready. Never blocks on the builder.
    pub fn intersect(&self, origin: Vec3, direction: Vec3) -> Option<Intersection> {
        let (root, nodes) = self.shared.published()?;

        let ray = Ray::new(origin, direction);
        if ray.direction == Vec3::ZERO {
            return None;
        }

        let primitives = &self.shared.primitives;
        let positions = PositionView::new(primitives.buffer()).ok()?;

        let mut rec = HitRecord::default();
        hit(
            primitives,
            &positions,
            nodes,
            &ray,
            Child::Node(root),
            &mut rec,
        );

        let primitive_index = rec.index?;
        Some(Intersection {
            primitive_index,
            distance: rec.distance,
            point: primitives.hit_point(&positions, primitive_index, &rec.payload),
            barycentric: primitives.barycentric(&rec.payload),
        })
    }
}

fn hit<P: Primitive>(
    primitives: &P,
    positions: &PositionView<'_>,
    nodes: &[BvhNode],
    ray: &Ray,
    child: Child,
    rec: &mut HitRecord<P::Payload>,
) {
    match child {
        Child::Leaf(id) => {
            if let Some((distance, payload)) = primitives.hit_test(positions, id, ray) {
                rec.update(id, distance, payload);
            }
        }
        Child::Node(index) => {
            let Some(node) = nodes.get(index) else {
                return;
            };
            if node.left_box.hit(ray) {
                hit(primitives, positions, nodes, ray, node.left_child(), rec);
            }
            if node.right_box.hit(ray) {
                hit(primitives, positions, nodes, ray, node.right_child(), rec);
            }
        }
    }
}

fn join_builder(handle: Option<JoinHandle<()>>) {
    if let Some(handle) = handle {
        if handle.join().is_err() {
            log::error!("bvh: builder thread panicked");
        }
    }
}

impl<P: Primitive> Drop for Bvh<P> {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Relaxed);
        let handle = self
            .builder
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        join_builder(handle);
    }
}
