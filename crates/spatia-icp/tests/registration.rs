use std::sync::Arc;

use glam::{DMat4, DQuat, DVec3};
use rand::{rngs::StdRng, Rng, SeedableRng};
use spatia_3d::{CpuVertexBuffer, VertexAttribute, VertexBuffer};
use spatia_icp::{IcpConfig, IcpConvergenceCriteria, IcpDriver, Transformable};

fn random_cloud(rng: &mut StdRng, num_points: usize) -> Vec<DVec3> {
    (0..num_points)
        .map(|_| {
            DVec3::new(
                rng.random_range(-5.0..5.0),
                rng.random_range(-5.0..5.0),
                rng.random_range(-5.0..5.0),
            )
        })
        .collect()
}

fn to_buffer(points: impl IntoIterator<Item = DVec3>) -> CpuVertexBuffer {
    CpuVertexBuffer::new(points.into_iter().map(|p| p.as_vec3().to_array()).collect())
}

// A mesh-like object owning its pose.
struct Model {
    pose: DMat4,
    updates: usize,
}

impl Transformable for Model {
    fn transform(&self) -> DMat4 {
        self.pose
    }

    fn set_transform(&mut self, transform: DMat4) {
        self.pose = transform;
        self.updates += 1;
    }
}

// Positions interleaved with a padding float per record.
struct PaddedBuffer {
    data: Vec<f32>,
}

impl VertexBuffer for PaddedBuffer {
    fn len(&self) -> usize {
        self.data.len() / 4
    }

    fn attributes(&self, attribute: VertexAttribute) -> Option<&[f32]> {
        (attribute == VertexAttribute::Position).then_some(self.data.as_slice())
    }

    fn stride(&self, _: VertexAttribute) -> usize {
        4
    }

    fn elements(&self, attribute: VertexAttribute) -> usize {
        if attribute == VertexAttribute::Position {
            3
        } else {
            0
        }
    }
}

#[test]
fn test_registration_recovers_pose() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(7);
    let reference = random_cloud(&mut rng, 500);

    let pose = DMat4::from_rotation_translation(
        DQuat::from_euler(glam::EulerRot::XYZ, 0.01, -0.008, 0.012),
        DVec3::new(0.05, -0.03, 0.04),
    );
    let inverse = pose.inverse();
    let source = reference.iter().map(|p| inverse.transform_point3(*p));

    let config = IcpConfig {
        initial_radius: 2.0,
        min_radius: 0.5,
        radius_step: 0.25,
        min_correspondences: 100,
        num_threads: Some(4),
        ..Default::default()
    };
    let mut driver = IcpDriver::new(
        Arc::new(to_buffer(source)),
        Arc::new(to_buffer(reference)),
        Model {
            pose: DMat4::IDENTITY,
            updates: 0,
        },
        config,
    )?;

    let result = driver.run(&IcpConvergenceCriteria {
        max_iterations: 50,
        tolerance: 1e-9,
    });

    assert!(result.converged);
    assert!(result.rmse < 1e-4, "rmse {}", result.rmse);
    assert!(result.transform.abs_diff_eq(pose, 1e-4));

    let model = driver.into_target();
    assert_eq!(model.updates, result.num_iterations);
    assert_eq!(model.pose, result.transform);
    Ok(())
}

#[test]
fn test_registration_with_strided_buffer() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(11);
    let reference = random_cloud(&mut rng, 300);
    let offset = DVec3::new(0.05, 0.03, -0.04);

    let data = reference
        .iter()
        .flat_map(|p| {
            let q = (*p - offset).as_vec3();
            [q.x, q.y, q.z, f32::NAN]
        })
        .collect::<Vec<_>>();

    let mut driver = IcpDriver::new(
        Arc::new(PaddedBuffer { data }),
        Arc::new(to_buffer(reference)),
        DMat4::IDENTITY,
        IcpConfig {
            initial_radius: 1.0,
            min_radius: 1.0,
            radius_step: 0.0,
            min_correspondences: 50,
            num_threads: Some(2),
            ..Default::default()
        },
    )?;

    for _ in 0..20 {
        let rmse = driver.step();
        assert!(!rmse.is_nan());
        assert!(driver.last_search().accepted_count >= 50);
    }

    let translation = driver.target().w_axis.truncate();
    assert!(translation.abs_diff_eq(offset, 1e-4), "{translation}");
    assert_eq!(driver.radius(), 1.0);
    Ok(())
}
