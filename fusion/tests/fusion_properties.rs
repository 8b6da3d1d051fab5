use std::sync::Arc;

use common::float_ext::FloatExt;
use common::log_setup::init_test_tracing;
use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use fusion::simulation::BeadSimulation;
use fusion::weights::Blending;
use fusion::{
    Affine3, BlendConfig, CombinedStrategy, CombinedWeightener, Diagnostic, FusionConfig,
    FusionControl, FusionResult, Interpolation, IsolatedStrategy, IsolatedWeightener, MemorySink,
    View, ViewInfo, Volume, WeightStrategies, WeightVolume, Weighteners,
};

fn random_volume(size: [usize; 3], seed: u64) -> Volume {
    let mut rng = StdRng::seed_from_u64(seed);
    let pixels = (0..size[0] * size[1] * size[2])
        .map(|_| rng.random_range(0.0f32..1000.0))
        .collect();
    Volume::new(size[0], size[1], size[2], pixels)
}

fn fuse(control: &FusionControl, views: &[View]) -> Vec<FusionResult> {
    let mut sink = MemorySink::new();
    control.run(views, &mut sink).unwrap();
    sink.results.into_iter().map(|(_, r)| r).collect()
}

fn fuse_one(config: FusionConfig, views: &[View]) -> FusionResult {
    let mut results = fuse(&FusionControl::new(config).unwrap(), views);
    assert_eq!(results.len(), 1);
    results.remove(0)
}

fn bead_views() -> Vec<View> {
    let sim = BeadSimulation::random(
        40,
        DVec3::splat(6.0),
        DVec3::splat(18.0),
        fusion::simulation::DEFAULT_SEED,
    );
    sim.rotated_views(24, &[0, 60, 120], 0).unwrap()
}

fn content_and_blending() -> WeightStrategies {
    WeightStrategies {
        isolated: vec![IsolatedStrategy::Entropy { window: 5, bins: 32 }],
        combined: vec![CombinedStrategy::Blending(BlendConfig::default())],
    }
}

fn assert_volumes_close(a: &Volume, b: &Volume) {
    assert_eq!(a.dims(), b.dims());
    for (i, (&x, &y)) in a.pixels().iter().zip(b.pixels()).enumerate() {
        assert!(x.relative_eq(y, 1e-5), "voxel {i}: {x} vs {y}");
    }
}

#[test]
fn identity_round_trip_reproduces_the_view() {
    init_test_tracing();
    let input = random_volume([9, 7, 5], 11);
    let views = vec![View::from_volume(
        ViewInfo::new("only", 0, 0, 0),
        input.clone(),
        Affine3::identity(),
    )];

    for interpolation in [Interpolation::Nearest, Interpolation::Linear] {
        for scale in [1usize, 2] {
            let config = FusionConfig::default()
                .with_scale(scale)
                .with_interpolation(interpolation)
                .with_threads(3);
            let result = fuse_one(config, &views);
            let image = &result.outputs[0].image;

            let [w, h, d] = image.dims();
            for z in 0..d {
                for y in 0..h {
                    for x in 0..w {
                        let (sx, sy, sz) = (x * scale, y * scale, z * scale);
                        if sx < 9 && sy < 7 && sz < 5 {
                            assert_eq!(
                                image[(x, y, z)],
                                input[(sx, sy, sz)],
                                "{interpolation:?} scale {scale} at ({x}, {y}, {z})"
                            );
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn result_does_not_depend_on_thread_count() {
    init_test_tracing();
    let views = bead_views();

    let results: Vec<FusionResult> = [1usize, 2, 8]
        .into_iter()
        .map(|threads| {
            let config = FusionConfig::default()
                .with_threads(threads)
                .with_parallel_views(2)
                .with_weights(content_and_blending());
            fuse_one(config, &views)
        })
        .collect();

    for other in &results[1..] {
        assert_volumes_close(&results[0].outputs[0].image, &other.outputs[0].image);
        assert_volumes_close(&results[0].outputs[0].weights, &other.outputs[0].weights);
    }
}

#[test]
fn result_does_not_depend_on_batch_size() {
    let views = bead_views();
    let fuse_with = |parallel_views| {
        let config = FusionConfig::default()
            .with_threads(4)
            .with_parallel_views(parallel_views)
            .with_weights(content_and_blending());
        fuse_one(config, &views)
    };

    let one_at_a_time = fuse_with(1);
    let all_at_once = fuse_with(views.len());

    assert_volumes_close(&one_at_a_time.outputs[0].image, &all_at_once.outputs[0].image);
    assert_volumes_close(&one_at_a_time.outputs[0].weights, &all_at_once.outputs[0].weights);
}

#[test]
fn voxels_outside_every_view_are_zero() {
    let views = bead_views();
    let result = fuse_one(FusionConfig::default().with_threads(2), &views);
    let out = &result.outputs[0];

    assert!(out.image.iter().all(|v| v.is_finite()));
    assert!(out.weights.iter().all(|v| v.is_finite()));

    // Rotated cubes leave the grid corners uncovered.
    let [w, h, d] = out.image.dims();
    for (x, y, z) in [(0, 0, 0), (w - 1, 0, 0), (0, h - 1, d - 1), (w - 1, h - 1, d - 1)] {
        assert_eq!(out.weights[(x, y, z)], 0.0);
        assert_eq!(out.image[(x, y, z)], 0.0);
    }
    assert!(out.weights.iter().any(|&w| w > 0.0));
}

#[test]
fn overlapping_constant_views_blend_to_the_constant() {
    let a = View::from_volume(
        ViewInfo::new("a", 0, 0, 0),
        Volume::new_filled(4, 4, 4, 100.0),
        Affine3::identity(),
    );
    let b = View::from_volume(
        ViewInfo::new("b", 0, 1, 0),
        Volume::new_filled(4, 4, 4, 100.0),
        Affine3::translation(DVec3::new(2.0, 0.0, 0.0)),
    );
    let blend = BlendConfig::absolute(2.0);
    let weights = WeightStrategies {
        isolated: Vec::new(),
        combined: vec![CombinedStrategy::Blending(blend)],
    };
    let views = vec![a.clone(), b.clone()];
    let result = fuse_one(
        FusionConfig::default().with_weights(weights).with_threads(2),
        &views,
    );
    let out = &result.outputs[0];
    assert_eq!(out.image.dims(), [7, 5, 5]);

    let mut reference = Blending::new(&[&a, &b], &blend);
    for z in 0..4 {
        for y in 0..4 {
            for x in 0..6 {
                let p = DVec3::new(x as f64, y as f64, z as f64);
                let local_b = p - DVec3::new(2.0, 0.0, 0.0);
                let in_a = x < 4;
                let in_b = x >= 2;
                reference.update_weights(&[p, local_b], &[in_a, in_b]);

                let expected_weight = if in_a { reference.weight(0) } else { 0.0 }
                    + if in_b { reference.weight(1) } else { 0.0 };
                assert!(
                    (out.weights[(x, y, z)] - expected_weight).abs() < 1e-6,
                    "weight at ({x}, {y}, {z})"
                );
                assert!(
                    (out.image[(x, y, z)] - 100.0).abs() < 1e-3,
                    "value at ({x}, {y}, {z}) is {}",
                    out.image[(x, y, z)]
                );
            }
        }
    }
}

#[derive(Debug)]
struct AlwaysOutOfMemory;

impl IsolatedWeightener for AlwaysOutOfMemory {
    fn name(&self) -> &'static str {
        "always out of memory"
    }

    fn create_instance(&self, volume: &Volume) -> fusion::Result<WeightVolume> {
        Err(fusion::Error::WeightAllocationFailure {
            strategy: self.name(),
            voxels: volume.len(),
        })
    }
}

#[test]
fn weight_allocation_failure_falls_back_to_combined_weights() {
    let views = bead_views();
    let config = FusionConfig::default().with_threads(2).with_parallel_views(1);

    let blending_only = fuse_one(config.clone(), &views);

    let failing = Weighteners::new(
        vec![Arc::new(AlwaysOutOfMemory) as Arc<dyn IsolatedWeightener>],
        Weighteners::from_strategies(&WeightStrategies::blending(), false).combined,
    );
    let control = FusionControl::new(config).unwrap().with_weighteners(failing);
    let degraded = fuse(&control, &views).remove(0);

    assert!(degraded
        .diagnostics
        .contains(|n| matches!(n, Diagnostic::IsolatedWeightsDisabled { .. })));
    assert_volumes_close(&blending_only.outputs[0].image, &degraded.outputs[0].image);
}

#[test]
fn non_invertible_view_degrades_instead_of_failing() {
    let mut views = bead_views();
    views.push(View::from_volume(
        ViewInfo::new("collapsed", 0, 999, 0),
        Volume::new_filled(24, 24, 24, 1e6),
        Affine3::scale(DVec3::new(1.0, 0.0, 1.0)),
    ));

    let result = fuse_one(FusionConfig::default().with_threads(2), &views);

    assert!(result
        .diagnostics
        .contains(|n| matches!(n, Diagnostic::NonInvertibleTransform { view } if view == "collapsed")));
    assert!(result.outputs[0].image.iter().all(|&v| v < 1e5));
}

#[test]
fn empty_dataset_has_no_geometry() {
    let control = FusionControl::new(FusionConfig::default()).unwrap();
    let mut sink = MemorySink::new();
    let err = control.run(&[], &mut sink).unwrap_err();
    assert!(matches!(err, fusion::Error::NoValidGeometry));
    assert!(sink.results.is_empty());
}
