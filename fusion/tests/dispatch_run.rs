use common::test_utils::test_output_dir;
use glam::DVec3;

use fusion::simulation::BeadSimulation;
use fusion::{
    Affine3, FusionConfig, FusionControl, FusionVariant, MemorySink, RawDirectorySink, View,
    ViewInfo, Volume, DECONVOLUTION_BLEND_BORDER,
};

fn two_channel_views_of_size(size: usize) -> Vec<View> {
    let lo = size as f64 * 0.25;
    let sim = BeadSimulation::random(20, DVec3::splat(lo), DVec3::splat(size as f64 - lo), 9);
    let mut views = sim.rotated_views(size, &[0, 90, 180], 0).unwrap();
    views.extend(sim.rotated_views(size, &[0, 90, 180], 1).unwrap());
    views
}

fn two_channel_views() -> Vec<View> {
    two_channel_views_of_size(20)
}

#[test]
fn deconvolution_fuses_first_channel_into_per_view_outputs() {
    // Large enough for weight to remain inside the deconvolution border.
    let views = two_channel_views_of_size(40);
    let config = FusionConfig::default()
        .with_threads(2)
        .with_channels(vec![1, 0])
        .with_deconvolution(true);
    assert_eq!(
        FusionControl::plan(&config, 3).variant,
        FusionVariant::PerView
    );

    let control = FusionControl::new(config).unwrap();
    let mut sink = MemorySink::new();
    control.run(&views, &mut sink).unwrap();

    assert_eq!(sink.results.len(), 1);
    let result = &sink.results[0].1;
    assert_eq!(result.channel, 0);
    assert_eq!(result.outputs.len(), 3);

    let angles: Vec<u32> = result
        .outputs
        .iter()
        .map(|o| o.view.as_ref().unwrap().angle)
        .collect();
    assert_eq!(angles, vec![0, 90, 180]);
    for output in &result.outputs {
        assert_eq!(output.image.dims(), result.grid.dims);
        assert!(output.weights.iter().any(|&w| w > 0.0));
    }
}

#[test]
fn multiple_outputs_cover_every_channel() {
    let views = two_channel_views();
    let config = FusionConfig::default()
        .with_threads(3)
        .with_parallel_views(2)
        .with_multiple_outputs();

    let control = FusionControl::new(config).unwrap();
    let mut sink = MemorySink::new();
    let grid = control.run(&views, &mut sink).unwrap();

    let channels: Vec<u32> = sink.results.iter().map(|(_, r)| r.channel).collect();
    assert_eq!(channels, vec![0, 1]);
    for (_, result) in &sink.results {
        assert_eq!(result.grid, grid);
        assert_eq!(result.outputs.len(), 3);
    }
}

#[test]
fn shared_output_is_written_per_channel() {
    let dir = test_output_dir("shared_output_is_written_per_channel");
    let views = two_channel_views();
    let config = FusionConfig::default()
        .with_threads(2)
        .with_scale(2)
        .with_timepoint(4);

    let control = FusionControl::new(config).unwrap();
    let mut sink = RawDirectorySink::new(&dir).with_timepoint_dirs();
    let grid = control.run(&views, &mut sink).unwrap();

    for channel in [0, 1] {
        let raw = dir.join("4").join(format!("img_tl4_ch{channel}.f32"));
        let len = std::fs::metadata(&raw).unwrap().len() as usize;
        assert_eq!(len, grid.bytes_per_volume());
        assert!(dir.join("4").join(format!("img_tl4_ch{channel}.json")).exists());
    }
}

#[test]
fn deconvolution_keeps_view_borders_black() {
    let a = View::from_volume(
        ViewInfo::new("a", 0, 0, 0),
        Volume::new_filled(40, 40, 40, 100.0),
        Affine3::identity(),
    );
    let b = View::from_volume(
        ViewInfo::new("b", 0, 90, 0),
        Volume::new_filled(40, 40, 40, 100.0),
        Affine3::translation(DVec3::new(20.0, 0.0, 0.0)),
    );
    let config = FusionConfig::default()
        .with_threads(2)
        .with_deconvolution(true);

    let control = FusionControl::new(config).unwrap();
    let mut sink = MemorySink::new();
    control.run(&[a, b], &mut sink).unwrap();

    let result = &sink.results[0].1;
    assert_eq!(result.grid.dims, [61, 41, 41]);
    let out_a = &result.outputs[0];
    let out_b = &result.outputs[1];

    let border = DECONVOLUTION_BLEND_BORDER as usize;
    // Only `a` covers x = 2; both views cover (10, 20, 20) and (25, 2, 20).
    for (x, y, z) in [(2, 20, 20), (10, 20, 20), (25, 2, 20), (border, 20, 20)] {
        assert_eq!(out_a.weights[(x, y, z)], 0.0, "a at ({x}, {y}, {z})");
        assert_eq!(out_a.image[(x, y, z)], 0.0, "a at ({x}, {y}, {z})");
    }
    // Within 15 voxels of b's left face.
    assert_eq!(out_b.weights[(30, 20, 20)], 0.0);

    let center_a = out_a.weights[(20, 20, 20)];
    assert!(center_a > 0.0);
    assert!((out_a.image[(20, 20, 20)] - 100.0 * center_a).abs() < 1e-3);
    assert!(out_b.weights[(40, 20, 20)] > 0.0);
}
