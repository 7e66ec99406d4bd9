use criterion::{black_box, criterion_group, criterion_main, Criterion};
use procam_calib::synthetic::{add_pixel_noise, project_views, ProCamScene};
use procam_calib::{back_project_to_plane, calibrate_camera, calibrate_projector};
use procam_core::TermCriteria;

fn bench_camera(c: &mut Criterion) {
    let scene = ProCamScene::default();
    let poses = scene.camera_poses(25);
    let board = scene.board_points();
    let object = vec![board.clone(); poses.len()];
    let mut image = project_views(&scene.camera, &poses, &board);
    add_pixel_noise(&mut image, 0.2, 3);

    c.bench_function("calibrate_camera_25x13x9", |b| {
        b.iter(|| {
            calibrate_camera(
                black_box(&object),
                black_box(&image),
                scene.camera_size,
                TermCriteria::default(),
            )
        })
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let scene = ProCamScene::default();
    let poses = scene.camera_poses(15);
    let Ok((set, _)) = scene.correspondences(&poses) else {
        return;
    };

    c.bench_function("back_project_15_frames", |b| {
        let points = set.projector_image_points();
        b.iter(|| back_project_to_plane(&scene.camera.intrinsics, black_box(&poses), &points))
    });

    c.bench_function("calibrate_projector_15_frames", |b| {
        b.iter(|| {
            calibrate_projector(
                black_box(&set),
                scene.camera_size,
                scene.projector_size,
                TermCriteria::default(),
            )
        })
    });
}

criterion_group!(benches, bench_camera, bench_pipeline);
criterion_main!(benches);
