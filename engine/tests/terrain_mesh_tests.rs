//! Terrain Mesh Tests - Budget Balancing, Crack Freedom and Queries
//!
//! Drives TileMeshManager through whole frames and checks the mesh it
//! leaves behind.

use glam::{Vec2, Vec3};
use roam_terrain_engine::camera::{ViewFrustum, VisState};
use roam_terrain_engine::terrain::{
    fbm_field, FbmParams, HeightField, MeshConfig, TerrainError, TileMeshManager, TriRef,
    TriangleTable, ROOT,
};

fn config(tile_size: u32, min_detail: usize, max_detail: usize) -> MeshConfig {
    MeshConfig {
        tile_size,
        min_detail,
        max_detail,
        abs_max_detail: 20_000,
        far_clip: 1000.0,
        ..Default::default()
    }
}

fn flat_field(samples: usize) -> HeightField {
    HeightField::new(samples, samples, 0.0, 10.0)
}

/// Every split triangle that can currently be merged.
fn mergeable(mesh: &TileMeshManager) -> Option<TriRef> {
    for tree in mesh.trees() {
        for t in ROOT..mesh.table().triangle_end() {
            if tree.is_split(t) && mesh.is_mergeable(tree.index(), t) {
                return Some(TriRef::new(tree.index(), t));
            }
        }
    }
    None
}

// ============================================================================
// Budget Tests
// ============================================================================

#[test]
fn test_flat_terrain_settles_at_min_detail() {
    let mut mesh = TileMeshManager::new(flat_field(65), config(16, 200, 400)).unwrap();
    let frustum = ViewFrustum::unbounded(Vec3::new(32.0, 50.0, 32.0), Vec3::X);

    let first = mesh.calculate(&frustum);
    assert!(first.rebuilt);
    assert!(!first.iteration_cap_hit);
    assert!(mesh.visible_count() >= 200);
    assert!(mesh.visible_count() < 204, "visible {}", mesh.visible_count());
    assert!(mesh.check_consistency().is_empty());

    // Nothing changed, so nothing to do.
    let second = mesh.calculate(&frustum);
    assert!(!second.rebuilt);
    assert_eq!(second.splits, 0);
    assert_eq!(second.merges, 0);
    assert_eq!(second.visible, first.visible);
}

#[test]
fn test_budget_holds_along_flight_path() {
    let field = fbm_field(129, 129, &FbmParams::default());
    let cfg = MeshConfig {
        tile_size: 32,
        min_detail: 600,
        max_detail: 700,
        abs_max_detail: 20_000,
        ..Default::default()
    };
    assert_eq!(cfg.balance_iteration_cap, None);
    let mut mesh = TileMeshManager::new(field, cfg).unwrap();

    for step in 0..12 {
        let angle = step as f32 * 0.15;
        let eye = Vec3::new(64.0 + 30.0 * angle.cos(), 60.0, 64.0 + 30.0 * angle.sin());
        let forward = Vec3::new(-angle.sin(), -0.4, angle.cos());
        let frustum = ViewFrustum::perspective(
            eye,
            forward,
            Vec3::Y,
            std::f32::consts::FRAC_PI_2,
            1.5,
            1.0,
            150.0,
        );
        let report = mesh.calculate(&frustum);

        assert!(!report.iteration_cap_hit, "step {} hit the iteration cap", step);
        assert!(report.visible >= 600, "step {}: {} visible", step, report.visible);
        assert!(report.visible <= 700, "step {}: {} visible", step, report.visible);
        assert!(mesh.check_consistency().is_empty(), "step {}", step);
    }
    assert_eq!(mesh.stats().frames, 12);
    assert_eq!(mesh.stats().full_rebuilds, 1);
}

#[test]
fn test_budget_holds_for_random_terrain_and_poses() {
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let centre = Vec3::new(64.0, 0.0, 64.0);

    for terrain in 0..4 {
        let params = FbmParams {
            offset: Vec2::new(rng.f32() * 1000.0 - 500.0, rng.f32() * 1000.0 - 500.0),
            ..Default::default()
        };
        let cfg = MeshConfig {
            tile_size: 32,
            min_detail: 600,
            max_detail: 700,
            abs_max_detail: 20_000,
            ..Default::default()
        };
        let mut mesh = TileMeshManager::new(fbm_field(129, 129, &params), cfg).unwrap();

        for pose in 0..8 {
            let eye = Vec3::new(
                16.0 + rng.f32() * 96.0,
                40.0 + rng.f32() * 30.0,
                16.0 + rng.f32() * 96.0,
            );
            // Roughly towards the middle of the field, tilted down.
            let towards = centre - eye;
            let heading = towards.z.atan2(towards.x) + (rng.f32() - 0.5) * 1.2;
            let pitch = 0.2 + rng.f32() * 0.6;
            let forward = Vec3::new(heading.cos(), -pitch, heading.sin());
            let frustum = ViewFrustum::perspective(
                eye,
                forward,
                Vec3::Y,
                std::f32::consts::FRAC_PI_2,
                1.5,
                1.0,
                150.0,
            );
            let report = mesh.calculate(&frustum);

            let at = format!("terrain {} pose {} ({:?})", terrain, pose, report);
            assert!(!report.iteration_cap_hit, "{}", at);
            assert!((600..=700).contains(&report.visible), "{}", at);
            let violations = mesh.check_consistency();
            assert!(violations.is_empty(), "{}: {:?}", at, violations);
        }
    }
}

#[test]
fn test_detail_follows_error() {
    // Flat except for one bump, which sits deep inside tile (2, 2).
    let field = HeightField::from_fn(65, 65, 0.0, 10.0, |row, col| {
        if (row, col) == (37, 42) { 1.0 } else { 0.0 }
    });
    let mut mesh = TileMeshManager::new(field, config(16, 0, 200)).unwrap();
    mesh.calculate(&ViewFrustum::unbounded(Vec3::new(32.0, 60.0, 32.0), Vec3::X));

    let near = mesh.triangle_at(37.2, 42.1).unwrap();
    let far = mesh.triangle_at(1.5, 61.0).unwrap();
    assert!(TriangleTable::level(near.tri) >= 7, "near level {}", TriangleTable::level(near.tri));
    assert!(TriangleTable::level(far.tri) <= 2, "far level {}", TriangleTable::level(far.tri));
    assert!(mesh.check_consistency().is_empty());
}

#[test]
fn test_close_camera_refines_spike() {
    // One tile, flat apart from a cone in the middle.
    let field = HeightField::from_fn(33, 33, 0.0, 40.0, |row, col| {
        let d = ((row as f32 - 16.0).powi(2) + (col as f32 - 16.0).powi(2)).sqrt();
        20.0 * (1.0 - d / 6.0).max(0.0)
    });
    let cfg = MeshConfig {
        tile_size: 32,
        min_detail: 0,
        max_detail: 600,
        abs_max_detail: 20_000,
        far_clip: 150.0,
        ..Default::default()
    };
    let mut mesh = TileMeshManager::new(field, cfg).unwrap();

    let eye = Vec3::new(4.0, 25.0, 4.0);
    let frustum = ViewFrustum::perspective(
        eye,
        Vec3::new(16.0, 0.0, 16.0) - eye,
        Vec3::Y,
        60f32.to_radians(),
        1.0,
        1.0,
        150.0,
    );
    let report = mesh.calculate(&frustum);
    assert!(!report.iteration_cap_hit);
    assert!(report.visible <= 600);

    let tip = TriangleTable::level(mesh.triangle_at(16.3, 15.8).unwrap().tri);
    assert!(tip >= 7, "tip level {}", tip);
    for (x, z) in [(0.5, 31.0), (31.0, 0.5), (31.5, 31.5)] {
        let edge = TriangleTable::level(mesh.triangle_at(x, z).unwrap().tri);
        assert!(edge + 3 <= tip, "({}, {}) at level {}, tip at {}", x, z, edge, tip);
    }
    assert!(mesh.check_consistency().is_empty());
}

// ============================================================================
// Split / Merge Tests
// ============================================================================

#[test]
fn test_split_cascades_across_tiles() {
    let mut mesh = TileMeshManager::new(flat_field(17), config(8, 0, 100)).unwrap();
    let mirrored = mesh.mirrored_tree(0, 0);
    let right = mesh.normal_tree(0, 1);

    // The first child of a mirrored root lies along the tile edge shared with
    // the normal tree to its right.
    assert!(mesh.force_split(mirrored, 2));
    assert!(mesh.is_split(TriRef::new(mirrored, 2)));
    assert!(mesh.is_split(TriRef::new(right, ROOT)));
    assert!(mesh.is_split(TriRef::new(mesh.mirrored_tree(0, 1), ROOT)));
    assert!(mesh.is_active(TriRef::new(mesh.normal_tree(1, 1), ROOT)));
    assert!(mesh.check_consistency().is_empty());
}

#[test]
fn test_merging_everything_returns_to_roots() {
    let mut mesh = TileMeshManager::new(flat_field(17), config(8, 0, 100)).unwrap();
    let roots = mesh.active_count();
    assert_eq!(roots, mesh.tree_count());

    assert!(mesh.force_split(mesh.mirrored_tree(1, 1), 37));
    assert!(mesh.force_split(mesh.normal_tree(0, 1), 22));
    assert!(mesh.active_count() > roots);

    while let Some(diamond) = mergeable(&mesh) {
        assert!(mesh.force_merge(diamond.tree, diamond.tri));
        assert!(mesh.check_consistency().is_empty());
    }
    assert_eq!(mesh.active_count(), roots);
    assert_eq!(mesh.merge_queue_len(), 0);
}

#[test]
fn test_random_split_merge_stays_consistent() {
    let field = fbm_field(33, 33, &FbmParams::default());
    let mut mesh = TileMeshManager::new(field, config(16, 0, 2000)).unwrap();
    let mut rng = fastrand::Rng::with_seed(7);
    let end = mesh.table().triangle_end();

    for round in 0..400 {
        let tree = rng.usize(0..mesh.tree_count());
        let tri = rng.u32(ROOT..end);
        if rng.bool() {
            mesh.force_split(tree, tri);
        } else {
            mesh.force_merge(tree, tri);
        }
        if round % 50 == 0 {
            let eye = Vec3::new(rng.f32() * 32.0, 20.0, rng.f32() * 32.0);
            mesh.calculate(&ViewFrustum::unbounded(eye, Vec3::new(1.0, 0.0, 1.0)));
        }
        let violations = mesh.check_consistency();
        assert!(violations.is_empty(), "round {}: {:?}", round, violations);
    }
}

// ============================================================================
// Visibility Tests
// ============================================================================

#[test]
fn test_distant_tiles_stay_coarse() {
    let field = fbm_field(65, 65, &FbmParams::default());
    let cfg = MeshConfig {
        tile_size: 8,
        min_detail: 0,
        max_detail: 500,
        abs_max_detail: 5000,
        far_clip: 20.0,
        ..Default::default()
    };
    let mut mesh = TileMeshManager::new(field, cfg).unwrap();
    mesh.calculate(&ViewFrustum::unbounded(Vec3::new(4.0, 10.0, 4.0), Vec3::new(1.0, 0.0, 1.0)));

    for i in 6..8 {
        for j in 6..8 {
            for tree in [mesh.normal_tree(i, j), mesh.mirrored_tree(i, j)] {
                let root = TriRef::new(tree, ROOT);
                assert!(mesh.is_active(root), "tile ({}, {})", i, j);
                assert_eq!(mesh.node(root).map(|n| n.vis), Some(VisState::Out));
            }
        }
    }
    assert!(mesh.visible_count() <= 500);
    assert!(mesh.visible_count() < mesh.active_count());
}

// ============================================================================
// Query Tests
// ============================================================================

#[test]
fn test_height_on_sloped_field() {
    let field = HeightField::from_fn(17, 17, 0.0, 100.0, |row, col| {
        0.5 * row as f32 + 0.25 * col as f32
    });
    let mut mesh = TileMeshManager::new(field, config(8, 0, 100)).unwrap();
    mesh.force_split(0, ROOT);

    for (x, z) in [(10.5, 3.25), (0.0, 0.0), (16.0, 16.0), (7.9, 8.1)] {
        let expected = 0.5 * x + 0.25 * z;
        let full = mesh.height(x, z).unwrap();
        let coarse = mesh.mesh_height(x, z).unwrap();
        assert!((full - expected).abs() < 0.01, "({}, {}): {}", x, z, full);
        assert!((coarse - expected).abs() < 0.01, "({}, {}): {}", x, z, coarse);
    }

    assert!(matches!(mesh.height(-1.0, 0.0), Err(TerrainError::OffTerrain { .. })));
    assert!(mesh.mesh_height(0.0, 16.5).is_err());
}

#[test]
fn test_set_height_moves_surface() {
    let mut mesh = TileMeshManager::new(flat_field(17), config(8, 0, 100)).unwrap();
    assert_eq!(mesh.abs_max_error(), 0.0);

    mesh.set_height(5.1, 4.0, 2.9).unwrap();
    assert!((mesh.height(5.0, 3.0).unwrap() - 4.0).abs() < 0.01);
    assert!(mesh.abs_max_error() > 3.9);
    assert!(mesh.abs_max_height() > 3.9);
    assert!(matches!(mesh.set_height(40.0, 1.0, 0.0), Err(TerrainError::OffTerrain { .. })));
}
