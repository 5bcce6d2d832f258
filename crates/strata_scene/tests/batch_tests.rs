//! Integration tests for geometry batching

use std::rc::Rc;

use approx::assert_relative_eq;
use strata_math::{Quat, Ray, Vec3};
use strata_scene::prelude::*;
use strata_scene::{Format, SpatialKind};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Blocks {
    scene: Scene,
    root: SpatialId,
    batch_node: SpatialId,
    cubes: Vec<SpatialId>,
    material: Rc<Material>,
}

/// Unit cubes at x = 0, 2, 4 under a batch node, batched and updated
fn three_cubes(config: SceneConfig) -> Blocks {
    init_logging();
    let mut scene = Scene::with_config(config);
    let root = scene.create_node("root");
    let batch_node = scene.create_batch_node("blocks");
    scene.attach_child(root, batch_node).unwrap();

    let material = Material::new("Common/MatDefs/Misc/Unshaded.j3md").into_shared();
    let mut cubes = Vec::new();
    for i in 0..3 {
        let cube = scene.create_geometry(format!("cube{}", i), Mesh::cube(Vec3::splat(0.5)));
        scene
            .set_local_translation(cube, Vec3::new(2.0 * i as f32, 0.0, 0.0))
            .unwrap();
        scene.attach_child(batch_node, cube).unwrap();
        cubes.push(cube);
    }
    scene.set_material(batch_node, Rc::clone(&material)).unwrap();
    assert_eq!(scene.batch(batch_node).unwrap(), 1);
    scene.update_geometric_state(root).unwrap();

    Blocks {
        scene,
        root,
        batch_node,
        cubes,
        material,
    }
}

fn merged_positions(scene: &Scene, batch_node: SpatialId) -> Vec<Vec3> {
    let output = scene.batch_outputs(batch_node).unwrap()[0];
    scene.mesh(output).unwrap().unwrap().positions()
}

#[test]
fn test_three_cubes_merge_into_one_mesh() {
    let Blocks { scene, batch_node, cubes, .. } = three_cubes(SceneConfig::default());

    let output = scene.batch_outputs(batch_node).unwrap()[0];
    let merged = scene.mesh(output).unwrap().unwrap();
    assert_eq!(merged.vertex_count(), 24);
    assert_eq!(merged.triangle_count(), 36);
    assert_eq!(merged.mode(), Mode::Triangles);
    assert_eq!(
        merged.buffer(BufferType::Index).unwrap().format(),
        Format::UnsignedShort
    );
    assert!(scene.get(output).unwrap().is_batch_output());
    assert_eq!(scene.get(output).unwrap().name(), Some("blocks-batch0"));

    for (i, &cube) in cubes.iter().enumerate() {
        assert_eq!(scene.batch_info(cube).unwrap(), Some((i * 8, 8)));
    }
}

#[test]
fn test_moving_member_rewrites_only_its_slice() {
    let Blocks {
        mut scene,
        root,
        batch_node,
        cubes,
        ..
    } = three_cubes(SceneConfig::default());

    let before = merged_positions(&scene, batch_node);
    scene.move_local(cubes[1], Vec3::new(0.0, 1.0, 0.0)).unwrap();
    scene.update_geometric_state(root).unwrap();
    let after = merged_positions(&scene, batch_node);

    let changed: Vec<usize> = (0..before.len()).filter(|&i| before[i] != after[i]).collect();
    assert_eq!(changed, (8..16).collect::<Vec<_>>());
    for i in changed {
        assert_relative_eq!(after[i].y, before[i].y + 1.0, epsilon = 1e-5);
        assert_relative_eq!(after[i].x, before[i].x, epsilon = 1e-5);
    }

    let record = scene.batched_geometry(cubes[1]).unwrap().unwrap();
    assert_relative_eq!(record.cached_offset_mat().translation().y, 1.0, epsilon = 1e-5);
}

#[test]
fn test_slice_equals_positions_times_member_transform() {
    let Blocks {
        mut scene,
        root,
        batch_node,
        cubes,
        ..
    } = three_cubes(SceneConfig::default());

    // Batch-node transforms are not baked into the slices
    scene.set_local_translation(batch_node, Vec3::new(10.0, 0.0, 0.0)).unwrap();
    scene
        .set_local_rotation(cubes[2], Quat::from_angles(0.3, 0.7, 0.0))
        .unwrap();
    scene.set_local_scale(cubes[2], Vec3::new(1.0, 2.0, 3.0)).unwrap();
    scene.update_geometric_state(root).unwrap();

    let merged = merged_positions(&scene, batch_node);
    for &cube in &cubes {
        let (start, count) = scene.batch_info(cube).unwrap().unwrap();
        let local = scene.get(cube).unwrap().local_transform().to_matrix();
        let original = scene.mesh(cube).unwrap().unwrap().positions();
        assert_eq!(original.len(), count);
        for (i, p) in original.iter().enumerate() {
            let expected = local.transform_point(*p);
            let actual = merged[start + i];
            assert_relative_eq!(actual.x, expected.x, epsilon = 1e-4);
            assert_relative_eq!(actual.y, expected.y, epsilon = 1e-4);
            assert_relative_eq!(actual.z, expected.z, epsilon = 1e-4);
        }
    }
}

#[test]
fn test_batch_node_bound_follows_members() {
    let Blocks {
        mut scene,
        root,
        batch_node,
        cubes,
        ..
    } = three_cubes(SceneConfig::default());

    let bound = scene.world_bound(batch_node).unwrap().unwrap().to_box();
    assert_relative_eq!(bound.min().x, -0.5, epsilon = 1e-5);
    assert_relative_eq!(bound.max().x, 4.5, epsilon = 1e-5);

    scene.move_local(cubes[2], Vec3::new(0.0, 3.0, 0.0)).unwrap();
    scene.update_geometric_state(root).unwrap();

    let output = scene.batch_outputs(batch_node).unwrap()[0];
    let output_bound = scene.get(output).unwrap().world_bound().unwrap().to_box();
    assert_relative_eq!(output_bound.max().y, 3.5, epsilon = 1e-5);
    let bound = scene.get(root).unwrap().world_bound().unwrap().to_box();
    assert!(bound.max().y >= 3.5 - 1e-5);
}

#[test]
fn test_no_refresh_flags_remain() {
    let Blocks {
        mut scene,
        root,
        cubes,
        ..
    } = three_cubes(SceneConfig::debug());

    scene.rotate_angles(cubes[0], 0.0, 0.5, 0.0).unwrap();
    scene.move_local(cubes[2], Vec3::Z).unwrap();
    scene.update_geometric_state(root).unwrap();

    for id in scene.descendants(root).unwrap() {
        assert!(scene.get(id).unwrap().refresh_flags().is_empty());
    }
}

#[test]
fn test_batched_mesh_is_read_only() {
    let Blocks { mut scene, cubes, .. } = three_cubes(SceneConfig::default());
    assert!(matches!(
        scene.set_mesh(cubes[0], Mesh::cube(Vec3::ONE)),
        Err(SceneError::Unsupported(_))
    ));
    assert!(matches!(scene.mesh_mut(cubes[0]), Err(SceneError::Unsupported(_))));
}

#[test]
fn test_mixed_primitive_families_are_rejected() {
    init_logging();
    let mut scene = Scene::new();
    let batch_node = scene.create_batch_node("mixed");
    let cube = scene.create_geometry("cube", Mesh::cube(Vec3::ONE));
    let line = scene.create_geometry("line", Mesh::line_strip(&[Vec3::ZERO, Vec3::X, Vec3::Y]));
    scene.attach_child(batch_node, cube).unwrap();
    scene.attach_child(batch_node, line).unwrap();
    scene
        .set_material(batch_node, Material::new("Unshaded").into_shared())
        .unwrap();

    assert!(matches!(scene.batch(batch_node), Err(SceneError::Unsupported(_))));
    assert!(scene.batch_outputs(batch_node).unwrap().is_empty());
}

#[test]
fn test_strips_merge_as_lists() {
    init_logging();
    let mut scene = Scene::new();
    let batch_node = scene.create_batch_node("lines");
    let material = Material::new("Unshaded").into_shared();
    for points in [[Vec3::ZERO, Vec3::X, Vec3::Y], [Vec3::Z, Vec3::ONE, Vec3::NEG_X]] {
        let line = scene.create_geometry("line", Mesh::line_strip(&points));
        scene.set_material(line, Rc::clone(&material)).unwrap();
        scene.attach_child(batch_node, line).unwrap();
    }
    scene.batch(batch_node).unwrap();

    let output = scene.batch_outputs(batch_node).unwrap()[0];
    let merged = scene.mesh(output).unwrap().unwrap();
    assert_eq!(merged.mode(), Mode::Lines);
    assert_eq!(merged.indices_as_list(), vec![0, 1, 1, 2, 3, 4, 4, 5]);
}

#[test]
fn test_index_width_for_large_batches() {
    init_logging();
    let mut scene = Scene::new();
    let batch_node = scene.create_batch_node("big");
    let mut mesh = Mesh::new(Mode::Triangles);
    mesh.set_buffer_f32(BufferType::Position, 3, vec![0.0; 65538 * 3]);
    let big = scene.create_geometry("big", mesh);
    scene
        .set_material(big, Material::new("Unshaded").into_shared())
        .unwrap();
    scene.attach_child(batch_node, big).unwrap();
    scene.batch(batch_node).unwrap();

    let output = scene.batch_outputs(batch_node).unwrap()[0];
    let merged = scene.mesh(output).unwrap().unwrap();
    assert_eq!(merged.buffer(BufferType::Index).unwrap().format(), Format::UnsignedInt);
    assert_eq!(merged.triangle_count(), 21846);
}

#[test]
fn test_structural_changes_flag_rebatch() {
    let Blocks {
        mut scene,
        batch_node,
        cubes,
        material,
        ..
    } = three_cubes(SceneConfig::default());
    assert!(!scene.needs_full_rebatch(batch_node).unwrap());

    let extra = scene.create_geometry("extra", Mesh::cube(Vec3::ONE));
    scene.set_material(extra, Rc::clone(&material)).unwrap();
    scene.attach_child(batch_node, extra).unwrap();
    assert!(scene.needs_full_rebatch(batch_node).unwrap());

    scene.batch(batch_node).unwrap();
    assert!(!scene.needs_full_rebatch(batch_node).unwrap());
    assert_eq!(scene.batch_info(extra).unwrap(), Some((24, 8)));

    scene.detach_child(batch_node, cubes[0]).unwrap();
    assert!(scene.needs_full_rebatch(batch_node).unwrap());
    assert!(!scene.get(cubes[0]).unwrap().is_batched());
    assert!(scene.set_mesh(cubes[0], Mesh::cube(Vec3::ONE)).is_ok());

    scene.batch(batch_node).unwrap();
    scene.set_batch_hint(batch_node, BatchHint::Inherit).unwrap();
    assert!(!scene.needs_full_rebatch(batch_node).unwrap());
    scene.set_batch_hint(cubes[1], BatchHint::Never).unwrap();
    assert!(scene.needs_full_rebatch(batch_node).unwrap());
    assert_eq!(scene.batch(batch_node).unwrap(), 1);
    assert_eq!(scene.batch_info(cubes[1]).unwrap(), None);

    scene.set_ignore_transform(cubes[2], false).unwrap();
    assert!(!scene.needs_full_rebatch(batch_node).unwrap());
    scene.set_ignore_transform(cubes[2], true).unwrap();
    assert!(scene.needs_full_rebatch(batch_node).unwrap());
    scene.batch(batch_node).unwrap();
    assert_eq!(scene.batch_info(cubes[2]).unwrap(), None);
    assert_eq!(scene.batch_info(extra).unwrap(), Some((0, 8)));
}

#[test]
fn test_out_of_range_indices_are_rejected() {
    let Blocks {
        mut scene,
        batch_node,
        cubes,
        ..
    } = three_cubes(SceneConfig::default());
    scene.unbatch(batch_node).unwrap();

    for bad in [vec![0, 1, 9], vec![0, 1, 70000]] {
        let mut mesh = Mesh::cube(Vec3::splat(0.5));
        mesh.set_buffer(VertexBuffer::from_u32_indices(bad));
        scene.set_mesh(cubes[0], mesh).unwrap();
        assert!(matches!(scene.batch(batch_node), Err(SceneError::InvalidBuffer(_))));
        assert!(scene.batch_outputs(batch_node).unwrap().is_empty());
    }
}

#[test]
fn test_material_change_flags_rebatch() {
    let Blocks {
        mut scene,
        batch_node,
        cubes,
        material,
        ..
    } = three_cubes(SceneConfig::default());

    scene.set_material(cubes[1], Rc::clone(&material)).unwrap();
    assert!(!scene.needs_full_rebatch(batch_node).unwrap());

    scene
        .set_material(cubes[1], Material::new("Lighting").into_shared())
        .unwrap();
    assert!(scene.needs_full_rebatch(batch_node).unwrap());
    assert_eq!(scene.batch(batch_node).unwrap(), 2);
}

#[test]
fn test_queries_see_members_not_outputs() {
    let Blocks { scene, root, cubes, .. } = three_cubes(SceneConfig::default());

    assert_eq!(scene.triangle_count(root).unwrap(), 36);
    assert_eq!(scene.vertex_count(root).unwrap(), 24);

    let mut results = CollisionResults::new();
    let ray = Ray::new(Vec3::new(2.0, 0.0, -10.0), Vec3::Z);
    assert!(scene.collide_with(root, &ray, &mut results).unwrap() > 0);
    let closest = results.closest().unwrap();
    assert_eq!(closest.geometry, Some(cubes[1]));
    assert_relative_eq!(closest.distance, 9.5, epsilon = 1e-4);
}

#[test]
fn test_clone_of_batch_node_needs_rebatch() {
    let Blocks {
        mut scene,
        batch_node,
        ..
    } = three_cubes(SceneConfig::default());

    let copy = scene.clone_spatial(batch_node, CloneMode::Shallow).unwrap();
    assert_eq!(scene.children(copy).unwrap().len(), 3);
    assert!(scene.needs_full_rebatch(copy).unwrap());
    assert_eq!(scene.batch_count(copy).unwrap(), 0);

    assert_eq!(scene.batch(copy).unwrap(), 1);
    assert!(matches!(scene.get(copy).unwrap().kind(), SpatialKind::Node(_)));
}

#[test]
fn test_unbatch_restores_plain_children() {
    let Blocks {
        mut scene,
        root,
        batch_node,
        cubes,
        ..
    } = three_cubes(SceneConfig::debug());

    scene.unbatch(batch_node).unwrap();
    assert_eq!(scene.children(batch_node).unwrap(), cubes.as_slice());
    scene.move_local(cubes[0], Vec3::Y).unwrap();
    scene.update_geometric_state(root).unwrap();
    assert_eq!(scene.batch_count(batch_node).unwrap(), 0);
}
