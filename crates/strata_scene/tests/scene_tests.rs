//! Integration tests for the scene graph

use std::rc::Rc;

use approx::assert_relative_eq;
use strata_core::{InputCapsule, MemoryCapsule};
use strata_math::{BoundingSphere, ColorRgba, Quat, Ray, Transform, Vec3};
use strata_scene::prelude::*;
use strata_scene::RotationControl;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn triangle_mesh() -> Mesh {
    let mut mesh = Mesh::new(Mode::Triangles);
    mesh.set_buffer(VertexBuffer::from_vec3(
        BufferType::Position,
        &[
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ],
    ));
    mesh.update_bound();
    mesh
}

#[test]
fn test_ray_hits_triangle_geometry() {
    init_logging();
    let mut scene = Scene::new();
    let root = scene.create_node("root");
    let triangle = scene.create_geometry("triangle", triangle_mesh());
    scene.attach_child(root, triangle).unwrap();
    scene.update_geometric_state(root).unwrap();

    let mut results = CollisionResults::new();
    let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
    assert_eq!(scene.collide_with(root, &ray, &mut results).unwrap(), 1);

    let hit = results.closest().unwrap();
    assert_eq!(hit.geometry, Some(triangle));
    assert_eq!(hit.triangle_index, 0);
    assert_relative_eq!(hit.distance, 5.0, epsilon = 1e-5);
    assert_relative_eq!(hit.contact_point.x, 0.0, epsilon = 1e-5);
    assert_relative_eq!(hit.contact_point.y, 0.0, epsilon = 1e-5);
    assert_relative_eq!(hit.contact_point.z, 0.0, epsilon = 1e-5);
    assert_relative_eq!(hit.contact_normal.z, 1.0, epsilon = 1e-5);
}

#[test]
fn test_ray_respects_world_transform_and_limit() {
    init_logging();
    let mut scene = Scene::new();
    let root = scene.create_node("root");
    let triangle = scene.create_geometry("triangle", triangle_mesh());
    scene.attach_child(root, triangle).unwrap();
    scene.set_local_translation(triangle, Vec3::new(0.0, 0.0, 10.0)).unwrap();
    scene.set_local_scale(triangle, Vec3::splat(2.0)).unwrap();
    scene.update_geometric_state(root).unwrap();

    let mut results = CollisionResults::new();
    let ray = Ray::new(Vec3::new(1.5, -1.5, 0.0), Vec3::Z);
    assert_eq!(scene.collide_with(root, &ray, &mut results).unwrap(), 1);
    assert_relative_eq!(results.closest().unwrap().distance, 10.0, epsilon = 1e-4);

    let mut results = CollisionResults::new();
    let short = Ray::new(Vec3::ZERO, Vec3::Z).with_limit(9.0);
    assert_eq!(scene.collide_with(root, &short, &mut results).unwrap(), 0);
}

#[test]
fn test_node_bound_encloses_children() {
    init_logging();
    let mut scene = Scene::new();
    let root = scene.create_node("root");
    for x in [-2.0, 2.0] {
        let mut mesh = Mesh::cube(Vec3::splat(0.5));
        mesh.set_bound(BoundingSphere::new(Vec3::ZERO, 1.0).into());
        let child = scene.create_geometry("ball", mesh);
        scene.set_local_translation(child, Vec3::new(x, 0.0, 0.0)).unwrap();
        scene.attach_child(root, child).unwrap();
    }
    scene.update_geometric_state(root).unwrap();

    let bound = scene.get(root).unwrap().world_bound().unwrap().to_box();
    assert!(bound.min().x <= -3.0 + 1e-4);
    assert!(bound.max().x >= 3.0 - 1e-4);
}

#[test]
fn test_geometry_without_mesh_fails_update() {
    init_logging();
    let mut scene = Scene::new();
    let root = scene.create_node("root");
    let empty = scene.create_geometry("empty", None);
    scene.attach_child(root, empty).unwrap();

    assert!(matches!(
        scene.update_geometric_state(root),
        Err(SceneError::MissingMesh(name)) if name == "empty"
    ));
}

#[test]
fn test_world_transform_composes_down_the_chain() {
    init_logging();
    let mut scene = Scene::new();
    let root = scene.create_node("root");
    let arm = scene.create_node("arm");
    let hand = scene.create_node("hand");
    scene.attach_child(root, arm).unwrap();
    scene.attach_child(arm, hand).unwrap();

    scene.set_local_scale(root, Vec3::splat(2.0)).unwrap();
    scene
        .set_local_rotation(arm, Quat::from_angles(0.0, 0.0, strata_math::consts::FRAC_PI_2))
        .unwrap();
    scene.set_local_translation(hand, Vec3::new(1.0, 0.0, 0.0)).unwrap();

    // No update call: world queries refresh what they need
    let world = scene.world_translation(hand).unwrap();
    assert_relative_eq!(world.x, 0.0, epsilon = 1e-5);
    assert_relative_eq!(world.y, 2.0, epsilon = 1e-5);

    let p = scene.local_to_world(hand, Vec3::new(1.0, 0.0, 0.0)).unwrap();
    let back = scene.world_to_local(hand, p).unwrap();
    assert_relative_eq!(back.x, 1.0, epsilon = 1e-5);
    assert_relative_eq!(back.y, 0.0, epsilon = 1e-5);
}

#[test]
fn test_detached_child_keeps_world_until_reattached() {
    init_logging();
    let mut scene = Scene::new();
    let a = scene.create_node("a");
    let b = scene.create_node("b");
    let child = scene.create_node("child");
    scene.set_local_translation(a, Vec3::new(5.0, 0.0, 0.0)).unwrap();
    scene.attach_child(a, child).unwrap();
    scene.update_geometric_state(a).unwrap();

    assert_eq!(scene.detach_child(a, child).unwrap(), Some(0));
    assert_eq!(scene.get(child).unwrap().parent(), None);
    assert_relative_eq!(scene.world_translation(child).unwrap().x, 5.0);

    scene.attach_child(b, child).unwrap();
    assert_relative_eq!(scene.world_translation(child).unwrap().x, 0.0);
    assert_eq!(scene.detach_child(a, child).unwrap(), None);
}

#[test]
fn test_attach_moves_between_parents() {
    init_logging();
    let mut scene = Scene::new();
    let a = scene.create_node("a");
    let b = scene.create_node("b");
    let child = scene.create_node("child");
    scene.attach_child(a, child).unwrap();
    assert_eq!(scene.attach_child(b, child).unwrap(), 1);

    assert!(scene.children(a).unwrap().is_empty());
    assert_eq!(scene.children(b).unwrap(), &[child]);
    assert_eq!(scene.get(child).unwrap().parent(), Some(b));
    assert!(matches!(
        scene.attach_child(child, b),
        Err(SceneError::CyclicAttach { .. })
    ));
}

#[test]
fn test_detach_all_and_stale_handles() {
    init_logging();
    let mut scene = Scene::new();
    let root = scene.create_node("root");
    let kids: Vec<SpatialId> = (0..3)
        .map(|i| {
            let kid = scene.create_node(format!("kid{}", i));
            scene.attach_child(root, kid).unwrap();
            kid
        })
        .collect();

    assert_eq!(scene.detach_all_children(root).unwrap(), kids);
    assert_eq!(scene.remove_subtree(kids[1]).unwrap(), 1);
    assert!(matches!(scene.get(kids[1]), Err(SceneError::StaleHandle(_))));

    // The slot is reused under a new generation
    let fresh = scene.create_node("fresh");
    assert_ne!(fresh, kids[1]);
    assert!(scene.get(kids[1]).is_err());
}

#[test]
fn test_look_at_points_local_z() {
    init_logging();
    let mut scene = Scene::new();
    let camera = scene.create_node("camera");
    scene.look_at(camera, Vec3::new(10.0, 0.0, 0.0), Vec3::Y).unwrap();

    let forward = scene.local_to_world(camera, Vec3::Z).unwrap();
    assert_relative_eq!(forward.x, 1.0, epsilon = 1e-5);
    assert_relative_eq!(forward.z, 0.0, epsilon = 1e-5);
}

#[test]
fn test_controls_run_during_logical_update() {
    init_logging();
    let mut scene = Scene::new();
    let root = scene.create_node("root");
    let spinner = scene.create_node("spinner");
    scene.attach_child(root, spinner).unwrap();
    scene
        .add_control(spinner, Box::new(RotationControl::new(Vec3::new(0.0, 1.0, 0.0))))
        .unwrap();

    for _ in 0..4 {
        scene.update_logical_state(root, 0.25).unwrap();
    }
    scene.update_geometric_state(root).unwrap();
    let rotation = scene.world_rotation(spinner).unwrap();
    let expected = Quat::from_angles(0.0, 1.0, 0.0);
    assert_relative_eq!(rotation.dot(expected).abs(), 1.0, epsilon = 1e-4);

    scene
        .control_mut::<RotationControl>(spinner)
        .unwrap()
        .unwrap()
        .set_enabled(false);
    scene.update_logical_state(root, 1.0).unwrap();
    assert_eq!(scene.world_rotation(spinner).unwrap(), rotation);

    assert!(scene.remove_control::<RotationControl>(spinner).unwrap().is_some());
    assert!(scene.remove_control::<RotationControl>(spinner).unwrap().is_none());
}

#[test]
fn test_export_import_round_trip() {
    init_logging();
    let mut scene = Scene::new();
    let root = scene.create_node("level");
    let pivot = scene.create_node("pivot");
    let crate_box = scene.create_geometry("crate", Mesh::cube(Vec3::splat(0.5)));
    scene.attach_child(root, pivot).unwrap();
    scene.attach_child(pivot, crate_box).unwrap();

    scene
        .set_local_transform(
            pivot,
            Transform::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_angles(0.0, 0.5, 0.0), Vec3::ONE),
        )
        .unwrap();
    scene.set_cull_hint(pivot, CullHint::Never).unwrap();
    scene.set_queue_bucket(crate_box, Bucket::Transparent).unwrap();
    scene
        .set_user_data(crate_box, "weight", Some(UserData::Float(12.5)))
        .unwrap();
    scene
        .add_light(root, Rc::new(Light::point(Vec3::Y, 4.0, ColorRgba::YELLOW).with_name("lamp")))
        .unwrap();
    scene
        .set_material(
            crate_box,
            Material::new("Lighting").with_name("wood").into_shared(),
        )
        .unwrap();
    scene
        .add_control(pivot, Box::new(RotationControl::new(Vec3::X)))
        .unwrap();

    // Through JSON to exercise the serde form of the capsule
    let capsule = scene.export(root).unwrap();
    let json = serde_json::to_string(&capsule).unwrap();
    let capsule: MemoryCapsule = serde_json::from_str(&json).unwrap();
    assert_eq!(capsule.class_name(), Some("Node"));

    let mut importer = SceneImporter::new();
    importer.register_control(RotationControl::TYPE_NAME, RotationControl::reader);
    let mut target = Scene::new();
    let copy = importer.import(&mut target, &capsule).unwrap();
    target.update_geometric_state(copy).unwrap();

    let pivot_copy = target.child_by_name(copy, "pivot").unwrap().unwrap();
    let crate_copy = target.find_descendant(copy, "crate").unwrap().unwrap();
    assert_eq!(
        target.get(pivot_copy).unwrap().local_transform(),
        scene.get(pivot).unwrap().local_transform()
    );
    assert_eq!(target.cull_hint(crate_copy).unwrap(), CullHint::Never);
    assert_eq!(target.queue_bucket(crate_copy).unwrap(), Bucket::Transparent);
    assert_eq!(
        target.user_data(crate_copy, "weight").unwrap(),
        Some(&UserData::Float(12.5))
    );
    assert_eq!(target.get(crate_copy).unwrap().world_lights().len(), 1);
    assert_eq!(target.material(crate_copy).unwrap().unwrap().name(), Some("wood"));
    assert_eq!(target.mesh(crate_copy).unwrap().unwrap().triangle_count(), 12);
    assert_eq!(target.get(pivot_copy).unwrap().control_count(), 1);
}

#[test]
fn test_batch_node_import_needs_rebatch() {
    init_logging();
    let mut scene = Scene::new();
    let batch_node = scene.create_batch_node("blocks");
    let cube = scene.create_geometry("cube", Mesh::cube(Vec3::ONE));
    scene.attach_child(batch_node, cube).unwrap();
    scene
        .set_material(batch_node, Material::new("Unshaded").into_shared())
        .unwrap();
    scene.batch(batch_node).unwrap();

    let capsule = scene.export(batch_node).unwrap();
    let copy = SceneImporter::new().import(&mut scene, &capsule).unwrap();

    assert_eq!(scene.children(copy).unwrap().len(), 1);
    assert!(scene.needs_full_rebatch(copy).unwrap());
    assert_eq!(scene.batch(copy).unwrap(), 1);
}

#[test]
fn test_breadth_first_visits_levels_in_order() {
    init_logging();
    let mut scene = Scene::new();
    let root = scene.create_node("root");
    let left = scene.create_node("left");
    let right = scene.create_node("right");
    let leaf = scene.create_geometry("leaf", Mesh::quad(1.0, 1.0));
    scene.attach_child(root, left).unwrap();
    scene.attach_child(root, right).unwrap();
    scene.attach_child(left, leaf).unwrap();

    let mut order = Vec::new();
    scene
        .breadth_first_traversal(root, |id, _| order.push(id))
        .unwrap();
    assert_eq!(order, vec![root, left, right, leaf]);
    assert_eq!(scene.triangle_count(root).unwrap(), 2);
    assert_eq!(scene.vertex_count(root).unwrap(), 4);
}
