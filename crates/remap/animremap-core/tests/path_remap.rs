use animremap_core::{
    parse_skeleton_json, parse_stored_controller_json, repath, rewrite_paths, ClipId,
    ClipLibrary, Config, Controller, CurveBinding, NodeId, PathIndex, PathKey, RecordingGate,
    RemapBatch, SiteIssue, Skeleton, SkeletonMap,
};
use animremap_test_fixtures::{controllers, skeletons};

fn load() -> (Controller, ClipLibrary, Skeleton) {
    let json = controllers::json("rig-rename").expect("load rig-rename fixture");
    let (controller, clips) = parse_stored_controller_json(&json).expect("parse rig-rename");
    let json = skeletons::json("rig-renamed").expect("load rig-renamed fixture");
    let skeleton = parse_skeleton_json(&json).expect("parse rig-renamed");
    (controller, clips, skeleton)
}

fn clip(clips: &ClipLibrary, name: &str) -> ClipId {
    clips.find_by_name(name)[0]
}

fn old_arm_to_new_arm(skeleton: &Skeleton) -> RemapBatch<PathKey, NodeId> {
    let mut batch = RemapBatch::new();
    batch.assign(
        PathKey::Missing("Hips/OldArm".into()),
        skeleton.find("Hips/NewArm").expect("NewArm node"),
    );
    batch
}

#[test]
fn renamed_bone_moves_only_its_bindings() {
    let (controller, mut clips, skeleton) = load();
    let before = clips.clone();
    let wave = clip(&clips, "Wave");
    let reach = clip(&clips, "Reach");

    let mut gate = RecordingGate::default();
    let outcome = repath(
        &controller,
        &mut clips,
        &skeleton,
        old_arm_to_new_arm(&skeleton),
        &mut gate,
        &Config::default(),
    )
    .expect("repath");

    assert!(outcome.report.is_clean());
    assert_eq!(outcome.report.rewritten, 3);
    assert!(outcome.verification.expect("verification on").is_clean());
    assert_eq!((gate.begun, gate.ended, gate.saves), (1, 1, 1));
    assert!(!gate.open);

    let chest = CurveBinding::scalar("Hips/Chest", "Transform", "m_LocalRotation.x");
    let old_rot = CurveBinding::scalar("Hips/OldArm", "Transform", "m_LocalRotation.z");
    let new_rot = old_rot.with_path("Hips/NewArm");
    let old_mat = CurveBinding::object_reference(
        "Hips/OldArm",
        "SkinnedMeshRenderer",
        "m_Materials.Array.data[0]",
    );
    let new_mat = old_mat.with_path("Hips/NewArm");

    let (was, now) = (before.get(wave).unwrap(), clips.get(wave).unwrap());
    assert_eq!(now.curve(&chest), was.curve(&chest));
    assert_eq!(now.curve(&new_rot), was.curve(&old_rot));
    assert!(now.curve(&old_rot).is_none());
    assert_eq!(
        now.object_reference_curve(&new_mat),
        was.object_reference_curve(&old_mat)
    );
    assert!(now.object_reference_curve(&old_mat).is_none());
    assert_eq!(now.all_bindings().len(), was.all_bindings().len());

    let left = CurveBinding::scalar("Hips/LeftArm", "Transform", "m_LocalPosition.y");
    let now = clips.get(reach).unwrap();
    assert_eq!(
        now.curve(&left),
        before.get(reach).unwrap().curve(&left),
        "unrelated missing path is left alone"
    );
    assert!(now
        .curve(&CurveBinding::scalar("Hips/NewArm", "Transform", "m_LocalPosition.y"))
        .is_some());
}

#[test]
fn missing_paths_stay_in_their_own_bucket() {
    let (controller, clips, skeleton) = load();
    let index = PathIndex::scan(&controller, &clips, &skeleton, &Config::default());

    assert_eq!(index.missing_sorted(), vec!["Hips/LeftArm", "Hips/OldArm"]);
    let names: Vec<_> = index
        .nodes_sorted(&skeleton)
        .into_iter()
        .map(|n| skeleton.name(n).unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["Chest"]);
    assert_eq!(
        index.clips_for_missing("Hips/OldArm").unwrap().len(),
        2,
        "both clips bind the renamed bone"
    );
    let new_arm = skeleton.find("Hips/NewArm").unwrap();
    assert!(index.clips_for_node(new_arm).is_none());
}

#[test]
fn two_sources_onto_one_node_union_their_clips() {
    let (controller, mut clips, skeleton) = load();
    let config = Config::default();
    let before = PathIndex::scan(&controller, &clips, &skeleton, &config);
    let mut expected: Vec<ClipId> = before
        .clips_for_missing("Hips/OldArm")
        .unwrap()
        .union(before.clips_for_missing("Hips/LeftArm").unwrap())
        .copied()
        .collect();
    expected.sort();

    let new_arm = skeleton.find("Hips/NewArm").unwrap();
    let mut batch = RemapBatch::new();
    batch
        .assign(PathKey::Missing("Hips/OldArm".into()), new_arm)
        .assign(PathKey::Missing("Hips/LeftArm".into()), new_arm);
    let outcome = repath(
        &controller,
        &mut clips,
        &skeleton,
        batch,
        &mut RecordingGate::default(),
        &config,
    )
    .expect("repath");

    let after = PathIndex::scan(&controller, &clips, &skeleton, &config);
    let mut got: Vec<ClipId> = after.clips_for_node(new_arm).unwrap().iter().copied().collect();
    got.sort();
    assert_eq!(got, expected);
    assert_eq!(after.missing_len(), 0);

    // Reach animated the same property on both bones; one curve has to win.
    let reach = clip(&clips, "Reach");
    assert_eq!(
        outcome.report.issues,
        vec![SiteIssue::BindingOverwritten {
            clip: reach,
            binding: CurveBinding::scalar("Hips/NewArm", "Transform", "m_LocalPosition.y"),
        }]
    );
}

#[test]
fn second_run_is_a_no_op() {
    let (controller, mut clips, skeleton) = load();
    let config = Config::default();
    let mut gate = RecordingGate::default();

    repath(
        &controller,
        &mut clips,
        &skeleton,
        old_arm_to_new_arm(&skeleton),
        &mut gate,
        &config,
    )
    .expect("first repath");
    let once = clips.clone();

    let outcome = repath(
        &controller,
        &mut clips,
        &skeleton,
        old_arm_to_new_arm(&skeleton),
        &mut gate,
        &config,
    )
    .expect("second repath");
    assert_eq!(outcome.report.rewritten, 0);
    assert_eq!(clips, once);
    assert_eq!((gate.begun, gate.ended, gate.saves), (2, 2, 2));
}

#[test]
fn object_reference_curves_can_be_left_out() {
    let (controller, mut clips, skeleton) = load();
    let config = Config {
        include_object_reference_curves: false,
        ..Config::default()
    };
    let outcome = repath(
        &controller,
        &mut clips,
        &skeleton,
        old_arm_to_new_arm(&skeleton),
        &mut RecordingGate::default(),
        &config,
    )
    .expect("repath");
    assert_eq!(outcome.report.rewritten, 2);

    let wave = clips.get(clip(&clips, "Wave")).unwrap();
    let old_mat = CurveBinding::object_reference(
        "Hips/OldArm",
        "SkinnedMeshRenderer",
        "m_Materials.Array.data[0]",
    );
    assert!(wave.object_reference_curve(&old_mat).is_some());
}

#[test]
fn target_without_path_is_reported() {
    let (controller, mut clips, skeleton) = load();
    let before = clips.clone();
    let mut batch = RemapBatch::new();
    batch.assign(PathKey::Missing("Hips/OldArm".into()), NodeId(99));

    let outcome = repath(
        &controller,
        &mut clips,
        &skeleton,
        batch,
        &mut RecordingGate::default(),
        &Config::default(),
    )
    .expect("repath");
    assert_eq!(outcome.report.issues, vec![SiteIssue::UnresolvedTarget(NodeId(99))]);
    assert_eq!(
        outcome.verification.unwrap().residual,
        vec!["Hips/OldArm".to_string()]
    );
    assert_eq!(clips, before);
}

#[test]
fn clip_unbound_after_indexing_is_reported() {
    let (controller, mut clips, skeleton) = load();
    let config = Config::default();
    let index = PathIndex::scan(&controller, &clips, &skeleton, &config);
    let wave = clip(&clips, "Wave");
    let rot = CurveBinding::scalar("Hips/OldArm", "Transform", "m_LocalRotation.z");
    let mat = CurveBinding::object_reference(
        "Hips/OldArm",
        "SkinnedMeshRenderer",
        "m_Materials.Array.data[0]",
    );
    let clip_mut = clips.get_mut(wave).unwrap();
    clip_mut.set_curve(&rot, None);
    clip_mut.set_object_reference_curve(&mat, None);

    let report = rewrite_paths(
        &mut clips,
        &index,
        &skeleton,
        old_arm_to_new_arm(&skeleton),
        &config,
    );
    assert_eq!(
        report.issues,
        vec![SiteIssue::StaleBinding {
            clip: wave,
            path: "Hips/OldArm".into(),
        }]
    );
    assert_eq!(report.rewritten, 1, "Reach still moves");
}
