use animremap_core::{
    parse_stored_controller_json, replace_clips, rewrite_motions, Clip, ClipAssetStore, ClipId,
    ClipKey, ClipLibrary, ClipTarget, Config, Controller, MemoryClipStore, Motion, MotionIndex,
    RecordingGate, RemapBatch, RemapError, SiteIssue, StateId, StoreError, TransformRegistry,
    TreeId,
};
use animremap_test_fixtures::controllers;

fn load() -> (Controller, ClipLibrary) {
    let json = controllers::json("nested-clip").expect("load nested-clip fixture");
    parse_stored_controller_json(&json).expect("parse nested-clip")
}

fn clip(clips: &ClipLibrary, name: &str) -> ClipId {
    clips.find_by_name(name)[0]
}

fn state(c: &Controller, name: &str) -> StateId {
    c.states()
        .find(|(_, s)| s.name == name)
        .map(|(id, _)| id)
        .expect("state exists")
}

fn tree_of(c: &Controller, name: &str) -> TreeId {
    c.state(state(c, name))
        .and_then(|s| s.motion)
        .and_then(|m| m.as_tree())
        .expect("state plays a blend tree")
}

fn batch(entries: Vec<(ClipKey, ClipTarget)>) -> RemapBatch<ClipKey, ClipTarget> {
    entries.into_iter().collect()
}

#[test]
fn direct_and_nested_usages_are_both_replaced() {
    let (mut c, mut clips) = load();
    let (a, b) = (clip(&clips, "A"), clip(&clips, "B"));
    let outer = tree_of(&c, "S2");
    let inner = tree_of(&c, "S3");
    let outer_before = c.tree(outer).unwrap().clone();
    let inner_before = c.tree(inner).unwrap().clone();

    let mut gate = RecordingGate::default();
    let outcome = replace_clips(
        &mut c,
        &mut clips,
        batch(vec![(ClipKey::Id(a), ClipTarget::new(b))]),
        &TransformRegistry::new(),
        &mut MemoryClipStore::default(),
        &mut gate,
        &Config::default(),
    )
    .expect("replace clips");

    // S1 directly, plus the Inner tree shared by S2 and S3, written once.
    assert_eq!(outcome.report.rewritten, 2);
    assert!(outcome.verification.unwrap().is_clean());
    assert_eq!((gate.begun, gate.ended, gate.saves), (1, 1, 1));

    assert_eq!(c.state(state(&c, "S1")).unwrap().motion, Some(Motion::Clip(b)));
    assert_eq!(c.tree(outer).unwrap(), &outer_before);
    let children = c.tree(inner).unwrap().children();
    assert_eq!(children[0].motion, Some(Motion::Clip(b)));
    assert_eq!(children[0].time_scale, 1.5);
    assert_eq!(children[1], inner_before.children()[1]);

    let after = MotionIndex::scan(&c);
    assert!(!after.contains(a));
    let states = after.states_for(b).unwrap();
    for s in ["S1", "S2", "S3"] {
        assert!(states.contains(&state(&c, s)), "{s} now uses B");
    }
}

#[test]
fn collision_unions_usage_sets() {
    let (mut c, mut clips) = load();
    let (a, cc, strafe) = (clip(&clips, "A"), clip(&clips, "C"), clip(&clips, "Strafe"));
    let before = MotionIndex::scan(&c);
    let mut expected: Vec<StateId> = before.states_for(a).unwrap().iter().copied().collect();
    expected.extend(before.states_for(strafe).unwrap().iter().copied());
    expected.extend(before.states_for(cc).unwrap().iter().copied());
    expected.sort();
    expected.dedup();

    replace_clips(
        &mut c,
        &mut clips,
        batch(vec![
            (ClipKey::Id(a), ClipTarget::new(cc)),
            (ClipKey::Id(strafe), ClipTarget::new(cc)),
        ]),
        &TransformRegistry::new(),
        &mut MemoryClipStore::default(),
        &mut RecordingGate::default(),
        &Config::default(),
    )
    .expect("replace clips");

    let after = MotionIndex::scan(&c);
    let mut got: Vec<StateId> = after.states_for(cc).unwrap().iter().copied().collect();
    got.sort();
    assert_eq!(got, expected);
    assert_eq!(after.len(), 1);
}

#[test]
fn humanoid_transform_substitutes_a_derived_clip() {
    let (mut c, mut clips) = load();
    let (a, b) = (clip(&clips, "A"), clip(&clips, "B"));
    let config = Config::default();
    let mut store = MemoryClipStore::from_config(&config);

    let outcome = replace_clips(
        &mut c,
        &mut clips,
        batch(vec![(
            ClipKey::Name("A".into()),
            ClipTarget::new(b).with_transform("humanoid"),
        )]),
        &TransformRegistry::new(),
        &mut store,
        &mut RecordingGate::default(),
        &config,
    )
    .expect("replace clips");
    assert!(outcome.report.is_clean());

    let (derived, asset) = store.assets().next().expect("one derived clip");
    assert_eq!(store.assets().count(), 1, "derived once for all states");
    assert_eq!(clips.name(derived), Some("Bhumanoid0"));
    assert_eq!(asset.asset_path, "Generated/Animations/Bhumanoid0.anim");

    let after = MotionIndex::scan(&c);
    assert!(!after.contains(a));
    assert!(!after.contains(b));
    assert_eq!(after.states_for(derived).unwrap().len(), 3);
}

#[test]
fn unknown_transform_skips_only_its_entry() {
    let (mut c, mut clips) = load();
    let (a, b) = (clip(&clips, "A"), clip(&clips, "B"));
    let (cc, strafe) = (clip(&clips, "C"), clip(&clips, "Strafe"));

    let outcome = replace_clips(
        &mut c,
        &mut clips,
        batch(vec![
            (ClipKey::Id(a), ClipTarget::new(b).with_transform("mirror")),
            (ClipKey::Id(cc), ClipTarget::new(strafe)),
        ]),
        &TransformRegistry::new(),
        &mut MemoryClipStore::default(),
        &mut RecordingGate::default(),
        &Config::default(),
    )
    .expect("an unknown transform is not fatal");

    assert_eq!(
        outcome.report.issues,
        vec![SiteIssue::UnknownTransform {
            source_name: "A".into(),
            transform: "mirror".into(),
        }]
    );
    assert_eq!(outcome.report.rewritten, 1);
    assert_eq!(outcome.verification.unwrap().residual, vec!["A".to_string()]);
    let after = MotionIndex::scan(&c);
    assert!(after.contains(a));
    assert!(!after.contains(cc));
}

struct FailingStore;

impl ClipAssetStore for FailingStore {
    fn create_derived(
        &mut self,
        _library: &mut ClipLibrary,
        _clip: Clip,
        desired_name: &str,
    ) -> Result<ClipId, StoreError> {
        Err(StoreError::Create {
            name: desired_name.to_string(),
            reason: "read-only asset folder".to_string(),
        })
    }
}

#[test]
fn store_failure_aborts_and_releases_the_batch() {
    let (mut c, mut clips) = load();
    let before = c.clone();
    let (a, b) = (clip(&clips, "A"), clip(&clips, "B"));
    let mut gate = RecordingGate::default();

    let err = replace_clips(
        &mut c,
        &mut clips,
        batch(vec![(
            ClipKey::Id(a),
            ClipTarget::new(b).with_transform("humanoid"),
        )]),
        &TransformRegistry::new(),
        &mut FailingStore,
        &mut gate,
        &Config::default(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        RemapError::Store(StoreError::Create { ref name, .. }) if name == "Bhumanoid"
    ));
    assert_eq!((gate.begun, gate.ended, gate.saves), (1, 1, 0));
    assert!(!gate.open);
    assert_eq!(c, before);
}

#[test]
fn rerun_after_rewrite_changes_nothing() {
    let (mut c, mut clips) = load();
    let (a, b) = (clip(&clips, "A"), clip(&clips, "B"));
    let run = |c: &mut Controller, clips: &mut ClipLibrary| {
        replace_clips(
            c,
            clips,
            batch(vec![(ClipKey::Id(a), ClipTarget::new(b))]),
            &TransformRegistry::new(),
            &mut MemoryClipStore::default(),
            &mut RecordingGate::default(),
            &Config::default(),
        )
        .expect("replace clips")
    };

    run(&mut c, &mut clips);
    let once = c.clone();
    let second = run(&mut c, &mut clips);
    assert_eq!(second.report.rewritten, 0);
    assert_eq!(c, once);
}

#[test]
fn state_removed_after_indexing_is_reported() {
    let (mut c, mut clips) = load();
    let (a, b) = (clip(&clips, "A"), clip(&clips, "B"));
    let index = MotionIndex::scan(&c);
    let s1 = state(&c, "S1");
    c.remove_state(s1);

    let report = rewrite_motions(
        &mut c,
        &mut clips,
        &index,
        batch(vec![(ClipKey::Id(a), ClipTarget::new(b))]),
        &TransformRegistry::new(),
        &mut MemoryClipStore::default(),
    )
    .expect("rewrite");
    assert_eq!(report.issues, vec![SiteIssue::StaleState(s1)]);
    assert_eq!(report.rewritten, 1);
}

#[test]
fn state_that_no_longer_plays_the_clip_is_reported() {
    let (mut c, mut clips) = load();
    let (a, b, cc) = (clip(&clips, "A"), clip(&clips, "B"), clip(&clips, "C"));
    let index = MotionIndex::scan(&c);
    let s1 = state(&c, "S1");
    c.set_motion(s1, Some(Motion::Clip(cc)));

    let report = rewrite_motions(
        &mut c,
        &mut clips,
        &index,
        batch(vec![(ClipKey::Id(a), ClipTarget::new(b))]),
        &TransformRegistry::new(),
        &mut MemoryClipStore::default(),
    )
    .expect("rewrite");
    assert_eq!(
        report.issues,
        vec![SiteIssue::StaleMotionSite { clip: a, state: s1 }]
    );
    assert_eq!(report.rewritten, 1, "the Inner tree is still rewritten");
    assert_eq!(c.state(s1).unwrap().motion, Some(Motion::Clip(cc)));
}
