use hashbrown::HashMap;
use serde::Deserialize;

use crate::clip::{ClipLibrary, Curve, CurveBinding, ObjectReferenceKeyframe};
use crate::error::LoadError;
use crate::external::{Avatar, ControlKind, ExpressionParameter, ExternalSites, MenuControl};
use crate::graph::{
    BlendTree, BlendType, ChildMotion, Condition, ConditionMode, Controller, DriverEntry,
    DriverOp, Motion, Parameter, ParameterDriver, ParameterKind, State, Transition,
    TransitionTarget,
};
use crate::ids::{ClipId, MachineId, MenuId, StateId, TreeId};

/// Public API: parse a stored controller document (see fixtures/controllers) into the
/// identity-based graph model plus the clip library it references.
///
/// Notes:
/// - Clips are referenced by name and must be declared in `clips`; names must be unique.
/// - Transition destinations name a state or state machine anywhere in the controller; the
///   first declared match wins. They are resolved after the whole graph is built.
/// - `{"treeRef": name}` reuses a blend tree declared earlier, so one tree can be reached
///   from several states.
pub fn parse_stored_controller_json(s: &str) -> Result<(Controller, ClipLibrary), LoadError> {
    let mut doc: StoredController =
        serde_json::from_str(s).map_err(|e| LoadError::Parse(e.to_string()))?;
    let mut library = ClipLibrary::new();
    let mut names = HashMap::new();
    load_clips(&mut library, &mut names, std::mem::take(&mut doc.clips))?;
    let controller = ControllerBuilder::new(&doc.name, &names).build(doc)?;
    Ok((controller, library))
}

/// Public API: parse a stored avatar document: controllers sharing one clip library,
/// expression parameters and the expressions menu tree.
///
/// `{"subMenuRef": name}` points a control at a menu declared anywhere in the tree (cycles
/// included).
pub fn parse_stored_avatar_json(s: &str) -> Result<(Avatar, ClipLibrary), LoadError> {
    let mut doc: StoredAvatar =
        serde_json::from_str(s).map_err(|e| LoadError::Parse(e.to_string()))?;
    let mut library = ClipLibrary::new();
    let mut names = HashMap::new();
    load_clips(&mut library, &mut names, std::mem::take(&mut doc.clips))?;
    for c in &mut doc.controllers {
        load_clips(&mut library, &mut names, std::mem::take(&mut c.clips))?;
    }

    let mut controllers = Vec::with_capacity(doc.controllers.len());
    for c in doc.controllers {
        controllers.push(ControllerBuilder::new(&c.name, &names).build(c)?);
    }

    let mut external = ExternalSites {
        expression_parameters: doc.expression_parameters,
        ..ExternalSites::default()
    };
    if let Some(menu) = doc.menu {
        external.root_menu = Some(MenuBuilder::default().build(&mut external, menu)?);
    }

    Ok((
        Avatar {
            name: doc.name,
            controllers,
            external,
        },
        library,
    ))
}

fn load_clips(
    library: &mut ClipLibrary,
    names: &mut HashMap<String, ClipId>,
    clips: Vec<StoredClip>,
) -> Result<(), LoadError> {
    for sc in clips {
        if names.contains_key(&sc.name) {
            return Err(LoadError::DuplicateClip(sc.name));
        }
        let id = library.create(sc.name.clone());
        if let Some(clip) = library.get_mut(id) {
            if let Some(rate) = sc.frame_rate {
                clip.frame_rate = rate;
            }
            for c in sc.curves {
                clip.set_curve(&c.binding, Some(c.curve));
            }
            for c in sc.object_curves {
                clip.set_object_reference_curve(&c.binding, Some(c.keys));
            }
        }
        names.insert(sc.name, id);
    }
    Ok(())
}

enum TransitionOwner {
    Entry(MachineId),
    AnyState(MachineId),
    State(StateId),
}

struct PendingTransitions {
    owner: TransitionOwner,
    owner_name: String,
    transitions: Vec<StoredTransition>,
}

struct ControllerBuilder<'a> {
    controller: Controller,
    clips: &'a HashMap<String, ClipId>,
    trees: HashMap<String, TreeId>,
    states: HashMap<String, StateId>,
    machines: HashMap<String, MachineId>,
    pending: Vec<PendingTransitions>,
}

impl<'a> ControllerBuilder<'a> {
    fn new(name: &str, clips: &'a HashMap<String, ClipId>) -> Self {
        Self {
            controller: Controller::new(name),
            clips,
            trees: HashMap::new(),
            states: HashMap::new(),
            machines: HashMap::new(),
            pending: Vec::new(),
        }
    }

    fn build(mut self, doc: StoredController) -> Result<Controller, LoadError> {
        for p in doc.parameters {
            self.controller.add_parameter(Parameter {
                name: p.name,
                kind: p.kind,
                default: p.default,
            });
        }
        for layer in doc.layers {
            let root = self.controller.add_layer(layer.name);
            self.machine(root, layer.state_machine)?;
        }

        for p in std::mem::take(&mut self.pending) {
            let mut transitions = Vec::with_capacity(p.transitions.len());
            for t in p.transitions {
                transitions.push(self.transition(&p.owner_name, t)?);
            }
            match p.owner {
                TransitionOwner::Entry(m) => {
                    if let Some(m) = self.controller.machine_mut(m) {
                        m.set_entry_transitions(transitions);
                    }
                }
                TransitionOwner::AnyState(m) => {
                    if let Some(m) = self.controller.machine_mut(m) {
                        m.set_any_state_transitions(transitions);
                    }
                }
                TransitionOwner::State(s) => {
                    if let Some(s) = self.controller.state_mut(s) {
                        s.set_transitions(transitions);
                    }
                }
            }
        }
        Ok(self.controller)
    }

    fn machine(&mut self, id: MachineId, sm: StoredMachine) -> Result<(), LoadError> {
        self.machines.entry(sm.name.clone()).or_insert(id);
        if let Some(m) = self.controller.machine_mut(id) {
            m.drivers = sm.drivers.into_iter().map(driver).collect();
        }

        for ss in sm.states {
            let mut state = State::new(ss.name.clone());
            state.speed = ss.speed;
            state.motion = ss.motion.map(|m| self.motion(m)).transpose()?;
            state.drivers = ss.drivers.into_iter().map(driver).collect();
            let Some(state_id) = self.controller.add_state(id, state) else {
                continue;
            };
            self.states.entry(ss.name.clone()).or_insert(state_id);
            self.pending.push(PendingTransitions {
                owner: TransitionOwner::State(state_id),
                owner_name: ss.name,
                transitions: ss.transitions,
            });
        }
        if let Some(default) = sm.default_state {
            let found = self.controller.machine(id).and_then(|m| {
                m.states()
                    .iter()
                    .copied()
                    .find(|s| self.controller.state(*s).is_some_and(|s| s.name == default))
            });
            let Some(state) = found else {
                return Err(LoadError::UnknownDestination {
                    owner: sm.name,
                    target: default,
                });
            };
            if let Some(m) = self.controller.machine_mut(id) {
                m.default_state = Some(state);
            }
        }

        self.pending.push(PendingTransitions {
            owner: TransitionOwner::Entry(id),
            owner_name: sm.name.clone(),
            transitions: sm.entry_transitions,
        });
        self.pending.push(PendingTransitions {
            owner: TransitionOwner::AnyState(id),
            owner_name: sm.name,
            transitions: sm.any_state_transitions,
        });

        for child in sm.machines {
            let Some(child_id) = self.controller.add_child_machine(id, child.name.clone()) else {
                continue;
            };
            self.machine(child_id, child)?;
        }
        Ok(())
    }

    fn motion(&mut self, m: StoredMotion) -> Result<Motion, LoadError> {
        match m {
            StoredMotion::Clip(name) => self
                .clips
                .get(&name)
                .map(|c| Motion::Clip(*c))
                .ok_or(LoadError::UnknownClip(name)),
            StoredMotion::Tree(t) => self.tree(t).map(Motion::Tree),
            StoredMotion::TreeRef(name) => self
                .trees
                .get(&name)
                .map(|t| Motion::Tree(*t))
                .ok_or(LoadError::UnknownReference {
                    kind: "blend tree",
                    name,
                }),
        }
    }

    fn tree(&mut self, t: StoredTree) -> Result<TreeId, LoadError> {
        let mut children = Vec::with_capacity(t.children.len());
        for c in t.children {
            children.push(ChildMotion {
                motion: c.motion.map(|m| self.motion(m)).transpose()?,
                threshold: c.threshold,
                position: c.position,
                time_scale: c.time_scale,
                direct_blend_parameter: c.direct_blend_parameter,
                mirror: c.mirror,
            });
        }
        let mut tree = BlendTree::new(t.name.clone(), t.blend_parameter)
            .with_blend_type(t.blend_type)
            .with_children(children);
        tree.blend_parameter_y = t.blend_parameter_y;
        let id = self.controller.add_tree(tree);
        self.trees.entry(t.name).or_insert(id);
        Ok(id)
    }

    fn transition(&self, owner: &str, t: StoredTransition) -> Result<Transition, LoadError> {
        let unknown = |target: &str| LoadError::UnknownDestination {
            owner: owner.to_string(),
            target: target.to_string(),
        };
        let destination = match t.destination {
            None => None,
            Some(StoredDestination::Exit) => Some(TransitionTarget::Exit),
            Some(StoredDestination::State(name)) => Some(TransitionTarget::State(
                *self.states.get(&name).ok_or_else(|| unknown(&name))?,
            )),
            Some(StoredDestination::Machine(name)) => Some(TransitionTarget::Machine(
                *self.machines.get(&name).ok_or_else(|| unknown(&name))?,
            )),
        };
        Ok(Transition {
            destination,
            conditions: t
                .conditions
                .into_iter()
                .map(|c| Condition::new(c.mode, c.parameter, c.threshold))
                .collect(),
        })
    }
}

fn driver(d: StoredDriver) -> ParameterDriver {
    ParameterDriver {
        local_only: d.local_only,
        entries: d
            .entries
            .into_iter()
            .map(|e| DriverEntry {
                op: e.op,
                name: e.name,
                source: e.source,
                source_parameter: e.source_parameter,
                value: e.value,
            })
            .collect(),
    }
}

#[derive(Default)]
struct MenuBuilder {
    names: HashMap<String, MenuId>,
    /// (menu, control index, referenced menu name)
    refs: Vec<(MenuId, usize, String)>,
}

impl MenuBuilder {
    fn build(
        mut self,
        external: &mut ExternalSites,
        root: StoredMenu,
    ) -> Result<MenuId, LoadError> {
        let root = self.menu(external, root);
        for (menu, control, name) in self.refs {
            let target = *self.names.get(&name).ok_or(LoadError::UnknownReference {
                kind: "menu",
                name,
            })?;
            if let Some(m) = external.menus.get_mut(menu) {
                let mut controls = m.controls().to_vec();
                if let Some(c) = controls.get_mut(control) {
                    c.sub_menu = Some(target);
                }
                m.set_controls(controls);
            }
        }
        Ok(root)
    }

    fn menu(&mut self, external: &mut ExternalSites, sm: StoredMenu) -> MenuId {
        let mut controls = Vec::with_capacity(sm.controls.len());
        let mut refs = Vec::new();
        for (index, c) in sm.controls.into_iter().enumerate() {
            let sub_menu = c.sub_menu.map(|m| self.menu(external, *m));
            if let Some(name) = c.sub_menu_ref {
                refs.push((index, name));
            }
            controls.push(MenuControl {
                name: c.name,
                kind: c.kind,
                parameter: c.parameter,
                sub_parameters: c.sub_parameters,
                sub_menu,
                value: c.value,
            });
        }
        let id = external.menus.create(sm.name.clone(), controls);
        self.names.entry(sm.name).or_insert(id);
        self.refs
            .extend(refs.into_iter().map(|(index, name)| (id, index, name)));
        id
    }
}

// ----- JSON schema (serde) -----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredAvatar {
    #[serde(default)]
    name: String,
    #[serde(default)]
    clips: Vec<StoredClip>,
    #[serde(default)]
    controllers: Vec<StoredController>,
    #[serde(default)]
    expression_parameters: Vec<ExpressionParameter>,
    #[serde(default)]
    menu: Option<StoredMenu>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredController {
    name: String,
    #[serde(default)]
    clips: Vec<StoredClip>,
    #[serde(default)]
    parameters: Vec<StoredParameter>,
    #[serde(default)]
    layers: Vec<StoredLayer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredClip {
    name: String,
    #[serde(default)]
    frame_rate: Option<f32>,
    #[serde(default)]
    curves: Vec<StoredCurve>,
    #[serde(default)]
    object_curves: Vec<StoredObjectCurve>,
}

#[derive(Debug, Deserialize)]
struct StoredCurve {
    binding: CurveBinding,
    curve: Curve,
}

#[derive(Debug, Deserialize)]
struct StoredObjectCurve {
    binding: CurveBinding,
    keys: Vec<ObjectReferenceKeyframe>,
}

#[derive(Debug, Deserialize)]
struct StoredParameter {
    name: String,
    #[serde(default)]
    kind: ParameterKind,
    #[serde(default)]
    default: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredLayer {
    name: String,
    state_machine: StoredMachine,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredMachine {
    #[serde(default)]
    name: String,
    #[serde(default)]
    default_state: Option<String>,
    #[serde(default)]
    states: Vec<StoredState>,
    #[serde(default)]
    machines: Vec<StoredMachine>,
    #[serde(default)]
    entry_transitions: Vec<StoredTransition>,
    #[serde(default)]
    any_state_transitions: Vec<StoredTransition>,
    #[serde(default)]
    drivers: Vec<StoredDriver>,
}

fn one() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredState {
    name: String,
    #[serde(default)]
    motion: Option<StoredMotion>,
    #[serde(default = "one")]
    speed: f32,
    #[serde(default)]
    transitions: Vec<StoredTransition>,
    #[serde(default)]
    drivers: Vec<StoredDriver>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum StoredMotion {
    Clip(String),
    Tree(StoredTree),
    TreeRef(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTree {
    name: String,
    #[serde(default)]
    blend_type: BlendType,
    #[serde(default)]
    blend_parameter: String,
    #[serde(default)]
    blend_parameter_y: Option<String>,
    #[serde(default)]
    children: Vec<StoredChild>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredChild {
    #[serde(default)]
    motion: Option<StoredMotion>,
    #[serde(default)]
    threshold: f32,
    #[serde(default)]
    position: [f32; 2],
    #[serde(default = "one")]
    time_scale: f32,
    #[serde(default)]
    direct_blend_parameter: Option<String>,
    #[serde(default)]
    mirror: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum StoredDestination {
    State(String),
    Machine(String),
    Exit,
}

#[derive(Debug, Deserialize)]
struct StoredTransition {
    #[serde(default)]
    destination: Option<StoredDestination>,
    #[serde(default)]
    conditions: Vec<StoredCondition>,
}

#[derive(Debug, Deserialize)]
struct StoredCondition {
    mode: ConditionMode,
    parameter: String,
    #[serde(default)]
    threshold: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDriver {
    #[serde(default)]
    local_only: bool,
    #[serde(default)]
    entries: Vec<StoredDriverEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDriverEntry {
    #[serde(default)]
    op: DriverOp,
    name: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    source_parameter: Option<String>,
    #[serde(default)]
    value: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredMenu {
    #[serde(default)]
    name: String,
    #[serde(default)]
    controls: Vec<StoredControl>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredControl {
    name: String,
    #[serde(default)]
    kind: ControlKind,
    #[serde(default)]
    parameter: Option<String>,
    #[serde(default)]
    sub_parameters: Vec<String>,
    #[serde(default)]
    sub_menu: Option<Box<StoredMenu>>,
    #[serde(default)]
    sub_menu_ref: Option<String>,
    #[serde(default)]
    value: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traverse::menus_in_order;

    const CONTROLLER: &str = r#"{
        "name": "FX",
        "clips": [ { "name": "Idle" }, { "name": "Walk" } ],
        "parameters": [ { "name": "Speed", "kind": "float" } ],
        "layers": [ {
            "name": "Base",
            "stateMachine": {
                "name": "Base",
                "defaultState": "Move",
                "states": [
                    { "name": "Idle", "motion": { "clip": "Idle" },
                      "transitions": [ { "destination": { "state": "Move" },
                        "conditions": [ { "mode": "greater", "parameter": "Speed", "threshold": 0.1 } ] } ] },
                    { "name": "Move", "motion": { "tree": { "name": "Blend", "blendParameter": "Speed",
                        "children": [ { "motion": { "clip": "Idle" } }, { "motion": { "clip": "Walk" }, "threshold": 1 } ] } } },
                    { "name": "Again", "motion": { "treeRef": "Blend" } }
                ],
                "anyStateTransitions": [ { "destination": "exit" } ]
            }
        } ]
    }"#;

    #[test]
    fn loads_graph_and_resolves_names() {
        let (c, clips) = parse_stored_controller_json(CONTROLLER).unwrap();
        assert_eq!(clips.len(), 2);
        let root = c.machine(c.layers()[0].state_machine).unwrap();
        assert_eq!(root.states().len(), 3);
        let idle = c.state(root.states()[0]).unwrap();
        let move_id = root.states()[1];
        assert_eq!(root.default_state, Some(move_id));
        assert_eq!(
            idle.transitions()[0].destination,
            Some(TransitionTarget::State(move_id))
        );
        assert_eq!(
            root.any_state_transitions()[0].destination,
            Some(TransitionTarget::Exit)
        );
        let again = c.state(root.states()[2]).unwrap();
        assert_eq!(again.motion, c.state(move_id).unwrap().motion);
        assert_eq!(c.animation_clips().len(), 2);
    }

    #[test]
    fn unknown_clip_and_destination_are_errors() {
        let bad_clip = CONTROLLER.replace(r#"{ "clip": "Walk" }"#, r#"{ "clip": "Run" }"#);
        assert_eq!(
            parse_stored_controller_json(&bad_clip).unwrap_err(),
            LoadError::UnknownClip("Run".into())
        );
        let bad_dest = CONTROLLER.replace(r#"{ "state": "Move" }"#, r#"{ "state": "Fly" }"#);
        assert!(matches!(
            parse_stored_controller_json(&bad_dest),
            Err(LoadError::UnknownDestination { target, .. }) if target == "Fly"
        ));
        let dup = CONTROLLER.replace(r#"{ "name": "Walk" }"#, r#"{ "name": "Idle" }"#);
        assert_eq!(
            parse_stored_controller_json(&dup).unwrap_err(),
            LoadError::DuplicateClip("Idle".into())
        );
    }

    #[test]
    fn avatar_menu_refs_may_cycle() {
        let doc = r#"{
            "name": "Avatar",
            "expressionParameters": [ { "name": "Speed", "valueType": "float" } ],
            "menu": { "name": "Root", "controls": [
                { "name": "More", "kind": "subMenu", "subMenu": { "name": "Sub", "controls": [
                    { "name": "Back", "kind": "subMenu", "subMenuRef": "Root" }
                ] } }
            ] }
        }"#;
        let (avatar, _) = parse_stored_avatar_json(doc).unwrap();
        assert_eq!(avatar.external.menus.len(), 2);
        assert_eq!(menus_in_order(&avatar.external).len(), 2);
        let sub = avatar.external.menus.get(MenuId(0)).unwrap();
        assert_eq!(sub.controls()[0].sub_menu, avatar.external.root_menu);
    }
}
