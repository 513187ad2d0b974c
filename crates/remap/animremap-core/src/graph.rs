//! Layered motion graph of an animation controller.
//!
//! States, state machines and blend trees live in identity-keyed arenas on the
//! [`Controller`]; machines refer to their states and sub-machines by id, motions refer to
//! clips and blend trees by id. Sequences that hosts commit as a whole (child motions,
//! transitions, parameter declarations) are read as slices and replaced wholesale through
//! the `set_*` methods.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ids::{ClipId, IdAllocator, MachineId, StateId, TreeId};

/// Either a clip leaf or a blend tree node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Motion {
    Clip(ClipId),
    Tree(TreeId),
}

impl Motion {
    pub fn as_clip(&self) -> Option<ClipId> {
        match self {
            Motion::Clip(c) => Some(*c),
            Motion::Tree(_) => None,
        }
    }

    pub fn as_tree(&self) -> Option<TreeId> {
        match self {
            Motion::Tree(t) => Some(*t),
            Motion::Clip(_) => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlendType {
    #[default]
    Simple1D,
    SimpleDirectional2D,
    FreeformDirectional2D,
    FreeformCartesian2D,
    Direct,
}

/// One entry of a blend tree. Value type: edit a copy and write the whole list back.
#[derive(Clone, Debug, PartialEq)]
pub struct ChildMotion {
    pub motion: Option<Motion>,
    pub threshold: f32,
    pub position: [f32; 2],
    pub time_scale: f32,
    /// Per-child weight parameter used by direct blending.
    pub direct_blend_parameter: Option<String>,
    pub mirror: bool,
}

impl ChildMotion {
    pub fn new(motion: Motion) -> Self {
        Self {
            motion: Some(motion),
            threshold: 0.0,
            position: [0.0, 0.0],
            time_scale: 1.0,
            direct_blend_parameter: None,
            mirror: false,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_direct_parameter(mut self, name: impl Into<String>) -> Self {
        self.direct_blend_parameter = Some(name.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlendTree {
    pub name: String,
    pub blend_type: BlendType,
    pub blend_parameter: String,
    /// Second axis for 2D blending.
    pub blend_parameter_y: Option<String>,
    children: Vec<ChildMotion>,
}

impl BlendTree {
    pub fn new(name: impl Into<String>, blend_parameter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blend_type: BlendType::Simple1D,
            blend_parameter: blend_parameter.into(),
            blend_parameter_y: None,
            children: Vec::new(),
        }
    }

    pub fn with_blend_type(mut self, blend_type: BlendType) -> Self {
        self.blend_type = blend_type;
        self
    }

    pub fn with_second_parameter(mut self, name: impl Into<String>) -> Self {
        self.blend_parameter_y = Some(name.into());
        self
    }

    pub fn with_children(mut self, children: Vec<ChildMotion>) -> Self {
        self.children = children;
        self
    }

    pub fn set_blend_parameters(&mut self, primary: impl Into<String>, secondary: Option<String>) {
        self.blend_parameter = primary.into();
        self.blend_parameter_y = secondary;
    }

    pub fn children(&self) -> &[ChildMotion] {
        &self.children
    }

    pub fn set_children(&mut self, children: Vec<ChildMotion>) {
        self.children = children;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionMode {
    If,
    IfNot,
    Greater,
    Less,
    Equals,
    NotEqual,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub mode: ConditionMode,
    pub parameter: String,
    pub threshold: f32,
}

impl Condition {
    pub fn new(mode: ConditionMode, parameter: impl Into<String>, threshold: f32) -> Self {
        Self {
            mode,
            parameter: parameter.into(),
            threshold,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransitionTarget {
    State(StateId),
    Machine(MachineId),
    Exit,
}

/// A transition never owns a motion; it only points back into the graph.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transition {
    pub destination: Option<TransitionTarget>,
    pub conditions: Vec<Condition>,
}

impl Transition {
    pub fn to(destination: TransitionTarget) -> Self {
        Self {
            destination: Some(destination),
            conditions: Vec::new(),
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DriverOp {
    #[default]
    Set,
    Add,
    Random,
    Copy,
}

/// One parameter write performed by a driver behaviour.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DriverEntry {
    pub op: DriverOp,
    pub name: String,
    pub source: Option<String>,
    pub source_parameter: Option<String>,
    pub value: f32,
}

/// Behaviour attached to a state or state machine that writes parameters on entry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterDriver {
    pub local_only: bool,
    pub entries: Vec<DriverEntry>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct State {
    pub name: String,
    pub motion: Option<Motion>,
    pub speed: f32,
    pub drivers: Vec<ParameterDriver>,
    transitions: Vec<Transition>,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            motion: None,
            speed: 1.0,
            drivers: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn with_motion(mut self, motion: Motion) -> Self {
        self.motion = Some(motion);
        self
    }

    pub fn with_driver(mut self, driver: ParameterDriver) -> Self {
        self.drivers.push(driver);
        self
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn set_transitions(&mut self, transitions: Vec<Transition>) {
        self.transitions = transitions;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StateMachine {
    pub name: String,
    pub default_state: Option<StateId>,
    pub drivers: Vec<ParameterDriver>,
    states: Vec<StateId>,
    machines: Vec<MachineId>,
    entry_transitions: Vec<Transition>,
    any_state_transitions: Vec<Transition>,
}

impl StateMachine {
    fn new(name: String) -> Self {
        Self {
            name,
            default_state: None,
            drivers: Vec::new(),
            states: Vec::new(),
            machines: Vec::new(),
            entry_transitions: Vec::new(),
            any_state_transitions: Vec::new(),
        }
    }

    pub fn states(&self) -> &[StateId] {
        &self.states
    }

    pub fn set_states(&mut self, states: Vec<StateId>) {
        self.states = states;
    }

    pub fn child_machines(&self) -> &[MachineId] {
        &self.machines
    }

    pub fn set_child_machines(&mut self, machines: Vec<MachineId>) {
        self.machines = machines;
    }

    pub fn entry_transitions(&self) -> &[Transition] {
        &self.entry_transitions
    }

    pub fn set_entry_transitions(&mut self, transitions: Vec<Transition>) {
        self.entry_transitions = transitions;
    }

    pub fn any_state_transitions(&self) -> &[Transition] {
        &self.any_state_transitions
    }

    pub fn set_any_state_transitions(&mut self, transitions: Vec<Transition>) {
        self.any_state_transitions = transitions;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub name: String,
    pub state_machine: MachineId,
    pub weight: f32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterKind {
    #[default]
    Float,
    Int,
    Bool,
    Trigger,
}

/// Controller-level parameter declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    pub default: f32,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: 0.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Controller {
    pub name: String,
    layers: Vec<Layer>,
    parameters: Vec<Parameter>,
    machines: IndexMap<MachineId, StateMachine>,
    states: IndexMap<StateId, State>,
    trees: IndexMap<TreeId, BlendTree>,
    ids: IdAllocator,
}

impl Controller {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Append a layer with a fresh root state machine named after it.
    pub fn add_layer(&mut self, name: impl Into<String>) -> MachineId {
        let name = name.into();
        let root = self.ids.alloc_machine();
        self.machines.insert(root, StateMachine::new(name.clone()));
        self.layers.push(Layer {
            name,
            state_machine: root,
            weight: 1.0,
        });
        root
    }

    /// Create a sub-machine nested under `parent`. `None` if the parent does not exist.
    pub fn add_child_machine(
        &mut self,
        parent: MachineId,
        name: impl Into<String>,
    ) -> Option<MachineId> {
        if !self.machines.contains_key(&parent) {
            return None;
        }
        let id = self.ids.alloc_machine();
        self.machines.insert(id, StateMachine::new(name.into()));
        if let Some(p) = self.machines.get_mut(&parent) {
            p.machines.push(id);
        }
        Some(id)
    }

    /// Add a state to `machine`. The first state added becomes the default state.
    pub fn add_state(&mut self, machine: MachineId, state: State) -> Option<StateId> {
        if !self.machines.contains_key(&machine) {
            return None;
        }
        let id = self.ids.alloc_state();
        self.states.insert(id, state);
        if let Some(m) = self.machines.get_mut(&machine) {
            m.states.push(id);
            if m.default_state.is_none() {
                m.default_state = Some(id);
            }
        }
        Some(id)
    }

    pub fn add_tree(&mut self, tree: BlendTree) -> TreeId {
        let id = self.ids.alloc_tree();
        self.trees.insert(id, tree);
        id
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn machine(&self, id: MachineId) -> Option<&StateMachine> {
        self.machines.get(&id)
    }

    pub fn machine_mut(&mut self, id: MachineId) -> Option<&mut StateMachine> {
        self.machines.get_mut(&id)
    }

    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.get(&id)
    }

    pub fn state_mut(&mut self, id: StateId) -> Option<&mut State> {
        self.states.get_mut(&id)
    }

    /// Remove a state from the arena and from whichever machine lists it.
    pub fn remove_state(&mut self, id: StateId) -> Option<State> {
        for m in self.machines.values_mut() {
            m.states.retain(|s| *s != id);
            if m.default_state == Some(id) {
                m.default_state = m.states.first().copied();
            }
        }
        self.states.shift_remove(&id)
    }

    pub fn tree(&self, id: TreeId) -> Option<&BlendTree> {
        self.trees.get(&id)
    }

    pub fn tree_mut(&mut self, id: TreeId) -> Option<&mut BlendTree> {
        self.trees.get_mut(&id)
    }

    /// Replace a state's motion. Returns false if the state does not exist.
    pub fn set_motion(&mut self, state: StateId, motion: Option<Motion>) -> bool {
        match self.states.get_mut(&state) {
            Some(s) => {
                s.motion = motion;
                true
            }
            None => false,
        }
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn set_parameters(&mut self, parameters: Vec<Parameter>) {
        self.parameters = parameters;
    }

    pub fn add_parameter(&mut self, parameter: Parameter) {
        self.parameters.push(parameter);
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &State)> {
        self.states.iter().map(|(id, s)| (*id, s))
    }

    /// Distinct clips reachable from every layer, in discovery order.
    pub fn animation_clips(&self) -> Vec<ClipId> {
        let mut seen = indexmap::IndexSet::new();
        for usage in crate::traverse::enumerate_motion_usages(self) {
            seen.insert(usage.clip);
        }
        seen.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_state_becomes_default() {
        let mut c = Controller::new("FX");
        let root = c.add_layer("Base");
        let a = c.add_state(root, State::new("A")).unwrap();
        let _b = c.add_state(root, State::new("B")).unwrap();
        assert_eq!(c.machine(root).unwrap().default_state, Some(a));
        assert_eq!(c.machine(root).unwrap().states().len(), 2);
    }

    #[test]
    fn add_to_missing_machine_is_rejected() {
        let mut c = Controller::new("FX");
        assert!(c.add_state(MachineId(9), State::new("A")).is_none());
        assert!(c.add_child_machine(MachineId(9), "Sub").is_none());
    }

    #[test]
    fn children_round_trip_preserves_untouched_fields() {
        let mut c = Controller::new("FX");
        let t = c.add_tree(BlendTree::new("Move", "Speed").with_children(vec![
            ChildMotion::new(Motion::Clip(ClipId(0))).with_threshold(0.25),
            ChildMotion::new(Motion::Clip(ClipId(1)))
                .with_threshold(0.75)
                .with_direct_parameter("W"),
        ]));
        let mut children = c.tree(t).unwrap().children().to_vec();
        children[0].motion = Some(Motion::Clip(ClipId(5)));
        c.tree_mut(t).unwrap().set_children(children);

        let after = c.tree(t).unwrap().children();
        assert_eq!(after[0].motion, Some(Motion::Clip(ClipId(5))));
        assert_eq!(after[0].threshold, 0.25);
        assert_eq!(after[1].threshold, 0.75);
        assert_eq!(after[1].direct_blend_parameter.as_deref(), Some("W"));
    }

    #[test]
    fn remove_state_detaches_from_machine() {
        let mut c = Controller::new("FX");
        let root = c.add_layer("Base");
        let a = c.add_state(root, State::new("A")).unwrap();
        let b = c.add_state(root, State::new("B")).unwrap();
        assert!(c.remove_state(a).is_some());
        assert_eq!(c.machine(root).unwrap().states(), &[b]);
        assert_eq!(c.machine(root).unwrap().default_state, Some(b));
    }
}
