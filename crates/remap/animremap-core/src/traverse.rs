//! Traversal engine: flattens the motion graph into streams of typed usage sites.
//!
//! State-machine nesting is walked breadth-first with an explicit queue; blend trees are
//! flattened recursively. Every walk tracks visited identities so shared or (malformed)
//! cyclic structures are visited once and always terminate.

use std::collections::VecDeque;

use hashbrown::HashSet;
use log::{debug, warn};

use crate::clip::{ClipLibrary, CurveBinding};
use crate::external::ExternalSites;
use crate::graph::{Controller, Motion, ParameterDriver, Transition};
use crate::ids::{ClipId, MachineId, MenuId, StateId, TreeId};

/// A curve binding together with the clip that owns it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurveUsage {
    pub clip: ClipId,
    pub binding: CurveBinding,
}

/// A clip reached from a state, directly or through nested blend trees.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MotionUsage {
    pub clip: ClipId,
    pub state: StateId,
}

/// Which transition list of the graph a condition lives in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TransitionSite {
    Entry { machine: MachineId, index: usize },
    AnyState { machine: MachineId, index: usize },
    State { state: StateId, index: usize },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DriverOwner {
    State(StateId),
    Machine(MachineId),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DriverField {
    Name,
    Source,
    SourceParameter,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlendAxis {
    Primary,
    Secondary,
}

/// A single field that references a parameter by name. `controller` indexes
/// [`crate::external::Avatar::controllers`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParameterSite {
    Condition {
        controller: usize,
        transition: TransitionSite,
        condition: usize,
    },
    BlendParameter {
        controller: usize,
        tree: TreeId,
        axis: BlendAxis,
    },
    DirectBlendParameter {
        controller: usize,
        tree: TreeId,
        child: usize,
    },
    Driver {
        controller: usize,
        owner: DriverOwner,
        driver: usize,
        entry: usize,
        field: DriverField,
    },
    Declaration {
        controller: usize,
        index: usize,
    },
    ExpressionParameter {
        index: usize,
    },
    MenuControl {
        menu: MenuId,
        control: usize,
    },
    MenuSubParameter {
        menu: MenuId,
        control: usize,
        sub: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterUsage {
    pub name: String,
    pub site: ParameterSite,
}

/// All state machines reachable from the layers, breadth-first, each exactly once.
pub fn machines_in_order(controller: &Controller) -> Vec<MachineId> {
    machines_from(controller, controller.layers().iter().map(|l| l.state_machine))
}

/// All state machines reachable from `roots`, breadth-first, each exactly once.
pub fn machines_from(
    controller: &Controller,
    roots: impl IntoIterator<Item = MachineId>,
) -> Vec<MachineId> {
    let mut queue: VecDeque<MachineId> = roots.into_iter().collect();
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        let Some(machine) = controller.machine(id) else {
            warn!("state machine {id:?} referenced but missing");
            continue;
        };
        order.push(id);
        queue.extend(machine.child_machines().iter().copied());
    }
    order
}

/// Every (machine, state) pair reachable from the layers, in BFS machine order.
pub fn states_in_order(controller: &Controller) -> Vec<(MachineId, StateId)> {
    states_from(controller, machines_in_order(controller))
}

fn states_from(controller: &Controller, machines: Vec<MachineId>) -> Vec<(MachineId, StateId)> {
    let mut out = Vec::new();
    for machine_id in machines {
        if let Some(machine) = controller.machine(machine_id) {
            out.extend(machine.states().iter().map(|s| (machine_id, *s)));
        }
    }
    out
}

/// Clips under `motion`, depth-first, left to right. A clip listed twice yields twice.
pub fn flatten_clips(controller: &Controller, motion: Option<Motion>) -> Vec<ClipId> {
    let mut out = Vec::new();
    if let Some(m) = motion {
        collect_clips(controller, m, &mut HashSet::new(), &mut out);
    }
    out
}

fn collect_clips(
    controller: &Controller,
    motion: Motion,
    visited: &mut HashSet<TreeId>,
    out: &mut Vec<ClipId>,
) {
    match motion {
        Motion::Clip(c) => out.push(c),
        Motion::Tree(t) => {
            if !visited.insert(t) {
                return;
            }
            let Some(tree) = controller.tree(t) else {
                return;
            };
            for child in tree.children() {
                if let Some(m) = child.motion {
                    collect_clips(controller, m, visited, out);
                }
            }
        }
    }
}

/// Blend trees under `motion`, breadth-first, skipping trees already in `visited`.
pub fn trees_under(
    controller: &Controller,
    motion: Option<Motion>,
    visited: &mut HashSet<TreeId>,
) -> Vec<TreeId> {
    let mut order = Vec::new();
    let mut queue: VecDeque<TreeId> = motion.and_then(|m| m.as_tree()).into_iter().collect();
    while let Some(t) = queue.pop_front() {
        if !visited.insert(t) {
            continue;
        }
        let Some(tree) = controller.tree(t) else {
            continue;
        };
        order.push(t);
        queue.extend(tree.children().iter().filter_map(|c| c.motion?.as_tree()));
    }
    order
}

/// Every curve binding with a non-empty path of every clip reachable from the controller.
pub fn enumerate_curve_usages(
    controller: &Controller,
    clips: &ClipLibrary,
    include_object_references: bool,
) -> Vec<CurveUsage> {
    let mut out = Vec::new();
    for clip_id in controller.animation_clips() {
        let Some(clip) = clips.get(clip_id) else {
            warn!("clip {clip_id:?} used by '{}' is missing", controller.name);
            continue;
        };
        let bindings = if include_object_references {
            clip.all_bindings()
        } else {
            clip.curve_bindings()
        };
        out.extend(
            bindings
                .into_iter()
                .filter(|b| !b.path.is_empty())
                .map(|binding| CurveUsage {
                    clip: clip_id,
                    binding,
                }),
        );
    }
    debug!("'{}': {} curve usages", controller.name, out.len());
    out
}

/// Every (clip, owning state) pair. A clip used by several states yields one pair per state.
pub fn enumerate_motion_usages(controller: &Controller) -> Vec<MotionUsage> {
    motion_usages_in(controller, states_in_order(controller))
}

/// Motion usages restricted to the machines reachable from `roots`.
pub fn enumerate_motion_usages_from(
    controller: &Controller,
    roots: impl IntoIterator<Item = MachineId>,
) -> Vec<MotionUsage> {
    motion_usages_in(controller, states_from(controller, machines_from(controller, roots)))
}

fn motion_usages_in(
    controller: &Controller,
    states: Vec<(MachineId, StateId)>,
) -> Vec<MotionUsage> {
    let mut out = Vec::new();
    for (_, state_id) in states {
        let Some(state) = controller.state(state_id) else {
            continue;
        };
        for clip in flatten_clips(controller, state.motion) {
            out.push(MotionUsage {
                clip,
                state: state_id,
            });
        }
    }
    out
}

/// Every parameter reference in the controllers and the external sites.
/// Empty names are not references and are skipped.
pub fn enumerate_parameter_usages(
    controllers: &[Controller],
    external: &ExternalSites,
) -> Vec<ParameterUsage> {
    let mut out = Vec::new();
    for (index, controller) in controllers.iter().enumerate() {
        controller_parameter_usages(index, controller, &mut out);
    }
    external_parameter_usages(external, &mut out);
    debug!("{} parameter usages", out.len());
    out
}

fn push(out: &mut Vec<ParameterUsage>, name: &str, site: ParameterSite) {
    if !name.is_empty() {
        out.push(ParameterUsage {
            name: name.to_string(),
            site,
        });
    }
}

fn transition_usages(
    controller: usize,
    transitions: &[Transition],
    site: impl Fn(usize) -> TransitionSite,
    out: &mut Vec<ParameterUsage>,
) {
    for (index, transition) in transitions.iter().enumerate() {
        for (condition, c) in transition.conditions.iter().enumerate() {
            push(
                out,
                &c.parameter,
                ParameterSite::Condition {
                    controller,
                    transition: site(index),
                    condition,
                },
            );
        }
    }
}

fn driver_usages(
    controller: usize,
    owner: DriverOwner,
    drivers: &[ParameterDriver],
    out: &mut Vec<ParameterUsage>,
) {
    for (driver, d) in drivers.iter().enumerate() {
        for (entry, e) in d.entries.iter().enumerate() {
            let fields = [
                (Some(e.name.as_str()), DriverField::Name),
                (e.source.as_deref(), DriverField::Source),
                (e.source_parameter.as_deref(), DriverField::SourceParameter),
            ];
            for (value, field) in fields {
                if let Some(name) = value {
                    push(
                        out,
                        name,
                        ParameterSite::Driver {
                            controller,
                            owner,
                            driver,
                            entry,
                            field,
                        },
                    );
                }
            }
        }
    }
}

fn controller_parameter_usages(index: usize, c: &Controller, out: &mut Vec<ParameterUsage>) {
    for (i, p) in c.parameters().iter().enumerate() {
        push(
            out,
            &p.name,
            ParameterSite::Declaration {
                controller: index,
                index: i,
            },
        );
    }

    let mut visited_trees = HashSet::new();
    for machine_id in machines_in_order(c) {
        let Some(machine) = c.machine(machine_id) else {
            continue;
        };
        transition_usages(
            index,
            machine.entry_transitions(),
            |i| TransitionSite::Entry {
                machine: machine_id,
                index: i,
            },
            out,
        );
        transition_usages(
            index,
            machine.any_state_transitions(),
            |i| TransitionSite::AnyState {
                machine: machine_id,
                index: i,
            },
            out,
        );
        driver_usages(index, DriverOwner::Machine(machine_id), &machine.drivers, out);

        for &state_id in machine.states() {
            let Some(state) = c.state(state_id) else {
                continue;
            };
            transition_usages(
                index,
                state.transitions(),
                |i| TransitionSite::State {
                    state: state_id,
                    index: i,
                },
                out,
            );
            driver_usages(index, DriverOwner::State(state_id), &state.drivers, out);

            for tree_id in trees_under(c, state.motion, &mut visited_trees) {
                let Some(tree) = c.tree(tree_id) else {
                    continue;
                };
                push(
                    out,
                    &tree.blend_parameter,
                    ParameterSite::BlendParameter {
                        controller: index,
                        tree: tree_id,
                        axis: BlendAxis::Primary,
                    },
                );
                if let Some(y) = &tree.blend_parameter_y {
                    push(
                        out,
                        y,
                        ParameterSite::BlendParameter {
                            controller: index,
                            tree: tree_id,
                            axis: BlendAxis::Secondary,
                        },
                    );
                }
                for (child, cm) in tree.children().iter().enumerate() {
                    if let Some(p) = &cm.direct_blend_parameter {
                        push(
                            out,
                            p,
                            ParameterSite::DirectBlendParameter {
                                controller: index,
                                tree: tree_id,
                                child,
                            },
                        );
                    }
                }
            }
        }
    }
}

/// Menus reachable from the root menu, breadth-first, each exactly once.
pub fn menus_in_order(external: &ExternalSites) -> Vec<MenuId> {
    let mut queue: VecDeque<MenuId> = external.root_menu.into_iter().collect();
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        let Some(menu) = external.menus.get(id) else {
            continue;
        };
        order.push(id);
        queue.extend(menu.controls().iter().filter_map(|c| c.sub_menu));
    }
    order
}

fn external_parameter_usages(external: &ExternalSites, out: &mut Vec<ParameterUsage>) {
    for (index, p) in external.expression_parameters.iter().enumerate() {
        push(out, &p.name, ParameterSite::ExpressionParameter { index });
    }
    for menu_id in menus_in_order(external) {
        let Some(menu) = external.menus.get(menu_id) else {
            continue;
        };
        for (control, c) in menu.controls().iter().enumerate() {
            if let Some(p) = &c.parameter {
                push(
                    out,
                    p,
                    ParameterSite::MenuControl {
                        menu: menu_id,
                        control,
                    },
                );
            }
            for (sub, s) in c.sub_parameters.iter().enumerate() {
                push(
                    out,
                    s,
                    ParameterSite::MenuSubParameter {
                        menu: menu_id,
                        control,
                        sub,
                    },
                );
            }
        }
    }
}
