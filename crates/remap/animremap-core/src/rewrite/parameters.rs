use indexmap::{IndexMap, IndexSet};
use log::{info, warn};

use crate::error::SiteIssue;
use crate::external::Avatar;
use crate::graph::{Controller, Transition};
use crate::index::ParameterIndex;
use crate::traverse::{BlendAxis, DriverField, DriverOwner, ParameterSite, TransitionSite};

use super::{RemapBatch, RemapReport};

/// Rename parameters at every indexed site. Matching is exact; `SpeedMax` is never touched
/// by a `Speed` entry.
///
/// Every site is re-read live and rewritten in one pass before the report is returned.
/// A site that no longer exists, or no longer holds one of the remapped names, is reported
/// as stale.
pub fn rewrite_parameters(
    avatar: &mut Avatar,
    index: &ParameterIndex,
    batch: RemapBatch<String, String>,
) -> RemapReport {
    let mut report = RemapReport::default();
    let mut names: IndexMap<String, String> = IndexMap::new();
    let mut sites: IndexSet<ParameterSite> = IndexSet::new();

    for (old, new) in batch.chosen() {
        if old == new {
            continue;
        }
        if new.is_empty() {
            warn!("empty replacement for parameter '{old}'; entry ignored");
            continue;
        }
        if let Some(found) = index.sites_for(old) {
            sites.extend(found.iter().copied());
            names.insert(old.clone(), new.clone());
        }
    }

    for site in &sites {
        match rewrite_site(avatar, *site, &names) {
            Some(true) => report.rewritten += 1,
            _ => {
                warn!("parameter site {site:?} is stale; skipped");
                report.issues.push(SiteIssue::StaleParameterSite(*site));
            }
        }
    }

    info!(
        "parameter rewrite: {} fields for {} names, {} issues",
        report.rewritten,
        names.len(),
        report.issues.len()
    );
    report
}

fn rename(slot: &mut String, names: &IndexMap<String, String>) -> bool {
    match names.get(slot.as_str()) {
        Some(new) => {
            *slot = new.clone();
            true
        }
        None => false,
    }
}

fn rename_opt(slot: &mut Option<String>, names: &IndexMap<String, String>) -> bool {
    slot.as_mut().is_some_and(|s| rename(s, names))
}

/// `None` when the site no longer exists; otherwise whether a field was rewritten.
fn rewrite_site(
    avatar: &mut Avatar,
    site: ParameterSite,
    names: &IndexMap<String, String>,
) -> Option<bool> {
    match site {
        ParameterSite::Condition {
            controller,
            transition,
            condition,
        } => {
            let c = avatar.controllers.get_mut(controller)?;
            edit_transition(c, transition, |t| {
                t.conditions
                    .get_mut(condition)
                    .map(|cond| rename(&mut cond.parameter, names))
            })
        }
        ParameterSite::BlendParameter {
            controller,
            tree,
            axis,
        } => {
            let tree = avatar.controllers.get_mut(controller)?.tree_mut(tree)?;
            Some(match axis {
                BlendAxis::Primary => rename(&mut tree.blend_parameter, names),
                BlendAxis::Secondary => rename_opt(&mut tree.blend_parameter_y, names),
            })
        }
        ParameterSite::DirectBlendParameter {
            controller,
            tree,
            child,
        } => {
            let tree = avatar.controllers.get_mut(controller)?.tree_mut(tree)?;
            let mut children = tree.children().to_vec();
            let changed = rename_opt(&mut children.get_mut(child)?.direct_blend_parameter, names);
            if changed {
                tree.set_children(children);
            }
            Some(changed)
        }
        ParameterSite::Driver {
            controller,
            owner,
            driver,
            entry,
            field,
        } => {
            let c = avatar.controllers.get_mut(controller)?;
            let drivers = match owner {
                DriverOwner::State(s) => &mut c.state_mut(s)?.drivers,
                DriverOwner::Machine(m) => &mut c.machine_mut(m)?.drivers,
            };
            let entry = drivers.get_mut(driver)?.entries.get_mut(entry)?;
            Some(match field {
                DriverField::Name => rename(&mut entry.name, names),
                DriverField::Source => rename_opt(&mut entry.source, names),
                DriverField::SourceParameter => rename_opt(&mut entry.source_parameter, names),
            })
        }
        ParameterSite::Declaration { controller, index } => {
            let c = avatar.controllers.get_mut(controller)?;
            let mut parameters = c.parameters().to_vec();
            let changed = rename(&mut parameters.get_mut(index)?.name, names);
            if changed {
                c.set_parameters(parameters);
            }
            Some(changed)
        }
        ParameterSite::ExpressionParameter { index } => {
            let p = avatar.external.expression_parameters.get_mut(index)?;
            Some(rename(&mut p.name, names))
        }
        ParameterSite::MenuControl { menu, control } => {
            let menu = avatar.external.menus.get_mut(menu)?;
            let mut controls = menu.controls().to_vec();
            let changed = rename_opt(&mut controls.get_mut(control)?.parameter, names);
            if changed {
                menu.set_controls(controls);
            }
            Some(changed)
        }
        ParameterSite::MenuSubParameter { menu, control, sub } => {
            let menu = avatar.external.menus.get_mut(menu)?;
            let mut controls = menu.controls().to_vec();
            let changed = rename(
                controls.get_mut(control)?.sub_parameters.get_mut(sub)?,
                names,
            );
            if changed {
                menu.set_controls(controls);
            }
            Some(changed)
        }
    }
}

/// Copy the transition list holding `site`, edit one transition and write the list back.
fn edit_transition(
    controller: &mut Controller,
    site: TransitionSite,
    edit: impl FnOnce(&mut Transition) -> Option<bool>,
) -> Option<bool> {
    match site {
        TransitionSite::Entry { machine, index } => {
            let m = controller.machine_mut(machine)?;
            let mut list = m.entry_transitions().to_vec();
            let changed = edit(list.get_mut(index)?)?;
            if changed {
                m.set_entry_transitions(list);
            }
            Some(changed)
        }
        TransitionSite::AnyState { machine, index } => {
            let m = controller.machine_mut(machine)?;
            let mut list = m.any_state_transitions().to_vec();
            let changed = edit(list.get_mut(index)?)?;
            if changed {
                m.set_any_state_transitions(list);
            }
            Some(changed)
        }
        TransitionSite::State { state, index } => {
            let s = controller.state_mut(state)?;
            let mut list = s.transitions().to_vec();
            let changed = edit(list.get_mut(index)?)?;
            if changed {
                s.set_transitions(list);
            }
            Some(changed)
        }
    }
}
