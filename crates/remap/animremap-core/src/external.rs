//! Parameter references that live outside the controllers: expression parameters and the
//! expressions menu tree.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::graph::Controller;
use crate::ids::{IdAllocator, MenuId};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpressionValueType {
    Int,
    #[default]
    Float,
    Bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionParameter {
    pub name: String,
    #[serde(default)]
    pub value_type: ExpressionValueType,
    #[serde(default)]
    pub default_value: f32,
    #[serde(default = "default_saved")]
    pub saved: bool,
}

fn default_saved() -> bool {
    true
}

impl ExpressionParameter {
    pub fn new(name: impl Into<String>, value_type: ExpressionValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            default_value: 0.0,
            saved: true,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlKind {
    #[default]
    Button,
    Toggle,
    SubMenu,
    TwoAxisPuppet,
    FourAxisPuppet,
    RadialPuppet,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MenuControl {
    pub name: String,
    pub kind: ControlKind,
    pub parameter: Option<String>,
    pub sub_parameters: Vec<String>,
    pub sub_menu: Option<MenuId>,
    pub value: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Menu {
    pub name: String,
    controls: Vec<MenuControl>,
}

impl Menu {
    pub fn controls(&self) -> &[MenuControl] {
        &self.controls
    }

    pub fn set_controls(&mut self, controls: Vec<MenuControl>) {
        self.controls = controls;
    }
}

/// Menu assets keyed by identity. Sub-menu references may in principle form cycles.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MenuLibrary {
    menus: IndexMap<MenuId, Menu>,
    ids: IdAllocator,
}

impl MenuLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, name: impl Into<String>, controls: Vec<MenuControl>) -> MenuId {
        let id = self.ids.alloc_menu();
        self.menus.insert(
            id,
            Menu {
                name: name.into(),
                controls,
            },
        );
        id
    }

    pub fn get(&self, id: MenuId) -> Option<&Menu> {
        self.menus.get(&id)
    }

    pub fn get_mut(&mut self, id: MenuId) -> Option<&mut Menu> {
        self.menus.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.menus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.menus.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExternalSites {
    pub expression_parameters: Vec<ExpressionParameter>,
    pub root_menu: Option<MenuId>,
    pub menus: MenuLibrary,
}

/// Everything the parameter renamer touches: the base-layer controllers plus external sites.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Avatar {
    pub name: String,
    pub controllers: Vec<Controller>,
    pub external: ExternalSites,
}
