//! Animremap Core (engine-agnostic)
//!
//! Finds and rewrites references inside layered animation controllers: skeleton paths in
//! clip curve bindings, clips used by states and blend trees, and parameter names used by
//! transitions, blend trees, drivers and expression menus. Every operation is a three
//! stage pipeline: traverse the graph into usage sites, index them by identifier, then
//! apply a remap batch in one pass. Persistence stays with the host through the
//! [`store`] collaborators.

pub mod clip;
pub mod config;
pub mod error;
pub mod external;
pub mod graph;
pub mod ids;
pub mod index;
pub mod rewrite;
pub mod session;
pub mod skeleton;
pub mod store;
pub mod stored_controller;
pub mod template;
pub mod transform;
pub mod traverse;

// Re-exports for hosts
pub use clip::{
    Clip, ClipLibrary, Curve, CurveBinding, Keyframe, ObjectReferenceKeyframe, ANIMATOR_TYPE,
};
pub use config::Config;
pub use error::{LoadError, RemapError, SiteIssue, StoreError};
pub use external::{
    Avatar, ControlKind, ExpressionParameter, ExpressionValueType, ExternalSites, Menu,
    MenuControl, MenuLibrary,
};
pub use graph::{
    BlendTree, BlendType, ChildMotion, Condition, ConditionMode, Controller, DriverEntry,
    DriverOp, Layer, Motion, Parameter, ParameterDriver, ParameterKind, State, StateMachine,
    Transition, TransitionTarget,
};
pub use ids::{ClipId, MachineId, MenuId, NodeId, StateId, TreeId};
pub use index::{MotionIndex, ParameterIndex, PathIndex, PathKey, PathUsage};
pub use rewrite::{
    rewrite_motions, rewrite_parameters, rewrite_paths, ClipKey, ClipTarget, RemapBatch,
    RemapReport,
};
pub use session::{
    apply_template, rename_parameters, repath, replace_clips, SessionOutcome, Verification,
};
pub use skeleton::{parse_skeleton_json, Skeleton, SkeletonMap};
pub use store::{ClipAssetStore, EditBatch, MemoryClipStore, PersistenceGate, RecordingGate};
pub use stored_controller::{parse_stored_avatar_json, parse_stored_controller_json};
pub use template::{Template, TemplateAssignment, TemplateIndex};
pub use transform::{ClipTransform, TransformRegistry};
pub use traverse::{
    enumerate_curve_usages, enumerate_motion_usages, enumerate_parameter_usages, CurveUsage,
    MotionUsage, ParameterSite, ParameterUsage,
};
