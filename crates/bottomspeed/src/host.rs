//! Seams to the slicing application that hosts the patcher.
//!
//! The host drives two events:
//! - a definition container finished loading, which is when the four
//!   option definitions get registered under its `speed` category;
//! - a write is about to start, which is when the plate output is patched.
//!
//! Both are modelled as narrow traits so the patcher holds no global state
//! and can be driven by any host (the CLI, tests, an embedding app).

use crate::patcher::{patch_plates, PatchOutcome, PlateOutput};
use crate::settings::{
    setting_definitions, BottomSpeedSettings, SettingDefinition, SettingValue, SPEED_CATEGORY,
};

/// Read access to the active global settings stack.
pub trait GlobalStack {
    /// Current value of `key`, or `None` if the stack does not define it.
    fn property(&self, key: &str) -> Option<SettingValue>;
}

/// The host scene holding the sliced output.
pub trait Scene {
    /// A copy of the current per-plate G-code, if any was produced.
    fn plate_output(&self) -> Option<PlateOutput>;

    /// Replace the per-plate G-code.
    fn set_plate_output(&mut self, output: PlateOutput);
}

/// A loaded settings definition container (printer or extruder profile).
pub trait DefinitionContainer {
    /// Is this an extruder definition?
    fn is_extruder(&self) -> bool;

    /// Does the container define a setting or category with this key?
    fn has_definition(&self, key: &str) -> bool;

    /// Append `definition` as the last child of `category` and register it
    /// in the container's definition cache.
    fn append_definition(&mut self, category: &str, definition: SettingDefinition);
}

/// Lookup of containers by id.
pub trait ContainerRegistry {
    /// Container type handed out by the registry.
    type Container: DefinitionContainer;

    /// Has the container finished loading successfully?
    fn is_loaded(&self, id: &str) -> bool;

    /// The definition container with this id, or `None` if it no longer
    /// exists or is not a definition container.
    fn definition_container_mut(&mut self, id: &str) -> Option<&mut Self::Container>;
}

/// The patcher as a host plugin.
#[derive(Debug, Clone)]
pub struct BottomSpeedPlugin {
    definitions: Vec<SettingDefinition>,
}

impl Default for BottomSpeedPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl BottomSpeedPlugin {
    /// Plugin carrying the four standard option definitions.
    pub fn new() -> Self {
        Self {
            definitions: setting_definitions(),
        }
    }

    /// Option definitions this plugin registers.
    pub fn definitions(&self) -> &[SettingDefinition] {
        &self.definitions
    }

    /// Container-load-complete hook.
    ///
    /// Adds the option definitions to printer definitions that have a
    /// `speed` category and none of the keys yet. Returns whether anything
    /// was added.
    pub fn on_container_load_complete<R: ContainerRegistry + ?Sized>(
        &self,
        registry: &mut R,
        container_id: &str,
    ) -> bool {
        if !registry.is_loaded(container_id) {
            return false;
        }
        let Some(container) = registry.definition_container_mut(container_id) else {
            return false;
        };
        if container.is_extruder() {
            return false;
        }
        if !container.has_definition(SPEED_CATEGORY) {
            return false;
        }
        if self
            .definitions
            .iter()
            .any(|definition| container.has_definition(&definition.key))
        {
            return false;
        }

        for definition in &self.definitions {
            container.append_definition(SPEED_CATEGORY, definition.clone());
        }
        log::debug!("registered bottom-speed settings on {container_id}");
        true
    }

    /// Write-started hook.
    ///
    /// Patches the scene's plate output with the stack's current settings
    /// and stores it back only if a plate changed.
    pub fn on_write_started<S, C>(&self, stack: Option<&S>, scene: &mut C) -> PatchOutcome
    where
        S: GlobalStack + ?Sized,
        C: Scene + ?Sized,
    {
        let Some(stack) = stack else {
            return PatchOutcome::default();
        };
        let settings = BottomSpeedSettings::from_stack(stack);
        if !settings.enabled {
            return PatchOutcome::default();
        }

        let mut output = match scene.plate_output() {
            Some(output) if !output.is_empty() => output,
            _ => {
                log::warn!("scene has no gcode to process");
                return PatchOutcome::default();
            }
        };

        let outcome = patch_plates(&mut output, &settings);
        if outcome.changed() {
            scene.set_plate_output(output);
        }
        outcome
    }
}
