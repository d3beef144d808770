#![warn(missing_docs)]

//! First-layer and bottom-infill speed patching for sliced G-code.
//!
//! The slicer emits one G-code chunk list per build plate. Right before
//! the output is written, [`patch_plates`] walks each plate once and
//! overwrites the feed rate of `G1 F…` moves that belong to
//! - skin and wall sections of the initial layer, and
//! - skin sections of layer 1 up to its first fill section.
//!
//! A `;FAST_BOTTOM_INFILL` marker is appended to chunk 0 of every patched
//! plate, so running the pass again is a no-op.
//!
//! # Example
//!
//! ```
//! use bottomspeed::{patch_plate, BottomSpeedSettings};
//!
//! let settings = BottomSpeedSettings {
//!     enabled: true,
//!     first_layer_infill_speed: 50.0,
//!     first_layer_wall_speed: 0.0,
//!     bottom_infill_speed: 40.0,
//! };
//!
//! let mut chunks = vec![
//!     ";FLAVOR:Marlin\n".to_string(),
//!     ";LAYER_COUNT:2\n".to_string(),
//!     ";LAYER:0\n;TYPE:SKIN\nG1 F1200 X1 Y1\n".to_string(),
//! ];
//! assert!(patch_plate(&mut chunks, &settings).is_patched());
//! assert!(chunks[2].contains("G1 F3000 X1 Y1"));
//! ```

pub mod error;
pub mod gcode;
pub mod host;
pub mod patcher;
pub mod settings;

pub use error::{BottomSpeedError, Result};
pub use gcode::LineKind;
pub use host::{BottomSpeedPlugin, ContainerRegistry, DefinitionContainer, GlobalStack, Scene};
pub use patcher::{
    patch_plate, patch_plates, PatchOutcome, Phase, PlateId, PlateOutput, PlateStatus,
};
pub use settings::{
    setting_definitions, BottomSpeedSettings, ProfileStack, SettingDefinition, SettingType,
    SettingValue,
};
