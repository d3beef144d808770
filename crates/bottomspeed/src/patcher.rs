//! The bottom-speed pass over one plate's G-code chunks.
//!
//! A single left-to-right walk over every line of every chunk tracks which
//! part of the print the line belongs to and rewrites the feed rate of
//! `G1 F…` moves inside armed sections:
//!
//! | phase              | armed by                     | speed                        |
//! |--------------------|------------------------------|------------------------------|
//! | `InitialLayer`     | `;TYPE:SKIN`                 | `first_layer_infill_speed`   |
//! | `InitialLayer`     | `;TYPE:WALL-INNER/OUTER`     | `first_layer_wall_speed`     |
//! | `FirstBottomLayer` | `;TYPE:SKIN`                 | `bottom_infill_speed`        |
//! | `Done`             | -                            | -                            |
//!
//! `;LAYER:1` moves `InitialLayer` to `FirstBottomLayer`; the first
//! `;TYPE:FILL` after that moves to `Done`, and the rest of the plate is
//! left alone.

use std::collections::BTreeMap;

use crate::gcode::{
    has_layer_count, rewrite_feed_rate, LineKind, SectionType, LAYER_ZERO_LINE, PROCESSED_MARKER,
};
use crate::settings::BottomSpeedSettings;

/// Build plate identifier.
pub type PlateId = u32;

/// Plate id to ordered G-code chunks, as produced by the slicer.
pub type PlateOutput = BTreeMap<PlateId, Vec<String>>;

/// Where in the print the pass currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Layer 0.
    #[default]
    InitialLayer,
    /// Layer 1, before its first fill section.
    FirstBottomLayer,
    /// Past the first bottom-layer fill section.
    Done,
}

/// What happened to one plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlateStatus {
    /// The pass ran and the marker was appended.
    Patched {
        /// Number of lines whose feed rate was rewritten.
        rewritten_lines: usize,
    },
    /// The feature is switched off.
    Disabled,
    /// Fewer than two chunks, or chunk 1 has no layer count.
    NoLayers,
    /// Chunk 0 already carries the processing marker.
    AlreadyProcessed,
}

impl PlateStatus {
    /// Was the plate modified?
    pub fn is_patched(&self) -> bool {
        matches!(self, PlateStatus::Patched { .. })
    }
}

/// Result of a pass over all plates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    /// Plates that were modified, in id order.
    pub patched: Vec<PlateId>,
    /// Total rewritten lines across those plates.
    pub rewritten_lines: usize,
}

impl PatchOutcome {
    /// Did any plate change? Only then does the host need to store the
    /// output again.
    pub fn changed(&self) -> bool {
        !self.patched.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Armed {
    first_layer_infill: bool,
    first_layer_wall: bool,
    bottom_infill: bool,
}

/// Per-plate scanning state. Feed tokens are `None` for disabled roles.
struct PatchPass {
    phase: Phase,
    armed: Armed,
    first_layer_infill_feed: Option<String>,
    first_layer_wall_feed: Option<String>,
    bottom_infill_feed: Option<String>,
    rewritten_lines: usize,
}

impl PatchPass {
    fn new(settings: &BottomSpeedSettings) -> Self {
        Self {
            phase: Phase::InitialLayer,
            armed: Armed::default(),
            first_layer_infill_feed: settings.first_layer_infill_feed(),
            first_layer_wall_feed: settings.first_layer_wall_feed(),
            bottom_infill_feed: settings.bottom_infill_feed(),
            rewritten_lines: 0,
        }
    }

    fn advance(&mut self, kind: LineKind) {
        if self.phase == Phase::InitialLayer && kind == LineKind::LayerStart(1) {
            self.phase = Phase::FirstBottomLayer;
        }
        if self.phase == Phase::FirstBottomLayer
            && kind == LineKind::Section(SectionType::Fill)
        {
            self.phase = Phase::Done;
        }
    }

    /// Returns the rewritten line, or `None` to keep it as is.
    fn process_line(&mut self, line: &str) -> Option<String> {
        let kind = LineKind::classify(line);
        self.advance(kind);

        let rewritten = match self.phase {
            Phase::InitialLayer => {
                if let LineKind::Section(section) = kind {
                    self.armed.first_layer_infill =
                        section == SectionType::Skin && self.first_layer_infill_feed.is_some();
                    self.armed.first_layer_wall =
                        section.is_wall() && self.first_layer_wall_feed.is_some();
                }
                if kind != LineKind::FeedMove {
                    return None;
                }
                let feed = if self.armed.first_layer_infill {
                    self.first_layer_infill_feed.as_deref()
                } else if self.armed.first_layer_wall {
                    self.first_layer_wall_feed.as_deref()
                } else {
                    None
                };
                feed.and_then(|feed| rewrite_feed_rate(line, feed))
            }
            Phase::FirstBottomLayer => {
                if let LineKind::Section(section) = kind {
                    self.armed.bottom_infill =
                        section == SectionType::Skin && self.bottom_infill_feed.is_some();
                }
                if kind != LineKind::FeedMove || !self.armed.bottom_infill {
                    return None;
                }
                self.bottom_infill_feed
                    .as_deref()
                    .and_then(|feed| rewrite_feed_rate(line, feed))
            }
            Phase::Done => None,
        };

        if rewritten.is_some() {
            self.rewritten_lines += 1;
        }
        rewritten
    }

    fn process_chunk(&mut self, chunk: &mut String) {
        let mut out = String::with_capacity(chunk.len());
        let mut changed = false;
        for (i, line) in chunk.split('\n').enumerate() {
            if i > 0 {
                out.push('\n');
            }
            match self.process_line(line) {
                Some(rewritten) => {
                    out.push_str(&rewritten);
                    changed = true;
                }
                None => out.push_str(line),
            }
        }
        if changed {
            *chunk = out;
        }
    }
}

/// Move a layer-0 start that ended up inside the layer-count chunk into a
/// chunk of its own, inserted right after it.
///
/// Returns whether a split happened.
fn split_layer_zero(chunks: &mut Vec<String>) -> bool {
    let Some((head, tail)) = chunks[1].split_once(LAYER_ZERO_LINE) else {
        return false;
    };
    let layer_zero = format!("{LAYER_ZERO_LINE}{tail}");
    let head = head.to_string();
    chunks[1] = head;
    chunks.insert(2, layer_zero);
    true
}

/// Run the pass over one plate's chunks.
///
/// Leaves the chunks untouched unless the status is
/// [`PlateStatus::Patched`].
pub fn patch_plate(chunks: &mut Vec<String>, settings: &BottomSpeedSettings) -> PlateStatus {
    if !settings.enabled {
        return PlateStatus::Disabled;
    }
    if chunks.len() < 2 {
        return PlateStatus::NoLayers;
    }
    if chunks[0].contains(PROCESSED_MARKER) {
        return PlateStatus::AlreadyProcessed;
    }
    if !has_layer_count(&chunks[1]) {
        return PlateStatus::NoLayers;
    }

    if split_layer_zero(chunks) {
        log::debug!("moved layer 0 out of the layer-count chunk");
    }

    let mut pass = PatchPass::new(settings);
    for chunk in chunks.iter_mut() {
        pass.process_chunk(chunk);
    }
    chunks[0].push_str(PROCESSED_MARKER);

    PlateStatus::Patched {
        rewritten_lines: pass.rewritten_lines,
    }
}

/// Run the pass over every plate.
///
/// Plates are independent; skipped plates are logged and left as they are.
pub fn patch_plates(output: &mut PlateOutput, settings: &BottomSpeedSettings) -> PatchOutcome {
    let mut outcome = PatchOutcome::default();
    if !settings.enabled {
        return outcome;
    }

    for (&plate, chunks) in output.iter_mut() {
        match patch_plate(chunks, settings) {
            PlateStatus::Patched { rewritten_lines } => {
                log::info!("G-code {plate}: rewrote {rewritten_lines} feed rates");
                outcome.patched.push(plate);
                outcome.rewritten_lines += rewritten_lines;
            }
            PlateStatus::NoLayers => {
                log::warn!("G-code {plate} does not contain any layers");
            }
            PlateStatus::AlreadyProcessed => {
                log::debug!("G-code {plate} has already been processed");
            }
            PlateStatus::Disabled => {}
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(infill: f64, wall: f64, bottom: f64) -> BottomSpeedSettings {
        BottomSpeedSettings {
            enabled: true,
            first_layer_infill_speed: infill,
            first_layer_wall_speed: wall,
            bottom_infill_speed: bottom,
        }
    }

    fn chunks(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    const SCENARIO_A: &str = ";LAYER_COUNT:2\n;LAYER:0\n;TYPE:SKIN\nG1 F1200 X1 Y1\n;LAYER:1\n;TYPE:SKIN\nG1 F1200 X2 Y2\n;TYPE:FILL\nG1 F1200 X3 Y3\n";

    fn layered_plate() -> Vec<String> {
        chunks(&[
            ";FLAVOR:Marlin\n",
            ";LAYER_COUNT:3\n",
            ";LAYER:0\n;TYPE:WALL-OUTER\nG1 F1500 X0 Y0 E1\n;TYPE:WALL-INNER\nG1 F1800 X1 Y0 E2\n;TYPE:SKIN\nG1 F2100 X2 Y0 E3\n;TYPE:SKIRT\nG1 F2400 X3 Y0 E4\n",
            ";LAYER:1\n;TYPE:WALL-OUTER\nG1 F1500 X0 Y1 E5\n;TYPE:SKIN\nG1 F2100 X1 Y1 E6\n;TYPE:FILL\nG1 F2700 X2 Y1 E7\n",
            ";LAYER:2\n;TYPE:SKIN\nG1 F2100 X0 Y2 E8\n",
        ])
    }

    #[test]
    fn test_scenario_a() {
        let mut plate = chunks(&[";FLAVOR:Marlin\n", SCENARIO_A]);
        let status = patch_plate(&mut plate, &settings(50.0, 0.0, 40.0));

        assert_eq!(status, PlateStatus::Patched { rewritten_lines: 2 });
        assert_eq!(plate.len(), 3);
        assert_eq!(plate[0], ";FLAVOR:Marlin\n;FAST_BOTTOM_INFILL\n");
        assert_eq!(plate[1], ";LAYER_COUNT:2\n");
        assert_eq!(
            plate[2],
            ";LAYER:0\n;TYPE:SKIN\nG1 F3000 X1 Y1\n;LAYER:1\n;TYPE:SKIN\nG1 F2400 X2 Y2\n;TYPE:FILL\nG1 F1200 X3 Y3\n"
        );
    }

    #[test]
    fn test_second_run_is_noop() {
        let mut plate = chunks(&[";FLAVOR:Marlin\n", SCENARIO_A]);
        let settings = settings(50.0, 0.0, 40.0);
        assert!(patch_plate(&mut plate, &settings).is_patched());
        let once = plate.clone();

        assert_eq!(
            patch_plate(&mut plate, &settings),
            PlateStatus::AlreadyProcessed
        );
        assert_eq!(plate, once);
        assert_eq!(plate[0].matches(PROCESSED_MARKER).count(), 1);
    }

    #[test]
    fn test_single_chunk_untouched() {
        let mut plate = chunks(&[SCENARIO_A]);
        assert_eq!(
            patch_plate(&mut plate, &settings(50.0, 50.0, 50.0)),
            PlateStatus::NoLayers
        );
        assert_eq!(plate, chunks(&[SCENARIO_A]));
    }

    #[test]
    fn test_missing_layer_count_untouched() {
        let original = chunks(&[";FLAVOR:Marlin\n", ";LAYER:0\n;TYPE:SKIN\nG1 F1200 X1 Y1\n"]);
        let mut plate = original.clone();
        assert_eq!(
            patch_plate(&mut plate, &settings(50.0, 50.0, 50.0)),
            PlateStatus::NoLayers
        );
        assert_eq!(plate, original);
    }

    #[test]
    fn test_disabled_is_byte_identical() {
        let original = layered_plate();
        let mut plate = original.clone();
        let settings = BottomSpeedSettings {
            enabled: false,
            ..settings(50.0, 50.0, 50.0)
        };
        assert_eq!(patch_plate(&mut plate, &settings), PlateStatus::Disabled);
        assert_eq!(plate, original);
    }

    #[test]
    fn test_layer_zero_split_matches_separate_chunk() {
        let mut merged = chunks(&[
            ";FLAVOR:Marlin\n",
            ";LAYER_COUNT:2\n;LAYER:0\n;TYPE:SKIN\nG1 F1200 X1 Y1\n",
            ";LAYER:1\n;TYPE:SKIN\nG1 F1200 X2 Y2\n",
        ]);
        let mut separate = chunks(&[
            ";FLAVOR:Marlin\n",
            ";LAYER_COUNT:2\n",
            ";LAYER:0\n;TYPE:SKIN\nG1 F1200 X1 Y1\n",
            ";LAYER:1\n;TYPE:SKIN\nG1 F1200 X2 Y2\n",
        ]);
        let settings = settings(50.0, 0.0, 40.0);
        patch_plate(&mut merged, &settings);
        patch_plate(&mut separate, &settings);

        assert_eq!(merged, separate);
        assert_eq!(merged[2], ";LAYER:0\n;TYPE:SKIN\nG1 F3000 X1 Y1\n");
    }

    #[test]
    fn test_all_roles() {
        let mut plate = layered_plate();
        let status = patch_plate(&mut plate, &settings(50.0, 20.0, 40.0));
        assert_eq!(status, PlateStatus::Patched { rewritten_lines: 4 });

        assert_eq!(
            plate[2],
            ";LAYER:0\n;TYPE:WALL-OUTER\nG1 F1200 X0 Y0 E1\n;TYPE:WALL-INNER\nG1 F1200 X1 Y0 E2\n;TYPE:SKIN\nG1 F3000 X2 Y0 E3\n;TYPE:SKIRT\nG1 F2400 X3 Y0 E4\n"
        );
        // walls on layer 1 keep their speed, fill and later layers are done
        assert_eq!(
            plate[3],
            ";LAYER:1\n;TYPE:WALL-OUTER\nG1 F1500 X0 Y1 E5\n;TYPE:SKIN\nG1 F2400 X1 Y1 E6\n;TYPE:FILL\nG1 F2700 X2 Y1 E7\n"
        );
        assert_eq!(plate[4], ";LAYER:2\n;TYPE:SKIN\nG1 F2100 X0 Y2 E8\n");
    }

    #[test]
    fn test_speed_gating_per_role() {
        let mut plate = layered_plate();
        patch_plate(&mut plate, &settings(0.0, 20.0, -5.0));

        assert!(plate[2].contains(";TYPE:WALL-OUTER\nG1 F1200 X0 Y0 E1"));
        assert!(plate[2].contains(";TYPE:WALL-INNER\nG1 F1200 X1 Y0 E2"));
        assert!(plate[2].contains(";TYPE:SKIN\nG1 F2100 X2 Y0 E3"));
        assert!(plate[3].contains(";TYPE:SKIN\nG1 F2100 X1 Y1 E6"));
    }

    #[test]
    fn test_bottom_phase_runs_until_first_fill() {
        // no fill section on layer 1, so skin on layer 2 is still patched
        let mut plate = chunks(&[
            ";FLAVOR:Marlin\n",
            ";LAYER_COUNT:3\n",
            ";LAYER:0\n;TYPE:SKIN\nG1 F1200 X0 Y0\n",
            ";LAYER:1\n;TYPE:SKIN\nG1 F1200 X1 Y1\n;TYPE:WALL-INNER\nG1 F1200 X1 Y2\n",
            ";LAYER:2\n;TYPE:SKIN\nG1 F1200 X2 Y2\n",
        ]);
        let status = patch_plate(&mut plate, &settings(50.0, 50.0, 40.0));
        assert_eq!(status, PlateStatus::Patched { rewritten_lines: 3 });
        assert!(plate[3].contains(";TYPE:WALL-INNER\nG1 F1200 X1 Y2"));
        assert_eq!(plate[4], ";LAYER:2\n;TYPE:SKIN\nG1 F2400 X2 Y2\n");
    }

    #[test]
    fn test_patch_plates() {
        let mut output = PlateOutput::new();
        output.insert(0, chunks(&[";FLAVOR:Marlin\n", SCENARIO_A]));
        output.insert(1, chunks(&[";FLAVOR:Marlin\n"]));
        output.insert(
            2,
            chunks(&[";FLAVOR:Marlin\n;FAST_BOTTOM_INFILL\n", SCENARIO_A]),
        );
        let untouched_one = output[&1].clone();
        let untouched_two = output[&2].clone();

        let outcome = patch_plates(&mut output, &settings(50.0, 0.0, 40.0));
        assert!(outcome.changed());
        assert_eq!(outcome.patched, vec![0]);
        assert_eq!(outcome.rewritten_lines, 2);
        assert_eq!(output[&1], untouched_one);
        assert_eq!(output[&2], untouched_two);

        let again = patch_plates(&mut output, &settings(50.0, 0.0, 40.0));
        assert!(!again.changed());
    }

    #[test]
    fn test_patch_plates_disabled() {
        let mut output = PlateOutput::new();
        output.insert(0, chunks(&[";FLAVOR:Marlin\n", SCENARIO_A]));
        let original = output.clone();
        let settings = BottomSpeedSettings::default();

        assert!(!patch_plates(&mut output, &settings).changed());
        assert_eq!(output, original);
    }
}
