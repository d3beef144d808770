//! The slicer's G-code dialect, as far as the patcher needs to read it.
//!
//! Only three kinds of lines matter: `;LAYER:<n>` layer starts,
//! `;TYPE:<feature>` section markers and `G1 F<rate> …` feed-rate moves.
//! Every other line passes through untouched.

use std::sync::OnceLock;

use regex::{NoExpand, Regex};

/// Sentinel appended to chunk 0 once a plate has been patched.
pub const PROCESSED_MARKER: &str = ";FAST_BOTTOM_INFILL\n";

/// Prefix of the layer-count line carried by chunk 1.
pub const LAYER_COUNT_PREFIX: &str = ";LAYER_COUNT:";

/// Prefix of a layer-start line.
pub const LAYER_PREFIX: &str = ";LAYER:";

/// Full layer-0 start line, including its newline.
pub const LAYER_ZERO_LINE: &str = ";LAYER:0\n";

/// Prefix of a section-type marker line.
pub const TYPE_PREFIX: &str = ";TYPE:";

/// Prefix of a move that sets the feed rate.
pub const FEED_MOVE_PREFIX: &str = "G1 F";

/// Printed-feature category named by a `;TYPE:` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    /// Top/bottom skin (`;TYPE:SKIN`).
    Skin,
    /// Sparse infill (`;TYPE:FILL`).
    Fill,
    /// Inner walls (`;TYPE:WALL-INNER`).
    WallInner,
    /// Outer wall (`;TYPE:WALL-OUTER`).
    WallOuter,
    /// Anything else: support, skirt, travel, etc.
    Other,
}

impl SectionType {
    /// Classify the text following `;TYPE:`.
    ///
    /// Matching is by prefix, so `SKIN` also covers any suffixed variant.
    pub fn from_marker(name: &str) -> Self {
        if name.starts_with("SKIN") {
            SectionType::Skin
        } else if name.starts_with("FILL") {
            SectionType::Fill
        } else if name.starts_with("WALL-INNER") {
            SectionType::WallInner
        } else if name.starts_with("WALL-OUTER") {
            SectionType::WallOuter
        } else {
            SectionType::Other
        }
    }

    /// Is this an inner or outer wall?
    pub fn is_wall(self) -> bool {
        matches!(self, SectionType::WallInner | SectionType::WallOuter)
    }
}

/// What a single G-code line means to the patcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// `;LAYER:<n>` with a parseable index (negative for raft layers).
    LayerStart(i64),
    /// `;TYPE:<feature>`.
    Section(SectionType),
    /// `G1 F<rate> …`.
    FeedMove,
    /// Anything else.
    Other,
}

impl LineKind {
    /// Classify one line (without its trailing `\n`).
    pub fn classify(line: &str) -> Self {
        if let Some(name) = line.strip_prefix(TYPE_PREFIX) {
            LineKind::Section(SectionType::from_marker(name))
        } else if let Some(index) = line.strip_prefix(LAYER_PREFIX) {
            match index.trim_end().parse() {
                Ok(index) => LineKind::LayerStart(index),
                Err(_) => LineKind::Other,
            }
        } else if line.starts_with(FEED_MOVE_PREFIX) {
            LineKind::FeedMove
        } else {
            LineKind::Other
        }
    }
}

fn feed_rate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^G1 F[0-9.]+").expect("feed-rate pattern is valid"))
}

/// Convert a speed in mm/s to a G-code feed-rate token (mm/min).
///
/// Integral rates are written without a fractional part, so `50.0` gives
/// `"3000"`.
pub fn feed_rate_token(speed_mm_s: f64) -> String {
    format!("{}", speed_mm_s * 60.0)
}

/// Replace the feed-rate number of a `G1 F<rate>` line.
///
/// Everything after the number is preserved verbatim. Returns `None` when
/// the line does not start with a numeric feed-rate move.
pub fn rewrite_feed_rate(line: &str, feed_rate: &str) -> Option<String> {
    let pattern = feed_rate_pattern();
    if !pattern.is_match(line) {
        return None;
    }
    let replacement = format!("{FEED_MOVE_PREFIX}{feed_rate}");
    Some(pattern.replacen(line, 1, NoExpand(&replacement)).into_owned())
}

/// Does this chunk announce a layer count?
pub fn has_layer_count(chunk: &str) -> bool {
    chunk.contains(LAYER_COUNT_PREFIX)
}
