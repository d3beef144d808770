//! Segmentation of a saved G-code file into the host's chunk layout.
//!
//! The slicer hands over a plate as a list of chunks: a header, the chunk
//! carrying `;LAYER_COUNT:`, then one chunk per layer. A saved file is the
//! concatenation of those, so cutting before every layer-count and layer
//! line recovers the same layout.

use bottomspeed::gcode::{LAYER_COUNT_PREFIX, LAYER_PREFIX};

fn is_boundary(line: &str) -> bool {
    line.starts_with(LAYER_COUNT_PREFIX) || line.starts_with(LAYER_PREFIX)
}

/// Split G-code text into host-style chunks. Concatenating the result
/// gives back `text`.
pub fn split_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if is_boundary(line) && offset > start {
            chunks.push(text[start..offset].to_string());
            start = offset;
        }
        offset += line.len();
    }
    chunks.push(text[start..].to_string());
    chunks
}

/// Join chunks back into file text.
pub fn join_chunks(chunks: &[String]) -> String {
    chunks.concat()
}
