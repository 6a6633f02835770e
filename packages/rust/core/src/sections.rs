//! Maps outline items onto chunk positions.

/// Distribute `outline` across `chunk_count` chunks.
///
/// Each chunk gets a contiguous slice of `ceil(len / chunk_count)` items; the
/// last slices may be shorter or empty. Always returns `chunk_count` entries.
pub fn assign_sections(outline: &[String], chunk_count: u32) -> Vec<Vec<String>> {
    let count = chunk_count.max(1) as usize;
    let per_chunk = outline.len().div_ceil(count);

    let mut sections: Vec<Vec<String>> = if per_chunk == 0 {
        Vec::new()
    } else {
        outline.chunks(per_chunk).map(<[String]>::to_vec).collect()
    };
    sections.resize_with(count, Vec::new);
    sections
}
