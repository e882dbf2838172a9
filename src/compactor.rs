//! Compaction
//!
//! Merges a prefix of frozen segments into one segment, keeping the newest
//! value for every key that appears in any input.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::Result;
use crate::segment::Segment;

/// Merge `inputs` (oldest first, as the engine orders its segment list) into
/// one new segment written at `scratch_path`. The caller is responsible for
/// splicing the result into the engine's segment list and deleting the
/// inputs afterward; this function only produces the merged segment.
pub async fn compact(inputs: &[Segment], scratch_path: PathBuf, fsync: bool) -> Result<Segment> {
    let output = Segment::open(scratch_path, fsync).await?;
    let mut seen: HashSet<String> = HashSet::new();

    // Newest-first: the last element of `inputs` is the most recent, so its
    // values win over anything earlier that shares a key.
    for input in inputs.iter().rev() {
        for key in input.keys().await {
            if seen.contains(&key) {
                continue;
            }
            let (value, value_type) = input.get(&key).await?;
            output.put(&key, &value_type, &value).await?;
            seen.insert(key);
        }
    }

    Ok(output)
}
