use std::path::{Path, PathBuf};

/// Joins a table-relative name onto the measurement set's own path.
///
/// The reference decoder calls `Path.resolve()` before this join, which
/// touches the filesystem (symlinks, cwd) to produce an absolute path.
/// This just joins; callers that need an absolute, symlink-resolved path
/// can canonicalize the result themselves.
pub(crate) fn resolve_table_path(base: &Path, name: &str) -> PathBuf {
    base.join(name)
}

/// The on-disk sidecar file a data manager's column storage lives in,
/// named after the manager's sequence number (`table.f<n>`).
pub(crate) fn sidecar_path(base: &Path, sequence_number: i32) -> PathBuf {
    base.join(format!("table.f{sequence_number}"))
}

/// All sidecar paths for a set of manager sequence numbers, in the order
/// given.
pub(crate) fn sidecar_paths<I>(base: &Path, sequence_numbers: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = i32>,
{
    sequence_numbers
        .into_iter()
        .map(|n| sidecar_path(base, n))
        .collect()
}

/// Unpacks a little-endian-bit-ordered bitstream into `count` booleans.
pub(crate) fn unpack_bits_le(bytes: &[u8], count: usize) -> Vec<bool> {
    let mut data = Vec::with_capacity(count);
    for byte in bytes {
        for bit in 0..8 {
            if data.len() == count {
                break;
            }
            data.push(byte & (1 << bit) != 0);
        }
    }
    data
}
