use crate::types::FileId;

/// Derive a stable file id from a path's basename, resetting the rolling
/// accumulator on every path separator so that `"/a/b/t.db"` and
/// `"./t.db"` hash to the same id.
///
/// Collisions are possible across distinct basenames; the core's
/// invariants only require the id to be stable for the lifetime of one
/// open session (see DESIGN.md for the colliding-basename trade-off).
pub fn file_id_from_path(path: &str) -> FileId {
    let mut hash: u64 = 0;
    for c in path.bytes() {
        if c == b'/' || c == b'\\' {
            hash = 0;
            continue;
        }
        hash = (c as u64)
            .wrapping_add(hash.wrapping_shl(6))
            .wrapping_add(hash.wrapping_shl(16))
            .wrapping_sub(hash);
    }
    FileId(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_basename_hashes_equal_regardless_of_directory() {
        assert_eq!(
            file_id_from_path("/var/data/t1.db"),
            file_id_from_path("./t1.db")
        );
        assert_eq!(
            file_id_from_path("a/b/c/t1.db"),
            file_id_from_path("t1.db")
        );
    }

    #[test]
    fn different_basenames_usually_differ() {
        assert_ne!(file_id_from_path("t1.db"), file_id_from_path("t2.db"));
    }

    #[test]
    fn windows_style_separators_also_reset() {
        assert_eq!(
            file_id_from_path(r"c:\data\t1.db"),
            file_id_from_path("t1.db")
        );
    }
}
