//! Temporary files that end up published.

/// Mode of published files before the umask applies
#[cfg(unix)]
const PUBLISHED_MODE: u32 = 0o644;

/// Temp file builder for content that is persisted into a served tree.
///
/// Plain temp files are owner-only; these stay readable by a web server
/// once moved into place.
pub(crate) fn published_tempfile<'a>(prefix: &'a str, suffix: &'a str) -> tempfile::Builder<'a, 'a> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix).suffix(suffix);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(PUBLISHED_MODE));
    }

    builder
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_persisted_file_is_world_readable() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("episode.mp3");

        let partial = published_tempfile(".partial-", ".mp3").tempfile_in(dir.path()).unwrap();
        partial.persist(&target).unwrap();

        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o644, 0o644);
        assert_eq!(mode & 0o111, 0);
    }
}
