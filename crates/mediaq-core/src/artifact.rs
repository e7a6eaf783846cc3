//! Completed artifacts: id resolution and byte-range reads.
//!
//! An artifact id is a bare file name inside the download root. Anything that
//! could escape the root (separators, `..`, control characters) or that would
//! be altered by filename sanitization is rejected before touching the disk.

use std::io::SeekFrom;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::storage::TEMP_SUFFIX;

/// Linux NAME_MAX.
const NAME_MAX: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("invalid artifact id {0:?}")]
    InvalidId(String),
    #[error("artifact {0} not found")]
    NotFound(String),
    #[error("range not satisfiable for size {size}: {header:?}")]
    RangeNotSatisfiable { header: String, size: u64 },
    #[error("artifact I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Sanitizes a candidate file name: replaces NUL, separators, whitespace and
/// control characters with `_`, collapses runs of `_`, trims leading and
/// trailing dots/underscores and caps the length at NAME_MAX bytes.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;

    for c in name.chars() {
        let c = if c == '/' || c == '\\' || c.is_control() || c.is_whitespace() {
            '_'
        } else {
            c
        };
        if c == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    let mut take = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}

/// Map an artifact id to its path under `root`. Does not check existence.
pub fn resolve(root: &Path, artifact_id: &str) -> Result<PathBuf, ArtifactError> {
    let invalid = || ArtifactError::InvalidId(artifact_id.to_string());
    if artifact_id.is_empty()
        || artifact_id.contains("..")
        || artifact_id.ends_with(TEMP_SUFFIX)
        || sanitize_file_name(artifact_id) != artifact_id
    {
        return Err(invalid());
    }
    Ok(root.join(artifact_id))
}

/// Parse an HTTP-style `Range` header against a file of `size` bytes.
///
/// Returns a half-open byte range. `None` selects the whole file, which is
/// empty for a 0-byte artifact. Supported forms are `bytes=start-end` and
/// `bytes=start-`; `end` is clamped to the last byte.
pub fn parse_range(header: Option<&str>, size: u64) -> Result<Range<u64>, ArtifactError> {
    let Some(header) = header else {
        return Ok(0..size);
    };
    let unsatisfiable = || ArtifactError::RangeNotSatisfiable {
        header: header.to_string(),
        size,
    };

    let spec = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(unsatisfiable)?;
    let (start, end) = spec.split_once('-').ok_or_else(unsatisfiable)?;
    let start: u64 = start.trim().parse().map_err(|_| unsatisfiable())?;
    let end: u64 = match end.trim() {
        "" => size.saturating_sub(1),
        e => e.parse().map_err(|_| unsatisfiable())?,
    };
    if start >= size || end < start {
        return Err(unsatisfiable());
    }
    Ok(start..end.min(size - 1) + 1)
}

/// Size of the artifact, or `NotFound`.
pub async fn size_of(path: &Path) -> Result<u64, ArtifactError> {
    match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => Ok(m.len()),
        Ok(_) => Err(ArtifactError::NotFound(path.display().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ArtifactError::NotFound(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Read the bytes of `range` from `path`.
pub async fn read_range(path: &Path, range: Range<u64>) -> Result<Vec<u8>, ArtifactError> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ArtifactError::NotFound(path.display().to_string())
        } else {
            e.into()
        }
    })?;
    let len = range.end.saturating_sub(range.start);
    if len == 0 {
        return Ok(Vec::new());
    }
    file.seek(SeekFrom::Start(range.start)).await?;
    let mut buf = Vec::with_capacity(len as usize);
    file.take(len).read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Resolve `artifact_id` under `root` and read the requested range.
/// Returns the selected range together with the total size and the bytes.
pub async fn fetch(
    root: &Path,
    artifact_id: &str,
    range_header: Option<&str>,
) -> Result<(Range<u64>, u64, Vec<u8>), ArtifactError> {
    let path = resolve(root, artifact_id)?;
    let size = size_of(&path).await?;
    let range = parse_range(range_header, size)?;
    let bytes = read_range(&path, range.clone()).await?;
    tracing::debug!(
        artifact_id,
        start = range.start,
        end = range.end,
        size,
        "served artifact range"
    );
    Ok((range, size, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_separators_and_collapses() {
        assert_eq!(sanitize_file_name("a/b\\c.mp4"), "a_b_c.mp4");
        assert_eq!(sanitize_file_name("file___name.mp4"), "file_name.mp4");
        assert_eq!(sanitize_file_name("  ..  clip.mp4  ..  "), "clip.mp4");
        assert_eq!(sanitize_file_name("x\x00y"), "x_y");
    }

    #[test]
    fn resolve_accepts_plain_ids() {
        let root = Path::new("/srv/downloads");
        let p = resolve(root, "2f1c6f7e-3b52-4f0e-9a57-2b1f0d3c4a10.mp4").unwrap();
        assert_eq!(
            p,
            root.join("2f1c6f7e-3b52-4f0e-9a57-2b1f0d3c4a10.mp4")
        );
    }

    #[test]
    fn resolve_rejects_traversal_and_odd_names() {
        let root = Path::new("/srv/downloads");
        for bad in ["", "..", "../etc/passwd", "a/b.mp4", "a\\b", ".hidden", "x.mp4.part", "a b"] {
            assert!(
                matches!(resolve(root, bad), Err(ArtifactError::InvalidId(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn range_forms() {
        assert_eq!(parse_range(None, 10).unwrap(), 0..10);
        assert_eq!(parse_range(None, 0).unwrap(), 0..0);
        assert_eq!(parse_range(Some("bytes=2-5"), 10).unwrap(), 2..6);
        assert_eq!(parse_range(Some("bytes=4-"), 10).unwrap(), 4..10);
        assert_eq!(parse_range(Some("bytes=8-100"), 10).unwrap(), 8..10);
    }

    #[test]
    fn unsatisfiable_ranges() {
        for bad in ["bytes=10-", "bytes=5-2", "bytes=-3", "items=0-1", "bytes=a-b", "0-1"] {
            assert!(
                matches!(
                    parse_range(Some(bad), 10),
                    Err(ArtifactError::RangeNotSatisfiable { .. })
                ),
                "{bad:?}"
            );
        }
        assert!(matches!(
            parse_range(Some("bytes=0-"), 0),
            Err(ArtifactError::RangeNotSatisfiable { .. })
        ));
    }

    #[tokio::test]
    async fn fetch_reads_requested_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"0123456789").unwrap();

        let (range, size, bytes) = fetch(dir.path(), "clip.mp4", Some("bytes=3-6"))
            .await
            .unwrap();
        assert_eq!((range, size), (3..7, 10));
        assert_eq!(bytes, b"3456");

        let (_, _, all) = fetch(dir.path(), "clip.mp4", None).await.unwrap();
        assert_eq!(all, b"0123456789");
    }

    #[tokio::test]
    async fn fetch_empty_artifact_without_range_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.mp4"), b"").unwrap();

        let (range, size, bytes) = fetch(dir.path(), "empty.mp4", None).await.unwrap();
        assert_eq!((range, size), (0..0, 0));
        assert!(bytes.is_empty());

        assert!(matches!(
            fetch(dir.path(), "empty.mp4", Some("bytes=0-")).await,
            Err(ArtifactError::RangeNotSatisfiable { .. })
        ));
    }

    #[tokio::test]
    async fn fetch_missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            fetch(dir.path(), "nope.mp4", None).await,
            Err(ArtifactError::NotFound(_))
        ));
    }
}
