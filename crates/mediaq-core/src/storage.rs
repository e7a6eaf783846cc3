//! Artifact file lifecycle.
//!
//! The downloader writes into `<destination>.part`; only after the command
//! succeeds is the temp file renamed onto the destination. A reader of the
//! download root therefore never sees a partially written artifact under its
//! final name.

use std::io;
use std::path::{Path, PathBuf};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `a.mp4` → `a.mp4.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Ensure the parent directory of `final_path` exists.
pub async fn prepare(final_path: &Path) -> io::Result<()> {
    match final_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => tokio::fs::create_dir_all(dir).await,
        _ => Ok(()),
    }
}

/// Atomically rename the temp file onto `final_path`. Fails if the temp file is
/// missing (the command reported success but produced nothing).
pub async fn finalize(final_path: &Path) -> io::Result<()> {
    let temp = temp_path(final_path);
    tokio::fs::rename(&temp, final_path).await
}

/// Remove leftover temp output after a failed or cancelled execution.
///
/// Besides `<destination>.part` this removes every sibling whose name starts
/// with it: downloaders such as yt-dlp keep their own `.part.part` and
/// `.part-Frag<N>` files next to the output path.
pub async fn discard(final_path: &Path) {
    let temp = temp_path(final_path);
    let (Some(dir), Some(prefix)) = (temp.parent(), temp.file_name()) else {
        return;
    };
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let prefix = prefix.to_string_lossy().into_owned();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), "could not scan for partial output: {}", e);
            return;
        }
    };
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "could not scan for partial output: {}", e);
                break;
            }
        };
        if !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        let path = entry.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "removed partial output"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), "could not remove partial output: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_path_appends_part() {
        let p = temp_path(Path::new("file.mp4"));
        assert_eq!(p.to_string_lossy(), "file.mp4.part");
        let p2 = temp_path(Path::new("/tmp/archive.mp4"));
        assert_eq!(p2.to_string_lossy(), "/tmp/archive.mp4.part");
    }

    #[tokio::test]
    async fn finalize_moves_temp_onto_destination() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("nested").join("out.mp4");
        prepare(&final_path).await.unwrap();
        std::fs::write(temp_path(&final_path), b"payload").unwrap();

        finalize(&final_path).await.unwrap();

        assert!(!temp_path(&final_path).exists());
        assert_eq!(std::fs::read(&final_path).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn finalize_without_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("missing.mp4");
        let err = finalize(&final_path).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!final_path.exists());
    }

    #[tokio::test]
    async fn discard_is_quiet_when_nothing_to_remove() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("x.mp4");
        discard(&final_path).await;
        std::fs::write(temp_path(&final_path), b"half").unwrap();
        discard(&final_path).await;
        assert!(!temp_path(&final_path).exists());
    }

    #[tokio::test]
    async fn discard_removes_downloader_side_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("clip.mp4");
        for name in [
            "clip.mp4.part",
            "clip.mp4.part.part",
            "clip.mp4.part-Frag3",
            "clip.mp4.part-Frag3.part",
            "clip.mp4",
            "clip.mp4.ytdl",
            "other.mp4.part",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        discard(&final_path).await;

        let mut left: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, ["clip.mp4", "clip.mp4.ytdl", "other.mp4.part"]);
    }

    #[tokio::test]
    async fn discard_in_missing_directory_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        discard(&dir.path().join("gone").join("x.mp4")).await;
    }
}
