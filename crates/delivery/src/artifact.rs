//! Filesystem helpers for artifact hand-off.

use std::io;
use std::path::Path;

/// Move an artifact to a caller-requested destination, creating parent
/// directories as needed. Falls back to copy + remove when the rename
/// crosses a filesystem boundary.
pub async fn move_artifact(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::rename(from, to).await.is_err() {
        tokio::fs::copy(from, to).await?;
        tokio::fs::remove_file(from).await?;
    }
    tracing::debug!(from = %from.display(), to = %to.display(), "Moved artifact");
    Ok(())
}

/// MIME type for an artifact, derived from its file extension.
///
/// Covers the media types the engines actually emit; anything else is
/// shipped as an opaque byte stream.
pub fn mime_for_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn mime_covers_known_media_extensions() {
        assert_eq!(mime_for_extension(Path::new("a.png")), "image/png");
        assert_eq!(mime_for_extension(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(mime_for_extension(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_for_extension(Path::new("a.mp4")), "video/mp4");
        assert_eq!(mime_for_extension(Path::new("a.webm")), "video/webm");
        assert_eq!(mime_for_extension(Path::new("a.wav")), "audio/wav");
        assert_eq!(mime_for_extension(Path::new("a.mp3")), "audio/mpeg");
    }

    #[test]
    fn mime_defaults_to_octet_stream() {
        assert_eq!(
            mime_for_extension(Path::new("a.safetensors")),
            "application/octet-stream",
        );
        assert_eq!(
            mime_for_extension(Path::new("no_extension")),
            "application/octet-stream",
        );
    }

    #[tokio::test]
    async fn move_artifact_creates_destination_parents() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("staged.mp4");
        tokio::fs::write(&from, b"frames").await.unwrap();

        let to: PathBuf = dir.path().join("nested/renders/final.mp4");
        move_artifact(&from, &to).await.unwrap();

        assert_eq!(tokio::fs::read(&to).await.unwrap(), b"frames");
        assert!(!from.exists());
    }
}
