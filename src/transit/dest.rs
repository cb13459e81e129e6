//! Inbound file staging
//!
//! A [`DestFile`] stages a peer-offered file under a `.part` name and only
//! promotes it to its final name once the transfer verified. The display
//! name is sanitized to a bare filename, so a peer offering
//! `../../.ssh/authorized_keys` lands in the chosen directory and nowhere
//! else. Neither staging nor promotion ever overwrites an existing file:
//! collisions resolve to the lowest unused integer suffix.

use std::path::{Path, PathBuf};

use fs2::available_space;

use crate::errors::Error;

/// Suffix for incomplete downloads
const PART_SUFFIX: &str = ".part";

/// An inbound file: sanitized identity plus staging state
pub struct DestFile {
    /// Transfer id, assigned when the receive is accepted
    pub id: Option<u64>,
    /// Display name; bare filename, updated if promotion had to rename
    pub name: String,
    /// Declared payload size
    pub final_bytes: u64,
    /// Bytes expected on the wire (same as `final_bytes` for file offers)
    pub transfer_bytes: u64,
    full_path: Option<PathBuf>,
    temp_path: Option<PathBuf>,
    pub(crate) file: Option<tokio::fs::File>,
}

impl DestFile {
    /// Record a peer-declared name and size.
    ///
    /// Only the final path component of `filename` is kept; traversal
    /// segments and separators are stripped.
    pub fn new(filename: &str, filesize: u64) -> Self {
        let name = match Path::new(filename).file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => "unnamed".to_string(),
        };
        Self {
            id: None,
            name,
            final_bytes: filesize,
            transfer_bytes: filesize,
            full_path: None,
            temp_path: None,
            file: None,
        }
    }

    /// Open the staging file inside `dest_dir`.
    ///
    /// Fails with [`Error::DiskSpace`] before creating anything when the
    /// destination filesystem reports fewer free bytes than the declared
    /// size.
    pub async fn open(&mut self, id: u64, dest_dir: &Path) -> Result<(), Error> {
        let dest_dir = tokio::fs::canonicalize(dest_dir)
            .await
            .map_err(|e| Error::ReceiveFile(format!("bad destination: {e}")))?;
        let full_path = dest_dir.join(&self.name);

        if !has_disk_space(&dest_dir, self.transfer_bytes) {
            return Err(Error::DiskSpace {
                needed: self.transfer_bytes,
            });
        }

        let part_path = PathBuf::from(format!("{}{}", full_path.display(), PART_SUFFIX));
        let temp_path = find_unique_path(&part_path).await;

        let file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::ReceiveFile(e.to_string()))?;

        self.id = Some(id);
        self.full_path = Some(full_path);
        self.temp_path = Some(temp_path);
        self.file = Some(file);
        Ok(())
    }

    /// Promote the staged file to its final, collision-free name and
    /// update the recorded name.
    pub async fn finalise(&mut self) -> Result<(), Error> {
        use tokio::io::AsyncWriteExt;

        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| Error::ReceiveFile(e.to_string()))?;
        }

        let (full_path, temp_path) = match (&self.full_path, &self.temp_path) {
            (Some(full), Some(temp)) => (full.clone(), temp.clone()),
            _ => return Err(Error::ReceiveFile("destination was never opened".into())),
        };

        let final_path = find_unique_path(&full_path).await;
        tokio::fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| Error::ReceiveFile(e.to_string()))?;

        if let Some(name) = final_path.file_name() {
            self.name = name.to_string_lossy().into_owned();
        }
        self.full_path = Some(final_path);
        Ok(())
    }

    /// Close and delete the staging file. Safe to call at any point,
    /// any number of times; deletion of an already-promoted or
    /// already-deleted file is not an error.
    pub async fn cleanup(&mut self) {
        self.file.take();
        if let Some(temp_path) = &self.temp_path {
            let _ = tokio::fs::remove_file(temp_path).await;
        }
    }
}

/// First path in `path`, `<stem>.1<ext>`, `<stem>.2<ext>`, ... that does
/// not exist yet.
async fn find_unique_path(path: &Path) -> PathBuf {
    let mut candidate = path.to_path_buf();
    let mut count = 1u32;

    while tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
        candidate = match path.extension() {
            Some(ext) => {
                path.with_extension(format!("{count}.{}", ext.to_string_lossy()))
            }
            None => path.with_extension(count.to_string()),
        };
        count += 1;
    }

    candidate
}

/// Best-effort free-space check; if the filesystem cannot answer, the
/// transfer proceeds and any shortage surfaces as a write error.
fn has_disk_space(dest_dir: &Path, needed: u64) -> bool {
    match available_space(dest_dir) {
        Ok(free) => free > needed,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_name_is_sanitized() {
        assert_eq!(DestFile::new("file.txt", 1).name, "file.txt");
        assert_eq!(
            DestFile::new("../../.ssh/authorized_keys", 1).name,
            "authorized_keys"
        );
        assert_eq!(DestFile::new("/etc/passwd", 1).name, "passwd");
        assert_eq!(DestFile::new("..", 1).name, "unnamed");
    }

    #[tokio::test]
    async fn test_open_stages_part_file() {
        let dir = tempdir().unwrap();
        let mut dest = DestFile::new("file.txt", 4);

        dest.open(9, dir.path()).await.unwrap();

        assert_eq!(dest.id, Some(9));
        assert!(dir.path().join("file.txt.part").exists());
    }

    #[tokio::test]
    async fn test_staging_avoids_existing_part_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt.part"), b"other").unwrap();

        let mut dest = DestFile::new("file.txt", 4);
        dest.open(1, dir.path()).await.unwrap();

        assert!(dir.path().join("file.txt.1.part").exists());
        assert_eq!(
            std::fs::read(dir.path().join("file.txt.part")).unwrap(),
            b"other"
        );
    }

    #[tokio::test]
    async fn test_open_fails_without_disk_space() {
        let dir = tempdir().unwrap();
        let mut dest = DestFile::new("huge.bin", u64::MAX);

        let result = dest.open(1, dir.path()).await;

        assert_eq!(result, Err(Error::DiskSpace { needed: u64::MAX }));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_finalise_promotes_and_renames_on_collision() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), b"zero").unwrap();
        std::fs::write(dir.path().join("file.1.txt"), b"one").unwrap();

        let mut dest = DestFile::new("file.txt", 4);
        dest.open(1, dir.path()).await.unwrap();
        dest.file
            .as_mut()
            .unwrap()
            .write_all(b"data")
            .await
            .unwrap();
        dest.finalise().await.unwrap();

        assert_eq!(dest.name, "file.2.txt");
        assert_eq!(std::fs::read(dir.path().join("file.2.txt")).unwrap(), b"data");
        assert_eq!(std::fs::read(dir.path().join("file.txt")).unwrap(), b"zero");
        assert!(!dir.path().join("file.txt.part").exists());
    }

    #[tokio::test]
    async fn test_finalise_without_collision_keeps_name() {
        let dir = tempdir().unwrap();
        let mut dest = DestFile::new("report.pdf", 2);
        dest.open(1, dir.path()).await.unwrap();
        dest.file.as_mut().unwrap().write_all(b"ok").await.unwrap();
        dest.finalise().await.unwrap();

        assert_eq!(dest.name, "report.pdf");
        assert!(dir.path().join("report.pdf").exists());
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut dest = DestFile::new("file.txt", 4);
        dest.open(1, dir.path()).await.unwrap();

        dest.cleanup().await;
        assert!(!dir.path().join("file.txt.part").exists());

        // Second cleanup, and cleanup after someone else deleted the
        // staging file, are no-ops.
        dest.cleanup().await;
    }

    #[tokio::test]
    async fn test_cleanup_after_finalise_keeps_final_file() {
        let dir = tempdir().unwrap();
        let mut dest = DestFile::new("file.txt", 4);
        dest.open(1, dir.path()).await.unwrap();
        dest.file
            .as_mut()
            .unwrap()
            .write_all(b"data")
            .await
            .unwrap();
        dest.finalise().await.unwrap();

        dest.cleanup().await;

        assert_eq!(std::fs::read(dir.path().join("file.txt")).unwrap(), b"data");
    }
}
