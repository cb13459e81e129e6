//! Outbound payload handling
//!
//! A [`PayloadSource`] is an open, ready-to-stream file or directory. Files
//! stream as-is; directories are walked and deflate-compressed into a
//! single anonymous spool file before the size fields become valid. The
//! archive step is synchronous CPU/filesystem work, so it runs under
//! `spawn_blocking` and never stalls the scheduler.

use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

use crate::errors::Error;
use crate::protocol::{DIRECTORY_MODE, DirectoryOffer, FileOffer, Offer};

/// What an open payload source contains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    File,
    Directory { num_files: u64 },
}

/// An outbound file or directory, opened and measured
pub struct PayloadSource {
    /// Caller-chosen transfer id, echoed back in progress and completion
    /// events
    pub id: u64,
    /// Display name (final path component of the source)
    pub name: String,
    /// Logical payload size: file size, or total uncompressed directory
    /// content
    pub final_bytes: u64,
    /// On-wire size: equals `final_bytes` for a file, archive size for a
    /// directory
    pub transfer_bytes: u64,
    kind: SourceKind,
    pub(crate) file: tokio::fs::File,
}

impl PayloadSource {
    /// Open a file or directory for sending.
    ///
    /// For directories this walks and compresses the contents before
    /// returning, off the scheduler thread.
    pub async fn open(id: u64, path: &Path) -> Result<Self, Error> {
        let path = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| Error::SendFile(format!("cannot open {}: {e}", path.display())))?;
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => return Err(Error::SendFile("source path has no name".into())),
        };

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Error::SendFile(e.to_string()))?;

        if metadata.is_file() {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| Error::SendFile(e.to_string()))?;
            let size = metadata.len();
            Ok(Self {
                id,
                name,
                final_bytes: size,
                transfer_bytes: size,
                kind: SourceKind::File,
                file,
            })
        } else if metadata.is_dir() {
            let root = path.clone();
            let archive = tokio::task::spawn_blocking(move || archive_directory(&root))
                .await
                .map_err(|e| Error::SendFile(format!("archive task failed: {e}")))?
                .map_err(|e| Error::SendFile(e.to_string()))?;
            Ok(Self {
                id,
                name,
                final_bytes: archive.content_bytes,
                transfer_bytes: archive.archive_bytes,
                kind: SourceKind::Directory {
                    num_files: archive.num_files,
                },
                file: tokio::fs::File::from_std(archive.spool),
            })
        } else {
            Err(Error::SendFile(
                "only files or directories can be sent".into(),
            ))
        }
    }

    /// The control-message offer describing this payload
    pub fn offer(&self) -> Offer {
        match self.kind {
            SourceKind::File => Offer::File(FileOffer {
                filename: self.name.clone(),
                filesize: self.final_bytes,
            }),
            SourceKind::Directory { num_files } => Offer::Directory(DirectoryOffer {
                mode: DIRECTORY_MODE.into(),
                dirname: self.name.clone(),
                zipsize: self.transfer_bytes,
                numbytes: self.final_bytes,
                numfiles: num_files,
            }),
        }
    }
}

/// Result of archiving a directory into a spool file
struct DirArchive {
    /// Finished archive, rewound to the start
    spool: std::fs::File,
    /// Total uncompressed member bytes
    content_bytes: u64,
    /// Archive size on disk
    archive_bytes: u64,
    num_files: u64,
}

/// Walk `root` and deflate-compress its files into an anonymous temp file.
///
/// Member paths are relative to `root`; directory entries themselves are
/// not stored.
fn archive_directory(root: &Path) -> io::Result<DirArchive> {
    let spool = tempfile::tempfile()?;
    let mut writer = ZipWriter::new(spool);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut content_bytes = 0u64;
    let mut num_files = 0u64;

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let member = relative_member_name(root, entry.path())?;

        writer.start_file(member, options)?;
        let mut file = std::fs::File::open(entry.path())?;
        content_bytes += io::copy(&mut file, &mut writer)?;
        num_files += 1;
    }

    let mut spool = writer.finish()?;
    let archive_bytes = spool.seek(SeekFrom::End(0))?;
    spool.seek(SeekFrom::Start(0))?;

    Ok(DirArchive {
        spool,
        content_bytes,
        archive_bytes,
        num_files,
    })
}

/// Archive member name for `path`, relative to `root`, with `/` separators
fn relative_member_name(root: &Path, path: &Path) -> io::Result<String> {
    let relative: PathBuf = path
        .strip_prefix(root)
        .map_err(|e| io::Error::other(format!("path escapes archive root: {e}")))?
        .to_path_buf();
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}
