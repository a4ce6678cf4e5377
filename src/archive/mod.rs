//! Archive construction for preview content
//!
//! Builds a gzip-compressed tar archive from a source file or directory.
//! Entries are written in sorted path order with normalized headers
//! (mtime 0, uid/gid 0, mode 0644/0755), so byte-identical source trees
//! produce byte-identical archives and therefore equal content digests.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder, EntryType, Header};
use walkdir::WalkDir;

/// Errors for archive operations
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("source does not exist: {0}")]
    SourceMissing(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("path is not under the source root: {0}")]
    PathOutsideRoot(PathBuf),
}

/// What got written: entry count and compressed size on disk.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveSummary {
    pub entries: u64,
    pub bytes: u64,
}

/// Builds the archive for one source path.
///
/// Directory sources get every entry prefixed with the directory's base name
/// (including a root `{base}/` entry) so extraction reproduces a single
/// top-level folder. Single-file sources are archived as the bare file name.
pub struct Archiver {
    source: PathBuf,
}

impl Archiver {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Create the archive at `dest`.
    ///
    /// Exactly one file is created at `dest`. A failure mid-walk can leave a
    /// partial archive behind; removing it is the caller's responsibility
    /// (see [`TempArchive`]).
    pub fn create(&self, dest: &Path) -> Result<ArchiveSummary, ArchiveError> {
        let meta = fs::metadata(&self.source)
            .map_err(|_| ArchiveError::SourceMissing(self.source.clone()))?;

        let file = File::create(dest)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = Builder::new(encoder);

        let entries = if meta.is_dir() {
            self.append_directory(&mut builder)?
        } else {
            self.append_single_file(&mut builder, meta.len())?
        };

        let encoder = builder.into_inner()?;
        let file = encoder.finish()?;
        file.sync_all()?;
        let bytes = file.metadata()?.len();

        Ok(ArchiveSummary { entries, bytes })
    }

    fn append_directory<W: io::Write>(
        &self,
        builder: &mut Builder<W>,
    ) -> Result<u64, ArchiveError> {
        let base = self
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string());

        // Collect first so entries land in sorted path order.
        let mut collected: BTreeMap<String, EntryKind> = BTreeMap::new();
        for entry in WalkDir::new(&self.source).follow_links(false) {
            let entry = entry?;
            let rel = entry
                .path()
                .strip_prefix(&self.source)
                .map_err(|_| ArchiveError::PathOutsideRoot(entry.path().to_path_buf()))?;
            if rel.as_os_str().is_empty() {
                continue;
            }

            let file_type = entry.file_type();
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File {
                    path: entry.path().to_path_buf(),
                    size: entry.metadata()?.len(),
                }
            } else {
                // Only regular files and directories are delivered.
                continue;
            };

            collected.insert(slash_path(rel), kind);
        }

        self.append_dir_header(builder, &format!("{base}/"))?;
        let mut count = 1u64;

        for (rel, kind) in &collected {
            match kind {
                EntryKind::Directory => {
                    self.append_dir_header(builder, &format!("{base}/{rel}/"))?;
                }
                EntryKind::File { path, size } => {
                    self.append_file(builder, &format!("{base}/{rel}"), path, *size)?;
                }
            }
            count += 1;
        }

        Ok(count)
    }

    fn append_single_file<W: io::Write>(
        &self,
        builder: &mut Builder<W>,
        size: u64,
    ) -> Result<u64, ArchiveError> {
        let name = self
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ArchiveError::SourceMissing(self.source.clone()))?;

        self.append_file(builder, &name, &self.source, size)?;
        Ok(1)
    }

    fn append_file<W: io::Write>(
        &self,
        builder: &mut Builder<W>,
        name: &str,
        path: &Path,
        size: u64,
    ) -> Result<(), ArchiveError> {
        let mut header = Header::new_gnu();
        header.set_path(name)?;
        header.set_size(size);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mode(if is_executable(path) { 0o755 } else { 0o644 });
        header.set_cksum();

        let mut file = File::open(path)?;
        builder.append(&header, &mut file)?;
        Ok(())
    }

    fn append_dir_header<W: io::Write>(
        &self,
        builder: &mut Builder<W>,
        name: &str,
    ) -> Result<(), ArchiveError> {
        let mut header = Header::new_gnu();
        header.set_path(name)?;
        header.set_size(0);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mode(0o755);
        header.set_entry_type(EntryType::Directory);
        header.set_cksum();

        builder.append(&header, &[] as &[u8])?;
        Ok(())
    }
}

enum EntryKind {
    Directory,
    File { path: PathBuf, size: u64 },
}

/// Slash-separated archive path for a relative filesystem path.
fn slash_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if a file is executable
fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = fs::metadata(path) {
            return metadata.permissions().mode() & 0o111 != 0;
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    false
}

/// Scoped ownership of the on-disk archive.
///
/// The file is removed when the guard drops, on success, on error, and on
/// unwind, so no invocation leaves the temporary archive behind.
pub struct TempArchive {
    path: PathBuf,
}

impl TempArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        // Nothing was written when an early stage failed; ignore NotFound.
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();

        fs::write(dir.path().join("file1.txt"), "content1").unwrap();
        fs::write(dir.path().join("file2.txt"), "content2").unwrap();

        fs::create_dir(dir.path().join("subdir")).unwrap();
        fs::write(dir.path().join("subdir/file3.txt"), "content3").unwrap();

        dir
    }

    fn list_entries(archive: &Path) -> Vec<String> {
        let file = File::open(archive).unwrap();
        let mut tar = tar::Archive::new(GzDecoder::new(file));
        tar.entries()
            .unwrap()
            .map(|e| {
                let entry = e.unwrap();
                let mut name = entry.path().unwrap().to_string_lossy().into_owned();
                if entry.header().entry_type() == EntryType::Directory && !name.ends_with('/') {
                    name.push('/');
                }
                name
            })
            .collect()
    }

    #[test]
    fn test_directory_entries_prefixed_with_base_name() {
        let dir = create_test_dir();
        let out = TempDir::new().unwrap();
        let dest = out.path().join("content.tgz");

        let summary = Archiver::new(dir.path()).create(&dest).unwrap();
        assert_eq!(summary.entries, 5);

        let base = dir.path().file_name().unwrap().to_string_lossy().into_owned();
        let mut entries = list_entries(&dest);
        entries.sort();

        assert_eq!(
            entries,
            vec![
                format!("{base}/"),
                format!("{base}/file1.txt"),
                format!("{base}/file2.txt"),
                format!("{base}/subdir/"),
                format!("{base}/subdir/file3.txt"),
            ]
        );
    }

    #[test]
    fn test_single_file_has_no_prefix() {
        let dir = create_test_dir();
        let out = TempDir::new().unwrap();
        let dest = out.path().join("content.tgz");

        let summary = Archiver::new(dir.path().join("file1.txt"))
            .create(&dest)
            .unwrap();
        assert_eq!(summary.entries, 1);
        assert_eq!(list_entries(&dest), vec!["file1.txt".to_string()]);
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let out = TempDir::new().unwrap();
        let dest = out.path().join("content.tgz");

        let err = Archiver::new(out.path().join("nope")).create(&dest).unwrap_err();
        assert!(matches!(err, ArchiveError::SourceMissing(_)));
    }

    #[test]
    fn test_entries_are_sorted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("z.txt"), "z").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("m.txt"), "m").unwrap();

        let out = TempDir::new().unwrap();
        let dest = out.path().join("content.tgz");
        Archiver::new(dir.path()).create(&dest).unwrap();

        let entries = list_entries(&dest);
        let mut sorted = entries.clone();
        sorted.sort();
        assert_eq!(entries, sorted);
    }

    #[test]
    fn test_canonical_headers() {
        let dir = create_test_dir();
        let out = TempDir::new().unwrap();
        let dest = out.path().join("content.tgz");
        Archiver::new(dir.path()).create(&dest).unwrap();

        let file = File::open(&dest).unwrap();
        let mut tar = tar::Archive::new(GzDecoder::new(file));
        for entry in tar.entries().unwrap() {
            let entry = entry.unwrap();
            let header = entry.header();
            assert_eq!(header.mtime().unwrap(), 0);
            assert_eq!(header.uid().unwrap(), 0);
            assert_eq!(header.gid().unwrap(), 0);
        }
    }

    #[test]
    fn test_byte_identical_output_for_same_tree() {
        let dir = create_test_dir();
        let out = TempDir::new().unwrap();

        let a = out.path().join("a.tgz");
        let b = out.path().join("b.tgz");
        Archiver::new(dir.path()).create(&a).unwrap();
        Archiver::new(dir.path()).create(&b).unwrap();

        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
    }

    #[test]
    fn test_temp_archive_removed_on_drop() {
        let out = TempDir::new().unwrap();
        let path = out.path().join("content.tgz");
        fs::write(&path, b"partial").unwrap();

        {
            let _guard = TempArchive::new(&path);
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_temp_archive_drop_tolerates_missing_file() {
        let out = TempDir::new().unwrap();
        let path = out.path().join("never-created.tgz");
        // Should not panic.
        drop(TempArchive::new(&path));
    }
}
