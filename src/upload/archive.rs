use crate::error::{BackupError, Result};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Seek, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const TEMP_PREFIX: &str = "ch_backup_";

// Symlinks are followed and archived under their own path; link loops and
// dangling links fail the archive.
pub fn zip_directory<W: Write + Seek>(
    source_dir: &Path,
    writer: W,
    token: &CancellationToken,
) -> Result<W> {
    if !source_dir.is_dir() {
        return Err(BackupError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", source_dir.display()),
        )));
    }

    let mut zip = ZipWriter::new(writer);
    let mut entries = 0usize;

    for entry in WalkDir::new(source_dir).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if token.is_cancelled() {
            return Err(BackupError::Cancelled);
        }

        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|e| BackupError::Compression(e.to_string()))?;
        let name = entry_name(relative);

        let source = File::open(entry.path())?;
        let size = source.metadata()?.len();
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(size >= u32::MAX as u64);

        debug!("Adding {} as {}", entry.path().display(), name);
        zip.start_file(name, options)?;
        io::copy(&mut BufReader::new(source), &mut zip)?;
        entries += 1;
    }

    let writer = zip.finish()?;
    debug!("Archived {} files from {}", entries, source_dir.display());
    Ok(writer)
}

fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn archive_directory(
    source_dir: &Path,
    temp_dir: Option<&Path>,
    token: &CancellationToken,
) -> Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_PREFIX);
    let temp = match temp_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };

    let writer = BufWriter::new(temp.reopen()?);
    let mut writer = zip_directory(source_dir, writer, token)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(temp)
}
