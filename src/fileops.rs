//! Filesystem actions used by live runs

use crate::error::Result;
use filetime::FileTime;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// Create `dir` and any missing parents.
///
/// Returns how many directories this call created. Another worker creating
/// the same directory concurrently is not an error.
pub fn ensure_dir(dir: &Path) -> Result<u64> {
    if dir.is_dir() {
        return Ok(0);
    }

    let missing: Vec<&Path> = dir
        .ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.is_dir())
        .collect();

    let mut created = 0;
    for path in missing.into_iter().rev() {
        match fs::create_dir(path) {
            Ok(()) => {
                debug!(?path, "Created directory");
                created += 1;
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(created)
}

/// Copy file with buffered I/O, keeping permission bits and modification time
pub fn copy_file(source: &Path, dest: &Path) -> Result<u64> {
    let src_file = File::open(source)?;
    let metadata = src_file.metadata()?;
    let dest_file = File::create(dest)?;

    let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, src_file);
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, dest_file);

    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
        copied += bytes_read as u64;
    }
    writer.flush()?;
    drop(writer);

    fs::set_permissions(dest, metadata.permissions())?;
    if let Ok(mtime) = metadata.modified() {
        filetime::set_file_mtime(dest, FileTime::from_system_time(mtime))?;
    }

    Ok(copied)
}

/// Move a file, falling back to copy + delete across filesystems
pub fn move_file(source: &Path, dest: &Path) -> Result<()> {
    if let Err(e) = fs::rename(source, dest) {
        debug!(?source, ?dest, error = %e, "Rename failed, copying instead");
        copy_file(source, dest)?;
        fs::remove_file(source)?;
    }
    Ok(())
}

/// Path of the backup written next to `source`
pub fn backup_path(source: &Path) -> PathBuf {
    let mut name = OsString::from(source.as_os_str());
    name.push(".backup");
    PathBuf::from(name)
}

/// Copy `source` to `<source>.backup`
pub fn backup_file(source: &Path) -> Result<PathBuf> {
    let backup = backup_path(source);
    copy_file(source, &backup)?;
    debug!(?source, ?backup, "Created backup");
    Ok(backup)
}
