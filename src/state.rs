/// Persistent record of the last successful update.
///
/// The cache file holds a single line: the Unix timestamp of the last
/// successful update and the address that was published, separated by a
/// comma (`1704067200,1.2.3.4`). Newline or whitespace separation is accepted
/// on read so hand-written files work too.
///
/// A record whose address is not a valid dotted-decimal IPv4 address is
/// treated as absent.
use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheRecord {
    /// Unix time of the last successful update.
    pub last_update: u64,
    pub last_ip: Ipv4Addr,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("unable to read cache file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("unable to write cache file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Read the cache file at `path`.
///
/// A missing file is not an error (first run), neither is a file whose
/// contents can't be understood; both yield `Ok(None)`.
pub fn read(path: &Path) -> Result<Option<CacheRecord>, CacheError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("no cache file at {}", path.display());
            return Ok(None);
        }
        Err(source) => {
            return Err(CacheError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let record = parse(&content);
    if record.is_none() && !content.trim().is_empty() {
        log::warn!("ignoring malformed cache file {}", path.display());
    }
    Ok(record)
}

/// Overwrite the cache file at `path` with `record`, creating the parent
/// directory if needed.
pub fn write(path: &Path, record: &CacheRecord) -> Result<(), CacheError> {
    let to_err = |source: io::Error| CacheError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(to_err)?;
        }
    }

    fs::write(path, format!("{},{}\n", record.last_update, record.last_ip)).map_err(to_err)?;
    log::debug!("wrote cache file {}", path.display());
    Ok(())
}

fn parse(content: &str) -> Option<CacheRecord> {
    let mut fields = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(|line| line.split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|field| !field.is_empty());

    let last_update = fields.next()?.parse::<u64>().ok()?;
    let last_ip = fields.next()?.parse::<Ipv4Addr>().ok()?;

    Some(CacheRecord { last_update, last_ip })
}
