//! Lookup of the helper images shipped with the tool
//!
//! The boot stub, DDR init images and the OTP writer are searched for in the
//! current directory first, then `$NUWRITER_DATA_DIR`, then the system data
//! directory. DDR init images may also live in a `ddrimg/` subdirectory.

use std::path::{Path, PathBuf};

/// USB boot stub uploaded during attach
pub const XUSB_FILE: &str = "xusb.bin";
/// Fuse writer helper loaded before OTP programming
pub const OTP_WRITER_FILE: &str = "opt_writer.bin";
/// Environment variable naming an extra data directory
pub const DATA_DIR_ENV: &str = "NUWRITER_DATA_DIR";
/// System-wide data directory
pub const SYSTEM_DATA_DIR: &str = "/usr/share/nuwriter";

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Cannot find {name} (searched: {searched})")]
    NotFound { name: String, searched: String },

    #[error("Open {path} failed: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Candidate paths for `name`, in search order
pub fn candidates(name: &str, data_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut out = vec![PathBuf::from(name)];
    let dirs = data_dir
        .map(Path::to_path_buf)
        .into_iter()
        .chain(std::iter::once(PathBuf::from(SYSTEM_DATA_DIR)));
    for dir in dirs {
        out.push(dir.join(name));
        out.push(dir.join("ddrimg").join(name));
    }
    out
}

/// First existing candidate for `name`
pub fn locate(name: &str) -> Result<PathBuf, ResourceError> {
    let data_dir = std::env::var_os(DATA_DIR_ENV).map(PathBuf::from);
    let paths = candidates(name, data_dir.as_deref());
    if let Some(found) = paths.iter().find(|p| p.is_file()) {
        log::debug!("Using {} for {}", found.display(), name);
        return Ok(found.clone());
    }
    Err(ResourceError::NotFound {
        name: name.to_string(),
        searched: paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Locate and read `name`
pub fn load(name: &str) -> Result<Vec<u8>, ResourceError> {
    let path = locate(name)?;
    std::fs::read(&path).map_err(|source| ResourceError::Read { path, source })
}
