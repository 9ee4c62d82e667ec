use crate::error::NoaaError;
use log::info;
use std::io;
use std::path::{Path, PathBuf};

const CACHE_DIR_NAME: &str = "noaa_cdo_cache";

const SIZE_UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

pub fn get_cache_dir() -> Result<PathBuf, NoaaError> {
    dirs::cache_dir()
        .ok_or_else(|| {
            NoaaError::CacheDirResolution(io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine system cache directory",
            ))
        })
        .map(|p| p.join(CACHE_DIR_NAME))
}

pub async fn ensure_cache_dir_exists(path: &Path) -> Result<(), NoaaError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => {
            if !metadata.is_dir() {
                return Err(NoaaError::CacheDirCreation(
                    path.to_path_buf(),
                    io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        "cache path exists but is not a directory",
                    ),
                ));
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("Creating cache directory: {}", path.display());
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|e| NoaaError::CacheDirCreation(path.to_path_buf(), e))
        }
        Err(e) => Err(NoaaError::CacheDirCreation(path.to_path_buf(), e)),
    }
}

/// Formats a byte count with binary units, e.g. `1.17 KiB`. Plain bytes have no decimals.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", SIZE_UNITS[unit])
}

/// Parses the output of [`format_size`] back into bytes. Rounding makes this lossy
/// above 1 KiB.
pub fn parse_size(text: &str) -> Option<u64> {
    let (number, unit) = text.trim().split_once(' ')?;
    let exponent = SIZE_UNITS.iter().position(|u| *u == unit.trim())?;
    let value: f64 = number.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * 1024f64.powi(exponent as i32)).round() as u64)
}
