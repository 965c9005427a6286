use crate::error::XcfResult;
use std::{
    fmt::Display,
    path::{Path, PathBuf},
    sync::Once,
};

pub type Result<T> = XcfResult<T>;

#[allow(unused)]
static INIT_LOG: Once = Once::new();

#[allow(unused)]
pub fn init_logger() {
    INIT_LOG.call_once(|| {
        env_logger::builder()
            .filter_level(log::LevelFilter::Trace)
            .is_test(true)
            .init();
    });
}

pub fn handle_error_and_exit(err: impl Display) -> ! {
    log::error!("{err}");
    std::process::exit(1);
}

pub fn try_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(crate::xcf_error!(
            "Path/File does not exist: {}",
            path.display()
        ));
    }
    Ok(())
}

pub fn log_warning<T>(err: impl Display, default: T) -> T {
    log::warn!("{err}");
    default
}

/// Strips a recognized companion extension (`.bcf`, `.vcf`, `.vcf.gz`) from
/// a path, yielding the XCF prefix shared by the `.bin` and `.fam` side-cars.
pub fn xcf_prefix(path: &str) -> String {
    for ext in [".vcf.gz", ".vcf", ".bcf"] {
        if let Some(stem) = path.strip_suffix(ext) {
            return stem.to_string();
        }
    }
    path.to_string()
}

pub fn companion_bin(path: &str) -> PathBuf {
    PathBuf::from(format!("{}.bin", xcf_prefix(path)))
}

pub fn companion_fam(path: &str) -> PathBuf {
    PathBuf::from(format!("{}.fam", xcf_prefix(path)))
}

/// Header timestamp, `dd/mm/YYYY - HH:MM:SS`.
pub fn file_date() -> String {
    chrono::Local::now().format("%d/%m/%Y - %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xcf_prefix_strips_companion_extensions() {
        assert_eq!(xcf_prefix("chunk0.bcf"), "chunk0");
        assert_eq!(xcf_prefix("dir/chunk0.vcf.gz"), "dir/chunk0");
        assert_eq!(xcf_prefix("chunk0.vcf"), "chunk0");
        assert_eq!(xcf_prefix("chunk0"), "chunk0");
    }

    #[test]
    fn test_companion_paths_share_the_prefix() {
        assert_eq!(companion_bin("x/y.bcf"), PathBuf::from("x/y.bin"));
        assert_eq!(companion_fam("x/y.bcf"), PathBuf::from("x/y.fam"));
    }
}
