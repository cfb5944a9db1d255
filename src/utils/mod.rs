//! Small shared helpers.
//!
//! This module provides:
//! - Human-readable byte sizes
//! - Executable lookup on `PATH`
//! - Title-casing of media disposition names

use std::ffi::OsStr;
use std::path::PathBuf;

/// Formats a byte count with SI units (`1.5 kB`, `12.0 MB`).
pub fn bytes_si(bytes: u64) -> String {
    const UNIT: u64 = 1000;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0usize;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = ['k', 'M', 'G', 'T', 'P', 'E'][exp];
    #[allow(clippy::cast_precision_loss)]
    let value = bytes as f64 / div as f64;
    format!("{value:.1} {prefix}B")
}

/// Looks up an executable in the directories listed in `PATH`.
///
/// # Returns
///
/// The full path of the first match, or `None` when the tool is not installed.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    find_executable_in(name, &paths)
}

fn find_executable_in(name: &str, paths: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &std::path::Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

/// Turns `visual_impaired` into `Visual Impaired`.
pub fn title_case(snake: &str) -> String {
    snake
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_si() {
        assert_eq!(bytes_si(0), "0 B");
        assert_eq!(bytes_si(999), "999 B");
        assert_eq!(bytes_si(1500), "1.5 kB");
        assert_eq!(bytes_si(12_000_000), "12.0 MB");
    }

    #[test]
    fn test_find_executable_in_missing_dir() {
        let paths = std::ffi::OsString::from("/nonexistent/dir/for/test");
        assert!(find_executable_in("ffprobe", &paths).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_find_executable_in_finds_tool() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("fake-tool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        let found = find_executable_in("fake-tool", dir.path().as_os_str());
        assert_eq!(found, Some(tool));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("default"), "Default");
        assert_eq!(title_case("visual_impaired"), "Visual Impaired");
        assert_eq!(title_case("timed_thumbnails"), "Timed Thumbnails");
    }
}
