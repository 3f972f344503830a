//! Utilities pertaining to filesystem and other os-level settings
//!

use camino::Utf8Path;

/// Create a novel directory path if it does not exist already
///
/// If the directory already exists no operations are performed
///
/// * `label` - used to describe the directory in an error message
///
pub fn create_dir_all(dir: &Utf8Path, label: &str) {
    if !dir.is_dir() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Can't create new {label} directory at '{dir}': {e}");
            std::process::exit(exitcode::CANTCREAT);
        }
    }
}
