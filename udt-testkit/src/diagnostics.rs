// Diagnostic dumps for test logs

use crate::error::{Result, TestkitError};
use std::collections::BTreeSet;
use std::env;
use std::fmt::Display;
use tracing::{error, info};

/// Lines describing every non-zero socket id in `buffer`.
pub fn buffer_lines(title: &str, buffer: &[i32]) -> Vec<String> {
    buffer
        .iter()
        .filter(|&&value| value != 0)
        .map(|&value| format!("{} [id: 0x{:08x}]", title, value))
        .collect()
}

/// Log every non-zero socket id in `buffer`.
pub fn log_buffer(title: &str, buffer: &[i32]) {
    for line in buffer_lines(title, buffer) {
        info!(title, "{}", line);
    }
}

/// Sorted `-> item` lines.
pub fn set_lines<T, I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: Ord + Display,
{
    items
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|item| format!("-> {}", item))
        .collect()
}

/// Log a set in sorted order, one item per line.
pub fn log_set<T, I>(items: I)
where
    I: IntoIterator<Item = T>,
    T: Ord + Display,
{
    for line in set_lines(items) {
        info!("{}", line);
    }
}

/// Render a path-list value (as in `PATH`) one entry per line.
pub fn path_list_block(name: &str, value: &str) -> String {
    let mut text = format!("[{}]", name);
    for entry in env::split_paths(value) {
        text.push_str("\n\t");
        text.push_str(&entry.display().to_string());
    }
    text
}

/// Log the entries of a path-list environment variable.
///
/// Missing variables are logged as empty.
pub fn log_path_var(name: &str) {
    let value = env::var(name).unwrap_or_default();
    info!(var = name, "\n\t{}", path_list_block(name, &value));
}

/// Log the library search path of the current platform.
pub fn log_library_path() {
    let name = if cfg!(target_os = "windows") {
        "PATH"
    } else if cfg!(target_os = "macos") {
        "DYLD_LIBRARY_PATH"
    } else {
        "LD_LIBRARY_PATH"
    };
    log_path_var(name);
}

/// `[os/arch]` block for the running binary.
pub fn os_arch_block() -> String {
    format!("[os/arch]\n\t{}\n\t{}", env::consts::OS, env::consts::ARCH)
}

/// Log OS and architecture.
pub fn log_os_arch() {
    info!("\n\t{}", os_arch_block());
}

/// Look up a required property through `lookup`.
pub fn property_with<F>(name: &str, lookup: F) -> Result<String>
where
    F: FnOnce(&str) -> Option<String>,
{
    lookup(name).ok_or_else(|| {
        error!(property = name, "Property not defined");
        TestkitError::MissingProperty(name.to_string())
    })
}

/// Look up a required environment property.
pub fn property(name: &str) -> Result<String> {
    property_with(name, |key| env::var(key).ok())
}
