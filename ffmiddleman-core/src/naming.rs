use std::path::{Path, PathBuf};

use crate::config::NamingConfig;

/// Output filename for `source`: `prefix + stem + suffix + extension`.
///
/// The extension is `format_override` (a leading dot is added when missing)
/// or the source's own extension. Only a file name is produced; the caller
/// decides which directory it lives in.
#[inline]
pub fn destination_name(
    source: &Path,
    prefix: Option<&str>,
    suffix: Option<&str>,
    format_override: Option<&str>,
) -> String {
    let stem = source.file_stem().map(|stem| stem.to_string_lossy()).unwrap_or_default();
    let extension = match format_override {
        Some(format) if format.starts_with('.') => format.to_owned(),
        Some(format) => format!(".{}", format),
        None => source
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default(),
    };

    format!(
        "{}{}{}{}",
        prefix.unwrap_or_default(),
        stem,
        suffix.unwrap_or_default(),
        extension
    )
}

/// Directory the output of `source` is written to.
#[inline]
pub fn destination_dir<'a>(source: &'a Path, naming: &'a NamingConfig) -> &'a Path {
    naming
        .destination_dir
        .as_deref()
        .or_else(|| source.parent())
        .unwrap_or_else(|| Path::new(""))
}

#[inline]
pub fn destination_path(source: &Path, naming: &NamingConfig) -> PathBuf {
    destination_dir(source, naming).join(destination_name(
        source,
        naming.prefix.as_deref(),
        naming.suffix.as_deref(),
        naming.format_override.as_deref(),
    ))
}

/// Subtitle file burnt in for `source`: same stem, subtitle extension.
#[inline]
pub fn subtitle_name(source: &Path, subfile_extension: &str) -> String {
    destination_name(source, None, None, Some(subfile_extension))
}
