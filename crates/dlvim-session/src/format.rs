use std::path::Path;

/// Shortens `file` for display, relative to `dir` when inside it.
pub fn short_path(file: &str, dir: &str) -> String {
    if dir.is_empty() {
        return file.to_owned();
    }

    match Path::new(file).strip_prefix(dir) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy().into_owned(),
        _ => file.to_owned(),
    }
}
