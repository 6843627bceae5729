use std::path::Path;

/// Accepts a path to an existing regular file, such as a scenario manifest.
pub fn is_file_exist(file_path: &str) -> Result<String, String> {
    let path = Path::new(file_path);

    if path.is_file() {
        Ok(file_path.to_string())
    } else if path.is_dir() {
        Err(format!("expected a file, found a directory: {}", path.display()))
    } else {
        Err(format!("file not found: {}", path.display()))
    }
}
