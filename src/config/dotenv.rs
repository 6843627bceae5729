//! `.env` file support for the credential provider.
//!
//! Only parses; the process environment is never modified.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

const DOTENV_FILE_NAME: &str = ".env";

/// Parse `<dir>/.env` and return the pairs whose key is in `allowed`.
///
/// A missing file yields an empty list.
pub fn load_dotenv(dir: &Path, allowed: &[&str]) -> Result<Vec<(String, String)>> {
    let dotenv_path = dir.join(DOTENV_FILE_NAME);
    if !dotenv_path.exists() {
        return Ok(Vec::new());
    }

    debug!(path = %dotenv_path.display(), "parsing .env file.");
    let content = std::fs::read_to_string(&dotenv_path)
        .with_context(|| format!("failed to read {}", dotenv_path.display()))?;

    Ok(parse_env_content(&content)
        .into_iter()
        .filter(|(key, _)| allowed.contains(&key.as_str()))
        .collect())
}

/// Parse `KEY=value` lines. Comments, blank lines and an `export ` prefix are accepted.
pub fn parse_env_content(content: &str) -> Vec<(String, String)> {
    let mut vars = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            debug!(line = line_num + 1, "skipping malformed .env line.");
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            debug!(line = line_num + 1, "skipping empty .env key.");
            continue;
        }

        let value = value.trim();
        let value = if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value[1..value.len() - 1].to_string()
        } else {
            value.split('#').next().unwrap_or("").trim().to_string()
        };

        vars.push((key.to_string(), value));
    }

    vars
}
