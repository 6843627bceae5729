use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::command::CommandExecutor;
use crate::types::ExecutionResult;

/// A service-account key written to a private temporary file for the storage CLI.
///
/// The file is removed when the value is dropped, whatever the outcome of the command
/// that read it.
#[derive(Debug)]
pub struct ScratchKeyFile {
    file: NamedTempFile,
}

impl ScratchKeyFile {
    pub fn write(contents: &str) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("gsverify-key-")
            .suffix(".json")
            .tempfile()
            .context("failed to create scratch key file")?;
        file.write_all(contents.as_bytes())
            .context("failed to write scratch key file")?;
        file.flush().context("failed to flush scratch key file")?;

        debug!(path = %file.path().display(), "scratch key file written.");
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// `<prefix> auth activate-service-account --key-file=<path>`
    pub fn activation_command(&self, cli_prefix: &str) -> String {
        // The auth group lives on the top-level tool, not on the storage subgroup.
        let tool = cli_prefix.split_whitespace().next().unwrap_or(cli_prefix);
        format!(
            "{tool} auth activate-service-account --key-file={}",
            self.path().display()
        )
    }
}

impl Drop for ScratchKeyFile {
    fn drop(&mut self) {
        // Best effort: overwrite the key material before the file is unlinked.
        if let Ok(metadata) = self.file.as_file().metadata() {
            let blank = vec![0u8; metadata.len() as usize];
            let file = self.file.as_file_mut();
            if file.seek(SeekFrom::Start(0)).is_ok() {
                let _ = file.write_all(&blank);
                let _ = file.flush();
            }
        }
        debug!(path = %self.file.path().display(), "scratch key file removed.");
    }
}

/// Activate a service account from key material, removing the key file afterwards.
pub async fn activate_service_account(
    executor: &(dyn CommandExecutor + Send + Sync),
    cli_prefix: &str,
    key_contents: &str,
) -> Result<ExecutionResult> {
    let key_file = ScratchKeyFile::write(key_contents)?;
    let result = executor
        .execute(&key_file.activation_command(cli_prefix))
        .await;
    drop(key_file);

    Ok(result)
}
