use std::path::Path;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::{debug, trace};

use crate::command::{Executor, execute_descriptor};
use crate::config::ExecutionContext;
use crate::storage::RemoteStoreTrait;
use crate::types::error::{StorageErrorKind, classify_storage_error};
use crate::types::{CommandDescriptor, CommandVerb, ExecutionResult, ObjectPath};

const NO_CLOBBER_FLAG: &str = "--no-clobber";

/// Remote store driven through the storage CLI (`ls`, `cp`, `mv`, `rm`).
#[derive(Clone)]
pub struct CliRemoteStore {
    executor: Executor,
    prefix: String,
    context: ExecutionContext,
    flags: Vec<String>,
}

impl CliRemoteStore {
    /// `flags` are appended to every command, after adaptation to `context`.
    pub fn new(
        executor: Executor,
        prefix: &str,
        context: ExecutionContext,
        flags: Vec<String>,
    ) -> Self {
        Self {
            executor,
            prefix: prefix.to_string(),
            context,
            flags,
        }
    }

    fn descriptor(&self, verb: CommandVerb) -> CommandDescriptor {
        CommandDescriptor::new(&self.prefix, verb).with_flags(self.flags.iter().cloned())
    }

    async fn run(&self, descriptor: CommandDescriptor) -> ExecutionResult {
        execute_descriptor(self.executor.as_ref(), &descriptor, &self.context).await
    }
}

fn into_result(result: ExecutionResult) -> Result<()> {
    if result.success {
        Ok(())
    } else {
        Err(anyhow!(result.error_text().to_string()))
    }
}

#[async_trait]
impl RemoteStoreTrait for CliRemoteStore {
    async fn exists(&self, path: &ObjectPath) -> Result<bool> {
        let uri = match path {
            ObjectPath::Remote { uri, .. } => uri,
            ObjectPath::Local(local) => {
                return Ok(tokio::fs::try_exists(local).await.unwrap_or(false));
            }
        };

        let result = self
            .run(self.descriptor(CommandVerb::List).with_source(path.clone()))
            .await;

        if result.success {
            let found = result.stdout.contains(uri.as_str());
            trace!(path = %uri, found = found, "existence probe completed.");
            return Ok(found);
        }

        match classify_storage_error(result.error_text()) {
            StorageErrorKind::NotFound => {
                trace!(path = %uri, "existence probe reported not found.");
                Ok(false)
            }
            _ => Err(anyhow!(result.error_text().to_string())),
        }
    }

    async fn upload(&self, local: &Path, remote: &ObjectPath) -> Result<()> {
        debug!(local = %local.display(), remote = %remote, "uploading fixture.");
        let mut descriptor = self
            .descriptor(CommandVerb::Copy)
            .with_source(ObjectPath::Local(local.to_path_buf()))
            .with_destination(remote.clone());
        descriptor.flags.insert(0, NO_CLOBBER_FLAG.to_string());
        into_result(self.run(descriptor).await)
    }

    async fn move_object(&self, from: &ObjectPath, to: &ObjectPath) -> Result<()> {
        debug!(from = %from, to = %to, "moving object.");
        let descriptor = self
            .descriptor(CommandVerb::Move)
            .with_source(from.clone())
            .with_destination(to.clone());
        into_result(self.run(descriptor).await)
    }

    async fn delete(&self, path: &ObjectPath) -> Result<()> {
        debug!(path = %path, "deleting object.");
        let descriptor = self
            .descriptor(CommandVerb::Remove)
            .with_source(path.clone());
        into_result(self.run(descriptor).await)
    }
}
