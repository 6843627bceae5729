use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use dyn_clone::DynClone;

use crate::command::Executor;
use crate::config::Config;
use crate::types::ObjectPath;

pub mod gcloud;

/// Type alias for a boxed remote store trait object.
pub type Store = Box<dyn RemoteStoreTrait + Send + Sync>;

/// Object operations the fixture reconciler needs from the remote store.
///
/// Every method is a single attempt with no retry. Errors carry the text the store
/// reported so that the caller can classify them with
/// [`classify_storage_error`](crate::types::error::classify_storage_error).
#[async_trait]
pub trait RemoteStoreTrait: DynClone {
    /// Whether an object exists at `path`. A clean "not found" answer is `Ok(false)`.
    ///
    /// Local paths are checked on the filesystem.
    async fn exists(&self, path: &ObjectPath) -> Result<bool>;

    /// Upload the local file at `local` to `remote`.
    async fn upload(&self, local: &Path, remote: &ObjectPath) -> Result<()>;

    /// Move the object at `from` to `to`.
    async fn move_object(&self, from: &ObjectPath, to: &ObjectPath) -> Result<()>;

    /// Delete the object at `path`.
    async fn delete(&self, path: &ObjectPath) -> Result<()>;
}

dyn_clone::clone_trait_object!(RemoteStoreTrait);

/// Create the CLI-backed store used by setup and teardown.
pub fn create_store(config: &Config, executor: Executor, flags: Vec<String>) -> Store {
    Box::new(gcloud::CliRemoteStore::new(
        executor,
        &config.cli_prefix,
        config.execution_context.clone(),
        flags,
    ))
}
