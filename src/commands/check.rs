//! Library/index consistency command and the startup gate built on it.

use anyhow::{bail, Result};
use std::env;

use super::Services;
use crate::config::{Config, StorageBackend};
use crate::consistency;
use crate::library::Library;
use crate::storage::VectorIndex;

/// Refuse to continue while the library and the index disagree, unless
/// `reconcile` allows deleting the divergent side.
pub async fn gate(library: &Library, index: &dyn VectorIndex, reconcile: bool) -> Result<()> {
    let report = consistency::check(library, index).await?;
    if report.is_consistent() {
        return Ok(());
    }

    if !reconcile {
        bail!(
            "The comic library and the vector index are out of sync.\n{}\
             Run with --reconcile to delete the divergent entries.",
            report.describe()
        );
    }

    tracing::warn!(
        only_in_filesystem = report.only_in_filesystem.len(),
        only_in_index = report.only_in_index.len(),
        "Reconciling library and vector index"
    );
    consistency::reconcile(library, index, &report).await
}

/// Gate run before processing starts.
///
/// The memory backend starts empty, so comparing it with the library would
/// report every stored chapter and `reconcile` would delete them all.
pub async fn startup_gate(
    backend: StorageBackend,
    library: &Library,
    index: &dyn VectorIndex,
    reconcile: bool,
) -> Result<()> {
    if backend == StorageBackend::Memory {
        tracing::warn!("Memory vector index in use, skipping the library consistency check");
        return Ok(());
    }
    gate(library, index, reconcile).await
}

/// Run the check command
pub async fn run(reconcile: bool) -> Result<()> {
    let root = env::current_dir()?;
    let config = Config::load(&root)?;
    if config.storage.backend == StorageBackend::Memory {
        bail!("The memory vector index is rebuilt on every start; there is nothing to check");
    }
    let services = Services::open(config).await?;

    let report = consistency::check(&services.library, services.index.as_ref()).await?;
    if report.is_consistent() {
        println!("✓ Library and vector index are consistent");
        return Ok(());
    }

    print!("{}", report.describe());
    if !reconcile {
        bail!("Library is inconsistent. Re-run with --reconcile to repair it.");
    }

    consistency::reconcile(&services.library, services.index.as_ref(), &report).await?;
    println!(
        "✓ Removed {} unindexed chapters and {} orphaned index entries",
        report.only_in_filesystem.len(),
        report.only_in_index.len()
    );
    Ok(())
}
