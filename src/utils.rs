use std::path::Path;

use anyhow::Result;
use log::{error, info};
use tokio::fs;

/// Creates the directory that will hold `file`, if it does not exist yet.
pub async fn ensure_parent_directory<P: AsRef<Path>>(file: P) -> Result<()> {
    let Some(dir) = file.as_ref().parent().filter(|dir| !dir.as_os_str().is_empty()) else {
        return Ok(());
    };
    if !dir.exists() {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!("Failed to create directory at {:?}: {}", dir, e);
            return Err(e.into());
        }
        info!("Created directory at: {:?}", dir);
    }
    Ok(())
}
