use anyhow::{Context, Result};
use std::path::PathBuf;

use snoolens::analysis::generate_key;

/// Print a fresh Fernet key or write it to `output`
pub fn gen_key(output: Option<PathBuf>) -> Result<()> {
    let key = generate_key();
    match output {
        Some(path) => {
            if path.exists() {
                anyhow::bail!("Refusing to overwrite existing key file {}", path.display());
            }
            std::fs::write(&path, format!("{key}\n"))
                .with_context(|| format!("Failed to write key to {}", path.display()))?;
            println!("Key written to {}", path.display());
        }
        None => println!("{key}"),
    }
    Ok(())
}
