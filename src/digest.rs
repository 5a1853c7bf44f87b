use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Hex SHA-256 of a certificate, streamed so large proofs stay off the heap.
pub fn certificate_digest(path: &Path) -> Result<String> {
    let mut certificate = File::open(path)
        .with_context(|| format!("Failed to open certificate: {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut certificate, &mut hasher)
        .with_context(|| format!("Failed to read certificate: {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}
