// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Repository hygiene checks; this crate only makes sense in testing mode
#![cfg(test)]

use anyhow::{Result, anyhow};
use std::path::PathBuf;

mod boilerplate;
mod ratchet;

/// Finds and switches to the project root directory (the one holding the `target/` directory).
pub(crate) fn project_root() -> Result<PathBuf> {
    let mut dir = std::env::current_dir()?;
    loop {
        if dir.join("target").is_dir() && dir.join("Cargo.toml").is_file() {
            std::env::set_current_dir(&dir)?;
            return Ok(dir);
        }
        if !dir.pop() {
            return Err(anyhow!("Could not find project root"));
        }
    }
}

/// Get all source files, relative to the project root, skipping anything that `.gitignore` or
/// `.ignore` excludes (build artifacts, vendored reference material, ...).
pub(crate) fn all_source_files() -> Result<Vec<PathBuf>> {
    let root = project_root()?;
    let mut files = Vec::new();
    for entry in ignore::WalkBuilder::new(&root).build() {
        let entry = entry?;
        if entry.file_type().is_some_and(|t| t.is_file()) {
            files.push(entry.path().strip_prefix(&root)?.to_owned());
        }
    }
    Ok(files)
}

/// Get all `.rs` source files
pub(crate) fn all_rs_files() -> Result<impl Iterator<Item = PathBuf>> {
    Ok(all_source_files()?
        .into_iter()
        .filter(|p| p.extension().is_some_and(|ext| ext == "rs")))
}
