// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use anyhow::{Result, bail};
use fs_err as fs;
use std::collections::HashMap;
use std::path::Path;

#[test]
fn copyright_header() -> Result<()> {
    let required_headers: HashMap<&str, &str> = HEADERS_REQUIRED_PREFIX.iter().copied().collect();
    let mut errors: Vec<String> = Vec::new();

    for file in crate::all_source_files()? {
        if SKIP_FILES.iter().any(|&skip| Path::new(skip) == file) {
            continue;
        }
        let Some(ext) = file.extension().and_then(|ext| ext.to_str()) else {
            errors.push(format!("extension-less file {file:?}"));
            continue;
        };
        let Some(expected) = required_headers.get(ext) else {
            errors.push(format!(
                "unknown header requirements for .{ext} files (e.g., {file:?})"
            ));
            continue;
        };
        if !fs::read_to_string(&file)?.starts_with(expected) {
            errors.push(format!(
                "expected prefix {expected:?} missing from {file:?}"
            ));
        }
    }

    if !errors.is_empty() {
        bail!("Copyright headers test failed:\n\n{}", errors.join("\n\n"));
    }
    Ok(())
}

/// The network crate is shared with event context on targets without `std`; make sure nobody
/// accidentally drops the attribute.
#[test]
fn network_crate_is_no_std() -> Result<()> {
    let root = crate::project_root()?;
    let lib = fs::read_to_string(root.join("netclose/src/lib.rs"))?;
    if !lib.lines().any(|line| line.trim() == "#![no_std]") {
        bail!("netclose/src/lib.rs must be `#![no_std]`");
    }
    Ok(())
}

// Each particular file type has a common prefix, these prefixes are defined here. Please do NOT
// modify this unless you have a very compelling reason to.
const HEADERS_REQUIRED_PREFIX: &[(&str, &str)] = &[
    (
        "rs",
        "// Copyright (c) Microsoft Corporation.\n// Licensed under the MIT license.\n\n",
    ),
    ("lock", ""),
    ("md", ""),
    ("toml", ""),
    ("txt", ""),
];

// Skipped files have their own custom requirements on why they are not checked via the regular
// tests.
const SKIP_FILES: &[&str] = &["LICENSE"];
