//! Embedded standard-library packages.
//!
//! The `.qcl` packages under `pkg/` are bundled into the binary as a
//! virtual read-only filesystem. An on-disk package root, discovered
//! through `$QCLDIR/pkg`, `$GITHUB_WORKSPACE/pkg` and
//! `$HOME/go/src/qcl/pkg` in that order, takes precedence so local
//! package edits are picked up without rebuilding.

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{CompileError, Point};

/// Embedded package sources, path-relative to the package root.
pub const EMBEDDED: &[(&str, &str)] = &[
    ("builtin.qcl", include_str!("../../../pkg/builtin.qcl")),
    ("bits/bits.qcl", include_str!("../../../pkg/bits/bits.qcl")),
    ("bytes/bytes.qcl", include_str!("../../../pkg/bytes/bytes.qcl")),
    ("crypto/otp.qcl", include_str!("../../../pkg/crypto/otp.qcl")),
    (
        "encoding/binary.qcl",
        include_str!("../../../pkg/encoding/binary.qcl"),
    ),
    ("math/math.qcl", include_str!("../../../pkg/math/math.qcl")),
    ("sort/sort.qcl", include_str!("../../../pkg/sort/sort.qcl")),
];

struct PkgPath {
    precondition: Option<&'static str>,
    env: &'static str,
    prefix: &'static str,
}

const PKG_PATHS: &[PkgPath] = &[
    PkgPath {
        precondition: Some("QCLDIR"),
        env: "QCLDIR",
        prefix: "pkg",
    },
    PkgPath {
        precondition: Some("GITHUB_WORKFLOW"),
        env: "GITHUB_WORKSPACE",
        prefix: "pkg",
    },
    PkgPath {
        precondition: None,
        env: "HOME",
        prefix: "go/src/qcl/pkg",
    },
];

/// Resolve an on-disk package root, if one exists.
pub fn resolve_pkg_dir() -> Option<PathBuf> {
    for path in PKG_PATHS {
        if let Some(precondition) = path.precondition {
            if std::env::var_os(precondition).is_none() {
                continue;
            }
        }
        let Some(base) = std::env::var_os(path.env) else {
            continue;
        };
        let dir = PathBuf::from(base).join(path.prefix);
        if dir.is_dir() {
            debug!(dir = %dir.display(), "package root resolved");
            return Some(dir);
        }
    }
    None
}

/// Load the sources of one package: every `.qcl` file under the
/// package's directory, from the on-disk root when present, the
/// embedded filesystem otherwise. Returns `(source path, contents)`
/// pairs.
pub fn load_package(name: &str) -> Result<Vec<(String, String)>, CompileError> {
    if let Some(root) = resolve_pkg_dir() {
        let dir = root.join(name);
        if dir.is_dir() {
            let mut files = Vec::new();
            let mut entries: Vec<PathBuf> = fs::read_dir(&dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "qcl"))
                .collect();
            entries.sort();
            for path in entries {
                let data = fs::read_to_string(&path)?;
                files.push((path.display().to_string(), data));
            }
            if !files.is_empty() {
                return Ok(files);
            }
        }
    }

    // Directory packages first, then root-level single files like
    // `builtin.qcl`.
    let prefix = format!("{name}/");
    let single = format!("{name}.qcl");
    let files: Vec<(String, String)> = EMBEDDED
        .iter()
        .filter(|(path, _)| path.starts_with(&prefix) || **path == single)
        .map(|(path, data)| (format!("pkg/{path}"), data.to_string()))
        .collect();
    if files.is_empty() {
        return Err(CompileError::user(
            &Point::default(),
            format!("package {name} not found"),
        ));
    }
    Ok(files)
}
