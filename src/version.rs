// Copyright (C) 2026 by GiGa infosystems

//! Tolerant parsing of bundle versions & the orderings used to rank them
//!
//! Bundle authors don't always write strict semver (`v1.2`, `1.02.0`), so versions are
//! normalized before being handed to [`semver::Version::parse`]. Ranking uses
//! [`Version::cmp_precedence`], which ignores build metadata, with [`cmp_build`] as an optional
//! tie-break.

use semver::Version;
use std::cmp::Ordering;
use thiserror::Error;

/// Failure to parse a version with [`parse_tolerant`]
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("short version {0:?} cannot contain pre-release or build metadata")]
    ShortWithMetadata(String),
    #[error(transparent)]
    Semver(#[from] semver::Error),
}

/// Parse a version, accepting a leading `v`, surrounding whitespace, leading zeros in the numeric
/// components and a missing minor or patch component (which default to `0`).
pub fn parse_tolerant(raw: &str) -> Result<Version, VersionError> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    let mut parts = trimmed
        .splitn(3, '.')
        .map(strip_leading_zeros)
        .collect::<Vec<_>>();

    if parts.len() < 3 {
        if parts.last().is_some_and(|last| last.contains(['-', '+'])) {
            return Err(VersionError::ShortWithMetadata(raw.to_owned()));
        }
        parts.resize(3, "0".to_owned());
    }

    Ok(Version::parse(&parts.join("."))?)
}

fn strip_leading_zeros(part: &str) -> String {
    if part.len() <= 1 {
        return part.to_owned();
    }

    let stripped = part.trim_start_matches('0');
    if stripped.starts_with(|c: char| c.is_ascii_digit()) {
        stripped.to_owned()
    } else {
        // Everything numeric was a zero (`00`, `0-rc.1`), keep one of them
        format!("0{stripped}")
    }
}

/// Whether a version carries pre-release identifiers
pub fn is_prerelease(version: &Version) -> bool {
    !version.pre.is_empty()
}

fn build_identifiers(version: &Version) -> impl Iterator<Item = &str> {
    let build = version.build.as_str();
    (!build.is_empty())
        .then(|| build.split('.'))
        .into_iter()
        .flatten()
}

/// Compare the build metadata of two versions identifier by identifier, as plain strings.
///
/// A list of identifiers that is a strict prefix of the other one is lower, so a version without
/// any build metadata is lower than every version with some.
pub fn cmp_build(a: &Version, b: &Version) -> Ordering {
    build_identifiers(a).cmp(build_identifiers(b))
}
