// Copyright (C) 2026 by GiGa infosystems

//! Rebuild the upgrade graph of a package from the semantic versions of its bundles
//!
//! The order of operations in [`Semver::channelize`] is:
//! * Resolve the version of every bundle into a [`VersionMap`] with [`resolve_versions`]
//! * Order the bundles by descending precedence with [`sort_bundles`]
//! * Walk the sorted bundles, planning the [`Edges`] of each bundle from its successor with
//!   [`Semver::plan_edges`], then replace the old graph properties of every bundle
//! * Pick the default channel from the first bundle with [`select_default_channel`]
//!
//! Channels are named after the major version (`v1`), the major & minor version (`v1.2`) or, for
//! pre-releases kept apart from releases, `pre-v1.2`.

use crate::declcfg::Bundle;
use crate::property::{ChannelProperty, Property, PropertyError, build_channel, build_skips};
use crate::version::{VersionError, cmp_build, is_prerelease, parse_tolerant};
use semver::Version;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// The version of every bundle, indexed by bundle name
pub type VersionMap = HashMap<String, Version>;

#[derive(Debug, Error)]
pub enum ChannelizeError {
    #[error("could not determine version for bundle {bundle:?}: no olm.package property")]
    MissingVersion { bundle: String },
    #[error("parse semver {version:?} for bundle {bundle:?}: {source}")]
    MalformedVersion {
        bundle: String,
        version: String,
        #[source]
        source: VersionError,
    },
    #[error("parse properties for bundle {bundle:?}: {source}")]
    Properties {
        bundle: String,
        #[source]
        source: PropertyError,
    },
    #[error("build channel {channel:?} for bundle {bundle:?}: {source}")]
    BuildProperty {
        bundle: String,
        channel: String,
        #[source]
        source: PropertyError,
    },
}

/// A strategy for rebuilding the channels of the bundles of a single package
pub trait Channelizer {
    /// Rewrite the channel memberships & upgrade edges of `bundles`, returning the default
    /// channel of the package if one should be set.
    ///
    /// `bundles` may be reordered. On error, no bundle's properties have been changed.
    fn channelize(&self, bundles: &mut [&mut Bundle]) -> Result<Option<String>, ChannelizeError>;
}

/// Leaves the bundles as they are
#[derive(Clone, Copy, Debug, Default)]
pub struct Unchanged;

impl Channelizer for Unchanged {
    fn channelize(&self, _: &mut [&mut Bundle]) -> Result<Option<String>, ChannelizeError> {
        Ok(None)
    }
}

/// Derives all channels purely from semver
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Semver {
    /// Put pre-releases into the release channels instead of separate `pre-vX.Y` channels
    pub combine_prereleases: bool,
    /// Order versions of equal precedence by their build metadata (highest first) instead of
    /// keeping their input order
    pub consider_build_metadata: bool,
    /// Let the lowest bundle of each minor series skip to the highest bundle of the next lower
    /// minor series of the same major version
    pub connect_minor_channels: bool,
}

impl Default for Semver {
    fn default() -> Self {
        Semver {
            combine_prereleases: true,
            consider_build_metadata: true,
            connect_minor_channels: true,
        }
    }
}

/// The upgrade graph properties planned for a single bundle
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Edges {
    /// The channels the bundle is a member of, each with what it replaces in there
    pub channels: Vec<ChannelProperty>,
    /// The bundle this one can skip to
    pub skips: Option<String>,
}

impl Edges {
    /// Build the properties for these edges, in the order they get appended to the bundle
    fn to_properties(&self, bundle: &str) -> Result<Vec<Property>, ChannelizeError> {
        let mut out = Vec::with_capacity(self.channels.len() + 1);

        if let Some(ref skips) = self.skips {
            tracing::debug!("Bundle {bundle:?} skips {skips:?}");
            out.push(build_skips(skips));
        }

        for channel in &self.channels {
            if channel.replaces.is_empty() {
                tracing::debug!(
                    "Bundle {bundle:?} replaces nothing in channel {:?}",
                    channel.name
                );
            } else {
                tracing::debug!(
                    "Bundle {bundle:?} replaces {:?} in channel {:?}",
                    channel.replaces,
                    channel.name
                );
            }

            let property = build_channel(channel).map_err(|source| {
                ChannelizeError::BuildProperty {
                    bundle: bundle.to_owned(),
                    channel: channel.name.clone(),
                    source,
                }
            })?;
            out.push(property);
        }

        Ok(out)
    }
}

/// The channel spanning all versions of one major version
pub fn major_channel(version: &Version) -> String {
    format!("v{}", version.major)
}

/// The channel spanning all versions of one minor series
pub fn minor_channel(version: &Version) -> String {
    format!("v{}.{}", version.major, version.minor)
}

/// The channel holding the pre-releases of one minor series, if they aren't combined with the
/// releases
pub fn prerelease_channel(version: &Version) -> String {
    format!("pre-v{}.{}", version.major, version.minor)
}

/// Resolve the version of a single bundle from its `olm.package` property
pub fn resolve_version(bundle: &Bundle) -> Result<Version, ChannelizeError> {
    let properties = bundle
        .parsed_properties()
        .map_err(|source| ChannelizeError::Properties {
            bundle: bundle.name.clone(),
            source,
        })?;

    let package = properties
        .packages
        .first()
        .ok_or_else(|| ChannelizeError::MissingVersion {
            bundle: bundle.name.clone(),
        })?;

    parse_tolerant(&package.version).map_err(|source| ChannelizeError::MalformedVersion {
        bundle: bundle.name.clone(),
        version: package.version.clone(),
        source,
    })
}

/// Resolve the versions of all bundles, failing on the first bundle without a valid version
pub fn resolve_versions<'a>(
    bundles: impl IntoIterator<Item = &'a Bundle>,
) -> Result<VersionMap, ChannelizeError> {
    itertools::process_results(
        bundles
            .into_iter()
            .map(|bundle| -> Result<_, ChannelizeError> {
                Ok((bundle.name.clone(), resolve_version(bundle)?))
            }),
        |iter| iter.collect(),
    )
}

/// Sort bundles by descending precedence.
///
/// The sort is stable: bundles of equal precedence keep their relative input order, unless
/// `consider_build_metadata` is set, in which case they are ordered by descending build metadata
/// (see [`cmp_build`]).
///
/// Every bundle has to be present in `versions`.
pub fn sort_bundles(
    bundles: &mut [&mut Bundle],
    versions: &VersionMap,
    consider_build_metadata: bool,
) {
    bundles.sort_by(|a, b| {
        let (a, b) = (&versions[&a.name], &versions[&b.name]);
        let order = b.cmp_precedence(a);
        if consider_build_metadata {
            order.then_with(|| cmp_build(b, a))
        } else {
            order
        }
    });
}

/// The default channel for already sorted bundles: the major channel of the highest version
pub fn select_default_channel(bundles: &[&mut Bundle], versions: &VersionMap) -> Option<String> {
    let first = bundles.first()?;
    Some(major_channel(&versions[&first.name]))
}

/// Remove all upgrade graph properties of a bundle and append the given ones instead
fn replace_upgrade_edges(bundle: &mut Bundle, properties: Vec<Property>) {
    bundle
        .properties
        .retain(|property| !property.is_upgrade_edge());
    bundle.properties.extend(properties);
}

impl Semver {
    /// Plan the edges of a bundle with the given version, given its successor in the sorted order
    /// (the next lower bundle as a pair of name & version) if there is one
    pub fn plan_edges(&self, version: &Version, next: Option<(&str, &Version)>) -> Edges {
        let same_major = next.is_some_and(|(_, next)| next.major == version.major);
        let same_minor = same_major && next.is_some_and(|(_, next)| next.minor == version.minor);
        let next_is_prerelease = next.is_some_and(|(_, next)| is_prerelease(next));

        let replaces = |connected: bool| match next {
            Some((name, _)) if connected => name.to_owned(),
            _ => String::new(),
        };

        let channels = if is_prerelease(version) && !self.combine_prereleases {
            vec![ChannelProperty {
                name: prerelease_channel(version),
                replaces: replaces(same_minor && next_is_prerelease),
            }]
        } else {
            let follows_next = !next_is_prerelease || self.combine_prereleases;
            vec![
                ChannelProperty {
                    name: major_channel(version),
                    replaces: replaces(same_major && follows_next),
                },
                ChannelProperty {
                    name: minor_channel(version),
                    replaces: replaces(same_minor && follows_next),
                },
            ]
        };

        let skips = match next {
            Some((name, _)) if self.connect_minor_channels && same_major && !same_minor => {
                Some(name.to_owned())
            }
            _ => None,
        };

        Edges { channels, skips }
    }
}

impl Channelizer for Semver {
    fn channelize(&self, bundles: &mut [&mut Bundle]) -> Result<Option<String>, ChannelizeError> {
        let versions = resolve_versions(bundles.iter().map(|bundle| &**bundle))?;
        sort_bundles(bundles, &versions, self.consider_build_metadata);

        let sorted = bundles
            .iter()
            .map(|bundle| (bundle.name.as_str(), &versions[&bundle.name]))
            .collect::<Vec<_>>();

        // NOTE: Every property is built before the first bundle gets changed
        let mut rebuilt = Vec::with_capacity(sorted.len());
        for (idx, &(name, version)) in sorted.iter().enumerate() {
            let next = sorted.get(idx + 1).copied();
            rebuilt.push(self.plan_edges(version, next).to_properties(name)?);
        }

        for (bundle, properties) in bundles.iter_mut().zip(rebuilt) {
            replace_upgrade_edges(bundle, properties);
        }

        let default_channel = select_default_channel(bundles, &versions);
        if let Some(ref channel) = default_channel {
            tracing::info!("Highest version selects default channel {channel:?}");
        }
        Ok(default_channel)
    }
}
