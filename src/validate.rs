// Copyright (C) 2026 by GiGa infosystems

//! Consistency checks on a [`DeclarativeConfig`] before it gets written back, see [`validate`]

use crate::declcfg::DeclarativeConfig;
use crate::property::PropertyError;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("bundle {bundle:?} references unknown package {package:?}")]
    UnknownPackage { bundle: String, package: String },
    #[error("parse properties for bundle {bundle:?}: {source}")]
    Properties {
        bundle: String,
        #[source]
        source: PropertyError,
    },
    #[error("bundle {bundle:?} must have exactly one olm.package property, found {count}")]
    PackageProperty { bundle: String, count: usize },
    #[error("bundle {bundle:?} of package {package:?} has an olm.package property for {found:?}")]
    PackageMismatch {
        bundle: String,
        package: String,
        found: String,
    },
    #[error("bundle {bundle:?} is not a member of any channel")]
    NoChannel { bundle: String },
    #[error("channel {channel:?} of package {package:?} must have exactly one head, found {heads:?}")]
    Heads {
        package: String,
        channel: String,
        heads: Vec<String>,
    },
    #[error("channel {channel:?} of package {package:?} has a replaces cycle through {bundle:?}")]
    Cycle {
        package: String,
        channel: String,
        bundle: String,
    },
    #[error("default channel {channel:?} of package {package:?} does not exist")]
    UnknownDefaultChannel { package: String, channel: String },
}

/// A bundle's edges within one channel
struct Member {
    replaces: String,
    skips: Vec<String>,
}

/// Channel name to the members of that channel by bundle name
type Channels<'a> = BTreeMap<String, BTreeMap<&'a str, Member>>;

/// Check a full declarative config for consistency:
/// * Every bundle belongs to a known package, and has exactly one matching `olm.package` property
/// * Every bundle is a member of at least one channel
/// * Every channel has exactly one head (a member neither replaced nor skipped by any other
///   member), and following `replaces` from the head never loops
/// * The default channel of every package exists
pub fn validate(cfg: &DeclarativeConfig) -> Result<(), ValidationError> {
    let mut packages = cfg
        .packages
        .iter()
        .map(|package| (package.name.as_str(), Channels::new()))
        .collect::<BTreeMap<_, _>>();

    for bundle in &cfg.bundles {
        let channels = packages.get_mut(bundle.package.as_str()).ok_or_else(|| {
            ValidationError::UnknownPackage {
                bundle: bundle.name.clone(),
                package: bundle.package.clone(),
            }
        })?;

        let properties = bundle
            .parsed_properties()
            .map_err(|source| ValidationError::Properties {
                bundle: bundle.name.clone(),
                source,
            })?;

        match properties.packages.as_slice() {
            [package] if package.package_name == bundle.package => (),
            [package] => {
                return Err(ValidationError::PackageMismatch {
                    bundle: bundle.name.clone(),
                    package: bundle.package.clone(),
                    found: package.package_name.clone(),
                });
            }
            packages => {
                return Err(ValidationError::PackageProperty {
                    bundle: bundle.name.clone(),
                    count: packages.len(),
                });
            }
        }

        if properties.channels.is_empty() {
            return Err(ValidationError::NoChannel {
                bundle: bundle.name.clone(),
            });
        }

        for channel in properties.channels {
            channels.entry(channel.name).or_default().insert(
                &bundle.name,
                Member {
                    replaces: channel.replaces,
                    skips: properties.skips.clone(),
                },
            );
        }
    }

    for package in &cfg.packages {
        let channels = &packages[package.name.as_str()];
        for (channel, members) in channels {
            validate_channel(&package.name, channel, members)?;
        }

        if let Some(ref channel) = package.default_channel
            && !channels.contains_key(channel)
        {
            return Err(ValidationError::UnknownDefaultChannel {
                package: package.name.clone(),
                channel: channel.clone(),
            });
        }
    }

    Ok(())
}

fn validate_channel(
    package: &str,
    channel: &str,
    members: &BTreeMap<&str, Member>,
) -> Result<(), ValidationError> {
    let incoming = members
        .values()
        .flat_map(|member| {
            (!member.replaces.is_empty())
                .then_some(&member.replaces)
                .into_iter()
                .chain(&member.skips)
        })
        .map(String::as_str)
        .collect::<BTreeSet<_>>();

    let heads = members
        .keys()
        .copied()
        .filter(|bundle| !incoming.contains(bundle))
        .collect::<Vec<_>>();
    let &[head] = heads.as_slice() else {
        return Err(ValidationError::Heads {
            package: package.to_owned(),
            channel: channel.to_owned(),
            heads: heads.iter().map(|head| (*head).to_owned()).collect(),
        });
    };

    // NOTE: `replaces` may point outside of the channel, which ends the chain
    let mut seen = BTreeSet::new();
    let mut current = head;
    while let Some(member) = members.get(current) {
        if !seen.insert(current) {
            return Err(ValidationError::Cycle {
                package: package.to_owned(),
                channel: channel.to_owned(),
                bundle: current.to_owned(),
            });
        }
        if member.replaces.is_empty() {
            break;
        }
        current = &member.replaces;
    }

    Ok(())
}
