// Copyright (C) 2026 by GiGa infosystems

//! Typed access to the property list attached to each bundle
//!
//! Properties are stored as `{"type": ..., "value": ...}` pairs. Only the types that make up the
//! upgrade graph (and the package property carrying the version) are interpreted here, every
//! other property is kept as an opaque [`serde_json::Value`].

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

pub const TYPE_PACKAGE: &str = "olm.package";
pub const TYPE_CHANNEL: &str = "olm.channel";
pub const TYPE_SKIPS: &str = "olm.skips";
pub const TYPE_SKIP_RANGE: &str = "olm.skipRange";

/// A single entry of a bundle's property list
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Property {
    #[serde(rename = "type")]
    pub ty: String,
    pub value: serde_json::Value,
}

impl Property {
    /// Whether this property is part of the upgrade graph (channel membership, skips or skip
    /// range), i.e. whether it gets discarded when rebuilding the graph
    pub fn is_upgrade_edge(&self) -> bool {
        matches!(
            self.ty.as_str(),
            TYPE_CHANNEL | TYPE_SKIPS | TYPE_SKIP_RANGE
        )
    }
}

/// The value of an `olm.package` property
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageProperty {
    pub package_name: String,
    pub version: String,
}

/// The value of an `olm.channel` property
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct ChannelProperty {
    pub name: String,
    /// The bundle this one replaces within the channel, empty if it replaces nothing
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub replaces: String,
}

#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("invalid {ty:?} property: {source}")]
    Invalid {
        ty: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not build {ty:?} property: {source}")]
    Build {
        ty: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The interpreted properties of a bundle, see [`Properties::parse`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Properties {
    pub packages: Vec<PackageProperty>,
    pub channels: Vec<ChannelProperty>,
    pub skips: Vec<String>,
    pub skip_ranges: Vec<String>,
    /// Everything that isn't interpreted, in its original order
    pub others: Vec<Property>,
}

impl Properties {
    /// Sort a property list by type, failing if the value of any known type is malformed
    pub fn parse(properties: &[Property]) -> Result<Self, PropertyError> {
        let mut out = Properties::default();
        for property in properties {
            match property.ty.as_str() {
                TYPE_PACKAGE => out.packages.push(parse_value(property)?),
                TYPE_CHANNEL => out.channels.push(parse_value(property)?),
                TYPE_SKIPS => out.skips.push(parse_value(property)?),
                TYPE_SKIP_RANGE => out.skip_ranges.push(parse_value(property)?),
                _ => out.others.push(property.clone()),
            }
        }
        Ok(out)
    }
}

fn parse_value<T: DeserializeOwned>(property: &Property) -> Result<T, PropertyError> {
    T::deserialize(&property.value).map_err(|source| PropertyError::Invalid {
        ty: property.ty.clone(),
        source,
    })
}

/// Build a property of the given type from a structured value
pub fn build(ty: &str, value: &impl Serialize) -> Result<Property, PropertyError> {
    let value = serde_json::to_value(value).map_err(|source| PropertyError::Build {
        ty: ty.to_owned(),
        source,
    })?;
    Ok(Property {
        ty: ty.to_owned(),
        value,
    })
}

/// Build an `olm.channel` property
pub fn build_channel(channel: &ChannelProperty) -> Result<Property, PropertyError> {
    build(TYPE_CHANNEL, channel)
}

/// Build an `olm.skips` property pointing at the given bundle name
pub fn build_skips(bundle: &str) -> Property {
    Property {
        ty: TYPE_SKIPS.to_owned(),
        value: serde_json::Value::String(bundle.to_owned()),
    }
}

/// Build an `olm.package` property
pub fn build_package(package_name: &str, version: &str) -> Result<Property, PropertyError> {
    build(
        TYPE_PACKAGE,
        &PackageProperty {
            package_name: package_name.to_owned(),
            version: version.to_owned(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prop(ty: &str, value: serde_json::Value) -> Property {
        Property {
            ty: ty.to_owned(),
            value,
        }
    }

    #[test]
    fn parse_sorts_by_type() {
        let properties = vec![
            prop("olm.gvk", json!({"group": "example.com", "kind": "Foo", "version": "v1"})),
            prop(TYPE_PACKAGE, json!({"packageName": "foo", "version": "1.2.3"})),
            prop(TYPE_CHANNEL, json!({"name": "stable", "replaces": "foo.v1.2.2"})),
            prop(TYPE_CHANNEL, json!({"name": "fast"})),
            prop(TYPE_SKIPS, json!("foo.v1.2.1")),
            prop(TYPE_SKIP_RANGE, json!("<1.2.3")),
        ];

        let parsed = Properties::parse(&properties).unwrap();
        assert_eq!(
            parsed.packages,
            [PackageProperty {
                package_name: "foo".to_owned(),
                version: "1.2.3".to_owned(),
            }]
        );
        assert_eq!(parsed.channels.len(), 2);
        assert_eq!(parsed.channels[0].replaces, "foo.v1.2.2");
        assert_eq!(parsed.channels[1].replaces, "");
        assert_eq!(parsed.skips, ["foo.v1.2.1"]);
        assert_eq!(parsed.skip_ranges, ["<1.2.3"]);
        assert_eq!(parsed.others, properties[..1]);
    }

    #[test]
    fn malformed_known_property_is_an_error() {
        let properties = vec![prop(TYPE_PACKAGE, json!({"packageName": "foo"}))];
        let err = Properties::parse(&properties).unwrap_err();
        assert!(matches!(err, PropertyError::Invalid { ref ty, .. } if ty == TYPE_PACKAGE));
    }

    #[test]
    fn channel_without_replaces_omits_the_field() {
        let built = build_channel(&ChannelProperty {
            name: "v1".to_owned(),
            replaces: String::new(),
        })
        .unwrap();
        assert_eq!(built, prop(TYPE_CHANNEL, json!({"name": "v1"})));

        let built = build_channel(&ChannelProperty {
            name: "v1".to_owned(),
            replaces: "foo.v1.0.0".to_owned(),
        })
        .unwrap();
        assert_eq!(
            built,
            prop(TYPE_CHANNEL, json!({"name": "v1", "replaces": "foo.v1.0.0"}))
        );
    }

    #[test]
    fn upgrade_edge_types() {
        assert!(build_skips("foo.v1").is_upgrade_edge());
        assert!(prop(TYPE_SKIP_RANGE, json!(">=1.0.0 <1.2.0")).is_upgrade_edge());
        assert!(!build_package("foo", "1.0.0").unwrap().is_upgrade_edge());
    }
}
