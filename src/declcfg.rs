// Copyright (C) 2026 by GiGa infosystems

//! Loading & writing declarative catalog configuration directories
//!
//! A declarative config directory contains any number of JSON or YAML files, each holding a
//! stream of blobs (concatenated JSON objects or multiple YAML documents). Every blob has a
//! `schema`: `olm.package` & `olm.bundle` blobs are interpreted, everything else is carried along
//! unchanged as a [`Meta`].

use crate::property::{Properties, Property, PropertyError};
use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::{
    Result,
    eyre::{WrapErr, bail, eyre},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use walkdir::WalkDir;

pub const SCHEMA_PACKAGE: &str = "olm.package";
pub const SCHEMA_BUNDLE: &str = "olm.bundle";

/// The directory blobs without an associated package get written to
pub const GLOBAL_DIR: &str = "__global";

/// An `olm.package` blob
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub schema: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_channel: Option<String>,
    /// Fields this tool doesn't interpret (`description`, `icon`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An `olm.bundle` blob, a single release of a package
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub schema: String,
    pub name: String,
    pub package: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default)]
    pub properties: Vec<Property>,
    /// Fields this tool doesn't interpret (`relatedImages`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Bundle {
    /// A bundle without an image or any extra fields
    pub fn new(
        name: impl Into<String>,
        package: impl Into<String>,
        properties: Vec<Property>,
    ) -> Self {
        Bundle {
            schema: SCHEMA_BUNDLE.to_owned(),
            name: name.into(),
            package: package.into(),
            image: String::new(),
            properties,
            extra: Map::new(),
        }
    }

    /// Interpret the property list, see [`Properties::parse`]
    pub fn parsed_properties(&self) -> Result<Properties, PropertyError> {
        Properties::parse(&self.properties)
    }
}

/// A blob of any other schema, kept verbatim
#[derive(Clone, PartialEq, Debug)]
pub struct Meta {
    pub schema: String,
    pub package: Option<String>,
    pub blob: Value,
}

/// The file format blobs are written in
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, clap::ValueEnum)]
pub enum Format {
    #[default]
    Json,
    Yaml,
}

impl Format {
    fn from_path(path: &Utf8Path) -> Option<Self> {
        match path.extension()? {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Yaml => "yaml",
        }
    }

    fn parse_blobs(self, contents: &str) -> Result<Vec<Value>> {
        let blobs = match self {
            Format::Json => serde_json::Deserializer::from_str(contents)
                .into_iter::<Value>()
                .collect::<Result<Vec<_>, _>>()?,
            Format::Yaml => serde_yaml::Deserializer::from_str(contents)
                .map(Value::deserialize)
                .filter(|blob| !matches!(blob, Ok(Value::Null)))
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(blobs)
    }

    fn render_blobs(self, blobs: &[Value]) -> Result<String> {
        let mut out = String::new();
        for blob in blobs {
            match self {
                Format::Json => {
                    out.push_str(&serde_json::to_string_pretty(blob)?);
                    out.push('\n');
                }
                Format::Yaml => {
                    out.push_str("---\n");
                    out.push_str(&serde_yaml::to_string(blob)?);
                }
            }
        }
        Ok(out)
    }
}

/// The full contents of a declarative config directory
#[derive(Clone, PartialEq, Debug, Default)]
pub struct DeclarativeConfig {
    pub packages: Vec<Package>,
    pub bundles: Vec<Bundle>,
    pub others: Vec<Meta>,
}

impl DeclarativeConfig {
    fn push_blob(&mut self, blob: Value) -> Result<()> {
        let schema = blob
            .get("schema")
            .and_then(Value::as_str)
            .ok_or_else(|| eyre!("Blob without a `schema` field"))?
            .to_owned();

        match schema.as_str() {
            SCHEMA_PACKAGE => self.packages.push(serde_json::from_value(blob)?),
            SCHEMA_BUNDLE => self.bundles.push(serde_json::from_value(blob)?),
            _ => {
                let package = blob
                    .get("package")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                self.others.push(Meta {
                    schema,
                    package,
                    blob,
                });
            }
        }

        Ok(())
    }

    /// Mutable references to all bundles of the given package, in the order they were loaded
    pub fn bundles_for_mut(&mut self, package: &str) -> Vec<&mut Bundle> {
        self.bundles
            .iter_mut()
            .filter(|bundle| bundle.package == package)
            .collect()
    }

    /// Set the default channel of the given package, returning whether the package exists
    pub fn set_default_channel(&mut self, package: &str, channel: &str) -> bool {
        let mut found = false;
        for pkg in self.packages.iter_mut().filter(|pkg| pkg.name == package) {
            pkg.default_channel = Some(channel.to_owned());
            found = true;
        }
        found
    }

    /// Group all blobs by the package they belong to, the package blob first, then its bundles,
    /// then everything else
    fn blobs_by_package(&self) -> Result<BTreeMap<&str, Vec<Value>>> {
        let mut out = BTreeMap::<&str, Vec<Value>>::new();
        for package in &self.packages {
            out.entry(&package.name)
                .or_default()
                .push(serde_json::to_value(package)?);
        }
        for bundle in &self.bundles {
            out.entry(&bundle.package)
                .or_default()
                .push(serde_json::to_value(bundle)?);
        }
        for meta in &self.others {
            out.entry(meta.package.as_deref().unwrap_or(GLOBAL_DIR))
                .or_default()
                .push(meta.blob.clone());
        }
        Ok(out)
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Load every JSON & YAML file below `root` (skipping hidden files & directories)
pub fn load_dir(root: &Utf8Path) -> Result<DeclarativeConfig> {
    if !root.is_dir() {
        bail!("Declarative config directory {root:?} doesn't exist");
    }

    let mut cfg = DeclarativeConfig::default();
    let entries = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));

    for entry in entries {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = Utf8Path::from_path(entry.path())
            .ok_or_else(|| eyre!("Non UTF-8 path in config directory: {:?}", entry.path()))?;
        let Some(format) = Format::from_path(path) else {
            continue;
        };

        let contents =
            fs::read_to_string(path).wrap_err_with(|| format!("Failed to read {path:?}"))?;
        let blobs = format
            .parse_blobs(&contents)
            .wrap_err_with(|| format!("Failed to parse {path:?}"))?;
        for blob in blobs {
            cfg.push_blob(blob)
                .wrap_err_with(|| format!("Invalid blob in {path:?}"))?;
        }
    }

    Ok(cfg)
}

fn write_tree(cfg: &DeclarativeConfig, root: &Utf8Path, format: Format) -> Result<()> {
    fs::create_dir_all(root)?;
    for (package, blobs) in cfg.blobs_by_package()? {
        let dir = root.join(package);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("index.{}", format.extension()));
        fs::write(&path, format.render_blobs(&blobs)?)
            .wrap_err_with(|| format!("Failed to write {path:?}"))?;
    }
    Ok(())
}

/// Replace the directory at `root` with the contents of `cfg`, one directory per package.
///
/// The new tree is written next to `root` first, so a failure while writing leaves the old
/// directory intact.
pub fn write_dir(cfg: &DeclarativeConfig, root: &Utf8Path, format: Format) -> Result<()> {
    // `.` and `..` have no file name to derive the sibling from
    let root = &if root.exists() {
        root.canonicalize_utf8()
            .wrap_err_with(|| format!("Failed to resolve {root:?}"))?
    } else {
        root.to_owned()
    };
    let name = root
        .file_name()
        .ok_or_else(|| eyre!("Cannot replace config directory {root:?}"))?;
    let tmp_root: Utf8PathBuf = root.with_file_name(format!(".{name}.update"));

    if tmp_root.exists() {
        fs::remove_dir_all(&tmp_root)?;
    }
    write_tree(cfg, &tmp_root, format)?;

    if root.exists() {
        fs::remove_dir_all(root).wrap_err_with(|| format!("Failed to remove {root:?}"))?;
    }
    fs::rename(&tmp_root, root)
        .wrap_err_with(|| format!("Failed to move {tmp_root:?} to {root:?}"))?;
    Ok(())
}
