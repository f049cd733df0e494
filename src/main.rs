// Copyright (C) 2026 by GiGa infosystems

use camino::Utf8PathBuf;
use clap::{ArgAction, Parser};
use color_eyre::{Result, eyre::WrapErr};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use channelizer::channelizer::{Channelizer, Semver};
use channelizer::declcfg::{self, Bundle, DeclarativeConfig, Format};
use channelizer::property::ChannelProperty;
use channelizer::validate::validate;

fn output_json(value: &impl Serialize) -> Result<()> {
    use std::io::{self, IsTerminal};

    if io::stdout().is_terminal() {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", serde_json::to_string(value)?);
    }

    Ok(())
}

/// Rebuild the channels of a package based on semver.
///
/// This completely rewrites the channels of one package in a declarative config directory: every
/// major version gets a `vX` channel and every minor version a `vX.Y` channel, with `replaces`
/// edges from each bundle to the next lower one. The default channel is set to the major channel
/// of the highest version.
#[derive(Parser, Debug)]
#[command(version, about, long_about)]
struct Args {
    /// The declarative config directory to rewrite
    configs: Utf8PathBuf,
    /// The name of the package whose channels get rebuilt
    package: String,
    /// Put pre-releases into the `vX` & `vX.Y` channels instead of separate `pre-vX.Y` channels
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    combine_prereleases: bool,
    /// Order bundles of equal version precedence by their build metadata
    ///
    /// If disabled, bundles of equal precedence keep the order they were loaded in.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    consider_build_metadata: bool,
    /// Let the lowest bundle of each minor version skip to the highest bundle of the next lower
    /// minor version
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    connect_minor_channels: bool,
    /// The format the rewritten config files are written in
    #[arg(short = 'f', long, value_enum, default_value_t = Format::Json)]
    output_format: Format,
    /// Print the rebuilt upgrade graph as JSON instead of rewriting the directory
    #[arg(short = 'n', long)]
    dry_run: bool,
    /// Write the result even if the rebuilt config is inconsistent
    #[arg(long)]
    skip_validation: bool,
}

/// A bundle in the rebuilt upgrade graph, for `--dry-run`
#[derive(Serialize, Debug)]
struct BundleSummary {
    name: String,
    version: Option<String>,
    channels: Vec<ChannelProperty>,
    skips: Vec<String>,
}

impl TryFrom<&Bundle> for BundleSummary {
    type Error = color_eyre::Report;

    fn try_from(bundle: &Bundle) -> Result<Self> {
        let properties = bundle.parsed_properties()?;
        Ok(BundleSummary {
            name: bundle.name.clone(),
            version: properties
                .packages
                .into_iter()
                .next()
                .map(|package| package.version),
            channels: properties.channels,
            skips: properties.skips,
        })
    }
}

/// The rebuilt upgrade graph of a package, for `--dry-run`
#[derive(Serialize, Debug)]
struct GraphSummary {
    package: String,
    default_channel: Option<String>,
    /// Ordered from highest to lowest version
    bundles: Vec<BundleSummary>,
}

struct AppContext {
    configs: Utf8PathBuf,
    package: String,
    channelizer: Semver,
    format: Format,
    dry_run: bool,
    validate: bool,
}

impl From<Args> for AppContext {
    fn from(args: Args) -> Self {
        AppContext {
            configs: args.configs,
            package: args.package,
            channelizer: Semver {
                combine_prereleases: args.combine_prereleases,
                consider_build_metadata: args.consider_build_metadata,
                connect_minor_channels: args.connect_minor_channels,
            },
            format: args.output_format,
            dry_run: args.dry_run,
            validate: !args.skip_validation,
        }
    }
}

impl AppContext {
    /// Load the configs and rebuild the channels of the package, without writing anything
    fn rebuild(&self) -> Result<(DeclarativeConfig, GraphSummary)> {
        let mut cfg = declcfg::load_dir(&self.configs)?;

        let (default_channel, bundles) = {
            let mut bundles = cfg.bundles_for_mut(&self.package);
            if bundles.is_empty() {
                tracing::warn!("No bundles found for package {:?}", self.package);
            }

            let default_channel = self
                .channelizer
                .channelize(&mut bundles)
                .wrap_err_with(|| format!("Failed to rebuild channels of {:?}", self.package))?;

            let summaries = bundles
                .iter()
                .map(|bundle| BundleSummary::try_from(&**bundle))
                .collect::<Result<Vec<_>>>()?;
            (default_channel, summaries)
        };

        if let Some(ref channel) = default_channel {
            if cfg.set_default_channel(&self.package, channel) {
                tracing::info!(
                    "Setting default channel {channel:?} for package {:?}",
                    self.package
                );
            } else {
                tracing::warn!(
                    "Package {:?} has no olm.package blob, not setting default channel {channel:?}",
                    self.package
                );
            }
        }

        if self.validate {
            validate(&cfg).wrap_err("The rebuilt declarative config is invalid")?;
        }

        let summary = GraphSummary {
            package: self.package.clone(),
            default_channel,
            bundles,
        };
        Ok((cfg, summary))
    }

    fn run(&self) -> Result<()> {
        let (cfg, summary) = self.rebuild()?;

        if self.dry_run {
            return output_json(&summary);
        }

        declcfg::write_dir(&cfg, &self.configs, self.format)
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    AppContext::from(Args::parse()).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::fs;

    fn bundle_blob(version: &str) -> Value {
        json!({
            "schema": "olm.bundle",
            "name": format!("foo.v{version}"),
            "package": "foo",
            "image": format!("quay.io/example/foo-bundle:v{version}"),
            "properties": [
                {"type": "olm.package", "value": {"packageName": "foo", "version": version}},
                {"type": "olm.channel", "value": {"name": "stable"}}
            ]
        })
    }

    /// A config directory holding `foo` bundles, with or without the `olm.package` blob
    fn configs(dir: &tempfile::TempDir, with_package: bool) -> Utf8PathBuf {
        let root = Utf8PathBuf::from_path_buf(dir.path().join("configs")).unwrap();
        let mut blobs = Vec::new();
        if with_package {
            blobs.push(json!({"schema": "olm.package", "name": "foo", "defaultChannel": "stable"}));
        }
        blobs.extend(["1.0.0", "1.1.0", "2.0.0"].map(bundle_blob));
        let contents = blobs
            .iter()
            .map(|blob| serde_json::to_string(blob).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("catalog.json"), contents).unwrap();
        root
    }

    fn context(args: &[&str]) -> AppContext {
        AppContext::from(Args::try_parse_from(args).unwrap())
    }

    #[test]
    fn flags_default_to_true() {
        let ctx = context(&["channelizer", "configs", "foo"]);
        assert_eq!(ctx.channelizer, Semver::default());
        assert_eq!(ctx.format, Format::Json);
        assert!(!ctx.dry_run);
        assert!(ctx.validate);
    }

    #[test]
    fn flags_map_onto_the_channelizer() {
        let ctx = context(&[
            "channelizer",
            "configs",
            "foo",
            "--combine-prereleases=false",
            "--consider-build-metadata",
            "false",
            "--connect-minor-channels=true",
            "-f",
            "yaml",
            "-n",
            "--skip-validation",
        ]);
        assert_eq!(ctx.configs.as_str(), "configs");
        assert_eq!(ctx.package, "foo");
        assert_eq!(
            ctx.channelizer,
            Semver {
                combine_prereleases: false,
                consider_build_metadata: false,
                connect_minor_channels: true,
            }
        );
        assert_eq!(ctx.format, Format::Yaml);
        assert!(ctx.dry_run);
        assert!(!ctx.validate);
    }

    #[test]
    fn dry_run_summarizes_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let root = configs(&dir, true);
        let ctx = context(&["channelizer", root.as_str(), "foo", "--dry-run"]);

        let (cfg, summary) = ctx.rebuild().unwrap();
        assert_eq!(cfg.packages[0].default_channel.as_deref(), Some("v2"));
        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            json!({
                "package": "foo",
                "default_channel": "v2",
                "bundles": [
                    {
                        "name": "foo.v2.0.0",
                        "version": "2.0.0",
                        "channels": [{"name": "v2"}, {"name": "v2.0"}],
                        "skips": []
                    },
                    {
                        "name": "foo.v1.1.0",
                        "version": "1.1.0",
                        "channels": [{"name": "v1", "replaces": "foo.v1.0.0"}, {"name": "v1.1"}],
                        "skips": ["foo.v1.0.0"]
                    },
                    {
                        "name": "foo.v1.0.0",
                        "version": "1.0.0",
                        "channels": [{"name": "v1"}, {"name": "v1.0"}],
                        "skips": []
                    }
                ]
            })
        );

        ctx.run().unwrap();
        assert!(root.join("catalog.json").is_file());
        assert!(!root.join("foo").exists());
    }

    #[test]
    fn run_rewrites_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = configs(&dir, true);
        context(&["channelizer", root.as_str(), "foo"]).run().unwrap();

        assert!(!root.join("catalog.json").exists());
        let cfg = declcfg::load_dir(&root).unwrap();
        assert_eq!(cfg.packages[0].default_channel.as_deref(), Some("v2"));
        assert_eq!(cfg.bundles.len(), 3);
    }

    #[test]
    fn missing_package_blob_only_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let root = configs(&dir, false);

        let err = context(&["channelizer", root.as_str(), "foo"])
            .rebuild()
            .unwrap_err();
        assert!(format!("{err:?}").contains("invalid"));

        let (cfg, summary) = context(&["channelizer", root.as_str(), "foo", "--skip-validation"])
            .rebuild()
            .unwrap();
        assert!(cfg.packages.is_empty());
        assert_eq!(summary.default_channel.as_deref(), Some("v2"));
    }
}
