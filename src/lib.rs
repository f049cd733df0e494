// Copyright (C) 2026 by GiGa infosystems

//! `channelizer` is an application that completely rewrites the channels of a package in a
//! declarative catalog config, based only on the semantic versions of its bundles.
//!
//! The order of operations is:
//! * Load the declarative config directory with [`declcfg::load_dir`]
//! * Rebuild channel memberships, `replaces` & `skips` edges of the package's bundles and pick a
//!   default channel with a [`channelizer::Channelizer`] (usually [`channelizer::Semver`])
//! * Check the result for consistency with [`validate::validate`]
//! * Write the directory back with [`declcfg::write_dir`]
//!
//! Every major version gets a `vX` channel and every minor version a `vX.Y` channel. The graph is
//! rebuilt from scratch on each run: existing channel, skips & skip range properties of the
//! package's bundles are discarded.

pub mod channelizer;
pub mod declcfg;
pub mod property;
pub mod validate;
pub mod version;
