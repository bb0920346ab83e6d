//! Run configuration for trawl.
//!
//! Values merge from a TOML file (an explicit `--config` path, or
//! `trawl.toml` in the working directory) and `TRAWL_`-prefixed
//! environment variables, environment last. Nested keys use `__`:
//! `TRAWL_CHECKPOINT__NAMESPACE=nightly`.

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Config file picked up from the working directory when no explicit
/// path is given. Absence is fine; the environment may carry everything.
const DEFAULT_CONFIG_FILE: &str = "trawl.toml";

const DEFAULT_TOTAL_SEGMENTS: usize = 100;
/// DynamoDB rejects TotalSegments above this; other backends are unlikely
/// to do anything useful with a million-way fan-out either.
const MAX_TOTAL_SEGMENTS: usize = 1_000_000;

/// One scan run's configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RunConfig {
    /// Table to scan. Required; the only fatal omission.
    #[serde(default)]
    pub table: String,
    /// Number of segments to split the table into, which is also the
    /// concurrency of the scan. Must match the count any existing
    /// checkpoints for the namespace were written under.
    #[serde(default = "default_total_segments")]
    pub total_segments: usize,
    /// Strongly-consistent scan reads.
    #[serde(default)]
    pub consistent_read: bool,
    /// Store region. Falls back to the provider chain's region.
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint override for store-compatible services.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Durable progress checkpointing. Absent = the scan always starts
    /// from scratch and persists nothing.
    #[serde(default)]
    pub checkpoint: Option<CheckpointConfig>,
}

/// Where checkpoints live. Table and namespace are required together;
/// a half-configured checkpoint section is rejected rather than silently
/// disabled, so a typo can't quietly turn a resumable scan into a
/// from-scratch one.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CheckpointConfig {
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub namespace: String,
}

fn default_total_segments() -> usize {
    DEFAULT_TOTAL_SEGMENTS
}

/// Command-line overrides, applied after file and environment merging
/// but before validation, so `--table` alone is a valid configuration.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub table: Option<String>,
    pub total_segments: Option<usize>,
}

impl RunConfig {
    /// Load and validate the run configuration.
    ///
    /// An explicit `path` must exist; the default file may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_overrides(path, Overrides::default())
    }

    /// [`load`](Self::load), with command-line overrides layered on top.
    pub fn load_with_overrides(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let figment = match path {
            Some(path) => Figment::new().merge(Toml::file_exact(path)),
            None => Figment::new().merge(Toml::file(DEFAULT_CONFIG_FILE)),
        };
        let mut config: Self =
            figment.merge(Env::prefixed("TRAWL_").split("__")).extract().or_raise(|| ErrorKind::Load)?;
        if let Some(table) = overrides.table {
            config.table = table;
        }
        if let Some(total_segments) = overrides.total_segments {
            config.total_segments = total_segments;
        }
        config.validate()?;
        debug!(table = %config.table, segments = config.total_segments, "configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.table.is_empty() {
            exn::bail!(ErrorKind::Missing("table"));
        }
        if self.total_segments == 0 {
            exn::bail!(ErrorKind::Invalid { field: "total_segments", reason: "must be at least 1" });
        }
        if self.total_segments > MAX_TOTAL_SEGMENTS {
            exn::bail!(ErrorKind::Invalid {
                field: "total_segments",
                reason: "exceeds the store's segment limit",
            });
        }
        if let Some(checkpoint) = &self.checkpoint {
            if checkpoint.table.is_empty() {
                exn::bail!(ErrorKind::Missing("checkpoint.table"));
            }
            if checkpoint.namespace.is_empty() {
                exn::bail!(ErrorKind::Missing("checkpoint.namespace"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn base() -> RunConfig {
        RunConfig {
            table: "items".to_string(),
            total_segments: 4,
            consistent_read: false,
            region: None,
            endpoint: None,
            checkpoint: None,
        }
    }

    #[test]
    fn test_load_from_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "trawl.toml",
                r#"
                    table = "items"
                    total_segments = 16

                    [checkpoint]
                    table = "scan_checkpoints"
                    namespace = "nightly"
                "#,
            )?;
            jail.set_env("TRAWL_TOTAL_SEGMENTS", "32");
            let config = RunConfig::load(None).expect("config should load");
            assert_eq!(config.table, "items");
            // Environment wins over the file.
            assert_eq!(config.total_segments, 32);
            assert_eq!(
                config.checkpoint,
                Some(CheckpointConfig {
                    table: "scan_checkpoints".to_string(),
                    namespace: "nightly".to_string(),
                })
            );
            Ok(())
        });
    }

    #[test]
    fn test_env_only_is_enough() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TRAWL_TABLE", "items");
            let config = RunConfig::load(None).expect("config should load");
            assert_eq!(config.table, "items");
            assert_eq!(config.total_segments, DEFAULT_TOTAL_SEGMENTS);
            assert_eq!(config.checkpoint, None);
            Ok(())
        });
    }

    #[test]
    fn test_overrides_beat_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TRAWL_TABLE", "items");
            jail.set_env("TRAWL_TOTAL_SEGMENTS", "8");
            let overrides =
                Overrides { table: Some("archive".to_string()), total_segments: Some(2) };
            let config = RunConfig::load_with_overrides(None, overrides).expect("config should load");
            assert_eq!(config.table, "archive");
            assert_eq!(config.total_segments, 2);
            Ok(())
        });
    }

    #[test]
    fn test_override_table_alone_is_enough() {
        figment::Jail::expect_with(|_jail| {
            let overrides = Overrides { table: Some("items".to_string()), total_segments: None };
            let config = RunConfig::load_with_overrides(None, overrides).expect("config should load");
            assert_eq!(config.table, "items");
            assert_eq!(config.total_segments, DEFAULT_TOTAL_SEGMENTS);
            Ok(())
        });
    }

    #[test]
    fn test_missing_table_is_fatal() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TRAWL_TOTAL_SEGMENTS", "8");
            let err = RunConfig::load(None).expect_err("table is required");
            assert!(matches!(&*err, ErrorKind::Missing("table")));
            Ok(())
        });
    }

    #[test]
    fn test_explicit_path_must_exist() {
        figment::Jail::expect_with(|_jail| {
            let err = RunConfig::load(Some(Path::new("nope.toml"))).expect_err("file is absent");
            assert!(matches!(&*err, ErrorKind::Load));
            Ok(())
        });
    }

    #[rstest]
    #[case(0)]
    #[case(MAX_TOTAL_SEGMENTS + 1)]
    fn test_total_segments_bounds(#[case] total_segments: usize) {
        let config = RunConfig { total_segments, ..base() };
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid { field: "total_segments", .. }));
    }

    #[rstest]
    #[case("", "nightly", "checkpoint.table")]
    #[case("scan_checkpoints", "", "checkpoint.namespace")]
    fn test_half_configured_checkpoint_rejected(
        #[case] table: &str,
        #[case] namespace: &str,
        #[case] expected: &str,
    ) {
        let config = RunConfig {
            checkpoint: Some(CheckpointConfig {
                table: table.to_string(),
                namespace: namespace.to_string(),
            }),
            ..base()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Missing(field) if *field == expected));
    }
}
