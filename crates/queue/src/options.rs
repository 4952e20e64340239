// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `key=value` cache options, as passed with repeated `--cache` flags.
//!
//! ```text
//! cache-type={none,mem,hybrid}         pick the cache backend
//! mem-cache-size=256                   memory budget in MB (mem or hybrid)
//! disk-cache-size=8192                 disk budget in MB (hybrid only)
//! disk-cache-path=/var/cache/evcache   segment store directory (hybrid only)
//! cache-stage={before-decode,after-decode}
//! ```

use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::{OptionExt, ResultExt, ensure};
use tracing::debug;

use crate::{
    cache::{CacheConfig, Stage},
    error::{
        BuildCacheSnafu, CacheTypeRequiredSnafu, DiskSmallerThanMemoryOptionSnafu,
        HybridRequiredSnafu, InvalidSizeSnafu, OptionsError, SizeTooLargeSnafu,
        UnrecognizedCacheStageSnafu, UnrecognizedCacheTypeSnafu, UnrecognizedFormatSnafu,
    },
    event::Event,
    hybrid::{HybridOptions, HybridQueue, default_store_path},
    mem::MemoryQueue,
    sizing::MAX_BUDGET_MB,
};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CacheType {
    /// No caching; stages hand events over directly.
    #[default]
    None,
    Mem,
    Hybrid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct CacheOptions {
    #[serde(rename = "cache-type")]
    pub cache_type:         CacheType,
    /// Zero lets the in-memory backend size itself from the host.
    #[serde(rename = "mem-cache-size")]
    pub mem_cache_size_mb:  usize,
    #[serde(rename = "disk-cache-size")]
    #[default = 8192]
    pub disk_cache_size_mb: usize,
    #[serde(rename = "disk-cache-path")]
    #[default(_code = "default_store_path()")]
    pub disk_cache_path:    PathBuf,
    #[serde(rename = "cache-stage")]
    pub cache_stage:        Stage,
    #[serde(rename = "wipe-on-open")]
    #[default = true]
    pub wipe_on_open:       bool,
}

impl CacheOptions {
    /// Parse `key=value` tokens in order.
    ///
    /// `Ok(None)` means caching is disabled: no tokens, or a first token
    /// mentioning `none`. Size keys must come after the `cache-type` that
    /// allows them.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Option<Self>, OptionsError> {
        debug!("Preparing cache options");

        let Some(first) = tokens.first() else {
            return Ok(None);
        };
        if first.as_ref().contains("none") {
            return Ok(None);
        }

        let mut options = Self::default();
        for token in tokens {
            let token = token.as_ref();
            let (key, value) = token
                .split_once('=')
                .context(UnrecognizedFormatSnafu { token })?;

            match key {
                "cache-type" => {
                    options.cache_type = match value.parse::<CacheType>() {
                        Ok(kind @ (CacheType::Mem | CacheType::Hybrid)) => kind,
                        _ => return UnrecognizedCacheTypeSnafu { token }.fail(),
                    };
                }
                "mem-cache-size" => {
                    ensure!(
                        options.cache_type != CacheType::None,
                        CacheTypeRequiredSnafu { key }
                    );
                    options.mem_cache_size_mb =
                        value.parse::<usize>().context(InvalidSizeSnafu { key })?;
                }
                "disk-cache-size" => {
                    ensure!(
                        options.cache_type == CacheType::Hybrid,
                        HybridRequiredSnafu { key }
                    );
                    options.disk_cache_size_mb =
                        value.parse::<usize>().context(InvalidSizeSnafu { key })?;
                }
                "disk-cache-path" => {
                    ensure!(
                        options.cache_type == CacheType::Hybrid,
                        HybridRequiredSnafu { key }
                    );
                    options.disk_cache_path = PathBuf::from(value);
                }
                "cache-stage" => {
                    options.cache_stage = value
                        .parse::<Stage>()
                        .ok()
                        .context(UnrecognizedCacheStageSnafu { token })?;
                }
                _ => return UnrecognizedFormatSnafu { token }.fail(),
            }
        }

        options.validate()?;
        Ok(Some(options))
    }

    /// Checks that do not depend on token order; also run on options loaded
    /// from a config file.
    pub fn validate(&self) -> Result<(), OptionsError> {
        for (key, mb) in [
            ("mem-cache-size", self.mem_cache_size_mb),
            ("disk-cache-size", self.disk_cache_size_mb),
        ] {
            ensure!(
                mb <= MAX_BUDGET_MB,
                SizeTooLargeSnafu {
                    key,
                    mb,
                    max: MAX_BUDGET_MB,
                }
            );
        }
        if self.cache_type == CacheType::Hybrid {
            ensure!(
                self.disk_cache_size_mb >= self.mem_cache_size_mb,
                DiskSmallerThanMemoryOptionSnafu {
                    mem_mb:  self.mem_cache_size_mb,
                    disk_mb: self.disk_cache_size_mb,
                }
            );
        }
        Ok(())
    }

    #[must_use]
    pub fn hybrid_options(&self) -> HybridOptions {
        HybridOptions {
            mem_mb:       self.mem_cache_size_mb,
            disk_mb:      self.disk_cache_size_mb,
            store_path:   self.disk_cache_path.clone(),
            wipe_on_open: self.wipe_on_open,
        }
    }

    /// Construct the cache these options describe, or `None` when caching
    /// is disabled.
    pub fn build(&self) -> Result<Option<CacheConfig>, OptionsError> {
        self.validate()?;

        let mem_mb = self.mem_cache_size_mb;
        let cache = match (self.cache_type, self.cache_stage) {
            (CacheType::None, _) => return Ok(None),
            (CacheType::Mem, Stage::AfterDecode) => {
                CacheConfig::after_decode(Box::new(MemoryQueue::<Event>::new(mem_mb)))
            }
            (CacheType::Mem, Stage::BeforeDecode) => {
                CacheConfig::before_decode(Box::new(MemoryQueue::<Bytes>::new(mem_mb)))
            }
            (CacheType::Hybrid, Stage::AfterDecode) => {
                let queue =
                    HybridQueue::<Event>::new(self.hybrid_options()).context(BuildCacheSnafu)?;
                CacheConfig::after_decode(Box::new(queue))
            }
            (CacheType::Hybrid, Stage::BeforeDecode) => {
                let queue =
                    HybridQueue::<Bytes>::new(self.hybrid_options()).context(BuildCacheSnafu)?;
                CacheConfig::before_decode(Box::new(queue))
            }
        };

        debug!(stage = %self.cache_stage, cache_type = %self.cache_type, "Cache prepared");
        Ok(Some(cache))
    }
}

/// Parse `tokens` and build the cache they describe.
pub fn prepare_cache<S: AsRef<str>>(tokens: &[S]) -> Result<Option<CacheConfig>, OptionsError> {
    match CacheOptions::parse(tokens)? {
        Some(options) => options.build(),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;

    #[test_case(&["foo"], "unrecognized cache option format: foo"; "missing equals sign")]
    #[test_case(
        &["cache-type=bleh"],
        "unrecognized cache-type option: cache-type=bleh (valid options are: none,mem,hybrid)";
        "unknown cache type"
    )]
    #[test_case(
        &["mem-cache-size=256"],
        "you need to specify cache-type=mem or cache-type=hybrid before setting mem-cache-size";
        "size before type"
    )]
    #[test_case(
        &["cache-type=mem", "disk-cache-size=1024"],
        "you need to specify cache-type=hybrid before setting disk-cache-size";
        "disk size on mem cache"
    )]
    #[test_case(
        &["cache-type=mem", "disk-cache-path=/tmp/x"],
        "you need to specify cache-type=hybrid before setting disk-cache-path";
        "disk path on mem cache"
    )]
    #[test_case(
        &["cache-type=mem", "mem-cache-size=lots"],
        "could not parse mem-cache-size value";
        "non numeric size"
    )]
    #[test_case(
        &["cache-type=mem", "mem-cache-size=18446744073709551615"],
        "mem-cache-size value 18446744073709551615 MB is too large";
        "memory budget overflows bytes"
    )]
    #[test_case(
        &["cache-type=hybrid", "disk-cache-size=18446744073709551615"],
        "disk-cache-size value 18446744073709551615 MB is too large";
        "disk budget overflows bytes"
    )]
    #[test_case(
        &["cache-type=mem", "cache-stage=mid-decode"],
        "unrecognized cache-stage option: cache-stage=mid-decode (valid options are: \
         before-decode,after-decode)";
        "unknown stage"
    )]
    #[test_case(
        &["cache-type=mem", "colour=blue"],
        "unrecognized cache option format: colour=blue";
        "unknown key"
    )]
    #[test_case(
        &["cache-type=hybrid", "mem-cache-size=1024", "disk-cache-size=512"],
        "disk-cache-size (512 MB) must be greater or equal to mem-cache-size (1024 MB)";
        "disk smaller than memory"
    )]
    fn test_parse_rejects(tokens: &[&str], message: &str) {
        let err = CacheOptions::parse(tokens).unwrap_err();
        assert!(
            err.to_string().contains(message),
            "`{err}` does not contain `{message}`"
        );
    }

    #[test_case(&[]; "no tokens")]
    #[test_case(&["none"]; "bare none")]
    #[test_case(&["cache-type=none"]; "explicit none")]
    fn test_caching_disabled(tokens: &[&str]) {
        assert!(CacheOptions::parse(tokens).unwrap().is_none());
        assert!(prepare_cache(tokens).unwrap().is_none());
    }

    #[test]
    fn test_parse_defaults() {
        let options = CacheOptions::parse(&["cache-type=mem"]).unwrap().unwrap();
        assert_eq!(options.cache_type, CacheType::Mem);
        assert_eq!(options.mem_cache_size_mb, 0);
        assert_eq!(options.disk_cache_size_mb, 8192);
        assert_eq!(options.cache_stage, Stage::AfterDecode);
        assert!(options.wipe_on_open);
    }

    #[test]
    fn test_prepare_mem_cache() {
        let cache = prepare_cache(&["cache-type=mem", "mem-cache-size=512"])
            .unwrap()
            .unwrap();
        assert_eq!(cache.stage(), Stage::AfterDecode);
        assert_eq!(cache.capacity(), 524_288);
        assert_eq!(
            cache.to_string(),
            "In-Memory Event Queue (Size = 512 MB) (after-decode)"
        );
    }

    #[test]
    fn test_prepare_before_decode_cache() {
        let cache = prepare_cache(&[
            "cache-type=mem",
            "mem-cache-size=512",
            "cache-stage=before-decode",
        ])
        .unwrap()
        .unwrap();
        assert_eq!(cache.stage(), Stage::BeforeDecode);
        cache.enqueue_raw(Bytes::from_static(b"raw")).unwrap();
        assert_eq!(cache.dequeue_raw().unwrap().unwrap().as_ref(), b"raw");
    }

    #[test]
    fn test_prepare_hybrid_cache() {
        let temp_dir = TempDir::new().unwrap();
        let store = temp_dir.path().join("store");
        let path_token = format!("disk-cache-path={}", store.display());

        let cache = prepare_cache(&[
            "cache-type=hybrid",
            "mem-cache-size=512",
            "disk-cache-size=512",
            path_token.as_str(),
        ])
        .unwrap()
        .unwrap();

        assert_eq!(cache.capacity(), 524_288);
        assert!(store.exists());
        cache.enqueue(Event::with_timestamp(3)).unwrap();
        assert_eq!(cache.dequeue().unwrap().unwrap().timestamp, 3);

        cache.teardown().unwrap();
        assert!(!store.exists());
    }

    #[test]
    fn test_deserialize_from_config() {
        let options: CacheOptions = serde_json::from_str(
            r#"{"cache-type": "hybrid", "mem-cache-size": 64, "cache-stage": "before-decode"}"#,
        )
        .unwrap();
        assert_eq!(options.cache_type, CacheType::Hybrid);
        assert_eq!(options.mem_cache_size_mb, 64);
        assert_eq!(options.disk_cache_size_mb, 8192);
        assert_eq!(options.cache_stage, Stage::BeforeDecode);
        assert_eq!(options.disk_cache_path, default_store_path());
        options.validate().unwrap();
    }
}
