//! Engine settings.
//!
//! Precedence for every setting:
//! 1) environment variable (see the `*_ENV` constants)
//! 2) built-in default
//!
//! Invalid values are errors rather than silently falling back.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub const GEOASK_METRIC_CRS_ENV: &str = "GEOASK_METRIC_CRS";
pub const GEOASK_BUFFER_SEGMENTS_ENV: &str = "GEOASK_BUFFER_SEGMENTS";
pub const GEOASK_RESPONSE_CACHE_CAPACITY_ENV: &str = "GEOASK_RESPONSE_CACHE_CAPACITY";

/// SWEREF 99 TM. Only meaningful for data in Sweden; override for other regions.
pub const DEFAULT_METRIC_CRS: &str = "EPSG:3006";
pub const DEFAULT_BUFFER_SEGMENTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoaskConfig {
    /// Metric CRS used to buffer layers whose CRS is not in meters.
    pub metric_crs: String,
    /// Segments per quarter circle when approximating buffer arcs.
    pub buffer_segments: u32,
    /// Maximum cached model responses; `None` keeps every response.
    pub response_cache_capacity: Option<usize>,
}

impl Default for GeoaskConfig {
    fn default() -> Self {
        Self {
            metric_crs: DEFAULT_METRIC_CRS.to_string(),
            buffer_segments: DEFAULT_BUFFER_SEGMENTS,
            response_cache_capacity: None,
        }
    }
}

impl GeoaskConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`GeoaskConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = non_empty(lookup(GEOASK_METRIC_CRS_ENV)) {
            if !v.contains(':') {
                return Err(anyhow!(
                    "invalid {GEOASK_METRIC_CRS_ENV}={v:?} (expected an authority id such as EPSG:3006)"
                ));
            }
            config.metric_crs = v;
        }

        if let Some(v) = non_empty(lookup(GEOASK_BUFFER_SEGMENTS_ENV)) {
            let n = v.parse::<u32>().map_err(|_| {
                anyhow!("invalid {GEOASK_BUFFER_SEGMENTS_ENV}={v:?} (expected a positive integer)")
            })?;
            if n == 0 {
                return Err(anyhow!(
                    "invalid {GEOASK_BUFFER_SEGMENTS_ENV}=0 (expected a positive integer)"
                ));
            }
            config.buffer_segments = n;
        }

        if let Some(v) = non_empty(lookup(GEOASK_RESPONSE_CACHE_CAPACITY_ENV)) {
            config.response_cache_capacity = if v.eq_ignore_ascii_case("unbounded") {
                None
            } else {
                Some(v.parse::<usize>().map_err(|_| {
                    anyhow!(
                        "invalid {GEOASK_RESPONSE_CACHE_CAPACITY_ENV}={v:?} (expected an integer or `unbounded`)"
                    )
                })?)
            };
        }

        Ok(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
