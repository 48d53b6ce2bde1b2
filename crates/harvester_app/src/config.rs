//! Site profiles: where the listing lives, how to recognise its items and
//! trigger, what to extract, and how patient to be.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use harvester_core::{trade_show_schema, Locator, PaginationLimits, Schema};
use harvester_engine::{ExportFormat, HarvestSettings, LoadMode, PaginationSettings};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestProfile {
    pub listing_url: String,
    pub item: Locator,
    pub trigger: Locator,
    /// Consent banner button to click before paginating.
    pub consent: Option<Locator>,
    pub load_mode: LoadMode,
    pub schema: Schema,
    pub max_attempts: u32,
    pub max_transient_retries: u32,
    pub trigger_wait_ms: u64,
    pub growth_timeout_ms: u64,
    pub backoff_ms: u64,
    pub poll_interval_ms: u64,
    pub interstitial_wait_ms: u64,
    pub progress_every: usize,
    pub list_delimiter: String,
    pub output: String,
    pub format: ExportFormat,
}

impl Default for HarvestProfile {
    fn default() -> Self {
        Self {
            listing_url: "https://www.tradeindia.com/tradeshows/apparel-fashion/".to_string(),
            item: Locator::css(".cardBox"),
            trigger: Locator::css("button").with_descendant_text("span", "Show More Results"),
            consent: Some(Locator::css("button").containing("Accept")),
            load_mode: LoadMode::Append,
            schema: trade_show_schema(),
            max_attempts: 50,
            max_transient_retries: 5,
            trigger_wait_ms: 15_000,
            growth_timeout_ms: 15_000,
            backoff_ms: 2_000,
            poll_interval_ms: 250,
            interstitial_wait_ms: 10_000,
            progress_every: 10,
            list_delimiter: ", ".to_string(),
            output: "tradeindia_events.csv".to_string(),
            format: ExportFormat::Csv,
        }
    }
}

impl HarvestProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading profile {}", path.display()))?;
        let profile = Self::from_ron(&content)
            .with_context(|| format!("parsing profile {}", path.display()))?;
        Ok(profile)
    }

    pub fn from_ron(content: &str) -> Result<Self> {
        let profile: HarvestProfile = ron::from_str(content)?;
        profile.schema.validate()?;
        Ok(profile)
    }

    pub fn to_ron(&self) -> Result<String> {
        let pretty = ron::ser::PrettyConfig::new();
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    pub fn pagination_settings(&self) -> PaginationSettings {
        PaginationSettings {
            limits: PaginationLimits {
                max_attempts: self.max_attempts,
                max_transient_retries: self.max_transient_retries,
            },
            trigger_wait: Duration::from_millis(self.trigger_wait_ms),
            growth_timeout: Duration::from_millis(self.growth_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }

    pub fn harvest_settings(&self) -> HarvestSettings {
        HarvestSettings {
            pagination: self.pagination_settings(),
            interstitial: self.consent.clone(),
            interstitial_wait: Duration::from_millis(self.interstitial_wait_ms),
            progress_every: self.progress_every,
        }
    }
}
