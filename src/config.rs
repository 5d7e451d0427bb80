//! Run configuration, loaded from TOML by the binary and handed to each
//! component as an explicit argument.

use log::info;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{DedupeError, DedupeResult};
use crate::model::Corroboration;
use crate::ops::phone_ops;
use crate::report::StripReason;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// ISO 3166-1 alpha-2 region used when a number has no `+` prefix and
    /// the contact's addresses give no hint.
    pub default_region: String,
    pub infer_region_from_address: bool,
    /// Fill in `KIND` for records that lack it.
    pub classify_kinds: bool,
    pub strip: StripSettings,
    pub similarity: SimilaritySettings,
    pub merge: MergeSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_region: "GB".to_string(),
            infer_region_from_address: true,
            classify_kinds: true,
            strip: StripSettings::default(),
            similarity: SimilaritySettings::default(),
            merge: MergeSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(content: &str) -> DedupeResult<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> DedupeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&content)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> DedupeResult<()> {
        phone_ops::region_id(&self.default_region)?;
        self.similarity.validate()?;
        StripRules::compile(&self.strip)?;
        Ok(())
    }

    pub fn phone(&self) -> PhoneSettings {
        PhoneSettings {
            default_region: self.default_region.to_uppercase(),
            infer_region_from_address: self.infer_region_from_address,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StripSettings {
    /// Case-insensitive regexes matched against property names.
    pub vendor_patterns: Vec<String>,
    /// Property names that are never stripped.
    pub keep: Vec<String>,
    /// Strip any other `X-` property too.
    pub strip_unknown_extensions: bool,
}

impl Default for StripSettings {
    fn default() -> Self {
        Self {
            vendor_patterns: vec![
                r"^X-AB".to_string(),
                r"^X-ADDRESSBOOKSERVER".to_string(),
                r"^item\d+\.".to_string(),
                r"^X-GOOGLE".to_string(),
            ],
            keep: Vec::new(),
            strip_unknown_extensions: true,
        }
    }
}

/// Compiled form of `StripSettings`.
#[derive(Debug, Clone)]
pub struct StripRules {
    patterns: Vec<Regex>,
    keep: BTreeSet<String>,
    strip_unknown_extensions: bool,
}

impl StripRules {
    pub fn compile(settings: &StripSettings) -> DedupeResult<Self> {
        let patterns = settings
            .vendor_patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| DedupeError::Pattern {
                        pattern: p.clone(),
                        source,
                    })
            })
            .collect::<DedupeResult<Vec<_>>>()?;
        Ok(Self {
            patterns,
            keep: settings.keep.iter().map(|k| k.to_uppercase()).collect(),
            strip_unknown_extensions: settings.strip_unknown_extensions,
        })
    }

    /// Why a property with this name must be stripped, if it must.
    pub fn verdict(&self, name: &str) -> Option<StripReason> {
        if self.keep.contains(&name.to_uppercase()) {
            return None;
        }
        if self.patterns.iter().any(|p| p.is_match(name)) {
            return Some(StripReason::Vendor);
        }
        let upper = name.to_uppercase();
        if self.strip_unknown_extensions && upper.starts_with("X-") {
            return Some(StripReason::UnknownExtension);
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneSettings {
    pub default_region: String,
    pub infer_region_from_address: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilaritySettings {
    /// Minimum name-fuzzy score in [0, 1] for a corroborated name match.
    pub name_threshold: f64,
    /// Signals accepted as corroboration for a fuzzy name match.
    pub corroborators: Vec<Corroboration>,
    /// Treat an identical vCard `UID` as an exact match.
    pub use_uid: bool,
}

impl Default for SimilaritySettings {
    fn default() -> Self {
        Self {
            name_threshold: 0.85,
            corroborators: vec![Corroboration::Organization, Corroboration::Address],
            use_uid: true,
        }
    }
}

impl SimilaritySettings {
    pub fn validate(&self) -> DedupeResult<()> {
        if !(0.0..=1.0).contains(&self.name_threshold) {
            return Err(DedupeError::Config(format!(
                "similarity.name_threshold must be within [0, 1], got {}",
                self.name_threshold
            )));
        }
        Ok(())
    }

    pub fn accepts(&self, corroboration: Corroboration) -> bool {
        self.corroborators.contains(&corroboration)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    #[default]
    Automatic,
    Interactive,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSettings {
    pub mode: MergeMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn empty_toml_yields_defaults() {
        assert_eq!(Settings::from_toml_str("").unwrap(), Settings::default());
    }

    #[test]
    fn partial_toml_overrides_only_given_keys() {
        let settings = Settings::from_toml_str(
            r#"
            default_region = "US"

            [similarity]
            name_threshold = 0.7
            corroborators = ["birthday"]
            "#,
        )
        .unwrap();
        assert_eq!(settings.default_region, "US");
        assert_eq!(settings.similarity.name_threshold, 0.7);
        assert_eq!(settings.similarity.corroborators, vec![Corroboration::Birthday]);
        assert!(settings.similarity.use_uid);
        assert_eq!(settings.merge.mode, MergeMode::Automatic);
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let result = Settings::from_toml_str("[similarity]\nname_threshold = 1.5\n");
        assert!(matches!(result, Err(DedupeError::Config(_))));
    }

    #[test]
    fn unknown_region_is_rejected() {
        let result = Settings::from_toml_str("default_region = \"QQ\"\n");
        assert!(matches!(result, Err(DedupeError::UnknownRegion(_))));
    }

    #[test]
    fn bad_pattern_is_rejected() {
        let result = Settings::from_toml_str("[strip]\nvendor_patterns = [\"^X-(\"]\n");
        assert!(matches!(result, Err(DedupeError::Pattern { .. })));
    }

    #[test]
    fn strip_rules_honor_keep_list() {
        let rules = StripRules::compile(&StripSettings {
            keep: vec!["x-abuid".into()],
            ..StripSettings::default()
        })
        .unwrap();
        assert_eq!(rules.verdict("X-ABUID"), None);
        assert_eq!(rules.verdict("X-ABLabel"), Some(StripReason::Vendor));
        assert_eq!(rules.verdict("x-google-etag"), Some(StripReason::Vendor));
        assert_eq!(rules.verdict("X-CUSTOM"), Some(StripReason::UnknownExtension));
        assert_eq!(rules.verdict("NOTE"), None);
    }

    #[test]
    fn unknown_extensions_can_be_kept() {
        let rules = StripRules::compile(&StripSettings {
            strip_unknown_extensions: false,
            ..StripSettings::default()
        })
        .unwrap();
        assert_eq!(rules.verdict("X-CUSTOM"), None);
    }
}
