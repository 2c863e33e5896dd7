use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::StorageError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnPolicy {
    pub merchant: String,
    pub default_return_days: u32,
}

/// Merchant default return windows, consulted when a message states none.
pub trait ReturnPolicyLookup: Send + Sync {
    fn default_window_days(&self, merchant: &str) -> Option<u32>;
}

#[derive(Debug, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    policies: Vec<ReturnPolicy>,
}

#[derive(Debug, Clone, Default)]
pub struct ReturnPolicyTable {
    by_merchant: HashMap<String, ReturnPolicy>,
}

impl ReturnPolicyTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_policies(
        policies: impl IntoIterator<Item = ReturnPolicy>,
    ) -> Result<Self, StorageError> {
        let mut by_merchant = HashMap::new();
        for policy in policies {
            let merchant = policy.merchant.trim();
            if merchant.is_empty() {
                return Err(StorageError::InvalidPolicy {
                    merchant: policy.merchant.clone(),
                    reason: "merchant name is blank".to_string(),
                });
            }
            if policy.default_return_days == 0 {
                return Err(StorageError::InvalidPolicy {
                    merchant: merchant.to_string(),
                    reason: "default_return_days must be positive".to_string(),
                });
            }
            by_merchant.insert(merchant.to_lowercase(), policy);
        }
        Ok(Self { by_merchant })
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        let file: PolicyFile = serde_yaml::from_str(raw).context("parsing return policy YAML")?;
        Ok(Self::from_policies(file.policies)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading return policies {}", path.display()))?;
        let table = Self::from_yaml_str(&raw)
            .with_context(|| format!("loading return policies {}", path.display()))?;
        debug!(path = %path.display(), merchants = table.len(), "loaded return policies");
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.by_merchant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_merchant.is_empty()
    }
}

impl ReturnPolicyLookup for ReturnPolicyTable {
    fn default_window_days(&self, merchant: &str) -> Option<u32> {
        self.by_merchant
            .get(&merchant.trim().to_lowercase())
            .map(|p| p.default_return_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const POLICIES: &str = r#"
policies:
  - merchant: Myntra
    default_return_days: 30
  - merchant: "H&M"
    default_return_days: 15
"#;

    #[test]
    fn lookup_is_case_insensitive() {
        let table = ReturnPolicyTable::from_yaml_str(POLICIES).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.default_window_days("myntra"), Some(30));
        assert_eq!(table.default_window_days(" h&m "), Some(15));
        assert_eq!(table.default_window_days("Flipkart"), None);
    }

    #[test]
    fn zero_day_policy_is_rejected() {
        let err = ReturnPolicyTable::from_policies([ReturnPolicy {
            merchant: "Ajio".to_string(),
            default_return_days: 0,
        }])
        .unwrap_err();
        assert!(matches!(
            err,
            StorageError::InvalidPolicy { ref merchant, .. } if merchant == "Ajio"
        ));
    }

    #[test]
    fn loads_from_file_and_reports_missing_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(POLICIES.as_bytes()).unwrap();
        let table = ReturnPolicyTable::load(file.path()).unwrap();
        assert_eq!(table.default_window_days("Myntra"), Some(30));

        let err = ReturnPolicyTable::load(Path::new("/nonexistent/policies.yaml")).unwrap_err();
        assert!(err.to_string().contains("reading return policies"));
    }

    #[test]
    fn repository_policy_file_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../rules/return_policies.yaml");
        let table = ReturnPolicyTable::load(&path).unwrap();
        assert_eq!(table.default_window_days("H&M"), Some(15));
        assert_eq!(table.default_window_days("Flipkart"), Some(10));
    }
}
