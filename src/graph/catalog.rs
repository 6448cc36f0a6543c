//! Indicator catalog entries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ParamMap;

/// One entry of the compiler backend's indicator list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_params: Option<ParamMap>,
    /// Some catalogs ship explicit starting parameters instead of defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ParamMap>,
}

impl IndicatorInfo {
    pub fn new(id: &str, name: &str, category: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            default_params: None,
            parameters: None,
        }
    }

    pub fn with_default(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.default_params.get_or_insert_with(ParamMap::new).insert(key.to_string(), value.into());
        self
    }

    /// Parameters a freshly placed node starts with.
    pub fn starting_params(&self) -> ParamMap {
        self.parameters.clone().or_else(|| self.default_params.clone()).unwrap_or_default()
    }
}

/// Catalog used when the compiler backend cannot be reached.
pub fn fallback_catalog() -> Vec<IndicatorInfo> {
    vec![
        IndicatorInfo::new("rsi", "RSI", "momentum"),
        IndicatorInfo::new("macd", "MACD", "trend"),
        IndicatorInfo::new("sma", "SMA", "trend"),
        IndicatorInfo::new("ema", "EMA", "trend"),
        IndicatorInfo::new("bollinger", "Bollinger Bands", "volatility"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fallback_has_the_five_builtins() {
        let ids: Vec<_> = fallback_catalog().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["rsi", "macd", "sma", "ema", "bollinger"]);
    }

    #[test]
    fn starting_params_prefer_explicit_parameters() {
        let info: IndicatorInfo = serde_json::from_value(json!({
            "id": "rsi",
            "name": "RSI",
            "category": "momentum",
            "default_params": {"period": 14},
            "parameters": {"period": 7}
        }))
        .unwrap();
        assert_eq!(info.starting_params().get("period"), Some(&json!(7)));

        let info = IndicatorInfo::new("sma", "SMA", "trend").with_default("period", 20);
        assert_eq!(info.starting_params().get("period"), Some(&json!(20)));
        assert!(IndicatorInfo::new("ema", "EMA", "trend").starting_params().is_empty());
    }
}
