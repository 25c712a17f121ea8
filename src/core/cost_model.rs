use crate::utils::error::{AssessmentError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const BUNDLED_BASE_COSTS: &str = include_str!("../../assets/base_costs.toml");

pub const DEFAULT_BASE_THRESHOLD: f64 = 4000.0;
pub const DEFAULT_SCALE_CONSTANT: f64 = 0.02;

#[derive(Debug, Deserialize)]
struct BaseCostFile {
    costs: BTreeMap<String, f64>,
}

/// Maps a vehicle's market value onto a scaled per-part cost table.
///
/// At or below the base threshold the base table is used as is. Above it
/// every entry is multiplied by `1 + k * sqrt(value - threshold)`, so costs
/// grow slowly with the value of the car.
#[derive(Debug, Clone, PartialEq)]
pub struct CostModel {
    base_costs: BTreeMap<String, f64>,
    base_threshold: f64,
    scale_constant: f64,
}

impl CostModel {
    pub fn new(base_costs: BTreeMap<String, f64>, base_threshold: f64, scale_constant: f64) -> Self {
        Self {
            base_costs,
            base_threshold,
            scale_constant,
        }
    }

    pub fn bundled() -> Result<Self> {
        Ok(Self::new(
            parse_base_costs(BUNDLED_BASE_COSTS)?,
            DEFAULT_BASE_THRESHOLD,
            DEFAULT_SCALE_CONSTANT,
        ))
    }

    pub fn base_costs_from_file<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, f64>> {
        let content = std::fs::read_to_string(&path)?;
        parse_base_costs(&content)
    }

    pub fn with_overrides(mut self, overrides: &BTreeMap<String, f64>) -> Self {
        for (part, cost) in overrides {
            self.base_costs.insert(part.clone(), *cost);
        }
        self
    }

    pub fn base_costs(&self) -> &BTreeMap<String, f64> {
        &self.base_costs
    }

    pub fn scale_factor(&self, market_value: f64) -> Result<f64> {
        if !market_value.is_finite() {
            return Err(AssessmentError::InvalidInput {
                message: format!("market value '{}' is not a number", market_value),
            });
        }
        if market_value < 0.0 {
            return Err(AssessmentError::InvalidInput {
                message: format!("market value {} is negative", market_value),
            });
        }

        if market_value <= self.base_threshold {
            return Ok(1.0);
        }
        let excess = market_value - self.base_threshold;
        Ok(1.0 + self.scale_constant * excess.sqrt())
    }

    pub fn scale(&self, market_value: f64) -> Result<CostTable> {
        let factor = self.scale_factor(market_value)?;
        let entries = self
            .base_costs
            .iter()
            .map(|(part, cost)| (part.clone(), cost * factor))
            .collect();

        tracing::debug!(
            "Scaled {} base costs by {:.4} for market value {:.2}",
            self.base_costs.len(),
            factor,
            market_value
        );

        Ok(CostTable {
            scale_factor: factor,
            entries,
        })
    }
}

fn parse_base_costs(content: &str) -> Result<BTreeMap<String, f64>> {
    let file: BaseCostFile = toml::from_str(content)
        .map_err(|e| AssessmentError::config(format!("base cost table is invalid: {}", e)))?;

    if let Some((part, cost)) = file.costs.iter().find(|(_, cost)| cost.is_nan() || **cost < 0.0) {
        return Err(AssessmentError::config(format!(
            "base cost for '{}' must be non-negative, got {}",
            part, cost
        )));
    }
    Ok(file.costs)
}

/// Scaled per-part costs for one vehicle. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostTable {
    scale_factor: f64,
    entries: BTreeMap<String, f64>,
}

impl CostTable {
    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn get(&self, part: &str) -> Option<f64> {
        self.entries.get(part).copied()
    }

    pub fn entries(&self) -> &BTreeMap<String, f64> {
        &self.entries
    }

    /// JSON object of part to cost, rounded to pence, for prompt context.
    pub fn to_prompt_json(&self) -> String {
        let rounded: BTreeMap<&str, f64> = self
            .entries
            .iter()
            .map(|(part, cost)| (part.as_str(), (cost * 100.0).round() / 100.0))
            .collect();
        serde_json::to_string(&rounded).unwrap_or_default()
    }
}
