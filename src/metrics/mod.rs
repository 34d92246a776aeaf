use crate::error::{HarnessError, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const STASH_SIZE: &str = "stash size";
pub const CAPACITY: &str = "capacity";

const STASH_PATTERN: &str = r"stash size[:=]\s*(\d+)";
const CAPACITY_PATTERN: &str = r"has\s+(\d+)\s+capacity";

/// A scraped number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Integer(v) => v as f64,
            MetricValue::Float(v) => v,
        }
    }

    /// Integer view; floats are truncated and negatives clamp to zero.
    pub fn as_u64(&self) -> u64 {
        match *self {
            MetricValue::Integer(v) => v.max(0) as u64,
            MetricValue::Float(v) => v.max(0.0) as u64,
        }
    }
}

/// Numeric type a captured string is cast to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cast {
    Integer,
    Float,
}

impl Cast {
    pub fn apply(&self, raw: &str) -> Option<MetricValue> {
        let raw = raw.trim();
        match self {
            Cast::Integer => raw.parse().ok().map(MetricValue::Integer),
            Cast::Float => raw.parse().ok().map(MetricValue::Float),
        }
    }
}

/// Applies `pattern` to `text` and casts the first capture group of the first
/// match. No match yields `default`; a capture that `cast` rejects is a
/// [`HarnessError::MalformedMetric`].
pub fn extract<T, F>(pattern: &Regex, text: &str, cast: F, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<T>,
{
    let Some(captures) = pattern.captures(text) else {
        return Ok(default);
    };
    let captured = captures.get(1).map_or("", |m| m.as_str());
    cast(captured).ok_or_else(|| HarnessError::MalformedMetric {
        pattern: pattern.as_str().to_string(),
        captured: captured.to_string(),
    })
}

/// One named extraction rule.
#[derive(Debug, Clone)]
pub struct MetricRule {
    name: String,
    pattern: Regex,
    cast: Cast,
    default: MetricValue,
}

impl MetricRule {
    /// Compiles `pattern` case-insensitively. The value is its first capture group.
    pub fn new(name: impl Into<String>, pattern: &str, cast: Cast, default: MetricValue) -> Result<Self> {
        let name = name.into();
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| HarnessError::invalid(format!("pattern for metric `{}`: {}", name, e)))?;
        if pattern.captures_len() < 2 {
            return Err(HarnessError::invalid(format!("pattern for metric `{}` has no capture group", name)));
        }
        Ok(Self { name, pattern, cast, default })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn extract(&self, text: &str) -> Result<MetricValue> {
        extract(&self.pattern, text, |raw| self.cast.apply(raw), self.default)
    }
}

/// Serializable description of a rule, as found in sweep config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRuleSpec {
    pub name: String,
    pub pattern: String,
    #[serde(default = "default_cast")]
    pub cast: Cast,
    #[serde(default = "default_value")]
    pub default: MetricValue,
}

fn default_cast() -> Cast {
    Cast::Integer
}

fn default_value() -> MetricValue {
    MetricValue::Integer(0)
}

impl MetricRuleSpec {
    pub fn compile(&self) -> Result<MetricRule> {
        MetricRule::new(self.name.clone(), &self.pattern, self.cast, self.default)
    }
}

/// Metric name to value, for one session's output.
pub type ExtractedMetrics = BTreeMap<String, MetricValue>;

/// Ordered, open set of extraction rules.
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    rules: Vec<MetricRule>,
}

impl MetricRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding the stash-size and capacity rules.
    pub fn standard() -> Result<Self> {
        let zero = MetricValue::Integer(0);
        let rules = vec![
            MetricRule::new(STASH_SIZE, STASH_PATTERN, Cast::Integer, zero)?,
            MetricRule::new(CAPACITY, CAPACITY_PATTERN, Cast::Integer, zero)?,
        ];
        Ok(Self { rules })
    }

    pub fn register(&mut self, rule: MetricRule) -> Result<()> {
        if self.get(rule.name()).is_some() {
            return Err(HarnessError::invalid(format!("metric `{}` registered twice", rule.name())));
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MetricRule> {
        self.rules.iter().find(|rule| rule.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(MetricRule::name)
    }

    /// Runs every rule against `text`. Fails on the first malformed capture.
    pub fn extract_all(&self, text: &str) -> Result<ExtractedMetrics> {
        self.rules
            .iter()
            .map(|rule| rule.extract(text).map(|value| (rule.name().to_string(), value)))
            .collect()
    }
}
