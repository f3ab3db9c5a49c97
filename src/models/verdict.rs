//! Verdict payloads produced by the generator.
//!
//! The cache treats a verdict as an opaque JSON value ([`VerdictPayload`]) so
//! that whatever the generator returned round-trips losslessly. Presentation
//! code parses it once into [`DayVerdict`] instead of poking at raw fields.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Opaque structured verdict for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerdictPayload(Value);

impl VerdictPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Parse the payload into its typed view.
    pub fn parse(&self) -> Result<DayVerdict> {
        Ok(DayVerdict::deserialize(&self.0)?)
    }
}

impl From<Value> for VerdictPayload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Typed view of a verdict payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayVerdict {
    pub day: String,
    #[serde(default)]
    pub cafeterias: Vec<Venue>,
}

/// A cafeteria, either sold as a fixed package or ordered item by item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Venue {
    /// Fixed set meals; the diner gets every item on the tray.
    Package {
        name: String,
        #[serde(default)]
        meals: Vec<Meal>,
    },
    /// Individually ordered dishes.
    Individual {
        name: String,
        #[serde(default)]
        safe_options: Vec<String>,
        #[serde(default)]
        avoid: Vec<String>,
    },
}

impl Venue {
    pub fn name(&self) -> &str {
        match self {
            Venue::Package { name, .. } | Venue::Individual { name, .. } => name,
        }
    }
}

/// One meal service of a package venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub time: String,
    pub verdict: MealVerdict,
    #[serde(default)]
    pub main_dish: String,
    #[serde(default)]
    pub safe_items: Vec<String>,
    #[serde(default)]
    pub skip_items: Vec<String>,
    #[serde(default)]
    pub reason: String,
}

/// Worthiness of a package meal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MealVerdict {
    /// Every item is acceptable
    Safe,
    /// Main dish is acceptable, some sides must be skipped
    WorthIt,
    /// Main dish is not acceptable
    NotWorth,
    /// No meal served
    None,
    /// Anything the generator made up
    Unknown,
}

impl MealVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            MealVerdict::Safe => "SAFE",
            MealVerdict::WorthIt => "WORTH IT",
            MealVerdict::NotWorth => "NOT WORTH",
            MealVerdict::None => "NONE",
            MealVerdict::Unknown => "UNKNOWN",
        }
    }
}

impl From<String> for MealVerdict {
    fn from(raw: String) -> Self {
        let normalized: String = raw
            .trim()
            .to_uppercase()
            .chars()
            .map(|c| if c == '_' || c == '-' { ' ' } else { c })
            .collect();
        match normalized.as_str() {
            "SAFE" => MealVerdict::Safe,
            "WORTH IT" => MealVerdict::WorthIt,
            "NOT WORTH" | "NOT WORTH IT" => MealVerdict::NotWorth,
            "NONE" | "" => MealVerdict::None,
            _ => MealVerdict::Unknown,
        }
    }
}

impl From<MealVerdict> for String {
    fn from(verdict: MealVerdict) -> Self {
        verdict.as_str().to_string()
    }
}

impl fmt::Display for MealVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-day counts used by the weekly summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerdictTally {
    pub safe: usize,
    pub worth_it: usize,
    pub not_worth: usize,
    pub individual_options: usize,
}

impl DayVerdict {
    pub fn tally(&self) -> VerdictTally {
        let mut tally = VerdictTally::default();
        for venue in &self.cafeterias {
            match venue {
                Venue::Package { meals, .. } => {
                    for meal in meals {
                        match meal.verdict {
                            MealVerdict::Safe => tally.safe += 1,
                            MealVerdict::WorthIt => tally.worth_it += 1,
                            MealVerdict::NotWorth => tally.not_worth += 1,
                            MealVerdict::None | MealVerdict::Unknown => {}
                        }
                    }
                }
                Venue::Individual { safe_options, .. } => {
                    tally.individual_options += safe_options.len();
                }
            }
        }
        tally
    }
}

/// Prompt framing used by the verdict generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptVariant {
    /// Only pork is checked; explicitly not a halal certification
    #[default]
    PorkFree,
    /// Full halal framing
    Halal,
}
