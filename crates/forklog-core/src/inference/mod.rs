//! Nutrition inference boundary.
//!
//! The engine never talks to an inference provider itself. Hosts hand in a
//! [`NutritionInference`] implementation; the engine rate-limits calls and
//! persists whatever estimate comes back.

mod rate_limit;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use rate_limit::RateLimiter;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    #[error("Inference rate limit exceeded; retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Inference service error: {0}")]
    Service(String),
}

/// Structured result of one inference call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionEstimate {
    pub calories: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein_grams: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs_grams: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat_grams: Option<f64>,
    /// Provider's short description of what it recognized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl NutritionEstimate {
    /// Serialized form stored in an entry's details blob.
    pub fn to_details(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_details(details: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(details)?)
    }
}

/// Remote procedure turning a meal description (and optional photo) into an estimate.
pub trait NutritionInference: Send + Sync {
    fn infer(
        &self,
        description: &str,
        category: &str,
        media: Option<&[u8]>,
    ) -> impl Future<Output = Result<NutritionEstimate, InferenceError>> + Send;
}
