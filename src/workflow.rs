//! Prediction → recommendation state machine for one employee.

use std::sync::Arc;

use crate::credits::CreditLedger;
use crate::error::{ErrorKind, Result, WhosNextError};
use crate::generation::{Disposition, Generation, GenerationCounter};
use crate::models::{
    EmployeeRecord, PredictionRequest, PredictionResult, RecommendationRequest,
    RecommendationResponse, RecommendationSet,
};

/// A prediction together with the employee and model it was produced for.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPrediction {
    pub employee_id: String,
    pub result: PredictionResult,
}

/// Where the prediction workflow is. Recommendations only exist alongside
/// the prediction they explain.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionPhase {
    Idle,
    Predicting {
        generation: Generation,
        employee_id: String,
        model_id: String,
    },
    Predicted {
        prediction: Arc<ScoredPrediction>,
    },
    Recommending {
        generation: Generation,
        prediction: Arc<ScoredPrediction>,
    },
    Recommended {
        prediction: Arc<ScoredPrediction>,
        recommendations: RecommendationSet,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingPrediction {
    pub generation: Generation,
    pub request: PredictionRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecommendation {
    pub generation: Generation,
    pub request: RecommendationRequest,
}

#[derive(Debug)]
pub struct PredictionWorkflowController {
    generations: GenerationCounter,
    phase: PredictionPhase,
    last_error: Option<WhosNextError>,
}

impl Default for PredictionWorkflowController {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictionWorkflowController {
    pub fn new() -> Self {
        Self {
            generations: GenerationCounter::new(),
            phase: PredictionPhase::Idle,
            last_error: None,
        }
    }

    pub fn phase(&self) -> &PredictionPhase {
        &self.phase
    }

    /// Error from the last prediction or recommendation attempt, shown inline.
    pub fn last_error(&self) -> Option<&WhosNextError> {
        self.last_error.as_ref()
    }

    pub fn prediction(&self) -> Option<&ScoredPrediction> {
        match &self.phase {
            PredictionPhase::Predicted { prediction }
            | PredictionPhase::Recommending { prediction, .. }
            | PredictionPhase::Recommended { prediction, .. } => Some(prediction),
            PredictionPhase::Idle | PredictionPhase::Predicting { .. } => None,
        }
    }

    pub fn recommendations(&self) -> Option<&RecommendationSet> {
        match &self.phase {
            PredictionPhase::Recommended {
                recommendations, ..
            } => Some(recommendations),
            _ => None,
        }
    }

    /// Drop everything: a new employee is being looked up. Anything in
    /// flight becomes stale.
    pub fn reset(&mut self) {
        let generation = self.generations.advance();
        if self.phase != PredictionPhase::Idle {
            tracing::debug!("prediction workflow reset at {}", generation);
        }
        self.phase = PredictionPhase::Idle;
        self.last_error = None;
    }

    /// Start scoring `features` (record with overrides merged) with `model_id`.
    /// Clears any displayed prediction and recommendations.
    pub fn begin_prediction(
        &mut self,
        employee_id: &str,
        model_id: &str,
        features: EmployeeRecord,
    ) -> Result<PendingPrediction> {
        let model_id = model_id.trim();
        if model_id.is_empty() {
            return Err(WhosNextError::invalid("a scoring model must be chosen"));
        }
        let generation = self.generations.advance();
        self.phase = PredictionPhase::Predicting {
            generation,
            employee_id: employee_id.to_string(),
            model_id: model_id.to_string(),
        };
        self.last_error = None;
        tracing::debug!(
            "predicting '{}' with {} at {}",
            employee_id,
            model_id,
            generation
        );
        Ok(PendingPrediction {
            generation,
            request: PredictionRequest {
                employee_id: employee_id.to_string(),
                model_id: model_id.to_string(),
                features,
            },
        })
    }

    pub fn complete_prediction(
        &mut self,
        generation: Generation,
        result: Result<PredictionResult>,
    ) -> Disposition {
        let employee_id = match &self.phase {
            PredictionPhase::Predicting {
                generation: pending,
                employee_id,
                ..
            } if *pending == generation && self.generations.is_current(generation) => {
                employee_id.clone()
            }
            _ => {
                tracing::debug!("discarding stale prediction response {}", generation);
                return Disposition::Discarded;
            }
        };
        match result.and_then(|r| r.validate().map(|_| r)) {
            Ok(result) => {
                tracing::info!(
                    "prediction for '{}': {:.2} ({})",
                    employee_id,
                    result.probability,
                    result.risk_level
                );
                self.phase = PredictionPhase::Predicted {
                    prediction: Arc::new(ScoredPrediction {
                        employee_id,
                        result,
                    }),
                };
            }
            Err(err) => {
                tracing::warn!("prediction for '{}' failed: {}", employee_id, err);
                self.phase = PredictionPhase::Idle;
                self.last_error = Some(err);
            }
        }
        Disposition::Applied
    }

    /// Start a recommendation call for the displayed prediction. The credit
    /// gate is checked here, at issue time; a refusal changes nothing.
    pub fn begin_recommendation(&mut self, ledger: &CreditLedger) -> Result<PendingRecommendation> {
        let prediction = match &self.phase {
            PredictionPhase::Predicted { prediction }
            | PredictionPhase::Recommended { prediction, .. } => Arc::clone(prediction),
            PredictionPhase::Recommending { .. } => {
                return Err(WhosNextError::invalid(
                    "a recommendation request is already in flight",
                ));
            }
            PredictionPhase::Idle | PredictionPhase::Predicting { .. } => {
                return Err(WhosNextError::invalid(
                    "recommendations need a completed prediction",
                ));
            }
        };
        if !ledger.can_recommend() {
            return Err(WhosNextError::QuotaExhausted {
                message: match ledger.remaining() {
                    Some(n) => format!("{} credits remaining", n),
                    None => "credit balance unknown".to_string(),
                },
            });
        }
        let generation = self.generations.advance();
        let request = RecommendationRequest {
            employee_id: prediction.employee_id.clone(),
            probability: prediction.result.probability,
            risk_level: prediction.result.risk_level,
            drivers: prediction.result.drivers.clone(),
        };
        self.phase = PredictionPhase::Recommending {
            generation,
            prediction,
        };
        self.last_error = None;
        Ok(PendingRecommendation { generation, request })
    }

    pub fn complete_recommendation(
        &mut self,
        generation: Generation,
        result: Result<RecommendationResponse>,
        ledger: &mut CreditLedger,
    ) -> Disposition {
        let prediction = match &self.phase {
            PredictionPhase::Recommending {
                generation: pending,
                prediction,
            } if *pending == generation && self.generations.is_current(generation) => {
                Arc::clone(prediction)
            }
            _ => {
                tracing::debug!("discarding stale recommendation response {}", generation);
                sync_from_stale(&result, ledger);
                return Disposition::Discarded;
            }
        };
        match result {
            Ok(response) => {
                ledger.sync(response.remaining_credits);
                tracing::info!(
                    "{} recommendations for '{}', {} credits left",
                    response.recommendations.len(),
                    prediction.employee_id,
                    response.remaining_credits
                );
                self.phase = PredictionPhase::Recommended {
                    prediction,
                    recommendations: RecommendationSet {
                        actions: response.recommendations,
                    },
                };
            }
            Err(err) => {
                if err.kind() == ErrorKind::QuotaExhausted {
                    ledger.sync(0);
                }
                tracing::warn!("recommendation request failed: {}", err);
                self.phase = PredictionPhase::Predicted { prediction };
                self.last_error = Some(err);
            }
        }
        Disposition::Applied
    }
}

/// A superseded recommendation was still served and charged. Its balance
/// is server truth unless a newer reply already reported a lower one.
fn sync_from_stale(result: &Result<RecommendationResponse>, ledger: &mut CreditLedger) {
    let reported = match result {
        Ok(response) => response.remaining_credits,
        Err(err) if err.kind() == ErrorKind::QuotaExhausted => 0,
        Err(_) => return,
    };
    if ledger.remaining().is_none_or(|cached| reported < cached) {
        ledger.sync(reported);
    }
}
