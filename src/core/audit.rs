// src/core/audit.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::identity::types::Modality;
use crate::utils::{
    clock::Clock,
    error::{AuthError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptMethod {
    Password,
    SecondFactor(Modality),
}

impl AttemptMethod {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptMethod::Password => "password",
            AttemptMethod::SecondFactor(modality) => modality.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub id: Uuid,
    pub user_id: Uuid,
    pub method: AttemptMethod,
    pub success: bool,
    pub confidence: Option<f64>,
    pub failure_reason: Option<String>,
    pub at: DateTime<Utc>,
}

impl LoginAttempt {
    pub fn succeeded(user_id: Uuid, method: AttemptMethod, confidence: Option<f64>, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            method,
            success: true,
            confidence,
            failure_reason: None,
            at,
        }
    }

    pub fn failed(
        user_id: Uuid,
        method: AttemptMethod,
        confidence: Option<f64>,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            method,
            success: false,
            confidence,
            failure_reason: Some(reason.into()),
            at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_attempts: usize,
    pub successes: usize,
    pub failures_by_method: HashMap<String, usize>,
}

/// Append-only record of authentication attempts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttemptLog: Send + Sync {
    async fn record(&self, attempt: LoginAttempt) -> Result<()>;

    /// Most recent attempts for `user_id`, newest first.
    async fn history(&self, user_id: Uuid, limit: usize) -> Result<Vec<LoginAttempt>>;
}

pub struct InMemoryAttemptLog {
    attempts: RwLock<Vec<LoginAttempt>>,
    retention_period: Duration,
    clock: Arc<dyn Clock>,
}

impl InMemoryAttemptLog {
    pub fn new(retention_days: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            attempts: RwLock::new(Vec::new()),
            retention_period: Duration::days(retention_days),
            clock,
        }
    }

    pub async fn attempts_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<LoginAttempt>> {
        if end < start {
            return Err(AuthError::Storage("invalid attempt period".into()));
        }

        let attempts = self.attempts.read().await;
        Ok(attempts
            .iter()
            .filter(|a| a.at >= start && a.at <= end)
            .cloned()
            .collect())
    }

    pub async fn summary(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<AttemptSummary> {
        let attempts = self.attempts_between(start, end).await?;
        let mut failures_by_method = HashMap::new();
        for attempt in attempts.iter().filter(|a| !a.success) {
            *failures_by_method.entry(attempt.method.label().to_string()).or_insert(0) += 1;
        }

        Ok(AttemptSummary {
            period_start: start,
            period_end: end,
            total_attempts: attempts.len(),
            successes: attempts.iter().filter(|a| a.success).count(),
            failures_by_method,
        })
    }

    fn cleanup_old_attempts(&self, attempts: &mut Vec<LoginAttempt>) {
        let cutoff = self.clock.now() - self.retention_period;
        attempts.retain(|attempt| attempt.at >= cutoff);
    }
}

#[async_trait]
impl AttemptLog for InMemoryAttemptLog {
    async fn record(&self, attempt: LoginAttempt) -> Result<()> {
        let mut attempts = self.attempts.write().await;
        attempts.push(attempt);
        self.cleanup_old_attempts(&mut attempts);
        Ok(())
    }

    async fn history(&self, user_id: Uuid, limit: usize) -> Result<Vec<LoginAttempt>> {
        let attempts = self.attempts.read().await;
        let mut history: Vec<LoginAttempt> = attempts
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        // Stable sort: attempts sharing a timestamp stay newest first.
        history.sort_by(|a, b| b.at.cmp(&a.at));
        history.truncate(limit);
        Ok(history)
    }
}
