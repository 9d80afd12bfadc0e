//! Session-credit bookkeeping.
//!
//! A client holds a count of paid sessions left and a running total of
//! sessions ever granted. The arithmetic lives here so handlers only load,
//! apply and store.

use chrono::NaiveDate;
use serde_json::Value;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCounters {
    pub sessions_remaining: i64,
    pub total_sessions: i64,
    pub last_session_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Grant one more session.
    Increment,
    /// Use one session. Floors at zero and always stamps the date.
    Decrement,
    /// Correct the remaining count; the total is untouched.
    Set(i64),
    /// Start a new package: remaining and total both become the count.
    Reset(i64),
}

impl SessionAction {
    /// Builds an action from a request's `action` and raw `count` fields.
    pub fn parse(action: Option<&str>, count: Option<&Value>) -> Result<Self, AppError> {
        let count = count.and_then(Value::as_i64);

        match action {
            Some("increment") => Ok(SessionAction::Increment),
            Some("decrement") => Ok(SessionAction::Decrement),
            Some("set") => count
                .map(SessionAction::Set)
                .ok_or_else(|| AppError::Validation("Count is required for set action".to_string())),
            Some("reset") => count.map(SessionAction::Reset).ok_or_else(|| {
                AppError::Validation("Count is required for reset action".to_string())
            }),
            _ => Err(AppError::Validation(
                "Invalid action. Use increment, decrement, set, or reset".to_string(),
            )),
        }
    }
}

impl SessionCounters {
    pub fn apply(self, action: SessionAction, today: NaiveDate) -> Self {
        match action {
            SessionAction::Increment => Self {
                sessions_remaining: self.sessions_remaining.saturating_add(1),
                total_sessions: self.total_sessions.saturating_add(1),
                ..self
            },
            SessionAction::Decrement => Self {
                sessions_remaining: (self.sessions_remaining - 1).max(0),
                last_session_date: Some(today),
                ..self
            },
            SessionAction::Set(count) => Self {
                sessions_remaining: count.max(0),
                ..self
            },
            SessionAction::Reset(count) => Self {
                sessions_remaining: count.max(0),
                total_sessions: count.max(0),
                ..self
            },
        }
    }
}

/// Counter adjustments accepted by the legacy customers API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterAdjustment {
    Set(i64),
    Add(i64),
    Subtract(i64),
}

impl CounterAdjustment {
    /// `set`/`update` need a non-negative count; the others default to 1.
    pub fn parse(action: Option<&str>, count: Option<&Value>) -> Result<Self, AppError> {
        let count = count.and_then(Value::as_i64);

        match action {
            Some("set") | Some("update") => match count {
                Some(n) if n >= 0 => Ok(CounterAdjustment::Set(n)),
                _ => Err(AppError::Validation(
                    "Count must be a non-negative number".to_string(),
                )),
            },
            Some("increment") | Some("plus") => Ok(CounterAdjustment::Add(count.unwrap_or(1))),
            Some("decrement") | Some("minus") => {
                Ok(CounterAdjustment::Subtract(count.unwrap_or(1)))
            }
            _ => Err(AppError::Validation(
                "Invalid action. Use \"set\", \"increment\", or \"decrement\"".to_string(),
            )),
        }
    }

    pub fn apply(self, current: i64) -> i64 {
        match self {
            CounterAdjustment::Set(n) => n,
            CounterAdjustment::Add(n) => current.saturating_add(n).max(0),
            CounterAdjustment::Subtract(n) => current.saturating_sub(n).max(0),
        }
    }
}
