//! Validated input collection.
//!
//! Each `ask_*` method keeps asking until the answer satisfies its rule. A
//! rejected answer prints the rule's message and repeats the same prompt;
//! there is no retry limit. Validation lives in [`IntRule`] and [`FloatRule`]
//! so it can be checked without a terminal.

use std::ops::{Bound, RangeBounds};

use crate::error::{Result, ValidationError};
use crate::terminal::Terminal;

/// Inclusive integer range with an optional step constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntRule {
    pub min: i64,
    pub max: i64,
    pub step: i64,
}

impl IntRule {
    pub const fn range(min: i64, max: i64) -> Self {
        Self { min, max, step: 1 }
    }

    pub const fn multiple(min: i64, max: i64, step: i64) -> Self {
        Self { min, max, step }
    }

    /// Accepts `value` iff `min <= value <= max` and `value % step == 0`.
    pub fn check(&self, value: i64) -> std::result::Result<i64, ValidationError> {
        if !(self.min..=self.max).contains(&value) {
            return Err(ValidationError::OutOfRange {
                min: self.min.to_string(),
                max: self.max.to_string(),
            });
        }
        if self.step > 1 && value % self.step != 0 {
            return Err(ValidationError::NotMultiple { step: self.step });
        }
        Ok(value)
    }

    pub fn parse(&self, raw: &str) -> std::result::Result<i64, ValidationError> {
        let value = raw
            .trim()
            .parse::<i64>()
            .map_err(|_| ValidationError::NotAnInteger {
                input: raw.to_string(),
            })?;
        self.check(value)
    }
}

/// Finite float range; either end may be open or unbounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatRule {
    pub min: Bound<f64>,
    pub max: Bound<f64>,
}

impl FloatRule {
    /// `(0, inf)`
    pub const POSITIVE: Self = Self {
        min: Bound::Excluded(0.0),
        max: Bound::Unbounded,
    };

    /// `[0, inf)`
    pub const NON_NEGATIVE: Self = Self {
        min: Bound::Included(0.0),
        max: Bound::Unbounded,
    };

    /// `(0, 1]`
    pub const UNIT_OPEN_LOW: Self = Self {
        min: Bound::Excluded(0.0),
        max: Bound::Included(1.0),
    };

    /// `[0, 1)`
    pub const UNIT_OPEN_HIGH: Self = Self {
        min: Bound::Included(0.0),
        max: Bound::Excluded(1.0),
    };

    pub fn check(&self, value: f64) -> std::result::Result<f64, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NotANumber {
                input: value.to_string(),
            });
        }
        if !(self.min, self.max).contains(&value) {
            return Err(ValidationError::OutOfRange {
                min: describe_bound(self.min, "-inf"),
                max: describe_bound(self.max, "inf"),
            });
        }
        Ok(value)
    }

    pub fn parse(&self, raw: &str) -> std::result::Result<f64, ValidationError> {
        let value = raw
            .trim()
            .parse::<f64>()
            .map_err(|_| ValidationError::NotANumber {
                input: raw.to_string(),
            })?;
        self.check(value)
    }
}

fn describe_bound(bound: Bound<f64>, unbounded: &str) -> String {
    match bound {
        Bound::Included(v) => v.to_string(),
        Bound::Excluded(v) => format!("{v} (exclusive)"),
        Bound::Unbounded => unbounded.to_string(),
    }
}

/// Prompts for scalar values through a [`Terminal`].
pub struct InputCollector<'t> {
    term: &'t mut dyn Terminal,
}

impl<'t> InputCollector<'t> {
    pub fn new(term: &'t mut dyn Terminal) -> Self {
        Self { term }
    }

    /// The underlying terminal, for explanatory output between prompts.
    pub fn terminal(&mut self) -> &mut dyn Terminal {
        &mut *self.term
    }

    /// Ask until `validate` accepts the answer.
    pub fn ask_validated<T, F>(&mut self, prompt: &str, default: Option<&str>, validate: F) -> Result<T>
    where
        F: Fn(&str) -> std::result::Result<T, ValidationError>,
    {
        loop {
            let raw = self.term.input(prompt, default)?;
            match validate(&raw) {
                Ok(value) => return Ok(value),
                Err(rejection) => {
                    tracing::debug!(prompt, input = %raw, %rejection, "Input rejected");
                    self.term.error(&rejection.to_string());
                }
            }
        }
    }

    /// Non-empty string, trimmed.
    pub fn ask_string(&mut self, prompt: &str, default: &str) -> Result<String> {
        self.ask_validated(prompt, Some(default), |raw| {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                Err(ValidationError::Empty)
            } else {
                Ok(trimmed.to_string())
            }
        })
    }

    pub fn ask_bool(&mut self, prompt: &str, default: bool) -> Result<bool> {
        self.term.confirm(prompt, default)
    }

    pub fn ask_int(&mut self, prompt: &str, min: i64, max: i64, default: i64) -> Result<i64> {
        self.ask_int_rule(prompt, IntRule::range(min, max), default)
    }

    pub fn ask_int_multiple(
        &mut self,
        prompt: &str,
        min: i64,
        max: i64,
        step: i64,
        default: i64,
    ) -> Result<i64> {
        self.ask_int_rule(prompt, IntRule::multiple(min, max, step), default)
    }

    pub fn ask_int_rule(&mut self, prompt: &str, rule: IntRule, default: i64) -> Result<i64> {
        let default = default.to_string();
        self.ask_validated(prompt, Some(&default), |raw| rule.parse(raw))
    }

    pub fn ask_float(&mut self, prompt: &str, rule: FloatRule, default: f64) -> Result<f64> {
        let default = default.to_string();
        self.ask_validated(prompt, Some(&default), |raw| rule.parse(raw))
    }
}
