//! Delay Action
//!
//! Computes the run's resume instant from a base timestamp plus
//! configured offsets and suspends until then. Offsets apply in a fixed
//! order: months (day-clamped), then seconds, then the next occurrence
//! of a weekday (same day counts), then a time of day.
//!
//! If the computed instant is already in the past the action does not
//! suspend; it returns the configured `if_past` directive instead
//! (default Suspend, which makes the run immediately runnable again).
//! The computed instant is recorded on the run either way.

use chrono::{DateTime, Datelike, Duration, Months, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::action::{Action, ActionCtx, Directive};
use crate::engine::error::ActionError;

use super::decode;

#[derive(Debug, Default, Deserialize)]
struct DelayConfig {
    #[serde(default)]
    seconds: Option<i64>,

    #[serde(default)]
    months: Option<u32>,

    /// 0 = Monday .. 6 = Sunday.
    #[serde(default)]
    weekday: Option<u8>,

    /// "HH:MM" or "HH:MM:SS".
    #[serde(default)]
    time: Option<String>,

    /// Expression producing an RFC 3339 timestamp; defaults to now.
    #[serde(default)]
    base: Option<String>,

    /// Directive to return when the computed instant is in the past.
    #[serde(default)]
    if_past: Option<Value>,
}

/// Suspends the run until a computed instant.
pub struct Delay;

impl Action for Delay {
    fn name(&self) -> &str {
        "Delay"
    }

    fn run(&self, ctx: &mut ActionCtx<'_>) -> Result<Option<Directive>, ActionError> {
        let config: DelayConfig = decode(self.name(), ctx.config())?;

        let base = match &config.base {
            Some(expr) => parse_base(&ctx.eval(expr)?)?,
            None => Utc::now(),
        };
        let target = apply_offsets(base, &config)?;
        ctx.set_continue_after(target);

        if target <= Utc::now() {
            let directive = match &config.if_past {
                Some(value) => Directive::from_value(value)?,
                None => Directive::Suspend,
            };
            return Ok(Some(directive));
        }
        Ok(Some(Directive::Suspend))
    }
}

fn parse_base(value: &Value) -> Result<DateTime<Utc>, ActionError> {
    match value {
        Value::Null => Ok(Utc::now()),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| {
                ActionError::failed("Base date must be a datetime or a parsable string")
            }),
        _ => Err(ActionError::failed(
            "Base date must be a datetime or a parsable string",
        )),
    }
}

fn apply_offsets(base: DateTime<Utc>, config: &DelayConfig) -> Result<DateTime<Utc>, ActionError> {
    let mut target = base;

    if let Some(months) = config.months {
        target = target
            .checked_add_months(Months::new(months))
            .ok_or_else(|| ActionError::failed("delay overflows the calendar"))?;
    }

    if let Some(seconds) = config.seconds {
        target += Duration::seconds(seconds);
    }

    if let Some(weekday) = config.weekday {
        if weekday > 6 {
            return Err(ActionError::failed("weekday must be between 0 and 6"));
        }
        let current = target.weekday().num_days_from_monday();
        let ahead = (u32::from(weekday) + 7 - current) % 7;
        target += Duration::days(i64::from(ahead));
    }

    if let Some(time) = &config.time {
        let parsed = NaiveTime::parse_from_str(time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
            .map_err(|_| ActionError::failed(format!("invalid time of day '{}'", time)))?;
        target = Utc.from_utc_datetime(&target.date_naive().and_time(parsed));
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::flow::{FlowId, NodeId, Run};
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn engine() -> Engine {
        Engine::new(Arc::new(MemoryStore::new()))
    }

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-29T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn offsets(config: Value) -> DateTime<Utc> {
        let config: DelayConfig = serde_json::from_value(config).unwrap();
        apply_offsets(base(), &config).unwrap()
    }

    fn rfc3339(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_delay_sets_continue_after() {
        let engine = engine();
        let mut run = Run::new(FlowId(1), None);
        let now = Utc::now();
        let config = json!({
            "base": format!("'{}'", now.to_rfc3339()),
            "seconds": 65,
        });

        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        let directive = Delay.run(&mut ctx).unwrap();

        assert_eq!(directive, Some(Directive::Suspend));
        assert_eq!(run.continue_after, Some(now + Duration::seconds(65)));
    }

    #[test]
    fn test_delay_in_past_returns_if_past_directive() {
        let engine = engine();
        for (if_past, expected) in [
            (json!("suspend"), Directive::Suspend),
            (json!("leave"), Directive::Leave),
            (json!("break"), Directive::Break),
            (json!("abort"), Directive::Abort),
        ] {
            let mut run = Run::new(FlowId(1), None);
            let past = Utc::now() - Duration::seconds(20);
            let config = json!({
                "base": format!("'{}'", past.to_rfc3339()),
                "seconds": 5,
                "if_past": if_past,
            });

            let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
            let directive = Delay.run(&mut ctx).unwrap();
            assert_eq!(directive, Some(expected));
            // The computed instant is recorded even when not suspending.
            assert_eq!(run.continue_after, Some(past + Duration::seconds(5)));
        }
    }

    #[test]
    fn test_delay_in_future_suspends_regardless_of_if_past() {
        let engine = engine();
        let mut run = Run::new(FlowId(1), None);
        let now = Utc::now();
        let config = json!({
            "base": format!("'{}'", now.to_rfc3339()),
            "seconds": 3600,
            "if_past": "abort",
        });

        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(Delay.run(&mut ctx).unwrap(), Some(Directive::Suspend));
    }

    #[test]
    fn test_offset_seconds() {
        assert_eq!(offsets(json!({"seconds": 30})), rfc3339("2025-01-29T00:00:30Z"));
        assert_eq!(offsets(json!({"seconds": 61})), rfc3339("2025-01-29T00:01:01Z"));
        assert_eq!(
            offsets(json!({"seconds": 3605})),
            rfc3339("2025-01-29T01:00:05Z")
        );
    }

    #[test]
    fn test_offset_months_clamps_day() {
        assert_eq!(offsets(json!({"months": 1})), rfc3339("2025-02-28T00:00:00Z"));
    }

    #[test]
    fn test_offset_weekday() {
        // 2025-01-29 is a Wednesday.
        assert_eq!(offsets(json!({"weekday": 0})), rfc3339("2025-02-03T00:00:00Z"));
        assert_eq!(offsets(json!({"weekday": 6})), rfc3339("2025-02-02T00:00:00Z"));
        // Same weekday resolves to the same day.
        assert_eq!(offsets(json!({"weekday": 2})), rfc3339("2025-01-29T00:00:00Z"));
    }

    #[test]
    fn test_offset_time_of_day() {
        assert_eq!(
            offsets(json!({"time": "05:29"})),
            rfc3339("2025-01-29T05:29:00Z")
        );
    }

    #[test]
    fn test_offsets_combine_in_order() {
        let combined = json!({
            "months": 2,
            "seconds": 604800,
            "weekday": 0,
            "time": "05:29",
        });
        assert_eq!(offsets(combined), rfc3339("2025-04-07T05:29:00Z"));
    }

    #[test]
    fn test_bad_base_expression() {
        let engine = engine();
        let mut run = Run::new(FlowId(1), None);
        let config = json!({"base": "foo"});

        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        let err = Delay.run(&mut ctx).unwrap_err();
        assert!(err
            .to_string()
            .contains("Base date must be a datetime or a parsable string"));
    }

    #[test]
    fn test_bad_if_past_directive() {
        let engine = engine();
        let mut run = Run::new(FlowId(1), None);
        let past = Utc::now() - Duration::seconds(60);
        let config = json!({
            "base": format!("'{}'", past.to_rfc3339()),
            "if_past": 1000,
        });

        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        let err = Delay.run(&mut ctx).unwrap_err();
        assert_eq!(err.kind(), "DirectiveTypeError");
    }

    #[test]
    fn test_bad_weekday() {
        let config: DelayConfig = serde_json::from_value(json!({"weekday": 9})).unwrap();
        assert!(apply_offsets(base(), &config).is_err());
    }

    #[test]
    fn test_bad_time_of_day() {
        let config: DelayConfig = serde_json::from_value(json!({"time": "25:99"})).unwrap();
        assert!(apply_offsets(base(), &config).is_err());
    }
}
