use std::fmt::Write as _;
use std::time::Duration;

use crate::value::Value;

/// Debug and slow-query logging policy shared by the connection and
/// transaction executors.
///
/// A transaction snapshots the store's policy at `begin`; flipping the
/// store's settings afterwards does not reach transactions already running.
/// Emission goes through `tracing` events and is best-effort: with no
/// subscriber installed the events vanish, and a query never fails because
/// of its log line.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LogPolicy {
    pub(crate) debug: bool,
    pub(crate) slowlog: Duration,
}

impl LogPolicy {
    /// Emits the `DEBUG` line for a statement about to run.
    pub(crate) fn debug_line(&self, sql: &str, args: &[Value]) {
        if self.debug {
            tracing::debug!(
                target: "sqlx_instrumented_db::sql",
                statement = %sql,
                args = ?args,
                "DEBUG"
            );
        }
    }

    /// Emits the `SLOW` line when the measured duration crossed the
    /// threshold. Timing starts right before the driver call, so pool
    /// acquisition latency is not counted.
    pub(crate) fn observe(&self, sql: &str, args: &[Value], elapsed: Duration) {
        if self.is_slow(elapsed) {
            tracing::warn!(
                target: "sqlx_instrumented_db::sql",
                elapsed = ?elapsed,
                statement = %sql,
                args = ?args,
                "SLOW"
            );
        }
    }

    /// A call is slow iff the threshold is set and elapsed strictly
    /// exceeds it. A zero threshold disables slow logging.
    pub(crate) fn is_slow(&self, elapsed: Duration) -> bool {
        self.slowlog > Duration::ZERO && elapsed > self.slowlog
    }
}

/// Substitutes `?` placeholders with the display form of each argument.
///
/// Observability output only. The result is tagged onto tracing spans and
/// must never be sent to the driver; the real statement always travels with
/// its placeholders and bound arguments.
pub(crate) fn interpolate(sql: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(sql.len() + 16 * args.len());
    let mut remaining = args.iter();
    for ch in sql.chars() {
        if ch == '?' {
            match remaining.next() {
                Some(value) => {
                    let _ = write!(out, "{value}");
                }
                None => out.push('?'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threshold_never_slow() {
        let policy = LogPolicy::default();
        assert!(!policy.is_slow(Duration::from_secs(3600)));
    }

    #[test]
    fn slow_is_strictly_exceeding() {
        let policy = LogPolicy {
            debug: false,
            slowlog: Duration::from_millis(50),
        };
        assert!(!policy.is_slow(Duration::from_millis(10)));
        assert!(!policy.is_slow(Duration::from_millis(50)));
        assert!(policy.is_slow(Duration::from_millis(51)));
        assert!(policy.is_slow(Duration::from_millis(80)));
    }

    #[test]
    fn interpolate_substitutes_in_order() {
        let args = [Value::from("alice"), Value::from(3), Value::Null];
        assert_eq!(
            interpolate("SELECT * FROM t WHERE a = ? AND b = ? AND c = ?", &args),
            "SELECT * FROM t WHERE a = 'alice' AND b = 3 AND c = NULL"
        );
    }

    #[test]
    fn interpolate_keeps_unmatched_placeholders() {
        assert_eq!(interpolate("a = ? AND b = ?", &[Value::from(1)]), "a = 1 AND b = ?");
        assert_eq!(interpolate("no placeholders", &[]), "no placeholders");
    }
}
