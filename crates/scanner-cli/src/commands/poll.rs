use super::events::write_events;
use super::PollAction;
use crate::app::AppContext;
use scanner_core::{CancelToken, LogBuffer, Refresher, ScannerError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const POLL_WORKER: &str = "poll";

/// Parse `<int>[s|m|h|d]`. A bare number means seconds; zero is rejected.
pub fn parse_interval(raw: &str) -> scanner_core::Result<Duration> {
    let raw = raw.trim().to_lowercase();
    let invalid = || {
        ScannerError::InvalidQuery(format!(
            "invalid interval '{}', expected <int>[s|m|h|d]",
            raw
        ))
    };

    let (digits, unit) = match raw.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&raw[..i], c),
        _ => (raw.as_str(), 's'),
    };
    let value: u64 = digits.parse().map_err(|_| invalid())?;
    let secs = match unit {
        's' => value,
        'm' => value.checked_mul(60).ok_or_else(invalid)?,
        'h' => value.checked_mul(3_600).ok_or_else(invalid)?,
        'd' => value.checked_mul(86_400).ok_or_else(invalid)?,
        _ => return Err(invalid()),
    };

    if secs == 0 {
        return Err(invalid());
    }
    Ok(Duration::from_secs(secs))
}

/// Refresh, report new events, sleep; until cancelled.
///
/// A failed refresh is logged and the loop carries on with the next cycle.
pub async fn poll_loop(
    refresher: Arc<Refresher>,
    buffer: Arc<LogBuffer>,
    interval: Duration,
    token: CancelToken,
) -> anyhow::Result<()> {
    info!("Poll started, interval={}s", interval.as_secs());

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            result = refresher.refresh() => match result {
                Ok(events) => write_events(&buffer, "POLL", events.iter()),
                Err(e) => error!("Poll refresh failed: {}", e),
            },
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("Poll task cancelled");
    debug!("Poll loop exited");
    Ok(())
}

pub async fn run(ctx: &AppContext, action: Option<PollAction>) -> anyhow::Result<()> {
    let scheduler = &ctx.scheduler;

    match action {
        None => {
            if scheduler.has_worker(POLL_WORKER) {
                info!("Poll is ON, use 'poll stop' to stop");
            } else {
                info!("Poll is OFF, use 'poll start [INTERVAL]' to start");
            }
        }

        Some(PollAction::Stop) => {
            if !scheduler.has_worker(POLL_WORKER) {
                warn!("Poll is not running");
                return Ok(());
            }

            info!("Stopping poll loop...");
            scheduler
                .stop_and_wait(POLL_WORKER, ctx.config.grace_period())
                .await;
            if scheduler.has_worker(POLL_WORKER) {
                warn!("Poll is still stopping");
            } else {
                info!("Poll stopped");
            }
        }

        Some(PollAction::Start { interval }) => {
            let interval = match interval {
                Some(raw) => parse_interval(&raw)?,
                None => ctx.config.poll_interval(),
            };

            if scheduler.has_worker(POLL_WORKER) {
                warn!("Poll already running");
                return Ok(());
            }

            info!("Starting poll loop...");
            let refresher = ctx.refresher.clone();
            let buffer = ctx.buffer.clone();
            let worker = match scheduler.spawn(POLL_WORKER, move |token| {
                poll_loop(refresher, buffer, interval, token)
            }) {
                Ok(worker) => worker,
                Err(ScannerError::DuplicateWorker(_)) => {
                    warn!("Poll already running");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            // Without a console the loop runs in the foreground until
            // interrupted; shutdown then cancels it.
            if !ctx.interactive {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Interrupted"),
                    _ = worker.wait() => {}
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::handle_line;
    use super::super::test_support::*;
    use super::*;
    use scanner_core::WorkerOutcome;

    #[test]
    fn test_parse_interval_units() {
        assert_eq!(parse_interval("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_interval("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_interval("1H").unwrap(), Duration::from_secs(3_600));
        assert_eq!(parse_interval("2d").unwrap(), Duration::from_secs(172_800));
        assert_eq!(parse_interval("45").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn test_parse_interval_rejects_garbage() {
        for raw in ["", "0s", "m", "5w", "-5s", "1.5m", "s5"] {
            assert!(parse_interval(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[tokio::test]
    async fn test_poll_loop_reports_and_stops_on_cancel() {
        let h = harness(true);
        {
            let mut batches = h.feed.batches.lock().unwrap();
            batches.push(vec![event(1, "Rån", "a", "Rån", "Solna")]);
            batches.push(vec![
                event(2, "Brand", "b", "Brand", "Solna"),
                event(1, "Rån", "a", "Rån", "Solna"),
            ]);
        }

        let refresher = h.ctx.refresher.clone();
        let buffer = h.ctx.buffer.clone();
        let worker = h
            .ctx
            .scheduler
            .spawn(POLL_WORKER, move |token| {
                poll_loop(refresher, buffer, Duration::from_millis(20), token)
            })
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while h.results("POLL").len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(
            h.results("POLL"),
            vec!["POLL: 1 - Rån - a", "POLL: 2 - Brand - b"]
        );

        worker.cancel();
        assert_eq!(worker.wait().await, WorkerOutcome::Cancelled);
        assert!(h.ctx.buffer.snapshot().contains("Poll task cancelled"));
    }

    #[tokio::test]
    async fn test_poll_commands() {
        let h = harness(true);
        handle_line(&h.ctx, "poll").await;
        assert!(h.ctx.buffer.snapshot().contains("Poll is OFF"));

        handle_line(&h.ctx, "poll stop").await;
        assert!(h.ctx.buffer.snapshot().contains("Poll is not running"));

        handle_line(&h.ctx, "poll start 10m").await;
        assert!(h.ctx.scheduler.has_worker(POLL_WORKER));

        handle_line(&h.ctx, "poll start").await;
        assert!(h.ctx.buffer.snapshot().contains("Poll already running"));

        handle_line(&h.ctx, "poll").await;
        assert!(h.ctx.buffer.snapshot().contains("Poll is ON"));

        handle_line(&h.ctx, "poll stop").await;
        assert!(!h.ctx.scheduler.has_worker(POLL_WORKER));
        assert!(h.ctx.buffer.snapshot().contains("Poll stopped"));
    }

    #[tokio::test]
    async fn test_bad_interval_is_a_warning() {
        let h = harness(true);
        handle_line(&h.ctx, "poll start soon").await;
        assert!(!h.ctx.scheduler.has_worker(POLL_WORKER));
        assert!(h.ctx.buffer.snapshot().contains("[-] Invalid query: invalid interval"));
    }
}
