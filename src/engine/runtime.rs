// src/engine/runtime.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::system::System;
use crate::types::FsEvent;
use crate::watch::{spawn_watcher, Classification, EventClassifier};

use super::{DutyScheduler, RunPoller};

/// Cancel the returned token on SIGTERM or SIGINT (Ctrl-C).
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        token_clone.cancel();
    });

    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(err), _) | (_, Err(err)) => {
            error!(error = %err, "failed to install signal handlers; falling back to Ctrl-C");
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl-C, shutting down"),
        Err(err) => {
            error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

/// Start the service and run until `token` is cancelled.
///
/// Every submitter must pass its startup check first. Then interrupted
/// duties are recovered and file timestamps refreshed from disk. With
/// `once` set, each poller runs a single pass and the function returns;
/// otherwise the event consumer and both polling loops run side by side.
pub async fn run_service(system: Arc<System>, once: bool, token: CancellationToken) -> Result<()> {
    system.test_submitters().await?;

    let poller = RunPoller::new(Arc::clone(&system));
    let scheduler = Arc::new(DutyScheduler::new(Arc::clone(&system)));

    let recovered = scheduler.recover_interrupted()?;
    let refreshed = poller.refresh_from_disk().await?;
    info!(recovered, refreshed, "startup recovery complete");

    if once {
        let runs = poller.poll_runs().await?;
        let tally = scheduler.poll_duties().await?;
        info!(
            runs,
            polled = tally.polled,
            submitted = tally.submitted,
            collected = tally.collected,
            "single pass complete"
        );
        return Ok(());
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let watch_root = system.service.watch_root.clone();
    let _watcher = spawn_watcher(&watch_root, events_tx)?;

    let classifier = EventClassifier::new(Arc::clone(&system));
    let events = tokio::spawn(consume_events(classifier, events_rx, token.clone()));

    let run_period = system.service.run_polling_interval();
    let runs = tokio::spawn(run_loop(poller, run_period, token.clone()));

    let duty_period = system.service.job_polling_interval();
    let duties = tokio::spawn(duty_loop(scheduler, duty_period, token.clone()));

    info!(root = ?watch_root, ?run_period, ?duty_period, "runwarden started");

    let (events, runs, duties) = tokio::join!(events, runs, duties);
    for (name, joined) in [("events", events), ("runs", runs), ("duties", duties)] {
        if let Err(err) = joined {
            error!(task = name, error = %err, "service task panicked");
        }
    }

    info!("runwarden stopped");
    Ok(())
}

/// Classify filesystem events one at a time, in arrival order.
async fn consume_events(
    classifier: EventClassifier,
    mut events_rx: mpsc::UnboundedReceiver<FsEvent>,
    token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = events_rx.recv() => match event {
                Some(event) => event,
                None => {
                    warn!("watcher channel closed");
                    break;
                }
            },
        };

        match classifier.classify(&event) {
            Ok(Classification::Ignored(reason)) => {
                debug!(path = ?event.path, ?reason, "event ignored");
            }
            Ok(classification) => debug!(?classification, "event classified"),
            Err(err) => error!(path = ?event.path, kind = ?event.kind, error = %err, "failed to classify event"),
        }
    }
}

async fn run_loop(poller: RunPoller, period: Duration, token: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = poller.poll_runs().await {
                    error!(error = %err, "run poll failed");
                }
            }
        }
    }
}

async fn duty_loop(scheduler: Arc<DutyScheduler>, period: Duration, token: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = scheduler.poll_duties().await {
                    error!(error = %err, "duty poll failed");
                }
            }
        }
    }
}
