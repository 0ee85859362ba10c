//! TAM-VA voice assistant
//!
//! Runs the turn loop on a background worker and prints its status in the foreground.
//! Ctrl-C requests shutdown; the process waits for the current turn to finish.
//!
//! `tamva --list-devices` prints the available input devices and exits.

mod presenter;
mod wiring;

use anyhow::Context;
use presenter::ConsolePresenter;
use tamva_core::{AssistantConfig, ExitReason, OrchestratorRuntime, WorkerExit};
use tamva_voice::MicrophoneSource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[tamva] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if std::env::args().any(|a| a == "--list-devices") {
        for name in MicrophoneSource::list_input_devices().context("list input devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let config = AssistantConfig::load().context("load configuration")?;
    tracing::info!(
        wake_phrase = %config.wake.phrase,
        policy = ?config.router.policy,
        "TAM-VA starting"
    );

    let presenter = ConsolePresenter::new();
    let worker_config = config.clone();
    let (handle, mut status_rx) = OrchestratorRuntime::start(move |status, cancel| {
        wiring::build_controller(&worker_config, status, cancel)
    })
    .context("start worker")?;

    loop {
        tokio::select! {
            update = status_rx.recv() => match update {
                Some(update) => {
                    presenter.show(&update);
                    if update.severity.is_terminal() {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; waiting for the current turn to finish");
                handle.request_shutdown();
                break;
            }
        }
    }

    // Joining blocks until the worker observes the signal; keep the runtime free meanwhile.
    let exit = tokio::task::spawn_blocking(move || handle.shutdown())
        .await
        .context("join worker")?;
    while let Ok(update) = status_rx.try_recv() {
        presenter.show(&update);
    }

    match exit {
        WorkerExit::Completed(summary) => {
            tracing::info!(
                turns = summary.turns,
                failures = summary.failures,
                sessions = summary.sessions,
                "TAM-VA stopped"
            );
            match summary.exit {
                ExitReason::Cancelled => Ok(()),
                ExitReason::InputClosed => anyhow::bail!("audio input closed"),
                ExitReason::Fatal => anyhow::bail!("turn loop stopped on a fatal error"),
            }
        }
        WorkerExit::InitFailed(reason) => anyhow::bail!("initialization failed: {}", reason),
        WorkerExit::Panicked => anyhow::bail!("worker thread panicked"),
    }
}
