use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rewards_core::{load_settings, RewardsError, RewardsHandle, Session};
use shared::{
    domain::VoucherId,
    protocol::{RouteStatus, SessionEvent},
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Margin added to simulated latencies before reading state back.
const SETTLE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Persona {
    User,
    Agent,
    All,
}

#[derive(Parser, Debug)]
struct Args {
    /// TOML settings file layered over the built-in demo seed.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Persona::All)]
    persona: Persona,
    /// Boxes to put on the scheduled pickup.
    #[arg(long, default_value_t = 5)]
    boxes: u32,
    #[arg(long, default_value = "V50")]
    voucher: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let settings = load_settings(args.config.as_deref())?;
    let session = Session::start(settings);
    let printer = spawn_event_printer(session.subscribe_events());

    if matches!(args.persona, Persona::User | Persona::All) {
        user_walkthrough(&session, args.boxes, VoucherId::new(args.voucher.as_str())).await?;
    }
    if matches!(args.persona, Persona::Agent | Persona::All) {
        agent_walkthrough(&session).await?;
    }

    session.shutdown().await;
    drop(session);
    printer.await.context("event printer panicked")?;
    Ok(())
}

fn spawn_event_printer(mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("event {line}"),
                    Err(err) => warn!("walkthrough: failed to encode event error={err}"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("walkthrough: event printer lagged skipped={skipped}");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn user_walkthrough(session: &Arc<Session>, boxes: u32, voucher_id: VoucherId) -> Result<()> {
    let user = session.get_user().await;
    let progress = session.ledger().tier_progress().await;
    println!("user {}", serde_json::to_string(&user)?);
    println!("tier {}", serde_json::to_string(&progress)?);

    {
        let mut wizard = session.pickup_wizard();
        wizard.set_quantity(boxes)?;
        info!(
            "walkthrough: pickup estimate boxes={} points={}",
            boxes,
            wizard.estimated_points()
        );
        wizard.next()?;
        let request = wizard.confirm()?;
        println!("pickup {}", serde_json::to_string(&request)?);

        tokio::time::sleep(session.settings().pickup.credit_delay() + SETTLE).await;
        if !wizard.credit_delivered() {
            warn!("walkthrough: pickup credit not delivered yet");
        }
    }

    let balance = session.get_user().await.green_points;
    for voucher in session.catalog().all() {
        let affordable = rewards_core::VoucherCatalog::affordable(voucher, balance);
        println!(
            "voucher id={} cost={} affordable={affordable}",
            voucher.id, voucher.points_cost
        );
    }

    match session.redeem(&voucher_id).await {
        Ok(pending) => {
            let tx = pending.wait().await?;
            println!("redeemed {}", serde_json::to_string(&tx)?);
        }
        Err(err @ RewardsError::Ledger(_)) => {
            warn!("walkthrough: redeem refused voucher={voucher_id} error={err}");
        }
        Err(err) => return Err(err.into()),
    }

    println!(
        "transactions {}",
        serde_json::to_string(&session.get_transactions().await)?
    );
    Ok(())
}

async fn agent_walkthrough(session: &Arc<Session>) -> Result<()> {
    let route = session.route();
    let capture_wait = session.settings().route.capture_latency() + SETTLE;

    while route.status().await != RouteStatus::AllCaughtUp {
        if let Some(stop) = route.current_stop().await {
            info!(
                "walkthrough: heading to stop={} address={} eta={}",
                stop.id, stop.address, stop.arrival_time
            );
        }
        route.begin_scan().await?;
        route.capture().await?;
        tokio::time::sleep(capture_wait).await;

        if route.status().await == RouteStatus::Completed {
            route.dismiss().await?;
        }
    }

    println!("route {}", serde_json::to_string(&route.snapshot().await)?);
    Ok(())
}
