//! Command-line commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _};
use clap::Subcommand;
use deadhand_crypto::aead::{self, DataKey, EncryptedBlob};
use deadhand_crypto::ed25519::SigningKey;
use deadhand_crypto::shamir::Share;
use deadhand_crypto::x25519::X25519StaticSecret;
use deadhand_guardian::distribution::{distribute_shares, open_share, SealedShare};
use deadhand_guardian::heartbeat::publish_heartbeat;
use deadhand_guardian::monitor::HealthMonitor;
use deadhand_guardian::network::aggregate;
use deadhand_guardian::task::{spawn_periodic, CancellationSource};
use deadhand_sim::engine::SimulationEngine;
use deadhand_sim::step::SimulationStep;
use deadhand_switch::builder::SwitchBuilder;
use deadhand_switch::commitment::Commitment;
use deadhand_switch::lifecycle::{Recipient, Switch};
use deadhand_switch::release::ReleaseCollector;
use deadhand_types::guardian::Guardian;
use deadhand_types::GuardianId;
use serde::{Deserialize, Serialize};

use crate::clock::{format_duration, parse_instant, unix_now};
use crate::config::DaemonConfig;
use crate::events::{Event, EventBus, EventFilter};
use crate::relay_dir::{append_heartbeat, DirectoryHeartbeatSource};
use crate::store::{FsBlobLocator, OutboxShareSink, SwitchStore};

/// Guardian Ed25519 secret written by `keygen`.
pub const SIGNING_KEY_FILE: &str = "signing.key";

/// Guardian X25519 secret written by `keygen`.
pub const ENCRYPTION_KEY_FILE: &str = "encryption.key";

/// Events shown by `status`.
const RECENT_EVENTS: usize = 5;

/// Deadhand subcommands.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Monitor guardians and evaluate the switch until it is final
    Run,

    /// Encrypt a message and arm a new switch
    Create {
        /// Switch plan (TOML)
        plan: PathBuf,
    },

    /// Show the switch, guardian health and recent events
    Status,

    /// Dry-run the release path without touching the switch
    Simulate,

    /// Reset the countdown
    CheckIn,

    /// Suspend the countdown
    Pause,

    /// Restore a paused countdown
    Resume,

    /// Suspend the countdown until a given time
    Vacation {
        /// Unix seconds, or +<hours>h from now
        until: String,
    },

    /// End vacation now
    VacationOff,

    /// Permanently disarm the switch
    Cancel,

    /// Generate a guardian's signing and encryption keys
    Keygen {
        /// Directory for the key files
        out: PathBuf,

        /// Guardian name for the printed plan entry
        #[arg(short, long, default_value = "guardian")]
        name: String,
    },

    /// Sign a heartbeat as a guardian
    Heartbeat {
        /// Hex-encoded Ed25519 secret
        key_file: PathBuf,

        /// Relays to publish to; defaults to the configured relays
        relays: Vec<String>,
    },

    /// Open a sealed share as a guardian
    OpenShare {
        /// Sealed share from the outbox
        sealed: PathBuf,

        /// Hex-encoded X25519 secret
        secret_file: PathBuf,
    },

    /// Combine opened shares and print the message
    Release {
        /// Opened shares, one file per guardian
        #[arg(required = true)]
        shares: Vec<PathBuf>,
    },
}

/// Switch definition read by `create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchPlan {
    pub id: String,
    pub check_in_interval_hours: f64,
    pub needed: u8,
    /// Plaintext to protect. Relative to the plan file.
    pub message_file: PathBuf,
    pub guardians: Vec<Guardian>,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    #[serde(default)]
    pub commitment: Option<Commitment>,
    #[serde(default)]
    pub end_of_life: Option<u64>,
}

/// A share opened by its guardian, ready to hand to `release`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenedShare {
    pub guardian: GuardianId,
    pub share: Share,
}

/// Shared state for command handlers.
pub struct Context {
    pub config: DaemonConfig,
    pub store: SwitchStore,
    pub events: EventBus,
}

impl Context {
    pub fn new(config: DaemonConfig) -> Self {
        let store = SwitchStore::new(config.data_dir());
        Self {
            config,
            store,
            events: EventBus::new(256),
        }
    }

    fn monitor(&self) -> anyhow::Result<Arc<HealthMonitor>> {
        let monitor = HealthMonitor::new(
            Arc::new(DirectoryHeartbeatSource),
            self.config.monitor.to_monitor_config()?,
        )?;
        Ok(Arc::new(monitor))
    }

    async fn require_switch(&self) -> anyhow::Result<Switch> {
        self.store
            .load_switch()
            .await?
            .context("no switch configured; run `deadhand create <plan.toml>` first")
    }

    async fn emit(&self, event_type: &str, payload: serde_json::Value) {
        record(&self.store, &self.events, Event::new(event_type, unix_now(), payload)).await;
    }
}

/// Broadcast `event` and append it to the store's event log.
///
/// A log write failure is reported and otherwise ignored; the command that
/// produced the event has already succeeded.
async fn record(store: &SwitchStore, events: &EventBus, event: Event) {
    if let Err(e) = store.append_event(&event).await {
        tracing::warn!(event_type = %event.event_type, error = %format!("{e:#}"), "event not logged");
    }
    events.emit(event);
}

/// Execute `command`.
pub async fn dispatch(command: Command, ctx: &Context) -> anyhow::Result<()> {
    match command {
        Command::Run => run(ctx).await,
        Command::Create { plan } => create(ctx, &plan).await,
        Command::Status => status(ctx).await,
        Command::Simulate => simulate(ctx).await,
        Command::CheckIn => {
            update_switch(ctx, "CheckInRecorded", |switch, now| {
                Ok(switch.check_in(now)?)
            })
            .await
        }
        Command::Pause => update_switch(ctx, "SwitchPaused", |s, now| Ok(s.pause(now)?)).await,
        Command::Resume => update_switch(ctx, "SwitchResumed", |s, now| Ok(s.resume(now)?)).await,
        Command::Vacation { until } => {
            let now = unix_now();
            let until = parse_instant(&until, now)
                .with_context(|| format!("invalid vacation end {until:?}; use unix seconds or +<hours>h"))?;
            update_switch(ctx, "SwitchVacation", move |s, now| {
                Ok(s.enable_vacation(until, now)?)
            })
            .await
        }
        Command::VacationOff => {
            update_switch(ctx, "SwitchVacationEnded", |s, now| Ok(s.disable_vacation(now)?)).await
        }
        Command::Cancel => update_switch(ctx, "SwitchCancelled", |s, _| Ok(s.cancel()?)).await,
        Command::Keygen { out, name } => keygen(&out, &name).await,
        Command::Heartbeat { key_file, relays } => heartbeat(ctx, &key_file, relays).await,
        Command::OpenShare { sealed, secret_file } => open(&sealed, &secret_file).await,
        Command::Release { shares } => release(ctx, &shares).await,
    }
}

/// Apply time-driven transitions, then `f`, and persist.
async fn update_switch<F>(ctx: &Context, event_type: &str, f: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut Switch, u64) -> anyhow::Result<()>,
{
    let mut switch = ctx.require_switch().await?;
    let now = unix_now();
    let before = switch.status;
    let evaluated = switch.evaluate(now);
    let result = f(&mut switch, now);

    if evaluated.is_some() || result.is_ok() {
        ctx.store.save_switch(&switch).await?;
    }
    if let Some(status) = evaluated {
        ctx.emit(
            "SwitchTransition",
            serde_json::json!({ "switch_id": switch.id, "from": before, "to": status }),
        )
        .await;
    }
    result?;

    ctx.emit(
        event_type,
        serde_json::json!({ "switch_id": switch.id, "status": switch.status }),
    )
    .await;
    println!(
        "{}: {} ({} remaining)",
        switch.id,
        switch.status,
        format_duration(switch.time_remaining(now))
    );
    Ok(())
}

async fn create(ctx: &Context, plan_path: &Path) -> anyhow::Result<()> {
    if ctx.store.load_switch().await?.is_some() {
        bail!("a switch already exists in {}", ctx.store.dir().display());
    }

    let plan: SwitchPlan = toml::from_str(
        &tokio::fs::read_to_string(plan_path)
            .await
            .with_context(|| format!("reading {}", plan_path.display()))?,
    )
    .with_context(|| format!("parsing {}", plan_path.display()))?;

    let message_path = plan_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&plan.message_file);
    let message = tokio::fs::read(&message_path)
        .await
        .with_context(|| format!("reading {}", message_path.display()))?;

    let dek = DataKey::generate();
    let blob = aead::encrypt(&message, &dek)?;
    let location = format!("blobs/{}.json", plan.id);

    let mut builder = SwitchBuilder::new(plan.id, plan.check_in_interval_hours, plan.needed)
        .guardians(plan.guardians)
        .ciphertext_location(location.clone());
    for recipient in plan.recipients {
        builder = builder.recipient(recipient);
    }
    if let Some(commitment) = plan.commitment {
        builder = builder.commitment(commitment);
    }
    if let Some(at) = plan.end_of_life {
        builder = builder.end_of_life(at);
    }

    let now = unix_now();
    let (mut switch, shares) = builder.build(&dek, now)?;
    drop(dek);

    let blob_path = ctx.store.dir().join(&location);
    if let Some(parent) = blob_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&blob_path, blob.to_json()?).await?;

    let outbox = ctx.store.dir().join("outbox");
    let report = distribute_shares(&shares, &mut switch.guardians, &OutboxShareSink::new(&outbox)).await?;
    ctx.store.save_switch(&switch).await?;

    ctx.emit(
        "SwitchArmed",
        serde_json::json!({ "switch_id": switch.id, "expires_at": switch.expires_at }),
    )
    .await;
    println!(
        "{} armed: {}-of-{}, expires in {}",
        switch.id,
        switch.threshold.needed,
        switch.threshold.total,
        format_duration(switch.time_remaining(now))
    );
    println!("sealed shares written to {}", outbox.display());
    for (guardian, reason) in &report.failed {
        println!("  not delivered to {}: {reason}", guardian.short());
    }
    Ok(())
}

async fn status(ctx: &Context) -> anyhow::Result<()> {
    let switch = ctx.require_switch().await?;
    let now = unix_now();
    let thresholds = ctx.config.monitor.to_monitor_config()?.thresholds;

    let ids: Vec<GuardianId> = switch.guardians.iter().map(|g| g.identity).collect();
    let snapshot = ctx
        .store
        .load_health()
        .await?
        .unwrap_or_default()
        .reclassify(&ids, now, &thresholds);
    let network = aggregate(&snapshot.guardians, switch.threshold.needed);

    let mut preview = switch.clone();
    let pending = preview.evaluate(now);

    println!("switch     {}", switch.id);
    match pending {
        Some(next) => println!("status     {} (becomes {next} on next evaluation)", switch.status),
        None => println!("status     {}", switch.status),
    }
    println!("remaining  {}", format_duration(switch.time_remaining(now)));
    println!(
        "threshold  {}-of-{}  network {:?}  responsive {}/{}",
        switch.threshold.needed,
        switch.threshold.total,
        network.classification,
        network.counts.responsive(),
        network.counts.total()
    );
    for guardian in &switch.guardians {
        let health = snapshot.guardians.get(&guardian.identity);
        let status = health.map_or_else(|| "unknown".to_string(), |h| format!("{:?}", h.status));
        let age = health
            .and_then(|h| h.hours_since_heartbeat)
            .map_or_else(|| "never".to_string(), |hours| format!("{hours:.1}h ago"));
        println!(
            "  #{:<3} {:<20} {:<8} {:<12} {}{}",
            guardian.assigned_share_index,
            guardian.name,
            guardian.identity.short(),
            status,
            age,
            if guardian.share_distributed { "" } else { "  (share not delivered)" }
        );
    }

    let recent = ctx.store.recent_events(RECENT_EVENTS).await?;
    if !recent.is_empty() {
        println!("recent events");
        for event in &recent {
            println!("  {:<12} {:<20} {}", event.timestamp, event.event_type, event.payload);
        }
    }
    Ok(())
}

/// Write fresh guardian keys to `out` and print the matching plan entry.
async fn keygen(out: &Path, name: &str) -> anyhow::Result<()> {
    let signing_path = out.join(SIGNING_KEY_FILE);
    let encryption_path = out.join(ENCRYPTION_KEY_FILE);
    for path in [&signing_path, &encryption_path] {
        if tokio::fs::try_exists(path).await? {
            bail!("{} already exists", path.display());
        }
    }

    let signing = SigningKey::generate();
    let encryption = X25519StaticSecret::random();
    tokio::fs::create_dir_all(out).await?;
    tokio::fs::write(&signing_path, hex::encode(signing.to_bytes())).await?;
    tokio::fs::write(&encryption_path, hex::encode(encryption.to_bytes())).await?;

    let identity = GuardianId(signing.verifying_key().to_bytes());
    tracing::info!(guardian = %identity.short(), dir = %out.display(), "guardian keys written");
    println!("[[guardians]]");
    println!("identity = \"{identity}\"");
    println!("name = \"{name}\"");
    println!("kind = \"personal\"");
    println!("encryption_key = \"{}\"", hex::encode(encryption.public_key().to_bytes()));
    Ok(())
}

async fn simulate(ctx: &Context) -> anyhow::Result<()> {
    let switch = ctx.require_switch().await?;
    let monitor = ctx.monitor()?;
    if let Some(snapshot) = ctx.store.load_health().await? {
        monitor.restore(snapshot).await;
    }

    let engine = SimulationEngine::new(monitor, ctx.config.simulation.to_simulation_config())
        .with_blob_locator(Arc::new(FsBlobLocator::new(ctx.store.dir())));

    let source = CancellationSource::new();
    let token = source.token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            source.cancel();
        }
    });

    let progress = |step: &SimulationStep| {
        tracing::info!(step = %step.id, status = ?step.status, message = %step.message, "simulation progress");
    };
    let result = engine.run(&switch, unix_now(), &progress, &token).await;
    watcher.abort();
    let result = result?;

    ctx.emit(
        "SimulationCompleted",
        serde_json::json!({
            "switch_id": result.switch_id,
            "overall": result.overall,
            "confidence": result.confidence,
        }),
    )
    .await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn heartbeat(ctx: &Context, key_file: &Path, relays: Vec<String>) -> anyhow::Result<()> {
    let key = SigningKey::from_bytes(&read_hex_key(key_file).await?);
    let relays = if relays.is_empty() {
        ctx.config.monitor.relays.clone()
    } else {
        relays
    };
    if relays.is_empty() {
        bail!("no relays given and none configured");
    }

    let record = publish_heartbeat(&key, unix_now());
    let mut published = 0usize;
    for relay in &relays {
        match append_heartbeat(relay, &record).await {
            Ok(()) => published += 1,
            Err(e) => tracing::warn!(relay, error = %e, "heartbeat not published"),
        }
    }
    if published == 0 {
        bail!("heartbeat reached no relay");
    }
    println!("heartbeat for {} published to {published}/{} relays", record.guardian.short(), relays.len());
    Ok(())
}

async fn open(sealed_path: &Path, secret_file: &Path) -> anyhow::Result<()> {
    let sealed: SealedShare = serde_json::from_slice(
        &tokio::fs::read(sealed_path)
            .await
            .with_context(|| format!("reading {}", sealed_path.display()))?,
    )?;
    let secret = X25519StaticSecret::from_bytes(read_hex_key(secret_file).await?);
    let share = open_share(&sealed, &secret)?;
    let opened = OpenedShare {
        guardian: sealed.guardian,
        share,
    };
    println!("{}", serde_json::to_string_pretty(&opened)?);
    Ok(())
}

async fn release(ctx: &Context, files: &[PathBuf]) -> anyhow::Result<()> {
    let mut switch = ctx.require_switch().await?;
    if switch.evaluate(unix_now()).is_some() {
        ctx.store.save_switch(&switch).await?;
    }
    let mut collector = ReleaseCollector::new(&switch)?;

    for file in files {
        let opened: OpenedShare = serde_json::from_slice(
            &tokio::fs::read(file)
                .await
                .with_context(|| format!("reading {}", file.display()))?,
        )?;
        let held = collector.add_share(&opened.guardian, opened.share)?;
        tracing::info!(guardian = %opened.guardian.short(), held, "share accepted");
    }

    let location = switch
        .ciphertext_location
        .as_deref()
        .context("switch has no ciphertext location")?;
    let blob_path = ctx.store.dir().join(location);
    let blob = EncryptedBlob::from_json(
        &tokio::fs::read_to_string(&blob_path)
            .await
            .with_context(|| format!("reading {}", blob_path.display()))?,
    )?;
    let message = collector.release(&blob)?;

    ctx.emit("SwitchReleased", serde_json::json!({ "switch_id": switch.id })).await;
    println!("{}", String::from_utf8_lossy(&message));
    Ok(())
}

async fn read_hex_key(path: &Path) -> anyhow::Result<[u8; 32]> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let bytes = hex::decode(text.trim()).with_context(|| format!("{} is not hex", path.display()))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| anyhow::anyhow!("{} must hold 32 bytes, found {}", path.display(), bytes.len()))
}

/// Monitor guardians until interrupted.
async fn run(ctx: &Context) -> anyhow::Result<()> {
    let monitor = ctx.monitor()?;
    if let Some(snapshot) = ctx.store.load_health().await? {
        monitor.restore(snapshot).await;
    }

    let interval = Duration::from_secs(ctx.config.monitor.poll_interval_secs);
    tracing::info!(
        relays = ctx.config.monitor.relays.len(),
        interval_secs = interval.as_secs(),
        data_dir = %ctx.store.dir().display(),
        "monitor started"
    );
    let mut rx = ctx.events.subscribe();
    let filter = EventFilter {
        categories: Some(vec!["health".into(), "lifecycle".into()]),
        switch_id: None,
    };
    let logger = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) if filter.matches(&event) => {
                    tracing::info!(event_type = %event.event_type, payload = %event.payload, "event");
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event log lagging");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    ctx.emit("DaemonStarted", serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }))
        .await;

    let source = CancellationSource::new();
    let store = ctx.store.clone();
    let events = ctx.events.clone();
    let mut handle = spawn_periodic(interval, source.token(), move || {
        let monitor = monitor.clone();
        let store = store.clone();
        let events = events.clone();
        async move {
            match tick(&monitor, &store, &events).await {
                Ok(keep_going) => keep_going,
                Err(e) => {
                    tracing::warn!(error = %format!("{e:#}"), "monitor tick failed");
                    true
                }
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            source.cancel();
            handle.await?;
        }
        finished = &mut handle => {
            finished?;
        }
    }
    logger.abort();
    tracing::info!(events = ctx.events.sequence(), "monitor stopped");
    Ok(())
}

/// One poll-and-evaluate round. Returns `false` once the switch is final.
async fn tick(monitor: &HealthMonitor, store: &SwitchStore, events: &EventBus) -> anyhow::Result<bool> {
    let Some(mut switch) = store.load_switch().await? else {
        tracing::debug!("no switch configured, nothing to monitor");
        return Ok(true);
    };

    let now = unix_now();
    let ids: Vec<GuardianId> = switch.guardians.iter().map(|g| g.identity).collect();
    let snapshot = monitor.poll(&ids, now).await;
    store.save_health(&snapshot).await?;

    let network = aggregate(&snapshot.guardians, switch.threshold.needed);
    let polled = Event::new(
        "HealthPolled",
        now,
        serde_json::json!({
            "switch_id": switch.id,
            "classification": network.classification,
            "responsive": network.counts.responsive(),
            "relay_failures": snapshot.relay_failures.len(),
        }),
    );
    record(store, events, polled).await;
    for health in snapshot.guardians.values().filter(|h| h.long_silent) {
        let silent = Event::new(
            "GuardianLongSilent",
            now,
            serde_json::json!({ "switch_id": switch.id, "guardian": health.guardian }),
        );
        record(store, events, silent).await;
    }

    let before = switch.status;
    if let Some(status) = switch.evaluate(now) {
        store.save_switch(&switch).await?;
        let transition = Event::new(
            "SwitchTransition",
            now,
            serde_json::json!({ "switch_id": switch.id, "from": before, "to": status }),
        );
        record(store, events, transition).await;
    }

    if switch.status.is_terminal() {
        tracing::info!(switch = %switch.id, status = %switch.status, "switch is final, monitor exiting");
        return Ok(false);
    }
    Ok(true)
}
