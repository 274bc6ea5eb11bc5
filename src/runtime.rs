// 50 Hz tuning loop with watchdog
// Note: if the control center stops sending commands, the watchdog disables
// the master instead of holding the last demand forever

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{
    CMD_TIMEOUT, ControllerConfig, LIVE_TABLE, LOOP_HZ, TOPIC_CMD, TOPIC_HEALTH, TunerConfig,
};
use crate::controller::{
    ControlMode, Controller, ControllerConfigurator, ControllerError, CtreController,
    PhoenixController,
};
use crate::messages::{RuntimeHealth, TunerCommand};
use crate::telemetry::{self, LiveGraph, ZenohTable};

pub struct Runtime {
    latest_cmd: Option<TunerCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: TunerCommand) {
        info!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// Command to apply this tick, disabled once the last one is too old
    pub fn compute_command(&mut self) -> TunerCommand {
        self.compute_command_at(Instant::now())
    }

    fn compute_command_at(&mut self, now: Instant) -> TunerCommand {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);

        if cmd_age > CMD_TIMEOUT {
            if self.health != RuntimeHealth::CmdStale {
                warn!("Command stale ({:?} old), disabling output", cmd_age);
            }
            self.health = RuntimeHealth::CmdStale;
            TunerCommand::disabled()
        } else if let Some(cmd) = self.latest_cmd {
            self.health = RuntimeHealth::Ok;
            cmd
        } else {
            // No command ever received
            self.health = RuntimeHealth::CmdStale;
            TunerCommand::disabled()
        }
    }
}

/// Master plus followers, configured and linked
pub struct Rig<C> {
    pub master: CtreController<C>,
    pub slaves: Vec<CtreController<C>>,
}

impl<C: PhoenixController + 'static> Rig<C> {
    /// Configure every controller in `tuner` and make the slaves follow
    pub fn build<F>(tuner: &TunerConfig, mut factory: F) -> Result<Self, ControllerError>
    where
        F: FnMut(i32) -> C,
    {
        let configurator = ControllerConfigurator::new(tuner.pid_slot);
        let master = CtreController::new(
            &mut factory,
            &ControllerConfig::Master(tuner.master.clone()),
            &configurator,
        )?;

        let mut slaves = Vec::with_capacity(tuner.slaves.len());
        for slave in &tuner.slaves {
            let mut controller = CtreController::new(
                &mut factory,
                &ControllerConfig::Simple(slave.simple()),
                &configurator,
            )?;
            controller.follow(&master, slave.is_inverted)?;
            slaves.push(controller);
        }

        info!(
            "Rig ready: master {} with {} follower(s)",
            tuner.master.id,
            slaves.len()
        );
        Ok(Self { master, slaves })
    }

    /// Apply one command to the master and publish what it reports
    pub fn step(&mut self, cmd: &TunerCommand, live: &LiveGraph) {
        self.master.set_output(cmd.mode, cmd.reference, cmd.arbitrary_feed_forward);

        live.add_number("position", self.master.position());
        live.add_number("velocity", self.master.velocity());
        live.add_number("output", self.master.applied_percent_output());
        live.add_number("reference", cmd.reference);
        live.add_bool("enabled", cmd.mode != ControlMode::Disabled);
    }
}

pub async fn run<C, F>(
    tuner: TunerConfig,
    factory: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    C: PhoenixController + 'static,
    F: FnMut(i32) -> C,
{
    let mut rig = Rig::build(&tuner, factory)?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    telemetry::bind(Arc::new(ZenohTable::new(session.clone(), LIVE_TABLE)));
    let live = telemetry::global();

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new();
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD);
    info!("Publishing to: {}/*, {}", LIVE_TABLE, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<TunerCommand>(&payload) {
                Ok(cmd) => {
                    runtime.on_command(cmd);
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Compute command (includes watchdog logic)
        let cmd = runtime.compute_command();

        // 3. Drive the master and publish live values
        rig.step(&cmd, &live);

        // 4. Publish health
        let health_json = serde_json::to_string(&runtime.health)?;
        pub_health.put(health_json).await?;
    }
}
