mod agent;
mod store;
mod transport;

use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use tempswitch_common::{default_config, Scheduler};

use crate::agent::SwitchAgent;
use crate::store::ConfigStore;
use crate::transport::{MqttTransport, Transport};

const TRANSPORT_POLL_INTERVAL_MS: u64 = 500;
const KEEP_ALIVE_INTERVAL_MS: u64 = 10_000;
const CONFIG_REFRESH_INTERVAL_MS: u64 = 60_000;
const LOOP_PAUSE: Duration = Duration::from_millis(250);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = ConfigStore::from_env();
    let initial = store.load_persisted().unwrap_or_else(|err| {
        warn!("failed to load persisted configuration: {err}; starting from defaults");
        default_config()
    });

    let mut transport = MqttTransport::from_env();
    if let Err(err) = transport.connect() {
        warn!("broker not acknowledging yet: {err}; the client keeps retrying");
    }

    let mut agent = SwitchAgent::new(transport, store);
    agent.setup(initial)?;
    if let Err(err) = agent.refresh_config() {
        warn!("failed to write persisted configuration: {err}");
    }

    let mut scheduler: Scheduler<SwitchAgent<MqttTransport>> = Scheduler::new();
    scheduler.schedule_each("transport-poll", TRANSPORT_POLL_INTERVAL_MS, |agent| {
        agent.poll().map_err(Into::into)
    });
    scheduler.schedule_each("keep-alive", KEEP_ALIVE_INTERVAL_MS, |agent| {
        agent.keep_alive().map_err(Into::into)
    });
    scheduler.schedule_each("config-refresh", CONFIG_REFRESH_INTERVAL_MS, |agent| {
        agent.refresh_config().map_err(Into::into)
    });

    info!("temperature switch agent is running");

    loop {
        scheduler.tick(&mut agent, monotonic_ms());
        thread::sleep(LOOP_PAUSE);
    }
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
