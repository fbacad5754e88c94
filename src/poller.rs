use std::time::Duration;

use tokio::{
    select,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    config_manager::Config,
    consumer::StatusConsumer,
    errors::SwitcherooError,
    gpu_data::{ActiveGpu, Gpu, GpuName, ResolvedGpu},
    gpu_registry::{GpuEvent, GpuRegistry, Reconciliation},
    name_resolver::{HardwareLookup, LspciLookup, NameResolver},
    status_parser::StatusParser,
    status_reader::{StatusReader, SwitcherooReader},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    // Waiting for the next tick
    Idle,
    // Read, parse and reconcile in flight
    Polling,
    // The run token was cancelled, no tick will fire anymore
    Stopped,
}

// Drive the reader, parser, registry and resolver on a fixed
// interval and push the results to the consumer.
// Polls are awaited inline so two polls can never overlap
pub struct Poller<R, L, C>
where
    R: StatusReader,
    L: HardwareLookup,
    C: StatusConsumer,
{
    reader: R,
    parser: StatusParser,

    registry: GpuRegistry,
    resolver: NameResolver<L>,

    consumer: C,

    poll_interval: Duration,
    state: PollerState,
}

impl<R, L, C> Poller<R, L, C>
where
    R: StatusReader,
    L: HardwareLookup,
    C: StatusConsumer,
{
    pub fn new(
        reader: R,
        parser: StatusParser,
        resolver: NameResolver<L>,
        consumer: C,
    ) -> Self {
        Self {
            reader,
            parser,

            registry: GpuRegistry::new(),
            resolver,

            consumer,

            poll_interval: DEFAULT_POLL_INTERVAL,
            state: PollerState::Idle,
        }
    }

    // A zero interval is ignored
    pub fn with_interval(mut self, poll_interval: Duration) -> Self {
        if poll_interval.is_zero() {
            warn!("Ignoring zero poll interval");
        } else {
            self.poll_interval = poll_interval;
        }

        self
    }

    // Poll until the token is cancelled. A poll still in flight when
    // the token is cancelled is dropped, the commands it started are
    // left to finish on their own and their output is discarded
    pub async fn run(&mut self, run_token: CancellationToken) {
        info!("Poller: Running every {:?}", self.poll_interval);

        let mut timer = interval(self.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                biased;

                _ = run_token.cancelled() => {
                    break;
                }
                _ = timer.tick() => {
                    select! {
                        biased;

                        _ = run_token.cancelled() => {
                            debug!("Poller: Discarding in-flight poll");
                            break;
                        }
                        _ = self.poll() => {}
                    }
                }
            }
        }

        self.state = PollerState::Stopped;

        info!("Poller: Quitting");
    }

    // Run one read, parse and reconcile cycle and report the result.
    // Failures are reported as an unknown active GPU and leave the
    // known GPUs untouched
    pub async fn poll(&mut self) -> ActiveGpu {
        self.state = PollerState::Polling;
        trace!("Poller: Polling");

        let active = match self.acquire().await {
            Ok(gpus) => {
                let names = self.resolve_names(&gpus).await;

                // Nothing is awaited past this point, a tick dropped
                // while resolving leaves the registry untouched
                let reconciliation = self.registry.reconcile(gpus);
                self.publish(reconciliation, names)
            }
            Err(err) => {
                warn!("Failed to poll switcheroo status: {err}");

                let active = ActiveGpu::Unknown;
                self.consumer.active_changed(&active);

                active
            }
        };

        self.state = PollerState::Idle;

        active
    }

    async fn acquire(&mut self) -> Result<Vec<Gpu>, SwitcherooError> {
        let raw = self.reader.read().await?;
        let gpus = self.parser.parse(&raw)?;

        Ok(gpus)
    }

    // One name per GPU, in the same order.
    // Only powered GPUs are looked up since querying a suspended GPU
    // wakes it up. Unpowered GPUs keep their cached name, or stay
    // unknown until they are powered once
    async fn resolve_names(&mut self, gpus: &[Gpu]) -> Vec<GpuName> {
        let mut names = Vec::with_capacity(gpus.len());

        for gpu in gpus {
            let name = if gpu.is_powered() {
                self.resolver.resolve(&gpu.bus_id).await
            } else {
                match self.resolver.cached(&gpu.bus_id) {
                    Some(name) => name.clone(),
                    None => {
                        trace!("Not resolving suspended GPU {}", gpu.bus_id);
                        GpuName::unknown()
                    }
                }
            };

            names.push(name);
        }

        names
    }

    // Forward the reconciliation to the consumer
    fn publish(
        &mut self,
        reconciliation: Reconciliation,
        names: Vec<GpuName>,
    ) -> ActiveGpu {
        let Reconciliation {
            gpus,
            events,
            active,
        } = reconciliation;

        let resolved: Vec<ResolvedGpu> = gpus
            .into_iter()
            .zip(names)
            .map(|(gpu, name)| ResolvedGpu { gpu, name })
            .collect();

        let find = |bus_id: &str| {
            resolved.iter().find(|resolved| resolved.gpu.bus_id == bus_id)
        };

        for event in &events {
            match event {
                GpuEvent::Added(gpu) => {
                    if let Some(gpu) = find(&gpu.bus_id) {
                        self.consumer.gpu_added(gpu);
                    }
                }
                GpuEvent::Refreshed(gpu) => {
                    if let Some(gpu) = find(&gpu.bus_id) {
                        self.consumer.gpu_refreshed(gpu);
                    }
                }
                GpuEvent::Removed { bus_id } => {
                    self.consumer.gpu_removed(bus_id);
                }
            }
        }

        self.consumer.gpus_updated(&resolved);

        let active = match active.and_then(|gpu| find(&gpu.bus_id)) {
            Some(gpu) => ActiveGpu::Known(gpu.clone()),
            None => {
                debug!("Failed to find active GPU");
                ActiveGpu::Unknown
            }
        };

        self.consumer.active_changed(&active);

        active
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn registry(&self) -> &GpuRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &NameResolver<L> {
        &self.resolver
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }
}

impl<C: StatusConsumer> Poller<SwitcherooReader, LspciLookup, C> {
    // Build the poller described by the configuration
    pub fn from_config(
        config: &Config,
        consumer: C,
    ) -> Result<Self, SwitcherooError> {
        config.validate()?;

        let parser = StatusParser::new(config.parse_policy)?;
        let resolver = NameResolver::new(config.lookup());

        Ok(Self::new(config.reader(), parser, resolver, consumer)
            .with_interval(config.poll_interval()))
    }
}
