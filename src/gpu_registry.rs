use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::gpu_data::Gpu;

// Difference between a freshly parsed GPU and the known state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuEvent {
    // First time this bus ID is seen, consumers create a new entry
    Added(Gpu),
    // Known bus ID, consumers update the existing entry in place
    Refreshed(Gpu),
    // Known bus ID missing from the latest poll
    Removed { bus_id: String },
}

impl GpuEvent {
    pub fn bus_id(&self) -> &str {
        match self {
            GpuEvent::Added(gpu) | GpuEvent::Refreshed(gpu) => &gpu.bus_id,
            GpuEvent::Removed { bus_id } => bus_id,
        }
    }
}

// Result of reconciling one poll against the known GPUs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    // The GPUs of this poll, in kernel order
    pub gpus: Vec<Gpu>,
    // One event per GPU, followed by the removals
    pub events: Vec<GpuEvent>,
    // The powered GPU, if any
    pub active: Option<Gpu>,
}

// Keep track of the GPUs seen across polls, keyed by bus ID
#[derive(Debug, Default)]
pub struct GpuRegistry {
    known: HashMap<String, Gpu>,

    // Bus IDs in the order they were first seen
    order: Vec<String>,
}

impl GpuRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Merge a freshly parsed GPU set into the known state
    // and report what changed
    pub fn reconcile(&mut self, gpus: Vec<Gpu>) -> Reconciliation {
        let mut events = Vec::with_capacity(gpus.len());

        for gpu in &gpus {
            match self.known.get_mut(&gpu.bus_id) {
                Some(known) => {
                    if *known != *gpu {
                        trace!("GPU {} changed: {:?}", gpu.bus_id, gpu);
                    }

                    *known = gpu.clone();
                    events.push(GpuEvent::Refreshed(gpu.clone()));
                }
                None => {
                    debug!("New GPU {}: {:?}", gpu.bus_id, gpu);

                    self.known.insert(gpu.bus_id.clone(), gpu.clone());
                    self.order.push(gpu.bus_id.clone());
                    events.push(GpuEvent::Added(gpu.clone()));
                }
            }
        }

        // Drop the GPUs that disappeared from the kernel report
        let seen: HashSet<&str> =
            gpus.iter().map(|gpu| gpu.bus_id.as_str()).collect();
        let removed: Vec<String> = self
            .order
            .iter()
            .filter(|bus_id| !seen.contains(bus_id.as_str()))
            .cloned()
            .collect();

        for bus_id in removed {
            debug!("GPU {} is gone", bus_id);

            self.remove(&bus_id);
            events.push(GpuEvent::Removed { bus_id });
        }

        let active = find_active(&gpus).cloned();

        Reconciliation {
            gpus,
            events,
            active,
        }
    }

    pub fn remove(&mut self, bus_id: &str) -> Option<Gpu> {
        self.order.retain(|known| known != bus_id);
        self.known.remove(bus_id)
    }

    pub fn get(&self, bus_id: &str) -> Option<&Gpu> {
        self.known.get(bus_id)
    }

    pub fn known_bus_ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

// Return the powered GPU. When several GPUs report power the last one
// in kernel order wins.
// TODO: prefer the discrete GPU when both report power instead of
// relying on kernel order
pub fn find_active(gpus: &[Gpu]) -> Option<&Gpu> {
    gpus.iter().rfind(|gpu| gpu.is_powered())
}
