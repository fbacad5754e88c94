use std::io::Write;

use tracing::{debug, info, warn};

use crate::gpu_data::{ActiveGpu, ResolvedGpu};

// Receiver of the reconciled GPU state, usually a status display.
// Added GPUs should get a new entry while refreshed GPUs update
// their existing entry in place
pub trait StatusConsumer {
    fn gpu_added(&mut self, gpu: &ResolvedGpu);
    fn gpu_refreshed(&mut self, gpu: &ResolvedGpu);
    fn gpu_removed(&mut self, bus_id: &str);

    // Every GPU of the current poll in kernel order
    fn gpus_updated(&mut self, gpus: &[ResolvedGpu]);

    // Called every poll, including failed ones
    fn active_changed(&mut self, active: &ActiveGpu);
}

// Consumer writing the active GPU label to a writer every time it
// changes and logging the GPU list changes
pub struct LabelConsumer<W: Write> {
    out: W,
    last_label: Option<String>,
}

impl<W: Write> LabelConsumer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_label: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StatusConsumer for LabelConsumer<W> {
    fn gpu_added(&mut self, gpu: &ResolvedGpu) {
        info!(
            "GPU {} [{}] {}: {}",
            gpu.gpu.index, gpu.gpu.gpu_type, gpu.gpu.bus_id, gpu.name
        );
    }

    fn gpu_refreshed(&mut self, gpu: &ResolvedGpu) {
        debug!(
            "GPU {} power: {} connected: {}",
            gpu.gpu.bus_id, gpu.gpu.power_state, gpu.gpu.connected
        );
    }

    fn gpu_removed(&mut self, bus_id: &str) {
        info!("GPU {} removed", bus_id);
    }

    fn gpus_updated(&mut self, gpus: &[ResolvedGpu]) {
        debug!("{} switchable GPUs", gpus.len());
    }

    fn active_changed(&mut self, active: &ActiveGpu) {
        let label = active.label();

        if self.last_label.as_deref() == Some(label) {
            return;
        }

        if let Err(err) = writeln!(self.out, "{label}") {
            warn!("Failed to write active GPU label: {err}");
            return;
        }

        self.last_label = Some(label.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu_data::{Gpu, GpuName};

    fn resolved(vendor: &str) -> ResolvedGpu {
        ResolvedGpu {
            gpu: Gpu {
                index: "0".to_string(),
                gpu_type: "IGD".to_string(),
                connected: true,
                power_state: "Pwr".to_string(),
                bus_id: "00:02.0".to_string(),
            },
            name: GpuName::new(vendor, "Graphics"),
        }
    }

    #[test]
    fn label_is_written_only_on_change() {
        let mut consumer = LabelConsumer::new(Vec::new());

        consumer.active_changed(&ActiveGpu::Known(resolved("Intel Corporation")));
        consumer.active_changed(&ActiveGpu::Known(resolved("Intel Corporation")));
        consumer.active_changed(&ActiveGpu::Unknown);
        consumer.active_changed(&ActiveGpu::Known(resolved("NVIDIA Corporation")));

        let out = String::from_utf8(consumer.into_inner()).unwrap();
        assert_eq!(out, "Intel\nUnknown\nNVIDIA\n");
    }
}
