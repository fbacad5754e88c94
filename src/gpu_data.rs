use std::fmt;

// Label used whenever a name or vendor can't be resolved
pub const UNKNOWN: &str = "Unknown";

// Power state substring marking a powered GPU, matched case-insensitively
const POWERED_MARKER: &str = "pwr";

// One switchable GPU as reported by the vgaswitcheroo interface.
// Records are rebuilt every poll, the bus ID is the only identity
// that survives across polls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gpu {
    // Position reported by the kernel, not stable across reboots
    pub index: String,
    // Class token such as "IGD" or "DIS", kept opaque
    pub gpu_type: String,
    // A display is attached to one of the GPU outputs
    pub connected: bool,
    // Raw power token such as "Pwr", "Off" or "DynPwr"
    pub power_state: String,

    // PCI address in "bus:device.function" form
    pub bus_id: String,
}

impl Gpu {
    pub fn is_powered(&self) -> bool {
        self.power_state.to_lowercase().contains(POWERED_MARKER)
    }
}

// Vendor and device name of a GPU as found in the hardware database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuName {
    pub vendor: String,
    pub name: String,
}

impl GpuName {
    pub fn new(vendor: &str, name: &str) -> Self {
        Self {
            vendor: vendor.to_string(),
            name: name.to_string(),
        }
    }

    // Placeholder returned when the lookup failed
    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN)
    }

    pub fn is_unknown(&self) -> bool {
        self.vendor == UNKNOWN && self.name == UNKNOWN
    }

    // First word of the vendor, e.g. "Intel" for "Intel Corporation".
    // This is the short label shown by status panels
    pub fn short_vendor(&self) -> &str {
        self.vendor.split_whitespace().next().unwrap_or(UNKNOWN)
    }
}

impl fmt::Display for GpuName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.vendor, self.name)
    }
}

// A GPU record paired with its resolved name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGpu {
    pub gpu: Gpu,
    pub name: GpuName,
}

// The GPU currently powered, or an explicit unknown marker when
// the status couldn't be read or no powered GPU was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveGpu {
    Known(ResolvedGpu),
    Unknown,
}

impl ActiveGpu {
    // Short label for the active GPU, "Unknown" if there is none
    pub fn label(&self) -> &str {
        match self {
            ActiveGpu::Known(resolved) => resolved.name.short_vendor(),
            ActiveGpu::Unknown => UNKNOWN,
        }
    }

    pub fn bus_id(&self) -> Option<&str> {
        match self {
            ActiveGpu::Known(resolved) => Some(resolved.gpu.bus_id.as_str()),
            ActiveGpu::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu_with_state(power_state: &str) -> Gpu {
        Gpu {
            index: "0".to_string(),
            gpu_type: "IGD".to_string(),
            connected: true,
            power_state: power_state.to_string(),
            bus_id: "00:02.0".to_string(),
        }
    }

    #[test]
    fn powered_states_are_case_insensitive() {
        assert!(gpu_with_state("Pwr").is_powered());
        assert!(gpu_with_state("PWR").is_powered());
        assert!(gpu_with_state("DynPwr").is_powered());

        assert!(!gpu_with_state("Off").is_powered());
        assert!(!gpu_with_state("DynOff").is_powered());
    }

    #[test]
    fn short_vendor_takes_first_word() {
        let name = GpuName::new("Intel Corporation", "HD Graphics 620");
        assert_eq!(name.short_vendor(), "Intel");

        let name = GpuName::new("", "Something");
        assert_eq!(name.short_vendor(), UNKNOWN);
    }

    #[test]
    fn unknown_active_gpu_label() {
        assert_eq!(ActiveGpu::Unknown.label(), "Unknown");
        assert_eq!(ActiveGpu::Unknown.bus_id(), None);
        assert!(GpuName::unknown().is_unknown());
    }
}
