use std::{collections::HashMap, future::Future, process::ExitStatus};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, trace, warn};

use crate::gpu_data::GpuName;

type Result<T> = std::result::Result<T, ResolveError>;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Hardware lookup command is empty")]
    EmptyCommand,
    #[error("Failed to spawn hardware lookup \"{program}\" for {bus_id}")]
    Spawn {
        program: String,
        bus_id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Hardware lookup \"{program}\" for {bus_id} failed ({status})")]
    ExitStatus {
        program: String,
        bus_id: String,
        status: ExitStatus,
    },
    #[error("Device {bus_id} not found in the hardware database")]
    NotFound { bus_id: String },
    #[error(
        "Malformed hardware database entry for {bus_id}: \
        expected 3 quoted fields, found {found}"
    )]
    MissingFields { bus_id: String, found: usize },
}

// Hardware database queried for the name of a PCI device
pub trait HardwareLookup {
    // Return the machine readable database entry of the given bus ID,
    // in the quoted field format of "lspci -mm"
    fn lookup(
        &self,
        bus_id: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

// Query the PCI database with "lspci -mm -s <bus ID>".
// Running lspci wakes up a suspended discrete GPU
#[derive(Debug, Clone)]
pub struct LspciLookup {
    command: Vec<String>,
}

impl LspciLookup {
    // The bus ID is appended to the given command
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }
}

impl Default for LspciLookup {
    fn default() -> Self {
        Self::new(vec![
            "lspci".to_string(),
            "-mm".to_string(),
            "-s".to_string(),
        ])
    }
}

impl HardwareLookup for LspciLookup {
    async fn lookup(&self, bus_id: &str) -> Result<String> {
        let (program, args) =
            self.command.split_first().ok_or(ResolveError::EmptyCommand)?;

        debug!("Running hardware lookup: {:?} {}", self.command, bus_id);

        let output = Command::new(program)
            .args(args)
            .arg(bus_id)
            .output()
            .await
            .map_err(|source| ResolveError::Spawn {
                program: program.clone(),
                bus_id: bus_id.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ResolveError::ExitStatus {
                program: program.clone(),
                bus_id: bus_id.to_string(),
                status: output.status,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// Resolve bus IDs to vendor and device names.
// Successful lookups are cached for the whole process lifetime since
// every lookup wakes the discrete GPU, failures are never cached so
// the next access tries again
pub struct NameResolver<L: HardwareLookup> {
    lookup: L,

    // Keyed by bus ID
    cache: HashMap<String, GpuName>,
}

impl<L: HardwareLookup> NameResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            cache: HashMap::new(),
        }
    }

    // Return the name of the device at the given bus ID,
    // or "Unknown" for both vendor and name if the lookup failed
    pub async fn resolve(&mut self, bus_id: &str) -> GpuName {
        match self.try_resolve(bus_id).await {
            Ok(name) => name,
            Err(err) => {
                warn!("{err}");
                GpuName::unknown()
            }
        }
    }

    pub async fn try_resolve(&mut self, bus_id: &str) -> Result<GpuName> {
        if let Some(name) = self.cache.get(bus_id) {
            trace!("Name cache hit for {}: {}", bus_id, name);
            return Ok(name.clone());
        }

        let entry = self.lookup.lookup(bus_id).await?;
        let name = parse_entry(bus_id, &entry)?;

        debug!("Resolved {} to \"{}\"", bus_id, name);

        self.cache.insert(bus_id.to_string(), name.clone());

        Ok(name)
    }

    // Name of the device if an earlier lookup succeeded, never runs
    // the lookup
    pub fn cached(&self, bus_id: &str) -> Option<&GpuName> {
        self.cache.get(bus_id)
    }

    pub fn is_cached(&self, bus_id: &str) -> bool {
        self.cache.contains_key(bus_id)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

// Extract vendor and device name from a "lspci -mm" entry such as
// 00:02.0 "VGA compatible controller" "Intel Corporation" "HD Graphics 620"
// The second quoted field is the vendor and the third the device name
fn parse_entry(bus_id: &str, entry: &str) -> Result<GpuName> {
    if entry.trim().is_empty() {
        return Err(ResolveError::NotFound {
            bus_id: bus_id.to_string(),
        });
    }

    // Only the first line describes the requested device
    let line = entry.lines().next().unwrap_or_default();
    let fields = quoted_fields(line);

    if fields.len() < 3 {
        return Err(ResolveError::MissingFields {
            bus_id: bus_id.to_string(),
            found: fields.len(),
        });
    }

    Ok(GpuName::new(fields[1], fields[2]))
}

// Splitting on quotes leaves the quoted fields at odd positions,
// an unterminated trailing quote is not a field
fn quoted_fields(line: &str) -> Vec<&str> {
    let parts: Vec<&str> = line.split('"').collect();
    let complete = parts.len() - (1 - parts.len() % 2);

    parts[..complete].iter().skip(1).step_by(2).copied().collect()
}
