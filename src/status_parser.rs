use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{trace, warn};

use crate::gpu_data::Gpu;

// Record grammar of the vgaswitcheroo switch file, e.g.
// 0:IGD:+:Pwr:0000:00:02.0
// The PCI domain is matched but not captured
const LINE_PATTERN: &str =
    r"^([0-9]+):([A-Z]+):([ +]):([A-Za-z]+):[0-9A-Fa-f]+:([0-9A-Fa-f:.]+)$";

type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed switcheroo line {line_number}: \"{line}\"")]
    Malformed { line_number: usize, line: String },
    #[error("Duplicate bus ID \"{bus_id}\" on switcheroo line {line_number}")]
    DuplicateBusId { line_number: usize, bus_id: String },
    #[error("Invalid switcheroo line pattern")]
    Pattern(#[from] regex::Error),
}

// What to do with a line that doesn't match the record grammar
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParsePolicy {
    // Fail the whole parse, no partial set is returned
    #[default]
    Strict,
    // Log and skip the line, keep parsing the rest
    Lenient,
}

pub struct StatusParser {
    policy: ParsePolicy,
    line_regex: Regex,
}

impl StatusParser {
    pub fn new(policy: ParsePolicy) -> Result<Self> {
        Ok(Self {
            policy,
            line_regex: Regex::new(LINE_PATTERN)?,
        })
    }

    pub fn policy(&self) -> ParsePolicy {
        self.policy
    }

    // Parse the raw switch file into GPU records, in input order.
    // Blank lines are ignored so empty input gives an empty set
    pub fn parse(&self, raw: &str) -> Result<Vec<Gpu>> {
        let mut gpus = Vec::new();
        let mut seen_bus_ids = HashSet::new();

        for (i, line) in raw.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            let line_number = i + 1;

            if line.is_empty() {
                continue;
            }

            let gpu = match self.parse_line(line_number, line) {
                Ok(gpu) => gpu,
                Err(err) => {
                    self.reject(err)?;
                    continue;
                }
            };

            if !seen_bus_ids.insert(gpu.bus_id.clone()) {
                self.reject(ParseError::DuplicateBusId {
                    line_number,
                    bus_id: gpu.bus_id,
                })?;
                continue;
            }

            trace!("Parsed switcheroo GPU: {:?}", gpu);

            gpus.push(gpu);
        }

        Ok(gpus)
    }

    fn parse_line(&self, line_number: usize, line: &str) -> Result<Gpu> {
        let malformed = || ParseError::Malformed {
            line_number,
            line: line.to_string(),
        };

        let captures = self.line_regex.captures(line).ok_or_else(malformed)?;
        let field = |i: usize| {
            captures
                .get(i)
                .map(|m| m.as_str().to_string())
                .ok_or_else(malformed)
        };

        Ok(Gpu {
            index: field(1)?,
            gpu_type: field(2)?,
            connected: field(3)? == "+",
            power_state: field(4)?,
            bus_id: field(5)?,
        })
    }

    // Apply the policy to a bad line, strict parsing propagates
    // the error while lenient parsing only logs it
    fn reject(&self, err: ParseError) -> Result<()> {
        match self.policy {
            ParsePolicy::Strict => Err(err),
            ParsePolicy::Lenient => {
                warn!("Skipping switcheroo line: {err}");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_GPUS: &str = "0:IGD:+:Pwr:0000:00:02.0\n1:DIS: :DynOff:0000:01:00.0\n";

    fn strict() -> StatusParser {
        StatusParser::new(ParsePolicy::Strict).unwrap()
    }

    fn lenient() -> StatusParser {
        StatusParser::new(ParsePolicy::Lenient).unwrap()
    }

    #[test]
    fn parses_reference_line() {
        let gpus = strict().parse("0:IGD:+:Pwr:0000:00:02.0").unwrap();

        assert_eq!(
            gpus,
            vec![Gpu {
                index: "0".to_string(),
                gpu_type: "IGD".to_string(),
                connected: true,
                power_state: "Pwr".to_string(),
                bus_id: "00:02.0".to_string(),
            }]
        );
    }

    #[test]
    fn keeps_input_order_and_bus_ids() {
        let gpus = strict().parse(TWO_GPUS).unwrap();

        assert_eq!(gpus.len(), 2);
        assert_eq!(gpus[0].bus_id, "00:02.0");
        assert_eq!(gpus[1].bus_id, "01:00.0");
        assert_eq!(gpus[1].gpu_type, "DIS");
        assert!(!gpus[1].connected);
        assert_eq!(gpus[1].power_state, "DynOff");
    }

    #[test]
    fn empty_input_is_an_empty_set() {
        assert!(strict().parse("").unwrap().is_empty());
        assert!(strict().parse("\n\n").unwrap().is_empty());
    }

    #[test]
    fn handles_crlf_line_endings() {
        let gpus = strict()
            .parse("0:IGD:+:Pwr:0000:00:02.0\r\n1:DIS: :Off:0000:01:00.0\r\n")
            .unwrap();

        assert_eq!(gpus.len(), 2);
        assert_eq!(gpus[0].bus_id, "00:02.0");
    }

    #[test]
    fn strict_rejects_malformed_line() {
        let raw = format!("{TWO_GPUS}bogus\n");
        let err = strict().parse(&raw).unwrap_err();

        match err {
            ParseError::Malformed { line_number, line } => {
                assert_eq!(line_number, 3);
                assert_eq!(line, "bogus");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn lenient_skips_malformed_line() {
        let raw = "bogus\n0:IGD:+:Pwr:0000:00:02.0\n";
        let gpus = lenient().parse(raw).unwrap();

        assert_eq!(gpus.len(), 1);
        assert_eq!(gpus[0].bus_id, "00:02.0");
    }

    #[test]
    fn rejects_lowercase_type_and_bad_connected_flag() {
        assert!(strict().parse("0:igd:+:Pwr:0000:00:02.0").is_err());
        assert!(strict().parse("0:IGD:-:Pwr:0000:00:02.0").is_err());
        assert!(strict().parse("0:IGD:+:Pwr:0000:00:02.0 ").is_err());
    }

    #[test]
    fn duplicate_bus_id_is_an_error() {
        let raw = "0:IGD:+:Pwr:0000:00:02.0\n1:DIS: :Off:0000:00:02.0\n";

        let err = strict().parse(raw).unwrap_err();
        assert!(matches!(err, ParseError::DuplicateBusId { line_number: 2, .. }));

        let gpus = lenient().parse(raw).unwrap();
        assert_eq!(gpus.len(), 1);
        assert_eq!(gpus[0].gpu_type, "IGD");
    }
}
