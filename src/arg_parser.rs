use std::path::PathBuf;

use argparse::{ArgumentParser, Print, Store, StoreOption, StoreTrue};

use crate::{config_manager::Config, status_parser::ParsePolicy};

pub struct ArgsOptions {
    pub config_file_path: PathBuf,

    // Overrides of the configuration file
    pub interval_ms: Option<u64>,
    pub lenient: bool,

    // Poll a single time and exit
    pub once: bool,
}

impl ArgsOptions {
    pub fn parse() -> Self {
        let mut options = ArgsOptions::default();

        {
            let mut parser = ArgumentParser::new();
            parser.set_description(
                "Report which switchable GPU is currently powered",
            );

            // Configuration file path
            parser.refer(&mut options.config_file_path).add_option(
                &["-c", "--config"],
                Store,
                "The file path of the configuration file",
            );

            parser.refer(&mut options.interval_ms).add_option(
                &["-i", "--interval"],
                StoreOption,
                "Poll interval in milliseconds",
            );

            parser.refer(&mut options.lenient).add_option(
                &["--lenient"],
                StoreTrue,
                "Skip malformed switcheroo lines instead of failing the poll",
            );

            parser.refer(&mut options.once).add_option(
                &["--once"],
                StoreTrue,
                "Poll once, print the active GPU and exit",
            );

            // Show version
            parser.add_option(
                &["-V", "--version"],
                Print(env!("CARGO_PKG_VERSION").to_string()),
                "Show the version",
            );

            parser.parse_args_or_exit();
        }

        options
    }

    // Apply the command line overrides to the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(interval_ms) = self.interval_ms {
            config.poll_interval_ms = interval_ms;
        }

        if self.lenient {
            config.parse_policy = ParsePolicy::Lenient;
        }
    }
}

impl Default for ArgsOptions {
    fn default() -> Self {
        Self {
            config_file_path: PathBuf::from("switcheroo-status/config.json"),
            interval_ms: None,
            lenient: false,
            once: false,
        }
    }
}
