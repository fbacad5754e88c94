use thiserror::Error;

use crate::{
    config_manager::ConfigError, name_resolver::ResolveError,
    status_parser::ParseError, status_reader::ReadError,
};

// The main error type, every variant is local to one poll
// except configuration errors which only happen at start-up
#[derive(Debug, Error)]
pub enum SwitcherooError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
