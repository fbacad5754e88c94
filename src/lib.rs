pub mod arg_parser;
pub mod config_manager;
pub mod consumer;
pub mod errors;
pub mod gpu_data;
pub mod gpu_registry;
pub mod logger;
pub mod name_resolver;
pub mod poller;
pub mod status_parser;
pub mod status_reader;
