//! Agent console configuration module
//! Handles loading, saving, and managing the config file

pub mod config;

pub use config::{
    ApiConfig, Config, RemoteDesktopConfig, UpdatesConfig, API_URL_ENV, CONFIG_PATH_ENV,
};
