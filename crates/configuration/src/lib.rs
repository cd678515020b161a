use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use settings::{
    CacheSettings, DatabaseSettings, IndexSettings, IngestSettings, LoggingSettings,
    ServerSettings, Settings, SourceKind,
};

/// The file `load_config` reads when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Prefix for environment overrides, e.g. `EWI__INDEX__TOP_N=50`.
pub const ENV_PREFIX: &str = "EWI";

/// Loads the application configuration from `config.toml` and the environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(Path::new(DEFAULT_CONFIG_FILE))
}

/// Loads configuration in layers: built-in defaults, then the (optional) file
/// at `path`, then `EWI__SECTION__KEY` variables. A plain `DATABASE_URL`
/// always wins for the database connection string.
pub fn load_config_from(path: &Path) -> Result<Settings, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
        .build()?;

    // Attempt to deserialize the entire configuration into our `Settings` struct
    let settings = builder.try_deserialize::<Settings>()?;
    settings.validate()?;

    Ok(settings)
}
