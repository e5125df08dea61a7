use figment::Figment;
use figment::providers::Env;
use std::sync::OnceLock;

use crate::settings::ScpSettings;

const ENV_PREFIX: &str = "OXISCP_";

static CONFIG: OnceLock<Figment> = OnceLock::new();

/// Configuration read from `OXISCP_*` environment variables, read once per process.
pub fn get_config() -> &'static Figment {
    CONFIG.get_or_init(figment)
}

fn figment() -> Figment {
    Figment::new()
        .merge(Env::prefixed(ENV_PREFIX).split("_"))
        .merge(Env::prefixed(ENV_PREFIX))
}

/// Extract and validate [ScpSettings] from the environment.
pub fn settings_from_env() -> anyhow::Result<ScpSettings> {
    let settings: ScpSettings = get_config().extract()?;
    settings.validate()?;
    Ok(settings)
}
