//! Server configuration: environment plus the TOML application config.

use quotehub_core::config::AppConfig;

/// Environment-level settings for the server process.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub app: AppConfig,
}

impl ServerConfig {
    /// Resolve from the environment:
    /// - `QUOTEHUB_CONFIG`: path to the TOML document (optional; the
    ///   A-share defaults apply without one);
    /// - `QUOTEHUB_DB_PATH`, `QUOTEHUB_DATA_DIR`, `QUOTEHUB_LISTEN`:
    ///   per-field overrides;
    /// - `TUSHARE_TOKEN`: API token injected into the tushare source.
    pub fn from_env() -> anyhow::Result<ServerConfig> {
        let mut app = match std::env::var("QUOTEHUB_CONFIG") {
            Ok(path) => AppConfig::load(&path)?,
            Err(_) => AppConfig::a_share_default(),
        };

        if let Ok(db_path) = std::env::var("QUOTEHUB_DB_PATH") {
            app.database.db_path = db_path;
        }
        if let Ok(data_dir) = std::env::var("QUOTEHUB_DATA_DIR") {
            app.data.data_dir = data_dir;
        }
        if let Ok(token) = std::env::var("TUSHARE_TOKEN") {
            if let Some(source) = app.sources.get_mut("tushare") {
                source.api_token = Some(token);
            }
        }

        let listen_addr =
            std::env::var("QUOTEHUB_LISTEN").unwrap_or_else(|_| "0.0.0.0:8000".to_string());

        Ok(ServerConfig { listen_addr, app })
    }
}
