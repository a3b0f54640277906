use serde_json::json;
use tellr_core::config::{AppConfig, LoadOptions};
use tellr_db::{connect_with_config, migrations};

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        let applied = migrations::run_pending(&pool).await;
        pool.close().await;
        applied.map_err(|error| ("migration", error.to_string(), 5u8))
    });

    match result {
        Ok(applied) => {
            let message = if applied == 0 {
                "schema already up to date".to_string()
            } else {
                format!("applied {applied} pending migrations")
            };
            let details = json!({ "applied": applied, "known": migrations::known_count() });
            CommandResult::success_with("migrate", message, details)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
