use anyhow::Result;
use mockbase::config::Settings;
use mockbase::server::{self, AppState};
use mockbase::storage::JsonStore;
use std::path::Path;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mockbase=info,tower_http=info".into()),
        )
        .init();

    // Optional settings file as the first argument
    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::from_json_file(&path)?,
        None => Settings::default_settings(),
    };

    let mut state = AppState::from_settings(&settings)?;

    // A local ./data directory seeds the raw /jsonstore tree
    let data_dir = Path::new("./data");
    if data_dir.is_dir() {
        state = state.with_jsonstore(JsonStore::from_dir(data_dir)?);
    }

    let port = std::env::var("PORT").unwrap_or_else(|_| "3030".to_string());
    server::serve(state, &format!("0.0.0.0:{port}")).await
}
