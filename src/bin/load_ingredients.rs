//! Imports the ingredient catalog from a JSON array of
//! `{"name": .., "measurement_unit": ..}` objects.
//!
//! ```sh
//! load_ingredients data/ingredients.json
//! ```

use std::{env, process};

use foodgram::{
    actions::{load_ingredients, NewIngredient},
    config::Config,
    invalidate_catalog_cache,
    state::State,
};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: load_ingredients <ingredients.json>");
            process::exit(2);
        }
    };

    let items: Vec<NewIngredient> = match tokio::fs::read(&path)
        .await
        .map_err(|e| e.to_string())
        .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()))
    {
        Ok(items) => items,
        Err(e) => {
            log::error!("Failed to read {path}: {e}");
            process::exit(1);
        }
    };

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {e}");
            process::exit(1);
        }
    };
    let state = match State::new(config).await {
        Ok(state) => state,
        Err(e) => {
            log::error!("Failed to connect: {e}");
            process::exit(1);
        }
    };

    match load_ingredients(&items, &state.pool).await {
        Ok(inserted) => log::info!(
            "Loaded {inserted} new ingredients ({} already present)",
            items.len() as u64 - inserted
        ),
        Err(e) => {
            log::error!("Import failed: {e}");
            process::exit(1);
        }
    }

    if let Some(mut cache) = state.cache.clone() {
        if let Err(e) = invalidate_catalog_cache(&mut cache).await {
            log::warn!("Catalog cache not invalidated: {e}");
        }
    }
}
