mod config;
mod error;
mod imaging;
mod inference;
mod pipeline;
mod routes;
mod storage;
#[cfg(test)]
mod test_support;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use config::Settings;
use imaging::loader::{FETCH_TIMEOUT, ImageLoader};
use inference::ModelRegistry;
use pipeline::PredictionService;
use routes::configure_routes;
use std::env;
use std::sync::Arc;
use storage::artifact_store::ArtifactStore;

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, e);
    std::io::Error::other(format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let settings = Settings::load().map_err(|e| startup_error("Invalid configuration", e))?;

    let registry =
        ModelRegistry::load(&settings).map_err(|e| startup_error("Model loading failed", e))?;

    let store = ArtifactStore::open(&settings.predictions_dir)
        .map_err(|e| startup_error("Cannot prepare predictions directory", e))?;
    log::info!("Writing predictions to {}", store.root().display());

    let loader = ImageLoader::new(FETCH_TIMEOUT)
        .map_err(|e| startup_error("Failed to build HTTP client", e))?;

    let service = PredictionService::new(loader, registry, Arc::new(store));

    let frontend_dir = settings.frontend_dir.clone();
    let bind_address = settings.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .app_data(web::Data::new(service.clone()))
            .configure(|cfg| configure_routes(cfg, frontend_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
