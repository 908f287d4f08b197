use std::sync::Arc;

use actix_web::{App, HttpServer, middleware, web};

use crate::backup::BackupManager;
use crate::db::{Database, PoolOptions};
use crate::embedding::ImageEmbedder;
use crate::models::config::ServerConfig;
use crate::repository::DieselRepository;

pub mod augment;
pub mod backup;
pub mod db;
pub mod domain;
pub mod dto;
pub mod embedding;
pub mod error_conversions;
pub mod forms;
pub mod models;
pub mod repository;
pub mod routes;
pub mod schema;
pub mod services;

/// Builds and runs the Actix-Web HTTP server using the provided configuration.
///
/// The database is restored or initialised before the server binds, and the
/// connection pool is closed once the server stops.
pub async fn run(server_config: ServerConfig) -> std::io::Result<()> {
    let db = Arc::new(Database::new(
        server_config.database_url.clone(),
        PoolOptions {
            min_idle: server_config.pool_min_idle,
            max_size: server_config.pool_max_size,
        },
    ));

    let backups = BackupManager::new(db.clone(), server_config.backup_dir.clone())
        .map_err(|e| std::io::Error::other(format!("Failed to prepare backups: {e}")))?;

    // Model download and restore both block; keep them off the async runtime.
    let startup_config = server_config.clone();
    let startup_db = db.clone();
    let (embedder, backups) = web::block(move || {
        let embedder = embedding::from_config(&startup_config)
            .map_err(|e| format!("Failed to load embedding model: {e}"))?;
        services::startup::initialize(&startup_db, &backups, &startup_config)
            .map_err(|e| format!("Failed to initialise the database: {e}"))?;
        Ok::<_, String>((embedder, backups))
    })
    .await
    .map_err(std::io::Error::other)?
    .map_err(std::io::Error::other)?;

    let repo = web::Data::new(DieselRepository::new(db.clone()));
    let embedder: web::Data<dyn ImageEmbedder> = web::Data::from(embedder);
    let backups = web::Data::new(backups);
    let config = web::Data::new(server_config.clone());

    let bind_address = (server_config.address.clone(), server_config.port);
    log::info!("Listening on {}:{}", bind_address.0, bind_address.1);

    let result = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Compress::default())
            .wrap(middleware::Logger::default())
            .app_data(repo.clone())
            .app_data(embedder.clone())
            .app_data(backups.clone())
            .app_data(config.clone())
            .configure(routes::configure)
    })
    .bind(bind_address)?
    .run()
    .await;

    log::info!("Application shutdown...");
    db.close();
    result
}
