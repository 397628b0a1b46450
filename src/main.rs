mod config;
mod error;
mod handlers;
mod models;
mod services;

use std::sync::Arc;

use actix_web::{web, App, HttpServer, middleware::Logger};
use actix_cors::Cors;
use anyhow::Context;
use dotenv::dotenv;

use services::{
    database::DatabaseService,
    dispatch::DispatchEngine,
    gateway::GatewayRegistry,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = config::Config::from_env().context("Failed to load configuration")?;

    // One store handle for the whole process
    let database_service = DatabaseService::new(&config.database)
        .await
        .context("Failed to initialize database")?;

    let gateways = GatewayRegistry::from_config(&config.push)
        .context("Failed to initialize push gateways")?;

    let engine = DispatchEngine::new(
        Arc::new(database_service.clone()),
        Arc::new(database_service.clone()),
        gateways,
        config.push.delivery_timeout(),
    );

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!(
        "Starting notification service on {} ({:?})",
        bind_address,
        config.environment
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
            )
            .app_data(web::Data::new(database_service.clone()))
            .app_data(web::Data::new(engine.clone()))
            .service(
                web::scope("/api/v1")
                    .service(
                        web::scope("/notifications")
                            .service(handlers::notifications::dispatch_user)
                            .service(handlers::notifications::dispatch_broadcast)
                            .service(handlers::notifications::register_device)
                            .service(handlers::notifications::get_notifications)
                            .service(handlers::notifications::read_notification)
                    )
                    .route("/health", web::get().to(handlers::health::health_check))
            )
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
