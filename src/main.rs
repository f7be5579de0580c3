use std::io;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use mongodb::Client;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod auth;
mod calendar;
mod config;
mod error;
mod expenses;
mod meals;
mod notify;
mod routes;
mod schemas;
mod share;
mod store;

use config::Config;
use store::Store;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("groceryshare=info,actix_web=info"));
    fmt().with_env_filter(filter).init();
}

fn cors(origin: Option<&str>) -> Cors {
    match origin {
        Some(origin) => Cors::default()
            .allowed_origin(origin)
            .allow_any_method()
            .allow_any_header()
            .max_age(3600),
        None => Cors::permissive(),
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    init_tracing();

    let config = Config::load().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    info!("Using database {}", config.database_name);

    let client = Client::with_uri_str(&config.mongodb_uri)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let store = Store::new(client.database(&config.database_name));
    store
        .ensure_indexes()
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    info!("Connected");

    let address = (config.bind_address.clone(), config.port);
    info!("Binding to {}:{}", address.0, address.1);

    HttpServer::new(move || {
        App::new()
            .wrap(cors(config.cors_origin.as_deref()))
            .wrap(Logger::default())
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(config.clone()))
            .configure(routes::configure)
    })
    .bind(address)?
    .run()
    .await
}
