#[macro_use]
extern crate rocket;

pub mod cache;
pub mod config;
pub mod datasets;
pub mod db;
pub mod error;
pub mod events;
pub mod mail;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod parsing;
pub mod request_logger;
pub mod retry;
pub mod routes;
pub mod storage;
pub mod sync;

use crate::cache::memory::InMemoryCache;
use crate::cache::remote::RemoteCache;
use crate::cache::Cache;
use crate::config::{CacheProvider, Config};
use crate::db::AppDb;
use crate::events::EventBus;
use crate::mail::imap_gateway::ImapMailGateway;
use crate::mail::oauth::OAuthMailGateway;
use crate::mail::{GatewayKind, MailGateway};
use crate::orchestrator::Orchestrator;
use crate::request_logger::RequestLogger;
use crate::storage::http_store::HttpObjectStore;
use crate::storage::ObjectStore;
use env_logger::{Env, Target};
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use std::fs::OpenOptions;
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();

fn init_logger(log_file_path: Option<&str>) {
    LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        );

        if let Some(path) = log_file_path {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => {
                    builder.target(Target::Pipe(Box::new(file)));
                }
                Err(e) => {
                    eprintln!("failed to open LOG_FILE_PATH {path}: {e}, logging to stderr");
                }
            }
        }

        builder.init();
    });
}

fn build_mail_gateway(config: &Config) -> Arc<dyn MailGateway> {
    match config.mail_transport {
        GatewayKind::Imap => Arc::new(ImapMailGateway::new(
            config.imap_host.clone(),
            config.imap_port,
            config.imap_username.clone(),
            config.imap_password.clone(),
            "INBOX".to_string(),
            config.processed_marker.clone(),
        )),
        GatewayKind::OAuthApi => Arc::new(OAuthMailGateway::new(
            config.mail_oauth_base_url.clone(),
            config.mail_user.clone(),
            config.mail_oauth_access_token.clone(),
        )),
    }
}

fn build_object_store(config: &Config) -> Arc<dyn ObjectStore> {
    Arc::new(HttpObjectStore::new(
        config.object_store_base_url.clone(),
        config.object_store_access_token.clone(),
    ))
}

fn build_cache(config: &Config) -> Arc<dyn Cache> {
    match config.cache_provider {
        CacheProvider::Memory => Arc::new(InMemoryCache::new()),
        CacheProvider::Remote => Arc::new(RemoteCache::new(config.cache_remote_base_url.clone())),
    }
}

pub fn rocket() -> Rocket<Build> {
    let config = Config::from_env().expect("invalid configuration");
    init_logger(config.log_file_path.as_deref());

    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Put, Method::Delete, Method::Patch]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("error creating CORS");

    rocket::build()
        .attach(RequestLogger)
        .attach(AppDb::init())
        .attach(cors)
        .manage(config)
        .attach(AdHoc::try_on_ignite("Run Migrations", |rocket| async move {
            match AppDb::fetch(&rocket) {
                Some(db) => {
                    let pool = (**db).clone();
                    match sync::database::run_migrations(&pool).await {
                        Ok(_) => {
                            log::info!("database migrations successful");
                            Ok(rocket)
                        }
                        Err(e) => {
                            log::error!("database migrations failed: {}", e);
                            Err(rocket)
                        }
                    }
                }
                None => {
                    log::error!("database pool not available for migrations");
                    Err(rocket)
                }
            }
        }))
        .attach(AdHoc::try_on_ignite("Init Orchestrator", |rocket| async move {
            let pool = match AppDb::fetch(&rocket) {
                Some(db) => (**db).clone(),
                None => {
                    log::error!("database pool not available for orchestrator init");
                    return Err(rocket);
                }
            };
            let config = match rocket.state::<Config>() {
                Some(config) => config.clone(),
                None => {
                    log::error!("configuration not available for orchestrator init");
                    return Err(rocket);
                }
            };

            let mail = build_mail_gateway(&config);
            let store = build_object_store(&config);
            let cache = build_cache(&config);
            let events = Arc::new(EventBus::new());

            let mut invalidation_branches = vec![config.branch_id.clone()];
            invalidation_branches.extend(config.allowed_branches.clone());
            events.subscribe(Box::new(crate::events::CacheInvalidationSubscriber::new(
                cache.clone(),
                invalidation_branches,
            )));

            let orchestrator = Orchestrator::new(
                pool,
                mail,
                store,
                cache,
                events,
                config.mail_subject_pattern.clone(),
                config.attachments_folder_id.clone(),
                config.branch_id.clone(),
                config.allowed_branches.clone(),
                config.cache_ttl_minutes,
                config.upcoming_window_days,
            );

            Ok(rocket.manage(orchestrator))
        }))
        .mount(
            "/",
            routes![
                routes::health::health,
                routes::process_emails::process_emails,
                routes::extraccion_generacion::extraccion_generacion,
                routes::emails_search::search_emails,
            ],
        )
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};
    use rocket_db_pools::sqlx::PgPool;

    pub use database::{TestDatabase, TestDatabaseError};

    pub mod database {
        use log::LevelFilter;
        use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
        use testcontainers::{GenericImage, ImageExt, core::WaitFor};
        use testcontainers_modules::testcontainers::{
            ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner,
        };
        use thiserror::Error;
        use tokio::runtime::Handle;
        use uuid::Uuid;

        static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("TEST_DATABASE_URL not set")]
            MissingUrl,
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Ephemeral database factory for integration tests.
        pub struct TestDatabase {
            pool: Option<PgPool>,
            admin_options: PgConnectOptions,
            database_name: String,
            container: Option<ContainerAsync<GenericImage>>,
        }

        impl TestDatabase {
            /// Provision a fresh database by launching a disposable Postgres container.
            pub async fn new_from_env() -> Result<Self, TestDatabaseError> {
                Self::new().await
            }

            /// Provision a fresh database given a base connection string.
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let image = GenericImage::new("tensorchord/vchord-postgres", "pg18-v0.5.3")
                    .with_wait_for(WaitFor::message_on_stdout(
                        "database system is ready to accept connections",
                    ))
                    .with_wait_for(WaitFor::message_on_stderr(
                        "database system is ready to accept connections",
                    ));

                let request = image
                    .with_env_var("POSTGRES_DB", "postgres")
                    .with_env_var("POSTGRES_USER", "postgres")
                    .with_env_var("POSTGRES_PASSWORD", "postgres")
                    .with_cmd([
                        "-c".to_string(),
                        "shared_preload_libraries=vchord".to_string(),
                    ]);

                let container = request.start().await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let admin_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                let base_options: PgConnectOptions =
                    admin_url.parse().map_err(TestDatabaseError::Sqlx)?;
                let base_options = base_options.log_statements(LevelFilter::Off);

                let base_name = base_options
                    .get_database()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "postgres".to_string());

                let admin_options = base_options.clone().database("postgres");
                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(admin_options.clone())
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                let new_db_name = format!("{}_{}", base_name, Uuid::new_v4().simple());
                let create_sql = format!("CREATE DATABASE \"{}\" TEMPLATE template0", new_db_name);
                sqlx::query(&create_sql)
                    .execute(&admin_pool)
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(base_options.clone().database(&new_db_name))
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                MIGRATOR.run(&pool).await?;

                Ok(Self {
                    pool: Some(pool),
                    admin_options,
                    database_name: new_db_name,
                    container: Some(container),
                })
            }

            /// Cloneable connection pool for use in tests and Rocket state.
            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            /// Convenience method returning a clone of the pooled connection handle.
            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            /// Re-run migrations to ensure schema freshness (idempotent).
            pub async fn reset(&self) -> Result<(), TestDatabaseError> {
                MIGRATOR.run(self.pool()).await?;
                Ok(())
            }

            /// Close pool connections and drop the ephemeral database.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                }

                drop_database_with_fallback(self.admin_options.clone(), &self.database_name)
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                if let Some(container) = self.container.take() {
                    drop(container);
                }

                Ok(())
            }
        }

        async fn drop_database_with_fallback(
            admin_options: PgConnectOptions,
            database_name: &str,
        ) -> Result<(), sqlx::Error> {
            let admin_pool = PgPoolOptions::new()
                .max_connections(1)
                .connect_with(admin_options)
                .await?;

            let drop_force = format!("DROP DATABASE \"{}\" WITH (FORCE)", database_name);
            match sqlx::query(&drop_force).execute(&admin_pool).await {
                Ok(_) => Ok(()),
                Err(err) if force_drop_unsupported(&err) => {
                    let drop_sql = format!("DROP DATABASE \"{}\"", database_name);
                    sqlx::query(&drop_sql).execute(&admin_pool).await?;
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }

        fn force_drop_unsupported(err: &sqlx::Error) -> bool {
            matches!(
                err,
                sqlx::Error::Database(db_err)
                    if db_err
                        .code()
                        .map(|code| code == "42601" || code == "0A000")
                        .unwrap_or(false)
            )
        }

        impl Drop for TestDatabase {
            fn drop(&mut self) {
                if let Some(pool) = self.pool.take() {
                    let admin_options = self.admin_options.clone();
                    let db_name = self.database_name.clone();
                    if let Ok(handle) = Handle::try_current() {
                        handle.spawn(async move {
                            pool.close().await;
                            let _ =
                                drop_database_with_fallback(admin_options.clone(), &db_name).await;
                        });
                    } else {
                        std::thread::spawn(move || {
                            if let Ok(rt) = tokio::runtime::Runtime::new() {
                                rt.block_on(async move {
                                    pool.close().await;
                                    let _ = drop_database_with_fallback(
                                        admin_options.clone(),
                                        &db_name,
                                    )
                                    .await;
                                });
                            }
                        });
                    }
                }

                if let Some(container) = self.container.take() {
                    drop(container);
                }
            }
        }
    }

    /// Builder for constructing Rocket instances tailored for integration tests.
    #[derive(Default)]
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        pg_pool: Option<PgPool>,
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                pg_pool: None,
            }
        }

        /// Mount routes at `base`.
        pub fn mount_routes(mut self, base: &str, routes: Vec<Route>) -> Self {
            self.mounts.push((base.to_string(), routes));
            self
        }

        /// Manage a `PgPool` instance for tests that exercise database-backed routes.
        pub fn manage_pg_pool(mut self, pool: PgPool) -> Self {
            self.pg_pool = Some(pool);
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment);

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(pool) = self.pg_pool {
                rocket = rocket.manage(pool);
            }

            rocket
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
