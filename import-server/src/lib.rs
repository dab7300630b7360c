#[macro_use]
extern crate rocket;

pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod request_logger;
pub mod routes;
pub mod store;
pub mod validation;

use crate::config::ImportConfig;
use crate::db::ImportDb;
use crate::request_logger::RequestLogger;
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::Once;

static LOGGER: Once = Once::new();

pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    let import_config = ImportConfig::from_env();
    log::info!(
        "import pipeline: chunk size {}, max {} records per request, json limit {} bytes",
        import_config.chunk_size,
        import_config.max_records,
        import_config.json_body_limit()
    );

    // Configure CORS
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("Error creating CORS");

    // Sized so every batch the validator accepts can be read by `Json<_>`.
    let figment =
        rocket::Config::figment().merge(("limits.json", import_config.json_body_limit()));

    rocket::custom(figment)
        .attach(RequestLogger)
        .attach(ImportDb::init())
        .attach(cors)
        .manage(import_config)
        // Run database migrations on startup
        .attach(AdHoc::try_on_ignite(
            "Run Migrations",
            |rocket| async move {
                match ImportDb::fetch(&rocket) {
                    Some(db) => {
                        let pool = (**db).clone();
                        match store::run_migrations(&pool).await {
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
            },
        ))
        // Share the pool with handlers as plain `State<PgPool>`
        .attach(AdHoc::try_on_ignite("Manage DB Pool", |rocket| async move {
            match ImportDb::fetch(&rocket) {
                Some(db) => {
                    let pool = (**db).clone();
                    Ok(rocket.manage(pool))
                }
                None => Err(rocket),
            }
        }))
        .mount(
            "/api/v1",
            openapi_get_routes![
                // Health routes
                routes::health::live_health,
                routes::health::ready_health,
                // Import routes
                routes::imports::create_import,
                routes::imports::get_import,
                // Entity routes
                routes::entities::get_entity,
                // Admin routes
                routes::admin::list_stale_imports,
            ],
        )
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Import API", "../../v1/openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use crate::config::ImportConfig;
    use crate::models::{ImportSummary, JobStatus};
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};
    use rocket_db_pools::sqlx::types::Json;
    use rocket_db_pools::sqlx::{self, PgPool};
    use serde_json::Value;
    use uuid::Uuid;

    pub use database::{TestDatabase, TestDatabaseError};

    /// Helpers for seeding the ledger and target tables in tests.
    pub struct TestFixtures<'a> {
        pool: &'a PgPool,
    }

    impl<'a> TestFixtures<'a> {
        /// Create a fixture helper bound to the provided pool.
        pub fn new(pool: &'a PgPool) -> Self {
            Self { pool }
        }

        /// Insert an entity row directly, bypassing the import pipeline.
        pub async fn insert_entity(
            &self,
            name: &str,
            email: &str,
            metadata: Option<Value>,
        ) -> Result<Uuid, sqlx::Error> {
            sqlx::query_scalar(
                "INSERT INTO entities (id, name, email, metadata) VALUES ($1, $2, $3, $4) RETURNING id",
            )
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(email)
            .bind(metadata)
            .fetch_one(self.pool)
            .await
        }

        /// Insert a ledger row in an arbitrary state.
        pub async fn insert_job(
            &self,
            token: &str,
            status: JobStatus,
            summary: &ImportSummary,
        ) -> Result<Uuid, sqlx::Error> {
            sqlx::query_scalar(
                "INSERT INTO import_jobs (id, token, status, summary) VALUES ($1, $2, $3, $4) RETURNING id",
            )
            .bind(Uuid::new_v4())
            .bind(token)
            .bind(status)
            .bind(Json(summary))
            .fetch_one(self.pool)
            .await
        }

        /// Backdate a ledger row so it counts as stale.
        pub async fn age_job(&self, token: &str, secs: i64) -> Result<(), sqlx::Error> {
            sqlx::query(
                "UPDATE import_jobs SET updated_at = NOW() - make_interval(secs => $2) WHERE token = $1",
            )
            .bind(token)
            .bind(secs as f64)
            .execute(self.pool)
            .await?;

            Ok(())
        }

        pub async fn count_entities(&self) -> Result<i64, sqlx::Error> {
            sqlx::query_scalar("SELECT COUNT(*) FROM entities")
                .fetch_one(self.pool)
                .await
        }

        pub async fn count_jobs(&self, token: &str) -> Result<i64, sqlx::Error> {
            sqlx::query_scalar("SELECT COUNT(*) FROM import_jobs WHERE token = $1")
                .bind(token)
                .fetch_one(self.pool)
                .await
        }
    }

    pub mod database {
        use crate::store::migration::MIGRATOR;
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

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            /// Neither `TEST_DATABASE_URL` nor a container runtime is available.
            #[error("TEST_DATABASE_URL not set and no container runtime available")]
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
            /// Provision a fresh database on the server named by
            /// `TEST_DATABASE_URL`, or in a Postgres container when it is unset.
            pub async fn new_from_env() -> Result<Self, TestDatabaseError> {
                match std::env::var("TEST_DATABASE_URL") {
                    Ok(url) => Self::provision(&url, None).await,
                    Err(_) => match Self::new().await {
                        Err(TestDatabaseError::Container(err)) => {
                            log::warn!("no test database available: {err}");
                            Err(TestDatabaseError::MissingUrl)
                        }
                        other => other,
                    },
                }
            }

            /// Provision a fresh database inside a disposable Postgres container.
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let image = GenericImage::new("postgres", "16-alpine").with_wait_for(
                    WaitFor::message_on_stderr("database system is ready to accept connections"),
                );

                let request = image
                    .with_env_var("POSTGRES_DB", "postgres")
                    .with_env_var("POSTGRES_USER", "postgres")
                    .with_env_var("POSTGRES_PASSWORD", "postgres");

                let container = request.start().await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let admin_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                Self::provision(&admin_url, Some(container)).await
            }

            async fn provision(
                admin_url: &str,
                container: Option<ContainerAsync<GenericImage>>,
            ) -> Result<Self, TestDatabaseError> {
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
                admin_pool.close().await;

                let pool = PgPoolOptions::new()
                    .max_connections(8)
                    .connect_with(base_options.clone().database(&new_db_name))
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                MIGRATOR.run(&pool).await?;

                Ok(Self {
                    pool: Some(pool),
                    admin_options,
                    database_name: new_db_name,
                    container,
                })
            }

            /// Connection pool for use in tests and Rocket state.
            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            /// Convenience method returning a clone of the pooled connection handle.
            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
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
        import_config: Option<ImportConfig>,
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
                import_config: None,
            }
        }

        /// Mount routes under `/api/v1`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/api/v1".to_string(), routes));
            self
        }

        /// Manage a `PgPool` instance for tests that exercise database-backed routes.
        pub fn manage_pg_pool(mut self, pool: PgPool) -> Self {
            self.pg_pool = Some(pool);
            self
        }

        /// Override the import configuration; defaults apply otherwise.
        pub fn manage_import_config(mut self, config: ImportConfig) -> Self {
            self.import_config = Some(config);
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let import_config = self.import_config.unwrap_or_default();
            let figment = self
                .figment
                .merge(("limits.json", import_config.json_body_limit()));
            let mut rocket = rocket::custom(figment);

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(pool) = self.pg_pool {
                rocket = rocket.manage(pool);
            }

            rocket.manage(import_config)
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
