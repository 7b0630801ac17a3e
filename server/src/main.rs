#![allow(dead_code)]

mod db_core;
mod error;
mod llm;
mod mailbox;
mod model;
mod pipeline;
mod prompt;
mod rate_limiters;
mod request_tracing;
mod routes;
mod server_config;
mod util;
mod workers;

use std::{env, net::SocketAddr, time::Duration};

use axum::{extract::FromRef, Router};
use mimalloc::MiMalloc;
use rate_limiters::RateLimiters;
use routes::AppRouter;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tokio::{signal, task::JoinHandle};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub http_client: HttpClient,
    pub conn: DatabaseConnection,
    pub rate_limiters: RateLimiters,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL is not set in .env file");
    let mut db_options = ConnectOptions::new(db_url);
    db_options.sqlx_logging(false);

    let conn = Database::connect(db_options)
        .await
        .expect("Database connection failed");

    let http_client = reqwest::ClientBuilder::new().use_rustls_tls().build()?;
    let rate_limiters = RateLimiters::from_config();

    let state = ServerState {
        http_client,
        conn,
        rate_limiters,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let router = AppRouter::create(state.clone());
    let worker_shutdown = CancellationToken::new();

    let mut scheduler = JobScheduler::new()
        .await
        .expect("Failed to create scheduler");

    {
        // Queue consumers come up shortly after boot and run until shutdown.
        let state_clone = state.clone();
        let token = worker_shutdown.clone();
        scheduler
            .add(Job::new_one_shot(
                Duration::from_secs(2),
                move |_uuid, _l| {
                    workers::spawn_queue_workers(state_clone.clone(), token.clone());
                },
            )?)
            .await?;

        // Periodic visibility into the gateway throttle.
        let limiters = state.rate_limiters.clone();
        scheduler
            .add(Job::new_repeated(
                Duration::from_secs(5 * 60),
                move |_uuid, _l| {
                    tracing::info!("gateway limiter status: {}", limiters.get_status());
                },
            )?)
            .await?;
    }

    scheduler.set_shutdown_handler(Box::new(move || {
        Box::pin(async move {
            tracing::info!("Shutting down scheduler");
        })
    }));

    println!("Starting scheduler...");
    match scheduler.start().await {
        Ok(_) => {
            println!("-------- SCHEDULER STARTED --------");
        }
        Err(e) => {
            println!("Failed to start scheduler: {:?}", e);
        }
    }

    let server_handle = run_server(router, scheduler, worker_shutdown);
    server_handle.await?;

    Ok(())
}

async fn shutdown_signal(mut scheduler: JobScheduler, worker_shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    worker_shutdown.cancel();
    scheduler.shutdown().await.ok();
    println!("Cleanups done, shutting down");
}

fn run_server(
    router: Router,
    scheduler: JobScheduler,
    worker_shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async {
        let port = env::var("PORT").unwrap_or("5006".to_string());
        tracing::info!("Replypilot server running on http://0.0.0.0:{}", port);
        // check config
        println!("{}", *server_config::cfg);

        let addr = SocketAddr::from(([0, 0, 0, 0], port.parse::<u16>().unwrap()));
        tracing::debug!("listening on {addr}");
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(scheduler, worker_shutdown))
        .await
        .unwrap();
    })
}

#[cfg(test)]
mod tests {
    #[cfg(feature = "integration")]
    use super::*;
    #[cfg(feature = "integration")]
    use std::net::SocketAddr;
    #[cfg(feature = "integration")]
    use tokio::net::TcpListener;

    #[cfg(feature = "integration")]
    pub struct TestServer {
        pub addr: SocketAddr,
        pub state: ServerState,
        shutdown_tx: tokio::sync::oneshot::Sender<()>,
    }

    #[cfg(feature = "integration")]
    impl TestServer {
        pub fn url(&self) -> String {
            format!("http://{}", self.addr)
        }

        pub async fn shutdown(self) {
            let _ = self.shutdown_tx.send(());
        }
    }

    #[cfg(feature = "integration")]
    pub async fn setup() -> anyhow::Result<TestServer> {
        dotenvy::dotenv().ok();

        let db_url = env::var("DATABASE_URL").expect("DATABASE_URL is not set in .env file");
        let mut db_options = ConnectOptions::new(db_url);
        db_options.sqlx_logging(false);

        let conn = Database::connect(db_options)
            .await
            .expect("Database connection failed");

        let http_client = reqwest::ClientBuilder::new().use_rustls_tls().build()?;

        let state = ServerState {
            http_client,
            conn,
            rate_limiters: RateLimiters::from_config(),
        };

        let router = AppRouter::create(state.clone());

        // Bind to port 0 to get a random available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
        });

        Ok(TestServer {
            addr,
            state,
            shutdown_tx,
        })
    }

    #[cfg(feature = "integration")]
    #[tokio::test]
    async fn test_server_starts() {
        let server = setup().await.expect("Failed to setup test server");
        assert!(!server.url().is_empty());
        server.shutdown().await;
    }

    #[cfg(feature = "integration")]
    #[tokio::test]
    async fn test_webhook_handshake_echoes_token() {
        let server = setup().await.expect("Failed to setup test server");
        let resp = server
            .state
            .http_client
            .get(format!(
                "{}/webhooks/aurinko?validationToken=echo-me",
                server.url()
            ))
            .send()
            .await
            .expect("handshake request failed");
        assert_eq!(resp.text().await.unwrap(), "echo-me");
        server.shutdown().await;
    }
}
