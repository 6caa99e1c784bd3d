use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use user_service::{
    api::{AppState, UserUseCases, run_api_server},
    clients::{
        consumer::RabbitMqConsumer, database::DatabaseClient, health::HealthChecker,
        password::Argon2Hasher, publisher::RabbitMqPublisher,
    },
    config::Config,
    handlers::register_user_handlers,
    metrics::{METRICS_NAMESPACE, MetricsSink, PrometheusMetrics},
    usecases::{
        ports::{EventPublisher, PasswordHasher, UserRepository},
        service::UserService,
        user::{
            CreateUserUseCase, DeleteUserUseCase, GetUserUseCase, ListUsersUseCase,
            UpdateUserUseCase,
        },
    },
    utils::{connect_with_retry, init_tracing, shutdown_signal},
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;
    init_tracing(&config.app_env);

    // amqps:// needs a process-wide crypto provider; a second install is a no-op.
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!(
        app = %config.app_name,
        env = %config.app_env,
        "Starting user service"
    );

    let prometheus = Arc::new(PrometheusMetrics::new(METRICS_NAMESPACE)?);
    let metrics: Arc<dyn MetricsSink> = prometheus.clone();
    let retry_config = config.retry_config();

    let database = Arc::new(
        connect_with_retry(&retry_config, "database", || {
            DatabaseClient::connect(&config.database_url)
        })
        .await?,
    );
    database.ensure_schema().await?;

    let publisher = Arc::new(
        connect_with_retry(&retry_config, "publisher", || {
            RabbitMqPublisher::initialize_with_metrics(&config.rabbitmq_url, metrics.clone())
        })
        .await?,
    );

    let mut consumer = connect_with_retry(&retry_config, "consumer", || {
        RabbitMqConsumer::initialize_with(
            &config.rabbitmq_url,
            &config.consumer_queue_name,
            &config.consumer_routing_keys,
            config.consumer_options(),
        )
    })
    .await?
    .with_metrics(metrics.clone());
    register_user_handlers(&mut consumer);
    let consumer = Arc::new(consumer);

    let repo: Arc<dyn UserRepository> = database.clone();
    let events: Arc<dyn EventPublisher> = publisher.clone();
    let hasher: Arc<dyn PasswordHasher> = Arc::new(Argon2Hasher::default());
    let service = UserService::new(repo.clone());

    let state = Arc::new(AppState {
        health_checker: HealthChecker::new(
            database.clone(),
            publisher.clone(),
            Some(consumer.clone()),
        ),
        metrics: prometheus,
        users: UserUseCases {
            create: CreateUserUseCase::new(
                repo.clone(),
                service.clone(),
                events.clone(),
                hasher,
                metrics.clone(),
            ),
            get: GetUserUseCase::new(repo.clone(), metrics.clone()),
            list: ListUsersUseCase::new(repo.clone(), metrics.clone()),
            update: UpdateUserUseCase::new(repo.clone(), events.clone(), metrics.clone()),
            delete: DeleteUserUseCase::new(repo, service, events, metrics),
        },
    });

    let cancel = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown_signal();
        let cancel = cancel.clone();
        async move {
            shutdown.await;
            info!("Shutdown signal received");
            cancel.cancel();
        }
    });

    // A dead consumer leaves the HTTP side serving; /health reports it degraded.
    let consumer_task = tokio::spawn({
        let consumer = consumer.clone();
        let cancel = cancel.clone();
        async move {
            if let Err(e) = consumer.start(cancel).await {
                error!(error = %e, "Event consumer stopped, continuing without it");
            }
        }
    });

    let server_result = run_api_server(config.server_port, state, cancel.clone()).await;
    cancel.cancel();

    if let Err(e) = consumer_task.await {
        warn!(error = %e, "Consumer task did not finish cleanly");
    }
    if let Err(e) = consumer.close().await {
        warn!(error = %e, "Failed to close RabbitMQ consumer");
    }
    if let Err(e) = publisher.close().await {
        warn!(error = %e, "Failed to close RabbitMQ publisher");
    }

    server_result.map_err(|e| anyhow!("HTTP server failed: {}", e))?;

    info!("User service stopped");
    Ok(())
}
