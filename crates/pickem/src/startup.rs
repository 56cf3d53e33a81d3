use crate::{
    api::routes::{
        cancel_pick, create_matchup, create_squad, finalize_matchup, get_achievements,
        get_active_chain, get_active_pick, get_current_campaign, get_leaderboard, get_matchup,
        get_me, get_picks, get_transactions, health, join_squad, list_matchups, make_pick,
        register, rollover_campaign, update_matchup,
    },
    config::Settings,
    domain::{
        AchievementEvaluator, CampaignWatcher, JobDispatcher, JobSignal, SettlementWatcher,
        SquadAggregator, Sportsbook,
    },
    infra::{
        db::{DBConnection, DatabasePoolConfig},
        notifier::{LogNotifier, Notifier, WebhookNotifier},
    },
};
use anyhow::anyhow;
use axum::{
    body::Body,
    extract::{connect_info::IntoMakeServiceWithConnectInfo, ConnectInfo, Request},
    http::{Extensions, HeaderValue},
    middleware::{self, AddExtension, Next},
    response::IntoResponse,
    routing::{delete, get, post, put},
    serve::Serve,
    Router,
};
use hyper::{
    header::{HeaderName, ACCEPT, CONTENT_TYPE},
    Method,
};
use log::{error, info, warn};
use reqwest_middleware::{
    reqwest::{self, Client, Url},
    ClientBuilder, ClientWithMiddleware, Middleware,
};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::{collections::HashMap, net::SocketAddr, str::FromStr, sync::Arc, time::Duration};
use time::OffsetDateTime;
use tokio::signal::unix::{signal, SignalKind};
use tokio::{net::TcpListener, select, task::JoinHandle};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::cors::{AllowOrigin, CorsLayer};

pub struct Application {
    server: Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    cancellation_token: CancellationToken,
    background_tasks: TaskTracker,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let address = format!(
            "{}:{}",
            config.api_settings.domain, config.api_settings.port
        );
        let listener = SocketAddr::from_str(&address)?;
        let (app_state, background_tasks, cancellation_token) = build_app(config.clone()).await?;
        let server = build_server(listener, app_state, config.api_settings.origins).await?;
        Ok(Self {
            server,
            cancellation_token,
            background_tasks,
        })
    }

    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        info!("Starting server...");
        match self.server.with_graceful_shutdown(shutdown_signal()).await {
            Ok(_) => {
                info!("Server shutdown initiated");
                self.cancellation_token.cancel();

                let timeout = tokio::time::sleep(Duration::from_secs(10));
                select! {
                    _ = self.background_tasks.wait() => {
                        info!("Background tasks completed gracefully");
                    }
                    _ = timeout => {
                        warn!("Background tasks timed out during shutdown");
                    }
                }

                info!("Shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("Server shutdown error: {}", e);
                self.cancellation_token.cancel();

                let _ =
                    tokio::time::timeout(Duration::from_secs(5), self.background_tasks.wait())
                        .await;

                Err(anyhow!("Error during server shutdown: {}", e))
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sportsbook: Arc<Sportsbook>,
    /// Header carrying the external user id from the auth proxy
    pub identity_header: String,
    /// Shared secret guarding operator routes, none refuses them all
    pub admin_key: Option<String>,
    pub admin_header: String,
    pub starting_coins: i64,
    pub background_threads: Arc<HashMap<String, JoinHandle<()>>>,
}

pub async fn build_app(
    config: Settings,
) -> Result<(AppState, TaskTracker, CancellationToken), anyhow::Error> {
    std::fs::create_dir_all(&config.db_settings.data_folder)
        .map_err(|e| anyhow!("Failed to create data folder: {}", e))?;

    let pool_config: DatabasePoolConfig = config.db_settings.clone().into();
    let pickem_db = DBConnection::new(&config.db_settings.data_folder, "pickem", pool_config)
        .await
        .map_err(|e| anyhow!("Error setting up pickem db: {}", e))?;

    let notifier: Arc<dyn Notifier> = match &config.notification_settings.webhook_url {
        Some(url) => {
            let url = Url::parse(url).map_err(|e| anyhow!("Failed to parse webhook url: {}", e))?;
            let client = build_reqwest_client(Duration::from_secs(
                config.notification_settings.timeout_secs,
            ))?;
            info!("Webhook notifier configured for {}", url);
            Arc::new(WebhookNotifier::new(client, url))
        }
        None => {
            info!("No webhook configured, settled picks will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let (job_signal, job_wake) = JobSignal::new();
    let sportsbook = Arc::new(Sportsbook::new(pickem_db, job_signal));
    let pending_jobs = sportsbook.jobs.count().await?;
    if pending_jobs > 0 {
        info!("Resuming {} side-effect jobs left from the last run", pending_jobs);
    }

    let campaign = sportsbook.ensure_campaign(OffsetDateTime::now_utc()).await?;
    info!(
        "Active campaign {} runs until {}",
        campaign.name, campaign.end_time
    );

    let tracker = TaskTracker::new();
    let mut threads = HashMap::new();
    let cancel_token = CancellationToken::new();

    let achievements: Arc<dyn AchievementEvaluator> =
        Arc::new(sportsbook.achievements.clone());
    let squads: Arc<dyn SquadAggregator> = Arc::new(sportsbook.squads.clone());
    let dispatcher = JobDispatcher::new(
        sportsbook.jobs.clone(),
        job_wake,
        notifier,
        achievements,
        squads,
        Duration::from_secs(config.pickem_settings.job_poll_interval_secs),
        config.pickem_settings.job_max_attempts,
        cancel_token.clone(),
    );
    let dispatcher_task = tracker.spawn(async move {
        match dispatcher.run().await {
            Ok(_) => info!("Successfully shutdown job dispatcher"),
            Err(e) => error!("Error in job dispatcher: {}", e),
        }
    });
    threads.insert(String::from("job_dispatcher"), dispatcher_task);

    let settlement_watcher = SettlementWatcher::new(
        sportsbook.clone(),
        cancel_token.clone(),
        Duration::from_secs(config.pickem_settings.settlement_interval_secs),
    );
    let settlement_task = tracker.spawn(async move {
        match settlement_watcher.watch().await {
            Ok(_) => info!("Successfully shutdown settlement watcher"),
            Err(e) => error!("Error in settlement watcher: {}", e),
        }
    });
    threads.insert(String::from("settlement_watcher"), settlement_task);

    let campaign_watcher = CampaignWatcher::new(
        sportsbook.clone(),
        cancel_token.clone(),
        Duration::from_secs(config.pickem_settings.campaign_check_interval_secs),
    );
    let campaign_task = tracker.spawn(async move {
        match campaign_watcher.watch().await {
            Ok(_) => info!("Successfully shutdown campaign watcher"),
            Err(e) => error!("Error in campaign watcher: {}", e),
        }
    });
    threads.insert(String::from("campaign_watcher"), campaign_task);

    tracker.close();

    let app_state = AppState {
        sportsbook,
        identity_header: config.pickem_settings.identity_header,
        admin_key: config.pickem_settings.admin_key,
        admin_header: config.pickem_settings.admin_header,
        starting_coins: config.pickem_settings.starting_coins,
        background_threads: Arc::new(threads),
    };
    Ok((app_state, tracker, cancel_token))
}

pub async fn build_server(
    socket_addr: SocketAddr,
    app_state: AppState,
    origins: Vec<String>,
) -> Result<
    Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    anyhow::Error,
> {
    let listener = TcpListener::bind(socket_addr).await?;

    info!("Setting up service");
    let app = app(app_state, origins);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    info!(
        "Service running @: http://{}:{}",
        socket_addr.ip(),
        socket_addr.port()
    );
    Ok(server)
}

pub fn app(app_state: AppState, origins: Vec<String>) -> Router {
    let origins: Vec<HeaderValue> = origins
        .into_iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let mut allowed_headers = vec![ACCEPT, CONTENT_TYPE];
    allowed_headers.extend(
        [&app_state.identity_header, &app_state.admin_header]
            .into_iter()
            .filter_map(|header| header.parse::<HeaderName>().ok()),
    );

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(allowed_headers)
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true);

    let users_endpoints = Router::new()
        .route("/register", post(register))
        .route("/me", get(get_me))
        .route("/me/transactions", get(get_transactions))
        .route("/me/achievements", get(get_achievements))
        .route("/me/squad", put(join_squad));

    let matchup_endpoints = Router::new()
        .route("/", get(list_matchups).post(create_matchup))
        .route("/{matchup_id}", get(get_matchup).put(update_matchup))
        .route("/{matchup_id}/finalize", post(finalize_matchup));

    let pick_endpoints = Router::new()
        .route("/", get(get_picks).post(make_pick))
        .route("/active", get(get_active_pick))
        .route("/{pick_id}", delete(cancel_pick));

    let campaign_endpoints = Router::new()
        .route("/current", get(get_current_campaign))
        .route("/current/leaderboard", get(get_leaderboard))
        .route("/rollover", post(rollover_campaign));

    Router::new()
        .route("/api/v1/health_check", get(health))
        .route("/api/v1/chains/active", get(get_active_chain))
        .route("/api/v1/squads", post(create_squad))
        .nest("/api/v1/users", users_endpoints)
        .nest("/api/v1/matchups", matchup_endpoints)
        .nest("/api/v1/picks", pick_endpoints)
        .nest("/api/v1/campaigns", campaign_endpoints)
        .layer(middleware::from_fn(log_request))
        .with_state(Arc::new(app_state))
        .layer(cors)
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default()
        .to_string();
    let method = request.method().clone();
    info!(target: "http_request", "new request, {} {}", method.as_str(), path);

    let response = next.run(request).await;
    let response_time = OffsetDateTime::now_utc() - now;
    info!(
        target: "http_response",
        "response, {} {} code: {}, time: {}",
        method.as_str(),
        path,
        response.status().as_str(),
        response_time
    );

    response
}

pub fn build_reqwest_client(timeout: Duration) -> Result<ClientWithMiddleware, anyhow::Error> {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| anyhow!("Failed to build http client: {}", e))?;
    Ok(ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .with(LoggingMiddleware)
        .build())
}

struct LoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let method = req.method().clone();
        let url = req.url().clone();

        info!("Making {} request to: {}", method, url);

        let result = next.run(req, extensions).await;

        match &result {
            Ok(response) => {
                info!("{} {} -> Status: {}", method, url, response.status());
            }
            Err(error) => {
                warn!("{} {} -> Error: {:?}", method, url, error);
            }
        }

        result
    }
}

async fn shutdown_signal() {
    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to install signal handlers: {}", e);
            return std::future::pending().await;
        }
    };

    select! {
        _ = sigint.recv() => info!("Received SIGINT signal"),
        _ = sigterm.recv() => info!("Received SIGTERM signal"),
    }
}
