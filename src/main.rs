use std::{process, sync::Arc, time::Duration};

use folio::{
    application::{
        auth::AuthService,
        error::AppError,
        feed::FeedService,
        follows::FollowService,
        forms::{FieldErrors, SignupFormInput},
        groups::{CreateGroupCommand, GroupService},
        posts::PostService,
        repos::{
            CommentsRepo, FollowsRepo, GroupsRepo, HealthRepo, PostsRepo, PostsWriteRepo,
            SessionsRepo, UsersRepo,
        },
    },
    cache::{CacheState, PageCache, clear_on_request},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
        uploads::UploadStorage,
    },
};
use tokio::signal;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const SESSION_PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
        config::Command::CreateUser(args) => run_create_user(settings, args).await,
        config::Command::CreateGroup(args) => run_create_group(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let http_state = build_http_state(repositories, &settings)?;

    let prune_handle = spawn_session_pruner(http_state.auth.clone());
    let reset_handle = http_state
        .cache
        .as_ref()
        .map(|cache| spawn_cache_reset(cache.store.clone()));
    let result = serve_http(&settings, http_state).await;

    prune_handle.abort();
    let _ = prune_handle.await;
    if let Some(handle) = reset_handle {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    // Connecting already applies pending migrations.
    init_repositories(&settings).await?;
    info!(target = "folio::migrate", "Migrations are up to date");
    Ok(())
}

async fn run_create_user(
    settings: config::Settings,
    args: config::CreateUserArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let users: Arc<dyn UsersRepo> = repositories.clone();
    let sessions: Arc<dyn SessionsRepo> = repositories;
    let auth = AuthService::new(users, sessions, settings.auth.session_ttl);

    let form = SignupFormInput {
        first_name: args.first_name,
        last_name: args.last_name,
        username: args.username,
        email: args.email,
        password1: args.password.clone(),
        password2: args.password,
    };
    let data = form
        .validate()
        .map_err(|errors| AppError::validation(describe_field_errors(&errors)))?;

    let user = auth.register(data).await?;
    info!(
        target = "folio::create_user",
        user_id = user.id,
        username = %user.username,
        "User created"
    );
    Ok(())
}

async fn run_create_group(
    settings: config::Settings,
    args: config::CreateGroupArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let groups: Arc<dyn GroupsRepo> = repositories;
    let service = GroupService::new(groups);

    let group = service
        .create(CreateGroupCommand {
            title: args.title,
            slug: args.slug,
            description: args.description,
        })
        .await?;
    info!(
        target = "folio::create_group",
        group_id = group.id,
        slug = %group.slug,
        "Group created"
    );
    Ok(())
}

fn describe_field_errors(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(field, messages)| format!("{field}: {}", messages.join(" ")))
        .collect::<Vec<_>>()
        .join("; ")
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_http_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<HttpState, AppError> {
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repositories.clone();
    let groups_repo: Arc<dyn GroupsRepo> = repositories.clone();
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let follows_repo: Arc<dyn FollowsRepo> = repositories.clone();
    let comments_repo: Arc<dyn CommentsRepo> = repositories.clone();
    let sessions_repo: Arc<dyn SessionsRepo> = repositories.clone();
    let health_repo: Arc<dyn HealthRepo> = repositories;

    let upload_storage = Arc::new(
        UploadStorage::new(settings.uploads.directory.clone())
            .map_err(|err| AppError::from(InfraError::from(err)))?,
    );

    let feed = Arc::new(FeedService::new(
        posts_repo.clone(),
        groups_repo.clone(),
        users_repo.clone(),
        follows_repo.clone(),
        settings.feed.page_size,
    ));
    let posts = Arc::new(PostService::new(
        posts_repo,
        posts_write_repo,
        groups_repo,
        comments_repo,
        upload_storage.clone(),
    ));
    let follows = Arc::new(FollowService::new(users_repo.clone(), follows_repo));
    let auth = Arc::new(AuthService::new(
        users_repo,
        sessions_repo,
        settings.auth.session_ttl,
    ));

    let cache = settings
        .cache
        .enabled
        .then(|| CacheState::new(Arc::new(PageCache::new(settings.cache.index_ttl))));

    let max_request_bytes = usize::try_from(settings.uploads.max_request_bytes.get())
        .map_err(|_| AppError::validation("uploads.max_request_bytes exceeds platform limits"))?;

    Ok(HttpState {
        feed,
        posts,
        follows,
        auth,
        health: health_repo,
        upload_storage,
        cache,
        secure_cookies: settings.auth.secure_cookies,
        max_request_bytes,
    })
}

fn spawn_session_pruner(auth: Arc<AuthService>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            match auth.prune_expired().await {
                Ok(0) => {}
                Ok(removed) => info!(
                    target = "folio::sessions",
                    removed, "Pruned expired sessions"
                ),
                Err(err) => warn!(
                    target = "folio::sessions",
                    error = %err,
                    "Failed to prune expired sessions"
                ),
            }
        }
    })
}

/// Clears the home page cache on every SIGHUP.
fn spawn_cache_reset(store: Arc<PageCache>) -> tokio::task::JoinHandle<()> {
    let (requests, pending) = tokio::sync::mpsc::channel(1);
    tokio::spawn(async move {
        let forward = async move {
            #[cfg(unix)]
            match signal::unix::signal(signal::unix::SignalKind::hangup()) {
                Ok(mut hangup) => {
                    while hangup.recv().await.is_some() {
                        // A full channel already holds a pending clear.
                        let _ = requests.try_send(());
                    }
                }
                Err(err) => {
                    warn!(target = "folio::cache", error = %err, "Failed to listen for SIGHUP");
                }
            }
            #[cfg(not(unix))]
            drop(requests);
        };
        tokio::join!(forward, clear_on_request(store, pending));
    })
}

async fn serve_http(settings: &config::Settings, http_state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(http_state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "folio::serve",
        addr = %settings.server.addr,
        "Listening for HTTP requests"
    );

    let grace = settings.server.graceful_shutdown;
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(grace))
        .await
        .map_err(|err| AppError::from(InfraError::Server(err.to_string())))?;

    info!(target = "folio::serve", "Server stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM, then arms a hard exit once `grace` elapses
/// so lingering connections cannot hold the process open.
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(target = "folio::serve", error = %err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(target = "folio::serve", error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(
        target = "folio::serve",
        grace_secs = grace.as_secs(),
        "Shutdown requested, draining connections"
    );
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!(target = "folio::serve", "Graceful shutdown timed out");
        process::exit(1);
    });
}
