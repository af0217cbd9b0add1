use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as _;
use postboard_client::{
    ApiContext, ApiError, ClientConfig, LogoutOutcome, PostInput, PostPage, RegisterRequest,
};
use tracing::{debug, error, info};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line client for the Postboard API
#[derive(Debug, clap::Parser)]
#[command(name = "postboard")]
#[command(version = postboard_client::VERSION)]
struct Cli {
    /// JSON configuration file
    #[arg(long, env = "POSTBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Log in and store the session
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "POSTBOARD_PASSWORD")]
        password: String,
    },

    /// Create an account and sign in
    Register {
        #[arg(long)]
        username: String,
        #[arg(long, env = "POSTBOARD_PASSWORD")]
        password: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },

    /// Show the logged-in user
    Whoami,

    /// Show whether a session is stored
    Status,

    /// Work with posts
    #[command(subcommand)]
    Posts(PostCommands),

    /// Revoke the refresh token and forget the session
    Logout,
}

#[derive(Debug, clap::Subcommand)]
enum PostCommands {
    /// List posts visible to you
    List,
    /// List every user's public posts
    Public,
    /// List your own posts
    Mine,
    /// Publish a post
    Create {
        content: String,
        #[arg(long)]
        hidden: bool,
    },
    /// Replace a post's content
    Update {
        id: u64,
        content: String,
        #[arg(long)]
        hidden: bool,
    },
    /// Delete a post
    Delete { id: u64 },
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if it exists
    let env_file_path = dotenvy::dotenv().ok();

    // Initialize the tracing subscriber for structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                "postboard_client=debug,postboard=debug,warn".into()
            } else {
                "postboard_client=info,postboard=info,warn".into()
            }
        }))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    match env_file_path {
        Some(path) => info!("Loaded environment variables from {}", path.display()),
        None => debug!("No .env file found. Using existing environment variables."),
    };

    if let Err(err) = run(Cli::parse()).await {
        error!(error = %format!("{:#}", err), "Command failed");
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ClientConfig::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    let ctx = ApiContext::from_config(config)
        .await
        .context("Failed to initialize client")?;

    match cli.command {
        Commands::Login { username, password } => {
            ctx.accounts
                .login(&username, &password)
                .await
                .map_err(explain)?;
            let user = ctx.accounts.fetch_user().await.map_err(explain)?;
            println!("Signed in as {}", user.username);
        }
        Commands::Register {
            username,
            password,
            email,
            first_name,
            last_name,
        } => {
            let request = RegisterRequest {
                username,
                password2: password.clone(),
                password,
                email,
                first_name,
                last_name,
            };
            let user = ctx
                .accounts
                .register_and_login(&request)
                .await
                .map_err(explain)?;
            println!("Registered {} <{}> and signed in", user.username, user.email);
        }
        Commands::Whoami => match ctx.accounts.ensure_user().await.map_err(explain)? {
            Some(user) => println!(
                "{} ({} {}) <{}>",
                user.username, user.first_name, user.last_name, user.email
            ),
            None => println!("Not signed in"),
        },
        Commands::Status => {
            let session = ctx.session.snapshot();
            println!(
                "phase: {:?}\naccess token: {}\nrefresh token: {}\nuser: {}",
                ctx.session.phase(),
                present(session.access.is_some()),
                present(session.refresh.is_some()),
                session
                    .user
                    .map(|u| u.username)
                    .unwrap_or_else(|| "-".to_string())
            );
        }
        Commands::Posts(command) => run_posts(&ctx, command).await?,
        Commands::Logout => match ctx.accounts.logout().await.map_err(explain)? {
            LogoutOutcome::Revoked => println!("Logged out"),
            LogoutOutcome::LocalOnly => println!("No active session, local state cleared"),
            LogoutOutcome::ServerFailed(e) => {
                println!("Logged out locally (server answered: {})", e)
            }
        },
    }

    Ok(())
}

async fn run_posts(ctx: &ApiContext, command: PostCommands) -> Result<()> {
    match command {
        PostCommands::List => print_page(&ctx.posts.list().await.map_err(explain)?),
        PostCommands::Public => print_page(&ctx.posts.list_public().await.map_err(explain)?),
        PostCommands::Mine => {
            let user = ctx
                .accounts
                .ensure_user()
                .await
                .map_err(explain)?
                .ok_or_else(|| explain(ApiError::Unauthenticated))?;
            print_page(&ctx.posts.list_for_user(user.id).await.map_err(explain)?);
        }
        PostCommands::Create { content, hidden } => {
            let post = ctx
                .posts
                .create(&PostInput { content, hidden })
                .await
                .map_err(explain)?;
            println!("Created post {}", post.id);
        }
        PostCommands::Update {
            id,
            content,
            hidden,
        } => {
            ctx.posts
                .update(id, &PostInput { content, hidden })
                .await
                .map_err(explain)?;
            println!("Updated post {}", id);
        }
        PostCommands::Delete { id } => {
            ctx.posts.delete(id).await.map_err(explain)?;
            println!("Deleted post {}", id);
        }
    }
    Ok(())
}

fn print_page(page: &PostPage) {
    println!("{} post(s)", page.count);
    for post in &page.results {
        let marker = if post.hidden { " [hidden]" } else { "" };
        println!("#{} {}{}: {}", post.id, post.author, marker, post.content);
    }
}

fn present(flag: bool) -> &'static str {
    if flag {
        "present"
    } else {
        "absent"
    }
}

/// Turn an API error into a message fit for the terminal
fn explain(err: ApiError) -> anyhow::Error {
    match &err {
        ApiError::Unauthenticated | ApiError::SessionExpired => {
            anyhow::anyhow!("{}. Run `postboard login` first.", err)
        }
        _ => match err.body() {
            Some(body) => anyhow::anyhow!("{}: {}", err, body),
            None => anyhow::Error::new(err),
        },
    }
}
