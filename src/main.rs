use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use platform_guard::{app, db, docs};

#[derive(Parser, Debug)]
#[command(author, version, about = "RBAC and audit trail service", long_about = None)]
struct Cli {
    /// Port to listen on and to advertise in the OpenAPI document
    #[arg(long, env = "APP_PORT", default_value_t = 8000, global = true)]
    port: u16,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Apply pending migrations and exit
    Migrate,
    /// Print the OpenAPI document, or write it to a file
    Openapi {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cli.port).await,
        Commands::Migrate => {
            let pool = db::connect().await?;
            db::migrate(&pool).await?;
            tracing::info!("migrations applied");
            Ok(())
        }
        Commands::Openapi { output } => {
            let doc = docs::build_openapi(cli.port)?;
            let json = serde_json::to_string_pretty(&doc)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
                    tracing::info!(path = %path.display(), "OpenAPI document written");
                }
                None => println!("{json}"),
            }
            Ok(())
        }
    }
}

async fn serve(port: u16) -> anyhow::Result<()> {
    let pool = db::init().await?;
    let app = app::create_app(pool).await?;

    let openapi = docs::build_openapi(port)?;
    let app = app.merge(docs::swagger_routes(openapi)?);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
