//! mysite - web server and management commands

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mysite::{
    api::{self, AppState},
    config::Config,
    db,
    models::{CreateUserInput, Price, PriceStats, UserFlags},
};

#[derive(Parser)]
#[command(name = "mysite")]
#[command(about = "Blog, shop and account management site")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web server (default)
    Serve,
    /// Create sample authors, categories, tags and articles
    SeedBlog,
    /// Print product price statistics and order totals
    Aggregate,
    /// Create sample smartphones and discount every smartphone
    BulkDiscount,
    /// Get or create an order with every active product
    CreateOrder {
        #[arg(long, default_value = "Nick")]
        username: String,
        #[arg(long, default_value = "123 Main st")]
        address: String,
        #[arg(long, default_value = "BLACKFRIDAY")]
        promocode: String,
    },
    /// Import products from a CSV file
    ImportProducts { file: PathBuf },
    /// Import orders from a CSV file
    ImportOrders { file: PathBuf },
    /// Create a user account
    CreateUser {
        username: String,
        password: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long)]
        staff: bool,
        #[arg(long)]
        superuser: bool,
        /// Permission codename to grant, e.g. shopapp.add_product
        #[arg(long = "perm")]
        perms: Vec<String>,
    },
    /// Delete expired login sessions
    PurgeSessions,
}

fn describe_price(price: Option<Price>) -> String {
    price.map(|p| p.to_string()).unwrap_or_else(|| "None".to_string())
}

fn print_stats(label: &str, stats: &PriceStats) {
    println!(
        "{}: avg={}, count={}, max={}, min={}, sum={}",
        label,
        describe_price(stats.avg),
        stats.count,
        describe_price(stats.max),
        describe_price(stats.min),
        describe_price(stats.sum),
    );
}

async fn serve(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mysite=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Config::load_with_env(Path::new(&cli.config))?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database).await?;
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database ready ({} migrations applied)", applied);

    let state = AppState::new(pool, config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(state).await?,
        Commands::SeedBlog => {
            let report = state.blog_service.seed().await?;
            println!(
                "Seeded {} authors, {} categories, {} tags, {} articles",
                report.authors, report.categories, report.tags, report.articles
            );
        }
        Commands::Aggregate => {
            print_stats("All products", &state.product_service.price_stats(None).await?);
            print_stats(
                "Smartphones",
                &state.product_service.price_stats(Some("Smartphone")).await?,
            );
            for total in state.order_service.totals().await? {
                println!(
                    "Order #{}; Number of products: {}; Total worth: ${}.",
                    total.order_id, total.product_count, total.total
                );
            }
        }
        Commands::BulkDiscount => {
            let (created, updated) = state.product_service.bulk_discount(1).await?;
            println!("Created {} products", created.len());
            println!("{}", updated);
        }
        Commands::CreateOrder { username, address, promocode } => {
            let (order, created) = state
                .order_service
                .create_for_username(&username, &address, &promocode)
                .await?;
            println!(
                "{} order #{} with {} products",
                if created { "Created" } else { "Updated" },
                order.id,
                order.product_ids.len()
            );
        }
        Commands::ImportProducts { file } => {
            let data = tokio::fs::read(&file).await?;
            let products = state.product_service.import_csv(&data).await?;
            println!("Imported {} products", products.len());
        }
        Commands::ImportOrders { file } => {
            let data = tokio::fs::read(&file).await?;
            let orders = state.order_service.import_csv(&data).await?;
            println!("Imported {} orders", orders.len());
        }
        Commands::CreateUser { username, password, email, staff, superuser, perms } => {
            let user = state
                .user_service
                .create_user(CreateUserInput {
                    username,
                    password,
                    email,
                    flags: UserFlags { is_staff: staff, is_superuser: superuser },
                })
                .await?;
            for perm in &perms {
                state.user_service.grant_permission(user.id, perm).await?;
            }
            println!("Created user {} (id {})", user.username, user.id);
        }
        Commands::PurgeSessions => {
            let removed = state.user_service.purge_expired_sessions().await?;
            println!("Removed {} expired sessions", removed);
        }
    }

    Ok(())
}
