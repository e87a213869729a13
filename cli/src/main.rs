use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use moa::net::types::{Credentials, EntityId, Product};
use moa::state::admin_products::{AdminProducts, ProductQuery};
use moa::state::cart::Cart;
use moa::state::orders::{self, LocalOrders};
use moa::state::wishlist::Wishlist;
use moa::{ApiConfig, ApiError, AuthStatus, FileStore, RegisterOutcome, Session, SessionError, StateError};
use serde_json::{Value, json};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("not signed in; run `moa login` first")]
    NotSignedIn,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "moa", about = "MOA storefront API CLI")]
struct Cli {
    /// Overrides `API_BASE_URL`.
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long, env = "MOA_STATE_FILE", default_value = ".moa-session.json")]
    state_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "MOA_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Register {
        /// Registration body as a JSON object.
        #[arg(long)]
        data: String,
    },
    Logout,
    Whoami,
    Cart(CartCommand),
    Wishlist(WishlistCommand),
    Orders(OrdersCommand),
    Admin(AdminCommand),
}

#[derive(Args, Debug)]
struct CartCommand {
    #[command(subcommand)]
    command: CartSubcommand,
}

#[derive(Subcommand, Debug)]
enum CartSubcommand {
    List,
    Add(ProductArgs),
    Remove { product_id: String },
    Update { product_id: String, quantity: u32 },
    Clear,
}

#[derive(Args, Debug)]
struct ProductArgs {
    product_id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    price: Option<f64>,
}

impl ProductArgs {
    fn product(&self) -> Product {
        let mut product = Product::new(self.product_id.as_str());
        product.name.clone_from(&self.name);
        product.price = self.price;
        product
    }
}

#[derive(Args, Debug)]
struct WishlistCommand {
    #[command(subcommand)]
    command: WishlistSubcommand,
}

#[derive(Subcommand, Debug)]
enum WishlistSubcommand {
    List,
    Toggle(ProductArgs),
    Remove { product_id: String },
}

#[derive(Args, Debug)]
struct OrdersCommand {
    #[command(subcommand)]
    command: OrdersSubcommand,
}

#[derive(Subcommand, Debug)]
enum OrdersSubcommand {
    /// Orders stored on the server for the signed-in user.
    Mine,
    /// Orders recorded on this machine.
    Local,
    /// Record a checkout response locally.
    Save {
        #[arg(long)]
        data: String,
    },
    ClearLocal,
}

#[derive(Args, Debug)]
struct AdminCommand {
    #[command(subcommand)]
    command: AdminSubcommand,
}

#[derive(Subcommand, Debug)]
enum AdminSubcommand {
    List {
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = false)]
        low_stock: bool,
    },
    Create {
        #[arg(long)]
        data: String,
    },
    Update {
        product_id: String,
        #[arg(long)]
        data: String,
    },
    Delete {
        product_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ApiConfig::from_env();
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url);
    }
    let session = Session::new(config, Arc::new(FileStore::new(cli.state_file)))?;

    match cli.command {
        Command::Login { email, password } => {
            let user = session.login(&Credentials { email, password }).await?;
            print_json(&json!(user))
        }
        Command::Register { data } => match session.register(&parse_json(&data)?).await? {
            RegisterOutcome::SignedIn(user) => print_json(&json!({ "signed_in": true, "user": user })),
            RegisterOutcome::Registered(user) => print_json(&json!({ "signed_in": false, "user": user })),
        },
        Command::Logout => {
            session.logout();
            println!("signed out");
            Ok(())
        }
        Command::Whoami => {
            let user = ensure_signed_in(&session).await?;
            print_json(&json!(user))
        }
        Command::Cart(cart) => run_cart(&session, cart).await,
        Command::Wishlist(wishlist) => run_wishlist(&session, wishlist).await,
        Command::Orders(orders) => run_orders(&session, orders).await,
        Command::Admin(admin) => run_admin(&session, admin).await,
    }
}

/// Revalidate a restored session before using it.
async fn ensure_signed_in(session: &Session) -> Result<Value, CliError> {
    if session.status() == AuthStatus::Loading {
        if let Err(e) = session.hydrate().await {
            warn!(error = %e, "stored session could not be restored");
        }
    }
    session.user().map(|user| json!(user)).ok_or(CliError::NotSignedIn)
}

async fn run_cart(session: &Session, cart: CartCommand) -> Result<(), CliError> {
    ensure_signed_in(session).await?;
    let model = Cart::new(session.clone());
    match cart.command {
        CartSubcommand::List => {
            model.sync().await?;
        }
        CartSubcommand::Add(args) => model.add(&args.product()).await?,
        CartSubcommand::Remove { product_id } => model.remove(&EntityId::from(product_id.as_str())).await?,
        CartSubcommand::Update { product_id, quantity } => {
            model.update_quantity(&EntityId::from(product_id.as_str()), quantity).await?;
        }
        CartSubcommand::Clear => model.clear().await?,
    }
    print_json(&json!({ "items": model.items(), "total": model.total() }))
}

async fn run_wishlist(session: &Session, wishlist: WishlistCommand) -> Result<(), CliError> {
    ensure_signed_in(session).await?;
    let model = Wishlist::new(session.clone());
    match wishlist.command {
        WishlistSubcommand::List => {
            model.sync().await?;
        }
        WishlistSubcommand::Toggle(args) => {
            let added = model.toggle(&args.product()).await?;
            eprintln!("{}", if added { "added" } else { "removed" });
        }
        WishlistSubcommand::Remove { product_id } => model.remove(&EntityId::from(product_id.as_str())).await?,
    }
    print_json(&json!({ "items": model.items() }))
}

async fn run_orders(session: &Session, cmd: OrdersCommand) -> Result<(), CliError> {
    let local = LocalOrders::new(session.store());
    match cmd.command {
        OrdersSubcommand::Mine => {
            ensure_signed_in(session).await?;
            let items = orders::fetch_mine(session).await?;
            print_json(&json!({ "items": items }))
        }
        OrdersSubcommand::Local => print_json(&json!(local.all())),
        OrdersSubcommand::Save { data } => {
            let order = local.save(&parse_json(&data)?);
            print_json(&json!(order))
        }
        OrdersSubcommand::ClearLocal => {
            local.clear();
            println!("cleared");
            Ok(())
        }
    }
}

async fn run_admin(session: &Session, admin: AdminCommand) -> Result<(), CliError> {
    ensure_signed_in(session).await?;
    let products = AdminProducts::new(session.clone());
    match admin.command {
        AdminSubcommand::List { page, limit, search, status, low_stock } => {
            let query = ProductQuery { page, limit, search, status, only_low_stock: low_stock };
            let page = products.list(&query).await?;
            print_json(&json!({ "items": page.items, "total": page.total }))
        }
        AdminSubcommand::Create { data } => {
            let created = products.create(&parse_json(&data)?).await?;
            print_json(&created)
        }
        AdminSubcommand::Update { product_id, data } => {
            let updated = products.update(&EntityId::from(product_id.as_str()), &parse_json(&data)?).await?;
            print_json(&updated)
        }
        AdminSubcommand::Delete { product_id } => {
            products.remove(&EntityId::from(product_id.as_str())).await?;
            println!("deleted");
            Ok(())
        }
    }
}

fn parse_json(raw: &str) -> Result<Value, CliError> {
    Ok(serde_json::from_str::<Value>(raw)?)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
