//! Pixelboard CLI
//!
//! Admin interface for the pixelboard store: bootstrap, inspection, and
//! direct pixel, user, and verification-token operations.

use anyhow::Result;
use clap::{Parser, Subcommand};

use pixelboard_core::Store;

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "pixelboard")]
#[command(about = "Pixelboard - shared million-pixel grid administration")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the store and bootstrap it (seeds the grid on first run)
    Init,
    /// Show store status and row counts
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Inspect or mutate pixels
    Pixel {
        #[command(subcommand)]
        command: PixelCommands,
    },
    /// Manage user accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Email-verification tokens
    Verify {
        #[command(subcommand)]
        command: VerifyCommands,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[derive(Subcommand)]
enum PixelCommands {
    /// Show a single pixel
    Show {
        /// Pixel id (0..1000000)
        id: i64,
    },
    /// Set a pixel's color and destination url
    Set {
        /// Pixel id (0..1000000)
        id: i64,
        /// Pixel color, e.g. "#123456"
        color: String,
        /// Destination url
        url: String,
        /// Act as this user, enforcing ownership
        #[arg(long)]
        user: Option<i64>,
    },
    /// Clear a pixel back to free
    Free {
        /// Pixel id (0..1000000)
        id: i64,
        /// Act as this user, enforcing ownership
        #[arg(long)]
        user: Option<i64>,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user account
    Create {
        /// Email address (unique)
        email: String,
        /// Pre-computed password hash
        password_hash: String,
    },
    /// Look up a user by email
    Show {
        /// Email address
        email: String,
    },
}

#[derive(Subcommand)]
enum VerifyCommands {
    /// Issue a fresh verification token for a user
    Issue {
        /// User id
        user_id: i64,
        /// Token validity window in hours
        #[arg(long, default_value_t = 24)]
        ttl_hours: i64,
    },
    /// Consume a verification token
    Consume {
        /// The token value
        token: String,
    },
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config inspection works without opening the store
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), &output);
    }

    let store = Store::open()?;

    match cli.command {
        Commands::Config { .. } => unreachable!(), // Handled above
        Commands::Init => commands::status::init(&store, &output),
        Commands::Status => commands::status::show(&store, &output),
        Commands::Pixel { command } => handle_pixel_command(command, &store, &output),
        Commands::User { command } => handle_user_command(command, &store, &output),
        Commands::Verify { command } => handle_verify_command(command, &store, &output),
    }
}

fn handle_pixel_command(command: PixelCommands, store: &Store, output: &Output) -> Result<()> {
    match command {
        PixelCommands::Show { id } => commands::pixel::show(store, id, output),
        PixelCommands::Set {
            id,
            color,
            url,
            user,
        } => commands::pixel::set(store, id, color, url, user, output),
        PixelCommands::Free { id, user } => commands::pixel::free(store, id, user, output),
    }
}

fn handle_user_command(command: UserCommands, store: &Store, output: &Output) -> Result<()> {
    match command {
        UserCommands::Create {
            email,
            password_hash,
        } => commands::user::create(store, email, password_hash, output),
        UserCommands::Show { email } => commands::user::show(store, email, output),
    }
}

fn handle_verify_command(command: VerifyCommands, store: &Store, output: &Output) -> Result<()> {
    match command {
        VerifyCommands::Issue { user_id, ttl_hours } => {
            commands::verify::issue(store, user_id, ttl_hours, output)
        }
        VerifyCommands::Consume { token } => commands::verify::consume(store, token, output),
    }
}

fn handle_config_command(command: Option<ConfigCommands>, output: &Output) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(output),
        Some(ConfigCommands::Set { key, value }) => commands::config::set(key, value, output),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
