//! Drivebridge CLI
//!
//! Terminal viewer for drive files. Signs in with whatever the environment
//! allows (host assertion, cached account, browser sign-in) and then lists or
//! converts files.
//!
//! # Usage
//!
//! ```bash
//! # List the drive root
//! drivebridge list
//!
//! # Finish a browser sign-in started by the previous run
//! drivebridge --callback 'http://localhost:53682/callback?code=...&state=...' list
//!
//! # Convert a file to PDF
//! drivebridge convert 01ABCDEF --output report.pdf
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_stream::StreamExt;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

use drivebridge_core::{
    AttemptOutcome, AuthConfig, ByteStream, DriveViewer, FileRedirectStore, RedirectResponse, RedirectStore, Resolution,
    TargetFormat, ViewError, ViewState, strategy::print_opener,
};

#[derive(Parser)]
#[command(name = "drivebridge")]
#[command(about = "View and convert cloud-drive files with host single sign-on")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Callback URL the browser landed on after signing in
    #[arg(long, global = true, value_name = "URL")]
    callback: Option<String>,

    /// Print the debug log before exiting
    #[arg(long, global = true)]
    debug_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the files at the root of the drive
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Convert a file and save the result
    Convert {
        /// Drive item id
        id: String,

        /// Target format
        #[arg(short, long, default_value = "pdf")]
        format: TargetFormat,

        /// Output path (defaults to <ID>.<format>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resolve a token and show how it was obtained
    Status,

    /// Forget a browser sign-in that is still pending
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        FmtSubscriber::builder()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    }

    if let Commands::Reset = cli.command {
        return reset_pending_redirect();
    }

    let viewer = open_viewer(cli.callback.as_deref())?;

    let result = match cli.command {
        Commands::List { format } => list(&viewer, &format).await,
        Commands::Convert { id, format, output } => convert(&viewer, &id, format, output).await,
        Commands::Status => status(&viewer).await,
        Commands::Reset => Ok(()),
    };

    if cli.debug_log {
        eprintln!("\nDebug log:");
        for line in viewer.debug_log() {
            eprintln!("  {}", line);
        }
    }

    result
}

fn open_viewer(callback: Option<&str>) -> Result<DriveViewer> {
    let config = AuthConfig::load().context("Failed to load client configuration")?;
    let viewer = DriveViewer::from_config(config, print_opener())?;

    if let Some(callback) = callback {
        let response = RedirectResponse::from_callback_url(callback).context("Invalid --callback URL")?;
        viewer.engine().session().deliver_redirect_response(response);
    }

    Ok(viewer)
}

fn print_sign_in_instructions(url: &str) {
    println!("Sign-in continues in your browser:");
    println!();
    println!("    {}", url);
    println!();
    println!("When the browser lands on the callback page, copy its address and run");
    println!("the same command again with --callback '<address>'.");
}

async fn list(viewer: &DriveViewer, format: &str) -> Result<()> {
    match viewer.load().await {
        ViewState::Ready(entries) => {
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("The drive is empty.");
            } else {
                for entry in &entries {
                    let kind = if entry.folder { "dir " } else { "file" };
                    let size = entry.size.map(|s| s.to_string()).unwrap_or_default();
                    println!("{}  {:<40}  {:>10}  {}", kind, entry.name, size, entry.id);
                }
            }
            Ok(())
        }
        ViewState::AwaitingRedirect(url) => {
            print_sign_in_instructions(&url);
            Ok(())
        }
        ViewState::Failed(message) => bail!(message),
    }
}

async fn convert(viewer: &DriveViewer, id: &str, format: TargetFormat, output: Option<PathBuf>) -> Result<()> {
    let stream = match viewer.convert(id, format).await {
        Ok(stream) => stream,
        Err(ViewError::AwaitingRedirect { url }) => {
            print_sign_in_instructions(&url);
            return Ok(());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to convert {}", id)),
    };

    let path = output.unwrap_or_else(|| PathBuf::from(format!("{}.{}", id, format.extension())));
    let written = save_stream(stream, &path)
        .await
        .with_context(|| format!("Failed to convert {}", id))?;

    info!("Converted {} ({} bytes)", id, written);
    println!("Saved {} ({} bytes)", path.display(), written);
    Ok(())
}

/// Write `stream` to `path`.
///
/// Bytes land in `<path>.part` first and are renamed into place once the
/// stream ends, so an interrupted download never leaves a truncated file.
async fn save_stream(mut stream: ByteStream, path: &Path) -> Result<usize> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let mut file = tokio::fs::File::create(&partial)
        .await
        .with_context(|| format!("Failed to create {:?}", partial))?;

    let result = copy_stream(&mut stream, &mut file, &partial).await;
    drop(file);

    let written = match result {
        Ok(written) => written,
        Err(e) => {
            if let Err(remove) = tokio::fs::remove_file(&partial).await {
                tracing::warn!("Failed to remove {:?}: {}", partial, remove);
            }
            return Err(e);
        }
    };

    tokio::fs::rename(&partial, path)
        .await
        .with_context(|| format!("Failed to move {:?} to {:?}", partial, path))?;
    Ok(written)
}

async fn copy_stream(stream: &mut ByteStream, file: &mut tokio::fs::File, path: &Path) -> Result<usize> {
    let mut written = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Download interrupted")?;
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
        written += chunk.len();
    }
    file.flush().await?;
    Ok(written)
}

async fn status(viewer: &DriveViewer) -> Result<()> {
    let engine = viewer.engine();
    let resolution = engine.resolve_token().await;

    if let Some(environment) = engine.session().environment() {
        println!("Environment: {}", environment);
    }

    println!("Attempts:");
    for attempt in engine.attempts() {
        let outcome = match &attempt.outcome {
            AttemptOutcome::Success(_) => "success".to_string(),
            AttemptOutcome::Pending => "pending".to_string(),
            AttemptOutcome::Failure(reason) => format!("failed: {}", reason),
        };
        println!(
            "  {}  {:<20} {}",
            attempt.started_at.format("%H:%M:%S"),
            attempt.strategy.as_str(),
            outcome
        );
    }

    match resolution {
        Resolution::Token(token) => {
            println!("Signed in.");
            match token.expires_at {
                Some(expires_at) => println!("  Expires: {}", expires_at.to_rfc3339()),
                None => println!("  Expires: unknown"),
            }
            if !token.scopes.is_empty() {
                let scopes: Vec<&str> = token.scopes.iter().map(String::as_str).collect();
                println!("  Scopes:  {}", scopes.join(" "));
            }
            Ok(())
        }
        Resolution::Pending(ticket) => {
            print_sign_in_instructions(&ticket.authorization_url);
            Ok(())
        }
        Resolution::Failed(reason) => bail!(reason),
    }
}

fn reset_pending_redirect() -> Result<()> {
    let store = match AuthConfig::load().ok().and_then(|c| c.data_dir) {
        Some(dir) => FileRedirectStore::in_dir(&dir),
        None => FileRedirectStore::open()?,
    };

    if store.load()?.is_some() {
        store.clear()?;
        println!("Pending sign-in discarded.");
    } else {
        println!("No sign-in is pending.");
    }
    Ok(())
}
