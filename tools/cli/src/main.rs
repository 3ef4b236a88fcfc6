//! ImageHost CLI - Command line interface for media uploads.
//!
//! This tool uploads images and videos to the configured cloud storage
//! backend and prints shareable links for them.

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use imagehost_common::{Error, FileCategory, MediaFile, ProviderId};
use imagehost_storage::{
    CredentialRecord, FileConfigStore, ProgressEvent, ProgressFn, ProviderRegistry,
    ReqwestTransport, UploadHistory, UploadResult,
};

/// Overrides the default configuration directory.
const CONFIG_DIR_ENV: &str = "IMAGEHOST_CONFIG_DIR";

#[derive(Parser)]
#[command(name = "imagehost")]
#[command(about = "ImageHost - Upload media to cloud storage and share links")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List storage providers and their connection state.
    Providers,

    /// Select the provider that receives uploads.
    Use {
        /// Provider id (github, googledrive, onedrive, dropbox).
        provider: String,
    },

    /// Show a provider's settings.
    Show {
        /// Provider id.
        provider: ProviderId,
    },

    /// Open the web page where a provider token is created.
    Login {
        /// Provider id.
        provider: ProviderId,
    },

    /// Save credentials for a provider, replacing any existing ones.
    Configure {
        /// Provider id.
        provider: ProviderId,

        /// Access token. Prompted for when omitted.
        #[arg(long)]
        token: Option<String>,

        /// Repository owner (GitHub).
        #[arg(long)]
        owner: Option<String>,

        /// Repository name (GitHub).
        #[arg(long)]
        repo: Option<String>,

        #[command(flatten)]
        settings: SettingArgs,
    },

    /// Change optional settings of a configured provider.
    Settings {
        /// Provider id.
        provider: ProviderId,

        #[command(flatten)]
        settings: SettingArgs,
    },

    /// Forget a provider's credentials.
    Disconnect {
        /// Provider id.
        provider: ProviderId,
    },

    /// Check the GitHub token against the configured repository.
    Test,

    /// Upload files to the active provider.
    Upload {
        /// Files to upload.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show recent uploads.
    History {
        /// Delete the history instead.
        #[arg(long)]
        clear: bool,

        /// Number of entries to show.
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Print shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

/// Optional settings shared by `configure` and `settings`.
#[derive(Args, Default)]
struct SettingArgs {
    /// Folder to upload into (GitHub, OneDrive, Dropbox).
    #[arg(long)]
    path: Option<String>,

    /// Branch to commit to (GitHub).
    #[arg(long)]
    branch: Option<String>,

    /// Folder ID to upload into (Google Drive).
    #[arg(long)]
    folder_id: Option<String>,
}

impl SettingArgs {
    fn entries(&self) -> [(&'static str, Option<&String>); 3] {
        [
            ("path", self.path.as_ref()),
            ("branch", self.branch.as_ref()),
            ("folderId", self.folder_id.as_ref()),
        ]
    }
}

/// Locations of the files the CLI keeps.
#[derive(Debug, PartialEq, Eq)]
struct Paths {
    config: PathBuf,
    history: PathBuf,
}

impl Paths {
    /// `--config` wins, then `IMAGEHOST_CONFIG_DIR`, then the platform
    /// config directory. History lives next to the config file.
    fn resolve(config_flag: Option<PathBuf>, env_dir: Option<PathBuf>) -> Self {
        let config = config_flag.unwrap_or_else(|| {
            env_dir
                .unwrap_or_else(|| {
                    dirs::config_dir()
                        .unwrap_or_else(|| PathBuf::from("."))
                        .join("imagehost")
                })
                .join("config.json")
        });
        let history = config
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("history.json");
        Self { config, history }
    }
}

/// Everything a command may need.
struct App {
    registry: ProviderRegistry,
    history: UploadHistory,
}

impl App {
    fn open(paths: &Paths) -> Result<Self> {
        debug!("Config file: {}", paths.config.display());

        let store = Arc::new(FileConfigStore::new(&paths.config));
        let transport = Arc::new(ReqwestTransport::new().context("Failed to create HTTP client")?);

        Ok(Self {
            registry: ProviderRegistry::new(store, transport),
            history: UploadHistory::new(&paths.history),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "imagehost", &mut std::io::stdout());
        return Ok(());
    }

    let paths = Paths::resolve(cli.config, std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from));
    let app = App::open(&paths)?;

    match cli.command {
        Commands::Providers => cmd_providers(&app),

        Commands::Use { provider } => cmd_use(&app, &provider),

        Commands::Show { provider } => cmd_show(&app, provider),

        Commands::Login { provider } => cmd_login(&app, provider),

        Commands::Configure {
            provider,
            token,
            owner,
            repo,
            settings,
        } => cmd_configure(&app, provider, token, owner, repo, &settings),

        Commands::Settings { provider, settings } => cmd_settings(&app, provider, &settings),

        Commands::Disconnect { provider } => cmd_disconnect(&app, provider),

        Commands::Test => cmd_test(&app).await,

        Commands::Upload { files } => cmd_upload(&app, &files).await,

        Commands::History { clear, limit } => cmd_history(&app, clear, limit).await,

        Commands::Completions { .. } => Ok(()),
    }
}

/// Attach a next step to configuration errors.
fn with_hint(err: Error, provider: ProviderId) -> anyhow::Error {
    if err.is_configuration() {
        anyhow::anyhow!(
            "{}\nRun `imagehost configure {}` to set it up.",
            err,
            provider
        )
    } else {
        err.into()
    }
}

/// List providers.
fn cmd_providers(app: &App) -> Result<()> {
    let active = app.registry.active_id();

    println!("Storage providers:");
    for provider in app.registry.providers() {
        let marker = if provider.id() == active { "*" } else { " " };
        let state = if provider.is_connected() {
            "connected"
        } else {
            "not configured"
        };
        println!(
            "{} {:<12} {:<13} {}",
            marker,
            provider.id(),
            provider.display_name(),
            state
        );
    }

    Ok(())
}

/// Switch the active provider.
fn cmd_use(app: &App, provider: &str) -> Result<()> {
    if !app
        .registry
        .set_active(provider)
        .context("Failed to save provider selection")?
    {
        anyhow::bail!(
            "Unknown provider '{}'. Use one of: {}",
            provider,
            ProviderId::ALL.map(|p| p.as_str()).join(", ")
        );
    }

    let active = app.registry.active();
    println!("Now uploading to {}", active.display_name());
    if !active.is_connected() {
        println!("Note: {} is not configured yet.", active.display_name());
    }

    Ok(())
}

/// Show a provider's settings.
fn cmd_show(app: &App, provider: ProviderId) -> Result<()> {
    let form = app.registry.get(provider).config_form();

    println!("{}", form.title);
    println!(
        "  Status: {}",
        if form.connected { "connected" } else { "not configured" }
    );
    println!("  Token page: {}", form.token_page_url);
    for field in &form.fields {
        let value = match (&field.value, field.default) {
            (Some(value), _) => value.clone(),
            (None, Some(default)) => format!("{} (default)", default),
            (None, None) if field.required => "(required, not set)".to_string(),
            (None, None) => "(not set)".to_string(),
        };
        println!("  {} [{}]: {}", field.label, field.key, value);
    }

    Ok(())
}

/// Open the token page in a browser.
fn cmd_login(app: &App, provider: ProviderId) -> Result<()> {
    let url = app.registry.get(provider).token_page_url();
    info!("Opening {} token page", provider.display_name());

    println!("Create a token at: {}", url);
    if let Err(e) = open::that(url) {
        warn!("Could not open a browser: {}", e);
    }
    println!(
        "Then run `imagehost configure {} --token <TOKEN>`.",
        provider
    );

    Ok(())
}

/// Build the credential record for `configure`, keeping only keys the
/// provider understands.
fn credential_record(
    provider: ProviderId,
    token: String,
    owner: Option<String>,
    repo: Option<String>,
    settings: &SettingArgs,
) -> CredentialRecord {
    let token_key = match provider {
        ProviderId::GitHub => "token",
        _ => "accessToken",
    };

    let mut record = CredentialRecord::new().with(token_key, token);
    let optional = [("owner", owner.as_ref()), ("repo", repo.as_ref())];
    for (key, value) in optional.into_iter().chain(settings.entries()) {
        if let Some(value) = value {
            record.set(key, value.as_str());
        }
    }
    record
}

/// Save credentials.
fn cmd_configure(
    app: &App,
    provider: ProviderId,
    token: Option<String>,
    owner: Option<String>,
    repo: Option<String>,
    settings: &SettingArgs,
) -> Result<()> {
    let token = match token {
        Some(token) => token,
        None => rpassword::prompt_password(format!("{} access token: ", provider.display_name()))
            .context("Failed to read token")?,
    };

    let known: Vec<&str> = app.registry.get(provider).fields().iter().map(|f| f.key).collect();
    let record: CredentialRecord = credential_record(provider, token, owner, repo, settings)
        .iter()
        .filter(|(key, _)| {
            let keep = known.contains(key);
            if !keep {
                warn!("{} has no '{}' setting, ignoring it", provider.display_name(), key);
            }
            keep
        })
        .collect();

    app.registry
        .save_credentials(provider, record)
        .context("Failed to save credentials")?;

    println!("{} configuration saved.", provider.display_name());
    if app.registry.active_id() != provider {
        println!("Run `imagehost use {}` to upload there.", provider);
    }

    Ok(())
}

/// Change optional settings.
fn cmd_settings(app: &App, provider: ProviderId, settings: &SettingArgs) -> Result<()> {
    let changes: CredentialRecord = settings
        .entries()
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v.as_str())))
        .collect();

    if changes.is_empty() {
        anyhow::bail!("Nothing to change. Pass --path, --branch or --folder-id.");
    }

    app.registry
        .update_settings(provider, changes)
        .context("Failed to save settings")?;

    println!("{} settings saved.", provider.display_name());
    Ok(())
}

/// Forget credentials.
fn cmd_disconnect(app: &App, provider: ProviderId) -> Result<()> {
    app.registry
        .disconnect(provider)
        .context("Failed to remove credentials")?;

    println!("Disconnected {}.", provider.display_name());
    Ok(())
}

/// Test the GitHub connection.
async fn cmd_test(app: &App) -> Result<()> {
    info!("Testing GitHub connection");

    let repo = app
        .registry
        .github()
        .test_connection()
        .await
        .map_err(|e| with_hint(e, ProviderId::GitHub))?;

    println!("Connection successful!");
    println!("  Repository: {}", repo.full_name);
    println!("  Default branch: {}", repo.default_branch);

    Ok(())
}

/// Upload one file and record it in the history.
async fn upload_one(app: &App, path: &Path) -> Result<UploadResult> {
    let file = MediaFile::from_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let name = file.name.clone();
    let progress = move |event: ProgressEvent| {
        debug!("{}: {}% {}", name, event.percent, event.label);
    };
    let progress: &ProgressFn = &progress;

    let result = app
        .registry
        .dispatch_upload(&file, Some(progress))
        .await
        .map_err(|e| with_hint(e, app.registry.active_id()))?;

    if let Err(e) = app.history.record(&result, file.category()).await {
        warn!("Could not update history: {}", e);
    }

    Ok(result)
}

fn print_result(path: &Path, result: &UploadResult) {
    println!("{} -> {}", path.display(), result.file_name);
    println!("  URL:      {}", result.preview_url());
    if result.accelerated_url.is_some() {
        println!("  Raw:      {}", result.direct_url);
    }
    println!("  Markdown: {}", result.links.markdown);
    println!("  HTML:     {}", result.links.html);
    if result.direct_url.is_empty() {
        println!("  (no public link could be created)");
    }
}

/// Upload files concurrently.
async fn cmd_upload(app: &App, files: &[PathBuf]) -> Result<()> {
    let provider = app.registry.active();
    if !provider.is_connected() {
        return Err(with_hint(
            Error::NotConfigured {
                provider: provider.display_name().to_string(),
            },
            provider.id(),
        ));
    }

    info!(
        "Uploading {} file(s) to {}",
        files.len(),
        provider.display_name()
    );

    let outcomes = join_all(files.iter().map(|path| upload_one(app, path))).await;

    let mut failed = 0;
    for (path, outcome) in files.iter().zip(outcomes) {
        match outcome {
            Ok(result) => print_result(path, &result),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {:#}", path.display(), e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} uploads failed", failed, files.len());
    }

    Ok(())
}

/// Show or clear the history.
async fn cmd_history(app: &App, clear: bool, limit: usize) -> Result<()> {
    if clear {
        app.history.clear().await.context("Failed to clear history")?;
        println!("History cleared.");
        return Ok(());
    }

    let entries = app.history.entries().await.context("Failed to read history")?;
    if entries.is_empty() {
        println!("No uploads yet.");
        return Ok(());
    }

    for entry in entries.iter().take(limit) {
        let kind = match entry.category {
            FileCategory::Video => "video",
            _ => "image",
        };
        println!(
            "{}  {:<13} {:<6} {}",
            entry.uploaded_at.format("%Y-%m-%d %H:%M:%S"),
            entry.provider_label,
            kind,
            entry.file_name
        );
        println!("  {}", entry.preview_url());
    }
    if entries.len() > limit {
        println!("({} older entries not shown)", entries.len() - limit);
    }

    Ok(())
}
