mod app;
mod catalog;
mod config;
mod eligibility;
mod engine;
mod error;
mod fs_scan;
mod indexer;
mod logging;
mod progress_log;
mod resume;
mod server;
mod types;
mod uploader;

use clap::{Parser, Subcommand};
use eligibility::ContentClass;
use indexer::IndexOptions;
use server::AppIdentity;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Face Manager: resumable photo upload")]
struct Cli {
    /// YAML config file (optional)
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[arg(long, short = 'l', default_value = "debug")]
    log_level: String,

    /// Disable logs file
    #[arg(long)]
    no_log_file: bool,

    #[arg(long, default_value = "logs/")]
    log_dir: PathBuf,

    /// Target directory to manage
    #[arg(long, short = 't')]
    target_dir: Option<PathBuf>,

    /// Results directory
    #[arg(long)]
    res_dir: Option<PathBuf>,

    /// Catalog snapshot (default: <res_dir>/<target>/index.json)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Progress log (default: <res_dir>/<target>/progress.jsonl)
    #[arg(long)]
    progress_log: Option<PathBuf>,

    /// Required content-type class, e.g. image/*
    #[arg(long)]
    required_class: Option<String>,

    /// Destination album; overrides the album carried over from the log
    #[arg(long)]
    album: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the catalog snapshot (index.json + duplicates.txt)
    Index {
        #[arg(long)]
        recursive: bool,
        /// Include a quick content hash in item ids
        #[arg(long)]
        by_content: bool,
        #[arg(long)]
        no_metadata: bool,
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Delete duplicates determined by a previous index run
    #[command(name = "delete-duplicates", visible_alias = "D")]
    DeleteDuplicates,
    /// Print the next item to upload
    Next,
    /// Record an upload done elsewhere
    Record {
        #[arg(long)]
        index: usize,
        #[arg(long = "dest-album")]
        dest_album: Option<String>,
        #[arg(long)]
        item: String,
    },
    Status,
    /// Upload into a local directory until the catalog is exhausted
    Run {
        #[arg(long)]
        destination: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Serve next-item / app-identity over HTTP
    Serve {
        #[arg(long, env = "SERVER_PORT")]
        port: Option<u16>,
        #[arg(long, env = "FACEBOOK_APP_ID")]
        app_id: Option<String>,
        #[arg(long, env = "PUBLIC_HOST")]
        public_host: Option<String>,
    },
}

fn build_config(cli: &Cli, file: config::YamlConfig) -> app::AppConfig {
    let target_root = cli
        .target_dir
        .clone()
        .or(file.target_root)
        .unwrap_or_else(|| PathBuf::from("target/"));
    let res_dir = cli
        .res_dir
        .clone()
        .or(file.res_dir)
        .unwrap_or_else(|| PathBuf::from("res/"));
    let results = indexer::results_dir(&res_dir, &target_root);

    let identity = file.app.unwrap_or_default();
    let mut cfg = app::AppConfig {
        catalog: cli
            .catalog
            .clone()
            .or(file.catalog)
            .unwrap_or_else(|| results.join(indexer::INDEX_FILE)),
        progress_log: cli
            .progress_log
            .clone()
            .or(file.progress_log)
            .unwrap_or_else(|| results.join(app::PROGRESS_LOG_FILE)),
        required_class: ContentClass::new(
            cli.required_class
                .clone()
                .or(file.required_class)
                .unwrap_or_else(|| "image/*".to_string()),
        ),
        album: cli.album.clone().or(file.album),
        destination_root: file
            .destination_root
            .unwrap_or_else(|| res_dir.join("uploads")),
        identity: AppIdentity {
            app_id: identity.app_id,
            public_host: identity.public_host,
        },
        port: file.server.and_then(|s| s.port).unwrap_or(80),
        target_root,
        res_dir,
    };

    match &cli.cmd {
        Commands::Run {
            destination: Some(d),
            ..
        } => cfg.destination_root = d.clone(),
        Commands::Serve {
            port,
            app_id,
            public_host,
        } => {
            if let Some(p) = port {
                cfg.port = *p;
            }
            if app_id.is_some() {
                cfg.identity.app_id = app_id.clone();
            }
            if public_host.is_some() {
                cfg.identity.public_host = public_host.clone();
            }
        }
        _ => {}
    }

    cfg
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_dir = (!cli.no_log_file).then_some(cli.log_dir.as_path());
    logging::init(&cli.log_level, log_dir)?;

    let file = config::load_yaml(&cli.config)?.unwrap_or_default();
    let cfg = build_config(&cli, file);
    tracing::debug!(?cfg, "resolved config");

    match cli.cmd {
        Commands::Index {
            recursive,
            by_content,
            no_metadata,
            workers,
        } => app::index(
            &cfg,
            IndexOptions {
                recursive,
                by_content,
                with_metadata: !no_metadata,
                workers,
            },
        )?,
        Commands::DeleteDuplicates => app::delete_duplicates(&cfg)?,
        Commands::Next => app::next(&cfg)?,
        Commands::Record {
            index,
            dest_album,
            item,
        } => app::record(&cfg, index, dest_album.or_else(|| cfg.album.clone()), item)?,
        Commands::Status => app::status(&cfg)?,
        Commands::Run { limit, .. } => app::run(&cfg, limit)?,
        Commands::Serve { .. } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(app::serve(&cfg))?;
        }
    }

    Ok(())
}
