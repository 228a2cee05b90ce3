pub mod models;
pub mod services;

use anyhow::{bail, Context};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;

use models::AnalyzeRequest;
use services::{AppConfig, ConfigStore, CorpusProvider, DocumentAnalyzer, InMemoryCorpus};

static PROCESS_START: OnceLock<Instant> = OnceLock::new();
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_PREFIX: &str = "plagcheck_";
const LOGS_KEPT: usize = 30;

fn startup_elapsed_ms() -> u128 {
    PROCESS_START
        .get()
        .map(|t| t.elapsed().as_millis())
        .unwrap_or(0)
}

fn env_flag(key: &str) -> bool {
    matches!(
        std::env::var(key).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE")
    )
}

/// Initialize logging with a per-session log file. Console output goes to stderr so
/// stdout stays free for JSON results. Safe to call more than once.
pub fn init_logging() {
    let disable_file_log = env_flag("PLAGCHECK_DISABLE_FILE_LOG");
    let disable_cleanup = env_flag("PLAGCHECK_DISABLE_LOG_CLEANUP");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if disable_file_log {
        init_console_only_logging(env_filter);
        info!("File logging disabled via PLAGCHECK_DISABLE_FILE_LOG");
        return;
    }

    let logs_dir = match std::env::var("PLAGCHECK_LOG_DIR") {
        Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
        _ => get_logs_dir(),
    };

    if let Err(e) = fs::create_dir_all(&logs_dir) {
        eprintln!("Failed to create logs directory: {}", e);
        init_console_only_logging(env_filter);
        info!("Falling back to console-only logging (log dir not writable)");
        return;
    }

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let log_filename = format!("{}{}.log", LOG_PREFIX, timestamp);

    let file_appender = rolling::never(&logs_dir, &log_filename);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    #[cfg(debug_assertions)]
    let installed = {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(console_layer)
            .try_init()
            .is_ok()
    };

    #[cfg(not(debug_assertions))]
    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .is_ok();

    if !installed {
        return;
    }
    let _ = LOG_GUARD.set(file_guard);

    info!("=== plagcheck Started ===");
    info!("Log file: {}/{}", logs_dir.display(), log_filename);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if !disable_cleanup {
        std::thread::spawn(move || {
            cleanup_old_logs(&logs_dir, LOGS_KEPT);
        });
    }
}

fn get_logs_dir() -> PathBuf {
    #[cfg(debug_assertions)]
    {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("logs")
    }

    #[cfg(not(debug_assertions))]
    {
        if let Some(data_dir) = dirs::data_local_dir() {
            return data_dir.join("plagcheck").join("logs");
        }
        PathBuf::from("logs")
    }
}

fn cleanup_old_logs(logs_dir: &Path, keep: usize) {
    let mut entries: Vec<_> = match fs::read_dir(logs_dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()).collect(),
        Err(_) => return,
    };

    entries.retain(|e| {
        let name = e.file_name().to_string_lossy().to_string();
        name.starts_with(LOG_PREFIX) && name.ends_with(".log")
    });

    if entries.len() <= keep {
        return;
    }

    entries.sort_by_key(|e| {
        e.metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
    });

    let remove_count = entries.len().saturating_sub(keep);
    for entry in entries.into_iter().take(remove_count) {
        let _ = fs::remove_file(entry.path());
    }
}

fn init_console_only_logging(env_filter: EnvFilter) {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions))
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init();
}

// ============ Shared CLI helpers ============

pub fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

pub fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

/// Arguments that are neither flags nor the value following one of `value_keys`.
pub fn positional_args(args: &[String], value_keys: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if value_keys.contains(&arg.as_str()) {
            skip_next = true;
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        out.push(arg.clone());
    }
    out
}

/// Load config from `config_dir` (or the default location) with env overrides applied.
pub fn load_config(config_dir: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match config_dir.or_else(ConfigStore::default_config_dir) {
        Some(dir) => ConfigStore::new(dir)
            .load()
            .context("failed to load configuration")?,
        None => AppConfig::default(),
    };
    Ok(config.with_env_overrides())
}

/// Corpus from `override_path`, then the configured file, then the built-in sample.
pub fn load_corpus(config: &AppConfig, override_path: Option<&Path>) -> anyhow::Result<Arc<dyn CorpusProvider>> {
    match override_path.or(config.corpus_file.as_deref()) {
        Some(path) => {
            let corpus = InMemoryCorpus::from_json_file(path)
                .with_context(|| format!("failed to load corpus {}", path.display()))?;
            Ok(Arc::new(corpus))
        }
        None => Ok(Arc::new(InMemoryCorpus::sample())),
    }
}

pub fn read_input(path: &str) -> anyhow::Result<String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path))
}

// ============ plagcheck CLI ============

const USAGE: &str = "Usage:
  plagcheck <path|-> [<path>...] [--title <t>] [--id <id>] [--corpus <json>] [--config-dir <dir>] [--deadline-ms <n>] [--out <json_path>]
  plagcheck --search <query> [--limit <n>] [--corpus <json>]
  plagcheck --set-api-key <provider> <key> [--config-dir <dir>]
  plagcheck --delete-api-key <provider> [--config-dir <dir>]
  plagcheck --list-backups [--config-dir <dir>]

Notes:
  - `-` reads the document from stdin.
  - Several paths are analyzed concurrently and printed as a JSON array in input order.
  - Model endpoints come from the config file or PLAGCHECK_EMBEDDING_URL / PLAGCHECK_CLASSIFIER_URL.
  - Without an embedding endpoint a local sentence-transformer is fetched into the hub cache
    on first use (PLAGCHECK_EMBEDDING_MODEL_DIR points at a local copy instead).
  - API keys are stored per provider (`embedding`, `classifier`); env vars take precedence.";

const VALUE_KEYS: &[&str] = &[
    "--title",
    "--id",
    "--corpus",
    "--config-dir",
    "--deadline-ms",
    "--out",
    "--search",
    "--limit",
    "--delete-api-key",
];

pub fn run() -> anyhow::Result<()> {
    PROCESS_START.get_or_init(Instant::now);

    let logging_t0 = Instant::now();
    init_logging();
    info!(
        startup_ms = startup_elapsed_ms(),
        logging_ms = logging_t0.elapsed().as_millis(),
        "logging.initialized"
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || has_flag(&args, "--help") {
        eprintln!("{}", USAGE);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let outcome = runtime.block_on(run_cli(args));
    info!("=== plagcheck Exited ===");
    outcome
}

/// Config maintenance commands. Returns `false` when `args` hold none of them.
pub fn run_config_command(store: &ConfigStore, args: &[String]) -> anyhow::Result<bool> {
    if let Some(i) = args.iter().position(|a| a == "--set-api-key") {
        let (provider, key) = match (args.get(i + 1), args.get(i + 2)) {
            (Some(p), Some(k)) if !p.starts_with("--") && !k.starts_with("--") => (p, k),
            _ => bail!("--set-api-key needs <provider> <key>"),
        };
        store
            .set_api_key(provider, key.trim())
            .with_context(|| format!("failed to store API key for {}", provider))?;
        info!(provider = %provider, "config.api_key_set");
        eprintln!("Stored API key for {} in {}", provider, store.config_file().display());
        return Ok(true);
    }

    if let Some(provider) = parse_arg_value(args, "--delete-api-key") {
        store
            .delete_api_key(&provider)
            .with_context(|| format!("failed to delete API key for {}", provider))?;
        info!(provider = %provider, "config.api_key_deleted");
        eprintln!("Deleted API key for {}", provider);
        return Ok(true);
    }

    if has_flag(args, "--list-backups") {
        for path in store.list_backups().context("failed to list config backups")? {
            println!("{}", path.display());
        }
        return Ok(true);
    }

    Ok(false)
}

async fn run_cli(args: Vec<String>) -> anyhow::Result<()> {
    let config_dir = parse_arg_value(&args, "--config-dir").map(PathBuf::from);
    if let Some(dir) = config_dir.clone().or_else(ConfigStore::default_config_dir) {
        if run_config_command(&ConfigStore::new(dir), &args)? {
            return Ok(());
        }
    }

    let config = load_config(config_dir)?;
    let corpus_override = parse_arg_value(&args, "--corpus").map(PathBuf::from);
    let corpus = load_corpus(&config, corpus_override.as_deref())?;
    info!(documents = corpus.len(), "corpus.ready");

    if let Some(query) = parse_arg_value(&args, "--search") {
        let limit: usize = parse_arg_value(&args, "--limit")
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);
        let hits: Vec<_> = corpus.search(&query, limit).into_iter().map(|e| e.source_ref()).collect();
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    let paths = positional_args(&args, VALUE_KEYS);
    if paths.is_empty() {
        bail!("no input documents given\n\n{}", USAGE);
    }

    let deadline = parse_arg_value(&args, "--deadline-ms")
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .or(config.pipeline.deadline_secs.map(Duration::from_secs));
    let analyzer = DocumentAnalyzer::from_config(&config, corpus)
        .context("invalid similarity configuration")?
        .with_deadline(deadline);

    let title = parse_arg_value(&args, "--title");
    let doc_id = parse_arg_value(&args, "--id");
    let mut requests = Vec::with_capacity(paths.len());
    for path in &paths {
        let text = read_input(path)?;
        let default_title = Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|_| path != "-");
        requests.push(AnalyzeRequest {
            doc_id: if paths.len() == 1 { doc_id.clone() } else { None },
            title: title.clone().or(default_title),
            text,
        });
    }

    let json = if requests.len() == 1 {
        let request = requests.remove(0);
        let result = analyzer.analyze_with_deadline(request, deadline).await;
        serde_json::to_string_pretty(&result)?
    } else {
        let results = analyzer.analyze_batch(requests).await;
        serde_json::to_string_pretty(&results)?
    };

    match parse_arg_value(&args, "--out") {
        Some(out_path) => {
            fs::write(&out_path, json).with_context(|| format!("failed to write {}", out_path))?;
            eprintln!("Wrote JSON: {}", out_path);
        }
        None => println!("{}", json),
    }
    Ok(())
}
