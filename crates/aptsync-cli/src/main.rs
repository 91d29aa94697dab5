use std::{env, fs, sync::Arc, time::Duration};

use aptsync_config::{
    config::{self, config_path, get_config, set_config_path, Config},
    repository::Repository,
};
use aptsync_dl::http_client::configure_http_client;
use aptsync_events::{ChannelSink, EventSinkHandle, NullSink};
use aptsync_operations::{index_urls, sync_repository};
use aptsync_utils::path::resolve_path;
use clap::Parser;
use cli::{Args, Commands};
use error::{CliError, CliResult, ErrorContext};
use logging::setup_logging;
use nu_ansi_term::Color::{Cyan, Green, Red};
use progress::{spawn_event_handler, ProgressGuard};
use snapshot::SnapshotSink;
use status::display_status;
use tracing::{error, info, warn};
use ureq::{
    http::{HeaderMap, HeaderName, HeaderValue},
    Proxy,
};
use utils::{format_seconds, progress_enabled, set_color, set_progress, Colored, Icons};

mod cli;
mod error;
mod logging;
mod progress;
mod snapshot;
mod status;
mod utils;

/// Builds the event sink for a sync run, plus the progress thread if bars are shown.
fn create_sink(snapshot: Option<&std::path::Path>) -> (EventSinkHandle, Option<ProgressGuard>) {
    let mut guard = None;
    let mut sink: EventSinkHandle = Arc::new(NullSink);
    if progress_enabled() {
        let (channel, receiver) = ChannelSink::new();
        sink = Arc::new(channel);
        guard = Some(spawn_event_handler(receiver));
    }

    if let Some(path) = snapshot {
        sink = Arc::new(SnapshotSink::new(path, sink));
    }
    (sink, guard)
}

fn parse_headers(headers: &[String]) -> CliResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for header in headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| CliError::InvalidHeader(header.clone()))?;
        let name = HeaderName::try_from(name.trim())
            .map_err(|_| CliError::InvalidHeader(header.clone()))?;
        let value = HeaderValue::try_from(value.trim())
            .map_err(|_| CliError::InvalidHeader(header.clone()))?;
        map.append(name, value);
    }
    Ok(map)
}

fn configure_http(args: &Args) -> CliResult<()> {
    let proxy = args
        .proxy
        .as_deref()
        .map(|proxy| {
            Proxy::new(proxy).map_err(|err| {
                CliError::InvalidProxy {
                    proxy: proxy.to_string(),
                    source: err,
                }
            })
        })
        .transpose()?;
    let headers = args.header.as_deref().map(parse_headers).transpose()?;
    let user_agent = args.user_agent.clone();
    let timeout = args.timeout.map(Duration::from_secs);

    configure_http_client(|config| {
        if proxy.is_some() {
            config.proxy = proxy;
        }
        if user_agent.is_some() {
            config.user_agent = user_agent;
        }
        if headers.is_some() {
            config.headers = headers;
        }
        if timeout.is_some() {
            config.timeout = timeout;
        }
    });

    Ok(())
}

fn select_repositories<'a>(config: &'a Config, names: &[String]) -> CliResult<Vec<&'a Repository>> {
    if names.is_empty() {
        return Ok(config.enabled_repositories().collect());
    }

    names
        .iter()
        .map(|name| config.get_repository(name).map_err(CliError::from))
        .collect()
}

fn sync_repositories(names: &[String], snapshot: Option<&std::path::Path>) -> CliResult<()> {
    let config = get_config();
    let repos = select_repositories(&config, names)?;
    if repos.is_empty() {
        warn!("No enabled repositories configured in {}", config_path().display());
        return Ok(());
    }

    let (sink, guard) = create_sink(snapshot);
    let mut outcomes = Vec::with_capacity(repos.len());

    for repo in &repos {
        outcomes.push((
            repo.id.clone(),
            sync_repository(&config, repo, Some(sink.clone())),
        ));
    }

    drop(sink);
    if let Some(guard) = guard {
        guard.finish();
    }
    progress::stop();

    let mut failed = 0;
    for (repo_id, outcome) in &outcomes {
        match outcome {
            Ok(report) if report.success => {
                info!(
                    "{} {}: synced in {}",
                    Colored(Green, Icons::CHECK),
                    Colored(Cyan, repo_id),
                    format_seconds(u64::try_from(report.summary.total_execution_time).ok())
                );
            }
            Ok(_) => {
                failed += 1;
                error!(
                    "{} {}: sync failed",
                    Colored(Red, Icons::CROSS),
                    Colored(Cyan, repo_id)
                );
            }
            Err(err) => {
                failed += 1;
                error!(repo = %repo_id, error = %err, "sync could not start");
            }
        }
    }

    if failed > 0 {
        return Err(CliError::SyncFailed {
            failed,
            total: outcomes.len(),
        });
    }
    Ok(())
}

fn list_repositories() {
    let config = get_config();
    if config.repositories.is_empty() {
        info!("No repositories configured in {}", config_path().display());
        return;
    }

    for repo in &config.repositories {
        let marker = if repo.is_enabled() {
            Colored(Green, Icons::CHECK)
        } else {
            Colored(Red, Icons::CROSS)
        };
        info!("{marker} {}", Colored(Cyan, repo));
        for url in index_urls(repo) {
            info!("    {url}");
        }
    }
}

fn print_config() -> CliResult<()> {
    let path = config_path();
    match fs::read_to_string(&path) {
        Ok(content) => print!("{content}"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!("{} not found, showing defaults", path.display());
            let content = toml::to_string_pretty(&get_config())
                .map_err(aptsync_config::error::ConfigError::from)?;
            print!("{content}");
        }
        Err(err) => {
            return Err(err).with_context(|| format!("reading {}", path.display()));
        }
    }
    Ok(())
}

fn handle_cli() -> CliResult<()> {
    let args = Args::parse();

    setup_logging(&args);
    set_color(!args.no_color);
    set_progress(!args.no_progress && !args.json);

    if let Some(ref c) = args.config {
        let path = resolve_path(c)?;
        let path = if path.is_absolute() {
            path
        } else {
            env::current_dir()
                .with_context(|| "retrieving current directory".into())?
                .join(path)
        };
        set_config_path(path);
    }

    configure_http(&args)?;

    match args.command {
        Commands::Sync {
            repos,
            snapshot,
        } => {
            config::init()?;
            sync_repositories(&repos, snapshot.as_deref())?;
        }
        Commands::Status {
            snapshot,
        } => display_status(&snapshot)?,
        Commands::Repos => {
            config::init()?;
            list_repositories();
        }
        Commands::Config => print_config()?,
    }

    Ok(())
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli() {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers(&[
            "Authorization: Bearer abc".to_string(),
            "X-Mirror:primary".to_string(),
        ])
        .unwrap();
        assert_eq!(headers["authorization"], "Bearer abc");
        assert_eq!(headers["x-mirror"], "primary");

        assert!(matches!(
            parse_headers(&["no-separator".to_string()]),
            Err(CliError::InvalidHeader(_))
        ));
        assert!(matches!(
            parse_headers(&["bad header: x".to_string()]),
            Err(CliError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_select_repositories() {
        let mut config = Config::default_config();
        let mut disabled = Repository::new("old", "http://deb.example.org/old", "stable", "main", "amd64");
        disabled.enabled = Some(false);
        config.repositories = vec![
            Repository::new(
                "debian",
                "http://deb.example.org/debian",
                "stable",
                "main",
                "amd64",
            ),
            disabled,
        ];

        let all = select_repositories(&config, &[]).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "debian");

        assert!(matches!(
            select_repositories(&config, &["old".to_string()]),
            Err(CliError::Config(_))
        ));
    }
}
