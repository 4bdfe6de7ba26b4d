//! Tracing configuration and log routing.
//!
//! The server logs to stdout and to a file. `DOCSIFT_LOG_FILE` names a file to append to;
//! otherwise logs land in `logs/docsift.log`. HTTP and storage client crates are quieted to
//! `warn` unless `RUST_LOG` says otherwise. Each request runs inside a `request` span carrying
//! its route and id, so every event a pipeline emits can be tied back to the call that caused it.
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::Span;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use uuid::Uuid;

const LOG_FILE_ENV: &str = "DOCSIFT_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "docsift.log";

/// Default directives for the server.
const SERVER_DIRECTIVES: &str = "info,hyper=warn,h2=warn,reqwest=warn,object_store=warn";
/// The CLI prints extracted text on stdout, so diagnostics stay quiet.
const CLI_DIRECTIVES: &str = "warn";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where the file layer writes.
#[derive(Debug, PartialEq, Eq)]
enum LogTarget {
    /// Append to an explicitly configured file.
    Append(PathBuf),
    /// Write the default file inside the default directory.
    Default {
        directory: &'static str,
        file_name: &'static str,
    },
}

impl LogTarget {
    fn resolve(configured: Option<String>) -> Self {
        match configured.filter(|path| !path.trim().is_empty()) {
            Some(path) => Self::Append(PathBuf::from(path)),
            None => Self::Default {
                directory: DEFAULT_LOG_DIR,
                file_name: DEFAULT_LOG_FILE,
            },
        }
    }
}

fn env_filter(default_directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives))
}

/// Configure tracing subscribers for stdout and file logging.
///
/// `RUST_LOG` overrides the default filter. The non-blocking writer guard lives for the
/// process lifetime.
pub fn init_tracing() {
    let stdout_layer = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry()
        .with(env_filter(SERVER_DIRECTIVES))
        .with(stdout_layer);

    match configure_file_writer(LogTarget::resolve(std::env::var(LOG_FILE_ENV).ok())) {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}

/// Install a stderr-only subscriber for command-line tools, where stdout carries the output.
pub fn init_cli_tracing() {
    tracing_subscriber::registry()
        .with(env_filter(CLI_DIRECTIVES))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

/// Open a span for one HTTP request, tagged with the route and a fresh request id.
pub fn request_span(route: &'static str) -> Span {
    tracing::info_span!("request", route, request_id = %Uuid::new_v4())
}

fn configure_file_writer(target: LogTarget) -> Option<NonBlocking> {
    let (non_blocking, guard) = match target {
        LogTarget::Append(path) => {
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
            {
                Ok(file) => tracing_appender::non_blocking(file),
                Err(err) => {
                    eprintln!("Failed to open log file {}: {err}", path.display());
                    return None;
                }
            }
        }
        LogTarget::Default {
            directory,
            file_name,
        } => {
            if let Err(err) = std::fs::create_dir_all(directory) {
                eprintln!("Failed to create {directory} directory: {err}");
                return None;
            }
            tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name))
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_path_is_appended_to() {
        assert_eq!(
            LogTarget::resolve(Some("/var/log/docsift.log".into())),
            LogTarget::Append(PathBuf::from("/var/log/docsift.log"))
        );
    }

    #[test]
    fn blank_or_missing_path_uses_default_file() {
        let expected = LogTarget::Default {
            directory: "logs",
            file_name: "docsift.log",
        };
        assert_eq!(LogTarget::resolve(None), expected);
        assert_eq!(LogTarget::resolve(Some("  ".into())), expected);
    }

    #[test]
    fn configured_file_writer_creates_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("server.log");
        assert!(configure_file_writer(LogTarget::Append(path.clone())).is_some());
        assert!(path.exists());
    }

    #[test]
    fn default_directives_quiet_client_crates() {
        for directive in SERVER_DIRECTIVES.split(',').skip(1) {
            assert!(directive.ends_with("=warn"), "{directive}");
        }
        assert!(SERVER_DIRECTIVES.parse::<EnvFilter>().is_ok());
    }
}
