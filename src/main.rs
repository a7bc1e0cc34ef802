use clap::{Parser, Subcommand};
use stackdump::{config, SignalTrigger};
use std::path::PathBuf;
use std::process::ExitCode;

/// Ask this process group's managed runtime to print a thread dump,
/// once from the command line or on demand over HTTP.
#[derive(Parser, Debug)]
#[command(name = "stackdump", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "stackdump.toml", global = true)]
    config: PathBuf,

    /// Debug logging (signal targets, OS error codes)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Request one dump and exit (status 1 if the OS refused)
    Dump,
    /// Serve the dump page and API
    #[cfg(feature = "serve")]
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        bind: Option<String>,
        /// Port (overrides config)
        #[arg(long)]
        port: Option<u16>,
        /// Node name shown on dump pages (overrides config)
        #[arg(long)]
        node: Option<String>,
    },
    /// Print resolved settings and exit
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "stackdump=debug,tower_http=debug"
    } else {
        "stackdump=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    // Our own process is in the group we signal, so SIGQUIT must not keep
    // its default (terminate + core) disposition here.
    #[cfg(unix)]
    if let Err(e) = install_quit_listener() {
        tracing::error!("failed to install SIGQUIT listener: {e}");
        return ExitCode::FAILURE;
    }

    let cfg = match config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let trigger = SignalTrigger::for_current_platform();

    match cli.command {
        Command::Dump => {
            let result = trigger.request_dump();
            match result.failure() {
                None => {
                    tracing::info!("thread dump requested");
                    ExitCode::SUCCESS
                }
                Some(failure) => {
                    tracing::error!(os_error = ?failure.os_error(), "{failure}");
                    ExitCode::FAILURE
                }
            }
        }
        #[cfg(feature = "serve")]
        Command::Serve { bind, port, node } => {
            let cfg = with_serve_overrides(cfg, bind, port, node);
            match stackdump::serve::run(&cfg, trigger).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!("serve failed: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Config => {
            println!("stackdump v{}", env!("CARGO_PKG_VERSION"));
            println!("Config file: {}", cli.config.display());
            println!("Node: {}", cfg.node_name());
            println!("Serve: {}:{}", cfg.serve.bind, cfg.serve.port);
            println!("Dump gesture: {}", trigger.gesture());
            ExitCode::SUCCESS
        }
    }
}

/// Listen for SIGQUIT for the life of the runtime. Each one is logged as
/// this host's share of the group dump.
#[cfg(unix)]
fn install_quit_listener() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut quit = signal(SignalKind::quit())?;
    tokio::spawn(async move {
        while quit.recv().await.is_some() {
            tracing::info!(pid = std::process::id(), "received SIGQUIT");
            tracing::debug!(
                "listener backtrace:\n{}",
                std::backtrace::Backtrace::force_capture()
            );
        }
    });
    Ok(())
}

/// Apply `serve` command-line overrides on top of the loaded config.
#[cfg(feature = "serve")]
fn with_serve_overrides(
    mut cfg: config::DumpConfig,
    bind: Option<String>,
    port: Option<u16>,
    node: Option<String>,
) -> config::DumpConfig {
    if let Some(bind) = bind {
        cfg.serve.bind = bind;
    }
    if let Some(port) = port {
        cfg.serve.port = port;
    }
    if node.is_some() {
        cfg.node.name = node;
    }
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_dump_with_defaults() {
        let cli = Cli::try_parse_from(["stackdump", "dump"]).unwrap();
        assert!(matches!(cli.command, Command::Dump));
        assert_eq!(cli.config, PathBuf::from("stackdump.toml"));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["stackdump", "config", "-v", "-c", "other.toml"]).unwrap();
        assert!(matches!(cli.command, Command::Config));
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("other.toml"));
    }

    #[cfg(feature = "serve")]
    #[test]
    fn test_cli_serve_overrides() {
        let cli = Cli::try_parse_from([
            "stackdump", "serve", "--bind", "0.0.0.0", "--port", "9000", "--node", "n1",
        ])
        .unwrap();
        match cli.command {
            Command::Serve { bind, port, node } => {
                assert_eq!(bind.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(9000));
                assert_eq!(node.as_deref(), Some("n1"));
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[cfg(feature = "serve")]
    #[test]
    fn test_serve_overrides_replace_only_given_fields() {
        let mut loaded = config::DumpConfig::default();
        loaded.node.name = Some("from-file".to_string());

        let cfg = with_serve_overrides(loaded.clone(), None, Some(9000), None);
        assert_eq!(cfg.serve.port, 9000);
        assert_eq!(cfg.serve.bind, "127.0.0.1");
        assert_eq!(cfg.node.name.as_deref(), Some("from-file"));

        let cfg = with_serve_overrides(
            loaded,
            Some("0.0.0.0".to_string()),
            None,
            Some("n1".to_string()),
        );
        assert_eq!(cfg.serve.bind, "0.0.0.0");
        assert_eq!(cfg.serve.port, 8421);
        assert_eq!(cfg.node.name.as_deref(), Some("n1"));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["stackdump"]).is_err());
    }
}
