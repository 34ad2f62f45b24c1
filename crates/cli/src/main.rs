use clap::{Parser, Subcommand};
use lib::bridge::{ApprovalDecision, ApprovalPrompt, Request, StaticPrompt};
use std::sync::Arc;

mod client;
mod prompt;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Tether CLI — human-approved bridge to a live application session", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and default config file.
    Init {
        /// Config file path (default: TETHER_CONFIG_PATH or ~/.tether/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run a standalone bridge (builtins-only namespace, terminal approval prompt).
    /// Host applications normally embed the bridge instead and supply their own bindings.
    Serve {
        /// Config file path (default: TETHER_CONFIG_PATH or ~/.tether/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// TCP port (default from TETHER_PORT, config, or 9876)
        #[arg(long, short)]
        port: Option<u16>,

        /// Approve every connection without asking (trusted local use only).
        #[arg(long)]
        yes: bool,
    },

    /// Execute statements in the bridged session.
    Exec {
        /// Code to execute
        code: String,

        /// Port of the running bridge (default: auto-detect)
        #[arg(long, short)]
        port: Option<u16>,

        /// Session token from a previous approval (skips the operator prompt)
        #[arg(long, short)]
        token: Option<String>,
    },

    /// Evaluate a single expression in the bridged session and print its value.
    Eval {
        /// Expression to evaluate
        code: String,

        /// Port of the running bridge (default: auto-detect)
        #[arg(long, short)]
        port: Option<u16>,

        /// Session token from a previous approval (skips the operator prompt)
        #[arg(long, short)]
        token: Option<String>,
    },

    /// Interactive session: lines execute, `?expr` evaluates, exit/quit leaves.
    Repl {
        /// Port of the running bridge (default: auto-detect)
        #[arg(long, short)]
        port: Option<u16>,

        /// Session token from a previous approval (skips the operator prompt)
        #[arg(long, short)]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("tether {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port, yes }) => {
            if let Err(e) = run_serve(config, port, yes).await {
                log::error!("bridge failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Exec { code, port, token }) => match run_once(code, false, port, token).await
        {
            Ok(code) => std::process::exit(code),
            Err(e) => {
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        },
        Some(Commands::Eval { code, port, token }) => match run_once(code, true, port, token).await
        {
            Ok(code) => std::process::exit(code),
            Err(e) => {
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        },
        Some(Commands::Repl { port, token }) => {
            if let Err(e) = run_repl(port, token).await {
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
    yes: bool,
) -> anyhow::Result<()> {
    let (mut config, _path) = lib::config::load_config(config_path)?;
    config.bridge.port = lib::config::resolve_port(&config);
    if let Some(p) = port {
        config.bridge.port = p;
    }
    let prompt: Arc<dyn ApprovalPrompt> = if yes {
        log::warn!("--yes: every connection is approved without asking");
        Arc::new(StaticPrompt(ApprovalDecision::Approved))
    } else {
        Arc::new(prompt::ConsolePrompt)
    };
    log::info!(
        "starting bridge on {}:{}",
        config.bridge.bind,
        config.bridge.port
    );
    lib::bridge::run_bridge(config, prompt, lib::host::HostBindings::new()).await
}

/// One-shot exec/eval: connect, handshake, send, print. Returns the exit code.
async fn run_once(
    code: String,
    eval: bool,
    port: Option<u16>,
    token: Option<String>,
) -> anyhow::Result<i32> {
    let port = client::resolve_client_port(port);
    let mut conn = client::BridgeClient::connect(port, token.clone()).await?;
    if conn.token.is_some() && conn.token != token {
        // first manual approval: print the session token for reuse
        eprintln!("TETHER_TOKEN={}", conn.token.as_deref().unwrap_or(""));
    }
    let request = if eval {
        Request::Eval { code }
    } else {
        Request::Exec { code }
    };
    let response = conn.send(&request).await?;
    Ok(if client::print_response(&response) { 0 } else { 1 })
}

async fn run_repl(port: Option<u16>, token: Option<String>) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let port = client::resolve_client_port(port);
    let mut conn = client::BridgeClient::connect(port, token.clone()).await?;
    if let Some(ref minted) = conn.token {
        if token.as_deref() != Some(minted) {
            println!(
                "session token: {} (pass --token to skip the approval prompt next time)",
                minted
            );
        }
    }
    println!("tether repl — lines execute, ?expr evaluates, exit/quit leaves");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        write!(stdout, "tether> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }

        let request = match input.strip_prefix('?') {
            Some(expr) => Request::Eval {
                code: expr.trim().to_string(),
            },
            None => Request::Exec {
                code: input.to_string(),
            },
        };
        match conn.send(&request).await {
            Ok(response) => {
                client::print_response(&response);
            }
            Err(e) => {
                eprintln!("connection lost: {}", e);
                break;
            }
        }
    }

    Ok(())
}
