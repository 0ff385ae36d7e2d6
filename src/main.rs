use caprelay::config;
use caprelay::relay::Server;
use caprelay::telemetry::init_logging;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "caprelay")]
#[command(about = "Server side of a packet-capture tunneling relay")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server
    Run {
        /// Path to the configuration file
        #[arg(short, long, default_value = "caprelay.toml")]
        config: PathBuf,
    },
    /// Validate a configuration file without starting
    Validate {
        /// Path to the configuration file
        #[arg(short, long, default_value = "caprelay.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Validate { config }) => cmd_validate(&config),
        Some(Commands::Run { config }) => cmd_run(&config),
        None => cmd_run(&PathBuf::from("caprelay.toml")),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(path: &PathBuf) -> Result<(), String> {
    use tokio::runtime::Runtime;

    let cfg = config::load(path).map_err(|e| e.to_string())?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();
    if validation.has_errors() {
        return Err("validation failed".to_string());
    }

    init_logging(Some(&cfg.log.to_log_config()));

    let resolved = cfg.resolve().map_err(|e| e.to_string())?;

    let rt = Runtime::new().map_err(|e| format!("create runtime: {}", e))?;
    rt.block_on(async move {
        let mut server = Server::open(
            resolved.listen_port,
            resolved.listen_devs,
            resolved.upstream_dev,
            resolved.gateway_dev,
        )
        .map_err(|e| format!("open: {}", e))?;

        server.run().await.map_err(|e| e.to_string())
    })
}

fn cmd_validate(path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Validating {}...", path.display());

    let cfg = config::load(path).map_err(|e| e.to_string())?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}
