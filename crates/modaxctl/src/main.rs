//! modaxctl - operator CLI for the modax daemon.

mod client;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use modax_shared::ipc::{Method, ResponseData};

#[derive(Parser)]
#[command(name = "modaxctl", version, about = "Control the modax daemon")]
struct Cli {
    /// Daemon socket path
    #[arg(long, default_value = modax_shared::SOCKET_PATH)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the daemon is up
    Ping,
    /// Show daemon status
    Status,
    /// List active modules
    List,
    /// Show the active version of one module
    Active { name: String },
    /// Submit a candidate package directory for a rebootless update
    Submit { package_dir: PathBuf },
    /// List modules activated in the bootstrap phase
    Bootstrap,
    /// Show service status and module readiness flags
    Flags,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let method = match &cli.command {
        Command::Ping => Method::Ping,
        Command::Status => Method::Status,
        Command::List => Method::List,
        Command::Active { name } => Method::GetActive { name: name.clone() },
        Command::Submit { package_dir } => Method::Submit {
            package_dir: package_dir.canonicalize()?,
        },
        Command::Bootstrap => Method::Bootstrap,
        Command::Flags => Method::Flags,
    };

    let data = client::call(&cli.socket, method).await?;
    print_response(&data);
    Ok(())
}

fn print_response(data: &ResponseData) {
    match data {
        ResponseData::Ok => println!("ok"),
        ResponseData::Status(status) => {
            println!("modaxd v{}", status.version);
            println!("  uptime:           {}s", status.uptime_seconds);
            println!("  platform version: {}", status.platform_version);
            println!("  active modules:   {}", status.active_modules);
            if !status.bootstrap_modules.is_empty() {
                println!("  bootstrap:        {}", status.bootstrap_modules.join(", "));
            }
            if !status.pending_reboot.is_empty() {
                println!("  pending reboot:   {}", status.pending_reboot.join(", "));
            }
        }
        ResponseData::List(modules) => {
            for info in modules {
                println!(
                    "{} v{} [{}] {}",
                    info.name,
                    info.version_code,
                    info.origin,
                    info.path.display()
                );
            }
        }
        ResponseData::Active(info) => {
            println!("name:    {}", info.name);
            println!("version: {}", info.version_code);
            println!("origin:  {}", info.origin);
            println!("path:    {}", info.path.display());
        }
        ResponseData::Update(report) => {
            println!("session: {}", report.session_id);
            match report.from_version {
                Some(from) => println!(
                    "update:  {} v{} -> v{}",
                    report.module, from, report.to_version
                ),
                None => println!("install: {} v{}", report.module, report.to_version),
            }
            if report.deferred {
                println!("status:  recorded, activation deferred to next boot");
            } else {
                println!("status:  {}", report.phase);
            }
        }
        ResponseData::Bootstrap(names) => {
            for name in names {
                println!("{}", name);
            }
        }
        ResponseData::Flags(flags) => {
            for (key, value) in flags {
                println!("{} = {}", key, value);
            }
        }
    }
}
