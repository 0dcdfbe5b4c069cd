//! `mercado`: command-line front end for the MercadoCuba client core.
//!
//! Each invocation restores the saved session, runs the startup sync and then
//! the requested command. `shell` keeps one store alive across many commands,
//! which is the only way to place and then manage orders with `--demo-remote`.

mod commands;
mod render;

use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

use mercado_client::{ClientConfig, MemoryBackend, RemoteConfig, StoreOptions};
use mercado_common::currency::Currency;

use commands::{App, Command};

#[derive(Parser)]
#[command(name = "mercado", version, about = "MercadoCuba storefront client")]
struct Cli {
    /// Base URL of the hosted backend.
    #[arg(long, env = "MERCADO_REMOTE_URL")]
    remote_url: Option<String>,

    /// Public API key of the hosted backend.
    #[arg(long, env = "MERCADO_REMOTE_KEY", hide_env_values = true)]
    remote_key: Option<String>,

    /// Use an in-process backend seeded with the bundled catalog instead.
    #[arg(long)]
    demo_remote: bool,

    /// Where accounts and the session are kept.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Seconds to wait for any one remote call.
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Show prices and place orders in MLC.
    #[arg(long)]
    mlc: bool,

    /// Allow any status change, not only the next step or a cancellation.
    #[arg(long)]
    free_transitions: bool,

    /// Take stock when an order is placed and return it on cancellation.
    #[arg(long)]
    reserve_stock: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            remote: RemoteConfig::new(self.remote_url.clone(), self.remote_key.clone()),
            remote_timeout: Duration::from_secs(self.timeout.max(1)),
            store: StoreOptions {
                enforce_transitions: !self.free_transitions,
                reserve_stock: self.reserve_stock,
            },
            data_dir: self.data_dir.clone(),
        }
    }

    fn currency(&self) -> Currency {
        if self.mlc {
            Currency::Mlc
        } else {
            Currency::Cup
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building runtime")?;
    LocalSet::new().block_on(&runtime, run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.client_config();
    let local = mercado_client::open_local(&config).context("opening local storage")?;
    let currency = cli.currency();
    if cli.demo_remote {
        tracing::info!("using the in-process demo backend");
        let backend = Some(Rc::new(MemoryBackend::seeded()));
        App::start(&config, local, backend, currency)
            .await
            .run(cli.command)
            .await
    } else {
        let backend = mercado_client::rest_backend(&config);
        App::start(&config, local, backend, currency)
            .await
            .run(cli.command)
            .await
    }
}
