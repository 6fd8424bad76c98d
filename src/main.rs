//! mq-relay command line
//!
//! Run the consumer first or the producer first; both create-or-attach the
//! same channels.
//!
//! ```text
//!   mq-relay consume                 # print frames as they arrive
//!   mq-relay produce                 # send one frame per channel, then idle
//!   mq-relay produce --interval-ms 50 --continuous
//!   mq-relay remove                  # unlink channels left behind by a killed process
//!   mq-relay limits                  # show host mqueue limits
//! ```
//!
//! Ctrl-C closes and removes every channel, then exits.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use mq_relay::channel::{ChannelBackend, PosixBackend};
use mq_relay::relay::{Relay, RelayConfig, Role, ShutdownReason, ShutdownSignal};
use mq_relay::worker::RunMode;

#[derive(Parser, Debug)]
#[command(name = "mq-relay", version, about = "CAN frame relay over POSIX message queues")]
struct Cli {
    /// Queue depth of each channel
    #[arg(long, global = true, default_value_t = mq_relay::relay::config::DEFAULT_MAX_MESSAGES)]
    max_messages: usize,

    /// Suffix appended to every channel name
    #[arg(long, global = true)]
    instance: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Receive frames and print them to stdout
    Consume(RoleArgs),
    /// Send frames
    Produce {
        #[command(flatten)]
        role: RoleArgs,

        /// Delay between sends with --continuous
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
    },
    /// Remove every channel from the system
    Remove,
    /// Print host message queue limits
    Limits,
}

#[derive(Args, Debug)]
struct RoleArgs {
    /// Keep sending/receiving until interrupted instead of once per channel
    #[arg(long)]
    continuous: bool,

    /// Exit when every worker is done instead of waiting for Ctrl-C
    #[arg(long)]
    exit_when_done: bool,

    /// Leave channels in place at shutdown
    #[arg(long)]
    keep_channels: bool,
}

impl Cli {
    fn base_config(&self) -> RelayConfig {
        let mut config = RelayConfig::default().max_messages(self.max_messages);
        if let Some(ref instance) = self.instance {
            config = config.instance(instance);
        }
        config
    }
}

impl RoleArgs {
    fn apply(&self, mut config: RelayConfig) -> RelayConfig {
        if self.continuous {
            config = config.mode(RunMode::Continuous);
        }
        if self.keep_channels {
            config = config.keep_channels();
        }
        config.linger(!self.exit_when_done)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries received frames
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mq_relay=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let backend: Arc<dyn ChannelBackend> = Arc::new(PosixBackend::new());

    let (role, config) = match &cli.command {
        Command::Consume(args) => (Role::Consumer, args.apply(cli.base_config())),
        Command::Produce { role, interval_ms } => (
            Role::Producer,
            role.apply(cli.base_config())
                .send_interval(Duration::from_millis(*interval_ms)),
        ),
        Command::Remove => {
            let relay = Relay::new(cli.base_config(), backend);
            return match relay.remove_channels() {
                Ok(report) if report.is_clean() => ExitCode::SUCCESS,
                Ok(_) => ExitCode::FAILURE,
                Err(e) => {
                    eprintln!("error: {}", e);
                    ExitCode::FAILURE
                }
            };
        }
        Command::Limits => {
            let limits = backend.limits();
            let show = |v: Option<u64>| v.map_or_else(|| "unknown".to_string(), |v| v.to_string());
            println!("max messages per queue: {}", show(limits.max_messages));
            println!("max message size:       {}", show(limits.max_message_size));
            println!("max queues:             {}", show(limits.max_queues));
            return ExitCode::SUCCESS;
        }
    };

    // Installed before any channel is opened so an early Ctrl-C still cleans up
    let mut signals = match ShutdownSignal::install() {
        Ok(signals) => signals,
        Err(e) => {
            eprintln!("error: installing signal handlers: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let relay = Relay::new(config, backend);
    let result = relay
        .run_until(role, async move {
            let signal = signals.recv().await;
            tracing::info!(signal = signal, "Caught signal");
        })
        .await;

    let code = match result {
        Ok(report) => {
            if let ShutdownReason::WorkerFailed(ref e) = report.reason {
                eprintln!("error: {}", e);
            }
            report.exit_code()
        }
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    };

    // Workers still blocked in the kernel would keep the runtime alive on drop
    std::process::exit(code);
}
