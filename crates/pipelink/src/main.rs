mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;
use pipelink_channel::ChannelConfig;

use crate::cmd::{Command, Context};
use crate::exit::{CliError, CliResult, INTERNAL};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "pipelink", version, about = "Message pipes over Unix domain sockets")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "PIPELINK_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    /// Largest message accepted or sent, in bytes.
    #[arg(long, value_name = "BYTES", env = "PIPELINK_MAX_PAYLOAD", global = true)]
    max_payload: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn channel_config(&self) -> ChannelConfig {
        let mut config = ChannelConfig::default();
        if let Some(max) = self.max_payload {
            config.max_payload_size = max;
        }
        config
    }
}

fn run(cli: Cli) -> CliResult<i32> {
    let ctx = Context {
        format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
        config: cli.channel_config(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))?;
    runtime.block_on(cmd::run(cli.command, ctx))
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
