use std::fs;
use std::time::Duration;

use pipelink_channel::{ClientPipe, EventReceiver, PipeEvent};

use crate::cmd::{Context, SendArgs};
use crate::exit::{channel_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_message, MessageSource};

pub async fn run(args: SendArgs, ctx: Context) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = resolve_payload(&args)?;

    let client = ClientPipe::with_config(&args.path, ctx.config);
    let mut events = client.subscribe();
    client
        .connect(timeout)
        .await
        .map_err(|err| channel_error("connect failed", &err))?;

    let result = exchange(&client, &mut events, &payload, &args, timeout, ctx).await;
    client.close().await;
    result
}

async fn exchange(
    client: &ClientPipe,
    events: &mut EventReceiver,
    payload: &[u8],
    args: &SendArgs,
    timeout: Duration,
    ctx: Context,
) -> CliResult<i32> {
    client
        .try_send(payload)
        .await
        .map_err(|err| channel_error("send failed", &err))?;
    tracing::debug!(size = payload.len(), "message sent");

    if !args.wait {
        return Ok(SUCCESS);
    }

    let reply = tokio::time::timeout(timeout, wait_for_reply(events))
        .await
        .map_err(|_| CliError::new(TIMEOUT, format!("no reply within {}", args.timeout)))??;
    let path = args.path.display().to_string();
    let source = MessageSource {
        path: &path,
        peer_pid: None,
        sequence: 1,
    };
    print_message(&reply, source, ctx.format);
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), &err)
        });
    }
    Ok(Vec::new())
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Wait for the next message, skipping lifecycle noise.
async fn wait_for_reply(events: &mut EventReceiver) -> CliResult<Vec<u8>> {
    loop {
        match events.recv().await {
            Some(PipeEvent::MessageReceived(payload)) => return Ok(payload.to_vec()),
            Some(PipeEvent::Connected) => continue,
            Some(PipeEvent::Error(err)) => return Err(channel_error("receive failed", &err)),
            Some(PipeEvent::Disconnected) | None => {
                return Err(CliError::new(
                    FAILURE,
                    "receive failed: peer disconnected before replying",
                ))
            }
        }
    }
}
