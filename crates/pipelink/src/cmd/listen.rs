use pipelink_channel::{PipeEvent, ServerPipe};
use tracing::info;

use crate::cmd::{shutdown_signal, Context, ListenArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};
use crate::output::{print_message, MessageSource};

pub async fn run(args: ListenArgs, ctx: Context) -> CliResult<i32> {
    let server = ServerPipe::bind_with_config(&args.path, ctx.config)
        .map_err(|err| channel_error("bind failed", &err))?;
    let mut events = server.subscribe();
    let path = args.path.display().to_string();
    info!(path = %path, "waiting for a peer");

    tokio::select! {
        accepted = server.wait_for_connection() => {
            accepted.map_err(|err| channel_error("accept failed", &err))?;
        }
        _ = shutdown_signal() => {
            server.close().await;
            return Ok(SUCCESS);
        }
    }

    let peer_pid = server.peer_credentials().and_then(|cred| cred.pid);
    let mut printed = 0usize;

    let result = loop {
        if args.count.is_some_and(|count| printed >= count) {
            break Ok(SUCCESS);
        }

        let event = tokio::select! {
            event = events.recv() => event,
            _ = shutdown_signal() => break Ok(SUCCESS),
        };

        match event {
            Some(PipeEvent::MessageReceived(payload)) => {
                printed = printed.saturating_add(1);
                let source = MessageSource {
                    path: &path,
                    peer_pid,
                    sequence: printed,
                };
                print_message(payload.as_ref(), source, ctx.format);
            }
            Some(PipeEvent::Connected) => continue,
            Some(PipeEvent::Disconnected) | None => {
                info!(received = printed, "peer disconnected");
                break Ok(SUCCESS);
            }
            Some(PipeEvent::Error(err)) => break Err(channel_error("receive failed", &err)),
        }
    };

    server.close().await;
    result
}
