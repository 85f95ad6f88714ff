use pipelink_channel::{EventReceiver, PipeEvent, ServerPipe};
use tracing::{debug, info, warn};

use crate::cmd::{shutdown_signal, Context, EchoArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};

/// How a single echo session ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// The peer went away; serve the next one.
    PeerGone,
    /// Nobody is listening to events any more.
    Stopped,
}

pub async fn run(args: EchoArgs, ctx: Context) -> CliResult<i32> {
    let server = ServerPipe::bind_with_config(&args.path, ctx.config)
        .map_err(|err| channel_error("bind failed", &err))?;
    let mut events = server.subscribe();
    info!(path = %args.path.display(), "echo server listening");

    let served = tokio::select! {
        served = serve(&server, &mut events) => served,
        _ = shutdown_signal() => Ok(()),
    };

    server.close().await;
    served.map(|()| SUCCESS)
}

async fn serve(server: &ServerPipe, events: &mut EventReceiver) -> CliResult<()> {
    loop {
        server
            .wait_for_connection()
            .await
            .map_err(|err| channel_error("accept failed", &err))?;

        let end = echo_session(server, events).await;
        if let Some(exit) = server.join().await {
            debug!(?exit, "session loop ended");
        }
        // Everything the finished loop published is already queued.
        while events.try_recv().is_ok() {}

        if end == SessionEnd::Stopped {
            return Ok(());
        }
    }
}

async fn echo_session(server: &ServerPipe, events: &mut EventReceiver) -> SessionEnd {
    loop {
        match events.recv().await {
            Some(PipeEvent::MessageReceived(payload)) => {
                info!(size = payload.len(), "echoing message");
                if let Err(err) = server.try_send(&payload).await {
                    warn!(error = %err, "echo send failed");
                    return SessionEnd::PeerGone;
                }
            }
            Some(PipeEvent::Connected) => continue,
            Some(PipeEvent::Disconnected) => return SessionEnd::PeerGone,
            Some(PipeEvent::Error(err)) => {
                warn!(kind = %err.kind(), error = %err, "session ended with error");
                return SessionEnd::PeerGone;
            }
            None => return SessionEnd::Stopped,
        }
    }
}
