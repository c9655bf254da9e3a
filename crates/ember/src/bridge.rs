//! Drives a session over newline-delimited JSON.
//!
//! Each input line is a request from the renderer, e.g.
//! `{"command":"chat","text":"2+2?"}`, and each output line is a
//! notification, e.g. `{"command":"updateStreamingText","text":"4"}`. This
//! lets a panel hosted in another process render the conversation.

use ember_core::{Notification, UiRequest};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio::sync::mpsc;

use crate::{Error, SessionBuilder};

/// Runs a session until `input` ends and every request read so far has
/// been answered.
///
/// The stored history is sent first. Lines that are not valid requests are
/// answered with an `error` notification and otherwise ignored.
pub async fn run<I, O>(
    builder: SessionBuilder,
    input: I,
    mut output: O,
) -> Result<(), Error>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let (notification_tx, mut notification_rx) = mpsc::unbounded_channel();
    let session = builder
        .with_renderer(notification_tx.clone())
        .restore_history(true)
        .build()
        .await?;

    let mut lines = input.lines();
    loop {
        select! {
            biased;

            Some(notification) = notification_rx.recv() => {
                write_notification(&mut output, &notification).await?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_request(&line) {
                    Ok(req) => session.send_request(req),
                    // Answered in line with the replies still queued.
                    Err(notice) => session.notify(notice),
                }
            }
        }
    }

    debug!("input closed, waiting for pending requests");
    session.close().await;
    drop(notification_tx);
    while let Some(notification) = notification_rx.recv().await {
        write_notification(&mut output, &notification).await?;
    }
    output.flush().await?;
    Ok(())
}

/// Parses one input line, or returns the notice to answer it with.
pub fn parse_request(line: &str) -> Result<UiRequest, Notification> {
    serde_json::from_str(line).map_err(|err| {
        warn!("invalid bridge request: {err}");
        Notification::Error {
            text: format!("Invalid request: {err}"),
        }
    })
}

async fn write_notification<O: AsyncWrite + Unpin>(
    output: &mut O,
    notification: &Notification,
) -> Result<(), Error> {
    let mut line = serde_json::to_vec(notification)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await?;
    Ok(())
}
