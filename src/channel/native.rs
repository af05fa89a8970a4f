//! tokio-tungstenite transport.

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::{ChannelError, ChannelEvent, ConnectionMachine, ReconnectPolicy, decode_binary};

/// Connects to `url` on `runtime` and keeps reconnecting per `policy`.
/// `sink` returns `false` once nobody listens anymore, which ends the task.
pub fn spawn<F>(
    runtime: &tokio::runtime::Handle,
    url: String,
    policy: ReconnectPolicy,
    sink: F,
) -> JoinHandle<()>
where
    F: Fn(ChannelEvent) -> bool + Send + 'static,
{
    runtime.spawn(run(url, policy, sink))
}

async fn run<F>(url: String, policy: ReconnectPolicy, sink: F)
where
    F: Fn(ChannelEvent) -> bool + Send + 'static,
{
    let mut machine = ConnectionMachine::new(policy);
    loop {
        log::debug!("Connecting to {}", url);
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((mut stream, _response)) => {
                machine.on_open();
                if !sink(ChannelEvent::Opened { url: url.clone() }) {
                    return;
                }
                let mut close_reason = None;
                while let Some(message) = stream.next().await {
                    let event = match message {
                        Ok(Message::Text(text)) => ChannelEvent::Message(text.as_str().to_owned()),
                        Ok(Message::Binary(bytes)) => ChannelEvent::Message(decode_binary(&bytes)),
                        Ok(Message::Close(frame)) => {
                            close_reason = frame.map(|frame| {
                                format!("{} {}", u16::from(frame.code), frame.reason.as_str())
                            });
                            break;
                        }
                        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                        Err(e) => {
                            machine.on_error();
                            ChannelEvent::Error(ChannelError::Transport(e.to_string()))
                        }
                    };
                    let errored = matches!(event, ChannelEvent::Error(_));
                    if !sink(event) {
                        return;
                    }
                    if errored {
                        break;
                    }
                }
                machine.on_close();
                if !sink(ChannelEvent::Closed {
                    reason: close_reason,
                }) {
                    return;
                }
            }
            Err(e) => {
                machine.on_error();
                if !sink(ChannelEvent::Error(ChannelError::Connect(e.to_string()))) {
                    return;
                }
            }
        }

        let Some(delay) = machine.next_retry() else {
            log::debug!("Not reconnecting to {}", url);
            return;
        };
        if !sink(ChannelEvent::Reconnecting {
            attempt: machine.attempt(),
            delay,
        }) {
            return;
        }
        tokio::time::sleep(delay).await;
        machine.on_retry();
    }
}
