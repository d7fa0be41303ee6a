//! Real `opc.tcp` transport: one tokio task per socket, each forwarding raw
//! bytes into the event loop's queue and draining an outbound byte queue.
//! The wire framing itself is owned entirely by `uasc_channel::Dispatcher`;
//! this transport never looks inside a buffer, it only moves bytes.

use std::collections::HashMap;

use log::{error, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use uasc_channel::{Event, SocketEvent, SocketHandle, Transport};
use uasc_core::hostname_port_from_url;
use uasc_types::StatusCode;

const READ_BUFFER_SIZE: usize = 64 * 1024;
const DEFAULT_PORT: u16 = 4840;

/// A [`Transport`] backed by real TCP sockets. `open` doesn't block: it
/// allocates a handle and spawns the connect/read/write tasks, which report
/// back through the same event queue the rest of the loop uses.
pub struct TcpTransport {
    next_handle: SocketHandle,
    writers: HashMap<SocketHandle, mpsc::UnboundedSender<Vec<u8>>>,
    cancellations: HashMap<SocketHandle, CancellationToken>,
    events: mpsc::Sender<Event>,
}

impl TcpTransport {
    pub fn new(events: mpsc::Sender<Event>) -> Self {
        TcpTransport {
            next_handle: 1,
            writers: HashMap::new(),
            cancellations: HashMap::new(),
            events,
        }
    }
}

impl Transport for TcpTransport {
    fn open(&mut self, url: &str) -> SocketHandle {
        let handle = self.next_handle;
        self.next_handle += 1;

        let (write_tx, write_rx) = mpsc::unbounded_channel();
        self.writers.insert(handle, write_tx);
        let cancel = CancellationToken::new();
        self.cancellations.insert(handle, cancel.clone());

        let events = self.events.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            run_socket(handle, &url, write_rx, events, cancel).await;
        });
        handle
    }

    fn write(&mut self, handle: SocketHandle, buffer: Vec<u8>) {
        if let Some(tx) = self.writers.get(&handle) {
            if tx.send(buffer).is_err() {
                warn!("socket {handle} write queue gone, dropping outbound bytes");
            }
        }
    }

    fn close(&mut self, handle: SocketHandle) {
        self.writers.remove(&handle);
        if let Some(cancel) = self.cancellations.remove(&handle) {
            cancel.cancel();
        }
    }
}

async fn run_socket(
    handle: SocketHandle,
    url: &str,
    mut write_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::Sender<Event>,
    cancel: CancellationToken,
) {
    let Ok((host, port)) = hostname_port_from_url(url, DEFAULT_PORT) else {
        error!("socket {handle}: invalid url {url}");
        let _ = events
            .send(Event::Socket(SocketEvent::Disconnected(
                handle,
                StatusCode::BadTcpEndpointUrlInvalid,
            )))
            .await;
        return;
    };

    let stream = tokio::select! {
        _ = cancel.cancelled() => return,
        result = TcpStream::connect((host.as_str(), port)) => result,
    };
    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            error!("socket {handle}: connect to {url} failed: {e}");
            let _ = events
                .send(Event::Socket(SocketEvent::Disconnected(
                    handle,
                    StatusCode::BadNotConnected,
                )))
                .await;
            return;
        }
    };

    if events.send(Event::Socket(SocketEvent::Created(handle))).await.is_err() {
        return;
    }
    if events.send(Event::Socket(SocketEvent::Connected(handle))).await.is_err() {
        return;
    }

    let (mut read_half, mut write_half) = stream.into_split();
    let read_events = events.clone();
    let read_cancel = cancel.clone();
    let read_task = tokio::spawn(async move {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            tokio::select! {
                _ = read_cancel.cancelled() => break,
                result = read_half.read(&mut buf) => match result {
                    Ok(0) => {
                        let _ = read_events
                            .send(Event::Socket(SocketEvent::Disconnected(handle, StatusCode::BadConnectionClosed)))
                            .await;
                        break;
                    }
                    Ok(n) => {
                        if read_events
                            .send(Event::Socket(SocketEvent::Bytes(handle, buf[..n].to_vec())))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("socket {handle}: read error: {e}");
                        let _ = read_events
                            .send(Event::Socket(SocketEvent::Disconnected(handle, StatusCode::BadCommunicationError)))
                            .await;
                        break;
                    }
                },
            }
        }
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            message = write_rx.recv() => match message {
                Some(buffer) => {
                    if let Err(e) = write_half.write_all(&buffer).await {
                        warn!("socket {handle}: write error: {e}");
                        break;
                    }
                    let _ = events.send(Event::Socket(SocketEvent::WriteDone(handle))).await;
                }
                None => break,
            },
        }
    }

    cancel.cancel();
    let _ = read_task.await;
}
