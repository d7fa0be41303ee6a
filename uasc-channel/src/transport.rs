use uasc_types::StatusCode;

/// Opaque handle identifying one socket-level connection to the dispatcher.
/// Distinct from a secure channel id: a socket exists before HELLO/ACK and
/// survives a token renewal, while the secure channel id is only assigned
/// once OpenSecureChannel completes.
pub type SocketHandle = u64;

/// The external collaborator boundary the event loop drives every inbound
/// byte and outbound write through. Implementations own the actual sockets;
/// the core only ever sees handles and byte buffers.
pub trait Transport: Send {
    /// Begins connecting to `url`, returning a handle the caller can use
    /// before the connection is confirmed. Delivery of the outcome happens
    /// asynchronously as a [`SocketEvent::Connected`] or
    /// [`SocketEvent::Disconnected`].
    fn open(&mut self, url: &str) -> SocketHandle;

    /// Queues `buffer` for write on `handle`. Completion is reported later
    /// as [`SocketEvent::WriteDone`]; this call never blocks.
    fn write(&mut self, handle: SocketHandle, buffer: Vec<u8>);

    /// Starts a graceful shutdown of `handle`. A final
    /// [`SocketEvent::Disconnected`] follows once the socket actually closes.
    fn close(&mut self, handle: SocketHandle);
}

/// Events a [`Transport`] reports back to the dispatcher. These map directly
/// onto the socket half of the event loop's event taxonomy.
#[derive(Debug)]
pub enum SocketEvent {
    Created(SocketHandle),
    Connected(SocketHandle),
    Bytes(SocketHandle, Vec<u8>),
    Disconnected(SocketHandle, StatusCode),
    WriteDone(SocketHandle),
}
