use std::collections::HashSet;

use uasc_types::StatusCode;

/// One bound endpoint: the url it was opened under, and the set of channel
/// ids currently accepted on it. Closing the listener doesn't touch sockets
/// directly — it hands back the channel ids the caller must tear down.
pub struct EndpointListener {
    url: String,
    accepted: HashSet<u32>,
    open: bool,
}

impl EndpointListener {
    pub fn new(url: impl Into<String>) -> Self {
        EndpointListener {
            url: url.into(),
            accepted: HashSet::new(),
            open: true,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn accepted_channels(&self) -> impl Iterator<Item = u32> + '_ {
        self.accepted.iter().copied()
    }

    /// Records a freshly-accepted channel. Refuses once the listener has
    /// been closed: a socket that raced the close is the caller's problem to
    /// tear down, not this listener's to track.
    pub fn accept(&mut self, channel_id: u32) -> Result<(), StatusCode> {
        if !self.open {
            return Err(StatusCode::BadTcpServerTooBusy);
        }
        self.accepted.insert(channel_id);
        Ok(())
    }

    pub fn forget(&mut self, channel_id: u32) {
        self.accepted.remove(&channel_id);
    }

    /// Stops accepting new channels and returns every channel id that was
    /// open, for the caller to transition to `Closing` and tear down.
    pub fn close(&mut self) -> Vec<u32> {
        self.open = false;
        self.accepted.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_channels_while_open() {
        let mut listener = EndpointListener::new("opc.tcp://host:4841/ep");
        assert!(listener.accept(1).is_ok());
        assert!(listener.accept(2).is_ok());
        assert_eq!(listener.accepted_channels().count(), 2);
    }

    #[test]
    fn close_returns_every_accepted_channel_and_refuses_new_ones() {
        let mut listener = EndpointListener::new("opc.tcp://host:4841/ep");
        listener.accept(1).unwrap();
        listener.accept(2).unwrap();

        let mut closed = listener.close();
        closed.sort_unstable();
        assert_eq!(closed, vec![1, 2]);
        assert!(!listener.is_open());
        assert_eq!(
            listener.accept(3).unwrap_err(),
            StatusCode::BadTcpServerTooBusy
        );
    }

    #[test]
    fn forget_drops_a_single_channel() {
        let mut listener = EndpointListener::new("opc.tcp://host:4841/ep");
        listener.accept(1).unwrap();
        listener.forget(1);
        assert_eq!(listener.accepted_channels().count(), 0);
    }
}
