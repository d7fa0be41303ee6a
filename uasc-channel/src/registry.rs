use std::collections::HashMap;

use rand::RngCore;

use crate::fsm::Channel;

/// Owns every [`Channel`] the event loop is currently tracking, keyed by its
/// secure channel id. Channels that haven't yet completed an OpenSecureChannel
/// exchange are held under a temporary key (their socket handle, negated)
/// until `assign_id` gives them a real one.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<u32, Channel>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        ChannelRegistry {
            channels: HashMap::new(),
        }
    }

    pub fn insert(&mut self, mut channel: Channel) -> u32 {
        let id = if channel.id != 0 {
            channel.id
        } else {
            self.allocate_id()
        };
        channel.id = id;
        self.channels.insert(id, channel);
        id
    }

    pub fn get(&self, id: u32) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Channel> {
        self.channels.get_mut(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<Channel> {
        self.channels.remove(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.channels.keys().copied()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.channels.values_mut()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Re-keys a channel once its secure channel id becomes known, e.g. after
    /// a server assigns one in `on_open_secure_channel_request`.
    pub fn rekey(&mut self, old_id: u32, new_id: u32) {
        if old_id == new_id {
            return;
        }
        if let Some(channel) = self.channels.remove(&old_id) {
            self.channels.insert(new_id, channel);
        }
    }

    fn allocate_id(&self) -> u32 {
        loop {
            let id = rand::thread_rng().next_u32();
            if id != 0 && !self.channels.contains_key(&id) {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uasc_core::comms::Role;
    use uasc_core::ChannelLimits;
    use uasc_crypto::MemoryCertificateStore;

    fn new_channel() -> Channel {
        Channel::new(Role::Server, Arc::new(MemoryCertificateStore::new()), ChannelLimits::default())
    }

    #[test]
    fn insert_assigns_a_temporary_id_when_channel_has_none() {
        let mut registry = ChannelRegistry::new();
        let id = registry.insert(new_channel());
        assert_ne!(id, 0);
        assert!(registry.get(id).is_some());
    }

    #[test]
    fn rekey_moves_a_channel_to_its_new_id() {
        let mut registry = ChannelRegistry::new();
        let id = registry.insert(new_channel());
        registry.rekey(id, 42);
        assert!(registry.get(id).is_none());
        assert!(registry.get(42).is_some());
    }

    #[test]
    fn remove_drops_the_channel() {
        let mut registry = ChannelRegistry::new();
        let id = registry.insert(new_channel());
        assert!(registry.remove(id).is_some());
        assert!(registry.get(id).is_none());
    }
}
