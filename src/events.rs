use enumset::EnumSet;
use std::sync::mpsc;

use super::types::{EventCategory, FolderEvent};

#[derive(Debug)]
struct Subscriber {
    sender: mpsc::Sender<FolderEvent>,
    allow: EnumSet<EventCategory>,
}

/// Fan-out of folder events to any number of channels.
///
/// Events reach every subscriber in the order they were emitted.
#[derive(Debug, Default)]
pub(crate) struct EventRegistry {
    subscribers: Vec<Subscriber>,
}

impl EventRegistry {
    pub(crate) fn subscribe(&mut self, allow: EnumSet<EventCategory>) -> mpsc::Receiver<FolderEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.push(Subscriber { sender, allow });
        receiver
    }

    pub(crate) fn emit(&mut self, event: FolderEvent) {
        let category = event.category();
        // a failed send means the receiver is gone
        self.subscribers
            .retain(|s| !s.allow.contains(category) || s.sender.send(event.clone()).is_ok());
    }

    pub(crate) fn emit_all<I: IntoIterator<Item = FolderEvent>>(&mut self, events: I) {
        for event in events {
            log::trace!("event: {:?}", event);
            self.emit(event);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_category() {
        let mut registry = EventRegistry::default();
        let vanished = registry.subscribe(EventCategory::Vanished.into());
        let all = registry.subscribe(EnumSet::all());

        registry.emit_all(vec![
            FolderEvent::HighestModSeqChanged(4),
            FolderEvent::MessagesVanished {
                uids: vec![],
                earlier: false,
            },
        ]);

        assert_eq!(all.try_iter().count(), 2);
        assert!(matches!(
            vanished.try_recv(),
            Ok(FolderEvent::MessagesVanished { .. })
        ));
        assert!(vanished.try_recv().is_err());
    }

    #[test]
    fn drops_closed_subscribers() {
        let mut registry = EventRegistry::default();
        let rx = registry.subscribe(EventCategory::HighestModSeq.into());
        drop(rx);
        let _kept = registry.subscribe(EventCategory::Flags.into());
        // nobody asked for this one
        registry.emit(FolderEvent::MessageExpunged { index: 0 });
        assert_eq!(registry.len(), 2);
        registry.emit(FolderEvent::HighestModSeqChanged(1));
        assert_eq!(registry.len(), 1);
    }
}
