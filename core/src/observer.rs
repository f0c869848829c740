//! Observers notified of every completed APDU exchange, e.g. for auditing or tracing.

use crate::apdu::{CommandApdu, ResponseApdu};

/// Receives a notification for each successful exchange.
///
/// Called synchronously from the transmitting thread, in registration order.
/// An observer cannot fail the exchange; anything going wrong inside it is its own business.
pub trait ExchangeObserver {
    fn on_exchange(&self, sequence: u64, command: &CommandApdu, response: &ResponseApdu);
}

impl<F> ExchangeObserver for F
where
    F: Fn(u64, &CommandApdu, &ResponseApdu),
{
    fn on_exchange(&self, sequence: u64, command: &CommandApdu, response: &ResponseApdu) {
        self(sequence, command, response)
    }
}

/// Handle to deregister an observer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ObserverId(u64);

/// Observers in registration order.
#[derive(Default)]
pub(crate) struct Observers {
    next_id: u64,
    entries: Vec<(ObserverId, Box<dyn ExchangeObserver + Send>)>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Box<dyn ExchangeObserver + Send>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, observer));

        id
    }

    pub(crate) fn remove(&mut self, id: ObserverId) -> bool {
        let len = self.entries.len();
        self.entries.retain(|(i, _)| *i != id);

        self.entries.len() != len
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn notify(&self, sequence: u64, command: &CommandApdu, response: &ResponseApdu) {
        for (_, observer) in &self.entries {
            observer.on_exchange(sequence, command, response);
        }
    }
}
