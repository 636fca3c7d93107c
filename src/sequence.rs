//! Latest-wins bookkeeping for requests that may complete out of order.
//!
//! Every request gets a sequence number. Only the response for the most
//! recently issued number may update visible state; anything older is stale.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    Applied,
    Stale,
}

impl Acceptance {
    pub fn is_stale(self) -> bool {
        self == Acceptance::Stale
    }
}

#[derive(Debug, Clone, Default)]
pub struct Sequencer {
    issued: u64,
    accepted: u64,
}

impl Sequencer {
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Record a number issued by the caller. Numbers must strictly increase;
    /// a repeat or a lower number is stale on arrival.
    pub fn register(&mut self, seq: u64) -> Acceptance {
        if seq <= self.issued {
            return Acceptance::Stale;
        }
        self.issued = seq;
        Acceptance::Applied
    }

    /// A response is applied only if it answers the latest issued request and
    /// that request has not already been answered.
    pub fn accept(&mut self, seq: u64) -> Acceptance {
        if seq != self.issued || seq <= self.accepted {
            return Acceptance::Stale;
        }
        self.accepted = seq;
        Acceptance::Applied
    }

    /// Mark everything issued so far as answered. In-flight responses become
    /// stale while the next issued or registered number is still applied.
    pub fn settle(&mut self) -> u64 {
        self.accepted = self.issued;
        self.accepted
    }

    pub fn latest_accepted(&self) -> u64 {
        self.accepted
    }
}

/// A value slot that only the latest request may replace.
#[derive(Debug, Clone)]
pub struct Latest<T> {
    sequencer: Sequencer,
    value: Option<T>,
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Self {
            sequencer: Sequencer::default(),
            value: None,
        }
    }
}

impl<T> Latest<T> {
    pub fn issue(&mut self) -> u64 {
        self.sequencer.issue()
    }

    /// Complete a request previously returned by [`Latest::issue`].
    pub fn resolve(&mut self, seq: u64, value: T) -> Acceptance {
        let acceptance = self.sequencer.accept(seq);
        if acceptance == Acceptance::Applied {
            self.value = Some(value);
        }
        acceptance
    }

    /// Register and complete a caller-numbered request in one step.
    pub fn offer(&mut self, seq: u64, value: T) -> Acceptance {
        if self.sequencer.register(seq).is_stale() {
            return Acceptance::Stale;
        }
        self.resolve(seq, value)
    }

    /// Drops the value; sequence numbers keep counting so an in-flight
    /// response cannot resurrect it.
    pub fn clear(&mut self) -> u64 {
        self.value = None;
        self.sequencer.settle()
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn seq(&self) -> u64 {
        self.sequencer.latest_accepted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_latest_issued_response_applies() {
        let mut s = Sequencer::default();
        let first = s.issue();
        let second = s.issue();
        assert_eq!(s.accept(first), Acceptance::Stale);
        assert_eq!(s.accept(second), Acceptance::Applied);
        assert_eq!(s.accept(second), Acceptance::Stale);
        assert_eq!(s.latest_accepted(), second);
    }

    #[test]
    fn registered_numbers_must_increase() {
        let mut s = Sequencer::default();
        assert_eq!(s.register(5), Acceptance::Applied);
        assert_eq!(s.register(3), Acceptance::Stale);
        assert_eq!(s.register(5), Acceptance::Stale);
        assert_eq!(s.issue(), 6);
    }

    #[test]
    fn latest_slot_ignores_out_of_order_results() {
        let mut slot: Latest<&str> = Latest::default();
        let a = slot.issue();
        let b = slot.issue();
        assert_eq!(slot.resolve(b, "newer"), Acceptance::Applied);
        assert_eq!(slot.resolve(a, "older"), Acceptance::Stale);
        assert_eq!(slot.get(), Some(&"newer"));

        assert_eq!(slot.offer(10, "ten"), Acceptance::Applied);
        assert_eq!(slot.offer(9, "nine"), Acceptance::Stale);
        assert_eq!(slot.get(), Some(&"ten"));
        assert_eq!(slot.seq(), 10);
    }

    #[test]
    fn clear_invalidates_in_flight_requests() {
        let mut slot: Latest<u32> = Latest::default();
        let pending = slot.issue();
        slot.clear();
        assert_eq!(slot.resolve(pending, 1), Acceptance::Stale);
        assert!(slot.get().is_none());
    }

    #[test]
    fn clear_does_not_consume_caller_numbers() {
        let mut slot: Latest<&str> = Latest::default();
        assert_eq!(slot.clear(), 0);
        assert_eq!(slot.offer(1, "first"), Acceptance::Applied);
        assert_eq!(slot.clear(), 1);
        assert!(slot.get().is_none());
        assert_eq!(slot.offer(2, "second"), Acceptance::Applied);
        assert_eq!(slot.get(), Some(&"second"));
        assert_eq!(slot.offer(2, "again"), Acceptance::Stale);
    }

    #[test]
    fn settle_keeps_issuing_after_last_number() {
        let mut s = Sequencer::default();
        let pending = s.issue();
        assert_eq!(s.settle(), pending);
        assert_eq!(s.accept(pending), Acceptance::Stale);
        let next = s.issue();
        assert_eq!(next, pending + 1);
        assert_eq!(s.accept(next), Acceptance::Applied);
    }
}
