//! Request tickets.
//!
//! Every request issued for a target field takes a ticket. When the
//! response arrives it may only be applied if no newer ticket was issued for
//! the same target in the meantime; otherwise it is dropped.

use std::sync::{Mutex, PoisonError};

use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    key: String,
    generation: u64,
    /// Value the request was issued for (parent value, row product), for logs.
    tag: String,
}

impl RequestTicket {
    pub fn key(&self) -> &str { &self.key }
    pub fn generation(&self) -> u64 { self.generation }
    pub fn tag(&self) -> &str { &self.tag }
}

#[derive(Debug, Default)]
pub struct TicketBook {
    latest: Mutex<FxHashMap<String, u64>>,
}

impl TicketBook {
    pub fn new() -> Self { Self::default() }

    /// Issue a ticket for `key`, superseding every earlier one.
    pub fn issue(&self, key: &str, tag: &str) -> RequestTicket {
        let generation = self.bump(key);
        RequestTicket { key: key.to_string(), generation, tag: tag.to_string() }
    }

    /// Supersede outstanding tickets for `key` without issuing a new one.
    pub fn invalidate(&self, key: &str) { self.bump(key); }

    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        latest.get(&ticket.key).copied() == Some(ticket.generation)
    }

    fn bump(&self, key: &str) -> u64 {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = latest.entry(key.to_string()).or_insert(0);
        *slot = slot.saturating_add(1);
        *slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_ticket_supersedes() {
        let book = TicketBook::new();
        let a = book.issue("id_branch", "C1");
        assert!(book.is_current(&a));
        let b = book.issue("id_branch", "C2");
        assert!(!book.is_current(&a));
        assert!(book.is_current(&b));
        assert_eq!(b.tag(), "C2");
    }

    #[test]
    fn keys_are_independent() {
        let book = TicketBook::new();
        let a = book.issue("row[0].price-input", "P1");
        let _b = book.issue("row[1].price-input", "P1");
        assert!(book.is_current(&a));
    }

    #[test]
    fn invalidate_drops_outstanding() {
        let book = TicketBook::new();
        let a = book.issue("id_order", "7");
        book.invalidate("id_order");
        assert!(!book.is_current(&a));
    }
}
