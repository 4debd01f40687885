//! Nonce sources for journal headers.
//!
//! A nonce binds a journal's header to its footer. It only needs to be
//! unlikely to repeat across journals created for the same origin.

use rand::RngCore;

/// Supplies nonces for new journals.
pub trait NonceSource: Send {
    /// Returns the next nonce.
    fn next_nonce(&mut self) -> u64;
}

/// Draws nonces from the thread-local random generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomNonceSource;

impl NonceSource for RandomNonceSource {
    fn next_nonce(&mut self) -> u64 {
        rand::thread_rng().next_u64()
    }
}

/// Hands out consecutive nonces, for deterministic tests.
#[derive(Debug, Clone)]
pub struct SequentialNonceSource {
    next: u64,
}

impl SequentialNonceSource {
    /// Creates a source whose first nonce is `start`.
    #[must_use]
    pub const fn new(start: u64) -> Self {
        Self { next: start }
    }
}

impl NonceSource for SequentialNonceSource {
    fn next_nonce(&mut self) -> u64 {
        let nonce = self.next;
        self.next = self.next.wrapping_add(1);
        nonce
    }
}
