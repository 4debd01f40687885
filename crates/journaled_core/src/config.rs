//! Overlay configuration.

/// Policy for a journal left behind by a previous session.
///
/// The two flags are independent. Enabling both gives fully automatic
/// recovery, enabling neither makes any leftover journal a hard stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenPolicy {
    /// Apply a committed journal found at open.
    pub apply_committed: bool,

    /// Delete an uncommitted or unreadable journal found at open.
    pub discard_uncommitted: bool,
}

impl OpenPolicy {
    /// Refuse to open while any journal is left behind.
    pub const NONE: Self = Self {
        apply_committed: false,
        discard_uncommitted: false,
    };

    /// Apply committed journals and discard uncommitted ones.
    pub const AUTOMATIC: Self = Self {
        apply_committed: true,
        discard_uncommitted: true,
    };

    /// Sets whether committed journals are applied.
    #[must_use]
    pub const fn apply_committed(mut self, value: bool) -> Self {
        self.apply_committed = value;
        self
    }

    /// Sets whether uncommitted journals are discarded.
    #[must_use]
    pub const fn discard_uncommitted(mut self, value: bool) -> Self {
        self.discard_uncommitted = value;
        self
    }
}

impl Default for OpenPolicy {
    fn default() -> Self {
        Self {
            apply_committed: true,
            discard_uncommitted: false,
        }
    }
}

/// Configuration for opening a journaled stream.
#[derive(Debug, Clone)]
pub struct Config {
    /// Policy applied to a journal left by a previous session.
    pub policy: OpenPolicy,

    /// Whether commit uses `sync` (data and metadata durable) rather than
    /// `flush` at its durability points.
    pub sync_on_commit: bool,

    /// Identifier of the journal store. Empty names the primary journal.
    pub journal_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy: OpenPolicy::default(),
            sync_on_commit: true,
            journal_id: String::new(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the open policy.
    #[must_use]
    pub fn policy(mut self, policy: OpenPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets whether commit syncs rather than flushes.
    #[must_use]
    pub fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the journal identifier.
    #[must_use]
    pub fn journal_id(mut self, id: impl Into<String>) -> Self {
        self.journal_id = id.into();
        self
    }
}
