//! Repository configuration.

/// How a repository generates identifiers for entities added without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// A counter starting at `start`.
    Sequence {
        /// First identifier handed out.
        start: u64,
    },
    /// Microseconds since the Unix epoch, bumped by one whenever the clock
    /// has not advanced since the previous identifier.
    Timestamp,
}

impl Default for IdStrategy {
    fn default() -> Self {
        Self::Sequence { start: 1 }
    }
}

/// Configuration for opening a repository.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Name of the repository, used in log output.
    pub name: String,

    /// Whether session commits join an ambient transaction instead of
    /// being applied immediately.
    pub join_transaction: bool,

    /// Whether sessions commit after every successful add, remove or
    /// replace.
    pub autocommit: bool,

    /// Identifier generation strategy.
    pub id_strategy: IdStrategy,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            join_transaction: false,
            autocommit: false,
            id_strategy: IdStrategy::default(),
        }
    }
}

impl RepositoryConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the repository name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets whether sessions join an ambient transaction.
    #[must_use]
    pub const fn join_transaction(mut self, value: bool) -> Self {
        self.join_transaction = value;
        self
    }

    /// Sets whether sessions commit after every mutation.
    #[must_use]
    pub const fn autocommit(mut self, value: bool) -> Self {
        self.autocommit = value;
        self
    }

    /// Sets the identifier generation strategy.
    #[must_use]
    pub const fn id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }
}
