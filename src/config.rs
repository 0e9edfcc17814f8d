use std::time::Duration;

/// Bound applied to connect, each write and each read.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Most bytes taken from a single receive on the ping stream or the query
/// handshake.
pub const DEFAULT_READ_BUFFER: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub timeout: Duration,
    pub read_buffer: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }
}

impl ProbeConfig {
    pub fn builder() -> ProbeConfigBuilder {
        ProbeConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct ProbeConfigBuilder {
    config: ProbeConfig,
}

impl ProbeConfigBuilder {
    /// Sockets reject a zero timeout, so anything shorter than a millisecond
    /// is raised to one.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout.max(Duration::from_millis(1));
        self
    }

    pub fn read_buffer(mut self, bytes: usize) -> Self {
        self.config.read_buffer = bytes.max(1);
        self
    }

    pub fn build(self) -> ProbeConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProbeConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.read_buffer, 2048);
    }

    #[test]
    fn zero_timeout_is_raised() {
        let config = ProbeConfig::builder().timeout(Duration::ZERO).build();
        assert_eq!(config.timeout, Duration::from_millis(1));
    }
}
