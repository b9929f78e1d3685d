use std::time::Duration;
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, TypedBuilder)]
pub struct DeleterSettings {
    /// Pending ids that trigger an immediate flush.
    #[builder(default = 10)]
    pub batch_size: usize,
    /// Longest time an id waits in the buffer while storage is healthy.
    #[builder(default = Duration::from_secs(10))]
    pub window: Duration,
    /// Bound of the queue between handlers and the worker.
    #[builder(default = 1024)]
    pub queue_capacity: usize,
}

impl Default for DeleterSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = DeleterSettings::default();
        assert_eq!(settings.batch_size, 10);
        assert_eq!(settings.window, Duration::from_secs(10));
        assert_eq!(settings.queue_capacity, 1024);
    }
}
