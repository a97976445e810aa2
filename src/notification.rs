//! Non-blocking notices for recoverable failures

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const DEFAULT_NOTICE_DURATION: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Which part of the viewer raised a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeTopic {
    Document,
    Render,
    Persistence,
    Audio,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    pub topic: NoticeTopic,
    /// How many times the same notice was raised while it was live
    pub repeats: u32,
    pub expires_at: Instant,
}

impl Notification {
    pub fn new(
        message: impl Into<String>,
        level: NotificationLevel,
        topic: NoticeTopic,
        ttl: Duration,
    ) -> Self {
        Self {
            message: message.into(),
            level,
            topic,
            repeats: 1,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn time_remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    fn same_as(&self, other: &Notification) -> bool {
        self.topic == other.topic && self.level == other.level && self.message == other.message
    }
}

/// Live notices, newest first.
///
/// Raising a notice identical to a live one moves it to the front and
/// extends it instead of stacking a copy, so a storage backend failing on
/// every save shows up once.
#[derive(Debug)]
pub struct NotificationManager {
    live: VecDeque<Notification>,
    ttl: Duration,
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationManager {
    pub fn new() -> Self {
        Self::with_default_duration(DEFAULT_NOTICE_DURATION)
    }

    pub fn with_default_duration(ttl: Duration) -> Self {
        Self {
            live: VecDeque::new(),
            ttl,
        }
    }

    /// Record a notice; returns the live entry for forwarding to the host
    pub fn notify(
        &mut self,
        message: impl Into<String>,
        level: NotificationLevel,
        topic: NoticeTopic,
    ) -> Notification {
        let mut notice = Notification::new(message, level, topic, self.ttl);
        if let Some(index) = self.live.iter().position(|n| n.same_as(&notice)) {
            if let Some(previous) = self.live.remove(index) {
                notice.repeats = previous.repeats.saturating_add(1);
            }
        }
        self.live.push_front(notice.clone());
        notice
    }

    pub fn warn(&mut self, topic: NoticeTopic, message: impl Into<String>) -> Notification {
        self.notify(message, NotificationLevel::Warning, topic)
    }

    pub fn error(&mut self, topic: NoticeTopic, message: impl Into<String>) -> Notification {
        self.notify(message, NotificationLevel::Error, topic)
    }

    /// Drop expired notices; true if any went away
    pub fn update(&mut self) -> bool {
        let now = Instant::now();
        let before = self.live.len();
        self.live.retain(|n| !n.is_expired_at(now));
        self.live.len() != before
    }

    pub fn current(&self) -> Option<&Notification> {
        self.live.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.live.iter()
    }

    /// Newest live notice about `topic`
    pub fn latest(&self, topic: NoticeTopic) -> Option<&Notification> {
        self.live.iter().find(|n| n.topic == topic)
    }

    pub fn dismiss_current(&mut self) -> bool {
        self.live.pop_front().is_some()
    }

    /// Dismiss every notice about `topic`, e.g. once a retry succeeded
    pub fn dismiss_topic(&mut self, topic: NoticeTopic) -> usize {
        let before = self.live.len();
        self.live.retain(|n| n.topic != topic);
        before - self.live.len()
    }

    pub fn count(&self) -> usize {
        self.live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn notices_expire() {
        let mut manager = NotificationManager::with_default_duration(Duration::from_millis(50));
        let notice = manager.warn(NoticeTopic::Audio, "clip missing");
        assert!(!notice.is_expired());
        assert!(!manager.update());

        thread::sleep(Duration::from_millis(60));
        assert!(notice.is_expired());
        assert!(manager.update());
        assert_eq!(manager.count(), 0);
    }

    #[test]
    fn newest_notice_is_current() {
        let mut manager = NotificationManager::new();
        manager.warn(NoticeTopic::Render, "page 3 failed");
        manager.error(NoticeTopic::Persistence, "save failed");

        let current = manager.current().unwrap();
        assert_eq!(current.topic, NoticeTopic::Persistence);
        assert_eq!(current.level, NotificationLevel::Error);
        assert_eq!(
            manager.latest(NoticeTopic::Render).unwrap().message,
            "page 3 failed"
        );
    }

    #[test]
    fn repeated_notice_is_coalesced() {
        let mut manager = NotificationManager::new();
        manager.warn(NoticeTopic::Persistence, "disk full");
        manager.warn(NoticeTopic::Render, "page 2 failed");
        let again = manager.warn(NoticeTopic::Persistence, "disk full");

        assert_eq!(again.repeats, 2);
        assert_eq!(manager.count(), 2);
        assert_eq!(manager.current().unwrap().message, "disk full");
    }

    #[test]
    fn dismissing_by_topic() {
        let mut manager = NotificationManager::new();
        manager.warn(NoticeTopic::Render, "page 1 failed");
        manager.warn(NoticeTopic::Render, "page 2 failed");
        manager.warn(NoticeTopic::Audio, "no output device");

        assert_eq!(manager.dismiss_topic(NoticeTopic::Render), 2);
        assert!(manager.dismiss_current());
        assert!(!manager.dismiss_current());
    }
}
