use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChannelId, MessageRef, UserId},
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, OutgoingMessage},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* API calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls per channel.
    pub per_channel_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_channel_min_interval: Duration::from_millis(350),
        }
    }
}

/// Next free send time for one lane, spaced `spacing` apart.
#[derive(Debug)]
struct Pacer {
    spacing: Duration,
    free_at: Instant,
}

impl Pacer {
    fn new(spacing: Duration, now: Instant) -> Self {
        Self {
            spacing,
            free_at: now,
        }
    }

    /// Book the earliest slot at or after `now`; returns how long to wait for it.
    fn book(&mut self, now: Instant) -> Duration {
        let slot = self.free_at.max(now);
        self.free_at = slot + self.spacing;
        slot - now
    }
}

struct Lanes {
    global: Pacer,
    channels: HashMap<ChannelId, Pacer>,
}

/// MessagingPort decorator that rate-limits outbound calls.
///
/// Widgets and prompts add and remove reactions in bursts; spacing them out keeps
/// us clear of most platform 429s. It does not guarantee zero 429s.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    lanes: Mutex<Lanes>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        let lanes = Lanes {
            global: Pacer::new(cfg.global_min_interval, Instant::now()),
            channels: HashMap::new(),
        };
        Self {
            inner,
            cfg,
            lanes: Mutex::new(lanes),
        }
    }

    /// Book a slot on the global lane and on `channel`'s lane, then sleep until both are free.
    async fn pace(&self, channel: ChannelId) {
        let wait = {
            let now = Instant::now();
            let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
            let global = lanes.global.book(now);
            let spacing = self.cfg.per_channel_min_interval;
            let local = lanes
                .channels
                .entry(channel)
                .or_insert_with(|| Pacer::new(spacing, now))
                .book(now);
            global.max(local)
        };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    fn bot_user_id(&self) -> UserId {
        self.inner.bot_user_id()
    }

    async fn send_message(&self, channel: ChannelId, msg: &OutgoingMessage) -> Result<MessageRef> {
        self.pace(channel).await;
        self.inner.send_message(channel, msg).await
    }

    async fn edit_message(&self, msg: MessageRef, content: &OutgoingMessage) -> Result<()> {
        self.pace(msg.channel_id).await;
        self.inner.edit_message(msg, content).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.pace(msg.channel_id).await;
        self.inner.delete_message(msg).await
    }

    async fn add_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        self.pace(msg.channel_id).await;
        self.inner.add_reaction(msg, emoji).await
    }

    async fn remove_reaction(&self, msg: MessageRef, emoji: &str, user: UserId) -> Result<()> {
        self.pace(msg.channel_id).await;
        self.inner.remove_reaction(msg, emoji, user).await
    }

    async fn remove_all_reactions(&self, msg: MessageRef) -> Result<()> {
        self.pace(msg.channel_id).await;
        self.inner.remove_all_reactions(msg).await
    }

    async fn release(&self, msg: MessageRef) {
        self.inner.release(msg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMessenger;

    #[tokio::test(start_paused = true)]
    async fn spaces_calls_to_the_same_channel() {
        let fake = Arc::new(FakeMessenger::new());
        let throttled = ThrottledMessenger::new(
            fake.clone(),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(0),
                per_channel_min_interval: Duration::from_millis(500),
            },
        );

        let start = Instant::now();
        let msg = OutgoingMessage::text("a");
        throttled.send_message(ChannelId(1), &msg).await.unwrap();
        throttled.send_message(ChannelId(1), &msg).await.unwrap();
        throttled.send_message(ChannelId(2), &msg).await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(start.elapsed() < Duration::from_millis(1000));
        assert_eq!(fake.sent().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn global_lane_spaces_every_channel() {
        let fake = Arc::new(FakeMessenger::new());
        let throttled = ThrottledMessenger::new(
            fake.clone(),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(100),
                per_channel_min_interval: Duration::from_millis(0),
            },
        );

        let start = Instant::now();
        let msg = OutgoingMessage::text("a");
        for channel in 1..=4 {
            throttled.send_message(ChannelId(channel), &msg).await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn release_passes_through_without_waiting() {
        let fake = Arc::new(FakeMessenger::new());
        let throttled = ThrottledMessenger::new(fake.clone(), ThrottleConfig::default());
        let msg = MessageRef {
            channel_id: ChannelId(1),
            message_id: crate::domain::MessageId(7),
        };
        let start = Instant::now();
        throttled.release(msg).await;
        throttled.release(msg).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(*fake.released.lock().unwrap(), vec![msg, msg]);
    }
}
