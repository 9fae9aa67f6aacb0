//! Per-session outbound queues.
//!
//! Two FIFOs feed the single outbound sequence: a priority queue for tool
//! results and a queue for audio and control events. Only audio frames count
//! against the bound; handshake and teardown events are never evicted.

use docchat_realtime_types::OutboundEvent;
use std::collections::VecDeque;
use std::str::FromStr;

/// What to do with a new audio frame when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressurePolicy {
    /// Evict the oldest queued audio frame to make room.
    DropOldest,
    /// Refuse the new frame and report it to the producer.
    Reject,
}

impl FromStr for BackpressurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "drop-oldest" | "drop_oldest" => Ok(Self::DropOldest),
            "reject" => Ok(Self::Reject),
            other => Err(format!(
                "'{}' is not a back-pressure policy (expected drop-oldest or reject)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Queued,
    /// Queued after evicting the oldest frame.
    DroppedOldest,
    Rejected,
}

pub(crate) struct EventQueues {
    tool: VecDeque<OutboundEvent>,
    events: VecDeque<OutboundEvent>,
    queued_audio: usize,
    max_audio: usize,
    policy: BackpressurePolicy,
}

impl EventQueues {
    pub(crate) fn new(max_audio: usize, policy: BackpressurePolicy) -> Self {
        Self {
            tool: VecDeque::new(),
            events: VecDeque::new(),
            queued_audio: 0,
            max_audio: max_audio.max(1),
            policy,
        }
    }

    pub(crate) fn push_control(&mut self, event: OutboundEvent) {
        self.events.push_back(event);
    }

    pub(crate) fn push_audio(&mut self, event: OutboundEvent) -> Admission {
        let mut admission = Admission::Queued;
        if self.queued_audio >= self.max_audio {
            match self.policy {
                BackpressurePolicy::Reject => return Admission::Rejected,
                BackpressurePolicy::DropOldest => {
                    // The oldest frame sits right behind any unsent handshake events.
                    if let Some(index) = self
                        .events
                        .iter()
                        .position(|queued| matches!(queued, OutboundEvent::AudioInput(_)))
                    {
                        self.events.remove(index);
                        self.queued_audio -= 1;
                    }
                    admission = Admission::DroppedOldest;
                }
            }
        }
        self.events.push_back(event);
        self.queued_audio += 1;
        admission
    }

    /// Pushes a group of tool events that must stay contiguous on the wire.
    pub(crate) fn push_tool(&mut self, events: impl IntoIterator<Item = OutboundEvent>) {
        self.tool.extend(events);
    }

    pub(crate) fn pop(&mut self) -> Option<OutboundEvent> {
        if let Some(event) = self.tool.pop_front() {
            return Some(event);
        }
        let event = self.events.pop_front()?;
        if matches!(event, OutboundEvent::AudioInput(_)) {
            self.queued_audio -= 1;
        }
        Some(event)
    }

    pub(crate) fn clear(&mut self) {
        self.tool.clear();
        self.events.clear();
        self.queued_audio = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.tool.len() + self.events.len()
    }

    #[cfg(test)]
    pub(crate) fn queued_audio(&self) -> usize {
        self.queued_audio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_realtime_types::events::outbound::{AudioInputEvent, PromptEndEvent, ToolResultEvent};

    fn audio(tag: &str) -> OutboundEvent {
        OutboundEvent::AudioInput(AudioInputEvent::new("p", "a", tag))
    }

    fn audio_tag(event: &OutboundEvent) -> &str {
        match event {
            OutboundEvent::AudioInput(audio) => audio.content(),
            other => panic!("expected audio, got {}", other.name()),
        }
    }

    #[test]
    fn tool_events_jump_the_queue() {
        let mut queues = EventQueues::new(8, BackpressurePolicy::Reject);
        queues.push_audio(audio("A"));
        queues.push_control(OutboundEvent::PromptEnd(PromptEndEvent::new("p")));
        queues.push_tool([OutboundEvent::ToolResult(ToolResultEvent::new(
            "p", "t", "t1", "done", None,
        ))]);

        assert_eq!(queues.pop().unwrap().name(), "toolResult");
        assert_eq!(audio_tag(&queues.pop().unwrap()), "A");
        assert_eq!(queues.pop().unwrap().name(), "promptEnd");
        assert!(queues.pop().is_none());
    }

    #[test]
    fn reject_policy_keeps_the_queue_intact() {
        let mut queues = EventQueues::new(2, BackpressurePolicy::Reject);
        assert_eq!(queues.push_audio(audio("A")), Admission::Queued);
        assert_eq!(queues.push_audio(audio("B")), Admission::Queued);
        assert_eq!(queues.push_audio(audio("C")), Admission::Rejected);
        assert_eq!(queues.queued_audio(), 2);
        assert_eq!(audio_tag(&queues.pop().unwrap()), "A");
        assert_eq!(audio_tag(&queues.pop().unwrap()), "B");
    }

    #[test]
    fn drop_oldest_evicts_audio_but_never_control_events() {
        let mut queues = EventQueues::new(2, BackpressurePolicy::DropOldest);
        queues.push_control(OutboundEvent::PromptEnd(PromptEndEvent::new("p")));
        queues.push_audio(audio("A"));
        queues.push_audio(audio("B"));
        assert_eq!(queues.push_audio(audio("C")), Admission::DroppedOldest);

        assert_eq!(queues.len(), 3);
        assert_eq!(queues.pop().unwrap().name(), "promptEnd");
        assert_eq!(audio_tag(&queues.pop().unwrap()), "B");
        assert_eq!(audio_tag(&queues.pop().unwrap()), "C");
        assert_eq!(queues.queued_audio(), 0);
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("drop-oldest".parse::<BackpressurePolicy>(), Ok(BackpressurePolicy::DropOldest));
        assert_eq!("REJECT".parse::<BackpressurePolicy>(), Ok(BackpressurePolicy::Reject));
        assert!("block".parse::<BackpressurePolicy>().is_err());
    }
}
