use std::fmt::{Display, Formatter, Result};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerState {
    Initialized,
    Consuming,
    Cancelled,
    ChannelClosed,
    Closed,
}

impl ConsumerState {
    pub fn as_u8(self) -> u8 {
        match self {
            ConsumerState::Initialized => 0,
            ConsumerState::Consuming => 1,
            ConsumerState::Cancelled => 2,
            ConsumerState::ChannelClosed => 3,
            ConsumerState::Closed => 4,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ConsumerState::Initialized,
            1 => ConsumerState::Consuming,
            2 => ConsumerState::Cancelled,
            3 => ConsumerState::ChannelClosed,
            _ => ConsumerState::Closed,
        }
    }
}

impl Display for ConsumerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            ConsumerState::Initialized => write!(f, "initialized"),
            ConsumerState::Consuming => write!(f, "consuming"),
            ConsumerState::Cancelled => write!(f, "cancelled"),
            ConsumerState::ChannelClosed => write!(f, "channel_closed"),
            ConsumerState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn of<T, E>(result: &std::result::Result<T, E>) -> Self {
        if result.is_ok() {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

/// How a delivery left the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acked,
    Requeued,
    Discarded,
    Retried,
    DeadLettered,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Acked => "acked",
            DeliveryOutcome::Requeued => "requeued",
            DeliveryOutcome::Discarded => "discarded",
            DeliveryOutcome::Retried => "retried",
            DeliveryOutcome::DeadLettered => "dead_lettered",
        }
    }
}

impl Display for DeliveryOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}
