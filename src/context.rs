use tokio::sync::watch;

use crate::models::CalorieStatus;
use crate::targets::{derive_status, remaining};

/// Create the state shared by the dashboard and the meal log, with a zero target and
/// nothing consumed. The dashboard owns the target writer and the meal log the
/// consumption writer. Writers can't be cloned; readers can.
pub fn channel() -> (TargetWriter, ConsumptionWriter, ContextReader) {
    let (target_tx, target_rx) = watch::channel(0i64);
    let (consumed_tx, consumed_rx) = watch::channel(0u32);
    (
        TargetWriter(target_tx),
        ConsumptionWriter(consumed_tx),
        ContextReader {
            target: target_rx,
            consumed: consumed_rx,
        },
    )
}

#[derive(Debug)]
pub struct TargetWriter(watch::Sender<i64>);

impl TargetWriter {
    pub fn publish(&self, daily_calorie_target: i64) {
        self.0.send_replace(daily_calorie_target);
    }
}

#[derive(Debug)]
pub struct ConsumptionWriter(watch::Sender<u32>);

impl ConsumptionWriter {
    pub fn publish(&self, consumed: u32) {
        self.0.send_replace(consumed);
    }
}

#[derive(Debug, Clone)]
pub struct ContextReader {
    target: watch::Receiver<i64>,
    consumed: watch::Receiver<u32>,
}

impl ContextReader {
    pub fn daily_target(&self) -> i64 {
        *self.target.borrow()
    }

    pub fn consumed(&self) -> u32 {
        *self.consumed.borrow()
    }

    pub fn status(&self) -> CalorieStatus {
        derive_status(self.consumed(), self.daily_target())
    }

    pub fn remaining(&self) -> i64 {
        remaining(self.consumed(), self.daily_target())
    }

    /// Wait until either value changes. Errors once a writer has been dropped.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        tokio::select! {
            res = self.target.changed() => res,
            res = self.consumed.changed() => res,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_see_both_writers() {
        let (target, consumed, reader) = channel();
        assert_eq!(reader.status(), CalorieStatus::Deficit);

        target.publish(2000);
        consumed.publish(1950);
        let other = reader.clone();
        assert_eq!(other.daily_target(), 2000);
        assert_eq!(other.consumed(), 1950);
        assert_eq!(other.status(), CalorieStatus::OnTarget);
        assert_eq!(other.remaining(), 50);
    }

    #[tokio::test]
    async fn changed_wakes_on_consumption() {
        let (_target, consumed, mut reader) = channel();
        let waiter = tokio::spawn(async move {
            reader.changed().await.unwrap();
            reader.consumed()
        });
        consumed.publish(640);
        assert_eq!(waiter.await.unwrap(), 640);
    }
}
