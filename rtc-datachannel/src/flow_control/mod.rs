#[cfg(test)]
mod flow_control_test;

use std::sync::{Arc, Mutex};

pub type OnBufferedAmountLowHdlrFn = Box<dyn FnMut() + Send>;

/// FlowControlAccount tracks the bytes handed to the transport for one data
/// channel that the transport has not yet confirmed as flushed.
///
/// The buffered amount never goes below zero. The low watermark fires once per
/// downward crossing: only a `subtract` that moves the amount from strictly
/// above the threshold to at-or-below it reports a crossing. The threshold and
/// the handler may be configured at any time; crossings are only reported once
/// the account is activated, which the channel does when it opens.
#[derive(Default)]
pub struct FlowControlAccount {
    buffered_amount: usize,
    threshold: usize,
    active: bool,
    on_low: Option<Arc<Mutex<OnBufferedAmountLowHdlrFn>>>,
}

impl FlowControlAccount {
    pub fn new() -> Self {
        Self::default()
    }

    /// add accounts for n bytes handed to the transport.
    pub fn add(&mut self, n: usize) {
        self.buffered_amount = self.buffered_amount.saturating_add(n);
    }

    /// subtract accounts for n bytes the transport confirmed as flushed.
    /// Returns true when the buffered amount crossed the low watermark.
    pub fn subtract(&mut self, n: usize) -> bool {
        let before = self.buffered_amount;
        self.buffered_amount = before.saturating_sub(n);

        self.active && before > self.threshold && self.buffered_amount <= self.threshold
    }

    /// rollback takes back bytes that were accounted for a write the
    /// transport rejected. It never reports a crossing.
    pub fn rollback(&mut self, n: usize) {
        self.buffered_amount = self.buffered_amount.saturating_sub(n);
    }

    /// activate starts reporting crossings. Nothing is reported for what
    /// happened before.
    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn amount(&self) -> usize {
        self.buffered_amount
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold;
    }

    pub fn set_on_low(&mut self, f: OnBufferedAmountLowHdlrFn) {
        self.on_low = Some(Arc::new(Mutex::new(f)));
    }

    /// The handler registered at the time of the call, if any.
    pub fn on_low(&self) -> Option<Arc<Mutex<OnBufferedAmountLowHdlrFn>>> {
        self.on_low.clone()
    }
}
