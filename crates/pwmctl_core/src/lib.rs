//!This is the core library for the pwmctl project. All other pwmctl libraries depend on this one. It holds the shared error taxonomy, the `Output` handle used to feed values into running device tasks, and the value ranges used to map normalized inputs onto pwm ticks.

use tokio::sync::mpsc;

pub mod error;
pub mod range;

///Largest value a 12 bit pwm tick counter can hold.
pub const PWM_MAX: u16 = 4095;

///Sending side of a running device task. Values sent here are applied in order.
pub struct Output<T> {
    pub tx: mpsc::Sender<T>,
}

impl<T> Output<T> {
    pub fn new() -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }
    pub fn sink(&self) -> mpsc::Sender<T> {
        self.tx.clone()
    }
}
