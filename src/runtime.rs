use std::cell::Cell;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyEvent, MouseEvent};

use crate::identity::IdentityEvent;

pub const TICK_RATE_MS: u64 = 100;

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum TrainerEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize,
    Tick,
    Identity(IdentityEvent),
}

/// Source of terminal events (keyboard, mouse, resize) and background notifications
pub trait TrainerEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<TrainerEvent, RecvTimeoutError>;

    /// Handle other threads can use to post events into this source
    fn sender(&self) -> Sender<TrainerEvent>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    tx: Sender<TrainerEvent>,
    rx: Receiver<TrainerEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let reader_tx = tx.clone();

        std::thread::spawn(move || loop {
            let evt = match event::read() {
                Ok(CtEvent::Key(key)) => TrainerEvent::Key(key),
                Ok(CtEvent::Mouse(mouse)) => TrainerEvent::Mouse(mouse),
                Ok(CtEvent::Resize(_, _)) => TrainerEvent::Resize,
                Ok(_) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "terminal event reader stopped");
                    break;
                }
            };

            if reader_tx.send(evt).is_err() {
                break;
            }
        });

        Self { tx, rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainerEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<TrainerEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn sender(&self) -> Sender<TrainerEvent> {
        self.tx.clone()
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedTicker {
    fn default() -> Self {
        Self::new(Duration::from_millis(TICK_RATE_MS))
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    tx: Sender<TrainerEvent>,
    rx: Receiver<TrainerEvent>,
}

impl TestEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }
}

impl Default for TestEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainerEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<TrainerEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn sender(&self) -> Sender<TrainerEvent> {
        self.tx.clone()
    }
}

/// Runner that advances the application one event/tick at a time.
///
/// Ticks follow a fixed schedule: a steady stream of input (mouse motion,
/// key repeat) delays a tick by at most one event, never indefinitely.
pub struct Runner<E: TrainerEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
    next_tick: Cell<Instant>,
}

impl<E: TrainerEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        let next_tick = Cell::new(Instant::now() + ticker.interval());
        Self {
            event_source,
            ticker,
            next_tick,
        }
    }

    pub fn sender(&self) -> Sender<TrainerEvent> {
        self.event_source.sender()
    }

    /// Blocks until the next tick is due and returns the next event, or Tick once it is
    pub fn step(&self) -> TrainerEvent {
        let now = Instant::now();
        let deadline = self.next_tick.get();

        if now >= deadline {
            return self.tick(deadline, now);
        }

        match self.event_source.recv_timeout(deadline - now) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) => self.tick(deadline, Instant::now()),
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                self.tick(deadline, Instant::now())
            }
        }
    }

    /// Schedule the tick after `deadline`; a runner that fell behind skips ahead
    fn tick(&self, deadline: Instant, now: Instant) -> TrainerEvent {
        let interval = self.ticker.interval();
        let next = deadline + interval;
        self.next_tick
            .set(if next <= now { now + interval } else { next });
        TrainerEvent::Tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyModifiers, MouseEventKind};

    #[test]
    fn step_returns_tick_on_timeout() {
        let es = TestEventSource::new();
        let ticker = FixedTicker::new(Duration::from_millis(1));
        let runner = Runner::new(es, ticker);

        // With no events available, step should yield Tick
        match runner.step() {
            TrainerEvent::Tick => {}
            other => panic!("expected Tick on timeout, got {other:?}"),
        }
    }

    #[test]
    fn step_passes_through_events() {
        let es = TestEventSource::new();
        es.sender().send(TrainerEvent::Resize).unwrap();
        let runner = Runner::new(es, FixedTicker::new(Duration::from_millis(10)));

        match runner.step() {
            TrainerEvent::Resize => {}
            other => panic!("expected Resize event, got {other:?}"),
        }
    }

    #[test]
    fn runner_sender_feeds_the_same_queue() {
        let runner = Runner::new(TestEventSource::new(), FixedTicker::default());
        runner
            .sender()
            .send(TrainerEvent::Identity(IdentityEvent::SessionResolved(None)))
            .unwrap();

        match runner.step() {
            TrainerEvent::Identity(IdentityEvent::SessionResolved(None)) => {}
            other => panic!("expected identity event, got {other:?}"),
        }
    }

    #[test]
    fn ticks_keep_coming_under_constant_input() {
        let runner = Runner::new(
            TestEventSource::new(),
            FixedTicker::new(Duration::from_millis(20)),
        );
        let tx = runner.sender();

        std::thread::spawn(move || loop {
            let moved = TrainerEvent::Mouse(MouseEvent {
                kind: MouseEventKind::Moved,
                column: 1,
                row: 1,
                modifiers: KeyModifiers::NONE,
            });
            if tx.send(moved).is_err() {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        });

        let started = Instant::now();
        let mut ticks = 0;
        let mut moves = 0;
        while started.elapsed() < Duration::from_millis(300) {
            match runner.step() {
                TrainerEvent::Tick => ticks += 1,
                TrainerEvent::Mouse(_) => moves += 1,
                other => panic!("unexpected event {other:?}"),
            }
        }

        assert!(moves > 0);
        assert!(ticks >= 5, "only {ticks} ticks in 300ms of mouse motion");
    }

    #[test]
    fn queued_events_do_not_postpone_a_due_tick() {
        let es = TestEventSource::new();
        let runner = Runner::new(es, FixedTicker::new(Duration::from_millis(5)));
        for _ in 0..3 {
            runner.sender().send(TrainerEvent::Resize).unwrap();
        }

        std::thread::sleep(Duration::from_millis(10));

        assert!(matches!(runner.step(), TrainerEvent::Tick));
        assert!(matches!(runner.step(), TrainerEvent::Resize));
    }

    #[test]
    fn default_ticker_uses_tick_rate() {
        assert_eq!(
            FixedTicker::default().interval(),
            Duration::from_millis(TICK_RATE_MS)
        );
    }
}
