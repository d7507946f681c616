use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::time::{Duration, Instant};

/// Terminal input, or a tick once per tick rate. Ticks are when the UI
/// picks up new snapshots and replies from the refresh engine.
pub enum AppEvent {
    Key(KeyEvent),
    Tick,
    Resize(u16, u16),
}

pub struct EventHandler {
    tick_rate: Duration,
    last_tick: Instant,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        Self {
            tick_rate,
            last_tick: Instant::now(),
        }
    }

    /// Blocks until input arrives or the next tick is due. A steady stream
    /// of key repeats cannot starve ticks.
    pub fn next(&mut self) -> std::io::Result<AppEvent> {
        loop {
            let timeout = self.tick_rate.saturating_sub(self.last_tick.elapsed());
            if timeout.is_zero() || !event::poll(timeout)? {
                self.last_tick = Instant::now();
                return Ok(AppEvent::Tick);
            }
            match event::read()? {
                CrosstermEvent::Key(key) if key.kind == KeyEventKind::Press => {
                    return Ok(AppEvent::Key(key));
                }
                CrosstermEvent::Resize(w, h) => return Ok(AppEvent::Resize(w, h)),
                _ => {}
            }
        }
    }
}
