use std::fmt;
use std::time::Instant;

use crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use rand::{rngs::StdRng, SeedableRng};
use ratatui::layout::Rect;
use tracing::{debug, warn};

use crate::{
    config::{Config, ConfigStore},
    identity::{IdentityEvent, IdentityWidget},
    runtime::TrainerEvent,
    session::SessionConfig,
    trainer::{Phase, StartOutcome, Trainer},
    ui,
};

const PAGE_SCROLL: usize = 10;

/// Controller: owns the trainer and the identity widget and maps input onto them
pub struct App {
    trainer: Trainer,
    menu: SessionConfig,
    config: Config,
    store: Box<dyn ConfigStore>,
    identity: IdentityWidget,
    notice: Option<String>,
    results_scroll: usize,
    rng: StdRng,
    should_quit: bool,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("phase", &self.trainer.phase())
            .field("menu", &self.menu)
            .field("notice", &self.notice)
            .field("results_scroll", &self.results_scroll)
            .field("identity", &self.identity)
            .field("should_quit", &self.should_quit)
            .finish()
    }
}

impl App {
    pub fn new(
        trainer: Trainer,
        config: Config,
        store: Box<dyn ConfigStore>,
        identity: IdentityWidget,
    ) -> Self {
        Self {
            trainer,
            menu: config.session_config(),
            config,
            store,
            identity,
            notice: None,
            results_scroll: 0,
            rng: StdRng::from_entropy(),
            should_quit: false,
        }
    }

    /// Replace the shuffle source, e.g. with a seeded one for reproducible runs
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn trainer(&self) -> &Trainer {
        &self.trainer
    }

    pub fn phase(&self) -> Phase {
        self.trainer.phase()
    }

    /// Difficulty and length currently selected on the menu
    pub fn menu(&self) -> SessionConfig {
        self.menu
    }

    pub fn length_bounds(&self) -> (usize, usize) {
        self.config.length_bounds()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn identity(&self) -> &IdentityWidget {
        &self.identity
    }

    pub fn identity_mut(&mut self) -> &mut IdentityWidget {
        &mut self.identity
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn results_scroll(&self) -> usize {
        self.results_scroll
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Dispatch one runner event. `area` is the last drawn frame size, used for mouse hit-testing.
    pub fn handle(&mut self, event: TrainerEvent, area: Rect, now: Instant) {
        match event {
            TrainerEvent::Key(key) => self.on_key(key, now),
            TrainerEvent::Mouse(mouse) => self.on_mouse(mouse, area, now),
            TrainerEvent::Tick => {
                self.on_tick(now);
            }
            TrainerEvent::Resize => {}
            TrainerEvent::Identity(event) => self.on_identity(event),
        }
    }

    pub fn on_tick(&mut self, now: Instant) -> bool {
        self.trainer.on_tick(now)
    }

    pub fn on_identity(&mut self, event: IdentityEvent) {
        self.identity.handle(event);
    }

    pub fn on_key(&mut self, key: KeyEvent, now: Instant) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if key.code == KeyCode::Esc
            || (key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c'))
        {
            self.quit();
            return;
        }

        match self.trainer.phase() {
            Phase::Menu => self.on_menu_key(key.code, now),
            Phase::Playing => {
                if let KeyCode::Char(c) = key.code {
                    if let Some(n) = c.to_digit(10).filter(|n| *n >= 1) {
                        self.trainer.select_option(n as usize - 1, now);
                    }
                }
            }
            Phase::Feedback => {
                if matches!(key.code, KeyCode::Enter | KeyCode::Char(' ')) {
                    self.advance(now);
                }
            }
            Phase::Results => self.on_results_key(key.code, now),
        }
    }

    fn on_menu_key(&mut self, code: KeyCode, now: Instant) {
        match code {
            KeyCode::Tab | KeyCode::Char('l') => {
                self.menu.difficulty = self.menu.difficulty.next();
                self.notice = None;
            }
            KeyCode::BackTab | KeyCode::Char('h') => {
                self.menu.difficulty = self.menu.difficulty.prev();
                self.notice = None;
            }
            KeyCode::Left | KeyCode::Char('-') => {
                self.menu.length = self.config.clamp_length(self.menu.length.saturating_sub(1));
            }
            KeyCode::Right | KeyCode::Char('+') | KeyCode::Char('=') => {
                self.menu.length = self.config.clamp_length(self.menu.length + 1);
            }
            KeyCode::Enter => self.start(now),
            KeyCode::Char('g') => self.identity.sign_in(),
            KeyCode::Char('o') => self.identity.sign_out(),
            _ => {}
        }
    }

    fn on_results_key(&mut self, code: KeyCode, now: Instant) {
        let max_scroll = self.trainer.results().len().saturating_sub(1);

        match code {
            KeyCode::Enter | KeyCode::Char('r') => {
                let outcome = self.trainer.train_again(&mut self.rng, now);
                self.after_start(outcome);
            }
            KeyCode::Char('m') => {
                self.trainer.return_to_menu();
                self.results_scroll = 0;
            }
            KeyCode::Up => self.results_scroll = self.results_scroll.saturating_sub(1),
            KeyCode::Down => self.results_scroll = (self.results_scroll + 1).min(max_scroll),
            KeyCode::PageUp => self.results_scroll = self.results_scroll.saturating_sub(PAGE_SCROLL),
            KeyCode::PageDown => {
                self.results_scroll = (self.results_scroll + PAGE_SCROLL).min(max_scroll)
            }
            KeyCode::Home => self.results_scroll = 0,
            KeyCode::Char('g') => self.identity.sign_in(),
            KeyCode::Char('o') => self.identity.sign_out(),
            _ => {}
        }
    }

    pub fn on_mouse(&mut self, mouse: MouseEvent, area: Rect, now: Instant) {
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {}
            MouseEventKind::ScrollDown if self.phase() == Phase::Results => {
                return self.on_results_key(KeyCode::Down, now);
            }
            MouseEventKind::ScrollUp if self.phase() == Phase::Results => {
                return self.on_results_key(KeyCode::Up, now);
            }
            _ => return,
        }

        match self.trainer.phase() {
            Phase::Playing => {
                let hit = self.trainer.current_decision().and_then(|decision| {
                    ui::option_at(area, decision, mouse.column, mouse.row)
                });
                if let Some(index) = hit {
                    self.trainer.select_option(index, now);
                }
            }
            Phase::Feedback => self.advance(now),
            Phase::Menu | Phase::Results => {}
        }
    }

    fn start(&mut self, now: Instant) {
        let outcome = self.trainer.start_session(self.menu, &mut self.rng, now);
        if let StartOutcome::Started { .. } = outcome {
            self.config.remember(&self.menu);
            if let Err(e) = self.store.save(&self.config) {
                warn!(error = %e, "failed to save menu settings");
            }
        }
        self.after_start(outcome);
    }

    fn after_start(&mut self, outcome: StartOutcome) {
        match outcome {
            StartOutcome::Started { .. } => {
                self.notice = None;
                self.results_scroll = 0;
            }
            StartOutcome::NoScenarios => {
                self.notice = Some(format!(
                    "No {} scenarios available. Pick another difficulty.",
                    self.menu.difficulty.to_string().to_lowercase()
                ));
            }
        }
    }

    fn advance(&mut self, now: Instant) {
        if self.trainer.advance(now) == Phase::Results {
            self.results_scroll = 0;
        }
    }

    fn quit(&mut self) {
        debug!(phase = %self.trainer.phase(), "quit requested");
        self.trainer.disarm();
        self.should_quit = true;
    }
}
