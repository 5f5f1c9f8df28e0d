use ratatui::{buffer::Buffer, layout::Rect};

use crate::{app::App, trainer::Phase};

/// A UI Screen boundary: renders the body for one phase and names its keys
pub trait Screen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer);
    /// Key legend shown in the footer
    fn legend(&self) -> &'static str;
}

pub struct MenuScreen;

impl Screen for MenuScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        super::render_menu(app, area, buf);
    }

    fn legend(&self) -> &'static str {
        "(tab) difficulty / (←/→) length / (enter) start / (g) sign in / (o) sign out / (esc)ape"
    }
}

pub struct PlayingScreen;

impl Screen for PlayingScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        super::render_playing(app, area, buf);
    }

    fn legend(&self) -> &'static str {
        "(1-4) or click to choose / (esc)ape"
    }
}

pub struct FeedbackScreen;

impl Screen for FeedbackScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        super::render_feedback(app, area, buf);
    }

    fn legend(&self) -> &'static str {
        "(enter/space) or click to continue / (esc)ape"
    }
}

pub struct ResultsScreen;

impl Screen for ResultsScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        super::render_results(app, area, buf);
    }

    fn legend(&self) -> &'static str {
        "(r)/(enter) train again / (m)enu / (↑/↓) scroll / (esc)ape"
    }
}

/// Helper to construct the appropriate screen for the current phase
pub fn current_screen(phase: Phase) -> Box<dyn Screen> {
    match phase {
        Phase::Menu => Box::new(MenuScreen),
        Phase::Playing => Box::new(PlayingScreen),
        Phase::Feedback => Box::new(FeedbackScreen),
        Phase::Results => Box::new(ResultsScreen),
    }
}
