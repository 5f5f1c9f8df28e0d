use std::time::Instant;

use rand::{seq::SliceRandom, Rng};
use tracing::{debug, info};

use crate::catalog::{Catalog, Decision};
use crate::session::{DecisionResult, Session, SessionConfig};
use crate::summary::SessionSummary;
use crate::timer::{ArmedTimer, TimerStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Phase {
    Menu,
    Playing,
    Feedback,
    Results,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { count: usize },
    /// nothing matched the filter (or the length was zero); phase is unchanged
    NoScenarios,
}

/// Session state machine: menu -> playing -> feedback -> results.
///
/// All mutation of the running session goes through the transition methods
/// below. While in `Playing` exactly one [`ArmedTimer`] exists and it is bound
/// to the current item; every transition out of `Playing` drops it.
#[derive(Debug)]
pub struct Trainer {
    catalog: Catalog,
    phase: Phase,
    session: Session,
    timer: Option<ArmedTimer>,
    last_config: Option<SessionConfig>,
}

impl Trainer {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            phase: Phase::Menu,
            session: Session::default(),
            timer: None,
            last_config: None,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn timer(&self) -> Option<&ArmedTimer> {
        self.timer.as_ref()
    }

    pub fn current_decision(&self) -> Option<&Decision> {
        self.session.current()
    }

    pub fn results(&self) -> &[DecisionResult] {
        self.session.results()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary::from_results(self.session.results())
    }

    /// Seconds left on the current item's countdown, if one is armed
    pub fn seconds_remaining(&self) -> Option<u32> {
        self.timer.as_ref().map(|t| t.remaining())
    }

    pub fn last_config(&self) -> Option<SessionConfig> {
        self.last_config
    }

    /// Draw a fresh, shuffled selection and begin with its first item
    pub fn start_session<R: Rng + ?Sized>(
        &mut self,
        config: SessionConfig,
        rng: &mut R,
        now: Instant,
    ) -> StartOutcome {
        let mut pool: Vec<Decision> = self
            .catalog
            .filtered(config.difficulty)
            .into_iter()
            .cloned()
            .collect();

        pool.shuffle(rng);
        pool.truncate(config.length.min(pool.len()));

        if pool.is_empty() {
            info!(
                difficulty = %config.difficulty,
                length = config.length,
                "no scenarios available for session"
            );
            return StartOutcome::NoScenarios;
        }

        let count = pool.len();
        info!(difficulty = %config.difficulty, requested = config.length, count, "session started");

        self.timer = None;
        self.session = Session::new(config, pool);
        self.last_config = Some(config);
        self.enter_playing(now);

        StartOutcome::Started { count }
    }

    /// "Train again": start over with the settings of the previous session
    pub fn train_again<R: Rng + ?Sized>(&mut self, rng: &mut R, now: Instant) -> StartOutcome {
        match self.last_config {
            Some(config) => self.start_session(config, rng, now),
            None => StartOutcome::NoScenarios,
        }
    }

    /// Pick the option at `index` for the current item.
    ///
    /// Returns false (and changes nothing) unless the phase is `Playing`, the
    /// current item is still unresolved, and `index` names one of its options.
    /// A selection arriving after the countdown has run out resolves the item
    /// by timeout instead.
    pub fn select_option(&mut self, index: usize, now: Instant) -> bool {
        if self.phase != Phase::Playing || self.session.is_current_resolved() {
            return false;
        }

        if let Some(TimerStatus::Expired) = self.timer.as_mut().map(|timer| timer.poll(now)) {
            self.resolve_timeout();
            return false;
        }

        let Some(timer) = self.take_current_timer() else {
            return false;
        };

        let Some(decision) = self.session.current().cloned() else {
            return false;
        };

        let Some(option) = decision.options.get(index).cloned() else {
            self.timer = Some(timer);
            return false;
        };

        let time_spent = timer.elapsed(now).as_secs_f64();
        debug!(decision = decision.id, %option, time_spent, "option selected");

        self.session
            .record(DecisionResult::picked(decision, option, time_spent));
        self.phase = Phase::Feedback;

        true
    }

    /// Advance the countdown; resolves the current item by timeout when it runs out.
    ///
    /// Returns true when this call timed the item out.
    pub fn on_tick(&mut self, now: Instant) -> bool {
        if self.phase != Phase::Playing {
            self.timer = None;
            return false;
        }

        let status = match self.timer.as_mut() {
            Some(timer) => timer.poll(now),
            None => return false,
        };

        match status {
            TimerStatus::Running { .. } => false,
            TimerStatus::Expired => self.resolve_timeout(),
        }
    }

    fn resolve_timeout(&mut self) -> bool {
        if self.session.is_current_resolved() {
            self.timer = None;
            return false;
        }

        if self.take_current_timer().is_none() {
            return false;
        }

        let Some(decision) = self.session.current().cloned() else {
            return false;
        };

        debug!(decision = decision.id, "decision timed out");

        self.session.record(DecisionResult::timed_out(decision));
        self.phase = Phase::Feedback;

        true
    }

    /// Leave feedback: next item, or results after the last one
    pub fn advance(&mut self, now: Instant) -> Phase {
        if self.phase != Phase::Feedback {
            return self.phase;
        }

        if self.session.step() {
            self.enter_playing(now);
        } else {
            self.timer = None;
            self.phase = Phase::Results;

            let summary = self.summary();
            info!(
                total = summary.total,
                decision_rate = summary.decision_rate,
                average_time = summary.average_time,
                "session complete"
            );
        }

        self.phase
    }

    pub fn return_to_menu(&mut self) {
        self.timer = None;
        self.session = Session::default();
        self.phase = Phase::Menu;
    }

    /// Drop any countdown, e.g. when the app is shutting down
    pub fn disarm(&mut self) {
        self.timer = None;
    }

    fn enter_playing(&mut self, now: Instant) {
        self.timer = self
            .session
            .current()
            .map(|decision| ArmedTimer::arm(self.session.current_index(), decision, now));
        self.phase = Phase::Playing;
    }

    /// Remove the armed timer if it belongs to the current item; a stale
    /// timer is discarded and `None` returned.
    fn take_current_timer(&mut self) -> Option<ArmedTimer> {
        let timer = self.timer.take()?;
        let current = self.session.current()?;

        if timer.is_bound_to(self.session.current_index(), current.id) {
            Some(timer)
        } else {
            debug!(
                item = timer.item_index(),
                "discarding timer bound to a different item"
            );
            None
        }
    }

    #[cfg(test)]
    pub(crate) fn force_timer(&mut self, timer: Option<ArmedTimer>) {
        self.timer = timer;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Difficulty, DifficultyFilter};
    use crate::session::{Choice, NO_DECISION};
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashSet;
    use std::time::Duration;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn trainer() -> Trainer {
        Trainer::new(Catalog::builtin().unwrap())
    }

    fn config(difficulty: DifficultyFilter, length: usize) -> SessionConfig {
        SessionConfig { difficulty, length }
    }

    #[test]
    fn test_initial_phase_is_menu() {
        let t = trainer();
        assert_eq!(t.phase(), Phase::Menu);
        assert!(t.timer().is_none());
        assert!(t.results().is_empty());
    }

    #[test]
    fn test_start_easy_session_of_three() {
        let mut t = trainer();
        let outcome = t.start_session(config(DifficultyFilter::Easy, 3), &mut rng(), Instant::now());

        assert_eq!(outcome, StartOutcome::Started { count: 3 });
        assert_eq!(t.phase(), Phase::Playing);
        assert_eq!(t.session().len(), 3);
        assert!(t
            .session()
            .selected()
            .iter()
            .all(|d| d.difficulty == Difficulty::Easy));
        assert_eq!(t.session().current_index(), 0);
        assert!(t.results().is_empty());
        assert_eq!(
            t.seconds_remaining(),
            Some(t.current_decision().unwrap().time_limit)
        );
    }

    #[test]
    fn test_start_clamps_to_available() {
        let mut t = trainer();
        let outcome = t.start_session(config(DifficultyFilter::Hard, 15), &mut rng(), Instant::now());

        assert_eq!(outcome, StartOutcome::Started { count: 4 });
        let ids: HashSet<u32> = t.session().selected().iter().map(|d| d.id).collect();
        assert_eq!(ids, HashSet::from([21, 22, 23, 24]));
    }

    #[test]
    fn test_selection_is_subset_without_repeats() {
        for filter in DifficultyFilter::ALL {
            let mut t = trainer();
            t.start_session(config(filter, 10), &mut rng(), Instant::now());

            let matching = t.catalog().count_matching(filter);
            assert_eq!(t.session().len(), matching.min(10));

            let ids: HashSet<u32> = t.session().selected().iter().map(|d| d.id).collect();
            assert_eq!(ids.len(), t.session().len());
            assert!(t
                .session()
                .selected()
                .iter()
                .all(|d| filter.matches(d.difficulty)));
        }
    }

    #[test]
    fn test_start_with_no_matches_is_noop() {
        let json = r#"{"name": "tiny", "decisions": [
            {"id": 1, "category": "c", "scenario": "s", "options": ["a", "b"], "time_limit": 3, "difficulty": "easy"}
        ]}"#;
        let mut t = Trainer::new(Catalog::from_json_str(json).unwrap());

        let outcome = t.start_session(config(DifficultyFilter::Hard, 5), &mut rng(), Instant::now());

        assert_eq!(outcome, StartOutcome::NoScenarios);
        assert_eq!(t.phase(), Phase::Menu);
        assert!(t.timer().is_none());
    }

    #[test]
    fn test_start_with_zero_length_is_noop() {
        let mut t = trainer();
        let outcome = t.start_session(config(DifficultyFilter::All, 0), &mut rng(), Instant::now());

        assert_eq!(outcome, StartOutcome::NoScenarios);
        assert_eq!(t.phase(), Phase::Menu);
    }

    #[test]
    fn test_select_second_option() {
        let mut t = trainer();
        let start = Instant::now();
        t.start_session(config(DifficultyFilter::Medium, 1), &mut rng(), start);
        let expected = t.current_decision().unwrap().options[1].clone();

        assert!(t.select_option(1, start + Duration::from_millis(1500)));

        assert_eq!(t.phase(), Phase::Feedback);
        assert!(t.timer().is_none());
        let result = t.results().last().unwrap();
        assert_eq!(result.chosen, Choice::Picked(expected));
        assert!(!result.timed_out);
        assert!((result.time_spent - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_option_ignored() {
        let mut t = trainer();
        let start = Instant::now();
        t.start_session(config(DifficultyFilter::Easy, 1), &mut rng(), start);
        let count = t.current_decision().unwrap().options.len();

        assert!(!t.select_option(count, start));
        assert_eq!(t.phase(), Phase::Playing);
        assert!(t.timer().is_some());
        assert!(t.results().is_empty());
    }

    #[test]
    fn test_double_selection_ignored() {
        let mut t = trainer();
        let start = Instant::now();
        t.start_session(config(DifficultyFilter::All, 2), &mut rng(), start);

        assert!(t.select_option(0, start));
        assert!(!t.select_option(1, start));
        assert_eq!(t.results().len(), 1);
        assert_eq!(t.phase(), Phase::Feedback);
    }

    #[test]
    fn test_select_outside_playing_ignored() {
        let mut t = trainer();
        assert!(!t.select_option(0, Instant::now()));
        assert_eq!(t.phase(), Phase::Menu);
    }

    #[test]
    fn test_timeout_records_no_decision() {
        let mut t = trainer();
        let start = Instant::now();
        t.start_session(config(DifficultyFilter::All, 2), &mut rng(), start);
        let limit = t.current_decision().unwrap().time_limit;

        assert!(!t.on_tick(start + Duration::from_secs(limit as u64 - 1)));
        assert_eq!(t.seconds_remaining(), Some(1));
        assert!(t.on_tick(start + Duration::from_secs(limit as u64)));

        assert_eq!(t.phase(), Phase::Feedback);
        assert!(t.timer().is_none());
        let result = t.results().last().unwrap();
        assert!(result.timed_out);
        assert_eq!(result.chosen.label(), NO_DECISION);
        assert_eq!(result.time_spent, limit as f64);
    }

    #[test]
    fn test_timeout_fires_once() {
        let mut t = trainer();
        let start = Instant::now();
        t.start_session(config(DifficultyFilter::All, 2), &mut rng(), start);

        assert!(t.on_tick(start + Duration::from_secs(30)));
        assert!(!t.on_tick(start + Duration::from_secs(31)));
        assert_eq!(t.results().len(), 1);
    }

    #[test]
    fn test_selection_after_timeout_ignored() {
        let mut t = trainer();
        let start = Instant::now();
        t.start_session(config(DifficultyFilter::All, 2), &mut rng(), start);

        assert!(t.on_tick(start + Duration::from_secs(30)));
        assert!(!t.select_option(0, start + Duration::from_secs(30)));
        assert_eq!(t.results().len(), 1);
        assert!(t.results()[0].timed_out);
    }

    #[test]
    fn test_late_selection_without_tick_times_out() {
        let mut t = trainer();
        let start = Instant::now();
        t.start_session(config(DifficultyFilter::All, 2), &mut rng(), start);
        let limit = t.current_decision().unwrap().time_limit;

        assert!(!t.select_option(0, start + Duration::from_secs(limit as u64 + 7)));

        assert_eq!(t.phase(), Phase::Feedback);
        assert!(t.timer().is_none());
        assert_eq!(t.results().len(), 1);
        let result = &t.results()[0];
        assert!(result.timed_out);
        assert_eq!(result.chosen, Choice::NoDecision);
        assert_eq!(result.time_spent, limit as f64);
    }

    #[test]
    fn test_selection_at_exact_limit_loses() {
        let mut t = trainer();
        let start = Instant::now();
        t.start_session(config(DifficultyFilter::All, 2), &mut rng(), start);
        let limit = t.current_decision().unwrap().time_limit as u64;

        assert!(t.select_option(0, start + Duration::from_millis(limit * 1000 - 1)));
        assert!(!t.results()[0].timed_out);

        t.advance(start);
        let limit = t.current_decision().unwrap().time_limit as u64;
        assert!(!t.select_option(0, start + Duration::from_secs(limit)));
        assert!(t.results()[1].timed_out);
    }

    #[test]
    fn test_no_timeout_after_selection() {
        let mut t = trainer();
        let start = Instant::now();
        t.start_session(config(DifficultyFilter::All, 2), &mut rng(), start);

        assert!(t.select_option(0, start));
        assert!(!t.on_tick(start + Duration::from_secs(30)));
        assert_eq!(t.results().len(), 1);
        assert!(!t.results()[0].timed_out);
    }

    #[test]
    fn test_stale_timer_never_resolves_current_item() {
        let mut t = trainer();
        let start = Instant::now();
        t.start_session(config(DifficultyFilter::All, 3), &mut rng(), start);
        let first = t.current_decision().unwrap().clone();

        t.select_option(0, start);
        t.advance(start);

        // re-install a timer armed for the first item while the second is current
        t.force_timer(Some(ArmedTimer::arm(0, &first, start)));

        assert!(!t.on_tick(start + Duration::from_secs(60)));
        assert_eq!(t.results().len(), 1);
        assert_eq!(t.phase(), Phase::Playing);
        assert!(t.timer().is_none());
    }

    #[test]
    fn test_advance_to_next_item_rearms_timer() {
        let mut t = trainer();
        let start = Instant::now();
        t.start_session(config(DifficultyFilter::All, 3), &mut rng(), start);
        t.select_option(0, start);

        let later = start + Duration::from_secs(2);
        assert_eq!(t.advance(later), Phase::Playing);
        assert_eq!(t.session().current_index(), 1);
        let timer = t.timer().unwrap();
        assert!(timer.is_bound_to(1, t.current_decision().unwrap().id));
        assert_eq!(timer.started_at(), later);
    }

    #[test]
    fn test_advance_after_last_goes_to_results() {
        let mut t = trainer();
        let start = Instant::now();
        t.start_session(config(DifficultyFilter::Hard, 1), &mut rng(), start);
        t.select_option(0, start);

        assert_eq!(t.advance(start), Phase::Results);
        assert!(t.timer().is_none());
        assert_eq!(t.session().current_index(), 0);
    }

    #[test]
    fn test_advance_outside_feedback_ignored() {
        let mut t = trainer();
        let start = Instant::now();
        t.start_session(config(DifficultyFilter::All, 2), &mut rng(), start);

        assert_eq!(t.advance(start), Phase::Playing);
        assert_eq!(t.session().current_index(), 0);
    }

    #[test]
    fn test_full_session_one_result_per_item() {
        let mut t = trainer();
        let mut now = Instant::now();
        t.start_session(config(DifficultyFilter::All, 6), &mut rng(), now);

        let mut visited = 0;
        while t.phase() != Phase::Results {
            visited += 1;
            if visited % 2 == 0 {
                assert!(t.select_option(0, now + Duration::from_millis(700)));
            } else {
                let limit = t.current_decision().unwrap().time_limit as u64;
                assert!(t.on_tick(now + Duration::from_secs(limit)));
            }
            now += Duration::from_secs(20);
            t.advance(now);
        }

        assert_eq!(visited, 6);
        assert_eq!(t.results().len(), t.session().len());
        let summary = t.summary();
        assert_eq!(summary.total, 6);
        assert_eq!(summary.decision_rate, 50);
        for result in t.results().iter().filter(|r| r.timed_out) {
            assert_eq!(result.time_spent, result.decision.time_limit as f64);
        }
    }

    #[test]
    fn test_train_again_reshuffles_and_clears() {
        let mut t = trainer();
        let mut rng = rng();
        let start = Instant::now();
        t.start_session(config(DifficultyFilter::All, 8), &mut rng, start);
        while t.phase() != Phase::Results {
            t.select_option(0, start);
            t.advance(start);
        }
        let first_order: Vec<u32> = t.session().selected().iter().map(|d| d.id).collect();

        let outcome = t.train_again(&mut rng, start);

        assert_eq!(outcome, StartOutcome::Started { count: 8 });
        assert_eq!(t.phase(), Phase::Playing);
        assert!(t.results().is_empty());
        assert_eq!(t.session().current_index(), 0);
        let second_order: Vec<u32> = t.session().selected().iter().map(|d| d.id).collect();
        assert_eq!(second_order.len(), 8);
        assert_ne!(first_order, second_order);
    }

    #[test]
    fn test_train_again_without_previous_session() {
        let mut t = trainer();
        assert_eq!(t.train_again(&mut rng(), Instant::now()), StartOutcome::NoScenarios);
        assert_eq!(t.phase(), Phase::Menu);
    }

    #[test]
    fn test_return_to_menu_clears_session() {
        let mut t = trainer();
        let start = Instant::now();
        t.start_session(config(DifficultyFilter::All, 3), &mut rng(), start);

        t.return_to_menu();

        assert_eq!(t.phase(), Phase::Menu);
        assert!(t.timer().is_none());
        assert!(t.session().is_empty());
        assert!(!t.on_tick(start + Duration::from_secs(60)));
    }

    #[test]
    fn test_disarm_prevents_timeout() {
        let mut t = trainer();
        let start = Instant::now();
        t.start_session(config(DifficultyFilter::All, 3), &mut rng(), start);

        t.disarm();

        assert!(!t.on_tick(start + Duration::from_secs(60)));
        assert!(t.results().is_empty());
    }
}
