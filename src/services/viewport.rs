/// Viewport tracker: auto-update and manual search modes as a state machine
use crate::domain::{Bounds, MapViewport};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackerState {
    Idle,
    /// Auto mode: a bounds fetch fires at `deadline` unless another move arrives
    Debouncing { bounds: Bounds, deadline: Instant },
    /// A bounds fetch issued by this tracker has not settled
    Fetching,
    /// Manual mode: the map moved and results are stale until the user searches
    PendingManual { bounds: Bounds },
}

/// What the owner must do after a transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    None,
    Schedule(Instant),
    Fetch(Bounds),
}

pub struct ViewportTracker {
    state: TrackerState,
    auto_update: bool,
    viewport: MapViewport,
    last_bounds: Option<Bounds>,
    debounce: Duration,
}

impl ViewportTracker {
    pub fn new(viewport: MapViewport, auto_update: bool, debounce: Duration) -> Self {
        Self {
            state: TrackerState::Idle,
            auto_update,
            viewport,
            last_bounds: None,
            debounce,
        }
    }

    /// Map move-end or zoom-end
    pub fn on_move(&mut self, viewport: MapViewport, bounds: Bounds, now: Instant) -> Effect {
        self.viewport = viewport;
        self.last_bounds = Some(bounds);

        if self.auto_update {
            let deadline = now + self.debounce;
            self.state = TrackerState::Debouncing { bounds, deadline };
            Effect::Schedule(deadline)
        } else {
            self.state = TrackerState::PendingManual { bounds };
            Effect::None
        }
    }

    pub fn on_deadline(&mut self, now: Instant) -> Effect {
        match self.state {
            TrackerState::Debouncing { bounds, deadline } if now >= deadline => {
                self.state = TrackerState::Fetching;
                Effect::Fetch(bounds)
            }
            _ => Effect::None,
        }
    }

    /// "Search this area" with the bounds known at this moment
    pub fn search_area(&mut self) -> Effect {
        let bounds = match self.state {
            TrackerState::PendingManual { bounds } | TrackerState::Debouncing { bounds, .. } => {
                Some(bounds)
            }
            _ => self.last_bounds,
        };
        match bounds {
            Some(bounds) => {
                self.state = TrackerState::Fetching;
                Effect::Fetch(bounds)
            }
            None => Effect::None,
        }
    }

    pub fn set_auto_update(&mut self, enabled: bool) -> Effect {
        if enabled == self.auto_update {
            return Effect::None;
        }
        self.auto_update = enabled;

        if enabled {
            match self.last_bounds {
                Some(bounds) => {
                    self.state = TrackerState::Fetching;
                    Effect::Fetch(bounds)
                }
                None => Effect::None,
            }
        } else {
            if let TrackerState::Debouncing { bounds, .. } = self.state {
                self.state = TrackerState::PendingManual { bounds };
            }
            Effect::None
        }
    }

    pub fn fetch_settled(&mut self) {
        if self.state == TrackerState::Fetching {
            self.state = TrackerState::Idle;
        }
    }

    /// Programmatic fly-to (locate, focus); does not count as a user move
    pub fn set_viewport(&mut self, viewport: MapViewport) {
        self.viewport = viewport;
    }

    #[cfg(test)]
    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            TrackerState::Debouncing { deadline, .. } => Some(deadline),
            _ => None,
        }
    }

    pub fn pending_search(&self) -> bool {
        !self.auto_update && matches!(self.state, TrackerState::PendingManual { .. })
    }

    pub fn auto_update(&self) -> bool {
        self.auto_update
    }

    pub fn viewport(&self) -> MapViewport {
        self.viewport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LatLng;
    use crate::services::testing::tirana_bounds;

    const DEBOUNCE: Duration = Duration::from_millis(450);

    fn viewport(zoom: u8) -> MapViewport {
        MapViewport {
            center: LatLng::new(41.3275, 19.8187),
            zoom,
        }
    }

    fn other_bounds() -> Bounds {
        Bounds::new(40.40, 40.50, 19.40, 19.55)
    }

    #[test]
    fn test_auto_move_schedules_debounce() {
        let mut tracker = ViewportTracker::new(viewport(8), true, DEBOUNCE);
        let now = Instant::now();

        let effect = tracker.on_move(viewport(10), tirana_bounds(), now);
        assert_eq!(effect, Effect::Schedule(now + DEBOUNCE));
        assert_eq!(tracker.viewport().zoom, 10);
        assert!(!tracker.pending_search());

        assert_eq!(tracker.on_deadline(now + Duration::from_millis(449)), Effect::None);
        assert_eq!(
            tracker.on_deadline(now + DEBOUNCE),
            Effect::Fetch(tirana_bounds())
        );
        assert_eq!(tracker.state(), TrackerState::Fetching);

        tracker.fetch_settled();
        assert_eq!(tracker.state(), TrackerState::Idle);
    }

    #[test]
    fn test_second_move_reschedules_with_new_bounds() {
        let mut tracker = ViewportTracker::new(viewport(8), true, DEBOUNCE);
        let start = Instant::now();

        tracker.on_move(viewport(9), tirana_bounds(), start);
        let later = start + Duration::from_millis(300);
        let effect = tracker.on_move(viewport(10), other_bounds(), later);
        assert_eq!(effect, Effect::Schedule(later + DEBOUNCE));

        // the first deadline has passed but was replaced
        assert_eq!(tracker.on_deadline(start + DEBOUNCE), Effect::None);
        assert_eq!(
            tracker.on_deadline(later + DEBOUNCE),
            Effect::Fetch(other_bounds())
        );
    }

    #[test]
    fn test_manual_move_marks_pending_without_fetch() {
        let mut tracker = ViewportTracker::new(viewport(8), false, DEBOUNCE);

        let effect = tracker.on_move(viewport(11), tirana_bounds(), Instant::now());
        assert_eq!(effect, Effect::None);
        assert!(tracker.pending_search());
        assert_eq!(tracker.deadline(), None);

        tracker.on_move(viewport(12), other_bounds(), Instant::now());
        assert_eq!(tracker.search_area(), Effect::Fetch(other_bounds()));
        assert!(!tracker.pending_search());
    }

    #[test]
    fn test_search_area_without_known_bounds_does_nothing() {
        let mut tracker = ViewportTracker::new(viewport(8), false, DEBOUNCE);
        assert_eq!(tracker.search_area(), Effect::None);
        assert_eq!(tracker.state(), TrackerState::Idle);
    }

    #[test]
    fn test_enabling_auto_with_pending_search_fetches_immediately() {
        let mut tracker = ViewportTracker::new(viewport(8), false, DEBOUNCE);
        tracker.on_move(viewport(11), tirana_bounds(), Instant::now());
        assert!(tracker.pending_search());

        assert_eq!(
            tracker.set_auto_update(true),
            Effect::Fetch(tirana_bounds())
        );
        assert!(!tracker.pending_search());
        assert!(tracker.auto_update());
    }

    #[test]
    fn test_disabling_auto_turns_pending_debounce_into_manual_search() {
        let mut tracker = ViewportTracker::new(viewport(8), true, DEBOUNCE);
        tracker.on_move(viewport(11), tirana_bounds(), Instant::now());

        assert_eq!(tracker.set_auto_update(false), Effect::None);
        assert_eq!(tracker.deadline(), None);
        assert!(tracker.pending_search());
    }

    #[test]
    fn test_toggle_to_same_mode_is_noop() {
        let mut tracker = ViewportTracker::new(viewport(8), true, DEBOUNCE);
        tracker.on_move(viewport(11), tirana_bounds(), Instant::now());
        assert_eq!(tracker.set_auto_update(true), Effect::None);
        assert!(tracker.deadline().is_some());
    }

    #[test]
    fn test_fetch_settled_keeps_debounce_alive() {
        let mut tracker = ViewportTracker::new(viewport(8), true, DEBOUNCE);
        tracker.on_move(viewport(11), tirana_bounds(), Instant::now());
        tracker.fetch_settled();
        assert!(matches!(tracker.state(), TrackerState::Debouncing { .. }));
    }
}
