//! Bounded, insertion-ordered window of price points backing one chart.

use std::collections::VecDeque;

use super::object::PricePoint;

/// Eviction policy of a [`SeriesWindow`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowBound {
    /// Keep the full history
    #[default]
    Unbounded,
    /// Enforce the bound after every appended point
    PerPoint(usize),
    /// Enforce the bound once a whole stream message has been applied
    PerBatch(usize),
}

impl WindowBound {
    pub fn limit(&self) -> Option<usize> {
        match self {
            WindowBound::Unbounded => None,
            WindowBound::PerPoint(n) | WindowBound::PerBatch(n) => Some(*n),
        }
    }
}

/// Price points ordered by arrival, evicted from the front
#[derive(Debug, Clone, Default)]
pub struct SeriesWindow {
    points: VecDeque<PricePoint>,
    bound: WindowBound,
}

impl SeriesWindow {
    pub fn new(bound: WindowBound) -> Self {
        Self {
            points: VecDeque::new(),
            bound,
        }
    }

    /// Build a window from a bulk history, keeping only the newest points
    /// that fit the bound.
    pub fn from_points(bound: WindowBound, history: Vec<PricePoint>) -> Self {
        let mut window = Self {
            points: history.into(),
            bound,
        };
        window.enforce_bound();
        window
    }

    pub fn bound(&self) -> WindowBound {
        self.bound
    }

    /// Append a point. Returns how many points were evicted from the front.
    pub fn push(&mut self, point: PricePoint) -> usize {
        self.points.push_back(point);
        match self.bound {
            WindowBound::PerPoint(_) => self.enforce_bound(),
            _ => 0,
        }
    }

    /// Evict from the front until the bound holds. Returns the eviction count.
    pub fn enforce_bound(&mut self) -> usize {
        let Some(limit) = self.bound.limit() else {
            return 0;
        };

        let mut evicted = 0;
        while self.points.len() > limit {
            self.points.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.front()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PricePoint> {
        self.points.iter()
    }

    pub fn to_vec(&self) -> Vec<PricePoint> {
        self.points.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}
