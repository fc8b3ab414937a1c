//! Client-side state: the batches received so far and the chart derived from them.
//!
//! `on_push` is fed by the live WebSocket feed, `on_snapshot` by the one-shot
//! `GET /stocks` fetch. The symbol filter and theme are independent fields that
//! the reducer never reads or writes.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use log::debug;
use serde::Serialize;

use crate::client::chart::{derive_chart_series, ChartPoint, ReceivedBatch};

pub const MAX_PREVIOUS_SEARCHES: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("Unknown theme: {}", other)),
        }
    }
}

/// Received batches in arrival order, optionally capped to the most recent `cap`.
#[derive(Debug, Clone, Default)]
pub struct DisplayHistory {
    batches: VecDeque<ReceivedBatch>,
    cap: Option<usize>,
}

impl DisplayHistory {
    pub fn new(cap: Option<usize>) -> Self {
        Self {
            batches: VecDeque::new(),
            cap: cap.map(|c| c.max(1)),
        }
    }

    pub fn cap(&self) -> Option<usize> {
        self.cap
    }

    /// Appends a batch and evicts from the front until the cap holds. Returns the number evicted.
    pub fn push(&mut self, batch: ReceivedBatch) -> usize {
        self.batches.push_back(batch);
        let mut evicted = 0;
        if let Some(cap) = self.cap {
            while self.batches.len() > cap {
                self.batches.pop_front();
                evicted += 1;
            }
        }
        evicted
    }

    pub fn replace_latest(&mut self, batch: ReceivedBatch) {
        match self.batches.back_mut() {
            Some(latest) => *latest = batch,
            None => {
                self.push(batch);
            }
        }
    }

    pub fn latest(&self) -> Option<&ReceivedBatch> {
        self.batches.back()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReceivedBatch> {
        self.batches.iter()
    }
}

/// Read-only copy of everything the rendering side needs.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub history: Vec<ReceivedBatch>,
    pub chart: Vec<ChartPoint>,
    pub filter: String,
    pub theme: Theme,
    pub previous_searches: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ClientState {
    history: DisplayHistory,
    chart: Vec<ChartPoint>,
    filter: String,
    theme: Theme,
    previous_searches: VecDeque<String>,
}

impl ClientState {
    pub fn new(history_cap: Option<usize>) -> Self {
        Self {
            history: DisplayHistory::new(history_cap),
            ..Self::default()
        }
    }

    pub fn on_snapshot(&mut self, batch: ReceivedBatch) {
        self.chart = derive_chart_series(&batch);
        self.history.replace_latest(batch);
    }

    pub fn on_push(&mut self, batch: ReceivedBatch) {
        self.chart = derive_chart_series(&batch);
        self.history.push(batch);
    }

    pub fn set_filter(&mut self, text: &str) {
        if self.filter != text {
            debug!("Symbol filter updated from {:?} to {:?}", self.filter, text);
        }
        self.filter = text.to_string();
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    /// Records the current filter as a previous search. Returns the trimmed filter,
    /// or `None` when it is blank.
    pub fn submit_search(&mut self) -> Option<String> {
        let search = self.filter.trim();
        if search.is_empty() {
            return None;
        }
        let search = search.to_string();
        self.previous_searches.push_back(search.clone());
        while self.previous_searches.len() > MAX_PREVIOUS_SEARCHES {
            self.previous_searches.pop_front();
        }
        Some(search)
    }

    pub fn history(&self) -> &DisplayHistory {
        &self.history
    }

    pub fn chart(&self) -> &[ChartPoint] {
        &self.chart
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn previous_searches(&self) -> impl Iterator<Item = &String> {
        self.previous_searches.iter()
    }

    pub fn view(&self) -> DashboardView {
        DashboardView {
            history: self.history.iter().cloned().collect(),
            chart: self.chart.clone(),
            filter: self.filter.clone(),
            theme: self.theme,
            previous_searches: self.previous_searches.iter().cloned().collect(),
        }
    }
}
