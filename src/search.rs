use crate::records::{schema_for, DatasetKind};
use crate::sequence::{Acceptance, Sequencer};
use crate::view::{self, Record, ViewControls, ViewError, MIN_SEARCH_LEN};
use serde::Serialize;

pub const QUICK_SEARCH_LIMIT: i64 = 5;
pub const SEARCH_FAILED: &str = "Failed to search students";

/// What the header search dropdown should show.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchState {
    pub query: String,
    pub seq: u64,
    pub results: Vec<Record>,
    pub error: Option<String>,
    pub show_results: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTicket {
    /// Query too short; state already cleared.
    Skipped(u64),
    Stale(u64),
    Run(u64),
}

#[derive(Debug, Clone, Default)]
pub struct SearchBox {
    sequencer: Sequencer,
    state: SearchState,
}

fn long_enough(query: &str) -> bool {
    query.trim().chars().count() >= MIN_SEARCH_LEN
}

impl SearchBox {
    /// Start a search for `query`. `seq` is the caller's sequence number; when
    /// absent one is issued here.
    pub fn begin(&mut self, query: &str, seq: Option<u64>) -> SearchTicket {
        let seq = match seq {
            Some(s) => {
                if self.sequencer.register(s).is_stale() {
                    return SearchTicket::Stale(s);
                }
                s
            }
            None => self.sequencer.issue(),
        };
        self.state.query = query.to_string();
        if !long_enough(query) {
            self.sequencer.accept(seq);
            self.state.seq = seq;
            self.state.results.clear();
            self.state.error = None;
            self.state.show_results = false;
            return SearchTicket::Skipped(seq);
        }
        SearchTicket::Run(seq)
    }

    pub fn finish(&mut self, seq: u64, outcome: Result<Vec<Record>, String>) -> Acceptance {
        if self.sequencer.accept(seq).is_stale() {
            return Acceptance::Stale;
        }
        self.state.seq = seq;
        match outcome {
            Ok(results) => {
                self.state.results = results;
                self.state.error = None;
            }
            Err(message) => {
                self.state.results.clear();
                self.state.error = Some(message);
            }
        }
        self.state.show_results = long_enough(&self.state.query)
            && (!self.state.results.is_empty() || self.state.error.is_some());
        Acceptance::Applied
    }

    /// Reset the dropdown. Any search still in flight becomes stale.
    pub fn clear(&mut self) {
        let seq = self.sequencer.settle();
        self.state = SearchState {
            seq,
            ..SearchState::default()
        };
    }

    pub fn close(&mut self) {
        self.state.show_results = false;
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }
}

/// Top matches for the header search box over canonical student records.
pub fn quick_search(students: &[Record], query: &str) -> Result<Vec<Record>, ViewError> {
    let controls = ViewControls {
        search_term: query.to_string(),
        page_size: QUICK_SEARCH_LIMIT,
        ..ViewControls::default()
    };
    let result = view::compute(students, &schema_for(DatasetKind::Students), &controls)?;
    Ok(result.visible_records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::normalize;
    use serde_json::json;

    fn students(n: usize) -> Vec<Record> {
        let rows: Vec<_> = (0..n)
            .map(|i| json!({ "id": format!("S{}", i), "name": format!("Jordan {}", i) }))
            .collect();
        normalize(DatasetKind::Students, &rows).records
    }

    #[test]
    fn short_query_clears_and_closes() {
        let mut sb = SearchBox::default();
        let SearchTicket::Run(seq) = sb.begin("jor", None) else {
            panic!("expected run");
        };
        sb.finish(seq, Ok(students(2)));
        assert!(sb.state().show_results);

        assert!(matches!(sb.begin("j", None), SearchTicket::Skipped(_)));
        assert!(sb.state().results.is_empty());
        assert!(!sb.state().show_results);
    }

    #[test]
    fn stale_search_does_not_overwrite_newer_one() {
        let mut sb = SearchBox::default();
        let SearchTicket::Run(old) = sb.begin("jo", None) else {
            panic!("expected run");
        };
        let SearchTicket::Run(new) = sb.begin("jordan 1", None) else {
            panic!("expected run");
        };
        assert_eq!(sb.finish(new, Ok(students(1))), Acceptance::Applied);
        assert_eq!(sb.finish(old, Ok(students(4))), Acceptance::Stale);
        assert_eq!(sb.state().results.len(), 1);
        assert_eq!(sb.state().query, "jordan 1");
    }

    #[test]
    fn caller_sequence_numbers_reject_late_arrivals() {
        let mut sb = SearchBox::default();
        assert!(matches!(sb.begin("jordan", Some(4)), SearchTicket::Run(4)));
        assert_eq!(sb.begin("jo", Some(3)), SearchTicket::Stale(3));
    }

    #[test]
    fn error_keeps_dropdown_open() {
        let mut sb = SearchBox::default();
        let SearchTicket::Run(seq) = sb.begin("zz", None) else {
            panic!("expected run");
        };
        sb.finish(seq, Err(SEARCH_FAILED.to_string()));
        assert!(sb.state().show_results);
        assert_eq!(sb.state().error.as_deref(), Some(SEARCH_FAILED));

        sb.close();
        assert!(!sb.state().show_results);
        sb.clear();
        assert_eq!(sb.state().query, "");
        assert!(sb.state().error.is_none());
    }

    #[test]
    fn clear_leaves_next_caller_number_usable() {
        let mut sb = SearchBox::default();
        sb.clear();
        assert!(matches!(sb.begin("jordan", Some(1)), SearchTicket::Run(1)));
        sb.clear();
        assert_eq!(sb.finish(1, Ok(students(2))), Acceptance::Stale);
        assert!(sb.state().results.is_empty());
        let SearchTicket::Run(seq) = sb.begin("jordan", Some(2)) else {
            panic!("expected run");
        };
        assert_eq!(sb.finish(seq, Ok(students(2))), Acceptance::Applied);
        assert_eq!(sb.state().results.len(), 2);
    }

    #[test]
    fn quick_search_caps_results() {
        let found = quick_search(&students(9), "jordan").expect("search");
        assert_eq!(found.len(), QUICK_SEARCH_LIMIT as usize);
        let found = quick_search(&students(9), "jordan 3").expect("search");
        assert_eq!(found.len(), 1);
    }
}
