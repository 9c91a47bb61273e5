//! Filter, sort and paginate a record set for display.
//!
//! The rows shown on screen are always `derive_view(records, view_state)`.
//! Nothing is cached between calls, so the same inputs always give the same page.

use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::domain::UTError;
use crate::record::{FieldPath, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    None,
    Ascending,
    Descending,
}

impl SortDirection {
    /// Next direction when the user toggles the sort.
    ///
    /// Once sorted, the toggle alternates between ascending and descending and never
    /// returns to the unsorted fetch order.
    pub fn toggle(self) -> Self {
        match self {
            SortDirection::None => SortDirection::Ascending,
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            SortDirection::None => "",
            SortDirection::Ascending => "▲",
            SortDirection::Descending => "▼",
        }
    }
}

/// Everything besides the records that decides what is displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    search_term: String,
    sort_direction: SortDirection,
    current_page: usize,
    page_size: usize,
}

impl ViewState {
    pub fn new(page_size: usize) -> Result<Self, UTError> {
        if page_size == 0 {
            return Err(UTError::config("page size must be at least 1"));
        }
        Ok(Self {
            search_term: String::new(),
            sort_direction: SortDirection::None,
            current_page: 1,
            page_size,
        })
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn sort_direction(&self) -> SortDirection {
        self.sort_direction
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// A new search term always starts again on the first page.
    pub fn with_search_term(&self, term: impl Into<String>) -> Self {
        Self {
            search_term: term.into(),
            current_page: 1,
            ..self.clone()
        }
    }

    pub fn with_sort_toggled(&self) -> Self {
        Self {
            sort_direction: self.sort_direction.toggle(),
            ..self.clone()
        }
    }

    /// Pages are 1-based, a page of 0 is raised to 1.
    pub fn with_page(&self, page: usize) -> Self {
        Self {
            current_page: page.max(1),
            ..self.clone()
        }
    }
}

/// One derived page, borrowing rows from the record set it was derived from.
#[derive(Debug, PartialEq)]
pub struct ViewPage<'a> {
    pub rows: Vec<&'a Record>,
    /// Number of records left after filtering.
    pub total: usize,
    pub page_count: usize,
}

impl ViewPage<'_> {
    /// True when nothing matched, which the table shows as a "No records found" row.
    pub fn no_records(&self) -> bool {
        self.total == 0
    }
}

#[derive(Debug, Clone)]
pub struct ListViewPipeline {
    search_field: FieldPath,
    sort_field: FieldPath,
}

impl ListViewPipeline {
    pub fn new(search_field: FieldPath, sort_field: FieldPath) -> Self {
        Self {
            search_field,
            sort_field,
        }
    }

    pub fn sort_field(&self) -> &FieldPath {
        &self.sort_field
    }

    /// Case-insensitive substring match on the search field, keeping input order.
    pub fn filter<'a>(
        &self,
        records: Vec<&'a Record>,
        search_term: &str,
    ) -> Result<Vec<&'a Record>, UTError> {
        if search_term.is_empty() {
            return Ok(records);
        }
        let needle = search_term.to_lowercase();
        let keys = Self::keys(&records, &self.search_field)?;
        Ok(records
            .into_iter()
            .zip(keys)
            .filter_map(|(r, key)| key.contains(&needle).then_some(r))
            .collect())
    }

    /// Stable, case-insensitive ordering on the sort field.
    pub fn sort<'a>(
        &self,
        records: Vec<&'a Record>,
        direction: SortDirection,
    ) -> Result<Vec<&'a Record>, UTError> {
        if direction == SortDirection::None {
            return Ok(records);
        }
        let keys = Self::keys(&records, &self.sort_field)?;
        let mut indexed_rows: Vec<(&Record, String)> = records.into_iter().zip(keys).collect();
        // sort_by is stable, ties keep their input order in both directions
        match direction {
            SortDirection::Ascending => indexed_rows.sort_by(|(_, a), (_, b)| a.cmp(b)),
            SortDirection::Descending => indexed_rows.sort_by(|(_, a), (_, b)| b.cmp(a)),
            SortDirection::None => {}
        }
        Ok(indexed_rows.into_iter().map(|(r, _)| r).collect())
    }

    /// The slice `[(page-1)*page_size, page*page_size)` clipped to bounds.
    pub fn paginate<T>(items: &[T], current_page: usize, page_size: usize) -> &[T] {
        if current_page == 0 || page_size == 0 {
            return &[];
        }
        let begin = (current_page - 1).saturating_mul(page_size);
        if begin >= items.len() {
            return &[];
        }
        let end = std::cmp::min(begin.saturating_add(page_size), items.len());
        &items[begin..end]
    }

    pub fn page_count(total: usize, page_size: usize) -> usize {
        if page_size == 0 {
            return 0;
        }
        total.div_ceil(page_size)
    }

    /// filter, then sort, then paginate, in one pass over the current inputs.
    pub fn derive_view<'a>(
        &self,
        records: &'a [Record],
        state: &ViewState,
    ) -> Result<ViewPage<'a>, UTError> {
        let start_time = Instant::now();

        let rows: Vec<&Record> = records.iter().collect();
        let rows = self.filter(rows, state.search_term())?;
        let rows = self.sort(rows, state.sort_direction())?;
        let page_rows =
            Self::paginate(&rows, state.current_page(), state.page_size()).to_vec();

        trace!(
            "Derived view in {}us: term {:?}, sort {:?}, page {}",
            start_time.elapsed().as_micros(),
            state.search_term(),
            state.sort_direction(),
            state.current_page()
        );
        debug!("{} of {} records match", rows.len(), records.len());

        Ok(ViewPage {
            rows: page_rows,
            total: rows.len(),
            page_count: Self::page_count(rows.len(), state.page_size()),
        })
    }

    // Lowercased field text per record. Extraction runs in parallel, the first
    // missing field in input order is the one reported.
    fn keys(records: &[&Record], field: &FieldPath) -> Result<Vec<String>, UTError> {
        let keys: Vec<Result<String, UTError>> = records
            .par_iter()
            .map(|r| r.text(field).map(|t| t.to_lowercase()))
            .collect();
        keys.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(last_names: &[&str]) -> Vec<Record> {
        let body = json!(
            last_names
                .iter()
                .enumerate()
                .map(|(i, n)| json!({
                    "id": i + 1,
                    "name": format!("User {}", i + 1),
                    "lastName": n,
                    "company": { "name": format!("Company {n}") },
                }))
                .collect::<Vec<_>>()
        );
        Record::from_json(body).unwrap()
    }

    fn ids(rows: &[&Record]) -> Vec<usize> {
        rows.iter().map(|r| r.position()).collect()
    }

    fn by_last_name() -> ListViewPipeline {
        ListViewPipeline::new("lastName".parse().unwrap(), "lastName".parse().unwrap())
    }

    #[test]
    fn empty_search_is_identity() {
        let data = records(&["b", "a", "c"]);
        let rows: Vec<&Record> = data.iter().collect();
        let filtered = by_last_name().filter(rows.clone(), "").unwrap();
        assert_eq!(filtered, rows);
    }

    #[test]
    fn filter_is_case_insensitive_and_exact() {
        let data = records(&["Smith", "Jones", "SMITHERS", "Brown", "blacksmith"]);
        let rows: Vec<&Record> = data.iter().collect();
        let filtered = by_last_name().filter(rows, "sMiTh").unwrap();
        assert_eq!(ids(&filtered), vec![0, 2, 4]);

        for r in data.iter() {
            let contains = r
                .text(&"lastName".parse().unwrap())
                .unwrap()
                .to_lowercase()
                .contains("smith");
            assert_eq!(contains, filtered.contains(&r));
        }
    }

    #[test]
    fn filter_on_nested_field() {
        let data = records(&["Smith", "Jones"]);
        let pipeline =
            ListViewPipeline::new("company.name".parse().unwrap(), "name".parse().unwrap());
        let filtered = pipeline.filter(data.iter().collect(), "company jo").unwrap();
        assert_eq!(ids(&filtered), vec![1]);
    }

    #[test]
    fn stable_sort_keeps_tied_records_in_input_order() {
        let data = records(&[
            "Young", "Adams", "Clark", "Smith", "Baker", "Wright", "Lopez", "Smith", "Hill",
            "Evans",
        ]);
        let sorted = by_last_name()
            .sort(data.iter().collect(), SortDirection::Ascending)
            .unwrap();
        let smiths: Vec<usize> = sorted
            .iter()
            .filter(|r| r.text(&"lastName".parse().unwrap()).unwrap() == "Smith")
            .map(|r| r.position())
            .collect();
        assert_eq!(smiths, vec![3, 7]);
        assert_eq!(sorted[0].position(), 1);
        assert_eq!(sorted[9].position(), 0);
    }

    #[test]
    fn sort_ignores_case() {
        let data = records(&["beta", "Alpha", "gamma", "ALPHA"]);
        let sorted = by_last_name()
            .sort(data.iter().collect(), SortDirection::Ascending)
            .unwrap();
        assert_eq!(ids(&sorted), vec![1, 3, 0, 2]);
    }

    #[test]
    fn descending_reverses_ascending_except_ties() {
        let data = records(&["c", "a", "b", "a", "c", "d"]);
        let pipeline = by_last_name();
        let asc = pipeline
            .sort(data.iter().collect(), SortDirection::Ascending)
            .unwrap();
        let desc = pipeline.sort(asc.clone(), SortDirection::Descending).unwrap();
        assert_eq!(ids(&asc), vec![1, 3, 2, 0, 4, 5]);
        // ties (a: 1,3 and c: 0,4) keep input order
        assert_eq!(ids(&desc), vec![5, 0, 4, 2, 1, 3]);
    }

    #[test]
    fn no_sort_is_identity() {
        let data = records(&["c", "a", "b"]);
        let rows: Vec<&Record> = data.iter().collect();
        assert_eq!(by_last_name().sort(rows.clone(), SortDirection::None).unwrap(), rows);
    }

    #[test]
    fn toggle_never_returns_to_unsorted() {
        let first = SortDirection::None.toggle();
        let second = first.toggle();
        assert_eq!(first, SortDirection::Ascending);
        assert_eq!(second, SortDirection::Descending);
        assert_eq!(second.toggle(), SortDirection::Ascending);
    }

    #[test]
    fn paginate_second_page_of_ten() {
        let items: Vec<usize> = (1..=10).collect();
        assert_eq!(ListViewPipeline::paginate(&items, 2, 8), &[9, 10]);
        assert_eq!(ListViewPipeline::paginate(&items, 1, 8).len(), 8);
        assert!(ListViewPipeline::paginate(&items, 3, 8).is_empty());
        assert!(ListViewPipeline::paginate(&items, 0, 8).is_empty());
    }

    #[test]
    fn pages_reconstruct_the_sequence() {
        let items: Vec<usize> = (0..23).collect();
        for page_size in 1..=25 {
            let pages = ListViewPipeline::page_count(items.len(), page_size);
            let mut joined = Vec::new();
            for page in 1..=pages {
                let slice = ListViewPipeline::paginate(&items, page, page_size);
                assert!(slice.len() <= page_size);
                joined.extend_from_slice(slice);
            }
            assert_eq!(joined, items);
            assert!(ListViewPipeline::paginate(&items, pages + 1, page_size).is_empty());
        }
    }

    #[test]
    fn derive_view_combines_all_stages() {
        let data = records(&[
            "Smith", "Jones", "Smithers", "Brown", "Smithson", "Black", "Smithy", "Smith",
            "Grey", "Smithfield", "Smart", "Smithwick",
        ]);
        let pipeline = by_last_name();
        let state = ViewState::new(4)
            .unwrap()
            .with_search_term("smith")
            .with_sort_toggled()
            .with_page(2);
        let view = pipeline.derive_view(&data, &state).unwrap();
        assert_eq!(view.total, 7);
        assert_eq!(view.page_count, 2);
        // smith(0) smith(7) smithers(2) smithfield(9) | smithson(4) smithwick(11) smithy(6)
        assert_eq!(ids(&view.rows), vec![4, 11, 6]);
        assert!(!view.no_records());
    }

    #[test]
    fn derive_view_is_deterministic() {
        let data = records(&["b", "a", "b", "a"]);
        let pipeline = by_last_name();
        let state = ViewState::new(3).unwrap().with_sort_toggled();
        let first = pipeline.derive_view(&data, &state).unwrap();
        let second = pipeline.derive_view(&data, &state).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_record_set_has_no_records() {
        let view = by_last_name()
            .derive_view(&[], &ViewState::new(8).unwrap())
            .unwrap();
        assert!(view.rows.is_empty());
        assert!(view.no_records());
        assert_eq!(view.page_count, 0);
    }

    #[test]
    fn missing_sort_field_is_reported() {
        let data = Record::from_json(json!([
            { "id": 1, "lastName": "a" },
            { "id": 2 },
            { "id": 3 },
        ]))
        .unwrap();
        let state = ViewState::new(8).unwrap().with_sort_toggled();
        let err = by_last_name().derive_view(&data, &state).unwrap_err();
        assert!(matches!(err, UTError::MissingField { record: 1, ref field } if field == "lastName"));

        // Unsorted and unfiltered views never touch the field
        assert!(by_last_name().derive_view(&data, &ViewState::new(8).unwrap()).is_ok());
    }

    #[test]
    fn search_resets_page() {
        let state = ViewState::new(8).unwrap().with_page(3).with_search_term("x");
        assert_eq!(state.current_page(), 1);
        assert!(ViewState::new(0).is_err());
    }
}
