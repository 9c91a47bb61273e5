use std::sync::Arc;
use std::time::Instant;

use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use tokio::runtime::Handle;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::UTConfig;
use crate::domain::{CMDMode, HELP_TEXT, Message, UTError};
use crate::inputter::{InputResult, Inputter};
use crate::pipeline::{ListViewPipeline, SortDirection, ViewState};
use crate::record::{Record, RecordSet};
use crate::source::RecordSource;
use crate::table;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Status {
    LOADING,
    READY,
    FAILED,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    RECORD,
    POPUP,
    CMDINPUT,
}

struct RecordView {
    position: usize, // Position of the record in the record set
    fields: Vec<(String, String)>,
    curser_row: usize,
}

impl RecordView {
    fn empty() -> Self {
        RecordView {
            position: 0,
            fields: Vec::new(),
            curser_row: 0,
        }
    }
}

struct PendingFetch {
    receiver: oneshot::Receiver<Result<RecordSet, UTError>>,
    task: JoinHandle<()>,
    started: Instant,
}

/// Snapshot of everything the UI renders.
#[derive(Debug, Clone, Default)]
pub struct UIData {
    pub name: String,
    pub headers: Vec<String>,
    pub widths: Vec<usize>,
    pub rows: Vec<Vec<String>>,
    pub selected_row: Option<usize>,
    pub record_view: bool,
    pub loading: bool,
    pub error: Option<String>,
    pub no_records: bool,
    pub page: usize,
    pub page_count: usize,
    pub total: usize,
    pub record_count: usize,
    pub search_term: String,
    pub sort_column: Option<usize>,
    pub sort_direction: SortDirection,
    pub show_popup: bool,
    pub popup_message: String,
    pub cmdinput: InputResult,
    pub cmd_mode: Option<CMDMode>,
    pub active_cmdinput: bool,
    pub search_prompt: String,
    pub status_message: String,
}

pub struct Model {
    config: UTConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    pipeline: ListViewPipeline,
    records: RecordSet,
    view_state: ViewState,
    view_backup: ViewState,
    page_rows: Vec<usize>, // Record set positions of the rows on the current page
    page_cells: Vec<Vec<String>>,
    total: usize,
    page_count: usize,
    no_records: bool,
    curser_row: usize,
    fetch_error: Option<String>,
    view_error: Option<String>,
    record_view: RecordView,
    source: Option<RecordSource>,
    runtime: Option<Handle>,
    pending: Option<PendingFetch>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    active_cmdinput: bool,
    show_popup: bool,
    status_message: String,
    uidata: UIData,
}

impl Model {
    pub fn init(config: &UTConfig) -> Result<Self, UTError> {
        let mut model = Self {
            config: config.clone(),
            status: Status::READY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            pipeline: ListViewPipeline::new(config.search_field.clone(), config.sort_field.clone()),
            records: Arc::new(Vec::new()),
            view_state: ViewState::new(config.page_size)?,
            view_backup: ViewState::new(config.page_size)?,
            page_rows: Vec::new(),
            page_cells: Vec::new(),
            total: 0,
            page_count: 0,
            no_records: true,
            curser_row: 0,
            fetch_error: None,
            view_error: None,
            record_view: RecordView::empty(),
            source: None,
            runtime: None,
            pending: None,
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            active_cmdinput: false,
            show_popup: false,
            status_message: "Started ut!".to_string(),
            uidata: UIData::default(),
        };
        model.refresh_view();
        Ok(model)
    }

    /// Attaches the record source and the runtime fetches are spawned on.
    pub fn with_source(mut self, source: RecordSource, runtime: Handle) -> Self {
        self.source = Some(source);
        self.runtime = Some(runtime);
        self
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput
    }

    pub fn quit(&mut self) {
        self.cancel_fetch();
        self.status = Status::QUITTING;
    }

    // -------------------- Record set lifecycle ---------------------- //

    /// Starts loading the record set in the background. A fetch still in flight is canceled.
    pub fn start_fetch(&mut self) {
        let (Some(source), Some(runtime)) = (self.source.clone(), self.runtime.clone()) else {
            warn!("No record source attached, nothing to load");
            return;
        };
        self.cancel_fetch();

        info!("Loading records from {} ...", source.describe());
        let (sender, receiver) = oneshot::channel();
        let task = runtime.spawn(async move {
            // The receiver is gone if the fetch was canceled, nothing left to do then.
            let _ = sender.send(source.fetch().await);
        });
        self.pending = Some(PendingFetch {
            receiver,
            task,
            started: Instant::now(),
        });
        self.fetch_error = None;
        self.status = Status::LOADING;
        self.set_status_message("Loading ...");
        self.update_uidata();
    }

    fn cancel_fetch(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.task.abort();
            info!("Canceled running fetch");
        }
    }

    fn poll_fetch(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        let result = match pending.receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Closed) => Err(UTError::fetch("Loading was interrupted.")),
        };
        let elapsed = pending.started.elapsed().as_millis();
        self.pending = None;
        debug!("Fetch finished after {elapsed}ms");
        self.apply_fetch_result(result);
    }

    /// Replaces the record set as a whole, or switches to the error display.
    pub fn apply_fetch_result(&mut self, result: Result<RecordSet, UTError>) {
        match result {
            Ok(records) => {
                let count = records.len();
                self.records = records;
                self.fetch_error = None;
                self.status = Status::READY;
                self.view_state = self.view_state.with_page(1);
                self.curser_row = 0;
                // A shown record may no longer exist
                if self.modus == Modus::RECORD {
                    self.modus = Modus::TABLE;
                }
                if self.previous_modus == Modus::RECORD {
                    self.previous_modus = Modus::TABLE;
                }
                self.refresh_view();
                self.set_status_message(format!("Loaded {count} records"));
            }
            Err(e) => {
                error!("Loading records failed: {e}");
                self.records = Arc::new(Vec::new());
                self.fetch_error = Some(e.to_string());
                self.status = Status::FAILED;
                self.refresh_view();
            }
        }
        self.update_uidata();
    }

    // -------------------- View derivation ---------------------- //

    fn refresh_view(&mut self) {
        let columns = &self.config.columns;
        let derived = self
            .pipeline
            .derive_view(&self.records, &self.view_state)
            .map(|page| {
                let positions: Vec<usize> = page.rows.iter().map(|r| r.position()).collect();
                let cells: Vec<Vec<String>> =
                    page.rows.iter().map(|r| table::cells(r, columns)).collect();
                (positions, cells, page.total, page.page_count, page.no_records())
            });

        match derived {
            Ok((positions, cells, total, page_count, no_records)) => {
                self.page_rows = positions;
                self.page_cells = cells;
                self.total = total;
                self.page_count = page_count;
                self.no_records = no_records;
                self.view_error = None;
            }
            Err(e) => {
                warn!("Unable to derive view: {e}");
                self.page_rows.clear();
                self.page_cells.clear();
                self.total = 0;
                self.page_count = 0;
                self.no_records = true;
                self.view_error = Some(e.to_string());
            }
        }
        self.curser_row = std::cmp::min(self.curser_row, self.page_rows.len().saturating_sub(1));
        self.update_uidata();
    }

    fn set_view_state(&mut self, state: ViewState) {
        if state != self.view_state {
            trace!("View state: {:?} -> {:?}", self.view_state, state);
            self.view_state = state;
            self.refresh_view();
        }
    }

    fn last_page(&self) -> usize {
        std::cmp::max(self.page_count, 1)
    }

    fn record(&self, position: usize) -> Option<&Record> {
        self.records.get(position)
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.uidata.status_message = self.status_message.clone();
    }

    fn update_uidata(&mut self) {
        let (headers, rows, selected_row): (Vec<String>, Vec<Vec<String>>, Option<usize>) =
            match self.modus_for_view() {
                Modus::RECORD => {
                    let rows = self
                        .record_view
                        .fields
                        .iter()
                        .map(|(k, v)| vec![k.clone(), v.clone()])
                        .collect::<Vec<_>>();
                    (
                        vec!["Field".to_string(), "Value".to_string()],
                        rows,
                        Some(self.record_view.curser_row),
                    )
                }
                _ => (
                    self.config.columns.iter().map(|c| c.title.clone()).collect(),
                    self.page_cells
                        .iter()
                        .map(|row| {
                            row.iter()
                                .map(|c| table::truncate(c, self.config.max_column_width))
                                .collect()
                        })
                        .collect(),
                    (!self.page_rows.is_empty()).then_some(self.curser_row),
                ),
            };

        let sort_column = match self.view_state.sort_direction() {
            SortDirection::None => None,
            _ => self
                .config
                .columns
                .iter()
                .position(|c| &c.field == self.pipeline.sort_field()),
        };

        let record_view = self.modus_for_view() == Modus::RECORD;
        let widths = if record_view {
            let key_width = rows.iter().map(|r| r[0].chars().count()).max().unwrap_or(5);
            vec![key_width + table::COLUMN_WIDTH_MARGIN, self.config.max_column_width * 2]
        } else {
            table::column_widths(&self.config.columns, &rows, self.config.max_column_width)
        };

        self.uidata = UIData {
            name: self
                .source
                .as_ref()
                .map(|s| s.describe())
                .unwrap_or_else(|| "users".to_string()),
            headers,
            widths,
            rows,
            selected_row,
            record_view,
            loading: self.status == Status::LOADING,
            error: self.fetch_error.clone().or_else(|| self.view_error.clone()),
            no_records: self.status != Status::LOADING && self.no_records,
            page: self.view_state.current_page(),
            page_count: self.last_page(),
            total: self.total,
            record_count: self.records.len(),
            search_term: self.view_state.search_term().to_string(),
            sort_column,
            sort_direction: self.view_state.sort_direction(),
            show_popup: self.show_popup,
            popup_message: HELP_TEXT.to_string(),
            cmdinput: self.last_input.clone(),
            cmd_mode: self.cmd_mode,
            active_cmdinput: self.active_cmdinput,
            search_prompt: format!("Search by {}...", self.config.search_field),
            status_message: self.status_message.clone(),
        };
    }

    // The view shown underneath a popup or the command line
    fn modus_for_view(&self) -> Modus {
        match self.modus {
            Modus::POPUP | Modus::CMDINPUT => self.previous_modus,
            m => m,
        }
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), UTError> {
        self.poll_fetch();

        if let Some(msg) = message {
            match self.modus {
                // The page underneath is stale until the fetch completes
                Modus::TABLE if self.status == Status::LOADING => match msg {
                    Message::Quit => self.quit(),
                    Message::Help => self.show_help(),
                    Message::Reload => self.start_fetch(),
                    _ => trace!("Ignoring {msg:?} while loading"),
                },
                Modus::TABLE => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveDown => self.move_table_selection(1),
                    Message::MoveUp => self.move_table_selection(-1),
                    Message::NextPage => self.goto_page(self.view_state.current_page() + 1),
                    Message::PrevPage => {
                        self.goto_page(self.view_state.current_page().saturating_sub(1))
                    }
                    Message::FirstPage => self.goto_page(1),
                    Message::LastPage => self.goto_page(self.last_page()),
                    Message::ToggleSort => self.toggle_sort(),
                    Message::Search => self.enter_cmd_mode(CMDMode::Search),
                    Message::Enter => self.enter(),
                    Message::Exit => self.exit(),
                    Message::Help => self.show_help(),
                    Message::CopyRow => self.copy_table_row(),
                    Message::Reload => self.start_fetch(),
                    Message::RawKey(_) => (),
                },
                Modus::RECORD => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveDown => self.move_record_selection(1),
                    Message::MoveUp => self.move_record_selection(-1),
                    Message::NextPage => self.step_record(1),
                    Message::PrevPage => self.step_record(-1),
                    Message::CopyRow => self.copy_record_cell(),
                    Message::Help => self.show_help(),
                    Message::Exit | Message::Enter => self.exit(),
                    _ => (),
                },
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Exit | Message::Enter | Message::Help => self.exit(),
                    _ => (),
                },
                Modus::CMDINPUT => {
                    if let Message::RawKey(key) = msg {
                        self.raw_input(key)
                    }
                }
            }
        }

        self.update_uidata();
        Ok(())
    }

    // -------------------- Control handling functions ---------------------- //

    fn enter(&mut self) {
        if self.modus != Modus::TABLE {
            return;
        }
        if let Some(&position) = self.page_rows.get(self.curser_row) {
            self.build_record_view(position);
            self.previous_modus = Modus::TABLE;
            self.modus = Modus::RECORD;
        }
    }

    fn exit(&mut self) {
        match self.modus {
            Modus::TABLE => {
                // Esc on the table drops an active search
                if !self.view_state.search_term().is_empty() {
                    self.set_view_state(self.view_state.with_search_term(""));
                    self.set_status_message("Search cleared");
                }
            }
            Modus::RECORD => {
                self.previous_modus = Modus::RECORD;
                self.modus = Modus::TABLE;
            }
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = self.previous_modus;
                self.previous_modus = Modus::POPUP;
                self.show_popup = false;
            }
            Modus::CMDINPUT => {}
        }
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.show_popup = true;
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        trace!("Entering command mode {mode:?} ...");
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);
        self.active_cmdinput = true;

        self.view_backup = self.view_state.clone();
        self.input.set(self.view_state.search_term());
        self.last_input = self.input.get();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        if !self.active_cmdinput {
            return;
        }
        self.last_input = self.input.read(key);
        if self.last_input.finished {
            self.handle_cmd_input();
        } else if self.cmd_mode == Some(CMDMode::Search) {
            // Search follows every keystroke
            self.set_view_state(self.view_state.with_search_term(self.last_input.input.clone()));
        }
    }

    fn handle_cmd_input(&mut self) {
        trace!("Handle cmd input {:?}", self.last_input);
        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;

        match self.cmd_mode.take() {
            Some(CMDMode::Search) => {
                if self.last_input.canceled {
                    // Back to the term and page from before the prompt
                    self.set_view_state(self.view_backup.clone());
                    // A reload may have shrunk the record set meanwhile
                    self.goto_page(self.view_state.current_page());
                } else {
                    self.set_view_state(
                        self.view_state.with_search_term(self.last_input.input.clone()),
                    );
                }
                if self.view_state.search_term().is_empty() {
                    self.set_status_message(format!("{} records", self.total));
                } else {
                    self.set_status_message(format!(
                        "Found {} matches for \"{}\"",
                        self.total,
                        self.view_state.search_term()
                    ));
                }
            }
            None => info!("Cmd mode is none!"),
        }
        self.input.clear();
        self.last_input = self.input.get();
    }

    fn toggle_sort(&mut self) {
        self.set_view_state(self.view_state.with_sort_toggled());
        let direction = match self.view_state.sort_direction() {
            SortDirection::Ascending => "ascending",
            SortDirection::Descending => "descending",
            SortDirection::None => "none",
        };
        self.set_status_message(format!(
            "Sorted by {} ({direction})",
            self.pipeline.sort_field()
        ));
    }

    fn goto_page(&mut self, page: usize) {
        let page = page.clamp(1, self.last_page());
        if page != self.view_state.current_page() {
            self.curser_row = 0;
            self.set_view_state(self.view_state.with_page(page));
        }
    }

    fn move_table_selection(&mut self, step: isize) {
        if self.page_rows.is_empty() {
            return;
        }
        let last = self.page_rows.len() - 1;
        self.curser_row = self.curser_row.saturating_add_signed(step).min(last);
    }

    fn build_record_view(&mut self, position: usize) {
        trace!("Building record view for record {position} ...");
        let fields = self.record(position).map(|r| r.flatten()).unwrap_or_default();
        self.record_view = RecordView {
            position,
            fields,
            curser_row: 0,
        };
    }

    fn move_record_selection(&mut self, step: isize) {
        let record = &mut self.record_view;
        if record.fields.is_empty() {
            return;
        }
        let last = record.fields.len() - 1;
        record.curser_row = record.curser_row.saturating_add_signed(step).min(last);
    }

    // Moves to the neighbouring record on the current page
    fn step_record(&mut self, step: isize) {
        let Some(idx) = self
            .page_rows
            .iter()
            .position(|&p| p == self.record_view.position)
        else {
            return;
        };
        let next = idx.saturating_add_signed(step);
        if let Some(&position) = self.page_rows.get(next) {
            self.curser_row = next;
            self.build_record_view(position);
        }
    }

    fn copy_table_row(&mut self) {
        let Some(cells) = self.page_cells.get(self.curser_row) else {
            return;
        };
        let row = table::csv_row(cells);
        self.copy_to_clipboard(row);
    }

    fn copy_record_cell(&mut self) {
        let record = &self.record_view;
        let Some((_, value)) = record.fields.get(record.curser_row) else {
            return;
        };
        let value = value.clone();
        self.copy_to_clipboard(value);
    }

    fn copy_to_clipboard(&mut self, content: String) {
        trace!("Clipboard content: {}", content);
        match Clipboard::new().and_then(|mut c| c.set_text(content)) {
            Ok(_) => self.set_status_message("Copied to clipboard."),
            Err(e) => {
                warn!("Error copying to clipboard: {:?}", e);
                self.set_status_message("Unable to access the clipboard!");
            }
        }
    }
}
