use std::time::Instant;

use arboard::Clipboard;
use tracing::{debug, info, trace, warn};

use crate::columns::{ColumnDefinition, RenderedCell};
use crate::domain::{DashConfig, DashError, Message};
use crate::inputter::Inputter;
use crate::market::MarketRow;
use crate::source::{CachedSource, Clock, FetchError};
use crate::table::{
    DragGesture, DragOutcome, Grid, HeaderLayout, SortState, build_grid, working_move,
};
use crate::ui::{COLUMN_SPACING, STATUSLINE_HEIGHT, TABLE_HEADER_HEIGHT, TABS_HEIGHT};
use crate::view_controller::{ViewController, WorkingCopy};

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    QUITTING,
}

/// Which part of the screen receives input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Modus {
    TABLE,
    CUSTOMIZE,
    NAMEINPUT,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataState {
    LOADING,
    READY,
    FAILED(FetchError),
}

#[derive(Default, Clone, Debug, PartialEq)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_height: usize,
}

impl UILayout {
    pub fn from_values(ui_width: usize, ui_height: usize) -> Self {
        let table_height =
            ui_height.saturating_sub(TABS_HEIGHT + TABLE_HEADER_HEIGHT + STATUSLINE_HEIGHT);
        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_height,
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

pub struct Model<C: Clock> {
    config: DashConfig,
    pub status: Status,
    modus: Modus,
    views: ViewController<'static>,
    source: CachedSource<C>,
    rows: Vec<MarketRow>,
    data_state: DataState,
    sort: SortState,
    grid: Grid,
    header_layout: HeaderLayout,
    drag: DragGesture,
    curser_row: usize,
    curser_column: usize,
    offset_row: usize,
    customize_curser: usize,
    input: Inputter,
    clipboard: Option<Clipboard>,
    uilayout: UILayout,
    status_message: String,
    last_status_message_update: Instant,
}

impl<C: Clock> Model<C> {
    pub fn init(
        config: &DashConfig,
        views: ViewController<'static>,
        source: CachedSource<C>,
        clipboard: Option<Clipboard>,
        ui_width: usize,
        ui_height: usize,
    ) -> Self {
        let mut model = Model {
            config: config.clone(),
            status: Status::READY,
            modus: Modus::TABLE,
            views,
            source,
            rows: Vec::new(),
            data_state: DataState::LOADING,
            sort: SortState::default(),
            grid: Grid::default(),
            header_layout: HeaderLayout::default(),
            drag: DragGesture::default(),
            curser_row: 0,
            curser_column: 0,
            offset_row: 0,
            customize_curser: 0,
            input: Inputter::default(),
            clipboard,
            uilayout: UILayout::from_values(ui_width, ui_height),
            status_message: String::new(),
            last_status_message_update: Instant::now(),
        };
        model.rebuild_grid();
        model.set_status_message("Loading ...");
        model
    }

    // ------------------------------ Accessors ------------------------------ //

    pub fn modus(&self) -> Modus {
        self.modus
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn data_state(&self) -> &DataState {
        &self.data_state
    }

    pub fn view_names(&self) -> Vec<&str> {
        self.views.store().names()
    }

    pub fn active_view(&self) -> String {
        self.views.selection().name().to_string()
    }

    pub fn working_copy(&self) -> Option<&WorkingCopy> {
        self.views.working_copy()
    }

    pub fn column_header(&self, id: &str) -> &'static str {
        self.views.registry().get(id).map(|c| c.header).unwrap_or("?")
    }

    pub fn customize_curser(&self) -> usize {
        self.customize_curser
    }

    pub fn name_input(&self) -> &Inputter {
        &self.input
    }

    pub fn selected_row(&self) -> usize {
        self.curser_row
    }

    pub fn selected_column(&self) -> usize {
        self.curser_column
    }

    pub fn offset_row(&self) -> usize {
        self.offset_row
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn status_message_age(&self) -> std::time::Duration {
        self.last_status_message_update.elapsed()
    }

    pub fn rows_loaded(&self) -> usize {
        self.rows.len()
    }

    // ------------------------------- Data --------------------------------- //

    /// Fetches when the cached rows went stale. Called once per event loop
    /// iteration.
    pub fn tick(&mut self) {
        if self.source.is_due() {
            self.refresh();
        }
    }

    fn refresh(&mut self) {
        let start_time = Instant::now();
        match self.source.markets() {
            Ok(rows) => {
                self.rows = rows.to_vec();
                self.data_state = DataState::READY;
                let message = format!(
                    "Loaded {} coins in {}ms",
                    self.rows.len(),
                    start_time.elapsed().as_millis()
                );
                info!("{message}");
                self.set_status_message(message);
            }
            Err(e) => {
                self.set_status_message(e.to_string());
                self.data_state = DataState::FAILED(e);
            }
        }
        self.rebuild_grid();
    }

    fn display_columns(&self) -> Vec<&'static ColumnDefinition> {
        self.views.display_columns()
    }

    fn rebuild_grid(&mut self) {
        let columns = self.display_columns();
        self.grid = build_grid(&columns, &self.rows, &self.sort, self.config.max_column_width);
        self.header_layout =
            HeaderLayout::fit(self.uilayout.width, &self.grid.widths, COLUMN_SPACING);

        self.curser_column = self.curser_column.min(columns.len().saturating_sub(1));
        self.curser_row = self.curser_row.min(self.grid.rows.len().saturating_sub(1));
        self.keep_row_visible();
        trace!(
            "Grid: {} columns, {} rows, sort {:?}",
            self.grid.headers.len(),
            self.grid.rows.len(),
            self.sort.column()
        );
    }

    fn keep_row_visible(&mut self) {
        let height = self.uilayout.table_height.max(1);
        if self.curser_row < self.offset_row {
            self.offset_row = self.curser_row;
        } else if self.curser_row >= self.offset_row + height {
            self.offset_row = self.curser_row + 1 - height;
        }
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.last_status_message_update = Instant::now();
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout = UILayout::from_values(width, height);
        self.header_layout =
            HeaderLayout::fit(self.uilayout.width, &self.grid.widths, COLUMN_SPACING);
        self.keep_row_visible();
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    // ------------------------------ Updates ------------------------------- //

    pub fn update(&mut self, message: Option<Message>) -> Result<(), DashError> {
        let Some(msg) = message else {
            return Ok(());
        };
        trace!("Update: Modus {:?}, Message {:?}", self.modus, msg);

        match self.modus {
            Modus::TABLE => match msg {
                Message::Quit => self.quit(),
                Message::MoveUp => self.move_table_selection(-1),
                Message::MoveDown => self.move_table_selection(1),
                Message::MoveLeft => self.move_column_selection(-1),
                Message::MoveRight => self.move_column_selection(1),
                Message::ToggleSort => self.sort_column(self.curser_column),
                Message::MoveColumnLeft => self.move_selected_column(-1),
                Message::MoveColumnRight => self.move_selected_column(1),
                Message::NextView => self.next_view(),
                Message::SelectView(idx) => self.select_view(idx),
                Message::Refresh => {
                    self.source.invalidate();
                    self.refresh();
                }
                Message::CopyCell => self.copy_table_cell(),
                Message::CopyRow => self.copy_table_row(),
                Message::OpenCustomize => self.open_customize(),
                Message::HeaderPress(x) => self.header_press(x),
                Message::HeaderRelease(x, y) => self.header_release(x, y),
                Message::Resize(width, height) => self.ui_resize(width.into(), height.into()),
                _ => (),
            },
            Modus::CUSTOMIZE => match msg {
                Message::MoveUp => self.move_customize_selection(-1),
                Message::MoveDown => self.move_customize_selection(1),
                Message::ToggleColumn => self.toggle_selected_entry(),
                Message::MoveEntryUp => self.move_selected_entry(-1),
                Message::MoveEntryDown => self.move_selected_entry(1),
                Message::MoveColumnLeft => self.move_selected_column(-1),
                Message::MoveColumnRight => self.move_selected_column(1),
                Message::FocusNameInput => self.modus = Modus::NAMEINPUT,
                Message::Commit => self.commit_customize(),
                Message::Cancel => self.cancel_customize(),
                Message::HeaderPress(x) => self.header_press(x),
                Message::HeaderRelease(x, y) => self.header_release(x, y),
                Message::Resize(width, height) => self.ui_resize(width.into(), height.into()),
                _ => (),
            },
            Modus::NAMEINPUT => match msg {
                Message::FocusNameInput => self.modus = Modus::CUSTOMIZE,
                Message::RawKey(key) => self.raw_input(key),
                Message::Resize(width, height) => self.ui_resize(width.into(), height.into()),
                _ => (),
            },
        }
        Ok(())
    }

    // -------------------- Table handling functions ------------------------ //

    fn move_table_selection(&mut self, step: isize) {
        let last = self.grid.rows.len().saturating_sub(1);
        self.curser_row = self.curser_row.saturating_add_signed(step).min(last);
        self.keep_row_visible();
    }

    fn move_column_selection(&mut self, step: isize) {
        let last = self.grid.headers.len().saturating_sub(1);
        self.curser_column = self.curser_column.saturating_add_signed(step).min(last);
    }

    fn sort_column(&mut self, column: usize) {
        let columns = self.display_columns();
        if let Some(column) = columns.get(column) {
            self.sort.toggle(column);
            self.rebuild_grid();
        }
    }

    fn next_view(&mut self) {
        let active = self.active_view();
        let names = self.view_names();
        let current = names.iter().position(|n| *n == active).unwrap_or(0);
        let next = (current + 1) % names.len().max(1);
        self.select_view(next);
    }

    fn select_view(&mut self, idx: usize) {
        let Some(name) = self.view_names().get(idx).map(|n| n.to_string()) else {
            debug!("No view at position {idx}");
            return;
        };
        self.views.select_view(&name);
        self.set_status_message(format!("View {name}"));
        self.rebuild_grid();
    }

    fn selected_cells(&self) -> Option<&[RenderedCell]> {
        self.grid.rows.get(self.curser_row).map(Vec::as_slice)
    }

    fn copy_to_clipboard(&mut self, content: String) {
        let Some(clipboard) = self.clipboard.as_mut() else {
            self.set_status_message("Clipboard is not available");
            return;
        };
        match clipboard.set_text(content) {
            Ok(_) => {
                trace!("Copied content to clipboard.");
                self.set_status_message("Copied to clipboard");
            }
            Err(e) => warn!("Error copying to clipboard: {:?}", e),
        }
    }

    fn copy_table_cell(&mut self) {
        let cell = self
            .selected_cells()
            .and_then(|cells| cells.get(self.curser_column))
            .map(|c| c.text.clone());
        if let Some(cell) = cell {
            trace!("Cell content: {}", cell);
            self.copy_to_clipboard(cell);
        }
    }

    fn wrap_cell_content(c: &str) -> String {
        let needs_escaping = c.contains('"');
        let needs_wrapping =
            needs_escaping || c.chars().any(|c| c == ' ' || c == '\t' || c == ',');
        let mut out = String::from(c);

        if needs_escaping {
            out = out.replace('"', "\"\"");
        }
        if needs_wrapping {
            out = format!("\"{out}\"");
        }
        out
    }

    fn copy_table_row(&mut self) {
        let row = self.selected_cells().map(|cells| {
            cells
                .iter()
                .map(|c| Self::wrap_cell_content(&c.text))
                .collect::<Vec<String>>()
                .join(",")
        });
        if let Some(row) = row {
            self.copy_to_clipboard(row);
        }
    }

    // ------------------ Customize handling functions ---------------------- //

    fn open_customize(&mut self) {
        if self.views.open_customize() {
            self.modus = Modus::CUSTOMIZE;
            self.customize_curser = 0;
            self.input.clear();
            self.rebuild_grid();
        }
    }

    fn working_len(&self) -> usize {
        self.views.working_copy().map(|w| w.entries().len()).unwrap_or(0)
    }

    fn move_customize_selection(&mut self, step: isize) {
        let last = self.working_len().saturating_sub(1);
        self.customize_curser = self.customize_curser.saturating_add_signed(step).min(last);
    }

    fn toggle_selected_entry(&mut self) {
        let id = self
            .views
            .working_copy()
            .and_then(|w| w.entries().get(self.customize_curser))
            .map(|e| e.id.clone());
        if let Some(id) = id
            && self.views.toggle_column_visibility(&id)
        {
            self.rebuild_grid();
        }
    }

    fn move_selected_entry(&mut self, step: isize) {
        let from = self.customize_curser;
        let Some(to) = from.checked_add_signed(step) else {
            return;
        };
        if self.views.reorder_columns(from, to) {
            self.customize_curser = to;
            self.rebuild_grid();
        }
    }

    /// Moves the selected table column one slot, opening a customize session
    /// when none is running.
    fn move_selected_column(&mut self, step: isize) {
        let from = self.curser_column;
        let Some(to) = from.checked_add_signed(step) else {
            return;
        };
        if self.reorder_displayed(from, to) {
            self.curser_column = to;
        }
    }

    fn reorder_displayed(&mut self, from: usize, to: usize) -> bool {
        let shown = self.display_columns().len();
        if from == to || from >= shown || to >= shown {
            return false;
        }
        let opened_here = !self.views.is_customizing();
        self.open_customize();
        let displayed = self.display_columns();
        let target = self
            .views
            .working_copy()
            .and_then(|w| working_move(&displayed, w, from, to));
        let moved = match target {
            Some((wfrom, wto)) => self.views.reorder_columns(wfrom, wto),
            None => false,
        };
        if moved {
            self.rebuild_grid();
        } else if opened_here {
            self.cancel_customize();
        }
        moved
    }

    fn header_press(&mut self, x: u16) {
        self.drag.press(&self.header_layout, x);
    }

    fn header_release(&mut self, x: u16, y: u16) {
        match self.drag.release(&self.header_layout, x, y) {
            Some(DragOutcome::Click(column)) => {
                self.curser_column = column;
                self.sort_column(column);
            }
            Some(DragOutcome::Move { from, to }) => {
                if self.reorder_displayed(from, to) {
                    self.curser_column = to;
                }
            }
            None => (),
        }
    }

    fn commit_customize(&mut self) {
        let name = self.input.value().to_string();
        if self.views.commit(&name) {
            let message = format!("Saved view {}", self.views.selection().name());
            self.set_status_message(message);
        }
        self.input.clear();
        self.modus = Modus::TABLE;
        self.rebuild_grid();
    }

    fn cancel_customize(&mut self) {
        self.views.cancel();
        self.input.clear();
        self.modus = Modus::TABLE;
        self.rebuild_grid();
    }

    fn raw_input(&mut self, key: ratatui::crossterm::event::KeyEvent) {
        let result = self.input.read(key);
        if result.canceled {
            self.input.clear();
            self.modus = Modus::CUSTOMIZE;
        } else if result.finished {
            self.commit_customize();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    use super::*;
    use crate::columns::Registry;
    use crate::domain::DEFAULT_VIEW_NAME;
    use crate::source::{JsonFileSource, MarketSource, SystemClock};
    use crate::storage::MemoryStorage;
    use crate::ui::{TABLE_HEADER_ROW, TableUI};
    use crate::views::ViewStore;

    struct FailingSource(FetchError);

    impl MarketSource for FailingSource {
        fn fetch_markets(&mut self) -> Result<Vec<MarketRow>, FetchError> {
            Err(self.0.clone())
        }
    }

    fn model_with(source: Box<dyn MarketSource>) -> Model<SystemClock> {
        sized_model_with(source, 120, 40)
    }

    fn sized_model_with(
        source: Box<dyn MarketSource>,
        width: usize,
        height: usize,
    ) -> Model<SystemClock> {
        let registry = Registry::builtin();
        let store = ViewStore::load(Box::new(MemoryStorage::default()), registry);
        let views = ViewController::new(registry, store);
        let source = CachedSource::new(source, SystemClock, Duration::from_secs(600));
        let mut model = Model::init(&DashConfig::default(), views, source, None, width, height);
        model.tick();
        model
    }

    fn fixture_source() -> Box<dyn MarketSource> {
        Box::new(JsonFileSource::new(PathBuf::from("tests/fixtures/markets.json")))
    }

    fn fixture_model() -> Model<SystemClock> {
        model_with(fixture_source())
    }

    fn header_ids<C: Clock>(model: &Model<C>) -> Vec<&'static str> {
        model.grid().headers.iter().map(|h| h.id).collect()
    }

    fn send<C: Clock>(model: &mut Model<C>, message: Message) {
        model.update(Some(message)).unwrap();
    }

    fn type_name<C: Clock>(model: &mut Model<C>, name: &str) {
        for chr in name.chars() {
            send(
                model,
                Message::RawKey(KeyEvent::new(KeyCode::Char(chr), KeyModifiers::NONE)),
            );
        }
    }

    #[test]
    fn loads_fixture_into_grid() {
        let model = fixture_model();
        assert_eq!(model.data_state(), &DataState::READY);
        assert_eq!(model.grid().rows.len(), model.rows_loaded());
        assert_eq!(model.grid().headers.len(), 9);

        // binancecoin has no 1h change, the rest of its row still renders
        let bnb = &model.grid().rows[3];
        assert_eq!(bnb[1].text, "BNB");
        assert_eq!(bnb[3].text, "N/A");
        assert_eq!(bnb[4].text, "↑ 0.87%");
    }

    #[test]
    fn failed_fetch_blocks_body_but_keeps_headers() {
        let model = model_with(Box::new(FailingSource(FetchError::RateLimited(
            "slow down".into(),
        ))));
        assert!(matches!(
            model.data_state(),
            DataState::FAILED(FetchError::RateLimited(_))
        ));
        assert!(model.grid().rows.is_empty());
        assert_eq!(model.grid().headers.len(), 9);
    }

    #[test]
    fn header_click_sorts_and_drag_reorders() {
        let mut model = fixture_model();
        let price_x = model.header_layout.start_of(2).unwrap();
        send(&mut model, Message::HeaderPress(price_x));
        send(&mut model, Message::HeaderRelease(price_x, 0));
        assert_eq!(model.sort.column(), Some("current_price"));
        assert_eq!(model.grid().rows[0][1].text, "Shiba Inu");

        let name_x = model.header_layout.start_of(1).unwrap();
        let index_x = model.header_layout.start_of(0).unwrap();
        send(&mut model, Message::HeaderPress(name_x));
        send(&mut model, Message::HeaderRelease(index_x, 25));
        assert_eq!(model.modus(), Modus::CUSTOMIZE);
        assert_eq!(&header_ids(&model)[..2], ["name", "index"]);

        send(&mut model, Message::FocusNameInput);
        type_name(&mut model, "Mine");
        send(
            &mut model,
            Message::RawKey(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)),
        );
        assert_eq!(model.modus(), Modus::TABLE);
        assert_eq!(model.active_view(), "Mine");
        assert_eq!(model.view_names(), vec![DEFAULT_VIEW_NAME, "Mine"]);
    }

    #[test]
    fn customize_hide_and_cancel() {
        let mut model = fixture_model();
        send(&mut model, Message::OpenCustomize);
        send(&mut model, Message::ToggleColumn);
        assert_eq!(header_ids(&model)[0], "name");

        send(&mut model, Message::Cancel);
        assert_eq!(model.modus(), Modus::TABLE);
        assert_eq!(header_ids(&model)[0], "index");
    }

    #[test]
    fn unnamed_commit_updates_active_view() {
        let mut model = fixture_model();
        send(&mut model, Message::OpenCustomize);
        send(&mut model, Message::MoveDown);
        send(&mut model, Message::MoveEntryUp);
        send(&mut model, Message::Commit);

        assert_eq!(model.active_view(), DEFAULT_VIEW_NAME);
        assert_eq!(&header_ids(&model)[..2], ["name", "index"]);
    }

    #[test]
    fn tab_cycles_views() {
        let mut model = fixture_model();
        send(&mut model, Message::OpenCustomize);
        send(&mut model, Message::ToggleColumn);
        send(&mut model, Message::FocusNameInput);
        type_name(&mut model, "NoIndex");
        send(&mut model, Message::FocusNameInput);
        send(&mut model, Message::Commit);
        assert_eq!(model.active_view(), "NoIndex");

        send(&mut model, Message::NextView);
        assert_eq!(model.active_view(), DEFAULT_VIEW_NAME);
        send(&mut model, Message::NextView);
        assert_eq!(model.active_view(), "NoIndex");
        send(&mut model, Message::SelectView(0));
        assert_eq!(model.active_view(), DEFAULT_VIEW_NAME);
    }

    /// Header row as drawn, one entry per terminal cell.
    fn drawn_header<C: Clock>(model: &Model<C>, width: u16, height: u16) -> Vec<String> {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| TableUI::new().draw(model, f)).unwrap();
        let buffer = terminal.backend().buffer();
        (0..width)
            .map(|x| buffer[(x, TABLE_HEADER_ROW)].symbol().to_string())
            .collect()
    }

    fn drawn_x(header: &[String], label: &str) -> u16 {
        let line = header.concat();
        let byte = line.find(label).unwrap();
        line[..byte].chars().count() as u16
    }

    #[test]
    fn header_clicks_hit_drawn_columns_on_narrow_terminals() {
        let mut model = sized_model_with(fixture_source(), 80, 20);
        let header = drawn_header(&model, 80, 20);

        let x = drawn_x(&header, "Market Cap");
        send(&mut model, Message::HeaderPress(x));
        send(&mut model, Message::HeaderRelease(x, TABLE_HEADER_ROW));
        assert_eq!(model.sort.column(), Some("market_cap"));

        let x = drawn_x(&header, "Coin");
        send(&mut model, Message::HeaderPress(x + 1));
        send(&mut model, Message::HeaderRelease(x + 1, TABLE_HEADER_ROW));
        assert_eq!(model.sort.column(), Some("name"));
    }

    #[test]
    fn resize_moves_header_hit_areas() {
        let mut model = fixture_model();
        send(&mut model, Message::Resize(80, 20));
        let header = drawn_header(&model, 80, 20);

        let x = drawn_x(&header, "Market Cap");
        send(&mut model, Message::HeaderPress(x));
        send(&mut model, Message::HeaderRelease(x, TABLE_HEADER_ROW));
        assert_eq!(model.sort.column(), Some("market_cap"));
    }

    #[test]
    fn failed_column_move_stays_in_table() {
        let mut model = fixture_model();
        let last = model.grid().headers.len() - 1;
        for _ in 0..last {
            send(&mut model, Message::MoveRight);
        }
        assert_eq!(model.selected_column(), last);

        send(&mut model, Message::MoveColumnRight);
        assert_eq!(model.modus(), Modus::TABLE);
        assert!(model.working_copy().is_none());

        send(&mut model, Message::MoveColumnLeft);
        assert_eq!(model.modus(), Modus::CUSTOMIZE);
        assert_eq!(model.selected_column(), last - 1);
        assert_eq!(header_ids(&model)[last - 1], "sparkline");
    }

    #[test]
    fn csv_wrapping() {
        type M = Model<SystemClock>;
        assert_eq!(M::wrap_cell_content("$1,000"), "\"$1,000\"");
        assert_eq!(M::wrap_cell_content("a\"b"), "\"a\"\"b\"");
        assert_eq!(M::wrap_cell_content("plain"), "plain");
    }
}
