use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, MouseButton, MouseEvent, MouseEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Bar, BarChart, BarGroup, Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState},
    Frame,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::FreightError;
use crate::fmt::money;
use crate::models::{step_month, Field, MonthDocument, Shipment};
use crate::months::{default_shipment, ensure_month, save_month};
use crate::reference::ReferenceRegistry;
use crate::store::{DocumentStore, Subscription, SHIPMENTS};
use crate::summary::summarize;
use crate::tui::{money_span, FOOTER_STYLE, HEADER_STYLE, SELECTED_STYLE};

pub const SAVE_FAILED: &str = "Failed to save - check your connection";
pub const PERMISSION_HINT: &str =
    "Permission denied - the database may be read-only; check file permissions";

const COLUMN_WIDTHS: [u16; 10] = [10, 10, 10, 14, 14, 18, 10, 11, 10, 12];
const MAX_DROPDOWN: usize = 8;
const SUMMARY_HEIGHT: u16 = 7;

#[derive(Debug, Clone, Copy)]
pub struct GridTiming {
    /// Delay between losing focus and committing, long enough for a click on a
    /// dropdown candidate to land first.
    pub blur_commit: Duration,
    /// Delay before opening the next cell after Enter/Tab/add.
    pub navigation: Duration,
}

impl Default for GridTiming {
    fn default() -> Self {
        Self {
            blur_commit: Duration::from_millis(200),
            navigation: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellEdit {
    pub row: usize,
    pub field: Field,
    pub buffer: String,
    /// Candidates matching the buffer. Empty for free-text fields.
    pub matches: Vec<String>,
    pub highlighted: usize,
}

impl CellEdit {
    pub fn dropdown_open(&self) -> bool {
        self.field.is_autocomplete() && !self.matches.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PromptKind {
    Company,
    Location,
}

#[derive(Debug, Clone, PartialEq)]
enum Mode {
    Idle,
    Editing(CellEdit),
    ConfirmDelete(usize),
    Prompt { kind: PromptKind, input: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Deferred {
    Commit { row: usize, field: Field },
    OpenCell { row: usize, field: Field },
}

#[derive(Debug)]
struct Scheduled {
    due: Instant,
    action: Deferred,
}

pub enum GridAction {
    Continue,
    Close,
}

/// Screen regions from the last draw, for mouse hit-testing.
#[derive(Debug, Default, Clone)]
struct HitMap {
    body: Rect,
    columns: Vec<(u16, u16)>,
    dropdown: Option<Rect>,
}

type Snapshot = (&'static str, Option<Value>);

/// Inline-editing grid over one month's shipments. The record list shown is
/// whatever the month subscription last delivered; edits go to the store and
/// come back through the subscription.
pub struct ShipmentGrid {
    month: &'static str,
    records: Vec<Shipment>,
    mode: Mode,
    cursor_row: usize,
    cursor_field: Field,
    offset: usize,
    visible_count: usize,
    timing: GridTiming,
    scheduled: Vec<Scheduled>,
    status_message: Option<String>,
    notice: Option<String>,
    snapshot_tx: Sender<Snapshot>,
    snapshots: Receiver<Snapshot>,
    subscription: Option<Subscription>,
    hit_map: HitMap,
    table_state: TableState,
}

impl ShipmentGrid {
    pub fn new(timing: GridTiming) -> Self {
        let (snapshot_tx, snapshots) = mpsc::channel();
        Self {
            month: crate::models::MONTHS[0],
            records: Vec::new(),
            mode: Mode::Idle,
            cursor_row: 0,
            cursor_field: Field::RefNum,
            offset: 0,
            visible_count: 20,
            timing,
            scheduled: Vec::new(),
            status_message: None,
            notice: None,
            snapshot_tx,
            snapshots,
            subscription: None,
            hit_map: HitMap::default(),
            table_state: TableState::default(),
        }
    }

    /// Create a grid attached to `month`.
    pub fn open(
        store: &dyn DocumentStore,
        refs: &ReferenceRegistry,
        month: &'static str,
        timing: GridTiming,
    ) -> Self {
        let mut grid = Self::new(timing);
        grid.switch_month(store, refs, month);
        grid
    }

    pub fn month(&self) -> &'static str {
        self.month
    }

    pub fn records(&self) -> &[Shipment] {
        &self.records
    }

    pub fn editing(&self) -> Option<&CellEdit> {
        match &self.mode {
            Mode::Editing(edit) => Some(edit),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    #[cfg(test)]
    pub fn status(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    #[cfg(test)]
    pub fn has_pending(&self) -> bool {
        !self.scheduled.is_empty()
    }

    // -----------------------------------------------------------------------
    // Subscription
    // -----------------------------------------------------------------------

    /// Commit any edit, bootstrap the target month if needed, and move the
    /// subscription to it.
    pub fn switch_month(&mut self, store: &dyn DocumentStore, refs: &ReferenceRegistry, month: &'static str) {
        if matches!(self.mode, Mode::Editing(_)) {
            self.commit(store);
        }
        self.mode = Mode::Idle;
        self.scheduled.clear();

        if let Err(e) = ensure_month(store, refs.lists(), month) {
            self.report_error("bootstrap month", &e);
        }

        if let Some(old) = self.subscription.take() {
            old.unsubscribe();
        }
        self.month = month;
        self.records.clear();
        self.cursor_row = 0;
        self.offset = 0;

        let tx = self.snapshot_tx.clone();
        let listener = Arc::new(move |doc: Option<&Value>| {
            let _ = tx.send((month, doc.cloned()));
        });
        match store.subscribe(SHIPMENTS, month, listener) {
            Ok(sub) => self.subscription = Some(sub),
            Err(e) => self.report_error("subscribe", &e),
        }
        self.drain_snapshots();
        info!(month, rows = self.records.len(), "month opened");
    }

    fn drain_snapshots(&mut self) {
        while let Ok((month, doc)) = self.snapshots.try_recv() {
            if month != self.month {
                debug!(month, active = self.month, "ignoring snapshot for inactive month");
                continue;
            }
            match doc {
                None => self.records.clear(),
                Some(value) => match serde_json::from_value::<MonthDocument>(value) {
                    Ok(doc) => self.records = doc.shipments,
                    Err(e) => warn!(month, error = %e, "malformed month snapshot"),
                },
            }
        }
        self.cursor_row = self.cursor_row.min(self.records.len().saturating_sub(1));
    }

    // -----------------------------------------------------------------------
    // Editing transitions
    // -----------------------------------------------------------------------

    /// Start editing a cell. Selecting another cell while editing commits the
    /// current edit first.
    pub fn select_cell(&mut self, store: &dyn DocumentStore, refs: &ReferenceRegistry, row: usize, field: Field) {
        if let Mode::Editing(edit) = &self.mode {
            if edit.row == row && edit.field == field {
                return;
            }
            self.commit(store);
        }
        let Some(record) = self.records.get(row) else {
            return;
        };
        let buffer = record.get(field);
        let matches = refs.candidates(field);
        self.cursor_row = row;
        self.cursor_field = field;
        self.ensure_visible();
        self.mode = Mode::Editing(CellEdit {
            row,
            field,
            buffer,
            matches,
            highlighted: 0,
        });
    }

    /// Replace the edit buffer and re-filter the candidates against it.
    pub fn set_buffer(&mut self, refs: &ReferenceRegistry, value: &str) {
        let Mode::Editing(edit) = &mut self.mode else {
            return;
        };
        edit.buffer = value.to_string();
        let needle = edit.buffer.to_lowercase();
        edit.matches = refs
            .candidates(edit.field)
            .into_iter()
            .filter(|c| c.to_lowercase().contains(&needle))
            .collect();
        edit.highlighted = 0;
    }

    fn input_push(&mut self, refs: &ReferenceRegistry, c: char) {
        if let Mode::Editing(edit) = &self.mode {
            let mut value = edit.buffer.clone();
            value.push(c);
            self.set_buffer(refs, &value);
        }
    }

    fn input_backspace(&mut self, refs: &ReferenceRegistry) {
        if let Mode::Editing(edit) = &self.mode {
            let mut value = edit.buffer.clone();
            value.pop();
            self.set_buffer(refs, &value);
        }
    }

    /// Pointer-down on a dropdown candidate: the candidate replaces the buffer
    /// and the dropdown closes. Focus stays on the cell.
    pub fn pick_candidate(&mut self, idx: usize) {
        if let Mode::Editing(edit) = &mut self.mode {
            if let Some(choice) = edit.matches.get(idx).cloned() {
                edit.buffer = choice;
                edit.matches.clear();
                edit.highlighted = 0;
            }
        }
    }

    /// Focus left the cell; commit after the blur delay.
    pub fn blur(&mut self, now: Instant) {
        if let Mode::Editing(edit) = &self.mode {
            let action = Deferred::Commit {
                row: edit.row,
                field: edit.field,
            };
            self.schedule(now + self.timing.blur_commit, action);
        }
    }

    /// Enter: take the highlighted candidate if the dropdown is open, commit,
    /// then open the same column on the next row.
    pub fn enter(&mut self, store: &dyn DocumentStore, now: Instant) {
        let Mode::Editing(edit) = &mut self.mode else {
            return;
        };
        if edit.dropdown_open() {
            let idx = edit.highlighted.min(edit.matches.len() - 1);
            edit.buffer = edit.matches[idx].clone();
        }
        let (row, field) = (edit.row, edit.field);
        self.commit(store);
        if row + 1 < self.records.len() {
            self.schedule(now + self.timing.navigation, Deferred::OpenCell { row: row + 1, field });
        }
    }

    /// Tab: commit, then open the next column on the same row.
    pub fn tab(&mut self, store: &dyn DocumentStore, now: Instant) {
        let Mode::Editing(edit) = &self.mode else {
            return;
        };
        let (row, field) = (edit.row, edit.field);
        self.commit(store);
        if let Some(next) = field.next() {
            self.schedule(now + self.timing.navigation, Deferred::OpenCell { row, field: next });
        }
    }

    /// Escape: drop the buffer without writing.
    pub fn escape(&mut self) {
        if let Mode::Editing(edit) = &self.mode {
            self.cursor_row = edit.row;
            self.cursor_field = edit.field;
            self.mode = Mode::Idle;
        }
    }

    /// Write the buffer into a copy of the current records and persist the
    /// whole list.
    pub fn commit(&mut self, store: &dyn DocumentStore) {
        if !matches!(self.mode, Mode::Editing(_)) {
            return;
        }
        let Mode::Editing(edit) = std::mem::replace(&mut self.mode, Mode::Idle) else {
            return;
        };
        self.cursor_row = edit.row;
        self.cursor_field = edit.field;
        let mut shipments = self.records.clone();
        let Some(record) = shipments.get_mut(edit.row) else {
            warn!(row = edit.row, month = self.month, "commit target row no longer exists");
            return;
        };
        record.set(edit.field, &edit.buffer);
        debug!(row = edit.row, field = ?edit.field, month = self.month, "committing cell");
        self.persist(store, shipments);
    }

    fn persist(&mut self, store: &dyn DocumentStore, shipments: Vec<Shipment>) -> bool {
        match save_month(store, self.month, shipments) {
            Ok(()) => true,
            Err(e) => {
                self.report_error("save", &e);
                false
            }
        }
    }

    fn report_error(&mut self, context: &str, e: &FreightError) {
        error!(context, month = self.month, error = %e, "store operation failed");
        let msg = match e {
            FreightError::PermissionDenied(_) => PERMISSION_HINT,
            _ => SAVE_FAILED,
        };
        self.notice = Some(msg.to_string());
    }

    // -----------------------------------------------------------------------
    // Rows
    // -----------------------------------------------------------------------

    /// Append a default row, save, then open its reference cell.
    pub fn add_row(&mut self, store: &dyn DocumentStore, refs: &ReferenceRegistry, now: Instant) {
        if matches!(self.mode, Mode::Editing(_)) {
            self.commit(store);
            // Build on the list the commit just wrote.
            self.drain_snapshots();
        }
        let mut shipments = self.records.clone();
        shipments.push(default_shipment(refs.lists()));
        let new_row = shipments.len() - 1;
        if self.persist(store, shipments) {
            self.schedule(
                now + self.timing.navigation,
                Deferred::OpenCell {
                    row: new_row,
                    field: Field::RefNum,
                },
            );
        }
    }

    pub fn request_delete(&mut self, row: usize) {
        if row < self.records.len() {
            self.mode = Mode::ConfirmDelete(row);
        }
    }

    /// Remove the confirmed row. A month is never saved empty: deleting the
    /// only row leaves a fresh default record in its place.
    pub fn confirm_delete(&mut self, store: &dyn DocumentStore, refs: &ReferenceRegistry) {
        let Mode::ConfirmDelete(row) = self.mode else {
            return;
        };
        self.mode = Mode::Idle;
        let mut shipments = self.records.clone();
        if row >= shipments.len() {
            return;
        }
        let removed = shipments.remove(row);
        info!(row, id = %removed.id, month = self.month, "deleting row");
        if shipments.is_empty() {
            shipments.push(default_shipment(refs.lists()));
        }
        if self.persist(store, shipments) {
            self.status_message = Some(format!("Deleted row {}", row + 1));
        }
    }

    pub fn cancel_delete(&mut self) {
        if let Mode::ConfirmDelete(_) = self.mode {
            self.mode = Mode::Idle;
        }
    }

    // -----------------------------------------------------------------------
    // Deferred actions
    // -----------------------------------------------------------------------

    fn schedule(&mut self, due: Instant, action: Deferred) {
        self.scheduled.push(Scheduled { due, action });
    }

    /// Apply pushed snapshots, then run deferred actions that are due.
    pub fn tick(&mut self, store: &dyn DocumentStore, refs: &ReferenceRegistry, now: Instant) {
        self.drain_snapshots();
        let (due, pending): (Vec<Scheduled>, Vec<Scheduled>) =
            std::mem::take(&mut self.scheduled).into_iter().partition(|s| s.due <= now);
        self.scheduled = pending;
        for item in due {
            self.run_deferred(store, refs, item.action);
        }
    }

    fn run_deferred(&mut self, store: &dyn DocumentStore, refs: &ReferenceRegistry, action: Deferred) {
        match action {
            Deferred::Commit { row, field } => {
                let same_cell = matches!(&self.mode, Mode::Editing(e) if e.row == row && e.field == field);
                if same_cell {
                    self.commit(store);
                }
            }
            Deferred::OpenCell { row, field } => {
                self.drain_snapshots();
                if row < self.records.len() && matches!(self.mode, Mode::Idle | Mode::Editing(_)) {
                    self.select_cell(store, refs, row, field);
                } else {
                    debug!(row, ?field, "dropping navigation to missing row");
                }
            }
        }
    }

    /// Run pending blur commits now. Used before exit.
    pub fn flush(&mut self, store: &dyn DocumentStore) {
        let pending = std::mem::take(&mut self.scheduled);
        for item in pending {
            if let Deferred::Commit { row, field } = item.action {
                let same_cell = matches!(&self.mode, Mode::Editing(e) if e.row == row && e.field == field);
                if same_cell {
                    self.commit(store);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Input
    // -----------------------------------------------------------------------

    pub fn handle_key(
        &mut self,
        code: KeyCode,
        store: &dyn DocumentStore,
        refs: &ReferenceRegistry,
        now: Instant,
    ) -> GridAction {
        if self.notice.is_some() {
            self.notice = None;
            return GridAction::Continue;
        }
        self.status_message = None;

        match &self.mode {
            Mode::Idle => return self.handle_idle_key(code, store, refs, now),
            Mode::Editing(_) => self.handle_edit_key(code, store, refs, now),
            Mode::ConfirmDelete(_) => match code {
                KeyCode::Char('y') | KeyCode::Char('Y') => self.confirm_delete(store, refs),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => self.cancel_delete(),
                _ => {}
            },
            Mode::Prompt { .. } => self.handle_prompt_key(code, store, refs),
        }
        GridAction::Continue
    }

    fn handle_idle_key(
        &mut self,
        code: KeyCode,
        store: &dyn DocumentStore,
        refs: &ReferenceRegistry,
        now: Instant,
    ) -> GridAction {
        let last_row = self.records.len().saturating_sub(1);
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return GridAction::Close,
            KeyCode::Up => self.cursor_row = self.cursor_row.saturating_sub(1),
            KeyCode::Down => self.cursor_row = (self.cursor_row + 1).min(last_row),
            KeyCode::Left => {
                if let Some(prev) = self.cursor_field.prev() {
                    self.cursor_field = prev;
                }
            }
            KeyCode::Right | KeyCode::Tab => {
                if let Some(next) = self.cursor_field.next() {
                    self.cursor_field = next;
                }
            }
            KeyCode::Home => self.cursor_row = 0,
            KeyCode::End => self.cursor_row = last_row,
            KeyCode::Enter | KeyCode::Char('e') | KeyCode::F(2) => {
                self.select_cell(store, refs, self.cursor_row, self.cursor_field);
            }
            KeyCode::Char('a') => self.add_row(store, refs, now),
            KeyCode::Char('d') | KeyCode::Delete => self.request_delete(self.cursor_row),
            KeyCode::Char('[') | KeyCode::PageUp => {
                self.switch_month(store, refs, step_month(self.month, -1));
            }
            KeyCode::Char(']') | KeyCode::PageDown => {
                self.switch_month(store, refs, step_month(self.month, 1));
            }
            KeyCode::Char('C') => {
                self.mode = Mode::Prompt {
                    kind: PromptKind::Company,
                    input: String::new(),
                }
            }
            KeyCode::Char('L') => {
                self.mode = Mode::Prompt {
                    kind: PromptKind::Location,
                    input: String::new(),
                }
            }
            _ => {}
        }
        self.ensure_visible();
        GridAction::Continue
    }

    fn handle_edit_key(
        &mut self,
        code: KeyCode,
        store: &dyn DocumentStore,
        refs: &ReferenceRegistry,
        now: Instant,
    ) {
        match code {
            KeyCode::Char(c) => self.input_push(refs, c),
            KeyCode::Backspace => self.input_backspace(refs),
            KeyCode::Up => {
                if let Mode::Editing(edit) = &mut self.mode {
                    edit.highlighted = edit.highlighted.saturating_sub(1);
                }
            }
            KeyCode::Down => {
                if let Mode::Editing(edit) = &mut self.mode {
                    if edit.highlighted + 1 < edit.matches.len().min(MAX_DROPDOWN) {
                        edit.highlighted += 1;
                    }
                }
            }
            KeyCode::Enter => self.enter(store, now),
            KeyCode::Tab => self.tab(store, now),
            KeyCode::Esc => self.escape(),
            _ => {}
        }
    }

    fn handle_prompt_key(&mut self, code: KeyCode, store: &dyn DocumentStore, refs: &ReferenceRegistry) {
        let Mode::Prompt { kind, input } = &mut self.mode else {
            return;
        };
        match code {
            KeyCode::Char(c) => input.push(c),
            KeyCode::Backspace => {
                input.pop();
            }
            KeyCode::Esc => self.mode = Mode::Idle,
            KeyCode::Enter => {
                let (kind, name) = (*kind, input.clone());
                self.mode = Mode::Idle;
                let (label, result) = match kind {
                    PromptKind::Company => ("company", refs.add_company(store, &name)),
                    PromptKind::Location => ("location", refs.add_location(store, &name)),
                };
                match result {
                    Ok(stored) => self.status_message = Some(format!("Added {label} {stored}")),
                    Err(FreightError::Duplicate(existing)) => {
                        self.status_message = Some(format!("{existing} is already in the {label} list"))
                    }
                    Err(
                        e @ (FreightError::PermissionDenied(_)
                        | FreightError::Db(_)
                        | FreightError::Io(_)
                        | FreightError::Json(_)),
                    ) => self.report_error("add reference item", &e),
                    Err(e) => self.status_message = Some(format!("Could not add {label}: {e}")),
                }
            }
            _ => {}
        }
    }

    /// Left click: a dropdown candidate is picked, a cell is selected.
    pub fn handle_mouse(
        &mut self,
        event: MouseEvent,
        store: &dyn DocumentStore,
        refs: &ReferenceRegistry,
    ) {
        if event.kind != MouseEventKind::Down(MouseButton::Left) || self.notice.is_some() {
            return;
        }
        let (x, y) = (event.column, event.row);
        if let Some(dropdown) = self.hit_map.dropdown {
            if contains(dropdown, x, y) {
                self.pick_candidate((y - dropdown.y) as usize);
                return;
            }
        }
        if !matches!(self.mode, Mode::Idle | Mode::Editing(_)) || !contains(self.hit_map.body, x, y) {
            return;
        }
        let row = self.offset + (y - self.hit_map.body.y) as usize;
        let column = self
            .hit_map
            .columns
            .iter()
            .position(|(start, width)| x >= *start && x < start + width);
        if let Some(col) = column {
            self.select_cell(store, refs, row, Field::ORDER[col]);
        }
    }

    fn ensure_visible(&mut self) {
        let visible = self.visible_count.max(1);
        if self.cursor_row < self.offset {
            self.offset = self.cursor_row;
        } else if self.cursor_row >= self.offset + visible {
            self.offset = self.cursor_row + 1 - visible;
        }
    }

    // -----------------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------------

    pub fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();

        let edit_height: u16 = match &self.mode {
            Mode::Editing(edit) if edit.dropdown_open() => 1 + edit.matches.len().min(MAX_DROPDOWN) as u16,
            Mode::Editing(_) | Mode::Prompt { .. } | Mode::ConfirmDelete(_) => 1,
            Mode::Idle => 0,
        };

        let [title_area, table_area, edit_area, summary_area, status_area, keys_area] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Fill(1),
            Constraint::Length(edit_height),
            Constraint::Length(SUMMARY_HEIGHT),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(area);

        frame.render_widget(
            Paragraph::new(format!(" Freight shipments: {}   [ / ] to change month", self.month))
                .style(HEADER_STYLE),
            title_area,
        );

        self.draw_table(frame, table_area);
        self.draw_edit_panel(frame, edit_area);
        self.draw_summary(frame, summary_area);

        let end_row = (self.offset + self.visible_count).min(self.records.len());
        let mut status = format!(
            "Rows {}-{} of {}",
            if self.records.is_empty() { 0 } else { self.offset + 1 },
            end_row,
            self.records.len()
        );
        if let Some(msg) = &self.status_message {
            status.push_str(&format!(" | {msg}"));
        }
        frame.render_widget(Paragraph::new(status).style(FOOTER_STYLE), status_area);

        let hints = match &self.mode {
            Mode::Idle => "\u{2190}\u{2191}\u{2192}\u{2193}:move  Enter/e:edit  a:add row  d:delete  [/]:month  C:add company  L:add location  q:quit",
            Mode::Editing(_) => "Type to edit  \u{2191}/\u{2193}:choose  Enter:save+down  Tab:save+right  Esc:cancel",
            Mode::ConfirmDelete(_) => "y=confirm  n=cancel",
            Mode::Prompt { .. } => "Enter=add  Esc=cancel",
        };
        frame.render_widget(Paragraph::new(hints).style(FOOTER_STYLE), keys_area);

        if let Some(msg) = &self.notice {
            draw_notice(frame, area, msg);
        }
    }

    fn draw_table(&mut self, frame: &mut Frame, table_area: Rect) {
        let header_overhead = 2u16;
        let available = table_area.height.saturating_sub(header_overhead) as usize;
        self.visible_count = available.max(1);
        self.ensure_visible();

        let editing = self.editing().cloned();
        let rows: Vec<Row> = self
            .records
            .iter()
            .enumerate()
            .skip(self.offset)
            .take(self.visible_count)
            .map(|(i, record)| {
                let cells: Vec<Cell> = Field::ORDER
                    .iter()
                    .map(|&field| match &editing {
                        Some(edit) if edit.row == i && edit.field == field => Cell::from(Span::styled(
                            format!("{}\u{2588}", edit.buffer),
                            Style::default().fg(Color::Cyan),
                        )),
                        _ => {
                            let cell = if field == Field::ShippingCharge {
                                Cell::from(money_span(record.shipping_charge))
                            } else {
                                Cell::from(record.get(field))
                            };
                            if editing.is_none() && i == self.cursor_row && field == self.cursor_field {
                                cell.style(Style::default().add_modifier(Modifier::REVERSED))
                            } else {
                                cell
                            }
                        }
                    })
                    .collect();
                Row::new(cells)
            })
            .collect();

        let widths: Vec<Constraint> = COLUMN_WIDTHS.iter().map(|w| Constraint::Length(*w)).collect();
        let header: Vec<&str> = Field::ORDER.iter().map(|f| f.label()).collect();

        if self.records.is_empty() {
            frame.render_widget(
                Paragraph::new("  No shipments this month. Press 'a' to add one."),
                table_area,
            );
        } else {
            self.table_state
                .select(Some(self.cursor_row.saturating_sub(self.offset)));
            let table = Table::new(rows, widths)
                .header(Row::new(header).style(HEADER_STYLE).bottom_margin(1))
                .column_spacing(1)
                .row_highlight_style(SELECTED_STYLE);
            frame.render_stateful_widget(table, table_area, &mut self.table_state);
        }

        let mut x = table_area.x;
        self.hit_map.columns = COLUMN_WIDTHS
            .iter()
            .map(|w| {
                let col = (x, *w);
                x += w + 1;
                col
            })
            .collect();
        let visible_rows = self.records.len().saturating_sub(self.offset).min(self.visible_count) as u16;
        self.hit_map.body = Rect {
            x: table_area.x,
            y: table_area.y + header_overhead,
            width: table_area.width,
            height: visible_rows.min(table_area.height.saturating_sub(header_overhead)),
        };
    }

    fn draw_edit_panel(&mut self, frame: &mut Frame, edit_area: Rect) {
        self.hit_map.dropdown = None;
        let lines: Vec<Line> = match &self.mode {
            Mode::Editing(edit) => {
                let mut lines = vec![Line::from(format!(
                    "  {} (row {}): {}\u{2588}",
                    edit.field.label(),
                    edit.row + 1,
                    edit.buffer
                ))];
                if edit.dropdown_open() {
                    for (i, candidate) in edit.matches.iter().take(MAX_DROPDOWN).enumerate() {
                        let marker = if i == edit.highlighted { ">" } else { " " };
                        lines.push(Line::from(format!("  {marker} {candidate}")));
                    }
                    self.hit_map.dropdown = Some(Rect {
                        x: edit_area.x,
                        y: edit_area.y + 1,
                        width: edit_area.width,
                        height: edit_area.height.saturating_sub(1),
                    });
                }
                lines
            }
            Mode::ConfirmDelete(row) => vec![Line::from(Span::styled(
                format!("  Delete row {}? (y/n)", row + 1),
                Style::default().fg(Color::Yellow),
            ))],
            Mode::Prompt { kind, input } => {
                let label = match kind {
                    PromptKind::Company => "New company",
                    PromptKind::Location => "New location",
                };
                vec![Line::from(format!("  {label}: {input}\u{2588}"))]
            }
            Mode::Idle => vec![],
        };
        frame.render_widget(Paragraph::new(lines), edit_area);
    }

    fn draw_summary(&self, frame: &mut Frame, summary_area: Rect) {
        let summary = summarize(&self.records);
        let [stats_area, chart_area] =
            Layout::horizontal([Constraint::Length(34), Constraint::Fill(1)]).areas(summary_area);

        let stats = vec![
            Line::from(Span::styled(" Summary", Style::default().add_modifier(Modifier::BOLD))),
            Line::from(vec![Span::raw(" Total charges   "), money_span(summary.total)]),
            Line::from(format!(" Shipments       {}", summary.record_count)),
            Line::from(format!(" Companies       {}", summary.company_count)),
            Line::from(vec![Span::raw(" Average         "), money_span(summary.average)]),
        ];
        frame.render_widget(Paragraph::new(stats), stats_area);

        let bars: Vec<Bar> = summary
            .companies
            .iter()
            .take(SUMMARY_HEIGHT as usize - 2)
            .map(|c| {
                Bar::default()
                    .value(c.total.round() as u64)
                    .label(Line::from(c.company.clone()))
                    .text_value(format!("{} ({:.0}%)", money(c.total), c.pct))
            })
            .collect();
        let chart = BarChart::default()
            .block(Block::default().borders(Borders::LEFT).title(" By company"))
            .direction(Direction::Horizontal)
            .bar_width(1)
            .bar_gap(0)
            .bar_style(Style::default().fg(Color::Rgb(80, 220, 100)))
            .data(BarGroup::default().bars(&bars));
        frame.render_widget(chart, chart_area);
    }
}

fn contains(rect: Rect, x: u16, y: u16) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn draw_notice(frame: &mut Frame, area: Rect, msg: &str) {
    let width = (msg.chars().count() as u16 + 6).min(area.width);
    let popup = Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height / 2,
        width,
        height: 4.min(area.height),
    };
    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(vec![
            Line::from(Span::styled(format!(" {msg}"), Style::default().fg(Color::Red))),
            Line::from(Span::styled(" Press any key", FOOTER_STYLE)),
        ])
        .block(Block::default().borders(Borders::ALL)),
        popup,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MONTHS;
    use crate::months::{load_month, save_month};
    use crate::store::test_support::MemoryStore;

    fn setup() -> (MemoryStore, ReferenceRegistry) {
        let store = MemoryStore::new();
        let refs = ReferenceRegistry::shared(&store).unwrap();
        (store, refs)
    }

    fn rows(n: usize) -> Vec<Shipment> {
        (0..n)
            .map(|i| {
                let mut s = Shipment::empty();
                s.ref_num = format!("R-{}", i + 1);
                s.company = "ATLAS FREIGHT".into();
                s.shipping_charge = 10.0 * (i + 1) as f64;
                s
            })
            .collect()
    }

    fn grid_with(store: &MemoryStore, refs: &ReferenceRegistry, n: usize) -> ShipmentGrid {
        save_month(store, "March", rows(n)).unwrap();
        ShipmentGrid::open(store, refs, "March", GridTiming::default())
    }

    fn stored(store: &MemoryStore, month: &str) -> Vec<Shipment> {
        load_month(store, month).unwrap().unwrap().shipments
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_open_bootstraps_missing_month() {
        let (store, refs) = setup();
        let grid = ShipmentGrid::open(&store, &refs, "August", GridTiming::default());
        assert_eq!(grid.records().len(), 1);
        assert_eq!(grid.records()[0].shipping_charge, 0.0);
        assert_eq!(store.listener_count(), 2); // registry + grid
    }

    #[test]
    fn test_select_seeds_buffer_and_full_dropdown() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 2);
        grid.select_cell(&store, &refs, 1, Field::Company);
        let edit = grid.editing().unwrap();
        assert_eq!(edit.buffer, "ATLAS FREIGHT");
        assert_eq!(edit.matches, refs.companies().to_vec());
        assert!(edit.dropdown_open());

        grid.select_cell(&store, &refs, 1, Field::RefNum);
        let edit = grid.editing().unwrap();
        assert_eq!(edit.buffer, "R-2");
        assert!(!edit.dropdown_open());
    }

    #[test]
    fn test_buffer_change_filters_candidates() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 1);
        grid.select_cell(&store, &refs, 0, Field::Company);
        grid.set_buffer(&refs, "ri");
        let edit = grid.editing().unwrap();
        assert_eq!(edit.matches, vec!["BLUE RIVER CARGO".to_string()]);
        assert!(edit.dropdown_open());

        grid.set_buffer(&refs, "zzz");
        assert!(!grid.editing().unwrap().dropdown_open());
    }

    #[test]
    fn test_escape_discards_without_writing() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 3);
        let writes = store.writes.get();
        grid.select_cell(&store, &refs, 0, Field::Po);
        grid.set_buffer(&refs, "PO-99");
        grid.escape();
        assert!(grid.editing().is_none());
        assert_eq!(store.writes.get(), writes);
        assert_eq!(stored(&store, "March")[0].po, "");
    }

    #[test]
    fn test_commit_writes_whole_list_and_echo_updates_grid() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 3);
        let now = Instant::now();
        grid.select_cell(&store, &refs, 1, Field::Po);
        grid.set_buffer(&refs, "PO-7");
        grid.tab(&store, now);

        let saved = stored(&store, "March");
        assert_eq!(saved.len(), 3);
        assert_eq!(saved[1].po, "PO-7");
        assert_eq!(saved[0].ref_num, "R-1");

        grid.tick(&store, &refs, now);
        assert_eq!(grid.records()[1].po, "PO-7");
    }

    #[test]
    fn test_non_numeric_charge_commits_zero() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 1);
        grid.select_cell(&store, &refs, 0, Field::ShippingCharge);
        assert_eq!(grid.editing().unwrap().buffer, "10");
        grid.set_buffer(&refs, "twelve dollars");
        grid.commit(&store);
        assert_eq!(stored(&store, "March")[0].shipping_charge, 0.0);
    }

    #[test]
    fn test_enter_accepts_top_candidate_and_moves_down() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 2);
        let now = Instant::now();
        grid.select_cell(&store, &refs, 0, Field::ShipMethod);
        grid.set_buffer(&refs, "a");
        // "Air" and "Ocean" match; "Air" is on top.
        grid.enter(&store, now);
        assert_eq!(stored(&store, "March")[0].ship_method, "Air");
        assert!(grid.editing().is_none());

        grid.tick(&store, &refs, now + ms(50));
        assert!(grid.editing().is_none());
        grid.tick(&store, &refs, now + ms(100));
        let edit = grid.editing().unwrap();
        assert_eq!((edit.row, edit.field), (1, Field::ShipMethod));
    }

    #[test]
    fn test_highlighted_candidate_is_accepted() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 1);
        let now = Instant::now();
        grid.select_cell(&store, &refs, 0, Field::ShipMethod);
        grid.set_buffer(&refs, "a");
        grid.handle_key(KeyCode::Down, &store, &refs, now);
        grid.handle_key(KeyCode::Enter, &store, &refs, now);
        assert_eq!(stored(&store, "March")[0].ship_method, "Ocean");
    }

    #[test]
    fn test_enter_on_last_row_stays_put() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 2);
        let now = Instant::now();
        grid.select_cell(&store, &refs, 1, Field::RefNum);
        grid.enter(&store, now);
        assert!(!grid.has_pending());
    }

    #[test]
    fn test_tab_opens_next_field_but_not_past_last() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 1);
        let now = Instant::now();
        grid.select_cell(&store, &refs, 0, Field::ShipMethod);
        grid.handle_key(KeyCode::Tab, &store, &refs, now);
        grid.tick(&store, &refs, now + ms(100));
        assert_eq!(grid.editing().unwrap().field, Field::ShippingCharge);

        grid.select_cell(&store, &refs, 0, Field::Agent);
        grid.tab(&store, now);
        assert!(!grid.has_pending());
        assert!(grid.editing().is_none());
    }

    #[test]
    fn test_blur_commit_is_delayed() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 1);
        let now = Instant::now();
        grid.select_cell(&store, &refs, 0, Field::RefNum);
        grid.set_buffer(&refs, "LATE");
        grid.blur(now);
        grid.tick(&store, &refs, now + ms(150));
        assert_eq!(stored(&store, "March")[0].ref_num, "R-1");
        grid.tick(&store, &refs, now + ms(200));
        assert_eq!(stored(&store, "March")[0].ref_num, "LATE");
    }

    #[test]
    fn test_pick_during_blur_delay_wins() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 1);
        let now = Instant::now();
        grid.select_cell(&store, &refs, 0, Field::Company);
        grid.set_buffer(&refs, "pac");
        grid.blur(now);
        grid.pick_candidate(0);
        grid.tick(&store, &refs, now + ms(250));
        assert_eq!(stored(&store, "March")[0].company, "PACIFIC LINES");
    }

    #[test]
    fn test_blur_after_escape_writes_nothing() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 1);
        let writes = store.writes.get();
        let now = Instant::now();
        grid.select_cell(&store, &refs, 0, Field::RefNum);
        grid.blur(now);
        grid.escape();
        grid.tick(&store, &refs, now + ms(500));
        assert_eq!(store.writes.get(), writes);
    }

    #[test]
    fn test_add_row_appends_default_and_opens_reference() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 2);
        let now = Instant::now();
        grid.add_row(&store, &refs, now);
        let saved = stored(&store, "March");
        assert_eq!(saved.len(), 3);
        assert_eq!(saved[2].company, refs.companies()[0]);
        assert_eq!(saved[2].shipping_charge, 0.0);

        grid.tick(&store, &refs, now + ms(100));
        let edit = grid.editing().unwrap();
        assert_eq!((edit.row, edit.field), (2, Field::RefNum));
    }

    #[test]
    fn test_delete_requires_confirmation() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 4);
        let now = Instant::now();
        let writes = store.writes.get();

        grid.request_delete(1);
        grid.handle_key(KeyCode::Char('n'), &store, &refs, now);
        assert_eq!(store.writes.get(), writes);

        grid.request_delete(1);
        grid.handle_key(KeyCode::Char('y'), &store, &refs, now);
        let refs_left: Vec<String> = stored(&store, "March").into_iter().map(|s| s.ref_num).collect();
        assert_eq!(refs_left, vec!["R-1", "R-3", "R-4"]);
    }

    #[test]
    fn test_deleting_only_row_leaves_default_record() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 1);
        let old_id = grid.records()[0].id.clone();
        grid.request_delete(0);
        grid.handle_key(KeyCode::Char('y'), &store, &refs, Instant::now());

        let saved = stored(&store, "March");
        assert_eq!(saved.len(), 1);
        assert_ne!(saved[0].id, old_id);
        assert_eq!(saved[0].ref_num, "");
        assert_eq!(saved[0].company, refs.companies()[0]);
    }

    #[test]
    fn test_add_row_keeps_edit_committed_just_before() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 1);
        grid.select_cell(&store, &refs, 0, Field::Po);
        grid.set_buffer(&refs, "PO-KEPT");
        grid.add_row(&store, &refs, Instant::now());

        let saved = stored(&store, "March");
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].po, "PO-KEPT");
    }

    #[test]
    fn test_month_switch_drops_pending_blur_commit() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 1);
        let now = Instant::now();
        grid.select_cell(&store, &refs, 0, Field::RefNum);
        grid.set_buffer(&refs, "MARCH-ONLY");
        grid.blur(now);
        grid.switch_month(&store, &refs, "April");
        assert!(!grid.has_pending());
        assert_eq!(stored(&store, "March")[0].ref_num, "MARCH-ONLY");

        grid.tick(&store, &refs, now + ms(500));
        assert_eq!(stored(&store, "April")[0].ref_num, "");
    }

    #[test]
    fn test_read_only_store_shows_permission_hint() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 1);
        store.deny_writes.set(true);
        grid.select_cell(&store, &refs, 0, Field::RefNum);
        grid.set_buffer(&refs, "R-9");
        grid.commit(&store);
        assert_eq!(grid.notice(), Some(PERMISSION_HINT));
    }

    #[test]
    fn test_read_only_store_rejects_company_with_permission_hint() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 1);
        let now = Instant::now();
        store.deny_writes.set(true);
        grid.handle_key(KeyCode::Char('C'), &store, &refs, now);
        grid.handle_key(KeyCode::Char('x'), &store, &refs, now);
        grid.handle_key(KeyCode::Enter, &store, &refs, now);
        assert_eq!(grid.notice(), Some(PERMISSION_HINT));
        assert!(!refs.companies().contains(&"X".to_string()));
    }

    #[test]
    fn test_unreachable_store_on_company_add_shows_save_notice() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 1);
        let now = Instant::now();
        store.fail_writes.set(true);
        grid.handle_key(KeyCode::Char('L'), &store, &refs, now);
        grid.handle_key(KeyCode::Char('y'), &store, &refs, now);
        grid.handle_key(KeyCode::Enter, &store, &refs, now);
        assert_eq!(grid.notice(), Some(SAVE_FAILED));
    }

    #[test]
    fn test_blank_company_name_stays_on_status_line() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 1);
        let now = Instant::now();
        grid.handle_key(KeyCode::Char('C'), &store, &refs, now);
        grid.handle_key(KeyCode::Enter, &store, &refs, now);
        assert!(grid.notice().is_none());
        assert!(grid.status().unwrap().starts_with("Could not add company"));
    }

    #[test]
    fn test_write_failure_raises_notice_and_keeps_records() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 2);
        let now = Instant::now();
        store.fail_writes.set(true);
        grid.select_cell(&store, &refs, 0, Field::RefNum);
        grid.set_buffer(&refs, "NOPE");
        grid.enter(&store, now);
        assert_eq!(grid.notice(), Some(SAVE_FAILED));
        grid.tick(&store, &refs, now);
        assert_eq!(grid.records()[0].ref_num, "R-1");

        // Any key dismisses the notice.
        grid.handle_key(KeyCode::Char('x'), &store, &refs, now);
        assert!(grid.notice().is_none());
    }

    #[test]
    fn test_remote_snapshot_replaces_records() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 2);
        save_month(&store, "March", rows(5)).unwrap();
        assert_eq!(grid.records().len(), 2);
        grid.tick(&store, &refs, Instant::now());
        assert_eq!(grid.records().len(), 5);
    }

    #[test]
    fn test_switch_month_moves_subscription() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 3);
        grid.handle_key(KeyCode::Char(']'), &store, &refs, Instant::now());
        assert_eq!(grid.month(), "April");
        assert_eq!(grid.records().len(), 1);
        assert_eq!(store.listener_count(), 2);

        // Writes to the old month no longer reach the grid.
        save_month(&store, "March", rows(7)).unwrap();
        grid.tick(&store, &refs, Instant::now());
        assert_eq!(grid.records().len(), 1);
    }

    #[test]
    fn test_stale_snapshot_for_other_month_is_ignored() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 3);
        grid.snapshot_tx
            .send(("May", Some(serde_json::to_value(MonthDocument::new("May", rows(9))).unwrap())))
            .unwrap();
        grid.tick(&store, &refs, Instant::now());
        assert_eq!(grid.records().len(), 3);
    }

    #[test]
    fn test_switch_month_commits_open_edit() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 1);
        grid.select_cell(&store, &refs, 0, Field::Po);
        grid.set_buffer(&refs, "PO-1");
        grid.switch_month(&store, &refs, MONTHS[11]);
        assert_eq!(stored(&store, "March")[0].po, "PO-1");
        assert_eq!(grid.month(), "December");
    }

    #[test]
    fn test_flush_runs_pending_blur_commit() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 1);
        grid.select_cell(&store, &refs, 0, Field::RefNum);
        grid.set_buffer(&refs, "EXIT");
        grid.blur(Instant::now());
        grid.flush(&store);
        assert_eq!(stored(&store, "March")[0].ref_num, "EXIT");
    }

    #[test]
    fn test_prompt_adds_company_and_reports_duplicate() {
        let (store, mut refs) = setup();
        let mut grid = grid_with(&store, &refs, 1);
        let now = Instant::now();
        grid.handle_key(KeyCode::Char('C'), &store, &refs, now);
        for c in "zeta".chars() {
            grid.handle_key(KeyCode::Char(c), &store, &refs, now);
        }
        grid.handle_key(KeyCode::Enter, &store, &refs, now);
        assert_eq!(grid.status(), Some("Added company ZETA"));
        refs.sync();
        assert!(refs.companies().contains(&"ZETA".to_string()));

        grid.handle_key(KeyCode::Char('C'), &store, &refs, now);
        for c in "Zeta".chars() {
            grid.handle_key(KeyCode::Char(c), &store, &refs, now);
        }
        grid.handle_key(KeyCode::Enter, &store, &refs, now);
        assert!(grid.status().unwrap().contains("already"));
    }

    #[test]
    fn test_idle_quit_and_navigation() {
        let (store, refs) = setup();
        let mut grid = grid_with(&store, &refs, 3);
        let now = Instant::now();
        grid.handle_key(KeyCode::Down, &store, &refs, now);
        grid.handle_key(KeyCode::Right, &store, &refs, now);
        grid.handle_key(KeyCode::Enter, &store, &refs, now);
        let edit = grid.editing().unwrap();
        assert_eq!((edit.row, edit.field), (1, Field::ShipDate));
        grid.handle_key(KeyCode::Esc, &store, &refs, now);
        assert!(matches!(grid.handle_key(KeyCode::Char('q'), &store, &refs, now), GridAction::Close));
    }
}
