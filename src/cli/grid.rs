use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use tracing::{info, warn};

use crate::db::{SqliteStore, DB_FILE};
use crate::error::Result;
use crate::export::EXPORTS_DIR;
use crate::grid::{GridAction, ShipmentGrid};
use crate::months::ensure_all_months;
use crate::reference::ReferenceRegistry;
use crate::settings::load_settings;
use crate::store::DocumentStore;
use crate::tui::{init_terminal, restore_terminal};

/// How long to wait for input before polling the store again.
const TICK: Duration = Duration::from_millis(50);

pub fn run(month: Option<String>) -> Result<()> {
    let month = super::resolve_month(month.as_deref())?;

    // Ensure data dir and database exist (like `freightlog init`)
    let settings = load_settings();
    let data_dir = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(data_dir.join(EXPORTS_DIR))?;
    let store = SqliteStore::open(&data_dir.join(DB_FILE))?;

    let mut refs = ReferenceRegistry::open(&store, settings.shared_reference_data)?;
    if let Err(e) = ensure_all_months(&store, refs.lists()) {
        warn!(error = %e, "could not bootstrap month documents");
    }

    let mut grid = ShipmentGrid::open(&store, &refs, month, settings.timing());
    info!(month, shared = refs.is_shared(), "grid session started");

    let mut terminal = init_terminal()?;

    let result: Result<()> = loop {
        if let Err(e) = store.poll_changes() {
            warn!(error = %e, "polling for remote changes failed");
        }
        refs.sync();
        grid.tick(&store, &refs, Instant::now());

        if let Err(e) = terminal.draw(|frame| grid.draw(frame)) {
            break Err(e.into());
        }

        match event::poll(TICK) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => break Err(e.into()),
        }

        match event::read() {
            Err(e) => break Err(e.into()),
            Ok(Event::Key(key)) => {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                    break Ok(());
                }
                match grid.handle_key(key.code, &store, &refs, Instant::now()) {
                    GridAction::Close => break Ok(()),
                    GridAction::Continue => {}
                }
            }
            Ok(Event::Mouse(mouse)) => grid.handle_mouse(mouse, &store, &refs),
            Ok(Event::FocusLost) => grid.blur(Instant::now()),
            _ => {}
        }
    };

    grid.flush(&store);
    restore_terminal(terminal);
    info!(month = grid.month(), "grid session ended");
    result
}
