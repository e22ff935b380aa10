//! Tracks the selected view and the customize session that edits it.
//!
//! ```text
//! Default | Named(x) --open_customize--> Customizing
//! Customizing --commit(name)--> Named(name)
//! Customizing --commit("")----> previous selection
//! Customizing --cancel--------> previous selection
//! any --select_view(n)--------> Named(n) if n is saved, else Default
//! ```

use tracing::{debug, info, trace};

use crate::columns::{ColumnDefinition, Registry};
use crate::domain::DEFAULT_VIEW_NAME;
use crate::views::ViewStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Default,
    Named(String),
}

impl Selection {
    pub fn name(&self) -> &str {
        match self {
            Selection::Default => DEFAULT_VIEW_NAME,
            Selection::Named(name) => name,
        }
    }

    fn into_state(self) -> ViewState {
        match self {
            Selection::Default => ViewState::Default,
            Selection::Named(name) => ViewState::Named(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingEntry {
    pub id: String,
    pub visible: bool,
}

/// Uncommitted column order and visibility of a customize session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingCopy {
    entries: Vec<WorkingEntry>,
}

impl WorkingCopy {
    /// Visible columns first in view order, then the remaining registry
    /// columns hidden in declaration order.
    fn snapshot(columns: &[&ColumnDefinition], registry: &Registry<'_>) -> Self {
        let mut entries: Vec<WorkingEntry> = columns
            .iter()
            .map(|c| WorkingEntry {
                id: c.id.to_string(),
                visible: true,
            })
            .collect();
        for column in registry.list_columns() {
            if !entries.iter().any(|e| e.id == column.id) {
                entries.push(WorkingEntry {
                    id: column.id.to_string(),
                    visible: false,
                });
            }
        }
        WorkingCopy { entries }
    }

    pub fn entries(&self) -> &[WorkingEntry] {
        &self.entries
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    pub fn toggle(&mut self, id: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.visible = !entry.visible;
                true
            }
            None => false,
        }
    }

    /// Remove at `from`, insert at `to`. Entries in between shift by one.
    pub fn move_entry(&mut self, from: usize, to: usize) -> bool {
        if from == to || from >= self.entries.len() || to >= self.entries.len() {
            return false;
        }
        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);
        true
    }

    pub fn visible_ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.visible)
            .map(|e| e.id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    Default,
    Named(String),
    Customizing {
        previous: Selection,
        working: WorkingCopy,
    },
}

/// Outcome of best-effort resolution against the registry.
#[derive(Debug)]
pub struct Resolution<'r> {
    pub columns: Vec<&'r ColumnDefinition>,
    /// Saved ids without a registry entry, in saved order.
    pub dropped: Vec<String>,
}

/// Maps saved ids to registry entries, dropping unknown ids. Never fails.
pub fn resolve<'r>(ids: &[String], registry: &Registry<'r>) -> Resolution<'r> {
    let mut columns = Vec::with_capacity(ids.len());
    let mut dropped = Vec::new();
    for id in ids {
        match registry.get(id) {
            Some(column) => columns.push(column),
            None => dropped.push(id.clone()),
        }
    }
    Resolution { columns, dropped }
}

pub struct ViewController<'r> {
    registry: Registry<'r>,
    store: ViewStore<'r>,
    state: ViewState,
    columns: Vec<&'r ColumnDefinition>,
}

impl<'r> ViewController<'r> {
    pub fn new(registry: Registry<'r>, store: ViewStore<'r>) -> Self {
        let mut controller = ViewController {
            registry,
            store,
            state: ViewState::Default,
            columns: Vec::new(),
        };
        controller.refresh_columns();
        controller
    }

    #[cfg(test)]
    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn store(&self) -> &ViewStore<'r> {
        &self.store
    }

    pub fn registry(&self) -> &Registry<'r> {
        &self.registry
    }

    /// The committed selection, also while customizing.
    pub fn selection(&self) -> Selection {
        match &self.state {
            ViewState::Default => Selection::Default,
            ViewState::Named(name) => Selection::Named(name.clone()),
            ViewState::Customizing { previous, .. } => previous.clone(),
        }
    }

    pub fn is_customizing(&self) -> bool {
        matches!(self.state, ViewState::Customizing { .. })
    }

    pub fn working_copy(&self) -> Option<&WorkingCopy> {
        match &self.state {
            ViewState::Customizing { working, .. } => Some(working),
            _ => None,
        }
    }

    /// Resolved columns of the committed selection.
    pub fn columns(&self) -> &[&'r ColumnDefinition] {
        &self.columns
    }

    /// Columns to draw: the working copy while customizing, else the
    /// committed selection.
    pub fn display_columns(&self) -> Vec<&'r ColumnDefinition> {
        match &self.state {
            ViewState::Customizing { working, .. } => {
                resolve(&working.visible_ids(), &self.registry).columns
            }
            _ => self.columns().to_vec(),
        }
    }

    pub fn select_view(&mut self, name: &str) {
        self.state = if name != DEFAULT_VIEW_NAME && self.store.contains(name) {
            ViewState::Named(name.to_string())
        } else {
            ViewState::Default
        };
        info!("Selected view {}", self.selection().name());
        self.refresh_columns();
    }

    pub fn open_customize(&mut self) -> bool {
        if self.is_customizing() {
            return false;
        }
        let working = WorkingCopy::snapshot(&self.columns, &self.registry);
        self.state = ViewState::Customizing {
            previous: self.selection(),
            working,
        };
        trace!("Customizing {}", self.selection().name());
        true
    }

    pub fn toggle_column_visibility(&mut self, id: &str) -> bool {
        match &mut self.state {
            ViewState::Customizing { working, .. } => working.toggle(id),
            _ => false,
        }
    }

    pub fn reorder_columns(&mut self, from: usize, to: usize) -> bool {
        match &mut self.state {
            ViewState::Customizing { working, .. } => working.move_entry(from, to),
            _ => false,
        }
    }

    /// Saves the working copy under `name`, or over the active view when
    /// `name` is blank, then selects the saved view.
    pub fn commit(&mut self, name: &str) -> bool {
        let (previous, working) = match std::mem::replace(&mut self.state, ViewState::Default) {
            ViewState::Customizing { previous, working } => (previous, working),
            other => {
                self.state = other;
                return false;
            }
        };

        let name = name.trim();
        let target = if name.is_empty() {
            previous
        } else if name == DEFAULT_VIEW_NAME {
            Selection::Default
        } else {
            Selection::Named(name.to_string())
        };

        let ids = working.visible_ids();
        info!("Saving view {} with {} columns", target.name(), ids.len());
        let views = self.store.upsert(target.name(), ids);
        self.store.save(views);

        self.state = target.into_state();
        self.refresh_columns();
        true
    }

    pub fn cancel(&mut self) -> bool {
        match std::mem::replace(&mut self.state, ViewState::Default) {
            ViewState::Customizing { previous, .. } => {
                self.state = previous.into_state();
                true
            }
            other => {
                self.state = other;
                false
            }
        }
    }

    fn refresh_columns(&mut self) {
        let selection = self.selection();
        let resolution = match self.store.get(selection.name()) {
            Some(ids) => resolve(ids, &self.registry),
            None => resolve(&self.registry.ids(), &self.registry),
        };
        if !resolution.dropped.is_empty() {
            debug!(
                "View {} dropped unavailable columns {:?}",
                selection.name(),
                resolution.dropped
            );
        }
        self.columns = resolution.columns;
    }
}
