use std::io::Write;
use std::time::Duration;

use ratatui::crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use ratatui::crossterm::execute;
use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, Tabs},
};
use tracing::warn;

use crate::columns::Trend;
use crate::domain::{CUSTOMIZE_HELP_TEXT, HELP_TEXT};
use crate::model::{DataState, Modus, Model};
use crate::source::{Clock, FetchError};

pub const TABS_HEIGHT: usize = 1;
pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const STATUSLINE_HEIGHT: usize = 1;
pub const COLUMN_SPACING: u16 = 1;
/// Screen row of the table header, the only row that starts a header drag.
pub const TABLE_HEADER_ROW: u16 = TABS_HEIGHT as u16;

const CUSTOMIZE_WIDTH: u16 = 44;
const STATUS_MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Mouse reporting for as long as the value lives. `ratatui::restore` leaves
/// it switched on.
pub struct MouseCapture<W: Write> {
    out: W,
}

impl<W: Write> MouseCapture<W> {
    pub fn enable(mut out: W) -> std::io::Result<Self> {
        execute!(out, EnableMouseCapture)?;
        Ok(MouseCapture { out })
    }
}

impl<W: Write> Drop for MouseCapture<W> {
    fn drop(&mut self) {
        if let Err(e) = execute!(self.out, DisableMouseCapture) {
            warn!("Failed to disable mouse capture: {e}");
        }
    }
}

#[derive(Debug, Default)]
pub struct TableUI {}

impl TableUI {
    pub fn new() -> Self {
        Self {}
    }

    pub fn draw<C: Clock>(&mut self, model: &Model<C>, frame: &mut Frame) {
        let [tabs_area, table_area, status_area] = Layout::vertical([
            Constraint::Length(TABS_HEIGHT as u16),
            Constraint::Min(0),
            Constraint::Length(STATUSLINE_HEIGHT as u16),
        ])
        .areas(frame.area());

        self.draw_tabs(model, frame, tabs_area);
        self.draw_table(model, frame, table_area);
        self.draw_statusline(model, frame, status_area);

        if matches!(model.modus(), Modus::CUSTOMIZE | Modus::NAMEINPUT) {
            self.draw_customize(model, frame, table_area);
        }
    }

    fn draw_tabs<C: Clock>(&self, model: &Model<C>, frame: &mut Frame, area: Rect) {
        let names = model.view_names();
        let active = model.active_view();
        let selected = names.iter().position(|n| *n == active).unwrap_or(0);
        let tabs = Tabs::new(names.iter().map(|n| n.to_string()))
            .select(selected)
            .style(Style::default().fg(Color::Gray))
            .highlight_style(Style::default().fg(Color::Yellow).bold());
        frame.render_widget(tabs, area);
    }

    fn header_row<C: Clock>(&self, model: &Model<C>) -> Row<'static> {
        let customizing = model.modus() != Modus::TABLE;
        let cells = model
            .grid()
            .headers
            .iter()
            .enumerate()
            .map(|(cidx, header)| {
                let mut style = if header.sortable {
                    Style::default().bold()
                } else {
                    Style::default()
                };
                if header.sort.is_some() {
                    style = style.fg(Color::Yellow);
                }
                if cidx == model.selected_column() {
                    style = style.add_modifier(Modifier::UNDERLINED);
                }
                if customizing {
                    style = style.fg(Color::Cyan);
                }
                Cell::from(header.label.clone()).style(style)
            })
            .collect::<Vec<Cell>>();
        Row::new(cells)
    }

    fn draw_table<C: Clock>(&self, model: &Model<C>, frame: &mut Frame, area: Rect) {
        let grid = model.grid();
        let widths = grid
            .widths
            .iter()
            .map(|&w| Constraint::Length(w))
            .collect::<Vec<Constraint>>();

        let [_, body_area] =
            Layout::vertical([Constraint::Length(TABLE_HEADER_HEIGHT as u16), Constraint::Min(0)])
                .areas(area);

        let body_message = match model.data_state() {
            DataState::LOADING => Some(Line::from("Loading market data ...".italic())),
            DataState::FAILED(FetchError::RateLimited(_)) => Some(Line::from(vec![
                " ⚠ ".red().bold(),
                "Too many requests to the data provider. Data will refresh automatically, or press "
                    .red(),
                "r".blue().bold(),
                " later.".red(),
            ])),
            DataState::FAILED(FetchError::Generic(msg)) => Some(Line::from(vec![
                " ⚠ ".red().bold(),
                msg.clone().red(),
            ])),
            DataState::READY if grid.headers.is_empty() => Some(Line::from(
                "No columns in this view, press c to customize it.".italic(),
            )),
            DataState::READY => None,
        };

        let rows: Vec<Row> = if body_message.is_some() {
            Vec::new()
        } else {
            let height = body_area.height as usize;
            grid.rows
                .iter()
                .enumerate()
                .skip(model.offset_row())
                .take(height)
                .map(|(ridx, cells)| {
                    let selected_row = ridx == model.selected_row();
                    let cells = cells.iter().enumerate().map(|(cidx, cell)| {
                        let mut style = match cell.trend {
                            Trend::Up => Style::default().fg(Color::Green),
                            Trend::Down => Style::default().fg(Color::Red),
                            Trend::Neutral => Style::default(),
                        };
                        if selected_row && cidx == model.selected_column() {
                            style = style.add_modifier(Modifier::REVERSED);
                        }
                        Cell::from(cell.text.clone()).style(style)
                    });
                    let row = Row::new(cells);
                    if selected_row {
                        row.style(Style::default().bg(Color::DarkGray))
                    } else {
                        row
                    }
                })
                .collect()
        };

        let table = Table::new(rows, widths)
            .header(self.header_row(model))
            .column_spacing(COLUMN_SPACING)
            .flex(Flex::Start);
        frame.render_widget(table, area);

        if let Some(message) = body_message {
            frame.render_widget(Paragraph::new(message), body_area);
        }
    }

    fn draw_statusline<C: Clock>(&self, model: &Model<C>, frame: &mut Frame, area: Rect) {
        let left = if model.status_message_age() < STATUS_MESSAGE_TIMEOUT {
            model.status_message().to_string()
        } else if model.modus() == Modus::TABLE {
            HELP_TEXT.to_string()
        } else {
            CUSTOMIZE_HELP_TEXT.to_string()
        };
        let right = format!(" {} coins | {} ", model.rows_loaded(), model.active_view());

        let [left_area, right_area] = Layout::horizontal([
            Constraint::Min(0),
            Constraint::Length(right.chars().count() as u16),
        ])
        .areas(area);
        frame.render_widget(
            Paragraph::new(left).style(Style::default().fg(Color::Gray)),
            left_area,
        );
        frame.render_widget(
            Paragraph::new(right).style(Style::default().fg(Color::Black).bg(Color::Gray)),
            right_area,
        );
    }

    fn draw_customize<C: Clock>(&self, model: &Model<C>, frame: &mut Frame, table_area: Rect) {
        let Some(working) = model.working_copy() else {
            return;
        };

        // Leave the table header uncovered so columns can still be dragged.
        let height = (working.entries().len() as u16 + 5).min(table_area.height.saturating_sub(1));
        let width = CUSTOMIZE_WIDTH.min(table_area.width);
        let area = Rect {
            x: table_area.right().saturating_sub(width),
            y: table_area.y + TABLE_HEADER_HEIGHT as u16,
            width,
            height,
        };
        frame.render_widget(Clear, area);

        let block = Block::bordered()
            .title(Line::from(" Customize View ".bold()).centered())
            .title_bottom(Line::from(" Enter save | Esc cancel ").centered());
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let [list_area, name_area] =
            Layout::vertical([Constraint::Min(0), Constraint::Length(2)]).areas(inner);

        let items = working
            .entries()
            .iter()
            .map(|entry| {
                let mark = if entry.visible { "[x]" } else { "[ ]" };
                ListItem::new(format!("{mark} {}", model.column_header(&entry.id)))
            })
            .collect::<Vec<ListItem>>();
        let list_focus = model.modus() == Modus::CUSTOMIZE;
        let list = List::new(items).highlight_style(if list_focus {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default().add_modifier(Modifier::BOLD)
        });
        let mut state = ListState::default().with_selected(Some(model.customize_curser()));
        frame.render_stateful_widget(list, list_area, &mut state);

        let input = model.name_input().get();
        let prompt = "Name: ";
        let placeholder = input.input.is_empty() && model.modus() != Modus::NAMEINPUT;
        let name_line = if placeholder {
            Line::from(vec![
                prompt.into(),
                "(empty saves the current view)".dark_gray().italic(),
            ])
        } else {
            Line::from(vec![prompt.into(), Span::raw(input.input.clone()).yellow()])
        };
        frame.render_widget(
            Paragraph::new(vec![Line::from(""), name_line]),
            name_area,
        );

        if model.modus() == Modus::NAMEINPUT {
            frame.set_cursor_position(Position::new(
                name_area.x + (prompt.len() + input.cursor_pos) as u16,
                name_area.y + 1,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_with_capture(out: &mut Vec<u8>, fail: bool) -> Result<(), String> {
        let _mouse = MouseCapture::enable(&mut *out).map_err(|e| e.to_string())?;
        if fail {
            return Err("draw failed".into());
        }
        Ok(())
    }

    #[test]
    fn mouse_capture_is_released_on_error() {
        for fail in [false, true] {
            let mut out = Vec::new();
            let result = run_with_capture(&mut out, fail);
            assert_eq!(result.is_err(), fail);

            let written = String::from_utf8(out).unwrap();
            let enabled = written.find("\x1b[?1000h").unwrap();
            let disabled = written.find("\x1b[?1000l").unwrap();
            assert!(enabled < disabled);
        }
    }
}
