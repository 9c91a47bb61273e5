use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
};

use crate::domain::CMDMode;
use crate::model::{Model, UIData};

pub const CMDLINE_HEIGH: u16 = 1;
pub const NO_RECORDS_TEXT: &str = "No records found";
pub const LOADING_TEXT: &str = "Loading...";

#[derive(Debug, Default)]
pub struct TableUI {
    state: TableState,
}

impl TableUI {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let [table_area, cmdline_area] =
            Layout::vertical([Constraint::Min(3), Constraint::Length(CMDLINE_HEIGH)])
                .areas(frame.area());

        let block = Self::frame_block(uidata);
        let inner = block.inner(table_area);
        frame.render_widget(block, table_area);

        if let Some(error) = &uidata.error {
            let text = Paragraph::new(Line::from(vec![
                "Error: ".red().bold(),
                Span::raw(error.clone()),
            ]))
            .wrap(Wrap { trim: true });
            frame.render_widget(text, inner);
        } else if uidata.loading {
            frame.render_widget(Paragraph::new(LOADING_TEXT.yellow()).centered(), inner);
        } else {
            self.draw_table(uidata, frame, inner);
        }

        self.draw_cmdline(uidata, frame, cmdline_area);

        if uidata.show_popup {
            Self::draw_popup(&uidata.popup_message, frame);
        }
    }

    fn frame_block(uidata: &UIData) -> Block<'static> {
        let title = Line::from(format!(" {} ", uidata.name).bold());
        let instructions = Line::from(vec![
            " Search ".into(),
            "</>".blue().bold(),
            " Sort ".into(),
            "<S>".blue().bold(),
            " Page ".into(),
            "<←/→>".blue().bold(),
            " Help ".into(),
            "<?>".blue().bold(),
            " Quit ".into(),
            "<Q> ".blue().bold(),
        ]);
        Block::bordered()
            .title(title.centered())
            .title_bottom(instructions.centered())
            .border_set(border::THICK)
    }

    fn draw_table(&mut self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let header = Row::new(uidata.headers.iter().enumerate().map(|(cidx, title)| {
            if uidata.sort_column == Some(cidx) {
                Cell::from(format!("{title} {}", uidata.sort_direction.symbol()))
            } else {
                Cell::from(title.clone())
            }
        }))
        .style(Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED));

        let widths = uidata
            .widths
            .iter()
            .map(|&w| Constraint::Length(w as u16))
            .collect::<Vec<_>>();

        let no_records = uidata.no_records && !uidata.record_view;
        let rows: Vec<Row> = uidata
            .rows
            .iter()
            .map(|r| Row::new(r.iter().map(|c| Cell::from(c.clone()))))
            .collect();

        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(1)
            .row_highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White));

        self.state.select(uidata.selected_row);
        frame.render_stateful_widget(table, area, &mut self.state);

        // Shown in place of the first row, below the header
        if no_records && area.height > 1 {
            let row_area = Rect {
                y: area.y + 1,
                height: 1,
                ..area
            };
            frame.render_widget(Paragraph::new(NO_RECORDS_TEXT.italic().dark_gray()), row_area);
        }
    }

    fn draw_cmdline(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let [left, right] =
            Layout::horizontal([Constraint::Fill(1), Constraint::Length(40)]).areas(area);

        if uidata.active_cmdinput {
            let prompt = match uidata.cmd_mode {
                Some(CMDMode::Search) | None => uidata.search_prompt.as_str(),
            };
            let line = Line::from(vec![
                format!("{prompt} ").cyan(),
                Span::raw(uidata.cmdinput.input.clone()),
            ]);
            frame.render_widget(Paragraph::new(line), left);
            let offset = prompt.chars().count() + 1 + uidata.cmdinput.curser_pos;
            frame.set_cursor_position((
                left.x + (offset as u16).min(left.width.saturating_sub(1)),
                left.y,
            ));
        } else {
            frame.render_widget(Paragraph::new(uidata.status_message.clone()), left);
        }

        let mut info = vec![Span::raw(format!("Page {}/{}", uidata.page, uidata.page_count))];
        if !uidata.search_term.is_empty() {
            info.push(Span::raw(format!(
                " · {}/{} match",
                uidata.total, uidata.record_count
            )));
        } else {
            info.push(Span::raw(format!(" · {} records", uidata.record_count)));
        }
        frame.render_widget(Paragraph::new(Line::from(info)).right_aligned(), right);
    }

    fn draw_popup(message: &str, frame: &mut Frame) {
        let height = message.lines().count() as u16 + 2;
        let width = message.lines().map(|l| l.chars().count()).max().unwrap_or(0) as u16 + 4;
        let [area] = Layout::vertical([Constraint::Length(height)])
            .flex(Flex::Center)
            .areas(frame.area());
        let [area] = Layout::horizontal([Constraint::Length(width)])
            .flex(Flex::Center)
            .areas(area);

        let popup = Paragraph::new(message.to_string())
            .block(Block::bordered().title(" Help ".bold()).border_set(border::ROUNDED));
        frame.render_widget(Clear, area);
        frame.render_widget(popup, area);
    }
}
