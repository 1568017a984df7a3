use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget, Wrap},
};

use crate::clock::format_mm_ss;
use crate::session::{RecordingStatus, SessionSnapshot, SessionState};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;

const WORK_COLOR: Color = Color::Rgb(0, 204, 204);
const REST_COLOR: Color = Color::Blue;

/// "Repeat 2 of 4", "Repeat 7" for indefinite groups, nothing for single passes
pub fn repeat_label(snapshot: &SessionSnapshot) -> Option<String> {
    match snapshot.total_repetitions {
        1 => None,
        0 => Some(format!("Repeat {}", snapshot.current_repetition)),
        total => Some(format!("Repeat {} of {}", snapshot.current_repetition, total)),
    }
}

pub fn recording_label(status: &RecordingStatus) -> String {
    match status {
        RecordingStatus::Disabled => "recording off".to_string(),
        RecordingStatus::Pending => "recording: starting".to_string(),
        RecordingStatus::Active => "recording".to_string(),
        RecordingStatus::Finalizing => "recording: saving".to_string(),
        RecordingStatus::Failed(reason) => format!("recording failed: {}", reason),
        RecordingStatus::Saved(summary) => {
            format!("recorded {}", format_mm_ss(summary.duration_secs.clamp(0, u32::MAX as i64) as u32))
        }
    }
}

fn help_text(state: SessionState) -> &'static str {
    match state {
        SessionState::NotStarted => "(q)uit",
        SessionState::Running => "(space) pause | (e)nd",
        SessionState::Paused => "(space) resume | (e)nd",
        SessionState::Ended => "(q)uit",
    }
}

impl Widget for &SessionSnapshot {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let dim_style = Style::default().add_modifier(Modifier::DIM);
        let gray_style = Style::default().fg(Color::Gray);
        let italic_style = Style::default().add_modifier(Modifier::ITALIC);

        let phase_color = if self.is_rest_period {
            REST_COLOR
        } else {
            WORK_COLOR
        };

        let mut lines = vec![
            Line::from(Span::styled(self.workout_name.clone(), dim_style)),
            Line::from(Span::styled(self.current_group_name.clone(), gray_style)),
        ];
        if let Some(label) = repeat_label(self) {
            lines.push(Line::from(Span::styled(label, gray_style)));
        }
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            if self.is_rest_period {
                "Rest".to_string()
            } else {
                self.current_phase_name.clone()
            },
            Style::default().patch(bold_style).fg(phase_color),
        )));
        lines.push(Line::from(Span::styled(
            format_mm_ss(self.time_remaining),
            Style::default().patch(bold_style).fg(Color::White),
        )));
        lines.push(Line::default());

        let state_style = match self.session_state {
            SessionState::Paused => Style::default().patch(bold_style).fg(Color::Yellow),
            SessionState::Ended => Style::default().patch(bold_style).fg(Color::Green),
            _ => gray_style,
        };
        lines.push(Line::from(Span::styled(self.session_state.to_string(), state_style)));

        let recording_style = match self.recording {
            RecordingStatus::Failed(_) => Style::default().fg(Color::Red),
            _ => dim_style,
        };
        lines.push(Line::from(Span::styled(
            recording_label(&self.recording),
            recording_style,
        )));

        let body_height = lines.len() as u16;
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints(
                [
                    Constraint::Min(0),
                    Constraint::Length(body_height),
                    Constraint::Min(0),
                    Constraint::Length(1),
                ]
                .as_ref(),
            )
            .split(area);

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(chunks[1], buf);

        Paragraph::new(Span::styled(help_text(self.session_state), italic_style))
            .alignment(Alignment::Center)
            .render(chunks[3], buf);
    }
}
