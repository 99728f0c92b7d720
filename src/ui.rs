use crate::{
    client::{
        Session,
        SessionPhase,
    },
    provider::Address,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;
use tokio::sync::mpsc;
use unicode_width::UnicodeWidthStr;

pub enum UserEvent {
    Quit,
    Redraw,
    Connect,
    SubmitAnswer(String),
    SubmitFunding(u64),
    CreateQuiz { question: String, answer: String },
    AnswerEdited,
    DismissTransactionError,
    DismissNetworkError,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Focus {
    #[default]
    Answer,
    Fund,
}

#[derive(Clone, Debug, Default)]
struct CreateState {
    question: String,
    answer: String,
    focus: CreateFocus,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum CreateFocus {
    #[default]
    Question,
    Answer,
}

#[derive(Clone, Debug, Default)]
enum Mode {
    #[default]
    Normal,
    Create(CreateState),
    QuitConfirm,
}

pub struct UiState {
    mode: Mode,
    focus: Focus,
    answer_input: String,
    fund_input: String,
    phase: SessionPhase,
    has_quiz: bool,
    last_quiz: Option<Address>,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

impl Default for UiState {
    fn default() -> Self {
        UiState {
            mode: Mode::Normal,
            focus: Focus::Answer,
            answer_input: String::new(),
            fund_input: String::new(),
            phase: SessionPhase::Disconnected,
            has_quiz: false,
            last_quiz: None,
            terminal: None,
        }
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )?;
    // One persistent terminal so buffers survive across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::event::DisableMouseCapture,
        crossterm::terminal::LeaveAlternateScreen
    )?;
    Ok(())
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<Event>;

/// Crossterm reads block, so they live on their own thread and feed the
/// async loop through a channel.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            match event::read() {
                Ok(ev) => {
                    if tx.send(ev).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

pub async fn next_raw_event(events: &mut InputEventReceiver) -> Result<Event> {
    events
        .recv()
        .await
        .ok_or_else(|| eyre!("input event stream closed"))
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let key = match event {
        Event::Key(key) => key,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if key.kind != KeyEventKind::Press {
        return None;
    }

    match &mut state.mode {
        Mode::QuitConfirm => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::Create(create) => match key.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Tab => {
                create.focus = match create.focus {
                    CreateFocus::Question => CreateFocus::Answer,
                    CreateFocus::Answer => CreateFocus::Question,
                };
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                if create.question.trim().is_empty() || create.answer.trim().is_empty() {
                    return Some(UserEvent::Redraw);
                }
                let question = create.question.clone();
                let answer = create.answer.clone();
                state.mode = Mode::Normal;
                Some(UserEvent::CreateQuiz { question, answer })
            }
            KeyCode::Backspace => {
                match create.focus {
                    CreateFocus::Question => create.question.pop(),
                    CreateFocus::Answer => create.answer.pop(),
                };
                Some(UserEvent::Redraw)
            }
            KeyCode::Char(c) => {
                match create.focus {
                    CreateFocus::Question => create.question.push(c),
                    CreateFocus::Answer => create.answer.push(c),
                };
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::Normal => interpret_normal(state, key.code, key.modifiers),
    }
}

fn interpret_normal(
    state: &mut UiState,
    code: KeyCode,
    modifiers: KeyModifiers,
) -> Option<UserEvent> {
    if code == KeyCode::Esc {
        state.mode = Mode::QuitConfirm;
        return Some(UserEvent::Redraw);
    }

    if state.phase != SessionPhase::Ready {
        return match code {
            KeyCode::Char('c') | KeyCode::Enter => Some(UserEvent::Connect),
            KeyCode::Char('x') => Some(UserEvent::DismissNetworkError),
            _ => None,
        };
    }

    if !state.has_quiz {
        return match code {
            KeyCode::Char('n') => {
                state.mode = Mode::Create(CreateState::default());
                Some(UserEvent::Redraw)
            }
            KeyCode::Char('x') => Some(UserEvent::DismissTransactionError),
            _ => None,
        };
    }

    // Quiz on screen: plain characters go to the focused input, so the
    // remaining shortcuts are chords.
    if modifiers.contains(KeyModifiers::CONTROL) {
        return match code {
            KeyCode::Char('n') => {
                state.mode = Mode::Create(CreateState::default());
                Some(UserEvent::Redraw)
            }
            KeyCode::Char('x') => Some(UserEvent::DismissTransactionError),
            _ => None,
        };
    }
    match code {
        KeyCode::Tab => {
            state.focus = match state.focus {
                Focus::Answer => Focus::Fund,
                Focus::Fund => Focus::Answer,
            };
            Some(UserEvent::Redraw)
        }
        KeyCode::Enter => match state.focus {
            Focus::Answer => {
                if state.answer_input.is_empty() {
                    return Some(UserEvent::Redraw);
                }
                let guess = std::mem::take(&mut state.answer_input);
                Some(UserEvent::SubmitAnswer(guess))
            }
            Focus::Fund => {
                let amount = state.fund_input.parse::<u64>().unwrap_or(0);
                if amount == 0 {
                    return Some(UserEvent::Redraw);
                }
                state.fund_input.clear();
                Some(UserEvent::SubmitFunding(amount))
            }
        },
        KeyCode::Backspace => match state.focus {
            Focus::Answer => {
                state.answer_input.pop();
                Some(UserEvent::AnswerEdited)
            }
            Focus::Fund => {
                state.fund_input.pop();
                Some(UserEvent::Redraw)
            }
        },
        KeyCode::Char(c) => match state.focus {
            Focus::Answer => {
                state.answer_input.push(c);
                Some(UserEvent::AnswerEdited)
            }
            Focus::Fund if c.is_ascii_digit() => {
                state.fund_input.push(c);
                Some(UserEvent::Redraw)
            }
            Focus::Fund => None,
        },
        _ => None,
    }
}

pub fn draw(state: &mut UiState, session: &Session) -> Result<()> {
    state.phase = session.phase;
    state.has_quiz = session.active_quiz.is_some();
    let current = session.active_quiz.as_ref().map(|quiz| quiz.address);
    if current != state.last_quiz {
        state.answer_input.clear();
        state.fund_input.clear();
        state.focus = Focus::Answer;
        state.last_quiz = current;
    }
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, session))?;
        state.terminal = Some(term);
    }
    Ok(())
}

fn ui(f: &mut Frame, state: &UiState, session: &Session) {
    f.render_widget(Clear, f.area());
    match session.phase {
        SessionPhase::Ready => draw_main(f, state, session),
        _ => draw_connect_screen(f, session),
    }
    draw_modals(f, state);
}

fn draw_connect_screen(f: &mut Frame, session: &Session) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(7),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    let title = Paragraph::new("Quiz Game")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(title, chunks[0]);

    let mut lines = Vec::new();
    match session.phase {
        SessionPhase::Connecting => lines.push(Line::from("Connecting to wallet...")),
        SessionPhase::NetworkInvalid => {
            if let Some(address) = &session.address {
                lines.push(Line::from(format!("Connected as {address}")));
            }
            lines.push(Line::from("Wrong network."));
        }
        _ => lines.push(Line::from("Press c to connect your wallet")),
    }
    if let Some(error) = &session.network_error {
        lines.push(Line::from(""));
        lines.push(Line::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        ));
        lines.push(Line::styled(
            "x to dismiss",
            Style::default().fg(Color::DarkGray),
        ));
    }
    let body = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Connect"));
    f.render_widget(body, chunks[1]);

    let help = Paragraph::new("c connect | x dismiss error | Esc quit")
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[3]);
}

fn draw_main(f: &mut Frame, state: &UiState, session: &Session) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Min(9),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_navbar(f, chunks[0], session);
    draw_banners(f, chunks[1], session);
    draw_quiz_area(f, chunks[2], state, session);

    let help = Paragraph::new(
        "Tab switch field | Enter submit | Ctrl-n new quiz | Ctrl-x dismiss error | Esc quit",
    )
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[3]);
}

fn draw_navbar(f: &mut Frame, area: Rect, session: &Session) {
    let account = session
        .address
        .map(|address| address.to_string())
        .unwrap_or_else(|| String::from("-"));
    let network = match (&session.network_name, &session.network) {
        (Some(name), _) => name.clone(),
        (None, Some(id)) => format!("Chain {id}"),
        (None, None) => String::from("-"),
    };
    let balance = session
        .wallet_balance
        .map(|balance| format!("{balance} ETH"))
        .unwrap_or_else(|| String::from("-"));
    let navbar = Paragraph::new(format!(
        "Account: {account} | Network: {network} | Balance: {balance}"
    ))
    .block(Block::default().borders(Borders::ALL).title("Quiz Game"));
    f.render_widget(navbar, area);
}

fn draw_banners(f: &mut Frame, area: Rect, session: &Session) {
    let mut lines: Vec<Line> = Vec::new();
    if let Some(tx_hash) = &session.pending_call {
        lines.push(Line::styled(
            format!("Waiting for transaction {tx_hash}..."),
            Style::default().fg(Color::Yellow),
        ));
    }
    if let Some(error) = &session.transaction_error {
        lines.push(Line::styled(
            format!("Transaction failed: {} (Ctrl-x to dismiss)", error),
            Style::default().fg(Color::Red),
        ));
    }
    if lines.is_empty() {
        lines.push(Line::styled(
            "No pending transactions",
            Style::default().fg(Color::DarkGray),
        ));
    }
    let banners =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Activity"));
    f.render_widget(banners, area);
}

fn draw_quiz_area(f: &mut Frame, area: Rect, state: &UiState, session: &Session) {
    if session.loading {
        let loading = Paragraph::new("Loading...")
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(loading, area);
        return;
    }

    let Some(quiz) = &session.active_quiz else {
        let text = if session.transaction_error.is_some() {
            "Could not load quizzes"
        } else {
            "No quiz available right now. Press n to create one"
        };
        let empty = Paragraph::new(text)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title("Quiz"));
        f.render_widget(empty, area);
        return;
    };

    let (card_style, verdict) = match quiz.is_answer_correct {
        Some(true) => (
            Style::default().fg(Color::Green),
            Some(Line::styled(
                "Correct! Loading the next quiz...",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            )),
        ),
        Some(false) => (
            Style::default().fg(Color::Red),
            Some(Line::styled(
                "Not quite, try again",
                Style::default().fg(Color::Red),
            )),
        ),
        None => (Style::default(), None),
    };

    let funding_hint = if quiz.balance == 0 {
        "You have to fund the question before answering"
    } else {
        "You can add some ethers to this question"
    };

    let input_width = area.width.saturating_sub(12) as usize;
    let mut lines = vec![
        Line::styled(
            quiz.question.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Line::from(format!("Balance: {} ETH", quiz.balance)),
        Line::from(""),
        input_line(
            "Answer",
            &state.answer_input,
            state.focus == Focus::Answer,
            input_width,
        ),
        Line::from(""),
        Line::styled(funding_hint, Style::default().fg(Color::DarkGray)),
        input_line(
            "Fund",
            &state.fund_input,
            state.focus == Focus::Fund,
            input_width,
        ),
    ];
    if let Some(verdict) = verdict {
        lines.push(Line::from(""));
        lines.push(verdict);
    }

    let card = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(card_style)
            .title("Quiz"),
    );
    f.render_widget(card, area);
}

fn input_line(label: &str, value: &str, focused: bool, max_width: usize) -> Line<'static> {
    let shown = visible_tail(value, max_width);
    let cursor = if focused { "_" } else { "" };
    let style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::raw(format!("{label:>7}: ")),
        Span::styled(format!("{shown}{cursor}"), style),
    ])
}

// Keep the tail of an over-long input visible where the cursor is.
fn visible_tail(text: &str, max_width: usize) -> String {
    let mut start = 0;
    while start < text.len() && text[start..].width() > max_width {
        start += text[start..].chars().next().map_or(1, char::len_utf8);
    }
    text[start..].to_owned()
}

fn draw_modals(f: &mut Frame, state: &UiState) {
    match &state.mode {
        Mode::Create(create) => {
            let area = centered_rect(60, 40, f.area());
            let block = Block::default()
                .borders(Borders::ALL)
                .title("Add a question and the corresponding answer");
            let width = area.width.saturating_sub(14) as usize;
            let lines = vec![
                input_line(
                    "Question",
                    &create.question,
                    create.focus == CreateFocus::Question,
                    width,
                ),
                input_line(
                    "Answer",
                    &create.answer,
                    create.focus == CreateFocus::Answer,
                    width,
                ),
                Line::from(""),
                Line::styled(
                    "Tab switch | Enter create | Esc cancel",
                    Style::default().fg(Color::DarkGray),
                ),
            ];
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(Paragraph::new(lines), block.inner(area));
        }
        Mode::QuitConfirm => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}
