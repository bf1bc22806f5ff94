use crate::config::{Config, next_baud_rate};
use crate::console::{Console, SendOutcome};
use crate::csv_utils;
use crate::measurement::MeasurementRecord;
use crate::preset::{PresetFields, PresetJob, PresetOutcome, PresetSequencer};
use crate::serial_session::{self, PortEntry};
use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    DefaultTerminal, Frame,
    layout::{Constraint, Direction, Flex, Layout, Rect},
    style::{Color, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Clear, Paragraph, Wrap},
};
use std::time::{Duration, Instant};
use tracing::{error, info};

const LOCKED_HINT: &str = "Preset fields are locked until the run finishes.";

/// Which input has the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Command,
    Interval,
    Pins,
    TestName,
    Units,
    Ports,
}

const FOCUS_ORDER: [Focus; 6] = [
    Focus::Command,
    Focus::Interval,
    Focus::Pins,
    Focus::TestName,
    Focus::Units,
    Focus::Ports,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupKind {
    Warning,
    Error,
}

impl PopupKind {
    fn label(self) -> &'static str {
        match self {
            PopupKind::Warning => "Warning",
            PopupKind::Error => "Error",
        }
    }
}

/// Modal message; any key dismisses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popup {
    pub kind: PopupKind,
    pub message: String,
}

/// Post-run "Please enter your data" dialog.
#[derive(Debug)]
struct MeasurementPrompt {
    job: PresetJob,
    input: String,
}

/// Pick the rig adapter: the first enumerated port, if it looks like the expected device.
pub fn rig_port<'a>(ports: &'a [PortEntry], expected: &str) -> Option<&'a PortEntry> {
    let first = ports.first()?;
    first
        .description
        .to_lowercase()
        .contains(&expected.to_lowercase())
        .then_some(first)
}

/// The main application which holds the state and logic of the application.
#[derive(Debug)]
pub struct App {
    /// Is the application running?
    running: bool,
    console: Console,
    sequencer: PresetSequencer,
    config: Config,
    ports: Vec<PortEntry>,
    /// Highlighted row in the port list.
    port_selected: usize,
    focus: Focus,
    command: String,
    fields: PresetFields,
    /// Status message to show at bottom.
    status: String,
    popups: Vec<Popup>,
    prompt: Option<MeasurementPrompt>,
}

impl App {
    /// Construct a new instance of [`App`].
    pub fn new(console: Console, ports: Vec<PortEntry>, config: Config) -> Self {
        let mut app = Self {
            running: false,
            console,
            sequencer: PresetSequencer::new(),
            config,
            ports,
            port_selected: 0,
            focus: Focus::Command,
            command: String::new(),
            fields: PresetFields::default(),
            status: "Type a command and press Enter. Ctrl+S starts a preset.".into(),
            popups: Vec::new(),
            prompt: None,
        };
        app.select_active_port();
        app
    }

    /// Run the application's main loop.
    pub fn run(mut self, mut terminal: DefaultTerminal) -> Result<()> {
        self.drive(|app| {
            terminal.draw(|frame| app.render(frame))?;
            app.handle_crossterm_events()?;
            app.tick(Instant::now());
            Ok(())
        })
    }

    /// Repeat `step` until quit or the first error. The session is shut down either way.
    fn drive(&mut self, mut step: impl FnMut(&mut Self) -> Result<()>) -> Result<()> {
        self.running = true;
        let result = loop {
            if !self.running {
                break Ok(());
            }
            if let Err(e) = step(self) {
                error!("event loop stopped: {e}");
                break Err(e);
            }
        };
        self.console.shutdown();
        result
    }

    /// Renders the user interface.
    fn render(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let layout = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(area);

        let left = Layout::default()
            .direction(Direction::Vertical)
            .constraints(vec![Constraint::Length(3), Constraint::Min(3)])
            .split(layout[0]);

        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints(vec![
                Constraint::Length(8),
                Constraint::Min(4),
                Constraint::Length(6),
            ])
            .split(layout[1]);

        // --- Command line ---
        frame.render_widget(
            Paragraph::new(self.command.as_str())
                .block(self.focus_block("Command", self.focus == Focus::Command)),
            left[0],
        );

        // --- Transcript: newest lines pinned to the bottom ---
        let visible = left[1].height.saturating_sub(2) as usize;
        let lines = self.console.transcript().lines();
        let skip = lines.len().saturating_sub(visible);
        let transcript: Vec<Line> = lines[skip..]
            .iter()
            .map(|l| Line::from(l.as_str()))
            .collect();
        frame.render_widget(
            Paragraph::new(transcript).block(Block::bordered().title("Transcript")),
            left[1],
        );

        // --- Preset fields ---
        let locked = self.sequencer.is_armed();
        let field_rows = [
            (Focus::Interval, "Interval (sec)", &self.fields.interval),
            (Focus::Pins, "Pins", &self.fields.pins),
            (Focus::TestName, "Test Name", &self.fields.test_name),
            (Focus::Units, "Measurement Units", &self.fields.units),
        ];
        let mut preset_text = Text::default();
        for (focus, label, value) in field_rows {
            let color = if locked {
                Color::DarkGray
            } else if self.focus == focus {
                Color::Cyan
            } else {
                Color::White
            };
            preset_text.extend([Line::from(Span::styled(
                format!("{label}: {value}"),
                Style::default().fg(color),
            ))]);
        }
        let countdown = match (self.sequencer.job(), self.sequencer.remaining(Instant::now())) {
            (Some(job), Some(left)) => format!(
                "Armed: {} toggles back in {}s (Ctrl+X cancels)",
                job.fields.pins,
                left.as_secs()
            ),
            _ => "Idle (Ctrl+S: toggle, wait, toggle)".to_string(),
        };
        preset_text.extend([Line::from(""), Line::from(Span::from(countdown).bold())]);
        let preset_focused = matches!(
            self.focus,
            Focus::Interval | Focus::Pins | Focus::TestName | Focus::Units
        );
        frame.render_widget(
            Paragraph::new(preset_text).block(self.focus_block("Presets", preset_focused)),
            right[0],
        );

        // --- Port list ---
        let mut ports_text = Text::default();
        if self.ports.is_empty() {
            ports_text.extend([Line::from("<no serial ports, F5 to rescan>")]);
        }
        for (i, port) in self.ports.iter().enumerate() {
            let active = port.port_name == self.console.session().port_name();
            let marker = if active { "*" } else { " " };
            let style = if self.focus == Focus::Ports && i == self.port_selected {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default().fg(Color::White)
            };
            ports_text.extend([Line::from(Span::styled(
                format!("{marker} {} ({})", port.port_name, port.description),
                style,
            ))]);
        }
        frame.render_widget(
            Paragraph::new(ports_text)
                .block(self.focus_block("COM Port Select", self.focus == Focus::Ports)),
            right[1],
        );

        // --- Status ---
        let session = self.console.session();
        let mut status_text = Text::default();
        status_text.extend([Line::from(format!(
            "Port: {} @ {} baud{}",
            session.port_name(),
            session.baud_rate(),
            if session.is_open() { "" } else { " (closed)" }
        ))]);
        status_text.extend([Line::from(self.status.as_str())]);
        status_text.extend([Line::from(Span::styled(
            "Tab=Focus  Enter=Send/Select  F2=Baud  F5=Rescan  Esc=Quit",
            Style::default().fg(Color::Gray),
        ))]);
        frame.render_widget(
            Paragraph::new(status_text)
                .wrap(Wrap { trim: true })
                .block(Block::bordered().title("Status")),
            right[2],
        );

        // --- Modals ---
        if let Some(prompt) = &self.prompt {
            let body = Text::from(vec![
                Line::from("Please enter your data:"),
                Line::from(""),
                Line::from(prompt.input.as_str().cyan()),
                Line::from(""),
                Line::from("Enter=Log  Esc=Skip".gray()),
            ]);
            let popup_area = centered(area, 50, 9);
            frame.render_widget(Clear, popup_area);
            frame.render_widget(
                Paragraph::new(body).block(Block::bordered().title("Data Input")),
                popup_area,
            );
        }
        if let Some(popup) = self.popups.first() {
            let color = match popup.kind {
                PopupKind::Warning => Color::Yellow,
                PopupKind::Error => Color::Red,
            };
            let popup_area = centered(area, 50, 7);
            frame.render_widget(Clear, popup_area);
            frame.render_widget(
                Paragraph::new(format!("{}: {}", popup.kind.label(), popup.message))
                    .wrap(Wrap { trim: true })
                    .block(
                        Block::bordered()
                            .title(popup.kind.label())
                            .style(Style::default().fg(color)),
                    ),
                popup_area,
            );
        }
    }

    fn focus_block(&self, title: &'static str, focused: bool) -> Block<'static> {
        if focused {
            Block::bordered()
                .title(title)
                .style(Style::default().fg(Color::Cyan))
        } else {
            Block::bordered().title(title)
        }
    }

    /// Reads the crossterm events and updates the state of [`App`].
    fn handle_crossterm_events(&mut self) -> Result<()> {
        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => self.on_key_event(key),
                Event::Mouse(_) => {}
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
        Ok(())
    }

    /// Handles the key events and updates the state of [`App`].
    fn on_key_event(&mut self, key: KeyEvent) {
        if !self.popups.is_empty() {
            self.popups.remove(0);
            return;
        }
        if self.prompt.is_some() {
            self.on_prompt_key(key);
            return;
        }

        // Global shortcuts
        match (key.modifiers, key.code) {
            (_, KeyCode::Esc) | (KeyModifiers::CONTROL, KeyCode::Char('c') | KeyCode::Char('C')) => {
                self.quit();
                return;
            }
            (KeyModifiers::CONTROL, KeyCode::Char('s') | KeyCode::Char('S')) => {
                self.start_preset(Instant::now());
                return;
            }
            (KeyModifiers::CONTROL, KeyCode::Char('x') | KeyCode::Char('X')) => {
                self.cancel_preset();
                return;
            }
            (_, KeyCode::F(2)) => {
                self.cycle_baud_rate();
                return;
            }
            (_, KeyCode::F(5)) => {
                self.refresh_ports();
                return;
            }
            (_, KeyCode::Tab) => {
                self.move_focus(1);
                return;
            }
            (_, KeyCode::BackTab) => {
                self.move_focus(FOCUS_ORDER.len() - 1);
                return;
            }
            _ => {}
        }

        match self.focus {
            Focus::Command => match key.code {
                KeyCode::Char(c) => self.command.push(c),
                KeyCode::Backspace => {
                    self.command.pop();
                }
                KeyCode::Enter => self.submit_command(),
                _ => {}
            },
            Focus::Ports => match key.code {
                KeyCode::Up => {
                    self.port_selected = self.port_selected.saturating_sub(1);
                }
                KeyCode::Down => {
                    if self.port_selected + 1 < self.ports.len() {
                        self.port_selected += 1;
                    }
                }
                KeyCode::Enter => self.change_port(),
                _ => {}
            },
            Focus::Interval | Focus::Pins | Focus::TestName | Focus::Units => {
                if !matches!(key.code, KeyCode::Char(_) | KeyCode::Backspace) {
                    return;
                }
                if self.sequencer.is_armed() {
                    self.status = LOCKED_HINT.into();
                    return;
                }
                let field = match self.focus {
                    Focus::Interval => &mut self.fields.interval,
                    Focus::Pins => &mut self.fields.pins,
                    Focus::TestName => &mut self.fields.test_name,
                    _ => &mut self.fields.units,
                };
                match key.code {
                    KeyCode::Char(c) => field.push(c),
                    _ => {
                        field.pop();
                    }
                }
            }
        }
    }

    fn on_prompt_key(&mut self, key: KeyEvent) {
        let Some(prompt) = self.prompt.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Char(c) => prompt.input.push(c),
            KeyCode::Backspace => {
                prompt.input.pop();
            }
            KeyCode::Enter => self.submit_measurement(),
            KeyCode::Esc => self.dismiss_measurement(),
            _ => {}
        }
    }

    fn move_focus(&mut self, step: usize) {
        let i = FOCUS_ORDER.iter().position(|f| *f == self.focus).unwrap_or(0);
        self.focus = FOCUS_ORDER[(i + step) % FOCUS_ORDER.len()];
    }

    fn show(&mut self, kind: PopupKind, message: impl Into<String>) {
        self.popups.push(Popup {
            kind,
            message: message.into(),
        });
    }

    fn report_send(&mut self, outcome: SendOutcome) {
        if outcome == SendOutcome::Failed {
            self.show(PopupKind::Error, "COM unavailable for sending.");
        }
    }

    /// Command line Enter: send, then read back.
    fn submit_command(&mut self) {
        let input = std::mem::take(&mut self.command);
        let outcome = self.console.send(&input);
        self.report_send(outcome);
        self.console.receive();
    }

    fn start_preset(&mut self, now: Instant) {
        if self.sequencer.is_armed() {
            self.status = LOCKED_HINT.into();
            return;
        }
        match self.sequencer.start(&self.fields, now, &mut self.console) {
            Ok(outcome) => {
                self.report_send(outcome);
                self.status = format!("Preset armed for {}s.", self.fields.interval.trim());
            }
            Err(e) => self.show(PopupKind::Error, e.to_string()),
        }
    }

    fn cancel_preset(&mut self) {
        if let Some(outcome) = self.sequencer.cancel(&mut self.console) {
            self.preset_finished(outcome);
        }
    }

    /// Advance the preset countdown. Called once per loop iteration.
    fn tick(&mut self, now: Instant) {
        if let Some(outcome) = self.sequencer.poll(now, &mut self.console) {
            self.preset_finished(outcome);
        }
    }

    fn preset_finished(&mut self, outcome: PresetOutcome) {
        self.report_send(outcome.send);
        self.status = if outcome.cancelled {
            "Preset cancelled; fields unlocked.".into()
        } else {
            "Preset complete; fields unlocked.".into()
        };
        self.prompt = Some(MeasurementPrompt {
            job: outcome.job,
            input: String::new(),
        });
    }

    fn submit_measurement(&mut self) {
        let Some(prompt) = self.prompt.take() else {
            return;
        };
        let fields = prompt.job.fields;
        let record = MeasurementRecord {
            test_name: fields.test_name,
            pins: fields.pins,
            interval: fields.interval,
            units: fields.units,
            value: prompt.input,
        };
        match csv_utils::append_measurement(&self.config.data_dir, &record) {
            Ok(path) => {
                info!("measurement logged to {}", path.display());
                self.status = format!("Measurement logged to {}.", path.display());
            }
            Err(e) => {
                error!("measurement log failed: {e}");
                self.show(PopupKind::Error, format!("Could not write data file: {e}"));
            }
        }
    }

    fn dismiss_measurement(&mut self) {
        self.prompt = None;
        self.status = "Measurement skipped.".into();
    }

    /// Switch the session to the highlighted port, reverting the highlight on failure.
    fn change_port(&mut self) {
        let Some(target) = self.ports.get(self.port_selected).map(|p| p.port_name.clone()) else {
            return;
        };
        if self.console.session_mut().set_port(&target) {
            let port = self.console.session().port_name().to_string();
            self.console
                .transcript_mut()
                .mark(&format!("COM Port Selection: {port}"));
        } else {
            self.show(PopupKind::Error, "COM port is unavailable.");
            self.select_active_port();
        }
    }

    fn select_active_port(&mut self) {
        let active = self.console.session().port_name();
        if let Some(i) = self.ports.iter().position(|p| p.port_name == active) {
            self.port_selected = i;
        }
    }

    fn refresh_ports(&mut self) {
        self.ports = serial_session::list_ports();
        self.port_selected = 0;
        self.select_active_port();
        self.status = format!("{} serial port(s) found.", self.ports.len());
    }

    fn cycle_baud_rate(&mut self) {
        let next = next_baud_rate(self.console.session().baud_rate());
        self.console.session_mut().set_baud_rate(next);
        self.status = format!("Baud rate {next} applies on the next reconnect.");
    }

    /// Quitting mid-run still toggles the pins back.
    fn quit(&mut self) {
        if let Some(outcome) = self.sequencer.cancel(&mut self.console) {
            info!(
                "quit while armed; toggled {:?} back ({:?})",
                outcome.job.fields.pins, outcome.send
            );
        }
        self.running = false;
    }
}

fn centered(area: Rect, width_pct: u16, height: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [cell] = Layout::horizontal([Constraint::Percentage(width_pct)])
        .flex(Flex::Center)
        .areas(row);
    cell
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::tests::console;
    use crate::csv_utils::data_path;
    use crate::serial_session::mock::MockRig;
    use chrono::Local;
    use std::path::Path;

    fn ports() -> Vec<PortEntry> {
        ["/dev/ttyUSB0", "/dev/ttyUSB1"]
            .iter()
            .map(|p| PortEntry {
                description: "USB-SERIAL CH340".into(),
                port_name: p.to_string(),
            })
            .collect()
    }

    fn app(rig: &MockRig, dir: &Path) -> App {
        let config = Config {
            system_log_dir: dir.join("system"),
            data_dir: dir.join("data"),
            ..Config::default()
        };
        App::new(console(rig, dir), ports(), config)
    }

    fn press(app: &mut App, code: KeyCode) {
        app.on_key_event(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn ctrl(app: &mut App, c: char) {
        app.on_key_event(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL));
    }

    fn type_str(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn fill_preset(app: &mut App, interval: &str, pins: &str) {
        press(app, KeyCode::Tab);
        type_str(app, interval);
        press(app, KeyCode::Tab);
        type_str(app, pins);
        press(app, KeyCode::Tab);
        type_str(app, "Nozzle 3");
        press(app, KeyCode::Tab);
        type_str(app, "mL");
    }

    #[test]
    fn rig_port_requires_expected_adapter() {
        assert!(rig_port(&ports(), "CH340").is_some());
        assert!(rig_port(&ports(), "FTDI").is_none());
        assert!(rig_port(&[], "CH340").is_none());
    }

    #[test]
    fn enter_sends_command_and_logs_reply() {
        let dir = tempfile::tempdir().unwrap();
        let rig = MockRig::with_ports(&["/dev/ttyUSB0"]);
        rig.state().replies.push_back("ack\n".into());
        let mut app = app(&rig, dir.path());
        type_str(&mut app, "A1");
        press(&mut app, KeyCode::Enter);

        assert_eq!(rig.written(), vec!["A1"]);
        assert!(app.command.is_empty());
        let lines = app.console.transcript().lines();
        assert!(lines[0].ends_with(" -> A1"));
        assert!(lines[1].ends_with(" -> ack"));
    }

    #[test]
    fn repeated_command_is_logged_not_sent() {
        let dir = tempfile::tempdir().unwrap();
        let rig = MockRig::with_ports(&["/dev/ttyUSB0"]);
        let mut app = app(&rig, dir.path());
        type_str(&mut app, "A1A");
        press(&mut app, KeyCode::Enter);

        assert!(rig.written().is_empty());
        assert!(
            app.console.transcript().lines()[0].ends_with("A1A -- Repeat detected, try again")
        );
        assert!(app.popups.is_empty());
    }

    #[test]
    fn write_fault_raises_one_error() {
        let dir = tempfile::tempdir().unwrap();
        let rig = MockRig::with_ports(&["/dev/ttyUSB0"]);
        let mut app = app(&rig, dir.path());
        rig.state().fail_writes = true;
        type_str(&mut app, "A1");
        press(&mut app, KeyCode::Enter);
        assert_eq!(
            app.popups,
            vec![Popup {
                kind: PopupKind::Error,
                message: "COM unavailable for sending.".into()
            }]
        );
    }

    #[test]
    fn preset_scenario_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let rig = MockRig::with_ports(&["/dev/ttyUSB0"]);
        let mut app = app(&rig, dir.path());
        fill_preset(&mut app, "2", "A1");

        let t0 = Instant::now();
        app.start_preset(t0);
        assert_eq!(rig.written(), vec!["A1"]);
        assert!(app.sequencer.is_armed());

        // Locked while armed.
        press(&mut app, KeyCode::Char('z'));
        assert_eq!(app.fields.units, "mL");
        assert_eq!(app.status, LOCKED_HINT);

        app.tick(t0 + Duration::from_secs(1));
        assert!(app.prompt.is_none());

        app.tick(t0 + Duration::from_secs(2));
        assert_eq!(rig.written(), vec!["A1", "A1"]);
        assert!(!app.sequencer.is_armed());
        assert!(app.prompt.is_some());

        type_str(&mut app, "41.5");
        press(&mut app, KeyCode::Enter);
        assert!(app.prompt.is_none());

        let csv = std::fs::read_to_string(data_path(&dir.path().join("data"), Local::now()))
            .expect("data file");
        assert_eq!(
            csv,
            ",0\nNozzle 3,\nPins Toggled,A1\nTime Interval (s),2\nMeasurement (mL),41.5\n"
        );

        // Unlocked again.
        press(&mut app, KeyCode::Char('s'));
        assert_eq!(app.fields.units, "mLs");
    }

    #[test]
    fn invalid_interval_reports_and_stays_idle() {
        let dir = tempfile::tempdir().unwrap();
        let rig = MockRig::with_ports(&["/dev/ttyUSB0"]);
        let mut app = app(&rig, dir.path());
        fill_preset(&mut app, "soon", "A1");
        ctrl(&mut app, 's');

        assert!(!app.sequencer.is_armed());
        assert!(rig.written().is_empty());
        assert_eq!(
            app.popups[0].message,
            "Must set preset time as a number (seconds)."
        );
    }

    #[test]
    fn cancel_toggles_back_and_prompt_can_be_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let rig = MockRig::with_ports(&["/dev/ttyUSB0"]);
        let mut app = app(&rig, dir.path());
        fill_preset(&mut app, "30", "B2");
        app.start_preset(Instant::now());
        ctrl(&mut app, 'x');

        assert_eq!(rig.written(), vec!["B2", "B2"]);
        assert!(!app.sequencer.is_armed());
        assert!(app.prompt.is_some());

        app.running = true;
        press(&mut app, KeyCode::Esc);
        assert!(app.prompt.is_none());
        assert!(app.running, "Esc in the prompt skips logging, it does not quit");
        assert!(!dir.path().join("data").exists());

        // Unlocked after cancel.
        app.focus = Focus::Pins;
        press(&mut app, KeyCode::Char('C'));
        assert_eq!(app.fields.pins, "B2C");
        assert_ne!(app.status, LOCKED_HINT);
    }

    #[test]
    fn quitting_while_armed_toggles_back() {
        let dir = tempfile::tempdir().unwrap();
        let rig = MockRig::with_ports(&["/dev/ttyUSB0"]);
        let mut app = app(&rig, dir.path());
        fill_preset(&mut app, "30", "B2");
        app.start_preset(Instant::now());
        app.running = true;
        press(&mut app, KeyCode::Esc);

        assert!(!app.running);
        assert!(!app.sequencer.is_armed());
        assert_eq!(rig.written(), vec!["B2", "B2"]);
    }

    #[test]
    fn loop_error_still_closes_session() {
        let dir = tempfile::tempdir().unwrap();
        let rig = MockRig::with_ports(&["/dev/ttyUSB0"]);
        let mut app = app(&rig, dir.path());
        let result = app.drive(|_| Err(color_eyre::eyre::eyre!("terminal gone")));

        assert!(result.is_err());
        assert!(!app.console.session().is_open());
        assert_eq!(
            app.console.transcript().lines().last().map(String::as_str),
            Some(crate::transcript::SESSION_END)
        );
    }

    #[test]
    fn quit_ends_loop_and_marks_session() {
        let dir = tempfile::tempdir().unwrap();
        let rig = MockRig::with_ports(&["/dev/ttyUSB0"]);
        let mut app = app(&rig, dir.path());
        let mut steps = 0;
        let result = app.drive(|app| {
            steps += 1;
            app.quit();
            Ok(())
        });

        assert!(result.is_ok());
        assert_eq!(steps, 1);
        assert!(!app.console.session().is_open());
    }

    #[test]
    fn missing_port_reverts_selection() {
        let dir = tempfile::tempdir().unwrap();
        let rig = MockRig::with_ports(&["/dev/ttyUSB0"]);
        let mut app = app(&rig, dir.path());
        for _ in 0..5 {
            press(&mut app, KeyCode::Tab);
        }
        press(&mut app, KeyCode::Down);
        assert_eq!(app.port_selected, 1);
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.popups.len(), 1);
        assert_eq!(app.popups[0].message, "COM port is unavailable.");
        assert_eq!(app.console.session().port_name(), "/dev/ttyUSB0");
        assert_eq!(app.port_selected, 0);
    }

    #[test]
    fn port_switch_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let rig = MockRig::with_ports(&["/dev/ttyUSB0", "/dev/ttyUSB1"]);
        let mut app = app(&rig, dir.path());
        app.focus = Focus::Ports;
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Enter);

        assert!(app.popups.is_empty());
        assert_eq!(app.console.session().port_name(), "/dev/ttyUSB1");
        assert_eq!(
            app.console.transcript().lines().last().map(String::as_str),
            Some("COM Port Selection: /dev/ttyUSB1")
        );
    }

    #[test]
    fn baud_change_waits_for_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let rig = MockRig::with_ports(&["/dev/ttyUSB0", "/dev/ttyUSB1"]);
        let mut app = app(&rig, dir.path());
        press(&mut app, KeyCode::F(2));
        assert_eq!(app.console.session().baud_rate(), 19200);
        assert_eq!(rig.state().opens.len(), 1);
    }

    #[test]
    fn popup_swallows_next_key() {
        let dir = tempfile::tempdir().unwrap();
        let rig = MockRig::with_ports(&["/dev/ttyUSB0"]);
        let mut app = app(&rig, dir.path());
        app.show(PopupKind::Warning, "heads up");
        press(&mut app, KeyCode::Char('q'));
        assert!(app.popups.is_empty());
        assert!(app.command.is_empty());
    }
}
