use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use crossterm::{cursor, execute, style, terminal};
use log::{debug, error, info, warn, LevelFilter};
use rich_rust::markup;
use rich_rust::prelude::*;
use rich_rust::r#box::ROUNDED;
use serde::Serialize;
use simplelog::{ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger};
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

mod capture;
mod hook;
mod mapping;
mod ports;
mod protocol;
mod session;

use capture::{run_capture, CaptureOutcome};
use hook::TerminalHook;
use mapping::{KeyIndex, MappingTable, NUM_KEYS};
use ports::PortEntry;
use protocol::{Acknowledged, Connection, SyncError, ACK_ATTEMPTS, BAUD_RATE};
use session::{parse_assignment, parse_menu_line, MenuCommand};

#[derive(Parser)]
#[command(name = "macropad")]
#[command(version)]
#[command(about = "Macro pad configurator: assign keyboard shortcuts to nine keys over serial")]
#[command(
    long_about = "Configure a nine-key serial macro pad.\n\nCapture a shortcut for each key from your own keyboard, then push the whole mapping to the pad and wait for it to answer OK."
)]
struct Cli {
    /// More diagnostics on stderr, repeat for debug and trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write diagnostics to this file
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports {
        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive session: connect, capture shortcuts key by key, save to the pad
    Program {
        /// Serial port to connect to on start (e.g. /dev/ttyACM0 or COM3)
        #[arg(long, short)]
        port: Option<String>,

        /// Baud rate
        #[arg(long, default_value_t = BAUD_RATE)]
        baud: u32,

        /// Lines to read while waiting for the pad's OK
        #[arg(long, default_value_t = ACK_ATTEMPTS, value_parser = parse_attempts)]
        attempts: usize,
    },

    /// Send a mapping to the pad without interaction
    Send {
        /// Serial port of the pad
        #[arg(long, short, required_unless_present = "dry_run")]
        port: Option<String>,

        /// Key assignment, repeatable (e.g. -k 1=ctrl+c -k 2=ctrl+v); unlisted keys stay empty
        #[arg(short = 'k', long = "key", value_name = "N=CHORD", value_parser = parse_assignment)]
        keys: Vec<(KeyIndex, String)>,

        /// Baud rate
        #[arg(long, default_value_t = BAUD_RATE)]
        baud: u32,

        /// Lines to read while waiting for the pad's OK
        #[arg(long, default_value_t = ACK_ATTEMPTS, value_parser = parse_attempts)]
        attempts: usize,

        /// Print the command that would be sent and exit
        #[arg(long)]
        dry_run: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a shell completion script
    Completions {
        /// Shell to generate for
        shell: Shell,
    },
}

fn parse_attempts(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("attempts must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Terminal level: `base` raised one step per `-v`.
fn log_level(base: LevelFilter, verbosity: u8) -> LevelFilter {
    const LEVELS: [LevelFilter; 4] = [
        LevelFilter::Warn,
        LevelFilter::Info,
        LevelFilter::Debug,
        LevelFilter::Trace,
    ];
    let start = LEVELS.iter().position(|&l| l == base).unwrap_or(0);
    LEVELS[(start + verbosity as usize).min(LEVELS.len() - 1)]
}

fn init_logging(level: LevelFilter, log_file: Option<&Path>) -> Result<()> {

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    if let Some(path) = log_file {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        loggers.push(WriteLogger::new(
            level.max(LevelFilter::Info),
            Config::default(),
            file,
        ));
    }
    CombinedLogger::init(loggers).context("Failed to initialize logging")?;
    Ok(())
}

/// Escape user text before it goes into console markup.
///
/// Brackets are escaped. A backslash run is doubled only where markup would
/// read it: before a bracket and at the end, where our closing tag follows.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut backslashes = 0;
    for c in s.chars() {
        match c {
            '\\' => backslashes += 1,
            '[' => {
                out.push_str(&"\\".repeat(backslashes * 2 + 1));
                out.push('[');
                backslashes = 0;
            }
            _ => {
                out.push_str(&"\\".repeat(backslashes));
                out.push(c);
                backslashes = 0;
            }
        }
    }
    out.push_str(&"\\".repeat(backslashes * 2));
    out
}

#[derive(Serialize)]
struct SendReport<'a> {
    port: Option<&'a str>,
    keys: &'a MappingTable,
    command: String,
    dry_run: bool,
    acknowledged_on_read: Option<usize>,
}

struct MacroPad {
    console: Console,
    table: MappingTable,
    connection: Option<Connection>,
    ports: Vec<PortEntry>,
    baud: u32,
    attempts: usize,
    /// Title of the most recent notification.
    last_notice: Option<String>,
}

impl MacroPad {
    fn new(baud: u32, attempts: usize) -> Self {
        Self {
            console: Console::new(),
            table: MappingTable::new(),
            connection: None,
            ports: Vec::new(),
            baud,
            attempts,
            last_notice: None,
        }
    }

    fn print_banner(&self) {
        self.console.print("");
        self.console.print(
            "[bold #ff6b6b]╔═══════════════════════════════════════════════════════════════╗[/]",
        );
        self.console.print(
            "[bold #ff6b6b]║[/][bold #4ecdc4]  ███╗   ███╗ █████╗  ██████╗██████╗  ██████╗                  [/][bold #ff6b6b]║[/]",
        );
        self.console.print(
            "[bold #ff6b6b]║[/][bold #4ecdc4]  ████╗ ████║██╔══██╗██╔════╝██╔══██╗██╔═══██╗                 [/][bold #ff6b6b]║[/]",
        );
        self.console.print(
            "[bold #ff6b6b]║[/][bold #4ecdc4]  ██╔████╔██║███████║██║     ██████╔╝██║   ██║                 [/][bold #ff6b6b]║[/]",
        );
        self.console.print(
            "[bold #ff6b6b]║[/][bold #4ecdc4]  ██║╚██╔╝██║██╔══██║██║     ██╔══██╗██║   ██║                 [/][bold #ff6b6b]║[/]",
        );
        self.console.print(
            "[bold #ff6b6b]║[/][bold #4ecdc4]  ██║ ╚═╝ ██║██║  ██║╚██████╗██║  ██║╚██████╔╝                 [/][bold #ff6b6b]║[/]",
        );
        self.console.print(
            "[bold #ff6b6b]║[/][bold #4ecdc4]  ╚═╝     ╚═╝╚═╝  ╚═╝ ╚═════╝╚═╝  ╚═╝ ╚═════╝                  [/][bold #ff6b6b]║[/]",
        );
        self.console.print(
            "[bold #ff6b6b]║[/]                                                               [bold #ff6b6b]║[/]",
        );
        self.console.print(
            "[bold #ff6b6b]║[/]   [dim #95a5a6]Macro Pad Configurator[/] [bold #e74c3c]◆[/] [dim #95a5a6]9 keys over serial[/]                  [bold #ff6b6b]║[/]",
        );
        self.console.print(
            "[bold #ff6b6b]╚═══════════════════════════════════════════════════════════════╝[/]",
        );
        self.console.print("");
    }

    /// Boxed one-line notification; `color` is the frame color.
    fn notify(&mut self, color: &str, icon: &str, title: &str, message: &str) {
        self.last_notice = Some(title.to_string());
        self.console.print(&format!(
            "  [bold {color}]╭────────────────────────────────────────────────────────────╮[/]"
        ));
        self.console.print(&format!(
            "  [bold {color}]│[/]  [bold {color}]{icon}[/]  [bold white]{}[/]",
            escape(title)
        ));
        self.console.print(&format!(
            "  [bold {color}]╰────────────────────────────────────────────────────────────╯[/]"
        ));
        if !message.is_empty() {
            self.console
                .print(&format!("  [#95a5a6]{}[/]", escape(message)));
        }
        self.console.print("");
    }

    fn notify_error(&mut self, title: &str, message: &str) {
        self.notify("#e74c3c", "✗", title, message);
    }

    fn notify_info(&mut self, title: &str, message: &str) {
        self.notify("#3498db", "●", title, message);
    }

    fn notify_success(&mut self, title: &str, message: &str) {
        self.notify("#2ecc71", "✓", title, message);
    }

    /// The pad as a 3x3 grid, key 1 top-left.
    fn print_key_grid(&self) {
        fn center(s: &str, width: usize) -> String {
            let len = s.chars().count();
            if len >= width {
                s.chars().take(width).collect()
            } else {
                let pad = width - len;
                let left_pad = pad / 2;
                let right_pad = pad - left_pad;
                format!("{}{}{}", " ".repeat(left_pad), s, " ".repeat(right_pad))
            }
        }

        self.console.print(
            "[bold #9b59b6]┌─────────────────────────────────────────────────────────────────┐[/]",
        );
        self.console.print(
            "[bold #9b59b6]│[/]                  [bold white]YOUR KEY CONFIGURATION[/]                         [bold #9b59b6]│[/]",
        );
        self.console.print(
            "[bold #9b59b6]└─────────────────────────────────────────────────────────────────┘[/]",
        );
        self.console.print("");

        let keys: Vec<KeyIndex> = KeyIndex::all().collect();
        for row in keys.chunks(3) {
            let mut top = String::from("       ");
            let mut number = String::from("       ");
            let mut value = String::from("       ");
            let mut bottom = String::from("       ");
            for &key in row {
                let assigned = !self.table.get(key).is_empty();
                let color = if assigned { "#2ecc71" } else { "#7f8c8d" };
                let label = center(&self.table.label(key), 12);
                top.push_str(&format!("[{color}]╭────────────╮[/]  "));
                number.push_str(&format!(
                    "[{color}]│[/][dim]{}[/][{color}]│[/]  ",
                    center(&key.number().to_string(), 12)
                ));
                value.push_str(&format!(
                    "[{color}]│[/][bold white]{}[/][{color}]│[/]  ",
                    escape(&label)
                ));
                bottom.push_str(&format!("[{color}]╰────────────╯[/]  "));
            }
            self.console.print(&top);
            self.console.print(&number);
            self.console.print(&value);
            self.console.print(&bottom);
        }
        self.console.print("");
    }

    fn print_ports_table(&mut self) {
        if self.ports.is_empty() {
            self.notify_error("No devices found", "Plug in the macro pad, then refresh.");
            return;
        }

        let mut table = Table::new()
            .box_style(&ROUNDED)
            .header_style(Style::parse("bold #f1c40f").unwrap_or_default())
            .border_style(Style::parse("#3498db").unwrap_or_default())
            .with_column(Column::new("#"))
            .with_column(Column::new("Device"))
            .with_column(Column::new("Description"));

        for (i, port) in self.ports.iter().enumerate() {
            table.add_row_cells([
                markup::render_or_plain(&format!("[bold #f1c40f]{}[/]", i + 1)),
                markup::render_or_plain(&port.device),
                markup::render_or_plain(&port.description),
            ]);
        }
        self.console.print_renderable(&table);
        self.console.print("");
    }

    fn print_mapping_table(&self) {
        let mut table = Table::new()
            .box_style(&ROUNDED)
            .header_style(Style::parse("bold #f1c40f").unwrap_or_default())
            .border_style(Style::parse("#3498db").unwrap_or_default())
            .with_column(Column::new("Key"))
            .with_column(Column::new("Shortcut"));

        for (key, slot) in KeyIndex::all().zip(self.table.slots()) {
            let value = match slot.as_str() {
                "" => markup::render_or_plain("[dim]unassigned[/]"),
                value => markup::render_or_plain(&escape(value)),
            };
            table.add_row_cells([markup::render_or_plain(&key.number().to_string()), value]);
        }
        self.console.print_renderable(&table);
        self.console.print("");
    }

    fn refresh_ports(&mut self) -> Result<()> {
        self.ports = ports::list_ports().context("Failed to list serial ports")?;
        info!("Found {} serial port(s)", self.ports.len());
        for port in &self.ports {
            debug!("  {}", port.display_name());
        }
        Ok(())
    }

    fn connect(&mut self, device: &str) -> Result<()> {
        // Replacing the handle closes any previous session.
        self.connection = None;
        let connection = ports::connect(device, self.baud)
            .with_context(|| format!("Failed to open serial port {device}"))?;
        self.connection = Some(connection.with_ack_attempts(self.attempts));
        info!("Connected to {device} at {} baud", self.baud);
        Ok(())
    }

    fn save(&mut self) -> Result<Acknowledged, SyncError> {
        protocol::save(&self.table, self.connection.as_mut())
    }

    /// Report a save result the way the interactive session shows it.
    fn report_save(&mut self, result: &Result<Acknowledged, SyncError>) {
        match result {
            Ok(ack) => {
                let when = chrono::Local::now().format("%H:%M:%S");
                self.notify_success(
                    "Key mappings updated.",
                    &format!("Device answered OK on read {} at {when}.", ack.attempt),
                );
            }
            Err(SyncError::NotConnected) => {
                self.notify_error("Device not connected.", "Connect to the pad first.");
            }
            Err(e @ SyncError::Transport(_)) => {
                error!("{e}");
                self.notify_error("Serial Error", &e.to_string());
            }
            Err(e @ SyncError::NoAcknowledgement { .. }) => {
                warn!("{e}");
                self.notify_error(
                    "Device did not confirm update.",
                    "Run with -v to see what the device sent.",
                );
            }
        }
    }

    fn capture_key(&mut self, key: KeyIndex) -> Result<CaptureOutcome> {
        self.notify_info(
            &format!("Assign Key for Button {}", key.number()),
            "Press a key or shortcut. Enter = OK, Esc = Cancel.",
        );

        let mut hook = TerminalHook::new();
        let mut stdout = io::stdout();
        let outcome = run_capture(&mut self.table, key, &mut hook, |candidate| {
            let _ = execute!(
                stdout,
                cursor::MoveToColumn(0),
                terminal::Clear(terminal::ClearType::CurrentLine),
                style::Print(format!("    Captured: {candidate}"))
            );
        })
        .context("Keyboard capture failed")?;
        drop(hook);

        self.console.print("");
        match &outcome {
            CaptureOutcome::Assigned { key, value } => {
                info!("{key} set to {value}");
                self.console.print(&format!(
                    "  [bold #2ecc71]✓[/] {key} → [bold white]{}[/]",
                    escape(value)
                ));
            }
            CaptureOutcome::Unchanged { key } => {
                self.console
                    .print(&format!("  [dim]Nothing captured, {key} unchanged[/]"));
            }
            CaptureOutcome::Cancelled { key } => {
                self.console
                    .print(&format!("  [dim]Cancelled, {key} unchanged[/]"));
            }
        }
        self.console.print("");
        Ok(outcome)
    }

    fn print_menu_help(&self) {
        self.console.print("  [bold #f39c12]Commands:[/]");
        self.console
            .print("    [bold #3498db]r[/]        [#95a5a6]Refresh the port list[/]");
        self.console
            .print("    [bold #3498db]c N[/]      [#95a5a6]Connect to port N from the list[/]");
        self.console
            .print("    [bold #3498db]1-9[/]      [#95a5a6]Capture a shortcut for that key[/]");
        self.console
            .print("    [bold #3498db]l[/]        [#95a5a6]Show the current mapping[/]");
        self.console
            .print("    [bold #3498db]s[/]        [#95a5a6]Save to device[/]");
        self.console
            .print("    [bold #3498db]q[/]        [#95a5a6]Quit[/]");
        self.console.print("");
    }

    fn refresh_and_show(&mut self) {
        match self.refresh_ports() {
            Ok(()) => self.print_ports_table(),
            Err(e) => {
                error!("{e:#}");
                self.notify_error("Failed to list serial ports.", &format!("{e:#}"));
            }
        }
    }

    fn connect_and_report(&mut self, device: &str) {
        match self.connect(device) {
            Ok(()) => self.notify_success(&format!("Connected to {device}"), ""),
            Err(e) => {
                error!("{e:#}");
                self.notify_error("Connection Failed", &format!("{e:#}"));
            }
        }
    }

    /// Run one menu command; `false` ends the session.
    fn handle(&mut self, command: MenuCommand) -> bool {
        match command {
            MenuCommand::Refresh => self.refresh_and_show(),
            MenuCommand::Connect(number) => match self.ports.get(number.wrapping_sub(1)) {
                Some(port) => {
                    let device = port.device.clone();
                    self.connect_and_report(&device);
                }
                None => self.notify_error("Please select a device.", "Use a number from the port list (r to refresh)."),
            },
            MenuCommand::Assign(key) => {
                if self.connection.is_none() {
                    self.notify_error("Device not connected.", "Connect before programming buttons.");
                } else {
                    match self.capture_key(key) {
                        Ok(_) => self.print_key_grid(),
                        Err(e) => {
                            error!("{e:#}");
                            self.notify_error("Keyboard capture failed", &format!("{e:#}"));
                        }
                    }
                }
            }
            MenuCommand::Show => {
                self.print_key_grid();
                self.print_mapping_table();
            }
            MenuCommand::Save => {
                self.console
                    .print("  [bold #f1c40f]▸[/] Saving to device...");
                let result = self.save();
                self.report_save(&result);
            }
            MenuCommand::Help => self.print_menu_help(),
            MenuCommand::Quit => return false,
        }
        true
    }

    fn program(&mut self, port: Option<&str>) -> Result<()> {
        self.print_banner();

        match port {
            Some(device) => self.connect_and_report(device),
            None => self.refresh_and_show(),
        }
        self.print_key_grid();
        self.print_menu_help();

        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            let prompt = match &self.connection {
                Some(conn) => format!("macropad ({})> ", conn.port_name()),
                None => "macropad> ".to_string(),
            };
            print!("{prompt}");
            io::stdout().flush()?;

            line.clear();
            if stdin.lock().read_line(&mut line)? == 0 {
                self.console.print("");
                break;
            }

            match parse_menu_line(&line) {
                Ok(command) => {
                    if !self.handle(command) {
                        break;
                    }
                }
                Err(session::MenuError::Empty) => {}
                Err(e) => self
                    .console
                    .print(&format!("  [#e74c3c]✗[/] {}", escape(&e.to_string()))),
            }
        }

        if self.table.assigned_count() > 0 {
            self.console
                .print("  [#95a5a6]Mappings not saved with 's' are discarded on exit.[/]");
        }
        Ok(())
    }

    fn list_ports(&mut self, json: bool) -> Result<()> {
        self.refresh_ports()?;
        if json {
            println!("{}", serde_json::to_string_pretty(&self.ports)?);
            return Ok(());
        }
        self.print_banner();
        self.print_ports_table();
        Ok(())
    }

    fn send(
        &mut self,
        port: Option<&str>,
        keys: &[(KeyIndex, String)],
        dry_run: bool,
        json: bool,
    ) -> Result<()> {
        for (key, chord) in keys {
            self.table.assign(*key, chord);
        }
        let command = self.table.command();

        if dry_run {
            info!("Dry run: {} of {NUM_KEYS} keys assigned", self.table.assigned_count());
            if json {
                let report = SendReport {
                    port,
                    keys: &self.table,
                    command,
                    dry_run: true,
                    acknowledged_on_read: None,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                self.print_key_grid();
                self.notify("#f39c12", "⚠", "DRY RUN - No changes will be made", "");
                self.console.print("  [#95a5a6]Would send:[/]");
                println!("{}", command.trim_end());
            }
            return Ok(());
        }

        let device = port.ok_or_else(|| anyhow!("--port is required unless --dry-run is given"))?;
        self.connect(device)?;
        if !json {
            self.print_key_grid();
            self.console
                .print(&format!("  [bold #f1c40f]▸[/] Sending to [bold]{}[/]...", escape(device)));
        }

        let result = self.save();
        if !json {
            self.report_save(&result);
        }
        let ack = result.with_context(|| format!("Save to {device} failed"))?;

        if json {
            let report = SendReport {
                port: Some(device),
                keys: &self.table,
                command,
                dry_run: false,
                acknowledged_on_read: Some(ack.attempt),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    // Device traffic is shown by default while programming the pad.
    let base = match cli.command {
        Commands::Program { .. } | Commands::Send { .. } => LevelFilter::Info,
        Commands::Ports { .. } | Commands::Completions { .. } => LevelFilter::Warn,
    };
    init_logging(log_level(base, cli.verbose), cli.log_file.as_deref())?;

    match cli.command {
        Commands::Ports { json } => {
            MacroPad::new(BAUD_RATE, ACK_ATTEMPTS).list_ports(json)?;
        }
        Commands::Program {
            port,
            baud,
            attempts,
        } => {
            MacroPad::new(baud, attempts).program(port.as_deref())?;
        }
        Commands::Send {
            port,
            keys,
            baud,
            attempts,
            dry_run,
            json,
        } => {
            MacroPad::new(baud, attempts).send(port.as_deref(), &keys, dry_run, json)?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "macropad", &mut io::stdout());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Port;

    /// In-memory pad: replies with fixed bytes, then times out.
    struct FakePort {
        reply: Vec<u8>,
        fail_write: bool,
    }

    impl io::Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.reply.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
            }
            let n = self.reply.len().min(buf.len());
            buf[..n].copy_from_slice(&self.reply[..n]);
            self.reply.drain(..n);
            Ok(n)
        }
    }

    impl io::Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_write {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "port gone"));
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn connected_pad(reply: &[u8], fail_write: bool) -> MacroPad {
        let mut pad = MacroPad::new(BAUD_RATE, ACK_ATTEMPTS);
        let port: Box<dyn Port> = Box::new(FakePort {
            reply: reply.to_vec(),
            fail_write,
        });
        pad.connection = Some(Connection::new("/dev/ttyFAKE", port));
        pad
    }

    fn key(n: usize) -> KeyIndex {
        KeyIndex::from_number(n).unwrap()
    }

    fn missing_port() -> PortEntry {
        PortEntry {
            device: "/dev/macropad-does-not-exist".to_string(),
            description: "n/a".to_string(),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn attempts_must_be_positive() {
        assert_eq!(parse_attempts("10"), Ok(10));
        assert!(parse_attempts("0").unwrap_err().contains("at least 1"));
        assert!(parse_attempts("ten").is_err());
    }

    #[test]
    fn escape_protects_markup_brackets() {
        assert_eq!(escape("CTRL+["), "CTRL+\\[");
        assert_eq!(escape("F5"), "F5");
    }

    #[test]
    fn escape_keeps_trailing_backslash_out_of_the_closing_tag() {
        assert_eq!(escape("CTRL+\\"), "CTRL+\\\\");
        assert_eq!(escape("A\\B"), "A\\B");

        for value in ["CTRL+\\", "CTRL+[", "A\\B", "\\[b]", "[bold]X"] {
            let markup = format!("[bold white]{}[/] tail", escape(value));
            let rendered = markup::render_or_plain(&markup);
            assert_eq!(rendered.plain(), format!("{value} tail"), "markup {markup:?}");
        }
    }

    #[test]
    fn log_level_steps_up_from_base() {
        assert_eq!(log_level(LevelFilter::Warn, 0), LevelFilter::Warn);
        assert_eq!(log_level(LevelFilter::Warn, 1), LevelFilter::Info);
        assert_eq!(log_level(LevelFilter::Info, 0), LevelFilter::Info);
        assert_eq!(log_level(LevelFilter::Info, 1), LevelFilter::Debug);
        assert_eq!(log_level(LevelFilter::Info, 9), LevelFilter::Trace);
    }

    #[test]
    fn save_without_connection_reports_not_connected() {
        let mut pad = MacroPad::new(BAUD_RATE, ACK_ATTEMPTS);
        assert!(matches!(pad.save(), Err(SyncError::NotConnected)));
    }

    #[test]
    fn connect_failure_leaves_handle_empty() {
        let mut pad = MacroPad::new(BAUD_RATE, ACK_ATTEMPTS);
        let err = pad.connect("/dev/macropad-does-not-exist").unwrap_err();
        assert!(err.to_string().contains("Failed to open serial port"));
        assert!(pad.connection.is_none());
    }

    #[test]
    fn assign_is_refused_while_disconnected() {
        let mut pad = MacroPad::new(BAUD_RATE, ACK_ATTEMPTS);
        assert!(pad.handle(MenuCommand::Assign(key(1))));
        assert_eq!(pad.table, MappingTable::new());
        assert_eq!(pad.last_notice.as_deref(), Some("Device not connected."));
    }

    #[test]
    fn save_while_disconnected_keeps_session_running() {
        let mut pad = MacroPad::new(BAUD_RATE, ACK_ATTEMPTS);
        assert!(pad.handle(MenuCommand::Save));
        assert_eq!(pad.last_notice.as_deref(), Some("Device not connected."));
    }

    #[test]
    fn unlisted_port_number_leaves_connection_alone() {
        let mut pad = connected_pad(b"", false);
        pad.ports = vec![missing_port()];

        for number in [0, 2, usize::MAX] {
            pad.last_notice = None;
            assert!(pad.handle(MenuCommand::Connect(number)));
            assert_eq!(pad.last_notice.as_deref(), Some("Please select a device."));
            assert!(pad.connection.is_some(), "connection dropped for {number}");
        }
    }

    #[test]
    fn connect_failure_is_reported_and_session_continues() {
        let mut pad = connected_pad(b"", false);
        pad.ports = vec![missing_port()];

        assert!(pad.handle(MenuCommand::Connect(1)));
        assert_eq!(pad.last_notice.as_deref(), Some("Connection Failed"));
        assert!(pad.connection.is_none());
    }

    #[test]
    fn refresh_never_ends_session() {
        let mut pad = MacroPad::new(BAUD_RATE, ACK_ATTEMPTS);
        assert!(pad.handle(MenuCommand::Refresh));
    }

    #[test]
    fn write_failure_is_reported_and_session_continues() {
        let mut pad = connected_pad(b"OK\n", true);
        assert!(pad.handle(MenuCommand::Save));
        assert_eq!(pad.last_notice.as_deref(), Some("Serial Error"));
        assert!(pad.connection.is_some());
    }

    #[test]
    fn missing_ack_is_reported_and_session_continues() {
        let mut pad = connected_pad(b"ERR\r\nbusy\r\n", false);
        pad.table.assign(key(2), "CTRL+V");

        assert!(pad.handle(MenuCommand::Save));
        assert_eq!(
            pad.last_notice.as_deref(),
            Some("Device did not confirm update.")
        );
        assert_eq!(pad.table.get(key(2)), "CTRL+V");
    }

    #[test]
    fn acknowledged_save_reports_success() {
        let mut pad = connected_pad(b"Received\r\nOK\r\n", false);
        assert!(pad.handle(MenuCommand::Save));
        assert_eq!(pad.last_notice.as_deref(), Some("Key mappings updated."));
    }

    #[test]
    fn quit_ends_session() {
        let mut pad = MacroPad::new(BAUD_RATE, ACK_ATTEMPTS);
        assert!(!pad.handle(MenuCommand::Quit));
    }
}
