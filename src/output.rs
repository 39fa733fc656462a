//! Terminal output
//!
//! Progress of a running session and the `check`/`config` reports,
//! rendered with `console` styles.

use console::Style;
use parking_lot::Mutex;
use std::io::Write;
use std::path::Path;

use reality_parser_core::config::Config;
use reality_parser_core::session::SessionRecord;
use reality_parser_core::ProgressSink;

const BAR_WIDTH: usize = 30;

/// Output formatter for CLI results
pub struct OutputFormatter {
    blue: Style,
    green: Style,
    yellow: Style,
    red: Style,
    bold: Style,
}

impl Default for OutputFormatter {
    fn default() -> Self {
        Self {
            blue: Style::new().blue(),
            green: Style::new().green(),
            yellow: Style::new().yellow(),
            red: Style::new().red(),
            bold: Style::new().bold(),
        }
    }
}

impl OutputFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print_config(&self, path: Option<&Path>, config: &Config) {
        println!();
        println!("{}", self.bold.apply_to("Configuration:"));
        match path {
            Some(path) => println!("File: {}", self.green.apply_to(path.display())),
            None => println!("File: {}", self.yellow.apply_to("none (built-in defaults)")),
        }
        println!();
        println!("{}", self.bold.apply_to("Engine"));
        println!("  program:     {}", self.blue.apply_to(&config.engine.program));
        if !config.engine.args.is_empty() {
            println!("  args:        {}", config.engine.args.join(" "));
        }
        println!("  scratch dir: {}", config.engine.scratch_dir.display());
        println!();
        println!("{}", self.bold.apply_to("Defaults"));
        println!("  detail:      {}", config.defaults.detail);
        println!("  ordering:    {}", config.defaults.ordering);
        println!("  sensitivity: {}", config.defaults.sensitivity);
    }

    pub fn print_check(&self, program: &str, supported: bool) {
        if supported {
            println!(
                "{} reconstruction engine {} is available",
                self.green.apply_to("✓"),
                self.bold.apply_to(program)
            );
        } else {
            println!(
                "{} reconstruction engine {} was not found on PATH",
                self.red.apply_to("✗"),
                self.bold.apply_to(program)
            );
        }
    }

    pub fn print_started(&self, record: &SessionRecord, dry_run: bool) {
        println!(
            "{} {} → {}{}",
            self.bold.apply_to("Reconstructing"),
            record.input_dir.display(),
            self.green.apply_to(record.request.destination.display()),
            if dry_run {
                self.yellow.apply_to(" (dry run)").to_string()
            } else {
                String::new()
            }
        );
        println!(
            "{}",
            self.blue.apply_to(format!(
                "detail={} ordering={} sensitivity={}",
                record.request.detail,
                record.config.sample_ordering,
                record.config.feature_sensitivity
            ))
        );
    }

    pub fn print_error(&self, message: &str) {
        eprintln!("{} {}", self.red.apply_to("Error:"), message);
    }
}

/// Progress bar on stdout for one session
pub struct ConsoleProgress {
    formatter: OutputFormatter,
    dry_run: bool,
    last_percent: Mutex<Option<u32>>,
}

impl ConsoleProgress {
    pub fn new(dry_run: bool) -> Self {
        Self {
            formatter: OutputFormatter::new(),
            dry_run,
            last_percent: Mutex::new(None),
        }
    }

    fn finish_line(&self) {
        if self.last_percent.lock().take().is_some() {
            println!();
        }
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_progress(&self, fraction: f64) {
        let percent = (fraction * 100.0).round() as u32;
        {
            let mut last = self.last_percent.lock();
            if *last == Some(percent) {
                return;
            }
            *last = Some(percent);
        }
        let filled = (fraction * BAR_WIDTH as f64).round() as usize;
        let bar = format!(
            "{}{}",
            "█".repeat(filled.min(BAR_WIDTH)),
            "░".repeat(BAR_WIDTH - filled.min(BAR_WIDTH))
        );
        print!("\r{} {:>3}%", self.formatter.blue.apply_to(bar), percent);
        let _ = std::io::stdout().flush();
    }

    fn on_completed(&self) {
        self.finish_line();
        if self.dry_run {
            println!("{}", self.formatter.green.apply_to("Dry run complete, nothing written."));
        } else {
            println!("{}", self.formatter.green.apply_to("Model written."));
        }
    }

    fn on_failed(&self, message: &str) {
        self.finish_line();
        self.formatter.print_error(message);
    }

    fn on_cancelled(&self) {
        self.finish_line();
        println!("{}", self.formatter.yellow.apply_to("Reconstruction cancelled."));
    }
}
