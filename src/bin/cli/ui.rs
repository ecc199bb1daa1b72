use std::io::IsTerminal;
use std::path::Path;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use nu_ansi_term::{Color, Style};

/// Terminal color scheme.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum Theme {
    Auto,
    Light,
    Dark,
    Plain,
}

/// Severity of a one-line message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    Note,
    Done,
    Warn,
}

/// One compiled pattern position as shown by `check`.
pub struct PositionLine<'a> {
    pub position: usize,
    pub quantifier: &'a str,
    pub predicate: &'a str,
}

/// One matched node as shown by `query`.
pub struct MatchLine<'a> {
    pub id: u32,
    pub depth: u32,
    pub frame: &'a str,
}

/// Text renderer for query results and diagnostics.
///
/// Quiet mode drops color and spinners so that only plain lines reach stdout;
/// JSON output runs in quiet mode.
pub struct Ui {
    styles: Styles,
    color: bool,
    quiet: bool,
}

impl Ui {
    pub fn new(theme: Theme, quiet: bool) -> Self {
        let color = !quiet && theme != Theme::Plain && std::io::stdout().is_terminal();
        #[cfg(windows)]
        if color {
            let _ = nu_ansi_term::enable_ansi_support();
        }
        let styles = match theme {
            Theme::Plain => Styles::default(),
            Theme::Light => Styles::light(),
            Theme::Dark | Theme::Auto => Styles::dark(),
        };
        Self {
            styles,
            color,
            quiet,
        }
    }

    fn paint(&self, style: Style, text: impl AsRef<str>) -> String {
        if self.color {
            style.paint(text.as_ref()).to_string()
        } else {
            text.as_ref().to_string()
        }
    }

    fn title(&self, title: &str) {
        println!("{}", self.paint(self.styles.title, format!("{title}:")));
    }

    /// Aligned `label  value` block under a title.
    pub fn fields(&self, title: &str, rows: &[(&str, String)]) {
        self.title(title);
        let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
        for (label, value) in rows {
            let label = format!("{label:<width$}");
            println!("  {}  {value}", self.paint(self.styles.label, label));
        }
    }

    /// Matched nodes, indented by call depth, ids right of the frame.
    pub fn match_tree<'a>(&self, nodes: impl IntoIterator<Item = MatchLine<'a>>) {
        self.title("Matched nodes");
        for node in nodes {
            let indent = "  ".repeat(node.depth as usize + 1);
            println!(
                "{indent}{} {}",
                self.paint(self.styles.frame, node.frame),
                self.paint(self.styles.dim, format!("#{}", node.id))
            );
        }
    }

    /// Compiled positions as `[i] q predicate`.
    pub fn pattern<'a>(&self, positions: impl IntoIterator<Item = PositionLine<'a>>) {
        let positions: Vec<PositionLine<'a>> = positions.into_iter().collect();
        if positions.is_empty() {
            return;
        }
        self.title("Pattern");
        for line in positions {
            println!(
                "  [{}] {} {}",
                line.position,
                self.paint(self.styles.quantifier, line.quantifier),
                line.predicate
            );
        }
    }

    /// Plain entries under a title; nothing is printed for an empty list.
    pub fn entries(&self, title: &str, entries: &[String]) {
        if entries.is_empty() {
            return;
        }
        self.title(title);
        for entry in entries {
            println!("  {entry}");
        }
    }

    /// One-line message. Warnings go to stderr.
    pub fn message(&self, level: Level, text: &str) {
        let (style, tag) = match level {
            Level::Note => (self.styles.note, "note"),
            Level::Done => (self.styles.done, "ok"),
            Level::Warn => (self.styles.warn, "warning"),
        };
        let line = if self.quiet {
            text.to_string()
        } else {
            format!("{}: {text}", self.paint(style, tag))
        };
        match level {
            Level::Warn => eprintln!("{line}"),
            Level::Note | Level::Done => println!("{line}"),
        }
    }

    /// Spinner shown while a graph file is read.
    pub fn loading(&self, path: &Path) -> Loading<'_> {
        let label = format!("loading {}", path.display());
        let spinner = (!self.quiet).then(|| {
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            let bar = ProgressBar::new_spinner().with_style(style);
            bar.set_message(label.clone());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        Loading {
            ui: self,
            label,
            start: Instant::now(),
            spinner,
        }
    }
}

/// Running graph load; reports an abort when dropped before [`Loading::done`].
pub struct Loading<'a> {
    ui: &'a Ui,
    label: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl Loading<'_> {
    pub fn done(mut self) -> Duration {
        if let Some(bar) = self.spinner.take() {
            bar.finish_and_clear();
        }
        self.label.clear();
        self.start.elapsed()
    }
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        if self.label.is_empty() {
            return;
        }
        if let Some(bar) = self.spinner.take() {
            bar.finish_and_clear();
        }
        let elapsed = format_duration(self.start.elapsed());
        self.ui
            .message(Level::Warn, &format!("{} aborted after {elapsed}", self.label));
    }
}

pub fn format_duration(duration: Duration) -> String {
    let micros = duration.as_micros();
    match micros {
        0..=999 => format!("{micros}µs"),
        1_000..=999_999 => format!("{:.1}ms", duration.as_secs_f64() * 1e3),
        _ => format!("{:.2}s", duration.as_secs_f64()),
    }
}

#[derive(Clone, Copy, Default)]
struct Styles {
    title: Style,
    label: Style,
    frame: Style,
    dim: Style,
    quantifier: Style,
    note: Style,
    done: Style,
    warn: Style,
}

impl Styles {
    fn dark() -> Self {
        Self {
            title: Style::new().bold().underline(),
            label: Style::new().fg(Color::Cyan),
            frame: Style::new().fg(Color::LightGreen),
            dim: Style::new().fg(Color::DarkGray),
            quantifier: Style::new().fg(Color::LightMagenta).bold(),
            note: Style::new().fg(Color::LightBlue),
            done: Style::new().fg(Color::Green).bold(),
            warn: Style::new().fg(Color::Yellow).bold(),
        }
    }

    fn light() -> Self {
        Self {
            title: Style::new().bold().underline(),
            label: Style::new().fg(Color::Blue),
            frame: Style::new().fg(Color::Green),
            dim: Style::new().fg(Color::DarkGray),
            quantifier: Style::new().fg(Color::Magenta).bold(),
            note: Style::new().fg(Color::Blue),
            done: Style::new().fg(Color::Green).bold(),
            warn: Style::new().fg(Color::Red).bold(),
        }
    }
}
