use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use markdown_duplex_config::{EditorState, PreferredMode};
use markdown_duplex_engine::{EditorSession, Mode, NodeKind, RichTextTree, Tag};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use std::{env, fs, io::stdout, path::PathBuf, process};

struct App {
    path: PathBuf,
    session: EditorSession,
    status: String,
}

impl App {
    fn new(path: PathBuf, initial_mode: Mode) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let mut session = EditorSession::new(initial_mode);
        session.set_value(&content, true);
        session.switch_to_mode(initial_mode, true)?;
        Ok(Self {
            path,
            session,
            status: String::from("m: switch mode | s: save | q: quit"),
        })
    }

    fn toggle_mode(&mut self) {
        let target = match self.session.mode() {
            Mode::Wysiwyg => Mode::Markdown,
            Mode::Markdown => Mode::Wysiwyg,
        };
        match self.session.switch_to_mode(target, false) {
            Ok(_) => {
                self.status = format!("switched to {} mode", mode_name(target));
                let state = EditorState::new(true, to_preferred(target));
                if let Err(e) = state.save() {
                    self.status = format!("mode switched, but state not saved: {e}");
                }
            }
            Err(e) => {
                self.status = format!("switch failed: {e}");
            }
        }
    }

    fn save(&mut self) {
        match fs::write(&self.path, self.session.get_value()) {
            Ok(()) => self.status = format!("saved {}", self.path.display()),
            Err(e) => self.status = format!("save failed: {e}"),
        }
    }

    fn content_lines(&self) -> Vec<String> {
        match self.session.mode() {
            Mode::Markdown => self
                .session
                .get_value()
                .split('\n')
                .map(str::to_string)
                .collect(),
            Mode::Wysiwyg => {
                let tree = self.session.tree();
                let mut lines = Vec::new();
                for &child in tree.children(tree.root()) {
                    render_block(tree, child, 0, &mut lines);
                }
                lines
            }
        }
    }
}

/// Block-styled plain-text preview of the rich-text tree.
fn render_block(
    tree: &RichTextTree,
    node: markdown_duplex_engine::NodeId,
    depth: usize,
    lines: &mut Vec<String>,
) {
    let indent = "  ".repeat(depth);
    let Some(n) = tree.get(node) else { return };
    match &n.kind {
        NodeKind::Text(text) => {
            if !text.trim().is_empty() {
                lines.push(format!("{indent}{text}"));
            }
        }
        NodeKind::Element(tag) => match tag {
            Tag::Heading(level) => {
                let marks = "#".repeat(*level as usize);
                lines.push(format!("{indent}{marks} {}", tree.flattened_text(node)));
                lines.push(String::new());
            }
            Tag::Paragraph => {
                for line in tree.flattened_text(node).lines() {
                    lines.push(format!("{indent}{line}"));
                }
                lines.push(String::new());
            }
            Tag::List { .. } => {
                for &item in tree.children(node) {
                    render_block(tree, item, depth, lines);
                }
                if depth == 0 {
                    lines.push(String::new());
                }
            }
            Tag::ListItem => {
                let mut text = String::new();
                for &child in tree.children(node) {
                    if matches!(tree.tag(child), Some(Tag::List { .. })) {
                        continue;
                    }
                    text.push_str(&tree.flattened_text(child));
                }
                lines.push(format!("{indent}• {}", text.trim()));
                for &child in tree.children(node) {
                    if matches!(tree.tag(child), Some(Tag::List { .. })) {
                        render_block(tree, child, depth + 1, lines);
                    }
                }
            }
            Tag::CodeBlock => {
                let lang = tree.attr(node, "lang").unwrap_or("");
                lines.push(format!("{indent}```{lang}"));
                for line in tree.flattened_text(node).lines() {
                    lines.push(format!("{indent}{line}"));
                }
                lines.push(format!("{indent}```"));
                lines.push(String::new());
            }
            Tag::BlockQuote => {
                for line in tree.flattened_text(node).lines() {
                    lines.push(format!("{indent}> {line}"));
                }
                lines.push(String::new());
            }
            Tag::Table => {
                for &section in tree.children(node) {
                    render_block(tree, section, depth, lines);
                }
                lines.push(String::new());
            }
            Tag::TableHead | Tag::TableRow => {
                let cells: Vec<String> = tree
                    .children(node)
                    .iter()
                    .map(|&c| tree.flattened_text(c))
                    .collect();
                lines.push(format!("{indent}| {} |", cells.join(" | ")));
            }
            Tag::Admonition => {
                let kind = tree.attr(node, "type").unwrap_or("note");
                let title = tree.attr(node, "title").unwrap_or("");
                if title.is_empty() {
                    lines.push(format!("{indent}[{kind}]"));
                } else {
                    lines.push(format!("{indent}[{kind}] {title}"));
                }
                for &child in tree.children(node) {
                    render_block(tree, child, depth + 1, lines);
                }
            }
            Tag::Rule => {
                lines.push(format!("{indent}────────"));
                lines.push(String::new());
            }
            _ => {
                for &child in tree.children(node) {
                    render_block(tree, child, depth, lines);
                }
            }
        },
    }
}

fn mode_name(mode: Mode) -> &'static str {
    match mode {
        Mode::Wysiwyg => "rich-text",
        Mode::Markdown => "markdown",
    }
}

fn to_preferred(mode: Mode) -> PreferredMode {
    match mode {
        Mode::Wysiwyg => PreferredMode::Wysiwyg,
        Mode::Markdown => PreferredMode::Markdown,
    }
}

fn from_preferred(mode: PreferredMode) -> Mode {
    match mode {
        PreferredMode::Wysiwyg => Mode::Wysiwyg,
        PreferredMode::Markdown => Mode::Markdown,
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <file.md>", args[0]);
        process::exit(1);
    }
    let path = PathBuf::from(&args[1]);
    if !path.exists() {
        eprintln!("Error: file '{}' not found", path.display());
        process::exit(1);
    }

    // Honor the persisted preference when there is a fresh one.
    let initial_mode = match EditorState::load() {
        Ok(Some(state)) if state.enabled => from_preferred(state.mode),
        _ => Mode::Wysiwyg,
    };

    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(path, initial_mode)?;
    let result = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = result {
        println!("{err:?}");
    }
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()>
where
    <B as ratatui::backend::Backend>::Error: Send + Sync + 'static,
{
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') => return Ok(()),
                KeyCode::Char('m') | KeyCode::Tab => app.toggle_mode(),
                KeyCode::Char('s') => app.save(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(f.area());

    let title = format!(
        " {} — {} mode ",
        app.path.display(),
        mode_name(app.session.mode())
    );
    let body: Vec<Line> = app
        .content_lines()
        .iter()
        .map(|line| Line::from(vec![Span::raw(line.clone())]))
        .collect();
    let content = Paragraph::new(body)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false });
    f.render_widget(content, chunks[0]);

    let help = Paragraph::new(Line::from(vec![Span::styled(
        app.status.clone(),
        Style::default().fg(Color::DarkGray),
    )]))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(help, chunks[1]);
}
