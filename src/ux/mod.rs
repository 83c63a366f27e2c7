use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, IsTerminal, Write};
use std::time::{Duration, Instant};

use crate::model::{ChapterList, ProjectSummary, ReportProject, VariableMap};
use crate::placeholder::{Placeholders, Segment};
use crate::wizard::ChapterView;

/// What the user wants to do with the draft on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Accept,
    Revise(String),
    Regenerate,
    /// Set or change one variable value.
    Edit(String),
    Quit,
}

pub fn parse_action(line: &str) -> Option<Action> {
    let line = line.trim();
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((c, r)) => (c, r.trim()),
        None => (line, ""),
    };
    match cmd.to_lowercase().as_str() {
        "a" | "accept" => Some(Action::Accept),
        "g" | "regenerate" => Some(Action::Regenerate),
        "q" | "quit" => Some(Action::Quit),
        "r" | "revise" => Some(Action::Revise(rest.to_string())),
        "e" | "edit" => Some(Action::Edit(rest.to_string())),
        _ => None,
    }
}

pub fn show_chapter(view: &ChapterView, placeholders: &Placeholders) {
    let Some(title) = view.title.as_deref() else {
        return;
    };
    println!(
        "\n{}",
        format!("━━━ Chapter {}/{}: {} ━━━", view.index + 1, view.chapter_count, title).bold()
    );
    let Some(text) = view.rendered.as_deref() else {
        println!("{}", "(no draft yet)".dimmed());
        return;
    };
    let mut out = String::with_capacity(text.len());
    for seg in placeholders.segments(text) {
        match seg {
            Segment::Text(t) => out.push_str(t),
            Segment::Placeholder { token, .. } => {
                out.push_str(&token.yellow().bold().to_string());
            }
        }
    }
    println!("{out}\n");
    if !view.unresolved.is_empty() {
        println!(
            "{} {}",
            "Needs input:".yellow().bold(),
            view.unresolved.join(", ")
        );
    }
}

pub fn show_menu() {
    println!(
        "{}  {}  {}  {}  {}",
        "[a]ccept".green().bold(),
        "[r]evise <feedback>".cyan().bold(),
        "re[g]enerate".magenta().bold(),
        "[e]dit <key>".yellow().bold(),
        "[q]uit".red().bold()
    );
}

pub fn show_projects(user_id: &str, list: &[ProjectSummary], chapter_count: usize) {
    println!("\n{}", format!("Reports for {user_id}").bold());
    if list.is_empty() {
        println!("(none)");
        return;
    }
    for p in list {
        let updated = p
            .updated_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        let progress = format!("{}/{}", p.drafted_sections.min(chapter_count), chapter_count);
        let progress = if p.drafted_sections >= chapter_count {
            progress.green().bold()
        } else {
            progress.yellow()
        };
        println!("  {:<40} {:>7}  {}", p.idea_title, progress, updated.dimmed());
    }
}

pub fn show_progress(idea: &str, chapters: &ChapterList, project: &ReportProject, placeholders: &Placeholders) {
    println!("\n{}", idea.bold());
    let gap = project.first_gap(chapters);
    for (i, title) in chapters.iter().enumerate() {
        let (mark, label) = match project.draft(title) {
            Some(text) => {
                let open = placeholders.unresolved(text, &project.variables);
                if open.is_empty() {
                    ("✓".green().bold(), title.normal())
                } else {
                    ("✓".green().bold(), format!("{title}  ({} open)", open.len()).normal())
                }
            }
            None if i == gap => ("→".cyan().bold(), title.cyan()),
            None => ("·".dimmed(), title.dimmed()),
        };
        println!("  {mark} {:>2}. {label}", i + 1);
    }
}

pub fn confirm(prompt: &str) -> bool {
    print!("{} [y/N]: ", prompt);
    let _ = io::stdout().flush();
    let mut s = String::new();
    if io::stdin().read_line(&mut s).is_ok() {
        let ans = s.trim().to_lowercase();
        ans == "y" || ans == "yes"
    } else {
        false
    }
}

/// `None` on end of input.
pub fn prompt_line(prompt: &str) -> io::Result<Option<String>> {
    print!("{prompt} ");
    io::stdout().flush()?;
    let mut s = String::new();
    if io::stdin().read_line(&mut s)? == 0 {
        return Ok(None);
    }
    Ok(Some(s.trim().to_string()))
}

/// Ask for each key; blank answers are left out so the token stays visible.
pub fn ask_variables(keys: &[String]) -> io::Result<VariableMap> {
    let mut out = VariableMap::new();
    if keys.is_empty() {
        return Ok(out);
    }
    println!("{}", "Fill in values (leave blank to skip):".bold());
    for key in keys {
        match prompt_line(&format!("  {}:", key.yellow()))? {
            Some(v) if !v.is_empty() => {
                out.insert(key.clone(), v);
            }
            Some(_) => {}
            None => break,
        }
    }
    Ok(out)
}

/// Ask for a new value for `key`, showing the current one. `None` when the
/// answer is blank or input ended.
pub fn ask_value(key: &str, current: Option<&str>) -> io::Result<Option<String>> {
    let label = match current.filter(|c| !c.is_empty()) {
        Some(c) => format!("  {} [{}]:", key.yellow(), c.dimmed()),
        None => format!("  {}:", key.yellow()),
    };
    Ok(prompt_line(&label)?.filter(|v| !v.is_empty()))
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "error:".red().bold(), msg);
}

/// Spinner on stderr while a provider call runs. Disabled when stderr is not
/// a terminal or `NO_COLOR` is set.
pub struct Spinner {
    bar: Option<ProgressBar>,
    started: Instant,
}

impl Spinner {
    pub fn start(message: &str) -> Self {
        let enabled = io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();
        let bar = enabled.then(|| {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"])
                .template("{spinner} {msg} {elapsed:.dim}")
            {
                pb.set_style(style);
            }
            pb.set_message(message.to_string());
            pb.enable_steady_tick(Duration::from_millis(80));
            pb
        });
        Self { bar, started: Instant::now() }
    }

    pub fn finish(self) -> Duration {
        if let Some(pb) = self.bar {
            pb.finish_and_clear();
        }
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse_short_and_long_forms() {
        assert_eq!(parse_action("a"), Some(Action::Accept));
        assert_eq!(parse_action(" Accept "), Some(Action::Accept));
        assert_eq!(parse_action("g"), Some(Action::Regenerate));
        assert_eq!(parse_action("q"), Some(Action::Quit));
        assert_eq!(
            parse_action("r make it shorter please"),
            Some(Action::Revise("make it shorter please".into()))
        );
        assert_eq!(parse_action("r"), Some(Action::Revise(String::new())));
        assert_eq!(parse_action("e Loan Amount"), Some(Action::Edit("Loan Amount".into())));
        assert_eq!(parse_action("edit"), Some(Action::Edit(String::new())));
        assert_eq!(parse_action("x"), None);
        assert_eq!(parse_action(""), None);
    }
}
