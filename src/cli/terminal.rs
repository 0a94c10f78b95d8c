//! Line-oriented terminal front end: prompts, numbered pickers and the reply
//! sink used while a response is coming in.

use std::cell::RefCell;
use std::io::{self, BufRead, IsTerminal, Write};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::core::chooser::Chooser;
use crate::core::dispatcher::ReplySink;

/// How a line typed at a picker prompt is understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerInput {
    /// 0-based index into the items currently shown.
    Pick(usize),
    /// Narrow the list to items containing this text.
    Filter(String),
    Cancel,
    Invalid,
}

/// Numbers are 1-based as displayed. An empty line, `q` or end of input
/// backs out; any other text filters the list.
pub fn parse_picker_input(line: &str, shown: usize) -> PickerInput {
    let line = line.trim();
    if line.is_empty() || line.eq_ignore_ascii_case("q") {
        return PickerInput::Cancel;
    }
    match line.parse::<usize>() {
        Ok(n) if (1..=shown).contains(&n) => PickerInput::Pick(n - 1),
        Ok(_) => PickerInput::Invalid,
        Err(_) => PickerInput::Filter(line.to_string()),
    }
}

/// Parse `1,3 5-7` into 0-based indices, keeping the order given and
/// dropping repeats. Any malformed or out-of-range part rejects the line.
pub fn parse_multi_selection(line: &str, len: usize) -> Result<Vec<usize>, String> {
    let mut picked = Vec::new();
    for part in line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
    {
        let (start, end) = match part.split_once('-') {
            Some((start, end)) => (parse_position(start, len)?, parse_position(end, len)?),
            None => {
                let n = parse_position(part, len)?;
                (n, n)
            }
        };
        if start > end {
            return Err(format!("Range {part} runs backwards"));
        }
        for index in start..=end {
            if !picked.contains(&index) {
                picked.push(index);
            }
        }
    }
    Ok(picked)
}

fn parse_position(text: &str, len: usize) -> Result<usize, String> {
    match text.trim().parse::<usize>() {
        Ok(n) if (1..=len).contains(&n) => Ok(n - 1),
        _ => Err(format!("'{text}' is not a number between 1 and {len}")),
    }
}

/// Indices of `items` whose text contains `filter`, ignoring case.
pub fn filter_items(items: &[String], filter: &str) -> Vec<usize> {
    let needle = filter.to_lowercase();
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.to_lowercase().contains(&needle))
        .map(|(index, _)| index)
        .collect()
}

/// Reads answers line by line and writes prompts and menus to `output`.
pub struct LineTerminal<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
}

impl LineTerminal<io::StdinLock<'static>, io::Stderr> {
    /// Menus go to stderr so stdout carries only reply text.
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> LineTerminal<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: RefCell::new(input),
            output: RefCell::new(output),
        }
    }

    /// Show `prompt` and read one line without its terminator. `None` at end
    /// of input.
    pub fn read_line(&self, prompt: &str) -> io::Result<Option<String>> {
        {
            let mut output = self.output.borrow_mut();
            write!(output, "{prompt}")?;
            output.flush()?;
        }
        let mut line = String::new();
        if self.input.borrow_mut().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    pub fn say(&self, text: &str) -> io::Result<()> {
        writeln!(self.output.borrow_mut(), "{text}")
    }

    pub fn into_output(self) -> W {
        self.output.into_inner()
    }

    fn show_menu(&self, prompt: &str, items: &[String], shown: &[usize]) -> io::Result<()> {
        let mut output = self.output.borrow_mut();
        writeln!(output, "{prompt}:")?;
        let width = shown.len().to_string().len();
        for (position, &index) in shown.iter().enumerate() {
            writeln!(output, "  {:>width$}) {}", position + 1, items[index])?;
        }
        Ok(())
    }
}

impl<R: BufRead, W: Write> Chooser for LineTerminal<R, W> {
    fn select(&self, prompt: &str, items: &[String]) -> io::Result<Option<usize>> {
        if items.is_empty() {
            return Ok(None);
        }
        let mut shown: Vec<usize> = (0..items.len()).collect();
        loop {
            self.show_menu(prompt, items, &shown)?;
            let Some(line) = self.read_line("Number, text to filter, or Enter to cancel: ")?
            else {
                return Ok(None);
            };
            match parse_picker_input(&line, shown.len()) {
                PickerInput::Pick(position) => return Ok(Some(shown[position])),
                PickerInput::Cancel => return Ok(None),
                PickerInput::Invalid => self.say("No such entry.")?,
                PickerInput::Filter(text) => {
                    let narrowed = filter_items(items, &text);
                    if narrowed.is_empty() {
                        self.say(&format!("Nothing matches '{text}'."))?;
                    } else {
                        shown = narrowed;
                    }
                }
            }
        }
    }

    fn multiselect(&self, prompt: &str, items: &[String]) -> io::Result<Vec<usize>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let all: Vec<usize> = (0..items.len()).collect();
        self.show_menu(prompt, items, &all)?;
        loop {
            let Some(line) = self.read_line("Numbers or ranges (e.g. 1,3-5), Enter for none: ")?
            else {
                return Ok(Vec::new());
            };
            match parse_multi_selection(&line, items.len()) {
                Ok(picked) => return Ok(picked),
                Err(message) => self.say(&message)?,
            }
        }
    }
}

/// Writes reply text as it arrives and spins while a blocking model thinks.
pub struct TerminalSink<W: Write> {
    out: W,
    spinner: Option<ProgressBar>,
    wrote_text: bool,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            spinner: None,
            wrote_text: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl TerminalSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ReplySink for TerminalSink<W> {
    fn delta(&mut self, text: &str) {
        self.stop_spinner();
        if text.is_empty() {
            return;
        }
        self.wrote_text = true;
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    fn waiting(&mut self) {
        if !io::stderr().is_terminal() {
            return;
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} ({elapsed})") {
            spinner.set_style(style);
        }
        spinner.set_message("Thinking… Ctrl-C to cancel");
        spinner.enable_steady_tick(Duration::from_millis(120));
        self.spinner = Some(spinner);
    }

    fn finished(&mut self) {
        self.stop_spinner();
        if self.wrote_text {
            let _ = writeln!(self.out);
            let _ = self.out.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn items(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|label| label.to_string()).collect()
    }

    fn terminal(input: &str) -> LineTerminal<Cursor<Vec<u8>>, Vec<u8>> {
        LineTerminal::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn picker_input_is_one_based() {
        assert_eq!(parse_picker_input("1", 3), PickerInput::Pick(0));
        assert_eq!(parse_picker_input(" 3 ", 3), PickerInput::Pick(2));
        assert_eq!(parse_picker_input("4", 3), PickerInput::Invalid);
        assert_eq!(parse_picker_input("0", 3), PickerInput::Invalid);
        assert_eq!(parse_picker_input("", 3), PickerInput::Cancel);
        assert_eq!(parse_picker_input("Q", 3), PickerInput::Cancel);
        assert_eq!(
            parse_picker_input("gpt", 3),
            PickerInput::Filter("gpt".to_string())
        );
    }

    #[test]
    fn multi_selection_accepts_lists_and_ranges() {
        assert_eq!(parse_multi_selection("1,3 2-4", 5).unwrap(), vec![0, 2, 1, 3]);
        assert_eq!(parse_multi_selection("", 5).unwrap(), Vec::<usize>::new());
        assert!(parse_multi_selection("6", 5).is_err());
        assert!(parse_multi_selection("4-2", 5).is_err());
        assert!(parse_multi_selection("x", 5).is_err());
    }

    #[test]
    fn select_filters_before_picking() {
        let labels = items(&["gpt-4o", "gpt-4o-mini", "o3", "llama-3"]);
        let terminal = terminal("mini\n1\n");

        let picked = terminal.select("Pick a model", &labels).unwrap();
        assert_eq!(picked, Some(1));

        let output = String::from_utf8(terminal.into_output()).unwrap();
        assert!(output.contains("1) gpt-4o-mini"));
    }

    #[test]
    fn select_keeps_list_when_filter_matches_nothing() {
        let labels = items(&["alpha", "beta"]);
        let terminal = terminal("zzz\n2\n");

        assert_eq!(terminal.select("Pick", &labels).unwrap(), Some(1));
        let output = String::from_utf8(terminal.into_output()).unwrap();
        assert!(output.contains("Nothing matches 'zzz'."));
    }

    #[test]
    fn select_backs_out_on_end_of_input() {
        let labels = items(&["alpha"]);
        assert_eq!(terminal("").select("Pick", &labels).unwrap(), None);
        assert_eq!(terminal("\n").select("Pick", &labels).unwrap(), None);
    }

    #[test]
    fn multiselect_retries_bad_lines() {
        let labels = items(&["a", "b", "c"]);
        let terminal = terminal("9\n3,1\n");
        assert_eq!(terminal.multiselect("Pick", &labels).unwrap(), vec![2, 0]);
    }

    #[test]
    fn read_line_strips_line_endings() {
        let terminal = terminal("hello\r\nworld");
        assert_eq!(terminal.read_line("> ").unwrap().as_deref(), Some("hello"));
        assert_eq!(terminal.read_line("> ").unwrap().as_deref(), Some("world"));
        assert_eq!(terminal.read_line("> ").unwrap(), None);
    }

    #[test]
    fn sink_writes_deltas_and_closes_the_line() {
        let mut sink = TerminalSink::new(Vec::new());
        sink.delta("Hel");
        sink.delta("");
        sink.delta("lo");
        sink.finished();
        assert_eq!(String::from_utf8(sink.into_inner()).unwrap(), "Hello\n");
    }

    #[test]
    fn sink_without_text_adds_no_newline() {
        let mut sink = TerminalSink::new(Vec::new());
        sink.finished();
        assert!(sink.into_inner().is_empty());
    }
}
