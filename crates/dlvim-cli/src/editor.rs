use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::sync::{Mutex, PoisonError};

use dlvim_session::{Editor, EditorError, MarkerKind};

/// Lines of source shown around the cursor.
const CONTEXT_LINES: u32 = 2;

/// Editor playing the session on a plain terminal.
///
/// The session log is written as is, markers are remembered, and moving
/// the cursor prints a listing of the surrounding source lines.
///
/// The terminal input belongs to the command loop: answers to prompts are
/// read there, and handed over with [supply_input](Self::supply_input).
pub struct TerminalEditor {
    out: Mutex<Box<dyn Write + Send>>,
    answers: Mutex<VecDeque<String>>,
    markers: Mutex<BTreeMap<(MarkerKind, i64), (String, u32)>>,
}

impl TerminalEditor {
    /// Creates an editor writing to `out`.
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            answers: Mutex::new(VecDeque::new()),
            markers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Creates an editor writing to the standard output.
    pub fn stdio() -> Self {
        Self::new(std::io::stdout())
    }

    /// Shows a prompt, leaving the cursor on its line.
    pub fn show_prompt(&self, message: &str) -> Result<(), EditorError> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);

        write!(out, "{message}")
            .and_then(|()| out.flush())
            .map_err(EditorError::new)
    }

    /// Queues the answer to the next prompt.
    pub fn supply_input(&self, line: impl Into<String>) {
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(line.into());
    }

    fn write(&self, text: &str) -> Result<(), EditorError> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);

        writeln!(out, "{text}")
            .and_then(|()| out.flush())
            .map_err(EditorError::new)
    }

    fn listing(&self, file: &str, line: u32) -> String {
        let Ok(source) = std::fs::read_to_string(file) else {
            return format!("{file}:{line}");
        };

        let breakpoints: Vec<u32> = self
            .markers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((kind, _), (f, _))| *kind == MarkerKind::Breakpoint && f == file)
            .map(|(_, (_, l))| *l)
            .collect();

        let first = line.saturating_sub(CONTEXT_LINES).max(1);
        let last = line.saturating_add(CONTEXT_LINES);

        let mut listing = format!("{file}:{line}");

        for (n, text) in (1..).zip(source.lines()) {
            if n < first {
                continue;
            }
            if n > last {
                break;
            }

            let prefix = match (n == line, breakpoints.contains(&n)) {
                (true, _) => "=>",
                (false, true) => " *",
                (false, false) => "  ",
            };

            listing.push_str(&format!("\n{prefix}{n:>5}:\t{text}"));
        }

        listing
    }
}

impl Editor for TerminalEditor {
    fn create_session_buffers(&self) -> Result<(), EditorError> {
        self.markers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        Ok(())
    }

    fn place_marker(
        &self,
        kind: MarkerKind,
        id: i64,
        file: &str,
        line: u32,
    ) -> Result<(), EditorError> {
        tracing::debug!(%kind, id, file, line, "place marker");

        self.markers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((kind, id), (file.to_owned(), line));

        Ok(())
    }

    fn unplace_marker(&self, kind: MarkerKind, id: i64) -> Result<(), EditorError> {
        tracing::debug!(%kind, id, "unplace marker");

        self.markers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(kind, id));

        Ok(())
    }

    fn move_cursor(&self, file: &str, line: u32) -> Result<(), EditorError> {
        let listing = self.listing(file, line);
        self.write(&listing)
    }

    fn append_log(&self, text: &str) -> Result<(), EditorError> {
        self.write(text)
    }

    fn prompt_input(&self, message: &str) -> Result<String, EditorError> {
        let answer = self
            .answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        answer.ok_or_else(|| EditorError::new(format!("no answer to {:?}", message.trim())))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use dlvim_session::{Editor, MarkerKind};

    use super::TerminalEditor;

    #[derive(Clone, Default)]
    struct SharedOut(Arc<Mutex<Vec<u8>>>);

    impl SharedOut {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedOut {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn cursor_move_lists_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("main.go");
        std::fs::write(
            &file,
            "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"hi\")\n}\n",
        )
        .expect("write source");
        let file = file.to_str().expect("utf-8 path");

        let out = SharedOut::default();
        let editor = TerminalEditor::new(out.clone());

        editor
            .place_marker(MarkerKind::Breakpoint, 1, file, 5)
            .expect("place");
        editor.move_cursor(file, 6).expect("move");

        let text = out.text();
        assert!(text.contains(" *    5:\tfunc main() {"));
        assert!(text.contains("=>    6:\t\tfmt.Println(\"hi\")"));
        assert!(text.contains("      4:\t"));
        assert!(!text.contains("    3:\t"));

        editor
            .unplace_marker(MarkerKind::Breakpoint, 1)
            .expect("unplace");
        editor.move_cursor(file, 6).expect("move");

        assert!(out.text().contains("\n      5:\tfunc main() {"));
    }

    #[test]
    fn cursor_move_to_unreadable_file() {
        let out = SharedOut::default();
        let editor = TerminalEditor::new(out.clone());

        editor.move_cursor("/nonexistent/main.go", 3).expect("move");

        assert_eq!(out.text(), "/nonexistent/main.go:3\n");
    }

    #[test]
    fn prompt_takes_supplied_answers() {
        let out = SharedOut::default();
        let editor = TerminalEditor::new(out.clone());

        editor.supply_input("bp");
        editor.supply_input("state");

        assert_eq!(editor.prompt_input("(dlv) ").expect("prompt"), "bp");
        assert_eq!(editor.prompt_input("(dlv) ").expect("prompt"), "state");

        let err = editor.prompt_input("(dlv) ").expect_err("nothing supplied");
        assert_eq!(err.to_string(), "editor: no answer to \"(dlv)\"");

        editor.show_prompt("(dlv) ").expect("show");
        assert_eq!(out.text(), "(dlv) ");
    }
}
