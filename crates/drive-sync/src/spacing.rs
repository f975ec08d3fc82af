//! Blank-line preservation for the WYSIWYG markdown editor
//!
//! Rich-text editors collapse runs of blank lines. Before loading a
//! document each extra blank line becomes a paragraph holding only
//! [`BLANK_LINE_MARKER`]; saving turns those paragraphs back into blank
//! lines. Fenced code and blank runs touching indented code are left alone.

/// Word joiner, no-break space, word joiner
pub const BLANK_LINE_MARKER: &str = "\u{2060}\u{00A0}\u{2060}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence {
    ch: char,
    len: usize,
}

fn fence_info(line: &str) -> Option<Fence> {
    let indent = line.chars().take_while(|c| c.is_whitespace()).count();
    if indent > 3 {
        return None;
    }
    let rest: &str = &line[line.char_indices().nth(indent).map_or(line.len(), |(i, _)| i)..];
    let ch = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = rest.chars().take_while(|c| *c == ch).count();
    (len >= 3).then_some(Fence { ch, len })
}

fn is_indented_code(line: &str) -> bool {
    line.starts_with("    ") || line.starts_with('\t')
}

/// Tracks whether we are inside a fenced code block
#[derive(Default)]
struct FenceState {
    open: Option<Fence>,
}

impl FenceState {
    fn observe(&mut self, line: &str) {
        let Some(marker) = fence_info(line) else {
            return;
        };
        match self.open {
            None => self.open = Some(marker),
            Some(open) if marker.ch == open.ch && marker.len >= open.len => self.open = None,
            Some(_) => {}
        }
    }

    fn inside(&self) -> bool {
        self.open.is_some()
    }
}

fn flush_blank_run(
    out: &mut Vec<&str>,
    run: usize,
    in_fence: bool,
    prev: Option<&str>,
    next: Option<&str>,
) {
    if run == 0 {
        return;
    }
    let keep = in_fence
        || prev.is_some_and(is_indented_code)
        || next.is_some_and(is_indented_code);
    if keep {
        out.extend(std::iter::repeat("").take(run));
        return;
    }
    out.push("");
    for _ in 1..run {
        out.push(BLANK_LINE_MARKER);
        out.push("");
    }
}

/// Encode runs of 2+ blank lines as marker paragraphs
pub fn to_wysiwyg(markdown: &str) -> String {
    if !markdown.contains("\n\n\n") {
        return markdown.to_string();
    }

    let mut out: Vec<&str> = Vec::new();
    let mut fence = FenceState::default();
    let mut blank_run = 0usize;
    let mut prev_non_blank: Option<&str> = None;

    for line in markdown.split('\n') {
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        flush_blank_run(&mut out, blank_run, fence.inside(), prev_non_blank, Some(line));
        blank_run = 0;
        out.push(line);
        prev_non_blank = Some(line);
        fence.observe(line);
    }
    flush_blank_run(&mut out, blank_run, fence.inside(), prev_non_blank, None);

    out.join("\n")
}

/// Decode marker paragraphs back into blank lines
pub fn from_wysiwyg(markdown: &str) -> String {
    if !markdown.contains(BLANK_LINE_MARKER) {
        return markdown.to_string();
    }

    let lines: Vec<&str> = markdown.split('\n').collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut fence = FenceState::default();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if !fence.inside() && line.is_empty() {
            let mut cursor = i;
            let mut placeholders = 0;
            while cursor + 2 < lines.len()
                && lines[cursor + 1] == BLANK_LINE_MARKER
                && lines[cursor + 2].is_empty()
            {
                placeholders += 1;
                cursor += 2;
            }
            if placeholders > 0 {
                out.extend(std::iter::repeat("").take(placeholders + 1));
                i = cursor + 1;
                continue;
            }
        }
        out.push(line);
        fence.observe(line);
        i += 1;
    }

    out.join("\n")
}
