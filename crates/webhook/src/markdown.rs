//! Markdown-aware splitting of reply text into bounded chunks.

/// Splits outbound text into pieces of at most `limit` characters.
pub trait TextChunker: Send + Sync {
    fn chunk(&self, text: &str, limit: usize) -> Vec<String>;
}

/// Line-packing chunker that keeps fenced code blocks intact across chunk
/// boundaries: a chunk that ends inside a fence gets a closing fence, and the
/// next chunk reopens it with the original opener line (language tag kept).
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownChunker;

impl TextChunker for MarkdownChunker {
    fn chunk(&self, text: &str, limit: usize) -> Vec<String> {
        chunk_markdown(text, limit)
    }
}

/// Split `text` into chunks of at most `limit` characters.
///
/// Lines are packed greedily. Lines longer than a chunk are split at the last
/// space inside the window, or at a char boundary when there is none.
/// Whitespace-only chunks are dropped.
#[must_use]
pub fn chunk_markdown(text: &str, limit: usize) -> Vec<String> {
    if limit == 0 || text.trim().is_empty() {
        return Vec::new();
    }
    if width(text) <= limit {
        return vec![text.to_string()];
    }

    let mut packer = Packer::new(limit);
    for line in text.split('\n') {
        packer.push_line(line);
    }
    packer.finish()
}

fn width(text: &str) -> usize {
    text.chars().count()
}

#[derive(Debug, Clone)]
struct Fence {
    opener: String,
    marker: String,
}

impl Fence {
    fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim_start();
        let ch = trimmed.chars().next().filter(|c| matches!(c, '`' | '~'))?;
        let run = trimmed.chars().take_while(|c| *c == ch).count();
        (run >= 3).then(|| Self {
            opener: line.trim_end().to_string(),
            marker: ch.to_string().repeat(run),
        })
    }

    fn closes(&self, line: &str) -> bool {
        let trimmed = line.trim();
        let Some(ch) = self.marker.chars().next() else {
            return false;
        };
        trimmed.len() >= self.marker.len() && trimmed.chars().all(|c| c == ch)
    }

    /// Characters needed to close the fence at the end of a chunk.
    fn close_len(&self) -> usize {
        self.marker.len() + 1
    }

    /// Whether reopening and closing still leaves most of a chunk for content.
    /// Fences that do not are packed as plain text.
    fn fits(&self, limit: usize) -> bool {
        width(&self.opener) + self.marker.len() + 4 <= limit / 2
    }
}

struct Packer {
    limit: usize,
    chunks: Vec<String>,
    current: String,
    /// Length of `current` in characters.
    len: usize,
    /// `current` holds nothing beyond a reopened fence line.
    fresh: bool,
    open: Option<Fence>,
}

impl Packer {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            chunks: Vec::new(),
            current: String::new(),
            len: 0,
            fresh: true,
            open: None,
        }
    }

    fn separator(&self) -> usize {
        usize::from(!self.current.is_empty())
    }

    fn fits(&self, piece: &str, reserve: usize) -> bool {
        self.len + self.separator() + width(piece) + reserve <= self.limit
    }

    fn available(&self, reserve: usize) -> usize {
        self.limit
            .saturating_sub(self.len + self.separator() + reserve)
            .max(1)
    }

    fn append(&mut self, piece: &str) {
        if self.current.is_empty() {
            if piece.is_empty() {
                return;
            }
        } else {
            self.current.push('\n');
            self.len += 1;
        }
        self.current.push_str(piece);
        self.len += width(piece);
        self.fresh = false;
    }

    fn flush(&mut self) {
        if self.fresh {
            return;
        }
        let mut chunk = std::mem::take(&mut self.current);
        self.len = 0;
        if let Some(fence) = &self.open {
            chunk.push('\n');
            chunk.push_str(&fence.marker);
        }
        if !chunk.trim().is_empty() {
            self.chunks.push(chunk);
        }
        if let Some(fence) = &self.open {
            self.current.push_str(&fence.opener);
            self.len = width(&fence.opener);
        }
        self.fresh = true;
    }

    fn push_line(&mut self, line: &str) {
        let closing = self.open.as_ref().is_some_and(|f| f.closes(line));
        let opening = match self.open {
            None => Fence::parse(line).filter(|f| f.fits(self.limit)),
            Some(_) => None,
        };
        let reserve = if closing {
            0
        } else {
            self.open
                .as_ref()
                .or(opening.as_ref())
                .map_or(0, Fence::close_len)
        };

        if !self.fits(line, reserve) && !self.fresh {
            self.flush();
            if closing {
                // The flush already closed the fence.
                self.open = None;
                self.current.clear();
                self.len = 0;
                return;
            }
        }

        let mut rest = line;
        while !self.fits(rest, reserve) {
            let cut = split_point(rest, self.available(reserve));
            self.append(&rest[..cut]);
            self.flush();
            rest = &rest[cut..];
            rest = rest.strip_prefix(' ').unwrap_or(rest);
        }
        self.append(rest);

        if closing {
            self.open = None;
        } else if opening.is_some() {
            self.open = opening;
        }
    }

    fn finish(mut self) -> Vec<String> {
        if !self.fresh && !self.current.trim().is_empty() {
            self.chunks.push(self.current);
        }
        self.chunks
    }
}

/// Byte index to split `text` at so the head fits in `window` characters.
fn split_point(text: &str, window: usize) -> usize {
    let mut end = text.char_indices().nth(window).map_or(text.len(), |(i, _)| i);
    if end == 0 {
        end = text.chars().next().map_or(text.len(), char::len_utf8);
    }
    match text[..end].rfind(' ') {
        Some(idx) if idx > 0 => idx,
        _ => end,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn fence_lines(chunk: &str) -> usize {
        chunk
            .lines()
            .filter(|l| l.trim_start().starts_with("```"))
            .count()
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_markdown("hello", 100), vec!["hello"]);
    }

    #[test]
    fn blank_text_yields_nothing() {
        assert!(chunk_markdown("  \n\n ", 10).is_empty());
        assert!(chunk_markdown("hello", 0).is_empty());
    }

    #[test]
    fn packs_whole_lines() {
        let chunks = chunk_markdown("line1\nline2\nline3", 10);
        assert_eq!(chunks, vec!["line1", "line2", "line3"]);

        let chunks = chunk_markdown("ab\ncd\nef\ngh", 5);
        assert_eq!(chunks, vec!["ab\ncd", "ef\ngh"]);
    }

    #[test]
    fn long_lines_split_at_spaces() {
        let chunks = chunk_markdown("hello world foo bar", 10);
        assert_eq!(chunks, vec!["hello", "world foo", "bar"]);
    }

    #[test]
    fn long_words_are_hard_split() {
        let chunks = chunk_markdown(&"a".repeat(25), 10);
        assert_eq!(chunks, vec!["a".repeat(10), "a".repeat(10), "a".repeat(5)]);
    }

    #[test]
    fn hard_split_respects_char_boundaries() {
        let chunks = chunk_markdown(&"л".repeat(5), 3);
        assert_eq!(chunks, vec!["ллл", "лл"]);
    }

    #[test]
    fn limit_counts_characters_not_bytes() {
        let cyrillic = "я".repeat(4000);
        assert_eq!(chunk_markdown(&cyrillic, 4000), vec![cyrillic.clone()]);

        let cjk = format!("{} {}", "字".repeat(2500), "字".repeat(1499));
        assert_eq!(chunk_markdown(&cjk, 4000).len(), 1);

        let chunks = chunk_markdown(&format!("{cyrillic}я"), 4000);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 4000);
        assert_eq!(chunks[1], "я");
    }

    #[test]
    fn code_fences_are_closed_and_reopened() {
        let mut text = String::from("Here is the code:\n```rust\n");
        for i in 0..12 {
            text.push_str(&format!("let x{i} = {i};\n"));
        }
        text.push_str("```\nDone.");

        let chunks = chunk_markdown(&text, 60);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 60, "chunk too long: {chunk:?}");
            assert_eq!(fence_lines(chunk) % 2, 0, "unbalanced fence in {chunk:?}");
        }
        for chunk in &chunks[1..] {
            if chunk.contains("let x") {
                assert!(chunk.starts_with("```rust"), "not reopened: {chunk:?}");
            }
        }
        let statements: usize = chunks.iter().map(|c| c.matches("let x").count()).sum();
        assert_eq!(statements, 12);
        assert!(chunks.last().unwrap().ends_with("Done."));
    }

    #[test]
    fn text_after_fence_is_not_wrapped() {
        let text = format!("```\n{}\n```\n{}", "a".repeat(20), "b".repeat(20));
        let chunks = chunk_markdown(&text, 30);
        let last = chunks.last().unwrap();
        assert_eq!(last, &"b".repeat(20));
    }

    #[test]
    fn tilde_fences_are_tracked() {
        let text = format!("~~~\n{}\n{}\n~~~", "x".repeat(20), "y".repeat(20));
        let chunks = chunk_markdown(&text, 32);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].ends_with("\n~~~"));
        assert!(chunks[1].starts_with("~~~\n"));
    }
}
