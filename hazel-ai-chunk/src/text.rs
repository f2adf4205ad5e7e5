use serde::Serialize;

/// A bounded window of a file's text with positional metadata.
///
/// `char_start..char_end` are byte offsets into the *normalized* file text
/// (line endings collapsed to `\n`, NUL bytes stripped). `line_start` and
/// `line_end` are 1-based and inclusive; consecutive windows report
/// overlapping line ranges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// The text content of this window.
    pub text: String,
    /// Root-relative path of the file this chunk came from.
    pub source_path: String,
    /// Emission order of this chunk within its file (0-indexed).
    pub sequence: usize,
    /// Byte offset of the window start in the normalized text.
    pub char_start: usize,
    /// Byte offset one past the window end in the normalized text.
    pub char_end: usize,
    /// First line covered by the window (1-based).
    pub line_start: usize,
    /// Last line covered by the window (1-based, inclusive).
    pub line_end: usize,
}

/// Splits file content into overlapping line windows.
///
/// Restartable and stateless: every call recomputes chunks from the given
/// bytes. Undecodable input never fails; invalid UTF-8 sequences are
/// replaced with U+FFFD before chunking.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker emitting windows of `chunk_size` lines that overlap
    /// by `overlap` lines.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero or `overlap >= chunk_size`; callers
    /// validate configuration before constructing one.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        assert!(chunk_size > 0, "chunk_size must be positive");
        assert!(overlap < chunk_size, "overlap must be smaller than chunk_size");
        Self { chunk_size, overlap }
    }

    /// Decode `bytes` and slide the line window over the result.
    ///
    /// Empty or whitespace-only content yields an empty Vec, never an error.
    pub fn chunk(&self, bytes: &[u8], source_path: &str) -> Vec<Chunk> {
        let text = normalize(bytes);
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut lines: Vec<&str> = text.split('\n').collect();
        // A trailing newline terminates the last line rather than opening
        // an empty one, so drop the phantom element split produces for it.
        if text.ends_with('\n') {
            lines.pop();
        }

        // line_offsets[i] is the byte offset of line i's first character
        // in the normalized text.
        let mut line_offsets = Vec::with_capacity(lines.len());
        let mut offset = 0usize;
        for line in &lines {
            line_offsets.push(offset);
            offset += line.len() + 1; // the '\n' separator
        }

        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < lines.len() {
            let end = (start + self.chunk_size).min(lines.len());
            let window = lines[start..end].join("\n");

            if !window.trim().is_empty() {
                let char_start = line_offsets[start];
                chunks.push(Chunk {
                    char_end: char_start + window.len(),
                    char_start,
                    text: window,
                    source_path: source_path.to_string(),
                    sequence: chunks.len(),
                    line_start: start + 1,
                    line_end: end,
                });
            }

            start += step;
        }

        chunks
    }

    /// Window size in lines.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Overlap between consecutive windows, in lines.
    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

/// Best-effort decode: lossy UTF-8, NUL bytes stripped, line endings
/// collapsed to `\n`.
fn normalize(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\0' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            }
            c => out.push(c),
        }
    }
    out
}
