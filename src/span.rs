/// Byte offset in the condition text. 32 bits should be enough for everyone.
type Pos = u32;

/// Byte range of a token or error in a condition text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    start: Pos,
    end: Pos,
}

impl Span {
    pub fn start(&self) -> Pos {
        self.start
    }

    pub fn end(&self) -> Pos {
        self.end
    }

    /// Smallest span covering both.
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn with<T>(self, value: T) -> Spanned<T> {
        Spanned { value, span: self }
    }

    /// Line and column where the span starts.
    pub fn locate(&self, text: &str) -> Marker {
        Marker::at(text, self.start)
    }

    /// Line and column where the span ends.
    pub fn locate_end(&self, text: &str) -> Marker {
        Marker::at(text, self.end)
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(range: std::ops::Range<usize>) -> Self {
        Self {
            start: range.start as Pos,
            end: range.end as Pos,
        }
    }
}

/// Value together with the place it was read from.
#[derive(Debug, Clone)]
pub struct Spanned<T> {
    value: T,
    span: Span,
}

impl<T> Spanned<T> {
    pub fn span(&self) -> Span {
        self.span
    }

    pub fn split(self) -> (T, Span) {
        (self.value, self.span)
    }
}

impl<T> std::ops::Deref for Spanned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

/// Position in a text. Column and line are zero-based, the column counts
/// characters rather than bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    idx: Pos,
    col: Pos,
    line: Pos,
}

impl Marker {
    /// Offsets past the end of the text are clamped to the end.
    fn at(text: &str, offset: Pos) -> Self {
        let idx = (offset as usize).min(text.len());
        let before = &text[..idx];
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        Self {
            idx: idx as Pos,
            col: before[line_start..].chars().count() as Pos,
            line: before.matches('\n').count() as Pos,
        }
    }

    pub fn idx(&self) -> Pos {
        self.idx
    }

    pub fn col(&self) -> Pos {
        self.col
    }

    pub fn line(&self) -> Pos {
        self.line
    }
}
