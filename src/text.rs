use std::ops::Range;

/// Content spliced into a run sequence in place of a matched span.
#[derive(Clone, Debug, PartialEq)]
pub enum Insert<D> {
    Text(String),
    Drawing(D),
}

/// Read access to a paragraph's runs, in document order.
pub trait RunText {
    fn run_count(&self) -> usize;
    fn run_text(&self, index: usize) -> String;
}

/// An indexable, editable sequence of formatted text runs.
///
/// Indices are positions in the sequence. Inserting or removing a run only
/// shifts the runs after it.
pub trait RunSequence: RunText {
    type Drawing;

    fn set_run_text(&mut self, index: usize, text: &str);
    /// Insert a new run right after `index`, formatted like the run at `index`.
    fn insert_after(&mut self, index: usize, insert: Insert<Self::Drawing>);
    /// True when the run carries neither text nor any other content.
    fn is_blank(&self, index: usize) -> bool;
    fn remove_run(&mut self, index: usize);
}

impl RunText for Vec<String> {
    fn run_count(&self) -> usize {
        self.len()
    }

    fn run_text(&self, index: usize) -> String {
        self[index].clone()
    }
}

/// Plain runs without formatting. A drawing is stored as its marker string.
impl RunSequence for Vec<String> {
    type Drawing = String;

    fn set_run_text(&mut self, index: usize, text: &str) {
        self[index] = text.to_string();
    }

    fn insert_after(&mut self, index: usize, insert: Insert<String>) {
        let run = match insert {
            Insert::Text(t) | Insert::Drawing(t) => t,
        };
        self.insert(index + 1, run);
    }

    fn is_blank(&self, index: usize) -> bool {
        self[index].is_empty()
    }

    fn remove_run(&mut self, index: usize) {
        self.remove(index);
    }
}

/// One run's half-open byte interval within the logical string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSegment {
    pub run_index: usize,
    pub start: usize,
    pub len: usize,
}

impl RunSegment {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// A paragraph's runs flattened into one string plus the run offset map.
///
/// Segments cover the string in order with no gaps or overlaps. Empty runs
/// get zero-length segments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogicalParagraphText {
    pub text: String,
    pub segments: Vec<RunSegment>,
}

impl LogicalParagraphText {
    pub fn from_runs<S: RunText + ?Sized>(runs: &S) -> Self {
        let mut text = String::new();
        let mut segments = Vec::with_capacity(runs.run_count());
        for run_index in 0..runs.run_count() {
            let run_text = runs.run_text(run_index);
            segments.push(RunSegment {
                run_index,
                start: text.len(),
                len: run_text.len(),
            });
            text.push_str(&run_text);
        }
        Self { text, segments }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The non-empty segment containing byte `pos`.
    pub fn segment_at(&self, pos: usize) -> Option<&RunSegment> {
        self.segments
            .iter()
            .find(|s| s.len > 0 && s.start <= pos && pos < s.end())
    }

    /// The run an insertion point at `pos` belongs to: the run containing
    /// it, or for a position at a run boundary the run ending there.
    pub fn insertion_segment(&self, pos: usize) -> Option<&RunSegment> {
        self.segment_at(pos)
            .or_else(|| self.segments.iter().rev().find(|s| s.end() == pos))
    }

    /// Short excerpt around `span`, at most `radius` characters on each side.
    pub fn snippet(&self, span: Range<usize>, radius: usize) -> String {
        let before = &self.text[..span.start];
        let after = &self.text[span.end..];

        let skip = before.chars().count().saturating_sub(radius);
        let mut head: String = before.chars().skip(skip).collect();
        if skip > 0 {
            head.insert_str(0, "...");
        }
        let mut tail: String = after.chars().take(radius).collect();
        if after.chars().count() > radius {
            tail.push_str("...");
        }
        format!("{head}{}{tail}", &self.text[span])
    }
}
