use std::ops::Range;

use crate::error::{Error, Result};
use crate::text::{Insert, LogicalParagraphText, RunSequence};

/// Splice `insert` over `span` of the logical string.
///
/// The first overlapping run keeps its prefix and is followed by one new run
/// carrying `insert` in that run's formatting. The last overlapping run keeps
/// its suffix. Runs fully inside the span lose their text. Touched runs that
/// end up blank are pruned. Text outside the span is untouched.
///
/// `layout` must come from `runs` before any match to the right of `span`
/// was applied; matches have to be applied right to left.
pub fn apply_span<S: RunSequence + ?Sized>(
    runs: &mut S,
    layout: &LogicalParagraphText,
    span: Range<usize>,
    insert: Insert<S::Drawing>,
) -> Result<()> {
    if span.start > span.end || span.end > layout.text.len() {
        return Err(inconsistent(&span, "span outside logical text"));
    }

    let first = if span.is_empty() {
        layout.insertion_segment(span.start)
    } else {
        layout.segment_at(span.start)
    }
    .copied()
    .ok_or_else(|| inconsistent(&span, "no run at span start"))?;

    let last = if span.is_empty() {
        first
    } else {
        layout
            .segment_at(span.end - 1)
            .copied()
            .ok_or_else(|| inconsistent(&span, "no run at span end"))?
    };

    if last.run_index >= runs.run_count() || first.run_index > last.run_index {
        return Err(inconsistent(&span, "offset map does not match runs"));
    }

    // Validate everything before the first edit so a failure leaves the runs as they were
    let first_text = runs.run_text(first.run_index);
    let prefix = first_text
        .get(..span.start - first.start)
        .ok_or_else(|| inconsistent(&span, "first run shorter than recorded"))?
        .to_string();

    if first.run_index == last.run_index {
        let suffix = first_text
            .get(span.end - first.start..)
            .ok_or_else(|| inconsistent(&span, "run shorter than recorded"))?
            .to_string();
        let at = first.run_index;
        runs.set_run_text(at, &prefix);
        if !suffix.is_empty() {
            runs.insert_after(at, Insert::Text(suffix));
        }
        insert_unless_empty(runs, at, insert);
        if runs.is_blank(at) {
            runs.remove_run(at);
        }
        return Ok(());
    }

    let last_text = runs.run_text(last.run_index);
    let suffix = last_text
        .get(span.end - last.start..)
        .ok_or_else(|| inconsistent(&span, "last run shorter than recorded"))?
        .to_string();

    runs.set_run_text(last.run_index, &suffix);
    if runs.is_blank(last.run_index) {
        runs.remove_run(last.run_index);
    }

    for index in (first.run_index + 1..last.run_index).rev() {
        runs.set_run_text(index, "");
        if runs.is_blank(index) {
            runs.remove_run(index);
        }
    }

    runs.set_run_text(first.run_index, &prefix);
    insert_unless_empty(runs, first.run_index, insert);
    if runs.is_blank(first.run_index) {
        runs.remove_run(first.run_index);
    }
    Ok(())
}

/// Apply several splices computed against one layout, right to left.
///
/// Each splice succeeds or fails on its own. Results come back in the order
/// the splices were given.
pub fn apply_all<S: RunSequence + ?Sized>(
    runs: &mut S,
    layout: &LogicalParagraphText,
    splices: Vec<(Range<usize>, Insert<S::Drawing>)>,
) -> Vec<Result<()>> {
    let mut order: Vec<usize> = (0..splices.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(splices[i].0.start));

    let mut slots: Vec<Option<(Range<usize>, Insert<S::Drawing>)>> =
        splices.into_iter().map(Some).collect();
    let mut results: Vec<Option<Result<()>>> = (0..slots.len()).map(|_| None).collect();
    for i in order {
        if let Some((span, insert)) = slots[i].take() {
            results[i] = Some(apply_span(runs, layout, span, insert));
        }
    }
    results
        .into_iter()
        .map(|r| r.unwrap_or_else(|| Err(Error::RewriteInconsistency("splice not applied".into()))))
        .collect()
}

fn insert_unless_empty<S: RunSequence + ?Sized>(runs: &mut S, at: usize, insert: Insert<S::Drawing>) {
    match insert {
        Insert::Text(t) if t.is_empty() => {}
        insert => runs.insert_after(at, insert),
    }
}

fn inconsistent(span: &Range<usize>, what: &str) -> Error {
    Error::RewriteInconsistency(format!("{what} (span {}..{})", span.start, span.end))
}
