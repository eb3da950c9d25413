//! Page timeline.
//!
//! Pages play back to back: page `i` starts at the sum of the durations of
//! pages `0..i`. All times are milliseconds from the start of the document.

use crate::document::Document;

/// The time range occupied by one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSpan {
    /// Index of the page in the document.
    pub index: usize,
    pub id: String,
    pub start_ms: f64,
    pub duration_ms: f64,
}

impl PageSpan {
    pub fn end_ms(&self) -> f64 {
        self.start_ms + self.duration_ms
    }

    /// Whether `t` falls in `[start, start + duration)`.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start_ms && t < self.end_ms()
    }
}

/// Contiguous page spans covering `[0, total_duration)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    spans: Vec<PageSpan>,
    total_ms: f64,
}

impl Timeline {
    pub fn from_document(doc: &Document) -> Self {
        Self::build(
            doc.pages
                .iter()
                .enumerate()
                .map(|(index, page)| (index, page.id.clone(), page.duration)),
        )
    }

    /// Build a timeline from bare page durations (ids are the indices).
    pub fn from_durations(durations: &[f64]) -> Self {
        Self::build(
            durations
                .iter()
                .enumerate()
                .map(|(index, d)| (index, index.to_string(), *d)),
        )
    }

    fn build(pages: impl Iterator<Item = (usize, String, f64)>) -> Self {
        let mut start_ms = 0.0;
        let mut spans = Vec::new();
        for (index, id, duration) in pages {
            // Negative or NaN durations occupy no time.
            let duration_ms = if duration > 0.0 { duration } else { 0.0 };
            spans.push(PageSpan {
                index,
                id,
                start_ms,
                duration_ms,
            });
            start_ms += duration_ms;
        }
        Self {
            spans,
            total_ms: start_ms,
        }
    }

    pub fn spans(&self) -> &[PageSpan] {
        &self.spans
    }

    pub fn span(&self, index: usize) -> Option<&PageSpan> {
        self.spans.get(index)
    }

    pub fn total_duration_ms(&self) -> f64 {
        self.total_ms
    }

    pub fn is_empty(&self) -> bool {
        self.total_ms <= 0.0
    }

    /// The page active at time `t`, checked in timeline order.
    ///
    /// Returns `None` for `t` outside `[0, total_duration)`.
    pub fn page_at(&self, t: f64) -> Option<&PageSpan> {
        self.spans.iter().find(|span| span.contains(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Page;
    use proptest::prelude::*;

    #[test]
    fn test_spans_are_prefix_sums() {
        let timeline = Timeline::from_durations(&[1000.0, 2000.0, 500.0]);
        let starts: Vec<f64> = timeline.spans().iter().map(|s| s.start_ms).collect();
        assert_eq!(starts, vec![0.0, 1000.0, 3000.0]);
        assert_eq!(timeline.total_duration_ms(), 3500.0);
    }

    #[test]
    fn test_page_at_boundaries() {
        let timeline = Timeline::from_durations(&[1000.0, 2000.0]);
        assert_eq!(timeline.page_at(0.0).map(|s| s.index), Some(0));
        assert_eq!(timeline.page_at(999.9).map(|s| s.index), Some(0));
        assert_eq!(timeline.page_at(1000.0).map(|s| s.index), Some(1));
        assert_eq!(timeline.page_at(2999.0).map(|s| s.index), Some(1));
        assert!(timeline.page_at(3000.0).is_none());
        assert!(timeline.page_at(-1.0).is_none());
    }

    #[test]
    fn test_zero_duration_page_is_never_active() {
        let timeline = Timeline::from_durations(&[1000.0, 0.0, 1000.0]);
        assert_eq!(timeline.page_at(1000.0).map(|s| s.index), Some(2));
    }

    #[test]
    fn test_from_document_keeps_ids() {
        let doc = Document::with_pages(vec![Page::new("intro", 1500.0), Page::new("outro", 500.0)]);
        let timeline = Timeline::from_document(&doc);
        assert_eq!(timeline.span(1).map(|s| s.id.as_str()), Some("outro"));
        assert_eq!(timeline.total_duration_ms(), doc.total_duration_ms());
    }

    #[test]
    fn test_empty_document() {
        let timeline = Timeline::from_document(&Document::with_pages(Vec::new()));
        assert!(timeline.is_empty());
        assert!(timeline.page_at(0.0).is_none());
    }

    proptest! {
        #[test]
        fn test_page_at_is_total_on_duration(
            durations in prop::collection::vec(1u32..10_000, 1..8),
            fraction in 0.0f64..0.999,
        ) {
            let durations: Vec<f64> = durations.into_iter().map(f64::from).collect();
            let timeline = Timeline::from_durations(&durations);
            let t = fraction * timeline.total_duration_ms();
            let span = timeline.page_at(t);
            prop_assert!(span.is_some());
            let span = span.unwrap();
            prop_assert!(span.start_ms <= t && t < span.end_ms());
        }

        #[test]
        fn test_spans_are_contiguous(durations in prop::collection::vec(0u32..10_000, 0..8)) {
            let durations: Vec<f64> = durations.into_iter().map(f64::from).collect();
            let timeline = Timeline::from_durations(&durations);
            let mut expected_start = 0.0;
            for span in timeline.spans() {
                prop_assert_eq!(span.start_ms, expected_start);
                expected_start = span.end_ms();
            }
            prop_assert_eq!(timeline.total_duration_ms(), expected_start);
        }
    }
}
