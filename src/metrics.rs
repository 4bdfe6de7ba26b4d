use std::sync::atomic::{AtomicU64, Ordering};

use crate::dispatch::FileKind;

/// Thread-safe counters describing extraction and indexing activity.
#[derive(Default)]
pub struct ProcessingMetrics {
    documents_extracted: AtomicU64,
    images: AtomicU64,
    pdfs: AtomicU64,
    office_documents: AtomicU64,
    corrections_applied: AtomicU64,
    chunks_skipped: AtomicU64,
    documents_indexed: AtomicU64,
    chunks_indexed: AtomicU64,
    last_chunk_size: AtomicU64,
    questions_answered: AtomicU64,
}

impl ProcessingMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document whose text was extracted along the given path.
    pub fn record_extraction(&self, kind: FileKind) {
        self.documents_extracted.fetch_add(1, Ordering::Relaxed);
        let counter = match kind {
            FileKind::Image => &self.images,
            FileKind::Pdf => &self.pdfs,
            FileKind::Word | FileKind::Excel | FileKind::PowerPoint => &self.office_documents,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record successful correction calls and chunks dropped after a failed correction.
    pub fn record_corrections(&self, applied: u64, skipped: u64) {
        self.corrections_applied
            .fetch_add(applied, Ordering::Relaxed);
        self.chunks_skipped.fetch_add(skipped, Ordering::Relaxed);
    }

    /// Record an indexed document and the chunk budget used for it.
    pub fn record_index(&self, chunk_count: u64, chunk_size: u64) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed
            .fetch_add(chunk_count, Ordering::Relaxed);
        self.last_chunk_size.store(chunk_size, Ordering::Relaxed);
    }

    /// Record an answered question.
    pub fn record_question(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let last_chunk_size = match self.last_chunk_size.load(Ordering::Relaxed) {
            0 => None,
            value => Some(value),
        };
        MetricsSnapshot {
            documents_extracted: self.documents_extracted.load(Ordering::Relaxed),
            images: self.images.load(Ordering::Relaxed),
            pdfs: self.pdfs.load(Ordering::Relaxed),
            office_documents: self.office_documents.load(Ordering::Relaxed),
            corrections_applied: self.corrections_applied.load(Ordering::Relaxed),
            chunks_skipped: self.chunks_skipped.load(Ordering::Relaxed),
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            last_chunk_size,
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents whose text was extracted since startup.
    pub documents_extracted: u64,
    /// Extractions that went through OCR.
    pub images: u64,
    /// Extractions that went through document analysis.
    pub pdfs: u64,
    /// Extractions parsed locally from Word, Excel, or PowerPoint files.
    pub office_documents: u64,
    /// Successful correction calls.
    pub corrections_applied: u64,
    /// Chunks left out because their correction failed.
    pub chunks_skipped: u64,
    /// Documents indexed into the vector store.
    pub documents_indexed: u64,
    /// Chunks written across all indexed documents.
    pub chunks_indexed: u64,
    /// Token budget used by the most recent indexing run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chunk_size: Option<u64>,
    /// Questions answered through retrieval.
    pub questions_answered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extractions_are_counted_per_path() {
        let metrics = ProcessingMetrics::new();
        metrics.record_extraction(FileKind::Image);
        metrics.record_extraction(FileKind::Word);
        metrics.record_extraction(FileKind::Excel);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_extracted, 3);
        assert_eq!(snapshot.images, 1);
        assert_eq!(snapshot.pdfs, 0);
        assert_eq!(snapshot.office_documents, 2);
    }

    #[test]
    fn records_indexing_and_last_chunk_size() {
        let metrics = ProcessingMetrics::new();
        assert_eq!(metrics.snapshot().last_chunk_size, None);

        metrics.record_index(2, 512);
        metrics.record_index(3, 1024);
        metrics.record_corrections(4, 1);
        metrics.record_question();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_indexed, 2);
        assert_eq!(snapshot.chunks_indexed, 5);
        assert_eq!(snapshot.last_chunk_size, Some(1024));
        assert_eq!(snapshot.corrections_applied, 4);
        assert_eq!(snapshot.chunks_skipped, 1);
        assert_eq!(snapshot.questions_answered, 1);
    }
}
