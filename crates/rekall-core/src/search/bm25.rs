//! BM25 keyword scoring
//!
//! Classical BM25 with IDF fixed at 1.0 - the scorer ranks one query
//! against a candidate set rather than a global corpus, so document
//! frequency carries no signal. Tokenization is lowercase whitespace
//! splitting; document length is word count; the average length is
//! computed over the candidate set at call time.

/// Term-frequency saturation parameter.
pub const K1: f64 = 1.5;

/// Length normalization parameter.
pub const B: f64 = 0.75;

/// Single-document-query model: every term is equally informative.
pub const IDF: f64 = 1.0;

/// Score `document` against `query`. Empty query or document scores 0.
/// Repeated query tokens contribute linearly (each occurrence is scored
/// against the same document term frequency).
pub fn bm25_score(query: &str, document: &str, avg_doc_length: f64) -> f64 {
    let query_tokens = tokenize(query);
    let doc_tokens = tokenize(document);
    if query_tokens.is_empty() || doc_tokens.is_empty() {
        return 0.0;
    }

    let doc_length = doc_tokens.len() as f64;
    let avg = if avg_doc_length > 0.0 {
        avg_doc_length
    } else {
        doc_length
    };

    let mut score = 0.0;
    for token in &query_tokens {
        let tf = doc_tokens.iter().filter(|t| *t == token).count() as f64;
        if tf == 0.0 {
            continue;
        }
        let numerator = tf * (K1 + 1.0);
        let denominator = tf + K1 * (1.0 - B + B * doc_length / avg);
        score += IDF * numerator / denominator;
    }
    score
}

/// Average word count across a candidate set, ignoring empty documents.
pub fn average_doc_length<'a>(documents: impl Iterator<Item = &'a str>) -> f64 {
    let mut total = 0usize;
    let mut count = 0usize;
    for doc in documents {
        let words = doc.split_whitespace().count();
        if words > 0 {
            total += words;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(|w| w.to_lowercase()).collect()
}

// ============================================================================
// TESTS
// ============================================================================
