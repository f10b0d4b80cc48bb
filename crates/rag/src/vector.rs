//! Vector math and BLOB encoding for stored embeddings.

use lumina_core::error::RetrievalError;

/// Cosine similarity of a stored vector and a query, in [-1, 1].
///
/// Vectors of different length come from different embedding models and
/// fail with [`RetrievalError::DimensionMismatch`]. A zero-magnitude input
/// scores 0.0.
pub fn cosine_similarity(stored: &[f32], query: &[f32]) -> Result<f32, RetrievalError> {
    if stored.len() != query.len() {
        return Err(RetrievalError::DimensionMismatch {
            expected: stored.len(),
            actual: query.len(),
        });
    }

    let (dot, stored_sq, query_sq) = stored.iter().zip(query).fold(
        (0.0f64, 0.0f64, 0.0f64),
        |(dot, s2, q2), (&s, &q)| {
            let (s, q) = (f64::from(s), f64::from(q));
            (dot + s * q, s2 + s * s, q2 + q * q)
        },
    );

    let magnitude = (stored_sq * query_sq).sqrt();
    if magnitude < f64::EPSILON {
        return Ok(0.0);
    }
    Ok((dot / magnitude) as f32)
}

/// Similarity as a search score: cosine clamped to `[0, 1]`.
pub fn score(stored: &[f32], query: &[f32]) -> Result<f32, RetrievalError> {
    Ok(cosine_similarity(stored, query)?.clamp(0.0, 1.0))
}

/// Scale `vector` to unit length in place. Zero vectors are left alone.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm < 1e-10 {
        return;
    }
    for x in vector.iter_mut() {
        *x = (*x as f64 / norm) as f32;
    }
}

/// Little-endian f32 encoding used for the `vector` column.
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a `vector` column; `None` if the length is not a multiple of 4.
pub fn blob_to_vector(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}
