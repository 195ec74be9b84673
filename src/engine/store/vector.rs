// ── Vector math utilities ───────────────────────────────────────────────────

/// Convert a byte slice (from a SQLite BLOB) to a Vec<f32>.
/// Little-endian IEEE-754, 4 bytes per component.
pub(crate) fn bytes_to_f32_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Convert a Vec<f32> to bytes for SQLite BLOB storage.
pub(crate) fn f32_vec_to_bytes(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// L2-normalize a vector in place. A zero vector is left untouched.
pub(crate) fn normalize(v: &mut [f32]) {
    let norm: f64 = v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm > 1e-12 {
        for x in v.iter_mut() {
            *x = (*x as f64 / norm) as f32;
        }
    }
}

/// Similarity of a pre-normalized query against a stored document vector:
/// `dot(q̂, d) / ‖d‖`. With the query L2-normalized once up front this equals
/// cosine similarity; the query norm is folded out of the inner loop so the
/// candidate scan costs one pass per document.
pub(crate) fn normalized_query_similarity(query_unit: &[f32], doc: &[f32]) -> f64 {
    if query_unit.len() != doc.len() || doc.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut doc_norm_sq = 0.0f64;
    for (q, d) in query_unit.iter().zip(doc.iter()) {
        let q = *q as f64;
        let d = *d as f64;
        dot += q * d;
        doc_norm_sq += d * d;
    }
    let doc_norm = doc_norm_sq.sqrt();
    if doc_norm < 1e-12 {
        0.0
    } else {
        dot / doc_norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip_is_exact() {
        let v = vec![0.25f32, -1.5, 3.75, f32::MIN_POSITIVE, 1e10];
        let bytes = f32_vec_to_bytes(&v);
        assert_eq!(bytes.len(), v.len() * 4);
        assert_eq!(bytes_to_f32_vec(&bytes), v);
    }

    #[test]
    fn normalize_produces_unit_vector() {
        let mut v = vec![3.0f32, 4.0];
        normalize(&mut v);
        let norm: f64 = v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        let mut v = vec![0.0f32; 4];
        normalize(&mut v);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn similarity_equals_cosine_for_unit_query() {
        // For unit query q and any doc d: score == dot(q, d) / ||d||.
        let mut q = vec![1.0f32, 2.0, 2.0];
        normalize(&mut q);
        let d = vec![4.0f32, 0.0, 3.0];

        let dot: f64 = q.iter().zip(&d).map(|(a, b)| *a as f64 * *b as f64).sum();
        let d_norm: f64 = d.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

        let got = normalized_query_similarity(&q, &d);
        assert!((got - dot / d_norm).abs() < 1e-6);
    }

    #[test]
    fn similarity_zero_on_mismatched_dims() {
        assert_eq!(normalized_query_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn identical_direction_scores_one() {
        let mut q = vec![0.5f32, 0.5, 0.5, 0.5];
        normalize(&mut q);
        let d = vec![2.0f32, 2.0, 2.0, 2.0];
        assert!((normalized_query_similarity(&q, &d) - 1.0).abs() < 1e-6);
    }
}
