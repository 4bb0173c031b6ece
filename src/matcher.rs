use crate::{storage::FaceRecord, Embedding};

/// Enrolled record most similar to `probe`, with its cosine similarity.
pub fn best_match<'a>(records: &'a [FaceRecord], probe: &Embedding) -> Option<(&'a FaceRecord, f32)> {
    records
        .iter()
        .map(|r| {
            let emb = Embedding::from_vec(r.embedding.clone());
            (r, facecheck_vision::cosine_similarity(&emb, probe))
        })
        .fold(None, |acc, (r, s)| match acc {
            Some((best, score)) if score >= s => Some((best, score)),
            _ => Some((r, s)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, embedding: Vec<f32>) -> FaceRecord {
        FaceRecord {
            id: name.to_string(),
            name: name.to_string(),
            embedding,
        }
    }

    #[test]
    fn test_best_match_picks_highest() {
        let records = vec![
            record("a", vec![1.0, 0.0]),
            record("b", vec![0.6, 0.8]),
            record("c", vec![0.0, 1.0]),
        ];
        let probe = Embedding::from_vec(vec![0.0, 2.0]);

        let (best, score) = best_match(&records, &probe).unwrap();
        assert_eq!(best.name, "c");
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_best_match_empty() {
        let probe = Embedding::from_vec(vec![1.0]);
        assert!(best_match(&[], &probe).is_none());
    }

    #[test]
    fn test_mismatched_length_scores_zero() {
        let records = vec![record("short", vec![1.0])];
        let probe = Embedding::from_vec(vec![1.0, 0.0]);
        let (_, score) = best_match(&records, &probe).unwrap();
        assert_eq!(score, 0.0);
    }
}
