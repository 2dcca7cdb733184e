use crate::models::ExtractedMetadata;
use serde::Serialize;
use thiserror::Error;

/// One backend's opinion about a product image. The shipped configuration
/// only ever produces one of these per image, but the merge contract
/// covers the multi-backend case.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub model_name: String,
    pub confidence: f64,
    pub product_type: String,
    pub category_id: String,
    pub subcategory: String,
    pub metadata: ExtractedMetadata,
    pub raw_response: String,
    pub processing_time_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsensusResult {
    pub product_type: String,
    pub category_id: String,
    pub subcategory: String,
    pub confidence: f64,
    pub metadata: ExtractedMetadata,
    pub individual_results: Vec<AnalysisResult>,
    pub consensus_method: &'static str,
}

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("no analysis results to merge")]
    Empty,
}

/// Merge per-backend results by confidence-weighted voting over the
/// categorical fields. product_type and category_id are voted
/// independently and may come from different backends; metadata and
/// subcategory ride with the single highest-confidence result.
pub fn merge(results: Vec<AnalysisResult>) -> Result<ConsensusResult, ConsensusError> {
    if results.is_empty() {
        return Err(ConsensusError::Empty);
    }

    if results.len() == 1 {
        let result = results[0].clone();
        return Ok(ConsensusResult {
            product_type: result.product_type.clone(),
            category_id: result.category_id.clone(),
            subcategory: result.subcategory.clone(),
            confidence: result.confidence,
            metadata: result.metadata.clone(),
            individual_results: results,
            consensus_method: "single_model",
        });
    }

    let mut total_weight: f64 = results.iter().map(|r| r.confidence).sum();
    if total_weight == 0.0 {
        // All-zero confidences still deserve an answer, not a divide-by-zero.
        total_weight = 1.0;
    }

    let mut product_type_votes: Vec<(String, f64)> = Vec::new();
    let mut category_votes: Vec<(String, f64)> = Vec::new();
    for result in &results {
        let weight = result.confidence / total_weight;
        accumulate(&mut product_type_votes, &result.product_type, weight);
        accumulate(&mut category_votes, &result.category_id, weight);
    }

    let (product_type, confidence) = winner(&product_type_votes);
    let (category_id, _) = winner(&category_votes);

    let best = results
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .cloned()
        .ok_or(ConsensusError::Empty)?;

    Ok(ConsensusResult {
        product_type,
        category_id,
        subcategory: best.subcategory.clone(),
        confidence,
        metadata: best.metadata,
        individual_results: results,
        consensus_method: "weighted_voting",
    })
}

fn accumulate(votes: &mut Vec<(String, f64)>, key: &str, weight: f64) {
    if let Some(entry) = votes.iter_mut().find(|(k, _)| k == key) {
        entry.1 += weight;
    } else {
        votes.push((key.to_string(), weight));
    }
}

fn winner(votes: &[(String, f64)]) -> (String, f64) {
    votes
        .iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(k, w)| (k.clone(), *w))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(model: &str, confidence: f64, product_type: &str, category_id: &str) -> AnalysisResult {
        AnalysisResult {
            model_name: model.into(),
            confidence,
            product_type: product_type.into(),
            category_id: category_id.into(),
            subcategory: format!("{model}-sub"),
            metadata: ExtractedMetadata::from_value(json!({"from": model})).expect("object"),
            raw_response: String::new(),
            processing_time_ms: 10,
        }
    }

    #[test]
    fn single_result_is_pure_pass_through() {
        let input = result("gpt-4o", 0.87, "Vintage Postcard", "10398");
        let merged = merge(vec![input.clone()]).expect("merge");
        assert_eq!(merged.product_type, input.product_type);
        assert_eq!(merged.category_id, input.category_id);
        assert_eq!(merged.confidence, input.confidence);
        assert_eq!(merged.consensus_method, "single_model");
        assert_eq!(merged.individual_results.len(), 1);
    }

    #[test]
    fn weighted_voting_picks_heavier_opinion() {
        let merged = merge(vec![
            result("a", 0.9, "Solar Panel", "11700"),
            result("b", 0.3, "Postcard", "10398"),
            result("c", 0.2, "Postcard", "10398"),
        ])
        .expect("merge");
        assert_eq!(merged.consensus_method, "weighted_voting");
        assert_eq!(merged.product_type, "Solar Panel");
        assert_eq!(merged.category_id, "11700");
        // Winning weight: 0.9 / 1.4
        assert!((merged.confidence - 0.9 / 1.4).abs() < 1e-9);
        // Metadata comes from the best raw-confidence result.
        assert_eq!(merged.metadata.get_str("from").as_deref(), Some("a"));
        assert_eq!(merged.subcategory, "a-sub");
    }

    #[test]
    fn equal_minority_votes_can_outweigh_single_best() {
        let merged = merge(vec![
            result("a", 0.5, "Solar Panel", "11700"),
            result("b", 0.4, "Postcard", "10398"),
            result("c", 0.4, "Postcard", "10398"),
        ])
        .expect("merge");
        // Accumulated 0.8 beats 0.5, but metadata still follows "a".
        assert_eq!(merged.product_type, "Postcard");
        assert_eq!(merged.metadata.get_str("from").as_deref(), Some("a"));
    }

    #[test]
    fn all_zero_confidences_do_not_divide_by_zero() {
        let merged = merge(vec![
            result("a", 0.0, "Postcard", "10398"),
            result("b", 0.0, "Postcard", "10398"),
        ])
        .expect("merge");
        assert_eq!(merged.product_type, "Postcard");
        assert!(merged.confidence.is_finite());
        assert_eq!(merged.confidence, 0.0);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(merge(Vec::new()), Err(ConsensusError::Empty)));
    }
}
